// ==========================================
// 机加工车间排产系统 - 仓储层 SQL 工具
// ==========================================
// 统一时间/日期的存取格式:
// - 时间戳: %Y-%m-%d %H:%M:%S
// - 日期:   %Y-%m-%d
// - 时刻:   %H:%M:%S
// ==========================================

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::Type;

pub const DT_FMT: &str = "%Y-%m-%d %H:%M:%S";
pub const DATE_FMT: &str = "%Y-%m-%d";
pub const TIME_FMT: &str = "%H:%M:%S";

/// 格式化时间戳
pub fn fmt_dt(dt: NaiveDateTime) -> String {
    dt.format(DT_FMT).to_string()
}

/// 格式化日期
pub fn fmt_date(d: NaiveDate) -> String {
    d.format(DATE_FMT).to_string()
}

/// 格式化时刻
pub fn fmt_time(t: NaiveTime) -> String {
    t.format(TIME_FMT).to_string()
}

/// 解析时间戳列 (map_row 内使用)
pub fn parse_dt(idx: usize, raw: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, DT_FMT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// 解析可空时间戳列
pub fn parse_dt_opt(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<NaiveDateTime>> {
    match raw {
        Some(s) => Ok(Some(parse_dt(idx, &s)?)),
        None => Ok(None),
    }
}

/// 解析日期列
pub fn parse_date(idx: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FMT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// 解析可空日期列
pub fn parse_date_opt(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<NaiveDate>> {
    match raw {
        Some(s) => Ok(Some(parse_date(idx, &s)?)),
        None => Ok(None),
    }
}

/// 解析时刻列
pub fn parse_time(idx: usize, raw: &str) -> rusqlite::Result<NaiveTime> {
    NaiveTime::parse_from_str(raw, TIME_FMT)
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// 解析可空时刻列
pub fn parse_time_opt(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<NaiveTime>> {
    match raw {
        Some(s) => Ok(Some(parse_time(idx, &s)?)),
        None => Ok(None),
    }
}
