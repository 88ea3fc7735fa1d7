// ==========================================
// 机加工车间排产系统 - 工作日历领域模型
// ==========================================

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ==========================================
// WorkingWindow - 单日工作窗口
// ==========================================
// 跨夜班 (overnight=true) 的 end 落在次日
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingWindow {
    pub date: NaiveDate,          // 日历日
    pub start: NaiveDateTime,     // 窗口开始 (绝对时刻)
    pub end: NaiveDateTime,       // 窗口结束 (绝对时刻)
    pub duration_minutes: i64,    // 窗口时长 (分钟)
    pub overnight: bool,          // 是否跨夜
    pub is_working: bool,         // 是否工作日
    pub source: WindowSource,     // 命中的解析规则 (可解释性)
}

impl WorkingWindow {
    /// 构造非工作日窗口
    pub fn non_working(date: NaiveDate, source: WindowSource) -> Self {
        let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
        Self {
            date,
            start: midnight,
            end: midnight,
            duration_minutes: 0,
            overnight: false,
            is_working: false,
            source,
        }
    }
}

// ==========================================
// WindowSource - 窗口解析来源
// ==========================================
// 解析顺序: TimeOff > DaySchedule > ShiftPattern > CustomHours > Default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WindowSource {
    TimeOff,      // 审批通过的请假
    DaySchedule,  // 按周几的显式排班
    ShiftPattern, // 班次模板
    CustomHours,  // 个人自定义时段
    DefaultShift, // 默认周一至周五 08:00-17:00
    NonWorking,   // 默认规则下的休息日
}
