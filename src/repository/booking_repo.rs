// ==========================================
// 机加工车间排产系统 - 占用数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 重叠判定统一半开区间: start_at < :end AND :start < end_at
// ==========================================

use crate::domain::booking::Booking;
use crate::domain::types::{BookingMethod, BookingStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_util::{fmt_dt, parse_dt};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

// ==========================================
// BookingRepository - 占用仓储
// ==========================================
pub struct BookingRepository {
    conn: Arc<Mutex<Connection>>,
}

impl BookingRepository {
    /// 创建新的BookingRepository实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 创建占用
    pub fn create(&self, booking: &Booking) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        Self::insert_on(&conn, booking)?;
        Ok(booking.booking_id.clone())
    }

    /// 在给定连接上执行插入（事务内复用）
    pub(crate) fn insert_on(conn: &Connection, booking: &Booking) -> RepositoryResult<()> {
        conn.execute(
            r#"INSERT INTO booking (
                booking_id, operation_id, job_id, machine_id, operator_id,
                start_at, end_at, duration_minutes, chunk_index, status,
                locked, method, revision, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &booking.booking_id,
                &booking.operation_id,
                &booking.job_id,
                &booking.machine_id,
                &booking.operator_id,
                fmt_dt(booking.start_at),
                fmt_dt(booking.end_at),
                &booking.duration_minutes,
                &booking.chunk_index,
                booking.status.to_db_str(),
                booking.locked as i32,
                booking.method.to_db_str(),
                &booking.revision,
                fmt_dt(booking.created_at),
                fmt_dt(booking.updated_at),
            ],
        )?;

        Ok(())
    }

    /// 按booking_id查询占用
    pub fn find_by_id(&self, booking_id: &str) -> RepositoryResult<Option<Booking>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            &format!("{} WHERE booking_id = ?", SELECT_BOOKING),
            params![booking_id],
            |row| Self::map_row(row),
        ) {
            Ok(booking) => Ok(Some(booking)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询某工序的全部占用，按分段序号升序
    pub fn find_by_operation(&self, operation_id: &str) -> RepositoryResult<Vec<Booking>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "{} WHERE operation_id = ? ORDER BY chunk_index ASC",
            SELECT_BOOKING
        ))?;

        let bookings = stmt
            .query_map(params![operation_id], |row| Self::map_row(row))?
            .collect::<Result<Vec<Booking>, _>>()?;

        Ok(bookings)
    }

    /// 查询某工单的全部占用，按开始时间升序
    pub fn find_by_job(&self, job_id: &str) -> RepositoryResult<Vec<Booking>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "{} WHERE job_id = ? ORDER BY start_at ASC, chunk_index ASC",
            SELECT_BOOKING
        ))?;

        let bookings = stmt
            .query_map(params![job_id], |row| Self::map_row(row))?
            .collect::<Result<Vec<Booking>, _>>()?;

        Ok(bookings)
    }

    /// 查询全部占用
    pub fn list_all(&self) -> RepositoryResult<Vec<Booking>> {
        let conn = self.get_conn()?;

        let mut stmt =
            conn.prepare(&format!("{} ORDER BY start_at ASC", SELECT_BOOKING))?;

        let bookings = stmt
            .query_map([], |row| Self::map_row(row))?
            .collect::<Result<Vec<Booking>, _>>()?;

        Ok(bookings)
    }

    /// 查询与时间窗重叠的全部占用
    pub fn list_overlapping(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> RepositoryResult<Vec<Booking>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "{} WHERE start_at < ? AND ? < end_at ORDER BY start_at ASC",
            SELECT_BOOKING
        ))?;

        let bookings = stmt
            .query_map(params![fmt_dt(end), fmt_dt(start)], |row| Self::map_row(row))?
            .collect::<Result<Vec<Booking>, _>>()?;

        Ok(bookings)
    }

    /// 查询某操作工与日期区间相交的全部占用（请假改排入口）
    pub fn find_for_operator_in_dates(
        &self,
        operator_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> RepositoryResult<Vec<Booking>> {
        let range_start = start_date.and_hms_opt(0, 0, 0).unwrap_or_default();
        let range_end = end_date
            .succ_opt()
            .unwrap_or(end_date)
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default();

        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "{} WHERE operator_id = ? AND start_at < ? AND ? < end_at
             ORDER BY start_at ASC",
            SELECT_BOOKING
        ))?;

        let bookings = stmt
            .query_map(
                params![operator_id, fmt_dt(range_end), fmt_dt(range_start)],
                |row| Self::map_row(row),
            )?
            .collect::<Result<Vec<Booking>, _>>()?;

        Ok(bookings)
    }

    /// 统计操作工当前已排工时 (分钟, 不含已完成)
    pub fn operator_workload_minutes(&self, operator_id: &str) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;

        let total: Option<i64> = conn.query_row(
            "SELECT SUM(duration_minutes) FROM booking
             WHERE operator_id = ? AND status IN ('SCHEDULED', 'IN_PROGRESS')",
            params![operator_id],
            |row| row.get(0),
        )?;

        Ok(total.unwrap_or(0))
    }

    /// 删除占用
    pub fn delete(&self, booking_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        conn.execute("DELETE FROM booking WHERE booking_id = ?", params![booking_id])?;

        Ok(())
    }

    /// 更新占用状态
    pub fn update_status(&self, booking_id: &str, status: BookingStatus) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        let affected = conn.execute(
            "UPDATE booking SET status = ?, revision = revision + 1,
                    updated_at = datetime('now')
             WHERE booking_id = ?",
            params![status.to_db_str(), booking_id],
        )?;

        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Booking".to_string(),
                id: booking_id.to_string(),
            });
        }

        Ok(())
    }

    /// 设置/解除锁定
    pub fn update_locked(&self, booking_id: &str, locked: bool) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        let affected = conn.execute(
            "UPDATE booking SET locked = ?, revision = revision + 1,
                    updated_at = datetime('now')
             WHERE booking_id = ?",
            params![locked as i32, booking_id],
        )?;

        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Booking".to_string(),
                id: booking_id.to_string(),
            });
        }

        Ok(())
    }

    /// 映射数据库行到Booking对象
    pub(crate) fn map_row(row: &rusqlite::Row) -> rusqlite::Result<Booking> {
        Ok(Booking {
            booking_id: row.get(0)?,
            operation_id: row.get(1)?,
            job_id: row.get(2)?,
            machine_id: row.get(3)?,
            operator_id: row.get(4)?,
            start_at: parse_dt(5, &row.get::<_, String>(5)?)?,
            end_at: parse_dt(6, &row.get::<_, String>(6)?)?,
            duration_minutes: row.get(7)?,
            chunk_index: row.get(8)?,
            status: BookingStatus::from_str(&row.get::<_, String>(9)?),
            locked: row.get::<_, i32>(10)? != 0,
            method: BookingMethod::from_str(&row.get::<_, String>(11)?),
            revision: row.get(12)?,
            created_at: parse_dt(13, &row.get::<_, String>(13)?)?,
            updated_at: parse_dt(14, &row.get::<_, String>(14)?)?,
        })
    }
}

pub(crate) const SELECT_BOOKING: &str = r#"SELECT booking_id, operation_id, job_id, machine_id, operator_id,
       start_at, end_at, duration_minutes, chunk_index, status,
       locked, method, revision, created_at, updated_at
  FROM booking"#;
