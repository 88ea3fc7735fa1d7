// ==========================================
// 机加工车间排产系统 - 撤销台账数据仓储
// ==========================================

use crate::domain::types::{BookingMethod, BookingStatus, RoutingStatus};
use crate::domain::undo::{BookingSnapshot, UndoEntry};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_util::{fmt_dt, parse_dt};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

// ==========================================
// UndoRepository - 撤销台账仓储
// ==========================================
pub struct UndoRepository {
    conn: Arc<Mutex<Connection>>,
}

impl UndoRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入台账条目（含快照）
    pub fn create(&self, entry: &UndoEntry) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        Self::insert_on(&conn, entry)?;
        Ok(entry.entry_id.clone())
    }

    /// 在给定连接上执行插入（事务内复用）
    pub(crate) fn insert_on(conn: &Connection, entry: &UndoEntry) -> RepositoryResult<()> {
        let created_ids_json = serde_json::to_string(&entry.created_booking_ids)
            .map_err(|e| RepositoryError::ValidationError(e.to_string()))?;

        conn.execute(
            r#"INSERT INTO undo_entry (
                entry_id, action_kind, trigger_job_id, created_at, expires_at,
                reversed, created_booking_ids
            ) VALUES (?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &entry.entry_id,
                &entry.action_kind,
                &entry.trigger_job_id,
                fmt_dt(entry.created_at),
                fmt_dt(entry.expires_at),
                entry.reversed as i32,
                created_ids_json,
            ],
        )?;

        for snapshot in &entry.snapshots {
            conn.execute(
                r#"INSERT INTO undo_booking_snapshot (
                    entry_id, booking_id, operation_id, job_id, machine_id,
                    operator_id, start_at, end_at, duration_minutes, chunk_index,
                    status, locked, method, revision, routing_status_before
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
                params![
                    &entry.entry_id,
                    &snapshot.booking_id,
                    &snapshot.operation_id,
                    &snapshot.job_id,
                    &snapshot.machine_id,
                    &snapshot.operator_id,
                    fmt_dt(snapshot.start_at),
                    fmt_dt(snapshot.end_at),
                    &snapshot.duration_minutes,
                    &snapshot.chunk_index,
                    snapshot.status.to_db_str(),
                    snapshot.locked as i32,
                    snapshot.method.to_db_str(),
                    &snapshot.revision,
                    snapshot.routing_status_before.to_db_str(),
                ],
            )?;
        }

        Ok(())
    }

    /// 按entry_id查询台账条目（含快照）
    pub fn find_by_id(&self, entry_id: &str) -> RepositoryResult<Option<UndoEntry>> {
        let conn = self.get_conn()?;

        let entry = match conn.query_row(
            &format!("{} WHERE entry_id = ?", SELECT_ENTRY),
            params![entry_id],
            |row| Self::map_entry(row),
        ) {
            Ok(entry) => entry,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let snapshots = Self::load_snapshots(&conn, entry_id)?;
        Ok(Some(UndoEntry { snapshots, ..entry }))
    }

    /// 查询全部台账条目（含快照, 新的在前）
    pub fn list_all(&self) -> RepositoryResult<Vec<UndoEntry>> {
        let conn = self.get_conn()?;

        let mut stmt =
            conn.prepare(&format!("{} ORDER BY created_at DESC, entry_id", SELECT_ENTRY))?;

        let mut entries = stmt
            .query_map([], |row| Self::map_entry(row))?
            .collect::<Result<Vec<UndoEntry>, _>>()?;

        for entry in &mut entries {
            entry.snapshots = Self::load_snapshots(&conn, &entry.entry_id)?;
        }

        Ok(entries)
    }

    /// 标记条目已回退
    pub fn mark_reversed(&self, entry_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        let affected = conn.execute(
            "UPDATE undo_entry SET reversed = 1 WHERE entry_id = ?",
            params![entry_id],
        )?;

        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "UndoEntry".to_string(),
                id: entry_id.to_string(),
            });
        }

        Ok(())
    }

    /// 清理已过期且从未回退的条目（周期性清扫）
    ///
    /// # 返回
    /// 删除的条目数量
    pub fn purge_expired(&self, now: NaiveDateTime) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;

        let affected = conn.execute(
            "DELETE FROM undo_entry WHERE reversed = 0 AND expires_at <= ?",
            params![fmt_dt(now)],
        )?;

        Ok(affected)
    }

    fn load_snapshots(conn: &Connection, entry_id: &str) -> RepositoryResult<Vec<BookingSnapshot>> {
        let mut stmt = conn.prepare(
            r#"SELECT booking_id, operation_id, job_id, machine_id, operator_id,
                      start_at, end_at, duration_minutes, chunk_index, status,
                      locked, method, revision, routing_status_before
               FROM undo_booking_snapshot
               WHERE entry_id = ?
               ORDER BY booking_id"#,
        )?;

        let snapshots = stmt
            .query_map(params![entry_id], |row| {
                Ok(BookingSnapshot {
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
                    routing_status_before: RoutingStatus::from_str(&row.get::<_, String>(13)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(snapshots)
    }

    fn map_entry(row: &rusqlite::Row) -> rusqlite::Result<UndoEntry> {
        let created_booking_ids: Vec<String> =
            serde_json::from_str(&row.get::<_, String>(6)?).unwrap_or_default();

        Ok(UndoEntry {
            entry_id: row.get(0)?,
            action_kind: row.get(1)?,
            trigger_job_id: row.get(2)?,
            created_at: parse_dt(3, &row.get::<_, String>(3)?)?,
            expires_at: parse_dt(4, &row.get::<_, String>(4)?)?,
            reversed: row.get::<_, i32>(5)? != 0,
            snapshots: Vec::new(),
            created_booking_ids,
        })
    }
}

const SELECT_ENTRY: &str = r#"SELECT entry_id, action_kind, trigger_job_id, created_at, expires_at,
       reversed, created_booking_ids
  FROM undo_entry"#;
