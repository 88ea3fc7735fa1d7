// ==========================================
// 机加工车间排产系统 - 排产批次数据仓储
// ==========================================
// 一次排产批次 (pass) 的全部写入在单事务内提交:
// 要么全部生效，要么全部回滚
// ==========================================
// 红线:
// - 引擎在内存中算完，攒出"待执行动作清单"后一次性落库
// - 提交前在事务内做最终的双重占用校验，冲突即整体回滚
// ==========================================

use crate::domain::booking::Booking;
use crate::domain::displacement::DisplacementRecord;
use crate::domain::events::{AlertEvent, InspectionTicket};
use crate::domain::types::{JobStatus, RoutingStatus};
use crate::domain::undo::UndoEntry;
use crate::repository::booking_repo::BookingRepository;
use crate::repository::displacement_repo::DisplacementRepository;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::event_repo::{AlertRepository, InspectionQueueRepository};
use crate::repository::sql_util::fmt_dt;
use crate::repository::undo_repo::UndoRepository;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};
use tracing::warn;

// ==========================================
// BookingMove - 占用平移 (请假顺延用)
// ==========================================
#[derive(Debug, Clone)]
pub struct BookingMove {
    pub booking_id: String,
    pub new_start: NaiveDateTime,
    pub new_end: NaiveDateTime,
}

// ==========================================
// JobPriorityUpdate - 评分写回
// ==========================================
#[derive(Debug, Clone)]
pub struct JobPriorityUpdate {
    pub job_id: String,
    pub score: i32,
    pub reason: String,
    pub expedite_flag: bool,
}

// ==========================================
// PassMutations - 待执行动作清单
// ==========================================
// 扫描阶段只攒动作不落库，避免边遍历边删除导致的迭代失效
#[derive(Debug, Default)]
pub struct PassMutations {
    pub bookings_to_insert: Vec<Booking>,
    pub booking_ids_to_delete: Vec<String>,
    pub booking_moves: Vec<BookingMove>,
    pub routing_updates: Vec<(String, RoutingStatus)>,
    pub job_status_updates: Vec<(String, JobStatus)>,
    pub job_priority_updates: Vec<JobPriorityUpdate>,
    pub displacement_records: Vec<DisplacementRecord>,
    pub undo_entries: Vec<UndoEntry>,
    pub inspection_tickets: Vec<InspectionTicket>,
    pub alerts: Vec<AlertEvent>,
}

impl PassMutations {
    pub fn new() -> Self {
        Self::default()
    }

    /// 判断清单是否为空（空批次不开事务）
    pub fn is_empty(&self) -> bool {
        self.bookings_to_insert.is_empty()
            && self.booking_ids_to_delete.is_empty()
            && self.booking_moves.is_empty()
            && self.routing_updates.is_empty()
            && self.job_status_updates.is_empty()
            && self.job_priority_updates.is_empty()
            && self.displacement_records.is_empty()
            && self.undo_entries.is_empty()
            && self.inspection_tickets.is_empty()
            && self.alerts.is_empty()
    }

    /// 合并另一份清单
    pub fn merge(&mut self, other: PassMutations) {
        self.bookings_to_insert.extend(other.bookings_to_insert);
        self.booking_ids_to_delete.extend(other.booking_ids_to_delete);
        self.booking_moves.extend(other.booking_moves);
        self.routing_updates.extend(other.routing_updates);
        self.job_status_updates.extend(other.job_status_updates);
        self.job_priority_updates.extend(other.job_priority_updates);
        self.displacement_records.extend(other.displacement_records);
        self.undo_entries.extend(other.undo_entries);
        self.inspection_tickets.extend(other.inspection_tickets);
        self.alerts.extend(other.alerts);
    }
}

// ==========================================
// PassRepository - 批次提交仓储
// ==========================================
pub struct PassRepository {
    conn: Arc<Mutex<Connection>>,
}

impl PassRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 原子提交一次批次的全部写入
    ///
    /// 执行顺序: 删除 → 平移 → 新增 → 工序/工单状态 → 审计/台账/外发，
    /// 最后在事务内校验本次新增/平移的占用没有引入双重占用。
    ///
    /// # 返回
    /// - `Ok(())`: 全部提交
    /// - `Err(BusinessRuleViolation)`: 校验失败，整体回滚
    pub fn apply(&self, mutations: &PassMutations) -> RepositoryResult<()> {
        if mutations.is_empty() {
            return Ok(());
        }

        let conn = self.get_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        // 1. 删除被挤占/级联失效的占用
        for booking_id in &mutations.booking_ids_to_delete {
            tx.execute("DELETE FROM booking WHERE booking_id = ?", params![booking_id])?;
        }

        // 2. 平移（请假顺延）
        for mv in &mutations.booking_moves {
            let affected = tx.execute(
                "UPDATE booking SET start_at = ?, end_at = ?,
                        revision = revision + 1, updated_at = datetime('now')
                 WHERE booking_id = ?",
                params![fmt_dt(mv.new_start), fmt_dt(mv.new_end), &mv.booking_id],
            )?;
            if affected == 0 {
                return Err(RepositoryError::NotFound {
                    entity: "Booking".to_string(),
                    id: mv.booking_id.clone(),
                });
            }
        }

        // 3. 新增占用
        for booking in &mutations.bookings_to_insert {
            BookingRepository::insert_on(&tx, booking)?;
        }

        // 4. 工序流转状态
        for (operation_id, status) in &mutations.routing_updates {
            tx.execute(
                "UPDATE operation SET routing_status = ? WHERE operation_id = ?",
                params![status.to_db_str(), operation_id],
            )?;
        }

        // 5. 工单状态与评分
        for (job_id, status) in &mutations.job_status_updates {
            tx.execute(
                "UPDATE job SET status = ?, revision = revision + 1,
                        updated_at = datetime('now')
                 WHERE job_id = ?",
                params![status.to_db_str(), job_id],
            )?;
        }

        for update in &mutations.job_priority_updates {
            tx.execute(
                "UPDATE job SET priority_score = ?, priority_reason = ?,
                        expedite_flag = ?, revision = revision + 1,
                        updated_at = datetime('now')
                 WHERE job_id = ?",
                params![
                    update.score,
                    &update.reason,
                    update.expedite_flag as i32,
                    &update.job_id
                ],
            )?;
        }

        // 6. 审计/台账/外发
        for record in &mutations.displacement_records {
            DisplacementRepository::insert_on(&tx, record)?;
        }

        for entry in &mutations.undo_entries {
            UndoRepository::insert_on(&tx, entry)?;
        }

        for ticket in &mutations.inspection_tickets {
            InspectionQueueRepository::insert_on(&tx, ticket)?;
        }

        for alert in &mutations.alerts {
            AlertRepository::insert_on(&tx, alert)?;
        }

        // 7. 最终校验: 本次触碰的占用不得与任何现存占用双重占用
        let mut touched: Vec<String> = mutations
            .bookings_to_insert
            .iter()
            .map(|b| b.booking_id.clone())
            .collect();
        touched.extend(mutations.booking_moves.iter().map(|m| m.booking_id.clone()));

        for booking_id in &touched {
            let conflicts: i64 = tx.query_row(
                r#"SELECT COUNT(*)
                   FROM booking a
                   JOIN booking b ON b.booking_id != a.booking_id
                       AND (b.machine_id = a.machine_id OR b.operator_id = a.operator_id)
                       AND b.start_at < a.end_at AND a.start_at < b.end_at
                   WHERE a.booking_id = ?"#,
                params![booking_id],
                |row| row.get(0),
            )?;

            if conflicts > 0 {
                warn!(booking_id = %booking_id, conflicts, "批次提交前发现双重占用，整体回滚");
                // 事务随 tx drop 自动回滚
                return Err(RepositoryError::BusinessRuleViolation(format!(
                    "双重占用: booking {} 与 {} 条现存占用冲突",
                    booking_id, conflicts
                )));
            }
        }

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        Ok(())
    }
}
