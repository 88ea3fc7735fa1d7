// ==========================================
// 机加工车间排产系统 - 撤销台账引擎
// ==========================================
// 任何挤占/批量重排生效前先快照受影响占用；
// 保留期 (默认24h) 内可整体回退一次。
// 过期判定依赖 booking.revision:
// 现存占用修订号高于快照值 => 期间又被改过 => 拒绝回退
// ==========================================

use crate::domain::booking::Booking;
use crate::domain::types::RoutingStatus;
use crate::domain::undo::{BookingSnapshot, UndoEntry};
use crate::engine::context::SchedulingContext;
use chrono::{Duration, NaiveDateTime};
use std::collections::HashMap;
use uuid::Uuid;

// ==========================================
// UndoLedger - 撤销台账引擎
// ==========================================
pub struct UndoLedger {
    // 无状态引擎,不需要注入依赖
}

impl UndoLedger {
    /// 构造函数
    pub fn new() -> Self {
        Self {}
    }

    // ==========================================
    // 快照构建
    // ==========================================

    /// 为一批受影响占用构建台账条目
    ///
    /// # 参数
    /// - `action_kind`: 触发动作 (DISPLACEMENT/BULK_RESCHEDULE/TIME_OFF)
    /// - `trigger_job_id`: 触发工单 (请假触发时为 None)
    /// - `affected`: 变更前的占用快照源
    /// - `created_booking_ids`: 该动作新建的占用 (回退时一并删除)
    /// - `ctx`: 排产上下文 (取工序当时的流转状态)
    pub fn build_entry(
        &self,
        action_kind: &str,
        trigger_job_id: Option<&str>,
        affected: &[Booking],
        created_booking_ids: &[String],
        ctx: &SchedulingContext,
    ) -> UndoEntry {
        let snapshots = affected
            .iter()
            .map(|booking| BookingSnapshot {
                booking_id: booking.booking_id.clone(),
                operation_id: booking.operation_id.clone(),
                job_id: booking.job_id.clone(),
                machine_id: booking.machine_id.clone(),
                operator_id: booking.operator_id.clone(),
                start_at: booking.start_at,
                end_at: booking.end_at,
                duration_minutes: booking.duration_minutes,
                chunk_index: booking.chunk_index,
                status: booking.status,
                locked: booking.locked,
                method: booking.method,
                revision: booking.revision,
                routing_status_before: ctx
                    .operations
                    .get(&booking.operation_id)
                    .map(|op| op.routing_status)
                    .unwrap_or(RoutingStatus::Pending),
            })
            .collect();

        UndoEntry {
            entry_id: Uuid::new_v4().to_string(),
            action_kind: action_kind.to_string(),
            trigger_job_id: trigger_job_id.map(|s| s.to_string()),
            created_at: ctx.now,
            expires_at: ctx.now + Duration::hours(ctx.config.undo_retention_hours),
            reversed: false,
            snapshots,
            created_booking_ids: created_booking_ids.to_vec(),
        }
    }

    // ==========================================
    // 回退校验
    // ==========================================

    /// 校验台账条目当前是否可回退
    ///
    /// 规则:
    /// - 已回退过 / 已过期: 拒绝
    /// - 快照中的占用若仍存在且修订号已抬升: 期间被改过, 拒绝
    ///   (占用不存在是预期情形 —— 挤占删除了它, 回退即重建)
    ///
    /// # 返回
    /// - `Ok(())`: 可以回退
    /// - `Err(message)`: 拒绝原因
    pub fn verify_reversible(
        &self,
        entry: &UndoEntry,
        current_bookings: &HashMap<String, Booking>,
        now: NaiveDateTime,
    ) -> Result<(), String> {
        if entry.reversed {
            return Err("该台账条目已回退过".to_string());
        }

        if entry.is_expired(now) {
            return Err(format!("台账条目已于 {} 过期", entry.expires_at));
        }

        for snapshot in &entry.snapshots {
            if let Some(current) = current_bookings.get(&snapshot.booking_id) {
                // 条目自身的动作 (顺延/换人) 会把修订号抬升一档,
                // 超过一档才说明后续又有别的操作碰过它
                if current.revision > snapshot.revision + 1 {
                    return Err(format!(
                        "占用 {} 在快照后又被修改 (revision {} -> {})",
                        snapshot.booking_id, snapshot.revision, current.revision
                    ));
                }
            }
        }

        // 该动作新建的占用若已被后续操作改过 (如已开工), 同样拒绝
        for booking_id in &entry.created_booking_ids {
            if let Some(current) = current_bookings.get(booking_id) {
                if current.revision > 0 {
                    return Err(format!(
                        "本次动作新建的占用 {} 已被后续操作修改 (revision {})",
                        booking_id, current.revision
                    ));
                }
            }
        }

        Ok(())
    }

    // ==========================================
    // 回退动作构建
    // ==========================================

    /// 由台账条目构建回退动作
    ///
    /// 动作新建的占用删除; 现存同ID占用先删后重建为快照状态
    /// (修订号抬升一档, 保证后续台账的过期判定仍然成立)；
    /// 工序流转状态一并还原。
    ///
    /// # 返回
    /// (待删占用ID, 待重建占用, 流转状态还原)
    pub fn build_restore(
        &self,
        entry: &UndoEntry,
        now: NaiveDateTime,
    ) -> (Vec<String>, Vec<Booking>, Vec<(String, RoutingStatus)>) {
        let mut delete_ids: Vec<String> = entry.created_booking_ids.clone();
        let mut restored = Vec::new();
        let mut routing = Vec::new();

        for snapshot in &entry.snapshots {
            delete_ids.push(snapshot.booking_id.clone());
            restored.push(Booking {
                booking_id: snapshot.booking_id.clone(),
                operation_id: snapshot.operation_id.clone(),
                job_id: snapshot.job_id.clone(),
                machine_id: snapshot.machine_id.clone(),
                operator_id: snapshot.operator_id.clone(),
                start_at: snapshot.start_at,
                end_at: snapshot.end_at,
                duration_minutes: snapshot.duration_minutes,
                chunk_index: snapshot.chunk_index,
                status: snapshot.status,
                locked: snapshot.locked,
                method: snapshot.method,
                revision: snapshot.revision + 1,
                created_at: now,
                updated_at: now,
            });
            routing.push((snapshot.operation_id.clone(), snapshot.routing_status_before));
        }

        (delete_ids, restored, routing)
    }
}

// ==========================================
// Default trait 实现
// ==========================================
impl Default for UndoLedger {
    fn default() -> Self {
        Self::new()
    }
}

// ==========================================
// 测试模块
// ==========================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::domain::types::{BookingMethod, BookingStatus};
    use chrono::NaiveDate;
    use std::collections::HashMap as StdHashMap;

    fn dt(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 8, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn ctx() -> SchedulingContext {
        SchedulingContext {
            now: dt(11, 8),
            today: dt(11, 8).date(),
            config: SchedulerConfig::default(),
            machines: StdHashMap::new(),
            group_members: StdHashMap::new(),
            operators: StdHashMap::new(),
            qualifications: Vec::new(),
            day_schedules: StdHashMap::new(),
            shift_patterns: StdHashMap::new(),
            time_off: Vec::new(),
            jobs: StdHashMap::new(),
            operations: StdHashMap::new(),
            operations_by_job: StdHashMap::new(),
            dependencies: Vec::new(),
            bookings: Vec::new(),
            customer_tiers: StdHashMap::new(),
            inspection_enqueued_ops: std::collections::HashSet::new(),
        }
    }

    fn booking(id: &str, revision: i32) -> Booking {
        Booking {
            booking_id: id.to_string(),
            operation_id: format!("{}-op", id),
            job_id: format!("{}-job", id),
            machine_id: "M1".to_string(),
            operator_id: "OP1".to_string(),
            start_at: dt(11, 9),
            end_at: dt(11, 13),
            duration_minutes: 240,
            chunk_index: 0,
            status: BookingStatus::Scheduled,
            locked: false,
            method: BookingMethod::Auto,
            revision,
            created_at: dt(11, 8),
            updated_at: dt(11, 8),
        }
    }

    #[test]
    fn test_entry_carries_retention_expiry() {
        let ledger = UndoLedger::new();
        let ctx = ctx();
        let entry = ledger.build_entry("DISPLACEMENT", Some("J1"), &[booking("B1", 0)], &[], &ctx);

        assert_eq!(entry.expires_at, ctx.now + Duration::hours(24));
        assert_eq!(entry.snapshots.len(), 1);
        assert!(!entry.reversed);
    }

    #[test]
    fn test_verify_ok_when_booking_deleted() {
        // 被挤占删除的占用: 现存集合里没有它, 回退即重建
        let ledger = UndoLedger::new();
        let ctx = ctx();
        let entry = ledger.build_entry("DISPLACEMENT", Some("J1"), &[booking("B1", 0)], &[], &ctx);

        let current = StdHashMap::new();
        assert!(ledger.verify_reversible(&entry, &current, ctx.now).is_ok());
    }

    #[test]
    fn test_verify_rejects_modified_booking() {
        let ledger = UndoLedger::new();
        let ctx = ctx();
        let entry = ledger.build_entry("DISPLACEMENT", Some("J1"), &[booking("B1", 0)], &[], &ctx);

        // 快照后占用又被改过 (revision 0 -> 2)
        let mut current = StdHashMap::new();
        current.insert("B1".to_string(), booking("B1", 2));

        let err = ledger
            .verify_reversible(&entry, &current, ctx.now)
            .expect_err("修订号抬升应当拒绝回退");
        assert!(err.contains("B1"));
    }

    #[test]
    fn test_verify_rejects_expired_entry() {
        let ledger = UndoLedger::new();
        let ctx = ctx();
        let entry = ledger.build_entry("DISPLACEMENT", Some("J1"), &[booking("B1", 0)], &[], &ctx);

        let after_expiry = ctx.now + Duration::hours(25);
        assert!(ledger
            .verify_reversible(&entry, &StdHashMap::new(), after_expiry)
            .is_err());
    }

    #[test]
    fn test_restore_rebuilds_snapshot_state() {
        let ledger = UndoLedger::new();
        let ctx = ctx();
        let original = booking("B1", 3);
        let entry = ledger.build_entry("DISPLACEMENT", Some("J1"), &[original.clone()], &[], &ctx);

        let (delete_ids, restored, routing) = ledger.build_restore(&entry, ctx.now);

        assert_eq!(delete_ids, vec!["B1".to_string()]);
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].start_at, original.start_at);
        assert_eq!(restored[0].end_at, original.end_at);
        assert_eq!(restored[0].machine_id, original.machine_id);
        // 修订号抬升一档
        assert_eq!(restored[0].revision, 4);
        assert_eq!(routing.len(), 1);
    }
}
