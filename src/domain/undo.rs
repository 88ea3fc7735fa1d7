// ==========================================
// 机加工车间排产系统 - 撤销台账领域模型
// ==========================================
// 挤占/批量重排前先快照，保留期内可整体回退
// ==========================================

use crate::domain::types::{BookingMethod, BookingStatus, RoutingStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// UndoEntry - 撤销台账条目
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndoEntry {
    pub entry_id: String,               // 条目ID
    pub action_kind: String,            // 触发动作 (DISPLACEMENT/BULK_RESCHEDULE/TIME_OFF)
    pub trigger_job_id: Option<String>, // 触发工单 (请假触发时为空)
    pub created_at: NaiveDateTime,      // 快照时间
    pub expires_at: NaiveDateTime,      // 过期时间 (默认 24h)
    pub reversed: bool,                 // 是否已回退
    pub snapshots: Vec<BookingSnapshot>,// 受影响占用的快照
    pub created_booking_ids: Vec<String>, // 该动作新建的占用 (回退时一并删除)
}

impl UndoEntry {
    /// 判断在给定时刻是否已过期
    pub fn is_expired(&self, now: NaiveDateTime) -> bool {
        now >= self.expires_at
    }
}

// ==========================================
// BookingSnapshot - 变更前占用快照
// ==========================================
// revision 用于回退时的过期判定:
// 现存占用 revision 高于快照值即说明又被改过，回退必须拒绝
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingSnapshot {
    pub booking_id: String,          // 占用ID
    pub operation_id: String,        // 工序ID
    pub job_id: String,              // 工单ID
    pub machine_id: String,          // 设备ID
    pub operator_id: String,         // 操作工ID
    pub start_at: NaiveDateTime,     // 开始时间
    pub end_at: NaiveDateTime,       // 结束时间
    pub duration_minutes: i64,       // 时长 (分钟)
    pub chunk_index: i32,            // 分段序号
    pub status: BookingStatus,       // 占用状态
    pub locked: bool,                // 锁定标志
    pub method: BookingMethod,       // 落位方式
    pub revision: i32,               // 快照时的修订号
    pub routing_status_before: RoutingStatus, // 工序当时的流转状态
}
