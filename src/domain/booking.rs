// ==========================================
// 机加工车间排产系统 - 占用领域模型
// ==========================================
// Booking = 一次 (设备, 操作工, 时间窗) 落位
// 红线: 同一设备/同一操作工的占用在时间上不可重叠
// ==========================================

use crate::domain::types::{BookingMethod, BookingStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// Booking - 资源占用
// ==========================================
// 跨天分段落位时，同一工序产生多条 chunk_index 递增的占用
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub booking_id: String,       // 占用ID
    pub operation_id: String,     // 工序ID
    pub job_id: String,           // 工单ID (冗余, 供冲突扫描直接过滤)
    pub machine_id: String,       // 设备ID
    pub operator_id: String,      // 操作工ID
    pub start_at: NaiveDateTime,  // 开始时间
    pub end_at: NaiveDateTime,    // 结束时间
    pub duration_minutes: i64,    // 占用时长 (分钟)
    pub chunk_index: i32,         // 分段序号 (0起)
    pub status: BookingStatus,    // 占用状态
    pub locked: bool,             // 锁定 (已开工或人工钉住)
    pub method: BookingMethod,    // 落位方式
    pub revision: i32,            // 乐观锁修订号 (撤销过期判定依赖它)
    pub created_at: NaiveDateTime,// 创建时间
    pub updated_at: NaiveDateTime,// 更新时间
}

impl Booking {
    /// 判断与给定时间窗是否重叠 (半开区间语义: 尾接头不算冲突)
    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.start_at < end && start < self.end_at
    }

    /// 判断是否可被挤占评估
    ///
    /// 锁定、进行中、已完成的占用一律免挤占；
    /// 工单级 schedule_locked 由调用方结合 Job 判断。
    pub fn is_displacement_candidate(&self) -> bool {
        !self.locked
            && !matches!(
                self.status,
                BookingStatus::InProgress | BookingStatus::Completed
            )
    }

    /// 判断占用是否已经开工
    pub fn is_in_progress(&self) -> bool {
        self.status == BookingStatus::InProgress
    }
}
