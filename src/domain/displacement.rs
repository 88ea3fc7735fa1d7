// ==========================================
// 机加工车间排产系统 - 挤占审计领域模型
// ==========================================
// 红线: 挤占历史只追加不修改
// ==========================================

use crate::domain::types::DisplacementOutcome;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// DisplacementRecord - 挤占记录 (一次触发一条)
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplacementRecord {
    pub record_id: String,            // 记录ID
    pub trigger_job_id: String,       // 触发工单
    pub outcome: DisplacementOutcome, // 结果
    pub displaced_count: i32,         // 被挤占工序数
    pub rescheduled_count: i32,       // 级联待重排工序数
    pub impact: DisplacementImpact,   // 影响汇总
    pub execution_ms: i64,            // 执行耗时 (毫秒)
    pub details: Vec<DisplacedOperation>, // 每个被挤占工序的前后对照
    pub created_at: NaiveDateTime,    // 记录时间
}

// ==========================================
// DisplacedOperation - 单工序挤占明细
// ==========================================
// after_* 为空表示该工序被挤出后尚未重新落位
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplacedOperation {
    pub operation_id: String,             // 工序ID
    pub job_id: String,                   // 工单ID
    pub machine_id: Option<String>,       // 原设备
    pub operator_id: Option<String>,      // 原操作工
    pub before_start_at: Option<NaiveDateTime>, // 原开始
    pub before_end_at: Option<NaiveDateTime>,   // 原结束
    pub after_start_at: Option<NaiveDateTime>,  // 新开始
    pub after_end_at: Option<NaiveDateTime>,    // 新结束
}

// ==========================================
// DisplacementImpact - 影响汇总
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisplacementImpact {
    pub affected_customers: i32,    // 受影响客户数 (去重)
    pub affected_machines: i32,     // 受影响设备数 (去重)
    pub total_hours_displaced: f64, // 被挤占总工时 (小时)
    pub avg_delay_minutes: f64,     // 平均延迟 (分钟, 无新落位时按0计)
}
