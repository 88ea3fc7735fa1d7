// ==========================================
// 机加工车间排产系统 - 外发事件领域模型
// ==========================================
// 告警与质检队列都是引擎对外的"出口"数据
// ==========================================

use crate::domain::types::{AlertSeverity, AlertType, InspectionStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// AlertEvent - 结构化告警
// ==========================================
// 引擎无法自动消解的情形上报给人工处理
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub alert_id: String,          // 告警ID
    pub severity: AlertSeverity,   // 级别
    pub alert_type: AlertType,     // 类型
    pub message: String,           // 描述
    pub job_id: Option<String>,    // 关联工单
    pub created_at: NaiveDateTime, // 产生时间
}

// ==========================================
// InspectionTicket - 质检队列工单
// ==========================================
// 零工时质检工序不占设备工时，转入该队列；
// 状态流转由外部质检系统维护
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectionTicket {
    pub ticket_id: String,         // 工单号
    pub job_id: String,            // 工单ID
    pub operation_id: String,      // 工序ID
    pub priority_score: i32,       // 入列时的工单优先级
    pub status: InspectionStatus,  // 队列状态
    pub enqueued_at: NaiveDateTime,// 入列时间
}
