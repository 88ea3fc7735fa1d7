// ==========================================
// 机加工车间排产系统 - 引擎层事件出口
// ==========================================
// 职责: 定义告警/质检队列的外发 trait，实现依赖倒置
// 说明: Engine 层定义 trait，接入方 (通知/消息系统) 实现适配器
// 落库 (alert_event / inspection_queue 表) 与外发互不替代:
// 表是可审计的数据出口，trait 是进程内的即时通知
// ==========================================

use crate::domain::events::{AlertEvent, InspectionTicket};
use std::sync::{Arc, Mutex};
use tracing::debug;

// ==========================================
// 告警出口 Trait
// ==========================================

/// 告警接收方
///
/// 引擎无法自动消解的情形经此上报；实现方自行决定
/// 通知渠道 (站内信/邮件/大屏)。失败不阻塞排产批次。
pub trait AlertSink: Send + Sync {
    /// 上报一条告警
    fn publish(&self, alert: &AlertEvent);
}

/// 质检队列接收方
///
/// 零工时质检工序经此转入外部质检系统
pub trait InspectionSink: Send + Sync {
    /// 工序入列
    fn enqueue(&self, ticket: &InspectionTicket);
}

// ==========================================
// 空实现 (默认/单元测试场景)
// ==========================================

#[derive(Debug, Clone, Default)]
pub struct NoOpAlertSink;

impl AlertSink for NoOpAlertSink {
    fn publish(&self, alert: &AlertEvent) {
        debug!(
            alert_type = %alert.alert_type,
            severity = %alert.severity,
            "NoOpAlertSink: 跳过告警外发"
        );
    }
}

#[derive(Debug, Clone, Default)]
pub struct NoOpInspectionSink;

impl InspectionSink for NoOpInspectionSink {
    fn enqueue(&self, ticket: &InspectionTicket) {
        debug!(
            operation_id = %ticket.operation_id,
            "NoOpInspectionSink: 跳过质检入列通知"
        );
    }
}

// ==========================================
// 收集实现 (集成测试断言用)
// ==========================================

#[derive(Debug, Default)]
pub struct CollectingAlertSink {
    events: Mutex<Vec<AlertEvent>>,
}

impl CollectingAlertSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 取出已收集的告警
    pub fn drain(&self) -> Vec<AlertEvent> {
        match self.events.lock() {
            Ok(mut guard) => guard.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AlertSink for CollectingAlertSink {
    fn publish(&self, alert: &AlertEvent) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(alert.clone());
        }
    }
}

#[derive(Debug, Default)]
pub struct CollectingInspectionSink {
    tickets: Mutex<Vec<InspectionTicket>>,
}

impl CollectingInspectionSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn drain(&self) -> Vec<InspectionTicket> {
        match self.tickets.lock() {
            Ok(mut guard) => guard.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.tickets.lock().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl InspectionSink for CollectingInspectionSink {
    fn enqueue(&self, ticket: &InspectionTicket) {
        if let Ok(mut guard) = self.tickets.lock() {
            guard.push(ticket.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{AlertSeverity, AlertType, InspectionStatus};
    use chrono::NaiveDate;

    fn sample_alert() -> AlertEvent {
        AlertEvent {
            alert_id: "A1".to_string(),
            severity: AlertSeverity::Warning,
            alert_type: AlertType::NoSubstituteFound,
            message: "测试".to_string(),
            job_id: None,
            created_at: NaiveDate::from_ymd_opt(2025, 8, 11)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn test_collecting_alert_sink() {
        let sink = CollectingAlertSink::new();
        sink.publish(&sample_alert());
        sink.publish(&sample_alert());

        assert_eq!(sink.len(), 2);
        let drained = sink.drain();
        assert_eq!(drained.len(), 2);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_collecting_inspection_sink() {
        let sink = CollectingInspectionSink::new();
        sink.enqueue(&InspectionTicket {
            ticket_id: "T1".to_string(),
            job_id: "J1".to_string(),
            operation_id: "OP1".to_string(),
            priority_score: 500,
            status: InspectionStatus::Awaiting,
            enqueued_at: NaiveDate::from_ymd_opt(2025, 8, 11)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
        });

        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_noop_sinks() {
        NoOpAlertSink.publish(&sample_alert());
        // 不落任何状态即为通过
    }
}
