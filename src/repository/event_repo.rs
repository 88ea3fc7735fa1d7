// ==========================================
// 机加工车间排产系统 - 外发事件数据仓储
// ==========================================
// 告警 + 质检队列（引擎只写入，消费在外部系统）
// ==========================================

use crate::domain::events::{AlertEvent, InspectionTicket};
use crate::domain::types::{AlertSeverity, AlertType, InspectionStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_util::{fmt_dt, parse_dt};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

// ==========================================
// AlertRepository - 告警仓储
// ==========================================
pub struct AlertRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AlertRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入告警
    pub fn append(&self, alert: &AlertEvent) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        Self::insert_on(&conn, alert)?;
        Ok(alert.alert_id.clone())
    }

    /// 在给定连接上执行插入（事务内复用）
    pub(crate) fn insert_on(conn: &Connection, alert: &AlertEvent) -> RepositoryResult<()> {
        conn.execute(
            r#"INSERT INTO alert_event (
                alert_id, severity, alert_type, message, job_id, created_at
            ) VALUES (?, ?, ?, ?, ?, ?)"#,
            params![
                &alert.alert_id,
                alert.severity.to_db_str(),
                alert.alert_type.to_db_str(),
                &alert.message,
                &alert.job_id,
                fmt_dt(alert.created_at),
            ],
        )?;

        Ok(())
    }

    /// 查询某工单的全部告警
    pub fn find_by_job(&self, job_id: &str) -> RepositoryResult<Vec<AlertEvent>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"SELECT alert_id, severity, alert_type, message, job_id, created_at
               FROM alert_event WHERE job_id = ? ORDER BY created_at DESC"#,
        )?;

        let alerts = stmt
            .query_map(params![job_id], |row| Self::map_row(row))?
            .collect::<Result<Vec<AlertEvent>, _>>()?;

        Ok(alerts)
    }

    /// 查询全部告警
    pub fn list_all(&self) -> RepositoryResult<Vec<AlertEvent>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"SELECT alert_id, severity, alert_type, message, job_id, created_at
               FROM alert_event ORDER BY created_at DESC"#,
        )?;

        let alerts = stmt
            .query_map([], |row| Self::map_row(row))?
            .collect::<Result<Vec<AlertEvent>, _>>()?;

        Ok(alerts)
    }

    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<AlertEvent> {
        let severity = match row.get::<_, String>(1)?.as_str() {
            "INFO" => AlertSeverity::Info,
            "CRITICAL" => AlertSeverity::Critical,
            _ => AlertSeverity::Warning,
        };
        let alert_type = match row.get::<_, String>(2)?.as_str() {
            "LOCKED_JOB_BLOCKED" => AlertType::LockedJobBlocked,
            "HIGH_PRIORITY_DISPLACED" => AlertType::HighPriorityDisplaced,
            "PROMISE_DATE_VIOLATION" => AlertType::PromiseDateViolation,
            "OUTSOURCING_AT_RISK" => AlertType::OutsourcingAtRisk,
            "SHIFT_CONFLICT" => AlertType::ShiftConflict,
            _ => AlertType::NoSubstituteFound,
        };

        Ok(AlertEvent {
            alert_id: row.get(0)?,
            severity,
            alert_type,
            message: row.get(3)?,
            job_id: row.get(4)?,
            created_at: parse_dt(5, &row.get::<_, String>(5)?)?,
        })
    }
}

// ==========================================
// InspectionQueueRepository - 质检队列仓储
// ==========================================
pub struct InspectionQueueRepository {
    conn: Arc<Mutex<Connection>>,
}

impl InspectionQueueRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 入列
    pub fn enqueue(&self, ticket: &InspectionTicket) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        Self::insert_on(&conn, ticket)?;
        Ok(ticket.ticket_id.clone())
    }

    /// 在给定连接上执行插入（事务内复用）
    pub(crate) fn insert_on(conn: &Connection, ticket: &InspectionTicket) -> RepositoryResult<()> {
        conn.execute(
            r#"INSERT INTO inspection_queue (
                ticket_id, job_id, operation_id, priority_score, status, enqueued_at
            ) VALUES (?, ?, ?, ?, ?, ?)"#,
            params![
                &ticket.ticket_id,
                &ticket.job_id,
                &ticket.operation_id,
                &ticket.priority_score,
                ticket.status.to_db_str(),
                fmt_dt(ticket.enqueued_at),
            ],
        )?;

        Ok(())
    }

    /// 按工序查询质检工单
    pub fn find_by_operation(
        &self,
        operation_id: &str,
    ) -> RepositoryResult<Option<InspectionTicket>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            &format!("{} WHERE operation_id = ?", SELECT_TICKET),
            params![operation_id],
            |row| Self::map_row(row),
        ) {
            Ok(ticket) => Ok(Some(ticket)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询全部质检工单（按优先级降序）
    pub fn list_all(&self) -> RepositoryResult<Vec<InspectionTicket>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "{} ORDER BY priority_score DESC, enqueued_at ASC",
            SELECT_TICKET
        ))?;

        let tickets = stmt
            .query_map([], |row| Self::map_row(row))?
            .collect::<Result<Vec<InspectionTicket>, _>>()?;

        Ok(tickets)
    }

    /// 外部系统回写状态流转
    pub fn update_status(&self, ticket_id: &str, status: InspectionStatus) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        let affected = conn.execute(
            "UPDATE inspection_queue SET status = ? WHERE ticket_id = ?",
            params![status.to_db_str(), ticket_id],
        )?;

        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "InspectionTicket".to_string(),
                id: ticket_id.to_string(),
            });
        }

        Ok(())
    }

    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<InspectionTicket> {
        Ok(InspectionTicket {
            ticket_id: row.get(0)?,
            job_id: row.get(1)?,
            operation_id: row.get(2)?,
            priority_score: row.get(3)?,
            status: InspectionStatus::from_str(&row.get::<_, String>(4)?),
            enqueued_at: parse_dt(5, &row.get::<_, String>(5)?)?,
        })
    }
}

const SELECT_TICKET: &str = r#"SELECT ticket_id, job_id, operation_id, priority_score, status, enqueued_at
  FROM inspection_queue"#;
