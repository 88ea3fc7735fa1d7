// ==========================================
// 机加工车间排产系统 - 挤占历史数据仓储
// ==========================================
// 红线: 只追加，不提供更新/删除
// ==========================================

use crate::domain::displacement::{DisplacedOperation, DisplacementImpact, DisplacementRecord};
use crate::domain::types::DisplacementOutcome;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_util::{fmt_dt, parse_dt, parse_dt_opt};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

// ==========================================
// DisplacementRepository - 挤占历史仓储
// ==========================================
pub struct DisplacementRepository {
    conn: Arc<Mutex<Connection>>,
}

impl DisplacementRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 追加一条挤占记录（含明细）
    pub fn append(&self, record: &DisplacementRecord) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        Self::insert_on(&conn, record)?;
        Ok(record.record_id.clone())
    }

    /// 在给定连接上执行插入（事务内复用）
    pub(crate) fn insert_on(conn: &Connection, record: &DisplacementRecord) -> RepositoryResult<()> {
        conn.execute(
            r#"INSERT INTO displacement_record (
                record_id, trigger_job_id, outcome, displaced_count,
                rescheduled_count, affected_customers, affected_machines,
                total_hours_displaced, avg_delay_minutes, execution_ms, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &record.record_id,
                &record.trigger_job_id,
                record.outcome.to_db_str(),
                &record.displaced_count,
                &record.rescheduled_count,
                &record.impact.affected_customers,
                &record.impact.affected_machines,
                &record.impact.total_hours_displaced,
                &record.impact.avg_delay_minutes,
                &record.execution_ms,
                fmt_dt(record.created_at),
            ],
        )?;

        for detail in &record.details {
            conn.execute(
                r#"INSERT INTO displacement_detail (
                    record_id, operation_id, job_id, machine_id, operator_id,
                    before_start_at, before_end_at, after_start_at, after_end_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
                params![
                    &record.record_id,
                    &detail.operation_id,
                    &detail.job_id,
                    &detail.machine_id,
                    &detail.operator_id,
                    &detail.before_start_at.map(fmt_dt),
                    &detail.before_end_at.map(fmt_dt),
                    &detail.after_start_at.map(fmt_dt),
                    &detail.after_end_at.map(fmt_dt),
                ],
            )?;
        }

        Ok(())
    }

    /// 按record_id查询挤占记录（含明细）
    pub fn find_by_id(&self, record_id: &str) -> RepositoryResult<Option<DisplacementRecord>> {
        let conn = self.get_conn()?;

        let record = match conn.query_row(
            &format!("{} WHERE record_id = ?", SELECT_RECORD),
            params![record_id],
            |row| Self::map_record(row),
        ) {
            Ok(record) => record,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let details = Self::load_details(&conn, record_id)?;
        Ok(Some(DisplacementRecord { details, ..record }))
    }

    /// 查询某工单触发的全部挤占记录
    pub fn find_by_trigger_job(&self, job_id: &str) -> RepositoryResult<Vec<DisplacementRecord>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "{} WHERE trigger_job_id = ? ORDER BY created_at DESC",
            SELECT_RECORD
        ))?;

        let mut records = stmt
            .query_map(params![job_id], |row| Self::map_record(row))?
            .collect::<Result<Vec<DisplacementRecord>, _>>()?;

        for record in &mut records {
            record.details = Self::load_details(&conn, &record.record_id)?;
        }

        Ok(records)
    }

    fn load_details(
        conn: &Connection,
        record_id: &str,
    ) -> RepositoryResult<Vec<DisplacedOperation>> {
        let mut stmt = conn.prepare(
            r#"SELECT operation_id, job_id, machine_id, operator_id,
                      before_start_at, before_end_at, after_start_at, after_end_at
               FROM displacement_detail
               WHERE record_id = ?
               ORDER BY operation_id"#,
        )?;

        let details = stmt
            .query_map(params![record_id], |row| {
                Ok(DisplacedOperation {
                    operation_id: row.get(0)?,
                    job_id: row.get(1)?,
                    machine_id: row.get(2)?,
                    operator_id: row.get(3)?,
                    before_start_at: parse_dt_opt(4, row.get(4)?)?,
                    before_end_at: parse_dt_opt(5, row.get(5)?)?,
                    after_start_at: parse_dt_opt(6, row.get(6)?)?,
                    after_end_at: parse_dt_opt(7, row.get(7)?)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(details)
    }

    fn map_record(row: &rusqlite::Row) -> rusqlite::Result<DisplacementRecord> {
        Ok(DisplacementRecord {
            record_id: row.get(0)?,
            trigger_job_id: row.get(1)?,
            outcome: DisplacementOutcome::from_str(&row.get::<_, String>(2)?),
            displaced_count: row.get(3)?,
            rescheduled_count: row.get(4)?,
            impact: DisplacementImpact {
                affected_customers: row.get(5)?,
                affected_machines: row.get(6)?,
                total_hours_displaced: row.get(7)?,
                avg_delay_minutes: row.get(8)?,
            },
            execution_ms: row.get(9)?,
            details: Vec::new(),
            created_at: parse_dt(10, &row.get::<_, String>(10)?)?,
        })
    }
}

const SELECT_RECORD: &str = r#"SELECT record_id, trigger_job_id, outcome, displaced_count,
       rescheduled_count, affected_customers, affected_machines,
       total_hours_displaced, avg_delay_minutes, execution_ms, created_at
  FROM displacement_record"#;
