// ==========================================
// 机加工车间排产系统 - 工单/工序数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::domain::job::{Job, JobDependency, Operation};
use crate::domain::types::{DependencyKind, JobStatus, JobType, RoutingStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_util::{fmt_date, fmt_dt, parse_date_opt, parse_dt};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

// ==========================================
// JobRepository - 工单仓储
// ==========================================
pub struct JobRepository {
    conn: Arc<Mutex<Connection>>,
}

impl JobRepository {
    /// 创建新的JobRepository实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 创建工单
    pub fn create(&self, job: &Job) -> RepositoryResult<String> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"INSERT INTO job (
                job_id, customer_id, job_name, job_type, parent_job_id,
                assembly_sequence, status, schedule_locked, expedite_flag,
                priority_score, priority_reason, order_date, promised_date,
                due_date, revision, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &job.job_id,
                &job.customer_id,
                &job.job_name,
                job.job_type.to_db_str(),
                &job.parent_job_id,
                &job.assembly_sequence,
                job.status.to_db_str(),
                job.schedule_locked as i32,
                job.expedite_flag as i32,
                &job.priority_score,
                &job.priority_reason,
                &job.order_date.map(fmt_date),
                &job.promised_date.map(fmt_date),
                &job.due_date.map(fmt_date),
                &job.revision,
                fmt_dt(job.created_at),
                fmt_dt(job.updated_at),
            ],
        )?;

        Ok(job.job_id.clone())
    }

    /// 按job_id查询工单
    pub fn find_by_id(&self, job_id: &str) -> RepositoryResult<Option<Job>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            &format!("{} WHERE job_id = ?", SELECT_JOB),
            params![job_id],
            |row| Self::map_row(row),
        ) {
            Ok(job) => Ok(Some(job)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询所有待排产工单，按优先级降序、承诺交付日升序
    pub fn find_pending_ordered(&self) -> RepositoryResult<Vec<Job>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "{} WHERE status = 'PENDING'
             ORDER BY priority_score DESC, promised_date ASC, job_id ASC",
            SELECT_JOB
        ))?;

        let jobs = stmt
            .query_map([], |row| Self::map_row(row))?
            .collect::<Result<Vec<Job>, _>>()?;

        Ok(jobs)
    }

    /// 查询某父单的全部子件单
    pub fn find_components_of(&self, parent_job_id: &str) -> RepositoryResult<Vec<Job>> {
        let conn = self.get_conn()?;

        let mut stmt = stmt_components(&conn)?;
        let jobs = stmt
            .query_map(params![parent_job_id], |row| Self::map_row(row))?
            .collect::<Result<Vec<Job>, _>>()?;

        Ok(jobs)
    }

    /// 更新工单状态
    pub fn update_status(&self, job_id: &str, status: JobStatus) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        let affected = conn.execute(
            "UPDATE job SET status = ?, revision = revision + 1,
                    updated_at = datetime('now')
             WHERE job_id = ?",
            params![status.to_db_str(), job_id],
        )?;

        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Job".to_string(),
                id: job_id.to_string(),
            });
        }

        Ok(())
    }

    /// 写回优先级评分（创建与相关字段变更后触发重算）
    ///
    /// # 参数
    /// - `expedite_flag`: 评分器推导出加急时同步持久化
    pub fn update_priority(
        &self,
        job_id: &str,
        score: i32,
        reason: &str,
        expedite_flag: bool,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        let affected = conn.execute(
            "UPDATE job SET priority_score = ?, priority_reason = ?,
                    expedite_flag = ?, revision = revision + 1,
                    updated_at = datetime('now')
             WHERE job_id = ?",
            params![score, reason, expedite_flag as i32, job_id],
        )?;

        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Job".to_string(),
                id: job_id.to_string(),
            });
        }

        Ok(())
    }

    /// 删除工单 (级联删除工序)
    pub fn delete(&self, job_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        conn.execute("DELETE FROM job WHERE job_id = ?", params![job_id])?;

        Ok(())
    }

    /// 映射数据库行到Job对象
    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<Job> {
        Ok(Job {
            job_id: row.get(0)?,
            customer_id: row.get(1)?,
            job_name: row.get(2)?,
            job_type: JobType::from_str(&row.get::<_, String>(3)?),
            parent_job_id: row.get(4)?,
            assembly_sequence: row.get(5)?,
            status: JobStatus::from_str(&row.get::<_, String>(6)?),
            schedule_locked: row.get::<_, i32>(7)? != 0,
            expedite_flag: row.get::<_, i32>(8)? != 0,
            priority_score: row.get(9)?,
            priority_reason: row.get(10)?,
            order_date: parse_date_opt(11, row.get(11)?)?,
            promised_date: parse_date_opt(12, row.get(12)?)?,
            due_date: parse_date_opt(13, row.get(13)?)?,
            revision: row.get(14)?,
            created_at: parse_dt(15, &row.get::<_, String>(15)?)?,
            updated_at: parse_dt(16, &row.get::<_, String>(16)?)?,
        })
    }
}

const SELECT_JOB: &str = r#"SELECT job_id, customer_id, job_name, job_type, parent_job_id,
       assembly_sequence, status, schedule_locked, expedite_flag,
       priority_score, priority_reason, order_date, promised_date,
       due_date, revision, created_at, updated_at
  FROM job"#;

fn stmt_components<'a>(conn: &'a Connection) -> rusqlite::Result<rusqlite::Statement<'a>> {
    conn.prepare(&format!(
        "{} WHERE parent_job_id = ? ORDER BY assembly_sequence ASC, job_id ASC",
        SELECT_JOB
    ))
}

// ==========================================
// OperationRepository - 工序仓储
// ==========================================
pub struct OperationRepository {
    conn: Arc<Mutex<Connection>>,
}

impl OperationRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 创建工序
    pub fn create(&self, op: &Operation) -> RepositoryResult<String> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"INSERT INTO operation (
                operation_id, job_id, sequence_order, operation_name,
                operation_type, estimated_minutes, required_machine_id,
                required_group_code, outsourced_flag, vendor_lead_days,
                inspection_flag, routing_status
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &op.operation_id,
                &op.job_id,
                &op.sequence_order,
                &op.operation_name,
                &op.operation_type,
                &op.estimated_minutes,
                &op.required_machine_id,
                &op.required_group_code,
                op.outsourced_flag as i32,
                &op.vendor_lead_days,
                op.inspection_flag as i32,
                op.routing_status.to_db_str(),
            ],
        )?;

        Ok(op.operation_id.clone())
    }

    /// 按operation_id查询工序
    pub fn find_by_id(&self, operation_id: &str) -> RepositoryResult<Option<Operation>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            &format!("{} WHERE operation_id = ?", SELECT_OPERATION),
            params![operation_id],
            |row| Self::map_row(row),
        ) {
            Ok(op) => Ok(Some(op)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询工单的全部工序，按sequence_order升序
    pub fn find_by_job(&self, job_id: &str) -> RepositoryResult<Vec<Operation>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "{} WHERE job_id = ? ORDER BY sequence_order ASC",
            SELECT_OPERATION
        ))?;

        let ops = stmt
            .query_map(params![job_id], |row| Self::map_row(row))?
            .collect::<Result<Vec<Operation>, _>>()?;

        Ok(ops)
    }

    /// 查询工单内某序号之后的全部工序（级联标记用）
    pub fn find_later_in_job(
        &self,
        job_id: &str,
        after_sequence: i32,
    ) -> RepositoryResult<Vec<Operation>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "{} WHERE job_id = ? AND sequence_order > ? ORDER BY sequence_order ASC",
            SELECT_OPERATION
        ))?;

        let ops = stmt
            .query_map(params![job_id, after_sequence], |row| Self::map_row(row))?
            .collect::<Result<Vec<Operation>, _>>()?;

        Ok(ops)
    }

    /// 更新工序流转状态
    pub fn update_routing_status(
        &self,
        operation_id: &str,
        status: RoutingStatus,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        let affected = conn.execute(
            "UPDATE operation SET routing_status = ? WHERE operation_id = ?",
            params![status.to_db_str(), operation_id],
        )?;

        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Operation".to_string(),
                id: operation_id.to_string(),
            });
        }

        Ok(())
    }

    /// 映射数据库行到Operation对象
    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<Operation> {
        Ok(Operation {
            operation_id: row.get(0)?,
            job_id: row.get(1)?,
            sequence_order: row.get(2)?,
            operation_name: row.get(3)?,
            operation_type: row.get(4)?,
            estimated_minutes: row.get(5)?,
            required_machine_id: row.get(6)?,
            required_group_code: row.get(7)?,
            outsourced_flag: row.get::<_, i32>(8)? != 0,
            vendor_lead_days: row.get(9)?,
            inspection_flag: row.get::<_, i32>(10)? != 0,
            routing_status: RoutingStatus::from_str(&row.get::<_, String>(11)?),
        })
    }
}

const SELECT_OPERATION: &str = r#"SELECT operation_id, job_id, sequence_order, operation_name,
       operation_type, estimated_minutes, required_machine_id,
       required_group_code, outsourced_flag, vendor_lead_days,
       inspection_flag, routing_status
  FROM operation"#;

// ==========================================
// JobDependencyRepository - 工单依赖仓储
// ==========================================
pub struct JobDependencyRepository {
    conn: Arc<Mutex<Connection>>,
}

impl JobDependencyRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 创建依赖
    pub fn create(&self, dep: &JobDependency) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"INSERT INTO job_dependency (
                prerequisite_job_id, dependent_job_id, dependency_kind
            ) VALUES (?, ?, ?)"#,
            params![
                &dep.prerequisite_job_id,
                &dep.dependent_job_id,
                dep.dependency_kind.to_db_str(),
            ],
        )?;

        Ok(())
    }

    /// 查询某工单的全部前置依赖
    pub fn find_prerequisites_of(&self, job_id: &str) -> RepositoryResult<Vec<JobDependency>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"SELECT prerequisite_job_id, dependent_job_id, dependency_kind
               FROM job_dependency
               WHERE dependent_job_id = ?
               ORDER BY prerequisite_job_id"#,
        )?;

        let deps = stmt
            .query_map(params![job_id], |row| Self::map_row(row))?
            .collect::<Result<Vec<JobDependency>, _>>()?;

        Ok(deps)
    }

    /// 查询依赖某工单的全部后继
    pub fn find_dependents_of(&self, job_id: &str) -> RepositoryResult<Vec<JobDependency>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"SELECT prerequisite_job_id, dependent_job_id, dependency_kind
               FROM job_dependency
               WHERE prerequisite_job_id = ?
               ORDER BY dependent_job_id"#,
        )?;

        let deps = stmt
            .query_map(params![job_id], |row| Self::map_row(row))?
            .collect::<Result<Vec<JobDependency>, _>>()?;

        Ok(deps)
    }

    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<JobDependency> {
        Ok(JobDependency {
            prerequisite_job_id: row.get(0)?,
            dependent_job_id: row.get(1)?,
            dependency_kind: DependencyKind::from_str(&row.get::<_, String>(2)?),
        })
    }
}
