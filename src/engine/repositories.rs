// ==========================================
// 机加工车间排产系统 - 引擎仓储集束
// ==========================================
// 把一次批次需要的全部仓储捆在一起，
// 共享同一个连接, 保证批次事务语义
// ==========================================

use crate::db::{init_schema, open_sqlite_connection};
use crate::repository::{
    AlertRepository, BookingRepository, CustomerRepository, DisplacementRepository,
    InspectionQueueRepository, JobDependencyRepository, JobRepository, MachineRepository,
    OperationRepository, OperatorRepository, PassRepository, RepositoryError, RepositoryResult,
    TimeOffRepository, UndoRepository,
};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

// ==========================================
// ScheduleRepositories - 仓储集束
// ==========================================
pub struct ScheduleRepositories {
    pub jobs: JobRepository,
    pub operations: OperationRepository,
    pub dependencies: JobDependencyRepository,
    pub machines: MachineRepository,
    pub operators: OperatorRepository,
    pub time_off: TimeOffRepository,
    pub customers: CustomerRepository,
    pub bookings: BookingRepository,
    pub displacement: DisplacementRepository,
    pub undo: UndoRepository,
    pub alerts: AlertRepository,
    pub inspection: InspectionQueueRepository,
    pub pass: PassRepository,
}

impl ScheduleRepositories {
    /// 从共享连接创建全部仓储
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            jobs: JobRepository::new(conn.clone()),
            operations: OperationRepository::new(conn.clone()),
            dependencies: JobDependencyRepository::new(conn.clone()),
            machines: MachineRepository::new(conn.clone()),
            operators: OperatorRepository::new(conn.clone()),
            time_off: TimeOffRepository::new(conn.clone()),
            customers: CustomerRepository::new(conn.clone()),
            bookings: BookingRepository::new(conn.clone()),
            displacement: DisplacementRepository::new(conn.clone()),
            undo: UndoRepository::new(conn.clone()),
            alerts: AlertRepository::new(conn.clone()),
            inspection: InspectionQueueRepository::new(conn.clone()),
            pass: PassRepository::new(conn),
        }
    }

    /// 打开数据库并初始化 schema（嵌入方便捷入口）
    pub fn open(db_path: &str) -> RepositoryResult<(Self, Arc<Mutex<Connection>>)> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseQueryError(e.to_string()))?;
        init_schema(&conn).map_err(|e| RepositoryError::DatabaseQueryError(e.to_string()))?;

        let conn = Arc::new(Mutex::new(conn));
        Ok((Self::new(conn.clone()), conn))
    }
}
