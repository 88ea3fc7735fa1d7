// ==========================================
// 机加工车间排产系统 - 数据仓储层
// ==========================================
// 职责: 全部 SQL 集中在本层
// 红线: Repository 不含业务逻辑
// ==========================================

pub mod booking_repo;
pub mod displacement_repo;
pub mod error;
pub mod event_repo;
pub mod job_repo;
pub mod pass_repo;
pub mod resource_repo;
pub mod sql_util;
pub mod undo_repo;

pub use booking_repo::BookingRepository;
pub use displacement_repo::DisplacementRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use event_repo::{AlertRepository, InspectionQueueRepository};
pub use job_repo::{JobDependencyRepository, JobRepository, OperationRepository};
pub use pass_repo::{BookingMove, JobPriorityUpdate, PassMutations, PassRepository};
pub use resource_repo::{
    CustomerRepository, MachineRepository, OperatorRepository, TimeOffRepository,
};
pub use undo_repo::UndoRepository;
