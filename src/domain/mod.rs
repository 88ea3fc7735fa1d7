// ==========================================
// 机加工车间排产系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、业务规则接口
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod booking;
pub mod calendar;
pub mod displacement;
pub mod events;
pub mod job;
pub mod resource;
pub mod types;
pub mod undo;

// 重导出核心类型
pub use booking::Booking;
pub use calendar::{WindowSource, WorkingWindow};
pub use displacement::{DisplacedOperation, DisplacementImpact, DisplacementRecord};
pub use events::{AlertEvent, InspectionTicket};
pub use job::{Job, JobDependency, Operation};
pub use resource::{
    Customer, Machine, Operator, OperatorDaySchedule, Qualification, ShiftPattern, TimeOff,
};
pub use types::{
    AlertSeverity, AlertType, BookingMethod, BookingStatus, DependencyKind, DisplacementOutcome,
    InspectionStatus, JobStatus, JobType, MachineStatus, RoutingStatus,
};
pub use undo::{BookingSnapshot, UndoEntry};
