// ==========================================
// 机加工车间排产系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 优先级驱动的排产与挤占引擎
// (作业接入/CRUD界面/报表由外部协作方承担)
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA/建库 DDL 统一）
pub mod db;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    AlertSeverity, AlertType, BookingMethod, BookingStatus, DependencyKind, DisplacementOutcome,
    InspectionStatus, JobStatus, JobType, MachineStatus, RoutingStatus,
};

// 领域实体
pub use domain::{
    AlertEvent, Booking, BookingSnapshot, Customer, DisplacedOperation, DisplacementImpact,
    DisplacementRecord, InspectionTicket, Job, JobDependency, Machine, Operation, Operator,
    OperatorDaySchedule, Qualification, ShiftPattern, TimeOff, UndoEntry, WindowSource,
    WorkingWindow,
};

// 引擎
pub use engine::{
    CalendarResolver, DependencyResolver, DisplacementEngine, PriorityScorer, ResourceMatcher,
    ScheduleError, ScheduleOrchestrator, ScheduleRepositories, SlotAllocator, UndoLedger,
};

// 配置
pub use config::{ConfigManager, SchedulerConfig};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "机加工车间排产系统";

// ==========================================
// 预编译检查
// ==========================================
