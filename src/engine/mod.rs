// ==========================================
// 机加工车间排产系统 - 引擎层
// ==========================================
// 职责: 实现排产业务规则引擎,不拼 SQL
// 红线: Engine 不拼 SQL, 所有规则必须输出 reason;
// 引擎只在内存快照上计算, 落库动作统一攒进 PassMutations
// ==========================================

pub mod calendar;
pub mod context;
pub mod dependency;
pub mod displacement;
pub mod error;
pub mod events;
pub mod matcher;
pub mod orchestrator;
pub mod priority;
pub mod repositories;
pub mod slot_allocator;
pub mod undo_ledger;

// 重导出核心引擎
pub use calendar::CalendarResolver;
pub use context::SchedulingContext;
pub use dependency::{DependencyResolver, EarliestStart, OutsourcingRisk};
pub use displacement::{DisplacementEngine, DisplacementPlan, TimeOffPlan};
pub use error::{ScheduleError, ScheduleResult};
pub use events::{
    AlertSink, CollectingAlertSink, CollectingInspectionSink, InspectionSink, NoOpAlertSink,
    NoOpInspectionSink,
};
pub use matcher::{CandidatePair, ResourceMatcher};
pub use orchestrator::{BulkOutcome, PassOutcome, ScheduleOrchestrator, TimeOffOutcome};
pub use priority::{PriorityScorer, ScoreBreakdown};
pub use repositories::ScheduleRepositories;
pub use slot_allocator::{PlannedAllocation, PlannedSegment, SlotAllocator};
pub use undo_ledger::UndoLedger;
