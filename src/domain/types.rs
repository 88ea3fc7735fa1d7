// ==========================================
// 机加工车间排产系统 - 领域类型定义
// ==========================================
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 工单状态 (Job Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,    // 待排产
    Scheduled,  // 已排产
    InProgress, // 生产中
    Completed,  // 已完工
    Cancelled,  // 已取消
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl JobStatus {
    /// 从字符串解析状态
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "SCHEDULED" => JobStatus::Scheduled,
            "IN_PROGRESS" => JobStatus::InProgress,
            "COMPLETED" => JobStatus::Completed,
            "CANCELLED" => JobStatus::Cancelled,
            _ => JobStatus::Pending, // 默认值
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Scheduled => "SCHEDULED",
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }
}

// ==========================================
// 工单类型 (Job Type)
// ==========================================
// 装配父单的优先级会抬升其子件单
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    Standard,          // 普通工单
    AssemblyParent,    // 装配父单
    AssemblyComponent, // 装配子件单
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl JobType {
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "ASSEMBLY_PARENT" => JobType::AssemblyParent,
            "ASSEMBLY_COMPONENT" => JobType::AssemblyComponent,
            _ => JobType::Standard,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            JobType::Standard => "STANDARD",
            JobType::AssemblyParent => "ASSEMBLY_PARENT",
            JobType::AssemblyComponent => "ASSEMBLY_COMPONENT",
        }
    }
}

// ==========================================
// 工序流转状态 (Routing Status)
// ==========================================
// NEEDS_RESCHEDULING 由挤占/请假级联标记
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoutingStatus {
    Pending,           // 待排
    Completed,         // 已完成
    NeedsRescheduling, // 待重排
}

impl fmt::Display for RoutingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl RoutingStatus {
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "COMPLETED" => RoutingStatus::Completed,
            "NEEDS_RESCHEDULING" => RoutingStatus::NeedsRescheduling,
            _ => RoutingStatus::Pending,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            RoutingStatus::Pending => "PENDING",
            RoutingStatus::Completed => "COMPLETED",
            RoutingStatus::NeedsRescheduling => "NEEDS_RESCHEDULING",
        }
    }
}

// ==========================================
// 占用状态 (Booking Status)
// ==========================================
// 红线: IN_PROGRESS/COMPLETED 不可被挤占
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Scheduled,         // 已排
    InProgress,        // 进行中
    Completed,         // 已完成
    NeedsRescheduling, // 待重排
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl BookingStatus {
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "IN_PROGRESS" => BookingStatus::InProgress,
            "COMPLETED" => BookingStatus::Completed,
            "NEEDS_RESCHEDULING" => BookingStatus::NeedsRescheduling,
            _ => BookingStatus::Scheduled,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            BookingStatus::Scheduled => "SCHEDULED",
            BookingStatus::InProgress => "IN_PROGRESS",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::NeedsRescheduling => "NEEDS_RESCHEDULING",
        }
    }
}

// ==========================================
// 落位方式 (Booking Method)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingMethod {
    Auto,     // 引擎自动落位
    Manual,   // 人工落位
    Override, // 人工强制覆盖
}

impl fmt::Display for BookingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl BookingMethod {
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "MANUAL" => BookingMethod::Manual,
            "OVERRIDE" => BookingMethod::Override,
            _ => BookingMethod::Auto,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            BookingMethod::Auto => "AUTO",
            BookingMethod::Manual => "MANUAL",
            BookingMethod::Override => "OVERRIDE",
        }
    }
}

// ==========================================
// 设备状态 (Machine Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MachineStatus {
    Active,   // 可用
    Inactive, // 停用
}

impl fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl MachineStatus {
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "INACTIVE" => MachineStatus::Inactive,
            _ => MachineStatus::Active,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            MachineStatus::Active => "ACTIVE",
            MachineStatus::Inactive => "INACTIVE",
        }
    }
}

// ==========================================
// 挤占结果 (Displacement Outcome)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisplacementOutcome {
    Success,    // 挤占成功并完成落位
    Infeasible, // 无可挤占对象或容量不足
}

impl fmt::Display for DisplacementOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl DisplacementOutcome {
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "SUCCESS" => DisplacementOutcome::Success,
            _ => DisplacementOutcome::Infeasible,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            DisplacementOutcome::Success => "SUCCESS",
            DisplacementOutcome::Infeasible => "INFEASIBLE",
        }
    }
}

// ==========================================
// 质检队列状态 (Inspection Status)
// ==========================================
// 状态流转由外部系统管理，引擎只负责入列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InspectionStatus {
    Awaiting,   // 待检
    InProgress, // 检验中
    Completed,  // 已检
    Hold,       // 挂起
}

impl fmt::Display for InspectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl InspectionStatus {
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "IN_PROGRESS" => InspectionStatus::InProgress,
            "COMPLETED" => InspectionStatus::Completed,
            "HOLD" => InspectionStatus::Hold,
            _ => InspectionStatus::Awaiting,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            InspectionStatus::Awaiting => "AWAITING",
            InspectionStatus::InProgress => "IN_PROGRESS",
            InspectionStatus::Completed => "COMPLETED",
            InspectionStatus::Hold => "HOLD",
        }
    }
}

// ==========================================
// 告警级别 (Alert Severity)
// ==========================================
// 顺序: Info < Warning < Critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    Info,     // 提示
    Warning,  // 关注
    Critical, // 危险
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl AlertSeverity {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "INFO",
            AlertSeverity::Warning => "WARNING",
            AlertSeverity::Critical => "CRITICAL",
        }
    }
}

// ==========================================
// 告警类型 (Alert Type)
// ==========================================
// 引擎无法自动消解的情形，统一经告警出口上报
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    LockedJobBlocked,      // 锁定工单被阻塞
    HighPriorityDisplaced, // 高优先级工单被挤占/受影响
    PromiseDateViolation,  // 交付承诺日被突破
    NoSubstituteFound,     // 请假替补失败
    OutsourcingAtRisk,     // 外协发出期限有风险
    ShiftConflict,         // 顺延后仍有冲突
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl AlertType {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            AlertType::LockedJobBlocked => "LOCKED_JOB_BLOCKED",
            AlertType::HighPriorityDisplaced => "HIGH_PRIORITY_DISPLACED",
            AlertType::PromiseDateViolation => "PROMISE_DATE_VIOLATION",
            AlertType::NoSubstituteFound => "NO_SUBSTITUTE_FOUND",
            AlertType::OutsourcingAtRisk => "OUTSOURCING_AT_RISK",
            AlertType::ShiftConflict => "SHIFT_CONFLICT",
        }
    }
}

// ==========================================
// 工单依赖类型 (Dependency Kind)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DependencyKind {
    Assembly, // 装配依赖: 子件全部完工后父单才可开工
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl DependencyKind {
    pub fn from_str(_s: &str) -> Self {
        // 目前仅支持装配依赖
        DependencyKind::Assembly
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            DependencyKind::Assembly => "ASSEMBLY",
        }
    }
}
