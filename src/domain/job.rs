// ==========================================
// 机加工车间排产系统 - 工单领域模型
// ==========================================
// 工单 = 一组按 sequence_order 严格顺序执行的工序
// ==========================================

use crate::domain::types::{DependencyKind, JobStatus, JobType, RoutingStatus};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ==========================================
// Job - 工单
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,                  // 工单ID
    pub customer_id: String,             // 客户ID
    pub job_name: String,                // 工单名称
    pub job_type: JobType,               // 工单类型
    pub parent_job_id: Option<String>,   // 装配父单ID (仅子件单)
    pub assembly_sequence: Option<i32>,  // 装配序号 (仅子件单)
    pub status: JobStatus,               // 工单状态
    pub schedule_locked: bool,           // 排产锁定 (锁定单免挤占)
    pub expedite_flag: bool,             // 加急标志 (可由评分器推导后持久化)
    pub priority_score: i32,             // 优先级评分 [0,1000]
    pub priority_reason: Option<String>, // 评分原因 (JSON, 可解释性)
    pub order_date: Option<NaiveDate>,   // 下单日期
    pub promised_date: Option<NaiveDate>,// 承诺交付日
    pub due_date: Option<NaiveDate>,     // 内部交期
    pub revision: i32,                   // 乐观锁修订号
    pub created_at: NaiveDateTime,       // 创建时间
    pub updated_at: NaiveDateTime,       // 更新时间
}

impl Job {
    /// 判断是否为装配父单
    pub fn is_assembly_parent(&self) -> bool {
        self.job_type == JobType::AssemblyParent
    }

    /// 判断是否为装配子件单
    pub fn is_assembly_component(&self) -> bool {
        self.job_type == JobType::AssemblyComponent
    }

    /// 判断工单是否已进入不可变更阶段（完工/取消）
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, JobStatus::Completed | JobStatus::Cancelled)
    }
}

// ==========================================
// Operation - 工序
// ==========================================
// 红线: required_machine_id 与 required_group_code 二选一
// 指定设备时绝不允许回退到机组替代
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub operation_id: String,                // 工序ID
    pub job_id: String,                      // 所属工单
    pub sequence_order: i32,                 // 工序序号 (单内唯一, 严格递增)
    pub operation_name: String,              // 工序名称
    pub operation_type: Option<String>,      // 工序类型 (转运衔接时长按类型配置)
    pub estimated_minutes: i64,              // 标准工时 (分钟, 未折算效率)
    pub required_machine_id: Option<String>, // 指定设备 (硬约束)
    pub required_group_code: Option<String>, // 指定机组 (组内可替代)
    pub outsourced_flag: bool,               // 外协标志
    pub vendor_lead_days: i64,               // 外协周期 (天)
    pub inspection_flag: bool,               // 零工时质检工序标志
    pub routing_status: RoutingStatus,       // 流转状态
}

impl Operation {
    /// 判断是否需要占用设备工时
    ///
    /// 零工时质检工序不落位，改为转入质检队列
    pub fn consumes_capacity(&self) -> bool {
        !self.inspection_flag
    }

    /// 判断是否指定了具体设备
    pub fn requires_specific_machine(&self) -> bool {
        self.required_machine_id.is_some()
    }
}

// ==========================================
// JobDependency - 工单间依赖
// ==========================================
// 依赖单未排产时，被依赖方整单阻塞
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDependency {
    pub prerequisite_job_id: String, // 前置工单
    pub dependent_job_id: String,    // 被约束工单
    pub dependency_kind: DependencyKind, // 依赖类型
}
