// ==========================================
// 机加工车间排产系统 - 排产上下文
// ==========================================
// 批次开始时由编排器一次性加载的内存快照。
// 红线: 各引擎只读/改写本快照，不碰 SQL；
// 全部落库动作攒进 PassMutations，提交时一次事务写入
// ==========================================

use crate::config::SchedulerConfig;
use crate::domain::booking::Booking;
use crate::domain::job::{Job, JobDependency, Operation};
use crate::domain::resource::{
    Machine, Operator, OperatorDaySchedule, Qualification, ShiftPattern, TimeOff,
};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{HashMap, HashSet};

// ==========================================
// SchedulingContext - 批次内存快照
// ==========================================
#[derive(Debug, Clone)]
pub struct SchedulingContext {
    pub now: NaiveDateTime,   // 批次基准时刻
    pub today: NaiveDate,     // 批次基准日期
    pub config: SchedulerConfig, // 批次内参数快照 (批次中途不再重读)

    // ===== 资源 =====
    pub machines: HashMap<String, Machine>,
    pub group_members: HashMap<String, Vec<String>>, // 机组 -> 设备ID (插入序)
    pub operators: HashMap<String, Operator>,
    pub qualifications: Vec<Qualification>,          // 插入序即稳定序
    pub day_schedules: HashMap<(String, u32), OperatorDaySchedule>, // (操作工, 周几)
    pub shift_patterns: HashMap<String, ShiftPattern>,
    pub time_off: Vec<TimeOff>,

    // ===== 工单与工序 =====
    pub jobs: HashMap<String, Job>,
    pub operations: HashMap<String, Operation>,
    pub operations_by_job: HashMap<String, Vec<String>>, // 按 sequence_order 升序
    pub dependencies: Vec<JobDependency>,

    // ===== 占用工作集 =====
    // 批次内新落位的占用即时加入，保证后道工序能看到前道的占用
    pub bookings: Vec<Booking>,

    // ===== 客户分层 =====
    pub customer_tiers: HashMap<String, i32>,

    // ===== 已入质检队列的工序 (幂等重入时不再重复入列) =====
    pub inspection_enqueued_ops: HashSet<String>,
}

impl SchedulingContext {
    /// 查询某设备的全部占用（可排除指定 booking_id，挤占模拟用）
    pub fn bookings_for_machine<'a>(
        &'a self,
        machine_id: &'a str,
        excluded: &'a HashSet<String>,
    ) -> impl Iterator<Item = &'a Booking> + 'a {
        self.bookings
            .iter()
            .filter(move |b| b.machine_id == machine_id && !excluded.contains(&b.booking_id))
    }

    /// 查询某操作工的全部占用（可排除指定 booking_id）
    pub fn bookings_for_operator<'a>(
        &'a self,
        operator_id: &'a str,
        excluded: &'a HashSet<String>,
    ) -> impl Iterator<Item = &'a Booking> + 'a {
        self.bookings
            .iter()
            .filter(move |b| b.operator_id == operator_id && !excluded.contains(&b.booking_id))
    }

    /// 查询某工序的全部占用，按分段序号升序
    pub fn bookings_for_operation(&self, operation_id: &str) -> Vec<&Booking> {
        let mut result: Vec<&Booking> = self
            .bookings
            .iter()
            .filter(|b| b.operation_id == operation_id)
            .collect();
        result.sort_by_key(|b| b.chunk_index);
        result
    }

    /// 查询某工单全部占用的最大结束时刻
    ///
    /// # 返回
    /// - `Some(end)`: 该工单至少有一条占用
    /// - `None`: 该工单尚无占用
    pub fn job_last_booking_end(&self, job_id: &str) -> Option<NaiveDateTime> {
        self.bookings
            .iter()
            .filter(|b| b.job_id == job_id)
            .map(|b| b.end_at)
            .max()
    }

    /// 统计操作工当前已排工时 (分钟, 不含已完成)
    pub fn operator_workload_minutes(&self, operator_id: &str) -> i64 {
        self.bookings
            .iter()
            .filter(|b| {
                b.operator_id == operator_id
                    && !matches!(
                        b.status,
                        crate::domain::types::BookingStatus::Completed
                    )
            })
            .map(|b| b.duration_minutes)
            .sum()
    }

    /// 查询工单的工序列表（按 sequence_order 升序）
    pub fn operations_of_job(&self, job_id: &str) -> Vec<&Operation> {
        self.operations_by_job
            .get(job_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.operations.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 查询某工序在工单内的直接前道工序
    pub fn predecessor_of(&self, operation: &Operation) -> Option<&Operation> {
        self.operations_of_job(&operation.job_id)
            .into_iter()
            .filter(|op| op.sequence_order < operation.sequence_order)
            .max_by_key(|op| op.sequence_order)
    }

    /// 查询某工单的前置依赖工单ID列表
    pub fn prerequisite_jobs_of(&self, job_id: &str) -> Vec<&str> {
        self.dependencies
            .iter()
            .filter(|d| d.dependent_job_id == job_id)
            .map(|d| d.prerequisite_job_id.as_str())
            .collect()
    }

    /// 从工作集移除指定占用（挤占生效后调用）
    pub fn remove_bookings(&mut self, booking_ids: &HashSet<String>) {
        self.bookings.retain(|b| !booking_ids.contains(&b.booking_id));
    }

    /// 将新占用并入工作集（落位后调用，后道工序可见）
    pub fn insert_bookings(&mut self, bookings: &[Booking]) {
        self.bookings.extend_from_slice(bookings);
    }
}
