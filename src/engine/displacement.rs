// ==========================================
// 机加工车间排产系统 - 挤占引擎
// ==========================================
// 触发: 时段分配器放不下高优先级工序时
// 规则: 占用方可被挤占当且仅当
//   1) 其工单未锁定 (schedule_locked=false)
//   2) 其占用未锁定且不在进行中/已完成
//   3) 相对优先级差 (req-occ)/occ 超过阈值 (默认15%)
// 挤占顺序: 先挤最低优先级，够用即止
// 失败语义: 挤不出足够容量时一无所动 (fail closed)
// ==========================================
// 级联: 被挤工序及其同单后道工序全部标记待重排、
// 占用删除 —— 先物化受影响集合再统一生效，
// 避免边扫描边删除
// ==========================================

mod timeoff;

pub use timeoff::TimeOffPlan;

use crate::domain::booking::Booking;
use crate::domain::displacement::{
    DisplacedOperation, DisplacementImpact, DisplacementRecord,
};
use crate::domain::types::{DisplacementOutcome, JobStatus, RoutingStatus};
use crate::engine::context::SchedulingContext;
use crate::engine::matcher::CandidatePair;
use crate::engine::slot_allocator::{PlannedAllocation, SlotAllocator};
use chrono::{Duration, NaiveDateTime};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info};
use uuid::Uuid;

// ==========================================
// DisplacementPlan - 挤占方案
// ==========================================
// 全部动作先攒在方案里，由编排器并入批次事务
#[derive(Debug, Clone)]
pub struct DisplacementPlan {
    pub allocation: PlannedAllocation,          // 挤出空间后的落位方案
    pub evicted_booking_ids: Vec<String>,       // 直接被挤占的占用
    pub evicted_operation_ids: Vec<String>,     // 直接被挤占的工序 (去重)
    pub booking_ids_to_delete: Vec<String>,     // 全部待删除占用 (含级联)
    pub routing_updates: Vec<(String, RoutingStatus)>, // 待重排标记
    pub job_status_updates: Vec<(String, JobStatus)>,  // 被挤工单回退待排产
    pub details: Vec<DisplacedOperation>,       // 审计明细 (挤占前时序)
    pub affected_bookings: Vec<Booking>,        // 撤销台账快照源
}

impl DisplacementPlan {
    /// 直接被挤占的工序数
    pub fn displaced_count(&self) -> i32 {
        self.evicted_operation_ids.len() as i32
    }

    /// 级联标记待重排的工序数 (含直接被挤占)
    pub fn rescheduled_count(&self) -> i32 {
        self.routing_updates.len() as i32
    }
}

// ==========================================
// DisplacementEngine - 挤占引擎
// ==========================================
pub struct DisplacementEngine {
    allocator: SlotAllocator,
}

impl DisplacementEngine {
    /// 构造函数
    pub fn new() -> Self {
        Self {
            allocator: SlotAllocator::new(),
        }
    }

    // ==========================================
    // 核心方法
    // ==========================================

    /// 尝试为放不下的工序挤出空间
    ///
    /// 按候选序逐对尝试：将该对上可挤占的冲突按占用方
    /// 优先级升序排列，从最低的开始逐个加入排除集重试
    /// 落位，成功即止 —— 只挤真正与落位时段冲突的占用。
    ///
    /// # 参数
    /// - `nominal_minutes`: 工序标准工时
    /// - `earliest_start`: 最早可行时刻
    /// - `candidates`: 候选 (设备, 操作工) 对
    /// - `requesting_priority`: 请求方工单评分
    /// - `ctx`: 排产上下文
    ///
    /// # 返回
    /// - `Ok(plan)`: 挤占方案 (尚未生效)
    /// - `Err(blocking)`: 不可行，附阻塞占用列表
    pub fn try_displace(
        &self,
        nominal_minutes: i64,
        earliest_start: NaiveDateTime,
        candidates: &[CandidatePair],
        requesting_priority: i32,
        ctx: &SchedulingContext,
    ) -> Result<DisplacementPlan, Vec<String>> {
        let threshold = ctx.config.displacement_threshold;
        let mut blocking_ids: BTreeSet<String> = BTreeSet::new();

        for candidate in candidates {
            let horizon_end = earliest_start.date()
                + Duration::days(ctx.config.search_horizon_days);
            let window_start = earliest_start;
            let window_end = match horizon_end.succ_opt() {
                Some(d) => d.and_hms_opt(0, 0, 0).unwrap_or(earliest_start),
                None => earliest_start,
            };

            // 该候选对上的全部冲突占用
            let conflicts: Vec<&Booking> = ctx
                .bookings
                .iter()
                .filter(|b| {
                    (b.machine_id == candidate.machine_id
                        || b.operator_id == candidate.operator_id)
                        && b.overlaps(window_start, window_end)
                })
                .collect();

            let mut evictable: Vec<&Booking> = Vec::new();
            for booking in conflicts {
                if self.is_evictable(booking, requesting_priority, threshold, ctx) {
                    evictable.push(booking);
                } else {
                    blocking_ids.insert(booking.booking_id.clone());
                }
            }

            // 先挤最低优先级: 按占用方评分升序, 同分按开始时间
            evictable.sort_by(|a, b| {
                let pa = ctx.jobs.get(&a.job_id).map(|j| j.priority_score).unwrap_or(0);
                let pb = ctx.jobs.get(&b.job_id).map(|j| j.priority_score).unwrap_or(0);
                pa.cmp(&pb).then(a.start_at.cmp(&b.start_at))
            });

            for k in 1..=evictable.len() {
                let excluded: HashSet<String> = evictable[..k]
                    .iter()
                    .map(|b| b.booking_id.clone())
                    .collect();

                let allocation = match self.allocator.allocate(
                    nominal_minutes,
                    earliest_start,
                    std::slice::from_ref(candidate),
                    ctx,
                    &excluded,
                ) {
                    Some(a) => a,
                    None => continue,
                };

                // 只挤真正与落位时段重叠的占用；
                // 未重叠的排除项放回去也不会冲突
                let evicted: Vec<&Booking> = evictable[..k]
                    .iter()
                    .filter(|b| {
                        allocation
                            .segments
                            .iter()
                            .any(|seg| b.overlaps(seg.start, seg.end))
                    })
                    .copied()
                    .collect();

                info!(
                    machine_id = %candidate.machine_id,
                    operator_id = %candidate.operator_id,
                    evicted = evicted.len(),
                    requesting_priority,
                    "挤占可行, 生成挤占方案"
                );

                return Ok(self.build_plan(allocation, &evicted, ctx));
            }
        }

        debug!(
            requesting_priority,
            blocking = blocking_ids.len(),
            "挤占不可行, 保持现状"
        );
        Err(blocking_ids.into_iter().collect())
    }

    /// 评估占用是否可被挤占
    fn is_evictable(
        &self,
        booking: &Booking,
        requesting_priority: i32,
        threshold: f64,
        ctx: &SchedulingContext,
    ) -> bool {
        if !booking.is_displacement_candidate() {
            return false;
        }

        // 工单级锁定免挤占; 找不到工单按不可挤处理
        let job = match ctx.jobs.get(&booking.job_id) {
            Some(j) => j,
            None => return false,
        };
        if job.schedule_locked {
            return false;
        }

        Self::priority_gap_exceeds(requesting_priority, job.priority_score, threshold)
    }

    /// 相对优先级差判定: (req - occ) / occ > threshold
    ///
    /// 占用方评分不为正时视为无穷差距 (只要请求方更高)
    pub fn priority_gap_exceeds(requesting: i32, occupying: i32, threshold: f64) -> bool {
        if occupying <= 0 {
            return requesting > occupying;
        }
        ((requesting - occupying) as f64) / (occupying as f64) > threshold
    }

    // ==========================================
    // 方案构建
    // ==========================================

    /// 由被挤占用构建完整方案 (含级联)
    fn build_plan(
        &self,
        allocation: PlannedAllocation,
        evicted: &[&Booking],
        ctx: &SchedulingContext,
    ) -> DisplacementPlan {
        let evicted_booking_ids: Vec<String> =
            evicted.iter().map(|b| b.booking_id.clone()).collect();

        // 被挤工序去重 (一个工序可能有多个分段被挤)
        let mut evicted_operation_ids: Vec<String> = Vec::new();
        for booking in evicted {
            if !evicted_operation_ids.contains(&booking.operation_id) {
                evicted_operation_ids.push(booking.operation_id.clone());
            }
        }

        let (booking_ids_to_delete, routing_updates, job_status_updates, affected_bookings) =
            self.build_cascade(&evicted_operation_ids, ctx);

        // 审计明细: 每个被挤工序的挤占前时序
        let mut details = Vec::new();
        for op_id in &evicted_operation_ids {
            let op_bookings = ctx.bookings_for_operation(op_id);
            let first = op_bookings.first();
            details.push(DisplacedOperation {
                operation_id: op_id.clone(),
                job_id: first.map(|b| b.job_id.clone()).unwrap_or_default(),
                machine_id: first.map(|b| b.machine_id.clone()),
                operator_id: first.map(|b| b.operator_id.clone()),
                before_start_at: op_bookings.iter().map(|b| b.start_at).min(),
                before_end_at: op_bookings.iter().map(|b| b.end_at).max(),
                after_start_at: None,
                after_end_at: None,
            });
        }

        DisplacementPlan {
            allocation,
            evicted_booking_ids,
            evicted_operation_ids,
            booking_ids_to_delete,
            routing_updates,
            job_status_updates,
            details,
            affected_bookings,
        }
    }

    /// 级联构建: 被挤工序 + 同单后道工序
    ///
    /// 返回 (待删占用, 待重排标记, 工单状态回退, 撤销快照源)。
    /// 受影响集合先物化再输出，调用方据此一次性生效。
    fn build_cascade(
        &self,
        evicted_operation_ids: &[String],
        ctx: &SchedulingContext,
    ) -> (
        Vec<String>,
        Vec<(String, RoutingStatus)>,
        Vec<(String, JobStatus)>,
        Vec<Booking>,
    ) {
        let mut booking_ids: Vec<String> = Vec::new();
        let mut routing_updates: Vec<(String, RoutingStatus)> = Vec::new();
        let mut job_ids: Vec<String> = Vec::new();
        let mut affected: Vec<Booking> = Vec::new();
        let mut marked_ops: HashSet<String> = HashSet::new();

        for op_id in evicted_operation_ids {
            let operation = match ctx.operations.get(op_id) {
                Some(op) => op,
                None => continue,
            };

            if !job_ids.contains(&operation.job_id) {
                job_ids.push(operation.job_id.clone());
            }

            // 被挤工序本身: 全部分段删除 + 待重排
            if marked_ops.insert(op_id.clone()) {
                routing_updates.push((op_id.clone(), RoutingStatus::NeedsRescheduling));
            }
            for booking in ctx.bookings_for_operation(op_id) {
                if !booking_ids.contains(&booking.booking_id) {
                    booking_ids.push(booking.booking_id.clone());
                    affected.push((*booking).clone());
                }
            }

            // 同单后道工序: 上游时序已失效，一并级联
            for later in ctx
                .operations_of_job(&operation.job_id)
                .into_iter()
                .filter(|op| op.sequence_order > operation.sequence_order)
            {
                if later.routing_status == RoutingStatus::Completed {
                    continue;
                }
                if marked_ops.insert(later.operation_id.clone()) {
                    routing_updates
                        .push((later.operation_id.clone(), RoutingStatus::NeedsRescheduling));
                }
                for booking in ctx.bookings_for_operation(&later.operation_id) {
                    if !booking_ids.contains(&booking.booking_id) {
                        booking_ids.push(booking.booking_id.clone());
                        affected.push((*booking).clone());
                    }
                }
            }
        }

        // 被挤工单回退待排产，等待下一轮批量排产
        let job_status_updates = job_ids
            .into_iter()
            .filter(|id| {
                ctx.jobs
                    .get(id)
                    .map(|j| j.status == JobStatus::Scheduled)
                    .unwrap_or(false)
            })
            .map(|id| (id, JobStatus::Pending))
            .collect();

        (booking_ids, routing_updates, job_status_updates, affected)
    }

    // ==========================================
    // 审计记录
    // ==========================================

    /// 构建挤占审计记录
    ///
    /// # 参数
    /// - `trigger_job_id`: 触发工单
    /// - `outcome`: 结果
    /// - `plan`: 挤占方案 (失败时传 None)
    /// - `execution_ms`: 执行耗时
    pub fn build_record(
        &self,
        trigger_job_id: &str,
        outcome: DisplacementOutcome,
        plan: Option<&DisplacementPlan>,
        execution_ms: i64,
        ctx: &SchedulingContext,
    ) -> DisplacementRecord {
        let (displaced_count, rescheduled_count, details, affected) = match plan {
            Some(p) => (
                p.displaced_count(),
                p.rescheduled_count(),
                p.details.clone(),
                p.affected_bookings.as_slice(),
            ),
            None => (0, 0, Vec::new(), &[] as &[Booking]),
        };

        let impact = self.build_impact(&details, affected, ctx);

        DisplacementRecord {
            record_id: Uuid::new_v4().to_string(),
            trigger_job_id: trigger_job_id.to_string(),
            outcome,
            displaced_count,
            rescheduled_count,
            impact,
            execution_ms,
            details,
            created_at: ctx.now,
        }
    }

    /// 影响汇总: 去重客户/设备, 总被挤工时, 平均延迟
    ///
    /// 被挤工时按占用时长求和, 不能用前后时刻差
    /// (跨天分段中间隔着下班时间)
    fn build_impact(
        &self,
        details: &[DisplacedOperation],
        affected: &[Booking],
        ctx: &SchedulingContext,
    ) -> DisplacementImpact {
        let mut customers: BTreeSet<String> = BTreeSet::new();
        let mut machines: BTreeSet<String> = BTreeSet::new();
        let mut delays: Vec<i64> = Vec::new();

        let total_minutes: i64 = affected.iter().map(|b| b.duration_minutes.max(0)).sum();

        for detail in details {
            if let Some(job) = ctx.jobs.get(&detail.job_id) {
                customers.insert(job.customer_id.clone());
            }
            if let Some(machine_id) = &detail.machine_id {
                machines.insert(machine_id.clone());
            }
            if let (Some(before), Some(after)) = (detail.before_start_at, detail.after_start_at) {
                delays.push((after - before).num_minutes());
            }
        }

        let avg_delay_minutes = if delays.is_empty() {
            0.0
        } else {
            delays.iter().sum::<i64>() as f64 / delays.len() as f64
        };

        DisplacementImpact {
            affected_customers: customers.len() as i32,
            affected_machines: machines.len() as i32,
            total_hours_displaced: total_minutes as f64 / 60.0,
            avg_delay_minutes,
        }
    }
}

// ==========================================
// Default trait 实现
// ==========================================
impl Default for DisplacementEngine {
    fn default() -> Self {
        Self::new()
    }
}
