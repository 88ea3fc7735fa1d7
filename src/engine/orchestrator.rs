// ==========================================
// 机加工车间排产系统 - 排产编排器
// ==========================================
// 用途: 协调评分/日历/匹配/分配/挤占/台账引擎的执行顺序
// ==========================================
// 批次语义 (红线):
// - 一次批次 = 排一张工单 (或一次请假改排)
// - 引擎全程在内存快照上计算, 动作攒进清单,
//   提交时单事务落库: 要么全生效, 要么一无所动
// - 批量排产拆成多个独立提交的单工单批次,
//   中途崩溃只会"不完整", 不会"不一致"
// ==========================================

use crate::config::{ConfigManager, SchedulerConfigSource};
use crate::domain::booking::Booking;
use crate::domain::events::{AlertEvent, InspectionTicket};
use crate::domain::job::Operation;
use crate::domain::types::{
    AlertSeverity, AlertType, BookingMethod, BookingStatus, DisplacementOutcome, InspectionStatus,
    JobStatus, RoutingStatus,
};
use crate::engine::context::SchedulingContext;
use crate::engine::dependency::{DependencyResolver, EarliestStart};
use crate::engine::displacement::DisplacementEngine;
use crate::engine::error::{ScheduleError, ScheduleResult};
use crate::engine::events::{AlertSink, InspectionSink, NoOpAlertSink, NoOpInspectionSink};
use crate::engine::matcher::ResourceMatcher;
use crate::engine::priority::PriorityScorer;
use crate::engine::repositories::ScheduleRepositories;
use crate::engine::slot_allocator::{PlannedAllocation, SlotAllocator};
use crate::engine::undo_ledger::UndoLedger;
use crate::repository::pass_repo::{JobPriorityUpdate, PassMutations};
use crate::repository::RepositoryError;
use chrono::NaiveDateTime;
use rusqlite::Connection;
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

// ==========================================
// PassOutcome - 单工单批次结果
// ==========================================
#[derive(Debug, Clone)]
pub struct PassOutcome {
    pub job_id: String,             // 目标工单
    pub priority_score: i32,        // 本批次刷新后的评分
    pub scheduled_operations: i32,  // 落位工序数
    pub bookings_created: i32,      // 生成占用数 (分段各计一条)
    pub inspection_enqueued: i32,   // 转质检队列工序数
    pub displaced_operations: i32,  // 挤占掉的工序数
    pub displacement_triggered: bool, // 是否触发过挤占
    pub elapsed_ms: i64,            // 批次耗时
}

// ==========================================
// BulkOutcome - 批量排产结果
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct BulkOutcome {
    pub attempted: i32,                  // 尝试工单数
    pub scheduled: i32,                  // 成功工单数
    pub failures: Vec<(String, String)>, // (工单, 失败原因) 非致命失败清单
}

// ==========================================
// TimeOffOutcome - 请假改排结果
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct TimeOffOutcome {
    pub shifted: i32,      // 顺延占用数
    pub substituted: i32,  // 替补成功数
    pub evicted: i32,      // 删除重排数
    pub alerts_raised: i32,// 上报告警数
}

// ==========================================
// ScheduleOrchestrator - 排产编排器
// ==========================================
pub struct ScheduleOrchestrator {
    repos: ScheduleRepositories,
    config_source: Arc<dyn SchedulerConfigSource>,
    scorer: PriorityScorer,
    matcher: ResourceMatcher,
    allocator: SlotAllocator,
    dependency: DependencyResolver,
    displacement: DisplacementEngine,
    ledger: UndoLedger,
    alert_sink: Arc<dyn AlertSink>,
    inspection_sink: Arc<dyn InspectionSink>,
}

impl ScheduleOrchestrator {
    /// 从共享连接创建编排器
    ///
    /// # 参数
    /// - conn: 共享数据库连接 (与嵌入方同库)
    pub fn new(conn: Arc<Mutex<Connection>>) -> ScheduleResult<Self> {
        let config_manager = ConfigManager::from_connection(conn.clone())
            .map_err(|e| ScheduleError::Other(anyhow::anyhow!("创建配置管理器失败: {}", e)))?;

        Ok(Self {
            repos: ScheduleRepositories::new(conn),
            config_source: Arc::new(config_manager),
            scorer: PriorityScorer::new(),
            matcher: ResourceMatcher::new(),
            allocator: SlotAllocator::new(),
            dependency: DependencyResolver::new(),
            displacement: DisplacementEngine::new(),
            ledger: UndoLedger::new(),
            alert_sink: Arc::new(NoOpAlertSink),
            inspection_sink: Arc::new(NoOpInspectionSink),
        })
    }

    /// 替换参数来源 (测试注入用)
    pub fn with_config_source(mut self, source: Arc<dyn SchedulerConfigSource>) -> Self {
        self.config_source = source;
        self
    }

    /// 接入告警出口
    pub fn with_alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.alert_sink = sink;
        self
    }

    /// 接入质检队列出口
    pub fn with_inspection_sink(mut self, sink: Arc<dyn InspectionSink>) -> Self {
        self.inspection_sink = sink;
        self
    }

    // ==========================================
    // 同步入口 (嵌入方用; 内部复用异步实现)
    // ==========================================

    /// 排一张工单 (单批次, 原子提交)
    pub fn schedule_job(&self, job_id: &str, now: NaiveDateTime) -> ScheduleResult<PassOutcome> {
        self.block_on(self.schedule_job_async(job_id, now))
    }

    /// 按优先级批量排产全部待排工单
    pub fn schedule_all_pending(&self, now: NaiveDateTime) -> ScheduleResult<BulkOutcome> {
        self.block_on(self.schedule_all_pending_async(now))
    }

    /// 请假触发的改排
    pub fn handle_time_off(
        &self,
        time_off_id: &str,
        now: NaiveDateTime,
    ) -> ScheduleResult<TimeOffOutcome> {
        self.block_on(self.handle_time_off_async(time_off_id, now))
    }

    /// 查询: 该工单现在能排吗
    pub fn can_schedule_now(
        &self,
        job_id: &str,
        now: NaiveDateTime,
    ) -> ScheduleResult<(bool, Vec<String>)> {
        self.block_on(self.can_schedule_now_async(job_id, now))
    }

    /// 查询: 该工单的最早合法开工时刻
    pub fn earliest_legal_start(
        &self,
        job_id: &str,
        now: NaiveDateTime,
    ) -> ScheduleResult<Option<NaiveDateTime>> {
        self.block_on(self.earliest_legal_start_async(job_id, now))
    }

    /// 重算并写回工单评分 (创建/相关字段变更时由接入方触发)
    pub fn recompute_priority(&self, job_id: &str, now: NaiveDateTime) -> ScheduleResult<i32> {
        self.block_on(self.recompute_priority_async(job_id, now))
    }

    /// 检查是否已在 tokio 运行时中, 选择合适的执行方式
    fn block_on<F, T>(&self, fut: F) -> ScheduleResult<T>
    where
        F: Future<Output = ScheduleResult<T>>,
    {
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            // 已经在运行时中，使用 block_in_place 来运行异步代码
            tokio::task::block_in_place(|| handle.block_on(fut))
        } else {
            // 不在运行时中，创建新的运行时
            let rt = tokio::runtime::Runtime::new()
                .map_err(|e| ScheduleError::Other(anyhow::anyhow!(e)))?;
            rt.block_on(fut)
        }
    }

    // ==========================================
    // 单工单批次
    // ==========================================

    /// 异步排一张工单
    pub async fn schedule_job_async(
        &self,
        job_id: &str,
        now: NaiveDateTime,
    ) -> ScheduleResult<PassOutcome> {
        self.schedule_pass(job_id, now, false).await
    }

    /// 批次核心流程
    ///
    /// dry_run=true 时完整走一遍计算但不提交 (查询口复用)
    async fn schedule_pass(
        &self,
        job_id: &str,
        now: NaiveDateTime,
        dry_run: bool,
    ) -> ScheduleResult<PassOutcome> {
        let started = Instant::now();
        let mut ctx = self.load_context(Some(job_id), now).await?;

        let job = ctx
            .jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| ScheduleError::NotFound {
                entity: "Job".to_string(),
                id: job_id.to_string(),
            })?;

        if job.is_terminal() {
            return Err(ScheduleError::Other(anyhow::anyhow!(
                "工单 {} 已处于终态 ({}), 不可排产",
                job_id,
                job.status
            )));
        }

        info!(
            job_id = %job_id,
            status = %job.status,
            dry_run,
            "开始执行排产批次"
        );

        let mut mutations = PassMutations::new();
        let mut outcome = PassOutcome {
            job_id: job_id.to_string(),
            priority_score: 0,
            scheduled_operations: 0,
            bookings_created: 0,
            inspection_enqueued: 0,
            displaced_operations: 0,
            displacement_triggered: false,
            elapsed_ms: 0,
        };

        // ==========================================
        // 步骤1: 刷新优先级评分
        // ==========================================
        debug!("步骤1: 刷新优先级评分");
        let final_score = self.refresh_priority(&job, &mut ctx, &mut mutations);
        outcome.priority_score = final_score;

        // ==========================================
        // 步骤2: 按工序序号逐道落位
        // ==========================================
        let operations: Vec<Operation> = ctx
            .operations_of_job(job_id)
            .into_iter()
            .cloned()
            .collect();

        for operation in &operations {
            if operation.routing_status == RoutingStatus::Completed {
                continue;
            }
            if !ctx.bookings_for_operation(&operation.operation_id).is_empty() {
                // 已有占用的工序保持不动 (幂等重入)
                continue;
            }

            // 步骤2a: 依赖解析
            let earliest = match self.dependency.earliest_start(operation, &ctx) {
                EarliestStart::At(t) => t,
                EarliestStart::Blocked { blocking_jobs } => {
                    debug!(job_id = %job_id, ?blocking_jobs, "依赖未就绪, 批次终止");
                    return Err(ScheduleError::Blocked {
                        job_id: job_id.to_string(),
                        blocking_jobs,
                    });
                }
            };

            // 步骤2b: 零工时质检 => 转质检队列, 不占设备工时
            if operation.inspection_flag {
                // 幂等重入: 已入列的工序不再重复入列
                if !ctx.inspection_enqueued_ops.contains(&operation.operation_id) {
                    mutations.inspection_tickets.push(InspectionTicket {
                        ticket_id: Uuid::new_v4().to_string(),
                        job_id: job_id.to_string(),
                        operation_id: operation.operation_id.clone(),
                        priority_score: final_score,
                        status: InspectionStatus::Awaiting,
                        enqueued_at: ctx.now,
                    });
                    outcome.inspection_enqueued += 1;
                }
                if operation.routing_status == RoutingStatus::NeedsRescheduling {
                    mutations
                        .routing_updates
                        .push((operation.operation_id.clone(), RoutingStatus::Pending));
                }
                continue;
            }

            // 步骤2c: 外协 => 不占设备工时, 只校验发出期限
            if operation.outsourced_flag {
                if let Some(risk) = self.dependency.check_outsourcing_risk(operation, earliest, &ctx)
                {
                    mutations.alerts.push(AlertEvent {
                        alert_id: Uuid::new_v4().to_string(),
                        severity: AlertSeverity::Warning,
                        alert_type: AlertType::OutsourcingAtRisk,
                        message: format!(
                            "工单 {} 外协工序 {} 发出期限 {} 赶不上 (前道 {} 结束)",
                            risk.job_id,
                            risk.operation_id,
                            risk.send_out_deadline,
                            risk.predecessor_end
                        ),
                        job_id: Some(job_id.to_string()),
                        created_at: ctx.now,
                    });
                }
                if operation.routing_status == RoutingStatus::NeedsRescheduling {
                    mutations
                        .routing_updates
                        .push((operation.operation_id.clone(), RoutingStatus::Pending));
                }
                continue;
            }

            // 步骤2d: 资源匹配
            let candidates = self.matcher.candidates(operation, &ctx);
            if candidates.is_empty() {
                debug!(
                    operation_id = %operation.operation_id,
                    "无合格资源组合, 按无产能处理"
                );
                self.raise_locked_job_alert(&job, ctx.now, dry_run);
                return Err(ScheduleError::NoCapacity {
                    job_id: job_id.to_string(),
                    operation_id: operation.operation_id.clone(),
                    horizon_days: ctx.config.search_horizon_days,
                });
            }

            // 步骤2e: 时段分配, 失败则尝试挤占
            let (allocation, displaced_from) = match self.allocator.allocate(
                operation.estimated_minutes,
                earliest,
                &candidates,
                &ctx,
                &HashSet::new(),
            ) {
                Some(a) => (a, None),
                None => {
                    let (allocation, affected) = self.displace_and_retry(
                        operation,
                        earliest,
                        &candidates,
                        final_score,
                        &job,
                        &mut ctx,
                        &mut mutations,
                        &mut outcome,
                        dry_run,
                    )?;
                    (allocation, Some(affected))
                }
            };

            // 步骤2f: 生成占用并并入工作集
            let new_bookings = self.bookings_from_allocation(operation, &allocation, &ctx);

            // 挤占生效前快照 (含本次新建占用的ID, 回退时一并删除)
            if let Some(affected) = displaced_from {
                let created_ids: Vec<String> =
                    new_bookings.iter().map(|b| b.booking_id.clone()).collect();
                mutations.undo_entries.push(self.ledger.build_entry(
                    "DISPLACEMENT",
                    Some(job_id),
                    &affected,
                    &created_ids,
                    &ctx,
                ));
            }

            outcome.bookings_created += new_bookings.len() as i32;
            outcome.scheduled_operations += 1;
            ctx.insert_bookings(&new_bookings);
            mutations.bookings_to_insert.extend(new_bookings);

            if operation.routing_status == RoutingStatus::NeedsRescheduling {
                mutations
                    .routing_updates
                    .push((operation.operation_id.clone(), RoutingStatus::Pending));
            }
        }

        // ==========================================
        // 步骤3: 工单转已排产, 原子提交
        // ==========================================
        // 生产中的工单补排后道时保持状态不动
        if job.status != JobStatus::InProgress {
            mutations
                .job_status_updates
                .push((job_id.to_string(), JobStatus::Scheduled));
        }

        if !dry_run {
            self.repos.pass.apply(&mutations).map_err(|e| match e {
                RepositoryError::BusinessRuleViolation(msg) => {
                    error!(job_id = %job_id, %msg, "提交校验失败, 批次中止");
                    ScheduleError::InvariantViolation(msg)
                }
                other => ScheduleError::Repository(other),
            })?;

            // 提交成功后外发
            for alert in &mutations.alerts {
                self.alert_sink.publish(alert);
            }
            for ticket in &mutations.inspection_tickets {
                self.inspection_sink.enqueue(ticket);
            }
        }

        outcome.elapsed_ms = started.elapsed().as_millis() as i64;
        info!(
            job_id = %job_id,
            scheduled = outcome.scheduled_operations,
            bookings = outcome.bookings_created,
            displaced = outcome.displaced_operations,
            elapsed_ms = outcome.elapsed_ms,
            "排产批次完成"
        );

        Ok(outcome)
    }

    /// 挤占并重取落位方案
    #[allow(clippy::too_many_arguments)]
    fn displace_and_retry(
        &self,
        operation: &Operation,
        earliest: NaiveDateTime,
        candidates: &[crate::engine::matcher::CandidatePair],
        requesting_priority: i32,
        job: &crate::domain::job::Job,
        ctx: &mut SchedulingContext,
        mutations: &mut PassMutations,
        outcome: &mut PassOutcome,
        dry_run: bool,
    ) -> ScheduleResult<(PlannedAllocation, Vec<Booking>)> {
        let displacement_started = Instant::now();

        match self.displacement.try_displace(
            operation.estimated_minutes,
            earliest,
            candidates,
            requesting_priority,
            ctx,
        ) {
            Ok(plan) => {
                outcome.displacement_triggered = true;
                outcome.displaced_operations += plan.displaced_count();

                // 高优先级被挤: 上报
                for detail in &plan.details {
                    if let Some(victim) = ctx.jobs.get(&detail.job_id) {
                        if victim.priority_score >= ctx.config.high_priority_alert_threshold {
                            mutations.alerts.push(AlertEvent {
                                alert_id: Uuid::new_v4().to_string(),
                                severity: AlertSeverity::Critical,
                                alert_type: AlertType::HighPriorityDisplaced,
                                message: format!(
                                    "高优先级工单 {} (评分 {}) 被工单 {} 挤占",
                                    victim.job_id, victim.priority_score, job.job_id
                                ),
                                job_id: Some(victim.job_id.clone()),
                                created_at: ctx.now,
                            });
                        }
                    }
                }

                let record = self.displacement.build_record(
                    &job.job_id,
                    DisplacementOutcome::Success,
                    Some(&plan),
                    displacement_started.elapsed().as_millis() as i64,
                    ctx,
                );
                mutations.displacement_records.push(record);

                mutations
                    .booking_ids_to_delete
                    .extend(plan.booking_ids_to_delete.iter().cloned());
                mutations.routing_updates.extend(plan.routing_updates.clone());
                mutations
                    .job_status_updates
                    .extend(plan.job_status_updates.clone());

                let removed: HashSet<String> =
                    plan.booking_ids_to_delete.iter().cloned().collect();
                ctx.remove_bookings(&removed);

                Ok((plan.allocation, plan.affected_bookings))
            }
            Err(blocking) => {
                // 挤占不可行: 批次一无所动; 审计在批次之外落库
                let record = self.displacement.build_record(
                    &job.job_id,
                    DisplacementOutcome::Infeasible,
                    None,
                    displacement_started.elapsed().as_millis() as i64,
                    ctx,
                );
                if !dry_run {
                    if let Err(e) = self.repos.displacement.append(&record) {
                        warn!(job_id = %job.job_id, error = %e, "挤占失败审计落库失败");
                    }
                }
                self.raise_locked_job_alert(job, ctx.now, dry_run);

                Err(ScheduleError::DisplacementInfeasible {
                    job_id: job.job_id.clone(),
                    operation_id: operation.operation_id.clone(),
                    blocking_booking_ids: blocking,
                })
            }
        }
    }

    /// 锁定工单排不进去: 必须上报而非静默失败
    fn raise_locked_job_alert(&self, job: &crate::domain::job::Job, now: NaiveDateTime, dry_run: bool) {
        if !job.schedule_locked || dry_run {
            return;
        }

        let alert = AlertEvent {
            alert_id: Uuid::new_v4().to_string(),
            severity: AlertSeverity::Critical,
            alert_type: AlertType::LockedJobBlocked,
            message: format!("锁定工单 {} 无法落位, 需人工处理", job.job_id),
            job_id: Some(job.job_id.clone()),
            created_at: now,
        };
        if let Err(e) = self.repos.alerts.append(&alert) {
            warn!(job_id = %job.job_id, error = %e, "锁定工单告警落库失败");
        }
        self.alert_sink.publish(&alert);
    }

    /// 刷新目标工单评分 (含装配子件继承抬升)
    fn refresh_priority(
        &self,
        job: &crate::domain::job::Job,
        ctx: &mut SchedulingContext,
        mutations: &mut PassMutations,
    ) -> i32 {
        let tier = ctx
            .customer_tiers
            .get(&job.customer_id)
            .copied()
            .unwrap_or(0);
        let operations: Vec<Operation> = ctx
            .operations_of_job(&job.job_id)
            .into_iter()
            .cloned()
            .collect();

        let breakdown = self
            .scorer
            .score(job, &operations, tier, ctx.today, &ctx.config);
        let mut final_score = breakdown.total;

        // 子件继承: 抬到父单评分+50, 只升不降
        if job.is_assembly_component() {
            if let Some(parent_id) = &job.parent_job_id {
                if let Some(parent) = ctx.jobs.get(parent_id) {
                    let parent_tier = ctx
                        .customer_tiers
                        .get(&parent.customer_id)
                        .copied()
                        .unwrap_or(0);
                    let parent_ops: Vec<Operation> = ctx
                        .operations_of_job(parent_id)
                        .into_iter()
                        .cloned()
                        .collect();
                    let parent_score = self
                        .scorer
                        .score(parent, &parent_ops, parent_tier, ctx.today, &ctx.config)
                        .total;
                    final_score = self.scorer.inherit_from_parent(final_score, parent_score);
                }
            }
        }

        mutations.job_priority_updates.push(JobPriorityUpdate {
            job_id: job.job_id.clone(),
            score: final_score,
            reason: breakdown.reason_json(),
            expedite_flag: job.expedite_flag || breakdown.expedite_derived,
        });

        // 工作集同步刷新, 挤占判定用最新评分
        if let Some(entry) = ctx.jobs.get_mut(&job.job_id) {
            entry.priority_score = final_score;
            entry.expedite_flag = entry.expedite_flag || breakdown.expedite_derived;
        }

        final_score
    }

    /// 把落位方案展开成占用 (分段各一条, chunk_index 递增)
    fn bookings_from_allocation(
        &self,
        operation: &Operation,
        allocation: &PlannedAllocation,
        ctx: &SchedulingContext,
    ) -> Vec<Booking> {
        allocation
            .segments
            .iter()
            .enumerate()
            .map(|(index, segment)| Booking {
                booking_id: Uuid::new_v4().to_string(),
                operation_id: operation.operation_id.clone(),
                job_id: operation.job_id.clone(),
                machine_id: allocation.machine_id.clone(),
                operator_id: allocation.operator_id.clone(),
                start_at: segment.start,
                end_at: segment.end,
                duration_minutes: segment.minutes,
                chunk_index: index as i32,
                status: BookingStatus::Scheduled,
                locked: false,
                method: BookingMethod::Auto,
                revision: 0,
                created_at: ctx.now,
                updated_at: ctx.now,
            })
            .collect()
    }

    // ==========================================
    // 批量排产
    // ==========================================

    /// 按优先级降序逐单排产; 每单独立提交,
    /// 非致命失败记入清单继续, 致命错误立即上抛
    pub async fn schedule_all_pending_async(
        &self,
        now: NaiveDateTime,
    ) -> ScheduleResult<BulkOutcome> {
        let pending = self.repos.jobs.find_pending_ordered()?;
        let mut outcome = BulkOutcome::default();

        info!(pending = pending.len(), "开始批量排产");

        for job in pending {
            outcome.attempted += 1;
            match self.schedule_pass(&job.job_id, now, false).await {
                Ok(_) => outcome.scheduled += 1,
                Err(e) if e.is_non_fatal() => {
                    debug!(job_id = %job.job_id, error = %e, "工单暂不可排, 跳过");
                    outcome.failures.push((job.job_id.clone(), e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            attempted = outcome.attempted,
            scheduled = outcome.scheduled,
            failed = outcome.failures.len(),
            "批量排产完成"
        );

        Ok(outcome)
    }

    // ==========================================
    // 请假改排
    // ==========================================

    /// 异步处理一条新请假
    pub async fn handle_time_off_async(
        &self,
        time_off_id: &str,
        now: NaiveDateTime,
    ) -> ScheduleResult<TimeOffOutcome> {
        let record = self
            .repos
            .time_off
            .find_by_id(time_off_id)?
            .ok_or_else(|| ScheduleError::NotFound {
                entity: "TimeOff".to_string(),
                id: time_off_id.to_string(),
            })?;

        if !record.approved {
            return Err(ScheduleError::Other(anyhow::anyhow!(
                "请假 {} 未审批, 不触发改排",
                time_off_id
            )));
        }

        let ctx = self.load_context(None, now).await?;
        let plan = self.displacement.handle_time_off(&record, &ctx);

        let mut mutations = PassMutations::new();
        if !plan.affected_bookings.is_empty() {
            let created_ids: Vec<String> = plan
                .bookings_to_insert
                .iter()
                .map(|b| b.booking_id.clone())
                .collect();
            mutations.undo_entries.push(self.ledger.build_entry(
                "TIME_OFF",
                None,
                &plan.affected_bookings,
                &created_ids,
                &ctx,
            ));
        }

        let outcome = TimeOffOutcome {
            shifted: plan.shifted_count,
            substituted: plan.substituted_count,
            evicted: plan.evicted_count,
            alerts_raised: plan.alerts.len() as i32,
        };

        mutations.booking_moves = plan.booking_moves;
        mutations.booking_ids_to_delete = plan.booking_ids_to_delete;
        mutations.bookings_to_insert = plan.bookings_to_insert;
        mutations.routing_updates = plan.routing_updates;
        mutations.job_status_updates = plan.job_status_updates;
        mutations.alerts = plan.alerts;

        self.repos.pass.apply(&mutations).map_err(|e| match e {
            RepositoryError::BusinessRuleViolation(msg) => ScheduleError::InvariantViolation(msg),
            other => ScheduleError::Repository(other),
        })?;

        for alert in &mutations.alerts {
            self.alert_sink.publish(alert);
        }

        info!(
            time_off_id = %time_off_id,
            shifted = outcome.shifted,
            substituted = outcome.substituted,
            evicted = outcome.evicted,
            "请假改排完成"
        );

        Ok(outcome)
    }

    // ==========================================
    // 查询操作 (不提交)
    // ==========================================

    /// 该工单现在能排吗
    ///
    /// # 返回
    /// (能否, 阻塞工单列表)
    pub async fn can_schedule_now_async(
        &self,
        job_id: &str,
        now: NaiveDateTime,
    ) -> ScheduleResult<(bool, Vec<String>)> {
        match self.schedule_pass(job_id, now, true).await {
            Ok(_) => Ok((true, Vec::new())),
            Err(ScheduleError::Blocked { blocking_jobs, .. }) => Ok((false, blocking_jobs)),
            Err(e) if e.is_non_fatal() => Ok((false, Vec::new())),
            Err(e) => Err(e),
        }
    }

    /// 该工单的最早合法开工时刻
    ///
    /// # 返回
    /// - `Some(instant)`: 最早开工时刻
    /// - `None`: 当前被阻塞
    pub async fn earliest_legal_start_async(
        &self,
        job_id: &str,
        now: NaiveDateTime,
    ) -> ScheduleResult<Option<NaiveDateTime>> {
        let ctx = self.load_context(Some(job_id), now).await?;

        if !ctx.jobs.contains_key(job_id) {
            return Err(ScheduleError::NotFound {
                entity: "Job".to_string(),
                id: job_id.to_string(),
            });
        }

        match self.dependency.job_earliest_start(job_id, &ctx) {
            EarliestStart::At(t) => Ok(Some(t)),
            EarliestStart::Blocked { .. } => Ok(None),
        }
    }

    /// 重算并写回工单评分
    pub async fn recompute_priority_async(
        &self,
        job_id: &str,
        now: NaiveDateTime,
    ) -> ScheduleResult<i32> {
        let mut ctx = self.load_context(Some(job_id), now).await?;
        let job = ctx
            .jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| ScheduleError::NotFound {
                entity: "Job".to_string(),
                id: job_id.to_string(),
            })?;

        let mut mutations = PassMutations::new();
        let score = self.refresh_priority(&job, &mut ctx, &mut mutations);

        for update in &mutations.job_priority_updates {
            self.repos.jobs.update_priority(
                &update.job_id,
                update.score,
                &update.reason,
                update.expedite_flag,
            )?;
        }

        Ok(score)
    }

    // ==========================================
    // 撤销
    // ==========================================

    /// 回退一条撤销台账
    ///
    /// 快照后又被改过/已过期 => UndoConflict, 绝不静默覆盖
    pub fn reverse_undo(&self, entry_id: &str, now: NaiveDateTime) -> ScheduleResult<()> {
        let entry = self
            .repos
            .undo
            .find_by_id(entry_id)?
            .ok_or_else(|| ScheduleError::NotFound {
                entity: "UndoEntry".to_string(),
                id: entry_id.to_string(),
            })?;

        let mut current: HashMap<String, Booking> = HashMap::new();
        for snapshot in &entry.snapshots {
            if let Some(booking) = self.repos.bookings.find_by_id(&snapshot.booking_id)? {
                current.insert(booking.booking_id.clone(), booking);
            }
        }

        self.ledger
            .verify_reversible(&entry, &current, now)
            .map_err(|message| ScheduleError::UndoConflict {
                entry_id: entry_id.to_string(),
                message,
            })?;

        let (delete_ids, restored, routing) = self.ledger.build_restore(&entry, now);
        let mutations = PassMutations {
            booking_ids_to_delete: delete_ids,
            bookings_to_insert: restored,
            routing_updates: routing,
            ..Default::default()
        };

        self.repos.pass.apply(&mutations).map_err(|e| match e {
            // 回退位置已被新占用顶掉: 同样按撤销冲突上报
            RepositoryError::BusinessRuleViolation(message) => ScheduleError::UndoConflict {
                entry_id: entry_id.to_string(),
                message,
            },
            other => ScheduleError::Repository(other),
        })?;

        self.repos.undo.mark_reversed(entry_id)?;
        info!(entry_id = %entry_id, "撤销回退完成");
        Ok(())
    }

    /// 清扫已过期未回退的台账 (周期任务入口)
    pub fn sweep_expired_undo(&self, now: NaiveDateTime) -> ScheduleResult<usize> {
        let purged = self.repos.undo.purge_expired(now)?;
        if purged > 0 {
            info!(purged, "撤销台账清扫完成");
        }
        Ok(purged)
    }

    // ==========================================
    // 上下文加载
    // ==========================================

    /// 一次性加载批次内存快照
    ///
    /// 参数在批次开始读取一次, 批次中途不再重读 (确定性)。
    /// 工单集合从占用与依赖关系出发做闭包展开:
    /// 目标单 + 占用归属单 + 前置依赖 + 装配父子
    async fn load_context(
        &self,
        target_job_id: Option<&str>,
        now: NaiveDateTime,
    ) -> ScheduleResult<SchedulingContext> {
        let config = self
            .config_source
            .load_config()
            .await
            .map_err(ScheduleError::Other)?;

        let machines = self
            .repos
            .machines
            .list_all()?
            .into_iter()
            .map(|m| (m.machine_id.clone(), m))
            .collect::<HashMap<_, _>>();

        let mut group_members: HashMap<String, Vec<String>> = HashMap::new();
        for (group_code, machine_id) in self.repos.machines.list_group_memberships()? {
            group_members.entry(group_code).or_default().push(machine_id);
        }

        let operators = self
            .repos
            .operators
            .list_all()?
            .into_iter()
            .map(|o| (o.operator_id.clone(), o))
            .collect::<HashMap<_, _>>();

        let qualifications = self.repos.operators.list_qualifications()?;

        let day_schedules = self
            .repos
            .operators
            .list_day_schedules()?
            .into_iter()
            .map(|s| ((s.operator_id.clone(), s.weekday), s))
            .collect::<HashMap<_, _>>();

        let shift_patterns = self
            .repos
            .operators
            .list_shift_patterns()?
            .into_iter()
            .map(|p| (p.pattern_code.clone(), p))
            .collect::<HashMap<_, _>>();

        let time_off = self.repos.time_off.list_approved()?;
        let bookings = self.repos.bookings.list_all()?;
        let inspection_enqueued_ops: HashSet<String> = self
            .repos
            .inspection
            .list_all()?
            .into_iter()
            .map(|t| t.operation_id)
            .collect();

        // 工单闭包展开
        let mut worklist: VecDeque<String> = VecDeque::new();
        let mut seen: HashSet<String> = HashSet::new();
        if let Some(target) = target_job_id {
            worklist.push_back(target.to_string());
        }
        for booking in &bookings {
            worklist.push_back(booking.job_id.clone());
        }

        let mut jobs = HashMap::new();
        let mut operations = HashMap::new();
        let mut operations_by_job: HashMap<String, Vec<String>> = HashMap::new();
        let mut dependencies = Vec::new();
        let mut dep_seen: HashSet<(String, String)> = HashSet::new();

        while let Some(job_id) = worklist.pop_front() {
            if !seen.insert(job_id.clone()) {
                continue;
            }

            let job = match self.repos.jobs.find_by_id(&job_id)? {
                Some(j) => j,
                None => {
                    debug!(job_id = %job_id, "引用的工单不存在, 跳过");
                    continue;
                }
            };

            for dep in self.repos.dependencies.find_prerequisites_of(&job_id)? {
                if dep_seen.insert((
                    dep.prerequisite_job_id.clone(),
                    dep.dependent_job_id.clone(),
                )) {
                    worklist.push_back(dep.prerequisite_job_id.clone());
                    dependencies.push(dep);
                }
            }

            if let Some(parent_id) = &job.parent_job_id {
                worklist.push_back(parent_id.clone());
            }
            if job.is_assembly_parent() {
                for component in self.repos.jobs.find_components_of(&job_id)? {
                    worklist.push_back(component.job_id.clone());
                }
            }

            let ops = self.repos.operations.find_by_job(&job_id)?;
            let op_ids: Vec<String> = ops.iter().map(|o| o.operation_id.clone()).collect();
            operations_by_job.insert(job_id.clone(), op_ids);
            for op in ops {
                operations.insert(op.operation_id.clone(), op);
            }

            jobs.insert(job_id, job);
        }

        // 客户分层: 目标单的客户未知时按中性档自动注册
        let mut customer_tiers: HashMap<String, i32> = HashMap::new();
        for job in jobs.values() {
            if customer_tiers.contains_key(&job.customer_id) {
                continue;
            }
            let tier = if target_job_id
                .map(|t| t == job.job_id)
                .unwrap_or(false)
            {
                self.repos.customers.tier_weight_or_register(&job.customer_id)?
            } else {
                self.repos
                    .customers
                    .find_by_id(&job.customer_id)?
                    .map(|c| c.tier_weight)
                    .unwrap_or(0)
            };
            customer_tiers.insert(job.customer_id.clone(), tier);
        }

        Ok(SchedulingContext {
            now,
            today: now.date(),
            config,
            machines,
            group_members,
            operators,
            qualifications,
            day_schedules,
            shift_patterns,
            time_off,
            jobs,
            operations,
            operations_by_job,
            dependencies,
            bookings,
            customer_tiers,
            inspection_enqueued_ops,
        })
    }
}
