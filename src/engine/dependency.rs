// ==========================================
// 机加工车间排产系统 - 依赖解析引擎
// ==========================================
// 最早合法开工时刻 = max(各项约束):
// 1) 同单前道工序结束 + 转运衔接时长
// 2) 装配: 前置子件单全部落位, 取其最晚结束;
//    任一前置未排产则整单阻塞
// 3) 外协发出期限 = 承诺交付日 - 外协周期;
//    前道赶不上期限时只标记风险 (告警), 不自动消解
// ==========================================

use crate::domain::job::Operation;
use crate::domain::types::{JobStatus, RoutingStatus};
use crate::engine::context::SchedulingContext;
use chrono::{Duration, NaiveDate, NaiveDateTime};

// ==========================================
// EarliestStart - 解析结果
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum EarliestStart {
    /// 可以开工的最早时刻
    At(NaiveDateTime),
    /// 被未就绪的前置工单阻塞
    Blocked { blocking_jobs: Vec<String> },
}

// ==========================================
// OutsourcingRisk - 外协发出期限风险
// ==========================================
#[derive(Debug, Clone)]
pub struct OutsourcingRisk {
    pub operation_id: String,            // 外协工序
    pub job_id: String,                  // 所属工单
    pub send_out_deadline: NaiveDate,    // 发出期限
    pub predecessor_end: NaiveDateTime,  // 前道实际结束
}

// ==========================================
// DependencyResolver - 依赖解析引擎
// ==========================================
pub struct DependencyResolver {
    // 无状态引擎,不需要注入依赖
}

impl DependencyResolver {
    /// 构造函数
    pub fn new() -> Self {
        Self {}
    }

    // ==========================================
    // 核心方法
    // ==========================================

    /// 解析某工序的最早合法开工时刻
    ///
    /// # 参数
    /// - `operation`: 工序
    /// - `ctx`: 排产上下文
    ///
    /// # 返回
    /// - `At(instant)`: 最早开工时刻 (不早于批次基准时刻)
    /// - `Blocked`: 阻塞工单列表
    pub fn earliest_start(
        &self,
        operation: &Operation,
        ctx: &SchedulingContext,
    ) -> EarliestStart {
        let mut bound = ctx.now;

        // 1) 同单前道工序约束
        if let Some(predecessor) = ctx.predecessor_of(operation) {
            match self.effective_end(predecessor, ctx) {
                Ok(Some(end)) => {
                    let lag = ctx.config.transfer_lag_between(
                        predecessor.operation_type.as_deref(),
                        operation.operation_type.as_deref(),
                    );
                    bound = bound.max(end + Duration::minutes(lag));
                }
                Ok(None) => {} // 前道已完成/无约束
                Err(blocking_job) => {
                    return EarliestStart::Blocked {
                        blocking_jobs: vec![blocking_job],
                    };
                }
            }
        } else {
            // 2) 首道工序受工单级依赖约束 (装配等)
            match self.job_level_bound(&operation.job_id, ctx) {
                Ok(Some(end)) => bound = bound.max(end),
                Ok(None) => {}
                Err(blocking_jobs) => return EarliestStart::Blocked { blocking_jobs },
            }
        }

        EarliestStart::At(bound)
    }

    /// 解析整个工单的最早合法开工时刻（对外查询口）
    ///
    /// 取首个未完成工序的解析结果
    pub fn job_earliest_start(&self, job_id: &str, ctx: &SchedulingContext) -> EarliestStart {
        let first_open = ctx
            .operations_of_job(job_id)
            .into_iter()
            .find(|op| op.routing_status != RoutingStatus::Completed);

        match first_open {
            Some(op) => self.earliest_start(op, ctx),
            // 全部工序已完成: 没有可排的开工时刻，按"现在"返回
            None => EarliestStart::At(ctx.now),
        }
    }

    /// 检查外协工序的发出期限风险
    ///
    /// 发出期限 = 承诺交付日 - 外协周期。
    /// 前道工序结束晚于期限时返回风险 (由调用方转告警)，不阻塞排产。
    ///
    /// # 参数
    /// - `operation`: 外协工序
    /// - `predecessor_end`: 前道工序 (或依赖链) 的实际结束时刻
    pub fn check_outsourcing_risk(
        &self,
        operation: &Operation,
        predecessor_end: NaiveDateTime,
        ctx: &SchedulingContext,
    ) -> Option<OutsourcingRisk> {
        if !operation.outsourced_flag {
            return None;
        }

        let job = ctx.jobs.get(&operation.job_id)?;
        let promised = job.promised_date?;
        let deadline = promised - Duration::days(operation.vendor_lead_days.max(0));

        if predecessor_end.date() > deadline {
            return Some(OutsourcingRisk {
                operation_id: operation.operation_id.clone(),
                job_id: operation.job_id.clone(),
                send_out_deadline: deadline,
                predecessor_end,
            });
        }

        None
    }

    // ==========================================
    // 辅助方法
    // ==========================================

    /// 计算某工序对后道的"有效结束时刻"
    ///
    /// - 有占用: 最晚一段的结束
    /// - 已完成: 无约束 (None)
    /// - 零工时质检: 穿透到它自己的前道
    /// - 外协: 前道结束 (或批次基准时刻) + 外协周期
    /// - 普通工序无占用且未完成: 前道未排产 => 阻塞
    ///
    /// # 返回
    /// - `Ok(Some(end))`: 约束时刻
    /// - `Ok(None)`: 无约束
    /// - `Err(job_id)`: 被该工单阻塞
    fn effective_end(
        &self,
        operation: &Operation,
        ctx: &SchedulingContext,
    ) -> Result<Option<NaiveDateTime>, String> {
        if operation.routing_status == RoutingStatus::Completed {
            return Ok(None);
        }

        let bookings = ctx.bookings_for_operation(&operation.operation_id);
        if let Some(last) = bookings.last() {
            return Ok(Some(last.end_at));
        }

        if operation.outsourced_flag {
            // 外协无设备占用: 以前道结束为基准加上外协周期
            let base = match ctx.predecessor_of(operation) {
                Some(pred) => self.effective_end(pred, ctx)?.unwrap_or(ctx.now),
                None => ctx.now,
            };
            return Ok(Some(base + Duration::days(operation.vendor_lead_days.max(0))));
        }

        if operation.inspection_flag {
            // 零工时质检: 穿透到它自己的前道
            return match ctx.predecessor_of(operation) {
                Some(pred) => self.effective_end(pred, ctx),
                None => Ok(None),
            };
        }

        // 普通工序未排产: 后道被本单阻塞
        Err(operation.job_id.clone())
    }

    /// 工单级依赖约束 (装配前置 + 父子关系)
    ///
    /// # 返回
    /// - `Ok(Some(end))`: 前置全部落位, 取最晚结束
    /// - `Ok(None)`: 无前置
    /// - `Err(jobs)`: 被这些前置工单阻塞
    fn job_level_bound(
        &self,
        job_id: &str,
        ctx: &SchedulingContext,
    ) -> Result<Option<NaiveDateTime>, Vec<String>> {
        let mut prerequisite_ids: Vec<String> = ctx
            .prerequisite_jobs_of(job_id)
            .into_iter()
            .map(|s| s.to_string())
            .collect();

        // 装配父单隐含依赖全部子件单
        if let Some(job) = ctx.jobs.get(job_id) {
            if job.is_assembly_parent() {
                for (id, other) in &ctx.jobs {
                    if other.parent_job_id.as_deref() == Some(job_id)
                        && !prerequisite_ids.contains(id)
                    {
                        prerequisite_ids.push(id.clone());
                    }
                }
            }
        }
        prerequisite_ids.sort();

        if prerequisite_ids.is_empty() {
            return Ok(None);
        }

        let mut bound: Option<NaiveDateTime> = None;
        let mut blocking: Vec<String> = Vec::new();

        for prereq_id in &prerequisite_ids {
            // 已完工的前置不再约束
            if let Some(prereq) = ctx.jobs.get(prereq_id) {
                if prereq.status == JobStatus::Completed {
                    continue;
                }
            }

            match ctx.job_last_booking_end(prereq_id) {
                Some(end) => bound = Some(bound.map_or(end, |b: NaiveDateTime| b.max(end))),
                // 前置未排产: 整单阻塞
                None => blocking.push(prereq_id.clone()),
            }
        }

        if !blocking.is_empty() {
            return Err(blocking);
        }

        Ok(bound)
    }
}

// ==========================================
// Default trait 实现
// ==========================================
impl Default for DependencyResolver {
    fn default() -> Self {
        Self::new()
    }
}
