// ==========================================
// 机加工车间排产系统 - 请假触发的改排
// ==========================================
// 新请假落库后, 该操作工与请假区间相交的占用逐条评估:
// 1) 进行中的占用: 顺延到返岗日同一钟点, 绝不删除;
//    顺延后仍冲突则继续逐日后移, 兜不住时告警并保持原位
// 2) 其他占用: 先找同设备、具备资质、足够空闲的替补
//    (替补自身的冲突须按同一阈值规则可挤); 替补失败则
//    删除占用并级联标记待重排
// 高优先级受影响与交付承诺受破坏的结果一律告警上报，
// 绝不静默吞掉
// ==========================================

use super::DisplacementEngine;
use crate::domain::booking::Booking;
use crate::domain::events::AlertEvent;
use crate::domain::resource::TimeOff;
use crate::domain::types::{
    AlertSeverity, AlertType, BookingMethod, BookingStatus, JobStatus, RoutingStatus,
};
use crate::engine::calendar::CalendarResolver;
use crate::engine::context::SchedulingContext;
use crate::repository::pass_repo::BookingMove;
use std::cmp::Ordering;
use tracing::{info, warn};
use uuid::Uuid;

/// 顺延寻位的最大尝试天数
const MAX_SHIFT_SEARCH_DAYS: i64 = 30;

// ==========================================
// TimeOffPlan - 请假改排方案
// ==========================================
#[derive(Debug, Default)]
pub struct TimeOffPlan {
    pub booking_moves: Vec<BookingMove>,              // 进行中占用的顺延
    pub booking_ids_to_delete: Vec<String>,           // 待删除占用 (含级联)
    pub bookings_to_insert: Vec<Booking>,             // 替补产生的新占用
    pub routing_updates: Vec<(String, RoutingStatus)>,// 待重排标记
    pub job_status_updates: Vec<(String, JobStatus)>, // 工单回退待排产
    pub alerts: Vec<AlertEvent>,                      // 上报告警
    pub affected_bookings: Vec<Booking>,              // 撤销台账快照源
    pub shifted_count: i32,                           // 顺延数
    pub substituted_count: i32,                       // 替补成功数
    pub evicted_count: i32,                           // 删除重排数
}

impl DisplacementEngine {
    // ==========================================
    // 请假触发入口
    // ==========================================

    /// 评估一条新请假对既有占用的影响
    ///
    /// 先物化受影响占用清单再逐条处理 (处理过程不回写 ctx)。
    /// 调用前 ctx.time_off 必须已包含这条新请假，
    /// 否则日历解析会把请假区间当成可用。
    ///
    /// # 参数
    /// - `time_off`: 新增的请假记录
    /// - `ctx`: 排产上下文
    pub fn handle_time_off(
        &self,
        time_off: &TimeOff,
        ctx: &SchedulingContext,
    ) -> TimeOffPlan {
        let calendar = CalendarResolver::new();
        let mut plan = TimeOffPlan::default();

        let range_start = time_off
            .start_date
            .and_hms_opt(0, 0, 0)
            .unwrap_or(ctx.now);
        let range_end = time_off
            .end_date
            .succ_opt()
            .unwrap_or(time_off.end_date)
            .and_hms_opt(0, 0, 0)
            .unwrap_or(ctx.now);

        // 物化受影响占用 (克隆快照，后续判定不受清单内先后影响)
        let affected: Vec<Booking> = ctx
            .bookings
            .iter()
            .filter(|b| {
                b.operator_id == time_off.operator_id && b.overlaps(range_start, range_end)
            })
            .cloned()
            .collect();

        info!(
            operator_id = %time_off.operator_id,
            start_date = %time_off.start_date,
            end_date = %time_off.end_date,
            affected = affected.len(),
            "请假触发改排评估"
        );

        for booking in &affected {
            plan.affected_bookings.push(booking.clone());

            if booking.is_in_progress() {
                self.shift_in_progress(booking, time_off, &calendar, ctx, &mut plan);
            } else if !self.try_substitute(booking, time_off, &calendar, ctx, &mut plan) {
                self.evict_for_time_off(booking, ctx, &mut plan);
            }
        }

        plan
    }

    // ==========================================
    // 进行中占用: 顺延
    // ==========================================

    /// 把进行中的占用顺延到返岗日同一钟点
    fn shift_in_progress(
        &self,
        booking: &Booking,
        time_off: &TimeOff,
        calendar: &CalendarResolver,
        ctx: &SchedulingContext,
        plan: &mut TimeOffPlan,
    ) {
        let duration = booking.end_at - booking.start_at;
        let time_of_day = booking.start_at.time();

        // 返岗日 = 请假结束次日起的第一个工作日
        let return_from = match time_off.end_date.succ_opt() {
            Some(d) => d,
            None => {
                plan.alerts.push(self.alert(
                    AlertSeverity::Critical,
                    AlertType::ShiftConflict,
                    format!("占用 {} 顺延失败: 日历越界", booking.booking_id),
                    Some(booking.job_id.clone()),
                    ctx,
                ));
                return;
            }
        };

        let mut date = match calendar.next_working_window(
            &booking.operator_id,
            return_from,
            MAX_SHIFT_SEARCH_DAYS,
            ctx,
        ) {
            Some(window) => window.date,
            None => {
                plan.alerts.push(self.alert(
                    AlertSeverity::Critical,
                    AlertType::ShiftConflict,
                    format!(
                        "占用 {} 顺延失败: {} 天内无返岗工作日",
                        booking.booking_id, MAX_SHIFT_SEARCH_DAYS
                    ),
                    Some(booking.job_id.clone()),
                    ctx,
                ));
                return;
            }
        };

        // 同一钟点逐日后移, 找到第一个无冲突的落点
        for _ in 0..MAX_SHIFT_SEARCH_DAYS {
            let new_start = date.and_time(time_of_day);
            let new_end = new_start + duration;

            let conflict = ctx.bookings.iter().any(|other| {
                other.booking_id != booking.booking_id
                    && (other.machine_id == booking.machine_id
                        || other.operator_id == booking.operator_id)
                    && other.overlaps(new_start, new_end)
            });

            if !conflict {
                info!(
                    booking_id = %booking.booking_id,
                    new_start = %new_start,
                    "进行中占用顺延至返岗日"
                );
                plan.booking_moves.push(BookingMove {
                    booking_id: booking.booking_id.clone(),
                    new_start,
                    new_end,
                });
                plan.shifted_count += 1;

                // 顺延越过承诺交付日: 上报
                if let Some(job) = ctx.jobs.get(&booking.job_id) {
                    if let Some(promised) = job.promised_date {
                        if new_end.date() > promised {
                            plan.alerts.push(self.alert(
                                AlertSeverity::Warning,
                                AlertType::PromiseDateViolation,
                                format!(
                                    "工单 {} 进行中工序顺延后越过承诺交付日 {}",
                                    job.job_id, promised
                                ),
                                Some(job.job_id.clone()),
                                ctx,
                            ));
                        }
                    }
                }
                return;
            }

            date = match date.succ_opt() {
                Some(d) => d,
                None => break,
            };
        }

        // 兜不住: 保持原位并上报, 进行中的占用绝不删除
        warn!(booking_id = %booking.booking_id, "顺延寻位失败, 保持原位并告警");
        plan.alerts.push(self.alert(
            AlertSeverity::Critical,
            AlertType::ShiftConflict,
            format!(
                "占用 {} 顺延后 {} 天内均有冲突, 需人工处理",
                booking.booking_id, MAX_SHIFT_SEARCH_DAYS
            ),
            Some(booking.job_id.clone()),
            ctx,
        ));
    }

    // ==========================================
    // 其他占用: 替补
    // ==========================================

    /// 尝试用同设备的其他资质操作工原时段顶上
    ///
    /// # 返回
    /// - `true`: 替补成功, 动作已写入方案
    /// - `false`: 无可用替补
    fn try_substitute(
        &self,
        booking: &Booking,
        time_off: &TimeOff,
        calendar: &CalendarResolver,
        ctx: &SchedulingContext,
        plan: &mut TimeOffPlan,
    ) -> bool {
        let job_priority = ctx
            .jobs
            .get(&booking.job_id)
            .map(|j| j.priority_score)
            .unwrap_or(0);
        let threshold = ctx.config.displacement_threshold;

        // 同设备资质按偏好/熟练度排序
        let mut quals: Vec<_> = ctx
            .qualifications
            .iter()
            .filter(|q| q.machine_id == booking.machine_id && q.operator_id != time_off.operator_id)
            .collect();
        quals.sort_by(|a, b| match a.preference_rank.cmp(&b.preference_rank) {
            Ordering::Equal => b.proficiency_level.cmp(&a.proficiency_level),
            other => other,
        });

        for qual in quals {
            // 替补当天必须在岗且工作窗覆盖原时段
            let window = calendar.resolve(&qual.operator_id, booking.start_at.date(), ctx);
            if !window.is_working
                || window.start > booking.start_at
                || window.end < booking.end_at
            {
                continue;
            }

            // 替补自身的冲突: 要么没有, 要么全部可按阈值规则挤掉
            let conflicts: Vec<&Booking> = ctx
                .bookings
                .iter()
                .filter(|other| {
                    other.operator_id == qual.operator_id
                        && other.booking_id != booking.booking_id
                        && other.overlaps(booking.start_at, booking.end_at)
                })
                .collect();

            let all_displaceable = conflicts.iter().all(|other| {
                other.is_displacement_candidate()
                    && ctx
                        .jobs
                        .get(&other.job_id)
                        .map(|j| {
                            !j.schedule_locked
                                && Self::priority_gap_exceeds(
                                    job_priority,
                                    j.priority_score,
                                    threshold,
                                )
                        })
                        .unwrap_or(false)
            });

            if !all_displaceable {
                continue;
            }

            // 替补成立: 原占用换人重建, 替补的低优先级冲突级联挤出
            info!(
                booking_id = %booking.booking_id,
                substitute = %qual.operator_id,
                evicted = conflicts.len(),
                "请假替补成功"
            );

            for other in &conflicts {
                let op_ids = vec![other.operation_id.clone()];
                let (del, routing, jobs, affected) = self.build_cascade(&op_ids, ctx);
                for id in del {
                    if !plan.booking_ids_to_delete.contains(&id) {
                        plan.booking_ids_to_delete.push(id);
                    }
                }
                plan.routing_updates.extend(routing);
                plan.job_status_updates.extend(jobs);
                plan.affected_bookings.extend(affected);
                plan.evicted_count += 1;
            }

            plan.booking_ids_to_delete.push(booking.booking_id.clone());
            plan.bookings_to_insert.push(Booking {
                booking_id: Uuid::new_v4().to_string(),
                operator_id: qual.operator_id.clone(),
                method: BookingMethod::Auto,
                status: BookingStatus::Scheduled,
                revision: 0,
                created_at: ctx.now,
                updated_at: ctx.now,
                ..booking.clone()
            });
            plan.substituted_count += 1;
            return true;
        }

        false
    }

    // ==========================================
    // 替补失败: 删除并级联重排
    // ==========================================

    fn evict_for_time_off(
        &self,
        booking: &Booking,
        ctx: &SchedulingContext,
        plan: &mut TimeOffPlan,
    ) {
        warn!(
            booking_id = %booking.booking_id,
            job_id = %booking.job_id,
            "无可用替补, 删除占用并级联标记待重排"
        );

        let op_ids = vec![booking.operation_id.clone()];
        let (del, routing, jobs, affected) = self.build_cascade(&op_ids, ctx);
        for id in del {
            if !plan.booking_ids_to_delete.contains(&id) {
                plan.booking_ids_to_delete.push(id);
            }
        }
        plan.routing_updates.extend(routing);
        plan.job_status_updates.extend(jobs);
        plan.affected_bookings.extend(affected);
        plan.evicted_count += 1;

        plan.alerts.push(self.alert(
            AlertSeverity::Warning,
            AlertType::NoSubstituteFound,
            format!(
                "占用 {} 无可用替补, 工序 {} 待重排",
                booking.booking_id, booking.operation_id
            ),
            Some(booking.job_id.clone()),
            ctx,
        ));

        if let Some(job) = ctx.jobs.get(&booking.job_id) {
            // 高优先级受影响: 上报
            if job.priority_score >= ctx.config.high_priority_alert_threshold {
                plan.alerts.push(self.alert(
                    AlertSeverity::Critical,
                    AlertType::HighPriorityDisplaced,
                    format!(
                        "高优先级工单 {} (评分 {}) 因请假被挤出",
                        job.job_id, job.priority_score
                    ),
                    Some(job.job_id.clone()),
                    ctx,
                ));
            }

            // 原排程已贴着承诺交付日: 重排几乎必然越期, 上报
            if let Some(promised) = job.promised_date {
                if promised <= booking.end_at.date() {
                    plan.alerts.push(self.alert(
                        AlertSeverity::Warning,
                        AlertType::PromiseDateViolation,
                        format!("工单 {} 被挤出后承诺交付日 {} 已无法保证", job.job_id, promised),
                        Some(job.job_id.clone()),
                        ctx,
                    ));
                }
            }
        }
    }

    // ==========================================
    // 辅助方法
    // ==========================================

    fn alert(
        &self,
        severity: AlertSeverity,
        alert_type: AlertType,
        message: String,
        job_id: Option<String>,
        ctx: &SchedulingContext,
    ) -> AlertEvent {
        AlertEvent {
            alert_id: Uuid::new_v4().to_string(),
            severity,
            alert_type,
            message,
            job_id,
            created_at: ctx.now,
        }
    }
}
