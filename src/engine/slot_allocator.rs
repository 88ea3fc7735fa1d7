// ==========================================
// 机加工车间排产系统 - 时段分配引擎
// ==========================================
// 算法: 从最早可行时刻起逐日前扫。每天先找能整体容纳
// 的连续空档；容不下就吃光当日全部剩余空档("分段"),
// 余量翻到下一个工作日 —— 必须先榨干当日产能再翻日，
// 避免整单跳日导致当日工时搁浅
// ==========================================
// 红线: 搜索视野耗尽时只报告失败，不改动任何状态
// ==========================================

use crate::engine::calendar::CalendarResolver;
use crate::engine::context::SchedulingContext;
use crate::engine::matcher::CandidatePair;
use chrono::{Duration, NaiveDateTime};
use std::collections::HashSet;
use tracing::debug;

// ==========================================
// PlannedSegment - 计划时段 (单段)
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedSegment {
    pub start: NaiveDateTime, // 段开始
    pub end: NaiveDateTime,   // 段结束
    pub minutes: i64,         // 段时长 (分钟)
}

// ==========================================
// PlannedAllocation - 落位方案
// ==========================================
#[derive(Debug, Clone)]
pub struct PlannedAllocation {
    pub machine_id: String,          // 选中设备
    pub operator_id: String,         // 选中操作工
    pub segments: Vec<PlannedSegment>, // 分段列表 (按时间升序)
    pub wall_clock_minutes: i64,     // 折算效率后的总占用 (分钟)
}

impl PlannedAllocation {
    /// 方案的整体开始时刻
    pub fn start(&self) -> Option<NaiveDateTime> {
        self.segments.first().map(|s| s.start)
    }

    /// 方案的整体结束时刻
    pub fn end(&self) -> Option<NaiveDateTime> {
        self.segments.last().map(|s| s.end)
    }
}

// ==========================================
// SlotAllocator - 时段分配引擎
// ==========================================
pub struct SlotAllocator {
    calendar: CalendarResolver,
}

impl SlotAllocator {
    /// 构造函数
    pub fn new() -> Self {
        Self {
            calendar: CalendarResolver::new(),
        }
    }

    // ==========================================
    // 核心方法
    // ==========================================

    /// 为一段工时寻找落位方案
    ///
    /// 按候选序逐一尝试；标准工时按候选设备的效率系数
    /// 折算成实际占用后再分配。
    ///
    /// # 参数
    /// - `nominal_minutes`: 标准工时 (分钟)
    /// - `earliest_start`: 依赖解析得到的最早可行时刻
    /// - `candidates`: 资源匹配引擎的候选列表
    /// - `ctx`: 排产上下文
    /// - `excluded`: 视为不存在的占用ID (挤占模拟用)
    ///
    /// # 返回
    /// - `Some(PlannedAllocation)`: 落位方案
    /// - `None`: 全部候选在搜索视野内都放不下
    pub fn allocate(
        &self,
        nominal_minutes: i64,
        earliest_start: NaiveDateTime,
        candidates: &[CandidatePair],
        ctx: &SchedulingContext,
        excluded: &HashSet<String>,
    ) -> Option<PlannedAllocation> {
        for candidate in candidates {
            let machine = match ctx.machines.get(&candidate.machine_id) {
                Some(m) => m,
                None => continue,
            };

            // 效率系数折算; 零工时兜底为1分钟，保证占用可见
            let wall_minutes = machine.wall_clock_minutes(nominal_minutes).max(1);

            if let Some(segments) =
                self.try_candidate(wall_minutes, earliest_start, candidate, ctx, excluded)
            {
                debug!(
                    machine_id = %candidate.machine_id,
                    operator_id = %candidate.operator_id,
                    segments = segments.len(),
                    wall_minutes,
                    "时段分配成功"
                );
                return Some(PlannedAllocation {
                    machine_id: candidate.machine_id.clone(),
                    operator_id: candidate.operator_id.clone(),
                    segments,
                    wall_clock_minutes: wall_minutes,
                });
            }
        }

        None
    }

    /// 在单个候选对上逐日前扫
    fn try_candidate(
        &self,
        wall_minutes: i64,
        earliest_start: NaiveDateTime,
        candidate: &CandidatePair,
        ctx: &SchedulingContext,
        excluded: &HashSet<String>,
    ) -> Option<Vec<PlannedSegment>> {
        let horizon_end = earliest_start.date() + Duration::days(ctx.config.search_horizon_days);

        let mut segments: Vec<PlannedSegment> = Vec::new();
        let mut remaining = wall_minutes;
        let mut date = earliest_start.date();

        while date <= horizon_end && remaining > 0 {
            let window = self.calendar.resolve(&candidate.operator_id, date, ctx);
            if !window.is_working {
                date = date.succ_opt()?;
                continue;
            }

            // 首日受最早可行时刻约束
            let day_start = window.start.max(earliest_start);
            if day_start >= window.end {
                date = date.succ_opt()?;
                continue;
            }

            let free = self.free_intervals(day_start, window.end, candidate, ctx, excluded);

            // 1) 先找能整体容纳剩余工时的连续空档
            if let Some((start, _end)) = free
                .iter()
                .find(|(s, e)| (*e - *s).num_minutes() >= remaining)
            {
                let end = *start + Duration::minutes(remaining);
                segments.push(PlannedSegment {
                    start: *start,
                    end,
                    minutes: remaining,
                });
                remaining = 0;
                break;
            }

            // 2) 容不下: 吃光当日全部空档再翻日
            for (start, end) in &free {
                if remaining <= 0 {
                    break;
                }
                let available = (*end - *start).num_minutes();
                if available <= 0 {
                    continue;
                }
                let take = available.min(remaining);
                segments.push(PlannedSegment {
                    start: *start,
                    end: *start + Duration::minutes(take),
                    minutes: take,
                });
                remaining -= take;
            }

            date = date.succ_opt()?;
        }

        if remaining > 0 {
            None
        } else {
            Some(segments)
        }
    }

    /// 计算候选对在 [from, to) 内的空闲区间
    ///
    /// 设备与操作工的既有占用都要扣除
    fn free_intervals(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
        candidate: &CandidatePair,
        ctx: &SchedulingContext,
        excluded: &HashSet<String>,
    ) -> Vec<(NaiveDateTime, NaiveDateTime)> {
        let mut busy: Vec<(NaiveDateTime, NaiveDateTime)> = Vec::new();

        for booking in ctx.bookings_for_machine(&candidate.machine_id, excluded) {
            if booking.overlaps(from, to) {
                busy.push((booking.start_at, booking.end_at));
            }
        }
        for booking in ctx.bookings_for_operator(&candidate.operator_id, excluded) {
            if booking.machine_id != candidate.machine_id && booking.overlaps(from, to) {
                busy.push((booking.start_at, booking.end_at));
            }
        }

        let merged = Self::merge_intervals(busy);
        Self::subtract_intervals(from, to, &merged)
    }

    /// 合并重叠的占用区间
    fn merge_intervals(
        mut intervals: Vec<(NaiveDateTime, NaiveDateTime)>,
    ) -> Vec<(NaiveDateTime, NaiveDateTime)> {
        intervals.sort_by_key(|(start, _)| *start);

        let mut merged: Vec<(NaiveDateTime, NaiveDateTime)> = Vec::new();
        for (start, end) in intervals {
            match merged.last_mut() {
                Some(last) if start <= last.1 => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }
        merged
    }

    /// 从 [from, to) 中扣除占用区间，得到空闲区间
    fn subtract_intervals(
        from: NaiveDateTime,
        to: NaiveDateTime,
        busy: &[(NaiveDateTime, NaiveDateTime)],
    ) -> Vec<(NaiveDateTime, NaiveDateTime)> {
        let mut free = Vec::new();
        let mut cursor = from;

        for (start, end) in busy {
            if *end <= cursor {
                continue;
            }
            if *start >= to {
                break;
            }
            if *start > cursor {
                free.push((cursor, (*start).min(to)));
            }
            cursor = cursor.max(*end);
            if cursor >= to {
                break;
            }
        }

        if cursor < to {
            free.push((cursor, to));
        }

        free
    }
}

// ==========================================
// Default trait 实现
// ==========================================
impl Default for SlotAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ==========================================
// 测试模块
// ==========================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::domain::booking::Booking;
    use crate::domain::resource::{Machine, Operator};
    use crate::domain::types::{BookingMethod, BookingStatus, MachineStatus};
    use chrono::NaiveDate;
    use std::collections::HashMap;

    fn ctx_with_pair(efficiency: f64) -> SchedulingContext {
        let now = NaiveDate::from_ymd_opt(2025, 8, 11)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let mut ctx = SchedulingContext {
            now,
            today: now.date(),
            config: SchedulerConfig::default(),
            machines: HashMap::new(),
            group_members: HashMap::new(),
            operators: HashMap::new(),
            qualifications: Vec::new(),
            day_schedules: HashMap::new(),
            shift_patterns: HashMap::new(),
            time_off: Vec::new(),
            jobs: HashMap::new(),
            operations: HashMap::new(),
            operations_by_job: HashMap::new(),
            dependencies: Vec::new(),
            bookings: Vec::new(),
            customer_tiers: HashMap::new(),
            inspection_enqueued_ops: HashSet::new(),
        };
        ctx.machines.insert(
            "M1".to_string(),
            Machine {
                machine_id: "M1".to_string(),
                machine_name: "立式加工中心".to_string(),
                status: MachineStatus::Active,
                efficiency_modifier: efficiency,
            },
        );
        ctx.operators.insert(
            "OP1".to_string(),
            Operator {
                operator_id: "OP1".to_string(),
                display_code: None,
                operator_name: "OP1".to_string(),
                shift_class: None,
                shift_pattern_code: None,
                custom_start_time: None,
                custom_end_time: None,
            },
        );
        ctx
    }

    fn pair() -> CandidatePair {
        CandidatePair {
            machine_id: "M1".to_string(),
            operator_id: "OP1".to_string(),
            preference_rank: 1,
            proficiency_level: 3,
            workload_minutes: 0,
            efficiency_modifier: 1.0,
        }
    }

    fn booking(id: &str, start: NaiveDateTime, end: NaiveDateTime) -> Booking {
        Booking {
            booking_id: id.to_string(),
            operation_id: format!("{}-op", id),
            job_id: format!("{}-job", id),
            machine_id: "M1".to_string(),
            operator_id: "OP1".to_string(),
            start_at: start,
            end_at: end,
            duration_minutes: (end - start).num_minutes(),
            chunk_index: 0,
            status: BookingStatus::Scheduled,
            locked: false,
            method: BookingMethod::Auto,
            revision: 0,
            created_at: start,
            updated_at: start,
        }
    }

    fn dt(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 8, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn test_simple_allocation_at_earliest() {
        let ctx = ctx_with_pair(1.0);
        let allocator = SlotAllocator::new();

        let allocation = allocator
            .allocate(240, dt(11, 9, 0), &[pair()], &ctx, &HashSet::new())
            .expect("应当落位成功");

        assert_eq!(allocation.segments.len(), 1);
        assert_eq!(allocation.segments[0].start, dt(11, 9, 0));
        assert_eq!(allocation.segments[0].end, dt(11, 13, 0));
    }

    #[test]
    fn test_allocation_after_existing_booking() {
        let mut ctx = ctx_with_pair(1.0);
        ctx.bookings.push(booking("B1", dt(11, 8, 0), dt(11, 12, 0)));
        let allocator = SlotAllocator::new();

        let allocation = allocator
            .allocate(180, dt(11, 8, 0), &[pair()], &ctx, &HashSet::new())
            .expect("应当落位成功");

        assert_eq!(allocation.segments[0].start, dt(11, 12, 0));
        assert_eq!(allocation.segments[0].end, dt(11, 15, 0));
    }

    #[test]
    fn test_chunking_across_days() {
        // 600 分钟: 周一 08:00-17:00 吃满 540, 周二 08:00-09:00 续 60
        let ctx = ctx_with_pair(1.0);
        let allocator = SlotAllocator::new();

        let allocation = allocator
            .allocate(600, dt(11, 8, 0), &[pair()], &ctx, &HashSet::new())
            .expect("应当落位成功");

        assert_eq!(allocation.segments.len(), 2);
        assert_eq!(allocation.segments[0].start, dt(11, 8, 0));
        assert_eq!(allocation.segments[0].end, dt(11, 17, 0));
        assert_eq!(allocation.segments[1].start, dt(12, 8, 0));
        assert_eq!(allocation.segments[1].end, dt(12, 9, 0));
    }

    #[test]
    fn test_exhausts_day_before_advancing() {
        // 当日余 120 分钟空档: 需求 180 时必须先吃光 120 再翻日,
        // 不允许整单跳到次日把当日工时搁浅
        let mut ctx = ctx_with_pair(1.0);
        ctx.bookings.push(booking("B1", dt(11, 8, 0), dt(11, 15, 0)));
        let allocator = SlotAllocator::new();

        let allocation = allocator
            .allocate(180, dt(11, 8, 0), &[pair()], &ctx, &HashSet::new())
            .expect("应当落位成功");

        assert_eq!(allocation.segments.len(), 2);
        assert_eq!(allocation.segments[0].start, dt(11, 15, 0));
        assert_eq!(allocation.segments[0].end, dt(11, 17, 0));
        assert_eq!(allocation.segments[1].start, dt(12, 8, 0));
        assert_eq!(allocation.segments[1].end, dt(12, 9, 0));
    }

    #[test]
    fn test_contiguous_fit_preferred_within_day() {
        // 空档 [8-10] 与 [12-17]: 300 分钟应整体落进 [12-17],
        // 而不是拆成 8-10 + 12-15
        let mut ctx = ctx_with_pair(1.0);
        ctx.bookings.push(booking("B1", dt(11, 10, 0), dt(11, 12, 0)));
        let allocator = SlotAllocator::new();

        let allocation = allocator
            .allocate(300, dt(11, 8, 0), &[pair()], &ctx, &HashSet::new())
            .expect("应当落位成功");

        assert_eq!(allocation.segments.len(), 1);
        assert_eq!(allocation.segments[0].start, dt(11, 12, 0));
        assert_eq!(allocation.segments[0].end, dt(11, 17, 0));
    }

    #[test]
    fn test_efficiency_scales_duration() {
        // 效率 2.0: 标准 240 分钟只占 120 分钟
        let ctx = ctx_with_pair(2.0);
        let allocator = SlotAllocator::new();

        let allocation = allocator
            .allocate(240, dt(11, 8, 0), &[pair()], &ctx, &HashSet::new())
            .expect("应当落位成功");

        assert_eq!(allocation.wall_clock_minutes, 120);
        assert_eq!(allocation.segments[0].end, dt(11, 10, 0));
    }

    #[test]
    fn test_horizon_exhausted_returns_none() {
        // 把搜索视野压到 2 天, 再用一张大单撑爆
        let mut ctx = ctx_with_pair(1.0);
        ctx.config.search_horizon_days = 2;
        let allocator = SlotAllocator::new();

        let allocation = allocator.allocate(
            // 3 个工作日都不够
            540 * 3 + 60,
            dt(11, 8, 0),
            &[pair()],
            &ctx,
            &HashSet::new(),
        );

        assert!(allocation.is_none());
    }

    #[test]
    fn test_excluded_bookings_invisible() {
        // 挤占模拟: 被排除的占用视为不存在
        let mut ctx = ctx_with_pair(1.0);
        ctx.bookings.push(booking("B1", dt(11, 8, 0), dt(11, 17, 0)));
        let allocator = SlotAllocator::new();

        let mut excluded = HashSet::new();
        excluded.insert("B1".to_string());

        let allocation = allocator
            .allocate(240, dt(11, 8, 0), &[pair()], &ctx, &excluded)
            .expect("排除后应当落位成功");

        assert_eq!(allocation.segments[0].start, dt(11, 8, 0));
    }

    #[test]
    fn test_weekend_skipped() {
        // 周五 16:00 起 120 分钟: 周五只余 60, 周末跳过, 周一续 60
        let ctx = ctx_with_pair(1.0);
        let allocator = SlotAllocator::new();

        let allocation = allocator
            .allocate(120, dt(15, 16, 0), &[pair()], &ctx, &HashSet::new())
            .expect("应当落位成功");

        assert_eq!(allocation.segments.len(), 2);
        assert_eq!(allocation.segments[0].start, dt(15, 16, 0));
        assert_eq!(allocation.segments[0].end, dt(15, 17, 0));
        assert_eq!(allocation.segments[1].start, dt(18, 8, 0));
        assert_eq!(allocation.segments[1].end, dt(18, 9, 0));
    }
}
