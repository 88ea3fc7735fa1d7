// ==========================================
// 机加工车间排产系统 - 工作日历解析引擎
// ==========================================
// 解析顺序 (首个命中生效):
// 1) 审批通过的请假 => 非工作日, 时长为0
// 2) 按周几的显式排班
// 3) 班次模板
// 4) 个人自定义时段
// 5) 默认周一至周五 08:00-17:00, 其余非工作日
// ==========================================
// 红线: 每次落位尝试、每次挤占评估都会调用本引擎，
// 必须保持纯函数、无副作用
// ==========================================

use crate::domain::calendar::{WindowSource, WorkingWindow};
use crate::engine::context::SchedulingContext;
use chrono::{Datelike, NaiveDate, NaiveTime};

// ==========================================
// CalendarResolver - 日历解析引擎
// ==========================================
pub struct CalendarResolver {
    // 无状态引擎,不需要注入依赖
}

impl CalendarResolver {
    /// 构造函数
    pub fn new() -> Self {
        Self {}
    }

    // ==========================================
    // 核心方法
    // ==========================================

    /// 解析操作工某天的工作窗口
    ///
    /// # 参数
    /// - `operator_id`: 操作工ID
    /// - `date`: 日历日
    /// - `ctx`: 排产上下文
    ///
    /// # 返回
    /// 工作窗口（非工作日时 is_working=false, 时长为0）
    pub fn resolve(
        &self,
        operator_id: &str,
        date: NaiveDate,
        ctx: &SchedulingContext,
    ) -> WorkingWindow {
        // 1) 审批通过的请假覆盖一切
        if ctx
            .time_off
            .iter()
            .any(|t| t.operator_id == operator_id && t.covers(date))
        {
            return WorkingWindow::non_working(date, WindowSource::TimeOff);
        }

        let weekday = date.weekday().number_from_monday();

        // 2) 按周几的显式排班
        if let Some(entry) = ctx.day_schedules.get(&(operator_id.to_string(), weekday)) {
            return Self::build_window(date, entry.start_time, entry.end_time, WindowSource::DaySchedule);
        }

        let operator = ctx.operators.get(operator_id);

        // 3) 班次模板
        if let Some(pattern_code) = operator.and_then(|o| o.shift_pattern_code.as_deref()) {
            if let Some(pattern) = ctx.shift_patterns.get(pattern_code) {
                if pattern.workdays.contains(&weekday) {
                    return Self::build_window(
                        date,
                        pattern.start_time,
                        pattern.end_time,
                        WindowSource::ShiftPattern,
                    );
                }
                return WorkingWindow::non_working(date, WindowSource::NonWorking);
            }
        }

        // 4) 个人自定义时段
        if let Some(op) = operator {
            if let (Some(start), Some(end)) = (op.custom_start_time, op.custom_end_time) {
                return Self::build_window(date, start, end, WindowSource::CustomHours);
            }
        }

        // 5) 默认: 配置的工作日 + 默认班次
        if ctx.config.default_workdays.contains(&weekday) {
            return Self::build_window(
                date,
                ctx.config.default_shift_start,
                ctx.config.default_shift_end,
                WindowSource::DefaultShift,
            );
        }

        WorkingWindow::non_working(date, WindowSource::NonWorking)
    }

    /// 从某天起向前找第一个工作日
    ///
    /// # 参数
    /// - `from`: 起始日 (含)
    /// - `max_days`: 最多向前看多少天
    ///
    /// # 返回
    /// - `Some(window)`: 首个工作窗口
    /// - `None`: 范围内全是非工作日
    pub fn next_working_window(
        &self,
        operator_id: &str,
        from: NaiveDate,
        max_days: i64,
        ctx: &SchedulingContext,
    ) -> Option<WorkingWindow> {
        let mut date = from;
        for _ in 0..max_days {
            let window = self.resolve(operator_id, date, ctx);
            if window.is_working {
                return Some(window);
            }
            date = date.succ_opt()?;
        }
        None
    }

    // ==========================================
    // 辅助方法
    // ==========================================

    /// 构造工作窗口，正确处理跨夜班
    ///
    /// end 不晚于 start 视为跨夜，结束时刻落在次日
    fn build_window(
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        source: WindowSource,
    ) -> WorkingWindow {
        let start = date.and_time(start_time);
        let overnight = end_time <= start_time;
        let end = if overnight {
            match date.succ_opt() {
                Some(next) => next.and_time(end_time),
                None => start, // 日历边界，按零时长兜底
            }
        } else {
            date.and_time(end_time)
        };

        let duration_minutes = (end - start).num_minutes().max(0);

        WorkingWindow {
            date,
            start,
            end,
            duration_minutes,
            overnight,
            is_working: duration_minutes > 0,
            source,
        }
    }
}

// ==========================================
// Default trait 实现
// ==========================================
impl Default for CalendarResolver {
    fn default() -> Self {
        Self::new()
    }
}
