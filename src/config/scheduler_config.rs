// ==========================================
// 机加工车间排产系统 - 排产参数
// ==========================================
// 红线: 业务参数必须显式传入各引擎，
// 禁止隐藏在模块级状态里，保证测试可确定性地覆盖
// ==========================================

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 挤占阈值默认值 (相对优先级差 15%)
pub const DEFAULT_DISPLACEMENT_THRESHOLD: f64 = 0.15;

/// 撤销台账保留时长默认值 (小时)
pub const DEFAULT_UNDO_RETENTION_HOURS: i64 = 24;

/// 前向搜索视野默认值 (天)
pub const DEFAULT_SEARCH_HORIZON_DAYS: i64 = 60;

/// 加急判定窗口默认值 (下单到承诺交付不足28天视为加急)
pub const DEFAULT_EXPEDITE_WINDOW_DAYS: i64 = 28;

/// "高优先级"告警线默认值
pub const DEFAULT_HIGH_PRIORITY_ALERT_THRESHOLD: i32 = 700;

// ==========================================
// SchedulerConfig - 排产参数集
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// 挤占阈值: (请求方评分 - 占用方评分) / 占用方评分 须大于该值
    pub displacement_threshold: f64,

    /// 撤销台账保留时长 (小时)
    pub undo_retention_hours: i64,

    /// 时段分配器前向搜索视野 (天)
    pub search_horizon_days: i64,

    /// 默认班次: 上班时间
    pub default_shift_start: NaiveTime,

    /// 默认班次: 下班时间
    pub default_shift_end: NaiveTime,

    /// 默认工作日 (1=周一..7=周日)
    pub default_workdays: Vec<u32>,

    /// 工序间转运衔接时长默认值 (分钟)
    pub transfer_lag_minutes: i64,

    /// 按工序类型对的转运时长覆盖, 键格式 "from/to"
    pub transfer_lag_overrides: HashMap<String, i64>,

    /// 加急判定窗口 (天)
    pub expedite_window_days: i64,

    /// 请假改排中"高优先级受影响"的告警线
    pub high_priority_alert_threshold: i32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            displacement_threshold: DEFAULT_DISPLACEMENT_THRESHOLD,
            undo_retention_hours: DEFAULT_UNDO_RETENTION_HOURS,
            search_horizon_days: DEFAULT_SEARCH_HORIZON_DAYS,
            default_shift_start: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
            default_shift_end: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or_default(),
            default_workdays: vec![1, 2, 3, 4, 5],
            transfer_lag_minutes: 0,
            transfer_lag_overrides: HashMap::new(),
            expedite_window_days: DEFAULT_EXPEDITE_WINDOW_DAYS,
            high_priority_alert_threshold: DEFAULT_HIGH_PRIORITY_ALERT_THRESHOLD,
        }
    }
}

impl SchedulerConfig {
    /// 查询两个工序类型之间的转运衔接时长 (分钟)
    ///
    /// # 参数
    /// - `from_type`: 前道工序类型
    /// - `to_type`: 后道工序类型
    pub fn transfer_lag_between(&self, from_type: Option<&str>, to_type: Option<&str>) -> i64 {
        if let (Some(from), Some(to)) = (from_type, to_type) {
            let key = format!("{}/{}", from, to);
            if let Some(lag) = self.transfer_lag_overrides.get(&key) {
                return *lag;
            }
        }
        self.transfer_lag_minutes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = SchedulerConfig::default();
        assert!((config.displacement_threshold - 0.15).abs() < f64::EPSILON);
        assert_eq!(config.undo_retention_hours, 24);
        assert_eq!(config.default_workdays, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_transfer_lag_override() {
        let mut config = SchedulerConfig::default();
        config.transfer_lag_minutes = 10;
        config
            .transfer_lag_overrides
            .insert("MILLING/GRINDING".to_string(), 45);

        assert_eq!(
            config.transfer_lag_between(Some("MILLING"), Some("GRINDING")),
            45
        );
        // 未命中覆盖时回落到默认值
        assert_eq!(config.transfer_lag_between(Some("TURNING"), Some("GRINDING")), 10);
        assert_eq!(config.transfer_lag_between(None, Some("GRINDING")), 10);
    }
}
