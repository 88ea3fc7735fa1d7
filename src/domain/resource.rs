// ==========================================
// 机加工车间排产系统 - 资源领域模型
// ==========================================
// 设备/操作工/资质/班次/请假
// ==========================================
// 红线: 操作工只有一个稳定标识 operator_id，
// 工牌号等外部编码一律作为展示属性 display_code
// ==========================================

use crate::domain::types::MachineStatus;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

// ==========================================
// Machine - 设备
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    pub machine_id: String,       // 设备ID
    pub machine_name: String,     // 设备名称
    pub status: MachineStatus,    // 设备状态
    pub efficiency_modifier: f64, // 效率系数 (>0, 乘在吞吐上: 越大越快)
}

impl Machine {
    pub fn is_active(&self) -> bool {
        self.status == MachineStatus::Active
    }

    /// 将标准工时折算为该设备上的实际占用工时 (分钟)
    ///
    /// 效率系数乘在吞吐上: modifier=2.0 表示同样工时产出翻倍,
    /// 实际占用减半。系数非法时按 1.0 兜底。
    pub fn wall_clock_minutes(&self, nominal_minutes: i64) -> i64 {
        let modifier = if self.efficiency_modifier.is_finite() && self.efficiency_modifier > 0.0 {
            self.efficiency_modifier
        } else {
            1.0
        };
        ((nominal_minutes as f64) / modifier).ceil() as i64
    }
}

// ==========================================
// Operator - 操作工
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operator {
    pub operator_id: String,              // 操作工ID (唯一稳定标识)
    pub display_code: Option<String>,     // 工牌号 (仅展示)
    pub operator_name: String,            // 姓名
    pub shift_class: Option<String>,      // 班组
    pub shift_pattern_code: Option<String>, // 班次模板编码
    pub custom_start_time: Option<NaiveTime>, // 个人自定义上班时间
    pub custom_end_time: Option<NaiveTime>,   // 个人自定义下班时间
}

// ==========================================
// Qualification - 资质 (操作工×设备)
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Qualification {
    pub operator_id: String,    // 操作工ID
    pub machine_id: String,     // 设备ID
    pub proficiency_level: i32, // 熟练度 (越大越熟练)
    pub preference_rank: i32,   // 偏好序 (越小越优先)
}

// ==========================================
// OperatorDaySchedule - 按周几的显式排班
// ==========================================
// weekday: 1=周一 ... 7=周日 (chrono::Weekday::number_from_monday)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorDaySchedule {
    pub operator_id: String,   // 操作工ID
    pub weekday: u32,          // 周几
    pub start_time: NaiveTime, // 上班时间
    pub end_time: NaiveTime,   // 下班时间 (early于start视为跨夜)
}

// ==========================================
// ShiftPattern - 班次模板
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftPattern {
    pub pattern_code: String,  // 模板编码
    pub pattern_name: String,  // 模板名称
    pub start_time: NaiveTime, // 上班时间
    pub end_time: NaiveTime,   // 下班时间
    pub workdays: Vec<u32>,    // 工作日集合 (1=周一..7=周日)
}

impl ShiftPattern {
    /// 解析数据库中 "1,2,3,4,5" 形式的工作日串
    pub fn parse_workdays(raw: &str) -> Vec<u32> {
        raw.split(',')
            .filter_map(|s| s.trim().parse::<u32>().ok())
            .filter(|d| (1..=7).contains(d))
            .collect()
    }

    /// 转换为数据库存储的工作日串
    pub fn workdays_to_db(&self) -> String {
        self.workdays
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

// ==========================================
// TimeOff - 请假/休假
// ==========================================
// 审批通过的请假在日历解析中具有最高优先级
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeOff {
    pub time_off_id: String,    // 请假记录ID
    pub operator_id: String,    // 操作工ID
    pub start_date: NaiveDate,  // 起始日 (含)
    pub end_date: NaiveDate,    // 结束日 (含)
    pub reason: Option<String>, // 事由
    pub approved: bool,         // 是否审批通过
}

impl TimeOff {
    /// 判断某天是否落在请假区间内
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.approved && date >= self.start_date && date <= self.end_date
    }
}

// ==========================================
// Customer - 客户 (评分用分层权重)
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: String,   // 客户ID
    pub customer_name: String, // 客户名称
    pub tier_weight: i32,      // 分层权重 [0,400]
}
