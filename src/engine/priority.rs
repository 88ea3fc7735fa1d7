// ==========================================
// 机加工车间排产系统 - 优先级评分引擎
// ==========================================
// 规则: 各项独立计算后相加, 最终封顶 1000
// 幂等: 相同输入必得相同评分
// 红线: 本引擎只读工单与客户分层，绝不触碰占用数据
// ==========================================

use crate::config::SchedulerConfig;
use crate::domain::job::{Job, Operation};
use chrono::NaiveDate;

// ==========================================
// 评分常量
// ==========================================

/// 客户分层权重上限
pub const TIER_WEIGHT_MAX: i32 = 400;

/// 已逾期加分
pub const LATE_BONUS: i32 = 250;

/// 加急加分
pub const EXPEDITE_BONUS: i32 = 200;

/// 紧迫度阶梯: (距承诺交付天数上限, 加分)，互斥，取最紧一档
pub const URGENCY_LADDER: [(i64, i32); 3] = [(7, 150), (14, 100), (21, 50)];

/// 装配父单加分
pub const ASSEMBLY_PARENT_BONUS: i32 = 50;

/// 子件继承抬升量 (父单评分 + 50)
pub const INHERITANCE_BONUS: i32 = 50;

/// 外协加分: 每天周期加多少分
pub const OUTSOURCING_BONUS_PER_DAY: i32 = 5;

/// 外协加分封顶
pub const OUTSOURCING_BONUS_CAP: i32 = 100;

/// 评分封顶
pub const SCORE_CAP: i32 = 1000;

// ==========================================
// ScoreBreakdown - 评分明细
// ==========================================
#[derive(Debug, Clone)]
pub struct ScoreBreakdown {
    pub total: i32,            // 最终评分 [0,1000]
    pub tier_weight: i32,      // 客户分层权重
    pub late_bonus: i32,       // 已逾期加分
    pub expedite_bonus: i32,   // 加急加分
    pub urgency_bonus: i32,    // 紧迫度阶梯加分
    pub assembly_bonus: i32,   // 装配父单加分
    pub outsourcing_bonus: i32,// 外协加分
    pub expedite_derived: bool,// 本次评分推导出加急 (需回写 expedite_flag)
}

impl ScoreBreakdown {
    /// 生成评分原因 (可解释性)
    ///
    /// # 返回
    /// JSON 格式的评分原因字符串
    pub fn reason_json(&self) -> String {
        format!(
            r#"{{"tier_weight":{},"late_bonus":{},"expedite_bonus":{},"urgency_bonus":{},"assembly_bonus":{},"outsourcing_bonus":{},"total":{}}}"#,
            self.tier_weight,
            self.late_bonus,
            self.expedite_bonus,
            self.urgency_bonus,
            self.assembly_bonus,
            self.outsourcing_bonus,
            self.total
        )
    }
}

// ==========================================
// PriorityScorer - 优先级评分引擎
// ==========================================
pub struct PriorityScorer {
    // 无状态引擎,不需要注入依赖
}

impl PriorityScorer {
    /// 构造函数
    pub fn new() -> Self {
        Self {}
    }

    // ==========================================
    // 核心方法
    // ==========================================

    /// 计算工单优先级评分
    ///
    /// 各项规则独立计算后相加, min(sum, 1000):
    /// 1) 客户分层权重 0-400 (未知客户按0计)
    /// 2) 已逾期 +250
    /// 3) 加急 +200 (下单到承诺交付不足窗口天数, 或显式加急标志)
    /// 4) 紧迫度阶梯 ≤7天+150 / ≤14天+100 / ≤21天+50 (互斥)
    /// 5) 装配父单 +50
    /// 6) 外协 +5/天, 封顶 +100
    ///
    /// # 参数
    /// - `job`: 工单
    /// - `operations`: 工单的工序列表 (外协周期取其中最大值)
    /// - `tier_weight`: 客户分层权重
    /// - `today`: 基准日期
    /// - `config`: 排产参数
    ///
    /// # 返回
    /// 评分明细（含最终评分与各项构成）
    pub fn score(
        &self,
        job: &Job,
        operations: &[Operation],
        tier_weight: i32,
        today: NaiveDate,
        config: &SchedulerConfig,
    ) -> ScoreBreakdown {
        // 1) 客户分层权重 (脏数据一律夹回 [0,400])
        let tier_weight = tier_weight.clamp(0, TIER_WEIGHT_MAX);

        // 2) 已逾期
        let late_bonus = match job.promised_date {
            Some(promised) if today > promised => LATE_BONUS,
            _ => 0,
        };

        // 3) 加急: 显式标志, 或下单到承诺交付的间隔不足窗口
        let mut expedite_derived = false;
        let expedite_bonus = if job.expedite_flag {
            EXPEDITE_BONUS
        } else {
            match (job.order_date, job.promised_date) {
                (Some(order), Some(promised))
                    if (promised - order).num_days() < config.expedite_window_days =>
                {
                    expedite_derived = true;
                    EXPEDITE_BONUS
                }
                _ => 0,
            }
        };

        // 4) 紧迫度阶梯 (互斥, 最紧一档生效; 已逾期也落入 ≤7 档)
        let urgency_bonus = match job.promised_date {
            Some(promised) => {
                let days_until = (promised - today).num_days();
                URGENCY_LADDER
                    .iter()
                    .find(|(limit, _)| days_until <= *limit)
                    .map(|(_, bonus)| *bonus)
                    .unwrap_or(0)
            }
            None => 0,
        };

        // 5) 装配父单
        let assembly_bonus = if job.is_assembly_parent() {
            ASSEMBLY_PARENT_BONUS
        } else {
            0
        };

        // 6) 外协: 工单内最长的外协周期
        let max_lead_days = operations
            .iter()
            .filter(|op| op.outsourced_flag)
            .map(|op| op.vendor_lead_days.max(0))
            .max()
            .unwrap_or(0);
        let outsourcing_bonus =
            ((max_lead_days as i32) * OUTSOURCING_BONUS_PER_DAY).min(OUTSOURCING_BONUS_CAP);

        let sum = tier_weight
            + late_bonus
            + expedite_bonus
            + urgency_bonus
            + assembly_bonus
            + outsourcing_bonus;

        ScoreBreakdown {
            total: sum.clamp(0, SCORE_CAP),
            tier_weight,
            late_bonus,
            expedite_bonus,
            urgency_bonus,
            assembly_bonus,
            outsourcing_bonus,
            expedite_derived,
        }
    }

    /// 子件继承抬升
    ///
    /// 子件评分抬升至 (父单评分 + 50)，只升不降，仍封顶 1000
    ///
    /// # 参数
    /// - `component_score`: 子件自身评分
    /// - `parent_score`: 父单评分
    pub fn inherit_from_parent(&self, component_score: i32, parent_score: i32) -> i32 {
        let floor = (parent_score + INHERITANCE_BONUS).min(SCORE_CAP);
        component_score.max(floor)
    }
}

// ==========================================
// Default trait 实现
// ==========================================
impl Default for PriorityScorer {
    fn default() -> Self {
        Self::new()
    }
}

// ==========================================
// 测试模块
// ==========================================
#[cfg(test)]
mod tests;
