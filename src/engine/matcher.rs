// ==========================================
// 机加工车间排产系统 - 资源匹配引擎
// ==========================================
// 输入: 工序的设备/机组要求
// 输出: 按序的 (设备, 操作工) 候选列表
// ==========================================
// 红线: 指定设备是硬约束，绝不回退到"机组内任意设备"；
// 无可用组合时返回空列表 (不是错误)，由调用方按"无产能"处理
// ==========================================

use crate::domain::job::Operation;
use crate::engine::context::SchedulingContext;
use std::cmp::Ordering;

// ==========================================
// CandidatePair - 候选 (设备, 操作工) 对
// ==========================================
#[derive(Debug, Clone)]
pub struct CandidatePair {
    pub machine_id: String,       // 设备ID
    pub operator_id: String,      // 操作工ID
    pub preference_rank: i32,     // 偏好序 (越小越优先)
    pub proficiency_level: i32,   // 熟练度 (越大越优先)
    pub workload_minutes: i64,    // 当前已排工时 (越少越优先)
    pub efficiency_modifier: f64, // 设备效率 (越大越优先)
}

// ==========================================
// ResourceMatcher - 资源匹配引擎
// ==========================================
pub struct ResourceMatcher {
    // 无状态引擎,不需要注入依赖
}

impl ResourceMatcher {
    /// 构造函数
    pub fn new() -> Self {
        Self {}
    }

    // ==========================================
    // 核心方法
    // ==========================================

    /// 枚举工序的候选 (设备, 操作工) 对
    ///
    /// 排序键:
    /// 1) preference_rank 升序
    /// 2) proficiency_level 降序
    /// 3) workload_minutes 升序
    /// 4) efficiency_modifier 降序
    /// 并列时保持插入序 (稳定排序)
    ///
    /// # 参数
    /// - `operation`: 工序
    /// - `ctx`: 排产上下文
    ///
    /// # 返回
    /// 候选列表；无可用组合时为空列表
    pub fn candidates(
        &self,
        operation: &Operation,
        ctx: &SchedulingContext,
    ) -> Vec<CandidatePair> {
        let eligible_machines = self.eligible_machines(operation, ctx);

        let mut candidates = Vec::new();
        for machine_id in &eligible_machines {
            let machine = match ctx.machines.get(machine_id) {
                Some(m) => m,
                None => continue,
            };

            for qual in ctx
                .qualifications
                .iter()
                .filter(|q| &q.machine_id == machine_id)
            {
                if !ctx.operators.contains_key(&qual.operator_id) {
                    continue;
                }

                candidates.push(CandidatePair {
                    machine_id: machine_id.clone(),
                    operator_id: qual.operator_id.clone(),
                    preference_rank: qual.preference_rank,
                    proficiency_level: qual.proficiency_level,
                    workload_minutes: ctx.operator_workload_minutes(&qual.operator_id),
                    efficiency_modifier: machine.efficiency_modifier,
                });
            }
        }

        // sort_by 是稳定排序，并列时保持插入序
        candidates.sort_by(|a, b| Self::compare(a, b));
        candidates
    }

    // ==========================================
    // 辅助方法
    // ==========================================

    /// 确定工序的可用设备集合
    ///
    /// 指定设备: 仅该设备 (且须 ACTIVE)。
    /// 指定机组: 机组内全部 ACTIVE 设备。
    fn eligible_machines(&self, operation: &Operation, ctx: &SchedulingContext) -> Vec<String> {
        if let Some(machine_id) = &operation.required_machine_id {
            // 硬约束: 指定设备不可用时就是无候选，不做机组替代
            return match ctx.machines.get(machine_id) {
                Some(machine) if machine.is_active() => vec![machine_id.clone()],
                _ => Vec::new(),
            };
        }

        if let Some(group_code) = &operation.required_group_code {
            return ctx
                .group_members
                .get(group_code)
                .map(|ids| {
                    ids.iter()
                        .filter(|id| {
                            ctx.machines
                                .get(*id)
                                .map(|m| m.is_active())
                                .unwrap_or(false)
                        })
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
        }

        Vec::new()
    }

    /// 比较两个候选的优先级
    fn compare(a: &CandidatePair, b: &CandidatePair) -> Ordering {
        // 1. preference_rank 升序
        match a.preference_rank.cmp(&b.preference_rank) {
            Ordering::Equal => {}
            other => return other,
        }

        // 2. proficiency_level 降序
        match b.proficiency_level.cmp(&a.proficiency_level) {
            Ordering::Equal => {}
            other => return other,
        }

        // 3. workload_minutes 升序
        match a.workload_minutes.cmp(&b.workload_minutes) {
            Ordering::Equal => {}
            other => return other,
        }

        // 4. efficiency_modifier 降序
        b.efficiency_modifier.total_cmp(&a.efficiency_modifier)
    }
}

// ==========================================
// Default trait 实现
// ==========================================
impl Default for ResourceMatcher {
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
    use crate::domain::resource::{Machine, Operator, Qualification};
    use crate::domain::types::{MachineStatus, RoutingStatus};
    use chrono::NaiveDate;
    use std::collections::HashMap;

    fn empty_ctx() -> SchedulingContext {
        let now = NaiveDate::from_ymd_opt(2025, 8, 11)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        SchedulingContext {
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
            inspection_enqueued_ops: std::collections::HashSet::new(),
        }
    }

    fn add_machine(ctx: &mut SchedulingContext, id: &str, status: MachineStatus, eff: f64) {
        ctx.machines.insert(
            id.to_string(),
            Machine {
                machine_id: id.to_string(),
                machine_name: id.to_string(),
                status,
                efficiency_modifier: eff,
            },
        );
    }

    fn add_operator(ctx: &mut SchedulingContext, id: &str) {
        ctx.operators.insert(
            id.to_string(),
            Operator {
                operator_id: id.to_string(),
                display_code: None,
                operator_name: id.to_string(),
                shift_class: None,
                shift_pattern_code: None,
                custom_start_time: None,
                custom_end_time: None,
            },
        );
    }

    fn add_qualification(
        ctx: &mut SchedulingContext,
        operator_id: &str,
        machine_id: &str,
        proficiency: i32,
        preference: i32,
    ) {
        ctx.qualifications.push(Qualification {
            operator_id: operator_id.to_string(),
            machine_id: machine_id.to_string(),
            proficiency_level: proficiency,
            preference_rank: preference,
        });
    }

    fn machine_op(machine_id: &str) -> crate::domain::job::Operation {
        crate::domain::job::Operation {
            operation_id: "OP1".to_string(),
            job_id: "J1".to_string(),
            sequence_order: 1,
            operation_name: "铣削".to_string(),
            operation_type: None,
            estimated_minutes: 60,
            required_machine_id: Some(machine_id.to_string()),
            required_group_code: None,
            outsourced_flag: false,
            vendor_lead_days: 0,
            inspection_flag: false,
            routing_status: RoutingStatus::Pending,
        }
    }

    fn group_op(group_code: &str) -> crate::domain::job::Operation {
        let mut op = machine_op("unused");
        op.required_machine_id = None;
        op.required_group_code = Some(group_code.to_string());
        op
    }

    #[test]
    fn test_specific_machine_never_substituted() {
        // 指定设备停用时: 空列表，绝不回退到机组
        let mut ctx = empty_ctx();
        add_machine(&mut ctx, "M1", MachineStatus::Inactive, 1.0);
        add_machine(&mut ctx, "M2", MachineStatus::Active, 1.0);
        ctx.group_members
            .insert("G1".to_string(), vec!["M1".to_string(), "M2".to_string()]);
        add_operator(&mut ctx, "OP1");
        add_qualification(&mut ctx, "OP1", "M1", 3, 1);
        add_qualification(&mut ctx, "OP1", "M2", 3, 1);

        let matcher = ResourceMatcher::new();
        let candidates = matcher.candidates(&machine_op("M1"), &ctx);

        assert!(candidates.is_empty());
    }

    #[test]
    fn test_group_enumerates_active_members() {
        let mut ctx = empty_ctx();
        add_machine(&mut ctx, "M1", MachineStatus::Active, 1.0);
        add_machine(&mut ctx, "M2", MachineStatus::Inactive, 1.0);
        add_machine(&mut ctx, "M3", MachineStatus::Active, 1.0);
        ctx.group_members.insert(
            "G1".to_string(),
            vec!["M1".to_string(), "M2".to_string(), "M3".to_string()],
        );
        add_operator(&mut ctx, "OP1");
        add_qualification(&mut ctx, "OP1", "M1", 3, 1);
        add_qualification(&mut ctx, "OP1", "M2", 3, 1);
        add_qualification(&mut ctx, "OP1", "M3", 3, 1);

        let matcher = ResourceMatcher::new();
        let candidates = matcher.candidates(&group_op("G1"), &ctx);

        let machines: Vec<&str> = candidates.iter().map(|c| c.machine_id.as_str()).collect();
        assert_eq!(machines, vec!["M1", "M3"]);
    }

    #[test]
    fn test_ranking_preference_first() {
        let mut ctx = empty_ctx();
        add_machine(&mut ctx, "M1", MachineStatus::Active, 1.0);
        ctx.group_members.insert("G1".to_string(), vec!["M1".to_string()]);
        add_operator(&mut ctx, "A");
        add_operator(&mut ctx, "B");
        // A 偏好序 2 但熟练度高, B 偏好序 1
        add_qualification(&mut ctx, "A", "M1", 5, 2);
        add_qualification(&mut ctx, "B", "M1", 1, 1);

        let matcher = ResourceMatcher::new();
        let candidates = matcher.candidates(&group_op("G1"), &ctx);

        assert_eq!(candidates[0].operator_id, "B");
        assert_eq!(candidates[1].operator_id, "A");
    }

    #[test]
    fn test_ranking_proficiency_then_efficiency() {
        let mut ctx = empty_ctx();
        add_machine(&mut ctx, "SLOW", MachineStatus::Active, 0.8);
        add_machine(&mut ctx, "FAST", MachineStatus::Active, 1.2);
        ctx.group_members.insert(
            "G1".to_string(),
            vec!["SLOW".to_string(), "FAST".to_string()],
        );
        add_operator(&mut ctx, "A");
        // 同偏好同熟练度同负载: 效率高的设备在前
        add_qualification(&mut ctx, "A", "SLOW", 3, 1);
        add_qualification(&mut ctx, "A", "FAST", 3, 1);

        let matcher = ResourceMatcher::new();
        let candidates = matcher.candidates(&group_op("G1"), &ctx);

        assert_eq!(candidates[0].machine_id, "FAST");
        assert_eq!(candidates[1].machine_id, "SLOW");
    }

    #[test]
    fn test_no_qualified_combination_returns_empty() {
        let mut ctx = empty_ctx();
        add_machine(&mut ctx, "M1", MachineStatus::Active, 1.0);
        ctx.group_members.insert("G1".to_string(), vec!["M1".to_string()]);
        // 无任何资质

        let matcher = ResourceMatcher::new();
        let candidates = matcher.candidates(&group_op("G1"), &ctx);

        assert!(candidates.is_empty());
    }
}
