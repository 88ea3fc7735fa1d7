use super::PriorityScorer;
use crate::config::SchedulerConfig;
use crate::domain::job::{Job, Operation};
use crate::domain::types::{JobStatus, JobType, RoutingStatus};
use chrono::NaiveDate;

// ==========================================
// 测试辅助函数
// ==========================================

/// 创建测试用的工单
fn create_test_job(
    job_id: &str,
    job_type: JobType,
    order_date: Option<NaiveDate>,
    promised_date: Option<NaiveDate>,
    expedite_flag: bool,
) -> Job {
    let now = NaiveDate::from_ymd_opt(2025, 8, 1)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap();
    Job {
        job_id: job_id.to_string(),
        customer_id: "CUST01".to_string(),
        job_name: job_id.to_string(),
        job_type,
        parent_job_id: None,
        assembly_sequence: None,
        status: JobStatus::Pending,
        schedule_locked: false,
        expedite_flag,
        priority_score: 0,
        priority_reason: None,
        order_date,
        promised_date,
        due_date: promised_date,
        revision: 0,
        created_at: now,
        updated_at: now,
    }
}

/// 创建测试用的外协工序
fn outsourced_operation(job_id: &str, lead_days: i64) -> Operation {
    Operation {
        operation_id: format!("{}-OS", job_id),
        job_id: job_id.to_string(),
        sequence_order: 10,
        operation_name: "外协热处理".to_string(),
        operation_type: None,
        estimated_minutes: 0,
        required_machine_id: None,
        required_group_code: None,
        outsourced_flag: true,
        vendor_lead_days: lead_days,
        inspection_flag: false,
        routing_status: RoutingStatus::Pending,
    }
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 8, 11).unwrap()
}

// ==========================================
// 各评分项测试
// ==========================================

#[test]
fn test_tier_weight_only() {
    let scorer = PriorityScorer::new();
    let config = SchedulerConfig::default();
    // 承诺交付很远，其他项都不触发
    let job = create_test_job(
        "J1",
        JobType::Standard,
        Some(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()),
        Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()),
        false,
    );

    let breakdown = scorer.score(&job, &[], 300, today(), &config);
    assert_eq!(breakdown.total, 300);
    assert_eq!(breakdown.tier_weight, 300);
    assert_eq!(breakdown.late_bonus, 0);
    assert_eq!(breakdown.urgency_bonus, 0);
}

#[test]
fn test_tier_weight_clamped() {
    // 脏数据: 权重超上限/为负都夹回 [0,400]
    let scorer = PriorityScorer::new();
    let config = SchedulerConfig::default();
    let job = create_test_job(
        "J1",
        JobType::Standard,
        None,
        Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()),
        false,
    );

    let over = scorer.score(&job, &[], 9999, today(), &config);
    assert_eq!(over.tier_weight, 400);

    let negative = scorer.score(&job, &[], -50, today(), &config);
    assert_eq!(negative.tier_weight, 0);
}

#[test]
fn test_late_bonus_plus_urgency() {
    // 已逾期: +250, 且逾期也落入 ≤7 天档 +150
    let scorer = PriorityScorer::new();
    let config = SchedulerConfig::default();
    let job = create_test_job(
        "J1",
        JobType::Standard,
        Some(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()),
        Some(NaiveDate::from_ymd_opt(2025, 8, 1).unwrap()),
        false,
    );

    let breakdown = scorer.score(&job, &[], 0, today(), &config);
    assert_eq!(breakdown.late_bonus, 250);
    assert_eq!(breakdown.urgency_bonus, 150);
    assert_eq!(breakdown.total, 400);
}

#[test]
fn test_expedite_derived_from_window() {
    // 下单到承诺交付 20 天 < 28 天窗口 => 加急, 且标记需回写
    let scorer = PriorityScorer::new();
    let config = SchedulerConfig::default();
    let job = create_test_job(
        "J1",
        JobType::Standard,
        Some(NaiveDate::from_ymd_opt(2025, 9, 1).unwrap()),
        Some(NaiveDate::from_ymd_opt(2025, 9, 21).unwrap()),
        false,
    );

    let breakdown = scorer.score(&job, &[], 0, today(), &config);
    assert_eq!(breakdown.expedite_bonus, 200);
    assert!(breakdown.expedite_derived);
}

#[test]
fn test_expedite_explicit_flag() {
    let scorer = PriorityScorer::new();
    let config = SchedulerConfig::default();
    let job = create_test_job(
        "J1",
        JobType::Standard,
        None,
        Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()),
        true,
    );

    let breakdown = scorer.score(&job, &[], 0, today(), &config);
    assert_eq!(breakdown.expedite_bonus, 200);
    // 标志本来就有，不需要再回写
    assert!(!breakdown.expedite_derived);
}

#[test]
fn test_urgency_ladder_tiers() {
    let scorer = PriorityScorer::new();
    let config = SchedulerConfig::default();
    let cases = [
        (5, 150),  // ≤7
        (7, 150),
        (10, 100), // ≤14
        (14, 100),
        (20, 50),  // ≤21
        (21, 50),
        (22, 0),
        (90, 0),
    ];

    for (days_ahead, expected) in cases {
        let promised = today() + chrono::Duration::days(days_ahead);
        let job = create_test_job("J1", JobType::Standard, None, Some(promised), false);
        let breakdown = scorer.score(&job, &[], 0, today(), &config);
        assert_eq!(
            breakdown.urgency_bonus, expected,
            "days_ahead={}",
            days_ahead
        );
    }
}

#[test]
fn test_assembly_parent_bonus() {
    let scorer = PriorityScorer::new();
    let config = SchedulerConfig::default();
    let job = create_test_job(
        "J1",
        JobType::AssemblyParent,
        None,
        Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()),
        false,
    );

    let breakdown = scorer.score(&job, &[], 0, today(), &config);
    assert_eq!(breakdown.assembly_bonus, 50);
    assert_eq!(breakdown.total, 50);
}

#[test]
fn test_outsourcing_bonus_capped() {
    let scorer = PriorityScorer::new();
    let config = SchedulerConfig::default();
    let job = create_test_job(
        "J1",
        JobType::Standard,
        None,
        Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()),
        false,
    );

    // 10 天 => +50
    let ops = vec![outsourced_operation("J1", 10)];
    let breakdown = scorer.score(&job, &ops, 0, today(), &config);
    assert_eq!(breakdown.outsourcing_bonus, 50);

    // 45 天 => 225, 封顶 +100
    let ops = vec![outsourced_operation("J1", 45)];
    let breakdown = scorer.score(&job, &ops, 0, today(), &config);
    assert_eq!(breakdown.outsourcing_bonus, 100);
}

#[test]
fn test_score_capped_at_1000() {
    // 所有项叠满: 400 + 250 + 200 + 150 + 50 + 100 = 1150 => 1000
    let scorer = PriorityScorer::new();
    let config = SchedulerConfig::default();
    let job = create_test_job(
        "J1",
        JobType::AssemblyParent,
        Some(NaiveDate::from_ymd_opt(2025, 7, 20).unwrap()),
        Some(NaiveDate::from_ymd_opt(2025, 8, 1).unwrap()),
        false,
    );
    let ops = vec![outsourced_operation("J1", 30)];

    let breakdown = scorer.score(&job, &ops, 400, today(), &config);
    assert_eq!(breakdown.total, 1000);
}

#[test]
fn test_adversarial_dates_stay_in_bounds() {
    // 极端日期 (远古/远未来) 下评分必须仍落在 [0,1000]
    let scorer = PriorityScorer::new();
    let config = SchedulerConfig::default();

    let ancient = create_test_job(
        "J1",
        JobType::Standard,
        Some(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()),
        Some(NaiveDate::from_ymd_opt(1970, 1, 2).unwrap()),
        false,
    );
    let b = scorer.score(&ancient, &[], 400, today(), &config);
    assert!((0..=1000).contains(&b.total));

    let far_future = create_test_job(
        "J2",
        JobType::Standard,
        Some(NaiveDate::from_ymd_opt(2025, 8, 1).unwrap()),
        Some(NaiveDate::from_ymd_opt(9999, 12, 31).unwrap()),
        false,
    );
    let b = scorer.score(&far_future, &[], 400, today(), &config);
    assert!((0..=1000).contains(&b.total));

    // 可选字段全缺失
    let bare = create_test_job("J3", JobType::Standard, None, None, false);
    let b = scorer.score(&bare, &[], 0, today(), &config);
    assert_eq!(b.total, 0);
}

#[test]
fn test_idempotent() {
    let scorer = PriorityScorer::new();
    let config = SchedulerConfig::default();
    let job = create_test_job(
        "J1",
        JobType::AssemblyParent,
        Some(NaiveDate::from_ymd_opt(2025, 8, 1).unwrap()),
        Some(NaiveDate::from_ymd_opt(2025, 8, 20).unwrap()),
        false,
    );

    let first = scorer.score(&job, &[], 200, today(), &config);
    let second = scorer.score(&job, &[], 200, today(), &config);
    assert_eq!(first.total, second.total);
}

// ==========================================
// 子件继承测试
// ==========================================

#[test]
fn test_inheritance_raises_component() {
    let scorer = PriorityScorer::new();
    // 父单 600 => 子件下限 650
    assert_eq!(scorer.inherit_from_parent(100, 600), 650);
}

#[test]
fn test_inheritance_never_lowers() {
    let scorer = PriorityScorer::new();
    // 子件自身 900 高于父单+50, 保持不变
    assert_eq!(scorer.inherit_from_parent(900, 600), 900);
}

#[test]
fn test_inheritance_capped() {
    let scorer = PriorityScorer::new();
    // 父单 980 + 50 => 封顶 1000
    assert_eq!(scorer.inherit_from_parent(100, 980), 1000);
}

#[test]
fn test_reason_json_contains_factors() {
    let scorer = PriorityScorer::new();
    let config = SchedulerConfig::default();
    let job = create_test_job(
        "J1",
        JobType::Standard,
        None,
        Some(NaiveDate::from_ymd_opt(2025, 8, 15).unwrap()),
        false,
    );

    let breakdown = scorer.score(&job, &[], 100, today(), &config);
    let reason = breakdown.reason_json();
    assert!(reason.contains("\"tier_weight\":100"));
    assert!(reason.contains("\"urgency_bonus\":150"));
}
