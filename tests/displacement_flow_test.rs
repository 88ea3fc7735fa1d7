// ==========================================
// 挤占引擎集成测试
// ==========================================
// 测试目标: 高优先级工单挤占低优先级占用的完整链路,
// 锁定/阈值保护, 审计落库
// ==========================================

mod helpers;

use helpers::test_data_builder::{JobBuilder, OperationBuilder};
use chrono::NaiveDate;
use workshop_aps::config::ConfigManager;
use workshop_aps::domain::resource::Customer;
use workshop_aps::domain::types::{DisplacementOutcome, JobStatus, RoutingStatus};
use workshop_aps::engine::{ScheduleError, ScheduleOrchestrator, ScheduleRepositories};
use workshop_aps::logging;

/// 播种"机器被低优先级工单占满"的场景
///
/// 搜索视野压到 1 天, B 单吃满周一+周二的全部工时
fn setup_occupied_machine(
    high_tier: i32,
    low_tier: i32,
    lock_low: bool,
) -> (
    tempfile::NamedTempFile,
    ScheduleRepositories,
    ScheduleOrchestrator,
) {
    logging::init_test();
    let (temp_file, db_path) = test_helpers::create_test_db().expect("建库失败");
    let conn = test_helpers::open_test_connection(&db_path).expect("连接失败");
    let repos = ScheduleRepositories::new(conn.clone());
    let orchestrator = ScheduleOrchestrator::new(conn.clone()).expect("创建编排器失败");

    let config = ConfigManager::from_connection(conn).expect("创建配置管理器失败");
    config
        .set_global_config_value("search_horizon_days", "1")
        .expect("写配置失败");

    test_helpers::seed_machine(&repos, "M1", 1.0).expect("播种设备失败");
    test_helpers::seed_operator_with_qualification(&repos, "OP1", "M1", 3, 1)
        .expect("播种操作工失败");

    repos
        .customers
        .create(&Customer {
            customer_id: "CUST-STD".to_string(),
            customer_name: "普通客户".to_string(),
            tier_weight: low_tier,
        })
        .expect("创建客户失败");
    repos
        .customers
        .create(&Customer {
            customer_id: "CUST-VIP".to_string(),
            customer_name: "重点客户".to_string(),
            tier_weight: high_tier,
        })
        .expect("创建客户失败");

    // B: 低优先级, 1080 分钟吃满周一+周二
    let mut low_builder = JobBuilder::new("B")
        .customer("CUST-STD")
        .promised_date(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
    if lock_low {
        low_builder = low_builder.locked();
    }
    repos.jobs.create(&low_builder.build()).expect("创建工单失败");
    repos
        .operations
        .create(&OperationBuilder::new("B-10", "B", 10).machine("M1").minutes(1080).build())
        .expect("创建工序失败");

    orchestrator
        .schedule_job("B", test_helpers::base_now())
        .expect("B 排产应当成功");
    assert_eq!(
        repos.bookings.find_by_operation("B-10").expect("查询失败").len(),
        2
    );

    // A: 高优先级 (分层 + 临近交付 + 加急)
    repos
        .jobs
        .create(
            &JobBuilder::new("A")
                .customer("CUST-VIP")
                .order_date(NaiveDate::from_ymd_opt(2025, 8, 5).unwrap())
                .promised_date(NaiveDate::from_ymd_opt(2025, 8, 12).unwrap())
                .build(),
        )
        .expect("创建工单失败");
    repos
        .operations
        .create(&OperationBuilder::new("A-10", "A", 10).machine("M1").minutes(240).build())
        .expect("创建工序失败");

    (temp_file, repos, orchestrator)
}

#[test]
fn test_high_priority_displaces_low_priority() {
    // 场景: A(750) 需要 M1 四小时, B(100) 占满
    // 差距远超 15% 阈值 => B 整单被挤, 标记待重排
    let (_tmp, repos, orchestrator) = setup_occupied_machine(400, 100, false);

    let outcome = orchestrator
        .schedule_job("A", test_helpers::base_now())
        .expect("挤占后排产应当成功");

    assert!(outcome.displacement_triggered);
    assert_eq!(outcome.displaced_operations, 1);
    assert_eq!(outcome.priority_score, 750);

    // A 拿到周一 08:00-12:00
    let a_bookings = repos.bookings.find_by_operation("A-10").expect("查询失败");
    assert_eq!(a_bookings.len(), 1);
    assert_eq!(a_bookings[0].start_at, test_helpers::dt(11, 8, 0));
    assert_eq!(a_bookings[0].end_at, test_helpers::dt(11, 12, 0));

    // B 的占用全部删除 (一段被挤, 下游时序失效整单级联)
    assert!(repos.bookings.find_by_operation("B-10").expect("查询失败").is_empty());
    let b_op = repos
        .operations
        .find_by_id("B-10")
        .expect("查询失败")
        .expect("工序存在");
    assert_eq!(b_op.routing_status, RoutingStatus::NeedsRescheduling);
    let b_job = repos.jobs.find_by_id("B").expect("查询失败").expect("工单存在");
    assert_eq!(b_job.status, JobStatus::Pending);

    // 审计: 一次触发一条记录, 含前后对照
    let records = repos
        .displacement
        .find_by_trigger_job("A")
        .expect("查询失败");
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.outcome, DisplacementOutcome::Success);
    assert_eq!(record.displaced_count, 1);
    assert_eq!(record.details.len(), 1);
    assert_eq!(record.details[0].operation_id, "B-10");
    assert_eq!(record.details[0].before_start_at, Some(test_helpers::dt(11, 8, 0)));
    assert_eq!(record.impact.affected_customers, 1);
    assert_eq!(record.impact.affected_machines, 1);
    assert!((record.impact.total_hours_displaced - 18.0).abs() < 1e-9);

    // 撤销台账已建立
    let entries = repos.undo.list_all().expect("查询失败");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].snapshots.len(), 2);

    test_helpers::assert_no_double_booking(&repos);
}

#[test]
fn test_locked_job_immune_to_displacement() {
    // 锁定工单: 无论差距多大都不可挤
    let (_tmp, repos, orchestrator) = setup_occupied_machine(400, 100, true);

    let result = orchestrator.schedule_job("A", test_helpers::base_now());

    match result {
        Err(ScheduleError::DisplacementInfeasible {
            blocking_booking_ids,
            ..
        }) => {
            assert_eq!(blocking_booking_ids.len(), 2);
        }
        other => panic!("应当挤占不可行, 实际 {:?}", other.map(|o| o.job_id)),
    }

    // 一无所动: B 的占用原样, A 没有任何占用
    assert_eq!(
        repos.bookings.find_by_operation("B-10").expect("查询失败").len(),
        2
    );
    assert!(repos.bookings.find_by_operation("A-10").expect("查询失败").is_empty());
    let a_job = repos.jobs.find_by_id("A").expect("查询失败").expect("工单存在");
    assert_eq!(a_job.status, JobStatus::Pending);

    // 失败也记审计 (批次之外落库)
    let records = repos
        .displacement
        .find_by_trigger_job("A")
        .expect("查询失败");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, DisplacementOutcome::Infeasible);
    assert_eq!(records[0].displaced_count, 0);
}

#[test]
fn test_gap_within_threshold_fails_closed() {
    // A(400) vs B(380): 差距 5.3% < 15% 阈值 => 不挤, 一无所动
    logging::init_test();
    let (_tmp, db_path) = test_helpers::create_test_db().expect("建库失败");
    let conn = test_helpers::open_test_connection(&db_path).expect("连接失败");
    let repos = ScheduleRepositories::new(conn.clone());
    let orchestrator = ScheduleOrchestrator::new(conn.clone()).expect("创建编排器失败");

    let config = ConfigManager::from_connection(conn).expect("创建配置管理器失败");
    config
        .set_global_config_value("search_horizon_days", "1")
        .expect("写配置失败");

    test_helpers::seed_machine(&repos, "M1", 1.0).expect("播种设备失败");
    test_helpers::seed_operator_with_qualification(&repos, "OP1", "M1", 3, 1)
        .expect("播种操作工失败");
    repos
        .customers
        .create(&Customer {
            customer_id: "CUST-380".to_string(),
            customer_name: "客户380".to_string(),
            tier_weight: 380,
        })
        .expect("创建客户失败");
    repos
        .customers
        .create(&Customer {
            customer_id: "CUST-400".to_string(),
            customer_name: "客户400".to_string(),
            tier_weight: 400,
        })
        .expect("创建客户失败");

    let far = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
    repos
        .jobs
        .create(&JobBuilder::new("B").customer("CUST-380").promised_date(far).build())
        .expect("创建工单失败");
    repos
        .operations
        .create(&OperationBuilder::new("B-10", "B", 10).machine("M1").minutes(1080).build())
        .expect("创建工序失败");
    orchestrator
        .schedule_job("B", test_helpers::base_now())
        .expect("B 排产应当成功");

    repos
        .jobs
        .create(&JobBuilder::new("A").customer("CUST-400").promised_date(far).build())
        .expect("创建工单失败");
    repos
        .operations
        .create(&OperationBuilder::new("A-10", "A", 10).machine("M1").minutes(240).build())
        .expect("创建工序失败");

    let result = orchestrator.schedule_job("A", test_helpers::base_now());
    assert!(matches!(
        result,
        Err(ScheduleError::DisplacementInfeasible { .. })
    ));

    // B 原样, A 没有任何占用
    assert_eq!(
        repos.bookings.find_by_operation("B-10").expect("查询失败").len(),
        2
    );
    assert!(repos.bookings.find_by_operation("A-10").expect("查询失败").is_empty());
    test_helpers::assert_no_double_booking(&repos);
}
