// ==========================================
// 请假触发改排集成测试
// ==========================================
// 测试目标: 请假落库后对相交占用的逐条评估:
// 进行中顺延 / 替补换人 / 删除级联重排 + 告警上报
// ==========================================

mod helpers;

use helpers::test_data_builder::{JobBuilder, OperationBuilder};
use chrono::{NaiveDate, NaiveDateTime};
use workshop_aps::domain::booking::Booking;
use workshop_aps::domain::resource::{Customer, TimeOff};
use workshop_aps::domain::types::{
    AlertType, BookingMethod, BookingStatus, JobStatus, RoutingStatus,
};
use workshop_aps::engine::{CollectingAlertSink, ScheduleOrchestrator, ScheduleRepositories};
use workshop_aps::logging;

fn setup_with_alert_sink() -> (
    tempfile::NamedTempFile,
    ScheduleRepositories,
    ScheduleOrchestrator,
    std::sync::Arc<CollectingAlertSink>,
) {
    logging::init_test();
    let (temp_file, db_path) = test_helpers::create_test_db().expect("建库失败");
    let conn = test_helpers::open_test_connection(&db_path).expect("连接失败");
    let repos = ScheduleRepositories::new(conn.clone());
    let sink = CollectingAlertSink::new();
    let orchestrator = ScheduleOrchestrator::new(conn)
        .expect("创建编排器失败")
        .with_alert_sink(sink.clone());
    (temp_file, repos, orchestrator, sink)
}

fn seed_booking(
    repos: &ScheduleRepositories,
    booking_id: &str,
    operation_id: &str,
    job_id: &str,
    operator_id: &str,
    start: NaiveDateTime,
    end: NaiveDateTime,
    status: BookingStatus,
    locked: bool,
) {
    repos
        .bookings
        .create(&Booking {
            booking_id: booking_id.to_string(),
            operation_id: operation_id.to_string(),
            job_id: job_id.to_string(),
            machine_id: "M1".to_string(),
            operator_id: operator_id.to_string(),
            start_at: start,
            end_at: end,
            duration_minutes: (end - start).num_minutes(),
            chunk_index: 0,
            status,
            locked,
            method: BookingMethod::Auto,
            revision: 0,
            created_at: start,
            updated_at: start,
        })
        .expect("播种占用失败");
}

fn seed_time_off(repos: &ScheduleRepositories, operator_id: &str) -> String {
    let time_off = TimeOff {
        time_off_id: "T1".to_string(),
        operator_id: operator_id.to_string(),
        start_date: NaiveDate::from_ymd_opt(2025, 8, 18).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2025, 8, 20).unwrap(),
        reason: Some("年假".to_string()),
        approved: true,
    };
    repos.time_off.create(&time_off).expect("创建请假失败")
}

#[tokio::test]
async fn test_in_progress_booking_shifted_to_return_day() {
    // 场景: 请假 8/18..20, 进行中占用在 8/19 10:00-14:00
    // => 顺延到 8/21 同一钟点, 绝不删除
    let (_tmp, repos, orchestrator, _sink) = setup_with_alert_sink();

    test_helpers::seed_machine(&repos, "M1", 1.0).expect("播种设备失败");
    test_helpers::seed_operator_with_qualification(&repos, "OP1", "M1", 3, 1)
        .expect("播种操作工失败");
    repos.jobs.create(&JobBuilder::new("J").build()).expect("创建工单失败");
    repos
        .operations
        .create(&OperationBuilder::new("J-10", "J", 10).machine("M1").minutes(240).build())
        .expect("创建工序失败");
    seed_booking(
        &repos,
        "BK-J",
        "J-10",
        "J",
        "OP1",
        test_helpers::dt(19, 10, 0),
        test_helpers::dt(19, 14, 0),
        BookingStatus::InProgress,
        true,
    );
    let time_off_id = seed_time_off(&repos, "OP1");

    let outcome = orchestrator
        .handle_time_off_async(&time_off_id, test_helpers::base_now())
        .await
        .expect("改排应当成功");

    assert_eq!(outcome.shifted, 1);
    assert_eq!(outcome.evicted, 0);

    let booking = repos
        .bookings
        .find_by_id("BK-J")
        .expect("查询失败")
        .expect("占用仍应存在");
    assert_eq!(booking.start_at, test_helpers::dt(21, 10, 0));
    assert_eq!(booking.end_at, test_helpers::dt(21, 14, 0));
    assert_eq!(booking.status, BookingStatus::InProgress);
    // 顺延抬升修订号
    assert_eq!(booking.revision, 1);

    // 撤销台账已建立
    let entries = repos.undo.list_all().expect("查询失败");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action_kind, "TIME_OFF");
}

#[tokio::test]
async fn test_scheduled_booking_substituted_by_idle_operator() {
    // OP2 同设备有资质且空闲 => 原时段换人, 不删不改期
    let (_tmp, repos, orchestrator, _sink) = setup_with_alert_sink();

    test_helpers::seed_machine(&repos, "M1", 1.0).expect("播种设备失败");
    test_helpers::seed_operator_with_qualification(&repos, "OP1", "M1", 3, 1)
        .expect("播种操作工失败");
    test_helpers::seed_operator_with_qualification(&repos, "OP2", "M1", 2, 2)
        .expect("播种操作工失败");
    repos.jobs.create(&JobBuilder::new("J").build()).expect("创建工单失败");
    repos
        .operations
        .create(&OperationBuilder::new("J-10", "J", 10).machine("M1").minutes(180).build())
        .expect("创建工序失败");
    seed_booking(
        &repos,
        "BK-J",
        "J-10",
        "J",
        "OP1",
        test_helpers::dt(19, 9, 0),
        test_helpers::dt(19, 12, 0),
        BookingStatus::Scheduled,
        false,
    );
    let time_off_id = seed_time_off(&repos, "OP1");

    let outcome = orchestrator
        .handle_time_off_async(&time_off_id, test_helpers::base_now())
        .await
        .expect("改排应当成功");

    assert_eq!(outcome.substituted, 1);
    assert_eq!(outcome.evicted, 0);

    // 原占用删除, 替补占用同时段换人
    assert!(repos.bookings.find_by_id("BK-J").expect("查询失败").is_none());
    let bookings = repos.bookings.find_by_operation("J-10").expect("查询失败");
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].operator_id, "OP2");
    assert_eq!(bookings[0].start_at, test_helpers::dt(19, 9, 0));
    assert_eq!(bookings[0].end_at, test_helpers::dt(19, 12, 0));

    // 工序无需重排
    let op = repos
        .operations
        .find_by_id("J-10")
        .expect("查询失败")
        .expect("工序存在");
    assert_eq!(op.routing_status, RoutingStatus::Pending);
    test_helpers::assert_no_double_booking(&repos);
}

#[tokio::test]
async fn test_no_substitute_evicts_and_alerts() {
    // 无替补 => 删除占用, 级联标记待重排, 告警上报
    let (_tmp, repos, orchestrator, sink) = setup_with_alert_sink();

    test_helpers::seed_machine(&repos, "M1", 1.0).expect("播种设备失败");
    test_helpers::seed_operator_with_qualification(&repos, "OP1", "M1", 3, 1)
        .expect("播种操作工失败");
    repos
        .customers
        .create(&Customer {
            customer_id: "CUST-VIP".to_string(),
            customer_name: "重点客户".to_string(),
            tier_weight: 400,
        })
        .expect("创建客户失败");

    // 高评分工单 (900): 受影响还要触发高优先级告警
    let mut job = JobBuilder::new("J").customer("CUST-VIP").build();
    job.status = JobStatus::Scheduled;
    job.priority_score = 900;
    repos.jobs.create(&job).expect("创建工单失败");
    repos
        .operations
        .create(&OperationBuilder::new("J-10", "J", 10).machine("M1").minutes(180).build())
        .expect("创建工序失败");
    repos
        .operations
        .create(&OperationBuilder::new("J-20", "J", 20).machine("M1").minutes(60).build())
        .expect("创建工序失败");
    seed_booking(
        &repos,
        "BK-J10",
        "J-10",
        "J",
        "OP1",
        test_helpers::dt(19, 9, 0),
        test_helpers::dt(19, 12, 0),
        BookingStatus::Scheduled,
        false,
    );
    seed_booking(
        &repos,
        "BK-J20",
        "J-20",
        "J",
        "OP1",
        test_helpers::dt(21, 9, 0),
        test_helpers::dt(21, 10, 0),
        BookingStatus::Scheduled,
        false,
    );
    let time_off_id = seed_time_off(&repos, "OP1");

    let outcome = orchestrator
        .handle_time_off_async(&time_off_id, test_helpers::base_now())
        .await
        .expect("改排应当成功");

    assert_eq!(outcome.evicted, 1);
    assert!(outcome.alerts_raised >= 2);

    // 被挤工序及下游占用全部删除并标记待重排
    assert!(repos.bookings.find_by_operation("J-10").expect("查询失败").is_empty());
    assert!(repos.bookings.find_by_operation("J-20").expect("查询失败").is_empty());
    for op_id in ["J-10", "J-20"] {
        let op = repos
            .operations
            .find_by_id(op_id)
            .expect("查询失败")
            .expect("工序存在");
        assert_eq!(op.routing_status, RoutingStatus::NeedsRescheduling);
    }
    let job = repos.jobs.find_by_id("J").expect("查询失败").expect("工单存在");
    assert_eq!(job.status, JobStatus::Pending);

    // 告警: 落库 + 外发, 绝不静默
    let alerts = repos.alerts.find_by_job("J").expect("查询失败");
    assert!(alerts
        .iter()
        .any(|a| a.alert_type == AlertType::NoSubstituteFound));
    assert!(alerts
        .iter()
        .any(|a| a.alert_type == AlertType::HighPriorityDisplaced));
    assert!(sink.len() >= 2);
}
