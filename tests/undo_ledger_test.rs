// ==========================================
// 撤销台账集成测试
// ==========================================
// 测试目标: 挤占 → 保留期内整体回退 的闭环,
// 过期/再改动时的干净拒绝, 周期清扫
// ==========================================

mod helpers;

use helpers::test_data_builder::{JobBuilder, OperationBuilder};
use chrono::{Duration, NaiveDate};
use workshop_aps::config::ConfigManager;
use workshop_aps::domain::resource::Customer;
use workshop_aps::domain::types::{BookingStatus, RoutingStatus};
use workshop_aps::engine::{ScheduleError, ScheduleOrchestrator, ScheduleRepositories};
use workshop_aps::logging;

/// 播种并执行一次挤占: B 占满 M1, A 挤掉 B
///
/// 返回挤占产生的台账条目ID
fn setup_after_displacement() -> (
    tempfile::NamedTempFile,
    ScheduleRepositories,
    ScheduleOrchestrator,
    String,
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
            customer_id: "CUST-VIP".to_string(),
            customer_name: "重点客户".to_string(),
            tier_weight: 400,
        })
        .expect("创建客户失败");

    repos
        .jobs
        .create(
            &JobBuilder::new("B")
                .promised_date(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap())
                .build(),
        )
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
    orchestrator
        .schedule_job("A", test_helpers::base_now())
        .expect("挤占排产应当成功");

    let entries = repos.undo.list_all().expect("查询失败");
    assert_eq!(entries.len(), 1);
    let entry_id = entries[0].entry_id.clone();

    (temp_file, repos, orchestrator, entry_id)
}

#[test]
fn test_undo_displacement_round_trip() {
    let (_tmp, repos, orchestrator, entry_id) = setup_after_displacement();

    // 挤占后: B 无占用, A 占 08:00-12:00
    assert!(repos.bookings.find_by_operation("B-10").expect("查询失败").is_empty());
    assert_eq!(
        repos.bookings.find_by_operation("A-10").expect("查询失败").len(),
        1
    );

    orchestrator
        .reverse_undo(&entry_id, test_helpers::base_now() + Duration::hours(1))
        .expect("保留期内回退应当成功");

    // B 的两段占用按快照原样重建
    let restored = repos.bookings.find_by_operation("B-10").expect("查询失败");
    assert_eq!(restored.len(), 2);
    assert_eq!(restored[0].start_at, test_helpers::dt(11, 8, 0));
    assert_eq!(restored[0].end_at, test_helpers::dt(11, 17, 0));
    assert_eq!(restored[1].start_at, test_helpers::dt(12, 8, 0));
    assert_eq!(restored[1].end_at, test_helpers::dt(12, 17, 0));
    assert_eq!(restored[0].status, BookingStatus::Scheduled);

    // 挤占动作新建的占用一并删除
    assert!(repos.bookings.find_by_operation("A-10").expect("查询失败").is_empty());

    // 工序流转状态还原
    let b_op = repos
        .operations
        .find_by_id("B-10")
        .expect("查询失败")
        .expect("工序存在");
    assert_eq!(b_op.routing_status, RoutingStatus::Pending);

    // 条目标记已回退, 不可二次回退
    let entry = repos
        .undo
        .find_by_id(&entry_id)
        .expect("查询失败")
        .expect("条目存在");
    assert!(entry.reversed);

    let second = orchestrator.reverse_undo(&entry_id, test_helpers::base_now());
    assert!(matches!(second, Err(ScheduleError::UndoConflict { .. })));

    test_helpers::assert_no_double_booking(&repos);
}

#[test]
fn test_undo_rejected_after_further_modification() {
    let (_tmp, repos, orchestrator, entry_id) = setup_after_displacement();

    // 挤占产生的新占用又被改过 (开工), 回退必须拒绝
    let a_booking = &repos.bookings.find_by_operation("A-10").expect("查询失败")[0];
    repos
        .bookings
        .update_status(&a_booking.booking_id, BookingStatus::InProgress)
        .expect("更新状态失败");

    let result = orchestrator.reverse_undo(&entry_id, test_helpers::base_now());

    match result {
        Err(ScheduleError::UndoConflict { message, .. }) => {
            assert!(message.contains(&a_booking.booking_id));
        }
        other => panic!("应当拒绝回退, 实际 {:?}", other),
    }

    // 拒绝回退后一切原样
    assert_eq!(
        repos.bookings.find_by_operation("A-10").expect("查询失败").len(),
        1
    );
    assert!(repos.bookings.find_by_operation("B-10").expect("查询失败").is_empty());
}

#[test]
fn test_undo_expired_fails_cleanly() {
    let (_tmp, _repos, orchestrator, entry_id) = setup_after_displacement();

    // 默认保留 24h, 25h 后回退干净拒绝
    let after_expiry = test_helpers::base_now() + Duration::hours(25);
    let result = orchestrator.reverse_undo(&entry_id, after_expiry);

    match result {
        Err(ScheduleError::UndoConflict { message, .. }) => {
            assert!(message.contains("过期"));
        }
        other => panic!("应当过期拒绝, 实际 {:?}", other),
    }
}

#[test]
fn test_sweep_purges_expired_entries() {
    let (_tmp, repos, orchestrator, entry_id) = setup_after_displacement();

    // 未过期: 清扫不动它
    let purged = orchestrator
        .sweep_expired_undo(test_helpers::base_now() + Duration::hours(1))
        .expect("清扫失败");
    assert_eq!(purged, 0);

    // 过期后: 清扫删除
    let purged = orchestrator
        .sweep_expired_undo(test_helpers::base_now() + Duration::hours(25))
        .expect("清扫失败");
    assert_eq!(purged, 1);
    assert!(repos.undo.find_by_id(&entry_id).expect("查询失败").is_none());
}
