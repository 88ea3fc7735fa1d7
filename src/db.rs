// ==========================================
// 机加工车间排产系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为，避免"部分模块外键开启/部分不开启"
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 内置建库 DDL，库与测试共用同一套 schema
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
///
/// 说明：
/// - 版本号用于**提示/告警**（不做自动迁移），避免静默在旧库上运行导致隐性错误。
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要"每个连接"单独开启
/// - busy_timeout 需要"每个连接"单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 初始化数据库 schema（幂等）
///
/// # 参数
/// - `conn`: 已打开的连接
///
/// # 返回
/// - `Ok(())`: 建表完成（已存在则跳过）
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_DDL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;

    Ok(())
}

// ==========================================
// 建库 DDL
// ==========================================
// 约定:
// - 时间戳统一存 TEXT, 格式 %Y-%m-%d %H:%M:%S
// - 日期统一存 TEXT, 格式 %Y-%m-%d
// - 枚举统一存 SCREAMING_SNAKE_CASE 字符串
// ==========================================
const SCHEMA_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS config_scope (
    scope_id TEXT PRIMARY KEY,
    scope_type TEXT NOT NULL,
    scope_key TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(scope_type, scope_key)
);

INSERT OR IGNORE INTO config_scope (scope_id, scope_type, scope_key)
VALUES ('global', 'GLOBAL', 'global');

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id TEXT NOT NULL REFERENCES config_scope(scope_id) ON DELETE CASCADE,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

CREATE TABLE IF NOT EXISTS customer (
    customer_id TEXT PRIMARY KEY,
    customer_name TEXT NOT NULL,
    tier_weight INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS job (
    job_id TEXT PRIMARY KEY,
    customer_id TEXT NOT NULL,
    job_name TEXT NOT NULL,
    job_type TEXT NOT NULL DEFAULT 'STANDARD',
    parent_job_id TEXT,
    assembly_sequence INTEGER,
    status TEXT NOT NULL DEFAULT 'PENDING',
    schedule_locked INTEGER NOT NULL DEFAULT 0,
    expedite_flag INTEGER NOT NULL DEFAULT 0,
    priority_score INTEGER NOT NULL DEFAULT 0,
    priority_reason TEXT,
    order_date TEXT,
    promised_date TEXT,
    due_date TEXT,
    revision INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS operation (
    operation_id TEXT PRIMARY KEY,
    job_id TEXT NOT NULL REFERENCES job(job_id) ON DELETE CASCADE,
    sequence_order INTEGER NOT NULL,
    operation_name TEXT NOT NULL,
    operation_type TEXT,
    estimated_minutes INTEGER NOT NULL DEFAULT 0,
    required_machine_id TEXT,
    required_group_code TEXT,
    outsourced_flag INTEGER NOT NULL DEFAULT 0,
    vendor_lead_days INTEGER NOT NULL DEFAULT 0,
    inspection_flag INTEGER NOT NULL DEFAULT 0,
    routing_status TEXT NOT NULL DEFAULT 'PENDING',
    UNIQUE(job_id, sequence_order)
);

CREATE TABLE IF NOT EXISTS machine (
    machine_id TEXT PRIMARY KEY,
    machine_name TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'ACTIVE',
    efficiency_modifier REAL NOT NULL DEFAULT 1.0
);

CREATE TABLE IF NOT EXISTS machine_group_member (
    group_code TEXT NOT NULL,
    machine_id TEXT NOT NULL REFERENCES machine(machine_id) ON DELETE CASCADE,
    PRIMARY KEY (group_code, machine_id)
);

CREATE TABLE IF NOT EXISTS operator (
    operator_id TEXT PRIMARY KEY,
    display_code TEXT,
    operator_name TEXT NOT NULL,
    shift_class TEXT,
    shift_pattern_code TEXT,
    custom_start_time TEXT,
    custom_end_time TEXT
);

CREATE TABLE IF NOT EXISTS qualification (
    operator_id TEXT NOT NULL REFERENCES operator(operator_id) ON DELETE CASCADE,
    machine_id TEXT NOT NULL REFERENCES machine(machine_id) ON DELETE CASCADE,
    proficiency_level INTEGER NOT NULL DEFAULT 1,
    preference_rank INTEGER NOT NULL DEFAULT 99,
    PRIMARY KEY (operator_id, machine_id)
);

CREATE TABLE IF NOT EXISTS operator_day_schedule (
    operator_id TEXT NOT NULL REFERENCES operator(operator_id) ON DELETE CASCADE,
    weekday INTEGER NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL,
    PRIMARY KEY (operator_id, weekday)
);

CREATE TABLE IF NOT EXISTS shift_pattern (
    pattern_code TEXT PRIMARY KEY,
    pattern_name TEXT NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL,
    workdays TEXT NOT NULL DEFAULT '1,2,3,4,5'
);

CREATE TABLE IF NOT EXISTS time_off (
    time_off_id TEXT PRIMARY KEY,
    operator_id TEXT NOT NULL REFERENCES operator(operator_id) ON DELETE CASCADE,
    start_date TEXT NOT NULL,
    end_date TEXT NOT NULL,
    reason TEXT,
    approved INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS job_dependency (
    prerequisite_job_id TEXT NOT NULL REFERENCES job(job_id) ON DELETE CASCADE,
    dependent_job_id TEXT NOT NULL REFERENCES job(job_id) ON DELETE CASCADE,
    dependency_kind TEXT NOT NULL DEFAULT 'ASSEMBLY',
    PRIMARY KEY (prerequisite_job_id, dependent_job_id)
);

CREATE TABLE IF NOT EXISTS booking (
    booking_id TEXT PRIMARY KEY,
    operation_id TEXT NOT NULL REFERENCES operation(operation_id) ON DELETE CASCADE,
    job_id TEXT NOT NULL,
    machine_id TEXT NOT NULL,
    operator_id TEXT NOT NULL,
    start_at TEXT NOT NULL,
    end_at TEXT NOT NULL,
    duration_minutes INTEGER NOT NULL,
    chunk_index INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'SCHEDULED',
    locked INTEGER NOT NULL DEFAULT 0,
    method TEXT NOT NULL DEFAULT 'AUTO',
    revision INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_booking_machine_time ON booking(machine_id, start_at);
CREATE INDEX IF NOT EXISTS idx_booking_operator_time ON booking(operator_id, start_at);
CREATE INDEX IF NOT EXISTS idx_booking_operation ON booking(operation_id);

CREATE TABLE IF NOT EXISTS displacement_record (
    record_id TEXT PRIMARY KEY,
    trigger_job_id TEXT NOT NULL,
    outcome TEXT NOT NULL,
    displaced_count INTEGER NOT NULL DEFAULT 0,
    rescheduled_count INTEGER NOT NULL DEFAULT 0,
    affected_customers INTEGER NOT NULL DEFAULT 0,
    affected_machines INTEGER NOT NULL DEFAULT 0,
    total_hours_displaced REAL NOT NULL DEFAULT 0,
    avg_delay_minutes REAL NOT NULL DEFAULT 0,
    execution_ms INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS displacement_detail (
    record_id TEXT NOT NULL REFERENCES displacement_record(record_id) ON DELETE CASCADE,
    operation_id TEXT NOT NULL,
    job_id TEXT NOT NULL,
    machine_id TEXT,
    operator_id TEXT,
    before_start_at TEXT,
    before_end_at TEXT,
    after_start_at TEXT,
    after_end_at TEXT,
    PRIMARY KEY (record_id, operation_id)
);

CREATE TABLE IF NOT EXISTS undo_entry (
    entry_id TEXT PRIMARY KEY,
    action_kind TEXT NOT NULL,
    trigger_job_id TEXT,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    reversed INTEGER NOT NULL DEFAULT 0,
    created_booking_ids TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS undo_booking_snapshot (
    entry_id TEXT NOT NULL REFERENCES undo_entry(entry_id) ON DELETE CASCADE,
    booking_id TEXT NOT NULL,
    operation_id TEXT NOT NULL,
    job_id TEXT NOT NULL,
    machine_id TEXT NOT NULL,
    operator_id TEXT NOT NULL,
    start_at TEXT NOT NULL,
    end_at TEXT NOT NULL,
    duration_minutes INTEGER NOT NULL,
    chunk_index INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    locked INTEGER NOT NULL DEFAULT 0,
    method TEXT NOT NULL,
    revision INTEGER NOT NULL,
    routing_status_before TEXT NOT NULL,
    PRIMARY KEY (entry_id, booking_id)
);

CREATE TABLE IF NOT EXISTS inspection_queue (
    ticket_id TEXT PRIMARY KEY,
    job_id TEXT NOT NULL,
    operation_id TEXT NOT NULL,
    priority_score INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'AWAITING',
    enqueued_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS alert_event (
    alert_id TEXT PRIMARY KEY,
    severity TEXT NOT NULL,
    alert_type TEXT NOT NULL,
    message TEXT NOT NULL,
    job_id TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        // 重复初始化不应报错
        init_schema(&conn).unwrap();

        let version = read_schema_version(&conn).unwrap();
        assert_eq!(version, Some(CURRENT_SCHEMA_VERSION));
    }
}
