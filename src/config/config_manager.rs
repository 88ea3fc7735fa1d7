// ==========================================
// 机加工车间排产系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::config_keys;
use crate::config::scheduler_config::SchedulerConfig;
use crate::db::open_sqlite_connection;
use chrono::NaiveTime;
use rusqlite::{params, Connection};
use std::error::Error;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 写入 global scope 配置（UPSERT, 测试与运维用）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;

        Ok(())
    }

    /// 加载排产参数集：库中覆写项叠加在编译期默认值之上
    ///
    /// 说明：
    /// - 非法值（解析失败/非有限数）一律忽略，回落默认值，避免脏配置拖垮排产
    /// - 转运时长覆盖项以 `transfer_lag/` 为键前缀批量读取
    pub fn load_scheduler_config(&self) -> Result<SchedulerConfig, Box<dyn Error>> {
        let mut config = SchedulerConfig::default();

        if let Some(raw) = self.get_global_config_value(config_keys::DISPLACEMENT_THRESHOLD)? {
            if let Ok(v) = raw.trim().parse::<f64>() {
                if v.is_finite() && v >= 0.0 {
                    config.displacement_threshold = v;
                }
            }
        }

        if let Some(raw) = self.get_global_config_value(config_keys::UNDO_RETENTION_HOURS)? {
            if let Ok(v) = raw.trim().parse::<i64>() {
                if v > 0 {
                    config.undo_retention_hours = v;
                }
            }
        }

        if let Some(raw) = self.get_global_config_value(config_keys::SEARCH_HORIZON_DAYS)? {
            if let Ok(v) = raw.trim().parse::<i64>() {
                if v > 0 {
                    config.search_horizon_days = v;
                }
            }
        }

        if let Some(raw) = self.get_global_config_value(config_keys::DEFAULT_SHIFT_START)? {
            if let Ok(t) = NaiveTime::parse_from_str(raw.trim(), "%H:%M") {
                config.default_shift_start = t;
            }
        }

        if let Some(raw) = self.get_global_config_value(config_keys::DEFAULT_SHIFT_END)? {
            if let Ok(t) = NaiveTime::parse_from_str(raw.trim(), "%H:%M") {
                config.default_shift_end = t;
            }
        }

        if let Some(raw) = self.get_global_config_value(config_keys::TRANSFER_LAG_MINUTES)? {
            if let Ok(v) = raw.trim().parse::<i64>() {
                if v >= 0 {
                    config.transfer_lag_minutes = v;
                }
            }
        }

        if let Some(raw) = self.get_global_config_value(config_keys::EXPEDITE_WINDOW_DAYS)? {
            if let Ok(v) = raw.trim().parse::<i64>() {
                if v > 0 {
                    config.expedite_window_days = v;
                }
            }
        }

        if let Some(raw) =
            self.get_global_config_value(config_keys::HIGH_PRIORITY_ALERT_THRESHOLD)?
        {
            if let Ok(v) = raw.trim().parse::<i32>() {
                if (0..=1000).contains(&v) {
                    config.high_priority_alert_threshold = v;
                }
            }
        }

        // 转运时长覆盖: transfer_lag/<from>/<to> = minutes
        {
            let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            let mut stmt = conn.prepare(
                "SELECT key, value FROM config_kv
                 WHERE scope_id = 'global' AND key LIKE 'transfer_lag/%'",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            for row in rows {
                let (key, value) = row?;
                let pair = key.trim_start_matches("transfer_lag/").to_string();
                if let Ok(v) = value.trim().parse::<i64>() {
                    if v >= 0 {
                        config.transfer_lag_overrides.insert(pair, v);
                    }
                }
            }
        }

        Ok(config)
    }
}
