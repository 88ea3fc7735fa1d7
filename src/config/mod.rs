// ==========================================
// 机加工车间排产系统 - 配置层
// ==========================================

pub mod config_manager;
pub mod scheduler_config;

pub use config_manager::ConfigManager;
pub use scheduler_config::SchedulerConfig;

use async_trait::async_trait;

/// 排产参数来源
///
/// Engine 层依赖该 trait 而非具体实现，
/// 测试可用内存实现确定性地注入参数
#[async_trait]
pub trait SchedulerConfigSource: Send + Sync {
    /// 加载当前排产参数集
    async fn load_config(&self) -> Result<SchedulerConfig, anyhow::Error>;
}

#[async_trait]
impl SchedulerConfigSource for ConfigManager {
    async fn load_config(&self) -> Result<SchedulerConfig, anyhow::Error> {
        self.load_scheduler_config()
            .map_err(|e| anyhow::anyhow!("加载排产参数失败: {}", e))
    }
}

/// 固定参数来源 (测试/嵌入场景)
pub struct StaticConfigSource {
    config: SchedulerConfig,
}

impl StaticConfigSource {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SchedulerConfigSource for StaticConfigSource {
    async fn load_config(&self) -> Result<SchedulerConfig, anyhow::Error> {
        Ok(self.config.clone())
    }
}

/// 配置键常量（config_kv 表, scope='global'）
pub mod config_keys {
    pub const DISPLACEMENT_THRESHOLD: &str = "displacement_threshold";
    pub const UNDO_RETENTION_HOURS: &str = "undo_retention_hours";
    pub const SEARCH_HORIZON_DAYS: &str = "search_horizon_days";
    pub const DEFAULT_SHIFT_START: &str = "default_shift_start";
    pub const DEFAULT_SHIFT_END: &str = "default_shift_end";
    pub const TRANSFER_LAG_MINUTES: &str = "transfer_lag_minutes";
    pub const EXPEDITE_WINDOW_DAYS: &str = "expedite_window_days";
    pub const HIGH_PRIORITY_ALERT_THRESHOLD: &str = "high_priority_alert_threshold";
}
