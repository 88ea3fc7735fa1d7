// ==========================================
// 机加工车间排产系统 - 引擎层错误类型
// ==========================================
// 失败分类:
// - NoCapacity / Blocked / DisplacementInfeasible: 非致命，数据不变
// - InvariantViolation: 程序级故障，批次中止不提交
// - UndoConflict: 快照已过期/失效，拒绝回退
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 引擎层错误类型
#[derive(Error, Debug)]
pub enum ScheduleError {
    // ===== 非致命失败（数据模型不变，可重试/升级人工） =====
    #[error("无可用时段: job={job_id}, operation={operation_id}, 搜索视野 {horizon_days} 天内无法落位")]
    NoCapacity {
        job_id: String,
        operation_id: String,
        horizon_days: i64,
    },

    #[error("前置依赖未就绪: job={job_id}, 阻塞工单={blocking_jobs:?}")]
    Blocked {
        job_id: String,
        blocking_jobs: Vec<String>,
    },

    #[error("挤占不可行: job={job_id}, operation={operation_id}, 阻塞占用={blocking_booking_ids:?}")]
    DisplacementInfeasible {
        job_id: String,
        operation_id: String,
        blocking_booking_ids: Vec<String>,
    },

    // ===== 程序级故障 =====
    #[error("不变量被破坏: {0}")]
    InvariantViolation(String),

    // ===== 撤销 =====
    #[error("撤销冲突: entry={entry_id}: {message}")]
    UndoConflict { entry_id: String, message: String },

    // ===== 通用 =====
    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ScheduleError {
    /// 判断是否为非致命失败（数据未被改动，调用方可稍后重试）
    pub fn is_non_fatal(&self) -> bool {
        matches!(
            self,
            ScheduleError::NoCapacity { .. }
                | ScheduleError::Blocked { .. }
                | ScheduleError::DisplacementInfeasible { .. }
        )
    }
}

/// Result 类型别名
pub type ScheduleResult<T> = Result<T, ScheduleError>;
