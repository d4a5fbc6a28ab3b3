//! 引擎错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 EngineError 决定重试生成 / 排队写入 / 占位降级 / 拒绝。

use thiserror::Error;

use crate::generation::GenerationError;
use crate::session::SessionError;
use crate::store::StoreError;

/// 编排器运行过程中可能出现的错误（生成、存储、数据完整性、状态机拒绝）
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Data integrity: {0}")]
    DataIntegrity(String),

    #[error("Rejected: {0}")]
    Session(#[from] SessionError),

    #[error("No active session")]
    NoSession,

    #[error("Config error: {0}")]
    Config(String),
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// 阶段进入 Failed，等待用户重试；调度状态不变
    RetryGeneration,
    /// 写入进入重试队列，会话继续
    QueueWrite,
    /// 以占位内容继续
    UsePlaceholder,
    /// 拒绝本次操作，原因返回给调用方
    Reject(String),
}
