//! 错误恢复引擎
//!
//! 根据 EngineError 类型返回 RecoveryAction，供编排器决定是排队重试、降级还是直接拒绝。

use crate::core::{EngineError, RecoveryAction};
use crate::store::StoreError;

/// 语义化错误恢复：将错误映射为可执行动作
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &EngineError) -> RecoveryAction {
        match err {
            EngineError::Generation(_) => RecoveryAction::RetryGeneration,
            EngineError::Store(e) if e.is_transient() => RecoveryAction::QueueWrite,
            EngineError::Store(StoreError::Json(_)) | EngineError::DataIntegrity(_) => {
                RecoveryAction::UsePlaceholder
            }
            other => RecoveryAction::Reject(other.to_string()),
        }
    }
}
