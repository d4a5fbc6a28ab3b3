//! 存储抽象层
//!
//! 定义词池与调度状态的统一读写接口，编排器只依赖该 trait，支持内存与 SQLite 两种实现

use async_trait::async_trait;
use thiserror::Error;

use crate::scheduler::SchedulingState;
use crate::vocab::{ItemId, PoolEntry, VocabularyItem};

/// 存储错误
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Write rejected: {0}")]
    Rejected(String),

    #[error("Item not found: {0}")]
    NotFound(ItemId),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// 暂时性错误：写入可以排队稍后重试
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable(_) | StoreError::Sqlite(_) | StoreError::Io(_)
        )
    }
}

/// 词池存储接口
#[async_trait]
pub trait VocabStore: Send + Sync {
    /// 读取用户的全部词条及其调度状态；内容不完整的词条以占位内容返回
    async fn get_pool(&self, user_id: &str) -> Result<Vec<PoolEntry>, StoreError>;

    /// 覆盖写入词条的调度状态（只在调度器产出新状态后调用）
    async fn put_scheduling_state(
        &self,
        item_id: &str,
        state: &SchedulingState,
    ) -> Result<(), StoreError>;

    /// 更新助记
    async fn put_mnemonic(&self, item_id: &str, text: &str) -> Result<(), StoreError>;

    /// 新增词条（默认调度状态）；已存在时只更新内容，保留调度状态
    async fn add_item(&self, user_id: &str, item: VocabularyItem) -> Result<(), StoreError>;

    /// 存储名称（日志用）
    fn name(&self) -> &str {
        "store"
    }
}
