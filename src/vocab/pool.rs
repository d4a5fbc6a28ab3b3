//! 词池条目：词条与其调度状态的组合（存储读出的基本单位）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scheduler::{ItemStatus, SchedulingState};
use crate::vocab::VocabularyItem;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolEntry {
    pub item: VocabularyItem,
    pub state: SchedulingState,
}

impl PoolEntry {
    pub fn new(item: VocabularyItem, state: SchedulingState) -> Self {
        Self { item, state }
    }

    /// 首次入池：默认调度状态
    pub fn fresh(item: VocabularyItem, now: DateTime<Utc>) -> Self {
        Self {
            item,
            state: SchedulingState::new(now),
        }
    }

    pub fn id(&self) -> &str {
        &self.item.id
    }

    pub fn status(&self) -> ItemStatus {
        self.state.status
    }
}
