//! 待重试写入队列
//!
//! 存储写入失败时不阻塞会话：写入进入队列，每次提交与会话收尾时重试。
//! 同一词条同一类写入只保留最新的一条。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::traits::{StoreError, VocabStore};
use crate::scheduler::SchedulingState;
use crate::vocab::{ItemId, PoolEntry};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PendingWrite {
    SchedulingState { item_id: ItemId, state: SchedulingState },
    Mnemonic { item_id: ItemId, text: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum WriteKind {
    SchedulingState,
    Mnemonic,
}

impl PendingWrite {
    pub fn item_id(&self) -> &str {
        match self {
            PendingWrite::SchedulingState { item_id, .. } | PendingWrite::Mnemonic { item_id, .. } => {
                item_id
            }
        }
    }

    fn kind(&self) -> WriteKind {
        match self {
            PendingWrite::SchedulingState { .. } => WriteKind::SchedulingState,
            PendingWrite::Mnemonic { .. } => WriteKind::Mnemonic,
        }
    }

    /// 执行写入
    pub async fn apply(&self, store: &dyn VocabStore) -> Result<(), StoreError> {
        match self {
            PendingWrite::SchedulingState { item_id, state } => {
                store.put_scheduling_state(item_id, state).await
            }
            PendingWrite::Mnemonic { item_id, text } => store.put_mnemonic(item_id, text).await,
        }
    }
}

/// 失败写入的重试队列
#[derive(Debug, Default)]
pub struct PendingWrites {
    writes: BTreeMap<(ItemId, WriteKind), PendingWrite>,
}

impl PendingWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// 入队；覆盖同一词条同类的旧写入
    pub fn push(&mut self, write: PendingWrite) {
        let key = (write.item_id().to_string(), write.kind());
        if self.writes.insert(key, write).is_some() {
            tracing::debug!("Superseded an older pending write");
        }
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// 丢弃某词条的待写状态（该词条已有更新的写入成功落盘）
    pub fn discard_state(&mut self, item_id: &str) {
        self.writes
            .remove(&(item_id.to_string(), WriteKind::SchedulingState));
    }

    pub fn discard_mnemonic(&mut self, item_id: &str) {
        self.writes.remove(&(item_id.to_string(), WriteKind::Mnemonic));
    }

    /// 某词条尚未落盘的最新调度状态
    pub fn pending_state(&self, item_id: &str) -> Option<&SchedulingState> {
        match self
            .writes
            .get(&(item_id.to_string(), WriteKind::SchedulingState))
        {
            Some(PendingWrite::SchedulingState { state, .. }) => Some(state),
            _ => None,
        }
    }

    /// 某词条尚未落盘的助记
    pub fn pending_mnemonic(&self, item_id: &str) -> Option<&str> {
        match self.writes.get(&(item_id.to_string(), WriteKind::Mnemonic)) {
            Some(PendingWrite::Mnemonic { text, .. }) => Some(text),
            _ => None,
        }
    }

    /// 用尚未落盘的写入覆盖从存储读出的词条；返回被覆盖的词条数
    pub fn overlay(&self, pool: &mut [PoolEntry]) -> usize {
        if self.writes.is_empty() {
            return 0;
        }
        let mut patched = 0;
        for entry in pool.iter_mut() {
            let mut touched = false;
            if let Some(state) = self.pending_state(&entry.item.id) {
                entry.state = state.clone();
                touched = true;
            }
            if let Some(text) = self.pending_mnemonic(&entry.item.id) {
                entry.item.mnemonic = Some(text.to_string());
                touched = true;
            }
            if touched {
                patched += 1;
            }
        }
        patched
    }

    /// 逐条重试；仍失败的留在队列中。返回剩余条数
    pub async fn flush(&mut self, store: &dyn VocabStore) -> usize {
        if self.writes.is_empty() {
            return 0;
        }
        let pending = std::mem::take(&mut self.writes);
        let total = pending.len();
        for (key, write) in pending {
            match write.apply(store).await {
                Ok(()) => {}
                Err(StoreError::NotFound(id)) => {
                    tracing::warn!(item_id = %id, "Dropping pending write for missing item");
                }
                Err(e) => {
                    tracing::debug!(item_id = %key.0, error = %e, "Pending write still failing");
                    self.writes.insert(key, write);
                }
            }
        }
        let remaining = self.writes.len();
        if remaining < total {
            tracing::info!(
                flushed = total - remaining,
                remaining,
                "Flushed pending writes"
            );
        }
        remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{ItemStatus, SchedulingState};
    use crate::store::memory::InMemoryStore;
    use crate::vocab::{LexicalPayload, VocabularyItem};
    use chrono::Utc;

    async fn store_with(id: &str) -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .add_item(
                "u1",
                VocabularyItem::new(
                    id,
                    LexicalPayload::Other {
                        lemma: "ja".into(),
                        translation: "yes".into(),
                    },
                ),
            )
            .await
            .unwrap();
        store
    }

    fn state(interval: u32) -> SchedulingState {
        let mut s = SchedulingState::new(Utc::now());
        s.status = ItemStatus::Review;
        s.interval = interval;
        s
    }

    #[test]
    fn test_latest_write_per_item_wins() {
        let mut outbox = PendingWrites::new();
        outbox.push(PendingWrite::SchedulingState {
            item_id: "a".into(),
            state: state(3),
        });
        outbox.push(PendingWrite::SchedulingState {
            item_id: "a".into(),
            state: state(8),
        });
        outbox.push(PendingWrite::Mnemonic {
            item_id: "a".into(),
            text: "m".into(),
        });
        assert_eq!(outbox.len(), 2);
        outbox.discard_mnemonic("a");
        assert_eq!(outbox.len(), 1);
    }

    #[tokio::test]
    async fn test_flush_retries_until_store_recovers() {
        let store = store_with("a").await;
        let mut outbox = PendingWrites::new();
        outbox.push(PendingWrite::SchedulingState {
            item_id: "a".into(),
            state: state(8),
        });

        store.set_failing_writes(true);
        assert_eq!(outbox.flush(&store).await, 1);

        store.set_failing_writes(false);
        assert_eq!(outbox.flush(&store).await, 0);
        assert!(outbox.is_empty());
        assert_eq!(store.state_of("a").await.unwrap().interval, 8);
    }

    #[tokio::test]
    async fn test_overlay_prefers_unpersisted_writes() {
        let store = store_with("a").await;
        store.set_failing_writes(true);
        let mut outbox = PendingWrites::new();
        let mut newer = state(0);
        newer.status = ItemStatus::Learning;
        newer.consecutive_mistakes = 1;
        outbox.push(PendingWrite::SchedulingState {
            item_id: "a".into(),
            state: newer.clone(),
        });
        outbox.push(PendingWrite::Mnemonic {
            item_id: "a".into(),
            text: "ja = yes".into(),
        });
        assert_eq!(outbox.flush(&store).await, 2);

        let mut pool = store.get_pool("u1").await.unwrap();
        assert_eq!(pool[0].state.consecutive_mistakes, 0);
        assert_eq!(outbox.overlay(&mut pool), 1);
        assert_eq!(pool[0].state, newer);
        assert_eq!(pool[0].item.mnemonic.as_deref(), Some("ja = yes"));
        assert_eq!(outbox.pending_state("b"), None);
        assert_eq!(outbox.pending_mnemonic("a"), Some("ja = yes"));
    }

    #[tokio::test]
    async fn test_flush_drops_writes_for_missing_items() {
        let store = InMemoryStore::new();
        let mut outbox = PendingWrites::new();
        outbox.push(PendingWrite::Mnemonic {
            item_id: "ghost".into(),
            text: "boo".into(),
        });
        assert_eq!(outbox.flush(&store).await, 0);
    }
}
