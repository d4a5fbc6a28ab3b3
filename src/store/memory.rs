//! 内存存储：测试与无数据库运行时使用

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::traits::{StoreError, VocabStore};
use crate::scheduler::SchedulingState;
use crate::vocab::{ItemId, PoolEntry, VocabularyItem};

struct StoredEntry {
    user_id: String,
    entry: PoolEntry,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<ItemId, StoredEntry>,
    /// 插入顺序，保证 get_pool 输出稳定
    order: Vec<ItemId>,
}

/// 内存词池存储
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
    /// 置位后所有写入返回 Unavailable（模拟存储故障）
    failing_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接放入带调度状态的条目
    pub async fn insert(&self, user_id: &str, entry: PoolEntry) {
        let mut inner = self.inner.write().await;
        let id = entry.item.id.clone();
        if !inner.entries.contains_key(&id) {
            inner.order.push(id.clone());
        }
        inner.entries.insert(
            id,
            StoredEntry {
                user_id: user_id.to_string(),
                entry,
            },
        );
    }

    pub fn set_failing_writes(&self, failing: bool) {
        self.failing_writes.store(failing, Ordering::SeqCst);
    }

    /// 读取单个条目的当前状态
    pub async fn state_of(&self, item_id: &str) -> Option<SchedulingState> {
        let inner = self.inner.read().await;
        inner.entries.get(item_id).map(|s| s.entry.state.clone())
    }

    pub async fn mnemonic_of(&self, item_id: &str) -> Option<String> {
        let inner = self.inner.read().await;
        inner
            .entries
            .get(item_id)
            .and_then(|s| s.entry.item.mnemonic.clone())
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.failing_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store is failing writes".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl VocabStore for InMemoryStore {
    async fn get_pool(&self, user_id: &str) -> Result<Vec<PoolEntry>, StoreError> {
        let inner = self.inner.read().await;
        let pool = inner
            .order
            .iter()
            .filter_map(|id| inner.entries.get(id))
            .filter(|s| s.user_id == user_id)
            .map(|s| {
                let mut entry = s.entry.clone();
                entry.item.sanitize();
                entry
            })
            .collect();
        Ok(pool)
    }

    async fn put_scheduling_state(
        &self,
        item_id: &str,
        state: &SchedulingState,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        let stored = inner
            .entries
            .get_mut(item_id)
            .ok_or_else(|| StoreError::NotFound(item_id.to_string()))?;
        stored.entry.state = state.clone();
        Ok(())
    }

    async fn put_mnemonic(&self, item_id: &str, text: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        let stored = inner
            .entries
            .get_mut(item_id)
            .ok_or_else(|| StoreError::NotFound(item_id.to_string()))?;
        stored.entry.item.mnemonic = Some(text.to_string());
        Ok(())
    }

    async fn add_item(&self, user_id: &str, item: VocabularyItem) -> Result<(), StoreError> {
        self.check_writable()?;
        {
            let mut inner = self.inner.write().await;
            if let Some(stored) = inner.entries.get_mut(&item.id) {
                if stored.user_id != user_id {
                    return Err(StoreError::Rejected(format!(
                        "item {} belongs to another user",
                        item.id
                    )));
                }
                let mnemonic = item.mnemonic.clone().or(stored.entry.item.mnemonic.take());
                stored.entry.item = item;
                stored.entry.item.mnemonic = mnemonic;
                return Ok(());
            }
        }
        self.insert(user_id, PoolEntry::fresh(item, Utc::now())).await;
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ItemStatus;
    use crate::vocab::LexicalPayload;

    fn item(id: &str, lemma: &str) -> VocabularyItem {
        VocabularyItem::new(
            id,
            LexicalPayload::Adjective {
                lemma: lemma.into(),
                translation: "quick".into(),
            },
        )
    }

    #[tokio::test]
    async fn test_add_and_get_pool_per_user() {
        let store = InMemoryStore::new();
        store.add_item("u1", item("a", "schnell")).await.unwrap();
        store.add_item("u2", item("b", "langsam")).await.unwrap();
        store.add_item("u1", item("c", "klug")).await.unwrap();

        let pool = store.get_pool("u1").await.unwrap();
        let ids: Vec<&str> = pool.iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert!(pool.iter().all(|e| e.status() == ItemStatus::New));
    }

    #[tokio::test]
    async fn test_readd_keeps_scheduling_state() {
        let store = InMemoryStore::new();
        store.add_item("u1", item("a", "schnell")).await.unwrap();
        let mut state = store.state_of("a").await.unwrap();
        state.status = ItemStatus::Review;
        state.interval = 8;
        store.put_scheduling_state("a", &state).await.unwrap();
        store.put_mnemonic("a", "Schnellzug").await.unwrap();

        store.add_item("u1", item("a", "flink")).await.unwrap();
        let pool = store.get_pool("u1").await.unwrap();
        assert_eq!(pool[0].item.payload.lemma(), "flink");
        assert_eq!(pool[0].state.interval, 8);
        assert_eq!(pool[0].item.mnemonic.as_deref(), Some("Schnellzug"));
    }

    #[tokio::test]
    async fn test_incomplete_item_loads_as_placeholder() {
        let store = InMemoryStore::new();
        store.add_item("u1", item("a", "  ")).await.unwrap();
        let pool = store.get_pool("u1").await.unwrap();
        assert_eq!(pool[0].item.payload.lemma(), crate::vocab::PLACEHOLDER_LEMMA);
    }

    #[tokio::test]
    async fn test_failing_writes_and_missing_items() {
        let store = InMemoryStore::new();
        let state = SchedulingState::new(Utc::now());
        assert!(matches!(
            store.put_scheduling_state("nope", &state).await,
            Err(StoreError::NotFound(_))
        ));

        store.add_item("u1", item("a", "schnell")).await.unwrap();
        store.set_failing_writes(true);
        let err = store.put_scheduling_state("a", &state).await.unwrap_err();
        assert!(err.is_transient());
        store.set_failing_writes(false);
        assert!(store.put_scheduling_state("a", &state).await.is_ok());
    }
}
