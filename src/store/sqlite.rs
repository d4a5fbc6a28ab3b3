//! SQLite 持久化（rusqlite，同步连接经 spawn_blocking 调用）
//!
//! 词条内容以 JSON 列存储，调度状态拆成独立列，便于按到期时间查询。

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::traits::{StoreError, VocabStore};
use crate::scheduler::{ItemStatus, SchedulingState};
use crate::vocab::{LexicalPayload, PoolEntry, VocabularyItem};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS vocab_items (
    id                   TEXT PRIMARY KEY,
    user_id              TEXT NOT NULL,
    payload              TEXT NOT NULL,
    mnemonic             TEXT,
    level                TEXT,
    status               TEXT NOT NULL DEFAULT 'new',
    interval_days        INTEGER NOT NULL DEFAULT 0,
    ease_factor          REAL NOT NULL DEFAULT 2.5,
    next_review_at       TEXT NOT NULL,
    consecutive_mistakes INTEGER NOT NULL DEFAULT 0,
    created_at           TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_vocab_items_user ON vocab_items(user_id, created_at);
";

/// 数据库行的原始形态，解析失败时由调用方决定如何降级
struct RawRow {
    id: String,
    payload: String,
    mnemonic: Option<String>,
    level: Option<String>,
    status: String,
    interval_days: i64,
    ease_factor: f64,
    next_review_at: DateTime<Utc>,
    consecutive_mistakes: i64,
}

impl RawRow {
    fn into_entry(self) -> PoolEntry {
        let payload = match serde_json::from_str::<LexicalPayload>(&self.payload) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(item_id = %self.id, error = %e, "Corrupt payload column, using placeholder");
                LexicalPayload::placeholder()
            }
        };
        let status = self.status.parse::<ItemStatus>().unwrap_or_else(|e| {
            tracing::warn!(item_id = %self.id, error = %e, "Corrupt status column, treating as new");
            ItemStatus::New
        });

        let mut item = VocabularyItem::new(self.id, payload);
        item.mnemonic = self.mnemonic;
        item.level = self.level;
        item.sanitize();

        let state = SchedulingState {
            status,
            interval: u32::try_from(self.interval_days).unwrap_or(0),
            ease_factor: self.ease_factor,
            next_review_at: self.next_review_at,
            consecutive_mistakes: u32::try_from(self.consecutive_mistakes).unwrap_or(0),
        };
        PoolEntry::new(item, state)
    }
}

/// SQLite 词池存储
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// 打开（或创建）数据库文件；父目录不存在时自动创建
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// 内存数据库（测试用）
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        tracing::debug!("SQLite schema ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 在阻塞线程池上持锁执行同步操作
    async fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("connection mutex poisoned".into()))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("blocking task failed: {e}")))?
    }
}

#[async_trait]
impl VocabStore for SqliteStore {
    async fn get_pool(&self, user_id: &str) -> Result<Vec<PoolEntry>, StoreError> {
        let user_id = user_id.to_string();
        let rows = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, payload, mnemonic, level, status, interval_days, ease_factor,
                            next_review_at, consecutive_mistakes
                     FROM vocab_items WHERE user_id = ?1 ORDER BY created_at, id",
                )?;
                let rows = stmt
                    .query_map(params![user_id], |row| {
                        Ok(RawRow {
                            id: row.get(0)?,
                            payload: row.get(1)?,
                            mnemonic: row.get(2)?,
                            level: row.get(3)?,
                            status: row.get(4)?,
                            interval_days: row.get(5)?,
                            ease_factor: row.get(6)?,
                            next_review_at: row.get(7)?,
                            consecutive_mistakes: row.get(8)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows.into_iter().map(RawRow::into_entry).collect())
    }

    async fn put_scheduling_state(
        &self,
        item_id: &str,
        state: &SchedulingState,
    ) -> Result<(), StoreError> {
        let item_id = item_id.to_string();
        let state = state.clone();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE vocab_items
                 SET status = ?2, interval_days = ?3, ease_factor = ?4,
                     next_review_at = ?5, consecutive_mistakes = ?6
                 WHERE id = ?1",
                params![
                    item_id,
                    state.status.as_str(),
                    i64::from(state.interval),
                    state.ease_factor,
                    state.next_review_at,
                    i64::from(state.consecutive_mistakes),
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(item_id));
            }
            Ok(())
        })
        .await
    }

    async fn put_mnemonic(&self, item_id: &str, text: &str) -> Result<(), StoreError> {
        let item_id = item_id.to_string();
        let text = text.to_string();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE vocab_items SET mnemonic = ?2 WHERE id = ?1",
                params![item_id, text],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(item_id));
            }
            Ok(())
        })
        .await
    }

    async fn add_item(&self, user_id: &str, item: VocabularyItem) -> Result<(), StoreError> {
        let user_id = user_id.to_string();
        let payload = serde_json::to_string(&item.payload)?;
        self.with_conn(move |conn| {
            let owner: Option<String> = conn
                .query_row(
                    "SELECT user_id FROM vocab_items WHERE id = ?1",
                    params![item.id],
                    |row| row.get(0),
                )
                .optional()?;
            match owner {
                Some(owner) if owner != user_id => Err(StoreError::Rejected(format!(
                    "item {} belongs to another user",
                    item.id
                ))),
                Some(_) => {
                    conn.execute(
                        "UPDATE vocab_items
                         SET payload = ?2, level = ?3, mnemonic = COALESCE(?4, mnemonic)
                         WHERE id = ?1",
                        params![item.id, payload, item.level, item.mnemonic],
                    )?;
                    Ok(())
                }
                None => {
                    let now = Utc::now();
                    let state = SchedulingState::new(now);
                    conn.execute(
                        "INSERT INTO vocab_items
                         (id, user_id, payload, mnemonic, level, status, interval_days,
                          ease_factor, next_review_at, consecutive_mistakes, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                        params![
                            item.id,
                            user_id,
                            payload,
                            item.mnemonic,
                            item.level,
                            state.status.as_str(),
                            i64::from(state.interval),
                            state.ease_factor,
                            state.next_review_at,
                            i64::from(state.consecutive_mistakes),
                            now,
                        ],
                    )?;
                    Ok(())
                }
            }
        })
        .await
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{advance, Outcome};
    use crate::vocab::{Gender, PLACEHOLDER_LEMMA};

    fn haus() -> VocabularyItem {
        VocabularyItem::new(
            "haus",
            LexicalPayload::Noun {
                lemma: "Haus".into(),
                translation: "house".into(),
                gender: Some(Gender::Neuter),
                plural: Some("Häuser".into()),
            },
        )
        .with_level("A1")
    }

    #[tokio::test]
    async fn test_add_item_then_load_pool() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.add_item("u1", haus()).await.unwrap();

        let pool = store.get_pool("u1").await.unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool[0].item, haus());
        assert_eq!(pool[0].state.status, ItemStatus::New);
        assert!(store.get_pool("u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scheduling_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("lexi.db");
        let now = Utc::now();
        {
            let store = SqliteStore::open(&path).unwrap();
            store.add_item("u1", haus()).await.unwrap();
            let next = advance(&SchedulingState::new(now), Outcome::Success, now);
            store.put_scheduling_state("haus", &next).await.unwrap();
            store.put_mnemonic("haus", "das Haus hat ein Dach").await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let pool = store.get_pool("u1").await.unwrap();
        assert_eq!(pool[0].state.status, ItemStatus::Learning);
        assert_eq!(pool[0].state.interval, 1);
        assert_eq!(pool[0].item.mnemonic.as_deref(), Some("das Haus hat ein Dach"));
    }

    #[tokio::test]
    async fn test_corrupt_payload_becomes_placeholder() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.add_item("u1", haus()).await.unwrap();
        store
            .with_conn(|conn| {
                conn.execute("UPDATE vocab_items SET payload = '{broken', status = 'weird'", [])?;
                Ok(())
            })
            .await
            .unwrap();

        let pool = store.get_pool("u1").await.unwrap();
        assert_eq!(pool[0].item.payload.lemma(), PLACEHOLDER_LEMMA);
        assert_eq!(pool[0].state.status, ItemStatus::New);
    }

    #[tokio::test]
    async fn test_writes_to_unknown_item_are_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();
        let state = SchedulingState::new(Utc::now());
        assert!(matches!(
            store.put_scheduling_state("ghost", &state).await,
            Err(StoreError::NotFound(id)) if id == "ghost"
        ));
        assert!(matches!(
            store.put_mnemonic("ghost", "x").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_add_item_rejects_foreign_owner() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.add_item("u1", haus()).await.unwrap();
        assert!(matches!(
            store.add_item("u2", haus()).await,
            Err(StoreError::Rejected(_))
        ));
    }
}
