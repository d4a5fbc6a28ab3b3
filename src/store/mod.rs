//! 存储层：词池读写抽象、内存 / SQLite 实现、失败写入重试队列、词汇导入

pub mod import;
pub mod memory;
pub mod outbox;
pub mod sqlite;
pub mod traits;

pub use import::{import_items, load_import_file, parse_import, ImportReport};
pub use memory::InMemoryStore;
pub use outbox::{PendingWrite, PendingWrites};
pub use sqlite::SqliteStore;
pub use traits::{StoreError, VocabStore};
