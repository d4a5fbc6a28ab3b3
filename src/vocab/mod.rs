//! 词条层：词条身份、按词性区分的内容、词池条目

pub mod item;
pub mod pool;

pub use item::{Gender, ItemId, LexicalKind, LexicalPayload, VocabularyItem, PLACEHOLDER_LEMMA};
pub use pool::PoolEntry;
