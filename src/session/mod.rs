//! 会话层：构建、批次阶段状态机、leech 热身、汇总

pub mod builder;
pub mod machine;
pub mod summary;
pub mod types;
pub mod warmup;

pub use builder::{build_session, partition_pool, select_items, BuildOptions, NEW_ITEM_CAP};
pub use machine::record_outcome;
pub use summary::{SessionSummary, SummaryLine};
pub use types::{
    Batch, ContentState, Direction, Effect, Phase, Session, SessionError, SessionEvent,
    SessionMode, SessionQueueItem, SessionStage, BATCH_SIZE,
};
pub use warmup::{collect_leeches, needs_mnemonic_request, WarmupCard};
