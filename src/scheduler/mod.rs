//! 调度层：间隔重复状态与纯函数状态转移

pub mod algorithm;
pub mod state;

pub use algorithm::{advance, format_interval, mark_known, KNOWN_INTERVAL_DAYS, MAX_INTERVAL_DAYS};
pub use state::{
    ItemStatus, Outcome, SchedulingState, DEFAULT_EASE_FACTOR, LEECH_THRESHOLD, MIN_EASE_FACTOR,
};
