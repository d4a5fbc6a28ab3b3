//! 核心编排层：错误与恢复、状态投影、主控循环

pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod state;

pub use error::{EngineError, RecoveryAction};
pub use orchestrator::{
    create_engine, create_generator_from_config, create_store_from_config, spawn_engine, Command,
    Engine,
};
pub use recovery::RecoveryEngine;
pub use state::{CardView, EngineStatus, SessionView};
