//! Lexi - Rust 词汇学习引擎
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 编排、状态投影、错误恢复
//! - **generation**: 生成服务抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **scheduler**: 间隔重复状态与纯函数调度
//! - **session**: 会话构建、批次阶段状态机、leech 热身、汇总
//! - **store**: 词池存储（内存 / SQLite）、失败写入重试、词汇导入
//! - **vocab**: 词条与词池条目

pub mod config;
pub mod core;
pub mod generation;
pub mod observability;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod vocab;
