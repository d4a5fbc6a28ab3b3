//! 生成服务抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 GenerationService：按请求类型生成一段文本。
//! 重试策略由调用方决定，这里不做自动重试。

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::vocab::{ItemId, LexicalPayload};

/// 生成内容的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationKind {
    /// 助记句
    Mnemonic,
    /// 挖空例句（产出阶段）
    Cloze,
    /// 批次共享的短文（叙事阶段）
    Narrative,
    /// 判定自由作答是否正确
    Verification,
}

impl fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GenerationKind::Mnemonic => "mnemonic",
            GenerationKind::Cloze => "cloze",
            GenerationKind::Narrative => "narrative",
            GenerationKind::Verification => "verification",
        };
        f.write_str(s)
    }
}

/// 一次生成请求：种类 + 涉及的词条 + 额外上下文
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub kind: GenerationKind,
    /// 单词条请求（助记 / 挖空 / 判定）时的目标词条
    pub item_id: Option<ItemId>,
    /// 涉及的词条内容；叙事请求包含整批
    pub subjects: Vec<LexicalPayload>,
    /// 上下文：判定请求为学习者的作答，其余为可选提示
    pub context: String,
}

impl GenerationRequest {
    pub fn for_item(kind: GenerationKind, item_id: impl Into<ItemId>, payload: LexicalPayload) -> Self {
        Self {
            kind,
            item_id: Some(item_id.into()),
            subjects: vec![payload],
            context: String::new(),
        }
    }

    pub fn narrative(subjects: Vec<LexicalPayload>) -> Self {
        Self {
            kind: GenerationKind::Narrative,
            item_id: None,
            subjects,
            context: String::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }
}

/// 生成服务错误：均为可恢复错误，由用户决定是否重试
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("Generation service unavailable: {0}")]
    Unavailable(String),

    #[error("Generation quota exceeded")]
    QuotaExceeded,

    #[error("Malformed generation response: {0}")]
    Malformed(String),

    #[error("Generation timed out after {0}s")]
    Timeout(u64),
}

/// 生成服务 trait
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;

    /// 后端名称（日志用）
    fn name(&self) -> &str {
        "generation"
    }
}
