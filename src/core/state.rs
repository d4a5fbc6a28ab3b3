//! 状态定义：SessionView 投影
//!
//! 表现层只持有轻量的 SessionView（状态、当前卡片、生成内容、错误）；完整会话由 Engine 维护并投影到 SessionView。

use serde::Serialize;

use crate::session::{
    ContentState, Direction, Phase, Session, SessionMode, SessionStage, SessionSummary, WarmupCard,
};
use crate::vocab::{ItemId, LexicalKind};

/// 表现层看到的状态
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum EngineStatus {
    /// 尚未开始会话
    Idle,
    Intro,
    Warmup,
    Priming,
    Recognition,
    Narrative,
    Production,
    /// 正在等待生成服务
    Loading,
    /// 生成失败，等待重试
    Failed,
    Consolidation,
    Closed,
}

/// 当前展示的词条卡片
#[derive(Clone, Debug, Serialize)]
pub struct CardView {
    pub item_id: ItemId,
    pub kind: LexicalKind,
    pub lemma: String,
    pub display: String,
    pub translation: String,
    pub mnemonic: Option<String>,
    /// 识别阶段的出题方向
    pub direction: Option<Direction>,
    pub recognition_hits: u8,
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionView {
    pub status: EngineStatus,
    pub session_id: Option<String>,
    pub mode: Option<SessionMode>,
    pub phase: Option<Phase>,
    pub batch_index: usize,
    pub batch_count: usize,
    pub card: Option<CardView>,
    pub warmup: Option<WarmupCard>,
    /// 叙事短文或挖空句
    pub content: Option<String>,
    pub summary: Option<SessionSummary>,
    pub pending_writes: usize,
    pub input_locked: bool,
    pub error_message: Option<String>,
}

impl Default for SessionView {
    fn default() -> Self {
        Self {
            status: EngineStatus::Idle,
            session_id: None,
            mode: None,
            phase: None,
            batch_index: 0,
            batch_count: 0,
            card: None,
            warmup: None,
            content: None,
            summary: None,
            pending_writes: 0,
            input_locked: false,
            error_message: None,
        }
    }
}

impl SessionView {
    /// 将会话投影为视图；summary 由编排器补充下次复习时间后传入
    pub fn project(
        session: &Session,
        summary: Option<SessionSummary>,
        pending_writes: usize,
        error_message: Option<String>,
    ) -> Self {
        let status = match session.stage {
            SessionStage::Intro => EngineStatus::Intro,
            SessionStage::Warmup => EngineStatus::Warmup,
            SessionStage::Consolidation => EngineStatus::Consolidation,
            SessionStage::Summary => EngineStatus::Closed,
            SessionStage::Active => match (&session.content, session.phase()) {
                (ContentState::Loading(_), _) => EngineStatus::Loading,
                (ContentState::Failed { .. }, _) => EngineStatus::Failed,
                (_, Some(Phase::Production)) if session.verification.is_blocking() => {
                    match &session.verification {
                        ContentState::Failed { .. } => EngineStatus::Failed,
                        _ => EngineStatus::Loading,
                    }
                }
                (_, Some(Phase::Priming)) => EngineStatus::Priming,
                (_, Some(Phase::Recognition)) => EngineStatus::Recognition,
                (_, Some(Phase::Narrative)) => EngineStatus::Narrative,
                (_, Some(Phase::Production)) => EngineStatus::Production,
                (_, None) => EngineStatus::Idle,
            },
        };

        let card = session.current_item().map(|q| CardView {
            item_id: q.item.id.clone(),
            kind: q.item.kind(),
            lemma: q.item.payload.lemma().to_string(),
            display: q.item.payload.display_form(),
            translation: q.item.payload.translation().to_string(),
            mnemonic: q.item.mnemonic.clone(),
            direction: session.current_direction(),
            recognition_hits: q.recognition_hits,
        });

        let error_message = error_message.or_else(|| {
            [&session.content, &session.verification]
                .into_iter()
                .find_map(|c| match c {
                    ContentState::Failed { message, .. } => Some(message.clone()),
                    _ => None,
                })
        });

        Self {
            input_locked: status == EngineStatus::Loading,
            status,
            session_id: Some(session.id.clone()),
            mode: Some(session.mode),
            phase: session.phase(),
            batch_index: session.current_batch,
            batch_count: session.batches.len(),
            card,
            warmup: session.warmup_card(),
            content: session.content.text().map(str::to_string),
            summary,
            pending_writes,
            error_message,
        }
    }
}
