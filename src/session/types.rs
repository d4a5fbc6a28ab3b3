//! 会话类型定义
//!
//! 定义会话、批次、队列项、阶段、事件与副作用等核心数据类型

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::generation::GenerationRequest;
use crate::scheduler::{ItemStatus, Outcome, SchedulingState};
use crate::vocab::{ItemId, PoolEntry, VocabularyItem};

/// 每批词条数
pub const BATCH_SIZE: usize = 4;

/// 间隔小于该天数的词条在引入阶段重新展示
pub const PRIMING_INTERVAL_THRESHOLD: u32 = 7;

/// 识别阶段每个词条需要的命中次数
pub const RECOGNITION_HITS_REQUIRED: u8 = 2;

/// 会话模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// 完整四阶段
    Learning,
    /// 只跑识别阶段
    ReviewOnly,
}

/// 批次内的认知阶段（固定顺序）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Priming,
    Recognition,
    Narrative,
    Production,
}

impl Phase {
    /// 该阶段在给定模式下是否运行
    pub fn runs_in(self, mode: SessionMode) -> bool {
        match mode {
            SessionMode::Learning => true,
            SessionMode::ReviewOnly => self == Phase::Recognition,
        }
    }

    /// 批次的起始阶段
    pub fn first_for(mode: SessionMode) -> Self {
        if Phase::Priming.runs_in(mode) {
            Phase::Priming
        } else {
            Phase::Recognition
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Priming => "priming",
            Phase::Recognition => "recognition",
            Phase::Narrative => "narrative",
            Phase::Production => "production",
        };
        f.write_str(s)
    }
}

/// 识别题的出题方向：命中 0 次为正向，1 次为反向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// 外语 → 释义
    Forward,
    /// 释义 → 外语
    Reverse,
}

impl Direction {
    pub fn for_hits(hits: u8) -> Self {
        if hits % 2 == 0 {
            Direction::Forward
        } else {
            Direction::Reverse
        }
    }
}

/// 会话级阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStage {
    Intro,
    /// leech 热身
    Warmup,
    /// 批次 × 阶段循环
    Active,
    Consolidation,
    /// 终态
    Summary,
}

impl fmt::Display for SessionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStage::Intro => "intro",
            SessionStage::Warmup => "warmup",
            SessionStage::Active => "active",
            SessionStage::Consolidation => "consolidation",
            SessionStage::Summary => "summary",
        };
        f.write_str(s)
    }
}

/// 会话中的一个词条：开局时的状态快照 + 会话内临时字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionQueueItem {
    pub item: VocabularyItem,
    pub snapshot: SchedulingState,
    /// 0、1 或 2
    pub recognition_hits: u8,
    /// 会话内识别失败后置位
    pub needs_refresh: bool,
    pub final_outcome: Option<Outcome>,
    /// 本次会话已经通过调度器提交过
    pub committed: bool,
    /// 学习者标记为已掌握，不再参与后续阶段
    pub known: bool,
}

impl SessionQueueItem {
    pub fn new(entry: PoolEntry) -> Self {
        Self {
            item: entry.item,
            snapshot: entry.state,
            recognition_hits: 0,
            needs_refresh: false,
            final_outcome: None,
            committed: false,
            known: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.item.id
    }

    /// 引入阶段的入选条件：新词、会话内失败过、或间隔不足 7 天
    pub fn needs_priming(&self) -> bool {
        self.snapshot.status == ItemStatus::New
            || self.needs_refresh
            || self.snapshot.interval < PRIMING_INTERVAL_THRESHOLD
    }

    pub fn recognition_done(&self) -> bool {
        self.recognition_hits >= RECOGNITION_HITS_REQUIRED
    }

    /// 记录最终结果：失败一经记录不可被后续成功覆盖
    pub fn record_final(&mut self, outcome: Outcome) -> Outcome {
        let merged = match (outcome, self.final_outcome) {
            (Outcome::Fail, _) | (_, Some(Outcome::Fail)) => Outcome::Fail,
            _ => Outcome::Success,
        };
        self.final_outcome = Some(merged);
        merged
    }
}

/// 批次：最多 4 个队列项，带阶段指针与游标
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub items: Vec<SessionQueueItem>,
    pub phase: Phase,
    /// 引入阶段为 priming_queue 的下标，其余阶段为 items 的下标
    pub cursor: usize,
    /// 进入引入阶段时计算的待展示下标
    pub priming_queue: Vec<usize>,
}

impl Batch {
    pub fn new(items: Vec<SessionQueueItem>, mode: SessionMode) -> Self {
        Self {
            items,
            phase: Phase::first_for(mode),
            cursor: 0,
            priming_queue: Vec::new(),
        }
    }

    pub fn position(&self, item_id: &str) -> Option<usize> {
        self.items.iter().position(|q| q.id() == item_id)
    }

    /// 仍参与后续阶段的词条（未标记已掌握）
    pub fn has_active_items(&self) -> bool {
        self.items.iter().any(|q| !q.known)
    }

    pub fn recognition_complete(&self) -> bool {
        self.items
            .iter()
            .filter(|q| !q.known)
            .all(SessionQueueItem::recognition_done)
    }
}

/// 当前阶段所需生成内容的子状态
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum ContentState {
    #[default]
    Idle,
    Loading(GenerationRequest),
    Ready {
        request: GenerationRequest,
        text: String,
    },
    Failed {
        request: GenerationRequest,
        message: String,
    },
}

impl ContentState {
    pub fn request(&self) -> Option<&GenerationRequest> {
        match self {
            ContentState::Idle => None,
            ContentState::Loading(r) => Some(r),
            ContentState::Ready { request, .. } | ContentState::Failed { request, .. } => {
                Some(request)
            }
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            ContentState::Ready { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self, ContentState::Loading(_) | ContentState::Failed { .. })
    }
}

/// 会话
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub mode: SessionMode,
    pub stage: SessionStage,
    pub batches: Vec<Batch>,
    pub current_batch: usize,
    /// 词池中全部 leech，热身阶段逐个展示
    pub leeches: Vec<VocabularyItem>,
    pub warmup_cursor: usize,
    /// 跨批次累积的结果
    pub results: BTreeMap<ItemId, Outcome>,
    pub content: ContentState,
    /// 产出阶段自由作答的判定请求；与挖空句分开，失败时挖空句仍保留
    #[serde(default)]
    pub verification: ContentState,
    pub closed: bool,
}

/// 驱动状态机的事件
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// 介绍 / 热身 / 引入 / 叙事阶段的「下一步」，以及汇总确认
    Acknowledge,
    /// 识别或产出阶段的作答结果
    Answer {
        item_id: ItemId,
        phase: Phase,
        outcome: Outcome,
    },
    ContentReady {
        request: GenerationRequest,
        text: String,
    },
    ContentFailed {
        request: GenerationRequest,
        message: String,
    },
    /// 产出阶段的自由作答，交给生成服务判定
    SubmitAnswer {
        item_id: ItemId,
        answer: String,
    },
    /// 判定请求的结果
    Verdict {
        request: GenerationRequest,
        correct: bool,
    },
    /// 用户发起的生成重试
    Retry,
    MarkKnown {
        item_id: ItemId,
    },
    EditMnemonic {
        item_id: ItemId,
        text: String,
    },
}

/// 状态机产出的副作用，由编排器按顺序执行
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// 通过调度器推进并持久化
    Commit { item_id: ItemId, outcome: Outcome },
    /// 直接毕业并持久化
    MarkKnown { item_id: ItemId },
    Generate(GenerationRequest),
    PersistMnemonic { item_id: ItemId, text: String },
    /// 会话结束
    Closed,
}

/// 状态机拒绝事件的原因；返回错误时会话保持不变
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Event not valid in stage {0}")]
    WrongStage(SessionStage),

    #[error("Expected phase {expected}, got {actual}")]
    PhaseMismatch { expected: Phase, actual: Phase },

    #[error("Phase {0} expects an answer, not an acknowledgement")]
    AnswerExpected(Phase),

    #[error("Phase {0} does not take answers")]
    NoAnswerExpected(Phase),

    #[error("Item {0} is not the item currently presented")]
    NotCurrentItem(ItemId),

    #[error("Unknown item: {0}")]
    UnknownItem(ItemId),

    #[error("Content is still loading or failed")]
    ContentPending,

    #[error("Content response does not match the pending request")]
    StaleContent,

    #[error("No failed generation to retry")]
    NothingToRetry,

    #[error("Item {0} already committed in this session")]
    AlreadyCommitted(ItemId),
}
