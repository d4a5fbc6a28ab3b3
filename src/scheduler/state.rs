//! 调度状态：每个词条一份，记录阶段、间隔、难度系数与连续错误数

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 难度系数下限
pub const MIN_EASE_FACTOR: f64 = 1.3;

/// 新词条的初始难度系数
pub const DEFAULT_EASE_FACTOR: f64 = 2.5;

/// 连续错误达到该次数即成为 leech
pub const LEECH_THRESHOLD: u32 = 3;

/// 词条所处的学习阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// 从未学习
    New,
    /// 初学阶段
    Learning,
    /// 常规间隔复习
    Review,
    /// 顽固难词，需要补救
    Leech,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::New => "new",
            ItemStatus::Learning => "learning",
            ItemStatus::Review => "review",
            ItemStatus::Leech => "leech",
        }
    }
}

impl std::str::FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(ItemStatus::New),
            "learning" => Ok(ItemStatus::Learning),
            "review" => Ok(ItemStatus::Review),
            "leech" => Ok(ItemStatus::Leech),
            other => Err(format!("unknown item status: {other}")),
        }
    }
}

/// 一次作答的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Fail,
}

impl Outcome {
    pub fn from_correct(correct: bool) -> Self {
        if correct {
            Outcome::Success
        } else {
            Outcome::Fail
        }
    }
}

/// 间隔重复状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingState {
    pub status: ItemStatus,
    /// 当前间隔（天）
    pub interval: u32,
    /// 难度系数，始终 ≥ 1.3
    pub ease_factor: f64,
    /// 下次到期时间（now + interval 天）
    pub next_review_at: DateTime<Utc>,
    pub consecutive_mistakes: u32,
}

impl SchedulingState {
    /// 词条首次进入词池时的状态
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            status: ItemStatus::New,
            interval: 0,
            ease_factor: DEFAULT_EASE_FACTOR,
            next_review_at: now,
            consecutive_mistakes: 0,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review_at <= now
    }

    pub fn is_leech(&self) -> bool {
        self.status == ItemStatus::Leech
    }
}
