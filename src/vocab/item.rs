//! 词条定义：VocabularyItem 与按词性区分的 LexicalPayload
//!
//! 调度器与会话状态机只关心 id / kind / level；词性相关的展示（名词性别、动词支配格等）
//! 集中在 `LexicalPayload` 的穷举匹配里。

use std::fmt;

use serde::{Deserialize, Serialize};

/// 词条 ID（外部存储分配，稳定不变）
pub type ItemId = String;

/// 缺失字段时使用的占位词形
pub const PLACEHOLDER_LEMMA: &str = "(missing entry)";

/// 词性标签（用于会话构建时的轮转分组）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LexicalKind {
    Noun,
    Verb,
    Adjective,
    Conjunction,
    Preposition,
    Other,
}

impl fmt::Display for LexicalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LexicalKind::Noun => "noun",
            LexicalKind::Verb => "verb",
            LexicalKind::Adjective => "adjective",
            LexicalKind::Conjunction => "conjunction",
            LexicalKind::Preposition => "preposition",
            LexicalKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// 名词的语法性别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Masculine,
    Feminine,
    Neuter,
}

/// 词条内容：按词性打标签的和类型（JSON 中以 `type` 字段区分）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LexicalPayload {
    Noun {
        lemma: String,
        translation: String,
        #[serde(default)]
        gender: Option<Gender>,
        #[serde(default)]
        plural: Option<String>,
    },
    Verb {
        lemma: String,
        translation: String,
        /// 支配关系，如 "auf + Akk."
        #[serde(default)]
        governance: Option<String>,
    },
    Adjective {
        lemma: String,
        translation: String,
    },
    Conjunction {
        lemma: String,
        translation: String,
    },
    Preposition {
        lemma: String,
        translation: String,
        /// 支配的格
        #[serde(default)]
        case: Option<String>,
    },
    Other {
        lemma: String,
        translation: String,
    },
}

impl LexicalPayload {
    pub fn kind(&self) -> LexicalKind {
        match self {
            LexicalPayload::Noun { .. } => LexicalKind::Noun,
            LexicalPayload::Verb { .. } => LexicalKind::Verb,
            LexicalPayload::Adjective { .. } => LexicalKind::Adjective,
            LexicalPayload::Conjunction { .. } => LexicalKind::Conjunction,
            LexicalPayload::Preposition { .. } => LexicalKind::Preposition,
            LexicalPayload::Other { .. } => LexicalKind::Other,
        }
    }

    pub fn lemma(&self) -> &str {
        match self {
            LexicalPayload::Noun { lemma, .. }
            | LexicalPayload::Verb { lemma, .. }
            | LexicalPayload::Adjective { lemma, .. }
            | LexicalPayload::Conjunction { lemma, .. }
            | LexicalPayload::Preposition { lemma, .. }
            | LexicalPayload::Other { lemma, .. } => lemma,
        }
    }

    pub fn translation(&self) -> &str {
        match self {
            LexicalPayload::Noun { translation, .. }
            | LexicalPayload::Verb { translation, .. }
            | LexicalPayload::Adjective { translation, .. }
            | LexicalPayload::Conjunction { translation, .. }
            | LexicalPayload::Preposition { translation, .. }
            | LexicalPayload::Other { translation, .. } => translation,
        }
    }

    /// 带语法信息的展示形式（名词带冠词与复数、动词带支配、介词带格）
    pub fn display_form(&self) -> String {
        match self {
            LexicalPayload::Noun {
                lemma,
                gender,
                plural,
                ..
            } => {
                let article = match gender {
                    Some(Gender::Masculine) => "der ",
                    Some(Gender::Feminine) => "die ",
                    Some(Gender::Neuter) => "das ",
                    None => "",
                };
                match plural {
                    Some(p) => format!("{article}{lemma}, {p}"),
                    None => format!("{article}{lemma}"),
                }
            }
            LexicalPayload::Verb {
                lemma, governance, ..
            } => match governance {
                Some(g) => format!("{lemma} ({g})"),
                None => lemma.clone(),
            },
            LexicalPayload::Preposition { lemma, case, .. } => match case {
                Some(c) => format!("{lemma} + {c}"),
                None => lemma.clone(),
            },
            LexicalPayload::Adjective { lemma, .. }
            | LexicalPayload::Conjunction { lemma, .. }
            | LexicalPayload::Other { lemma, .. } => lemma.clone(),
        }
    }

    /// 词形或释义为空即视为不完整
    pub fn is_complete(&self) -> bool {
        !self.lemma().trim().is_empty() && !self.translation().trim().is_empty()
    }

    /// 数据损坏时的安全占位
    pub fn placeholder() -> Self {
        LexicalPayload::Other {
            lemma: PLACEHOLDER_LEMMA.to_string(),
            translation: PLACEHOLDER_LEMMA.to_string(),
        }
    }
}

/// 词条：稳定 ID + 词法内容 + 可选助记 + 可选等级标签
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyItem {
    pub id: ItemId,
    pub payload: LexicalPayload,
    #[serde(default)]
    pub mnemonic: Option<String>,
    /// 等级标签（如 A1 / B2），决定会话构建的优先级层
    #[serde(default)]
    pub level: Option<String>,
}

impl VocabularyItem {
    pub fn new(id: impl Into<ItemId>, payload: LexicalPayload) -> Self {
        Self {
            id: id.into(),
            payload,
            mnemonic: None,
            level: None,
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    pub fn with_mnemonic(mut self, mnemonic: impl Into<String>) -> Self {
        self.mnemonic = Some(mnemonic.into());
        self
    }

    pub fn kind(&self) -> LexicalKind {
        self.payload.kind()
    }

    pub fn has_mnemonic(&self) -> bool {
        self.mnemonic
            .as_deref()
            .map(|m| !m.trim().is_empty())
            .unwrap_or(false)
    }

    /// 字段缺失时替换为占位内容，返回是否发生了替换
    pub fn sanitize(&mut self) -> bool {
        if self.payload.is_complete() {
            return false;
        }
        tracing::warn!(item_id = %self.id, "Item has incomplete lexical payload, using placeholder");
        self.payload = LexicalPayload::placeholder();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_json_is_type_tagged() {
        let json = r#"{"type":"noun","lemma":"Haus","translation":"house","gender":"neuter","plural":"Häuser"}"#;
        let payload: LexicalPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.kind(), LexicalKind::Noun);
        assert_eq!(payload.display_form(), "das Haus, Häuser");
    }

    #[test]
    fn test_verb_governance_display() {
        let payload = LexicalPayload::Verb {
            lemma: "warten".into(),
            translation: "to wait".into(),
            governance: Some("auf + Akk.".into()),
        };
        assert_eq!(payload.display_form(), "warten (auf + Akk.)");
    }

    #[test]
    fn test_sanitize_replaces_incomplete_payload() {
        let mut item = VocabularyItem::new(
            "x1",
            LexicalPayload::Adjective {
                lemma: "  ".into(),
                translation: "quick".into(),
            },
        );
        assert!(item.sanitize());
        assert_eq!(item.payload.lemma(), PLACEHOLDER_LEMMA);
        assert!(!item.sanitize());
    }

    #[test]
    fn test_blank_mnemonic_is_not_a_mnemonic() {
        let item = VocabularyItem::new(
            "x2",
            LexicalPayload::Other {
                lemma: "ja".into(),
                translation: "yes".into(),
            },
        )
        .with_mnemonic("   ");
        assert!(!item.has_mnemonic());
    }
}
