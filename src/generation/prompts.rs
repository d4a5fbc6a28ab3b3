//! 各类生成请求的 Prompt 模板与判定结果解析

use crate::generation::{GenerationError, GenerationKind, GenerationRequest};
use crate::vocab::LexicalPayload;

const SYSTEM_PROMPT: &str = "You are a concise vocabulary tutor. Answer with the requested text only, no preamble.";

/// 系统提示
pub fn system_prompt() -> &'static str {
    SYSTEM_PROMPT
}

fn describe(payload: &LexicalPayload) -> String {
    format!(
        "{} [{}] = {}",
        payload.display_form(),
        payload.kind(),
        payload.translation()
    )
}

/// 根据请求种类拼出用户提示
pub fn user_prompt(request: &GenerationRequest) -> String {
    let subjects: Vec<String> = request.subjects.iter().map(describe).collect();
    match request.kind {
        GenerationKind::Mnemonic => format!(
            "Write one short, vivid mnemonic (max two sentences) that links the word to its meaning.\nWord: {}",
            subjects.join("; ")
        ),
        GenerationKind::Cloze => format!(
            "Write one natural example sentence using the word, replacing the word itself with \"___\". \
             Keep grammatical endings visible.\nWord: {}",
            subjects.join("; ")
        ),
        GenerationKind::Narrative => format!(
            "Write a short coherent passage (4-6 sentences) that uses every one of these words in context:\n{}",
            subjects
                .iter()
                .map(|s| format!("- {s}"))
                .collect::<Vec<_>>()
                .join("\n")
        ),
        GenerationKind::Verification => format!(
            "Target word: {}\nLearner answer: \"{}\"\n\
             Reply with exactly CORRECT if the answer is the target word (minor typos allowed), otherwise INCORRECT.",
            subjects.join("; "),
            request.context.trim()
        ),
    }
}

/// 解析判定回复：CORRECT / INCORRECT，其它内容视为格式错误
pub fn parse_verdict(text: &str) -> Result<bool, GenerationError> {
    let normalized = text.trim().trim_matches(|c: char| !c.is_alphabetic()).to_uppercase();
    if normalized.starts_with("INCORRECT") {
        Ok(false)
    } else if normalized.starts_with("CORRECT") {
        Ok(true)
    } else {
        Err(GenerationError::Malformed(format!(
            "expected CORRECT or INCORRECT, got {:?}",
            text.chars().take(40).collect::<String>()
        )))
    }
}
