//! Mock 生成服务（用于测试与离线运行，无需 API）
//!
//! 按请求种类返回确定性的模板文本；可按种类注入失败，便于测试错误子状态与重试。

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::generation::{GenerationError, GenerationKind, GenerationRequest, GenerationService};

/// Mock 客户端：确定性输出，可注入失败
#[derive(Debug, Default)]
pub struct MockGenerator {
    failing: Mutex<HashSet<GenerationKind>>,
    calls: AtomicUsize,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 让某一种类的请求返回 Unavailable
    pub fn set_failing(&self, kind: GenerationKind, failing: bool) {
        let mut set = self.failing.lock().unwrap_or_else(|e| e.into_inner());
        if failing {
            set.insert(kind);
        } else {
            set.remove(&kind);
        }
    }

    /// 累计调用次数（含失败）
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl GenerationService for MockGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        let failing = self
            .failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&request.kind);
        if failing {
            return Err(GenerationError::Unavailable(format!(
                "mock failure for {}",
                request.kind
            )));
        }

        let lemmas: Vec<&str> = request.subjects.iter().map(|p| p.lemma()).collect();
        let first = request.subjects.first();

        let text = match request.kind {
            GenerationKind::Mnemonic => format!(
                "Picture \"{}\" whenever you think of \"{}\".",
                lemmas.join(", "),
                first.map(|p| p.translation()).unwrap_or("")
            ),
            GenerationKind::Cloze => format!(
                "Fill in the blank: ___ ({}).",
                first.map(|p| p.translation()).unwrap_or("")
            ),
            GenerationKind::Narrative => format!("A short story about {}.", lemmas.join(", ")),
            GenerationKind::Verification => {
                let answer = request.context.trim().to_lowercase();
                let correct = first
                    .map(|p| p.lemma().to_lowercase() == answer)
                    .unwrap_or(false);
                if correct {
                    "CORRECT".to_string()
                } else {
                    "INCORRECT".to_string()
                }
            }
        };
        Ok(text)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::LexicalPayload;

    fn payload() -> LexicalPayload {
        LexicalPayload::Adjective {
            lemma: "schnell".into(),
            translation: "fast".into(),
        }
    }

    #[tokio::test]
    async fn test_mock_verification_compares_lemma() {
        let mock = MockGenerator::new();
        let ok = GenerationRequest::for_item(GenerationKind::Verification, "a", payload())
            .with_context(" Schnell ");
        assert_eq!(mock.generate(&ok).await.unwrap(), "CORRECT");
        let bad = GenerationRequest::for_item(GenerationKind::Verification, "a", payload())
            .with_context("langsam");
        assert_eq!(mock.generate(&bad).await.unwrap(), "INCORRECT");
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_mock_injected_failure() {
        let mock = MockGenerator::new();
        mock.set_failing(GenerationKind::Narrative, true);
        let req = GenerationRequest::narrative(vec![payload()]);
        assert!(matches!(
            mock.generate(&req).await,
            Err(GenerationError::Unavailable(_))
        ));
        mock.set_failing(GenerationKind::Narrative, false);
        assert!(mock.generate(&req).await.unwrap().contains("schnell"));
    }
}
