//! leech 补救：开局前的热身卡片，以及「首次成为 leech」时是否需要生成助记的判断
//!
//! 热身阶段不做任何调度更新，只影响助记内容与学习者的准备状态。

use serde::Serialize;

use crate::scheduler::SchedulingState;
use crate::session::types::SessionStage;
use crate::session::Session;
use crate::vocab::{PoolEntry, VocabularyItem};

/// 词池中的全部 leech（保持词池顺序）
pub fn collect_leeches(pool: &[PoolEntry]) -> Vec<VocabularyItem> {
    pool.iter()
        .filter(|e| e.state.is_leech())
        .map(|e| e.item.clone())
        .collect()
}

/// 刚从非 leech 转入 leech，且还没有助记时，需要请求生成助记
pub fn needs_mnemonic_request(
    before: &SchedulingState,
    after: &SchedulingState,
    item: &VocabularyItem,
) -> bool {
    !before.is_leech() && after.is_leech() && !item.has_mnemonic()
}

/// 热身卡片（表现层展示用）
#[derive(Debug, Clone, Serialize)]
pub struct WarmupCard {
    pub item: VocabularyItem,
    /// 从 0 开始
    pub index: usize,
    pub total: usize,
}

impl Session {
    pub fn warmup_card(&self) -> Option<WarmupCard> {
        if self.stage != SessionStage::Warmup {
            return None;
        }
        self.leeches.get(self.warmup_cursor).map(|item| WarmupCard {
            item: item.clone(),
            index: self.warmup_cursor,
            total: self.leeches.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{advance, ItemStatus, Outcome};
    use crate::vocab::LexicalPayload;
    use chrono::Utc;

    fn item() -> VocabularyItem {
        VocabularyItem::new(
            "w1",
            LexicalPayload::Conjunction {
                lemma: "obwohl".into(),
                translation: "although".into(),
            },
        )
    }

    #[test]
    fn test_first_leech_transition_requests_mnemonic() {
        let now = Utc::now();
        let mut state = SchedulingState::new(now);
        state.status = ItemStatus::Learning;
        state.consecutive_mistakes = 2;
        let after = advance(&state, Outcome::Fail, now);
        assert!(needs_mnemonic_request(&state, &after, &item()));

        // 已是 leech 再失败不重复请求
        let again = advance(&after, Outcome::Fail, now);
        assert!(!needs_mnemonic_request(&after, &again, &item()));

        // 已有助记不请求
        let with = item().with_mnemonic("ob-WOHL: although it's well");
        assert!(!needs_mnemonic_request(&state, &after, &with));
    }

    #[test]
    fn test_collect_leeches_keeps_pool_order() {
        let now = Utc::now();
        let mut a = PoolEntry::fresh(item(), now);
        a.item.id = "a".into();
        a.state.status = ItemStatus::Leech;
        let b = PoolEntry::fresh(item(), now);
        let mut c = PoolEntry::fresh(item(), now);
        c.item.id = "c".into();
        c.state.status = ItemStatus::Leech;
        let leeches = collect_leeches(&[a, b, c]);
        let ids: Vec<&str> = leeches.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }
}
