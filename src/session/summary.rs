//! 汇总：会话结束时的成功 / 失败统计

use serde::Serialize;

use crate::scheduler::Outcome;
use crate::session::types::SessionMode;
use crate::session::Session;
use crate::vocab::ItemId;

/// 单个词条的结算行
#[derive(Debug, Clone, Serialize)]
pub struct SummaryLine {
    pub item_id: ItemId,
    pub lemma: String,
    pub outcome: Outcome,
    pub known: bool,
    /// 下次复习间隔的可读形式，由编排器按最新调度状态填写
    pub next_review: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub mode: SessionMode,
    pub total: usize,
    pub successes: usize,
    pub failures: usize,
    pub known: usize,
    pub lines: Vec<SummaryLine>,
}

impl Session {
    /// 按会话顺序汇总已记录结果的词条
    pub fn summary(&self) -> SessionSummary {
        let lines: Vec<SummaryLine> = self
            .batches
            .iter()
            .flat_map(|b| b.items.iter())
            .filter_map(|q| {
                self.results.get(q.id()).map(|&outcome| SummaryLine {
                    item_id: q.item.id.clone(),
                    lemma: q.item.payload.lemma().to_string(),
                    outcome,
                    known: q.known,
                    next_review: None,
                })
            })
            .collect();

        let successes = lines.iter().filter(|l| l.outcome == Outcome::Success).count();
        SessionSummary {
            session_id: self.id.clone(),
            mode: self.mode,
            total: self.total_items(),
            successes,
            failures: lines.len() - successes,
            known: lines.iter().filter(|l| l.known).count(),
            lines,
        }
    }
}
