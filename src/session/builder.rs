//! 会话构建：从词池中挑选并排序本次会话的词条
//!
//! 1. 划分：到期复习（review/leech 且已到期）、学习中、新词（最多 5 个）
//! 2. 按等级层排序（配置中的顺序，靠前优先；无标签或未知标签最后）
//! 3. 同一层内按词性分组，各组用固定种子洗牌，再轮转交错取词，直到该层取完或达到上限

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::scheduler::ItemStatus;
use crate::session::types::{SessionMode, BATCH_SIZE};
use crate::session::warmup::collect_leeches;
use crate::session::Session;
use crate::vocab::{LexicalKind, PoolEntry};

/// 新词进入候选前的上限
pub const NEW_ITEM_CAP: usize = 5;

/// 构建参数（来自配置）
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub new_item_cap: usize,
    /// 等级层，从高优先级到低优先级
    pub level_tiers: Vec<String>,
    pub batch_size: usize,
    /// 洗牌种子，相同词池 + 相同种子得到相同会话
    pub seed: u64,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            new_item_cap: NEW_ITEM_CAP,
            level_tiers: ["A1", "A2", "B1", "B2", "C1", "C2"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            batch_size: BATCH_SIZE,
            seed: 0,
        }
    }
}

impl BuildOptions {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// 等级标签对应的层号；无标签或不在列表中的排在最后
    fn tier_of(&self, level: Option<&str>) -> usize {
        level
            .and_then(|l| {
                self.level_tiers
                    .iter()
                    .position(|t| t.eq_ignore_ascii_case(l.trim()))
            })
            .unwrap_or(self.level_tiers.len())
    }
}

/// 词池划分结果
#[derive(Debug, Default)]
pub struct PoolPartition<'a> {
    pub due_reviews: Vec<&'a PoolEntry>,
    pub learning: Vec<&'a PoolEntry>,
    pub new_items: Vec<&'a PoolEntry>,
}

/// 按状态划分词池；新词在排序前截断到上限
pub fn partition_pool<'a>(
    pool: &'a [PoolEntry],
    new_item_cap: usize,
    now: DateTime<Utc>,
) -> PoolPartition<'a> {
    let mut partition = PoolPartition::default();
    for entry in pool {
        match entry.state.status {
            ItemStatus::Review | ItemStatus::Leech => {
                if entry.state.is_due(now) {
                    partition.due_reviews.push(entry);
                }
            }
            ItemStatus::Learning => partition.learning.push(entry),
            ItemStatus::New => {
                if partition.new_items.len() < new_item_cap {
                    partition.new_items.push(entry);
                }
            }
        }
    }
    partition
}

/// 挑选并排序本次会话的词条（不含重复，长度 ≤ limit）
pub fn select_items(
    pool: &[PoolEntry],
    limit: usize,
    mode: SessionMode,
    options: &BuildOptions,
    now: DateTime<Utc>,
) -> Vec<PoolEntry> {
    if limit == 0 {
        return Vec::new();
    }
    let partition = partition_pool(pool, options.new_item_cap, now);

    // 到期复习已占满上限、或仅复习模式时，只从到期复习中取词
    let reviews_only = mode == SessionMode::ReviewOnly || partition.due_reviews.len() >= limit;
    let mut candidates: Vec<&PoolEntry> = partition.due_reviews;
    if !reviews_only {
        candidates.extend(partition.learning);
        candidates.extend(partition.new_items);
    }

    let mut seen = HashSet::new();
    candidates.retain(|e| seen.insert(e.id().to_string()));
    if candidates.is_empty() {
        return Vec::new();
    }

    // 层号 -> 词性 -> 词条
    let mut tiers: BTreeMap<usize, BTreeMap<LexicalKind, Vec<&PoolEntry>>> = BTreeMap::new();
    for entry in candidates {
        tiers
            .entry(options.tier_of(entry.item.level.as_deref()))
            .or_default()
            .entry(entry.item.kind())
            .or_default()
            .push(entry);
    }

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut selected = Vec::with_capacity(limit);

    'tiers: for (_, mut groups) in tiers {
        for group in groups.values_mut() {
            group.shuffle(&mut rng);
        }
        let mut queues: Vec<std::vec::IntoIter<&PoolEntry>> =
            groups.into_values().map(Vec::into_iter).collect();

        loop {
            let mut took_any = false;
            for queue in queues.iter_mut() {
                if let Some(entry) = queue.next() {
                    selected.push(entry.clone());
                    took_any = true;
                    if selected.len() >= limit {
                        break 'tiers;
                    }
                }
            }
            if !took_any {
                break;
            }
        }
    }

    selected
}

/// 构建会话：挑选词条、切分批次，并收集词池中的全部 leech 用于热身
pub fn build_session(
    pool: &[PoolEntry],
    limit: usize,
    mode: SessionMode,
    options: &BuildOptions,
    now: DateTime<Utc>,
) -> Session {
    let items = select_items(pool, limit, mode, options, now);
    let leeches = collect_leeches(pool);

    tracing::info!(
        selected = items.len(),
        pool = pool.len(),
        ?mode,
        "Session built"
    );
    Session::new(mode, items, leeches, options.batch_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SchedulingState;
    use crate::vocab::{LexicalPayload, VocabularyItem};
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn payload(kind: LexicalKind, lemma: &str) -> LexicalPayload {
        let lemma = lemma.to_string();
        let translation = format!("{lemma}-t");
        match kind {
            LexicalKind::Noun => LexicalPayload::Noun {
                lemma,
                translation,
                gender: None,
                plural: None,
            },
            LexicalKind::Verb => LexicalPayload::Verb {
                lemma,
                translation,
                governance: None,
            },
            LexicalKind::Adjective => LexicalPayload::Adjective { lemma, translation },
            LexicalKind::Conjunction => LexicalPayload::Conjunction { lemma, translation },
            LexicalKind::Preposition => LexicalPayload::Preposition {
                lemma,
                translation,
                case: None,
            },
            LexicalKind::Other => LexicalPayload::Other { lemma, translation },
        }
    }

    fn entry(id: &str, kind: LexicalKind, status: ItemStatus, level: Option<&str>) -> PoolEntry {
        let mut item = VocabularyItem::new(id, payload(kind, id));
        item.level = level.map(String::from);
        let mut state = SchedulingState::new(now());
        state.status = status;
        if matches!(status, ItemStatus::Review | ItemStatus::Leech) {
            state.interval = 3;
            state.next_review_at = now() - Duration::hours(1);
        }
        if status == ItemStatus::Leech {
            state.consecutive_mistakes = 3;
        }
        PoolEntry::new(item, state)
    }

    fn ids(entries: &[PoolEntry]) -> Vec<String> {
        entries.iter().map(|e| e.item.id.clone()).collect()
    }

    #[test]
    fn test_empty_pool_gives_empty_session() {
        let session = build_session(&[], 10, SessionMode::Learning, &BuildOptions::default(), now());
        assert!(session.is_empty());
    }

    #[test]
    fn test_new_items_capped_before_ranking() {
        let pool: Vec<PoolEntry> = (0..9)
            .map(|i| entry(&format!("n{i}"), LexicalKind::Noun, ItemStatus::New, None))
            .collect();
        let selected = select_items(&pool, 20, SessionMode::Learning, &BuildOptions::default(), now());
        assert_eq!(selected.len(), NEW_ITEM_CAP);
    }

    #[test]
    fn test_future_reviews_are_not_due() {
        let mut future = entry("r1", LexicalKind::Verb, ItemStatus::Review, None);
        future.state.next_review_at = now() + Duration::days(2);
        let pool = vec![future, entry("r2", LexicalKind::Verb, ItemStatus::Review, None)];
        let selected = select_items(&pool, 10, SessionMode::Learning, &BuildOptions::default(), now());
        assert_eq!(ids(&selected), vec!["r2"]);
    }

    #[test]
    fn test_limit_respected_and_saturated_reviews_exclude_new() {
        let mut pool: Vec<PoolEntry> = (0..6)
            .map(|i| entry(&format!("r{i}"), LexicalKind::Noun, ItemStatus::Review, Some("B2")))
            .collect();
        pool.push(entry("n0", LexicalKind::Verb, ItemStatus::New, Some("A1")));
        pool.push(entry("l0", LexicalKind::Verb, ItemStatus::Learning, Some("A1")));

        let selected = select_items(&pool, 4, SessionMode::Learning, &BuildOptions::default(), now());
        assert_eq!(selected.len(), 4);
        assert!(selected.iter().all(|e| e.state.status != ItemStatus::New));
    }

    #[test]
    fn test_higher_tier_first_and_untagged_last() {
        let pool = vec![
            entry("untagged", LexicalKind::Noun, ItemStatus::Learning, None),
            entry("b1", LexicalKind::Noun, ItemStatus::Learning, Some("B1")),
            entry("a1", LexicalKind::Noun, ItemStatus::Learning, Some("a1")),
            entry("weird", LexicalKind::Noun, ItemStatus::Learning, Some("Z9")),
        ];
        let selected = select_items(&pool, 10, SessionMode::Learning, &BuildOptions::default(), now());
        let order = ids(&selected);
        assert_eq!(&order[..2], &["a1".to_string(), "b1".to_string()]);
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn test_round_robin_interleaves_kinds() {
        let mut pool = Vec::new();
        for i in 0..3 {
            pool.push(entry(&format!("noun{i}"), LexicalKind::Noun, ItemStatus::Learning, Some("A1")));
        }
        pool.push(entry("verb0", LexicalKind::Verb, ItemStatus::Learning, Some("A1")));
        pool.push(entry("adj0", LexicalKind::Adjective, ItemStatus::Learning, Some("A1")));

        let selected = select_items(&pool, 10, SessionMode::Learning, &BuildOptions::default(), now());
        let kinds: Vec<LexicalKind> = selected.iter().map(|e| e.item.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                LexicalKind::Noun,
                LexicalKind::Verb,
                LexicalKind::Adjective,
                LexicalKind::Noun,
                LexicalKind::Noun
            ]
        );
    }

    #[test]
    fn test_limit_stops_before_next_tier() {
        let pool = vec![
            entry("a1-x", LexicalKind::Noun, ItemStatus::Learning, Some("A1")),
            entry("a1-y", LexicalKind::Verb, ItemStatus::Learning, Some("A1")),
            entry("b1-x", LexicalKind::Noun, ItemStatus::Learning, Some("B1")),
        ];
        let selected = select_items(&pool, 2, SessionMode::Learning, &BuildOptions::default(), now());
        let mut order = ids(&selected);
        order.sort();
        assert_eq!(order, vec!["a1-x", "a1-y"]);
    }

    #[test]
    fn test_seeded_shuffle_is_reproducible() {
        let pool: Vec<PoolEntry> = (0..12)
            .map(|i| entry(&format!("l{i}"), LexicalKind::Noun, ItemStatus::Learning, None))
            .collect();
        let opts = BuildOptions::default().with_seed(42);
        let a = select_items(&pool, 12, SessionMode::Learning, &opts, now());
        let b = select_items(&pool, 12, SessionMode::Learning, &opts, now());
        assert_eq!(ids(&a), ids(&b));
    }

    #[test]
    fn test_no_duplicates() {
        let pool = vec![
            entry("dup", LexicalKind::Noun, ItemStatus::Learning, None),
            entry("dup", LexicalKind::Noun, ItemStatus::Learning, None),
        ];
        let selected = select_items(&pool, 10, SessionMode::Learning, &BuildOptions::default(), now());
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn test_review_only_mode_takes_due_reviews_only() {
        let pool = vec![
            entry("r0", LexicalKind::Noun, ItemStatus::Review, None),
            entry("n0", LexicalKind::Noun, ItemStatus::New, None),
            entry("l0", LexicalKind::Noun, ItemStatus::Learning, None),
        ];
        let selected = select_items(&pool, 10, SessionMode::ReviewOnly, &BuildOptions::default(), now());
        assert_eq!(ids(&selected), vec!["r0"]);
    }

    #[test]
    fn test_session_batches_and_leeches() {
        let mut pool: Vec<PoolEntry> = (0..6)
            .map(|i| entry(&format!("l{i}"), LexicalKind::Noun, ItemStatus::Learning, None))
            .collect();
        pool.push(entry("leech", LexicalKind::Verb, ItemStatus::Leech, None));
        let session = build_session(&pool, 10, SessionMode::Learning, &BuildOptions::default(), now());
        assert_eq!(session.batches.len(), 2);
        assert_eq!(session.batches[0].items.len(), 4);
        assert_eq!(session.batches[1].items.len(), 3);
        assert_eq!(session.leeches.len(), 1);
    }
}
