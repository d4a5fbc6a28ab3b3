//! 批次阶段状态机
//!
//! 显式转移函数：`Session::apply(event) -> Result<Vec<Effect>, SessionError>`。
//! 事件先整体校验，校验失败时会话不变；校验通过后修改会话并返回需要编排器执行的副作用。
//! 每次转移后调用 `settle`，把所有无需用户输入的自动推进一次做完（跳过空阶段、批次收尾等）。
//!
//! 阶段顺序：priming → recognition → narrative → production；仅复习模式只跑 recognition。

use crate::generation::{GenerationKind, GenerationRequest};
use crate::scheduler::Outcome;
use crate::session::types::*;
use crate::vocab::{ItemId, PoolEntry, VocabularyItem};

impl Session {
    /// 新会话：按 batch_size 切分批次，处于 Intro
    pub fn new(
        mode: SessionMode,
        items: Vec<PoolEntry>,
        leeches: Vec<VocabularyItem>,
        batch_size: usize,
    ) -> Self {
        let batch_size = batch_size.max(1);
        let queue: Vec<SessionQueueItem> = items.into_iter().map(SessionQueueItem::new).collect();
        let batches = queue
            .chunks(batch_size)
            .map(|chunk| Batch::new(chunk.to_vec(), mode))
            .collect();

        Self {
            id: format!("session_{}", uuid::Uuid::new_v4()),
            mode,
            stage: SessionStage::Intro,
            batches,
            current_batch: 0,
            leeches,
            warmup_cursor: 0,
            results: Default::default(),
            content: ContentState::Idle,
            verification: ContentState::Idle,
            closed: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn total_items(&self) -> usize {
        self.batches.iter().map(|b| b.items.len()).sum()
    }

    pub fn batch(&self) -> Option<&Batch> {
        if self.stage == SessionStage::Active {
            self.batches.get(self.current_batch)
        } else {
            None
        }
    }

    fn batch_mut(&mut self) -> &mut Batch {
        &mut self.batches[self.current_batch]
    }

    pub fn phase(&self) -> Option<Phase> {
        self.batch().map(|b| b.phase)
    }

    /// 当前阶段正在展示的队列项下标（叙事阶段没有单独的词条）
    fn current_index(&self) -> Option<usize> {
        let batch = self.batch()?;
        match batch.phase {
            Phase::Priming => batch.priming_queue.get(batch.cursor).copied(),
            Phase::Recognition | Phase::Production => {
                (batch.cursor < batch.items.len()).then_some(batch.cursor)
            }
            Phase::Narrative => None,
        }
    }

    /// 当前展示的队列项
    pub fn current_item(&self) -> Option<&SessionQueueItem> {
        let idx = self.current_index()?;
        self.batch().map(|b| &b.items[idx])
    }

    /// 热身阶段当前的 leech
    pub fn current_leech(&self) -> Option<&VocabularyItem> {
        if self.stage == SessionStage::Warmup {
            self.leeches.get(self.warmup_cursor)
        } else {
            None
        }
    }

    /// 识别阶段当前题目的方向
    pub fn current_direction(&self) -> Option<Direction> {
        if self.phase()? != Phase::Recognition {
            return None;
        }
        self.current_item()
            .map(|q| Direction::for_hits(q.recognition_hits))
    }

    /// 状态转移入口
    pub fn apply(&mut self, event: SessionEvent) -> Result<Vec<Effect>, SessionError> {
        match event {
            SessionEvent::Acknowledge => self.on_acknowledge(),
            SessionEvent::Answer {
                item_id,
                phase,
                outcome,
            } => self.on_answer(&item_id, phase, outcome),
            SessionEvent::ContentReady { request, text } => {
                self.expect_loading(&request)?;
                self.content = ContentState::Ready { request, text };
                Ok(Vec::new())
            }
            SessionEvent::ContentFailed { request, message } => {
                if matches!(&self.verification, ContentState::Loading(pending) if *pending == request) {
                    tracing::warn!(%message, "Answer verification failed");
                    self.verification = ContentState::Failed { request, message };
                    return Ok(Vec::new());
                }
                self.expect_loading(&request)?;
                tracing::warn!(kind = %request.kind, %message, "Content generation failed");
                self.content = ContentState::Failed { request, message };
                Ok(Vec::new())
            }
            SessionEvent::SubmitAnswer { item_id, answer } => self.on_submit(&item_id, answer),
            SessionEvent::Verdict { request, correct } => self.on_verdict(request, correct),
            SessionEvent::Retry => {
                if let ContentState::Failed { request, .. } = &self.verification {
                    let request = request.clone();
                    self.verification = ContentState::Loading(request.clone());
                    return Ok(vec![Effect::Generate(request)]);
                }
                match &self.content {
                    ContentState::Failed { request, .. } => {
                        let request = request.clone();
                        self.content = ContentState::Loading(request.clone());
                        Ok(vec![Effect::Generate(request)])
                    }
                    _ => Err(SessionError::NothingToRetry),
                }
            }
            SessionEvent::MarkKnown { item_id } => self.on_mark_known(&item_id),
            SessionEvent::EditMnemonic { item_id, text } => self.on_edit_mnemonic(&item_id, text),
        }
    }

    fn expect_loading(&self, request: &GenerationRequest) -> Result<(), SessionError> {
        match &self.content {
            ContentState::Loading(pending) if pending == request => Ok(()),
            _ => Err(SessionError::StaleContent),
        }
    }

    fn on_acknowledge(&mut self) -> Result<Vec<Effect>, SessionError> {
        match self.stage {
            SessionStage::Intro => {
                if self.leeches.is_empty() {
                    Ok(self.enter_active())
                } else {
                    self.stage = SessionStage::Warmup;
                    self.warmup_cursor = 0;
                    Ok(Vec::new())
                }
            }
            SessionStage::Warmup => {
                self.warmup_cursor += 1;
                if self.warmup_cursor >= self.leeches.len() {
                    Ok(self.enter_active())
                } else {
                    Ok(Vec::new())
                }
            }
            SessionStage::Active => {
                let phase = self.batch_mut().phase;
                match phase {
                    Phase::Priming => {
                        self.batch_mut().cursor += 1;
                        Ok(self.settle())
                    }
                    Phase::Narrative => {
                        if self.content.text().is_none() {
                            return Err(SessionError::ContentPending);
                        }
                        Ok(self.enter_phase(Phase::Production))
                    }
                    other => Err(SessionError::AnswerExpected(other)),
                }
            }
            SessionStage::Consolidation => {
                self.stage = SessionStage::Summary;
                self.closed = true;
                tracing::info!(session_id = %self.id, "Session closed");
                Ok(vec![Effect::Closed])
            }
            SessionStage::Summary => Err(SessionError::WrongStage(self.stage)),
        }
    }

    /// 校验作答事件，返回当前词条下标
    fn answer_index(&self, item_id: &str, phase: Phase) -> Result<usize, SessionError> {
        if self.stage != SessionStage::Active {
            return Err(SessionError::WrongStage(self.stage));
        }
        let current_phase = self.batches[self.current_batch].phase;
        if phase != current_phase {
            return Err(SessionError::PhaseMismatch {
                expected: current_phase,
                actual: phase,
            });
        }
        if !matches!(phase, Phase::Recognition | Phase::Production) {
            return Err(SessionError::NoAnswerExpected(phase));
        }
        if phase == Phase::Production
            && (self.content.text().is_none() || self.verification.is_blocking())
        {
            return Err(SessionError::ContentPending);
        }
        match self.current_index() {
            Some(idx) if self.batches[self.current_batch].items[idx].id() == item_id => Ok(idx),
            _ => Err(SessionError::NotCurrentItem(item_id.to_string())),
        }
    }

    fn on_answer(
        &mut self,
        item_id: &str,
        phase: Phase,
        outcome: Outcome,
    ) -> Result<Vec<Effect>, SessionError> {
        let idx = self.answer_index(item_id, phase)?;
        match phase {
            Phase::Recognition => Ok(self.on_recognition(idx, outcome)),
            _ => Ok(self.on_production(idx, outcome)),
        }
    }

    fn on_recognition(&mut self, idx: usize, outcome: Outcome) -> Vec<Effect> {
        match outcome {
            Outcome::Success => {
                let batch = self.batch_mut();
                let q = &mut batch.items[idx];
                q.recognition_hits = (q.recognition_hits + 1).min(RECOGNITION_HITS_REQUIRED);
                batch.cursor = idx + 1;
                self.settle()
            }
            Outcome::Fail => {
                let mut effects = Vec::new();
                let batch = self.batch_mut();
                let q = &mut batch.items[idx];
                q.recognition_hits = 0;
                q.needs_refresh = true;
                let item_id = q.id().to_string();
                self.finalize(idx, Outcome::Fail, &mut effects);
                tracing::debug!(%item_id, "Recognition failed, batch restarts");

                let restart = Phase::first_for(self.mode);
                effects.extend(self.enter_phase(restart));
                effects
            }
        }
    }

    fn on_submit(&mut self, item_id: &str, answer: String) -> Result<Vec<Effect>, SessionError> {
        let idx = self.answer_index(item_id, Phase::Production)?;
        let item = &self.batches[self.current_batch].items[idx].item;
        let request = GenerationRequest::for_item(
            GenerationKind::Verification,
            item.id.clone(),
            item.payload.clone(),
        )
        .with_context(answer.trim());
        self.verification = ContentState::Loading(request.clone());
        Ok(vec![Effect::Generate(request)])
    }

    fn on_verdict(
        &mut self,
        request: GenerationRequest,
        correct: bool,
    ) -> Result<Vec<Effect>, SessionError> {
        match &self.verification {
            ContentState::Loading(pending) if *pending == request => {}
            _ => return Err(SessionError::StaleContent),
        }
        let item_id = request.item_id.unwrap_or_default();
        if self.current_item_id().as_deref() != Some(item_id.as_str()) {
            return Err(SessionError::NotCurrentItem(item_id));
        }
        self.verification = ContentState::Idle;
        self.on_answer(&item_id, Phase::Production, Outcome::from_correct(correct))
    }

    fn on_production(&mut self, idx: usize, outcome: Outcome) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.finalize(idx, outcome, &mut effects);
        let batch = self.batch_mut();
        batch.cursor = idx + 1;
        self.content = ContentState::Idle;
        self.verification = ContentState::Idle;
        effects.extend(self.settle());
        effects
    }

    /// 记录最终结果；首次得到结果时立即提交
    fn finalize(&mut self, idx: usize, outcome: Outcome, effects: &mut Vec<Effect>) {
        let batch = &mut self.batches[self.current_batch];
        let q = &mut batch.items[idx];
        let merged = q.record_final(outcome);
        let item_id = q.id().to_string();
        let commit = !q.committed;
        q.committed = true;
        self.results.insert(item_id.clone(), merged);
        if commit {
            effects.push(Effect::Commit {
                item_id,
                outcome: merged,
            });
        }
    }

    fn on_mark_known(&mut self, item_id: &str) -> Result<Vec<Effect>, SessionError> {
        if matches!(self.stage, SessionStage::Consolidation | SessionStage::Summary) {
            return Err(SessionError::WrongStage(self.stage));
        }
        let (b, i) = self
            .locate(item_id)
            .ok_or_else(|| SessionError::UnknownItem(item_id.to_string()))?;
        if self.batches[b].items[i].committed {
            return Err(SessionError::AlreadyCommitted(item_id.to_string()));
        }

        let q = &mut self.batches[b].items[i];
        q.known = true;
        q.committed = true;
        q.recognition_hits = RECOGNITION_HITS_REQUIRED;
        q.final_outcome = Some(Outcome::Success);
        self.results.insert(item_id.to_string(), Outcome::Success);

        let mut effects = vec![Effect::MarkKnown {
            item_id: item_id.to_string(),
        }];
        if self.stage == SessionStage::Active && b == self.current_batch {
            effects.extend(self.settle());
        }
        Ok(effects)
    }

    fn on_edit_mnemonic(&mut self, item_id: &str, text: String) -> Result<Vec<Effect>, SessionError> {
        let mut found = false;
        for leech in self.leeches.iter_mut().filter(|l| l.id == item_id) {
            leech.mnemonic = Some(text.clone());
            found = true;
        }
        if let Some((b, i)) = self.locate(item_id) {
            self.batches[b].items[i].item.mnemonic = Some(text.clone());
            found = true;
        }
        if !found {
            return Err(SessionError::UnknownItem(item_id.to_string()));
        }
        Ok(vec![Effect::PersistMnemonic {
            item_id: item_id.to_string(),
            text,
        }])
    }

    fn locate(&self, item_id: &str) -> Option<(usize, usize)> {
        self.batches
            .iter()
            .enumerate()
            .find_map(|(b, batch)| batch.position(item_id).map(|i| (b, i)))
    }

    fn enter_active(&mut self) -> Vec<Effect> {
        self.stage = SessionStage::Active;
        if self.batches.is_empty() {
            self.stage = SessionStage::Consolidation;
            return Vec::new();
        }
        self.start_batch(0)
    }

    fn start_batch(&mut self, index: usize) -> Vec<Effect> {
        self.current_batch = index;
        tracing::debug!(batch = index, "Batch started");
        self.enter_phase(Phase::first_for(self.mode))
    }

    fn enter_phase(&mut self, phase: Phase) -> Vec<Effect> {
        self.content = ContentState::Idle;
        self.verification = ContentState::Idle;
        let batch = self.batch_mut();
        batch.phase = phase;
        batch.cursor = 0;
        let mut effects = Vec::new();
        match phase {
            Phase::Priming => {
                batch.priming_queue = batch
                    .items
                    .iter()
                    .enumerate()
                    .filter(|(_, q)| !q.known && q.needs_priming())
                    .map(|(i, _)| i)
                    .collect();
            }
            Phase::Narrative => {
                let subjects = batch
                    .items
                    .iter()
                    .filter(|q| !q.known)
                    .map(|q| q.item.payload.clone())
                    .collect();
                let request = GenerationRequest::narrative(subjects);
                self.content = ContentState::Loading(request.clone());
                effects.push(Effect::Generate(request));
                return effects;
            }
            Phase::Recognition | Phase::Production => {}
        }
        effects.extend(self.settle());
        effects
    }

    /// 自动推进：跳过空的引入队列、已掌握的词条，完成的批次收尾并进入下一批
    fn settle(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        loop {
            if self.stage != SessionStage::Active {
                return effects;
            }
            let mode = self.mode;
            let current = self.current_batch;
            if !self.batches[current].has_active_items() {
                effects.extend(self.finish_batch());
                continue;
            }
            let batch = &mut self.batches[current];
            match batch.phase {
                Phase::Priming => {
                    while batch
                        .priming_queue
                        .get(batch.cursor)
                        .map(|&i| batch.items[i].known)
                        .unwrap_or(false)
                    {
                        batch.cursor += 1;
                    }
                    if batch.cursor >= batch.priming_queue.len() {
                        batch.phase = Phase::Recognition;
                        batch.cursor = 0;
                        continue;
                    }
                    return effects;
                }
                Phase::Recognition => {
                    if batch.recognition_complete() {
                        if Phase::Narrative.runs_in(mode) {
                            effects.extend(self.enter_phase(Phase::Narrative));
                            return effects;
                        }
                        effects.extend(self.finish_batch());
                        continue;
                    }
                    // 从游标开始循环查找下一个未达标的词条
                    let n = batch.items.len();
                    let start = batch.cursor % n;
                    let next = (0..n)
                        .map(|k| (start + k) % n)
                        .find(|&i| !batch.items[i].known && !batch.items[i].recognition_done());
                    if let Some(i) = next {
                        batch.cursor = i;
                    }
                    return effects;
                }
                Phase::Narrative => return effects,
                Phase::Production => {
                    while batch.cursor < batch.items.len() && batch.items[batch.cursor].known {
                        batch.cursor += 1;
                    }
                    if batch.cursor >= batch.items.len() {
                        effects.extend(self.finish_batch());
                        continue;
                    }
                    let q = &batch.items[batch.cursor];
                    let item_id = q.id().to_string();
                    let pending_for_item = self
                        .content
                        .request()
                        .map(|r| r.kind == GenerationKind::Cloze && r.item_id.as_deref() == Some(&item_id))
                        .unwrap_or(false);
                    if !pending_for_item {
                        let request = GenerationRequest::for_item(
                            GenerationKind::Cloze,
                            item_id,
                            q.item.payload.clone(),
                        );
                        self.content = ContentState::Loading(request.clone());
                        self.verification = ContentState::Idle;
                        effects.push(Effect::Generate(request));
                    }
                    return effects;
                }
            }
        }
    }

    /// 批次收尾：尚未提交的词条以成功结算（失败早已提交），然后进入下一批或汇总
    fn finish_batch(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        let pending: Vec<usize> = self.batches[self.current_batch]
            .items
            .iter()
            .enumerate()
            .filter(|(_, q)| !q.committed)
            .map(|(i, _)| i)
            .collect();
        for idx in pending {
            self.finalize(idx, Outcome::Success, &mut effects);
        }

        let next = self.current_batch + 1;
        if next < self.batches.len() {
            effects.extend(self.start_batch(next));
        } else {
            self.stage = SessionStage::Consolidation;
            self.content = ContentState::Idle;
            tracing::info!(session_id = %self.id, "All batches done, consolidating");
        }
        effects
    }

    /// 当前展示词条的 ID（供表现层构造 Answer 事件）
    pub fn current_item_id(&self) -> Option<ItemId> {
        self.current_item().map(|q| q.item.id.clone())
    }
}

/// 函数式入口：在副本上应用作答事件，返回新会话与副作用
pub fn record_outcome(
    session: &Session,
    item_id: &str,
    phase: Phase,
    outcome: Outcome,
) -> Result<(Session, Vec<Effect>), SessionError> {
    let mut next = session.clone();
    let effects = next.apply(SessionEvent::Answer {
        item_id: item_id.to_string(),
        phase,
        outcome,
    })?;
    Ok((next, effects))
}
