//! 学习引擎编排器：主控循环
//!
//! 负责：按配置创建存储与生成服务、加载词池构建会话、按顺序执行状态机产出的副作用
//! （调度提交、持久化、生成请求），并在后台任务中消费用户命令、把 SessionView 推送给表现层。

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};

use crate::config::{load_config, AppConfig};
use crate::core::{EngineError, RecoveryAction, RecoveryEngine, SessionView};
use crate::generation::{
    parse_verdict, GenerationError, GenerationKind, GenerationRequest, GenerationService,
    MockGenerator, OpenAiGenerator, OPENAI_DEFAULT_MODEL,
};
use crate::scheduler::{advance, format_interval, mark_known, Outcome, SchedulingState};
use crate::session::{
    build_session, needs_mnemonic_request, BuildOptions, Effect, Phase, Session, SessionError,
    SessionEvent, SessionMode, SessionStage, SessionSummary,
};
use crate::store::{InMemoryStore, PendingWrite, PendingWrites, SqliteStore, VocabStore};
use crate::vocab::{ItemId, LexicalPayload, PoolEntry};

/// 从表现层发往编排器的用户命令
#[derive(Debug, Clone)]
pub enum Command {
    /// 加载词池并开始新会话
    Start(SessionMode),
    /// 介绍 / 热身 / 引入 / 叙事 / 汇总阶段的「下一步」
    Acknowledge,
    /// 对当前词条的自评结果
    Answer(Outcome),
    /// 产出阶段的自由作答，由生成服务判定
    AnswerText(String),
    /// 重试失败的生成
    Retry,
    /// 当前词条已掌握
    MarkKnown,
    /// 修改当前词条（或热身中的 leech）的助记
    EditMnemonic(String),
    Quit,
}

/// 根据配置与环境变量选择生成后端（DeepSeek / OpenAI 兼容 / Mock）
pub fn create_generator_from_config(cfg: &AppConfig) -> Arc<dyn GenerationService> {
    let provider = cfg.llm.provider.to_lowercase();
    if provider == "mock" {
        tracing::info!("Using mock generation service");
        return Arc::new(MockGenerator::new());
    }

    let deepseek_key = std::env::var("DEEPSEEK_API_KEY").ok();
    let openai_key = std::env::var("OPENAI_API_KEY").ok();
    let model = cfg.llm.model.as_deref();

    match (provider.as_str(), deepseek_key, openai_key) {
        // 没有 DEEPSEEK_API_KEY 时退回 OPENAI_API_KEY
        ("deepseek", Some(key), _) | ("deepseek", None, Some(key)) => {
            let generator = OpenAiGenerator::deepseek(model, &key);
            tracing::info!("Using DeepSeek generation ({})", generator.model());
            Arc::new(generator)
        }
        ("openai", _, Some(key)) => {
            let generator = OpenAiGenerator::new(
                cfg.llm.base_url.as_deref(),
                model.unwrap_or(OPENAI_DEFAULT_MODEL),
                &key,
            );
            tracing::info!("Using OpenAI-compatible generation ({})", generator.model());
            Arc::new(generator)
        }
        (other, _, _) => {
            tracing::warn!(provider = other, "No API key for provider, using mock generation");
            Arc::new(MockGenerator::new())
        }
    }
}

/// 配置了 db_path 时使用 SQLite，否则使用内存存储
pub fn create_store_from_config(cfg: &AppConfig) -> Result<Arc<dyn VocabStore>, EngineError> {
    match &cfg.app.db_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Opening SQLite store");
            Ok(Arc::new(SqliteStore::open(path)?))
        }
        None => {
            tracing::warn!("No db_path configured, progress is kept in memory only");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}

/// 学习引擎：持有存储、生成服务、词池快照与当前会话
pub struct Engine {
    store: Arc<dyn VocabStore>,
    generator: Arc<dyn GenerationService>,
    recovery: RecoveryEngine,
    user_id: String,
    session_limit: usize,
    options: BuildOptions,
    request_timeout: Duration,
    /// 会话开始时读出的词池，提交后就地更新
    pool: HashMap<ItemId, PoolEntry>,
    session: Option<Session>,
    outbox: PendingWrites,
    /// 最近一次判定请求的失败原因，由 verify_answer 取走
    verification_error: Option<GenerationError>,
    last_error: Option<String>,
}

impl Engine {
    pub fn new(
        store: Arc<dyn VocabStore>,
        generator: Arc<dyn GenerationService>,
        cfg: &AppConfig,
    ) -> Self {
        Self {
            store,
            generator,
            recovery: RecoveryEngine::new(),
            user_id: cfg.app.user_id.clone(),
            session_limit: cfg.app.session_limit,
            options: cfg.build_options(),
            request_timeout: Duration::from_secs(cfg.llm.timeouts.request.max(1)),
            pool: HashMap::new(),
            session: None,
            outbox: PendingWrites::new(),
            verification_error: None,
            last_error: None,
        }
    }

    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> Arc<dyn VocabStore> {
        Arc::clone(&self.store)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn pending_writes(&self) -> usize {
        self.outbox.len()
    }

    /// 词池中某词条的最新调度状态
    pub fn scheduling_state(&self, item_id: &str) -> Option<&SchedulingState> {
        self.pool.get(item_id).map(|e| &e.state)
    }

    /// 读取词池并构建新会话（替换尚未结束的旧会话）
    pub async fn start_session(&mut self, mode: SessionMode) -> Result<(), EngineError> {
        self.flush_outbox().await;
        let mut pool = self.store.get_pool(&self.user_id).await?;
        // 仍在重试队列中的写入比存储里的副本新
        let patched = self.outbox.overlay(&mut pool);
        if patched > 0 {
            tracing::info!(patched, "Applied pending writes to loaded pool");
        }
        self.enforce_integrity(&mut pool);
        let session = build_session(&pool, self.session_limit, mode, &self.options, Utc::now());
        tracing::info!(
            session_id = %session.id,
            items = session.total_items(),
            leeches = session.leeches.len(),
            "Session started"
        );
        self.pool = pool.into_iter().map(|e| (e.item.id.clone(), e)).collect();
        self.session = Some(session);
        self.last_error = None;
        Ok(())
    }

    /// 把事件交给状态机，然后按顺序执行副作用
    pub async fn dispatch(&mut self, event: SessionEvent) -> Result<(), EngineError> {
        let session = self.session.as_mut().ok_or(EngineError::NoSession)?;
        let effects = session.apply(event)?;
        self.last_error = None;
        self.run_effects(effects).await;
        Ok(())
    }

    pub async fn acknowledge(&mut self) -> Result<(), EngineError> {
        self.dispatch(SessionEvent::Acknowledge).await
    }

    pub async fn record_outcome(
        &mut self,
        item_id: &str,
        phase: Phase,
        outcome: Outcome,
    ) -> Result<(), EngineError> {
        self.dispatch(SessionEvent::Answer {
            item_id: item_id.to_string(),
            phase,
            outcome,
        })
        .await
    }

    /// 对当前展示的词条作答
    pub async fn answer_current(&mut self, outcome: Outcome) -> Result<(), EngineError> {
        let session = self.session.as_ref().ok_or(EngineError::NoSession)?;
        let phase = session
            .phase()
            .ok_or(SessionError::WrongStage(session.stage))?;
        let item_id = session
            .current_item_id()
            .ok_or(SessionError::NoAnswerExpected(phase))?;
        self.record_outcome(&item_id, phase, outcome).await
    }

    pub async fn retry(&mut self) -> Result<(), EngineError> {
        self.dispatch(SessionEvent::Retry).await
    }

    pub async fn mark_known(&mut self, item_id: &str) -> Result<(), EngineError> {
        self.dispatch(SessionEvent::MarkKnown {
            item_id: item_id.to_string(),
        })
        .await
    }

    pub async fn edit_mnemonic(&mut self, item_id: &str, text: &str) -> Result<(), EngineError> {
        self.dispatch(SessionEvent::EditMnemonic {
            item_id: item_id.to_string(),
            text: text.trim().to_string(),
        })
        .await
    }

    /// 判定产出阶段的自由作答：与词形完全一致直接通过，否则交给生成服务判定。
    ///
    /// 判定请求失败时阶段进入 Failed，返回生成错误，`retry` 会重新发起判定。
    /// 成功时返回该词条本次会话最终记录的结果。
    pub async fn verify_answer(&mut self, answer: &str) -> Result<Outcome, EngineError> {
        let session = self.session.as_ref().ok_or(EngineError::NoSession)?;
        match session.phase() {
            Some(Phase::Production) => {}
            Some(actual) => {
                return Err(SessionError::PhaseMismatch {
                    expected: Phase::Production,
                    actual,
                }
                .into())
            }
            None => return Err(SessionError::WrongStage(session.stage).into()),
        }
        let (item_id, lemma) = session
            .current_item()
            .map(|q| (q.item.id.clone(), q.item.payload.lemma().trim().to_lowercase()))
            .ok_or(SessionError::NoAnswerExpected(Phase::Production))?;

        let answer = answer.trim();
        if answer.to_lowercase() == lemma {
            self.record_outcome(&item_id, Phase::Production, Outcome::Success)
                .await?;
        } else {
            self.verification_error = None;
            self.dispatch(SessionEvent::SubmitAnswer {
                item_id: item_id.clone(),
                answer: answer.to_string(),
            })
            .await?;
            if let Some(e) = self.verification_error.take() {
                return Err(e.into());
            }
        }

        let outcome = self
            .session
            .as_ref()
            .and_then(|s| s.results.get(&item_id).copied())
            .ok_or(SessionError::ContentPending)?;
        tracing::debug!(%item_id, ?outcome, "Answer verified");
        Ok(outcome)
    }

    /// 执行一条表现层命令
    pub async fn execute(&mut self, command: Command) -> Result<(), EngineError> {
        match command {
            Command::Start(mode) => self.start_session(mode).await,
            Command::Acknowledge => self.acknowledge().await,
            Command::Answer(outcome) => self.answer_current(outcome).await,
            Command::AnswerText(text) => self.verify_answer(&text).await.map(|_| ()),
            Command::Retry => self.retry().await,
            Command::MarkKnown => {
                let session = self.session.as_ref().ok_or(EngineError::NoSession)?;
                let item_id = session
                    .current_item_id()
                    .ok_or(SessionError::WrongStage(session.stage))?;
                self.mark_known(&item_id).await
            }
            Command::EditMnemonic(text) => {
                let session = self.session.as_ref().ok_or(EngineError::NoSession)?;
                let item_id = session
                    .current_leech()
                    .map(|l| l.id.clone())
                    .or_else(|| session.current_item_id())
                    .ok_or(SessionError::WrongStage(session.stage))?;
                self.edit_mnemonic(&item_id, &text).await
            }
            Command::Quit => {
                self.flush_outbox().await;
                Ok(())
            }
        }
    }

    /// 汇总（会话进入收尾后才有），附带每个词条的下次复习间隔
    pub fn summary(&self) -> Option<SessionSummary> {
        let session = self.session.as_ref()?;
        if !matches!(
            session.stage,
            SessionStage::Consolidation | SessionStage::Summary
        ) {
            return None;
        }
        let mut summary = session.summary();
        for line in summary.lines.iter_mut() {
            line.next_review = self
                .pool
                .get(&line.item_id)
                .map(|e| format_interval(e.state.interval));
        }
        Some(summary)
    }

    /// 当前状态投影
    pub fn view(&self) -> SessionView {
        match &self.session {
            Some(session) => SessionView::project(
                session,
                self.summary(),
                self.outbox.len(),
                self.last_error.clone(),
            ),
            None => SessionView {
                pending_writes: self.outbox.len(),
                error_message: self.last_error.clone(),
                ..SessionView::default()
            },
        }
    }

    async fn run_effects(&mut self, effects: Vec<Effect>) {
        let mut queue: VecDeque<Effect> = effects.into();
        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Commit { item_id, outcome } => self.commit(&item_id, outcome).await,
                Effect::MarkKnown { item_id } => self.graduate(&item_id).await,
                Effect::Generate(request) => {
                    let result = match request.kind {
                        GenerationKind::Verification => self
                            .generate(&request)
                            .await
                            .and_then(|text| parse_verdict(&text))
                            .map(|correct| SessionEvent::Verdict {
                                request: request.clone(),
                                correct,
                            }),
                        _ => self.generate(&request).await.map(|text| SessionEvent::ContentReady {
                            request: request.clone(),
                            text,
                        }),
                    };
                    let event = match result {
                        Ok(event) => event,
                        Err(e) => {
                            let action = self.recovery.handle(&EngineError::Generation(e.clone()));
                            tracing::warn!(kind = %request.kind, error = %e, ?action, "Generation failed");
                            let message = e.to_string();
                            if request.kind == GenerationKind::Verification {
                                self.verification_error = Some(e);
                            }
                            SessionEvent::ContentFailed { request, message }
                        }
                    };
                    queue.extend(self.feed(event));
                }
                Effect::PersistMnemonic { item_id, text } => {
                    if let Some(entry) = self.pool.get_mut(&item_id) {
                        entry.item.mnemonic = Some(text.clone());
                    }
                    self.persist(PendingWrite::Mnemonic { item_id, text }).await;
                }
                Effect::Closed => self.flush_outbox().await,
            }
        }

        if self.session.as_ref().map(|s| s.stage) == Some(SessionStage::Consolidation) {
            self.flush_outbox().await;
        }
    }

    /// 把生成结果回送状态机；过期结果直接丢弃
    fn feed(&mut self, event: SessionEvent) -> Vec<Effect> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        match session.apply(event) {
            Ok(effects) => effects,
            Err(SessionError::StaleContent) => {
                tracing::debug!("Discarding stale generation result");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Generation result rejected");
                Vec::new()
            }
        }
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        match tokio::time::timeout(self.request_timeout, self.generator.generate(request)).await {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout(self.request_timeout.as_secs())),
        }
    }

    /// 经调度器推进并持久化；首次成为 leech 且没有助记时请求生成助记
    async fn commit(&mut self, item_id: &str, outcome: Outcome) {
        self.flush_outbox().await;
        let Some(entry) = self.pool.get_mut(item_id) else {
            tracing::warn!(%item_id, "Commit for item missing from pool");
            return;
        };
        let before = entry.state.clone();
        let after = advance(&before, outcome, Utc::now());
        entry.state = after.clone();
        let wants_mnemonic = needs_mnemonic_request(&before, &after, &entry.item);
        let payload = entry.item.payload.clone();

        tracing::info!(
            %item_id,
            ?outcome,
            status = after.status.as_str(),
            interval = after.interval,
            ease = after.ease_factor,
            "Item committed"
        );
        self.persist(PendingWrite::SchedulingState {
            item_id: item_id.to_string(),
            state: after,
        })
        .await;

        if wants_mnemonic {
            self.request_mnemonic(item_id, payload).await;
        }
    }

    async fn request_mnemonic(&mut self, item_id: &str, payload: LexicalPayload) {
        let request = GenerationRequest::for_item(GenerationKind::Mnemonic, item_id, payload);
        match self.generate(&request).await {
            Ok(text) => {
                let text = text.trim().to_string();
                if let Some(entry) = self.pool.get_mut(item_id) {
                    entry.item.mnemonic = Some(text.clone());
                }
                tracing::info!(%item_id, "Generated mnemonic for new leech");
                self.persist(PendingWrite::Mnemonic {
                    item_id: item_id.to_string(),
                    text,
                })
                .await;
            }
            Err(e) => {
                tracing::warn!(%item_id, error = %e, "Mnemonic generation failed, leech stays without mnemonic");
            }
        }
    }

    async fn graduate(&mut self, item_id: &str) {
        self.flush_outbox().await;
        let Some(entry) = self.pool.get_mut(item_id) else {
            tracing::warn!(%item_id, "Mark-known for item missing from pool");
            return;
        };
        let after = mark_known(&entry.state, Utc::now());
        entry.state = after.clone();
        tracing::info!(%item_id, interval = after.interval, "Item marked as known");
        self.persist(PendingWrite::SchedulingState {
            item_id: item_id.to_string(),
            state: after,
        })
        .await;
    }

    /// 写入存储；暂时性失败进入重试队列
    async fn persist(&mut self, write: PendingWrite) {
        match write.apply(self.store.as_ref()).await {
            Ok(()) => match &write {
                PendingWrite::SchedulingState { item_id, .. } => self.outbox.discard_state(item_id),
                PendingWrite::Mnemonic { item_id, .. } => self.outbox.discard_mnemonic(item_id),
            },
            Err(e) => {
                tracing::warn!(item_id = %write.item_id(), store = self.store.name(), error = %e, "Store write failed");
                match self.recovery.handle(&EngineError::Store(e)) {
                    RecoveryAction::QueueWrite => self.outbox.push(write),
                    action => tracing::warn!(?action, item_id = %write.item_id(), "Write dropped"),
                }
            }
        }
    }

    /// 缺少词法字段的词条换成占位内容，不让单个坏词条中断会话
    fn enforce_integrity(&self, pool: &mut Vec<PoolEntry>) {
        pool.retain_mut(|entry| {
            if entry.item.payload.is_complete() {
                return true;
            }
            let err = EngineError::DataIntegrity(format!(
                "item {} is missing lexical fields",
                entry.item.id
            ));
            match self.recovery.handle(&err) {
                RecoveryAction::UsePlaceholder => {
                    entry.item.sanitize();
                    true
                }
                action => {
                    tracing::warn!(item_id = %entry.item.id, ?action, "Dropping item from pool");
                    false
                }
            }
        });
    }

    async fn flush_outbox(&mut self) {
        if self.outbox.is_empty() {
            return;
        }
        let remaining = self.outbox.flush(self.store.as_ref()).await;
        if remaining > 0 {
            tracing::warn!(remaining, "Pending writes still not persisted");
        }
    }
}

/// 创建引擎运行时：返回命令发送端与状态接收端；后台任务消费命令并推送最新 SessionView。
pub async fn create_engine(
    config_path: Option<PathBuf>,
) -> Result<(mpsc::UnboundedSender<Command>, watch::Receiver<SessionView>), EngineError> {
    let cfg = load_config(config_path).map_err(|e| EngineError::Config(e.to_string()))?;
    let store = create_store_from_config(&cfg)?;
    let generator = create_generator_from_config(&cfg);
    Ok(spawn_engine(Engine::new(store, generator, &cfg)))
}

/// 在后台任务中运行引擎；每条命令处理完后推送一次视图，Quit 或发送端关闭时退出
pub fn spawn_engine(
    mut engine: Engine,
) -> (mpsc::UnboundedSender<Command>, watch::Receiver<SessionView>) {
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Command>();
    let (state_tx, state_rx) = watch::channel(engine.view());

    tokio::spawn(async move {
        while let Some(cmd) = cmd_rx.recv().await {
            let quit = matches!(cmd, Command::Quit);
            if let Err(e) = engine.execute(cmd).await {
                tracing::warn!(error = %e, "Command failed");
                engine.last_error = Some(e.to_string());
            }
            if quit {
                break;
            }
            let _ = state_tx.send(engine.view());
        }
        tracing::info!("Engine loop stopped");
    });

    (cmd_tx, state_rx)
}
