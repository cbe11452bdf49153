//! Core orchestrator implementation
//!
//! Plans a specification, then executes its atoms level by level:
//!
//! - Atoms in one level run concurrently, bounded by `max_workers`
//! - Level k+1 starts only once every level-k atom is resolved
//! - Workers report through a channel; only this loop mutates atoms
//! - Failures block dependents instead of aborting the plan

use mosaic_agent::InferenceProvider;
use mosaic_core::fail_open::fail_open;
use mosaic_core::{
    AtomStatus, AtomicTask, AttemptOutcome, AttemptRecord, MosaicConfig, MosaicError, Result, Tier,
};
use mosaic_graph::DependencyGraph;
use mosaic_inference::{InferenceEngine, TierTable};
use mosaic_patterns::PatternCache;
use mosaic_planning::{MultiPassPlanner, Plan, Specification};
use mosaic_validation::EnsembleValidator;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::events::{emit, ProgressKind, ProgressSink, TracingSink};
use crate::report::{PlanReport, ReportBuilder};
use crate::state_machine::{transition, AtomAction, AtomEvent};
use crate::store::{MemoryTaskStore, TaskStore};

/// Stage reached by a worker within one attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WorkerStage {
    Routed { tier: Tier },
    Inferred,
    Validating,
}

/// Result of one attempt as seen by the worker
#[derive(Debug, Clone)]
pub struct AttemptResult {
    pub record: AttemptRecord,
    pub code: Option<String>,
    /// Pattern the candidate was adapted from
    pub pattern_id: Option<String>,
}

impl AttemptResult {
    fn new(record: AttemptRecord) -> Self {
        Self {
            record,
            code: None,
            pattern_id: None,
        }
    }

    pub fn accepted(&self) -> bool {
        self.record.outcome == AttemptOutcome::Accepted
    }
}

/// Message from a worker to the orchestrator loop
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Stage { atom_id: String, stage: WorkerStage },
    Finished { atom_id: String, result: AttemptResult },
}

/// Shared handles a worker needs for one attempt
#[derive(Clone)]
struct WorkerContext {
    engine: Arc<InferenceEngine>,
    validator: Arc<EnsembleValidator>,
    tx: mpsc::Sender<WorkerEvent>,
}

impl WorkerContext {
    async fn stage(&self, atom_id: &str, stage: WorkerStage) {
        // The loop outlives every worker it waits on
        let _ = self
            .tx
            .send(WorkerEvent::Stage {
                atom_id: atom_id.to_string(),
                stage,
            })
            .await;
    }

    /// Route, synthesize, check and validate one candidate
    async fn attempt(&self, task: &AtomicTask, number: u32) -> AttemptResult {
        let preparation = self.engine.prepare(task).await;
        let tier = preparation.routing.tier;
        self.stage(&task.id, WorkerStage::Routed { tier }).await;

        let synthesis = match self.engine.synthesize(task, &preparation).await {
            Ok(synthesis) => synthesis,
            Err(e) => {
                warn!(atom = %task.id, attempt = number, error = %e, "Inference failed");
                return AttemptResult::new(
                    AttemptRecord::new(number, AttemptOutcome::ProviderError)
                        .with_tier(tier)
                        .with_violations(vec![format!("inference: {}", e)]),
                );
            }
        };
        self.stage(&task.id, WorkerStage::Inferred).await;

        let pattern_id = synthesis.path.pattern_id().map(str::to_string);
        if !synthesis.accepted() {
            return AttemptResult {
                record: AttemptRecord::new(number, AttemptOutcome::Rejected)
                    .with_tier(synthesis.implementation_tier)
                    .with_violations(synthesis.report.violations.clone()),
                code: Some(synthesis.code),
                pattern_id,
            };
        }

        self.stage(&task.id, WorkerStage::Validating).await;
        let report = self.validator.validate(task, &synthesis.code).await;
        let outcome = if report.passed() {
            AttemptOutcome::Accepted
        } else {
            AttemptOutcome::Rejected
        };
        let violations = if report.passed() {
            Vec::new()
        } else {
            report.result.violations.clone()
        };

        AttemptResult {
            record: AttemptRecord::new(number, outcome)
                .with_tier(synthesis.implementation_tier)
                .with_violations(violations)
                .with_score(report.score()),
            code: Some(synthesis.code),
            pattern_id,
        }
    }
}

/// The main orchestrator struct
pub struct Orchestrator {
    config: MosaicConfig,
    patterns: Arc<dyn PatternCache>,
    engine: Arc<InferenceEngine>,
    validator: Arc<EnsembleValidator>,
    planning_provider: Arc<dyn InferenceProvider>,
    store: Arc<dyn TaskStore>,
    sink: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
    attempt_timeout: Duration,
    cancel_grace: Duration,
}

impl Orchestrator {
    /// Create an orchestrator
    ///
    /// Planning runs on the Heavy tier's provider unless overridden with
    /// [`Orchestrator::with_planning_provider`].
    pub fn new(
        config: MosaicConfig,
        patterns: Arc<dyn PatternCache>,
        tiers: TierTable,
    ) -> Result<Self> {
        config.validate()?;
        let planning_provider = tiers.get(Tier::Heavy)?.provider.clone();
        let engine = InferenceEngine::new(patterns.clone(), tiers, &config);
        let validator = EnsembleValidator::new(&config.validation, config.atoms.max_statements);

        Ok(Self {
            attempt_timeout: Duration::from_secs(config.execution.attempt_timeout_secs),
            cancel_grace: Duration::from_secs(config.execution.cancel_grace_secs),
            engine: Arc::new(engine),
            validator: Arc::new(validator),
            planning_provider,
            store: Arc::new(MemoryTaskStore::new()),
            sink: Arc::new(TracingSink),
            cancel: CancellationToken::new(),
            patterns,
            config,
        })
    }

    pub fn with_validator(mut self, validator: EnsembleValidator) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_planning_provider(mut self, provider: Arc<dyn InferenceProvider>) -> Self {
        self.planning_provider = provider;
        self
    }

    /// Use an externally owned cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    pub fn config(&self) -> &MosaicConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn patterns(&self) -> &Arc<dyn PatternCache> {
        &self.patterns
    }

    /// Run the six planning passes
    #[instrument(skip(self, spec), fields(title = %spec.title))]
    pub async fn plan(&self, spec: &Specification) -> Result<Plan> {
        let planner = MultiPassPlanner::new(self.planning_provider.clone(), &self.config);
        match planner.plan(spec).await {
            Ok(plan) => {
                for pass in &plan.passes {
                    emit(
                        &self.sink,
                        ProgressKind::PassCompleted,
                        json!({
                            "plan_id": plan.id,
                            "pass": pass.pass,
                            "name": pass.name,
                            "duration_ms": pass.duration_ms,
                            "detail": pass.detail,
                        }),
                    )
                    .await;
                }
                Ok(plan)
            }
            Err(e) => {
                emit(
                    &self.sink,
                    ProgressKind::PlanFailed,
                    json!({"title": spec.title, "error": e.to_string()}),
                )
                .await;
                Err(e)
            }
        }
    }

    /// Plan a specification and execute the result
    pub async fn run(&self, spec: &Specification) -> Result<PlanReport> {
        let plan = self.plan(spec).await?;
        self.execute(&plan).await
    }

    /// Execute a validated plan
    pub async fn execute(&self, plan: &Plan) -> Result<PlanReport> {
        self.run_atoms(&plan.id, plan.atoms.clone(), plan.warnings.clone())
            .await
    }

    /// Execute a set of atoms directly, without planning
    pub async fn execute_atoms(&self, plan_id: &str, atoms: Vec<AtomicTask>) -> Result<PlanReport> {
        self.run_atoms(plan_id, atoms, Vec::new()).await
    }

    #[instrument(skip(self, atoms, warnings), fields(atoms = atoms.len()))]
    async fn run_atoms(
        &self,
        plan_id: &str,
        atoms: Vec<AtomicTask>,
        warnings: Vec<String>,
    ) -> Result<PlanReport> {
        let started = Instant::now();

        let (graph, levels) = match DependencyGraph::build(&atoms).and_then(|g| {
            let levels = g.compute_levels()?;
            Ok((g, levels))
        }) {
            Ok(built) => built,
            Err(e) => {
                error!(plan = plan_id, error = %e, "Cannot schedule plan");
                emit(
                    &self.sink,
                    ProgressKind::PlanFailed,
                    json!({"plan_id": plan_id, "error": e.to_string()}),
                )
                .await;
                return Err(e);
            }
        };

        let snapshot = graph.snapshot();
        fail_open("task_store_graph", || self.store.save_graph(plan_id, &snapshot)).await;

        info!(
            plan = plan_id,
            atoms = atoms.len(),
            levels = levels.len(),
            workers = self.config.execution.max_workers,
            "Executing plan"
        );

        let mut run = Run::new(self, plan_id, atoms, graph);

        let result = run.execute_levels(&levels).await;
        if let Err(e) = result {
            run.workers.abort_all();
            error!(plan = plan_id, error = %e, "Plan aborted");
            emit(
                &self.sink,
                ProgressKind::PlanFailed,
                json!({"plan_id": plan_id, "error": e.to_string()}),
            )
            .await;
            return Err(e);
        }

        let cancelled = run.is_cancelled();
        let (atoms, mut builder, background) = run.finish().await;
        // Learning never delays a level, but the report waits for it
        for handle in background {
            if let Ok(Some(pattern_id)) = handle.await {
                builder.patterns_learned.push(pattern_id);
            }
        }
        builder.patterns_learned.sort();
        builder.warnings = warnings;

        let report = builder.build(
            plan_id,
            levels,
            &atoms,
            cancelled,
            started.elapsed().as_millis() as u64,
        );

        info!(
            plan = plan_id,
            outcome = %report.outcome,
            completed = report.completed.len(),
            failed = report.failed.len(),
            blocked = report.blocked.len(),
            duration_ms = report.duration_ms,
            "Plan finished"
        );
        emit(
            &self.sink,
            ProgressKind::PlanCompleted,
            json!({
                "plan_id": plan_id,
                "outcome": report.outcome,
                "completed": report.completed.len(),
                "failed": report.failed.len(),
                "blocked": report.blocked.len(),
                "unresolved": report.unresolved.len(),
            }),
        )
        .await;

        Ok(report)
    }
}

/// Mutable state of one execution
struct Run<'a> {
    orchestrator: &'a Orchestrator,
    plan_id: String,
    atoms: BTreeMap<String, AtomicTask>,
    graph: DependencyGraph,
    report: ReportBuilder,
    /// Pattern writes; resolve to the stored pattern id
    background: Vec<JoinHandle<Option<String>>>,
    /// Atom id -> attempt number currently in a worker
    in_flight: BTreeMap<String, u32>,
    /// Tier of the attempt currently in flight
    current_tier: HashMap<String, Tier>,
    workers: JoinSet<()>,
    semaphore: Arc<Semaphore>,
    context: WorkerContext,
    rx: mpsc::Receiver<WorkerEvent>,
    cancelled: bool,
}

impl<'a> Run<'a> {
    fn new(
        orchestrator: &'a Orchestrator,
        plan_id: &str,
        atoms: Vec<AtomicTask>,
        graph: DependencyGraph,
    ) -> Self {
        let workers = orchestrator.config.execution.max_workers.max(1);
        let (tx, rx) = mpsc::channel(workers * 8);
        Self {
            orchestrator,
            plan_id: plan_id.to_string(),
            atoms: atoms.into_iter().map(|a| (a.id.clone(), a)).collect(),
            graph,
            report: ReportBuilder::default(),
            background: Vec::new(),
            in_flight: BTreeMap::new(),
            current_tier: HashMap::new(),
            workers: JoinSet::new(),
            semaphore: Arc::new(Semaphore::new(workers)),
            context: WorkerContext {
                engine: orchestrator.engine.clone(),
                validator: orchestrator.validator.clone(),
                tx,
            },
            rx,
            cancelled: false,
        }
    }

    async fn finish(
        mut self,
    ) -> (
        BTreeMap<String, AtomicTask>,
        ReportBuilder,
        Vec<JoinHandle<Option<String>>>,
    ) {
        while self.workers.join_next().await.is_some() {}
        (self.atoms, self.report, self.background)
    }

    /// True once the token fired, even if the loop has not observed it yet
    fn is_cancelled(&self) -> bool {
        self.cancelled || self.orchestrator.cancel.is_cancelled()
    }

    fn sink(&self) -> &Arc<dyn ProgressSink> {
        &self.orchestrator.sink
    }

    fn status(&self, id: &str) -> Result<AtomStatus> {
        self.atoms
            .get(id)
            .map(|a| a.status)
            .ok_or_else(|| MosaicError::Scheduling(format!("unknown atom {}", id)))
    }

    async fn execute_levels(&mut self, levels: &[Vec<String>]) -> Result<()> {
        for (index, level) in levels.iter().enumerate() {
            if self.orchestrator.cancel.is_cancelled() {
                info!(level = index, "Cancelled before level start");
                self.cancelled = true;
                break;
            }

            emit(
                self.sink(),
                ProgressKind::LevelStarted,
                json!({"plan_id": self.plan_id, "level": index, "atoms": level}),
            )
            .await;
            debug!(level = index, atoms = level.len(), "Level started");

            for id in level {
                if self.status(id)? != AtomStatus::Pending {
                    continue;
                }
                let unmet: Vec<String> = self.atoms[id]
                    .dependencies
                    .iter()
                    .filter(|dep| {
                        self.atoms.get(*dep).map(|a| a.status) != Some(AtomStatus::Completed)
                    })
                    .cloned()
                    .collect();
                if unmet.is_empty() {
                    self.spawn_attempt(id, 1)?;
                } else {
                    self.block(id, unmet).await?;
                }
            }

            self.drain().await?;

            let mut counts: BTreeMap<String, usize> = BTreeMap::new();
            for id in level {
                *counts.entry(self.status(id)?.to_string()).or_default() += 1;
            }
            emit(
                self.sink(),
                ProgressKind::LevelCompleted,
                json!({"plan_id": self.plan_id, "level": index, "statuses": counts}),
            )
            .await;

            if self.cancelled {
                break;
            }
        }
        Ok(())
    }

    fn spawn_attempt(&mut self, id: &str, number: u32) -> Result<()> {
        let task = self
            .atoms
            .get(id)
            .cloned()
            .ok_or_else(|| MosaicError::Scheduling(format!("unknown atom {}", id)))?;
        let context = self.context.clone();
        let semaphore = self.semaphore.clone();
        let timeout = self.orchestrator.attempt_timeout;

        self.in_flight.insert(id.to_string(), number);
        self.workers.spawn(async move {
            let atom_id = task.id.clone();
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => match tokio::time::timeout(timeout, context.attempt(&task, number)).await {
                    Ok(result) => result,
                    Err(_) => AttemptResult::new(
                        AttemptRecord::new(number, AttemptOutcome::TimedOut).with_violations(vec![
                            format!("attempt timed out after {}ms", timeout.as_millis()),
                        ]),
                    ),
                },
                Err(_) => AttemptResult::new(
                    AttemptRecord::new(number, AttemptOutcome::Cancelled)
                        .with_violations(vec!["worker pool closed".to_string()]),
                ),
            };
            let _ = context
                .tx
                .send(WorkerEvent::Finished { atom_id, result })
                .await;
        });
        debug!(atom = id, attempt = number, "Dispatched attempt");
        Ok(())
    }

    /// Process worker events until the level has nothing in flight
    async fn drain(&mut self) -> Result<()> {
        let mut deadline: Option<tokio::time::Instant> = None;

        while !self.in_flight.is_empty() {
            // Cancellation is observed before any queued worker event
            tokio::select! {
                biased;
                _ = self.orchestrator.cancel.cancelled(), if deadline.is_none() => {
                    info!(
                        in_flight = self.in_flight.len(),
                        grace_ms = self.orchestrator.cancel_grace.as_millis() as u64,
                        "Cancellation requested"
                    );
                    self.cancelled = true;
                    deadline = Some(tokio::time::Instant::now() + self.orchestrator.cancel_grace);
                }
                Some(event) = self.rx.recv() => self.handle(event).await?,
                Some(joined) = self.workers.join_next() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            return Err(MosaicError::Scheduling(format!("worker panicked: {}", e)));
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(tokio::time::Instant::now)), if deadline.is_some() => {
                    warn!(in_flight = self.in_flight.len(), "Grace period over, aborting workers");
                    self.workers.abort_all();
                    self.abandon_in_flight();
                }
            }
        }
        Ok(())
    }

    /// Record a cancelled attempt for every aborted worker
    fn abandon_in_flight(&mut self) {
        for (id, number) in std::mem::take(&mut self.in_flight) {
            if let Some(atom) = self.atoms.get_mut(&id) {
                let mut record = AttemptRecord::new(number, AttemptOutcome::Cancelled);
                if let Some(tier) = self.current_tier.get(&id) {
                    record = record.with_tier(*tier);
                }
                atom.attempts.push(record);
            }
        }
    }

    async fn handle(&mut self, event: WorkerEvent) -> Result<()> {
        match event {
            WorkerEvent::Stage { atom_id, stage } => {
                if !self.in_flight.contains_key(&atom_id) {
                    return Ok(());
                }
                let event = match stage {
                    WorkerStage::Routed { tier } => {
                        self.current_tier.insert(atom_id.clone(), tier);
                        AtomEvent::Route { tier }
                    }
                    WorkerStage::Inferred => AtomEvent::Infer,
                    WorkerStage::Validating => AtomEvent::Validate,
                };
                let actions = self.apply(&atom_id, event).await?;
                self.perform(&atom_id, actions).await
            }
            WorkerEvent::Finished { atom_id, result } => {
                if self.in_flight.remove(&atom_id).is_none() {
                    return Ok(());
                }
                self.finish_attempt(&atom_id, result).await
            }
        }
    }

    async fn finish_attempt(&mut self, id: &str, mut result: AttemptResult) -> Result<()> {
        let tier = match result.record.tier {
            Some(tier) => tier,
            None => {
                let tier = self.current_tier.get(id).copied().unwrap_or_default();
                result.record.tier = Some(tier);
                tier
            }
        };

        // Timeouts and provider errors end an attempt before validation
        loop {
            let event = match self.status(id)? {
                AtomStatus::Pending | AtomStatus::Retrying => AtomEvent::Route { tier },
                AtomStatus::Routed => AtomEvent::Infer,
                AtomStatus::Inferred => AtomEvent::Validate,
                _ => break,
            };
            let actions = self.apply(id, event).await?;
            self.perform(id, actions).await?;
        }

        let number = result.record.number;
        let accepted = result.accepted();
        let score = result.record.score.unwrap_or(0.0);
        if let Some(atom) = self.atoms.get_mut(id) {
            atom.attempts.push(result.record.clone());
            if accepted {
                atom.code = result.code.clone();
            }
        }

        let event = if accepted {
            let learn = !self.is_cancelled()
                && score >= self.orchestrator.config.execution.learning_threshold;
            if let Some(pattern_id) = &result.pattern_id {
                self.report
                    .pattern_ids
                    .insert(id.to_string(), pattern_id.clone());
                self.adopt(pattern_id.clone());
            }
            info!(atom = id, attempt = number, score, tier = %tier, "Atom accepted");
            AtomEvent::Accept { score, learn }
        } else {
            debug!(
                atom = id,
                attempt = number,
                outcome = ?result.record.outcome,
                violations = result.record.violations.len(),
                "Attempt rejected"
            );
            AtomEvent::Reject {
                attempt: number,
                max_attempts: self.orchestrator.config.execution.max_attempts,
            }
        };

        let actions = self.apply(id, event).await?;
        self.perform(id, actions).await
    }

    /// Apply a transition to an atom and announce it
    async fn apply(&mut self, id: &str, event: AtomEvent) -> Result<Vec<AtomAction>> {
        let atom = self
            .atoms
            .get_mut(id)
            .ok_or_else(|| MosaicError::Scheduling(format!("unknown atom {}", id)))?;
        let from = atom.status;
        let (to, actions) = transition(from, event)?;
        atom.status = to;

        debug!(atom = id, %from, %to, "Transition");
        emit(
            &self.orchestrator.sink,
            ProgressKind::AtomTransition,
            json!({"plan_id": self.plan_id, "atom": id, "from": from, "to": to}),
        )
        .await;
        Ok(actions)
    }

    async fn perform(&mut self, id: &str, actions: Vec<AtomAction>) -> Result<()> {
        for action in actions {
            match action {
                // Worker stages are already running when these arrive
                AtomAction::StartInference { .. } | AtomAction::StartValidation => {}
                AtomAction::Persist => self.persist(id).await,
                AtomAction::LearnPattern { score } => self.learn(id, score),
                AtomAction::ScheduleRetry { attempt } => {
                    if self.is_cancelled() {
                        debug!(atom = id, attempt, "Retry dropped after cancellation");
                    } else {
                        self.spawn_attempt(id, attempt)?;
                    }
                }
                AtomAction::RecordBlockedBy { blocked_by } => {
                    self.report
                        .blocked_by
                        .entry(id.to_string())
                        .or_default()
                        .extend(blocked_by);
                }
                AtomAction::BlockDependents => self.block_dependents(id).await?,
            }
        }
        Ok(())
    }

    async fn persist(&self, id: &str) {
        if let Some(atom) = self.atoms.get(id) {
            fail_open("task_store_save", || {
                self.orchestrator.store.save_task(&self.plan_id, atom)
            })
            .await;
        }
    }

    /// Block one pending atom
    async fn block(&mut self, id: &str, blocked_by: Vec<String>) -> Result<()> {
        info!(atom = id, blocked_by = ?blocked_by, "Atom blocked");
        let actions = self.apply(id, AtomEvent::Block { blocked_by }).await?;
        self.perform(id, actions).await
    }

    /// Block every pending atom downstream of a failed or blocked one
    async fn block_dependents(&mut self, root: &str) -> Result<()> {
        let mut queue = VecDeque::from([root.to_string()]);
        while let Some(id) = queue.pop_front() {
            for dependent in self.graph.dependents(&id) {
                let blockers: BTreeSet<String> = self.graph.dependencies(&dependent)
                    .into_iter()
                    .filter(|dep| {
                        matches!(
                            self.atoms.get(dep).map(|a| a.status),
                            Some(AtomStatus::Failed | AtomStatus::Blocked)
                        )
                    })
                    .collect();

                match self.status(&dependent)? {
                    AtomStatus::Pending => {
                        info!(atom = %dependent, blocked_by = ?blockers, "Atom blocked");
                        let actions = self
                            .apply(
                                &dependent,
                                AtomEvent::Block {
                                    blocked_by: blockers.into_iter().collect(),
                                },
                            )
                            .await?;
                        for action in actions {
                            match action {
                                AtomAction::RecordBlockedBy { blocked_by } => {
                                    self.report
                                        .blocked_by
                                        .entry(dependent.clone())
                                        .or_default()
                                        .extend(blocked_by);
                                }
                                AtomAction::Persist => self.persist(&dependent).await,
                                AtomAction::BlockDependents => queue.push_back(dependent.clone()),
                                other => {
                                    return Err(MosaicError::Scheduling(format!(
                                        "unexpected action {:?} while blocking {}",
                                        other, dependent
                                    )))
                                }
                            }
                        }
                    }
                    AtomStatus::Blocked => {
                        self.report
                            .blocked_by
                            .entry(dependent.clone())
                            .or_default()
                            .extend(blockers);
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// Submit accepted code to the pattern cache without waiting on it
    fn learn(&mut self, id: &str, score: f64) {
        let Some(atom) = self.atoms.get(id) else {
            return;
        };
        let Some(code) = atom.code.clone() else {
            return;
        };
        let signature = atom.signature.clone();
        let patterns = self.orchestrator.patterns.clone();
        let sink = self.orchestrator.sink.clone();
        let atom_id = id.to_string();
        let plan_id = self.plan_id.clone();

        self.background.push(tokio::spawn(async move {
            let stored = fail_open("pattern_store", || {
                patterns.store(&signature, &code, score / 100.0)
            })
            .await
            .flatten();
            if let Some(pattern_id) = &stored {
                debug!(atom = %atom_id, pattern = %pattern_id, "Pattern learned");
                emit(
                    &sink,
                    ProgressKind::PatternLearned,
                    json!({
                        "plan_id": plan_id,
                        "atom": atom_id,
                        "pattern_id": pattern_id,
                        "score": score,
                    }),
                )
                .await;
            }
            stored
        }));
    }

    fn adopt(&mut self, pattern_id: String) {
        let patterns = self.orchestrator.patterns.clone();
        self.background.push(tokio::spawn(async move {
            fail_open("pattern_adoption", || patterns.record_adoption(&pattern_id)).await;
            None
        }));
    }
}
