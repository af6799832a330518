//! Engine Orchestrator (C11): the per-user serial lock, circuit breaker,
//! timeout and intelligent-fallback ladder that ties C1-C10 and C12 into a
//! single `process_event` entrypoint. Not present as a standalone module in
//! the teacher's tree (the teacher's orchestration lives behind axum routes
//! and a `DatabaseProxy`); built fresh around the already-ported
//! perception/modeling/decision components, in the same
//! guard-then-pipeline shape as the teacher's `services/` layer.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{TimeZone, Timelike, Utc};
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::warn;

use crate::config::{AmasConfig, CircuitBreakerConfig};
use crate::decision::actr::ActrModel;
use crate::decision::coldstart::{ColdStartManager, ColdStartSignals};
use crate::decision::ensemble::{EnsembleDecision, EnsembleVotes, MemberVote};
use crate::decision::heuristic::HeuristicLearner;
use crate::decision::linucb::{BanditContext, LinUcbModel, CONTEXT_LABELS};
use crate::decision::mapper::DecisionMapper;
use crate::decision::thompson::ThompsonSamplingModel;
use crate::error::AmasError;
use crate::feature::FeatureBuilder;
use crate::metrics::AlgorithmId;
use crate::modeling::attention::AttentionMonitor;
use crate::modeling::cognitive::CognitiveProfiler;
use crate::modeling::fatigue::FatigueEstimator;
use crate::modeling::motivation::MotivationTracker;
use crate::modeling::trend::TrendAnalyzer;
use crate::persistence::{
    validate_feature_vector, InMemoryModelRepository, InMemoryStateRepository, ModelRepository,
    StateRepository,
};
use crate::reward::DelayedRewardQueue;
use crate::track_algorithm;
use crate::types::{
    action_space, Action, BanditModel, DecisionExplanation, DecisionFactor, DifficultyLevel,
    FeatureVector, ProcessOptions, ProcessResult, RawEvent, Reward, StrategyParams, UserState,
};

const DEFAULT_LINUCB_LAMBDA: f64 = 0.001;

/// CLOSED/OPEN/HALF_OPEN breaker gating `process_event` across all users.
/// Opens once at least `ceil(failure_threshold * window_size)` of the most
/// recent (bounded-to-`window_size`) outcomes are failures; a single failure
/// while half-open reopens it immediately, and `half_open_probes` consecutive
/// successes close it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: BreakerState,
    samples: VecDeque<bool>,
    opened_at: Option<Instant>,
    half_open_remaining: usize,
}

impl CircuitBreaker {
    fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: BreakerState::Closed,
            samples: VecDeque::new(),
            opened_at: None,
            half_open_remaining: 0,
        }
    }

    fn allow(&mut self) -> bool {
        match self.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let elapsed = self.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= Duration::from_millis(self.config.open_duration_ms.max(0) as u64) {
                    self.state = BreakerState::HalfOpen;
                    self.half_open_remaining = self.config.half_open_probes.max(1);
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => self.half_open_remaining > 0,
        }
    }

    fn record_success(&mut self) {
        match self.state {
            BreakerState::HalfOpen => {
                self.half_open_remaining = self.half_open_remaining.saturating_sub(1);
                if self.half_open_remaining == 0 {
                    self.close();
                }
            }
            BreakerState::Closed => self.push_sample(true),
            BreakerState::Open => {}
        }
    }

    fn record_failure(&mut self) {
        match self.state {
            BreakerState::HalfOpen => self.open(),
            BreakerState::Closed => {
                self.push_sample(false);
                self.maybe_open();
            }
            BreakerState::Open => {}
        }
    }

    fn push_sample(&mut self, success: bool) {
        self.samples.push_back(success);
        if self.samples.len() > self.config.window_size.max(1) {
            self.samples.pop_front();
        }
    }

    fn maybe_open(&mut self) {
        let min_samples =
            ((self.config.failure_threshold * self.config.window_size as f64).ceil() as usize).max(1);
        if self.samples.len() < min_samples {
            return;
        }
        let failures = self.samples.iter().filter(|s| !**s).count();
        let rate = failures as f64 / self.samples.len() as f64;
        if rate >= self.config.failure_threshold {
            self.open();
        }
    }

    fn open(&mut self) {
        self.state = BreakerState::Open;
        self.opened_at = Some(Instant::now());
        self.samples.clear();
    }

    fn close(&mut self) {
        self.state = BreakerState::Closed;
        self.opened_at = None;
        self.samples.clear();
    }

    fn is_open(&self) -> bool {
        matches!(self.state, BreakerState::Open)
    }
}

/// One user's full bundle of stateful learners (C2-C9), plus the
/// bookkeeping the orchestrator needs across ticks: the strategy currently
/// in effect and a decayed confidence estimate fed into `UserState::conf`.
struct UserModels {
    attention: AttentionMonitor,
    fatigue: FatigueEstimator,
    cognitive: CognitiveProfiler,
    motivation: MotivationTracker,
    trend: TrendAnalyzer,
    cold_start: ColdStartManager,
    linucb: LinUcbModel,
    thompson: ThompsonSamplingModel,
    actr: ActrModel,
    heuristic: HeuristicLearner,
    ensemble: EnsembleDecision,
    current_strategy: StrategyParams,
    last_confidence: f64,
}

impl UserModels {
    fn new(config: &AmasConfig) -> Self {
        Self {
            attention: AttentionMonitor::new(config.attention_weights.clone(), config.attention_smoothing),
            fatigue: FatigueEstimator::new(config.fatigue.clone()),
            cognitive: CognitiveProfiler::new(config.cognitive.clone()),
            motivation: MotivationTracker::new(config.motivation.clone()),
            trend: TrendAnalyzer::new(config.trend.clone()),
            cold_start: ColdStartManager::new(config.cold_start.clone()),
            linucb: LinUcbModel::new(config.bandit.context_dim, DEFAULT_LINUCB_LAMBDA),
            thompson: ThompsonSamplingModel::default(),
            actr: ActrModel::new(config.actr.clone()),
            heuristic: HeuristicLearner::default(),
            ensemble: EnsembleDecision::new(config.ensemble.clone()),
            current_strategy: StrategyParams::default(),
            last_confidence: config.min_confidence,
        }
    }

    /// Rebuilds a user's bundle from whatever C12 has on file. Only the
    /// bandit posteriors and ensemble weights persist across restarts (the
    /// `StateRepository`/`ModelRepository` contract carries `UserState` and
    /// `BanditModel`, nothing richer); the moment-to-moment EMA trackers and
    /// the cold-start FSM restart fresh, same as any other in-process cache
    /// that outlives a single event but not a process restart.
    fn hydrate(config: &AmasConfig, state: Option<&UserState>, model: Option<&BanditModel>) -> Self {
        let mut models = Self::new(config);

        if let Some(state) = state {
            models.fatigue.set_value(state.fatigue);
            models.motivation.set_value(state.motivation);
            models.cognitive.set_profile(state.cognitive.clone());
            models.last_confidence = state.conf;
        }

        if let Some(model) = model {
            if let Some(linucb_json) = model.linucb_state.clone() {
                match serde_json::from_value::<LinUcbModel>(linucb_json) {
                    Ok(mut restored) => {
                        restored.migrate_dimensions(config.bandit.context_dim);
                        models.linucb = restored;
                    }
                    Err(err) => warn!(error = %err, "failed to restore linucb state, starting from prior"),
                }
            }
            if let Some(thompson_json) = model.thompson_state.clone() {
                match serde_json::from_value::<ThompsonSamplingModel>(thompson_json) {
                    Ok(restored) => models.thompson = restored,
                    Err(err) => warn!(error = %err, "failed to restore thompson state, starting from prior"),
                }
            }
            if let Some(weights) = model.ensemble_weights.clone() {
                models.ensemble = EnsembleDecision::from_state(config.ensemble.clone(), weights);
            }
        }

        models
    }
}

/// Orchestrates the full perception -> modeling -> learning -> decision
/// pipeline for one or many users, serializing per-user access and guarding
/// every tick with a circuit breaker and a processing timeout.
pub struct AmasEngine {
    config: AmasConfig,
    state_repo: Arc<dyn StateRepository>,
    model_repo: Arc<dyn ModelRepository>,
    feature_builder: Mutex<FeatureBuilder>,
    reward_queue: Mutex<DelayedRewardQueue>,
    user_models: Mutex<HashMap<String, UserModels>>,
    user_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    breaker: Mutex<CircuitBreaker>,
}

impl AmasEngine {
    pub fn new(
        config: AmasConfig,
        state_repo: Arc<dyn StateRepository>,
        model_repo: Arc<dyn ModelRepository>,
    ) -> Self {
        let breaker = CircuitBreaker::new(config.circuit_breaker.clone());
        let reward_queue = DelayedRewardQueue::new(config.reward.clone());
        Self {
            config,
            state_repo,
            model_repo,
            feature_builder: Mutex::new(FeatureBuilder::new()),
            reward_queue: Mutex::new(reward_queue),
            user_models: Mutex::new(HashMap::new()),
            user_locks: Mutex::new(HashMap::new()),
            breaker: Mutex::new(breaker),
        }
    }

    /// Convenience constructor for tests and single-process deployments:
    /// both repositories live purely in memory for the life of the engine.
    pub fn with_memory_repositories(config: AmasConfig) -> Self {
        Self::new(
            config,
            Arc::new(InMemoryStateRepository::new()),
            Arc::new(InMemoryModelRepository::new()),
        )
    }

    pub fn is_circuit_open(&self) -> bool {
        self.breaker.lock().is_open()
    }

    fn user_lock(&self, user_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.user_locks.lock();
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// The public entrypoint: serializes per-user access, gates on the
    /// circuit breaker, runs the full pipeline under a timeout, and always
    /// returns a `ProcessResult` — failures degrade to
    /// `intelligent_fallback` rather than propagating an error to callers.
    pub async fn process_event(
        &self,
        user_id: &str,
        event: RawEvent,
        options: ProcessOptions,
    ) -> ProcessResult {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        if !self.breaker.lock().allow() {
            warn!(user_id, "circuit breaker open, serving fallback strategy");
            return self.intelligent_fallback(user_id, &options, AmasError::CircuitOpen).await;
        }

        let timeout_dur = Duration::from_millis(self.config.processing_timeout_ms.max(1));
        let attempt = self.process_inner(user_id, event.clone(), options.clone());

        match tokio::time::timeout(timeout_dur, attempt).await {
            Ok(Ok(result)) => {
                self.breaker.lock().record_success();
                result
            }
            Ok(Err(err)) => {
                self.breaker.lock().record_failure();
                warn!(user_id, error = %err, "process_event failed, falling back");
                self.intelligent_fallback(user_id, &options, err).await
            }
            Err(_) => {
                self.breaker.lock().record_failure();
                warn!(user_id, "process_event timed out, falling back");
                self.intelligent_fallback(user_id, &options, AmasError::Timeout).await
            }
        }
    }

    /// Reject-tier: a non-positive or non-finite response time can't be
    /// windowed or divided by at all, so it short-circuits straight to the
    /// degraded fallback. Everything else in `AnomalyConfig` is a cap on an
    /// otherwise-valid event; exceeding it is unusual but processable, so it
    /// is only flagged, never rejected.
    fn check_anomaly(&self, event: &RawEvent) -> Result<(), AmasError> {
        if event.response_time_ms <= 0 || !(event.response_time_ms as f64).is_finite() {
            return Err(AmasError::Anomaly {
                field: "response_time_ms",
                value: event.response_time_ms as f64,
            });
        }
        Ok(())
    }

    fn flag_soft_anomalies(&self, event: &RawEvent) -> Vec<String> {
        let cfg = &self.config.anomaly;
        let mut flags = Vec::new();
        if event.response_time_ms > cfg.max_response_time_ms {
            flags.push(format!("response_time_ms {} exceeds cap {}", event.response_time_ms, cfg.max_response_time_ms));
        }
        if event.pause_count > cfg.max_pause_count {
            flags.push(format!("pause_count {} exceeds cap {}", event.pause_count, cfg.max_pause_count));
        }
        if event.switch_count > cfg.max_switch_count {
            flags.push(format!("switch_count {} exceeds cap {}", event.switch_count, cfg.max_switch_count));
        }
        if let Some(focus_loss) = event.focus_loss_duration_ms {
            if focus_loss > cfg.max_focus_loss_ms {
                flags.push(format!("focus_loss_duration_ms {focus_loss} exceeds cap {}", cfg.max_focus_loss_ms));
            }
        }
        flags
    }

    async fn process_inner(
        &self,
        user_id: &str,
        event: RawEvent,
        options: ProcessOptions,
    ) -> Result<ProcessResult, AmasError> {
        self.check_anomaly(&event)?;

        if !self.user_models.lock().contains_key(user_id) {
            let loaded_state = self.state_repo.load(user_id).await?;
            let loaded_model = self.model_repo.load(user_id).await?;
            let models = UserModels::hydrate(&self.config, loaded_state.as_ref(), loaded_model.as_ref());
            self.user_models.lock().insert(user_id.to_string(), models);
        }

        let mut models = self
            .user_models
            .lock()
            .remove(user_id)
            .ok_or_else(|| AmasError::Internal("user model vanished after hydration".to_string()))?;

        let outcome = self.run_pipeline(user_id, &mut models, &event, &options).await;

        self.user_models.lock().insert(user_id.to_string(), models);

        outcome
    }

    /// The perception -> modeling -> learning -> decision pipeline proper,
    /// run once the per-user lock is held and the circuit breaker/timeout
    /// have already cleared this tick.
    async fn run_pipeline(
        &self,
        user_id: &str,
        models: &mut UserModels,
        event: &RawEvent,
        options: &ProcessOptions,
    ) -> Result<ProcessResult, AmasError> {
        let flags = self.config.feature_flags.clone();
        let anomaly_flags = self.flag_soft_anomalies(event);
        if !anomaly_flags.is_empty() {
            warn!(user_id, flags = ?anomaly_flags, "soft anomaly caps exceeded, continuing");
        }

        let derived = {
            let mut builder = self.feature_builder.lock();
            track_algorithm!(AlgorithmId::FeatureBuilder, builder.observe(user_id, event.clone()))
        };

        if let Some(current) = options.current_params.clone() {
            models.current_strategy = current;
        }

        let attention = track_algorithm!(
            AlgorithmId::Attention,
            models.attention.update(derived.attention.clone())
        );
        let fatigue =
            track_algorithm!(AlgorithmId::Fatigue, models.fatigue.update(derived.fatigue.clone()));
        let cognitive = track_algorithm!(
            AlgorithmId::Cognitive,
            models.cognitive.update(derived.cognitive.clone())
        );
        let motivation = track_algorithm!(
            AlgorithmId::Motivation,
            models.motivation.update(derived.motivation.clone())
        );
        let trend = if flags.trend_enabled {
            Some(track_algorithm!(
                AlgorithmId::Trend,
                models.trend.update(cognitive.mem, event.timestamp)
            ))
        } else {
            None
        };

        let state = UserState {
            attention,
            fatigue,
            cognitive: cognitive.clone(),
            motivation,
            trend,
            conf: models.last_confidence,
            ts: event.timestamp,
        };

        let candidates = action_space();
        let ctx = BanditContext {
            recent_error_rate: 1.0 - derived.accuracy,
            recent_rt_ms: derived.response_time_ms as f64,
            hour_of_day: hour_of_day(event.timestamp),
        };

        let (action, explanation, selection_confidence, votes_for_update) = if flags.cold_start_enabled
            && !models.cold_start.is_completed()
        {
            let signals = ColdStartSignals {
                attention: state.attention,
                motivation: state.motivation,
                cognitive_mem: state.cognitive.mem,
                rt_variance: derived.attention.rt_cv,
                has_signals: true,
            };
            let picked = if options.skip_update {
                models
                    .cold_start
                    .settled_strategy()
                    .cloned()
                    .unwrap_or_else(|| models.current_strategy.clone())
            } else {
                track_algorithm!(
                    AlgorithmId::ColdStartManager,
                    models
                        .cold_start
                        .update_with_signals(derived.accuracy, derived.response_time_ms, &signals)
                )
                .unwrap_or_else(|| models.current_strategy.clone())
            };
            let confidence = models
                .cold_start
                .state()
                .continuous_profile
                .as_ref()
                .map(|p| p.min_confidence())
                .unwrap_or(0.5);
            let phase = models.cold_start.phase();
            let explanation = DecisionExplanation {
                factors: Vec::new(),
                changes: vec![format!("cold-start phase {phase:?} selected the action")],
                text: format!("cold-start manager in phase {phase:?} chose the next action"),
            };
            (picked, explanation, confidence, None)
        } else {
            let mut votes = EnsembleVotes::default();

            if flags.linucb_enabled {
                models.linucb.alpha =
                    LinUcbModel::cold_start_alpha(models.linucb.update_count, derived.accuracy, state.fatigue);
                if let Some((a, score, exploration)) = track_algorithm!(
                    AlgorithmId::LinUcb,
                    models.linucb.select_action(&state, &ctx, &candidates)
                ) {
                    let confidence = (1.0 / (1.0 + exploration)).clamp(0.0, 1.0);
                    votes.linucb = Some(MemberVote { action: a, raw_score: score, confidence });
                }
            }
            if flags.thompson_enabled {
                if let Some((a, score)) =
                    track_algorithm!(AlgorithmId::Thompson, models.thompson.select_action(&state, &candidates))
                {
                    let confidence = models.thompson.get_confidence(&state, &a);
                    votes.thompson = Some(MemberVote { action: a, raw_score: score, confidence });
                }
            }
            if flags.actr_enabled {
                models.actr.record_review(0.0, event.is_correct);
                if let Some((a, score, confidence)) =
                    track_algorithm!(AlgorithmId::Actr, models.actr.select_action(&state, &candidates))
                {
                    votes.actr = Some(MemberVote { action: a, raw_score: score, confidence });
                }
            }
            if flags.heuristic_enabled {
                if let Some((a, score, confidence)) = track_algorithm!(
                    AlgorithmId::Heuristic,
                    models.heuristic.select_action(&state, &models.current_strategy, &candidates)
                ) {
                    votes.heuristic = Some(MemberVote { action: a, raw_score: score, confidence });
                }
            }

            if flags.ensemble_enabled {
                if let Some((picked, confidence, explanation)) =
                    track_algorithm!(AlgorithmId::Ensemble, models.ensemble.decide(&votes))
                {
                    (picked, explanation, confidence, Some(votes))
                } else {
                    let (picked, confidence, explanation) = best_without_ensemble(&votes, &models.current_strategy);
                    (picked, explanation, confidence, None)
                }
            } else {
                let (picked, confidence, explanation) = best_without_ensemble(&votes, &models.current_strategy);
                (picked, explanation, confidence, None)
            }
        };

        let mapper = DecisionMapper::new(self.config.mapper_tau);
        let next_strategy = mapper.map(&models.current_strategy, &action, &state);
        let should_suggest = DecisionMapper::should_suggest_break(&state);
        let should_force = DecisionMapper::should_force_break(&state);
        let suggestion = if should_force {
            Some("take a break: fatigue is critically high".to_string())
        } else if should_suggest {
            Some("consider a short break soon".to_string())
        } else {
            None
        };

        let action_for_context: Action = action.clone().into();
        let feature_vector = {
            let values = LinUcbModel::build_context(&state, &ctx, &action_for_context).to_vec();
            let fv = FeatureVector::new(values, CONTEXT_LABELS.iter().map(|s| s.to_string()).collect());
            match validate_feature_vector(&fv, crate::decision::linucb::CONTEXT_DIM) {
                Ok(()) => Some(fv),
                Err(err) => {
                    warn!(user_id, error = %err, "built feature vector failed validation, omitting");
                    None
                }
            }
        };

        let reward_value = self.compute_and_schedule_reward(user_id, event, &state, options);

        if !options.skip_update {
            let action_typed: Action = action.clone().into();
            if flags.linucb_enabled {
                models.linucb.update(&state, &ctx, &action_typed, reward_value);
            }
            if flags.thompson_enabled {
                models.thompson.update(&state, &action, reward_value);
            }
            if flags.actr_enabled {
                models.actr.update();
            }
            if flags.ensemble_enabled {
                if let Some(votes) = &votes_for_update {
                    models.ensemble.update_weights(votes, &action, reward_value);
                }
            }
        }

        models.current_strategy = next_strategy.clone();
        models.last_confidence = (self.config.confidence_decay * models.last_confidence
            + (1.0 - self.config.confidence_decay) * selection_confidence)
            .clamp(self.config.min_confidence, 1.0);

        let mut persisted_state = state.clone();
        persisted_state.conf = models.last_confidence;

        if !options.skip_update {
            self.persist(user_id, &persisted_state, models).await?;
        }

        let cold_start_phase = models.cold_start.phase();

        Ok(ProcessResult {
            state: persisted_state,
            strategy: next_strategy,
            action: action.into(),
            reward: Reward::new(reward_value, "accuracy + speed - fatigue - frustration composite"),
            explanation,
            feature_vector,
            cold_start_phase: Some(cold_start_phase),
            suggestion,
            should_break: should_force,
            degraded: false,
            anomaly_flags,
        })
    }

    /// `w_c*correctness + w_s*speed - w_f*fatigue - w_fr*frustration`,
    /// scheduled through the delayed-reward queue (C10) unless the caller
    /// opted out of learning for this tick.
    fn compute_and_schedule_reward(
        &self,
        user_id: &str,
        event: &RawEvent,
        state: &UserState,
        options: &ProcessOptions,
    ) -> f64 {
        let cfg = &self.config.reward;
        let correctness = if event.is_correct { 1.0 } else { -1.0 };
        let speed_signal = ((cfg.reference_rt_ms - event.response_time_ms as f64) / cfg.reference_rt_ms.max(1.0))
            .clamp(-1.0, 1.0);
        let frustration = ((event.retry_count as f64 / 3.0)
            + (event.switch_count as f64 / 10.0)
            + (event.pause_count as f64 / 20.0))
            .min(1.0);

        let base_reward = (cfg.accuracy_weight * correctness + cfg.speed_weight * speed_signal
            - cfg.fatigue_weight * state.fatigue
            - cfg.frustration_weight * frustration)
            .clamp(-1.0, 1.0);

        if options.skip_update || !self.config.feature_flags.delayed_reward_enabled {
            return base_reward;
        }

        let mut queue = self.reward_queue.lock();
        let event_id = format!("{user_id}:{}", event.timestamp);
        queue.enqueue(user_id.to_string(), event_id, base_reward, event.timestamp);
        queue.aggregate(event.timestamp, Some(user_id)).total_increment
    }

    async fn persist(&self, user_id: &str, state: &UserState, models: &UserModels) -> Result<(), AmasError> {
        let linucb_value =
            serde_json::to_value(&models.linucb).map_err(|e| AmasError::PersistenceFailure(e.to_string()))?;
        let thompson_value =
            serde_json::to_value(&models.thompson).map_err(|e| AmasError::PersistenceFailure(e.to_string()))?;
        let bandit_model = BanditModel {
            linucb_state: Some(linucb_value),
            thompson_state: Some(thompson_value),
            ensemble_weights: Some(models.ensemble.weights().clone()),
        };
        self.model_repo.save(user_id, &bandit_model).await?;
        self.state_repo.save(user_id, state).await?;
        Ok(())
    }

    /// The fallback ladder: recent-enough cold-start users get the safe
    /// default, a high recent error rate forces an easy/low-new-ratio/
    /// high-hint strategy, off-hours nudges toward a lighter session, and
    /// otherwise the caller's last-known strategy is kept as-is.
    async fn intelligent_fallback(
        &self,
        user_id: &str,
        options: &ProcessOptions,
        cause: AmasError,
    ) -> ProcessResult {
        warn!(user_id, error = %cause, "invoking intelligent fallback");

        let state = self.state_repo.load(user_id).await.ok().flatten().unwrap_or_default();
        let interaction_count = options.interaction_count.unwrap_or(0);
        let recent_accuracy = options.recent_accuracy.unwrap_or(0.7);
        let baseline = options.current_params.clone().unwrap_or_default();

        let strategy = if interaction_count < 20 {
            StrategyParams::default()
        } else if recent_accuracy < 0.5 {
            StrategyParams {
                difficulty: DifficultyLevel::Easy,
                new_ratio: 0.1,
                hint_level: 2,
                ..baseline.clone()
            }
        } else {
            let hour = Utc::now().hour();
            if (22..=23).contains(&hour) || (0..=5).contains(&hour) {
                StrategyParams {
                    batch_size: baseline.batch_size.min(6),
                    interval_scale: baseline.interval_scale.max(1.0),
                    ..baseline.clone()
                }
            } else {
                baseline.clone()
            }
        };

        ProcessResult {
            state,
            action: strategy.clone().into(),
            strategy,
            reward: Reward::new(0.0, "fallback: no reward computed"),
            explanation: DecisionExplanation {
                factors: Vec::new(),
                changes: vec![format!("intelligent fallback engaged: {cause}")],
                text: format!("fell back to rules-based defaults after {cause}"),
            },
            feature_vector: None,
            cold_start_phase: None,
            suggestion: None,
            should_break: false,
            degraded: true,
            anomaly_flags: Vec::new(),
        }
    }
}

fn hour_of_day(ts_ms: i64) -> u32 {
    Utc.timestamp_millis_opt(ts_ms).single().map(|dt| dt.hour()).unwrap_or(12)
}

/// Used when the ensemble is disabled or produced no winner: takes whichever
/// single learner voted, in a fixed priority order, or falls back to the
/// strategy already in effect.
fn best_without_ensemble(
    votes: &EnsembleVotes,
    fallback: &StrategyParams,
) -> (StrategyParams, f64, DecisionExplanation) {
    for (name, vote) in [
        ("linucb", &votes.linucb),
        ("thompson", &votes.thompson),
        ("actr", &votes.actr),
        ("heuristic", &votes.heuristic),
    ] {
        if let Some(v) = vote {
            let explanation = DecisionExplanation {
                factors: vec![DecisionFactor {
                    name: name.to_string(),
                    value: v.raw_score,
                    impact: "positive".to_string(),
                    percentage: 100.0,
                }],
                changes: vec![format!("{name} was the only active learner")],
                text: format!("{name} selected the action unilaterally"),
            };
            return (v.action.clone(), v.confidence, explanation);
        }
    }
    (
        fallback.clone(),
        0.3,
        DecisionExplanation {
            factors: Vec::new(),
            changes: vec!["no learner produced a vote".to_string()],
            text: "no active learners, kept the current strategy".to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColdStartPhase;

    fn engine() -> AmasEngine {
        AmasEngine::with_memory_repositories(AmasConfig::default())
    }

    fn sample_event(correct: bool, rt: i64) -> RawEvent {
        RawEvent { is_correct: correct, response_time_ms: rt, timestamp: 0, ..RawEvent::default() }
    }

    #[tokio::test]
    async fn process_event_returns_a_sane_result() {
        let engine = engine();
        let result = engine.process_event("u1", sample_event(true, 1500), ProcessOptions::default()).await;
        assert!(!result.degraded);
        assert!((0.0..=1.0).contains(&result.state.attention));
        assert!(result.strategy.batch_size >= 3);
    }

    #[tokio::test]
    async fn reject_tier_anomaly_triggers_degraded_fallback() {
        let engine = engine();
        let bad = RawEvent { response_time_ms: 0, timestamp: 0, ..RawEvent::default() };
        let result = engine.process_event("u2", bad, ProcessOptions::default()).await;
        assert!(result.degraded);
    }

    #[tokio::test]
    async fn soft_anomaly_cap_is_flagged_but_not_rejected() {
        let engine = engine();
        let unusual = RawEvent { response_time_ms: 999_999, timestamp: 0, ..RawEvent::default() };
        let result = engine.process_event("u2b", unusual, ProcessOptions::default()).await;
        assert!(!result.degraded);
        assert!(!result.anomaly_flags.is_empty());
    }

    #[tokio::test]
    async fn repeated_rejects_open_the_circuit_breaker() {
        let engine = engine();
        assert!(!engine.is_circuit_open());
        for i in 0..12 {
            let bad = RawEvent { response_time_ms: 0, timestamp: i, ..RawEvent::default() };
            engine.process_event("u3", bad, ProcessOptions::default()).await;
        }
        assert!(engine.is_circuit_open());
    }

    #[tokio::test]
    async fn new_user_starts_in_classify_cold_start_phase() {
        let engine = engine();
        let result = engine.process_event("u4", sample_event(true, 1200), ProcessOptions::default()).await;
        assert_eq!(result.cold_start_phase, Some(ColdStartPhase::Classify));
    }

    #[tokio::test]
    async fn skip_update_does_not_error_and_stays_non_degraded() {
        let engine = engine();
        let options = ProcessOptions { skip_update: true, ..ProcessOptions::default() };
        let result = engine.process_event("u5", sample_event(true, 1500), options).await;
        assert!(!result.degraded);
    }

    #[tokio::test]
    async fn sequential_events_for_same_user_each_produce_a_feature_vector() {
        let engine = engine();
        let r1 = engine.process_event("u6", sample_event(true, 1000), ProcessOptions::default()).await;
        let r2 = engine.process_event("u6", sample_event(false, 4000), ProcessOptions::default()).await;
        assert!(r1.feature_vector.is_some());
        assert!(r2.feature_vector.is_some());
    }

    #[tokio::test]
    async fn different_users_get_independent_cold_start_state() {
        let engine = engine();
        for i in 0..3 {
            engine.process_event("alice", sample_event(true, 1200), ProcessOptions::default()).await;
            let _ = i;
        }
        let bob = engine.process_event("bob", sample_event(true, 1200), ProcessOptions::default()).await;
        assert_eq!(bob.cold_start_phase, Some(ColdStartPhase::Classify));
    }
}
