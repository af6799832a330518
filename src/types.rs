#![allow(dead_code)]

use serde::{Deserialize, Serialize};

/// A single learner interaction as reported by the calling application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    pub word_id: String,
    pub is_correct: bool,
    pub response_time_ms: i64,
    pub dwell_time_ms: i64,
    pub retry_count: i32,
    pub pause_count: i32,
    pub switch_count: i32,
    pub focus_loss_duration_ms: Option<i64>,
    pub interaction_density: Option<f64>,
    pub timestamp: i64,
}

impl Default for RawEvent {
    fn default() -> Self {
        Self {
            word_id: String::new(),
            is_correct: true,
            response_time_ms: 3000,
            dwell_time_ms: 3000,
            retry_count: 0,
            pause_count: 0,
            switch_count: 0,
            focus_loss_duration_ms: None,
            interaction_density: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Version tag for the wire-format `FeatureVector` (the bandit's 22-D
/// context). Bumped whenever the context layout `LinUcbModel::build_context`
/// produces changes shape.
pub const FEATURE_VECTOR_VERSION: i32 = 1;
pub const FEATURE_VECTOR_NORM_METHOD: &str = "ucb-context";

/// The engineered context vector C1/C3 hand to callers and C12 persists:
/// the exact values the bandit scored its chosen action on, tagged with a
/// version and normalization method so a reader/writer mismatch is
/// detectable rather than silently misinterpreted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureVector {
    pub values: Vec<f64>,
    pub version: i32,
    pub norm_method: String,
    pub labels: Vec<String>,
    pub ts: i64,
}

impl FeatureVector {
    pub fn new(values: Vec<f64>, labels: Vec<String>) -> Self {
        Self {
            values,
            version: FEATURE_VECTOR_VERSION,
            norm_method: FEATURE_VECTOR_NORM_METHOD.to_string(),
            labels,
            ts: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyLevel {
    Easy,
    #[default]
    Mid,
    Hard,
}

impl DifficultyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Mid => "mid",
            Self::Hard => "hard",
        }
    }

    pub fn harder(&self) -> Self {
        match self {
            Self::Easy => Self::Mid,
            _ => Self::Hard,
        }
    }

    pub fn easier(&self) -> Self {
        match self {
            Self::Hard => Self::Mid,
            _ => Self::Easy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrendState {
    Up,
    #[default]
    Flat,
    Stuck,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Fast,
    #[default]
    Stable,
    Cautious,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColdStartPhase {
    #[default]
    Classify,
    Explore,
    Normal,
}

/// C2's three-way cognitive readout (long-run memory strength, processing
/// speed, response-time/accuracy stability).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CognitiveProfile {
    pub mem: f64,
    pub speed: f64,
    pub stability: f64,
}

impl Default for CognitiveProfile {
    fn default() -> Self {
        Self {
            mem: 0.5,
            speed: 0.5,
            stability: 0.5,
        }
    }
}

/// The latent per-user state C2 maintains and C11 assembles each event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserState {
    #[serde(rename = "A")]
    pub attention: f64,
    #[serde(rename = "F")]
    pub fatigue: f64,
    #[serde(rename = "C")]
    pub cognitive: CognitiveProfile,
    #[serde(rename = "M")]
    pub motivation: f64,
    #[serde(rename = "T")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend: Option<TrendState>,
    pub conf: f64,
    pub ts: i64,
}

impl Default for UserState {
    fn default() -> Self {
        Self {
            attention: 0.7,
            fatigue: 0.1,
            cognitive: CognitiveProfile::default(),
            motivation: 0.0,
            trend: None,
            conf: 0.5,
            ts: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuousUserProfile {
    pub speed: f64,
    pub stability: f64,
    pub risk_tolerance: f64,
    pub engagement: f64,
    pub confidence: [f64; 4],
}

impl Default for ContinuousUserProfile {
    fn default() -> Self {
        Self {
            speed: 0.5,
            stability: 0.5,
            risk_tolerance: 0.5,
            engagement: 0.5,
            confidence: [0.0; 4],
        }
    }
}

impl ContinuousUserProfile {
    pub fn from_user_type(user_type: UserType) -> Self {
        match user_type {
            UserType::Fast => Self {
                speed: 0.8,
                stability: 0.4,
                risk_tolerance: 0.7,
                engagement: 0.6,
                confidence: [0.3; 4],
            },
            UserType::Stable => Self {
                speed: 0.5,
                stability: 0.6,
                risk_tolerance: 0.5,
                engagement: 0.5,
                confidence: [0.3; 4],
            },
            UserType::Cautious => Self {
                speed: 0.3,
                stability: 0.7,
                risk_tolerance: 0.3,
                engagement: 0.4,
                confidence: [0.3; 4],
            },
        }
    }

    pub fn update(&mut self, accuracy: f64, response_time_ms: i64, attention: f64, motivation: f64) {
        let alpha = 0.1;
        let speed_signal = (1.0 - (response_time_ms as f64 / 10000.0).min(1.0)).clamp(0.0, 1.0);
        let stability_signal = accuracy.clamp(0.0, 1.0);
        let risk_signal = ((1.0 - accuracy * 0.3) * speed_signal).clamp(0.0, 1.0);
        let engagement_signal =
            ((attention.clamp(0.0, 1.0) + (motivation.clamp(-1.0, 1.0) + 1.0) / 2.0) / 2.0)
                .clamp(0.0, 1.0);

        self.speed = (self.speed * (1.0 - alpha) + speed_signal * alpha).clamp(0.0, 1.0);
        self.stability =
            (self.stability * (1.0 - alpha) + stability_signal * alpha).clamp(0.0, 1.0);
        self.risk_tolerance =
            (self.risk_tolerance * (1.0 - alpha) + risk_signal * alpha).clamp(0.0, 1.0);
        self.engagement =
            (self.engagement * (1.0 - alpha) + engagement_signal * alpha).clamp(0.0, 1.0);

        for c in &mut self.confidence {
            *c = (*c + 0.02).min(1.0);
        }
    }

    pub fn min_confidence(&self) -> f64 {
        self.confidence.iter().cloned().fold(f64::INFINITY, f64::min)
    }

    pub fn to_strategy(&self) -> StrategyParams {
        let interval_scale = 0.8 + 0.4 * self.stability;
        let new_ratio = (0.1 + 0.2 * self.speed * self.engagement).clamp(0.1, 0.4);
        let batch_size = (5.0 + 10.0 * self.engagement).round() as i32;
        let hint_level = if self.risk_tolerance > 0.7 {
            0
        } else if self.risk_tolerance > 0.4 {
            1
        } else {
            2
        };
        let difficulty = if self.risk_tolerance > 0.6 {
            DifficultyLevel::Hard
        } else if self.risk_tolerance > 0.35 {
            DifficultyLevel::Mid
        } else {
            DifficultyLevel::Easy
        };

        StrategyParams {
            interval_scale,
            new_ratio,
            difficulty,
            batch_size: batch_size.clamp(5, 16),
            hint_level,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColdStartState {
    pub phase: ColdStartPhase,
    pub user_type: Option<UserType>,
    pub probe_index: i32,
    pub update_count: i32,
    pub settled_strategy: Option<StrategyParams>,
    /// Running sums over the fixed probe sequence, used once at the
    /// Classify -> Explore boundary to pick a `UserType`. Not a live score;
    /// classification never revises mid-sequence.
    #[serde(default)]
    pub probe_accuracy_sum: f64,
    #[serde(default)]
    pub probe_rt_sum: f64,
    #[serde(default)]
    pub continuous_profile: Option<ContinuousUserProfile>,
}

impl Default for ColdStartState {
    fn default() -> Self {
        Self {
            phase: ColdStartPhase::Classify,
            user_type: None,
            probe_index: 0,
            update_count: 0,
            settled_strategy: None,
            probe_accuracy_sum: 0.0,
            probe_rt_sum: 0.0,
            continuous_profile: None,
        }
    }
}

/// The strategy surface the engine mutates: how the next item is chosen and
/// presented.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyParams {
    pub interval_scale: f64,
    pub new_ratio: f64,
    pub difficulty: DifficultyLevel,
    pub batch_size: i32,
    pub hint_level: i32,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            interval_scale: 1.0,
            new_ratio: 0.2,
            difficulty: DifficultyLevel::Mid,
            batch_size: 8,
            hint_level: 1,
        }
    }
}

impl StrategyParams {
    pub fn for_user_type(user_type: UserType) -> Self {
        match user_type {
            UserType::Fast => Self {
                interval_scale: 0.8,
                new_ratio: 0.3,
                difficulty: DifficultyLevel::Hard,
                batch_size: 12,
                hint_level: 0,
            },
            UserType::Stable => Self::default(),
            UserType::Cautious => Self {
                interval_scale: 1.2,
                new_ratio: 0.1,
                difficulty: DifficultyLevel::Easy,
                batch_size: 5,
                hint_level: 2,
            },
        }
    }
}

/// The discrete action bandits score and select between; structurally
/// identical to `StrategyParams` but kept distinct since an `Action` is a
/// candidate under consideration, not yet the mapped/guardrailed output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub interval_scale: f64,
    pub new_ratio: f64,
    pub difficulty: DifficultyLevel,
    pub batch_size: i32,
    pub hint_level: i32,
}

impl From<StrategyParams> for Action {
    fn from(params: StrategyParams) -> Self {
        Self {
            interval_scale: params.interval_scale,
            new_ratio: params.new_ratio,
            difficulty: params.difficulty,
            batch_size: params.batch_size,
            hint_level: params.hint_level,
        }
    }
}

impl From<Action> for StrategyParams {
    fn from(action: Action) -> Self {
        Self {
            interval_scale: action.interval_scale,
            new_ratio: action.new_ratio,
            difficulty: action.difficulty,
            batch_size: action.batch_size,
            hint_level: action.hint_level,
        }
    }
}

/// A fixed, order-significant action space: `interval_scale` (5) x
/// `difficulty` (3) x `new_ratio` (4) x `hint_level` (2), 120 entries total.
/// `batch_size` is pinned per difficulty rather than fully crossed, keeping
/// the space within the wire contract's `<= 120` bound while still letting
/// every field vary. Order is part of the wire contract: delayed-reward
/// events persist an index into this exact sequence.
pub fn action_space() -> Vec<StrategyParams> {
    let mut actions = Vec::with_capacity(120);
    for &interval_scale in &[0.5, 0.8, 1.0, 1.2, 1.5] {
        for &difficulty in &[
            DifficultyLevel::Easy,
            DifficultyLevel::Mid,
            DifficultyLevel::Hard,
        ] {
            let batch_size = match difficulty {
                DifficultyLevel::Easy => 12,
                DifficultyLevel::Mid => 8,
                DifficultyLevel::Hard => 5,
            };
            for &new_ratio in &[0.1, 0.2, 0.3, 0.4] {
                for &hint_level in &[0, 1] {
                    actions.push(StrategyParams {
                        interval_scale,
                        new_ratio,
                        difficulty,
                        batch_size,
                        hint_level,
                    });
                }
            }
        }
    }
    actions
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionFactor {
    pub name: String,
    pub value: f64,
    pub impact: String,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DecisionExplanation {
    pub factors: Vec<DecisionFactor>,
    pub changes: Vec<String>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub value: f64,
    pub reason: String,
    pub ts: i64,
}

impl Reward {
    pub fn new(value: f64, reason: impl Into<String>) -> Self {
        Self {
            value,
            reason: reason.into(),
            ts: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// A reward observation scheduled for delayed (multi-timescale) delivery by
/// C10, keyed by the originating decision event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayedRewardEvent {
    pub user_id: String,
    pub event_id: String,
    pub created_at_ms: i64,
    pub base_reward: f64,
    /// Fraction of each schedule entry's target already delivered.
    pub delivered: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOptions {
    pub current_params: Option<StrategyParams>,
    pub interaction_count: Option<i32>,
    pub recent_accuracy: Option<f64>,
    #[serde(default)]
    pub skip_update: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            current_params: None,
            interaction_count: None,
            recent_accuracy: None,
            skip_update: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResult {
    pub state: UserState,
    pub strategy: StrategyParams,
    /// Raw action selected by cold-start or the ensemble, before mapper EMA
    /// and guardrails are applied to produce `strategy`.
    pub action: Action,
    pub reward: Reward,
    pub explanation: DecisionExplanation,
    pub feature_vector: Option<FeatureVector>,
    pub cold_start_phase: Option<ColdStartPhase>,
    pub suggestion: Option<String>,
    pub should_break: bool,
    pub degraded: bool,
    /// Soft anomaly warnings (cap violations that did not reject the event):
    /// processing continued, but the caller may want to know the input was
    /// unusual.
    #[serde(default)]
    pub anomaly_flags: Vec<String>,
}

/// Per-user bandit/model blob persisted between events (C12 wire shape).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BanditModel {
    pub linucb_state: Option<serde_json::Value>,
    pub thompson_state: Option<serde_json::Value>,
    pub ensemble_weights: Option<EnsembleWeights>,
}

/// The Ensemble's per-learner weight vector, persisted so voting continues
/// smoothly across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsembleWeights {
    pub linucb: f64,
    pub thompson: f64,
    pub actr: f64,
    pub heuristic: f64,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            linucb: 0.40,
            thompson: 0.25,
            actr: 0.25,
            heuristic: 0.10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedAmasState {
    pub user_id: String,
    pub user_state: UserState,
    pub bandit_model: Option<BanditModel>,
    pub current_strategy: StrategyParams,
    pub cold_start_state: Option<ColdStartState>,
    pub interaction_count: i32,
    pub last_updated: i64,
}
