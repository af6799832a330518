#![allow(dead_code)]

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttentionWeights {
    pub rt_mean: f64,
    pub rt_cv: f64,
    pub pace_cv: f64,
    pub pause: f64,
    pub switch: f64,
    pub drift: f64,
    pub interaction: f64,
    pub focus_loss: f64,
}

impl Default for AttentionWeights {
    fn default() -> Self {
        Self {
            rt_mean: 0.2,
            rt_cv: 0.15,
            pace_cv: 0.1,
            pause: 0.15,
            switch: 0.1,
            drift: 0.1,
            interaction: 0.1,
            focus_loss: 0.1,
        }
    }
}

impl AttentionWeights {
    pub fn total(&self) -> f64 {
        self.rt_mean
            + self.rt_cv
            + self.pace_cv
            + self.pause
            + self.switch
            + self.drift
            + self.interaction
            + self.focus_loss
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FatigueParams {
    pub beta: f64,
    pub gamma: f64,
    pub delta: f64,
    pub k: f64,
    pub long_break_threshold: f64,
}

impl Default for FatigueParams {
    fn default() -> Self {
        Self {
            beta: 0.3,
            gamma: 0.25,
            delta: 0.2,
            k: 0.05,
            long_break_threshold: 30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotivationParams {
    pub rho: f64,
    pub kappa: f64,
    pub lambda: f64,
    pub mu: f64,
}

impl Default for MotivationParams {
    fn default() -> Self {
        Self {
            rho: 0.9,
            kappa: 0.08,
            lambda: 0.1,
            mu: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CognitiveParams {
    pub memory_alpha: f64,
    pub speed_baseline_ms: f64,
    pub stability_window: usize,
    /// Steps for the short/long blend to reach roughly 2/3 long-run weight,
    /// used by `lambda = 1 - exp(-n / k0)`.
    pub k0: f64,
}

impl Default for CognitiveParams {
    fn default() -> Self {
        Self {
            memory_alpha: 0.15,
            speed_baseline_ms: 3000.0,
            stability_window: 20,
            k0: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendParams {
    pub window_size: usize,
    pub up_threshold: f64,
    pub down_threshold: f64,
    pub stuck_variance_threshold: f64,
    pub min_samples: usize,
    pub min_day_span: f64,
}

impl Default for TrendParams {
    fn default() -> Self {
        Self {
            window_size: 20,
            up_threshold: 0.01,
            down_threshold: -0.005,
            stuck_variance_threshold: 0.01,
            min_samples: 5,
            min_day_span: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColdStartConfig {
    /// Fixed-length probe window: `UserType::Fast`/`Stable`/`Cautious` at
    /// indices 0/1/2, cycled through by `ColdStartManager` during Classify.
    pub classify_samples: i32,
    pub explore_samples: i32,
    pub probe_sequence: Vec<i32>,
    pub fast_accuracy_threshold: f64,
    pub fast_rt_threshold_ms: f64,
    pub cautious_accuracy_threshold: f64,
    pub cautious_rt_threshold_ms: f64,
}

impl Default for ColdStartConfig {
    fn default() -> Self {
        Self {
            classify_samples: 5,
            explore_samples: 10,
            probe_sequence: vec![0, 1, 2, 0, 1],
            fast_accuracy_threshold: 0.75,
            fast_rt_threshold_ms: 2000.0,
            cautious_accuracy_threshold: 0.4,
            cautious_rt_threshold_ms: 4000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanditConfig {
    pub alpha: f64,
    pub context_dim: usize,
    pub action_dim: usize,
    pub exploration_bonus: f64,
}

impl Default for BanditConfig {
    fn default() -> Self {
        Self {
            alpha: 0.7,
            context_dim: 22,
            action_dim: 5,
            exploration_bonus: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActrParams {
    pub decay_min: f64,
    pub decay_max: f64,
    pub default_decay: f64,
    pub noise_sd: f64,
    pub threshold: f64,
    pub scale: f64,
    pub error_penalty: f64,
}

impl Default for ActrParams {
    fn default() -> Self {
        Self {
            decay_min: 0.3,
            decay_max: 0.7,
            default_decay: 0.5,
            noise_sd: 0.0,
            threshold: -0.8,
            scale: 0.25,
            error_penalty: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardConfig {
    pub accuracy_weight: f64,
    pub speed_weight: f64,
    pub fatigue_weight: f64,
    pub frustration_weight: f64,
    pub reference_rt_ms: f64,
    /// (delay_seconds, weight) schedule C10 uses for multi-timescale delivery.
    pub delay_schedule: Vec<(i64, f64)>,
    pub max_pending: usize,
    pub prune_to: usize,
    pub expiry_days: i64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            accuracy_weight: 0.5,
            speed_weight: 0.2,
            fatigue_weight: 0.2,
            frustration_weight: 0.1,
            reference_rt_ms: 3_000.0,
            delay_schedule: vec![
                (0, 0.30),
                (3_600, 0.20),
                (21_600, 0.15),
                (86_400, 0.20),
                (604_800, 0.15),
            ],
            max_pending: 10_000,
            prune_to: 9_000,
            expiry_days: 8,
        }
    }
}

/// Bounds the immediate anomaly gate (C11 step 1) uses to reject a raw event
/// before it reaches any modeler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyConfig {
    pub max_response_time_ms: i64,
    pub max_pause_count: i32,
    pub max_switch_count: i32,
    pub max_focus_loss_ms: i64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            max_response_time_ms: 60_000,
            max_pause_count: 20,
            max_switch_count: 10,
            max_focus_loss_ms: 300_000,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlags {
    #[serde(default = "default_true", alias = "umm_linucb_enabled")]
    pub linucb_enabled: bool,
    #[serde(default = "default_true", alias = "umm_thompson_enabled")]
    pub thompson_enabled: bool,
    #[serde(default = "default_true", alias = "umm_actr_enabled")]
    pub actr_enabled: bool,
    #[serde(default = "default_true", alias = "umm_heuristic_enabled")]
    pub heuristic_enabled: bool,
    #[serde(default = "default_true", alias = "umm_coldstart_enabled")]
    pub cold_start_enabled: bool,
    #[serde(default = "default_true", alias = "umm_trend_enabled")]
    pub trend_enabled: bool,
    #[serde(default = "default_true", alias = "umm_ensemble_enabled")]
    pub ensemble_enabled: bool,
    #[serde(default = "default_true", alias = "umm_delayed_reward_enabled")]
    pub delayed_reward_enabled: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            linucb_enabled: true,
            thompson_enabled: true,
            actr_enabled: true,
            heuristic_enabled: true,
            cold_start_enabled: true,
            trend_enabled: true,
            ensemble_enabled: true,
            delayed_reward_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyFilterConfig {
    pub fatigue_break_threshold: f64,
    pub fatigue_force_break_threshold: f64,
    pub motivation_floor: f64,
    pub attention_floor: f64,
    pub max_difficulty_jump: i32,
    pub min_batch_size: i32,
    pub max_batch_size: i32,
}

impl Default for SafetyFilterConfig {
    fn default() -> Self {
        Self {
            fatigue_break_threshold: 0.7,
            fatigue_force_break_threshold: 0.9,
            motivation_floor: -0.7,
            attention_floor: 0.2,
            max_difficulty_jump: 1,
            min_batch_size: 3,
            max_batch_size: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsembleConfig {
    pub min_weight: f64,
    pub learning_rate: f64,
    pub decay_rate: f64,
    pub clip_reset_count: usize,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            min_weight: 0.05,
            learning_rate: 0.1,
            decay_rate: 0.95,
            clip_reset_count: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerConfig {
    pub failure_threshold: f64,
    pub window_size: usize,
    pub open_duration_ms: i64,
    pub half_open_probes: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 0.5,
            window_size: 20,
            open_duration_ms: 5_000,
            half_open_probes: 2,
        }
    }
}

/// Top-level nested configuration tree for the engine, constructed from
/// defaults and overridable piecemeal via `from_env`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmasConfig {
    pub attention_weights: AttentionWeights,
    pub attention_smoothing: f64,
    pub fatigue: FatigueParams,
    pub motivation: MotivationParams,
    pub cognitive: CognitiveParams,
    pub trend: TrendParams,
    pub cold_start: ColdStartConfig,
    pub bandit: BanditConfig,
    pub actr: ActrParams,
    pub reward: RewardConfig,
    pub feature_flags: FeatureFlags,
    pub safety: SafetyFilterConfig,
    pub ensemble: EnsembleConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub anomaly: AnomalyConfig,
    /// EMA blend factor `DecisionMapper` holds the previous strategy at.
    pub mapper_tau: f64,
    pub confidence_decay: f64,
    pub min_confidence: f64,
    pub processing_timeout_ms: u64,
    pub log_level: String,
}

impl Default for AmasConfig {
    fn default() -> Self {
        Self {
            attention_weights: AttentionWeights::default(),
            attention_smoothing: 0.4,
            fatigue: FatigueParams::default(),
            motivation: MotivationParams::default(),
            cognitive: CognitiveParams::default(),
            trend: TrendParams::default(),
            cold_start: ColdStartConfig::default(),
            bandit: BanditConfig::default(),
            actr: ActrParams::default(),
            reward: RewardConfig::default(),
            feature_flags: FeatureFlags::default(),
            safety: SafetyFilterConfig::default(),
            ensemble: EnsembleConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            anomaly: AnomalyConfig::default(),
            mapper_tau: 0.5,
            confidence_decay: 0.98,
            min_confidence: 0.1,
            processing_timeout_ms: 100,
            log_level: "info".to_string(),
        }
    }
}

impl AmasConfig {
    /// Applies a small set of environment overrides on top of the defaults;
    /// anything unset keeps its compiled-in default.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("AMAS_ENSEMBLE_ENABLED") {
            config.feature_flags.ensemble_enabled = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = std::env::var("AMAS_BANDIT_ALPHA") {
            if let Ok(alpha) = v.parse::<f64>() {
                config.bandit.alpha = alpha;
            }
        }
        if let Ok(v) = std::env::var("AMAS_PROCESSING_TIMEOUT_MS") {
            if let Ok(ms) = v.parse::<u64>() {
                config.processing_timeout_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("RUST_LOG") {
            config.log_level = v;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_feature_flags_are_all_enabled() {
        let flags = FeatureFlags::default();
        assert!(flags.linucb_enabled);
        assert!(flags.thompson_enabled);
        assert!(flags.actr_enabled);
        assert!(flags.heuristic_enabled);
        assert!(flags.ensemble_enabled);
    }

    #[test]
    fn legacy_umm_keys_are_accepted() {
        let json = r#"{
            "umm_linucb_enabled": false,
            "umm_thompson_enabled": true,
            "umm_actr_enabled": true,
            "umm_heuristic_enabled": true,
            "umm_coldstart_enabled": true,
            "umm_trend_enabled": true,
            "umm_ensemble_enabled": true,
            "umm_delayed_reward_enabled": true
        }"#;
        let flags: FeatureFlags = serde_json::from_str(json).unwrap();
        assert!(!flags.linucb_enabled);
        assert!(flags.thompson_enabled);
    }

    #[test]
    fn attention_weights_total_is_close_to_one() {
        let weights = AttentionWeights::default();
        assert!((weights.total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn from_env_falls_back_to_defaults() {
        std::env::remove_var("AMAS_ENSEMBLE_ENABLED");
        std::env::remove_var("AMAS_BANDIT_ALPHA");
        let config = AmasConfig::from_env();
        assert_eq!(config.bandit.alpha, BanditConfig::default().alpha);
    }
}
