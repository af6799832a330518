//! Decision Mapper + Guardrails (C9): smooths the ensemble's chosen action
//! into the next `StrategyParams` via EMA, then applies an ordered ladder of
//! safety overrides. Not present as a standalone module in the teacher's
//! `amas/` tree; built fresh in the same small-struct-plus-threshold-ladder
//! idiom as `decision/heuristic.rs`, using `types.rs`'s `StrategyParams`
//! ranges for clamping.

use crate::types::{DifficultyLevel, StrategyParams, TrendState, UserState};

const INTERVAL_SCALE_MIN: f64 = 0.5;
const INTERVAL_SCALE_MAX: f64 = 1.5;
const NEW_RATIO_MIN: f64 = 0.05;
const NEW_RATIO_MAX: f64 = 0.5;
const BATCH_SIZE_MIN: i32 = 5;
const BATCH_SIZE_MAX: i32 = 20;
const HINT_LEVEL_MIN: i32 = 0;
const HINT_LEVEL_MAX: i32 = 2;

pub struct DecisionMapper {
    tau: f64,
}

impl DecisionMapper {
    pub fn new(tau: f64) -> Self {
        Self { tau: tau.clamp(0.0, 1.0) }
    }

    /// EMA-smooths `current` toward `action`, then applies the guardrail
    /// ladder in order: fatigue, motivation, attention, trend.
    pub fn map(&self, current: &StrategyParams, action: &StrategyParams, state: &UserState) -> StrategyParams {
        let mut next = self.ema_merge(current, action);
        self.apply_fatigue_protection(&mut next, state.fatigue);
        self.apply_motivation_protection(&mut next, state.motivation);
        self.apply_attention_protection(&mut next, state.attention);
        self.apply_trend_protection(&mut next, state.trend);
        next
    }

    fn ema_merge(&self, current: &StrategyParams, action: &StrategyParams) -> StrategyParams {
        let tau = self.tau;
        let interval_scale = (tau * current.interval_scale + (1.0 - tau) * action.interval_scale)
            .clamp(INTERVAL_SCALE_MIN, INTERVAL_SCALE_MAX);
        let new_ratio =
            (tau * current.new_ratio + (1.0 - tau) * action.new_ratio).clamp(NEW_RATIO_MIN, NEW_RATIO_MAX);
        let batch_size = (tau * current.batch_size as f64 + (1.0 - tau) * action.batch_size as f64)
            .round()
            .clamp(BATCH_SIZE_MIN as f64, BATCH_SIZE_MAX as f64) as i32;
        let hint_level = (tau * current.hint_level as f64 + (1.0 - tau) * action.hint_level as f64)
            .round()
            .clamp(HINT_LEVEL_MIN as f64, HINT_LEVEL_MAX as f64) as i32;

        StrategyParams {
            interval_scale,
            new_ratio,
            difficulty: action.difficulty,
            batch_size,
            hint_level,
        }
    }

    fn apply_fatigue_protection(&self, params: &mut StrategyParams, fatigue: f64) {
        if fatigue > 0.65 {
            params.interval_scale = params.interval_scale.max(1.0);
            params.new_ratio = params.new_ratio.min(0.2);
            params.batch_size = params.batch_size.min(8);
        }
        if fatigue > 0.85 {
            params.difficulty = DifficultyLevel::Easy;
            params.hint_level = params.hint_level.max(1);
            params.new_ratio = params.new_ratio.min(0.1);
            params.batch_size = params.batch_size.min(5);
        }
    }

    fn apply_motivation_protection(&self, params: &mut StrategyParams, motivation: f64) {
        if motivation < -0.3 {
            params.difficulty = DifficultyLevel::Easy;
            params.hint_level = params.hint_level.max(1);
            params.new_ratio = params.new_ratio.min(0.2);
        }
        if motivation < -0.6 {
            params.hint_level = 2;
            params.batch_size = params.batch_size.min(5);
            params.new_ratio = params.new_ratio.min(0.1);
        }
    }

    fn apply_attention_protection(&self, params: &mut StrategyParams, attention: f64) {
        if attention < 0.35 {
            params.new_ratio = params.new_ratio.min(0.15);
            params.batch_size = params.batch_size.min(6);
            params.hint_level = params.hint_level.max(1);
        }
    }

    fn apply_trend_protection(&self, params: &mut StrategyParams, trend: Option<TrendState>) {
        match trend {
            Some(TrendState::Down) => {
                params.new_ratio = params.new_ratio.min(0.1);
                params.difficulty = DifficultyLevel::Easy;
                params.interval_scale = params.interval_scale.min(0.7);
                params.hint_level = params.hint_level.max(1);
                params.batch_size = params.batch_size.min(8);
            }
            Some(TrendState::Stuck) => {
                params.new_ratio = params.new_ratio.min(0.15);
            }
            _ => {}
        }
    }

    pub fn should_suggest_break(state: &UserState) -> bool {
        state.fatigue > 0.65
    }

    pub fn should_force_break(state: &UserState) -> bool {
        state.fatigue > 0.85
    }
}

impl Default for DecisionMapper {
    fn default() -> Self {
        Self::new(0.5)
    }
}
