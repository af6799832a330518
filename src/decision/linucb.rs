//! LinUCB contextual bandit (C3): ridge-regression posterior over a 22-D
//! context vector, maintained as a Cholesky factor `L` so UCB scoring stays
//! O(d^2) instead of re-inverting `A` every call.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::decision::matrix::{
    cholesky_decompose, cholesky_rank1_update, compute_quadratic_form, dot_product,
    rank1_update_matrix, solve_cholesky, vec_add_scaled,
};
use crate::types::{Action, DifficultyLevel, StrategyParams, UserState};

pub const CONTEXT_DIM: usize = 22;

/// Names the 22 dimensions `build_context` fills in, in order, so a
/// persisted `FeatureVector` can carry labels rather than bare indices.
pub const CONTEXT_LABELS: [&str; CONTEXT_DIM] = [
    "attention",
    "fatigue",
    "cognitive_mem",
    "cognitive_speed",
    "cognitive_stability",
    "motivation_norm",
    "confidence",
    "recent_error_rate",
    "recent_rt_norm",
    "action_interval_norm",
    "action_new_ratio_norm",
    "action_batch_norm",
    "action_hint_norm",
    "action_is_easy",
    "action_is_hard",
    "hour_sin",
    "hour_cos",
    "attention_x_new_ratio",
    "fatigue_x_batch",
    "motivation_x_is_hard",
    "cognitive_mem_x_interval",
    "bias",
];
const COMPONENT_CLAMP: f64 = 50.0;
const MIN_LAMBDA: f64 = 0.001;
const CHOLESKY_MIN_DIAG: f64 = 1e-9;

/// Ambient signals `select`/`update` need beyond `UserState` and the
/// candidate action: rolling accuracy/RT and a time-of-day bucket, exactly
/// the "context (recent error rate, recent rt, time bucket)" spec.md names.
#[derive(Debug, Clone, Copy)]
pub struct BanditContext {
    pub recent_error_rate: f64,
    pub recent_rt_ms: f64,
    pub hour_of_day: u32,
}

impl Default for BanditContext {
    fn default() -> Self {
        Self {
            recent_error_rate: 0.3,
            recent_rt_ms: 3000.0,
            hour_of_day: 12,
        }
    }
}

/// `A`/`b`/`L` persisted verbatim (C3 wire shape in spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinUcbModel {
    pub d: usize,
    pub lambda: f64,
    pub alpha: f64,
    #[serde(rename = "A")]
    pub a_matrix: Vec<f64>,
    pub b: Vec<f64>,
    #[serde(rename = "L", default)]
    pub l: Vec<f64>,
    pub update_count: u64,
}

impl LinUcbModel {
    pub fn new(d: usize, lambda: f64) -> Self {
        let safe_lambda = lambda.max(MIN_LAMBDA);
        let mut a_matrix = vec![0.0; d * d];
        let mut l = vec![0.0; d * d];
        for i in 0..d {
            a_matrix[i * d + i] = safe_lambda;
            l[i * d + i] = safe_lambda.sqrt();
        }
        Self {
            d,
            lambda: safe_lambda,
            alpha: 0.5,
            a_matrix,
            b: vec![0.0; d],
            l,
            update_count: 0,
        }
    }

    /// Builds the 22-D context vector for a candidate action under the
    /// current user state and ambient bandit context.
    pub fn build_context(
        state: &UserState,
        ctx: &BanditContext,
        action: &Action,
    ) -> [f64; CONTEXT_DIM] {
        let mut x = [0.0; CONTEXT_DIM];

        x[0] = state.attention.clamp(0.0, 1.0);
        x[1] = state.fatigue.clamp(0.0, 1.0);
        x[2] = state.cognitive.mem.clamp(0.0, 1.0);
        x[3] = state.cognitive.speed.clamp(0.0, 1.0);
        x[4] = state.cognitive.stability.clamp(0.0, 1.0);
        let motivation_norm = (state.motivation.clamp(-1.0, 1.0) + 1.0) / 2.0;
        x[5] = motivation_norm;
        x[6] = state.conf.clamp(0.0, 1.0);
        x[7] = ctx.recent_error_rate.clamp(0.0, 1.0);
        x[8] = (ctx.recent_rt_ms / 10_000.0).clamp(0.0, 1.0);

        let interval_norm = ((action.interval_scale - 0.5) / 1.0).clamp(0.0, 1.0);
        let new_ratio_norm = (action.new_ratio / 0.5).clamp(0.0, 1.0);
        let batch_norm = (action.batch_size as f64 / 20.0).clamp(0.0, 1.0);
        let hint_norm = (action.hint_level as f64 / 2.0).clamp(0.0, 1.0);
        x[9] = interval_norm;
        x[10] = new_ratio_norm;
        x[11] = batch_norm;
        x[12] = hint_norm;
        x[13] = if action.difficulty == DifficultyLevel::Easy {
            1.0
        } else {
            0.0
        };
        x[14] = if action.difficulty == DifficultyLevel::Hard {
            1.0
        } else {
            0.0
        };

        let hour_angle = 2.0 * std::f64::consts::PI * (ctx.hour_of_day as f64 % 24.0) / 24.0;
        x[15] = hour_angle.sin();
        x[16] = hour_angle.cos();

        x[17] = x[0] * new_ratio_norm;
        x[18] = x[1] * batch_norm;
        x[19] = motivation_norm * x[14];
        x[20] = x[2] * interval_norm;
        x[21] = 1.0;

        for v in x.iter_mut() {
            *v = v.clamp(-COMPONENT_CLAMP, COMPONENT_CLAMP);
        }
        x
    }

    /// `alpha(n, recentAccuracy, F)` cold-start exploration schedule.
    pub fn cold_start_alpha(update_count: u64, recent_accuracy: f64, fatigue: f64) -> f64 {
        if update_count < 15 {
            0.5
        } else if update_count < 50 {
            if recent_accuracy > 0.75 && fatigue < 0.5 {
                2.0
            } else {
                1.0
            }
        } else {
            0.7
        }
    }

    pub fn select_action(
        &self,
        state: &UserState,
        ctx: &BanditContext,
        candidates: &[StrategyParams],
    ) -> Option<(StrategyParams, f64, f64)> {
        if candidates.is_empty() {
            return None;
        }

        let mut best: Option<(StrategyParams, f64, f64)> = None;
        for candidate in candidates {
            let action: Action = candidate.clone().into();
            let x = Self::build_context(state, ctx, &action);
            if x.len() != self.d {
                continue;
            }
            let theta = solve_cholesky(&self.l, &self.b, self.d);
            let mu = dot_product(&theta, &x);
            let exploration = compute_quadratic_form(&self.l, &x, self.d).max(0.0).sqrt();
            let ucb = mu + self.alpha * exploration;

            let is_better = match &best {
                None => true,
                Some((_, best_score, _)) => ucb > *best_score,
            };
            if is_better {
                best = Some((candidate.clone(), ucb, exploration));
            }
        }
        best
    }

    /// Rank-1 posterior update for `(state, action, reward)`. Rejects (logs
    /// and no-ops) if the built context contains a non-finite component.
    pub fn update(&mut self, state: &UserState, ctx: &BanditContext, action: &Action, reward: f64) {
        let x = Self::build_context(state, ctx, action);
        if x.iter().any(|v| !v.is_finite()) {
            warn!("linucb update rejected: non-finite context component");
            return;
        }
        let reward = reward.clamp(-1.0, 1.0);

        rank1_update_matrix(&mut self.a_matrix, &x, self.d);
        vec_add_scaled(&mut self.b, &x, reward);

        let updated = cholesky_rank1_update(&mut self.l, &x, self.d, CHOLESKY_MIN_DIAG);
        if !updated {
            let recomputed = cholesky_decompose(&self.a_matrix, self.d, self.lambda);
            if recomputed.iter().all(|v| v.is_finite())
                && (0..self.d).all(|i| recomputed[i * self.d + i] > 0.0)
            {
                self.l = recomputed;
            } else {
                warn!("linucb Cholesky recovery failed, resetting model to lambda*I");
                self.reset_to_prior();
            }
        }

        self.update_count += 1;
    }

    fn reset_to_prior(&mut self) {
        let d = self.d;
        self.a_matrix = vec![0.0; d * d];
        self.l = vec![0.0; d * d];
        for i in 0..d {
            self.a_matrix[i * d + i] = self.lambda;
            self.l[i * d + i] = self.lambda.sqrt();
        }
        self.b = vec![0.0; d];
    }

    /// Dimension migration on load: stored `d` smaller than current `d` is
    /// zero-padded and re-Cholesky'd; `alpha` is left untouched (spec.md §9
    /// Open Question resolution). Stored `d` larger than current resets.
    pub fn migrate_dimensions(&mut self, target_d: usize) {
        if self.d == target_d {
            return;
        }
        if self.d < target_d {
            let old_d = self.d;
            let mut new_a = vec![0.0; target_d * target_d];
            let mut new_b = vec![0.0; target_d];
            for i in 0..old_d {
                new_b[i] = self.b[i];
                for j in 0..old_d {
                    new_a[i * target_d + j] = self.a_matrix[i * old_d + j];
                }
            }
            for i in old_d..target_d {
                new_a[i * target_d + i] = self.lambda;
            }
            self.a_matrix = new_a;
            self.b = new_b;
            self.l = cholesky_decompose(&self.a_matrix, target_d, self.lambda);
            self.d = target_d;
        } else {
            warn!(
                stored_d = self.d,
                target_d, "linucb stored dimension exceeds current config, resetting model"
            );
            let alpha = self.alpha;
            *self = Self::new(target_d, self.lambda);
            self.alpha = alpha;
        }
    }
}

impl Default for LinUcbModel {
    fn default() -> Self {
        Self::new(CONTEXT_DIM, MIN_LAMBDA)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CognitiveProfile;

    fn sample_state() -> UserState {
        UserState {
            attention: 0.7,
            fatigue: 0.1,
            cognitive: CognitiveProfile::default(),
            motivation: 0.0,
            trend: None,
            conf: 0.5,
            ts: 0,
        }
    }

    #[test]
    fn new_model_has_lambda_identity_prior() {
        let model = LinUcbModel::new(4, 2.0);
        assert_eq!(model.a_matrix, vec![2.0, 0.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 0.0, 2.0]);
        for i in 0..4 {
            assert!((model.l[i * 4 + i] - 2.0_f64.sqrt()).abs() < 1e-9);
        }
    }

    #[test]
    fn build_context_is_22_dimensional_and_clamped() {
        let state = sample_state();
        let ctx = BanditContext::default();
        let action = Action {
            interval_scale: 1.0,
            new_ratio: 0.2,
            difficulty: DifficultyLevel::Mid,
            batch_size: 8,
            hint_level: 1,
        };
        let x = LinUcbModel::build_context(&state, &ctx, &action);
        assert_eq!(x.len(), CONTEXT_DIM);
        assert!(x.iter().all(|v| v.abs() <= COMPONENT_CLAMP));
        assert_eq!(x[21], 1.0);
    }

    #[test]
    fn select_action_returns_none_for_empty_candidates() {
        let model = LinUcbModel::default();
        let state = sample_state();
        let ctx = BanditContext::default();
        assert!(model.select_action(&state, &ctx, &[]).is_none());
    }

    #[test]
    fn select_action_returns_a_candidate() {
        let model = LinUcbModel::default();
        let state = sample_state();
        let ctx = BanditContext::default();
        let candidates = crate::types::action_space();
        let result = model.select_action(&state, &ctx, &candidates);
        assert!(result.is_some());
    }

    #[test]
    fn update_increments_count_and_changes_posterior() {
        let mut model = LinUcbModel::default();
        let state = sample_state();
        let ctx = BanditContext::default();
        let action = Action {
            interval_scale: 1.0,
            new_ratio: 0.2,
            difficulty: DifficultyLevel::Mid,
            batch_size: 8,
            hint_level: 1,
        };
        let initial_b = model.b.clone();
        model.update(&state, &ctx, &action, 1.0);
        assert_eq!(model.update_count, 1);
        assert_ne!(model.b, initial_b);
    }

    #[test]
    fn cholesky_stays_consistent_with_a_after_many_updates() {
        use crate::decision::matrix::{frobenius_diff, reconstruct_from_cholesky};
        let mut model = LinUcbModel::default();
        let state = sample_state();
        let ctx = BanditContext::default();
        for i in 0..100 {
            let action = Action {
                interval_scale: 0.5 + (i % 5) as f64 * 0.2,
                new_ratio: 0.1 + (i % 4) as f64 * 0.1,
                difficulty: DifficultyLevel::Mid,
                batch_size: 5 + (i % 4) * 4,
                hint_level: i % 3,
            };
            model.update(&state, &ctx, &action, if i % 2 == 0 { 1.0 } else { -0.5 });
        }
        let reconstructed = reconstruct_from_cholesky(&model.l, model.d);
        assert!(frobenius_diff(&reconstructed, &model.a_matrix) < 1e-3);
    }

    #[test]
    fn cold_start_alpha_schedule_matches_spec() {
        assert_eq!(LinUcbModel::cold_start_alpha(0, 0.9, 0.1), 0.5);
        assert_eq!(LinUcbModel::cold_start_alpha(20, 0.9, 0.1), 2.0);
        assert_eq!(LinUcbModel::cold_start_alpha(20, 0.5, 0.1), 1.0);
        assert_eq!(LinUcbModel::cold_start_alpha(60, 0.9, 0.1), 0.7);
    }

    #[test]
    fn migrate_dimensions_zero_pads_and_keeps_alpha() {
        let mut model = LinUcbModel::new(4, 1.0);
        model.alpha = 1.3;
        model.b[0] = 5.0;
        model.migrate_dimensions(6);
        assert_eq!(model.d, 6);
        assert_eq!(model.alpha, 1.3);
        assert_eq!(model.b[0], 5.0);
        assert_eq!(model.a_matrix[4 * 6 + 4], model.lambda);
    }

    #[test]
    fn migrate_dimensions_resets_on_shrink_target() {
        let mut model = LinUcbModel::new(8, 1.0);
        model.alpha = 0.9;
        model.migrate_dimensions(4);
        assert_eq!(model.d, 4);
        assert_eq!(model.alpha, 0.9);
    }
}
