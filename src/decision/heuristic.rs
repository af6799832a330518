//! Heuristic rule-table scorer (C6): a deterministic threshold table maps
//! state to a preferred `(difficulty, hint_level, batch_size, ...)` tuple,
//! then every candidate action is scored by similarity to that tuple.
//! Grounded in the teacher's `decision/heuristic.rs`, minus its habit-profile
//! branch (this crate's `UserState` carries no habit profile).

use crate::types::{DifficultyLevel, StrategyParams, UserState};

pub struct HeuristicLearner {
    fatigue_threshold: f64,
    attention_threshold: f64,
    motivation_threshold: f64,
}

impl HeuristicLearner {
    pub fn new(fatigue_threshold: f64, attention_threshold: f64, motivation_threshold: f64) -> Self {
        Self {
            fatigue_threshold,
            attention_threshold,
            motivation_threshold,
        }
    }

    /// Walks the same threshold ladder as the teacher's `suggest`, starting
    /// from `current` and nudging it toward what the state calls for.
    pub fn preferred_strategy(&self, state: &UserState, current: &StrategyParams) -> StrategyParams {
        let mut result = current.clone();

        if state.fatigue > self.fatigue_threshold {
            result.batch_size = (result.batch_size - 2).max(5);
            result.new_ratio = (result.new_ratio - 0.1).max(0.1);
            if result.difficulty == DifficultyLevel::Hard {
                result.difficulty = DifficultyLevel::Mid;
            }
        }

        if state.attention < self.attention_threshold {
            result.hint_level = (result.hint_level + 1).min(2);
            result.batch_size = (result.batch_size - 1).max(5);
        }

        if state.motivation < self.motivation_threshold {
            result.difficulty = match result.difficulty {
                DifficultyLevel::Hard => DifficultyLevel::Mid,
                DifficultyLevel::Mid => DifficultyLevel::Easy,
                DifficultyLevel::Easy => DifficultyLevel::Easy,
            };
            result.interval_scale = (result.interval_scale * 1.1).min(1.5);
        }

        if state.motivation > 0.7 && state.fatigue < 0.3 && state.attention > 0.7 {
            result.batch_size = (result.batch_size + 2).min(16);
            result.new_ratio = (result.new_ratio + 0.05).min(0.4);
            if result.difficulty == DifficultyLevel::Easy {
                result.difficulty = DifficultyLevel::Mid;
            }
        }

        if state.cognitive.mem > 0.8 && state.cognitive.speed > 0.7 {
            result.interval_scale = (result.interval_scale * 0.9).max(0.5);
        } else if state.cognitive.mem < 0.4 {
            result.interval_scale = (result.interval_scale * 1.2).min(1.5);
            result.hint_level = (result.hint_level + 1).min(2);
        }

        result
    }

    /// 1 minus a weighted normalized distance across every strategy field;
    /// difficulty mismatches cost a fixed step rather than a continuous one.
    fn similarity(preferred: &StrategyParams, candidate: &StrategyParams) -> f64 {
        let interval_d = (preferred.interval_scale - candidate.interval_scale).abs() / 1.0;
        let ratio_d = (preferred.new_ratio - candidate.new_ratio).abs() / 0.4;
        let batch_d = (preferred.batch_size - candidate.batch_size).abs() as f64 / 11.0;
        let hint_d = (preferred.hint_level - candidate.hint_level).abs() as f64 / 2.0;
        let difficulty_d = if preferred.difficulty == candidate.difficulty {
            0.0
        } else {
            1.0
        };

        let distance =
            0.25 * interval_d + 0.2 * ratio_d + 0.2 * batch_d + 0.1 * hint_d + 0.25 * difficulty_d;
        (1.0 - distance.clamp(0.0, 1.0)).clamp(0.0, 1.0)
    }

    /// Compounded-factor confidence: every threshold the state trips knocks
    /// 20% off, floored at 0.3 so the vote is never fully discounted.
    pub fn confidence(&self, state: &UserState) -> f64 {
        let fatigue_factor = if state.fatigue > self.fatigue_threshold { 0.8 } else { 1.0 };
        let attention_factor = if state.attention < self.attention_threshold { 0.8 } else { 1.0 };
        let motivation_factor = if state.motivation < self.motivation_threshold { 0.8 } else { 1.0 };

        (fatigue_factor * attention_factor * motivation_factor).max(0.3)
    }

    /// Scores every candidate by similarity to the rule table's preferred
    /// tuple and returns the closest match. Always returns `Some` for a
    /// non-empty candidate set.
    pub fn select_action(
        &self,
        state: &UserState,
        current: &StrategyParams,
        candidates: &[StrategyParams],
    ) -> Option<(StrategyParams, f64, f64)> {
        if candidates.is_empty() {
            return None;
        }
        let preferred = self.preferred_strategy(state, current);
        let confidence = self.confidence(state);

        let mut best: Option<(StrategyParams, f64)> = None;
        for candidate in candidates {
            let score = Self::similarity(&preferred, candidate);
            let is_better = match &best {
                None => true,
                Some((_, best_score)) => score > *best_score,
            };
            if is_better {
                best = Some((candidate.clone(), score));
            }
        }
        best.map(|(action, score)| (action, score, confidence))
    }
}

impl Default for HeuristicLearner {
    fn default() -> Self {
        Self::new(0.7, 0.4, -0.3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CognitiveProfile;

    fn sample_strategy() -> StrategyParams {
        StrategyParams {
            difficulty: DifficultyLevel::Mid,
            new_ratio: 0.2,
            batch_size: 8,
            interval_scale: 1.0,
            hint_level: 1,
        }
    }

    fn sample_user_state() -> UserState {
        UserState {
            attention: 0.7,
            fatigue: 0.3,
            cognitive: CognitiveProfile::default(),
            motivation: 0.5,
            trend: None,
            conf: 0.5,
            ts: 0,
        }
    }

    #[test]
    fn new_sets_thresholds() {
        let learner = HeuristicLearner::new(0.8, 0.5, -0.2);
        assert!((learner.fatigue_threshold - 0.8).abs() < 1e-6);
        assert!((learner.attention_threshold - 0.5).abs() < 1e-6);
        assert!((learner.motivation_threshold - (-0.2)).abs() < 1e-6);
    }

    #[test]
    fn default_uses_standard_thresholds() {
        let learner = HeuristicLearner::default();
        assert!((learner.fatigue_threshold - 0.7).abs() < 1e-6);
        assert!((learner.attention_threshold - 0.4).abs() < 1e-6);
        assert!((learner.motivation_threshold - (-0.3)).abs() < 1e-6);
    }

    #[test]
    fn preferred_reduces_batch_on_high_fatigue() {
        let learner = HeuristicLearner::default();
        let mut state = sample_user_state();
        state.fatigue = 0.8;
        let current = StrategyParams { batch_size: 10, ..sample_strategy() };
        let preferred = learner.preferred_strategy(&state, &current);
        assert!(preferred.batch_size < 10);
    }

    #[test]
    fn preferred_downgrades_difficulty_on_high_fatigue() {
        let learner = HeuristicLearner::default();
        let mut state = sample_user_state();
        state.fatigue = 0.8;
        let current = StrategyParams { difficulty: DifficultyLevel::Hard, ..sample_strategy() };
        let preferred = learner.preferred_strategy(&state, &current);
        assert_eq!(preferred.difficulty, DifficultyLevel::Mid);
    }

    #[test]
    fn preferred_increases_hint_on_low_attention() {
        let learner = HeuristicLearner::default();
        let mut state = sample_user_state();
        state.attention = 0.3;
        let current = StrategyParams { hint_level: 0, ..sample_strategy() };
        let preferred = learner.preferred_strategy(&state, &current);
        assert!(preferred.hint_level >= 1);
    }

    #[test]
    fn preferred_downgrades_difficulty_on_low_motivation() {
        let learner = HeuristicLearner::default();
        let mut state = sample_user_state();
        state.motivation = -0.5;
        let current = StrategyParams { difficulty: DifficultyLevel::Hard, ..sample_strategy() };
        let preferred = learner.preferred_strategy(&state, &current);
        assert_eq!(preferred.difficulty, DifficultyLevel::Mid);
    }

    #[test]
    fn preferred_boosts_on_positive_state() {
        let learner = HeuristicLearner::default();
        let mut state = sample_user_state();
        state.motivation = 0.8;
        state.fatigue = 0.2;
        state.attention = 0.8;
        let current = StrategyParams {
            batch_size: 8,
            new_ratio: 0.2,
            difficulty: DifficultyLevel::Easy,
            ..sample_strategy()
        };
        let preferred = learner.preferred_strategy(&state, &current);
        assert!(preferred.batch_size > 8);
        assert_eq!(preferred.difficulty, DifficultyLevel::Mid);
    }

    #[test]
    fn select_action_returns_none_for_empty_candidates() {
        let learner = HeuristicLearner::default();
        let state = sample_user_state();
        let current = sample_strategy();
        assert!(learner.select_action(&state, &current, &[]).is_none());
    }

    #[test]
    fn select_action_picks_the_closest_candidate() {
        let learner = HeuristicLearner::default();
        let mut state = sample_user_state();
        state.fatigue = 0.9;
        let current = sample_strategy();
        let candidates = crate::types::action_space();
        let (action, score, confidence) = learner.select_action(&state, &current, &candidates).unwrap();
        assert!((0.0..=1.0).contains(&score));
        assert!((0.0..=1.0).contains(&confidence));
        assert_ne!(action.difficulty, DifficultyLevel::Hard);
    }

    #[test]
    fn similarity_is_one_for_identical_strategies() {
        let strategy = sample_strategy();
        assert!((HeuristicLearner::similarity(&strategy, &strategy) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn confidence_returns_one_for_normal_state() {
        let learner = HeuristicLearner::default();
        let state = sample_user_state();
        assert!((learner.confidence(&state) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn confidence_has_minimum_floor() {
        let learner = HeuristicLearner::default();
        let mut state = sample_user_state();
        state.fatigue = 1.0;
        state.attention = 0.0;
        state.motivation = -1.0;
        assert!(learner.confidence(&state) >= 0.3);
    }

    #[test]
    fn confidence_compounds_multiple_factors() {
        let learner = HeuristicLearner::default();
        let mut state = sample_user_state();
        state.fatigue = 0.8;
        state.attention = 0.3;
        let conf = learner.confidence(&state);
        assert!((conf - 0.64).abs() < 1e-6);
    }
}
