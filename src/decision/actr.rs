//! ACT-R memory-activation scorer (C5): activation over recent review
//! traces, transformed via a logistic into a recall probability, used as one
//! Ensemble vote. Native reimplementation of the activation/retrieval-
//! probability math (the teacher's `engine.rs` instead calls out to an
//! external `danci-algo` path dependency that isn't resolvable here).

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::config::ActrParams;
use crate::types::{CognitiveProfile, DifficultyLevel, StrategyParams, UserState};

const MIN_TIME: f64 = 1e-3;
const MAX_TRACES: usize = 64;

/// A single review outcome, `seconds_ago` from the current time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MemoryTrace {
    pub seconds_ago: f64,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActrModel {
    params: ActrParams,
    traces: VecDeque<MemoryTrace>,
    update_count: u64,
}

impl ActrModel {
    pub fn new(params: ActrParams) -> Self {
        Self {
            params,
            traces: VecDeque::with_capacity(MAX_TRACES),
            update_count: 0,
        }
    }

    pub fn record_review(&mut self, seconds_ago: f64, is_correct: bool) {
        if self.traces.len() >= MAX_TRACES {
            self.traces.pop_front();
        }
        self.traces.push_back(MemoryTrace {
            seconds_ago: seconds_ago.max(0.0),
            is_correct,
        });
    }

    /// `A = ln(Σ w_j * t_j^(-d))`, weighting incorrect reviews by
    /// `error_penalty`. `-infinity` for an empty trace set.
    pub fn activation(&self, decay: f64) -> f64 {
        Self::activation_over(&self.traces, decay, self.params.error_penalty)
    }

    fn activation_over(traces: &VecDeque<MemoryTrace>, decay: f64, error_penalty: f64) -> f64 {
        if traces.is_empty() {
            return f64::NEG_INFINITY;
        }
        let sum: f64 = traces
            .iter()
            .map(|t| {
                let age = t.seconds_ago.max(MIN_TIME);
                let weight = if t.is_correct { 1.0 } else { error_penalty };
                weight * age.powf(-decay)
            })
            .sum();
        if sum > 0.0 && sum.is_finite() {
            sum.ln()
        } else {
            f64::NEG_INFINITY
        }
    }

    /// `P = 1 / (1 + exp(-(A-threshold)/scale))`.
    pub fn retrieval_probability(&self, activation: f64) -> f64 {
        if !activation.is_finite() {
            return 0.0;
        }
        let s = self.params.scale.max(1e-6);
        let z = (activation - self.params.threshold) / s;
        let prob = 1.0 / (1.0 + (-z).exp());
        if prob.is_finite() {
            prob.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Higher memory -> slower decay; higher speed -> slightly faster decay;
    /// higher stability damps both adjustments toward `default_decay`.
    pub fn personalized_decay(&self, cognitive: &CognitiveProfile) -> f64 {
        let base_decay = self.params.default_decay;
        let mem_factor = 1.0 - cognitive.mem.clamp(0.0, 1.0) * 0.3;
        let speed_factor_adj = 1.0 + cognitive.speed.clamp(0.0, 1.0) * 0.2;
        let stability = cognitive.stability.clamp(0.0, 1.0);
        let damping_factor = 0.3 + stability * 0.7;

        let personalized = base_decay * mem_factor * speed_factor_adj;
        let blended = base_decay * damping_factor + personalized * (1.0 - damping_factor);
        blended.clamp(self.params.decay_min, self.params.decay_max)
    }

    /// Confidence: more reviews and a wider time span make the recall
    /// estimate more trustworthy; a single review still gets a floor of 0.3.
    fn confidence(&self) -> f64 {
        if self.traces.is_empty() {
            return 0.0;
        }
        let count = self.traces.len() as f64;
        let max_age = self.traces.iter().map(|t| t.seconds_ago).fold(0.0_f64, f64::max);
        let min_age = self.traces.iter().map(|t| t.seconds_ago).fold(f64::INFINITY, f64::min);
        let span = max_age - min_age;

        let count_factor = (count / 10.0).min(1.0);
        let time_factor = (span / (7.0 * 24.0 * 3600.0)).min(1.0);
        let raw = 0.5 * count_factor + 0.5 * time_factor;
        if self.traces.len() == 1 {
            raw.max(0.3)
        } else {
            raw.clamp(0.0, 1.0)
        }
    }

    /// Rule-based per-candidate adjustment of the base recall probability:
    /// fatigue/attention/motivation/stability each nudge the score toward
    /// the action shape that best serves the current memory state.
    fn score_candidate(&self, state: &UserState, candidate: &StrategyParams, base: f64) -> f64 {
        let mut score = base;

        if state.fatigue > 0.6 {
            let penalty = (state.fatigue - 0.6) * 0.5;
            score += match candidate.difficulty {
                DifficultyLevel::Easy => 0.1,
                DifficultyLevel::Mid => 0.0,
                DifficultyLevel::Hard => -0.15,
            };
            if candidate.interval_scale > 1.0 {
                score += 0.05 * (candidate.interval_scale - 1.0).min(0.5);
            }
            score -= penalty * 0.3;
        }

        if state.attention < 0.5 {
            let penalty = (0.5 - state.attention) * 0.4;
            if candidate.batch_size <= 6 {
                score += 0.08;
            } else if candidate.batch_size > 10 {
                score -= 0.1;
            }
            score += candidate.hint_level as f64 * 0.03;
            score -= penalty * 0.2;
        }

        if state.motivation < 0.0 {
            let penalty = -state.motivation * 0.3;
            score += match candidate.difficulty {
                DifficultyLevel::Easy => 0.08,
                DifficultyLevel::Mid => 0.0,
                DifficultyLevel::Hard => -0.12,
            };
            if candidate.new_ratio < 0.2 {
                score += 0.05;
            }
            score -= penalty * 0.25;
        }

        if state.cognitive.stability > 0.7 {
            let bonus = (state.cognitive.stability - 0.7) * 0.3;
            score += match candidate.difficulty {
                DifficultyLevel::Easy => -0.02,
                DifficultyLevel::Mid => 0.02,
                DifficultyLevel::Hard => 0.05,
            };
            score += candidate.new_ratio * bonus * 0.3;
        }

        score.clamp(0.0, 1.0)
    }

    /// Scores every candidate from the current recall probability plus the
    /// rule-based adjustment, returning the arg-max action, its score and a
    /// trace-derived confidence.
    pub fn select_action(
        &self,
        state: &UserState,
        candidates: &[StrategyParams],
    ) -> Option<(StrategyParams, f64, f64)> {
        if candidates.is_empty() {
            return None;
        }
        let decay = self.personalized_decay(&state.cognitive);
        let activation = self.activation(decay);
        let base_prob = self.retrieval_probability(activation);
        let confidence = self.confidence();

        let mut best: Option<(StrategyParams, f64)> = None;
        for candidate in candidates {
            let score = self.score_candidate(state, candidate, base_prob);
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

    pub fn update(&mut self) {
        self.update_count += 1;
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    pub fn reset(&mut self) {
        self.traces.clear();
        self.update_count = 0;
    }
}

impl Default for ActrModel {
    fn default() -> Self {
        Self::new(ActrParams::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn empty_traces_give_neg_infinity_activation() {
        let model = ActrModel::default();
        assert_eq!(model.activation(0.5), f64::NEG_INFINITY);
    }

    #[test]
    fn recent_trace_has_higher_activation_than_old_trace() {
        let mut recent = ActrModel::default();
        recent.record_review(60.0, true);
        let mut old = ActrModel::default();
        old.record_review(604_800.0, true);
        assert!(recent.activation(0.5) > old.activation(0.5));
    }

    #[test]
    fn incorrect_review_lowers_activation_by_error_penalty() {
        let mut correct = ActrModel::default();
        correct.record_review(3600.0, true);
        let mut incorrect = ActrModel::default();
        incorrect.record_review(3600.0, false);
        assert!(incorrect.activation(0.5) < correct.activation(0.5));
    }

    #[test]
    fn retrieval_probability_is_bounded_and_monotonic() {
        let model = ActrModel::default();
        let low = model.retrieval_probability(-2.0);
        let mid = model.retrieval_probability(model.params.threshold);
        let high = model.retrieval_probability(2.0);
        assert!((0.0..=1.0).contains(&low));
        assert!((0.0..=1.0).contains(&high));
        assert!(low < mid);
        assert!(mid < high);
        assert!((mid - 0.5).abs() < 0.01);
    }

    #[test]
    fn personalized_decay_is_clamped_and_responds_to_memory() {
        let model = ActrModel::default();
        let low_mem = CognitiveProfile {
            mem: 0.0,
            speed: 0.5,
            stability: 0.0,
        };
        let high_mem = CognitiveProfile {
            mem: 1.0,
            speed: 0.5,
            stability: 0.0,
        };
        let low_decay = model.personalized_decay(&low_mem);
        let high_decay = model.personalized_decay(&high_mem);
        assert!(high_decay < low_decay);
        assert!(low_decay >= model.params.decay_min && low_decay <= model.params.decay_max);
    }

    #[test]
    fn select_action_returns_none_for_empty_candidates() {
        let model = ActrModel::default();
        let state = sample_state();
        assert!(model.select_action(&state, &[]).is_none());
    }

    #[test]
    fn select_action_returns_a_candidate_with_valid_score() {
        let mut model = ActrModel::default();
        model.record_review(3600.0, true);
        let state = sample_state();
        let candidates = crate::types::action_space();
        let (_, score, confidence) = model.select_action(&state, &candidates).unwrap();
        assert!((0.0..=1.0).contains(&score));
        assert!((0.0..=1.0).contains(&confidence));
    }

    #[test]
    fn update_increments_count_and_reset_clears_state() {
        let mut model = ActrModel::default();
        model.record_review(60.0, true);
        model.update();
        model.update();
        assert_eq!(model.update_count(), 2);
        model.reset();
        assert_eq!(model.update_count(), 0);
        assert_eq!(model.activation(0.5), f64::NEG_INFINITY);
    }
}
