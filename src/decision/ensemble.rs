//! Weighted-vote ensemble (C7) over the four member learners. A from-scratch
//! design grounded in the teacher's `decision/ensemble.rs` weighted-merge
//! shape (`DecisionCandidate`, snap-to-grid helpers), but implementing the
//! exact aggregation/update algorithm this crate needs rather than the
//! teacher's simpler continuous-blend version.

use tracing::warn;

use crate::config::EnsembleConfig;
use crate::types::{DecisionExplanation, DecisionFactor, EnsembleWeights, StrategyParams};

/// One member's vote for this tick: `(action, rawScore, confidence)`.
#[derive(Debug, Clone)]
pub struct MemberVote {
    pub action: StrategyParams,
    pub raw_score: f64,
    pub confidence: f64,
}

/// The four members' votes for a single decision tick. A member that didn't
/// run (disabled by feature flag, or failed) contributes `None`.
#[derive(Debug, Clone, Default)]
pub struct EnsembleVotes {
    pub linucb: Option<MemberVote>,
    pub thompson: Option<MemberVote>,
    pub actr: Option<MemberVote>,
    pub heuristic: Option<MemberVote>,
}

impl EnsembleVotes {
    fn members(&self) -> [(&'static str, &Option<MemberVote>); 4] {
        [
            ("linucb", &self.linucb),
            ("thompson", &self.thompson),
            ("actr", &self.actr),
            ("heuristic", &self.heuristic),
        ]
    }
}

const MAX_RECENT_REWARDS: usize = 50;

pub struct EnsembleDecision {
    config: EnsembleConfig,
    weights: EnsembleWeights,
    update_count: u64,
    recent_rewards: Vec<f64>,
    was_present: [bool; 4],
}

impl EnsembleDecision {
    pub fn new(config: EnsembleConfig) -> Self {
        Self {
            config,
            weights: EnsembleWeights::default(),
            update_count: 0,
            recent_rewards: Vec::with_capacity(MAX_RECENT_REWARDS),
            was_present: [true; 4],
        }
    }

    pub fn from_state(config: EnsembleConfig, weights: EnsembleWeights) -> Self {
        Self {
            config,
            weights,
            update_count: 0,
            recent_rewards: Vec::with_capacity(MAX_RECENT_REWARDS),
            was_present: [true; 4],
        }
    }

    pub fn weights(&self) -> &EnsembleWeights {
        &self.weights
    }

    fn weight_for(&self, name: &str) -> f64 {
        match name {
            "linucb" => self.weights.linucb,
            "thompson" => self.weights.thompson,
            "actr" => self.weights.actr,
            "heuristic" => self.weights.heuristic,
            _ => 0.0,
        }
    }

    fn set_weight(&mut self, name: &str, value: f64) {
        match name {
            "linucb" => self.weights.linucb = value,
            "thompson" => self.weights.thompson = value,
            "actr" => self.weights.actr = value,
            "heuristic" => self.weights.heuristic = value,
            _ => {}
        }
    }

    /// Re-normalizes over active learners, scores each distinct voted action
    /// by total weighted contribution, and returns the winner plus an
    /// explanation of how each present member weighed in.
    pub fn decide(&self, votes: &EnsembleVotes) -> Option<(StrategyParams, f64, DecisionExplanation)> {
        let present: Vec<(&str, &MemberVote)> = votes
            .members()
            .into_iter()
            .filter_map(|(name, vote)| vote.as_ref().map(|v| (name, v)))
            .collect();

        if present.is_empty() {
            return None;
        }

        let total_active_weight: f64 = present.iter().map(|(name, _)| self.weight_for(name)).sum();
        if total_active_weight < 1e-9 {
            return None;
        }

        let mut factors = Vec::with_capacity(present.len());
        let mut buckets: Vec<(StrategyParams, f64, Vec<(f64, f64)>)> = Vec::new();

        for (name, vote) in &present {
            let normalized_weight = self.weight_for(name) / total_active_weight;
            let contribution =
                normalized_weight * (vote.raw_score / 2.0).tanh() * (0.5 + 0.5 * vote.confidence);

            factors.push(DecisionFactor {
                name: (*name).to_string(),
                value: vote.raw_score,
                impact: if contribution >= 0.0 { "positive".to_string() } else { "negative".to_string() },
                percentage: normalized_weight * 100.0,
            });

            match buckets.iter_mut().find(|(action, _, _)| action == &vote.action) {
                Some((_, total, members)) => {
                    *total += contribution;
                    members.push((normalized_weight, vote.confidence));
                }
                None => buckets.push((vote.action.clone(), contribution, vec![(normalized_weight, vote.confidence)])),
            }
        }

        let (winning_action, _, winning_members) = buckets
            .into_iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))?;

        let weight_sum: f64 = winning_members.iter().map(|(w, _)| w).sum();
        let confidence = if weight_sum > 1e-9 {
            winning_members.iter().map(|(w, c)| w * c).sum::<f64>() / weight_sum
        } else {
            0.5
        };

        let changes = present
            .iter()
            .filter(|(_, vote)| vote.action == winning_action)
            .map(|(name, _)| format!("{name} agreed with the selected action"))
            .collect();

        let explanation = DecisionExplanation {
            factors,
            changes,
            text: format!(
                "ensemble selected difficulty={:?} batch_size={} from {} active member(s)",
                winning_action.difficulty,
                winning_action.batch_size,
                present.len()
            ),
        };

        Some((winning_action, confidence.clamp(0.0, 1.0), explanation))
    }

    /// Adaptive-LR multiplicative weight update driven by which member
    /// agreed with the action actually executed and the reward it earned.
    pub fn update_weights(&mut self, votes: &EnsembleVotes, executed: &StrategyParams, reward: f64) {
        let reward = reward.clamp(-1.0, 1.0);
        if self.recent_rewards.len() >= MAX_RECENT_REWARDS {
            self.recent_rewards.remove(0);
        }
        self.recent_rewards.push(reward);
        self.update_count += 1;

        let sigma = Self::std_dev(&self.recent_rewards);
        let lr = (self.config.learning_rate
            * (0.3 + 0.7 * (-(self.update_count as f64) / 100.0).exp())
            * (1.0 + 0.5 * sigma))
            .clamp(0.1, 0.5);

        for (index, (name, vote)) in votes.members().into_iter().enumerate() {
            let current = self.weight_for(name);
            let recovered = vote.is_some() && !self.was_present[index];

            let mut updated = if let Some(vote) = vote {
                let boosted = if recovered { (current * 1.05).min(0.35) } else { current };
                let alignment = if vote.action == *executed { 1.0 } else { -0.5 };
                let gradient = reward * alignment * (0.5 + 0.5 * vote.confidence);
                boosted * (lr * gradient).exp()
            } else {
                (self.config.decay_rate * current).max(2.0 * self.config.min_weight)
            };

            if !updated.is_finite() || updated <= 0.0 {
                updated = self.config.min_weight;
            }
            self.set_weight(name, updated);
            self.was_present[index] = vote.is_some();
        }

        self.renormalize();
    }

    fn std_dev(values: &[f64]) -> f64 {
        if values.len() < 2 {
            return 0.0;
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
        variance.sqrt()
    }

    /// Clip-then-rescale renormalization; resets to the prior when clipping
    /// would otherwise touch every member.
    fn renormalize(&mut self) {
        for _ in 0..4 {
            let mut vals = [
                self.weights.linucb,
                self.weights.thompson,
                self.weights.actr,
                self.weights.heuristic,
            ];
            let min_weight = self.config.min_weight;
            let clipped: Vec<usize> = vals
                .iter()
                .enumerate()
                .filter(|(_, v)| **v < min_weight)
                .map(|(i, _)| i)
                .collect();

            if clipped.len() >= self.config.clip_reset_count {
                warn!("ensemble weights collapsed below floor on every member, resetting to prior");
                self.weights = EnsembleWeights::default();
                return;
            }

            let clipped_total = clipped.len() as f64 * min_weight;
            let remaining_sum: f64 = vals
                .iter()
                .enumerate()
                .filter(|(i, _)| !clipped.contains(i))
                .map(|(_, v)| *v)
                .sum();
            let target_remaining = (1.0 - clipped_total).max(0.0);

            let mut changed = false;
            for (i, v) in vals.iter_mut().enumerate() {
                if clipped.contains(&i) {
                    if (*v - min_weight).abs() > 1e-12 {
                        changed = true;
                    }
                    *v = min_weight;
                } else if remaining_sum > 1e-9 {
                    let rescaled = *v / remaining_sum * target_remaining;
                    if (rescaled - *v).abs() > 1e-12 {
                        changed = true;
                    }
                    *v = rescaled;
                }
            }

            self.weights = EnsembleWeights {
                linucb: vals[0],
                thompson: vals[1],
                actr: vals[2],
                heuristic: vals[3],
            };

            if !changed {
                break;
            }
        }
    }
}

impl Default for EnsembleDecision {
    fn default() -> Self {
        Self::new(EnsembleConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DifficultyLevel;

    fn action(difficulty: DifficultyLevel) -> StrategyParams {
        StrategyParams { difficulty, ..StrategyParams::default() }
    }

    fn vote(action: StrategyParams, raw_score: f64, confidence: f64) -> MemberVote {
        MemberVote { action, raw_score, confidence }
    }

    #[test]
    fn decide_returns_none_with_no_votes() {
        let ensemble = EnsembleDecision::default();
        assert!(ensemble.decide(&EnsembleVotes::default()).is_none());
    }

    #[test]
    fn decide_picks_the_action_with_highest_weighted_contribution() {
        let ensemble = EnsembleDecision::default();
        let votes = EnsembleVotes {
            linucb: Some(vote(action(DifficultyLevel::Hard), 1.5, 0.9)),
            thompson: Some(vote(action(DifficultyLevel::Easy), 0.1, 0.3)),
            actr: None,
            heuristic: None,
        };
        let (winner, confidence, explanation) = ensemble.decide(&votes).unwrap();
        assert_eq!(winner.difficulty, DifficultyLevel::Hard);
        assert!((0.0..=1.0).contains(&confidence));
        assert!(!explanation.factors.is_empty());
    }

    #[test]
    fn decide_aggregates_agreeing_members_into_one_bucket() {
        let ensemble = EnsembleDecision::default();
        let agreed = action(DifficultyLevel::Mid);
        let votes = EnsembleVotes {
            linucb: Some(vote(agreed.clone(), 0.3, 0.6)),
            thompson: Some(vote(agreed.clone(), 0.2, 0.6)),
            actr: Some(vote(action(DifficultyLevel::Hard), 1.0, 0.9)),
            heuristic: None,
        };
        let (winner, _, _) = ensemble.decide(&votes).unwrap();
        assert_eq!(winner.difficulty, DifficultyLevel::Mid);
    }

    #[test]
    fn update_weights_rewards_the_member_that_agreed_with_the_executed_action() {
        let mut ensemble = EnsembleDecision::default();
        let executed = action(DifficultyLevel::Hard);
        let votes = EnsembleVotes {
            linucb: Some(vote(action(DifficultyLevel::Hard), 1.0, 0.9)),
            thompson: Some(vote(action(DifficultyLevel::Easy), 1.0, 0.9)),
            actr: Some(vote(action(DifficultyLevel::Easy), 1.0, 0.9)),
            heuristic: Some(vote(action(DifficultyLevel::Easy), 1.0, 0.9)),
        };
        let linucb_before = ensemble.weights().linucb;
        ensemble.update_weights(&votes, &executed, 0.8);
        assert!(ensemble.weights().linucb > linucb_before);
    }

    #[test]
    fn update_weights_decays_absent_members() {
        let mut ensemble = EnsembleDecision::default();
        let executed = action(DifficultyLevel::Mid);
        let votes = EnsembleVotes {
            linucb: Some(vote(executed.clone(), 1.0, 0.9)),
            thompson: None,
            actr: Some(vote(executed.clone(), 1.0, 0.9)),
            heuristic: Some(vote(executed.clone(), 1.0, 0.9)),
        };
        let thompson_before = ensemble.weights().thompson;
        ensemble.update_weights(&votes, &executed, 0.5);
        assert!(ensemble.weights().thompson < thompson_before);
    }

    #[test]
    fn weights_always_sum_to_one_after_update() {
        let mut ensemble = EnsembleDecision::default();
        let executed = action(DifficultyLevel::Mid);
        let votes = EnsembleVotes {
            linucb: Some(vote(action(DifficultyLevel::Hard), 1.0, 0.9)),
            thompson: Some(vote(action(DifficultyLevel::Easy), -1.0, 0.9)),
            actr: Some(vote(executed.clone(), 0.5, 0.9)),
            heuristic: None,
        };
        for _ in 0..20 {
            ensemble.update_weights(&votes, &executed, -0.7);
        }
        let w = ensemble.weights();
        let sum = w.linucb + w.thompson + w.actr + w.heuristic;
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(w.linucb >= ensemble.config.min_weight - 1e-9);
        assert!(w.thompson >= ensemble.config.min_weight - 1e-9);
        assert!(w.actr >= ensemble.config.min_weight - 1e-9);
        assert!(w.heuristic >= ensemble.config.min_weight - 1e-9);
    }

    #[test]
    fn recovered_member_gets_a_one_shot_boost() {
        let mut ensemble = EnsembleDecision::default();
        let executed = action(DifficultyLevel::Mid);
        let absent_votes = EnsembleVotes {
            linucb: Some(vote(executed.clone(), 1.0, 0.9)),
            thompson: None,
            actr: Some(vote(executed.clone(), 1.0, 0.9)),
            heuristic: Some(vote(executed.clone(), 1.0, 0.9)),
        };
        ensemble.update_weights(&absent_votes, &executed, 0.0);
        let before_recovery = ensemble.weights().thompson;

        let recovered_votes = EnsembleVotes {
            linucb: Some(vote(executed.clone(), 1.0, 0.9)),
            thompson: Some(vote(executed.clone(), 1.0, 0.9)),
            actr: Some(vote(executed.clone(), 1.0, 0.9)),
            heuristic: Some(vote(executed.clone(), 1.0, 0.9)),
        };
        ensemble.update_weights(&recovered_votes, &executed, 0.0);
        assert!(ensemble.weights().thompson > before_recovery);
    }
}
