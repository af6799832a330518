//! Integration tests across the decision layer (C5-C9): each learner wired
//! up the way `engine.rs` wires it, exercised end to end rather than in
//! isolation. Per-module edge cases already live in each file's own
//! `#[cfg(test)]` block; these tests check that the pieces cooperate.

use amas_engine::config::{ActrParams, ColdStartConfig, EnsembleConfig};
use amas_engine::decision::actr::ActrModel;
use amas_engine::decision::coldstart::ColdStartManager;
use amas_engine::decision::ensemble::{EnsembleDecision, EnsembleVotes, MemberVote};
use amas_engine::decision::heuristic::HeuristicLearner;
use amas_engine::decision::linucb::{BanditContext, LinUcbModel, CONTEXT_DIM};
use amas_engine::decision::mapper::DecisionMapper;
use amas_engine::decision::thompson::ThompsonSamplingModel;
use amas_engine::types::{action_space, CognitiveProfile, DifficultyLevel, StrategyParams, UserState};

fn sample_strategy() -> StrategyParams {
    StrategyParams { difficulty: DifficultyLevel::Mid, new_ratio: 0.2, batch_size: 8, interval_scale: 1.0, hint_level: 1 }
}

fn sample_state() -> UserState {
    UserState { attention: 0.7, fatigue: 0.3, cognitive: CognitiveProfile::default(), motivation: 0.5, trend: None, conf: 0.5, ts: 0 }
}

#[test]
fn linucb_select_then_update_shifts_future_scores() {
    let mut model = LinUcbModel::new(CONTEXT_DIM, 0.001);
    let state = sample_state();
    let ctx = BanditContext::default();
    let candidates = action_space();

    let (action, ucb_before, _) = model.select_action(&state, &ctx, &candidates).unwrap();
    model.update(&state, &ctx, &action.clone().into(), 1.0);
    let (_, ucb_after, _) = model.select_action(&state, &ctx, &candidates).unwrap();

    // A strong positive reward should not leave the posterior unchanged.
    assert_ne!(ucb_before, ucb_after);
}

#[test]
fn linucb_migrate_dimensions_preserves_alpha() {
    let mut model = LinUcbModel::new(10, 0.001);
    model.alpha = 1.7;
    model.migrate_dimensions(16);
    assert_eq!(model.d, 16);
    assert_eq!(model.alpha, 1.7);
}

#[test]
fn thompson_select_and_update_round_trip() {
    let mut model = ThompsonSamplingModel::default();
    let state = sample_state();
    let candidates = action_space();

    let (picked, _) = model.select_action(&state, &candidates).unwrap();
    model.update(&state, &picked, 1.0);
    let confidence = model.get_confidence(&state, &picked);
    assert!((0.0..=1.0).contains(&confidence));
}

#[test]
fn actr_activation_rises_with_more_correct_reviews() {
    let mut model = ActrModel::new(ActrParams::default());
    let decay = model.personalized_decay(&CognitiveProfile::default());
    assert_eq!(model.activation(decay), f64::NEG_INFINITY);

    model.record_review(5.0, true);
    let after_one = model.activation(decay);
    model.record_review(1.0, true);
    let after_two = model.activation(decay);

    assert!(after_one.is_finite());
    assert!(after_two > after_one);
}

#[test]
fn heuristic_prefers_easier_strategy_under_high_fatigue() {
    let learner = HeuristicLearner::default();
    let mut state = sample_state();
    state.fatigue = 0.9;
    let current = StrategyParams { difficulty: DifficultyLevel::Hard, ..sample_strategy() };

    let preferred = learner.preferred_strategy(&state, &current);
    assert_ne!(preferred.difficulty, DifficultyLevel::Hard);
    assert!(preferred.batch_size <= current.batch_size);
}

#[test]
fn ensemble_decide_returns_none_with_no_votes() {
    let ensemble = EnsembleDecision::new(EnsembleConfig::default());
    let votes = EnsembleVotes::default();
    assert!(ensemble.decide(&votes).is_none());
}

#[test]
fn ensemble_decide_picks_the_single_available_vote() {
    let ensemble = EnsembleDecision::new(EnsembleConfig::default());
    let mut votes = EnsembleVotes::default();
    let action = sample_strategy();
    votes.linucb = Some(MemberVote { action: action.clone(), raw_score: 0.8, confidence: 0.9 });

    let (picked, confidence, _) = ensemble.decide(&votes).unwrap();
    assert_eq!(picked, action);
    assert!(confidence > 0.0);
}

#[test]
fn ensemble_weight_update_rewards_agreement_with_the_executed_action() {
    let mut ensemble = EnsembleDecision::new(EnsembleConfig::default());
    let mut votes = EnsembleVotes::default();
    let action = sample_strategy();
    votes.linucb = Some(MemberVote { action: action.clone(), raw_score: 0.9, confidence: 0.9 });
    votes.heuristic = Some(MemberVote {
        action: StrategyParams { difficulty: DifficultyLevel::Hard, ..action.clone() },
        raw_score: -0.5,
        confidence: 0.5,
    });

    let before = ensemble.weights().linucb;
    ensemble.update_weights(&votes, &action, 1.0);
    let after = ensemble.weights().linucb;

    assert!(after >= before);
}

#[test]
fn cold_start_manager_starts_in_classify_and_eventually_settles() {
    let mut manager = ColdStartManager::new(ColdStartConfig::default());
    assert!(!manager.is_completed());

    for i in 0..200 {
        manager.update(0.8, 1200 + (i % 5) * 50);
        if manager.is_completed() {
            break;
        }
    }

    assert!(manager.is_completed());
    assert!(manager.user_type().is_some());
}

#[test]
fn mapper_applies_fatigue_protection_over_a_raw_aggressive_action() {
    let mapper = DecisionMapper::new(0.5);
    let mut state = sample_state();
    state.fatigue = 0.95;

    let current = sample_strategy();
    let aggressive = StrategyParams { batch_size: 16, new_ratio: 0.4, difficulty: DifficultyLevel::Hard, ..current.clone() };

    let mapped = mapper.map(&current, &aggressive, &state);

    assert!(mapped.batch_size < aggressive.batch_size);
    assert_ne!(mapped.difficulty, DifficultyLevel::Hard);
    assert!(DecisionMapper::should_force_break(&state));
}
