//! Cold-start finite state machine (C8): Classify -> Explore -> Normal.
//! Classify cycles a fixed probe sequence and only classifies once, at the
//! sequence's end, from the accumulated probe stats. Explore never
//! re-derives a strategy from live accuracy; it returns the strategy
//! settled on at the Classify -> Explore boundary until enough explore
//! samples have passed, then hands off to Normal. A continuous profile
//! tracker (teacher's `ContinuousUserProfile`) runs alongside both phases
//! and takes over once it is confident.

use crate::config::ColdStartConfig;
use crate::types::{
    ColdStartPhase, ColdStartState, ContinuousUserProfile, StrategyParams, UserType,
};

#[derive(Debug, Clone, Default)]
pub struct ColdStartSignals {
    pub attention: f64,
    pub motivation: f64,
    pub cognitive_mem: f64,
    pub rt_variance: f64,
    pub has_signals: bool,
}

pub struct ColdStartManager {
    config: ColdStartConfig,
    state: ColdStartState,
}

impl ColdStartManager {
    pub fn new(config: ColdStartConfig) -> Self {
        Self {
            config,
            state: ColdStartState::default(),
        }
    }

    pub fn from_state(config: ColdStartConfig, state: ColdStartState) -> Self {
        Self { config, state }
    }

    pub fn update(&mut self, accuracy: f64, response_time: i64) -> Option<StrategyParams> {
        self.update_with_signals(accuracy, response_time, &ColdStartSignals::default())
    }

    pub fn update_with_signals(
        &mut self,
        accuracy: f64,
        response_time: i64,
        signals: &ColdStartSignals,
    ) -> Option<StrategyParams> {
        self.update_continuous_profile(accuracy, response_time, signals);

        match self.state.phase {
            ColdStartPhase::Classify => self.handle_classify(accuracy, response_time),
            ColdStartPhase::Explore => self.handle_explore(),
            ColdStartPhase::Normal => self.handle_normal(),
        }
    }

    fn update_continuous_profile(
        &mut self,
        accuracy: f64,
        response_time: i64,
        signals: &ColdStartSignals,
    ) {
        let profile = self
            .state
            .continuous_profile
            .get_or_insert_with(ContinuousUserProfile::default);
        profile.update(accuracy, response_time, signals.attention, signals.motivation);
    }

    fn handle_normal(&self) -> Option<StrategyParams> {
        if let Some(ref profile) = self.state.continuous_profile {
            if profile.min_confidence() > 0.6 {
                return Some(profile.to_strategy());
            }
        }
        self.state.settled_strategy.clone()
    }

    /// Cycles the fixed probe sequence, accumulating accuracy/response-time
    /// sums. Classification happens exactly once, at `classify_samples`
    /// probes, never earlier and never by re-scoring mid-sequence.
    fn handle_classify(&mut self, accuracy: f64, response_time: i64) -> Option<StrategyParams> {
        self.state.probe_accuracy_sum += accuracy;
        self.state.probe_rt_sum += response_time as f64;
        self.state.update_count += 1;

        if self.state.update_count >= self.config.classify_samples {
            let user_type = self.classify_from_probes();
            self.state.user_type = Some(user_type);

            if self.state.continuous_profile.is_none() {
                self.state.continuous_profile = Some(ContinuousUserProfile::from_user_type(user_type));
            }

            self.state.phase = ColdStartPhase::Explore;
            self.state.probe_index = 0;
            self.state.settled_strategy = Some(StrategyParams::for_user_type(user_type));
            return self.state.settled_strategy.clone();
        }

        let probe_idx = if self.config.probe_sequence.is_empty() {
            1
        } else {
            let probe_len = self.config.probe_sequence.len();
            self.config.probe_sequence[self.state.probe_index as usize % probe_len]
        };
        self.state.probe_index += 1;
        Some(StrategyParams::for_user_type(user_type_from_probe(probe_idx)))
    }

    fn classify_from_probes(&self) -> UserType {
        let n = self.state.update_count.max(1) as f64;
        let avg_accuracy = self.state.probe_accuracy_sum / n;
        let avg_rt = self.state.probe_rt_sum / n;

        if avg_accuracy >= self.config.fast_accuracy_threshold
            && avg_rt <= self.config.fast_rt_threshold_ms
        {
            UserType::Fast
        } else if avg_accuracy <= self.config.cautious_accuracy_threshold
            || avg_rt >= self.config.cautious_rt_threshold_ms
        {
            UserType::Cautious
        } else {
            UserType::Stable
        }
    }

    /// Always hands back the strategy settled on when Classify finished.
    /// Counts samples toward `explore_samples` and transitions to Normal
    /// once that many have passed; never re-derives the strategy from the
    /// live accuracy of individual explore-phase samples.
    fn handle_explore(&mut self) -> Option<StrategyParams> {
        self.state.probe_index += 1;
        self.state.update_count += 1;

        if self.state.settled_strategy.is_none() {
            let user_type = self.state.user_type.unwrap_or(UserType::Stable);
            self.state.settled_strategy = Some(StrategyParams::for_user_type(user_type));
        }

        if self.state.probe_index >= self.config.explore_samples {
            self.state.phase = ColdStartPhase::Normal;
        }

        self.state.settled_strategy.clone()
    }

    pub fn phase(&self) -> ColdStartPhase {
        self.state.phase
    }

    pub fn state(&self) -> &ColdStartState {
        &self.state
    }

    /// Authoritative gate for the Ensemble's phase check: once this returns
    /// `true`, decision-making hands back from the cold-start FSM to the
    /// regular vote aggregation.
    pub fn is_completed(&self) -> bool {
        matches!(self.state.phase, ColdStartPhase::Normal)
    }

    pub fn user_type(&self) -> Option<UserType> {
        self.state.user_type
    }

    pub fn settled_strategy(&self) -> Option<&StrategyParams> {
        self.state.settled_strategy.as_ref()
    }
}

fn user_type_from_probe(probe_idx: i32) -> UserType {
    match probe_idx {
        0 => UserType::Fast,
        2 => UserType::Cautious,
        _ => UserType::Stable,
    }
}

impl Default for ColdStartManager {
    fn default() -> Self {
        Self::new(ColdStartConfig::default())
    }
}
