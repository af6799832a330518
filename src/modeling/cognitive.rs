use std::collections::VecDeque;

use crate::config::CognitiveParams;
use crate::types::CognitiveProfile;

/// Per-event input C1 hands to the cognitive modeler.
#[derive(Debug, Clone)]
pub struct CognitiveInput {
    pub accuracy: f64,
    pub avg_response_time: i64,
    pub error_variance: f64,
}

impl Default for CognitiveInput {
    fn default() -> Self {
        Self {
            accuracy: 0.8,
            avg_response_time: 3000,
            error_variance: 0.1,
        }
    }
}

/// C2's cognitive channel. Blends a short-term readout (this event's
/// accuracy/speed/variance) into a long-run EMA, then blends short/long with
/// a weight that grows from 0 toward 1 as `n` interactions accumulate
/// (`lambda = 1 - exp(-n/k0)`), so early events lean on the noisier
/// short-term signal and settle onto the long-run estimate as data arrives.
pub struct CognitiveProfiler {
    params: CognitiveParams,
    long_term: CognitiveProfile,
    profile: CognitiveProfile,
    history: VecDeque<f64>,
    n: u64,
}

impl CognitiveProfiler {
    pub fn new(params: CognitiveParams) -> Self {
        Self {
            params,
            long_term: CognitiveProfile::default(),
            profile: CognitiveProfile::default(),
            history: VecDeque::with_capacity(64),
            n: 0,
        }
    }

    pub fn update(&mut self, input: CognitiveInput) -> CognitiveProfile {
        self.n += 1;
        self.history.push_back(input.accuracy);
        if self.history.len() > self.params.stability_window {
            self.history.pop_front();
        }

        let ref_rt = self.params.speed_baseline_ms.max(1.0);
        let speed_short = (input.avg_response_time as f64 / ref_rt).clamp(0.0, 2.0);
        let speed_short = (1.0 - (speed_short - 1.0).max(0.0)).clamp(0.0, 1.0);
        let variance_short = (1.0 - input.error_variance.max(0.0)).clamp(0.0, 1.0);

        let short_term = CognitiveProfile {
            mem: input.accuracy.clamp(0.0, 1.0),
            speed: speed_short,
            stability: variance_short,
        };

        let beta = 0.9;
        self.long_term.mem = beta * self.long_term.mem + (1.0 - beta) * short_term.mem;
        self.long_term.speed = beta * self.long_term.speed + (1.0 - beta) * short_term.speed;
        self.long_term.stability =
            beta * self.long_term.stability + (1.0 - beta) * short_term.stability;

        let lambda = 1.0 - (-(self.n as f64) / self.params.k0.max(1e-6)).exp();
        self.profile.mem =
            (lambda * self.long_term.mem + (1.0 - lambda) * short_term.mem).clamp(0.0, 1.0);
        self.profile.speed =
            (lambda * self.long_term.speed + (1.0 - lambda) * short_term.speed).clamp(0.0, 1.0);
        self.profile.stability = (lambda * self.long_term.stability
            + (1.0 - lambda) * short_term.stability)
            .clamp(0.0, 1.0);

        self.profile.clone()
    }

    pub fn current(&self) -> &CognitiveProfile {
        &self.profile
    }

    pub fn reset(&mut self) {
        self.long_term = CognitiveProfile::default();
        self.profile = CognitiveProfile::default();
        self.history.clear();
        self.n = 0;
    }

    pub fn set_profile(&mut self, profile: CognitiveProfile) {
        self.profile = profile.clone();
        self.long_term = profile;
    }
}

impl Default for CognitiveProfiler {
    fn default() -> Self {
        Self::new(CognitiveParams::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accurate_fast_input_raises_mem_and_speed() {
        let mut profiler = CognitiveProfiler::default();
        for _ in 0..20 {
            profiler.update(CognitiveInput {
                accuracy: 0.95,
                avg_response_time: 1000,
                error_variance: 0.02,
            });
        }
        assert!(profiler.current().mem > 0.7);
        assert!(profiler.current().speed > 0.5);
    }

    #[test]
    fn lambda_shifts_weight_toward_long_term_over_time() {
        let mut profiler = CognitiveProfiler::default();
        profiler.update(CognitiveInput {
            accuracy: 1.0,
            avg_response_time: 500,
            error_variance: 0.0,
        });
        let early = profiler.current().mem;
        for _ in 0..50 {
            profiler.update(CognitiveInput {
                accuracy: 0.2,
                avg_response_time: 5000,
                error_variance: 0.5,
            });
        }
        let late = profiler.current().mem;
        assert!(late < early);
    }

    #[test]
    fn output_always_in_unit_range() {
        let mut profiler = CognitiveProfiler::default();
        for _ in 0..30 {
            let profile = profiler.update(CognitiveInput {
                accuracy: 1.5,
                avg_response_time: -100,
                error_variance: -1.0,
            });
            assert!((0.0..=1.0).contains(&profile.mem));
            assert!((0.0..=1.0).contains(&profile.speed));
            assert!((0.0..=1.0).contains(&profile.stability));
        }
    }

    #[test]
    fn reset_restores_defaults() {
        let mut profiler = CognitiveProfiler::default();
        profiler.update(CognitiveInput::default());
        profiler.reset();
        let profile = profiler.current();
        assert_eq!(profile.mem, 0.5);
        assert_eq!(profile.speed, 0.5);
        assert_eq!(profile.stability, 0.5);
    }
}
