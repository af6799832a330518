use crate::config::FatigueParams;

#[derive(Debug, Clone)]
pub struct FatigueFeatures {
    pub error_rate_trend: f64,
    pub rt_increase_rate: f64,
    pub repeat_errors: i32,
    pub break_minutes: Option<f64>,
}

impl Default for FatigueFeatures {
    fn default() -> Self {
        Self {
            error_rate_trend: 0.0,
            rt_increase_rate: 0.0,
            repeat_errors: 0,
            break_minutes: None,
        }
    }
}

/// C2's fatigue channel: accumulates from error/RT signals, decays
/// exponentially between events, and resets on a long break.
pub struct FatigueEstimator {
    params: FatigueParams,
    current_value: f64,
    last_update_ts: i64,
}

impl FatigueEstimator {
    pub fn new(params: FatigueParams) -> Self {
        Self {
            params,
            current_value: 0.0,
            last_update_ts: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn update(&mut self, features: FatigueFeatures) -> f64 {
        if let Some(break_min) = features.break_minutes {
            if break_min >= self.params.long_break_threshold {
                self.current_value = 0.0;
                self.last_update_ts = chrono::Utc::now().timestamp_millis();
                return self.current_value;
            }
        }

        let error_component = self.params.beta * features.error_rate_trend.max(0.0);
        let rt_component = self.params.gamma * features.rt_increase_rate.max(0.0);
        let repeat_component = self.params.delta * (features.repeat_errors as f64 / 5.0).min(1.0);

        let delta_fatigue = error_component + rt_component + repeat_component;
        let decay = (-self.params.k).exp();

        self.current_value = (self.current_value * decay + delta_fatigue).clamp(0.0, 1.0);
        self.last_update_ts = chrono::Utc::now().timestamp_millis();

        self.current_value
    }

    pub fn current(&self) -> f64 {
        self.current_value
    }

    pub fn reset(&mut self) {
        self.current_value = 0.0;
        self.last_update_ts = chrono::Utc::now().timestamp_millis();
    }

    pub fn set_value(&mut self, value: f64) {
        self.current_value = value.clamp(0.0, 1.0);
    }

    pub fn apply_time_decay(&mut self, elapsed_minutes: f64) {
        let decay_factor = (-self.params.k * elapsed_minutes / 10.0).exp();
        self.current_value *= decay_factor;
    }
}

impl Default for FatigueEstimator {
    fn default() -> Self {
        Self::new(FatigueParams::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_errors_accumulate_fatigue() {
        let mut estimator = FatigueEstimator::default();
        for _ in 0..10 {
            estimator.update(FatigueFeatures {
                error_rate_trend: 0.8,
                rt_increase_rate: 0.5,
                repeat_errors: 3,
                break_minutes: None,
            });
        }
        assert!(estimator.current() > 0.3);
    }

    #[test]
    fn long_break_resets_fatigue() {
        let mut estimator = FatigueEstimator::default();
        estimator.set_value(0.9);
        let value = estimator.update(FatigueFeatures {
            error_rate_trend: 0.0,
            rt_increase_rate: 0.0,
            repeat_errors: 0,
            break_minutes: Some(30.0),
        });
        assert_eq!(value, 0.0);
    }

    #[test]
    fn time_decay_reduces_fatigue() {
        let mut estimator = FatigueEstimator::default();
        estimator.set_value(0.8);
        estimator.apply_time_decay(20.0);
        assert!(estimator.current() < 0.8);
    }

    #[test]
    fn reset_zeroes_fatigue() {
        let mut estimator = FatigueEstimator::default();
        estimator.set_value(0.5);
        estimator.reset();
        assert_eq!(estimator.current(), 0.0);
    }
}
