use crate::config::AttentionWeights;

#[derive(Debug, Clone)]
pub struct AttentionFeatures {
    pub rt_mean: f64,
    pub rt_cv: f64,
    pub pace_cv: f64,
    pub pause_count: f64,
    pub switch_count: f64,
    pub drift: f64,
    pub interaction_density: f64,
    pub focus_loss: f64,
}

impl Default for AttentionFeatures {
    fn default() -> Self {
        Self {
            rt_mean: 0.5,
            rt_cv: 0.0,
            pace_cv: 0.0,
            pause_count: 0.0,
            switch_count: 0.0,
            drift: 0.0,
            interaction_density: 0.5,
            focus_loss: 0.0,
        }
    }
}

/// Logistic steepness for `A_raw = sigmoid(STEEPNESS * (0.5 - weighted_badness))`,
/// centered so a weighted badness of exactly 0.5 gives a neutral 0.5 reading.
const STEEPNESS: f64 = 6.0;

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// C2's attention channel: an 8-weighted-subfeature "badness" blend passed
/// through a logistic transform to bound the raw reading, then
/// exponentially smoothed so a single noisy event can't swing the readout.
pub struct AttentionMonitor {
    weights: AttentionWeights,
    smoothing: f64,
    current_value: f64,
}

impl AttentionMonitor {
    pub fn new(weights: AttentionWeights, smoothing: f64) -> Self {
        Self {
            weights,
            smoothing,
            current_value: 0.7,
        }
    }

    pub fn update(&mut self, features: AttentionFeatures) -> f64 {
        let rt_badness = features.rt_mean.clamp(0.0, 1.0);
        let cv_badness = features.rt_cv.clamp(0.0, 1.0);
        let pace_badness = features.pace_cv.clamp(0.0, 1.0);
        let pause_badness = features.pause_count.clamp(0.0, 1.0);
        let switch_badness = features.switch_count.clamp(0.0, 1.0);
        let drift_badness = features.drift.clamp(0.0, 1.0);
        let interaction_badness = 1.0 - features.interaction_density.clamp(0.0, 1.0);
        let focus_badness = features.focus_loss.clamp(0.0, 1.0);

        let weighted_badness = self.weights.rt_mean * rt_badness
            + self.weights.rt_cv * cv_badness
            + self.weights.pace_cv * pace_badness
            + self.weights.pause * pause_badness
            + self.weights.switch * switch_badness
            + self.weights.drift * drift_badness
            + self.weights.interaction * interaction_badness
            + self.weights.focus_loss * focus_badness;

        let raw_attention = sigmoid(STEEPNESS * (0.5 - weighted_badness));

        let smoothed = self.smoothing * raw_attention + (1.0 - self.smoothing) * self.current_value;
        self.current_value = smoothed.clamp(0.0, 1.0);
        self.current_value
    }

    pub fn current(&self) -> f64 {
        self.current_value
    }

    pub fn reset(&mut self) {
        self.current_value = 0.7;
    }
}

impl Default for AttentionMonitor {
    fn default() -> Self {
        Self::new(AttentionWeights::default(), 0.4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_accurate_input_raises_attention() {
        let mut monitor = AttentionMonitor::default();
        for _ in 0..10 {
            monitor.update(AttentionFeatures {
                rt_mean: 0.1,
                rt_cv: 0.05,
                pace_cv: 0.05,
                pause_count: 0.0,
                switch_count: 0.0,
                drift: 0.0,
                interaction_density: 0.9,
                focus_loss: 0.0,
            });
        }
        assert!(monitor.current() > 0.7);
    }

    #[test]
    fn distracted_input_lowers_attention() {
        let mut monitor = AttentionMonitor::default();
        for _ in 0..10 {
            monitor.update(AttentionFeatures {
                rt_mean: 0.9,
                rt_cv: 0.8,
                pace_cv: 0.8,
                pause_count: 0.9,
                switch_count: 0.9,
                drift: 0.9,
                interaction_density: 0.1,
                focus_loss: 0.9,
            });
        }
        assert!(monitor.current() < 0.3);
    }

    #[test]
    fn reset_returns_to_baseline() {
        let mut monitor = AttentionMonitor::default();
        monitor.update(AttentionFeatures::default());
        monitor.reset();
        assert_eq!(monitor.current(), 0.7);
    }

    #[test]
    fn output_always_in_unit_range() {
        let mut monitor = AttentionMonitor::default();
        for _ in 0..50 {
            let value = monitor.update(AttentionFeatures {
                rt_mean: 1.5,
                rt_cv: -0.5,
                ..AttentionFeatures::default()
            });
            assert!((0.0..=1.0).contains(&value));
        }
    }
}
