use std::collections::VecDeque;

use crate::config::TrendParams;
use crate::types::TrendState;

const MS_PER_DAY: f64 = 86_400_000.0;
const RING_CAPACITY: usize = 128;

#[derive(Debug, Clone, Copy)]
struct Sample {
    ts_ms: i64,
    ability: f64,
}

/// C2's optional trend channel: a ring buffer of `(ts, ability)` samples.
/// Once enough samples span enough calendar time, the slope is a proper
/// linear regression of ability on days; otherwise it falls back to a
/// 7-day-time-constant EMA of the day-over-day delta, which tolerates sparse
/// early history without overreacting to a single noisy event.
pub struct TrendAnalyzer {
    params: TrendParams,
    history: VecDeque<Sample>,
    ema_slope: f64,
    last_sample: Option<Sample>,
    current_trend: TrendState,
}

impl TrendAnalyzer {
    pub fn new(params: TrendParams) -> Self {
        Self {
            params,
            history: VecDeque::with_capacity(RING_CAPACITY),
            ema_slope: 0.0,
            last_sample: None,
            current_trend: TrendState::Flat,
        }
    }

    pub fn update(&mut self, ability: f64, ts_ms: i64) -> TrendState {
        let ability = ability.clamp(0.0, 1.0);
        let sample = Sample { ts_ms, ability };

        if let Some(prev) = self.last_sample {
            let elapsed_days = ((ts_ms - prev.ts_ms) as f64 / MS_PER_DAY).max(1e-6);
            let instantaneous_slope = (ability - prev.ability) / elapsed_days;
            // EMA with a 7-day time constant: weight decays toward 0 as the
            // gap between samples grows relative to 7 days.
            let alpha = 1.0 - (-elapsed_days / 7.0).exp();
            self.ema_slope = alpha * instantaneous_slope + (1.0 - alpha) * self.ema_slope;
        }
        self.last_sample = Some(sample);

        self.history.push_back(sample);
        if self.history.len() > RING_CAPACITY.min(self.params.window_size.max(10)) {
            self.history.pop_front();
        }

        self.current_trend = self.classify();
        self.current_trend
    }

    fn classify(&self) -> TrendState {
        if self.history.len() < self.params.min_samples.max(2) {
            return TrendState::Flat;
        }

        let span_days = self.span_days();
        let slope = if self.history.len() >= 10 && span_days >= self.params.min_day_span * 30.0 {
            self.regression_slope()
        } else {
            self.ema_slope
        };
        let volatility = self.volatility();

        if slope > self.params.up_threshold {
            TrendState::Up
        } else if slope < -self.params.down_threshold.abs() {
            TrendState::Down
        } else if slope.abs() <= 0.005 && volatility < 0.05 {
            TrendState::Flat
        } else {
            TrendState::Stuck
        }
    }

    fn span_days(&self) -> f64 {
        match (self.history.front(), self.history.back()) {
            (Some(first), Some(last)) => (last.ts_ms - first.ts_ms) as f64 / MS_PER_DAY,
            _ => 0.0,
        }
    }

    fn regression_slope(&self) -> f64 {
        let first_ts = self.history.front().map(|s| s.ts_ms).unwrap_or(0);
        let points: Vec<(f64, f64)> = self
            .history
            .iter()
            .map(|s| ((s.ts_ms - first_ts) as f64 / MS_PER_DAY, s.ability))
            .collect();

        let n = points.len() as f64;
        let sum_x: f64 = points.iter().map(|(x, _)| x).sum();
        let sum_y: f64 = points.iter().map(|(_, y)| y).sum();
        let sum_xy: f64 = points.iter().map(|(x, y)| x * y).sum();
        let sum_xx: f64 = points.iter().map(|(x, _)| x * x).sum();

        let denom = n * sum_xx - sum_x * sum_x;
        if denom.abs() < 1e-9 {
            return 0.0;
        }
        (n * sum_xy - sum_x * sum_y) / denom
    }

    fn volatility(&self) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }
        let mean = self.history.iter().map(|s| s.ability).sum::<f64>() / self.history.len() as f64;
        let variance = self
            .history
            .iter()
            .map(|s| (s.ability - mean).powi(2))
            .sum::<f64>()
            / self.history.len() as f64;
        variance.sqrt()
    }

    pub fn current(&self) -> Option<TrendState> {
        if self.history.len() < self.params.min_samples.max(2) {
            None
        } else {
            Some(self.current_trend)
        }
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.ema_slope = 0.0;
        self.last_sample = None;
        self.current_trend = TrendState::Flat;
    }
}

impl Default for TrendAnalyzer {
    fn default() -> Self {
        Self::new(TrendParams::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY_MS: i64 = 86_400_000;

    #[test]
    fn insufficient_samples_returns_none() {
        let mut analyzer = TrendAnalyzer::default();
        analyzer.update(0.5, 0);
        assert!(analyzer.current().is_none());
    }

    #[test]
    fn rising_ability_classifies_up() {
        let mut analyzer = TrendAnalyzer::default();
        for i in 0..20 {
            analyzer.update(0.3 + i as f64 * 0.03, i * DAY_MS);
        }
        assert_eq!(analyzer.current(), Some(TrendState::Up));
    }

    #[test]
    fn falling_ability_classifies_down() {
        let mut analyzer = TrendAnalyzer::default();
        for i in 0..20 {
            analyzer.update(0.9 - i as f64 * 0.03, i * DAY_MS);
        }
        assert_eq!(analyzer.current(), Some(TrendState::Down));
    }

    #[test]
    fn stable_ability_classifies_flat() {
        let mut analyzer = TrendAnalyzer::default();
        for i in 0..20 {
            analyzer.update(0.6, i * DAY_MS);
        }
        assert_eq!(analyzer.current(), Some(TrendState::Flat));
    }

    #[test]
    fn noisy_flat_ability_classifies_stuck() {
        let mut analyzer = TrendAnalyzer::default();
        for i in 0..20 {
            let noise = if i % 2 == 0 { 0.2 } else { -0.2 };
            analyzer.update((0.5 + noise).clamp(0.0, 1.0), i * DAY_MS);
        }
        assert_eq!(analyzer.current(), Some(TrendState::Stuck));
    }

    #[test]
    fn reset_clears_history() {
        let mut analyzer = TrendAnalyzer::default();
        analyzer.update(0.5, 0);
        analyzer.reset();
        assert!(analyzer.current().is_none());
    }
}
