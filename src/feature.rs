#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::modeling::attention::AttentionFeatures;
use crate::modeling::cognitive::CognitiveInput;
use crate::modeling::fatigue::FatigueFeatures;
use crate::modeling::motivation::MotivationEvent;
use crate::types::RawEvent;

const WINDOW_CAPACITY: usize = 50;
const USER_TTL: Duration = Duration::from_secs(30 * 60);
const MAX_TRACKED_USERS: usize = 10_000;

/// Per-channel `(mean, std)` the z-score normalizer centers on. Static
/// population estimates rather than per-user statistics, same as the
/// teacher's fixed min/max bounds, just re-parameterized for a z-score.
const RT_MEAN_STATS: (f64, f64) = (3_000.0, 1_500.0);
const RT_CV_STATS: (f64, f64) = (0.3, 0.2);
const PACE_CV_STATS: (f64, f64) = (0.2, 0.15);
const PAUSE_STATS: (f64, f64) = (1.0, 1.5);
const SWITCH_STATS: (f64, f64) = (1.0, 1.5);
const DRIFT_STATS: (f64, f64) = (3_000.0, 2_000.0);
const INTERACTION_STATS: (f64, f64) = (0.5, 0.25);
const FOCUS_LOSS_STATS: (f64, f64) = (0.0, 3_000.0);
const RETRY_STATS: (f64, f64) = (0.5, 1.0);

/// Labels for the 10-channel modeling vector `derive()` assembles, in the
/// order `DerivedFeatures::modeling_vector` lists them.
pub const MODELING_VECTOR_LABELS: [&str; 10] = [
    "z_rt_mean",
    "z_rt_cv",
    "z_pace_cv",
    "z_pause",
    "z_switch",
    "z_drift",
    "z_interaction",
    "z_focus_loss",
    "retry_norm",
    "correctness",
];

/// Per-user sliding window of recent interactions, the raw material C1
/// derives every downstream feature from.
struct WindowState {
    events: VecDeque<RawEvent>,
    last_seen: Instant,
}

impl WindowState {
    fn new() -> Self {
        Self {
            events: VecDeque::with_capacity(WINDOW_CAPACITY),
            last_seen: Instant::now(),
        }
    }

    fn push(&mut self, event: RawEvent) {
        self.events.push_back(event);
        if self.events.len() > WINDOW_CAPACITY {
            self.events.pop_front();
        }
        self.last_seen = Instant::now();
    }
}

/// Derives the context vector and per-modeler feature structs from a user's
/// raw interaction history (C1). Owns a bounded, TTL-evicted per-user window
/// so the orchestrator doesn't need to pass full history on every event.
pub struct FeatureBuilder {
    windows: HashMap<String, WindowState>,
}

impl FeatureBuilder {
    pub fn new() -> Self {
        Self {
            windows: HashMap::new(),
        }
    }

    /// Folds a new raw event into the user's window and returns the derived
    /// feature bundle for this event.
    pub fn observe(&mut self, user_id: &str, event: RawEvent) -> DerivedFeatures {
        self.evict_stale();
        if self.windows.len() >= MAX_TRACKED_USERS && !self.windows.contains_key(user_id) {
            self.evict_lru();
        }

        let window = self
            .windows
            .entry(user_id.to_string())
            .or_insert_with(WindowState::new);
        window.push(event.clone());

        Self::derive(&window.events, &event)
    }

    pub fn reset_user(&mut self, user_id: &str) {
        self.windows.remove(user_id);
    }

    fn evict_stale(&mut self) {
        self.windows
            .retain(|_, w| w.last_seen.elapsed() < USER_TTL);
    }

    fn evict_lru(&mut self) {
        if let Some(oldest) = self
            .windows
            .iter()
            .min_by_key(|(_, w)| w.last_seen)
            .map(|(k, _)| k.clone())
        {
            self.windows.remove(&oldest);
        }
    }

    fn derive(events: &VecDeque<RawEvent>, latest: &RawEvent) -> DerivedFeatures {
        let n = events.len().max(1) as f64;
        let response_times: Vec<f64> = events.iter().map(|e| e.response_time_ms as f64).collect();
        let rt_mean_ms = response_times.iter().sum::<f64>() / n;
        let rt_cv = coefficient_of_variation(&response_times);

        let accuracy = events.iter().filter(|e| e.is_correct).count() as f64 / n;
        let pause_count = events.iter().map(|e| e.pause_count as f64).sum::<f64>() / n;
        let switch_count = events.iter().map(|e| e.switch_count as f64).sum::<f64>() / n;

        let half = events.len() / 2;
        let pace_cv = if events.len() >= 4 {
            let first_half: Vec<f64> = events
                .iter()
                .take(half)
                .map(|e| e.response_time_ms as f64)
                .collect();
            let second_half: Vec<f64> = events
                .iter()
                .skip(half)
                .map(|e| e.response_time_ms as f64)
                .collect();
            let a = first_half.iter().sum::<f64>() / first_half.len().max(1) as f64;
            let b = second_half.iter().sum::<f64>() / second_half.len().max(1) as f64;
            if a.abs() < 1e-9 {
                0.0
            } else {
                ((b - a) / a).abs().min(1.0)
            }
        } else {
            0.0
        };

        let drift = normalize(rt_mean_ms, DRIFT_STATS.0, DRIFT_STATS.1);
        let interaction_density = latest.interaction_density.unwrap_or_else(|| {
            let dwell_ratio = latest.dwell_time_ms as f64 / (latest.response_time_ms.max(1) as f64);
            normalize(dwell_ratio, INTERACTION_STATS.0, INTERACTION_STATS.1)
        });
        let focus_loss = latest
            .focus_loss_duration_ms
            .map(|d| normalize(d as f64, FOCUS_LOSS_STATS.0, FOCUS_LOSS_STATS.1))
            .unwrap_or(0.0);

        let error_rate_trend = if events.len() >= 2 {
            let recent_errors = events
                .iter()
                .rev()
                .take(5)
                .filter(|e| !e.is_correct)
                .count() as f64;
            recent_errors / events.iter().rev().take(5).count().max(1) as f64
        } else {
            0.0
        };

        let rt_increase_rate = if events.len() >= 2 {
            let prev = events[events.len() - 2].response_time_ms as f64;
            let curr = latest.response_time_ms as f64;
            if prev.abs() < 1e-9 {
                0.0
            } else {
                ((curr - prev) / prev).max(0.0).min(1.0)
            }
        } else {
            0.0
        };

        let repeat_errors = events
            .iter()
            .rev()
            .take(3)
            .filter(|e| !e.is_correct)
            .count() as i32;

        let error_variance = variance(
            &events
                .iter()
                .map(|e| if e.is_correct { 1.0 } else { 0.0 })
                .collect::<Vec<_>>(),
        );

        let attention = AttentionFeatures {
            rt_mean: normalize(rt_mean_ms, RT_MEAN_STATS.0, RT_MEAN_STATS.1),
            rt_cv: rt_cv.min(1.0),
            pace_cv,
            pause_count: normalize(pause_count, PAUSE_STATS.0, PAUSE_STATS.1),
            switch_count: normalize(switch_count, SWITCH_STATS.0, SWITCH_STATS.1),
            drift,
            interaction_density,
            focus_loss,
        };

        let break_minutes = if events.len() >= 2 {
            let prev_ts = events[events.len() - 2].timestamp;
            Some(((latest.timestamp - prev_ts).max(0)) as f64 / 60_000.0)
        } else {
            None
        };

        let fatigue = FatigueFeatures {
            error_rate_trend,
            rt_increase_rate,
            repeat_errors,
            break_minutes,
        };

        let cognitive = CognitiveInput {
            accuracy,
            avg_response_time: rt_mean_ms as i64,
            error_variance,
        };

        // Not reported directly: a user who gives up after repeated retries
        // on a wrong answer is treated as having quit the item.
        let is_quit = !latest.is_correct && latest.retry_count >= 3;
        let motivation = MotivationEvent {
            is_correct: latest.is_correct,
            is_quit,
            streak_length: events.iter().rev().take_while(|e| e.is_correct).count() as i32,
        };

        let correctness = if latest.is_correct { 1.0 } else { 0.0 };
        let retry_norm = normalize(latest.retry_count as f64, RETRY_STATS.0, RETRY_STATS.1);
        let modeling_vector = vec![
            normalize(rt_mean_ms, RT_MEAN_STATS.0, RT_MEAN_STATS.1),
            normalize(rt_cv, RT_CV_STATS.0, RT_CV_STATS.1),
            normalize(pace_cv, PACE_CV_STATS.0, PACE_CV_STATS.1),
            normalize(pause_count, PAUSE_STATS.0, PAUSE_STATS.1),
            normalize(switch_count, SWITCH_STATS.0, SWITCH_STATS.1),
            drift,
            interaction_density,
            focus_loss,
            retry_norm,
            correctness,
        ];

        DerivedFeatures {
            modeling_vector,
            attention,
            fatigue,
            cognitive,
            motivation,
            accuracy,
            response_time_ms: latest.response_time_ms,
        }
    }
}

impl Default for FeatureBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The per-event bundle C1 hands off to C2's modelers and C3/C4's bandits.
#[derive(Debug, Clone)]
pub struct DerivedFeatures {
    /// The 10-channel z-scored modeling vector (`MODELING_VECTOR_LABELS`
    /// order), handed to C2's modelers alongside the per-channel structs
    /// below. Not itself persisted — the wire-format `FeatureVector` is the
    /// bandit's 22-D context, built in `engine.rs` once an action is chosen.
    pub modeling_vector: Vec<f64>,
    pub attention: AttentionFeatures,
    pub fatigue: FatigueFeatures,
    pub cognitive: CognitiveInput,
    pub motivation: MotivationEvent,
    pub accuracy: f64,
    pub response_time_ms: i64,
}

/// Z-score: `(x - mean) / max(std, 1e-6)`. `std` is a static per-channel
/// constant rather than a running estimate, same as the teacher's fixed
/// min/max normalization bounds, just re-centered on a mean/std pair.
fn normalize(value: f64, mean: f64, std: f64) -> f64 {
    (value - mean) / std.max(1e-6)
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

fn coefficient_of_variation(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if mean.abs() < 1e-6 {
        return 0.0;
    }
    let var = variance(values);
    var.sqrt() / mean
}
