//! Delayed-Reward Aggregator (C10): multi-timescale reward delivery with
//! smart queue pruning. Not present as a standalone module in the teacher's
//! `amas/` tree (the closest analogue is an HTTP/DB-coupled service outside
//! this crate's scope); built fresh in the bounded-`VecDeque` +
//! prune-on-overflow idiom of `decision/swd.rs`.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RewardConfig;
use crate::types::DelayedRewardEvent;

const TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardBreakdownEntry {
    pub event_id: String,
    pub increment: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateResult {
    pub total_increment: f64,
    pub breakdown: Vec<RewardBreakdownEntry>,
    pub pending_count: usize,
}

pub struct DelayedRewardQueue {
    config: RewardConfig,
    schedule: Vec<(i64, f64)>,
    events: VecDeque<DelayedRewardEvent>,
}

impl DelayedRewardQueue {
    pub fn new(config: RewardConfig) -> Self {
        let schedule = Self::normalize_schedule(&config.delay_schedule);
        Self {
            config,
            schedule,
            events: VecDeque::new(),
        }
    }

    pub fn from_events(config: RewardConfig, events: Vec<DelayedRewardEvent>) -> Self {
        let schedule = Self::normalize_schedule(&config.delay_schedule);
        Self {
            config,
            schedule,
            events: VecDeque::from(events),
        }
    }

    fn normalize_schedule(schedule: &[(i64, f64)]) -> Vec<(i64, f64)> {
        let total: f64 = schedule.iter().map(|(_, w)| w).sum();
        if (total - 1.0).abs() < TOLERANCE || total <= 0.0 {
            return schedule.to_vec();
        }
        schedule.iter().map(|(delay, weight)| (*delay, weight / total)).collect()
    }

    pub fn events(&self) -> &VecDeque<DelayedRewardEvent> {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Pushes a fresh event with all five delivery slots unclaimed, pruning
    /// the queue if it has grown past `max_pending`.
    pub fn enqueue(&mut self, user_id: String, event_id: String, reward: f64, created_at_ms: i64) {
        self.events.push_back(DelayedRewardEvent {
            user_id,
            event_id,
            created_at_ms,
            base_reward: reward,
            delivered: vec![0.0; self.schedule.len()],
        });

        if self.events.len() > self.config.max_pending {
            self.prune(created_at_ms);
        }
    }

    fn expiry_ms(&self) -> i64 {
        self.config.expiry_days * 24 * 3_600 * 1_000
    }

    fn progress(&self, event: &DelayedRewardEvent) -> f64 {
        let delivered_total: f64 = event.delivered.iter().map(|d| d.abs()).sum();
        let target_total: f64 = self
            .schedule
            .iter()
            .map(|(_, w)| (w * event.base_reward).abs())
            .sum();
        if target_total < TOLERANCE {
            1.0
        } else {
            delivered_total / target_total
        }
    }

    /// Drops events until the queue is back to `prune_to`, preferring to
    /// drop expired events first, then the highest-progress (most already
    /// delivered), then the oldest.
    fn prune(&mut self, now_ms: i64) {
        let expiry = self.expiry_ms();
        let mut indexed: Vec<(usize, bool, f64, i64)> = self
            .events
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let expired = now_ms - e.created_at_ms > expiry;
                (i, expired, self.progress(e), e.created_at_ms)
            })
            .collect();

        indexed.sort_by(|a, b| {
            b.1.cmp(&a.1)
                .then_with(|| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| a.3.cmp(&b.3))
        });

        let drop_count = self.events.len().saturating_sub(self.config.prune_to);
        let mut drop_indices: Vec<usize> = indexed.into_iter().take(drop_count).map(|(i, _, _, _)| i).collect();
        drop_indices.sort_unstable_by(|a, b| b.cmp(a));

        for index in drop_indices {
            self.events.remove(index);
        }

        debug!(dropped = drop_count, remaining = self.events.len(), "pruned delayed reward queue");
    }

    /// Delivers newly-earned reward increments for every event (optionally
    /// scoped to one user), dropping expired or fully-delivered events from
    /// the queue as it goes.
    pub fn aggregate(&mut self, now_ms: i64, user_id: Option<&str>) -> AggregateResult {
        let expiry = self.expiry_ms();
        let max_delay_ms = self.schedule.iter().map(|(d, _)| d * 1_000).max().unwrap_or(0);

        let mut total_increment = 0.0;
        let mut breakdown = Vec::new();
        let mut keep = VecDeque::with_capacity(self.events.len());

        for mut event in std::mem::take(&mut self.events) {
            if let Some(uid) = user_id {
                if event.user_id != uid {
                    keep.push_back(event);
                    continue;
                }
            }

            let elapsed_ms = now_ms - event.created_at_ms;
            if elapsed_ms > expiry {
                continue;
            }

            let mut event_increment = 0.0;
            for (i, (delay_s, weight)) in self.schedule.iter().enumerate() {
                let elapsed_s = elapsed_ms as f64 / 1000.0;
                let progress = if *delay_s <= 0 {
                    1.0
                } else {
                    (elapsed_s / *delay_s as f64).min(1.0)
                };
                let target = weight * event.base_reward * progress;
                let delta = target - event.delivered[i];
                event.delivered[i] += delta;
                event_increment += delta;
            }

            if event_increment.abs() > TOLERANCE {
                total_increment += event_increment;
                breakdown.push(RewardBreakdownEntry {
                    event_id: event.event_id.clone(),
                    increment: event_increment,
                });
            }

            let fully_delivered = self.schedule.iter().enumerate().all(|(i, (delay_s, weight))| {
                let elapsed_s = elapsed_ms as f64 / 1000.0;
                let progress = if *delay_s <= 0 { 1.0 } else { (elapsed_s / *delay_s as f64).min(1.0) };
                let target = weight * event.base_reward * progress;
                if event.base_reward >= 0.0 {
                    event.delivered[i] >= target - TOLERANCE
                } else {
                    event.delivered[i] <= target + TOLERANCE
                }
            });

            if !fully_delivered || elapsed_ms < max_delay_ms {
                keep.push_back(event);
            }
        }

        self.events = keep;

        AggregateResult {
            total_increment,
            breakdown,
            pending_count: self.events.len(),
        }
    }
}

impl Default for DelayedRewardQueue {
    fn default() -> Self {
        Self::new(RewardConfig::default())
    }
}
