#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

static REGISTRY: OnceLock<Arc<AlgorithmRegistry>> = OnceLock::new();

pub fn registry() -> &'static Arc<AlgorithmRegistry> {
    REGISTRY.get_or_init(|| Arc::new(AlgorithmRegistry::new()))
}

/// Identifies the algorithms this engine actually runs, for per-call
/// instrumentation. Kept intentionally small: only the components named by
/// C1-C11.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmId {
    FeatureBuilder,
    Attention,
    Fatigue,
    Cognitive,
    Motivation,
    Trend,
    LinUcb,
    Thompson,
    Actr,
    Heuristic,
    Ensemble,
    ColdStartManager,
    Orchestrator,
}

impl AlgorithmId {
    pub fn all() -> &'static [AlgorithmId] {
        &[
            AlgorithmId::FeatureBuilder,
            AlgorithmId::Attention,
            AlgorithmId::Fatigue,
            AlgorithmId::Cognitive,
            AlgorithmId::Motivation,
            AlgorithmId::Trend,
            AlgorithmId::LinUcb,
            AlgorithmId::Thompson,
            AlgorithmId::Actr,
            AlgorithmId::Heuristic,
            AlgorithmId::Ensemble,
            AlgorithmId::ColdStartManager,
            AlgorithmId::Orchestrator,
        ]
    }

    pub fn id(&self) -> &'static str {
        match self {
            AlgorithmId::FeatureBuilder => "feature_builder",
            AlgorithmId::Attention => "modeling_attention",
            AlgorithmId::Fatigue => "modeling_fatigue",
            AlgorithmId::Cognitive => "modeling_cognitive",
            AlgorithmId::Motivation => "modeling_motivation",
            AlgorithmId::Trend => "modeling_trend",
            AlgorithmId::LinUcb => "decision_linucb",
            AlgorithmId::Thompson => "decision_thompson",
            AlgorithmId::Actr => "decision_actr",
            AlgorithmId::Heuristic => "decision_heuristic",
            AlgorithmId::Ensemble => "decision_ensemble",
            AlgorithmId::ColdStartManager => "management_coldstart",
            AlgorithmId::Orchestrator => "engine_orchestrator",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlgorithmMetricsSnapshot {
    pub call_count: u64,
    pub total_latency_us: u64,
    pub error_count: u64,
    pub last_called_at: Option<u64>,
}

#[derive(Debug, Default)]
pub struct AlgorithmMetrics {
    call_count: AtomicU64,
    total_latency_us: AtomicU64,
    error_count: AtomicU64,
    last_called_at: AtomicU64,
}

impl AlgorithmMetrics {
    pub fn record_call(&self, latency_us: u64) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us
            .fetch_add(latency_us, Ordering::Relaxed);
        self.last_called_at.store(now_ms(), Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn avg_latency_ms(&self) -> f64 {
        let calls = self.call_count.load(Ordering::Relaxed);
        if calls == 0 {
            return 0.0;
        }
        let total_us = self.total_latency_us.load(Ordering::Relaxed);
        (total_us as f64 / calls as f64) / 1000.0
    }

    pub fn is_active(&self) -> bool {
        let last = self.last_called_at.load(Ordering::Relaxed);
        if last == 0 {
            return false;
        }
        now_ms().saturating_sub(last) < 300_000
    }

    pub fn snapshot(&self) -> AlgorithmMetricsSnapshot {
        let last = self.last_called_at.load(Ordering::Relaxed);
        AlgorithmMetricsSnapshot {
            call_count: self.call_count(),
            total_latency_us: self.total_latency_us.load(Ordering::Relaxed),
            error_count: self.error_count(),
            last_called_at: if last == 0 { None } else { Some(last) },
        }
    }
}

pub struct AlgorithmRegistry {
    metrics: HashMap<AlgorithmId, AlgorithmMetrics>,
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AlgorithmRegistry {
    pub fn new() -> Self {
        let mut metrics = HashMap::new();
        for id in AlgorithmId::all() {
            metrics.insert(*id, AlgorithmMetrics::default());
        }
        Self { metrics }
    }

    pub fn record(&self, id: AlgorithmId, latency_us: u64) {
        if let Some(m) = self.metrics.get(&id) {
            m.record_call(latency_us);
        }
    }

    pub fn record_error(&self, id: AlgorithmId) {
        if let Some(m) = self.metrics.get(&id) {
            m.record_error();
        }
    }

    pub fn get(&self, id: AlgorithmId) -> Option<&AlgorithmMetrics> {
        self.metrics.get(&id)
    }

    pub fn snapshot(&self) -> Vec<AlgorithmStatus> {
        AlgorithmId::all()
            .iter()
            .map(|id| {
                let m = self.metrics.get(id).unwrap();
                let calls = m.call_count();
                let is_active = m.is_active();
                let status = if calls == 0 {
                    "idle"
                } else if is_active {
                    "healthy"
                } else {
                    "inactive"
                };
                AlgorithmStatus {
                    id: id.id().to_string(),
                    call_count: calls,
                    avg_latency_ms: m.avg_latency_ms(),
                    error_count: m.error_count(),
                    is_active,
                    status: status.to_string(),
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmStatus {
    pub id: String,
    pub call_count: u64,
    pub avg_latency_ms: f64,
    pub error_count: u64,
    pub is_active: bool,
    pub status: String,
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Times a block of code and records its latency (and any error) against the
/// given algorithm id in the global registry.
#[macro_export]
macro_rules! track_algorithm {
    ($id:expr, $body:expr) => {{
        let start = std::time::Instant::now();
        let result = $body;
        let latency_us = start.elapsed().as_micros() as u64;
        $crate::metrics::registry().record($id, latency_us);
        result
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_registry_has_zeroed_metrics() {
        let registry = AlgorithmRegistry::new();
        let m = registry.get(AlgorithmId::LinUcb).unwrap();
        assert_eq!(m.call_count(), 0);
        assert!(!m.is_active());
    }

    #[test]
    fn record_increments_call_count() {
        let registry = AlgorithmRegistry::new();
        registry.record(AlgorithmId::Heuristic, 500);
        let m = registry.get(AlgorithmId::Heuristic).unwrap();
        assert_eq!(m.call_count(), 1);
        assert!(m.is_active());
    }

    #[test]
    fn snapshot_lists_every_algorithm() {
        let registry = AlgorithmRegistry::new();
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), AlgorithmId::all().len());
    }
}
