//! Repositories (C12): `StateRepository`/`ModelRepository` contracts plus
//! two pairs of reference adapters. The teacher's `persistence.rs` is
//! sqlx/`DatabaseProxy`-coupled (ORM/SQL wiring is out of scope here); this
//! keeps its row-to-domain mapping shape and Cholesky-recovery-on-load logic
//! but drops the database specifics, using `async-trait` for the contract
//! the same way the pack's other async-service repos do.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::warn;

use crate::decision::linucb::CONTEXT_DIM;
use crate::decision::matrix::cholesky_decompose;
use crate::error::AmasError;
use crate::types::{
    BanditModel, FeatureVector, UserState, FEATURE_VECTOR_NORM_METHOD, FEATURE_VECTOR_VERSION,
};

#[async_trait]
pub trait StateRepository: Send + Sync {
    async fn load(&self, user_id: &str) -> Result<Option<UserState>, AmasError>;
    async fn save(&self, user_id: &str, state: &UserState) -> Result<(), AmasError>;
}

#[async_trait]
pub trait ModelRepository: Send + Sync {
    async fn load(&self, user_id: &str) -> Result<Option<BanditModel>, AmasError>;
    async fn save(&self, user_id: &str, model: &BanditModel) -> Result<(), AmasError>;
}

/// Clamps every `UserState` field to its documented range and rejects
/// non-finite values before a save.
pub fn sanitize_user_state(state: &mut UserState) -> Result<(), AmasError> {
    for (name, value) in [
        ("attention", state.attention),
        ("fatigue", state.fatigue),
        ("motivation", state.motivation),
        ("conf", state.conf),
        ("cognitive.mem", state.cognitive.mem),
        ("cognitive.speed", state.cognitive.speed),
        ("cognitive.stability", state.cognitive.stability),
    ] {
        if !value.is_finite() {
            return Err(AmasError::Anomaly { field: name, value });
        }
    }

    state.attention = state.attention.clamp(0.0, 1.0);
    state.fatigue = state.fatigue.clamp(0.0, 1.0);
    state.motivation = state.motivation.clamp(-1.0, 1.0);
    state.conf = state.conf.clamp(0.0, 1.0);
    state.cognitive.mem = state.cognitive.mem.clamp(0.0, 1.0);
    state.cognitive.speed = state.cognitive.speed.clamp(0.0, 1.0);
    state.cognitive.stability = state.cognitive.stability.clamp(0.0, 1.0);
    Ok(())
}

/// Validates a `FeatureVector` against the wire-format contract (spec.md
/// §6) before it is handed to a caller or persisted: the value/label counts
/// must agree with each other and with `expected_dim`, and the version/
/// normalization tag must match what this build produces, so a stale or
/// foreign blob is caught rather than silently misinterpreted.
pub fn validate_feature_vector(fv: &FeatureVector, expected_dim: usize) -> Result<(), AmasError> {
    if fv.values.len() != fv.labels.len() {
        return Err(AmasError::DimensionMismatch { expected: fv.values.len(), found: fv.labels.len() });
    }
    if fv.values.len() != expected_dim {
        return Err(AmasError::DimensionMismatch { expected: expected_dim, found: fv.values.len() });
    }
    if fv.version != FEATURE_VECTOR_VERSION {
        return Err(AmasError::DimensionMismatch {
            expected: FEATURE_VECTOR_VERSION as usize,
            found: fv.version as usize,
        });
    }
    if fv.norm_method != FEATURE_VECTOR_NORM_METHOD {
        return Err(AmasError::Internal(format!(
            "unknown feature vector norm method: {}",
            fv.norm_method
        )));
    }
    if !fv.values.iter().all(|v| v.is_finite()) {
        return Err(AmasError::Internal("feature vector contains a non-finite value".to_string()));
    }
    Ok(())
}

/// Detects a missing/invalid Cholesky factor and repairs it by
/// re-decomposing the stored `A` matrix; resets to a fresh model if `A`
/// itself is malformed (wrong length or non-finite).
pub fn recover_bandit_linucb(value: &mut serde_json::Value) {
    let Some(obj) = value.as_object_mut() else { return };
    let d = obj.get("d").and_then(|v| v.as_u64()).unwrap_or(CONTEXT_DIM as u64) as usize;
    let lambda = obj.get("lambda").and_then(|v| v.as_f64()).unwrap_or(0.001);

    let a_matrix: Option<Vec<f64>> = obj
        .get("A")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|x| x.as_f64()).collect());

    let a_valid = matches!(&a_matrix, Some(a) if a.len() == d * d && a.iter().all(|x| x.is_finite()));

    if !a_valid {
        warn!(user_d = d, "bandit A matrix malformed, resetting to a fresh prior");
        let fresh_a: Vec<f64> = (0..d * d)
            .map(|idx| if idx / d == idx % d { lambda } else { 0.0 })
            .collect();
        let fresh_l = cholesky_decompose(&fresh_a, d, lambda);
        obj.insert("A".to_string(), serde_json::json!(fresh_a));
        obj.insert("L".to_string(), serde_json::json!(fresh_l));
        obj.insert("b".to_string(), serde_json::json!(vec![0.0; d]));
        obj.insert("update_count".to_string(), serde_json::json!(0));
        return;
    }

    let a_matrix = a_matrix.unwrap();
    let l_valid = obj
        .get("L")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.len() == d * d
                && arr.iter().all(|x| x.as_f64().is_some_and(f64::is_finite))
                && (0..d).all(|i| arr[i * d + i].as_f64().unwrap_or(0.0) > 0.0)
        })
        .unwrap_or(false);

    if !l_valid {
        warn!(user_d = d, "bandit L factor missing or invalid, re-decomposing from A");
        let repaired = cholesky_decompose(&a_matrix, d, lambda);
        obj.insert("L".to_string(), serde_json::json!(repaired));
    }
}

// ---- In-memory reference adapters ----

#[derive(Default)]
pub struct InMemoryStateRepository {
    store: RwLock<HashMap<String, UserState>>,
}

impl InMemoryStateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateRepository for InMemoryStateRepository {
    async fn load(&self, user_id: &str) -> Result<Option<UserState>, AmasError> {
        Ok(self.store.read().get(user_id).cloned())
    }

    async fn save(&self, user_id: &str, state: &UserState) -> Result<(), AmasError> {
        let mut sanitized = state.clone();
        sanitize_user_state(&mut sanitized)?;
        self.store.write().insert(user_id.to_string(), sanitized);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryModelRepository {
    store: RwLock<HashMap<String, BanditModel>>,
}

impl InMemoryModelRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ModelRepository for InMemoryModelRepository {
    async fn load(&self, user_id: &str) -> Result<Option<BanditModel>, AmasError> {
        let mut model = self.store.read().get(user_id).cloned();
        if let Some(ref mut model) = model {
            if let Some(ref mut linucb) = model.linucb_state {
                recover_bandit_linucb(linucb);
            }
        }
        Ok(model)
    }

    async fn save(&self, user_id: &str, model: &BanditModel) -> Result<(), AmasError> {
        self.store.write().insert(user_id.to_string(), model.clone());
        Ok(())
    }
}

// ---- File-backed reference adapters: one JSON file per user ----

pub struct FileStateRepository {
    root: PathBuf,
}

impl FileStateRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, user_id: &str) -> PathBuf {
        self.root.join(format!("{user_id}.state.json"))
    }
}

#[async_trait]
impl StateRepository for FileStateRepository {
    async fn load(&self, user_id: &str) -> Result<Option<UserState>, AmasError> {
        let path = self.path_for(user_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let state: UserState = serde_json::from_slice(&bytes)
                    .map_err(|e| AmasError::PersistenceFailure(e.to_string()))?;
                Ok(Some(state))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AmasError::PersistenceFailure(e.to_string())),
        }
    }

    async fn save(&self, user_id: &str, state: &UserState) -> Result<(), AmasError> {
        let mut sanitized = state.clone();
        sanitize_user_state(&mut sanitized)?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| AmasError::PersistenceFailure(e.to_string()))?;
        let bytes = serde_json::to_vec(&sanitized).map_err(|e| AmasError::PersistenceFailure(e.to_string()))?;
        tokio::fs::write(self.path_for(user_id), bytes)
            .await
            .map_err(|e| AmasError::PersistenceFailure(e.to_string()))
    }
}

pub struct FileModelRepository {
    root: PathBuf,
}

impl FileModelRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, user_id: &str) -> PathBuf {
        self.root.join(format!("{user_id}.model.json"))
    }
}

#[async_trait]
impl ModelRepository for FileModelRepository {
    async fn load(&self, user_id: &str) -> Result<Option<BanditModel>, AmasError> {
        let path = self.path_for(user_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let mut model: BanditModel = serde_json::from_slice(&bytes)
                    .map_err(|e| AmasError::PersistenceFailure(e.to_string()))?;
                if let Some(ref mut linucb) = model.linucb_state {
                    recover_bandit_linucb(linucb);
                }
                Ok(Some(model))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AmasError::PersistenceFailure(e.to_string())),
        }
    }

    async fn save(&self, user_id: &str, model: &BanditModel) -> Result<(), AmasError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| AmasError::PersistenceFailure(e.to_string()))?;
        let bytes = serde_json::to_vec(model).map_err(|e| AmasError::PersistenceFailure(e.to_string()))?;
        tokio::fs::write(self.path_for(user_id), bytes)
            .await
            .map_err(|e| AmasError::PersistenceFailure(e.to_string()))
    }
}

pub fn shared_state_repository(path: Option<&Path>) -> Arc<dyn StateRepository> {
    match path {
        Some(path) => Arc::new(FileStateRepository::new(path.to_path_buf())),
        None => Arc::new(InMemoryStateRepository::new()),
    }
}

pub fn shared_model_repository(path: Option<&Path>) -> Arc<dyn ModelRepository> {
    match path {
        Some(path) => Arc::new(FileModelRepository::new(path.to_path_buf())),
        None => Arc::new(InMemoryModelRepository::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CognitiveProfile;

    fn sample_state() -> UserState {
        UserState {
            attention: 1.5,
            fatigue: -0.2,
            cognitive: CognitiveProfile::default(),
            motivation: 2.0,
            trend: None,
            conf: 0.5,
            ts: 0,
        }
    }

    #[test]
    fn sanitize_clamps_out_of_range_fields() {
        let mut state = sample_state();
        sanitize_user_state(&mut state).unwrap();
        assert_eq!(state.attention, 1.0);
        assert_eq!(state.fatigue, 0.0);
        assert_eq!(state.motivation, 1.0);
    }

    #[test]
    fn sanitize_rejects_non_finite_fields() {
        let mut state = sample_state();
        state.attention = f64::NAN;
        assert!(sanitize_user_state(&mut state).is_err());
    }

    #[test]
    fn validate_feature_vector_accepts_a_well_formed_vector() {
        let fv = FeatureVector::new(vec![0.0; 22], vec!["x".to_string(); 22]);
        assert!(validate_feature_vector(&fv, 22).is_ok());
    }

    #[test]
    fn validate_feature_vector_rejects_wrong_dimension() {
        let fv = FeatureVector::new(vec![0.0; 10], vec!["x".to_string(); 10]);
        assert!(validate_feature_vector(&fv, 22).is_err());
    }

    #[test]
    fn validate_feature_vector_rejects_stale_version() {
        let mut fv = FeatureVector::new(vec![0.0; 22], vec!["x".to_string(); 22]);
        fv.version = 0;
        assert!(validate_feature_vector(&fv, 22).is_err());
    }

    #[test]
    fn recover_resets_on_malformed_a_matrix() {
        let mut value = serde_json::json!({ "d": 2, "lambda": 0.1, "A": [1.0], "L": [] });
        recover_bandit_linucb(&mut value);
        let a = value["A"].as_array().unwrap();
        assert_eq!(a.len(), 4);
    }

    #[test]
    fn recover_redecomposes_missing_l_from_valid_a() {
        let mut value = serde_json::json!({
            "d": 2,
            "lambda": 0.1,
            "A": [0.1, 0.0, 0.0, 0.1],
            "L": []
        });
        recover_bandit_linucb(&mut value);
        let l = value["L"].as_array().unwrap();
        assert_eq!(l.len(), 4);
        assert!(l[0].as_f64().unwrap() > 0.0);
    }

    #[tokio::test]
    async fn in_memory_state_repository_round_trips() {
        let repo = InMemoryStateRepository::new();
        assert!(repo.load("u1").await.unwrap().is_none());
        repo.save("u1", &sample_state()).await.unwrap();
        let loaded = repo.load("u1").await.unwrap().unwrap();
        assert_eq!(loaded.attention, 1.0);
    }

    #[tokio::test]
    async fn file_state_repository_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileStateRepository::new(dir.path());
        assert!(repo.load("u1").await.unwrap().is_none());
        let state = UserState { attention: 0.6, ..sample_state() };
        repo.save("u1", &state).await.unwrap();
        let loaded = repo.load("u1").await.unwrap().unwrap();
        assert!((loaded.attention - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn file_model_repository_recovers_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileModelRepository::new(dir.path());
        let malformed = BanditModel {
            linucb_state: Some(serde_json::json!({ "d": 2, "lambda": 0.1, "A": [1.0], "L": [] })),
            thompson_state: None,
            ensemble_weights: None,
        };
        repo.save("u1", &malformed).await.unwrap();
        let loaded = repo.load("u1").await.unwrap().unwrap();
        let a = loaded.linucb_state.unwrap()["A"].as_array().unwrap().len();
        assert_eq!(a, 4);
    }
}
