//! Cached views over a run's persisted step outputs and state.
//!
//! Both accessors are created fresh for each run execution and shared with
//! every step context of that run. Their caches are scoped to the run, so a
//! repeated read never hits the backend twice. The engine confines each run
//! to a single task; the locks below only guard against handlers cloning
//! the context into short-lived subtasks.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StepError;
use crate::persistence::{StoreError, WorkflowStore};

/// Read access to outputs previously produced by other steps of the run.
pub struct StepOutputAccessor {
    run_id: String,
    store: Arc<dyn WorkflowStore>,
    cache: RwLock<HashMap<String, Vec<u8>>>,
}

impl StepOutputAccessor {
    pub fn new(run_id: impl Into<String>, store: Arc<dyn WorkflowStore>) -> Self {
        Self {
            run_id: run_id.into(),
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Loads and deserializes the output of `step_id`.
    pub async fn get<T: DeserializeOwned>(&self, step_id: &str) -> Result<T, StepError> {
        let bytes = self.raw(step_id).await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            StepError::serialization(format!(
                "failed to deserialize output of step {step_id}: {e}"
            ))
        })
    }

    /// Loads the raw output bytes of `step_id`, reading through the cache.
    pub async fn raw(&self, step_id: &str) -> Result<Vec<u8>, StepError> {
        if let Some(bytes) = self.cache.read().get(step_id) {
            return Ok(bytes.clone());
        }

        let bytes = self
            .store
            .load_step_output(&self.run_id, step_id)
            .await
            .map_err(|e| match e {
                StoreError::OutputNotFound { .. } => {
                    StepError::not_found(format!("no output recorded for step {step_id}"))
                }
                other => StepError::new(
                    crate::error::ErrorCode::Internal,
                    format!("failed to load output for step {step_id}: {other}"),
                ),
            })?;

        self.cache
            .write()
            .insert(step_id.to_string(), bytes.clone());
        Ok(bytes)
    }

    /// True when the output is in cache or the backend reports existence.
    pub async fn has(&self, step_id: &str) -> bool {
        if self.cache.read().contains_key(step_id) {
            return true;
        }
        self.store
            .load_step_output(&self.run_id, step_id)
            .await
            .is_ok()
    }
}

/// Key/value access to the run's persisted state.
///
/// `set` writes through to the backend and the cache; `get` reads the cache
/// first. The engine never interprets the stored bytes.
pub struct StateAccessor {
    run_id: String,
    store: Arc<dyn WorkflowStore>,
    cache: RwLock<HashMap<String, Vec<u8>>>,
}

impl StateAccessor {
    pub fn new(run_id: impl Into<String>, store: Arc<dyn WorkflowStore>) -> Self {
        Self {
            run_id: run_id.into(),
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StepError> {
        let bytes = serde_json::to_vec(value).map_err(|e| {
            StepError::serialization(format!("failed to serialize state value for key {key}: {e}"))
        })?;

        self.cache.write().insert(key.to_string(), bytes.clone());

        self.store
            .save_state(&self.run_id, key, &bytes)
            .await
            .map_err(|e| {
                StepError::new(
                    crate::error::ErrorCode::Internal,
                    format!("failed to save state for key {key}: {e}"),
                )
            })
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, StepError> {
        if let Some(bytes) = self.cache.read().get(key) {
            return serde_json::from_slice(bytes).map_err(|e| {
                StepError::serialization(format!("failed to deserialize state for key {key}: {e}"))
            });
        }

        let bytes = self
            .store
            .load_state(&self.run_id, key)
            .await
            .map_err(|e| match e {
                StoreError::StateNotFound { .. } => {
                    StepError::not_found(format!("state key {key} not found"))
                }
                other => StepError::new(
                    crate::error::ErrorCode::Internal,
                    format!("failed to load state for key {key}: {other}"),
                ),
            })?;

        self.cache.write().insert(key.to_string(), bytes.clone());

        serde_json::from_slice(&bytes).map_err(|e| {
            StepError::serialization(format!("failed to deserialize state for key {key}: {e}"))
        })
    }

    /// Removes the key from the cache and the backend.
    pub async fn delete(&self, key: &str) -> Result<(), StepError> {
        self.cache.write().remove(key);
        self.store
            .delete_state(&self.run_id, key)
            .await
            .map_err(|e| {
                StepError::new(
                    crate::error::ErrorCode::Internal,
                    format!("failed to delete state for key {key}: {e}"),
                )
            })
    }

    /// True when the key is in cache or present in the backend.
    pub async fn has(&self, key: &str) -> bool {
        if self.cache.read().contains_key(key) {
            return true;
        }
        self.store.load_state(&self.run_id, key).await.is_ok()
    }

    /// Returns the full state map as raw bytes and hydrates the cache.
    pub async fn get_all(&self) -> Result<HashMap<String, Vec<u8>>, StepError> {
        let data = self.store.get_all_state(&self.run_id).await.map_err(|e| {
            StepError::new(
                crate::error::ErrorCode::Internal,
                format!("failed to load state map: {e}"),
            )
        })?;

        let mut cache = self.cache.write();
        for (key, value) in &data {
            cache.insert(key.clone(), value.clone());
        }
        Ok(data)
    }
}
