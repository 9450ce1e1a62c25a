//! Redis implementation of `WorkflowStore`.
//!
//! All records for a run live under a common key prefix:
//!
//! ```text
//! {prefix}:run:{run_id}            JSON-encoded run record
//! {prefix}:run:{run_id}:steps      hash: step_id -> JSON step execution
//! {prefix}:run:{run_id}:outputs    hash: step_id -> raw output bytes
//! {prefix}:run:{run_id}:state      hash: key -> raw value bytes
//! {prefix}:runs                    set of known run ids
//! ```
//!
//! A run TTL maps to `EXPIREAT` on the run record key.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::error::WorkflowError;
use crate::model::{RunFilter, RunStatus, StepExecution, WorkflowRun};

use super::store::{StoreError, WorkflowStore};

/// Redis-backed workflow store.
pub struct RedisWorkflowStore {
    client: redis::Client,
    key_prefix: String,
}

impl RedisWorkflowStore {
    /// Connects lazily to the given Redis URL; `key_prefix` namespaces all
    /// keys so several deployments can share one instance.
    pub fn new(connection_url: &str, key_prefix: impl Into<String>) -> Result<Self, StoreError> {
        let client = redis::Client::open(connection_url)
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            key_prefix: key_prefix.into(),
        })
    }

    fn run_key(&self, run_id: &str) -> String {
        format!("{}:run:{}", self.key_prefix, run_id)
    }

    fn steps_key(&self, run_id: &str) -> String {
        format!("{}:run:{}:steps", self.key_prefix, run_id)
    }

    fn outputs_key(&self, run_id: &str) -> String {
        format!("{}:run:{}:outputs", self.key_prefix, run_id)
    }

    fn state_key(&self, run_id: &str) -> String {
        format!("{}:run:{}:state", self.key_prefix, run_id)
    }

    fn run_ids_key(&self) -> String {
        format!("{}:runs", self.key_prefix)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }

    fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    async fn fetch_run(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        run_id: &str,
    ) -> Result<Option<WorkflowRun>, StoreError> {
        let payload: Option<Vec<u8>> = conn
            .get(self.run_key(run_id))
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        payload.map(|bytes| Self::decode(&bytes)).transpose()
    }

    async fn scan_runs(
        &self,
        filter: &RunFilter,
    ) -> Result<Vec<WorkflowRun>, StoreError> {
        let mut conn = self.connection().await?;
        let run_ids: Vec<String> = conn
            .smembers(self.run_ids_key())
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let mut runs = Vec::new();
        for run_id in run_ids {
            // Expired run records disappear while their id lingers in the
            // set; skip those.
            let Some(run) = self.fetch_run(&mut conn, &run_id).await? else {
                continue;
            };
            if !filter.matches(&run) {
                continue;
            }
            runs.push(run);
            if let Some(limit) = filter.limit {
                if runs.len() >= limit {
                    break;
                }
            }
        }
        Ok(runs)
    }
}

#[async_trait]
impl WorkflowStore for RedisWorkflowStore {
    async fn create_run(&self, run: &WorkflowRun) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let payload = Self::encode(run)?;

        let created: bool = conn
            .set_nx(self.run_key(&run.run_id), payload)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        if !created {
            return Err(StoreError::RunExists(run.run_id.clone()));
        }

        conn.sadd::<_, _, ()>(self.run_ids_key(), &run.run_id)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        if let Some(expires_at) = run.expires_at {
            conn.expire_at::<_, ()>(self.run_key(&run.run_id), expires_at.timestamp())
                .await
                .map_err(|e| StoreError::Connection(e.to_string()))?;
        }

        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> Result<WorkflowRun, StoreError> {
        let mut conn = self.connection().await?;
        self.fetch_run(&mut conn, run_id)
            .await?
            .ok_or_else(|| StoreError::RunNotFound(run_id.to_string()))
    }

    async fn update_run(&self, run: &WorkflowRun) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;

        let exists: bool = conn
            .exists(self.run_key(&run.run_id))
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        if !exists {
            return Err(StoreError::RunNotFound(run.run_id.clone()));
        }

        let payload = Self::encode(run)?;
        conn.set::<_, _, ()>(self.run_key(&run.run_id), payload)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }

    async fn update_run_status(
        &self,
        run_id: &str,
        status: RunStatus,
        error: Option<WorkflowError>,
    ) -> Result<(), StoreError> {
        let mut run = self.get_run(run_id).await?;
        run.status = status;
        run.error = error;
        run.updated_at = chrono::Utc::now();
        self.update_run(&run).await
    }

    async fn list_runs(&self, filter: &RunFilter) -> Result<Vec<WorkflowRun>, StoreError> {
        self.scan_runs(filter).await
    }

    async fn create_step_execution(&self, exec: &StepExecution) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let payload = Self::encode(exec)?;
        conn.hset::<_, _, _, ()>(self.steps_key(&exec.run_id), &exec.step_id, payload)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }

    async fn get_step_execution(
        &self,
        run_id: &str,
        step_id: &str,
    ) -> Result<StepExecution, StoreError> {
        let mut conn = self.connection().await?;
        let payload: Option<Vec<u8>> = conn
            .hget(self.steps_key(run_id), step_id)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        match payload {
            Some(bytes) => Self::decode(&bytes),
            None => Err(StoreError::StepExecutionNotFound {
                run_id: run_id.to_string(),
                step_id: step_id.to_string(),
            }),
        }
    }

    async fn update_step_execution(&self, exec: &StepExecution) -> Result<(), StoreError> {
        self.create_step_execution(exec).await
    }

    async fn list_step_executions(&self, run_id: &str) -> Result<Vec<StepExecution>, StoreError> {
        let mut conn = self.connection().await?;
        let payloads: Vec<Vec<u8>> = conn
            .hvals(self.steps_key(run_id))
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        payloads.iter().map(|bytes| Self::decode(bytes)).collect()
    }

    async fn save_step_output(
        &self,
        run_id: &str,
        step_id: &str,
        output: &[u8],
    ) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        conn.hset::<_, _, _, ()>(self.outputs_key(run_id), step_id, output)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }

    async fn load_step_output(&self, run_id: &str, step_id: &str) -> Result<Vec<u8>, StoreError> {
        let mut conn = self.connection().await?;
        let payload: Option<Vec<u8>> = conn
            .hget(self.outputs_key(run_id), step_id)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        payload.ok_or_else(|| StoreError::OutputNotFound {
            run_id: run_id.to_string(),
            step_id: step_id.to_string(),
        })
    }

    async fn save_state(&self, run_id: &str, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        conn.hset::<_, _, _, ()>(self.state_key(run_id), key, value)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }

    async fn load_state(&self, run_id: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let mut conn = self.connection().await?;
        let payload: Option<Vec<u8>> = conn
            .hget(self.state_key(run_id), key)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        payload.ok_or_else(|| StoreError::StateNotFound {
            run_id: run_id.to_string(),
            key: key.to_string(),
        })
    }

    async fn delete_state(&self, run_id: &str, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        conn.hdel::<_, _, ()>(self.state_key(run_id), key)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }

    async fn get_all_state(&self, run_id: &str) -> Result<HashMap<String, Vec<u8>>, StoreError> {
        let mut conn = self.connection().await?;
        conn.hgetall(self.state_key(run_id))
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }

    async fn count_runs_by_status(
        &self,
        resource_id: &str,
        status: RunStatus,
    ) -> Result<usize, StoreError> {
        let filter = RunFilter::new()
            .with_resource_id(resource_id)
            .with_status(status);
        Ok(self.scan_runs(&filter).await?.len())
    }
}
