// SPDX-License-Identifier: MIT

//! Engine-level state-recovery orchestration (§4.9, §4.14): periodic
//! checkpoint sweeps, startup replay from the checkpoint store, and the
//! pre-shutdown final-checkpoint pass. Checkpoint persistence itself lives
//! in `pool_storage::checkpoint`; this module only owns the timing and
//! what gets snapshotted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pool_core::clock::Clock;
use pool_core::key::InstanceKey;
use pool_storage::checkpoint::{Checkpoint, CheckpointStore, CheckpointType, RecoveryResult};
use serde_json::json;
use tokio::task::JoinHandle;

use crate::error::EngineResult;
use crate::instance::AgentInstance;

/// Supplies the set of currently-active instances to snapshot. The pool
/// manager implements this; kept as a seam here so this module doesn't
/// depend on `pool_manager`'s concrete type.
pub trait InstanceSource<C: Clock>: Send + Sync {
    fn active_instances(&self) -> Vec<Arc<AgentInstance<C>>>;
}

fn lifecycle_state_data<C: Clock>(instance: &AgentInstance<C>) -> serde_json::Value {
    json!({
        "status": instance.lifecycle().status().to_string(),
        "active_requests": instance.active_requests(),
        "last_activity_ms": instance.last_activity_ms(),
    })
}

/// §4.9: drives periodic and on-demand checkpoints against whatever
/// [`CheckpointStore`] backs the pool (Redis in production, in-process
/// elsewhere), and replays it at startup.
pub struct StateRecoveryService {
    store: Arc<dyn CheckpointStore>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
    last_recovery_time_ms: AtomicU64,
}

impl StateRecoveryService {
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self { store, loop_handle: Mutex::new(None), last_recovery_time_ms: AtomicU64::new(0) }
    }

    /// §4.14 startup step "recover-from-checkpoints". Instances are not
    /// recreated here; that happens lazily on the next
    /// `get_or_create_instance`. This only reports what the store has, so
    /// the orchestrator can log it.
    pub async fn recover_all(&self) -> EngineResult<Vec<RecoveryResult>> {
        let start = Instant::now();
        let mut results = self.store.recover_all_instances().await?;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        self.last_recovery_time_ms.store(elapsed_ms, Ordering::Relaxed);
        for result in &mut results {
            result.recovery_time_ms = elapsed_ms;
        }
        Ok(results)
    }

    pub async fn recover_one(
        &self,
        key: &InstanceKey,
        checkpoint_type: Option<CheckpointType>,
    ) -> EngineResult<Option<Checkpoint>> {
        let start = Instant::now();
        let checkpoint = self.store.recover_instance(key, checkpoint_type).await?;
        self.last_recovery_time_ms.store(start.elapsed().as_millis() as u64, Ordering::Relaxed);
        Ok(checkpoint)
    }

    /// Wall-clock duration of the most recent `recover_all`/`recover_one`
    /// call, exported as a histogram by the orchestrator's metrics render.
    pub fn last_recovery_time_ms(&self) -> u64 {
        self.last_recovery_time_ms.load(Ordering::Relaxed)
    }

    pub async fn checkpoint_instance<C: Clock>(&self, instance: &AgentInstance<C>) -> EngineResult<Checkpoint> {
        let metadata = json!({ "schema_version": 1 });
        let checkpoint = self
            .store
            .create_checkpoint(&instance.instance_key, CheckpointType::Lifecycle, lifecycle_state_data(instance), metadata)
            .await?;
        Ok(checkpoint)
    }

    /// §4.9 background loop body: snapshots every instance a
    /// [`InstanceSource`] currently reports as active.
    pub async fn checkpoint_active<C: Clock>(&self, source: &dyn InstanceSource<C>) {
        for instance in source.active_instances() {
            if let Err(err) = self.checkpoint_instance(&instance).await {
                tracing::warn!(instance_key = %instance.instance_key, error = %err, "periodic checkpoint failed");
            }
        }
    }

    /// §4.14 pre-shutdown step: "a final checkpoint of every active
    /// instance". Recorded as `Full` rather than `Lifecycle` to mark it as
    /// the terminal snapshot a restart would replay from.
    pub async fn checkpoint_final<C: Clock>(&self, source: &dyn InstanceSource<C>) {
        for instance in source.active_instances() {
            let metadata = json!({ "schema_version": 1, "final": true });
            let result = self
                .store
                .create_checkpoint(&instance.instance_key, CheckpointType::Full, lifecycle_state_data(&instance), metadata)
                .await;
            if let Err(err) = result {
                tracing::warn!(instance_key = %instance.instance_key, error = %err, "final checkpoint failed");
            }
        }
    }

    pub fn start_background_loop<C: Clock + 'static>(self: &Arc<Self>, source: Arc<dyn InstanceSource<C>>, interval: Duration) {
        let service = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                service.checkpoint_active(source.as_ref()).await;
            }
        });
        if let Some(previous) = self.loop_handle.lock().replace(handle) {
            previous.abort();
        }
    }

    pub fn stop_background_loop(&self) {
        if let Some(handle) = self.loop_handle.lock().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
#[path = "state_recovery_tests.rs"]
mod tests;
