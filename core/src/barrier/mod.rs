// tandem/src/barrier/mod.rs

//! Barrier Synchronization Service.
//!
//! Registration (`registration`) materialises `BarrierInstance` records before any
//! stage starts; rendezvous (`rendezvous`) lets running workflows arrive and wait.
//! Participants coordinate through the `BarrierStore` only. The in-process watch
//! channels kept here merely wake local waiters sooner than the polling fallback.

pub mod registration;
pub mod rendezvous;

pub use registration::{group_parallel_stages, plan_barriers, ParticipantWorkflow, PlannedBarrier};
pub use rendezvous::BarrierWait;

use crate::config::TandemConfig;
use crate::error::TandemResult;
use crate::model::{BarrierInstance, BarrierState};
use crate::store::BarrierStore;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{event, instrument, Level};

/// In-process wake-up channels, one per barrier that has a local waiter. An entry
/// lives from the first local arrival until the barrier settles.
#[derive(Default)]
pub(crate) struct Notifiers {
  senders: Mutex<HashMap<String, watch::Sender<BarrierState>>>,
}

impl Notifiers {
  pub(crate) fn subscribe(&self, barrier_id: &str) -> watch::Receiver<BarrierState> {
    self
      .senders
      .lock()
      .entry(barrier_id.to_string())
      .or_insert_with(|| watch::channel(BarrierState::Pending).0)
      .subscribe()
  }

  /// Publishes a terminal state to local waiters and drops the channel. Receivers
  /// keep the last value.
  pub(crate) fn settle(&self, barrier_id: &str, state: BarrierState) {
    let removed = self.senders.lock().remove(barrier_id);
    if let Some(sender) = removed {
      sender.send_replace(state);
    }
  }

  /// Drops the channel if no handle listens on it any more.
  pub(crate) fn release_if_unused(&self, barrier_id: &str) {
    let mut senders = self.senders.lock();
    if senders.get(barrier_id).map_or(false, |s| s.receiver_count() == 0) {
      senders.remove(barrier_id);
    }
  }

  #[cfg(test)]
  pub(crate) fn len(&self) -> usize {
    self.senders.lock().len()
  }
}

pub struct BarrierService {
  store: Arc<dyn BarrierStore>,
  config: TandemConfig,
  notifiers: Arc<Notifiers>,
}

impl BarrierService {
  pub fn new(store: Arc<dyn BarrierStore>, config: TandemConfig) -> Self {
    Self {
      store,
      config,
      notifiers: Arc::new(Notifiers::default()),
    }
  }

  pub(crate) fn store(&self) -> &Arc<dyn BarrierStore> {
    &self.store
  }

  pub fn config(&self) -> &TandemConfig {
    &self.config
  }

  /// Every instance registered for a pipeline execution, by identifier.
  pub async fn instances_for(&self, pipeline_execution_id: &str) -> TandemResult<Vec<BarrierInstance>> {
    self.store.list_for_pipeline_execution(pipeline_execution_id).await
  }

  /// Deletes a pipeline execution's barrier records. Anyone still waiting on one
  /// of them is released with `BarrierAborted`.
  #[instrument(name = "BarrierService::purge_pipeline_execution", skip(self), err(Display))]
  pub async fn purge_pipeline_execution(&self, pipeline_execution_id: &str) -> TandemResult<usize> {
    let instances = self.store.list_for_pipeline_execution(pipeline_execution_id).await?;
    let removed = self.store.delete_for_pipeline_execution(pipeline_execution_id).await?;

    for instance in &instances {
      let state = match instance.state {
        BarrierState::Pending => BarrierState::Aborted,
        settled => settled,
      };
      self.notifiers.settle(&instance.uuid, state);
    }

    event!(Level::INFO, pipeline_execution_id, removed, "Purged barrier instances.");
    Ok(removed)
  }
}
