// tandem/src/barrier/rendezvous.rs

use super::{BarrierService, Notifiers};
use crate::error::{TandemError, TandemResult};
use crate::model::{BarrierInstance, BarrierState, Participant};
use crate::store::BarrierStore;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{event, instrument, Level};

/// Handle returned by an arrival. Resolves once every participant has arrived,
/// or with `BarrierAborted` if the owning pipeline execution is aborted first.
///
/// Waiting holds no lock: it sleeps on a watch channel and re-reads the store
/// every poll interval, so a barrier released by another process is noticed too.
pub struct BarrierWait {
  barrier_id: String,
  known: BarrierState,
  receiver: watch::Receiver<BarrierState>,
  channel_open: bool,
  store: Arc<dyn BarrierStore>,
  notifiers: Arc<Notifiers>,
  poll_interval: Duration,
}

impl std::fmt::Debug for BarrierWait {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("BarrierWait")
      .field("barrier_id", &self.barrier_id)
      .field("known", &self.known)
      .finish()
  }
}

impl BarrierWait {
  pub fn barrier_id(&self) -> &str {
    &self.barrier_id
  }

  /// Non-blocking check.
  pub fn is_released(&self) -> bool {
    self.known == BarrierState::Down || *self.receiver.borrow() == BarrierState::Down
  }

  fn outcome(&self, state: BarrierState) -> Option<TandemResult<()>> {
    match state {
      BarrierState::Down => Some(Ok(())),
      BarrierState::Aborted => Some(Err(TandemError::BarrierAborted {
        barrier_id: self.barrier_id.clone(),
      })),
      BarrierState::Pending => None,
    }
  }

  pub async fn wait(mut self) -> TandemResult<()> {
    if let Some(outcome) = self.outcome(self.known) {
      return outcome;
    }
    loop {
      let signalled = *self.receiver.borrow_and_update();
      if let Some(outcome) = self.outcome(signalled) {
        return outcome;
      }

      if self.channel_open {
        tokio::select! {
          changed = self.receiver.changed() => {
            if changed.is_err() {
              // Channel gone without a terminal value; only the store can tell us now.
              self.channel_open = false;
            } else {
              continue;
            }
          }
          _ = tokio::time::sleep(self.poll_interval) => {}
        }
      } else {
        tokio::time::sleep(self.poll_interval).await;
      }

      // Settled elsewhere: pass the state on to local waiters and drop the channel.
      let stored = match self.store.get(&self.barrier_id).await? {
        Some(stored) => stored.state,
        None => BarrierState::Aborted,
      };
      if let Some(outcome) = self.outcome(stored) {
        event!(Level::DEBUG, barrier_id = %self.barrier_id, state = ?stored, "Barrier settled via store poll.");
        self.notifiers.settle(&self.barrier_id, stored);
        return outcome;
      }
    }
  }
}

impl BarrierService {
  fn wait_handle(&self, instance: &BarrierInstance, receiver: watch::Receiver<BarrierState>) -> BarrierWait {
    BarrierWait {
      barrier_id: instance.uuid.clone(),
      known: instance.state,
      receiver,
      channel_open: true,
      store: Arc::clone(self.store()),
      notifiers: Arc::clone(&self.notifiers),
      poll_interval: self.config().poll_interval(),
    }
  }

  async fn load(&self, barrier_id: &str) -> TandemResult<BarrierInstance> {
    self.store().get(barrier_id).await?.ok_or_else(|| {
      event!(Level::ERROR, barrier_id, "Arrival at an unknown barrier instance.");
      TandemError::invalid_request(format!("Barrier instance '{}' does not exist", barrier_id))
    })
  }

  /// Records `participant` at the barrier. The participant completing the set
  /// flips the instance to DOWN in the same conditional write, so exactly one
  /// arrival releases it. Re-arriving, or arriving after the barrier is already
  /// down, returns a handle that resolves immediately.
  #[instrument(
    name = "BarrierService::arrive",
    skip(self, participant),
    fields(workflow_id = %participant.workflow_id, pipeline_stage_id = %participant.pipeline_stage_id),
    err(Display)
  )]
  pub async fn arrive(&self, barrier_id: &str, participant: &Participant) -> TandemResult<BarrierWait> {
    // Subscribed before the first read; a release in between still reaches this handle.
    let receiver = self.notifiers.subscribe(barrier_id);
    let arrival = self.record_arrival(barrier_id, participant, receiver).await;
    if arrival.is_err() {
      self.notifiers.release_if_unused(barrier_id);
    }
    arrival
  }

  async fn record_arrival(
    &self,
    barrier_id: &str,
    participant: &Participant,
    receiver: watch::Receiver<BarrierState>,
  ) -> TandemResult<BarrierWait> {
    let max_attempts = self.config().barrier_cas_max_attempts;
    for attempt in 1..=max_attempts {
      let current = self.load(barrier_id).await?;
      if !current.participants.contains(participant) {
        return Err(TandemError::invalid_request(format!(
          "Workflow '{}' in stage '{}' is not a participant of barrier '{}'",
          participant.workflow_id, participant.pipeline_stage_id, current.name
        )));
      }
      if current.state != BarrierState::Pending {
        event!(Level::DEBUG, identifier = %current.name, state = ?current.state, "Arrival after barrier settled; resolving immediately.");
        self.notifiers.settle(barrier_id, current.state);
        return Ok(self.wait_handle(&current, receiver));
      }
      if current.arrived.contains(participant) {
        event!(Level::DEBUG, identifier = %current.name, "Repeated arrival ignored.");
        return Ok(self.wait_handle(&current, receiver));
      }

      let mut updated = current.clone();
      updated.arrived.insert(participant.clone());
      let releasing = updated.is_complete();
      if releasing {
        updated.state = BarrierState::Down;
      }

      if self.store().compare_and_swap(current.version, updated.clone()).await? {
        if releasing {
          event!(
            Level::INFO,
            identifier = %updated.name,
            participants = updated.participants.len(),
            "Last participant arrived; barrier is down."
          );
          self.notifiers.settle(barrier_id, BarrierState::Down);
        } else {
          event!(
            Level::DEBUG,
            identifier = %updated.name,
            arrived = updated.arrived.len(),
            expected = updated.participants.len(),
            "Arrival recorded."
          );
        }
        return Ok(self.wait_handle(&updated, receiver));
      }
      event!(Level::TRACE, attempt, "Barrier version moved underneath us; retrying arrival.");
    }

    event!(Level::ERROR, barrier_id, max_attempts, "Arrival gave up after repeated version conflicts.");
    Err(TandemError::BarrierContention {
      barrier_id: barrier_id.to_string(),
      attempts: max_attempts,
    })
  }

  /// Arrival by workflow id alone. Fails if the workflow appears in none, or in
  /// more than one, of the barrier's stages.
  pub async fn arrive_workflow(&self, barrier_id: &str, workflow_id: &str) -> TandemResult<BarrierWait> {
    let current = self.load(barrier_id).await?;
    let mut matching = current.participants_for_workflow(workflow_id);
    let participant = match (matching.next(), matching.next()) {
      (Some(p), None) => p.clone(),
      (None, _) => {
        return Err(TandemError::invalid_request(format!(
          "Workflow '{}' is not a participant of barrier '{}'",
          workflow_id, current.name
        )))
      }
      (Some(_), Some(_)) => {
        return Err(TandemError::invalid_request(format!(
          "Workflow '{}' runs in several stages of barrier '{}'; arrive with its stage id",
          workflow_id, current.name
        )))
      }
    };
    self.arrive(barrier_id, &participant).await
  }

  /// Moves every pending barrier of a pipeline execution to ABORTED and wakes
  /// their waiters. Returns how many were aborted.
  #[instrument(name = "BarrierService::abort_pipeline_execution", skip(self), err(Display))]
  pub async fn abort_pipeline_execution(&self, pipeline_execution_id: &str) -> TandemResult<usize> {
    let max_attempts = self.config().barrier_cas_max_attempts;
    let mut aborted = 0;
    for listed in self.store().list_for_pipeline_execution(pipeline_execution_id).await? {
      let mut attempt = 0;
      loop {
        attempt += 1;
        let current = match self.store().get(&listed.uuid).await? {
          Some(b) => b,
          None => break,
        };
        if current.state != BarrierState::Pending {
          break;
        }
        let mut updated = current.clone();
        updated.state = BarrierState::Aborted;
        if self.store().compare_and_swap(current.version, updated).await? {
          event!(Level::INFO, identifier = %current.name, barrier_id = %current.uuid, "Barrier aborted.");
          self.notifiers.settle(&current.uuid, BarrierState::Aborted);
          aborted += 1;
          break;
        }
        if attempt >= max_attempts {
          return Err(TandemError::BarrierContention {
            barrier_id: current.uuid,
            attempts: max_attempts,
          });
        }
      }
    }
    Ok(aborted)
  }
}
