// tests/barrier_rendezvous_tests.rs
mod common;

use async_trait::async_trait;
use common::*;
use std::sync::Arc;
use std::time::Duration;
use tandem::{
  BarrierInstance, BarrierService, BarrierState, BarrierStore, InMemoryBarrierStore, Participant, ParticipantWorkflow,
  TandemConfig, TandemError, TandemResult,
};

async fn register(service: &BarrierService, participant_count: usize) -> (BarrierInstance, Vec<Participant>) {
  let participants: Vec<ParticipantWorkflow> = (0..participant_count)
    .map(|i| {
      ParticipantWorkflow::new(
        format!("stage-{}", i),
        barrier_workflow(&format!("wf-{}", i), &[&["sync"]]),
      )
    })
    .collect();
  let mut instances = service.obtain_instances(APP_ID, &participants, "pexec-1", 0).await.unwrap();
  assert_eq!(instances.len(), 1);
  let keys = participants.into_iter().map(|p| p.participant).collect();
  (instances.remove(0), keys)
}

#[tokio::test]
async fn test_last_arrival_releases_everyone() {
  setup_tracing();
  let (service, store) = barrier_service();
  let (barrier, parties) = register(&service, 2).await;

  let first = service.arrive(&barrier.uuid, &parties[0]).await.unwrap();
  assert!(!first.is_released());

  let second = service.arrive(&barrier.uuid, &parties[1]).await.unwrap();
  assert!(second.is_released());

  tokio::time::timeout(Duration::from_secs(1), first.wait()).await.unwrap().unwrap();
  second.wait().await.unwrap();

  let stored = store.get(&barrier.uuid).await.unwrap().unwrap();
  assert_eq!(stored.state, BarrierState::Down);
  assert_eq!(stored.arrived, stored.participants);
}

#[tokio::test]
async fn test_wait_blocks_until_everyone_arrives() {
  setup_tracing();
  let (service, _store) = barrier_service();
  let (barrier, parties) = register(&service, 2).await;

  let first = service.arrive(&barrier.uuid, &parties[0]).await.unwrap();
  let outcome = tokio::time::timeout(Duration::from_millis(150), first.wait()).await;
  assert!(outcome.is_err(), "wait must not resolve with a participant missing");
}

#[tokio::test]
async fn test_repeated_arrival_is_a_no_op() {
  setup_tracing();
  let (service, store) = barrier_service();
  let (barrier, parties) = register(&service, 3).await;

  service.arrive(&barrier.uuid, &parties[0]).await.unwrap();
  let version_after_first = store.get(&barrier.uuid).await.unwrap().unwrap().version;
  service.arrive(&barrier.uuid, &parties[0]).await.unwrap();

  let stored = store.get(&barrier.uuid).await.unwrap().unwrap();
  assert_eq!(stored.version, version_after_first);
  assert_eq!(stored.arrived.len(), 1);
  assert_eq!(stored.state, BarrierState::Pending);
}

#[tokio::test]
async fn test_arrival_after_release_resolves_immediately() {
  setup_tracing();
  let (service, _store) = barrier_service();
  let (barrier, parties) = register(&service, 2).await;
  service.arrive(&barrier.uuid, &parties[0]).await.unwrap();
  service.arrive(&barrier.uuid, &parties[1]).await.unwrap();

  // A retried arrival after a restart.
  let late = service.arrive(&barrier.uuid, &parties[0]).await.unwrap();
  assert!(late.is_released());
  tokio::time::timeout(Duration::from_millis(50), late.wait()).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_unknown_barrier_is_invalid_request() {
  setup_tracing();
  let (service, _store) = barrier_service();

  let result = service.arrive("no-such-barrier", &Participant::new("wf-0", "stage-0")).await;

  let err = result.err().unwrap();
  assert_eq!(err.code(), "INVALID_REQUEST");
}

#[tokio::test]
async fn test_non_participant_is_invalid_request() {
  setup_tracing();
  let (service, store) = barrier_service();
  let (barrier, _parties) = register(&service, 2).await;

  let result = service.arrive(&barrier.uuid, &Participant::new("wf-intruder", "stage-x")).await;

  assert!(matches!(result, Err(TandemError::InvalidRequest { .. })));
  assert!(store.get(&barrier.uuid).await.unwrap().unwrap().arrived.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_arrivals_release_exactly_once() {
  setup_tracing();
  let store = Arc::new(InMemoryBarrierStore::new());
  let service = Arc::new(BarrierService::new(
    store.clone(),
    TandemConfig {
      barrier_poll_interval_ms: 20,
      barrier_cas_max_attempts: 1_000,
    },
  ));
  let (barrier, parties) = register(&service, 8).await;

  let mut handles = Vec::new();
  for participant in parties.clone() {
    let service = service.clone();
    let barrier_id = barrier.uuid.clone();
    handles.push(tokio::spawn(async move {
      let wait = service.arrive(&barrier_id, &participant).await?;
      wait.wait().await
    }));
  }
  for handle in handles {
    tokio::time::timeout(Duration::from_secs(5), handle)
      .await
      .expect("participant released")
      .unwrap()
      .unwrap();
  }

  let stored = store.get(&barrier.uuid).await.unwrap().unwrap();
  assert_eq!(stored.state, BarrierState::Down);
  assert_eq!(stored.arrived.len(), parties.len());
  // One successful write per arrival: no arrival lost, none applied twice.
  assert_eq!(stored.version, parties.len() as u64);
}

#[tokio::test]
async fn test_abort_releases_waiters_with_cancellation() {
  setup_tracing();
  let (service, store) = barrier_service();
  let (barrier, parties) = register(&service, 2).await;
  let first = service.arrive(&barrier.uuid, &parties[0]).await.unwrap();

  let aborted = service.abort_pipeline_execution("pexec-1").await.unwrap();
  assert_eq!(aborted, 1);

  let outcome = tokio::time::timeout(Duration::from_secs(1), first.wait()).await.unwrap();
  assert!(matches!(outcome, Err(TandemError::BarrierAborted { .. })));
  assert_eq!(store.get(&barrier.uuid).await.unwrap().unwrap().state, BarrierState::Aborted);

  // Nothing left to abort, and late arrivals see the cancellation.
  assert_eq!(service.abort_pipeline_execution("pexec-1").await.unwrap(), 0);
  let late = service.arrive(&barrier.uuid, &parties[1]).await.unwrap();
  assert!(matches!(late.wait().await, Err(TandemError::BarrierAborted { .. })));
}

#[tokio::test]
async fn test_abort_leaves_released_barriers_alone() {
  setup_tracing();
  let (service, store) = barrier_service();
  let (barrier, parties) = register(&service, 2).await;
  for p in &parties {
    service.arrive(&barrier.uuid, p).await.unwrap();
  }

  assert_eq!(service.abort_pipeline_execution("pexec-1").await.unwrap(), 0);
  assert_eq!(store.get(&barrier.uuid).await.unwrap().unwrap().state, BarrierState::Down);
}

#[tokio::test]
async fn test_purge_removes_records_and_cancels_waiters() {
  setup_tracing();
  let (service, store) = barrier_service();
  let (barrier, parties) = register(&service, 2).await;
  let first = service.arrive(&barrier.uuid, &parties[0]).await.unwrap();

  let removed = service.purge_pipeline_execution("pexec-1").await.unwrap();

  assert_eq!(removed, 1);
  assert!(store.is_empty());
  assert!(service.instances_for("pexec-1").await.unwrap().is_empty());
  let outcome = tokio::time::timeout(Duration::from_secs(1), first.wait()).await.unwrap();
  assert!(matches!(outcome, Err(TandemError::BarrierAborted { .. })));
}

#[tokio::test]
async fn test_waiter_in_other_process_sees_release_by_polling() {
  setup_tracing();
  let store = Arc::new(InMemoryBarrierStore::new());
  let here = BarrierService::new(store.clone(), fast_config());
  let elsewhere = BarrierService::new(store.clone(), fast_config());
  let (barrier, parties) = register(&here, 2).await;

  let waiting = here.arrive(&barrier.uuid, &parties[0]).await.unwrap();
  elsewhere.arrive(&barrier.uuid, &parties[1]).await.unwrap();

  tokio::time::timeout(Duration::from_secs(1), waiting.wait()).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_arrive_by_workflow_id() {
  setup_tracing();
  let (service, _store) = barrier_service();
  let (barrier, _parties) = register(&service, 2).await;

  let wait = service.arrive_workflow(&barrier.uuid, "wf-0").await.unwrap();
  assert!(!wait.is_released());
  assert!(matches!(
    service.arrive_workflow(&barrier.uuid, "wf-unknown").await,
    Err(TandemError::InvalidRequest { .. })
  ));

  // The same workflow in two stages cannot be told apart by workflow id.
  let participants = vec![
    ParticipantWorkflow::new("stage-a", barrier_workflow("wf-shared", &[&["twin"]])),
    ParticipantWorkflow::new("stage-b", barrier_workflow("wf-shared", &[&["twin"]])),
  ];
  let twin = service
    .obtain_instances(APP_ID, &participants, "pexec-1", 0)
    .await
    .unwrap()
    .remove(0);
  assert!(matches!(
    service.arrive_workflow(&twin.uuid, "wf-shared").await,
    Err(TandemError::InvalidRequest { .. })
  ));
}

/// Delegates to an in-memory store but never lets a versioned write through.
struct AlwaysStale {
  inner: InMemoryBarrierStore,
}

#[async_trait]
impl BarrierStore for AlwaysStale {
  async fn create_if_absent(&self, instance: BarrierInstance) -> TandemResult<BarrierInstance> {
    self.inner.create_if_absent(instance).await
  }

  async fn get(&self, barrier_id: &str) -> TandemResult<Option<BarrierInstance>> {
    self.inner.get(barrier_id).await
  }

  async fn compare_and_swap(&self, _expected_version: u64, _updated: BarrierInstance) -> TandemResult<bool> {
    Ok(false)
  }

  async fn list_for_pipeline_execution(&self, pipeline_execution_id: &str) -> TandemResult<Vec<BarrierInstance>> {
    self.inner.list_for_pipeline_execution(pipeline_execution_id).await
  }

  async fn delete_for_pipeline_execution(&self, pipeline_execution_id: &str) -> TandemResult<usize> {
    self.inner.delete_for_pipeline_execution(pipeline_execution_id).await
  }
}

#[tokio::test]
async fn test_bounded_retries_surface_contention() {
  setup_tracing();
  let service = BarrierService::new(
    Arc::new(AlwaysStale {
      inner: InMemoryBarrierStore::new(),
    }),
    TandemConfig {
      barrier_poll_interval_ms: 20,
      barrier_cas_max_attempts: 3,
    },
  );
  let (barrier, parties) = register(&service, 2).await;

  match service.arrive(&barrier.uuid, &parties[0]).await.err().unwrap() {
    TandemError::BarrierContention { attempts, .. } => assert_eq!(attempts, 3),
    e => panic!("Expected BarrierContention, got {:?}", e),
  }
}
