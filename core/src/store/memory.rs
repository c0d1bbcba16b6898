// tandem/src/store/memory.rs

//! In-process store implementations. Guards are never held across an await.

use super::{BarrierStore, DefinitionStore, ExecutionStore};
use crate::error::TandemResult;
use crate::model::{BarrierInstance, Participant, Pipeline, Workflow, WorkflowExecution};

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use tracing::{event, Level};

type AppKey = (String, String);
type BarrierKey = (String, String, BTreeSet<Participant>);

fn key(app_id: &str, id: &str) -> AppKey {
  (app_id.to_string(), id.to_string())
}

#[derive(Default)]
pub struct InMemoryDefinitionStore {
  workflows: RwLock<HashMap<AppKey, Workflow>>,
  pipelines: RwLock<HashMap<AppKey, Pipeline>>,
}

impl InMemoryDefinitionStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn put_workflow(&self, workflow: Workflow) {
    let k = key(&workflow.app_id, &workflow.uuid);
    self.workflows.write().insert(k, workflow);
  }

  pub fn put_pipeline(&self, pipeline: Pipeline) {
    let k = key(&pipeline.app_id, &pipeline.uuid);
    self.pipelines.write().insert(k, pipeline);
  }
}

#[async_trait]
impl DefinitionStore for InMemoryDefinitionStore {
  async fn get_workflow(&self, app_id: &str, workflow_id: &str) -> TandemResult<Option<Workflow>> {
    Ok(self.workflows.read().get(&key(app_id, workflow_id)).cloned())
  }

  async fn get_pipeline(&self, app_id: &str, pipeline_id: &str) -> TandemResult<Option<Pipeline>> {
    Ok(self.pipelines.read().get(&key(app_id, pipeline_id)).cloned())
  }
}

#[derive(Default)]
pub struct InMemoryExecutionStore {
  executions: RwLock<HashMap<AppKey, WorkflowExecution>>,
}

impl InMemoryExecutionStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn put_execution(&self, execution: WorkflowExecution) {
    let k = key(&execution.app_id, &execution.uuid);
    self.executions.write().insert(k, execution);
  }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
  async fn get_workflow_execution(&self, app_id: &str, execution_id: &str) -> TandemResult<Option<WorkflowExecution>> {
    Ok(self.executions.read().get(&key(app_id, execution_id)).cloned())
  }
}

#[derive(Default)]
struct BarrierTables {
  by_id: HashMap<String, BarrierInstance>,
  // (pipeline execution id, identifier, participants) -> barrier id
  by_key: HashMap<BarrierKey, String>,
}

/// Barrier records behind one lock, so the conditional create and the versioned
/// update are each a single critical section.
#[derive(Default)]
pub struct InMemoryBarrierStore {
  tables: RwLock<BarrierTables>,
}

impl InMemoryBarrierStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.tables.read().by_id.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[async_trait]
impl BarrierStore for InMemoryBarrierStore {
  async fn create_if_absent(&self, instance: BarrierInstance) -> TandemResult<BarrierInstance> {
    let mut tables = self.tables.write();
    let natural_key = (
      instance.pipeline.execution_id.clone(),
      instance.name.clone(),
      instance.participants.clone(),
    );
    if let Some(existing) = tables.by_key.get(&natural_key).and_then(|id| tables.by_id.get(id)) {
      event!(Level::TRACE, barrier_id = %existing.uuid, identifier = %existing.name, "Barrier already registered.");
      return Ok(existing.clone());
    }
    tables.by_key.insert(natural_key, instance.uuid.clone());
    tables.by_id.insert(instance.uuid.clone(), instance.clone());
    Ok(instance)
  }

  async fn get(&self, barrier_id: &str) -> TandemResult<Option<BarrierInstance>> {
    Ok(self.tables.read().by_id.get(barrier_id).cloned())
  }

  async fn compare_and_swap(&self, expected_version: u64, mut updated: BarrierInstance) -> TandemResult<bool> {
    let mut tables = self.tables.write();
    match tables.by_id.get_mut(&updated.uuid) {
      Some(current) if current.version == expected_version => {
        updated.version = expected_version + 1;
        *current = updated;
        Ok(true)
      }
      _ => Ok(false),
    }
  }

  async fn list_for_pipeline_execution(&self, pipeline_execution_id: &str) -> TandemResult<Vec<BarrierInstance>> {
    let tables = self.tables.read();
    let mut found: Vec<BarrierInstance> = tables
      .by_id
      .values()
      .filter(|b| b.pipeline.execution_id == pipeline_execution_id)
      .cloned()
      .collect();
    found.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(found)
  }

  async fn delete_for_pipeline_execution(&self, pipeline_execution_id: &str) -> TandemResult<usize> {
    let mut tables = self.tables.write();
    let doomed: Vec<String> = tables
      .by_id
      .values()
      .filter(|b| b.pipeline.execution_id == pipeline_execution_id)
      .map(|b| b.uuid.clone())
      .collect();
    for id in &doomed {
      tables.by_id.remove(id);
    }
    tables.by_key.retain(|(exec_id, _, _), _| exec_id != pipeline_execution_id);
    Ok(doomed.len())
  }
}
