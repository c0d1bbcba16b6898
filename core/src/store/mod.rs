// tandem/src/store/mod.rs

//! Collaborator seams. The core reads definitions and executions through these
//! traits and keeps barrier records in a `BarrierStore`; implementations backed by
//! a real database live outside this crate.

pub mod memory;

use crate::error::TandemResult;
use crate::model::{BarrierInstance, Pipeline, Variable, Workflow, WorkflowExecution};
use crate::variables::pipeline_vars::derive_pipeline_variables;

use async_trait::async_trait;
use std::collections::HashMap;

pub use memory::{InMemoryBarrierStore, InMemoryDefinitionStore, InMemoryExecutionStore};

#[async_trait]
pub trait DefinitionStore: Send + Sync {
  async fn get_workflow(&self, app_id: &str, workflow_id: &str) -> TandemResult<Option<Workflow>>;

  async fn get_pipeline(&self, app_id: &str, pipeline_id: &str) -> TandemResult<Option<Pipeline>>;

  /// Pipeline-level variable schema. By default derived from the workflows the
  /// pipeline's enabled stages run.
  async fn get_pipeline_variables(&self, app_id: &str, pipeline_id: &str) -> TandemResult<Vec<Variable>> {
    let pipeline = match self.get_pipeline(app_id, pipeline_id).await? {
      Some(p) => p,
      None => return Ok(Vec::new()),
    };
    let mut workflows = HashMap::new();
    for (_, workflow_id) in pipeline.workflow_elements() {
      if workflows.contains_key(workflow_id) {
        continue;
      }
      if let Some(workflow) = self.get_workflow(app_id, workflow_id).await? {
        workflows.insert(workflow_id.to_string(), workflow);
      }
    }
    derive_pipeline_variables(&pipeline, &workflows)
  }
}

#[async_trait]
pub trait ExecutionStore: Send + Sync {
  /// Workflow or pipeline execution by id. Pipeline executions carry their stage
  /// executions nested.
  async fn get_workflow_execution(&self, app_id: &str, execution_id: &str) -> TandemResult<Option<WorkflowExecution>>;
}

/// Durable home of `BarrierInstance` records. Participants may live in different
/// processes; this store is the only thing they share.
#[async_trait]
pub trait BarrierStore: Send + Sync {
  /// Conditional create keyed by `(pipeline.execution_id, name, participants)`.
  /// Returns the stored record, which is the pre-existing one when the key is
  /// taken. Two concurrency groups of one execution sharing an identifier get one
  /// record each.
  async fn create_if_absent(&self, instance: BarrierInstance) -> TandemResult<BarrierInstance>;

  async fn get(&self, barrier_id: &str) -> TandemResult<Option<BarrierInstance>>;

  /// Replaces the record only if its stored version still equals
  /// `expected_version`; the stored copy gets `expected_version + 1`. Returns
  /// whether the write happened.
  async fn compare_and_swap(&self, expected_version: u64, updated: BarrierInstance) -> TandemResult<bool>;

  async fn list_for_pipeline_execution(&self, pipeline_execution_id: &str) -> TandemResult<Vec<BarrierInstance>>;

  /// Returns the number of records removed.
  async fn delete_for_pipeline_execution(&self, pipeline_execution_id: &str) -> TandemResult<usize>;
}
