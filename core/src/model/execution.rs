// tandem/src/model/execution.rs

//! Execution records owned by the Execution Engine. The core only reads them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::variable::Variable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowType {
  Orchestration,
  Pipeline,
}

/// Request to start a workflow or pipeline. Immutable once accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionArgs {
  pub workflow_type: WorkflowType,
  pub target_id: String,
  #[serde(default)]
  pub workflow_variables: BTreeMap<String, String>,
}

impl ExecutionArgs {
  pub fn orchestration(workflow_id: impl Into<String>) -> Self {
    Self {
      workflow_type: WorkflowType::Orchestration,
      target_id: workflow_id.into(),
      workflow_variables: BTreeMap::new(),
    }
  }

  pub fn pipeline(pipeline_id: impl Into<String>) -> Self {
    Self {
      workflow_type: WorkflowType::Pipeline,
      target_id: pipeline_id.into(),
      workflow_variables: BTreeMap::new(),
    }
  }

  pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.workflow_variables.insert(name.into(), value.into());
    self
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
  New,
  Queued,
  Running,
  Paused,
  Waiting,
  Success,
  Failed,
  Error,
  Aborted,
  Rejected,
  Expired,
}

impl ExecutionStatus {
  pub fn is_final(&self) -> bool {
    matches!(
      self,
      ExecutionStatus::Success
        | ExecutionStatus::Failed
        | ExecutionStatus::Error
        | ExecutionStatus::Aborted
        | ExecutionStatus::Rejected
        | ExecutionStatus::Expired
    )
  }
}

/// Variables as recorded by the state machine when the execution started.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateMachineSnapshot {
  #[serde(default)]
  pub variables: Vec<Variable>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecution {
  pub uuid: String,
  pub app_id: String,
  pub workflow_type: WorkflowType,
  pub workflow_id: String,
  pub status: ExecutionStatus,
  pub execution_args: ExecutionArgs,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub state_machine: Option<StateMachineSnapshot>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub pipeline_execution: Option<PipelineExecution>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineExecution {
  pub pipeline_id: String,
  #[serde(default)]
  pub stage_executions: Vec<PipelineStageExecution>,
}

impl PipelineExecution {
  pub fn stage_execution(&self, stage_element_id: &str) -> Option<&PipelineStageExecution> {
    self
      .stage_executions
      .iter()
      .find(|s| s.pipeline_stage_element_id == stage_element_id)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStageExecution {
  pub pipeline_stage_element_id: String,
  pub stage_name: String,
  pub status: ExecutionStatus,
  /// Values the stage actually started with, after pipeline substitution.
  #[serde(default)]
  pub workflow_variables: BTreeMap<String, String>,
  #[serde(default)]
  pub workflow_execution_ids: Vec<String>,
}
