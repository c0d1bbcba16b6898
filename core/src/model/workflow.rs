// tandem/src/model/workflow.rs

//! Workflow definitions as read from the definition store.

use super::variable::Variable;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
  pub uuid: String,
  pub app_id: String,
  pub name: String,
  /// Absent for malformed or legacy definitions.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub orchestration: Option<OrchestrationWorkflow>,
}

impl Workflow {
  /// Declared inputs; empty when the definition carries no orchestration.
  pub fn user_variables(&self) -> &[Variable] {
    self
      .orchestration
      .as_ref()
      .map(|o| o.user_variables.as_slice())
      .unwrap_or(&[])
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationWorkflow {
  #[serde(default)]
  pub pre_deployment_steps: PhaseStep,
  #[serde(default)]
  pub workflow_phases: Vec<WorkflowPhase>,
  #[serde(default)]
  pub post_deployment_steps: PhaseStep,
  #[serde(default)]
  pub user_variables: Vec<Variable>,
}

impl OrchestrationWorkflow {
  /// Phase-steps in execution order: pre-deployment, each phase's steps in
  /// declaration order, then post-deployment.
  pub fn phase_steps(&self) -> impl Iterator<Item = &PhaseStep> {
    std::iter::once(&self.pre_deployment_steps)
      .chain(self.workflow_phases.iter().flat_map(|p| p.phase_steps.iter()))
      .chain(std::iter::once(&self.post_deployment_steps))
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowPhase {
  pub uuid: String,
  pub name: String,
  #[serde(default)]
  pub phase_steps: Vec<PhaseStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseStep {
  #[serde(default)]
  pub uuid: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub steps: Vec<Step>,
}

impl PhaseStep {
  pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
    Self {
      uuid: uuid::Uuid::new_v4().to_string(),
      name: name.into(),
      steps,
    }
  }

  /// Identifiers of the barrier steps in this phase-step, in step order.
  pub fn barrier_identifiers(&self) -> impl Iterator<Item = &str> {
    self.steps.iter().filter_map(|s| match &s.kind {
      StepKind::Barrier { identifier } => Some(identifier.as_str()),
      _ => None,
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
  #[serde(default)]
  pub uuid: String,
  pub name: String,
  #[serde(flatten)]
  pub kind: StepKind,
}

impl Step {
  pub fn barrier(name: impl Into<String>, identifier: impl Into<String>) -> Self {
    Self::new(
      name,
      StepKind::Barrier {
        identifier: identifier.into(),
      },
    )
  }

  pub fn new(name: impl Into<String>, kind: StepKind) -> Self {
    Self {
      uuid: uuid::Uuid::new_v4().to_string(),
      name: name.into(),
      kind,
    }
  }
}

/// Closed set of step kinds the core distinguishes. Only `Barrier` carries data the
/// core reads; the rest are opaque to coordination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepKind {
  Barrier {
    identifier: String,
  },
  ShellScript,
  Http,
  Approval,
  ResourceConstraint,
  Command,
}
