// tandem/src/model/pipeline.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
  pub uuid: String,
  pub app_id: String,
  pub name: String,
  #[serde(default)]
  pub stages: Vec<PipelineStage>,
}

impl Pipeline {
  pub fn stage_element(&self, element_id: &str) -> Option<&PipelineStageElement> {
    self.stages.iter().map(|s| &s.element).find(|e| e.uuid == element_id)
  }

  /// Enabled stage elements that start a workflow.
  pub fn workflow_elements(&self) -> impl Iterator<Item = (&PipelineStageElement, &str)> {
    self
      .stages
      .iter()
      .map(|s| &s.element)
      .filter(|e| !e.disabled)
      .filter_map(|e| e.workflow_id().map(|id| (e, id)))
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStage {
  pub name: String,
  /// Runs together with the previous stage.
  #[serde(default)]
  pub parallel: bool,
  pub element: PipelineStageElement,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStageElement {
  pub uuid: String,
  pub name: String,
  #[serde(flatten)]
  pub kind: StageElementKind,
  #[serde(default)]
  pub disabled: bool,
  /// Stage-level assignments for the workflow's inputs. A value may be a literal or
  /// a `${pipelineVar}` reference.
  #[serde(default)]
  pub workflow_variables: BTreeMap<String, String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub runtime_inputs: Option<RuntimeInputsConfig>,
}

impl PipelineStageElement {
  pub fn workflow(name: impl Into<String>, workflow_id: impl Into<String>) -> Self {
    Self {
      uuid: uuid::Uuid::new_v4().to_string(),
      name: name.into(),
      kind: StageElementKind::EnvState {
        workflow_id: workflow_id.into(),
      },
      disabled: false,
      workflow_variables: BTreeMap::new(),
      runtime_inputs: None,
    }
  }

  pub fn workflow_id(&self) -> Option<&str> {
    match &self.kind {
      StageElementKind::EnvState { workflow_id } => Some(workflow_id.as_str()),
      StageElementKind::Approval => None,
    }
  }

  pub fn is_runtime_input(&self, variable_name: &str) -> bool {
    self
      .runtime_inputs
      .as_ref()
      .map_or(false, |r| r.runtime_input_variables.iter().any(|n| n == variable_name))
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageElementKind {
  /// Starts a workflow.
  #[serde(rename_all = "camelCase")]
  EnvState { workflow_id: String },
  Approval,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeInputsConfig {
  #[serde(default)]
  pub runtime_input_variables: Vec<String>,
  #[serde(default)]
  pub timeout_millis: u64,
}
