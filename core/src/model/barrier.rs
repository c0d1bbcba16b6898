// tandem/src/model/barrier.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BarrierState {
  Pending,
  Down,
  /// The owning pipeline execution was aborted while the barrier was pending.
  Aborted,
}

/// One workflow running as one pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
  pub workflow_id: String,
  pub pipeline_stage_id: String,
}

impl Participant {
  pub fn new(workflow_id: impl Into<String>, pipeline_stage_id: impl Into<String>) -> Self {
    Self {
      workflow_id: workflow_id.into(),
      pipeline_stage_id: pipeline_stage_id.into(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BarrierPipeline {
  pub execution_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BarrierInstance {
  pub uuid: String,
  pub app_id: String,
  /// The barrier identifier shared by the participating steps.
  pub name: String,
  pub pipeline: BarrierPipeline,
  pub participants: BTreeSet<Participant>,
  #[serde(default)]
  pub arrived: BTreeSet<Participant>,
  pub state: BarrierState,
  /// Bumped on every stored update; drives compare-and-swap.
  #[serde(default)]
  pub version: u64,
}

impl BarrierInstance {
  pub fn new_pending(
    app_id: impl Into<String>,
    name: impl Into<String>,
    pipeline_execution_id: impl Into<String>,
    participants: BTreeSet<Participant>,
  ) -> Self {
    Self {
      uuid: uuid::Uuid::new_v4().to_string(),
      app_id: app_id.into(),
      name: name.into(),
      pipeline: BarrierPipeline {
        execution_id: pipeline_execution_id.into(),
      },
      participants,
      arrived: BTreeSet::new(),
      state: BarrierState::Pending,
      version: 0,
    }
  }

  pub fn is_complete(&self) -> bool {
    self.arrived == self.participants
  }

  /// Participants whose workflow id matches. Two stages may run the same workflow.
  pub fn participants_for_workflow<'a>(&'a self, workflow_id: &'a str) -> impl Iterator<Item = &'a Participant> + 'a {
    self.participants.iter().filter(move |p| p.workflow_id == workflow_id)
  }
}
