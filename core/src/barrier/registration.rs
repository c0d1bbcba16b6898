// tandem/src/barrier/registration.rs

//! Derives which barrier instances a pipeline execution needs.
//!
//! Each participant's workflow is flattened into its phase-step sequence and all
//! sequences are walked in lock step. A barrier identifier shared by two or more
//! participants becomes one instance; an identifier only one participant uses has
//! nobody to wait for and is dropped.

use super::BarrierService;
use crate::error::{TandemError, TandemResult};
use crate::model::{BarrierInstance, Participant, PhaseStep, Pipeline, PipelineStageElement, Workflow};

use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{event, instrument, Level};

/// A workflow taking part in a pipeline execution, as one stage.
#[derive(Debug, Clone)]
pub struct ParticipantWorkflow {
  pub participant: Participant,
  pub workflow: Workflow,
}

impl ParticipantWorkflow {
  pub fn new(pipeline_stage_id: impl Into<String>, workflow: Workflow) -> Self {
    Self {
      participant: Participant::new(workflow.uuid.clone(), pipeline_stage_id),
      workflow,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedBarrier {
  pub identifier: String,
  /// Phase-step position where the identifier was first seen.
  pub position: usize,
  pub participants: BTreeSet<Participant>,
}

fn phase_step_sequence(workflow: &Workflow) -> Vec<&PhaseStep> {
  match &workflow.orchestration {
    Some(orchestration) => orchestration.phase_steps().collect(),
    None => {
      event!(Level::WARN, workflow_id = %workflow.uuid, "Workflow has no orchestration; it contributes no barriers.");
      Vec::new()
    }
  }
}

/// Groups barrier steps by identifier across all participants, skipping the first
/// `position_offset` phase-steps of every sequence. Instances are returned in
/// order of first appearance.
pub fn plan_barriers(participants: &[ParticipantWorkflow], position_offset: usize) -> TandemResult<Vec<PlannedBarrier>> {
  let sequences: Vec<Vec<&PhaseStep>> = participants.iter().map(|p| phase_step_sequence(&p.workflow)).collect();
  let longest = sequences.iter().map(Vec::len).max().unwrap_or(0);

  let mut seen: Vec<HashSet<&str>> = vec![HashSet::new(); participants.len()];
  let mut planned: Vec<PlannedBarrier> = Vec::new();
  let mut by_identifier: HashMap<&str, usize> = HashMap::new();

  for position in position_offset..longest {
    for (index, sequence) in sequences.iter().enumerate() {
      let phase_step = match sequence.get(position) {
        Some(ps) => *ps,
        None => continue,
      };
      let participant = &participants[index].participant;
      for raw in phase_step.barrier_identifiers() {
        let identifier = raw.trim();
        if identifier.is_empty() {
          event!(
            Level::WARN,
            workflow_id = %participant.workflow_id,
            phase_step = %phase_step.name,
            "Barrier step without an identifier ignored."
          );
          continue;
        }
        if !seen[index].insert(identifier) {
          event!(
            Level::ERROR,
            workflow_id = %participant.workflow_id,
            identifier,
            "Barrier identifier repeated within one workflow."
          );
          return Err(TandemError::BarriersNotRunningConcurrently {
            identifier: identifier.to_string(),
            workflow_id: participant.workflow_id.clone(),
          });
        }
        let slot = *by_identifier.entry(identifier).or_insert_with(|| {
          planned.push(PlannedBarrier {
            identifier: identifier.to_string(),
            position,
            participants: BTreeSet::new(),
          });
          planned.len() - 1
        });
        planned[slot].participants.insert(participant.clone());
      }
    }
  }

  let (kept, dropped): (Vec<_>, Vec<_>) = planned.into_iter().partition(|b| b.participants.len() >= 2);
  for barrier in &dropped {
    event!(Level::DEBUG, identifier = %barrier.identifier, "Barrier identifier has a single participant; not materialised.");
  }
  Ok(kept)
}

/// Splits a pipeline's enabled workflow stages into groups that run together. A
/// stage not flagged `parallel` closes the current group, even when that stage is
/// itself skipped.
pub fn group_parallel_stages(pipeline: &Pipeline) -> Vec<Vec<(&PipelineStageElement, &str)>> {
  let mut groups = Vec::new();
  let mut current: Vec<(&PipelineStageElement, &str)> = Vec::new();
  for stage in &pipeline.stages {
    if !stage.parallel && !current.is_empty() {
      groups.push(std::mem::take(&mut current));
    }
    let element = &stage.element;
    if element.disabled {
      continue;
    }
    if let Some(workflow_id) = element.workflow_id() {
      current.push((element, workflow_id));
    }
  }
  if !current.is_empty() {
    groups.push(current);
  }
  groups
}

impl BarrierService {
  /// Registers the barrier instances a set of concurrently running participants
  /// needs. Re-registering returns the stored instances unchanged.
  #[instrument(
    name = "BarrierService::obtain_instances",
    skip(self, participants),
    fields(participant_count = participants.len()),
    err(Display)
  )]
  pub async fn obtain_instances(
    &self,
    app_id: &str,
    participants: &[ParticipantWorkflow],
    pipeline_execution_id: &str,
    position_offset: usize,
  ) -> TandemResult<Vec<BarrierInstance>> {
    let planned = plan_barriers(participants, position_offset)?;

    let mut instances = Vec::with_capacity(planned.len());
    for barrier in planned {
      let candidate = BarrierInstance::new_pending(
        app_id,
        barrier.identifier.clone(),
        pipeline_execution_id,
        barrier.participants,
      );
      let stored = self.store().create_if_absent(candidate.clone()).await?;
      if stored.participants != candidate.participants {
        // Only reachable with a store that leaves the participant set out of its key.
        let stranded = candidate
          .participants
          .symmetric_difference(&stored.participants)
          .next()
          .map(|p| p.workflow_id.as_str())
          .unwrap_or_default();
        event!(
          Level::ERROR,
          barrier_id = %stored.uuid,
          identifier = %stored.name,
          workflow_id = stranded,
          "Stored barrier instance does not cover the planned participants."
        );
        return Err(TandemError::invalid_request(format!(
          "Barrier '{}' is registered for pipeline execution '{}' with a participant set that disagrees on workflow '{}'",
          stored.name, pipeline_execution_id, stranded
        )));
      }
      instances.push(stored);
    }

    event!(
      Level::INFO,
      pipeline_execution_id,
      barrier_count = instances.len(),
      "Barrier registration complete."
    );
    Ok(instances)
  }
}
