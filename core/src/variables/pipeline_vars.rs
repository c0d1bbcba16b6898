// tandem/src/variables/pipeline_vars.rs

//! Pipeline-level variable schema, derived from the workflows the pipeline's
//! stages run and the values each stage assigns to them.
//!
//! A stage that assigns `${name}` to a workflow input promotes that input to a
//! pipeline variable called `name`. Text inputs left blank by the stage are
//! promoted under their own name. Literal assignments stay private to the stage.

use super::expression::{matches_variable_pattern, pipeline_variable_reference};
use super::runtime::DependencyGraph;
use crate::error::{TandemError, TandemResult};
use crate::model::variable::RELATED_FIELD;
use crate::model::{EntityType, Pipeline, PipelineStageElement, Variable, Workflow};

use std::collections::{BTreeMap, HashMap};
use tracing::{event, Level};

struct StageView<'a> {
  element: &'a PipelineStageElement,
  workflow_vars: &'a [Variable],
  values: &'a BTreeMap<String, String>,
}

impl<'a> StageView<'a> {
  fn value(&self, name: &str) -> Option<&'a str> {
    self.values.get(name).map(String::as_str).filter(|v| !v.is_empty())
  }

  fn reference(&self, name: &str) -> Option<&'a str> {
    self.value(name).and_then(pipeline_variable_reference)
  }

  fn literal(&self, name: &str) -> Option<&'a str> {
    self.value(name).filter(|v| !matches_variable_pattern(v))
  }

  /// Pipeline names of this stage's templatized infrastructure inputs.
  fn infra_pipeline_names(&self) -> Vec<&'a str> {
    self
      .workflow_vars
      .iter()
      .filter(|v| v.entity_type().ok().flatten() == Some(EntityType::InfrastructureDefinition))
      .filter_map(|v| self.reference(&v.name))
      .collect()
  }
}

/// Derives the pipeline variable schema. `workflows` is keyed by workflow id;
/// stages whose workflow is missing are skipped.
pub fn derive_pipeline_variables(
  pipeline: &Pipeline,
  workflows: &HashMap<String, Workflow>,
) -> TandemResult<Vec<Variable>> {
  let mut derived: Vec<Variable> = Vec::new();

  for (element, workflow_id) in pipeline.workflow_elements() {
    let workflow = match workflows.get(workflow_id) {
      Some(w) => w,
      None => {
        event!(
          Level::WARN,
          pipeline_id = %pipeline.uuid,
          stage = %element.name,
          workflow_id,
          "Stage workflow not found; it contributes no pipeline variables."
        );
        continue;
      }
    };
    let stage = StageView {
      element,
      workflow_vars: workflow.user_variables(),
      values: &element.workflow_variables,
    };
    let graph = DependencyGraph::build(stage.workflow_vars);
    let infra_count = stage
      .workflow_vars
      .iter()
      .filter(|v| v.entity_type().ok().flatten() == Some(EntityType::InfrastructureDefinition))
      .count();

    for (index, variable) in stage.workflow_vars.iter().enumerate() {
      let is_runtime = element.is_runtime_input(&variable.name);
      let entity_type = variable.entity_type()?;
      match entity_type {
        None => derive_text(&mut derived, &stage, variable, is_runtime)?,
        Some(entity_type) => {
          let allow_multi = (infra_count == 1 && entity_type == EntityType::InfrastructureDefinition)
            || entity_type == EntityType::UserGroup;
          derive_entity(&mut derived, &stage, &graph, index, variable, entity_type, allow_multi, is_runtime)?;
        }
      }
    }
  }

  // Entities first; stable within each group.
  let (entities, texts): (Vec<_>, Vec<_>) = derived.into_iter().partition(Variable::is_entity);
  Ok(entities.into_iter().chain(texts).collect())
}

#[allow(clippy::too_many_arguments)]
fn derive_entity(
  derived: &mut Vec<Variable>,
  stage: &StageView<'_>,
  graph: &DependencyGraph,
  index: usize,
  variable: &Variable,
  entity_type: EntityType,
  allow_multi: bool,
  is_runtime: bool,
) -> TandemResult<()> {
  let pipeline_name = match stage.reference(&variable.name) {
    Some(name) => name,
    None => return Ok(()),
  };

  let mut candidate = variable.clone();
  candidate.name = pipeline_name.to_string();
  candidate.value = None;

  let related: Vec<String> = if entity_type == EntityType::Environment {
    stage.infra_pipeline_names().into_iter().map(str::to_string).collect()
  } else {
    variable
      .related_fields()
      .into_iter()
      .filter_map(|r| stage.reference(r))
      .map(str::to_string)
      .collect()
  };
  set_related(&mut candidate, related);

  // Parents fixed to a literal by this stage narrow the candidate's picker.
  for &parent_index in graph.parents_of(index) {
    let parent = &stage.workflow_vars[parent_index];
    let key = parent.entity_type().ok().flatten().and_then(|t| t.dependency_metadata_key());
    if let (Some(key), Some(value)) = (key, stage.literal(&parent.name)) {
      candidate.metadata.insert(key.to_string(), value.to_string());
    }
  }

  match derived.iter_mut().find(|v| v.name == pipeline_name) {
    None => {
      candidate.allow_multiple_values = allow_multi;
      candidate.runtime_input = is_runtime;
      event!(
        Level::DEBUG,
        pipeline_variable = pipeline_name,
        stage = %stage.element.name,
        "Promoted entity input to pipeline variable."
      );
      derived.push(candidate);
    }
    Some(stored) => {
      check_runtime(stored, is_runtime)?;
      stored.mandatory |= candidate.mandatory;
      if entity_type == EntityType::InfrastructureDefinition {
        stored.allow_multiple_values = stored.allow_multiple_values && allow_multi;
      }
      let mut merged: Vec<String> = stored.related_fields().into_iter().map(str::to_string).collect();
      for name in candidate.related_fields() {
        if !merged.iter().any(|m| m == name) {
          merged.push(name.to_string());
        }
      }
      set_related(stored, merged);
      for (key, value) in candidate.metadata {
        if key != RELATED_FIELD {
          stored.metadata.entry(key).or_insert(value);
        }
      }
    }
  }
  Ok(())
}

fn derive_text(
  derived: &mut Vec<Variable>,
  stage: &StageView<'_>,
  variable: &Variable,
  is_runtime: bool,
) -> TandemResult<()> {
  if variable.fixed {
    return Ok(());
  }
  let mut candidate = match stage.value(&variable.name) {
    None => variable.clone(),
    Some(raw) => match pipeline_variable_reference(raw) {
      Some(name) => {
        let mut clone = variable.clone();
        clone.name = name.to_string();
        clone
      }
      None => return Ok(()),
    },
  };

  match derived.iter_mut().find(|v| v.name == candidate.name) {
    None => {
      candidate.runtime_input = is_runtime;
      derived.push(candidate);
    }
    Some(stored) => {
      stored.mandatory |= candidate.mandatory;
      merge_allowed_values(stored, candidate.allowed_values.take())?;
      check_runtime(stored, is_runtime)?;
      overwrite_default(stored, candidate.value.take());
    }
  }
  Ok(())
}

fn set_related(variable: &mut Variable, related: Vec<String>) {
  if related.is_empty() {
    variable.metadata.remove(RELATED_FIELD);
  } else {
    variable.metadata.insert(RELATED_FIELD.to_string(), related.join(","));
  }
}

fn check_runtime(stored: &Variable, is_runtime: bool) -> TandemResult<()> {
  if stored.runtime_input != is_runtime {
    return Err(TandemError::invalid_request(format!(
      "Variable {} is not marked as runtime in all pipeline stages",
      stored.name
    )));
  }
  Ok(())
}

fn merge_allowed_values(stored: &mut Variable, incoming: Option<Vec<String>>) -> TandemResult<()> {
  let incoming = match incoming {
    Some(list) => list,
    None => return Ok(()),
  };
  let current = stored.allowed_values.take().unwrap_or_else(|| incoming.clone());
  let mut common: Vec<String> = Vec::new();
  for value in current {
    if incoming.contains(&value) && !common.contains(&value) {
      common.push(value);
    }
  }
  if common.is_empty() {
    return Err(TandemError::invalid_request(format!(
      "Variable {} does not have any common allowed values between all stages",
      stored.name
    )));
  }
  if let Some(value) = &stored.value {
    if !common.contains(value) {
      stored.value = None;
    }
  }
  stored.allowed_values = Some(common);
  Ok(())
}

fn overwrite_default(stored: &mut Variable, value: Option<String>) {
  let value = match value.filter(|v| !v.is_empty()) {
    Some(v) => v,
    None => return,
  };
  let allowed = stored.allowed_values.as_ref().map_or(true, |list| list.contains(&value));
  if allowed {
    stored.value = Some(value);
  }
}
