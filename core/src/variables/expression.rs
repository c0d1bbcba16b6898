// tandem/src/variables/expression.rs

//! `${name}` expressions in stage variable values, and the stage-input
//! preparation that substitutes them.
//!
//! Only plain references (no dot) name a pipeline variable. Dotted expressions
//! such as `${workflow.variables.x}` or `${app.name}` belong to the execution-time
//! expression evaluator and are passed through untouched.

use crate::error::{TandemError, TandemResult};
use crate::model::{PipelineStageElement, Variable};

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::{event, Level};

static VARIABLE_PATTERN: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^\$\{([^{}]*)\}$").expect("variable pattern is a valid regex"));

pub fn matches_variable_pattern(value: &str) -> bool {
  VARIABLE_PATTERN.is_match(value)
}

/// Name of the pipeline variable `value` refers to, if it is a plain reference.
pub fn pipeline_variable_reference(value: &str) -> Option<&str> {
  let captures = VARIABLE_PATTERN.captures(value)?;
  let name = captures.get(1)?.as_str();
  if name.is_empty() || name.contains('.') {
    None
  } else {
    Some(name)
  }
}

/// Replaces a plain `${pipelineVar}` reference with its pipeline value. `None`
/// when the reference has no usable value; other values come back unchanged.
pub fn substitute(value: &str, pipeline_values: &BTreeMap<String, String>) -> Option<String> {
  match pipeline_variable_reference(value) {
    Some(name) => pipeline_values.get(name).filter(|v| !v.is_empty()).cloned(),
    None => Some(value.to_string()),
  }
}

fn non_empty<'a>(map: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
  map.get(key).map(String::as_str).filter(|v| !v.is_empty())
}

/// Stage-level value, or the same-named pipeline value when the stage leaves it
/// blank. An unresolvable reference is kept verbatim so the check below can name
/// it.
fn stage_value(
  name: &str,
  stage_values: &BTreeMap<String, String>,
  pipeline_values: &BTreeMap<String, String>,
) -> Option<String> {
  match non_empty(stage_values, name) {
    None => non_empty(pipeline_values, name).map(str::to_string),
    Some(raw) => match pipeline_variable_reference(raw) {
      Some(reference) => non_empty(pipeline_values, reference)
        .map(str::to_string)
        .or_else(|| Some(raw.to_string())),
      None => Some(raw.to_string()),
    },
  }
}

/// Effective inputs for a workflow started by one pipeline stage, keyed by the
/// workflow's declared variable names. Undeclared stage values are dropped.
pub fn override_workflow_variables(
  variables: &[Variable],
  stage_values: &BTreeMap<String, String>,
  pipeline_values: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
  let mut resolved = BTreeMap::new();
  for variable in variables {
    match stage_value(&variable.name, stage_values, pipeline_values) {
      Some(value) => {
        resolved.insert(variable.name.clone(), value);
      }
      None => event!(Level::TRACE, variable = %variable.name, "No stage or pipeline value."),
    }
  }
  resolved
}

/// Every mandatory, non-fixed workflow variable must end up with a concrete value
/// unless the stage defers it to a runtime prompt.
pub fn check_workflow_variables_overrides(
  element: &PipelineStageElement,
  variables: &[Variable],
  stage_values: &BTreeMap<String, String>,
  pipeline_values: &BTreeMap<String, String>,
) -> TandemResult<()> {
  if element.disabled {
    return Ok(());
  }
  for variable in variables.iter().filter(|v| v.mandatory && !v.fixed) {
    let is_entity = variable.is_entity();
    let prefix = if is_entity { "Templatized" } else { "Required" };
    let final_value = match non_empty(stage_values, &variable.name) {
      None => non_empty(pipeline_values, &variable.name).map(str::to_string),
      Some(raw) => match pipeline_variable_reference(raw) {
        Some(reference) => non_empty(pipeline_values, reference).map(str::to_string),
        None => Some(raw.to_string()),
      },
    };

    match final_value {
      None if !element.is_runtime_input(&variable.name) => {
        let message = format!(
          "{} variable {} is not set for stage {}",
          prefix, variable.name, element.name
        );
        event!(Level::ERROR, stage = %element.name, "{}", message);
        return Err(TandemError::InvalidRequest { message });
      }
      Some(value) if matches_variable_pattern(&value) && (is_entity || !value.contains('.')) => {
        let message = format!(
          "{} variable {} for stage {} cannot be left as an expression",
          prefix, variable.name, element.name
        );
        event!(Level::ERROR, stage = %element.name, "{}", message);
        return Err(TandemError::InvalidRequest { message });
      }
      _ => {}
    }
  }
  Ok(())
}
