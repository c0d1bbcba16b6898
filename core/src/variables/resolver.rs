// tandem/src/variables/resolver.rs

//! The resolution pass: schema + prior execution + caller overrides in, the
//! variables still worth showing (with values) and a drift flag out.
//!
//! Resolution is a pure function of its request. It is called for live previews,
//! so identical requests must produce identical output.

use super::drift::schemas_match;
use super::expression::substitute;
use super::runtime::{annotate_runtime_dependencies, DependencyGraph};
use crate::error::TandemResult;
use crate::model::{ExecutionArgs, Variable, WorkflowExecution};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{event, instrument, Level};

#[derive(Debug, Clone, Copy)]
pub struct ResolutionRequest<'a> {
  /// Current variable schema of the workflow or pipeline.
  pub schema: &'a [Variable],
  pub execution_args: &'a ExecutionArgs,
  pub prior_execution: Option<&'a WorkflowExecution>,
  /// Resolved values of the enclosing pipeline, used to substitute
  /// `${pipelineVar}` references. `None` outside a pipeline.
  pub pipeline_values: Option<&'a BTreeMap<String, String>>,
}

impl<'a> ResolutionRequest<'a> {
  pub fn new(schema: &'a [Variable], execution_args: &'a ExecutionArgs) -> Self {
    Self {
      schema,
      execution_args,
      prior_execution: None,
      pipeline_values: None,
    }
  }

  pub fn with_prior_execution(mut self, prior: Option<&'a WorkflowExecution>) -> Self {
    self.prior_execution = prior;
    self
  }

  pub fn with_pipeline_values(mut self, values: &'a BTreeMap<String, String>) -> Self {
    self.pipeline_values = Some(values);
    self
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedVariables {
  pub variables: Vec<Variable>,
  /// The recorded schema of the prior execution differs from the current one.
  pub changed: bool,
}

enum Baseline {
  /// Schema defaults with caller overrides.
  Fresh,
  /// Prior execution unusable; nothing carried, nothing flagged.
  Cleared,
  /// Prior schema differs; nothing carried.
  Drifted,
  Carried(BTreeMap<String, String>),
}

pub struct VariableResolver;

impl VariableResolver {
  #[instrument(
    name = "VariableResolver::resolve",
    skip_all,
    fields(
      target_id = %request.execution_args.target_id,
      workflow_type = ?request.execution_args.workflow_type,
      has_prior = request.prior_execution.is_some(),
    ),
    err(Display)
  )]
  pub fn resolve(request: ResolutionRequest<'_>) -> TandemResult<ResolvedVariables> {
    for variable in request.schema {
      variable.entity_type()?;
    }

    let baseline = Self::baseline(&request);
    let changed = matches!(baseline, Baseline::Drifted);

    let mut working: Vec<Variable> = request.schema.to_vec();
    for variable in working.iter_mut() {
      variable.value = match &baseline {
        Baseline::Fresh => request
          .execution_args
          .workflow_variables
          .get(&variable.name)
          .filter(|v| !v.is_empty())
          .cloned()
          .or_else(|| variable.value.clone()),
        Baseline::Cleared | Baseline::Drifted => None,
        Baseline::Carried(carried) => request
          .execution_args
          .workflow_variables
          .get(&variable.name)
          .filter(|v| !v.is_empty())
          .or_else(|| carried.get(&variable.name))
          .cloned(),
      };
    }

    if let Some(pipeline_values) = request.pipeline_values {
      for variable in working.iter_mut() {
        if let Some(raw) = variable.value.take() {
          variable.value = substitute(&raw, pipeline_values);
          if variable.value.is_none() {
            event!(Level::DEBUG, variable = %variable.name, expression = %raw, "Pipeline reference did not resolve.");
          }
        }
      }
    }

    annotate_runtime_dependencies(&mut working);

    let graph = DependencyGraph::build(&working);
    let depths: Vec<usize> = (0..working.len()).map(|i| graph.depth(i)).collect();
    let kept = Self::order(Self::meaningful(request.schema, working), &depths);
    event!(
      Level::DEBUG,
      returned = kept.len(),
      declared = request.schema.len(),
      changed,
      "Variable resolution complete."
    );
    Ok(ResolvedVariables {
      variables: kept,
      changed,
    })
  }

  fn baseline(request: &ResolutionRequest<'_>) -> Baseline {
    let prior = match request.prior_execution {
      Some(p) => p,
      None => return Baseline::Fresh,
    };
    let args = request.execution_args;
    if prior.workflow_type != args.workflow_type || prior.workflow_id != args.target_id {
      event!(
        Level::WARN,
        prior_execution = %prior.uuid,
        prior_target = %prior.workflow_id,
        requested_target = %args.target_id,
        "Prior execution targets a different workflow; ignoring it."
      );
      return Baseline::Cleared;
    }
    let recorded = match &prior.state_machine {
      Some(snapshot) => &snapshot.variables,
      None => {
        event!(Level::WARN, prior_execution = %prior.uuid, "Prior execution has no recorded state; ignoring it.");
        return Baseline::Cleared;
      }
    };
    if !schemas_match(request.schema, recorded) {
      event!(
        Level::WARN,
        prior_execution = %prior.uuid,
        current = request.schema.len(),
        recorded = recorded.len(),
        "Variable schema drifted since the prior execution; discarding carried values."
      );
      return Baseline::Drifted;
    }

    let mut carried: BTreeMap<String, String> = recorded
      .iter()
      .filter_map(|v| v.value.clone().map(|value| (v.name.clone(), value)))
      .collect();
    for (name, value) in &prior.execution_args.workflow_variables {
      carried.insert(name.clone(), value.clone());
    }
    Baseline::Carried(carried)
  }

  /// Unresolved variables plus those whose value differs from the declared one.
  fn meaningful(schema: &[Variable], working: Vec<Variable>) -> Vec<(usize, Variable)> {
    working
      .into_iter()
      .enumerate()
      .filter(|(index, variable)| {
        let declared = schema[*index].value.as_deref().filter(|v| !v.is_empty());
        !variable.has_value() || variable.value.as_deref() != declared
      })
      .collect()
  }

  /// Entity variables first by dependency depth then declaration order; text
  /// variables after them by name.
  fn order(kept: Vec<(usize, Variable)>, depths: &[usize]) -> Vec<Variable> {
    let (mut entities, mut texts): (Vec<_>, Vec<_>) = kept.into_iter().partition(|(_, v)| v.is_entity());
    entities.sort_by_key(|(declared, _)| (depths[*declared], *declared));
    texts.sort_by(|(ia, a), (ib, b)| a.name.cmp(&b.name).then(ia.cmp(ib)));
    entities.into_iter().chain(texts).map(|(_, v)| v).collect()
  }
}
