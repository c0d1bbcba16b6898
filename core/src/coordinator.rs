// tandem/src/coordinator.rs

//! Defines `Coordinator`, the entry point collaborators call: trigger and resume
//! UIs fetch stage variables through it, and the Execution Engine registers and
//! arrives at barriers through it.

use crate::barrier::{group_parallel_stages, BarrierService, ParticipantWorkflow};
use crate::config::TandemConfig;
use crate::error::{TandemError, TandemResult};
use crate::model::{BarrierInstance, ExecutionArgs, Participant, Pipeline, Variable, WorkflowType};
use crate::store::{BarrierStore, DefinitionStore, ExecutionStore};
use crate::variables::{
  check_workflow_variables_overrides, override_workflow_variables, ResolutionRequest, ResolvedVariables,
  VariableResolver,
};

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{event, instrument, Level};

pub struct Coordinator {
  definitions: Arc<dyn DefinitionStore>,
  executions: Arc<dyn ExecutionStore>,
  barriers: BarrierService,
}

impl Coordinator {
  pub fn new(
    definitions: Arc<dyn DefinitionStore>,
    executions: Arc<dyn ExecutionStore>,
    barrier_store: Arc<dyn BarrierStore>,
    config: TandemConfig,
  ) -> Self {
    Self {
      definitions,
      executions,
      barriers: BarrierService::new(barrier_store, config),
    }
  }

  /// Arrival, abort and purge for the Execution Engine.
  pub fn barriers(&self) -> &BarrierService {
    &self.barriers
  }

  async fn schema_for(&self, app_id: &str, args: &ExecutionArgs) -> TandemResult<Option<Vec<Variable>>> {
    match args.workflow_type {
      WorkflowType::Orchestration => Ok(
        self
          .definitions
          .get_workflow(app_id, &args.target_id)
          .await?
          .map(|w| w.user_variables().to_vec()),
      ),
      WorkflowType::Pipeline => {
        if self.definitions.get_pipeline(app_id, &args.target_id).await?.is_none() {
          return Ok(None);
        }
        self.definitions.get_pipeline_variables(app_id, &args.target_id).await.map(Some)
      }
    }
  }

  /// Variables a caller should be shown (or prompted for) before starting a
  /// workflow or pipeline, optionally carrying values over from a prior
  /// execution. Missing definitions or executions degrade to an empty or
  /// uncarried result rather than an error.
  #[instrument(
    name = "Coordinator::fetch_workflow_variables",
    skip(self, execution_args),
    fields(target_id = %execution_args.target_id),
    err(Display)
  )]
  pub async fn fetch_workflow_variables(
    &self,
    app_id: &str,
    execution_args: &ExecutionArgs,
    prior_execution_id: Option<&str>,
  ) -> TandemResult<ResolvedVariables> {
    let schema = match self.schema_for(app_id, execution_args).await? {
      Some(s) => s,
      None => {
        event!(Level::WARN, target_id = %execution_args.target_id, "Target definition not found.");
        return Ok(ResolvedVariables::default());
      }
    };

    let prior = match prior_execution_id {
      Some(id) => {
        let found = self.executions.get_workflow_execution(app_id, id).await?;
        if found.is_none() {
          event!(Level::WARN, prior_execution_id = id, "Prior execution not found; resolving without it.");
        }
        found
      }
      None => None,
    };

    VariableResolver::resolve(ResolutionRequest::new(&schema, execution_args).with_prior_execution(prior.as_ref()))
  }

  /// Same contract as `fetch_workflow_variables`, scoped to one stage of a
  /// pipeline execution that has already started (resuming a paused stage).
  #[instrument(name = "Coordinator::fetch_workflow_variables_for_running_execution", skip(self), err(Display))]
  pub async fn fetch_workflow_variables_for_running_execution(
    &self,
    app_id: &str,
    pipeline_execution_id: &str,
    stage_element_id: &str,
  ) -> TandemResult<ResolvedVariables> {
    let execution = match self.executions.get_workflow_execution(app_id, pipeline_execution_id).await? {
      Some(e) => e,
      None => {
        event!(Level::WARN, "Pipeline execution not found.");
        return Ok(ResolvedVariables::default());
      }
    };
    let pipeline_execution = match &execution.pipeline_execution {
      Some(p) => p,
      None => {
        event!(Level::WARN, execution_id = %execution.uuid, "Execution is not a pipeline execution.");
        return Ok(ResolvedVariables::default());
      }
    };
    let pipeline = match self.definitions.get_pipeline(app_id, &pipeline_execution.pipeline_id).await? {
      Some(p) => p,
      None => {
        event!(Level::WARN, pipeline_id = %pipeline_execution.pipeline_id, "Pipeline definition not found.");
        return Ok(ResolvedVariables::default());
      }
    };
    let element = match pipeline.stage_element(stage_element_id) {
      Some(e) => e,
      None => {
        event!(Level::WARN, "Stage element not found in pipeline.");
        return Ok(ResolvedVariables::default());
      }
    };
    let workflow = match element.workflow_id() {
      Some(id) => self.definitions.get_workflow(app_id, id).await?,
      None => None,
    };
    let workflow = match workflow {
      Some(w) => w,
      None => {
        event!(Level::WARN, stage = %element.name, "Stage does not run a known workflow.");
        return Ok(ResolvedVariables::default());
      }
    };

    let pipeline_values = &execution.execution_args.workflow_variables;
    let schema: Vec<Variable> = workflow
      .user_variables()
      .iter()
      .cloned()
      .map(|mut v| {
        v.runtime_input = v.runtime_input || element.is_runtime_input(&v.name);
        v
      })
      .collect();

    let mut stage_values = override_workflow_variables(&schema, &element.workflow_variables, pipeline_values);
    if let Some(stage_execution) = pipeline_execution.stage_execution(stage_element_id) {
      for (name, value) in &stage_execution.workflow_variables {
        if !value.is_empty() && schema.iter().any(|v| &v.name == name) {
          stage_values.insert(name.clone(), value.clone());
        }
      }
    }

    let args = ExecutionArgs {
      workflow_type: WorkflowType::Orchestration,
      target_id: workflow.uuid.clone(),
      workflow_variables: stage_values,
    };
    VariableResolver::resolve(ResolutionRequest::new(&schema, &args).with_pipeline_values(pipeline_values))
  }

  /// Final inputs for one stage, right before the Execution Engine starts it.
  /// Fails when a mandatory input is missing or still an expression.
  #[instrument(
    name = "Coordinator::prepare_stage_inputs",
    skip(self, pipeline, pipeline_values),
    fields(pipeline_id = %pipeline.uuid),
    err(Display)
  )]
  pub async fn prepare_stage_inputs(
    &self,
    app_id: &str,
    pipeline: &Pipeline,
    stage_element_id: &str,
    pipeline_values: &BTreeMap<String, String>,
  ) -> TandemResult<BTreeMap<String, String>> {
    let element = pipeline.stage_element(stage_element_id).ok_or_else(|| {
      TandemError::invalid_request(format!(
        "Stage element '{}' not found in pipeline '{}'",
        stage_element_id, pipeline.name
      ))
    })?;
    let workflow_id = match element.workflow_id() {
      Some(id) => id,
      None => return Ok(BTreeMap::new()),
    };
    let workflow = self
      .definitions
      .get_workflow(app_id, workflow_id)
      .await?
      .ok_or_else(|| TandemError::invalid_request(format!("Workflow '{}' for stage '{}' not found", workflow_id, element.name)))?;

    let variables = workflow.user_variables();
    check_workflow_variables_overrides(element, variables, &element.workflow_variables, pipeline_values)?;
    Ok(override_workflow_variables(variables, &element.workflow_variables, pipeline_values))
  }

  /// Registers every barrier a pipeline execution needs, one concurrency group
  /// at a time. Any failure means the pipeline must not start.
  #[instrument(name = "Coordinator::register_pipeline_barriers", skip(self), err(Display))]
  pub async fn register_pipeline_barriers(
    &self,
    app_id: &str,
    pipeline_id: &str,
    pipeline_execution_id: &str,
  ) -> TandemResult<Vec<BarrierInstance>> {
    let pipeline = self
      .definitions
      .get_pipeline(app_id, pipeline_id)
      .await?
      .ok_or_else(|| TandemError::invalid_request(format!("Pipeline '{}' not found", pipeline_id)))?;

    let mut registered = Vec::new();
    for group in group_parallel_stages(&pipeline) {
      let mut participants = Vec::with_capacity(group.len());
      for (element, workflow_id) in group {
        let workflow = self.definitions.get_workflow(app_id, workflow_id).await?.ok_or_else(|| {
          TandemError::invalid_request(format!("Workflow '{}' for stage '{}' not found", workflow_id, element.name))
        })?;
        participants.push(ParticipantWorkflow {
          participant: Participant::new(workflow_id, element.uuid.clone()),
          workflow,
        });
      }
      registered.extend(
        self
          .barriers
          .obtain_instances(app_id, &participants, pipeline_execution_id, 0)
          .await?,
      );
    }
    Ok(registered)
  }
}
