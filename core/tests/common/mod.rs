// tests/common/mod.rs
#![allow(dead_code)] // Not every test file uses every fixture.

use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::sync::Arc;
use tandem::model::{
  OrchestrationWorkflow, PhaseStep, PipelineStage, PipelineStageElement, RuntimeInputsConfig, StateMachineSnapshot,
  Step, StepKind, WorkflowPhase,
};
use tandem::{
  BarrierService, Coordinator, ExecutionArgs, ExecutionStatus, InMemoryBarrierStore, InMemoryDefinitionStore,
  InMemoryExecutionStore, Pipeline, TandemConfig, Variable, Workflow, WorkflowExecution, WorkflowType,
};
use tracing::Level;

pub const APP_ID: &str = "app-1";

static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- Definition builders ---

/// Workflow with a single phase whose phase-steps carry the given barrier
/// identifiers (one inner slice per phase-step). Every phase-step also gets a
/// non-barrier step so the walk has something to skip.
pub fn barrier_workflow(workflow_id: &str, phase_steps: &[&[&str]]) -> Workflow {
  let steps = phase_steps
    .iter()
    .enumerate()
    .map(|(i, identifiers)| {
      let mut steps = vec![Step::new(format!("script-{}", i), StepKind::ShellScript)];
      steps.extend(identifiers.iter().map(|id| Step::barrier(format!("barrier-{}", id), *id)));
      PhaseStep::new(format!("phase-step-{}", i), steps)
    })
    .collect();
  Workflow {
    uuid: workflow_id.to_string(),
    app_id: APP_ID.to_string(),
    name: format!("workflow {}", workflow_id),
    orchestration: Some(OrchestrationWorkflow {
      pre_deployment_steps: PhaseStep::new("pre-deployment", vec![]),
      workflow_phases: vec![WorkflowPhase {
        uuid: format!("{}-phase-1", workflow_id),
        name: "Phase 1".to_string(),
        phase_steps: steps,
      }],
      post_deployment_steps: PhaseStep::new("post-deployment", vec![]),
      user_variables: vec![],
    }),
  }
}

pub fn variable_workflow(workflow_id: &str, variables: Vec<Variable>) -> Workflow {
  Workflow {
    uuid: workflow_id.to_string(),
    app_id: APP_ID.to_string(),
    name: format!("workflow {}", workflow_id),
    orchestration: Some(OrchestrationWorkflow {
      user_variables: variables,
      ..OrchestrationWorkflow::default()
    }),
  }
}

pub fn workflow_element(name: &str, workflow_id: &str, values: &[(&str, &str)]) -> PipelineStageElement {
  let mut element = PipelineStageElement::workflow(name, workflow_id);
  element.uuid = format!("pse-{}", name);
  element.workflow_variables = to_map(values);
  element
}

pub fn with_runtime_inputs(mut element: PipelineStageElement, names: &[&str]) -> PipelineStageElement {
  element.runtime_inputs = Some(RuntimeInputsConfig {
    runtime_input_variables: names.iter().map(|n| n.to_string()).collect(),
    timeout_millis: 60_000,
  });
  element
}

pub fn stage(element: PipelineStageElement, parallel: bool) -> PipelineStage {
  PipelineStage {
    name: format!("STAGE {}", element.name),
    parallel,
    element,
  }
}

pub fn pipeline(pipeline_id: &str, stages: Vec<PipelineStage>) -> Pipeline {
  Pipeline {
    uuid: pipeline_id.to_string(),
    app_id: APP_ID.to_string(),
    name: format!("pipeline {}", pipeline_id),
    stages,
  }
}

pub fn to_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
  pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// Finished orchestration execution that recorded `recorded` and was started with
/// `args_values`.
pub fn prior_execution(
  execution_id: &str,
  workflow_id: &str,
  recorded: Vec<Variable>,
  args_values: &[(&str, &str)],
) -> WorkflowExecution {
  WorkflowExecution {
    uuid: execution_id.to_string(),
    app_id: APP_ID.to_string(),
    workflow_type: WorkflowType::Orchestration,
    workflow_id: workflow_id.to_string(),
    status: ExecutionStatus::Success,
    execution_args: ExecutionArgs {
      workflow_type: WorkflowType::Orchestration,
      target_id: workflow_id.to_string(),
      workflow_variables: to_map(args_values),
    },
    state_machine: Some(StateMachineSnapshot { variables: recorded }),
    pipeline_execution: None,
  }
}

// --- Services ---

/// Short poll interval so fallback paths finish quickly.
pub fn fast_config() -> TandemConfig {
  TandemConfig {
    barrier_poll_interval_ms: 20,
    barrier_cas_max_attempts: 32,
  }
}

pub fn barrier_service() -> (BarrierService, Arc<InMemoryBarrierStore>) {
  let store = Arc::new(InMemoryBarrierStore::new());
  (BarrierService::new(store.clone(), fast_config()), store)
}

pub struct Fixture {
  pub definitions: Arc<InMemoryDefinitionStore>,
  pub executions: Arc<InMemoryExecutionStore>,
  pub barrier_store: Arc<InMemoryBarrierStore>,
  pub coordinator: Coordinator,
}

impl Fixture {
  pub fn new() -> Self {
    let definitions = Arc::new(InMemoryDefinitionStore::new());
    let executions = Arc::new(InMemoryExecutionStore::new());
    let barrier_store = Arc::new(InMemoryBarrierStore::new());
    let coordinator = Coordinator::new(
      definitions.clone(),
      executions.clone(),
      barrier_store.clone(),
      fast_config(),
    );
    Self {
      definitions,
      executions,
      barrier_store,
      coordinator,
    }
  }
}

pub fn names(variables: &[Variable]) -> Vec<&str> {
  variables.iter().map(|v| v.name.as_str()).collect()
}

pub fn value_of<'a>(variables: &'a [Variable], name: &str) -> Option<&'a str> {
  variables.iter().find(|v| v.name == name).and_then(|v| v.value.as_deref())
}
