// tandem/src/model/mod.rs

//! Definition, execution and barrier records. Plain data with serde derives; all
//! behaviour lives in `variables` and `barrier`.

pub mod barrier;
pub mod execution;
pub mod pipeline;
pub mod variable;
pub mod workflow;

pub use barrier::{BarrierInstance, BarrierPipeline, BarrierState, Participant};
pub use execution::{
  ExecutionArgs, ExecutionStatus, PipelineExecution, PipelineStageExecution, StateMachineSnapshot, WorkflowExecution,
  WorkflowType,
};
pub use pipeline::{Pipeline, PipelineStage, PipelineStageElement, RuntimeInputsConfig, StageElementKind};
pub use variable::{EntityType, Variable, VariableType};
pub use workflow::{OrchestrationWorkflow, PhaseStep, Step, StepKind, Workflow, WorkflowPhase};
