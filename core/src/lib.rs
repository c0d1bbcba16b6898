// src/lib.rs

//! Tandem: the coordination core behind multi-stage deployment pipelines.
//!
//! Two services live here:
//!  - A variable resolution engine that works out, for a workflow or a pipeline
//!    stage, which inputs are still unresolved, carries values over from a prior
//!    execution when the schema has not drifted, substitutes `${pipelineVar}`
//!    references, and annotates runtime inputs with their resolved dependencies.
//!  - A barrier service that registers synchronisation points shared by parallel
//!    stages of one pipeline execution and lets the running workflows rendezvous
//!    at them.
//!
//! Definitions, executions and barrier records are read and written through the
//! traits in [`store`]; the Execution Engine, REST and CLI surfaces sit outside.

pub mod barrier;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod store;
pub mod variables;

// --- Re-exports for the Public API ---

pub use crate::barrier::{BarrierService, BarrierWait, ParticipantWorkflow};
pub use crate::config::TandemConfig;
pub use crate::coordinator::Coordinator;
pub use crate::error::{TandemError, TandemResult};
pub use crate::model::{
  BarrierInstance, BarrierState, EntityType, ExecutionArgs, ExecutionStatus, Participant, Pipeline, Variable,
  VariableType, Workflow, WorkflowExecution, WorkflowType,
};
pub use crate::store::{
  BarrierStore, DefinitionStore, ExecutionStore, InMemoryBarrierStore, InMemoryDefinitionStore, InMemoryExecutionStore,
};
pub use crate::variables::{ResolutionRequest, ResolvedVariables, VariableResolver};
