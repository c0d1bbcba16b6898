// tandem/src/variables/mod.rs

//! Variable Resolution Engine.
//!
//! Everything here is synchronous and side-effect free apart from logging. The
//! coordinator fetches definitions and executions and hands them in.

pub mod drift;
pub mod expression;
pub mod pipeline_vars;
pub mod resolver;
pub mod runtime;

pub use drift::schemas_match;
pub use expression::{check_workflow_variables_overrides, override_workflow_variables};
pub use pipeline_vars::derive_pipeline_variables;
pub use resolver::{ResolutionRequest, ResolvedVariables, VariableResolver};
pub use runtime::annotate_runtime_dependencies;
