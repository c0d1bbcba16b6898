// tandem/src/error.rs
use anyhow::Error as AnyhowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TandemError {
  /// Caller supplied something the core cannot act on: an unknown barrier id, an
  /// entity variable with an unrecognised subtype, a missing mandatory stage input.
  #[error("Invalid request: {message}")]
  InvalidRequest { message: String },

  #[error(
    "Barrier identifier '{identifier}' is used more than once in workflow '{workflow_id}'; \
     a workflow cannot rendezvous with itself"
  )]
  BarriersNotRunningConcurrently { identifier: String, workflow_id: String },

  #[error("Barrier '{barrier_id}' was aborted before all participants arrived")]
  BarrierAborted { barrier_id: String },

  #[error("Barrier '{barrier_id}' update lost the version race {attempts} times in a row")]
  BarrierContention { barrier_id: String, attempts: u32 },

  #[error("Configuration error: {message}")]
  Configuration { message: String },

  #[error("Store operation '{operation}' failed. Source: {source}")]
  Store {
    operation: String,
    #[source]
    source: AnyhowError,
  },

  #[error("Error in an external collaborator. Source: {source}")]
  External {
    #[source]
    source: AnyhowError,
  },

  #[error("Internal tandem error: {0}")]
  Internal(String),
}

impl TandemError {
  pub fn invalid_request(message: impl Into<String>) -> Self {
    TandemError::InvalidRequest { message: message.into() }
  }

  pub fn store(operation: impl Into<String>, source: AnyhowError) -> Self {
    TandemError::Store {
      operation: operation.into(),
      source,
    }
  }

  /// Stable machine-readable code for outer surfaces.
  pub fn code(&self) -> &'static str {
    match self {
      TandemError::InvalidRequest { .. } => "INVALID_REQUEST",
      TandemError::BarriersNotRunningConcurrently { .. } => "BARRIERS_NOT_RUNNING_CONCURRENTLY",
      TandemError::BarrierAborted { .. } => "BARRIER_ABORTED",
      TandemError::BarrierContention { .. } => "BARRIER_CONTENTION",
      TandemError::Configuration { .. } => "CONFIGURATION_ERROR",
      TandemError::Store { .. } => "STORE_ERROR",
      TandemError::External { .. } => "EXTERNAL_ERROR",
      TandemError::Internal(_) => "INTERNAL_ERROR",
    }
  }
}

impl From<AnyhowError> for TandemError {
  fn from(err: AnyhowError) -> Self {
    // Keep request errors recognisable when a store re-wraps them in anyhow.
    if let Some(TandemError::InvalidRequest { message }) = err.downcast_ref::<TandemError>() {
      return TandemError::InvalidRequest { message: message.clone() };
    }
    TandemError::External { source: err }
  }
}

pub type TandemResult<T, E = TandemError> = std::result::Result<T, E>;
