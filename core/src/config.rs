// tandem/src/config.rs

//! Runtime knobs for the barrier service.

use crate::error::{TandemError, TandemResult};
use serde::Deserialize;
use std::env;
use std::time::Duration;

pub const ENV_POLL_INTERVAL_MS: &str = "TANDEM_BARRIER_POLL_INTERVAL_MS";
pub const ENV_CAS_MAX_ATTEMPTS: &str = "TANDEM_BARRIER_CAS_MAX_ATTEMPTS";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TandemConfig {
  /// How often a waiting participant re-reads its barrier when no in-process
  /// notification arrives. Covers participants living in another process.
  pub barrier_poll_interval_ms: u64,
  /// Upper bound on compare-and-swap retries for a single arrival or abort.
  pub barrier_cas_max_attempts: u32,
}

impl Default for TandemConfig {
  fn default() -> Self {
    Self {
      barrier_poll_interval_ms: 2_000,
      barrier_cas_max_attempts: 32,
    }
  }
}

impl TandemConfig {
  /// Defaults overlaid with `TANDEM_*` environment variables.
  pub fn from_env() -> TandemResult<Self> {
    let defaults = Self::default();

    let barrier_poll_interval_ms = match env::var(ENV_POLL_INTERVAL_MS) {
      Ok(raw) => raw.trim().parse::<u64>().map_err(|e| TandemError::Configuration {
        message: format!("Invalid {}: {}", ENV_POLL_INTERVAL_MS, e),
      })?,
      Err(_) => defaults.barrier_poll_interval_ms,
    };
    let barrier_cas_max_attempts = match env::var(ENV_CAS_MAX_ATTEMPTS) {
      Ok(raw) => raw.trim().parse::<u32>().map_err(|e| TandemError::Configuration {
        message: format!("Invalid {}: {}", ENV_CAS_MAX_ATTEMPTS, e),
      })?,
      Err(_) => defaults.barrier_cas_max_attempts,
    };

    let config = Self {
      barrier_poll_interval_ms,
      barrier_cas_max_attempts,
    };
    config.validate()?;
    tracing::info!(?config, "Tandem configuration loaded.");
    Ok(config)
  }

  pub fn validate(&self) -> TandemResult<()> {
    if self.barrier_poll_interval_ms == 0 {
      return Err(TandemError::Configuration {
        message: "barrier_poll_interval_ms must be greater than zero".to_string(),
      });
    }
    if self.barrier_cas_max_attempts == 0 {
      return Err(TandemError::Configuration {
        message: "barrier_cas_max_attempts must be greater than zero".to_string(),
      });
    }
    Ok(())
  }

  pub fn poll_interval(&self) -> Duration {
    Duration::from_millis(self.barrier_poll_interval_ms)
  }
}
