// tandem/src/model/variable.rs

//! Workflow and pipeline variable declarations.
//!
//! The same record describes a workflow's declared input and a pipeline-level
//! variable derived from it; only the `value` semantics differ (a workflow default
//! versus a stage assignment).

use crate::error::{TandemError, TandemResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Names the variable(s) this one depends on. May be a comma-separated list.
pub const RELATED_FIELD: &str = "relatedField";
pub const SERVICE_ID: &str = "serviceId";
pub const ENV_ID: &str = "envId";
pub const INFRA_ID: &str = "infraId";
pub const DEPLOYMENT_TYPE: &str = "deploymentType";
pub const ANALYSIS_SERVER_CONFIG_ID: &str = "analysisServerConfigId";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariableType {
  Text,
  Entity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
  Service,
  Environment,
  InfrastructureDefinition,
  InfrastructureMapping,
  UserGroup,
  AppdynamicsConfigid,
  AppdynamicsAppid,
  AppdynamicsTierid,
  NewrelicConfigid,
  NewrelicAppid,
  ElkConfigid,
  ElkIndices,
  SplunkConfigid,
  SsSshConnectionAttribute,
  SsWinrmConnectionAttribute,
}

impl EntityType {
  pub const ALL: [EntityType; 15] = [
    EntityType::Service,
    EntityType::Environment,
    EntityType::InfrastructureDefinition,
    EntityType::InfrastructureMapping,
    EntityType::UserGroup,
    EntityType::AppdynamicsConfigid,
    EntityType::AppdynamicsAppid,
    EntityType::AppdynamicsTierid,
    EntityType::NewrelicConfigid,
    EntityType::NewrelicAppid,
    EntityType::ElkConfigid,
    EntityType::ElkIndices,
    EntityType::SplunkConfigid,
    EntityType::SsSshConnectionAttribute,
    EntityType::SsWinrmConnectionAttribute,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      EntityType::Service => "SERVICE",
      EntityType::Environment => "ENVIRONMENT",
      EntityType::InfrastructureDefinition => "INFRASTRUCTURE_DEFINITION",
      EntityType::InfrastructureMapping => "INFRASTRUCTURE_MAPPING",
      EntityType::UserGroup => "USER_GROUP",
      EntityType::AppdynamicsConfigid => "APPDYNAMICS_CONFIGID",
      EntityType::AppdynamicsAppid => "APPDYNAMICS_APPID",
      EntityType::AppdynamicsTierid => "APPDYNAMICS_TIERID",
      EntityType::NewrelicConfigid => "NEWRELIC_CONFIGID",
      EntityType::NewrelicAppid => "NEWRELIC_APPID",
      EntityType::ElkConfigid => "ELK_CONFIGID",
      EntityType::ElkIndices => "ELK_INDICES",
      EntityType::SplunkConfigid => "SPLUNK_CONFIGID",
      EntityType::SsSshConnectionAttribute => "SS_SSH_CONNECTION_ATTRIBUTE",
      EntityType::SsWinrmConnectionAttribute => "SS_WINRM_CONNECTION_ATTRIBUTE",
    }
  }

  /// Metadata key a dependent variable receives once this entity is resolved.
  pub fn dependency_metadata_key(&self) -> Option<&'static str> {
    match self {
      EntityType::Service => Some(SERVICE_ID),
      EntityType::Environment => Some(ENV_ID),
      EntityType::InfrastructureDefinition | EntityType::InfrastructureMapping => Some(INFRA_ID),
      EntityType::AppdynamicsConfigid
      | EntityType::NewrelicConfigid
      | EntityType::ElkConfigid
      | EntityType::SplunkConfigid => Some(ANALYSIS_SERVER_CONFIG_ID),
      _ => None,
    }
  }

  pub fn is_infrastructure(&self) -> bool {
    matches!(
      self,
      EntityType::InfrastructureDefinition | EntityType::InfrastructureMapping
    )
  }
}

impl fmt::Display for EntityType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for EntityType {
  type Err = TandemError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    EntityType::ALL
      .iter()
      .copied()
      .find(|t| t.as_str() == s)
      .ok_or_else(|| TandemError::invalid_request(format!("Unrecognised entity type '{}'", s)))
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
  pub name: String,
  #[serde(rename = "type")]
  pub variable_type: VariableType,
  /// Raw subtype as authored. Kept as text so an unknown subtype survives
  /// deserialisation and is reported at resolution time.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub entity_type: Option<String>,
  #[serde(default)]
  pub mandatory: bool,
  #[serde(default)]
  pub fixed: bool,
  #[serde(default)]
  pub runtime_input: bool,
  #[serde(default)]
  pub allow_multiple_values: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub value: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub allowed_values: Option<Vec<String>>,
  #[serde(default)]
  pub metadata: BTreeMap<String, String>,
}

impl Variable {
  pub fn text(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      variable_type: VariableType::Text,
      entity_type: None,
      mandatory: false,
      fixed: false,
      runtime_input: false,
      allow_multiple_values: false,
      value: None,
      allowed_values: None,
      metadata: BTreeMap::new(),
    }
  }

  pub fn entity(name: impl Into<String>, entity_type: EntityType) -> Self {
    Self {
      variable_type: VariableType::Entity,
      entity_type: Some(entity_type.as_str().to_string()),
      ..Self::text(name)
    }
  }

  pub fn with_value(mut self, value: impl Into<String>) -> Self {
    self.value = Some(value.into());
    self
  }

  pub fn as_mandatory(mut self) -> Self {
    self.mandatory = true;
    self
  }

  pub fn as_fixed(mut self) -> Self {
    self.fixed = true;
    self
  }

  pub fn as_runtime_input(mut self) -> Self {
    self.runtime_input = true;
    self
  }

  pub fn with_related_field(mut self, related: impl Into<String>) -> Self {
    self.metadata.insert(RELATED_FIELD.to_string(), related.into());
    self
  }

  pub fn with_allowed_values<I, S>(mut self, values: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.allowed_values = Some(values.into_iter().map(Into::into).collect());
    self
  }

  pub fn is_entity(&self) -> bool {
    self.variable_type == VariableType::Entity
  }

  /// Parsed subtype. `Ok(None)` for text variables; an entity variable without a
  /// recognised subtype is an `InvalidRequest`.
  pub fn entity_type(&self) -> TandemResult<Option<EntityType>> {
    if !self.is_entity() {
      return Ok(None);
    }
    match self.entity_type.as_deref() {
      Some(raw) => raw.parse::<EntityType>().map(Some).map_err(|_| {
        TandemError::invalid_request(format!(
          "Variable '{}' has unrecognised entity type '{}'",
          self.name, raw
        ))
      }),
      None => Err(TandemError::invalid_request(format!(
        "Entity variable '{}' does not declare an entity type",
        self.name
      ))),
    }
  }

  /// Names listed in `relatedField`, in declaration order.
  pub fn related_fields(&self) -> Vec<&str> {
    self
      .metadata
      .get(RELATED_FIELD)
      .map(|raw| raw.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
      .unwrap_or_default()
  }

  pub fn has_value(&self) -> bool {
    self.value.as_deref().map_or(false, |v| !v.trim().is_empty())
  }
}
