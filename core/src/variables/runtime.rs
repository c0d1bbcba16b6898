// tandem/src/variables/runtime.rs

//! Dependencies between entity variables and the runtime-input annotation pass.
//!
//! `relatedField` links two entity variables. Definitions written by hand name the
//! variable depended upon (`Infra.relatedField = Service`); derived definitions
//! list the dependants instead (`Environment.relatedField = Infra1,Infra2`). Either
//! spelling yields the same edge: infrastructure always depends on services and
//! environments, and between other kinds the listing variable is the dependant.

use super::expression::matches_variable_pattern;
use crate::model::{EntityType, Variable};

use std::collections::HashSet;
use tracing::{event, Level};

fn chain_rank(entity_type: Option<EntityType>) -> u8 {
  match entity_type {
    Some(t) if t.is_infrastructure() => 1,
    _ => 0,
  }
}

/// Parent links between the entity variables of one schema, by index.
pub struct DependencyGraph {
  parents: Vec<Vec<usize>>,
}

impl DependencyGraph {
  pub fn build(variables: &[Variable]) -> Self {
    let related: Vec<HashSet<&str>> = variables.iter().map(|v| v.related_fields().into_iter().collect()).collect();
    let ranks: Vec<u8> = variables
      .iter()
      .map(|v| chain_rank(v.entity_type().ok().flatten()))
      .collect();

    let mut parents = vec![Vec::new(); variables.len()];
    for (x, var_x) in variables.iter().enumerate().filter(|(_, v)| v.is_entity()) {
      for (y, var_y) in variables.iter().enumerate().filter(|(_, v)| v.is_entity()) {
        if x == y {
          continue;
        }
        let x_lists_y = related[x].contains(var_y.name.as_str());
        let y_lists_x = related[y].contains(var_x.name.as_str());
        if !x_lists_y && !y_lists_x {
          continue;
        }
        let y_is_parent = if ranks[x] != ranks[y] {
          ranks[y] < ranks[x]
        } else if x_lists_y && y_lists_x {
          // Mutual listing between peers: declaration order breaks the tie.
          y < x
        } else {
          x_lists_y
        };
        if y_is_parent {
          parents[x].push(y);
        }
      }
    }
    Self { parents }
  }

  pub fn parents_of(&self, index: usize) -> &[usize] {
    self.parents.get(index).map(Vec::as_slice).unwrap_or(&[])
  }

  /// Longest parent chain above `index`. Cycles count as roots.
  pub fn depth(&self, index: usize) -> usize {
    let mut on_path = vec![false; self.parents.len()];
    self.depth_guarded(index, &mut on_path)
  }

  fn depth_guarded(&self, index: usize, on_path: &mut [bool]) -> usize {
    if on_path[index] {
      return 0;
    }
    on_path[index] = true;
    let mut depth = 0;
    for &parent in self.parents_of(index) {
      if !on_path[parent] {
        depth = depth.max(1 + self.depth_guarded(parent, on_path));
      }
    }
    on_path[index] = false;
    depth
  }
}

/// For every runtime input still unset, records each resolved parent's value in
/// its metadata under the parent's dependency key (`serviceId`, `envId`, ...). Never
/// assigns a value.
pub fn annotate_runtime_dependencies(variables: &mut [Variable]) {
  let graph = DependencyGraph::build(variables);

  let mut annotations: Vec<(usize, &'static str, String)> = Vec::new();
  for (index, variable) in variables.iter().enumerate() {
    if !variable.runtime_input || variable.has_value() {
      continue;
    }
    for &parent_index in graph.parents_of(index) {
      let parent = &variables[parent_index];
      let key = match parent.entity_type().ok().flatten().and_then(|t| t.dependency_metadata_key()) {
        Some(k) => k,
        None => continue,
      };
      match parent.value.as_deref() {
        Some(value) if !value.trim().is_empty() && !matches_variable_pattern(value) => {
          annotations.push((index, key, value.to_string()));
        }
        _ => {}
      }
    }
  }

  for (index, key, value) in annotations {
    let variable = &mut variables[index];
    event!(
      Level::DEBUG,
      variable = %variable.name,
      key,
      value = %value,
      "Annotating unresolved runtime input with resolved dependency."
    );
    variable.metadata.insert(key.to_string(), value);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn infra_depends_on_service_whichever_side_lists_the_edge() {
    let forward = vec![
      Variable::entity("Service", EntityType::Service),
      Variable::entity("Infra", EntityType::InfrastructureDefinition).with_related_field("Service"),
    ];
    let graph = DependencyGraph::build(&forward);
    assert_eq!(graph.parents_of(1), &[0]);
    assert!(graph.parents_of(0).is_empty());

    let reverse = vec![
      Variable::entity("Env", EntityType::Environment).with_related_field("Infra"),
      Variable::entity("Infra", EntityType::InfrastructureDefinition),
    ];
    let graph = DependencyGraph::build(&reverse);
    assert_eq!(graph.parents_of(1), &[0]);
    assert_eq!(graph.depth(1), 1);
    assert_eq!(graph.depth(0), 0);
  }

  #[test]
  fn mutual_peer_listing_does_not_loop() {
    let vars = vec![
      Variable::entity("A", EntityType::UserGroup).with_related_field("B"),
      Variable::entity("B", EntityType::UserGroup).with_related_field("A"),
    ];
    let graph = DependencyGraph::build(&vars);
    assert_eq!(graph.depth(0), 0);
    assert_eq!(graph.depth(1), 1);
  }

  #[test]
  fn expression_parent_is_not_propagated() {
    let mut vars = vec![
      Variable::entity("Service", EntityType::Service).with_value("${svc}"),
      Variable::entity("Infra", EntityType::InfrastructureDefinition)
        .as_runtime_input()
        .with_related_field("Service"),
    ];
    annotate_runtime_dependencies(&mut vars);
    assert!(!vars[1].metadata.contains_key(crate::model::variable::SERVICE_ID));
  }
}
