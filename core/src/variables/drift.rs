// tandem/src/variables/drift.rs

//! Schema drift between a workflow's current variables and those recorded on a
//! prior execution.

use crate::model::{Variable, VariableType};

type Signature<'a> = (&'a str, VariableType, Option<&'a str>);

fn signatures(variables: &[Variable]) -> Vec<Signature<'_>> {
  let mut sigs: Vec<Signature<'_>> = variables
    .iter()
    .map(|v| (v.name.as_str(), v.variable_type, v.entity_type.as_deref()))
    .collect();
  sigs.sort_unstable();
  sigs
}

/// True when both lists declare the same variables: equal cardinality, equal
/// names, and per name the same type and entity subtype. Order, values and flags
/// are ignored.
pub fn schemas_match(current: &[Variable], recorded: &[Variable]) -> bool {
  current.len() == recorded.len() && signatures(current) == signatures(recorded)
}
