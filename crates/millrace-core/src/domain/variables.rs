use crate::domain::process_instance::ProcessInstanceId;
use crate::types::{SortKey, Sortable};
use crate::CoreError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Name to value map used by payloads, iterated in insertion order
pub type Variables = Map<String, Value>;

/// A named variable in an instance scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableInstance {
    /// Variable name, unique within the instance
    pub name: String,

    /// Type name derived from the value
    #[serde(rename = "type")]
    pub var_type: String,

    /// Current value
    pub value: Value,

    /// Owning instance
    pub process_instance_id: ProcessInstanceId,
}

impl VariableInstance {
    /// Build a variable, deriving its type from the value
    pub fn new(name: impl Into<String>, value: Value, owner: &ProcessInstanceId) -> Self {
        Self {
            name: name.into(),
            var_type: type_name_of(&value).to_string(),
            value,
            process_instance_id: owner.clone(),
        }
    }
}

impl Sortable for VariableInstance {
    fn is_sortable_by(property: &str) -> bool {
        matches!(property, "name" | "type")
    }

    fn sort_key(&self, property: &str) -> Option<SortKey> {
        match property {
            "name" => Some(SortKey::Text(self.name.clone())),
            "type" => Some(SortKey::Text(self.var_type.clone())),
            _ => None,
        }
    }
}

/// Type name of a JSON value
pub fn type_name_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "double",
        Value::String(_) => "string",
        Value::Array(_) | Value::Object(_) => "json",
    }
}

/// Variables reported back by a variable mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AffectedVariables {
    /// Reporting is turned off
    NotTracked,
    /// Variables created or updated, or actually removed
    Affected(Vec<VariableInstance>),
}

impl AffectedVariables {
    /// The affected variables, empty when not tracked
    pub fn variables(&self) -> &[VariableInstance] {
        match self {
            Self::NotTracked => &[],
            Self::Affected(list) => list,
        }
    }
}

/// One effective change applied to a scope
#[derive(Debug, Clone, PartialEq)]
pub enum VariableChange {
    /// New name
    Created {
        /// Variable name
        name: String,
        /// Initial value
        value: Value,
    },
    /// Existing name overwritten
    Updated {
        /// Variable name
        name: String,
        /// Value before
        previous: Value,
        /// Value after
        current: Value,
    },
    /// Name removed
    Deleted {
        /// Variable name
        name: String,
        /// Value at removal
        value: Value,
    },
}

impl VariableChange {
    /// Name of the changed variable
    pub fn name(&self) -> &str {
        match self {
            Self::Created { name, .. } | Self::Updated { name, .. } | Self::Deleted { name, .. } => {
                name
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Slot {
    seq: u64,
    value: Value,
}

/// Variable scope of one instance. Listing follows first insertion; an
/// overwrite keeps the original position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableScope {
    slots: HashMap<String, Slot>,
    next_seq: u64,
}

impl VariableScope {
    /// Empty scope
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of a variable
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.slots.get(name).map(|slot| &slot.value)
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the scope holds no variables
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn ordered(&self) -> Vec<(&String, &Slot)> {
        let mut entries: Vec<_> = self.slots.iter().collect();
        entries.sort_by_key(|(_, slot)| slot.seq);
        entries
    }

    /// Variable names in insertion order
    pub fn names(&self) -> Vec<String> {
        self.ordered().into_iter().map(|(n, _)| n.clone()).collect()
    }

    /// Variables in insertion order, optionally restricted to `filter`.
    /// Names in the filter that do not exist are ignored.
    pub fn list(
        &self,
        owner: &ProcessInstanceId,
        filter: Option<&[String]>,
    ) -> Vec<VariableInstance> {
        self.ordered()
            .into_iter()
            .filter(|(name, _)| filter.map_or(true, |names| names.iter().any(|n| n == *name)))
            .map(|(name, slot)| VariableInstance::new(name.clone(), slot.value.clone(), owner))
            .collect()
    }

    /// Upsert all entries. Setting an identical value is not a change.
    pub fn apply_set(&mut self, variables: &Variables) -> Vec<VariableChange> {
        let mut changes = Vec::with_capacity(variables.len());

        for (name, value) in variables {
            match self.slots.get_mut(name) {
                Some(slot) if slot.value == *value => {}
                Some(slot) => {
                    let previous = std::mem::replace(&mut slot.value, value.clone());
                    changes.push(VariableChange::Updated {
                        name: name.clone(),
                        previous,
                        current: value.clone(),
                    });
                }
                None => {
                    let seq = self.next_seq;
                    self.next_seq += 1;
                    self.slots.insert(
                        name.clone(),
                        Slot {
                            seq,
                            value: value.clone(),
                        },
                    );
                    changes.push(VariableChange::Created {
                        name: name.clone(),
                        value: value.clone(),
                    });
                }
            }
        }

        changes
    }

    /// Remove the named variables. Absent names are ignored.
    pub fn apply_remove(&mut self, names: &[String]) -> Vec<VariableChange> {
        names
            .iter()
            .filter_map(|name| {
                self.slots.remove(name).map(|slot| VariableChange::Deleted {
                    name: name.clone(),
                    value: slot.value,
                })
            })
            .collect()
    }

    /// JSON object of the scope
    pub fn to_map(&self) -> Map<String, Value> {
        self.ordered()
            .into_iter()
            .map(|(name, slot)| (name.clone(), slot.value.clone()))
            .collect()
    }
}

/// Reject empty or blank variable names
pub fn validate_names<'a>(names: impl IntoIterator<Item = &'a String>) -> Result<(), CoreError> {
    for name in names {
        if name.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "Variable names must not be empty".to_string(),
            ));
        }
    }
    Ok(())
}
