//! Typed request payloads accepted by the process runtime

use crate::domain::execution::Signal;
use crate::domain::process_definition::ProcessDefinitionId;
use crate::domain::process_instance::{ProcessInstance, ProcessInstanceId, ProcessStatus};
use crate::domain::process_definition::ProcessDefinition;
use crate::domain::variables::{validate_names, Variables};
use crate::CoreError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Start a new process instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartProcessPayload {
    /// Exact definition to instantiate
    pub process_definition_id: Option<ProcessDefinitionId>,

    /// Key whose latest version is instantiated when no id is given
    pub process_definition_key: Option<String>,

    /// Display name of the instance
    pub name: Option<String>,

    /// Caller correlation key
    pub business_key: Option<String>,

    /// Live parent instance, for sub-processes
    pub parent_process_instance_id: Option<ProcessInstanceId>,

    /// Who starts the instance
    pub initiator: Option<String>,

    /// Initial variable scope
    #[serde(default)]
    pub variables: Variables,
}

impl StartProcessPayload {
    /// Start the exact definition `id`
    pub fn by_id(id: impl Into<ProcessDefinitionId>) -> Self {
        Self {
            process_definition_id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Start the latest version of `key`
    pub fn by_key(key: impl Into<String>) -> Self {
        Self {
            process_definition_key: Some(key.into()),
            ..Self::default()
        }
    }

    /// Set the business key
    pub fn with_business_key(mut self, business_key: impl Into<String>) -> Self {
        self.business_key = Some(business_key.into());
        self
    }

    /// Set the instance name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Start as a child of `parent`
    pub fn with_parent(mut self, parent: impl Into<ProcessInstanceId>) -> Self {
        self.parent_process_instance_id = Some(parent.into());
        self
    }

    /// Set the initiator
    pub fn with_initiator(mut self, initiator: impl Into<String>) -> Self {
        self.initiator = Some(initiator.into());
        self
    }

    /// Add an initial variable
    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    /// Structural checks
    pub fn validate(&self) -> Result<(), CoreError> {
        let has_id = self
            .process_definition_id
            .as_ref()
            .is_some_and(|id| !id.0.trim().is_empty());
        let has_key = self
            .process_definition_key
            .as_ref()
            .is_some_and(|key| !key.trim().is_empty());

        if !has_id && !has_key {
            return Err(CoreError::ValidationError(
                "Either process_definition_id or process_definition_key is required".to_string(),
            ));
        }

        validate_names(self.variables.keys())
    }
}

fn require_instance_id(id: &ProcessInstanceId) -> Result<(), CoreError> {
    if id.0.trim().is_empty() {
        return Err(CoreError::ValidationError(
            "process_instance_id is required".to_string(),
        ));
    }
    Ok(())
}

/// Suspend a running instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspendProcessPayload {
    /// Target instance
    pub process_instance_id: ProcessInstanceId,
}

impl SuspendProcessPayload {
    /// Payload for `id`
    pub fn new(id: impl Into<ProcessInstanceId>) -> Self {
        Self {
            process_instance_id: id.into(),
        }
    }
}

/// Resume a suspended instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeProcessPayload {
    /// Target instance
    pub process_instance_id: ProcessInstanceId,
}

impl ResumeProcessPayload {
    /// Payload for `id`
    pub fn new(id: impl Into<ProcessInstanceId>) -> Self {
        Self {
            process_instance_id: id.into(),
        }
    }
}

/// Delete (cancel) a live instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteProcessPayload {
    /// Target instance
    pub process_instance_id: ProcessInstanceId,

    /// Reason recorded with the cancellation
    pub reason: Option<String>,
}

impl DeleteProcessPayload {
    /// Payload for `id`
    pub fn new(id: impl Into<ProcessInstanceId>) -> Self {
        Self {
            process_instance_id: id.into(),
            reason: None,
        }
    }

    /// Attach a reason
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Broadcast a named signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalPayload {
    /// Signal name
    pub name: String,

    /// Variables merged into each receiving instance
    #[serde(default)]
    pub variables: Variables,

    /// Restrict delivery to one instance
    pub process_instance_id: Option<ProcessInstanceId>,
}

impl SignalPayload {
    /// Broadcast `name` to every awaiting instance
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variables: Variables::new(),
            process_instance_id: None,
        }
    }

    /// Add a variable to the signal
    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    /// Target a single instance
    pub fn for_instance(mut self, id: impl Into<ProcessInstanceId>) -> Self {
        self.process_instance_id = Some(id.into());
        self
    }

    /// Structural checks
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "Signal name must not be empty".to_string(),
            ));
        }
        validate_names(self.variables.keys())
    }

    /// The transient signal carried by this payload
    pub fn to_signal(&self) -> Signal {
        Signal {
            name: self.name.clone(),
            variables: self.variables.clone(),
        }
    }
}

/// Read the variables of an instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetVariablesPayload {
    /// Owning instance
    pub process_instance_id: ProcessInstanceId,

    /// Restrict to these names
    pub variable_names: Option<Vec<String>>,
}

impl GetVariablesPayload {
    /// All variables of `id`
    pub fn new(id: impl Into<ProcessInstanceId>) -> Self {
        Self {
            process_instance_id: id.into(),
            variable_names: None,
        }
    }

    /// Only the given names
    pub fn with_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variable_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Structural checks
    pub fn validate(&self) -> Result<(), CoreError> {
        require_instance_id(&self.process_instance_id)
    }
}

/// Bulk upsert of variables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetProcessVariablesPayload {
    /// Owning instance
    pub process_instance_id: ProcessInstanceId,

    /// Variables to create or overwrite
    pub variables: Variables,
}

impl SetProcessVariablesPayload {
    /// Empty batch for `id`
    pub fn new(id: impl Into<ProcessInstanceId>) -> Self {
        Self {
            process_instance_id: id.into(),
            variables: Variables::new(),
        }
    }

    /// Add a variable to the batch
    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    /// Structural checks
    pub fn validate(&self) -> Result<(), CoreError> {
        require_instance_id(&self.process_instance_id)?;
        validate_names(self.variables.keys())
    }
}

/// Bulk removal of variables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveProcessVariablesPayload {
    /// Owning instance
    pub process_instance_id: ProcessInstanceId,

    /// Names to remove; absent names are ignored
    pub variable_names: Vec<String>,
}

impl RemoveProcessVariablesPayload {
    /// Remove `names` from `id`
    pub fn new<I, S>(id: impl Into<ProcessInstanceId>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            process_instance_id: id.into(),
            variable_names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Structural checks
    pub fn validate(&self) -> Result<(), CoreError> {
        require_instance_id(&self.process_instance_id)?;
        validate_names(&self.variable_names)
    }
}

/// Filter for definition listings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetProcessDefinitionsPayload {
    /// Only this definition
    pub process_definition_id: Option<ProcessDefinitionId>,

    /// Only these keys; empty means all
    #[serde(default)]
    pub process_definition_keys: Vec<String>,
}

impl GetProcessDefinitionsPayload {
    /// Whether `definition` passes the filter
    pub fn matches(&self, definition: &ProcessDefinition) -> bool {
        if let Some(id) = &self.process_definition_id {
            if &definition.id != id {
                return false;
            }
        }

        self.process_definition_keys.is_empty()
            || self.process_definition_keys.contains(&definition.key)
    }
}

/// Filter for instance listings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetProcessInstancesPayload {
    /// Only instances with this business key
    pub business_key: Option<String>,

    /// Only instances of these definition keys; empty means all
    #[serde(default)]
    pub process_definition_keys: Vec<String>,

    /// Only children of this instance
    pub parent_process_instance_id: Option<ProcessInstanceId>,

    /// Only suspended instances
    #[serde(default)]
    pub suspended_only: bool,

    /// Only running instances
    #[serde(default)]
    pub active_only: bool,
}

impl GetProcessInstancesPayload {
    /// Whether `instance` passes the filter. Setting both status flags
    /// admits running and suspended instances.
    pub fn matches(&self, instance: &ProcessInstance) -> bool {
        if let Some(business_key) = &self.business_key {
            if instance.business_key.as_ref() != Some(business_key) {
                return false;
            }
        }

        if !self.process_definition_keys.is_empty()
            && !self
                .process_definition_keys
                .contains(&instance.process_definition_key)
        {
            return false;
        }

        if let Some(parent) = &self.parent_process_instance_id {
            if instance.parent_id.as_ref() != Some(parent) {
                return false;
            }
        }

        match (self.suspended_only, self.active_only) {
            (true, false) => instance.status == ProcessStatus::Suspended,
            (false, true) => instance.status == ProcessStatus::Running,
            (true, true) => matches!(
                instance.status,
                ProcessStatus::Running | ProcessStatus::Suspended
            ),
            (false, false) => true,
        }
    }
}
