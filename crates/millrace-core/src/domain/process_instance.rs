use crate::{
    domain::events::{
        DomainEvent, ProcessInstanceCancelled, ProcessInstanceCompleted, ProcessInstanceCreated,
        ProcessInstanceResumed, ProcessInstanceStarted, ProcessInstanceSuspended,
    },
    domain::process_definition::{ProcessDefinition, ProcessDefinitionId},
    types::{SortKey, Sortable},
    CoreError,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Value object: Process Instance ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessInstanceId(pub String);

impl ProcessInstanceId {
    /// Fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ProcessInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProcessInstanceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ProcessInstanceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Process instance status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessStatus {
    /// Created, waiting for activation
    Created,

    /// Executing
    Running,

    /// Paused by a caller
    Suspended,

    /// Reached an end state
    Completed,

    /// Deleted before completion
    Cancelled,
}

impl ProcessStatus {
    /// Whether an instance in this status belongs to the live set
    #[inline]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Created | Self::Running | Self::Suspended)
    }

    /// Whether no further transition is possible
    #[inline]
    pub fn is_terminal(self) -> bool {
        !self.is_live()
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Running => "RUNNING",
            Self::Suspended => "SUSPENDED",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }

    fn rank(self) -> i64 {
        match self {
            Self::Created => 0,
            Self::Running => 1,
            Self::Suspended => 2,
            Self::Completed => 3,
            Self::Cancelled => 4,
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate: Process instance
#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessInstance {
    /// Unique identifier
    pub id: ProcessInstanceId,

    /// Display name given at start
    pub name: Option<String>,

    /// Definition this instance was created from
    pub process_definition_id: ProcessDefinitionId,

    /// Key of the definition
    pub process_definition_key: String,

    /// Version of the definition
    pub process_definition_version: u32,

    /// Caller-supplied correlation key
    pub business_key: Option<String>,

    /// Parent instance, for sub-processes
    pub parent_id: Option<ProcessInstanceId>,

    /// Who started the instance
    pub initiator: Option<String>,

    /// Current status
    pub status: ProcessStatus,

    /// Creation timestamp
    pub start_date: DateTime<Utc>,

    /// Set once the instance completes or is cancelled
    pub completed_date: Option<DateTime<Utc>>,

    /// Domain events
    #[serde(skip)]
    pub events: Vec<Box<dyn DomainEvent>>,
}

impl Clone for ProcessInstance {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            name: self.name.clone(),
            process_definition_id: self.process_definition_id.clone(),
            process_definition_key: self.process_definition_key.clone(),
            process_definition_version: self.process_definition_version,
            business_key: self.business_key.clone(),
            parent_id: self.parent_id.clone(),
            initiator: self.initiator.clone(),
            status: self.status,
            start_date: self.start_date,
            completed_date: self.completed_date,
            events: Vec::new(), // Events are not cloned
        }
    }
}

impl PartialEq for ProcessInstance {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.process_definition_id == other.process_definition_id
            && self.process_definition_key == other.process_definition_key
            && self.process_definition_version == other.process_definition_version
            && self.business_key == other.business_key
            && self.parent_id == other.parent_id
            && self.initiator == other.initiator
            && self.status == other.status
            && self.start_date == other.start_date
            && self.completed_date == other.completed_date
    }
}

impl ProcessInstance {
    /// Create a new instance of `definition` in the CREATED state
    pub fn new(
        definition: &ProcessDefinition,
        business_key: Option<String>,
        name: Option<String>,
        parent_id: Option<ProcessInstanceId>,
        initiator: Option<String>,
    ) -> Self {
        let id = ProcessInstanceId::generate();
        let now = Utc::now();

        let mut instance = Self {
            id: id.clone(),
            name,
            process_definition_id: definition.id.clone(),
            process_definition_key: definition.key.clone(),
            process_definition_version: definition.version,
            business_key: business_key.clone(),
            parent_id,
            initiator,
            status: ProcessStatus::Created,
            start_date: now,
            completed_date: None,
            events: Vec::with_capacity(4),
        };

        instance.record_event(Box::new(ProcessInstanceCreated {
            process_instance_id: id,
            process_definition_id: definition.id.clone(),
            business_key,
            timestamp: now,
        }));

        instance
    }

    fn reject(&self, operation: &'static str) -> CoreError {
        CoreError::InvalidStateTransition {
            instance_id: self.id.0.clone(),
            from: self.status,
            operation,
        }
    }

    /// CREATED -> RUNNING
    pub fn start(&mut self) -> Result<(), CoreError> {
        if self.status != ProcessStatus::Created {
            return Err(self.reject("start"));
        }

        self.status = ProcessStatus::Running;
        self.record_event(Box::new(ProcessInstanceStarted {
            process_instance_id: self.id.clone(),
            timestamp: Utc::now(),
        }));

        Ok(())
    }

    /// RUNNING -> SUSPENDED
    pub fn suspend(&mut self) -> Result<(), CoreError> {
        if self.status != ProcessStatus::Running {
            return Err(self.reject("suspend"));
        }

        self.status = ProcessStatus::Suspended;
        self.record_event(Box::new(ProcessInstanceSuspended {
            process_instance_id: self.id.clone(),
            timestamp: Utc::now(),
        }));

        Ok(())
    }

    /// SUSPENDED -> RUNNING
    pub fn resume(&mut self) -> Result<(), CoreError> {
        if self.status != ProcessStatus::Suspended {
            return Err(self.reject("resume"));
        }

        self.status = ProcessStatus::Running;
        self.record_event(Box::new(ProcessInstanceResumed {
            process_instance_id: self.id.clone(),
            timestamp: Utc::now(),
        }));

        Ok(())
    }

    /// Any live status -> CANCELLED
    pub fn cancel(&mut self, reason: Option<String>) -> Result<(), CoreError> {
        if self.status.is_terminal() {
            return Err(self.reject("delete"));
        }

        let now = Utc::now();
        self.status = ProcessStatus::Cancelled;
        self.completed_date = Some(now);
        self.record_event(Box::new(ProcessInstanceCancelled {
            process_instance_id: self.id.clone(),
            reason,
            timestamp: now,
        }));

        Ok(())
    }

    /// RUNNING -> COMPLETED, driven by the execution behavior
    pub fn complete(&mut self) -> Result<(), CoreError> {
        if self.status != ProcessStatus::Running {
            return Err(self.reject("complete"));
        }

        let now = Utc::now();
        self.status = ProcessStatus::Completed;
        self.completed_date = Some(now);
        self.record_event(Box::new(ProcessInstanceCompleted {
            process_instance_id: self.id.clone(),
            timestamp: now,
        }));

        Ok(())
    }

    /// Record a domain event
    #[inline]
    pub fn record_event(&mut self, event: Box<dyn DomainEvent>) {
        self.events.push(event);
    }

    /// Take all recorded events
    #[inline]
    pub fn take_events(&mut self) -> Vec<Box<dyn DomainEvent>> {
        std::mem::take(&mut self.events)
    }
}

impl Sortable for ProcessInstance {
    fn is_sortable_by(property: &str) -> bool {
        matches!(
            property,
            "id" | "name"
                | "business_key"
                | "start_date"
                | "status"
                | "process_definition_key"
                | "key"
        )
    }

    fn sort_key(&self, property: &str) -> Option<SortKey> {
        match property {
            "id" => Some(SortKey::Text(self.id.0.clone())),
            "name" => self.name.clone().map(SortKey::Text),
            "business_key" => self.business_key.clone().map(SortKey::Text),
            "start_date" => Some(SortKey::Time(self.start_date)),
            "status" => Some(SortKey::Int(self.status.rank())),
            "process_definition_key" | "key" => {
                Some(SortKey::Text(self.process_definition_key.clone()))
            }
            _ => None,
        }
    }
}

/// Final snapshot of an instance handed to the history collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricProcessInstance {
    /// Instance as it was when it left the live set
    pub instance: ProcessInstance,

    /// Variable scope at that moment
    pub variables: Map<String, Value>,

    /// Cancellation reason, if any
    pub end_reason: Option<String>,
}

/// Execution details of a live instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInstanceMeta {
    /// Instance ID
    pub id: ProcessInstanceId,

    /// Current status
    pub status: ProcessStatus,

    /// Activities the instance is currently positioned at
    pub active_activity_ids: Vec<String>,

    /// Signals the instance currently waits for
    pub awaited_signals: Vec<String>,

    /// Variable names in insertion order
    pub variable_names: Vec<String>,

    /// Live child instances
    pub child_instance_ids: Vec<ProcessInstanceId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition() -> ProcessDefinition {
        ProcessDefinition::new("order:1", "order", "Order Process", 1)
    }

    fn new_instance() -> ProcessInstance {
        ProcessInstance::new(
            &definition(),
            Some("ORD-1".to_string()),
            None,
            None,
            Some("alice".to_string()),
        )
    }

    #[test]
    fn test_new_instance_is_created() {
        let mut instance = new_instance();

        assert_eq!(instance.status, ProcessStatus::Created);
        assert_eq!(instance.process_definition_key, "order");
        assert_eq!(instance.process_definition_version, 1);
        assert_eq!(instance.business_key.as_deref(), Some("ORD-1"));
        assert!(instance.completed_date.is_none());

        let events = instance.take_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "PROCESS_CREATED");
        assert!(instance.take_events().is_empty());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = new_instance();
        let b = new_instance();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut instance = new_instance();
        instance.start().unwrap();
        assert_eq!(instance.status, ProcessStatus::Running);

        instance.suspend().unwrap();
        assert_eq!(instance.status, ProcessStatus::Suspended);

        instance.resume().unwrap();
        assert_eq!(instance.status, ProcessStatus::Running);

        instance.complete().unwrap();
        assert_eq!(instance.status, ProcessStatus::Completed);
        assert!(instance.completed_date.is_some());

        let types: Vec<_> = instance
            .take_events()
            .iter()
            .map(|e| e.event_type())
            .collect();
        assert_eq!(
            types,
            vec![
                "PROCESS_CREATED",
                "PROCESS_STARTED",
                "PROCESS_SUSPENDED",
                "PROCESS_RESUMED",
                "PROCESS_COMPLETED"
            ]
        );
    }

    #[test]
    fn test_suspend_twice_is_rejected() {
        let mut instance = new_instance();
        instance.start().unwrap();
        instance.suspend().unwrap();

        let err = instance.suspend().unwrap_err();
        assert_eq!(
            err,
            CoreError::InvalidStateTransition {
                instance_id: instance.id.0.clone(),
                from: ProcessStatus::Suspended,
                operation: "suspend",
            }
        );
        assert_eq!(instance.status, ProcessStatus::Suspended);
    }

    #[test]
    fn test_resume_requires_suspended() {
        let mut instance = new_instance();
        instance.start().unwrap();
        assert!(matches!(
            instance.resume(),
            Err(CoreError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_cancel_from_any_live_status() {
        for setup in [0, 1, 2] {
            let mut instance = new_instance();
            if setup >= 1 {
                instance.start().unwrap();
            }
            if setup >= 2 {
                instance.suspend().unwrap();
            }

            instance.cancel(Some("obsolete".to_string())).unwrap();
            assert_eq!(instance.status, ProcessStatus::Cancelled);
            assert!(instance.completed_date.is_some());
        }
    }

    #[test]
    fn test_terminal_instance_is_never_mutated() {
        let mut instance = new_instance();
        instance.cancel(None).unwrap();
        instance.take_events();

        assert!(instance.start().is_err());
        assert!(instance.suspend().is_err());
        assert!(instance.resume().is_err());
        assert!(instance.complete().is_err());
        assert!(instance.cancel(None).is_err());
        assert_eq!(instance.status, ProcessStatus::Cancelled);
        assert!(instance.take_events().is_empty());
    }

    #[test]
    fn test_clone_drops_events() {
        let instance = new_instance();
        let copy = instance.clone();
        assert_eq!(copy, instance);
        assert!(copy.events.is_empty());
        assert_eq!(instance.events.len(), 1);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&ProcessStatus::Suspended).unwrap(),
            "\"SUSPENDED\""
        );
        assert_eq!(ProcessStatus::Running.to_string(), "RUNNING");
        assert!(ProcessStatus::Created.is_live());
        assert!(ProcessStatus::Completed.is_terminal());
    }
}
