use crate::domain::process_definition::ProcessDefinitionId;
use crate::domain::process_instance::ProcessInstanceId;
use crate::CoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::any::Any;
use std::fmt::Debug;

/// Which listener group receives an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    /// Lifecycle transitions and signal deliveries
    Process,
    /// Variable creation, update and deletion
    Variable,
}

/// Domain event trait for all events in the system
pub trait DomainEvent: Debug + Send + Sync + 'static {
    /// Returns the type of the event as a string
    fn event_type(&self) -> &'static str;

    /// Returns the process instance ID this event is associated with
    fn process_instance_id(&self) -> &ProcessInstanceId;

    /// Returns the timestamp when the event occurred
    fn timestamp(&self) -> DateTime<Utc>;

    /// Listener group for this event
    fn category(&self) -> EventCategory {
        EventCategory::Process
    }

    /// Convert to Any for downcasting to the concrete event
    fn as_any(&self) -> &dyn Any;
}

/// Handler for domain events (the event-notification sink)
#[async_trait]
pub trait DomainEventHandler: Send + Sync {
    /// Handle a domain event
    async fn handle_event(&self, event: &dyn DomainEvent) -> Result<(), CoreError>;
}

/// Event: Process instance created
#[derive(Debug, Clone)]
pub struct ProcessInstanceCreated {
    /// The unique identifier of the process instance
    pub process_instance_id: ProcessInstanceId,

    /// The definition the instance was created from
    pub process_definition_id: ProcessDefinitionId,

    /// Business key supplied at start
    pub business_key: Option<String>,

    /// The timestamp when the process instance was created
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for ProcessInstanceCreated {
    fn event_type(&self) -> &'static str {
        "PROCESS_CREATED"
    }

    fn process_instance_id(&self) -> &ProcessInstanceId {
        &self.process_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Event: Process instance started running
#[derive(Debug, Clone)]
pub struct ProcessInstanceStarted {
    /// The unique identifier of the process instance
    pub process_instance_id: ProcessInstanceId,
    /// The timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for ProcessInstanceStarted {
    fn event_type(&self) -> &'static str {
        "PROCESS_STARTED"
    }

    fn process_instance_id(&self) -> &ProcessInstanceId {
        &self.process_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Event: Process instance suspended by a caller
#[derive(Debug, Clone)]
pub struct ProcessInstanceSuspended {
    /// The unique identifier of the process instance
    pub process_instance_id: ProcessInstanceId,
    /// The timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for ProcessInstanceSuspended {
    fn event_type(&self) -> &'static str {
        "PROCESS_SUSPENDED"
    }

    fn process_instance_id(&self) -> &ProcessInstanceId {
        &self.process_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Event: Process instance resumed
#[derive(Debug, Clone)]
pub struct ProcessInstanceResumed {
    /// The unique identifier of the process instance
    pub process_instance_id: ProcessInstanceId,
    /// The timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for ProcessInstanceResumed {
    fn event_type(&self) -> &'static str {
        "PROCESS_RESUMED"
    }

    fn process_instance_id(&self) -> &ProcessInstanceId {
        &self.process_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Event: Process instance cancelled (deleted)
#[derive(Debug, Clone)]
pub struct ProcessInstanceCancelled {
    /// The unique identifier of the process instance
    pub process_instance_id: ProcessInstanceId,
    /// Reason given for the cancellation
    pub reason: Option<String>,
    /// The timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for ProcessInstanceCancelled {
    fn event_type(&self) -> &'static str {
        "PROCESS_CANCELLED"
    }

    fn process_instance_id(&self) -> &ProcessInstanceId {
        &self.process_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Event: Process instance reached an end state
#[derive(Debug, Clone)]
pub struct ProcessInstanceCompleted {
    /// The unique identifier of the process instance
    pub process_instance_id: ProcessInstanceId,
    /// The timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for ProcessInstanceCompleted {
    fn event_type(&self) -> &'static str {
        "PROCESS_COMPLETED"
    }

    fn process_instance_id(&self) -> &ProcessInstanceId {
        &self.process_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Event: A signal was delivered to a waiting instance
#[derive(Debug, Clone)]
pub struct SignalReceived {
    /// The unique identifier of the process instance
    pub process_instance_id: ProcessInstanceId,
    /// Name of the delivered signal
    pub signal_name: String,
    /// The timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for SignalReceived {
    fn event_type(&self) -> &'static str {
        "SIGNAL_RECEIVED"
    }

    fn process_instance_id(&self) -> &ProcessInstanceId {
        &self.process_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Event: Variable created in an instance scope
#[derive(Debug, Clone)]
pub struct VariableCreated {
    /// The owning process instance
    pub process_instance_id: ProcessInstanceId,
    /// Variable name
    pub name: String,
    /// Initial value
    pub value: Value,
    /// The timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for VariableCreated {
    fn event_type(&self) -> &'static str {
        "VARIABLE_CREATED"
    }

    fn process_instance_id(&self) -> &ProcessInstanceId {
        &self.process_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn category(&self) -> EventCategory {
        EventCategory::Variable
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Event: Variable overwritten
#[derive(Debug, Clone)]
pub struct VariableUpdated {
    /// The owning process instance
    pub process_instance_id: ProcessInstanceId,
    /// Variable name
    pub name: String,
    /// Value before the update
    pub previous_value: Value,
    /// Value after the update
    pub value: Value,
    /// The timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for VariableUpdated {
    fn event_type(&self) -> &'static str {
        "VARIABLE_UPDATED"
    }

    fn process_instance_id(&self) -> &ProcessInstanceId {
        &self.process_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn category(&self) -> EventCategory {
        EventCategory::Variable
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Event: Variable removed from an instance scope
#[derive(Debug, Clone)]
pub struct VariableDeleted {
    /// The owning process instance
    pub process_instance_id: ProcessInstanceId,
    /// Variable name
    pub name: String,
    /// The timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for VariableDeleted {
    fn event_type(&self) -> &'static str {
        "VARIABLE_DELETED"
    }

    fn process_instance_id(&self) -> &ProcessInstanceId {
        &self.process_instance_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn category(&self) -> EventCategory {
        EventCategory::Variable
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
