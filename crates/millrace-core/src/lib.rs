//!
//! Millrace Core - process instance runtime
//!
//! This crate holds the lifecycle engine for process instances: starting,
//! suspending, resuming, deleting and completing them, their variable
//! scopes, signal fan-out, and paged queries over definitions and live
//! instances. Definition storage, history and event listeners are
//! collaborators plugged in through traits.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Domain layer - aggregates, events, payloads and collaborator traits
pub mod domain;

/// Application services - lifecycle, variables, signals, queries
pub mod application;

/// Paging and sorting types
pub mod types;

/// Error types
pub mod error;

/// Runtime configuration
pub mod config;

pub use error::CoreError;
pub use types::{Direction, Order, Page, Pageable};

pub use application::process_runtime::{ProcessRuntime, ProcessRuntimeBuilder};
pub use config::{ProcessRuntimeConfiguration, RuntimeConfig};

pub use domain::events::{DomainEvent, DomainEventHandler, EventCategory};
pub use domain::execution::{Advance, ExecutionBehavior, NoWaitStates, Signal, SignalCatalog};
pub use domain::payloads::{
    DeleteProcessPayload, GetProcessDefinitionsPayload, GetProcessInstancesPayload,
    GetVariablesPayload, RemoveProcessVariablesPayload, ResumeProcessPayload,
    SetProcessVariablesPayload, SignalPayload, StartProcessPayload, SuspendProcessPayload,
};
pub use domain::process_definition::{ProcessDefinition, ProcessDefinitionId, ProcessDefinitionMeta};
pub use domain::process_instance::{
    HistoricProcessInstance, ProcessInstance, ProcessInstanceId, ProcessInstanceMeta,
    ProcessStatus,
};
pub use domain::repository::{DiscardingHistory, HistoryRepository, ProcessDefinitionRepository};
pub use domain::variables::{AffectedVariables, VariableInstance, Variables};
