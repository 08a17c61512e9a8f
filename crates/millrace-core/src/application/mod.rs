/// Process runtime façade
pub mod process_runtime;

/// Instance state transitions
pub mod lifecycle_engine;

/// Signal fan-out
pub mod signal_dispatcher;

/// Variable scopes
pub mod variable_service;

/// Paged queries
pub mod query_service;

/// Definition lookup
pub mod definition_registry;

/// Live instance table
pub mod instance_table;

/// Event routing to listeners
pub mod event_bus;

/// Admission control and draining
pub mod shutdown;
