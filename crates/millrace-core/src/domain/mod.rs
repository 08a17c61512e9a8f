/// Process instance aggregate and status
pub mod process_instance;

/// Domain events
pub mod events;

/// Process definition models
pub mod process_definition;

/// Instance variable scope
pub mod variables;

/// Execution-position capability
pub mod execution;

/// Request payloads
pub mod payloads;

/// Collaborator interfaces
pub mod repository;
