use crate::domain::process_instance::ProcessStatus;
use thiserror::Error;

/// Core error type for the Millrace runtime
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Process definition not found by id or key
    #[error("Process definition not found: {0}")]
    DefinitionNotFound(String),

    /// Process instance is not (or no longer) live
    #[error("Process instance not found: {0}")]
    InstanceNotFound(String),

    /// The requested transition is not allowed from the current status
    #[error("Cannot {operation} process instance {instance_id} in state {from}")]
    InvalidStateTransition {
        /// Instance the transition was attempted on
        instance_id: String,
        /// Status the instance was in
        from: ProcessStatus,
        /// Name of the rejected operation
        operation: &'static str,
    },

    /// Malformed payload
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Lock acquisition on an instance did not complete in time
    #[error("Timed out after {waited_ms}ms waiting for process instance {instance_id}")]
    Timeout {
        /// Instance whose lock could not be acquired
        instance_id: String,
        /// Configured lock timeout
        waited_ms: u64,
    },

    /// A concurrent mutation raced this one
    #[error("Conflict: {0}")]
    Conflict(String),

    /// No live instance awaits the signal
    #[error("Signal not handled: {0}")]
    SignalNotHandled(String),

    /// The runtime has been shut down and no longer accepts mutations
    #[error("Process runtime is shut down")]
    RuntimeShutdown,

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Failure reported by an external store
    #[error("State store error: {0}")]
    StateStoreError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for CoreError {
    fn from(err: serde_yaml::Error) -> Self {
        CoreError::ConfigurationError(err.to_string())
    }
}

impl From<String> for CoreError {
    fn from(err: String) -> Self {
        CoreError::Other(err)
    }
}

impl From<&str> for CoreError {
    fn from(err: &str) -> Self {
        CoreError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let errors = vec![
            (
                CoreError::DefinitionNotFound("order".to_string()),
                "Process definition not found: order",
            ),
            (
                CoreError::InstanceNotFound("pi-1".to_string()),
                "Process instance not found: pi-1",
            ),
            (
                CoreError::InvalidStateTransition {
                    instance_id: "pi-1".to_string(),
                    from: ProcessStatus::Suspended,
                    operation: "suspend",
                },
                "Cannot suspend process instance pi-1 in state SUSPENDED",
            ),
            (
                CoreError::ValidationError("empty".to_string()),
                "Validation error: empty",
            ),
            (
                CoreError::Timeout {
                    instance_id: "pi-2".to_string(),
                    waited_ms: 250,
                },
                "Timed out after 250ms waiting for process instance pi-2",
            ),
            (CoreError::Conflict("raced".to_string()), "Conflict: raced"),
            (
                CoreError::SignalNotHandled("go".to_string()),
                "Signal not handled: go",
            ),
            (CoreError::RuntimeShutdown, "Process runtime is shut down"),
            (CoreError::Other("other_err".to_string()), "other_err"),
        ];

        for (error, expected_msg) in errors {
            assert_eq!(error.to_string(), expected_msg);
        }
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let error: CoreError = json_error.into();

        match error {
            CoreError::SerializationError(msg) => {
                assert!(msg.contains("expected value"));
            }
            _ => panic!("Expected SerializationError variant"),
        }
    }

    #[test]
    fn test_from_yaml_error() {
        let yaml_error = serde_yaml::from_str::<u64>("not: [a number").unwrap_err();
        let error: CoreError = yaml_error.into();
        assert!(matches!(error, CoreError::ConfigurationError(_)));
    }

    #[test]
    fn test_from_str() {
        let error: CoreError = "test error message".into();
        assert_eq!(error, CoreError::Other("test error message".to_string()));
    }
}
