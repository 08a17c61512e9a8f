//! Collaborator traits for the Millrace runtime
//!
//! Definition deployment and history storage live outside this crate. The
//! runtime talks to them through the traits below; in-memory implementations
//! are available behind the `testing` feature.

use async_trait::async_trait;

use super::process_definition::{ProcessDefinition, ProcessDefinitionId};
use super::process_instance::HistoricProcessInstance;
use crate::CoreError;

/// Read-only access to deployed process definitions
#[async_trait]
pub trait ProcessDefinitionRepository: Send + Sync {
    /// Find a definition by its exact ID
    async fn find_by_id(
        &self,
        id: &ProcessDefinitionId,
    ) -> Result<Option<ProcessDefinition>, CoreError>;

    /// Find the highest version deployed under `key`
    async fn find_latest_by_key(&self, key: &str) -> Result<Option<ProcessDefinition>, CoreError>;

    /// All deployed definitions, in deployment order
    async fn find_all(&self) -> Result<Vec<ProcessDefinition>, CoreError>;
}

/// Receives snapshots of instances leaving the live set
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// Store the final snapshot of a completed or cancelled instance
    async fn record(&self, snapshot: HistoricProcessInstance) -> Result<(), CoreError>;
}

/// History sink that drops every snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardingHistory;

#[async_trait]
impl HistoryRepository for DiscardingHistory {
    async fn record(&self, _snapshot: HistoricProcessInstance) -> Result<(), CoreError> {
        Ok(())
    }
}

/// Memory implementations for testing
#[cfg(feature = "testing")]
pub mod memory {
    use super::*;
    use crate::domain::events::{DomainEvent, DomainEventHandler};
    use crate::domain::process_instance::ProcessInstanceId;
    use dashmap::DashMap;
    use std::sync::{Arc, RwLock};

    /// In-memory definition store, keeping deployment order
    pub struct MemoryProcessDefinitionRepository {
        definitions: Arc<RwLock<Vec<ProcessDefinition>>>,
    }

    impl MemoryProcessDefinitionRepository {
        /// Create an empty repository
        pub fn new() -> Self {
            Self {
                definitions: Arc::new(RwLock::new(Vec::new())),
            }
        }

        /// Create a repository holding `definitions`
        pub fn with_definitions(
            definitions: impl IntoIterator<Item = ProcessDefinition>,
        ) -> Result<Self, CoreError> {
            let repository = Self::new();
            for definition in definitions {
                repository.deploy(definition)?;
            }
            Ok(repository)
        }

        /// Add a definition. IDs must be unique.
        pub fn deploy(&self, definition: ProcessDefinition) -> Result<(), CoreError> {
            definition.validate()?;

            let mut definitions = self.definitions.write().map_err(|e| {
                CoreError::StateStoreError(format!("Failed to acquire write lock: {}", e))
            })?;

            if definitions.iter().any(|d| d.id == definition.id) {
                return Err(CoreError::Conflict(format!(
                    "Process definition {} is already deployed",
                    definition.id
                )));
            }

            definitions.push(definition);
            Ok(())
        }
    }

    impl Default for MemoryProcessDefinitionRepository {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl ProcessDefinitionRepository for MemoryProcessDefinitionRepository {
        async fn find_by_id(
            &self,
            id: &ProcessDefinitionId,
        ) -> Result<Option<ProcessDefinition>, CoreError> {
            let definitions = self.definitions.read().map_err(|e| {
                CoreError::StateStoreError(format!("Failed to acquire read lock: {}", e))
            })?;

            Ok(definitions.iter().find(|d| &d.id == id).cloned())
        }

        async fn find_latest_by_key(
            &self,
            key: &str,
        ) -> Result<Option<ProcessDefinition>, CoreError> {
            let definitions = self.definitions.read().map_err(|e| {
                CoreError::StateStoreError(format!("Failed to acquire read lock: {}", e))
            })?;

            Ok(definitions
                .iter()
                .filter(|d| d.key == key)
                .max_by_key(|d| d.version)
                .cloned())
        }

        async fn find_all(&self) -> Result<Vec<ProcessDefinition>, CoreError> {
            let definitions = self.definitions.read().map_err(|e| {
                CoreError::StateStoreError(format!("Failed to acquire read lock: {}", e))
            })?;

            Ok(definitions.clone())
        }
    }

    /// In-memory history store
    pub struct MemoryHistoryRepository {
        snapshots: Arc<DashMap<String, HistoricProcessInstance>>,
    }

    impl MemoryHistoryRepository {
        /// Create an empty store
        pub fn new() -> Self {
            Self {
                snapshots: Arc::new(DashMap::with_capacity(64)),
            }
        }

        /// Snapshot recorded for `id`
        pub fn get(&self, id: &ProcessInstanceId) -> Option<HistoricProcessInstance> {
            self.snapshots.get(&id.0).map(|entry| entry.value().clone())
        }

        /// Number of recorded snapshots
        pub fn len(&self) -> usize {
            self.snapshots.len()
        }

        /// Whether nothing has been recorded
        pub fn is_empty(&self) -> bool {
            self.snapshots.is_empty()
        }
    }

    impl Default for MemoryHistoryRepository {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl HistoryRepository for MemoryHistoryRepository {
        async fn record(&self, snapshot: HistoricProcessInstance) -> Result<(), CoreError> {
            self.snapshots.insert(snapshot.instance.id.0.clone(), snapshot);
            Ok(())
        }
    }

    /// A delivered event, as seen by [`RecordingEventHandler`]
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RecordedEvent {
        /// Instance the event belongs to
        pub process_instance_id: ProcessInstanceId,
        /// Event type
        pub event_type: &'static str,
    }

    /// Event handler that remembers every event it receives
    pub struct RecordingEventHandler {
        events: RwLock<Vec<RecordedEvent>>,
    }

    impl RecordingEventHandler {
        /// Create an empty recorder
        pub fn new() -> Self {
            Self {
                events: RwLock::new(Vec::new()),
            }
        }

        /// All events received so far
        pub fn events(&self) -> Vec<RecordedEvent> {
            self.events
                .read()
                .map(|events| events.clone())
                .unwrap_or_default()
        }

        /// Event types received for one instance, in delivery order
        pub fn event_types_for(&self, id: &ProcessInstanceId) -> Vec<&'static str> {
            self.events()
                .into_iter()
                .filter(|e| &e.process_instance_id == id)
                .map(|e| e.event_type)
                .collect()
        }
    }

    impl Default for RecordingEventHandler {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl DomainEventHandler for RecordingEventHandler {
        async fn handle_event(&self, event: &dyn DomainEvent) -> Result<(), CoreError> {
            let mut events = self.events.write().map_err(|e| {
                CoreError::StateStoreError(format!("Failed to acquire write lock: {}", e))
            })?;

            events.push(RecordedEvent {
                process_instance_id: event.process_instance_id().clone(),
                event_type: event.event_type(),
            });
            Ok(())
        }
    }
}

#[cfg(all(test, feature = "testing"))]
mod tests {
    use super::memory::*;
    use super::*;
    use crate::domain::events::{DomainEventHandler, ProcessInstanceStarted};
    use crate::domain::process_instance::{ProcessInstance, ProcessInstanceId};
    use chrono::Utc;
    use serde_json::Map;

    #[tokio::test]
    async fn test_latest_by_key_picks_highest_version() {
        let repository = MemoryProcessDefinitionRepository::with_definitions([
            ProcessDefinition::new("order:1", "order", "Order", 1),
            ProcessDefinition::new("order:3", "order", "Order", 3),
            ProcessDefinition::new("order:2", "order", "Order", 2),
            ProcessDefinition::new("invoice:1", "invoice", "Invoice", 1),
        ])
        .unwrap();

        let latest = repository.find_latest_by_key("order").await.unwrap().unwrap();
        assert_eq!(latest.version, 3);

        assert!(repository.find_latest_by_key("missing").await.unwrap().is_none());

        let ids: Vec<_> = repository
            .find_all()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id.0)
            .collect();
        assert_eq!(ids, vec!["order:1", "order:3", "order:2", "invoice:1"]);
    }

    #[tokio::test]
    async fn test_deploy_rejects_duplicates_and_invalid() {
        let repository = MemoryProcessDefinitionRepository::new();
        repository
            .deploy(ProcessDefinition::new("order:1", "order", "Order", 1))
            .unwrap();

        assert!(matches!(
            repository.deploy(ProcessDefinition::new("order:1", "order", "Order", 1)),
            Err(CoreError::Conflict(_))
        ));
        assert!(matches!(
            repository.deploy(ProcessDefinition::new("x:0", "x", "X", 0)),
            Err(CoreError::ValidationError(_))
        ));

        let found = repository
            .find_by_id(&ProcessDefinitionId::from("order:1"))
            .await
            .unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_history_and_recorder() {
        let definition = ProcessDefinition::new("order:1", "order", "Order", 1);
        let instance = ProcessInstance::new(&definition, None, None, None, None);
        let id = instance.id.clone();

        let history = MemoryHistoryRepository::new();
        history
            .record(HistoricProcessInstance {
                instance,
                variables: Map::new(),
                end_reason: Some("done".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history.get(&id).unwrap().end_reason.as_deref(), Some("done"));

        let recorder = RecordingEventHandler::new();
        recorder
            .handle_event(&ProcessInstanceStarted {
                process_instance_id: id.clone(),
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
        assert_eq!(recorder.event_types_for(&id), vec!["PROCESS_STARTED"]);
        assert!(recorder
            .event_types_for(&ProcessInstanceId::from("other"))
            .is_empty());
    }
}
