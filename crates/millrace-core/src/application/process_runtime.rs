use crate::{
    application::definition_registry::DefinitionRegistry,
    application::event_bus::EventBus,
    application::instance_table::InstanceTable,
    application::lifecycle_engine::LifecycleEngine,
    application::query_service::QueryService,
    application::shutdown::ShutdownGate,
    application::signal_dispatcher::SignalDispatcher,
    application::variable_service::VariableService,
    config::{ProcessRuntimeConfiguration, RuntimeConfig},
    domain::events::DomainEventHandler,
    domain::execution::{ExecutionBehavior, NoWaitStates},
    domain::payloads::{
        DeleteProcessPayload, GetProcessDefinitionsPayload, GetProcessInstancesPayload,
        GetVariablesPayload, RemoveProcessVariablesPayload, ResumeProcessPayload,
        SetProcessVariablesPayload, SignalPayload, StartProcessPayload, SuspendProcessPayload,
    },
    domain::process_definition::{ProcessDefinition, ProcessDefinitionMeta},
    domain::process_instance::{ProcessInstance, ProcessInstanceId, ProcessInstanceMeta},
    domain::repository::{DiscardingHistory, HistoryRepository, ProcessDefinitionRepository},
    domain::variables::{AffectedVariables, VariableInstance},
    types::{Page, Pageable},
    CoreError,
};
use std::sync::Arc;
use tracing::info;

/// The process runtime: lifecycle, variables, signals and queries over
/// process instances
#[derive(Clone)]
pub struct ProcessRuntime {
    configuration: ProcessRuntimeConfiguration,
    engine: LifecycleEngine,
    variables: VariableService,
    dispatcher: SignalDispatcher,
    queries: QueryService,
    gate: ShutdownGate,
}

impl ProcessRuntime {
    /// Start building a runtime over deployed definitions
    pub fn builder(definitions: Arc<dyn ProcessDefinitionRepository>) -> ProcessRuntimeBuilder {
        ProcessRuntimeBuilder::new(definitions)
    }

    /// Settings and registered listeners
    pub fn configuration(&self) -> &ProcessRuntimeConfiguration {
        &self.configuration
    }

    /// Definition by ID, falling back to the latest version of a key
    pub async fn process_definition(&self, id_or_key: &str) -> Result<ProcessDefinition, CoreError> {
        self.queries.process_definition(id_or_key).await
    }

    /// One page of deployed definitions
    pub async fn process_definitions(
        &self,
        pageable: &Pageable,
    ) -> Result<Page<ProcessDefinition>, CoreError> {
        self.queries.process_definitions(pageable, None).await
    }

    /// One page of deployed definitions matching `filter`
    pub async fn process_definitions_filtered(
        &self,
        pageable: &Pageable,
        filter: &GetProcessDefinitionsPayload,
    ) -> Result<Page<ProcessDefinition>, CoreError> {
        self.queries.process_definitions(pageable, Some(filter)).await
    }

    /// Start a new instance
    pub async fn start(&self, payload: StartProcessPayload) -> Result<ProcessInstance, CoreError> {
        self.engine.start(payload).await
    }

    /// One page of live instances
    pub async fn process_instances(
        &self,
        pageable: &Pageable,
    ) -> Result<Page<ProcessInstance>, CoreError> {
        self.queries.process_instances(pageable, None).await
    }

    /// One page of live instances matching `filter`
    pub async fn process_instances_filtered(
        &self,
        pageable: &Pageable,
        filter: &GetProcessInstancesPayload,
    ) -> Result<Page<ProcessInstance>, CoreError> {
        self.queries.process_instances(pageable, Some(filter)).await
    }

    /// A live instance
    pub async fn process_instance(
        &self,
        id: &ProcessInstanceId,
    ) -> Result<ProcessInstance, CoreError> {
        self.queries.process_instance(id).await
    }

    /// Suspend a running instance
    pub async fn suspend(
        &self,
        payload: SuspendProcessPayload,
    ) -> Result<ProcessInstance, CoreError> {
        self.engine.suspend(payload).await
    }

    /// Resume a suspended instance
    pub async fn resume(&self, payload: ResumeProcessPayload) -> Result<ProcessInstance, CoreError> {
        self.engine.resume(payload).await
    }

    /// Cancel an instance and its descendants
    pub async fn delete(&self, payload: DeleteProcessPayload) -> Result<ProcessInstance, CoreError> {
        self.engine.delete(payload).await
    }

    /// Broadcast a signal
    pub async fn signal(&self, payload: SignalPayload) -> Result<(), CoreError> {
        self.dispatcher.signal(payload).await
    }

    /// Latest definition of `key` with live instance counts
    pub async fn process_definition_meta(
        &self,
        key: &str,
    ) -> Result<ProcessDefinitionMeta, CoreError> {
        self.queries.process_definition_meta(key).await
    }

    /// Execution details of a live instance
    pub async fn process_instance_meta(
        &self,
        id: &ProcessInstanceId,
    ) -> Result<ProcessInstanceMeta, CoreError> {
        self.queries.process_instance_meta(id).await
    }

    /// Variables of an instance
    pub async fn variables(
        &self,
        payload: &GetVariablesPayload,
    ) -> Result<Vec<VariableInstance>, CoreError> {
        self.variables.variables(payload).await
    }

    /// One page of the variables of an instance
    pub async fn variables_page(
        &self,
        payload: &GetVariablesPayload,
        pageable: &Pageable,
    ) -> Result<Page<VariableInstance>, CoreError> {
        self.variables.variables_page(payload, pageable).await
    }

    /// Bulk upsert of variables
    pub async fn set_variables(
        &self,
        payload: SetProcessVariablesPayload,
    ) -> Result<AffectedVariables, CoreError> {
        self.variables.set_variables(payload).await
    }

    /// Bulk removal of variables
    pub async fn remove_variables(
        &self,
        payload: RemoveProcessVariablesPayload,
    ) -> Result<AffectedVariables, CoreError> {
        self.variables.remove_variables(payload).await
    }

    /// Stop admitting mutations and wait for in-flight work to drain.
    /// Queries keep working.
    pub async fn shutdown(&self) {
        info!(in_flight = self.gate.in_flight(), "Shutting down process runtime");
        self.gate.close().await;
        info!("Process runtime shut down");
    }
}

/// Assembles a [`ProcessRuntime`] from its collaborators
pub struct ProcessRuntimeBuilder {
    definitions: Arc<dyn ProcessDefinitionRepository>,
    history: Arc<dyn HistoryRepository>,
    behavior: Arc<dyn ExecutionBehavior>,
    process_listeners: Vec<Arc<dyn DomainEventHandler>>,
    variable_listeners: Vec<Arc<dyn DomainEventHandler>>,
    settings: RuntimeConfig,
}

impl ProcessRuntimeBuilder {
    /// Builder with default settings, no listeners, no history and no wait states
    pub fn new(definitions: Arc<dyn ProcessDefinitionRepository>) -> Self {
        Self {
            definitions,
            history: Arc::new(DiscardingHistory),
            behavior: Arc::new(NoWaitStates),
            process_listeners: Vec::new(),
            variable_listeners: Vec::new(),
            settings: RuntimeConfig::default(),
        }
    }

    /// Receive snapshots of completed and cancelled instances
    pub fn with_history(mut self, history: Arc<dyn HistoryRepository>) -> Self {
        self.history = history;
        self
    }

    /// Decide how instances react to signals
    pub fn with_execution_behavior(mut self, behavior: Arc<dyn ExecutionBehavior>) -> Self {
        self.behavior = behavior;
        self
    }

    /// Register a process event listener
    pub fn with_process_listener(mut self, listener: Arc<dyn DomainEventHandler>) -> Self {
        self.process_listeners.push(listener);
        self
    }

    /// Register a variable event listener
    pub fn with_variable_listener(mut self, listener: Arc<dyn DomainEventHandler>) -> Self {
        self.variable_listeners.push(listener);
        self
    }

    /// Replace the settings
    pub fn with_config(mut self, settings: RuntimeConfig) -> Self {
        self.settings = settings;
        self
    }

    /// Validate the settings and wire the services together
    pub fn build(self) -> Result<ProcessRuntime, CoreError> {
        self.settings.validate()?;

        let table = Arc::new(InstanceTable::new());
        let registry = DefinitionRegistry::new(self.definitions);
        let gate = ShutdownGate::new();
        let bus = EventBus::new(
            self.process_listeners.clone(),
            self.variable_listeners.clone(),
        );

        let engine = LifecycleEngine::new(
            Arc::clone(&table),
            registry.clone(),
            self.history,
            bus.clone(),
            gate.clone(),
            self.settings.clone(),
        );
        let variables = VariableService::new(
            Arc::clone(&table),
            bus.clone(),
            gate.clone(),
            self.settings.clone(),
        );
        let dispatcher = SignalDispatcher::new(
            Arc::clone(&table),
            engine.clone(),
            Arc::clone(&self.behavior),
            bus,
            gate.clone(),
            self.settings.clone(),
        );
        let queries = QueryService::new(registry, table, self.behavior, self.settings.clone());

        info!(
            lock_timeout_ms = self.settings.lock_timeout_ms,
            return_affected_variables = self.settings.return_affected_variables,
            fail_on_unhandled_signal = self.settings.fail_on_unhandled_signal,
            "Process runtime built"
        );

        Ok(ProcessRuntime {
            configuration: ProcessRuntimeConfiguration {
                settings: self.settings,
                process_event_listeners: self.process_listeners,
                variable_event_listeners: self.variable_listeners,
            },
            engine,
            variables,
            dispatcher,
            queries,
            gate,
        })
    }
}

#[cfg(all(test, feature = "testing"))]
mod tests {
    use super::*;
    use crate::domain::repository::memory::{
        MemoryProcessDefinitionRepository, RecordingEventHandler,
    };

    fn definitions() -> Arc<MemoryProcessDefinitionRepository> {
        Arc::new(
            MemoryProcessDefinitionRepository::with_definitions([ProcessDefinition::new(
                "order:1", "order", "Order", 1,
            )])
            .unwrap(),
        )
    }

    #[test]
    fn test_build_rejects_invalid_settings() {
        let result = ProcessRuntime::builder(definitions())
            .with_config(RuntimeConfig {
                lock_timeout_ms: 0,
                ..RuntimeConfig::default()
            })
            .build();
        assert!(matches!(result, Err(CoreError::ConfigurationError(_))));
    }

    #[test]
    fn test_configuration_exposes_listeners() {
        let recorder = Arc::new(RecordingEventHandler::new());
        let runtime = ProcessRuntime::builder(definitions())
            .with_process_listener(recorder.clone())
            .with_process_listener(recorder.clone())
            .with_variable_listener(recorder)
            .build()
            .unwrap();

        let configuration = runtime.configuration();
        assert_eq!(configuration.process_event_listeners.len(), 2);
        assert_eq!(configuration.variable_event_listeners.len(), 1);
        assert_eq!(configuration.settings, RuntimeConfig::default());
    }

    #[tokio::test]
    async fn test_shutdown_rejects_mutations_but_allows_queries() {
        let runtime = ProcessRuntime::builder(definitions()).build().unwrap();
        let instance = runtime
            .start(StartProcessPayload::by_key("order"))
            .await
            .unwrap();

        runtime.shutdown().await;

        assert_eq!(
            runtime.start(StartProcessPayload::by_key("order")).await,
            Err(CoreError::RuntimeShutdown)
        );
        assert_eq!(
            runtime
                .suspend(SuspendProcessPayload::new(instance.id.clone()))
                .await,
            Err(CoreError::RuntimeShutdown)
        );
        assert!(runtime.process_instance(&instance.id).await.is_ok());
    }
}
