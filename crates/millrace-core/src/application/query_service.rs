use crate::{
    application::definition_registry::DefinitionRegistry,
    application::instance_table::InstanceTable,
    config::RuntimeConfig,
    domain::execution::ExecutionBehavior,
    domain::payloads::{GetProcessDefinitionsPayload, GetProcessInstancesPayload},
    domain::process_definition::{ProcessDefinition, ProcessDefinitionMeta},
    domain::process_instance::{
        ProcessInstance, ProcessInstanceId, ProcessInstanceMeta, ProcessStatus,
    },
    types::{apply_order, Page, Pageable},
    CoreError,
};
use std::sync::Arc;
use tracing::debug;

/// Paged, filtered read access over definitions and live instances
#[derive(Clone)]
pub struct QueryService {
    registry: DefinitionRegistry,
    table: Arc<InstanceTable>,
    behavior: Arc<dyn ExecutionBehavior>,
    settings: RuntimeConfig,
}

impl QueryService {
    /// Create a new query service
    pub fn new(
        registry: DefinitionRegistry,
        table: Arc<InstanceTable>,
        behavior: Arc<dyn ExecutionBehavior>,
        settings: RuntimeConfig,
    ) -> Self {
        Self {
            registry,
            table,
            behavior,
            settings,
        }
    }

    /// Definition by ID, or latest version of a key
    pub async fn process_definition(&self, id_or_key: &str) -> Result<ProcessDefinition, CoreError> {
        self.registry.find(id_or_key).await
    }

    /// One page of deployed definitions
    pub async fn process_definitions(
        &self,
        pageable: &Pageable,
        filter: Option<&GetProcessDefinitionsPayload>,
    ) -> Result<Page<ProcessDefinition>, CoreError> {
        pageable.validate(self.settings.max_page_size)?;

        let mut definitions = self.registry.list(filter).await?;
        apply_order(&mut definitions, &pageable.order)?;
        Ok(Page::from_ordered(definitions, pageable))
    }

    /// A live instance
    pub async fn process_instance(
        &self,
        id: &ProcessInstanceId,
    ) -> Result<ProcessInstance, CoreError> {
        let handle = self.table.get(id)?;
        let guard = handle.lock(self.settings.lock_timeout()).await?;
        Ok(guard.instance.clone())
    }

    /// Snapshots of every live instance in insertion order. Instances that
    /// leave the live set while being read are skipped.
    async fn live_instances(&self) -> Result<Vec<ProcessInstance>, CoreError> {
        let handles = self.table.snapshot();
        let mut instances = Vec::with_capacity(handles.len());

        for handle in handles {
            match handle.lock(self.settings.lock_timeout()).await {
                Ok(guard) => instances.push(guard.instance.clone()),
                Err(CoreError::InstanceNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(instances)
    }

    /// One page of live instances
    pub async fn process_instances(
        &self,
        pageable: &Pageable,
        filter: Option<&GetProcessInstancesPayload>,
    ) -> Result<Page<ProcessInstance>, CoreError> {
        pageable.validate(self.settings.max_page_size)?;

        let mut instances = self.live_instances().await?;
        if let Some(filter) = filter {
            instances.retain(|instance| filter.matches(instance));
        }
        apply_order(&mut instances, &pageable.order)?;

        debug!(
            matched = instances.len(),
            start_index = pageable.start_index,
            "Listed process instances"
        );
        Ok(Page::from_ordered(instances, pageable))
    }

    /// Latest definition of `key` with counts of its live instances
    pub async fn process_definition_meta(
        &self,
        key: &str,
    ) -> Result<ProcessDefinitionMeta, CoreError> {
        let definition = self.registry.latest(key).await?;
        let instances = self.live_instances().await?;

        let count = |status: ProcessStatus| {
            instances
                .iter()
                .filter(|i| i.process_definition_key == definition.key && i.status == status)
                .count()
        };

        Ok(ProcessDefinitionMeta {
            created_instances: count(ProcessStatus::Created),
            running_instances: count(ProcessStatus::Running),
            suspended_instances: count(ProcessStatus::Suspended),
            id: definition.id.clone(),
            key: definition.key.clone(),
            name: definition.name.clone(),
            version: definition.version,
            description: definition.description.clone(),
        })
    }

    /// Execution details of a live instance
    pub async fn process_instance_meta(
        &self,
        id: &ProcessInstanceId,
    ) -> Result<ProcessInstanceMeta, CoreError> {
        let handle = self.table.get(id)?;
        let guard = handle.lock(self.settings.lock_timeout()).await?;

        Ok(ProcessInstanceMeta {
            id: guard.instance.id.clone(),
            status: guard.instance.status,
            active_activity_ids: self.behavior.active_activities(&guard.instance),
            awaited_signals: self.behavior.awaited_signals(&guard.instance),
            variable_names: guard.variables.names(),
            child_instance_ids: guard.children.clone(),
        })
    }
}
