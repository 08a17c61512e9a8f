use crate::{
    application::event_bus::EventBus,
    application::instance_table::InstanceTable,
    application::shutdown::ShutdownGate,
    config::RuntimeConfig,
    domain::events::{VariableCreated, VariableDeleted, VariableUpdated},
    domain::payloads::{
        GetVariablesPayload, RemoveProcessVariablesPayload, SetProcessVariablesPayload,
    },
    domain::process_instance::ProcessInstance,
    domain::variables::{AffectedVariables, VariableChange, VariableInstance},
    types::{apply_order, Page, Pageable},
    CoreError,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

/// Record one event per effective variable change on the instance
pub(crate) fn record_variable_changes(instance: &mut ProcessInstance, changes: &[VariableChange]) {
    let now = Utc::now();

    for change in changes {
        let process_instance_id = instance.id.clone();
        match change {
            VariableChange::Created { name, value } => {
                instance.record_event(Box::new(VariableCreated {
                    process_instance_id,
                    name: name.clone(),
                    value: value.clone(),
                    timestamp: now,
                }))
            }
            VariableChange::Updated {
                name,
                previous,
                current,
            } => instance.record_event(Box::new(VariableUpdated {
                process_instance_id,
                name: name.clone(),
                previous_value: previous.clone(),
                value: current.clone(),
                timestamp: now,
            })),
            VariableChange::Deleted { name, .. } => {
                instance.record_event(Box::new(VariableDeleted {
                    process_instance_id,
                    name: name.clone(),
                    timestamp: now,
                }))
            }
        }
    }
}

/// Reads and mutates instance variable scopes
#[derive(Clone)]
pub struct VariableService {
    table: Arc<InstanceTable>,
    bus: EventBus,
    gate: ShutdownGate,
    settings: RuntimeConfig,
}

impl VariableService {
    /// Create a new variable service
    pub fn new(
        table: Arc<InstanceTable>,
        bus: EventBus,
        gate: ShutdownGate,
        settings: RuntimeConfig,
    ) -> Self {
        Self {
            table,
            bus,
            gate,
            settings,
        }
    }

    /// Variables of an instance in insertion order
    pub async fn variables(
        &self,
        payload: &GetVariablesPayload,
    ) -> Result<Vec<VariableInstance>, CoreError> {
        payload.validate()?;
        let handle = self.table.get(&payload.process_instance_id)?;
        let guard = handle.lock(self.settings.lock_timeout()).await?;

        Ok(guard.variables.list(
            &payload.process_instance_id,
            payload.variable_names.as_deref(),
        ))
    }

    /// One page of the variables of an instance
    pub async fn variables_page(
        &self,
        payload: &GetVariablesPayload,
        pageable: &Pageable,
    ) -> Result<Page<VariableInstance>, CoreError> {
        pageable.validate(self.settings.max_page_size)?;
        let mut variables = self.variables(payload).await?;
        apply_order(&mut variables, &pageable.order)?;
        Ok(Page::from_ordered(variables, pageable))
    }

    /// Bulk upsert. The batch is applied as a whole under the instance lock.
    pub async fn set_variables(
        &self,
        payload: SetProcessVariablesPayload,
    ) -> Result<AffectedVariables, CoreError> {
        let _work = self.gate.enter()?;
        payload.validate()?;

        let handle = self.table.get(&payload.process_instance_id)?;
        let mut guard = handle.lock(self.settings.lock_timeout()).await?;

        let changes = guard.variables.apply_set(&payload.variables);
        self.commit(&mut guard.instance, &changes).await;

        debug!(
            process_instance_id = %payload.process_instance_id,
            changed = changes.len(),
            "Variables set"
        );

        Ok(self.affected(&guard.instance, changes))
    }

    /// Bulk removal. Names that do not exist are ignored.
    pub async fn remove_variables(
        &self,
        payload: RemoveProcessVariablesPayload,
    ) -> Result<AffectedVariables, CoreError> {
        let _work = self.gate.enter()?;
        payload.validate()?;

        let handle = self.table.get(&payload.process_instance_id)?;
        let mut guard = handle.lock(self.settings.lock_timeout()).await?;

        let changes = guard.variables.apply_remove(&payload.variable_names);
        self.commit(&mut guard.instance, &changes).await;

        debug!(
            process_instance_id = %payload.process_instance_id,
            removed = changes.len(),
            "Variables removed"
        );

        Ok(self.affected(&guard.instance, changes))
    }

    async fn commit(&self, instance: &mut ProcessInstance, changes: &[VariableChange]) {
        record_variable_changes(instance, changes);
        let events = instance.take_events();
        self.bus.publish(events).await;
    }

    fn affected(&self, instance: &ProcessInstance, changes: Vec<VariableChange>) -> AffectedVariables {
        if !self.settings.return_affected_variables {
            return AffectedVariables::NotTracked;
        }

        AffectedVariables::Affected(
            changes
                .into_iter()
                .map(|change| match change {
                    VariableChange::Created { name, value }
                    | VariableChange::Deleted { name, value } => {
                        VariableInstance::new(name, value, &instance.id)
                    }
                    VariableChange::Updated { name, current, .. } => {
                        VariableInstance::new(name, current, &instance.id)
                    }
                })
                .collect(),
        )
    }
}
