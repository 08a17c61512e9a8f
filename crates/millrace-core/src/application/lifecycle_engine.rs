use crate::{
    application::definition_registry::DefinitionRegistry,
    application::event_bus::EventBus,
    application::instance_table::{InstanceHandle, InstanceState, InstanceTable},
    application::shutdown::{ShutdownGate, WorkGuard},
    application::variable_service::record_variable_changes,
    config::RuntimeConfig,
    domain::payloads::{
        DeleteProcessPayload, ResumeProcessPayload, StartProcessPayload, SuspendProcessPayload,
    },
    domain::process_instance::{
        HistoricProcessInstance, ProcessInstance, ProcessInstanceId, ProcessStatus,
    },
    domain::repository::HistoryRepository,
    domain::variables::VariableScope,
    CoreError,
};
use std::sync::Arc;
use tokio::sync::MutexGuard;
use tracing::{debug, info, warn};

const PARENT_DELETED: &str = "Parent process instance deleted";
const PARENT_COMPLETED: &str = "Parent process instance completed";

/// Drives instance state transitions
pub struct LifecycleEngine {
    table: Arc<InstanceTable>,
    registry: DefinitionRegistry,
    history: Arc<dyn HistoryRepository>,
    bus: EventBus,
    gate: ShutdownGate,
    settings: RuntimeConfig,
}

impl Clone for LifecycleEngine {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
            registry: self.registry.clone(),
            history: Arc::clone(&self.history),
            bus: self.bus.clone(),
            gate: self.gate.clone(),
            settings: self.settings.clone(),
        }
    }
}

/// What is left to do once an instance has been detached under its lock
struct Retired {
    snapshot: ProcessInstance,
    variables: VariableScope,
    children: Vec<ProcessInstanceId>,
    end_reason: Option<String>,
}

impl LifecycleEngine {
    /// Create a new lifecycle engine
    pub fn new(
        table: Arc<InstanceTable>,
        registry: DefinitionRegistry,
        history: Arc<dyn HistoryRepository>,
        bus: EventBus,
        gate: ShutdownGate,
        settings: RuntimeConfig,
    ) -> Self {
        Self {
            table,
            registry,
            history,
            bus,
            gate,
            settings,
        }
    }

    /// Start a new process instance
    pub async fn start(&self, payload: StartProcessPayload) -> Result<ProcessInstance, CoreError> {
        let work = self.gate.enter()?;
        payload.validate()?;

        let definition = self.registry.resolve_for_start(&payload).await?;

        let mut instance = ProcessInstance::new(
            &definition,
            payload.business_key.clone(),
            payload.name.clone(),
            payload.parent_process_instance_id.clone(),
            payload.initiator.clone(),
        );

        let mut variables = VariableScope::new();
        let changes = variables.apply_set(&payload.variables);
        record_variable_changes(&mut instance, &changes);

        if !definition.async_start {
            instance.start()?;
        }

        let instance_id = instance.id.clone();
        let handle = self
            .table
            .create_handle(InstanceState::new(instance, variables));
        let lock_timeout = self.settings.lock_timeout();
        let mut guard = handle.lock(lock_timeout).await?;

        match &payload.parent_process_instance_id {
            Some(parent_id) => {
                let parent = self.table.get(parent_id)?;
                let mut parent_state = parent.lock(lock_timeout).await?;
                parent_state.children.push(instance_id.clone());
                self.table.insert(Arc::clone(&handle));
            }
            None => self.table.insert(Arc::clone(&handle)),
        }

        let events = guard.instance.take_events();
        self.bus.publish(events).await;
        let snapshot = guard.instance.clone();
        drop(guard);

        info!(
            process_instance_id = %instance_id,
            process_definition_id = %definition.id,
            status = %snapshot.status,
            "Process instance started"
        );

        if definition.async_start {
            self.spawn_activation(handle, work.extend());
        }

        Ok(snapshot)
    }

    fn spawn_activation(&self, handle: Arc<InstanceHandle>, work: WorkGuard) {
        let engine = self.clone();

        tokio::spawn(async move {
            let _work = work;
            if let Err(e) = engine.activate(&handle).await {
                match e {
                    CoreError::InstanceNotFound(_) => debug!(
                        process_instance_id = %handle.id(),
                        "Instance left the live set before activation"
                    ),
                    other => warn!(
                        process_instance_id = %handle.id(),
                        error = %other,
                        "Asynchronous activation failed"
                    ),
                }
            }
        });
    }

    async fn activate(&self, handle: &InstanceHandle) -> Result<(), CoreError> {
        let mut guard = handle.lock(self.settings.lock_timeout()).await?;

        if guard.instance.status != ProcessStatus::Created {
            return Ok(());
        }

        guard.instance.start()?;
        let events = guard.instance.take_events();
        self.bus.publish(events).await;

        debug!(process_instance_id = %handle.id(), "Process instance activated");
        Ok(())
    }

    /// Suspend a running instance
    pub async fn suspend(
        &self,
        payload: SuspendProcessPayload,
    ) -> Result<ProcessInstance, CoreError> {
        let snapshot = self
            .transition(&payload.process_instance_id, ProcessInstance::suspend)
            .await?;
        info!(process_instance_id = %snapshot.id, "Process instance suspended");
        Ok(snapshot)
    }

    /// Resume a suspended instance
    pub async fn resume(&self, payload: ResumeProcessPayload) -> Result<ProcessInstance, CoreError> {
        let snapshot = self
            .transition(&payload.process_instance_id, ProcessInstance::resume)
            .await?;
        info!(process_instance_id = %snapshot.id, "Process instance resumed");
        Ok(snapshot)
    }

    async fn transition<F>(
        &self,
        id: &ProcessInstanceId,
        apply: F,
    ) -> Result<ProcessInstance, CoreError>
    where
        F: FnOnce(&mut ProcessInstance) -> Result<(), CoreError>,
    {
        let _work = self.gate.enter()?;
        let handle = self.table.get(id)?;
        let mut guard = handle.lock(self.settings.lock_timeout()).await?;

        apply(&mut guard.instance)?;

        let events = guard.instance.take_events();
        self.bus.publish(events).await;
        Ok(guard.instance.clone())
    }

    /// Cancel a live instance and every descendant
    pub async fn delete(&self, payload: DeleteProcessPayload) -> Result<ProcessInstance, CoreError> {
        let _work = self.gate.enter()?;
        let handle = self.table.get(&payload.process_instance_id)?;
        let guard = handle.lock(self.settings.lock_timeout()).await?;

        let retired = self.cancel_locked(guard, payload.reason).await?;
        let snapshot = retired.snapshot.clone();

        info!(
            process_instance_id = %snapshot.id,
            children = retired.children.len(),
            "Process instance deleted"
        );

        self.retire(retired, PARENT_DELETED).await;
        Ok(snapshot)
    }

    async fn cancel_locked(
        &self,
        mut guard: MutexGuard<'_, InstanceState>,
        reason: Option<String>,
    ) -> Result<Retired, CoreError> {
        guard.instance.cancel(reason.clone())?;
        Ok(self.detach_locked(guard, reason).await)
    }

    /// Complete a running instance whose lock the caller holds
    pub(crate) async fn complete_locked(
        &self,
        mut guard: MutexGuard<'_, InstanceState>,
    ) -> Result<ProcessInstance, CoreError> {
        guard.instance.complete()?;
        let retired = self.detach_locked(guard, None).await;
        let snapshot = retired.snapshot.clone();

        info!(process_instance_id = %snapshot.id, "Process instance completed");

        self.retire(retired, PARENT_COMPLETED).await;
        Ok(snapshot)
    }

    async fn detach_locked(
        &self,
        mut guard: MutexGuard<'_, InstanceState>,
        end_reason: Option<String>,
    ) -> Retired {
        guard.detached = true;
        self.table.remove(&guard.instance.id);

        let events = guard.instance.take_events();
        self.bus.publish(events).await;

        Retired {
            snapshot: guard.instance.clone(),
            variables: guard.variables.clone(),
            children: std::mem::take(&mut guard.children),
            end_reason,
        }
    }

    /// Post-lock work for an instance that left the live set: history,
    /// unlinking from the parent, cancelling descendants
    async fn retire(&self, retired: Retired, child_reason: &str) {
        let Retired {
            snapshot,
            variables,
            children,
            end_reason,
        } = retired;

        let id = snapshot.id.clone();
        let parent_id = snapshot.parent_id.clone();

        if let Err(e) = self
            .history
            .record(HistoricProcessInstance {
                instance: snapshot,
                variables: variables.to_map(),
                end_reason,
            })
            .await
        {
            warn!(process_instance_id = %id, error = %e, "Failed to record history");
        }

        if let Some(parent_id) = parent_id {
            self.unlink_from_parent(&parent_id, &id).await;
        }

        self.cancel_descendants(children, child_reason).await;
    }

    async fn unlink_from_parent(&self, parent_id: &ProcessInstanceId, child_id: &ProcessInstanceId) {
        let Ok(parent) = self.table.get(parent_id) else {
            return;
        };

        match parent.lock(self.settings.lock_timeout()).await {
            Ok(mut state) => state.children.retain(|c| c != child_id),
            Err(CoreError::InstanceNotFound(_)) => {}
            Err(e) => warn!(
                process_instance_id = %child_id,
                parent_id = %parent_id,
                error = %e,
                "Failed to unlink child from parent"
            ),
        };
    }

    /// Cancel every live descendant. A busy child is retried until its lock
    /// is acquired or it leaves the live set on its own.
    async fn cancel_descendants(&self, children: Vec<ProcessInstanceId>, reason: &str) {
        let mut pending = children;

        while let Some(child_id) = pending.pop() {
            let Ok(handle) = self.table.get(&child_id) else {
                continue;
            };

            let guard = loop {
                match handle.lock(self.settings.lock_timeout()).await {
                    Ok(guard) => break Some(guard),
                    Err(CoreError::Timeout { waited_ms, .. }) => warn!(
                        process_instance_id = %child_id,
                        waited_ms = waited_ms,
                        "Child process instance busy, retrying cancellation"
                    ),
                    Err(_) => break None,
                }
            };
            let Some(guard) = guard else {
                continue;
            };

            match self.cancel_locked(guard, Some(reason.to_string())).await {
                Ok(retired) => {
                    debug!(process_instance_id = %child_id, "Child process instance cancelled");

                    if let Err(e) = self
                        .history
                        .record(HistoricProcessInstance {
                            instance: retired.snapshot,
                            variables: retired.variables.to_map(),
                            end_reason: retired.end_reason,
                        })
                        .await
                    {
                        warn!(process_instance_id = %child_id, error = %e, "Failed to record history");
                    }

                    pending.extend(retired.children);
                }
                Err(e) => warn!(
                    process_instance_id = %child_id,
                    error = %e,
                    "Failed to cancel child process instance"
                ),
            };
        }
    }
}
