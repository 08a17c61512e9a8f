use crate::{
    application::event_bus::EventBus,
    application::instance_table::{InstanceHandle, InstanceTable},
    application::lifecycle_engine::LifecycleEngine,
    application::shutdown::ShutdownGate,
    application::variable_service::record_variable_changes,
    config::RuntimeConfig,
    domain::events::SignalReceived,
    domain::execution::{Advance, ExecutionBehavior, Signal},
    domain::payloads::SignalPayload,
    domain::process_instance::ProcessStatus,
    CoreError,
};
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info};

/// Fans named signals out to every awaiting instance
#[derive(Clone)]
pub struct SignalDispatcher {
    table: Arc<InstanceTable>,
    engine: LifecycleEngine,
    behavior: Arc<dyn ExecutionBehavior>,
    bus: EventBus,
    gate: ShutdownGate,
    settings: RuntimeConfig,
}

impl SignalDispatcher {
    /// Create a new signal dispatcher
    pub fn new(
        table: Arc<InstanceTable>,
        engine: LifecycleEngine,
        behavior: Arc<dyn ExecutionBehavior>,
        bus: EventBus,
        gate: ShutdownGate,
        settings: RuntimeConfig,
    ) -> Self {
        Self {
            table,
            engine,
            behavior,
            bus,
            gate,
            settings,
        }
    }

    /// Deliver a signal and wait until every reaction has been applied
    pub async fn signal(&self, payload: SignalPayload) -> Result<(), CoreError> {
        let _work = self.gate.enter()?;
        payload.validate()?;

        let signal = payload.to_signal();
        let targets = match &payload.process_instance_id {
            Some(id) => vec![self.table.get(id)?],
            None => self.table.snapshot(),
        };

        debug!(signal = %signal.name, candidates = targets.len(), "Dispatching signal");

        let results = join_all(
            targets
                .iter()
                .map(|handle| self.deliver(handle.as_ref(), &signal)),
        )
        .await;

        let mut delivered = 0usize;
        let mut first_error = None;

        for result in results {
            match result {
                Ok(true) => delivered += 1,
                Ok(false) | Err(CoreError::InstanceNotFound(_)) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        if delivered == 0 {
            if self.settings.fail_on_unhandled_signal {
                return Err(CoreError::SignalNotHandled(signal.name));
            }
            debug!(signal = %signal.name, "No process instance awaits signal");
        } else {
            info!(signal = %signal.name, delivered = delivered, "Signal delivered");
        }

        Ok(())
    }

    /// React to `signal` on one instance. Returns whether it was delivered.
    async fn deliver(&self, handle: &InstanceHandle, signal: &Signal) -> Result<bool, CoreError> {
        let mut guard = handle.lock(self.settings.lock_timeout()).await?;

        if guard.instance.status != ProcessStatus::Running
            || !self.behavior.awaits_signal(&guard.instance, &signal.name)
        {
            return Ok(false);
        }

        let mut variables = guard.variables.clone();
        let changes = variables.apply_set(&signal.variables);
        let advance = self
            .behavior
            .on_signal(&guard.instance, signal, &variables)
            .await?;

        guard.variables = variables;
        let process_instance_id = guard.instance.id.clone();
        guard.instance.record_event(Box::new(SignalReceived {
            process_instance_id: process_instance_id.clone(),
            signal_name: signal.name.clone(),
            timestamp: Utc::now(),
        }));
        record_variable_changes(&mut guard.instance, &changes);

        match advance {
            Advance::Wait => {
                let events = guard.instance.take_events();
                self.bus.publish(events).await;
            }
            Advance::Complete => {
                self.engine.complete_locked(guard).await?;
            }
        }

        debug!(
            process_instance_id = %process_instance_id,
            signal = %signal.name,
            advance = ?advance,
            "Signal applied"
        );
        Ok(true)
    }
}

#[cfg(all(test, feature = "testing"))]
mod tests {
    use super::*;
    use crate::application::definition_registry::DefinitionRegistry;
    use crate::domain::execution::{NoWaitStates, SignalCatalog};
    use crate::domain::payloads::{StartProcessPayload, SuspendProcessPayload};
    use crate::domain::process_definition::ProcessDefinition;
    use crate::domain::repository::memory::{
        MemoryHistoryRepository, MemoryProcessDefinitionRepository,
    };
    use serde_json::json;
    use std::time::Duration;

    fn build(
        behavior: Arc<dyn ExecutionBehavior>,
        settings: RuntimeConfig,
    ) -> (LifecycleEngine, SignalDispatcher, Arc<InstanceTable>) {
        let definitions = MemoryProcessDefinitionRepository::with_definitions([
            ProcessDefinition::new("order:1", "order", "Order", 1),
            ProcessDefinition::new("invoice:1", "invoice", "Invoice", 1),
        ])
        .unwrap();

        let table = Arc::new(InstanceTable::new());
        let gate = ShutdownGate::new();
        let bus = EventBus::default();
        let engine = LifecycleEngine::new(
            Arc::clone(&table),
            DefinitionRegistry::new(Arc::new(definitions)),
            Arc::new(MemoryHistoryRepository::new()),
            bus.clone(),
            gate.clone(),
            settings.clone(),
        );
        let dispatcher = SignalDispatcher::new(
            Arc::clone(&table),
            engine.clone(),
            behavior,
            bus,
            gate,
            settings,
        );
        (engine, dispatcher, table)
    }

    #[tokio::test]
    async fn test_signal_merges_variables_and_completes() {
        let catalog = SignalCatalog::new().subscribe("order", "waitPaid", "paid", Advance::Complete);
        let (engine, dispatcher, table) = build(Arc::new(catalog), RuntimeConfig::default());

        let order = engine
            .start(StartProcessPayload::by_key("order"))
            .await
            .unwrap();
        let invoice = engine
            .start(StartProcessPayload::by_key("invoice"))
            .await
            .unwrap();

        dispatcher
            .signal(SignalPayload::new("paid").with_variable("amount", json!(5)))
            .await
            .unwrap();

        assert!(table.get(&order.id).is_err());
        let handle = table.get(&invoice.id).unwrap();
        let state = handle.lock(Duration::from_secs(1)).await.unwrap();
        assert!(state.variables.is_empty());
    }

    #[tokio::test]
    async fn test_suspended_instances_do_not_receive() {
        let catalog = SignalCatalog::new().subscribe("order", "waitGo", "go", Advance::Wait);
        let settings = RuntimeConfig {
            fail_on_unhandled_signal: true,
            ..RuntimeConfig::default()
        };
        let (engine, dispatcher, _table) = build(Arc::new(catalog), settings);

        let order = engine
            .start(StartProcessPayload::by_key("order"))
            .await
            .unwrap();
        engine
            .suspend(SuspendProcessPayload::new(order.id.clone()))
            .await
            .unwrap();

        let result = dispatcher.signal(SignalPayload::new("go")).await;
        assert_eq!(result, Err(CoreError::SignalNotHandled("go".to_string())));
    }

    #[tokio::test]
    async fn test_unhandled_signal_is_noop_by_default() {
        let (_engine, dispatcher, _table) = build(Arc::new(NoWaitStates), RuntimeConfig::default());
        assert!(dispatcher.signal(SignalPayload::new("nobody")).await.is_ok());
    }

    #[tokio::test]
    async fn test_targeted_signal_to_missing_instance() {
        let (_engine, dispatcher, _table) = build(Arc::new(NoWaitStates), RuntimeConfig::default());
        let result = dispatcher
            .signal(SignalPayload::new("go").for_instance("missing"))
            .await;
        assert!(matches!(result, Err(CoreError::InstanceNotFound(_))));
    }
}
