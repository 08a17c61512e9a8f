use crate::domain::events::{DomainEvent, DomainEventHandler, EventCategory};
use std::sync::Arc;
use tracing::{trace, warn};

/// Routes domain events to the registered listeners by category
#[derive(Clone, Default)]
pub struct EventBus {
    process_listeners: Vec<Arc<dyn DomainEventHandler>>,
    variable_listeners: Vec<Arc<dyn DomainEventHandler>>,
}

impl EventBus {
    /// Create a bus over the given listener groups
    pub fn new(
        process_listeners: Vec<Arc<dyn DomainEventHandler>>,
        variable_listeners: Vec<Arc<dyn DomainEventHandler>>,
    ) -> Self {
        Self {
            process_listeners,
            variable_listeners,
        }
    }

    /// Deliver events in order. Listener failures are logged, never returned.
    pub async fn publish(&self, events: Vec<Box<dyn DomainEvent>>) {
        for event in events {
            let listeners = match event.category() {
                EventCategory::Process => &self.process_listeners,
                EventCategory::Variable => &self.variable_listeners,
            };

            trace!(
                process_instance_id = %event.process_instance_id(),
                event_type = event.event_type(),
                listeners = listeners.len(),
                "Publishing event"
            );

            for listener in listeners {
                if let Err(e) = listener.handle_event(event.as_ref()).await {
                    warn!(
                        process_instance_id = %event.process_instance_id(),
                        event_type = event.event_type(),
                        error = %e,
                        "Event listener failed"
                    );
                }
            }
        }
    }
}
