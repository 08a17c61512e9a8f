//! Runtime metrics derived from domain events.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use millrace_core::{CoreError, DomainEvent, DomainEventHandler, EventCategory, ProcessInstanceId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::{MetricType, MetricsCollector};

/// Count of events by type and category
pub const EVENTS_TOTAL: &str = "millrace_events_total";
/// Instances created and not yet completed or cancelled
pub const LIVE_INSTANCES: &str = "millrace_live_instances";
/// Milliseconds from creation to completion or cancellation
pub const INSTANCE_DURATION_MS: &str = "millrace_instance_duration_ms";

/// Collector backed by the `metrics` facade. Whatever recorder the host
/// installs receives the values.
#[derive(Debug, Default, Clone, Copy)]
pub struct FacadeMetricsCollector;

impl MetricsCollector for FacadeMetricsCollector {
    fn record_metric(
        &self,
        name: &str,
        value: f64,
        metric_type: MetricType,
        labels: HashMap<String, String>,
    ) {
        let labels: Vec<::metrics::Label> = labels
            .into_iter()
            .map(|(key, value)| ::metrics::Label::new(key, value))
            .collect();
        match metric_type {
            MetricType::Counter => ::metrics::counter!(name.to_string(), value as u64, labels),
            MetricType::Gauge => ::metrics::gauge!(name.to_string(), value, labels),
            MetricType::Histogram => ::metrics::histogram!(name.to_string(), value, labels),
        }
    }

    fn flush(&self) -> BoxFuture<'static, Result<(), String>> {
        Box::pin(async { Ok(()) })
    }
}

/// Listener that turns process and variable events into metrics.
///
/// Register it as both a process and a variable listener to count every event.
pub struct MetricsEventHandler {
    collector: Arc<dyn MetricsCollector>,
    live: AtomicI64,
    created_at: Mutex<HashMap<ProcessInstanceId, DateTime<Utc>>>,
}

impl MetricsEventHandler {
    /// Handler reporting to `collector`
    pub fn new(collector: Arc<dyn MetricsCollector>) -> Self {
        Self {
            collector,
            live: AtomicI64::new(0),
            created_at: Mutex::new(HashMap::new()),
        }
    }

    /// Handler reporting through the `metrics` facade
    pub fn with_facade() -> Self {
        Self::new(Arc::new(FacadeMetricsCollector))
    }

    /// Instances this handler has seen created and not yet ended
    pub fn live_instances(&self) -> i64 {
        self.live.load(Ordering::SeqCst)
    }

    fn track_created(&self, event: &dyn DomainEvent) -> Result<(), CoreError> {
        self.created_at
            .lock()
            .map_err(|e| CoreError::Other(format!("metrics lock poisoned: {e}")))?
            .insert(event.process_instance_id().clone(), event.timestamp());
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.collector
            .record_metric(LIVE_INSTANCES, live as f64, MetricType::Gauge, HashMap::new());
        Ok(())
    }

    fn track_ended(&self, event: &dyn DomainEvent, outcome: &str) -> Result<(), CoreError> {
        let created = self
            .created_at
            .lock()
            .map_err(|e| CoreError::Other(format!("metrics lock poisoned: {e}")))?
            .remove(event.process_instance_id());

        // Instances created before the handler was registered are not counted as live
        let Some(created) = created else {
            return Ok(());
        };

        let live = self.live.fetch_sub(1, Ordering::SeqCst) - 1;
        self.collector
            .record_metric(LIVE_INSTANCES, live as f64, MetricType::Gauge, HashMap::new());

        let elapsed = (event.timestamp() - created).num_milliseconds().max(0);
        self.collector.record_metric(
            INSTANCE_DURATION_MS,
            elapsed as f64,
            MetricType::Histogram,
            HashMap::from([("outcome".to_string(), outcome.to_string())]),
        );
        Ok(())
    }
}

#[async_trait]
impl DomainEventHandler for MetricsEventHandler {
    async fn handle_event(&self, event: &dyn DomainEvent) -> Result<(), CoreError> {
        let category = match event.category() {
            EventCategory::Process => "process",
            EventCategory::Variable => "variable",
        };
        debug!(
            event_type = event.event_type(),
            process_instance_id = %event.process_instance_id(),
            "Recording event metric"
        );

        self.collector.record_metric(
            EVENTS_TOTAL,
            1.0,
            MetricType::Counter,
            HashMap::from([
                ("event_type".to_string(), event.event_type().to_string()),
                ("category".to_string(), category.to_string()),
            ]),
        );

        match event.event_type() {
            "PROCESS_CREATED" => self.track_created(event),
            "PROCESS_COMPLETED" => self.track_ended(event, "completed"),
            "PROCESS_CANCELLED" => self.track_ended(event, "cancelled"),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use millrace_core::domain::events::{
        ProcessInstanceCancelled, ProcessInstanceCreated, VariableCreated,
    };
    use millrace_core::ProcessDefinitionId;
    use serde_json::json;

    #[derive(Default)]
    struct Recorded(Mutex<Vec<(String, f64, MetricType, HashMap<String, String>)>>);

    impl MetricsCollector for Recorded {
        fn record_metric(
            &self,
            name: &str,
            value: f64,
            metric_type: MetricType,
            labels: HashMap<String, String>,
        ) {
            self.0
                .lock()
                .unwrap()
                .push((name.to_string(), value, metric_type, labels));
        }

        fn flush(&self) -> BoxFuture<'static, Result<(), String>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn created(id: &str) -> ProcessInstanceCreated {
        ProcessInstanceCreated {
            process_instance_id: ProcessInstanceId::from(id),
            process_definition_id: ProcessDefinitionId::from("order:1"),
            business_key: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_lifecycle_tracks_live_instances() {
        let recorded = Arc::new(Recorded::default());
        let handler = MetricsEventHandler::new(recorded.clone());

        handler.handle_event(&created("p-1")).await.unwrap();
        handler.handle_event(&created("p-2")).await.unwrap();
        assert_eq!(handler.live_instances(), 2);

        let cancelled = ProcessInstanceCancelled {
            process_instance_id: ProcessInstanceId::from("p-1"),
            reason: None,
            timestamp: Utc::now(),
        };
        handler.handle_event(&cancelled).await.unwrap();
        assert_eq!(handler.live_instances(), 1);

        let metrics = recorded.0.lock().unwrap();
        let durations: Vec<_> = metrics
            .iter()
            .filter(|(name, ..)| name == INSTANCE_DURATION_MS)
            .collect();
        assert_eq!(durations.len(), 1);
        assert_eq!(durations[0].2, MetricType::Histogram);
        assert_eq!(durations[0].3["outcome"], "cancelled");
    }

    #[tokio::test]
    async fn test_unknown_instance_end_is_ignored() {
        let recorded = Arc::new(Recorded::default());
        let handler = MetricsEventHandler::new(recorded.clone());

        let cancelled = ProcessInstanceCancelled {
            process_instance_id: ProcessInstanceId::from("elsewhere"),
            reason: Some("gone".to_string()),
            timestamp: Utc::now(),
        };
        handler.handle_event(&cancelled).await.unwrap();

        assert_eq!(handler.live_instances(), 0);
        assert_eq!(recorded.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_variable_events_carry_category_label() {
        let recorded = Arc::new(Recorded::default());
        let handler = MetricsEventHandler::new(recorded.clone());

        let event = VariableCreated {
            process_instance_id: ProcessInstanceId::from("p-1"),
            name: "amount".to_string(),
            value: json!(10),
            timestamp: Utc::now(),
        };
        handler.handle_event(&event).await.unwrap();

        let metrics = recorded.0.lock().unwrap();
        assert_eq!(metrics[0].0, EVENTS_TOTAL);
        assert_eq!(metrics[0].3["category"], "variable");
        assert_eq!(metrics[0].3["event_type"], "VARIABLE_CREATED");
    }

    #[test]
    fn test_facade_collector_without_recorder_is_noop() {
        FacadeMetricsCollector.record_metric(
            EVENTS_TOTAL,
            1.0,
            MetricType::Counter,
            HashMap::from([("event_type".to_string(), "PROCESS_CREATED".to_string())]),
        );
        FacadeMetricsCollector.record_metric(LIVE_INSTANCES, 3.0, MetricType::Gauge, HashMap::new());
    }
}
