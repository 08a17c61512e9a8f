use futures::future::BoxFuture;
use millrace_core::{
    domain::repository::memory::MemoryProcessDefinitionRepository, DeleteProcessPayload,
    ProcessDefinition, ProcessRuntime, SetProcessVariablesPayload, StartProcessPayload,
};
use millrace_monitoring::{
    logging::init_test_tracing,
    metrics::{EVENTS_TOTAL, INSTANCE_DURATION_MS, LIVE_INSTANCES},
    MetricType, MetricsCollector, MetricsEventHandler,
};
use mockall::{mock, predicate::*};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

mock! {
    Collector {}

    impl MetricsCollector for Collector {
        fn record_metric(
            &self,
            name: &str,
            value: f64,
            metric_type: MetricType,
            labels: HashMap<String, String>,
        );
        fn flush(&self) -> BoxFuture<'static, Result<(), String>>;
    }
}

fn runtime_with(handler: Arc<MetricsEventHandler>) -> ProcessRuntime {
    init_test_tracing();
    let definitions = MemoryProcessDefinitionRepository::with_definitions([
        ProcessDefinition::new("order:1", "order", "Order", 1),
    ])
    .unwrap();
    ProcessRuntime::builder(Arc::new(definitions))
        .with_process_listener(handler.clone())
        .with_variable_listener(handler)
        .build()
        .unwrap()
}

#[tokio::test]
async fn start_emits_event_counters_and_live_gauge() {
    let mut collector = MockCollector::new();
    collector
        .expect_record_metric()
        .with(
            eq(EVENTS_TOTAL),
            eq(1.0),
            eq(MetricType::Counter),
            always(),
        )
        .times(2)
        .return_const(());
    collector
        .expect_record_metric()
        .with(eq(LIVE_INSTANCES), eq(1.0), eq(MetricType::Gauge), always())
        .times(1)
        .return_const(());

    let handler = Arc::new(MetricsEventHandler::new(Arc::new(collector)));
    let runtime = runtime_with(handler.clone());

    runtime
        .start(StartProcessPayload::by_key("order"))
        .await
        .unwrap();

    assert_eq!(handler.live_instances(), 1);
}

#[derive(Default)]
struct Captured(Mutex<Vec<(String, HashMap<String, String>)>>);

impl MetricsCollector for Captured {
    fn record_metric(
        &self,
        name: &str,
        _value: f64,
        _metric_type: MetricType,
        labels: HashMap<String, String>,
    ) {
        self.0.lock().unwrap().push((name.to_string(), labels));
    }

    fn flush(&self) -> BoxFuture<'static, Result<(), String>> {
        Box::pin(async { Ok(()) })
    }
}

#[tokio::test]
async fn full_lifecycle_is_reflected_in_metrics() {
    let captured = Arc::new(Captured::default());
    let handler = Arc::new(MetricsEventHandler::new(captured.clone()));
    let runtime = runtime_with(handler.clone());

    let instance = runtime
        .start(StartProcessPayload::by_key("order").with_variable("amount", json!(5)))
        .await
        .unwrap();
    runtime
        .set_variables(
            SetProcessVariablesPayload::new(instance.id.clone()).with_variable("amount", json!(6)),
        )
        .await
        .unwrap();
    runtime
        .delete(DeleteProcessPayload::new(instance.id.clone()))
        .await
        .unwrap();

    assert_eq!(handler.live_instances(), 0);

    let captured = captured.0.lock().unwrap();
    let event_types: Vec<&str> = captured
        .iter()
        .filter(|(name, _)| name == EVENTS_TOTAL)
        .map(|(_, labels)| labels["event_type"].as_str())
        .collect();
    for expected in [
        "PROCESS_CREATED",
        "VARIABLE_CREATED",
        "PROCESS_STARTED",
        "VARIABLE_UPDATED",
        "PROCESS_CANCELLED",
    ] {
        assert!(event_types.contains(&expected), "missing {expected}");
    }

    let duration = captured
        .iter()
        .find(|(name, _)| name == INSTANCE_DURATION_MS)
        .unwrap();
    assert_eq!(duration.1["outcome"], "cancelled");
}
