//! Logging and metrics for the Millrace process runtime.
//!
//! [`init`] installs the global tracing subscriber. [`MetricsEventHandler`]
//! turns runtime events into metrics once registered as a listener.

#![warn(missing_docs)]

use futures::future::BoxFuture;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::info;

pub mod logging;
pub mod metrics;

pub use crate::logging::init_logging;
pub use crate::metrics::{FacadeMetricsCollector, MetricsEventHandler};

/// Type of metric for collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    /// Counter metrics accumulate values
    Counter,
    /// Gauge metrics record current values
    Gauge,
    /// Histogram metrics observe distributions
    Histogram,
}

/// Sink for metrics recorded by the runtime listeners
pub trait MetricsCollector: Send + Sync {
    /// Record a metric with the given name, value, type, and labels
    fn record_metric(
        &self,
        name: &str,
        value: f64,
        metric_type: MetricType,
        labels: HashMap<String, String>,
    );

    /// Flush metrics to the backend
    fn flush(&self) -> BoxFuture<'static, Result<(), String>>;
}

/// Configuration for initializing the monitoring system
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Service name attached to startup logs
    pub service_name: String,
    /// Log level filter (e.g., "info,millrace_core=debug"), overridden by `RUST_LOG`
    pub log_filter: String,
    /// Emit JSON lines instead of human readable output
    pub json_logging: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            service_name: "millrace".to_string(),
            log_filter: "info".to_string(),
            json_logging: false,
        }
    }
}

impl MonitoringConfig {
    /// Defaults overridden by `MILLRACE_SERVICE_NAME`, `MILLRACE_LOG` and
    /// `MILLRACE_JSON_LOGS`
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(name) = std::env::var("MILLRACE_SERVICE_NAME") {
            config.service_name = name;
        }
        if let Ok(filter) = std::env::var("MILLRACE_LOG") {
            config.log_filter = filter;
        }
        if let Ok(json) = std::env::var("MILLRACE_JSON_LOGS") {
            config.json_logging = matches!(json.to_ascii_lowercase().as_str(), "true" | "1" | "yes");
        }
        config
    }
}

/// Initialize monitoring system
pub fn init(config: &MonitoringConfig) -> anyhow::Result<()> {
    init_logging(config)?;
    info!(service_name = %config.service_name, "Monitoring initialized");
    Ok(())
}

/// Shutdown the monitoring system
pub fn shutdown() {
    info!("Shutting down monitoring system");
}
