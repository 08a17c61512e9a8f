//! Runtime configuration
//!
//! Settings are read from `MILLRACE_*` environment variables or from a YAML
//! document. Anything not given falls back to its default.

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::domain::events::DomainEventHandler;
use crate::CoreError;

/// Tunables of the process runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Upper bound on waiting for an instance lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Report affected variables from variable mutations
    #[serde(default)]
    pub return_affected_variables: bool,

    /// Fail a signal nobody awaits
    #[serde(default)]
    pub fail_on_unhandled_signal: bool,

    /// Largest page a query may request
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

fn default_max_page_size() -> usize {
    1000
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
            return_affected_variables: false,
            fail_on_unhandled_signal: false,
            max_page_size: default_max_page_size(),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self, CoreError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source. Invalid values
    /// are logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(timeout) = lookup("MILLRACE_LOCK_TIMEOUT_MS") {
            if let Ok(timeout) = timeout.trim().parse::<u64>() {
                config.lock_timeout_ms = timeout;
            } else {
                warn!("Invalid MILLRACE_LOCK_TIMEOUT_MS value: {}", timeout);
            }
        }

        if let Some(flag) = lookup("MILLRACE_RETURN_AFFECTED_VARIABLES") {
            if let Some(flag) = parse_flag(&flag) {
                config.return_affected_variables = flag;
            } else {
                warn!("Invalid MILLRACE_RETURN_AFFECTED_VARIABLES value: {}", flag);
            }
        }

        if let Some(flag) = lookup("MILLRACE_FAIL_ON_UNHANDLED_SIGNAL") {
            if let Some(flag) = parse_flag(&flag) {
                config.fail_on_unhandled_signal = flag;
            } else {
                warn!("Invalid MILLRACE_FAIL_ON_UNHANDLED_SIGNAL value: {}", flag);
            }
        }

        if let Some(size) = lookup("MILLRACE_MAX_PAGE_SIZE") {
            if let Ok(size) = size.trim().parse::<usize>() {
                config.max_page_size = size;
            } else {
                warn!("Invalid MILLRACE_MAX_PAGE_SIZE value: {}", size);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CoreError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the runtime cannot work with
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.lock_timeout_ms == 0 {
            return Err(CoreError::ConfigurationError(
                "lock_timeout_ms must be greater than zero".to_string(),
            ));
        }

        if self.max_page_size == 0 {
            return Err(CoreError::ConfigurationError(
                "max_page_size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Lock timeout as a duration
    #[inline]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Configuration exposed by a running process runtime: settings plus the
/// registered listeners
#[derive(Clone, Default)]
pub struct ProcessRuntimeConfiguration {
    /// Runtime settings
    pub settings: RuntimeConfig,

    /// Listeners receiving process lifecycle and signal events
    pub process_event_listeners: Vec<Arc<dyn DomainEventHandler>>,

    /// Listeners receiving variable events
    pub variable_event_listeners: Vec<Arc<dyn DomainEventHandler>>,
}

impl fmt::Debug for ProcessRuntimeConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessRuntimeConfiguration")
            .field("settings", &self.settings)
            .field(
                "process_event_listeners",
                &self.process_event_listeners.len(),
            )
            .field(
                "variable_event_listeners",
                &self.variable_event_listeners.len(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.lock_timeout_ms, 5000);
        assert!(!config.return_affected_variables);
        assert!(!config.fail_on_unhandled_signal);
        assert_eq!(config.max_page_size, 1000);
        assert_eq!(config.lock_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = RuntimeConfig::from_lookup(lookup(&[
            ("MILLRACE_LOCK_TIMEOUT_MS", "250"),
            ("MILLRACE_RETURN_AFFECTED_VARIABLES", "true"),
            ("MILLRACE_FAIL_ON_UNHANDLED_SIGNAL", "1"),
            ("MILLRACE_MAX_PAGE_SIZE", "50"),
        ]))
        .unwrap();

        assert_eq!(config.lock_timeout_ms, 250);
        assert!(config.return_affected_variables);
        assert!(config.fail_on_unhandled_signal);
        assert_eq!(config.max_page_size, 50);
    }

    #[test]
    fn test_invalid_values_are_ignored() {
        let config = RuntimeConfig::from_lookup(lookup(&[
            ("MILLRACE_LOCK_TIMEOUT_MS", "soon"),
            ("MILLRACE_FAIL_ON_UNHANDLED_SIGNAL", "maybe"),
        ]))
        .unwrap();

        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let result = RuntimeConfig::from_lookup(lookup(&[("MILLRACE_LOCK_TIMEOUT_MS", "0")]));
        assert!(matches!(result, Err(CoreError::ConfigurationError(_))));
    }

    #[test]
    fn test_from_yaml() {
        let config = RuntimeConfig::from_yaml_str(
            "lock_timeout_ms: 100\nreturn_affected_variables: true\n",
        )
        .unwrap();
        assert_eq!(config.lock_timeout_ms, 100);
        assert!(config.return_affected_variables);
        assert_eq!(config.max_page_size, 1000);

        assert!(matches!(
            RuntimeConfig::from_yaml_str("max_page_size: 0"),
            Err(CoreError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_configuration_debug_counts_listeners() {
        let configuration = ProcessRuntimeConfiguration::default();
        let rendered = format!("{:?}", configuration);
        assert!(rendered.contains("process_event_listeners: 0"));
    }
}
