//! Execution-position capability injected into the runtime
//!
//! The runtime does not interpret process models. Whether an instance waits
//! for a signal, and what delivering one does to it, is decided by an
//! [`ExecutionBehavior`].

use crate::domain::process_instance::ProcessInstance;
use crate::domain::variables::{VariableScope, Variables};
use crate::CoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A named external event with an optional variable payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Signal name
    pub name: String,

    /// Variables merged into each receiving instance
    #[serde(default)]
    pub variables: Variables,
}

/// Outcome of delivering a signal to an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Advance {
    /// The instance keeps running
    Wait,
    /// The instance reached an end state
    Complete,
}

/// Decides how instances react to signals
#[async_trait]
pub trait ExecutionBehavior: Send + Sync {
    /// Whether `instance` is currently positioned to receive `signal_name`
    fn awaits_signal(&self, instance: &ProcessInstance, signal_name: &str) -> bool;

    /// React to a delivered signal. Called under the instance lock, after the
    /// signal variables have been merged into `variables`.
    async fn on_signal(
        &self,
        instance: &ProcessInstance,
        signal: &Signal,
        variables: &VariableScope,
    ) -> Result<Advance, CoreError>;

    /// Activities the instance is positioned at
    fn active_activities(&self, _instance: &ProcessInstance) -> Vec<String> {
        Vec::new()
    }

    /// Signals the instance currently waits for
    fn awaited_signals(&self, _instance: &ProcessInstance) -> Vec<String> {
        Vec::new()
    }
}

/// Behavior for runtimes whose instances never wait for signals
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWaitStates;

#[async_trait]
impl ExecutionBehavior for NoWaitStates {
    fn awaits_signal(&self, _instance: &ProcessInstance, _signal_name: &str) -> bool {
        false
    }

    async fn on_signal(
        &self,
        _instance: &ProcessInstance,
        _signal: &Signal,
        _variables: &VariableScope,
    ) -> Result<Advance, CoreError> {
        Ok(Advance::Wait)
    }
}

/// A catching signal event declared in a definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalSubscription {
    /// Activity holding the catch event
    pub activity_id: String,

    /// Signal the activity catches
    pub signal_name: String,

    /// What happens once it fires
    pub advance: Advance,
}

/// Static table of signal catch events per definition key
#[derive(Debug, Clone, Default)]
pub struct SignalCatalog {
    subscriptions: HashMap<String, Vec<SignalSubscription>>,
}

impl SignalCatalog {
    /// Empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a catch event for every instance of `definition_key`
    pub fn subscribe(
        mut self,
        definition_key: impl Into<String>,
        activity_id: impl Into<String>,
        signal_name: impl Into<String>,
        advance: Advance,
    ) -> Self {
        self.subscriptions
            .entry(definition_key.into())
            .or_default()
            .push(SignalSubscription {
                activity_id: activity_id.into(),
                signal_name: signal_name.into(),
                advance,
            });
        self
    }

    fn for_instance(&self, instance: &ProcessInstance) -> &[SignalSubscription] {
        self.subscriptions
            .get(&instance.process_definition_key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[async_trait]
impl ExecutionBehavior for SignalCatalog {
    fn awaits_signal(&self, instance: &ProcessInstance, signal_name: &str) -> bool {
        self.for_instance(instance)
            .iter()
            .any(|s| s.signal_name == signal_name)
    }

    async fn on_signal(
        &self,
        instance: &ProcessInstance,
        signal: &Signal,
        _variables: &VariableScope,
    ) -> Result<Advance, CoreError> {
        let completes = self
            .for_instance(instance)
            .iter()
            .filter(|s| s.signal_name == signal.name)
            .any(|s| s.advance == Advance::Complete);

        Ok(if completes {
            Advance::Complete
        } else {
            Advance::Wait
        })
    }

    fn active_activities(&self, instance: &ProcessInstance) -> Vec<String> {
        self.for_instance(instance)
            .iter()
            .map(|s| s.activity_id.clone())
            .collect()
    }

    fn awaited_signals(&self, instance: &ProcessInstance) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for subscription in self.for_instance(instance) {
            if !names.contains(&subscription.signal_name) {
                names.push(subscription.signal_name.clone());
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::process_definition::ProcessDefinition;

    fn instance_of(key: &str) -> ProcessInstance {
        let definition = ProcessDefinition::new(format!("{key}:1"), key, key, 1);
        ProcessInstance::new(&definition, None, None, None, None)
    }

    fn signal(name: &str) -> Signal {
        Signal {
            name: name.to_string(),
            variables: Variables::new(),
        }
    }

    #[tokio::test]
    async fn test_no_wait_states_never_awaits() {
        let behavior = NoWaitStates;
        let instance = instance_of("order");
        assert!(!behavior.awaits_signal(&instance, "go"));
        assert!(behavior.active_activities(&instance).is_empty());
    }

    #[tokio::test]
    async fn test_catalog_matches_by_definition_key() {
        let catalog = SignalCatalog::new()
            .subscribe("order", "waitPayment", "paid", Advance::Complete)
            .subscribe("order", "waitReminder", "remind", Advance::Wait)
            .subscribe("order", "waitPaymentAgain", "paid", Advance::Wait);

        let order = instance_of("order");
        let invoice = instance_of("invoice");

        assert!(catalog.awaits_signal(&order, "paid"));
        assert!(!catalog.awaits_signal(&invoice, "paid"));
        assert_eq!(catalog.awaited_signals(&order), vec!["paid", "remind"]);
        assert_eq!(
            catalog.active_activities(&order),
            vec!["waitPayment", "waitReminder", "waitPaymentAgain"]
        );

        let scope = VariableScope::new();
        assert_eq!(
            catalog.on_signal(&order, &signal("paid"), &scope).await.unwrap(),
            Advance::Complete
        );
        assert_eq!(
            catalog.on_signal(&order, &signal("remind"), &scope).await.unwrap(),
            Advance::Wait
        );
    }
}
