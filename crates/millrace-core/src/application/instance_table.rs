use crate::{
    domain::process_instance::{ProcessInstance, ProcessInstanceId},
    domain::variables::VariableScope,
    CoreError,
};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

/// Everything guarded by one instance lock
#[derive(Debug)]
pub struct InstanceState {
    /// The aggregate
    pub instance: ProcessInstance,

    /// Variable scope of the instance
    pub variables: VariableScope,

    /// Live child instances, in start order
    pub children: Vec<ProcessInstanceId>,

    /// Set once the instance has left the live set
    pub detached: bool,
}

impl InstanceState {
    /// Fresh state for a new instance
    pub fn new(instance: ProcessInstance, variables: VariableScope) -> Self {
        Self {
            instance,
            variables,
            children: Vec::new(),
            detached: false,
        }
    }
}

/// Lockable entry of the instance table
#[derive(Debug)]
pub struct InstanceHandle {
    id: ProcessInstanceId,
    seq: u64,
    state: Mutex<InstanceState>,
}

impl InstanceHandle {
    /// Instance ID
    pub fn id(&self) -> &ProcessInstanceId {
        &self.id
    }

    /// Insertion sequence number
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Acquire the instance lock within `timeout`. Fails with
    /// `InstanceNotFound` when the instance was detached meanwhile.
    pub async fn lock(
        &self,
        timeout: Duration,
    ) -> Result<MutexGuard<'_, InstanceState>, CoreError> {
        let guard = tokio::time::timeout(timeout, self.state.lock())
            .await
            .map_err(|_| CoreError::Timeout {
                instance_id: self.id.0.clone(),
                waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })?;

        if guard.detached {
            return Err(CoreError::InstanceNotFound(self.id.0.clone()));
        }

        Ok(guard)
    }
}

/// Authoritative set of live instances
#[derive(Debug, Default)]
pub struct InstanceTable {
    entries: DashMap<ProcessInstanceId, Arc<InstanceHandle>>,
    next_seq: AtomicU64,
}

impl InstanceTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            entries: DashMap::with_capacity(64),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Wrap `state` in a handle with the next sequence number. The handle is
    /// not visible until [`InstanceTable::insert`] is called.
    pub fn create_handle(&self, state: InstanceState) -> Arc<InstanceHandle> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        Arc::new(InstanceHandle {
            id: state.instance.id.clone(),
            seq,
            state: Mutex::new(state),
        })
    }

    /// Make a handle visible
    pub fn insert(&self, handle: Arc<InstanceHandle>) {
        self.entries.insert(handle.id.clone(), handle);
    }

    /// Look up a live instance
    pub fn get(&self, id: &ProcessInstanceId) -> Result<Arc<InstanceHandle>, CoreError> {
        self.entries
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| CoreError::InstanceNotFound(id.0.clone()))
    }

    /// Drop an instance from the live set
    pub fn remove(&self, id: &ProcessInstanceId) -> Option<Arc<InstanceHandle>> {
        self.entries.remove(id).map(|(_, handle)| handle)
    }

    /// All live handles in insertion order
    pub fn snapshot(&self) -> Vec<Arc<InstanceHandle>> {
        let mut handles: Vec<_> = self
            .entries
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        handles.sort_by_key(|handle| handle.seq);
        handles
    }

    /// Number of live instances
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no instance is live
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::process_definition::ProcessDefinition;

    fn state() -> InstanceState {
        let definition = ProcessDefinition::new("order:1", "order", "Order", 1);
        InstanceState::new(
            ProcessInstance::new(&definition, None, None, None, None),
            VariableScope::new(),
        )
    }

    #[tokio::test]
    async fn test_snapshot_follows_insertion_order() {
        let table = InstanceTable::new();
        let first = table.create_handle(state());
        let second = table.create_handle(state());

        table.insert(Arc::clone(&second));
        table.insert(Arc::clone(&first));

        let ids: Vec<_> = table.snapshot().iter().map(|h| h.id().clone()).collect();
        assert_eq!(ids, vec![first.id().clone(), second.id().clone()]);
        assert_eq!(table.len(), 2);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let table = InstanceTable::new();
        let result = table.get(&ProcessInstanceId::from("nope"));
        assert!(matches!(result, Err(CoreError::InstanceNotFound(_))));
    }

    #[tokio::test]
    async fn test_detached_handle_rejects_lock() {
        let table = InstanceTable::new();
        let handle = table.create_handle(state());
        table.insert(Arc::clone(&handle));

        {
            let mut guard = handle.lock(Duration::from_millis(100)).await.unwrap();
            guard.detached = true;
        }
        table.remove(handle.id());

        let result = handle.lock(Duration::from_millis(100)).await;
        assert!(matches!(result, Err(CoreError::InstanceNotFound(_))));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_lock_times_out() {
        let table = InstanceTable::new();
        let handle = table.create_handle(state());

        let _held = handle.lock(Duration::from_millis(100)).await.unwrap();
        let result = handle.lock(Duration::from_millis(20)).await;
        assert!(matches!(
            result,
            Err(CoreError::Timeout { waited_ms: 20, .. })
        ));
    }
}
