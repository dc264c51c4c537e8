use super::{SharedTask, TaskState};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;

/// Process-wide map of task id to task record.
///
/// The map lock is held only for insertion, lookup and removal; each record carries
/// its own lock so a poll never waits on another task's worker.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    inner: RwLock<HashMap<String, SharedTask>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the record for `id`, inserting a fresh one if absent.
    /// An existing record is returned untouched.
    pub async fn create(&self, id: &str) -> SharedTask {
        let mut inner = self.inner.write().await;
        inner
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(TaskState::new(id))))
            .clone()
    }

    pub async fn get(&self, id: &str) -> Option<SharedTask> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn delete(&self, id: &str) -> Option<SharedTask> {
        self.inner.write().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    pub async fn ids(&self) -> Vec<String> {
        self.inner.read().await.keys().cloned().collect()
    }

    /// Snapshot of all records, so callers can inspect them without holding the map lock.
    pub async fn entries(&self) -> Vec<(String, SharedTask)> {
        self.inner
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
