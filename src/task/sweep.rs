use super::{registry::TaskRegistry, worker::OutputTarget};
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;

/// Drop finished tasks older than `ttl` together with their output directory.
/// Returns the number of evicted tasks. Unfinished tasks are never touched.
pub async fn sweep_expired(registry: &TaskRegistry, target: &OutputTarget, ttl: Duration) -> usize {
    let mut expired = vec![];
    for (id, task) in registry.entries().await {
        let state = task.read().await;
        if let Some(finished_at) = state.finished_at() {
            if finished_at.elapsed() >= ttl {
                expired.push(id);
            }
        }
    }

    let mut evicted = 0;
    for id in expired {
        if registry.delete(&id).await.is_none() {
            continue;
        }
        evicted += 1;

        let dir = target.task_dir(&id);
        if tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            tracing::info!("task {} expired, deleting {}", id, dir.to_string_lossy());
            if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
                tracing::warn!("failed to delete output of task {}: {}", id, e);
            }
        } else {
            tracing::debug!("task {} expired", id);
        }
    }

    evicted
}

pub fn spawn_sweeper(
    registry: Arc<TaskRegistry>,
    target: OutputTarget,
    ttl: Duration,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let evicted = sweep_expired(&registry, &target, ttl).await;
            if evicted > 0 {
                tracing::info!("evicted {} expired tasks", evicted);
            }
        }
    })
}
