use crate::{
    config::AppConfig,
    sheet::transform::Transform,
    task::{registry::TaskRegistry, worker::OutputTarget},
};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct AppState {
    config: AppConfig,
    task_registry: Arc<TaskRegistry>,
    transform: Arc<Transform>,
    output_target: OutputTarget,
}

impl AppState {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&config.output_dir).await?;

        let transform = Arc::new(config.transform.clone());
        let output_target = OutputTarget::new(&config.output_dir, &config.output_file_name);

        Ok(Self {
            config,
            task_registry: Arc::new(TaskRegistry::new()),
            transform,
            output_target,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn task_registry(&self) -> Arc<TaskRegistry> {
        self.task_registry.clone()
    }

    pub fn transform(&self) -> Arc<Transform> {
        self.transform.clone()
    }

    pub fn output_target(&self) -> &OutputTarget {
        &self.output_target
    }
}
