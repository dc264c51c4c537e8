use super::{SharedTask, Stage};
use crate::sheet::{transform::Transform, SheetError, Table};
use std::{path::PathBuf, sync::Arc};
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("task has no uploaded payload")]
    MissingPayload,
    #[error(transparent)]
    Sheet(#[from] SheetError),
    #[error("failed to prepare output directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("processing job aborted: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Where the worker writes its artifact.
#[derive(Clone, Debug)]
pub struct OutputTarget {
    pub dir: PathBuf,
    pub file_name: String,
}

impl OutputTarget {
    pub fn new(dir: impl Into<PathBuf>, file_name: &str) -> Self {
        Self {
            dir: dir.into(),
            file_name: file_name.to_string(),
        }
    }

    pub fn task_dir(&self, task_id: &str) -> PathBuf {
        self.dir.join(task_id)
    }

    pub fn path_for(&self, task_id: &str) -> PathBuf {
        self.task_dir(task_id).join(&self.file_name)
    }
}

/// Run the transform for `task` in the background.
///
/// The outcome is always recorded into the task itself; the handle exists so
/// callers that care (tests, shutdown) can wait for it.
pub fn spawn_worker(
    task: SharedTask,
    transform: Arc<Transform>,
    target: OutputTarget,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        run_worker(task, transform, target).await;
    })
}

pub async fn run_worker(task: SharedTask, transform: Arc<Transform>, target: OutputTarget) {
    let progress = task.clone();
    run_job(task, target, move |payload, parameter| {
        tracing::debug!("parsing {} bytes", payload.len());
        let table = Table::from_bytes(&payload)?;
        // runs on the blocking pool
        progress.blocking_write().advance(Stage::Parsed.step());

        tracing::debug!("applying transform to {} rows", table.len());
        transform.apply(&table, &parameter)
    })
    .await
}

/// Drive `job` (payload and parameter in, output table out) on the blocking
/// pool and record its outcome, including a panic, into `task`.
#[tracing::instrument(skip_all, fields(task_id))]
async fn run_job<F>(task: SharedTask, target: OutputTarget, job: F)
where
    F: FnOnce(Vec<u8>, String) -> Result<Table, SheetError> + Send + 'static,
{
    let task_id = task.read().await.id().to_string();
    tracing::Span::current().record("task_id", task_id.as_str());

    let result = process(&task, &task_id, job, &target).await;

    let mut state = task.write().await;
    match result {
        Ok(output_path) => {
            tracing::info!("processing completed: {}", output_path.display());
            state.complete(output_path);
        }
        Err(e) => {
            tracing::warn!("processing failed: {}", e);
            state.fail(e.to_string());
        }
    }
}

async fn process<F>(
    task: &SharedTask,
    task_id: &str,
    job: F,
    target: &OutputTarget,
) -> Result<PathBuf, WorkerError>
where
    F: FnOnce(Vec<u8>, String) -> Result<Table, SheetError> + Send + 'static,
{
    let (payload, parameter) = {
        let mut state = task.write().await;
        state.start();
        state.take_payload().ok_or(WorkerError::MissingPayload)?
    };

    let output = tokio::task::spawn_blocking(move || job(payload, parameter)).await??;
    task.write().await.advance(Stage::Transformed.step());

    tokio::fs::create_dir_all(target.task_dir(task_id)).await?;
    let output_path = target.path_for(task_id);
    let write_path = output_path.clone();
    tokio::task::spawn_blocking(move || output.write_xlsx(&write_path)).await??;
    task.write().await.advance(Stage::Written.step());

    Ok(output_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskState, TaskStatus};
    use rust_xlsxwriter::Workbook;
    use tokio::sync::RwLock;

    fn target() -> OutputTarget {
        OutputTarget::new(
            std::env::temp_dir().join(format!("sheet-progress-worker-{}", uuid::Uuid::new_v4())),
            "out.xlsx",
        )
    }

    fn workbook_bytes() -> Vec<u8> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        for (col, header) in ["LIVRO", "CONC", "UC"].iter().enumerate() {
            worksheet.write_string(0, col as u16, *header).unwrap();
        }
        for row in 1..=10u32 {
            worksheet.write_number(row, 0, (row % 2 + 4) as f64).unwrap();
            worksheet.write_string(row, 1, format!("c{}", row)).unwrap();
            worksheet.write_string(row, 2, format!("u{}", row)).unwrap();
        }
        workbook.save_to_buffer().unwrap()
    }

    fn filter() -> Arc<Transform> {
        Arc::new(Transform::Filter {
            column: "LIVRO".into(),
            return_columns: vec!["UC".into()],
        })
    }

    #[tokio::test]
    async fn success_records_output() {
        let task = Arc::new(RwLock::new(TaskState::new("ok")));
        task.write().await.accept_upload(workbook_bytes(), "5");
        let target = target();

        spawn_worker(task.clone(), filter(), target.clone())
            .await
            .unwrap();

        let state = task.read().await;
        assert_eq!(state.status(), TaskStatus::Completed);
        assert!(state.done());
        assert_eq!(state.current(), state.total());
        assert!(!state.has_payload());

        let path = state.output_path().unwrap();
        assert_eq!(path, &target.path_for("ok"));
        let bytes = tokio::fs::read(path).await.unwrap();
        let table = Table::from_bytes(&bytes).unwrap();
        assert_eq!(table.headers(), ["LIVRO", "UC"]);
        assert_eq!(table.len(), 5);
        assert!(table.rows().iter().all(|row| row[0] == "5"));

        tokio::fs::remove_dir_all(&target.dir).await.unwrap();
    }

    #[tokio::test]
    async fn malformed_payload_fails() {
        let task = Arc::new(RwLock::new(TaskState::new("bad")));
        task.write()
            .await
            .accept_upload(b"definitely not a workbook".to_vec(), "5");
        let target = target();

        spawn_worker(task.clone(), filter(), target.clone())
            .await
            .unwrap();

        let state = task.read().await;
        assert_eq!(state.status(), TaskStatus::Failed);
        assert!(state.done());
        assert!(state.message().unwrap().contains("parse"));
        assert!(state.output_path().is_none());
        assert!(!target.path_for("bad").exists());
    }

    #[tokio::test]
    async fn missing_column_fails() {
        let task = Arc::new(RwLock::new(TaskState::new("col")));
        task.write().await.accept_upload(workbook_bytes(), "5");
        let transform = Arc::new(Transform::Filter {
            column: "ROTA".into(),
            return_columns: vec![],
        });

        run_worker(task.clone(), transform, target()).await;

        let state = task.read().await;
        assert_eq!(state.status(), TaskStatus::Failed);
        assert!(state.message().unwrap().contains("ROTA"));
    }

    #[tokio::test]
    async fn panicking_job_fails() {
        let task = Arc::new(RwLock::new(TaskState::new("panic")));
        task.write().await.accept_upload(workbook_bytes(), "5");
        let target = target();

        run_job(task.clone(), target.clone(), |_, _| -> Result<Table, SheetError> {
            panic!("transform blew up")
        })
        .await;

        let state = task.read().await;
        assert_eq!(state.status(), TaskStatus::Failed);
        assert!(state.done());
        let message = state.message().unwrap();
        assert!(message.starts_with("processing job aborted"), "{}", message);
        assert!(state.output_path().is_none());
        assert!(!target.path_for("panic").exists());
    }

    #[tokio::test]
    async fn progress_reaches_parsed_stage_before_transform_error() {
        let task = Arc::new(RwLock::new(TaskState::new("stage")));
        task.write().await.accept_upload(workbook_bytes(), "5");
        let transform = Arc::new(Transform::Filter {
            column: "LIVRO".into(),
            return_columns: vec!["NOPE".into()],
        });

        run_worker(task.clone(), transform, target()).await;

        let state = task.read().await;
        assert_eq!(state.status(), TaskStatus::Failed);
        assert_eq!(state.current(), Stage::Parsed.step());
    }

    #[tokio::test]
    async fn missing_payload_fails() {
        let task = Arc::new(RwLock::new(TaskState::new("empty")));

        run_worker(task.clone(), filter(), target()).await;

        let state = task.read().await;
        assert_eq!(state.status(), TaskStatus::Failed);
        assert_eq!(state.message(), Some("task has no uploaded payload"));
    }
}
