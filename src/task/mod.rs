pub mod registry;
pub mod sweep;
pub mod worker;

use crate::sheet::XLSX_MEDIA_TYPE;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, sync::Arc, time::Instant};
use tokio::sync::RwLock;
use utoipa::ToSchema;

pub type SharedTask = Arc<RwLock<TaskState>>;

/// Progress is counted in fixed stages of this many steps.
pub const TOTAL_STEPS: u64 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Created,
    Running,
    Completed,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Received,
    Started,
    Parsed,
    Transformed,
    Written,
}

impl Stage {
    pub fn step(self) -> u64 {
        match self {
            Stage::Received => 1,
            Stage::Started => 2,
            Stage::Parsed => 5,
            Stage::Transformed => 7,
            Stage::Written => 9,
        }
    }
}

/// Progress view returned by the poll endpoint.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ProgressSnapshot {
    pub id_process: String,
    pub current: u64,
    pub total: u64,
    /// `current / total` with two decimals.
    pub progress: String,
    pub done: bool,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug)]
pub struct TaskState {
    id: String,
    total: u64,
    current: u64,
    status: TaskStatus,
    input_payload: Option<Vec<u8>>,
    parameter: Option<String>,
    output_path: Option<PathBuf>,
    media_type: String,
    message: Option<String>,
    finished_at: Option<Instant>,
}

impl TaskState {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            total: TOTAL_STEPS,
            current: 0,
            status: TaskStatus::Created,
            input_payload: None,
            parameter: None,
            output_path: None,
            media_type: XLSX_MEDIA_TYPE.to_string(),
            message: None,
            finished_at: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn active(&self) -> bool {
        self.status == TaskStatus::Running
    }

    pub fn done(&self) -> bool {
        matches!(self.status, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn parameter(&self) -> Option<&str> {
        self.parameter.as_deref()
    }

    pub fn has_payload(&self) -> bool {
        self.input_payload.is_some()
    }

    pub fn output_path(&self) -> Option<&PathBuf> {
        self.output_path.as_ref()
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn finished_at(&self) -> Option<Instant> {
        self.finished_at
    }

    /// Store the upload. Ignored unless the task is still `Created`.
    pub fn accept_upload(&mut self, payload: Vec<u8>, parameter: &str) {
        if self.status != TaskStatus::Created {
            return;
        }

        self.input_payload = Some(payload);
        self.parameter = Some(parameter.to_string());
        self.advance(Stage::Received.step());
    }

    /// Move the payload out for processing. The parameter stays readable.
    pub fn take_payload(&mut self) -> Option<(Vec<u8>, String)> {
        let payload = self.input_payload.take()?;
        Some((payload, self.parameter.clone().unwrap_or_default()))
    }

    pub fn start(&mut self) {
        if self.status == TaskStatus::Created {
            self.status = TaskStatus::Running;
            self.advance(Stage::Started.step());
        }
    }

    /// Raise `current` to `step`, never lowering it and never past `total`.
    pub fn advance(&mut self, step: u64) {
        if self.done() {
            return;
        }
        self.current = self.current.max(step.min(self.total));
    }

    pub fn complete(&mut self, output_path: PathBuf) -> bool {
        if self.done() {
            return false;
        }

        self.current = self.total;
        self.output_path = Some(output_path);
        self.message = None;
        self.status = TaskStatus::Completed;
        self.finished_at = Some(Instant::now());
        true
    }

    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.done() {
            return false;
        }

        let message = message.into();
        self.message = Some(if message.is_empty() {
            "processing failed".to_string()
        } else {
            message
        });
        self.output_path = None;
        self.input_payload = None;
        self.status = TaskStatus::Failed;
        self.finished_at = Some(Instant::now());
        true
    }

    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.current as f64 / self.total as f64
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            id_process: self.id.clone(),
            current: self.current,
            total: self.total,
            progress: format!("{:.2}", self.progress()),
            done: self.done(),
            status: self.status,
            message: self.message.clone(),
        }
    }
}
