//! Multi-file upload tracking.
//!
//! Each selected file gets an [`UploadTask`] that walks
//! `pending → uploading → uploaded → processing → {completed | error}`.
//! Tasks live in an insertion-ordered arena keyed by a stable id, and a
//! single reducer computes the next state from (arena, incoming event) —
//! updates are last-write-wins per task, tasks never share state.
//!
//! After the HTTP upload completes, processing progress comes from the
//! server's SSE stream; if that channel cannot be opened or dies before a
//! terminal status, the monitor falls back to polling the status endpoint
//! until processing completes or fails. The upload itself is never
//! retried automatically.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::api::{ApiClient, UploadFields};
use super::models::ProcessingStatus;
use super::sse::UploadStreamEvent;

/// Maximum files per batch.
pub const MAX_BATCH_FILES: usize = 10;

/// Poll cadence when the progress stream is unavailable.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

// ============================================================================
// Validation
// ============================================================================

/// Required metadata for every upload batch.
#[derive(Debug, Clone, Default)]
pub struct UploadForm {
    pub compound: String,
    pub study_id: String,
    pub deliverable: String,
    pub description: String,
}

impl UploadForm {
    pub fn to_fields(&self) -> UploadFields {
        let description = self.description.trim();
        UploadFields {
            compound: self.compound.trim().to_string(),
            study_id: self.study_id.trim().to_string(),
            deliverable: self.deliverable.trim().to_string(),
            description: if description.is_empty() {
                None
            } else {
                Some(description.to_string())
            },
        }
    }
}

/// Pre-network batch validation failures; all recoverable by fixing input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("select at least one file")]
    NoFiles,

    #[error("too many files: {count} selected, max {MAX_BATCH_FILES}")]
    TooManyFiles { count: usize },

    #[error("only PDF files are supported: {file_name}")]
    NotPdf { file_name: String },
}

/// Validate a batch before any network call.
///
/// One non-PDF file rejects the entire batch.
pub fn validate_batch(form: &UploadForm, files: &[PathBuf]) -> Result<(), ValidationError> {
    if form.compound.trim().is_empty() {
        return Err(ValidationError::MissingField("compound"));
    }
    if form.study_id.trim().is_empty() {
        return Err(ValidationError::MissingField("study id"));
    }
    if form.deliverable.trim().is_empty() {
        return Err(ValidationError::MissingField("deliverable"));
    }
    if files.is_empty() {
        return Err(ValidationError::NoFiles);
    }
    if files.len() > MAX_BATCH_FILES {
        return Err(ValidationError::TooManyFiles { count: files.len() });
    }
    for path in files {
        if !is_pdf(path) {
            return Err(ValidationError::NotPdf {
                file_name: display_name(path),
            });
        }
    }
    Ok(())
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ============================================================================
// Task arena
// ============================================================================

/// Per-file state machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Pending,
    Uploading,
    Uploaded,
    Processing,
    Completed,
    Error,
}

impl UploadStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Error)
    }
}

pub type TaskId = Uuid;

/// One file's upload + processing record.
#[derive(Debug, Clone)]
pub struct UploadTask {
    pub id: TaskId,
    pub file_name: String,
    pub path: PathBuf,
    pub status: UploadStatus,
    /// HTTP upload progress, 0-100.
    pub upload_progress: u8,
    /// Server-side processing progress, 0-100.
    pub processing_progress: u8,
    /// Bound once the server accepts the upload.
    pub document_id: Option<String>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub tlf_outputs_found: Option<u32>,
}

impl UploadTask {
    fn new(path: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_name: display_name(&path),
            path,
            status: UploadStatus::Pending,
            upload_progress: 0,
            processing_progress: 0,
            document_id: None,
            message: None,
            error: None,
            tlf_outputs_found: None,
        }
    }
}

/// State-transition events consumed by the tracker reducer.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// HTTP upload started.
    Started { id: TaskId },
    /// Upload bytes on the wire, percent of file sent.
    UploadProgress { id: TaskId, percent: u8 },
    /// Server accepted the file and issued a document id.
    Uploaded { id: TaskId, status: ProcessingStatus },
    /// Processing progress tick (stream or poll).
    Progress { id: TaskId, status: ProcessingStatus },
    /// Upload or monitoring failed client-side.
    Failed { id: TaskId, error: String },
}

impl UploadEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            UploadEvent::Started { id }
            | UploadEvent::UploadProgress { id, .. }
            | UploadEvent::Uploaded { id, .. }
            | UploadEvent::Progress { id, .. }
            | UploadEvent::Failed { id, .. } => *id,
        }
    }
}

/// Insertion-ordered arena of upload tasks.
#[derive(Debug, Default)]
pub struct UploadTracker {
    tasks: Vec<UploadTask>,
}

impl UploadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tasks(&self) -> &[UploadTask] {
        &self.tasks
    }

    pub fn get(&self, id: TaskId) -> Option<&UploadTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// True while any task is between start and a terminal state.
    pub fn any_active(&self) -> bool {
        self.tasks
            .iter()
            .any(|t| t.status != UploadStatus::Pending && !t.status.is_terminal())
    }

    /// Queue a file, returning its task id.
    pub fn add_file(&mut self, path: PathBuf) -> TaskId {
        let task = UploadTask::new(path);
        let id = task.id;
        self.tasks.push(task);
        id
    }

    /// Pending file paths, in insertion order.
    pub fn pending(&self) -> Vec<(TaskId, PathBuf)> {
        self.tasks
            .iter()
            .filter(|t| t.status == UploadStatus::Pending)
            .map(|t| (t.id, t.path.clone()))
            .collect()
    }

    /// Remove a task; only pending tasks can be removed.
    pub fn remove(&mut self, id: TaskId) -> bool {
        if let Some(pos) = self
            .tasks
            .iter()
            .position(|t| t.id == id && t.status == UploadStatus::Pending)
        {
            self.tasks.remove(pos);
            true
        } else {
            false
        }
    }

    /// Drop completed/failed tasks from the list.
    pub fn clear_finished(&mut self) {
        self.tasks.retain(|t| !t.status.is_terminal());
    }

    /// The single reducer: fold one event into the arena.
    ///
    /// Events for unknown ids (task removed) are dropped.
    pub fn apply(&mut self, event: UploadEvent) {
        let id = event.task_id();
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            log::debug!("Dropping upload event for unknown task {id}");
            return;
        };

        match event {
            UploadEvent::Started { .. } => {
                task.status = UploadStatus::Uploading;
                task.upload_progress = 0;
                task.error = None;
            }
            UploadEvent::UploadProgress { percent, .. } => {
                if task.status == UploadStatus::Uploading {
                    task.upload_progress = percent.min(100);
                }
            }
            UploadEvent::Uploaded { status, .. } => {
                task.upload_progress = 100;
                task.document_id = Some(status.document_id.clone());
                task.processing_progress = status.progress.min(100);
                task.tlf_outputs_found = status.tlf_outputs_found.or(task.tlf_outputs_found);
                task.message = status.message;
                // Small files can come back already terminal.
                if status.status.is_failed() {
                    task.status = UploadStatus::Error;
                    task.error = Some(
                        status
                            .error_message
                            .unwrap_or_else(|| "processing failed".to_string()),
                    );
                } else if status.status.is_terminal() {
                    task.status = UploadStatus::Completed;
                    task.processing_progress = 100;
                } else {
                    task.status = UploadStatus::Uploaded;
                }
            }
            UploadEvent::Progress { status, .. } => {
                task.processing_progress = status.progress.min(100);
                task.tlf_outputs_found = status.tlf_outputs_found.or(task.tlf_outputs_found);
                task.message = Some(
                    status
                        .message
                        .unwrap_or_else(|| status.status.label().to_string()),
                );
                if status.status.is_failed() {
                    task.status = UploadStatus::Error;
                    task.error = Some(
                        status
                            .error_message
                            .unwrap_or_else(|| "processing failed".to_string()),
                    );
                } else if status.status.is_terminal() {
                    task.status = UploadStatus::Completed;
                    task.processing_progress = 100;
                } else {
                    task.status = UploadStatus::Processing;
                }
            }
            UploadEvent::Failed { error, .. } => {
                task.status = UploadStatus::Error;
                task.error = Some(error);
            }
        }
    }
}

// ============================================================================
// Upload driver
// ============================================================================

/// Start the HTTP upload + processing monitor for every pending task.
///
/// Each file runs independently on its own tokio task; events flow back
/// through `tx` into the tracker reducer. Callers must have validated the
/// batch first.
pub fn start_uploads(
    api: ApiClient,
    form: &UploadForm,
    pending: Vec<(TaskId, PathBuf)>,
    tx: mpsc::UnboundedSender<UploadEvent>,
) {
    let fields = form.to_fields();
    for (id, path) in pending {
        let api = api.clone();
        let fields = fields.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            run_upload(api, id, path, fields, tx).await;
        });
    }
}

async fn run_upload(
    api: ApiClient,
    id: TaskId,
    path: PathBuf,
    fields: UploadFields,
    tx: mpsc::UnboundedSender<UploadEvent>,
) {
    let _ = tx.send(UploadEvent::Started { id });

    let progress_tx = tx.clone();
    let on_progress = move |sent: u64, total: u64| {
        let percent = if total == 0 {
            100
        } else {
            ((sent * 100) / total).min(100) as u8
        };
        let _ = progress_tx.send(UploadEvent::UploadProgress { id, percent });
    };

    let status = match api.upload_document(&path, &fields, Some(on_progress)).await {
        Ok(status) => status,
        Err(e) => {
            log::error!("Upload of {} failed: {e}", path.display());
            let _ = tx.send(UploadEvent::Failed { id, error: e.to_string() });
            return;
        }
    };

    let document_id = status.document_id.clone();
    let done = status.status.is_terminal();
    let _ = tx.send(UploadEvent::Uploaded { id, status });
    if done {
        return;
    }

    monitor_processing(api, id, document_id, tx).await;
}

/// Watch processing progress: SSE stream first, poll fallback.
///
/// The fallback engages when the stream cannot be opened or closes before
/// a terminal status, and keeps polling through transient errors until the
/// document reaches a terminal state or disappears.
pub async fn monitor_processing(
    api: ApiClient,
    id: TaskId,
    document_id: String,
    tx: mpsc::UnboundedSender<UploadEvent>,
) {
    match api.open_upload_stream(&document_id).await {
        Ok(mut rx) => {
            while let Some(event) = rx.recv().await {
                match event {
                    UploadStreamEvent::Status(status) => {
                        let terminal = status.status.is_terminal();
                        let _ = tx.send(UploadEvent::Progress { id, status });
                        if terminal {
                            return;
                        }
                    }
                    UploadStreamEvent::Error(error) => {
                        let _ = tx.send(UploadEvent::Failed { id, error });
                        return;
                    }
                }
            }
            // Channel closed pre-terminal: transport dropped, poll instead.
            log::warn!("Upload stream for {document_id} ended early, polling");
        }
        Err(e) => {
            log::warn!("Upload stream for {document_id} unavailable ({e}), polling");
        }
    }

    poll_processing(api, id, document_id, tx).await;
}

async fn poll_processing(
    api: ApiClient,
    id: TaskId,
    document_id: String,
    tx: mpsc::UnboundedSender<UploadEvent>,
) {
    loop {
        tokio::time::sleep(POLL_INTERVAL).await;
        match api.processing_status(&document_id).await {
            Ok(status) => {
                let terminal = status.status.is_terminal();
                let _ = tx.send(UploadEvent::Progress { id, status });
                if terminal {
                    return;
                }
            }
            Err(e) if e.is_status(404) => {
                let _ = tx.send(UploadEvent::Failed {
                    id,
                    error: "document disappeared during processing".to_string(),
                });
                return;
            }
            Err(e) => {
                // Transient; keep polling until a terminal status shows up.
                log::warn!("Status poll for {document_id} failed: {e}");
            }
        }
    }
}
