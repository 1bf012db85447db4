//! Job requests, errors and events.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::config::presets;
use crate::store::{PageSelection, StoreError};

/// Page-processing job types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobType {
    /// Handwritten text recognition from page images.
    Htr,
    /// Correct an existing transcription.
    Correct,
    /// Translate the best available transcription.
    Translate,
    /// Extract structured metadata headers.
    Metadata,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Htr => "htr",
            JobType::Correct => "correct",
            JobType::Translate => "translate",
            JobType::Metadata => "metadata",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "htr" | "transcribe" => Some(JobType::Htr),
            "correct" | "correction" => Some(JobType::Correct),
            "translate" | "translation" => Some(JobType::Translate),
            "metadata" => Some(JobType::Metadata),
            _ => None,
        }
    }

    /// Name of the preset this job uses unless overridden.
    pub fn preset_name(&self) -> &'static str {
        match self {
            JobType::Htr => presets::HTR,
            JobType::Correct => presets::CORRECT_TEXT,
            JobType::Translate => presets::TRANSLATION,
            JobType::Metadata => presets::METADATA,
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What an event stream's job is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Process(JobType),
    Import,
    AddImages,
    Edit,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::Process(job) => write!(f, "{}", job),
            JobKind::Import => write!(f, "import"),
            JobKind::AddImages => write!(f, "add-images"),
            JobKind::Edit => write!(f, "edit"),
        }
    }
}

/// A request to run a job over part of the store.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub job_type: JobType,
    pub selection: PageSelection,
    /// Preset to use instead of the job type's default.
    pub preset: Option<String>,
}

impl JobRequest {
    pub fn new(job_type: JobType) -> Self {
        Self {
            job_type,
            selection: PageSelection::All,
            preset: None,
        }
    }

    pub fn pages(mut self, indices: Vec<u32>) -> Self {
        self.selection = PageSelection::Indices(indices);
        self
    }

    pub fn with_preset(mut self, name: impl Into<String>) -> Self {
        self.preset = Some(name.into());
        self
    }

    pub fn preset_name(&self) -> &str {
        self.preset
            .as_deref()
            .unwrap_or_else(|| self.job_type.preset_name())
    }
}

/// Rejections raised before any work is dispatched.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Another job is already running")]
    Busy,

    #[error("No pages to process: {0}")]
    NoData(String),

    #[error("None of the {total} selected pages has usable input")]
    AllSkipped { total: usize },

    #[error("Preset '{0}' not found")]
    MissingPreset(String),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Identifier of one job within a coordinator's lifetime.
pub type JobId = u64;

/// Cooperative cancellation flag shared between a job and its controllers.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Units finished so far; never decreases within a job.
    pub completed: usize,
    pub total: usize,
    pub message: String,
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalStatus {
    Completed { succeeded: usize, total: usize },
    Cancelled { succeeded: usize, total: usize },
    Failed(String),
}

impl TerminalStatus {
    pub fn succeeded(&self) -> usize {
        match self {
            TerminalStatus::Completed { succeeded, .. }
            | TerminalStatus::Cancelled { succeeded, .. } => *succeeded,
            TerminalStatus::Failed(_) => 0,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, TerminalStatus::Completed { .. })
    }
}

impl std::fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminalStatus::Completed { succeeded, total } => {
                write!(f, "completed ({}/{} succeeded)", succeeded, total)
            }
            TerminalStatus::Cancelled { succeeded, total } => {
                write!(f, "cancelled ({}/{} succeeded)", succeeded, total)
            }
            TerminalStatus::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Event emitted by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEvent {
    pub job_id: JobId,
    pub kind: JobEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEventKind {
    Started { kind: JobKind, total: usize },
    Progress(ProgressEvent),
    Finished(TerminalStatus),
}
