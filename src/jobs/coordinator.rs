//! Job coordinator: the single entry point for mutating a document store.
//!
//! At most one job runs at a time. A page job snapshots the pages it
//! targets, fans them out through the worker pool, and swaps the snapshot
//! back into the store in one write once every task has been harvested.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::events::EventSink;
use super::pool::WorkerPool;
use super::tasks::{plan_page, process_page, TaskContext};
use super::types::{
    CancelFlag, JobError, JobEvent, JobEventKind, JobId, JobKind, JobRequest, ProgressEvent,
    TerminalStatus,
};
use crate::config::{CorrectionPolicy, ImportSettings, PresetProvider, Settings};
use crate::import::{PdfBackend, PdfImporter};
use crate::models::PageRecord;
use crate::providers::Router;
use crate::store::{DocumentStoreHandle, StoreError};

/// Externally supplied collaborators.
pub struct Capabilities {
    pub store: DocumentStoreHandle,
    pub presets: Arc<dyn PresetProvider>,
    pub router: Arc<Router>,
    pub pdf: Arc<dyn PdfBackend>,
    pub events: Arc<dyn EventSink>,
}

/// Coordinator lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Running { id: JobId, kind: JobKind },
    Cancelling { id: JobId, kind: JobKind },
}

struct ActiveJob {
    state: JobState,
    cancel: Option<CancelFlag>,
}

struct Inner {
    caps: Capabilities,
    concurrency: usize,
    correction_policy: CorrectionPolicy,
    import: ImportSettings,
    active: Mutex<ActiveJob>,
    next_id: AtomicU64,
}

/// Runs jobs against a store, one at a time.
#[derive(Clone)]
pub struct JobCoordinator {
    inner: Arc<Inner>,
}

/// Returns the coordinator to `Idle` when the job's task ends, however it
/// ends.
struct ActiveJobGuard {
    inner: Arc<Inner>,
    id: JobId,
}

impl Drop for ActiveJobGuard {
    fn drop(&mut self) {
        let mut active = lock(&self.inner.active);
        let current = match &active.state {
            JobState::Running { id, .. } | JobState::Cancelling { id, .. } => Some(*id),
            JobState::Idle => None,
        };
        if current == Some(self.id) {
            active.state = JobState::Idle;
            active.cancel = None;
        }
    }
}

fn lock(mutex: &Mutex<ActiveJob>) -> std::sync::MutexGuard<'_, ActiveJob> {
    // The guarded state is plain data; a panic elsewhere cannot leave it torn.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle to a submitted job.
pub struct JobHandle {
    id: JobId,
    coordinator: JobCoordinator,
    join: JoinHandle<TerminalStatus>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Request cooperative cancellation of this job.
    pub fn cancel(&self) {
        self.coordinator.cancel_job(self.id);
    }

    /// Wait for the job to finish.
    pub async fn wait(self) -> TerminalStatus {
        match self.join.await {
            Ok(status) => status,
            Err(e) => TerminalStatus::Failed(format!("job task failed: {}", e)),
        }
    }
}

impl JobCoordinator {
    pub fn new(caps: Capabilities, settings: &Settings) -> Self {
        Self {
            inner: Arc::new(Inner {
                caps,
                concurrency: settings.concurrency.max(1),
                correction_policy: settings.correction_policy,
                import: settings.import.clone(),
                active: Mutex::new(ActiveJob {
                    state: JobState::Idle,
                    cancel: None,
                }),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn store(&self) -> &DocumentStoreHandle {
        &self.inner.caps.store
    }

    pub fn state(&self) -> JobState {
        lock(&self.inner.active).state.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.state() != JobState::Idle
    }

    /// Cancel whichever job is active. No-op when idle.
    pub fn cancel(&self) {
        let id = match self.state() {
            JobState::Running { id, .. } => id,
            _ => return,
        };
        self.cancel_job(id);
    }

    fn cancel_job(&self, job_id: JobId) {
        let mut active = lock(&self.inner.active);
        if let JobState::Running { id, kind } = active.state.clone() {
            if id == job_id {
                if let Some(flag) = &active.cancel {
                    flag.cancel();
                }
                active.state = JobState::Cancelling { id, kind };
                info!("Cancelling job {} ({})", id, kind);
            }
        }
    }

    /// Move from Idle to Running, or fail with Busy.
    fn begin(&self, kind: JobKind) -> Result<(ActiveJobGuard, CancelFlag), JobError> {
        let mut active = lock(&self.inner.active);
        if active.state != JobState::Idle {
            return Err(JobError::Busy);
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let cancel = CancelFlag::new();
        active.state = JobState::Running { id, kind };
        active.cancel = Some(cancel.clone());
        Ok((
            ActiveJobGuard {
                inner: Arc::clone(&self.inner),
                id,
            },
            cancel,
        ))
    }

    fn emit(&self, job_id: JobId, kind: JobEventKind) {
        self.inner.caps.events.emit(JobEvent { job_id, kind });
    }

    /// Submit a page job.
    ///
    /// Every rejection (Busy, missing preset or credentials, no data, all
    /// pages ineligible) happens here, before anything is dispatched, and
    /// leaves the store untouched.
    pub async fn submit(&self, request: JobRequest) -> Result<JobHandle, JobError> {
        let job = request.job_type;
        let (guard, cancel) = self.begin(JobKind::Process(job))?;
        let id = guard.id;

        let preset_name = request.preset_name().to_string();
        let preset = self
            .inner
            .caps
            .presets
            .preset(&preset_name)
            .ok_or(JobError::MissingPreset(preset_name))?;
        self.inner
            .caps
            .router
            .check_engine(&preset.model)
            .map_err(|e| JobError::MissingCredentials(e.to_string()))?;

        let (snapshot, plans) = {
            let store = self.inner.caps.store.read().await;
            let snapshot = match store.snapshot(&request.selection) {
                Ok(pages) => pages,
                Err(StoreError::PageNotFound(index)) => {
                    return Err(JobError::NoData(format!("page {} does not exist", index)))
                }
                Err(e) => return Err(e.into()),
            };
            if snapshot.is_empty() {
                return Err(JobError::NoData("the document has no pages".to_string()));
            }
            let plans: Vec<_> = snapshot
                .iter()
                .map(|page| {
                    let image = store.resolve_path(&page.image_path);
                    plan_page(job, page, &image, &preset, self.inner.correction_policy)
                })
                .collect();
            (snapshot, plans)
        };

        if plans.iter().all(Option::is_none) {
            return Err(JobError::AllSkipped {
                total: snapshot.len(),
            });
        }

        let ctx = Arc::new(TaskContext {
            job,
            router: Arc::clone(&self.inner.caps.router),
            preset,
        });
        let coordinator = self.clone();
        let flag = cancel.clone();
        let join = tokio::spawn(async move {
            coordinator
                .run_page_job(guard, flag, ctx, snapshot, plans)
                .await
        });

        Ok(JobHandle {
            id,
            coordinator: self.clone(),
            join,
        })
    }

    async fn run_page_job(
        &self,
        guard: ActiveJobGuard,
        cancel: CancelFlag,
        ctx: Arc<TaskContext>,
        mut snapshot: Vec<PageRecord>,
        plans: Vec<Option<crate::providers::ProviderInput>>,
    ) -> TerminalStatus {
        let id = guard.id;
        let job = ctx.job;
        let total = snapshot.len();
        info!(
            "Job {} ({}): {} pages with preset '{}'",
            id, job, total, ctx.preset.name
        );
        self.emit(
            id,
            JobEventKind::Started {
                kind: JobKind::Process(job),
                total,
            },
        );

        let mut completed = 0;
        let mut items = Vec::new();
        for (pos, plan) in plans.into_iter().enumerate() {
            match plan {
                Some(input) => items.push((pos, input)),
                None => {
                    completed += 1;
                    self.emit(
                        id,
                        JobEventKind::Progress(ProgressEvent {
                            completed,
                            total,
                            message: format!("Skipped page {} (no usable input)", snapshot[pos].label),
                        }),
                    );
                }
            }
        }

        let report = WorkerPool::new(self.inner.concurrency)
            .run(
                &mut snapshot,
                items,
                &cancel,
                |page, input| process_page(Arc::clone(&ctx), page, input),
                |page, success| {
                    completed += 1;
                    let verb = if success { "Processed" } else { "Failed" };
                    self.emit(
                        id,
                        JobEventKind::Progress(ProgressEvent {
                            completed,
                            total,
                            message: format!("{} page {}", verb, page.label),
                        }),
                    );
                },
            )
            .await;

        let status = match self.inner.caps.store.write().await.replace(snapshot) {
            Ok(()) if cancel.is_cancelled() => TerminalStatus::Cancelled {
                succeeded: report.succeeded,
                total,
            },
            Ok(()) => TerminalStatus::Completed {
                succeeded: report.succeeded,
                total,
            },
            Err(e) => {
                warn!("Job {}: could not write results back: {}", id, e);
                TerminalStatus::Failed(format!("could not write results back: {}", e))
            }
        };

        info!("Job {} ({}) {}", id, job, status);
        drop(guard);
        self.emit(id, JobEventKind::Finished(status.clone()));
        status
    }

    /// Import a PDF, writing page images into `dest_dir`.
    pub fn import(&self, source: &Path, dest_dir: &Path) -> Result<JobHandle, JobError> {
        let (guard, cancel) = self.begin(JobKind::Import)?;
        let id = guard.id;
        let coordinator = self.clone();
        let source = source.to_path_buf();
        let dest_dir = dest_dir.to_path_buf();
        let join = tokio::spawn(async move {
            coordinator
                .run_import(guard, cancel, source, dest_dir)
                .await
        });
        Ok(JobHandle {
            id,
            coordinator: self.clone(),
            join,
        })
    }

    async fn run_import(
        &self,
        guard: ActiveJobGuard,
        cancel: CancelFlag,
        source: PathBuf,
        dest_dir: PathBuf,
    ) -> TerminalStatus {
        let id = guard.id;
        let mut started = false;

        let importer = PdfImporter::new(Arc::clone(&self.inner.caps.pdf), self.inner.import.clone());
        let outcome = importer
            .run(&source, &dest_dir, &self.inner.caps.store, &cancel, |progress| {
                if !started {
                    started = true;
                    self.emit(
                        id,
                        JobEventKind::Started {
                            kind: JobKind::Import,
                            total: progress.total,
                        },
                    );
                }
                if progress.completed > 0 {
                    self.emit(id, JobEventKind::Progress(progress));
                }
            })
            .await;

        let status = match outcome {
            Ok(outcome) if outcome.cancelled => TerminalStatus::Cancelled {
                succeeded: outcome.result.succeeded,
                total: outcome.result.total,
            },
            Ok(outcome) => TerminalStatus::Completed {
                succeeded: outcome.result.succeeded,
                total: outcome.result.total,
            },
            Err(e) => {
                warn!("Import of {} failed: {}", source.display(), e);
                TerminalStatus::Failed(e.to_string())
            }
        };
        if !started {
            self.emit(
                id,
                JobEventKind::Started {
                    kind: JobKind::Import,
                    total: 0,
                },
            );
        }

        drop(guard);
        self.emit(id, JobEventKind::Finished(status.clone()));
        status
    }

    /// Append one page per image, in the given order.
    pub async fn add_images(&self, images: &[PathBuf]) -> Result<Vec<u32>, JobError> {
        let (_guard, _cancel) = self.begin(JobKind::AddImages)?;
        let mut store = self.inner.caps.store.write().await;
        let indices = images
            .iter()
            .map(|path| store.push_image(path).index)
            .collect();
        Ok(indices)
    }

    /// Replace one page outside of any job (manual edits).
    pub async fn set_page(&self, record: PageRecord) -> Result<(), JobError> {
        let (_guard, _cancel) = self.begin(JobKind::Edit)?;
        self.inner.caps.store.write().await.set(record)?;
        Ok(())
    }
}
