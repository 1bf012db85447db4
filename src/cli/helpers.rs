//! Shared helper functions for CLI commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use crate::config::Settings;
use crate::import::PopplerBackend;
use crate::jobs::{
    Capabilities, ChannelEventSink, JobCoordinator, JobEvent, JobEventKind, JobHandle, JobId,
    TerminalStatus,
};
use crate::providers::Router;
use crate::store::{load_project, save_project, DocumentStore, DocumentStoreHandle, PROJECT_FILE_NAME};

/// Canonical project directory, failing if it holds no project file.
pub fn project_dir(dir: &Path) -> anyhow::Result<PathBuf> {
    let dir = std::fs::canonicalize(dir)
        .with_context(|| format!("Project directory {} not found", dir.display()))?;
    if !dir.join(PROJECT_FILE_NAME).is_file() {
        anyhow::bail!(
            "{} is not a folio project (run `folio init {}` first)",
            dir.display(),
            dir.display()
        );
    }
    Ok(dir)
}

/// Load the project at `dir`.
pub fn open_project(dir: &Path) -> anyhow::Result<DocumentStore> {
    let dir = project_dir(dir)?;
    load_project(&dir).with_context(|| format!("Failed to load project in {}", dir.display()))
}

/// Build a coordinator over `store` with the real backends.
pub fn build_coordinator(
    settings: &Settings,
    store: DocumentStore,
) -> anyhow::Result<(JobCoordinator, UnboundedReceiver<JobEvent>)> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("folio/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let router = Router::from_env(client, settings.provider_timeout(), settings.retry_base());
    let (sink, events) = ChannelEventSink::channel();

    let caps = Capabilities {
        store: DocumentStoreHandle::new(store),
        presets: Arc::new(settings.catalog()),
        router: Arc::new(router),
        pdf: Arc::new(PopplerBackend::new()),
        events: Arc::new(sink),
    };
    Ok((JobCoordinator::new(caps, settings), events))
}

/// Write the coordinator's store back to its project file.
pub async fn save(coordinator: &JobCoordinator) -> anyhow::Result<()> {
    let store = coordinator.store().read().await;
    let path = save_project(&store)?;
    println!("  Saved {}", style(path.display()).dim());
    Ok(())
}

/// Follow a job to completion with a progress bar.
///
/// The first Ctrl-C requests cooperative cancellation; in-flight pages are
/// still harvested before the job ends.
pub async fn follow_job(
    coordinator: &JobCoordinator,
    handle: JobHandle,
    events: UnboundedReceiver<JobEvent>,
) -> TerminalStatus {
    let ui = tokio::spawn(render_events(handle.id(), events));

    let wait = handle.wait();
    tokio::pin!(wait);
    let status = tokio::select! {
        status = &mut wait => status,
        Ok(()) = tokio::signal::ctrl_c() => {
            eprintln!(
                "{} Cancelling, waiting for in-flight pages...",
                style("!").yellow()
            );
            coordinator.cancel();
            (&mut wait).await
        }
    };

    settle_ui(ui, &status, UI_GRACE).await;
    status
}

/// How long the renderer gets to show the final event after the job ends.
const UI_GRACE: Duration = Duration::from_secs(2);

/// Wait for the renderer to print the job's end, or print it here.
///
/// A job task that died never emits `Finished`, and the sink keeps the
/// channel open, so the renderer would otherwise wait forever.
async fn settle_ui(mut ui: JoinHandle<bool>, status: &TerminalStatus, grace: Duration) -> bool {
    match tokio::time::timeout(grace, &mut ui).await {
        Ok(Ok(true)) => true,
        Ok(_) => {
            print_status(status);
            false
        }
        Err(_) => {
            ui.abort();
            print_status(status);
            false
        }
    }
}

/// Render one job's events; true once its `Finished` event was shown.
async fn render_events(job_id: JobId, mut events: UnboundedReceiver<JobEvent>) -> bool {
    let mut bar: Option<ProgressBar> = None;

    while let Some(event) = events.recv().await {
        if event.job_id != job_id {
            continue;
        }
        match event.kind {
            JobEventKind::Started { kind, total } => {
                println!("{} {}: {} pages", style("→").cyan(), kind, total);
                bar = Some(progress_bar(total as u64));
            }
            JobEventKind::Progress(progress) => {
                if let Some(ref bar) = bar {
                    bar.set_length(progress.total as u64);
                    bar.set_position(progress.completed as u64);
                    bar.set_message(progress.message);
                }
            }
            JobEventKind::Finished(status) => {
                if let Some(bar) = bar.take() {
                    bar.finish_and_clear();
                }
                print_status(&status);
                return true;
            }
        }
    }
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
    false
}

fn progress_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    let bar_style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓░");
    bar.set_style(bar_style);
    bar
}

fn print_status(status: &TerminalStatus) {
    match status {
        TerminalStatus::Completed { succeeded, total } if succeeded == total => {
            println!("{} Done: {}", style("✓").green(), status);
        }
        TerminalStatus::Completed { .. } => {
            println!("{} Done: {}", style("!").yellow(), status);
        }
        TerminalStatus::Cancelled { .. } => {
            println!("{} Stopped: {}", style("!").yellow(), status);
        }
        TerminalStatus::Failed(_) => {
            println!("{} Job {}", style("✗").red(), status);
        }
    }
}

/// Convert 1-based page numbers to store indices.
pub fn page_indices(pages: &[u32]) -> anyhow::Result<Vec<u32>> {
    pages
        .iter()
        .map(|&page| {
            page.checked_sub(1)
                .ok_or_else(|| anyhow::anyhow!("Page numbers start at 1"))
        })
        .collect()
}
