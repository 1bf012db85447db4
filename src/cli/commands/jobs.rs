//! Commands that mutate a project through the job coordinator.

use std::path::Path;

use console::style;

use super::init::IMAGES_DIR;
use crate::cli::helpers::{build_coordinator, follow_job, open_project, page_indices, save};
use crate::config::Settings;
use crate::jobs::{JobCoordinator, JobRequest, JobType, TerminalStatus};
use crate::store::list_images;

/// Append every image in `dir` as a new page.
pub async fn cmd_add_images(settings: &Settings, project: &Path, dir: &Path) -> anyhow::Result<()> {
    let store = open_project(project)?;
    let dir = std::fs::canonicalize(dir)?;
    let images = list_images(&dir)?;
    if images.is_empty() {
        anyhow::bail!("No images found in {}", dir.display());
    }

    let (coordinator, _events) = build_coordinator(settings, store)?;
    let indices = coordinator.add_images(&images).await?;
    if let (Some(first), Some(last)) = (indices.first(), indices.last()) {
        println!(
            "{} Added {} pages ({}-{})",
            style("✓").green(),
            indices.len(),
            first + 1,
            last + 1
        );
    }
    save(&coordinator).await
}

/// Import a PDF into the project's image directory.
pub async fn cmd_import(settings: &Settings, project: &Path, pdf: &Path) -> anyhow::Result<()> {
    let store = open_project(project)?;
    let dest_dir = store
        .project_root()
        .map(|root| root.join(IMAGES_DIR))
        .ok_or_else(|| anyhow::anyhow!("Project has no root directory"))?;

    let (coordinator, events) = build_coordinator(settings, store)?;
    let handle = coordinator.import(pdf, &dest_dir)?;
    let status = follow_job(&coordinator, handle, events).await;
    finish(&coordinator, status).await
}

/// Run a page job.
pub async fn cmd_run(
    settings: &Settings,
    project: &Path,
    job: JobType,
    pages: &[u32],
    preset: Option<String>,
) -> anyhow::Result<()> {
    let store = open_project(project)?;

    let mut request = JobRequest::new(job);
    if !pages.is_empty() {
        request = request.pages(page_indices(pages)?);
    }
    if let Some(preset) = preset {
        request = request.with_preset(preset);
    }

    let (coordinator, events) = build_coordinator(settings, store)?;
    let handle = coordinator.submit(request).await?;
    let status = follow_job(&coordinator, handle, events).await;
    finish(&coordinator, status).await
}

/// Persist whatever the job wrote; a failed job wrote nothing.
async fn finish(coordinator: &JobCoordinator, status: TerminalStatus) -> anyhow::Result<()> {
    if let TerminalStatus::Failed(reason) = status {
        anyhow::bail!("{}", reason);
    }
    save(coordinator).await
}
