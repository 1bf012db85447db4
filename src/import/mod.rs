//! PDF import: rasterize pages and append them to the store.
//!
//! Pages are processed in small batches on blocking threads. Each batch is
//! appended before the next one starts, so memory stays bounded and the
//! store always holds a prefix of the document in source order.

mod pdf;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ImportSettings;
use crate::jobs::{CancelFlag, ProgressEvent};
use crate::models::{PageRecord, TextField};
use crate::store::{DocumentStoreHandle, StoreError};

pub use pdf::{PdfBackend, PdfDocument, PdfError, PopplerBackend};

/// Errors that abort an import.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Cannot open source: {0}")]
    Open(#[source] PdfError),

    #[error("Destination {path} is not writable: {source}")]
    Destination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Import worker failed: {0}")]
    Worker(String),
}

/// Pages appended by an import versus pages in the source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendResult {
    pub succeeded: usize,
    pub total: usize,
}

/// How an import run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOutcome {
    pub result: AppendResult,
    pub cancelled: bool,
}

/// File name for the image of the page at `index`.
///
/// Both numbers are the 1-based page position (index 7 → `0008_p008.jpg`).
pub fn image_file_name(index: u32) -> String {
    format!("{}.jpg", page_token(index))
}

fn page_token(index: u32) -> String {
    let n = index + 1;
    format!("{:04}_p{:03}", n, n)
}

/// Imports PDF documents into a store.
pub struct PdfImporter {
    backend: Arc<dyn PdfBackend>,
    settings: ImportSettings,
}

impl PdfImporter {
    pub fn new(backend: Arc<dyn PdfBackend>, settings: ImportSettings) -> Self {
        Self { backend, settings }
    }

    /// Import `source`, writing page images into `dest_dir`.
    ///
    /// Fails before appending anything if the source cannot be opened or
    /// the destination cannot be created. Individual page failures are
    /// logged and skipped without consuming an index.
    pub async fn run<P>(
        &self,
        source: &Path,
        dest_dir: &Path,
        store: &DocumentStoreHandle,
        cancel: &CancelFlag,
        mut on_progress: P,
    ) -> Result<ImportOutcome, ImportError>
    where
        P: FnMut(ProgressEvent),
    {
        std::fs::create_dir_all(dest_dir).map_err(|source| ImportError::Destination {
            path: dest_dir.to_path_buf(),
            source,
        })?;

        let backend = Arc::clone(&self.backend);
        let source_path = source.to_path_buf();
        let document = tokio::task::spawn_blocking(move || backend.open(&source_path))
            .await
            .map_err(|e| ImportError::Worker(e.to_string()))?
            .map_err(ImportError::Open)?;

        let total = document.page_count() as usize;
        let project_root = store.read().await.project_root().map(Path::to_path_buf);
        info!("Importing {} ({} pages)", source.display(), total);
        on_progress(ProgressEvent {
            completed: 0,
            total,
            message: format!("Opened {}", source.display()),
        });

        let mut result = AppendResult {
            succeeded: 0,
            total,
        };
        let mut completed = 0;
        let batch_size = self.settings.batch_size.max(1) as u32;
        let mut first_page = 1u32;

        while (first_page as usize) <= total {
            if cancel.is_cancelled() {
                info!(
                    "Import cancelled after {} of {} pages",
                    completed, total
                );
                return Ok(ImportOutcome {
                    result,
                    cancelled: true,
                });
            }

            let last_page = (first_page + batch_size - 1).min(total as u32);
            let base_index = store.read().await.next_index();
            let batch = BatchJob {
                document: Arc::clone(&document),
                pages: first_page..=last_page,
                base_index,
                dpi: self.settings.dpi,
                dest_dir: dest_dir.to_path_buf(),
                project_root: project_root.clone(),
            };

            let outcomes = tokio::task::spawn_blocking(move || batch.run())
                .await
                .map_err(|e| ImportError::Worker(e.to_string()))?;

            let mut records = Vec::with_capacity(outcomes.len());
            let mut messages = Vec::with_capacity(outcomes.len());
            for (page, outcome) in outcomes {
                match outcome {
                    Ok(record) => {
                        messages.push(format!("Imported page {} as {}", page, record.label));
                        records.push(record);
                    }
                    Err(e) => {
                        warn!("Skipping page {} of {}: {}", page, source.display(), e);
                        messages.push(format!("Page {} failed", page));
                    }
                }
            }

            result.succeeded += records.len();
            store.write().await.append(records)?;

            for message in messages {
                completed += 1;
                on_progress(ProgressEvent {
                    completed,
                    total,
                    message,
                });
            }
            first_page = last_page + 1;
        }

        info!(
            "Imported {}/{} pages from {}",
            result.succeeded,
            result.total,
            source.display()
        );
        Ok(ImportOutcome {
            result,
            cancelled: false,
        })
    }
}

/// One batch of pages, run on a blocking thread.
struct BatchJob {
    document: Arc<dyn PdfDocument>,
    pages: std::ops::RangeInclusive<u32>,
    base_index: u32,
    dpi: u32,
    dest_dir: PathBuf,
    project_root: Option<PathBuf>,
}

impl BatchJob {
    /// Convert each page, assigning indices only to pages that succeed.
    ///
    /// A page whose renderer panics counts as a failed page.
    fn run(self) -> Vec<(u32, Result<PageRecord, PdfError>)> {
        let mut next_index = self.base_index;
        let mut out = Vec::new();
        for page in self.pages.clone() {
            let index = next_index;
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| self.convert(page, index)))
                .unwrap_or_else(|payload| {
                    let _ = std::fs::remove_file(self.dest_dir.join(image_file_name(index)));
                    Err(PdfError::Page {
                        page,
                        message: format!("renderer panicked: {}", panic_message(payload.as_ref())),
                    })
                });
            if outcome.is_ok() {
                next_index += 1;
            }
            out.push((page, outcome));
        }
        out
    }

    fn convert(&self, page: u32, index: u32) -> Result<PageRecord, PdfError> {
        let dest = self.dest_dir.join(image_file_name(index));
        debug!("Rendering page {} to {}", page, dest.display());

        let text = self
            .document
            .render_page(page, self.dpi, &dest)
            .and_then(|()| self.document.page_text(page));
        let text = match text {
            Ok(text) => text,
            Err(e) => {
                let _ = std::fs::remove_file(&dest);
                return Err(e);
            }
        };

        let stored = match &self.project_root {
            Some(root) => dest
                .strip_prefix(root)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| dest.clone()),
            None => dest.clone(),
        };
        let mut record = PageRecord::new(index, stored).with_label(page_token(index));
        let text = text.trim();
        if !text.is_empty() {
            record.set_text(TextField::Original, text);
        }
        Ok(record)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_file_name() {
        assert_eq!(image_file_name(0), "0001_p001.jpg");
        assert_eq!(image_file_name(7), "0008_p008.jpg");
        assert_eq!(image_file_name(1233), "1234_p1234.jpg");
        assert_eq!(page_token(41), "0042_p042");
    }

    #[test]
    fn test_panic_message() {
        let payload = std::panic::catch_unwind(|| panic!("bad xref")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "bad xref");

        let page = 3;
        let payload = std::panic::catch_unwind(|| panic!("page {} truncated", page)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "page 3 truncated");

        let payload = std::panic::catch_unwind(|| std::panic::panic_any(42u8)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
