//! PDF rendering and text extraction.
//!
//! The default backend shells out to poppler-utils:
//! - `pdfinfo` for the page count
//! - `pdftoppm` for JPEG rasterization
//! - `pdftotext` for the embedded text layer

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

/// Errors from PDF backends.
#[derive(Debug, Error)]
pub enum PdfError {
    #[error("External tool not found: {0}")]
    ToolNotFound(String),

    #[error("Cannot open PDF: {0}")]
    Open(String),

    #[error("Page {page}: {message}")]
    Page { page: u32, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Opens documents for import.
pub trait PdfBackend: Send + Sync {
    fn open(&self, path: &Path) -> Result<Arc<dyn PdfDocument>, PdfError>;
}

/// An opened document. Page numbers are 1-based.
pub trait PdfDocument: Send + Sync {
    fn page_count(&self) -> u32;

    /// Rasterize one page to a JPEG at `dest`.
    fn render_page(&self, page: u32, dpi: u32, dest: &Path) -> Result<(), PdfError>;

    /// Embedded text of one page; empty when the page has no text layer.
    fn page_text(&self, page: u32) -> Result<String, PdfError>;
}

/// Handle command output, converting errors appropriately.
fn handle_cmd_output(
    result: std::io::Result<std::process::Output>,
    tool_name: &str,
    page: u32,
) -> Result<String, PdfError> {
    match result {
        Ok(output) => {
            if output.status.success() {
                Ok(String::from_utf8_lossy(&output.stdout).to_string())
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(PdfError::Page {
                    page,
                    message: format!("{} failed: {}", tool_name, stderr.trim()),
                })
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(PdfError::ToolNotFound(tool_name.to_string()))
        }
        Err(e) => Err(PdfError::Io(e)),
    }
}

/// Poppler command-line backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct PopplerBackend;

impl PopplerBackend {
    pub fn new() -> Self {
        Self
    }

    /// Names of required poppler tools missing from PATH.
    pub fn missing_tools() -> Vec<&'static str> {
        ["pdfinfo", "pdftoppm", "pdftotext"]
            .into_iter()
            .filter(|tool| which::which(tool).is_err())
            .collect()
    }
}

impl PdfBackend for PopplerBackend {
    fn open(&self, path: &Path) -> Result<Arc<dyn PdfDocument>, PdfError> {
        if !path.is_file() {
            return Err(PdfError::Open(format!("{} does not exist", path.display())));
        }
        let output = match Command::new("pdfinfo").arg(path).output() {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PdfError::ToolNotFound(
                    "pdfinfo (install poppler-utils)".to_string(),
                ))
            }
            Err(e) => return Err(PdfError::Io(e)),
        };
        if !output.status.success() {
            return Err(PdfError::Open(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let pages = parse_page_count(&stdout).ok_or_else(|| {
            PdfError::Open(format!("no page count reported for {}", path.display()))
        })?;
        debug!("Opened {} ({} pages)", path.display(), pages);

        Ok(Arc::new(PopplerDocument {
            path: path.to_path_buf(),
            pages,
        }))
    }
}

fn parse_page_count(pdfinfo: &str) -> Option<u32> {
    pdfinfo
        .lines()
        .find(|line| line.starts_with("Pages:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse().ok())
}

struct PopplerDocument {
    path: PathBuf,
    pages: u32,
}

impl PdfDocument for PopplerDocument {
    fn page_count(&self) -> u32 {
        self.pages
    }

    fn render_page(&self, page: u32, dpi: u32, dest: &Path) -> Result<(), PdfError> {
        // pdftoppm appends the extension itself.
        let stem = dest.with_extension("");
        let page_str = page.to_string();
        let dpi_str = dpi.to_string();
        let output = Command::new("pdftoppm")
            .args(["-jpeg", "-r", &dpi_str, "-f", &page_str, "-l", &page_str, "-singlefile"])
            .arg(&self.path)
            .arg(&stem)
            .output();
        handle_cmd_output(output, "pdftoppm (install poppler-utils)", page)?;

        let rendered = stem.with_extension("jpg");
        if rendered != dest {
            std::fs::rename(&rendered, dest)?;
        }
        if !dest.is_file() {
            return Err(PdfError::Page {
                page,
                message: "pdftoppm produced no image".to_string(),
            });
        }
        Ok(())
    }

    fn page_text(&self, page: u32) -> Result<String, PdfError> {
        let page_str = page.to_string();
        let output = Command::new("pdftotext")
            .args(["-enc", "UTF-8", "-f", &page_str, "-l", &page_str])
            .arg(&self.path)
            .arg("-")
            .output();
        handle_cmd_output(output, "pdftotext (install poppler-utils)", page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page_count() {
        let info = "Title:          Letterbook\nPages:          42\nEncrypted:      no\n";
        assert_eq!(parse_page_count(info), Some(42));
        assert_eq!(parse_page_count("Title: x\n"), None);
    }

    #[test]
    fn test_open_missing_file() {
        let err = PopplerBackend::new()
            .open(Path::new("/nonexistent/letters.pdf"))
            .err()
            .unwrap();
        assert!(matches!(err, PdfError::Open(_)));
    }

    #[test]
    fn test_non_pdf_cannot_be_opened() {
        if !PopplerBackend::missing_tools().is_empty() {
            return;
        }
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"not a pdf").unwrap();
        assert!(PopplerBackend::new().open(file.path()).is_err());
    }
}
