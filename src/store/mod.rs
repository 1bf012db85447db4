//! Document store: the ordered page table of a project.
//!
//! The store is the single authoritative owner of page records. Jobs never
//! mutate it directly; the coordinator snapshots the pages a job targets,
//! lets workers fill in the snapshot, and swaps the result back in with
//! [`DocumentStore::replace`].

mod project;

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::models::PageRecord;

pub use project::{list_images, load_project, save_project, PROJECT_FILE_NAME};

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Page {0} not found")]
    PageNotFound(u32),

    #[error("Page index {index} out of sequence (next index is {expected})")]
    IndexOutOfSequence { index: u32, expected: u32 },

    #[error("No project root set")]
    NoProjectRoot,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid project file: {0}")]
    Format(#[from] serde_json::Error),
}

/// Which pages a job targets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PageSelection {
    /// Every page in the store.
    #[default]
    All,
    /// Specific page indices, in the given order.
    Indices(Vec<u32>),
}

/// Ordered collection of page records.
#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    pages: Vec<PageRecord>,
    project_root: Option<PathBuf>,
}

impl DocumentStore {
    /// Create an empty store with no project root.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store rooted at a project directory.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            pages: Vec::new(),
            project_root: Some(root.into()),
        }
    }

    /// Build a store from existing records.
    ///
    /// Records are sorted by index and must then number `0..len` without
    /// gaps or duplicates.
    pub fn from_pages(
        mut pages: Vec<PageRecord>,
        project_root: Option<PathBuf>,
    ) -> Result<Self, StoreError> {
        pages.sort_by_key(|p| p.index);
        for (expected, page) in (0u32..).zip(&pages) {
            if page.index != expected {
                return Err(StoreError::IndexOutOfSequence {
                    index: page.index,
                    expected,
                });
            }
        }
        Ok(Self {
            pages,
            project_root,
        })
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// All pages in index order.
    pub fn pages(&self) -> &[PageRecord] {
        &self.pages
    }

    /// Index the next created page will receive.
    ///
    /// Indices are always `0..len`, so this equals the page count.
    pub fn next_index(&self) -> u32 {
        self.pages.last().map(|p| p.index + 1).unwrap_or(0)
    }

    fn position(&self, index: u32) -> Option<usize> {
        self.pages.binary_search_by_key(&index, |p| p.index).ok()
    }

    /// Look up a page by index.
    pub fn get(&self, index: u32) -> Option<&PageRecord> {
        self.position(index).map(|pos| &self.pages[pos])
    }

    /// Replace a single page, matched by its index.
    pub fn set(&mut self, record: PageRecord) -> Result<(), StoreError> {
        let pos = self
            .position(record.index)
            .ok_or(StoreError::PageNotFound(record.index))?;
        self.pages[pos] = record;
        Ok(())
    }

    /// Create a new page for an image, assigning the next index.
    pub fn push_image(&mut self, image_path: &Path) -> &PageRecord {
        let index = self.next_index();
        let stored = self.relative_path(image_path);
        self.pages.push(PageRecord::new(index, stored));
        &self.pages[self.pages.len() - 1]
    }

    /// Append pre-built records.
    ///
    /// Indices must continue the existing sequence without gaps; the whole
    /// batch is rejected otherwise.
    pub fn append(&mut self, records: Vec<PageRecord>) -> Result<(), StoreError> {
        let mut expected = self.next_index();
        for record in &records {
            if record.index != expected {
                return Err(StoreError::IndexOutOfSequence {
                    index: record.index,
                    expected,
                });
            }
            expected = record.index + 1;
        }
        self.pages.extend(records);
        Ok(())
    }

    /// Clone the selected pages for use as a job's private working copy.
    ///
    /// Repeated indices are collapsed so every index appears once.
    pub fn snapshot(&self, selection: &PageSelection) -> Result<Vec<PageRecord>, StoreError> {
        match selection {
            PageSelection::All => Ok(self.pages.clone()),
            PageSelection::Indices(indices) => {
                let mut seen = std::collections::HashSet::with_capacity(indices.len());
                let mut out = Vec::with_capacity(indices.len());
                for &index in indices {
                    if !seen.insert(index) {
                        continue;
                    }
                    let page = self.get(index).ok_or(StoreError::PageNotFound(index))?;
                    out.push(page.clone());
                }
                Ok(out)
            }
        }
    }

    /// Swap a snapshot back in.
    ///
    /// Every record must match an existing page; nothing is written unless
    /// all of them do.
    pub fn replace(&mut self, records: Vec<PageRecord>) -> Result<(), StoreError> {
        let mut positions = Vec::with_capacity(records.len());
        for record in &records {
            let pos = self
                .position(record.index)
                .ok_or(StoreError::PageNotFound(record.index))?;
            positions.push(pos);
        }
        for (pos, record) in positions.into_iter().zip(records) {
            self.pages[pos] = record;
        }
        Ok(())
    }

    /// Replace the whole page collection.
    pub fn replace_all(&mut self, pages: Vec<PageRecord>) -> Result<(), StoreError> {
        let rebuilt = Self::from_pages(pages, self.project_root.clone())?;
        *self = rebuilt;
        Ok(())
    }

    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    pub fn set_project_root(&mut self, root: impl Into<PathBuf>) {
        self.project_root = Some(root.into());
    }

    /// Resolve a stored image path to one usable on disk.
    ///
    /// Relative paths are joined to the project root, or to the current
    /// directory when no project is open.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match &self.project_root {
            Some(root) => normalize(&root.join(path)),
            None => std::env::current_dir()
                .map(|cwd| normalize(&cwd.join(path)))
                .unwrap_or_else(|_| path.to_path_buf()),
        }
    }

    /// Express a path relative to the project root when it lies inside it.
    pub fn relative_path(&self, path: &Path) -> PathBuf {
        match &self.project_root {
            Some(root) => path
                .strip_prefix(root)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| path.to_path_buf()),
            None => path.to_path_buf(),
        }
    }
}

/// Lexically remove `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Shared handle to a store.
///
/// Readers may hold the lock concurrently. While a job is active only the
/// job coordinator writes through it.
#[derive(Debug, Clone, Default)]
pub struct DocumentStoreHandle {
    inner: Arc<RwLock<DocumentStore>>,
}

impl DocumentStoreHandle {
    pub fn new(store: DocumentStore) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, DocumentStore> {
        self.inner.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, DocumentStore> {
        self.inner.write().await
    }

    /// Clone of every page.
    pub async fn pages(&self) -> Vec<PageRecord> {
        self.inner.read().await.pages().to_vec()
    }

    /// Clone of a single page.
    pub async fn get(&self, index: u32) -> Option<PageRecord> {
        self.inner.read().await.get(index).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
