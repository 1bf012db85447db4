//! Project directory persistence.
//!
//! A project is a directory holding `project.json` (the page table) and an
//! `images/` folder for rasterized pages.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{DocumentStore, StoreError};
use crate::models::PageRecord;

pub const PROJECT_FILE_NAME: &str = "project.json";

const PROJECT_VERSION: u32 = 1;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "bmp", "webp"];

#[derive(Debug, Serialize, Deserialize)]
struct ProjectFile {
    version: u32,
    saved_at: DateTime<Utc>,
    #[serde(default)]
    pages: Vec<PageRecord>,
}

/// Load a project directory into a store rooted at it.
pub fn load_project(root: &Path) -> Result<DocumentStore, StoreError> {
    let path = root.join(PROJECT_FILE_NAME);
    let raw = std::fs::read_to_string(&path)?;
    let file: ProjectFile = serde_json::from_str(&raw)?;
    debug!(
        "Loaded {} pages from {} (saved {})",
        file.pages.len(),
        path.display(),
        file.saved_at
    );
    DocumentStore::from_pages(file.pages, Some(root.to_path_buf()))
}

/// Write the store's page table into its project root.
///
/// The file is written beside the target and renamed into place so a crash
/// mid-write leaves the previous version intact.
pub fn save_project(store: &DocumentStore) -> Result<PathBuf, StoreError> {
    let root = store.project_root().ok_or(StoreError::NoProjectRoot)?;
    std::fs::create_dir_all(root)?;

    let file = ProjectFile {
        version: PROJECT_VERSION,
        saved_at: Utc::now(),
        pages: store.pages().to_vec(),
    };
    let json = serde_json::to_string_pretty(&file)?;

    let path = root.join(PROJECT_FILE_NAME);
    let tmp = root.join(format!(".{}.tmp", PROJECT_FILE_NAME));
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, &path)?;
    Ok(path)
}

/// Image files directly inside `dir`, in natural filename order.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut images = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
            .unwrap_or(false);
        if is_image {
            images.push(path);
        }
    }
    images.sort_by(|a, b| natural_cmp(&file_name(a), &file_name(b)));
    Ok(images)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Compare strings so that embedded numbers sort numerically (`p2` < `p10`).
fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a = a.chars().peekable();
    let mut b = b.chars().peekable();
    loop {
        match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let na = take_number(&mut a);
                let nb = take_number(&mut b);
                let ord = na
                    .trim_start_matches('0')
                    .len()
                    .cmp(&nb.trim_start_matches('0').len())
                    .then_with(|| na.trim_start_matches('0').cmp(nb.trim_start_matches('0')));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                a.next();
                b.next();
            }
        }
    }
}

fn take_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        digits.push(c);
        chars.next();
    }
    digits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TextField;
    use tempfile::TempDir;

    #[test]
    fn test_save_then_load_project() {
        let dir = TempDir::new().unwrap();
        let mut store = DocumentStore::with_root(dir.path());
        store.push_image(&dir.path().join("images/0001.jpg"));
        let mut page = store.get(0).cloned().unwrap();
        page.set_text(TextField::Original, "Anno 1723");
        store.set(page).unwrap();

        let path = save_project(&store).unwrap();
        assert!(path.ends_with(PROJECT_FILE_NAME));

        let loaded = load_project(dir.path()).unwrap();
        assert_eq!(loaded.len(), 1);
        let page = loaded.get(0).unwrap();
        assert_eq!(page.image_path, PathBuf::from("images/0001.jpg"));
        assert_eq!(page.active(), "Anno 1723");
        assert_eq!(loaded.project_root(), Some(dir.path()));
    }

    #[test]
    fn test_save_without_root_fails() {
        let store = DocumentStore::new();
        assert!(matches!(
            save_project(&store),
            Err(StoreError::NoProjectRoot)
        ));
    }

    #[test]
    fn test_list_images_natural_order() {
        let dir = TempDir::new().unwrap();
        for name in ["p10.jpg", "p2.PNG", "p1.jpg", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let names: Vec<String> = list_images(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["p1.jpg", "p2.PNG", "p10.jpg"]);
    }

    #[test]
    fn test_natural_cmp() {
        assert_eq!(natural_cmp("a2", "a10"), Ordering::Less);
        assert_eq!(natural_cmp("a010", "a10"), Ordering::Equal);
        assert_eq!(natural_cmp("b1", "a9"), Ordering::Greater);
    }
}
