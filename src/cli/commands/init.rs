//! Initialize command.

use std::path::Path;

use console::style;

use crate::store::{save_project, DocumentStore, PROJECT_FILE_NAME};

/// Directory for page images inside a project.
pub const IMAGES_DIR: &str = "images";

/// Create an empty project in `dir`.
pub fn cmd_init(dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir.join(IMAGES_DIR))?;
    let dir = std::fs::canonicalize(dir)?;

    if dir.join(PROJECT_FILE_NAME).exists() {
        anyhow::bail!("{} already contains a project", dir.display());
    }

    let store = DocumentStore::with_root(&dir);
    save_project(&store)?;

    println!(
        "{} Initialized folio project in {}",
        style("✓").green(),
        dir.display()
    );
    println!("  Add pages with `folio add-images` or `folio import`");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::load_project;

    #[test]
    fn test_init_creates_empty_project() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("letters");
        cmd_init(&root).unwrap();

        assert!(root.join(IMAGES_DIR).is_dir());
        assert!(load_project(&root).unwrap().is_empty());
        assert!(cmd_init(&root).is_err());
    }
}
