//! Listing commands.

use std::path::Path;

use console::style;

use crate::cli::helpers::open_project;
use crate::config::{PresetProvider, Settings};
use crate::models::{PageRecord, TextField};
use crate::providers::BackendKind;

const FIELDS: [(TextField, &str); 5] = [
    (TextField::Original, "O"),
    (TextField::Corrected, "C"),
    (TextField::Formatted, "F"),
    (TextField::Separated, "S"),
    (TextField::Translation, "T"),
];

/// List a project's pages.
pub fn cmd_pages(project: &Path) -> anyhow::Result<()> {
    let store = open_project(project)?;
    if store.is_empty() {
        println!("{} Project has no pages", style("!").yellow());
        return Ok(());
    }

    println!(
        "{:>5}  {:<12} {:<6} {:<6} {:<11} {}",
        "Page", "Label", "Image", "Text", "Active", "Metadata"
    );
    for page in store.pages() {
        let image = if store.resolve_path(&page.image_path).is_file() {
            style("yes").green()
        } else {
            style("no").red()
        };
        println!(
            "{:>5}  {:<12} {:<6} {:<6} {:<11} {}",
            page.index + 1,
            page.label,
            image,
            field_flags(page),
            page.active_text.as_str(),
            page.metadata.as_ref().map_or(0, |m| m.len())
        );
    }
    println!();
    println!("  Text: O=original C=corrected F=formatted S=separated T=translation");
    Ok(())
}

/// One letter per populated text field, `-` for empty ones.
fn field_flags(page: &PageRecord) -> String {
    FIELDS
        .iter()
        .map(|(field, flag)| {
            if page.text(*field).is_empty() {
                "-"
            } else {
                *flag
            }
        })
        .collect()
}

/// List the preset catalog.
pub fn cmd_presets(settings: &Settings) -> anyhow::Result<()> {
    let catalog = settings.catalog();
    println!("{:<16} {:<28} {:<11} {}", "Name", "Model", "Backend", "Marker");
    for preset in catalog.presets() {
        let backend = BackendKind::from_engine(&preset.model)
            .map(|kind| style(kind.as_str()).cyan())
            .unwrap_or_else(|| style("unknown").red());
        let marker = if preset.val_text.is_empty() {
            "-"
        } else {
            preset.val_text.as_str()
        };
        println!(
            "{:<16} {:<28} {:<11} {}",
            preset.name, preset.model, backend, marker
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_flags() {
        let mut page = PageRecord::new(0, "images/0001.jpg");
        assert_eq!(field_flags(&page), "-----");
        page.set_text(TextField::Original, "Dear Sir");
        page.set_text(TextField::Translation, "Cher Monsieur");
        assert_eq!(field_flags(&page), "O---T");
    }
}
