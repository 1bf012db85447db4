//! Per-page task logic: eligibility, input construction and result merging.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::types::JobType;
use crate::config::{presets, CorrectionPolicy, Preset};
use crate::models::{PageRecord, TextField};
use crate::providers::{ProviderInput, RouteCall, Router};

/// Page-scoped failures. Counted against the job, never fatal to it.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Page {0}: provider returned no usable text")]
    EmptyResponse(u32),

    #[error("Page {0}: metadata response had no recognizable headers")]
    NoMetadata(u32),
}

/// Decide what a page contributes to a job, or `None` to skip it.
///
/// `image` is the page's image path resolved against the project root.
pub fn plan_page(
    job: JobType,
    page: &PageRecord,
    image: &Path,
    preset: &Preset,
    policy: CorrectionPolicy,
) -> Option<ProviderInput> {
    let image_exists = page.has_image() && image.is_file();
    match job {
        JobType::Htr => image_exists.then(|| ProviderInput::Image {
            path: image.to_path_buf(),
            text: None,
        }),
        JobType::Correct => {
            if page.original.trim().is_empty() {
                return None;
            }
            if policy == CorrectionPolicy::SkipCorrected && !page.corrected.trim().is_empty() {
                return None;
            }
            if preset.use_images && image_exists {
                Some(ProviderInput::Image {
                    path: image.to_path_buf(),
                    text: Some(page.original.clone()),
                })
            } else {
                Some(ProviderInput::Text(page.original.clone()))
            }
        }
        JobType::Translate | JobType::Metadata => {
            let text = page.best_text().trim();
            (!text.is_empty()).then(|| ProviderInput::Text(text.to_string()))
        }
    }
}

/// Everything a worker needs besides its page.
pub struct TaskContext {
    pub job: JobType,
    pub router: Arc<Router>,
    pub preset: Preset,
}

/// Run one page through the router and merge the result into it.
pub async fn process_page(
    ctx: Arc<TaskContext>,
    mut page: PageRecord,
    input: ProviderInput,
) -> Result<PageRecord, TaskError> {
    debug!("Page {}: running {}", page.index, ctx.job);
    let text = ctx
        .router
        .route(RouteCall {
            preset: &ctx.preset,
            input: &input,
            slot: page.index,
            metadata: ctx.job == JobType::Metadata,
        })
        .await;

    if text.trim().is_empty() {
        return Err(TaskError::EmptyResponse(page.index));
    }

    match ctx.job {
        JobType::Htr => page.set_text(TextField::Original, text),
        JobType::Correct => page.set_text(TextField::Corrected, text),
        JobType::Translate => page.set_text(TextField::Translation, text),
        JobType::Metadata => {
            let fields = parse_metadata(&text, &ctx.preset.required_headers);
            if fields.is_empty() {
                return Err(TaskError::NoMetadata(page.index));
            }
            page.metadata = Some(fields);
        }
    }
    Ok(page)
}

/// Parse `Header: value` lines into a map.
///
/// Only known headers start a new entry; any other line continues the
/// previous value, so multi-line summaries survive.
pub fn parse_metadata(text: &str, required_headers: &[String]) -> BTreeMap<String, String> {
    let mut known: Vec<&str> = required_headers.iter().map(String::as_str).collect();
    for header in presets::METADATA_HEADERS
        .iter()
        .chain(presets::METADATA_OPTIONAL_HEADERS)
    {
        if !known.contains(header) {
            known.push(*header);
        }
    }

    let mut fields: BTreeMap<String, String> = BTreeMap::new();
    let mut current: Option<String> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        let header = trimmed.split_once(':').and_then(|(key, value)| {
            let key = key.trim();
            known.contains(&key).then(|| (key.to_string(), value.trim()))
        });

        match header {
            Some((key, value)) => {
                fields.insert(key.clone(), value.to_string());
                current = Some(key);
            }
            None => {
                if trimmed.is_empty() {
                    continue;
                }
                if let Some(value) = current.as_ref().and_then(|k| fields.get_mut(k)) {
                    if !value.is_empty() {
                        value.push('\n');
                    }
                    value.push_str(trimmed);
                }
            }
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::presets::default_presets;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn preset(name: &str) -> Preset {
        default_presets()
            .into_iter()
            .find(|p| p.name == name)
            .unwrap()
    }

    #[test]
    fn test_htr_requires_existing_image() {
        let dir = tempfile::TempDir::new().unwrap();
        let image = dir.path().join("0001.jpg");
        std::fs::write(&image, b"x").unwrap();
        let page = PageRecord::new(0, "0001.jpg");
        let htr = preset("HTR");

        assert_eq!(
            plan_page(JobType::Htr, &page, &image, &htr, CorrectionPolicy::Always),
            Some(ProviderInput::Image {
                path: image.clone(),
                text: None
            })
        );
        let missing = dir.path().join("0002.jpg");
        assert_eq!(
            plan_page(JobType::Htr, &page, &missing, &htr, CorrectionPolicy::Always),
            None
        );
        let no_image = PageRecord::new(1, "");
        assert_eq!(
            plan_page(JobType::Htr, &no_image, dir.path(), &htr, CorrectionPolicy::Always),
            None
        );
    }

    #[test]
    fn test_correct_input_and_policy() {
        let dir = tempfile::TempDir::new().unwrap();
        let image = dir.path().join("0001.jpg");
        std::fs::write(&image, b"x").unwrap();
        let correct = preset("Correct_Text");

        let mut page = PageRecord::new(0, "0001.jpg");
        assert_eq!(
            plan_page(JobType::Correct, &page, &image, &correct, CorrectionPolicy::Always),
            None
        );

        page.original = "Dcar Sir".to_string();
        assert_eq!(
            plan_page(JobType::Correct, &page, &image, &correct, CorrectionPolicy::Always),
            Some(ProviderInput::Image {
                path: image.clone(),
                text: Some("Dcar Sir".to_string())
            })
        );

        let gone = PathBuf::from("/nonexistent/0001.jpg");
        assert_eq!(
            plan_page(JobType::Correct, &page, &gone, &correct, CorrectionPolicy::Always),
            Some(ProviderInput::Text("Dcar Sir".to_string()))
        );

        page.corrected = "Dear Sir".to_string();
        assert!(
            plan_page(JobType::Correct, &page, &image, &correct, CorrectionPolicy::Always).is_some()
        );
        assert_eq!(
            plan_page(
                JobType::Correct,
                &page,
                &image,
                &correct,
                CorrectionPolicy::SkipCorrected
            ),
            None
        );
    }

    #[test]
    fn test_translate_uses_best_text() {
        let translation = preset("Translation");
        let mut page = PageRecord::new(0, "");
        let none = Path::new("");
        assert_eq!(
            plan_page(JobType::Translate, &page, none, &translation, CorrectionPolicy::Always),
            None
        );
        page.original = "Bonjour".to_string();
        page.corrected = "Bonjour, monsieur".to_string();
        assert_eq!(
            plan_page(JobType::Translate, &page, none, &translation, CorrectionPolicy::Always),
            Some(ProviderInput::Text("Bonjour, monsieur".to_string()))
        );
    }

    #[test]
    fn test_parse_metadata_multiline_summary() {
        let headers = preset("Metadata").required_headers;
        let text = "Document Type: Letter\n\
                    Author: Smith, John\n\
                    Correspondent: Brown, Ann\n\
                    Date: 01/02/1723\n\
                    Place of Creation: Boston\n\
                    People: Smith, John; Brown, Ann\n\
                    Places: Boston; London\n\
                    Summary:\n\
                    A letter about cargo.\n\
                    It mentions: the ship Mary.";
        let fields = parse_metadata(text, &headers);
        assert_eq!(fields["Document Type"], "Letter");
        assert_eq!(fields["Correspondent"], "Brown, Ann");
        assert_eq!(fields["Places"], "Boston; London");
        assert_eq!(
            fields["Summary"],
            "A letter about cargo.\nIt mentions: the ship Mary."
        );
        assert_eq!(fields.len(), 8);
    }

    #[test]
    fn test_parse_metadata_ignores_preamble() {
        let fields = parse_metadata("Some notes first.\nAuthor: Doe, Jane", &[]);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["Author"], "Doe, Jane");
    }
}
