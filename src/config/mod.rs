//! Configuration: engine settings and the preset catalog.
//!
//! Settings come from a TOML file, falling back to built-in defaults, with
//! a few `FOLIO_*` environment overrides applied on top.

pub mod presets;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// Named, immutable bundle of model and prompt settings for one job type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    /// Engine name; the router picks a backend from it.
    pub model: String,
    /// System prompt.
    #[serde(default)]
    pub general_instructions: String,
    /// User prompt; `{text_to_process}` is replaced with the page text.
    #[serde(default)]
    pub specific_instructions: String,
    #[serde(default = "default_preset_temperature")]
    pub temperature: f32,
    /// Marker the response must contain; empty or `None` accepts anything.
    #[serde(default)]
    pub val_text: String,
    #[serde(default)]
    pub use_images: bool,
    #[serde(default)]
    pub required_headers: Vec<String>,
}

fn default_preset_temperature() -> f32 {
    0.3
}

/// Read-only preset lookup.
pub trait PresetProvider: Send + Sync {
    /// Exact-name lookup.
    fn preset(&self, name: &str) -> Option<Preset>;

    /// All presets in display order.
    fn presets(&self) -> Vec<Preset>;
}

/// In-memory preset list.
#[derive(Debug, Clone)]
pub struct PresetCatalog {
    presets: Vec<Preset>,
}

impl PresetCatalog {
    pub fn new(presets: Vec<Preset>) -> Self {
        Self { presets }
    }

    /// Defaults with `overrides` applied: same-name presets are replaced,
    /// new names are appended.
    pub fn with_overrides(overrides: Vec<Preset>) -> Self {
        let mut presets = presets::default_presets();
        for preset in overrides {
            match presets.iter_mut().find(|p| p.name == preset.name) {
                Some(existing) => *existing = preset,
                None => presets.push(preset),
            }
        }
        Self { presets }
    }
}

impl Default for PresetCatalog {
    fn default() -> Self {
        Self::new(presets::default_presets())
    }
}

impl PresetProvider for PresetCatalog {
    fn preset(&self, name: &str) -> Option<Preset> {
        self.presets.iter().find(|p| p.name == name).cloned()
    }

    fn presets(&self) -> Vec<Preset> {
        self.presets.clone()
    }
}

/// Whether the correction job revisits pages that already have a
/// corrected transcription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionPolicy {
    #[default]
    Always,
    SkipCorrected,
}

impl CorrectionPolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "always" => Some(Self::Always),
            "skip_corrected" | "skip" => Some(Self::SkipCorrected),
            _ => None,
        }
    }
}

/// PDF import settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSettings {
    /// Rasterization resolution.
    #[serde(default = "default_dpi")]
    pub dpi: u32,
    /// Pages rendered per blocking batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_dpi() -> u32 {
    150
}

fn default_batch_size() -> usize {
    5
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            dpi: default_dpi(),
            batch_size: default_batch_size(),
        }
    }
}

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Maximum concurrent provider calls per job.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Upper bound for a single routed provider call.
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,
    /// Base delay for router retries.
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    #[serde(default)]
    pub correction_policy: CorrectionPolicy,
    #[serde(default)]
    pub import: ImportSettings,
    /// Presets overriding or extending the built-in catalog.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub presets: Vec<Preset>,
}

fn default_concurrency() -> usize {
    50
}

fn default_provider_timeout_secs() -> u64 {
    120
}

fn default_retry_base_ms() -> u64 {
    1000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            provider_timeout_secs: default_provider_timeout_secs(),
            retry_base_ms: default_retry_base_ms(),
            correction_policy: CorrectionPolicy::default(),
            import: ImportSettings::default(),
            presets: Vec::new(),
        }
    }
}

impl Settings {
    /// Default config file location (`~/.config/folio/config.toml` on Linux).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("folio").join("config.toml"))
    }

    /// Load settings.
    ///
    /// An explicit path must exist. Without one, the default location is
    /// used if present, else built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let settings = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };
        let settings = settings.with_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded config from {}", path.display());
        Ok(settings)
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `FOLIO_CONCURRENCY`: worker cap per job
    /// - `FOLIO_PROVIDER_TIMEOUT`: per-call timeout in seconds
    /// - `FOLIO_CORRECTION_POLICY`: `always` or `skip_corrected`
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(val) = env_parse::<usize>("FOLIO_CONCURRENCY") {
            self.concurrency = val;
        }
        if let Some(val) = env_parse::<u64>("FOLIO_PROVIDER_TIMEOUT") {
            self.provider_timeout_secs = val;
        }
        if let Ok(val) = std::env::var("FOLIO_CORRECTION_POLICY") {
            if let Some(policy) = CorrectionPolicy::from_str(&val) {
                self.correction_policy = policy;
            }
        }
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        if self.import.batch_size == 0 {
            return Err(ConfigError::Invalid("import.batch_size must be at least 1".into()));
        }
        if self.import.dpi == 0 {
            return Err(ConfigError::Invalid("import.dpi must be positive".into()));
        }
        Ok(())
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }

    /// Preset catalog with this file's presets applied.
    pub fn catalog(&self) -> PresetCatalog {
        PresetCatalog::with_overrides(self.presets.clone())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.concurrency, 50);
        assert_eq!(settings.provider_timeout(), Duration::from_secs(120));
        assert_eq!(settings.retry_base(), Duration::from_secs(1));
        assert_eq!(settings.import.dpi, 150);
        assert_eq!(settings.import.batch_size, 5);
        assert_eq!(settings.correction_policy, CorrectionPolicy::Always);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            concurrency = 8
            correction_policy = "skip_corrected"

            [import]
            dpi = 300
            "#,
        )
        .unwrap();
        assert_eq!(settings.concurrency, 8);
        assert_eq!(settings.correction_policy, CorrectionPolicy::SkipCorrected);
        assert_eq!(settings.import.dpi, 300);
        assert_eq!(settings.import.batch_size, 5);
        assert_eq!(settings.provider_timeout_secs, 120);
    }

    #[test]
    fn test_file_presets_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [[presets]]
            name = "HTR"
            model = "gpt-4o"
            val_text = "Transcription:"
            use_images = true

            [[presets]]
            name = "Letterbook"
            model = "claude-sonnet-4-20250514"
            "#
        )
        .unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        let catalog = settings.catalog();
        assert_eq!(catalog.preset("HTR").unwrap().model, "gpt-4o");
        assert_eq!(catalog.preset("Letterbook").unwrap().temperature, 0.3);
        assert!(catalog.preset("Metadata").is_some());
        assert_eq!(
            catalog.presets().len(),
            presets::default_presets().len() + 1
        );
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let err = Settings::load(Some(Path::new("/nonexistent/folio.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let settings = Settings {
            concurrency: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_correction_policy_names() {
        assert_eq!(
            CorrectionPolicy::from_str("skip-corrected"),
            Some(CorrectionPolicy::SkipCorrected)
        );
        assert_eq!(CorrectionPolicy::from_str("ALWAYS"), Some(CorrectionPolicy::Always));
        assert_eq!(CorrectionPolicy::from_str("sometimes"), None);
    }

    #[test]
    fn test_default_catalog_lookup_is_exact() {
        let catalog = PresetCatalog::default();
        assert!(catalog.preset("Correct_Text").is_some());
        assert!(catalog.preset("correct_text").is_none());
        let metadata = catalog.preset(presets::METADATA).unwrap();
        assert_eq!(metadata.required_headers.len(), 7);
    }
}
