//! Application configuration for Draftforge.
//!
//! User config lives at `~/.draftforge/draftforge.toml`. The six
//! system-governed generation settings (model, temperature, web-search
//! toggle, source cap, word-count bounds) live in the settings store, not
//! the TOML file; the pipeline receives them as a [`SystemSettings`]
//! snapshot and re-applies them after caller overrides so no request can
//! displace them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DraftforgeError, Result};
use crate::types::Tone;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "draftforge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".draftforge";

/// Settings database file name inside the config directory.
const DB_FILE_NAME: &str = "draftforge.db";

// ---------------------------------------------------------------------------
// Config structs (matching draftforge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Generation backend settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Web search settings.
    #[serde(default)]
    pub search: SearchConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Where generated articles are written.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Default writing tone.
    #[serde(default)]
    pub tone: Tone,

    /// Default audience description.
    #[serde(default = "default_audience")]
    pub audience: String,

    /// Whether to append a generated FAQ section.
    #[serde(default = "default_true")]
    pub include_faq: bool,

    /// Whether to emit SEO meta tags in the markdown rendering.
    #[serde(default = "default_true")]
    pub include_meta_tags: bool,

    /// Directory of local `.txt`/`.md` source files for research.
    #[serde(default = "default_sources_dir")]
    pub sources_dir: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            tone: Tone::default(),
            audience: default_audience(),
            include_faq: true,
            include_meta_tags: true,
            sources_dir: default_sources_dir(),
        }
    }
}

fn default_output_dir() -> String {
    "~/draftforge-articles".into()
}
fn default_audience() -> String {
    "general readers".into()
}
fn default_sources_dir() -> String {
    "~/.draftforge/sources".into()
}
fn default_true() -> bool {
    true
}

/// `[backend]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// OpenAI-compatible API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// TLS certificate verification for all outbound HTTPS. Disable only
    /// behind intercepting proxies.
    #[serde(default = "default_true")]
    pub ssl_verify: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            ssl_verify: true,
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Name of the env var holding the search API key. An unset var
    /// degrades research to local sources; it is not an error.
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_search_key_env(),
        }
    }
}

fn default_search_key_env() -> String {
    "TAVILY_API_KEY".into()
}

// ---------------------------------------------------------------------------
// System-governed settings (persisted in the settings store)
// ---------------------------------------------------------------------------

/// Snapshot of the six system-governed settings, loaded from the settings
/// store once per run. These always win over request-time overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSettings {
    pub model_name: String,
    pub temperature: f64,
    pub enable_web_search: bool,
    pub max_research_sources: usize,
    pub min_word_count: usize,
    pub max_word_count: usize,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            model_name: "gpt-5".into(),
            temperature: 0.7,
            enable_web_search: true,
            max_research_sources: 10,
            min_word_count: 500,
            max_word_count: 1000,
        }
    }
}

// ---------------------------------------------------------------------------
// Runtime generation config
// ---------------------------------------------------------------------------

/// Caller-supplied per-run overrides. Deliberately has no fields for the
/// system-governed settings, so a request cannot reach them at all.
#[derive(Debug, Clone, Default)]
pub struct RequestOverrides {
    pub tone: Option<Tone>,
    pub audience: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub include_faq: Option<bool>,
    pub include_meta_tags: Option<bool>,
    /// Style-guide rules for the Edit stage; empty list skips the pass.
    pub style_rules: Option<Vec<String>>,
}

/// Fully resolved configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: f64,
    pub enable_web_search: bool,
    pub max_sources: usize,
    pub min_word_count: usize,
    pub max_word_count: usize,
    pub tone: Tone,
    pub audience: String,
    pub keywords: Vec<String>,
    pub include_faq: bool,
    pub include_meta_tags: bool,
    pub style_rules: Vec<String>,
    pub ssl_verify: bool,
}

impl From<&AppConfig> for GenerationConfig {
    fn from(config: &AppConfig) -> Self {
        let system = SystemSettings::default();
        Self {
            model: system.model_name,
            temperature: system.temperature,
            enable_web_search: system.enable_web_search,
            max_sources: system.max_research_sources,
            min_word_count: system.min_word_count,
            max_word_count: system.max_word_count,
            tone: config.defaults.tone,
            audience: config.defaults.audience.clone(),
            keywords: Vec::new(),
            include_faq: config.defaults.include_faq,
            include_meta_tags: config.defaults.include_meta_tags,
            style_rules: Vec::new(),
            ssl_verify: config.backend.ssl_verify,
        }
    }
}

impl GenerationConfig {
    fn apply_system(&mut self, system: &SystemSettings) {
        self.model = system.model_name.clone();
        self.temperature = system.temperature;
        self.enable_web_search = system.enable_web_search;
        self.max_sources = system.max_research_sources;
        self.min_word_count = system.min_word_count;
        self.max_word_count = system.max_word_count;
    }

    fn apply_overrides(&mut self, overrides: &RequestOverrides) {
        if let Some(tone) = overrides.tone {
            self.tone = tone;
        }
        if let Some(audience) = &overrides.audience {
            self.audience = audience.clone();
        }
        if let Some(keywords) = &overrides.keywords {
            self.keywords = keywords.clone();
        }
        if let Some(include_faq) = overrides.include_faq {
            self.include_faq = include_faq;
        }
        if let Some(include_meta_tags) = overrides.include_meta_tags {
            self.include_meta_tags = include_meta_tags;
        }
        if let Some(style_rules) = &overrides.style_rules {
            self.style_rules = style_rules.clone();
        }
    }

    /// Reject configurations that would waste generation cost. Called
    /// before any backend request is made.
    pub fn validate(&self) -> Result<()> {
        if self.min_word_count >= self.max_word_count {
            return Err(DraftforgeError::config(format!(
                "min_word_count ({}) must be below max_word_count ({})",
                self.min_word_count, self.max_word_count
            )));
        }
        Ok(())
    }
}

/// Build the effective per-run configuration.
///
/// Precedence: app defaults, then persisted system settings, then caller
/// overrides. The persisted settings are applied again last; combined with
/// [`RequestOverrides`] carrying no system-governed fields, this guarantees
/// no override path can displace them.
pub fn resolve_config(
    app: &AppConfig,
    system: &SystemSettings,
    overrides: &RequestOverrides,
) -> GenerationConfig {
    let mut config = GenerationConfig::from(app);
    config.apply_system(system);
    config.apply_overrides(overrides);
    config.apply_system(system);
    config
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.draftforge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| DraftforgeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.draftforge/draftforge.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Get the path to the settings database (`~/.draftforge/draftforge.db`).
pub fn default_db_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(DB_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DraftforgeError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| DraftforgeError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DraftforgeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DraftforgeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DraftforgeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the backend API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.backend.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(()),
        _ => Err(DraftforgeError::config(format!(
            "generation backend API key not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("output_dir"));
        assert!(toml_str.contains("OPENAI_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.tone, Tone::Professional);
        assert_eq!(parsed.backend.api_key_env, "OPENAI_API_KEY");
        assert!(parsed.backend.ssl_verify);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml_str = r#"
[defaults]
audience = "platform engineers"

[backend]
base_url = "https://llm.internal.example/v1"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.audience, "platform engineers");
        assert_eq!(config.backend.base_url, "https://llm.internal.example/v1");
        // Untouched fields keep their defaults.
        assert!(config.defaults.include_faq);
        assert_eq!(config.search.api_key_env, "TAVILY_API_KEY");
    }

    #[test]
    fn generation_config_from_app_config() {
        let app = AppConfig::default();
        let config = GenerationConfig::from(&app);
        assert_eq!(config.model, "gpt-5");
        assert_eq!(config.min_word_count, 500);
        assert_eq!(config.max_word_count, 1000);
        assert!(config.keywords.is_empty());
    }

    #[test]
    fn resolve_applies_system_settings_last() {
        let app = AppConfig::default();
        let system = SystemSettings {
            model_name: "gpt-5-mini".into(),
            temperature: 0.2,
            enable_web_search: false,
            max_research_sources: 4,
            min_word_count: 800,
            max_word_count: 1600,
        };
        let overrides = RequestOverrides {
            tone: Some(Tone::Casual),
            keywords: Some(vec!["orchestration".into()]),
            ..Default::default()
        };

        let config = resolve_config(&app, &system, &overrides);
        // Overrides land on the non-governed fields...
        assert_eq!(config.tone, Tone::Casual);
        assert_eq!(config.keywords, vec!["orchestration".to_string()]);
        // ...while every system-governed value comes from the snapshot.
        assert_eq!(config.model, "gpt-5-mini");
        assert_eq!(config.temperature, 0.2);
        assert!(!config.enable_web_search);
        assert_eq!(config.max_sources, 4);
        assert_eq!(config.min_word_count, 800);
        assert_eq!(config.max_word_count, 1600);
    }

    #[test]
    fn validate_rejects_inverted_word_bounds() {
        let app = AppConfig::default();
        let mut system = SystemSettings::default();
        system.min_word_count = 1000;
        system.max_word_count = 1000;

        let config = resolve_config(&app, &system, &RequestOverrides::default());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("min_word_count"));

        system.max_word_count = 1001;
        let config = resolve_config(&app, &system, &RequestOverrides::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.backend.api_key_env = "DF_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
