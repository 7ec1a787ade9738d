//! Application configuration for campusmenu.
//!
//! User config lives at `~/.campusmenu/campusmenu.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MenuError, Result};
use crate::types::DEFAULT_STATION;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "campusmenu.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".campusmenu";

// ---------------------------------------------------------------------------
// Config structs (matching campusmenu.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where and how to acquire the menu.
    #[serde(default)]
    pub source: SourceConfig,

    /// Extraction heuristics.
    #[serde(default)]
    pub extract: ExtractConfig,

    /// Per-provenance confidence constants.
    #[serde(default)]
    pub confidence: ConfidenceConfig,

    /// Freshness window advertised to callers.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// `[source]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Dining-hall menu page.
    #[serde(default = "default_page_url")]
    pub page_url: String,

    /// JSON menu API endpoint, if the location exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Fixed query parameters for the API (location id, mode, ...).
    #[serde(default)]
    pub api_params: BTreeMap<String, String>,

    /// Query parameter carrying the `MM/DD/YYYY` date on the API path.
    #[serde(default = "default_date_param")]
    pub date_param: String,

    /// Upper bound on a single strategy attempt.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Acquisition strategies, tried in order.
    #[serde(default = "default_strategies")]
    pub strategies: Vec<StrategyConfig>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            page_url: default_page_url(),
            api_url: None,
            api_params: BTreeMap::new(),
            date_param: default_date_param(),
            timeout_secs: default_timeout_secs(),
            strategies: default_strategies(),
        }
    }
}

fn default_page_url() -> String {
    "https://carleton.campusdish.com/LocationsAndMenus/TeraangaCommonsDiningHall".into()
}
fn default_date_param() -> String {
    "date".into()
}
fn default_timeout_secs() -> u64 {
    15
}
fn default_strategies() -> Vec<StrategyConfig> {
    vec![
        StrategyConfig::Direct,
        StrategyConfig::EnvelopeRelay {
            endpoint: "https://api.allorigins.win/get?url=".into(),
            field: default_envelope_field(),
        },
        StrategyConfig::RawRelay {
            endpoint: "https://api.allorigins.win/raw?url=".into(),
        },
    ]
}

/// One `[[source.strategies]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StrategyConfig {
    /// Fetch the target URL as-is.
    Direct,
    /// Relay that answers `{ "<field>": "<payload as string>" }`.
    EnvelopeRelay {
        /// Prefix the percent-encoded target URL is appended to.
        endpoint: String,
        #[serde(default = "default_envelope_field")]
        field: String,
    },
    /// Relay that answers with the payload itself.
    RawRelay {
        /// Prefix the percent-encoded target URL is appended to.
        endpoint: String,
    },
    /// Rendering service that returns the page as Markdown.
    ScrapeService {
        /// POST endpoint (Firecrawl-compatible `/v1/scrape`).
        endpoint: String,
        /// Name of the env var holding the API key (never store the key itself).
        #[serde(default = "default_scrape_key_env")]
        api_key_env: String,
        /// How long the service waits for client-side rendering.
        #[serde(default = "default_wait_for_ms")]
        wait_for_ms: u64,
    },
}

impl StrategyConfig {
    /// Hosted Firecrawl endpoint with default key variable and wait time.
    pub fn default_scrape_service() -> Self {
        Self::ScrapeService {
            endpoint: DEFAULT_SCRAPE_ENDPOINT.into(),
            api_key_env: default_scrape_key_env(),
            wait_for_ms: default_wait_for_ms(),
        }
    }

    pub fn is_scrape_service(&self) -> bool {
        matches!(self, Self::ScrapeService { .. })
    }
}

/// Hosted scrape endpoint used when `--scrape` is requested without one configured.
const DEFAULT_SCRAPE_ENDPOINT: &str = "https://api.firecrawl.dev/v1/scrape";

fn default_envelope_field() -> String {
    "contents".into()
}
fn default_scrape_key_env() -> String {
    "FIRECRAWL_API_KEY".into()
}
fn default_wait_for_ms() -> u64 {
    3000
}

/// `[extract]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Shortest accepted DOM item name (inclusive).
    #[serde(default = "default_min_dom_name_len")]
    pub min_dom_name_len: usize,

    /// Longest accepted DOM item name (inclusive).
    #[serde(default = "default_max_dom_name_len")]
    pub max_dom_name_len: usize,

    /// Free-text candidates must be strictly longer than this.
    #[serde(default = "default_min_line_len")]
    pub min_line_len: usize,

    /// Free-text candidates must be strictly shorter than this.
    #[serde(default = "default_max_line_len")]
    pub max_line_len: usize,

    /// Free-text lines starting with any of these are boilerplate.
    #[serde(default = "default_denylist_prefixes")]
    pub denylist_prefixes: Vec<String>,

    /// Free-text lines containing any of these are boilerplate.
    #[serde(default = "default_denylist_substrings")]
    pub denylist_substrings: Vec<String>,

    /// Lines scanned after a markdown item heading.
    #[serde(default = "default_markdown_lookahead")]
    pub markdown_lookahead: usize,

    /// Markdown heading where the trailing highlights/footer begins.
    #[serde(default = "default_footer_marker")]
    pub footer_marker: String,

    /// Station assigned before any station label is seen.
    #[serde(default = "default_station")]
    pub default_station: String,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            min_dom_name_len: default_min_dom_name_len(),
            max_dom_name_len: default_max_dom_name_len(),
            min_line_len: default_min_line_len(),
            max_line_len: default_max_line_len(),
            denylist_prefixes: default_denylist_prefixes(),
            denylist_substrings: default_denylist_substrings(),
            markdown_lookahead: default_markdown_lookahead(),
            footer_marker: default_footer_marker(),
            default_station: default_station(),
        }
    }
}

fn default_min_dom_name_len() -> usize {
    2
}
fn default_max_dom_name_len() -> usize {
    100
}
fn default_min_line_len() -> usize {
    3
}
fn default_max_line_len() -> usize {
    80
}
fn default_denylist_prefixes() -> Vec<String> {
    vec!["Menu".into(), "Location".into(), "Filter".into()]
}
fn default_denylist_substrings() -> Vec<String> {
    vec!["©".into(), "http".into()]
}
fn default_markdown_lookahead() -> usize {
    20
}
fn default_footer_marker() -> String {
    "## Menu Highlights".into()
}
fn default_station() -> String {
    DEFAULT_STATION.into()
}

/// `[confidence]` section. Calibrated constants, not data-quality scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceConfig {
    #[serde(default = "default_heuristic_confidence")]
    pub structured_dom: f32,
    #[serde(default = "default_heuristic_confidence")]
    pub free_text: f32,
    #[serde(default = "default_markdown_confidence")]
    pub markdown: f32,
    #[serde(default = "default_json_api_confidence")]
    pub json_api: f32,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            structured_dom: default_heuristic_confidence(),
            free_text: default_heuristic_confidence(),
            markdown: default_markdown_confidence(),
            json_api: default_json_api_confidence(),
        }
    }
}

fn default_heuristic_confidence() -> f32 {
    0.7
}
fn default_markdown_confidence() -> f32 {
    0.85
}
fn default_json_api_confidence() -> f32 {
    1.0
}

/// `[cache]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Minutes a result counts as fresh for callers layering a cache on top.
    #[serde(default = "default_fresh_for_minutes")]
    pub fresh_for_minutes: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            fresh_for_minutes: default_fresh_for_minutes(),
        }
    }
}

impl CacheConfig {
    /// The freshness window as a duration.
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.fresh_for_minutes)
    }
}

fn default_fresh_for_minutes() -> i64 {
    30
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.campusmenu/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| MenuError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.campusmenu/campusmenu.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
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
    let content = std::fs::read_to_string(path).map_err(|e| MenuError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| MenuError::config(format!("failed to parse {}: {e}", path.display())))?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| MenuError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content = toml::to_string_pretty(&config).map_err(|e| MenuError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| MenuError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject configs the pipeline cannot run with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.source.strategies.is_empty() {
        return Err(MenuError::config("[source] needs at least one strategy"));
    }
    if config.source.timeout_secs == 0 {
        return Err(MenuError::config("[source] timeout_secs must be positive"));
    }
    check_url("page_url", &config.source.page_url)?;
    if let Some(api_url) = &config.source.api_url {
        check_url("api_url", api_url)?;
    }
    for strategy in &config.source.strategies {
        match strategy {
            StrategyConfig::Direct => {}
            StrategyConfig::EnvelopeRelay { endpoint, .. }
            | StrategyConfig::RawRelay { endpoint }
            | StrategyConfig::ScrapeService { endpoint, .. } => {
                check_url("strategies.endpoint", endpoint)?;
            }
        }
    }
    let c = &config.confidence;
    for (name, value) in [
        ("structured_dom", c.structured_dom),
        ("free_text", c.free_text),
        ("markdown", c.markdown),
        ("json_api", c.json_api),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(MenuError::config(format!(
                "[confidence] {name} = {value} is outside [0, 1]"
            )));
        }
    }
    Ok(())
}

/// An absolute http(s) URL.
fn check_url(field: &str, raw: &str) -> Result<()> {
    let url = url::Url::parse(raw)
        .map_err(|e| MenuError::config(format!("[source] {field} '{raw}' is not a URL: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(MenuError::config(format!(
            "[source] {field} '{raw}' must be http or https, not {other}"
        ))),
    }
}

/// Check that every scrape-service strategy has its API key env var set.
pub fn validate_scrape_keys(config: &SourceConfig) -> Result<()> {
    for strategy in &config.strategies {
        if let StrategyConfig::ScrapeService { api_key_env, .. } = strategy {
            match std::env::var(api_key_env) {
                Ok(val) if !val.is_empty() => {}
                _ => {
                    return Err(MenuError::config(format!(
                        "scrape service API key not found. Set the {api_key_env} environment variable."
                    )));
                }
            }
        }
    }
    Ok(())
}
