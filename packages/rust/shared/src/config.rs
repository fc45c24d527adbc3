//! Application configuration for orgenrich.
//!
//! User config lives at `~/.orgenrich/orgenrich.toml` and is optional.
//! CLI flags override config file values, which override defaults.
//! The CRM API key is never stored in the file; `crm.api_key_env` names the
//! environment variable that holds it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{EnrichError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "orgenrich.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".orgenrich";

/// Desktop Chrome User-Agent sent to company websites.
pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.3";

// ---------------------------------------------------------------------------
// Config structs (matching orgenrich.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// CRM endpoint and credentials.
    #[serde(default)]
    pub crm: CrmConfig,

    /// What to enrich and how often.
    #[serde(default)]
    pub enrichment: EnrichmentConfig,

    /// Website fetching.
    #[serde(default)]
    pub scraper: ScraperConfig,

    /// Headless browser (rendered strategy only).
    #[serde(default)]
    pub browser: BrowserConfig,
}

/// `[crm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmConfig {
    /// Base URL of the JSON:API endpoints.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-request timeout.
    #[serde(default = "default_crm_timeout")]
    pub timeout_secs: u64,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_crm_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.overloop.com/public/v1".into()
}
fn default_api_key_env() -> String {
    "OVERLOOP_API_KEY".into()
}
fn default_crm_timeout() -> u64 {
    30
}

/// `[enrichment]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Predicates ANDed together in the contact list query.
    #[serde(default = "default_filters")]
    pub filters: Vec<String>,

    /// Sort field, `-` prefix for descending.
    #[serde(default = "default_sort")]
    pub sort: String,

    /// Seconds to wait between passes.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Scheme prepended to the derived website domain.
    #[serde(default = "default_website_scheme")]
    pub website_scheme: String,

    /// How the email domain is reduced to a website guess.
    #[serde(default)]
    pub label_policy: LabelPolicy,

    /// Organization attribute receiving the LinkedIn URL.
    #[serde(default = "default_linkedin_field")]
    pub linkedin_field: String,

    /// Write `null` to the LinkedIn field when nothing was found.
    #[serde(default)]
    pub overwrite_missing_linkedin: bool,

    /// Contact attribute set to `true` after a successful update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mark_enriched_field: Option<String>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            filters: default_filters(),
            sort: default_sort(),
            poll_interval_secs: default_poll_interval(),
            website_scheme: default_website_scheme(),
            label_policy: LabelPolicy::default(),
            linkedin_field: default_linkedin_field(),
            overwrite_missing_linkedin: false,
            mark_enriched_field: None,
        }
    }
}

fn default_filters() -> Vec<String> {
    vec!["c_enriched:true".into()]
}
fn default_sort() -> String {
    "-created_at".into()
}
fn default_poll_interval() -> u64 {
    300
}
fn default_website_scheme() -> String {
    "http".into()
}
fn default_linkedin_field() -> String {
    "c_linkedin_url".into()
}

/// `[scraper]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// Which fetch strategy to use for company websites.
    #[serde(default)]
    pub strategy: Strategy,

    /// Per-request timeout for static fetches.
    #[serde(default = "default_scrape_timeout")]
    pub timeout_secs: u64,

    /// Extra attempts after a transient failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between attempts.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// User-Agent for static fetches.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Allow fetching loopback/private addresses.
    #[serde(default)]
    pub allow_private_hosts: bool,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            timeout_secs: default_scrape_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff(),
            user_agent: default_user_agent(),
            allow_private_hosts: false,
        }
    }
}

fn default_scrape_timeout() -> u64 {
    20
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_backoff() -> u64 {
    500
}
fn default_user_agent() -> String {
    DESKTOP_USER_AGENT.into()
}

/// `[browser]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// WebDriver endpoint (chromedriver).
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Command line used to spawn the driver, e.g. `chromedriver --port=9515`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_command: Option<String>,

    /// Arguments passed to Chrome.
    #[serde(default = "default_chrome_args")]
    pub chrome_args: Vec<String>,

    /// WebDriver page load timeout.
    #[serde(default = "default_page_load_timeout")]
    pub page_load_timeout_secs: u64,

    /// Extra wait after navigation for client-side rendering.
    #[serde(default = "default_render_wait")]
    pub render_wait_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            driver_command: None,
            chrome_args: default_chrome_args(),
            page_load_timeout_secs: default_page_load_timeout(),
            render_wait_ms: default_render_wait(),
        }
    }
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".into()
}
fn default_chrome_args() -> Vec<String> {
    vec!["--headless".into(), "--disable-gpu".into()]
}
fn default_page_load_timeout() -> u64 {
    30
}
fn default_render_wait() -> u64 {
    1500
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// How company websites are fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Plain HTTP GET of the page.
    #[default]
    Static,
    /// Render through a headless browser via WebDriver.
    Rendered,
}

impl FromStr for Strategy {
    type Err = EnrichError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "static" => Ok(Self::Static),
            "rendered" => Ok(Self::Rendered),
            other => Err(EnrichError::config(format!(
                "unknown strategy '{other}': expected 'static' or 'rendered'"
            ))),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Static => "static",
            Self::Rendered => "rendered",
        })
    }
}

/// How a website guess is derived from an email domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LabelPolicy {
    /// Strip the first label only when a subdomain is present
    /// (`mail.example.com` -> `example.com`, `example.com` unchanged).
    #[default]
    SubdomainOnly,
    /// Always strip the first label (`example.com` -> `com`, then rejected).
    Always,
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.orgenrich/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| EnrichError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.orgenrich/orgenrich.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| EnrichError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        EnrichError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| EnrichError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content = toml::to_string_pretty(&config).map_err(|e| EnrichError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| EnrichError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check values the TOML schema cannot express.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    Url::parse(&config.crm.base_url).map_err(|e| {
        EnrichError::config(format!("crm.base_url '{}' is invalid: {e}", config.crm.base_url))
    })?;

    if config.scraper.strategy == Strategy::Rendered {
        Url::parse(&config.browser.webdriver_url).map_err(|e| {
            EnrichError::config(format!(
                "browser.webdriver_url '{}' is invalid: {e}",
                config.browser.webdriver_url
            ))
        })?;
    }

    match config.enrichment.website_scheme.as_str() {
        "http" | "https" => {}
        other => {
            return Err(EnrichError::config(format!(
                "enrichment.website_scheme must be 'http' or 'https', got '{other}'"
            )));
        }
    }

    if config.enrichment.linkedin_field.trim().is_empty() {
        return Err(EnrichError::config("enrichment.linkedin_field must not be empty"));
    }

    Ok(())
}

/// Read the CRM API key from the env var named in the config.
pub fn api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.crm.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(EnrichError::config(format!(
            "CRM API key not found. Set the {var_name} environment variable \
             (a .env file in the working directory also works)."
        ))),
    }
}
