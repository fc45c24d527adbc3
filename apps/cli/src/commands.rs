//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use orgenrich_core::{ContactOutcome, Enricher, PassProgress, PassReport, SilentProgress};
use orgenrich_crm::CrmClient;
use orgenrich_scraper::{DriverProcess, LinkedinFinder};
use orgenrich_shared::{
    AppConfig, Strategy, api_key, init_config, load_config, load_config_from, validate_config,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// orgenrich: enrich CRM organizations from contact emails.
#[derive(Parser)]
#[command(
    name = "orgenrich",
    version,
    about = "Derive company websites from contact emails and attach their LinkedIn pages in the CRM.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.orgenrich/orgenrich.toml).
    #[arg(long, global = true, env = "ORGENRICH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Enrich contacts in a polling loop until Ctrl-C.
    Run {
        /// Seconds between passes (overrides enrichment.poll_interval_secs).
        #[arg(long)]
        interval: Option<u64>,

        /// Fetch strategy: static or rendered.
        #[arg(long)]
        strategy: Option<Strategy>,
    },

    /// Run a single enrichment pass and print a summary.
    Once {
        /// Fetch strategy: static or rendered.
        #[arg(long)]
        strategy: Option<Strategy>,
    },

    /// Print one contact as JSON.
    Contact {
        /// Contact ID.
        id: String,
    },

    /// Look for a LinkedIn link on one website.
    Find {
        /// Website URL.
        url: String,

        /// Fetch strategy: static or rendered.
        #[arg(long)]
        strategy: Option<Strategy>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        // Target prefix match also covers the orgenrich_* library crates.
        0 => "orgenrich=info",
        1 => "orgenrich=debug",
        _ => "orgenrich=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run { interval, strategy } => cmd_run(config_path, interval, strategy).await,
        Command::Once { strategy } => cmd_once(config_path, strategy).await,
        Command::Contact { id } => cmd_contact(config_path, &id).await,
        Command::Find { url, strategy } => cmd_find(config_path, &url, strategy).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(
    config_path: Option<&Path>,
    interval: Option<u64>,
    strategy: Option<Strategy>,
) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    apply_overrides(&mut config, interval, strategy)?;

    let enricher = build_enricher(&config)?;
    let finder = LinkedinFinder::from_config(&config)?;
    let mut driver = start_driver(&config, &finder).await?;

    let shutdown = shutdown_on_ctrl_c();
    enricher.run(&finder, &shutdown, &SilentProgress).await;

    if let Some(driver) = driver.as_mut() {
        driver.shutdown().await;
    }
    Ok(())
}

async fn cmd_once(config_path: Option<&Path>, strategy: Option<Strategy>) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    apply_overrides(&mut config, None, strategy)?;

    let enricher = build_enricher(&config)?;
    let finder = LinkedinFinder::from_config(&config)?;
    let mut driver = start_driver(&config, &finder).await?;

    let shutdown = shutdown_on_ctrl_c();
    let reporter = CliProgress::new();
    let result = enricher.run_once(&finder, &shutdown, &reporter).await;

    if let Some(driver) = driver.as_mut() {
        driver.shutdown().await;
    }
    let report = result?;

    println!();
    println!("  Pass complete");
    println!("  Contacts:  {}", report.contacts_seen);
    println!("  Updated:   {}", report.updated);
    println!("  LinkedIn:  {}", report.linkedin_found);
    println!("  Skipped:   {}", report.skipped);
    println!("  Failed:    {}", report.failed);
    println!("  Time:      {:.1}s", report.duration.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_contact(config_path: Option<&Path>, id: &str) -> Result<()> {
    let config = resolve_config(config_path)?;
    let crm = CrmClient::new(&config.crm, &api_key(&config)?)?;

    let contact = crm.get_contact(id).await?;
    println!("{}", serde_json::to_string_pretty(&contact)?);
    Ok(())
}

async fn cmd_find(config_path: Option<&Path>, url: &str, strategy: Option<Strategy>) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    apply_overrides(&mut config, None, strategy)?;

    let website = Url::parse(url).map_err(|e| eyre!("invalid URL '{url}': {e}"))?;

    let finder = LinkedinFinder::from_config(&config)?;
    let mut driver = start_driver(&config, &finder).await?;

    let session = finder.start();
    let result = session.find_linkedin(&website).await;
    session.finish().await;

    if let Some(driver) = driver.as_mut() {
        driver.shutdown().await;
    }

    match result? {
        Some(linkedin) => println!("{linkedin}"),
        None => println!("no LinkedIn link found on {website}"),
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

/// Apply command-line overrides on top of the file config.
fn apply_overrides(
    config: &mut AppConfig,
    interval: Option<u64>,
    strategy: Option<Strategy>,
) -> Result<()> {
    if let Some(secs) = interval {
        config.enrichment.poll_interval_secs = secs;
    }
    if let Some(strategy) = strategy {
        config.scraper.strategy = strategy;
    }
    validate_config(config)?;
    Ok(())
}

fn build_enricher(config: &AppConfig) -> Result<Enricher> {
    let key = api_key(config)?;
    let crm = CrmClient::new(&config.crm, &key)?;
    Ok(Enricher::new(crm, config.enrichment.clone()))
}

/// Spawn the configured WebDriver server for the rendered strategy.
async fn start_driver(config: &AppConfig, finder: &LinkedinFinder) -> Result<Option<DriverProcess>> {
    let (Some(webdriver), Some(command)) = (finder.webdriver(), &config.browser.driver_command)
    else {
        return Ok(None);
    };
    Ok(Some(DriverProcess::spawn(command, webdriver).await?))
}

/// Token cancelled on the first Ctrl-C.
fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, finishing current contact");
                trigger.cancel();
            }
            Err(e) => warn!(error = %e, "could not listen for Ctrl-C"),
        }
    });
    token
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        spinner.set_message("Fetching contacts");
        Self { spinner }
    }
}

impl PassProgress for CliProgress {
    fn pass_started(&self, contacts: usize) {
        self.spinner.set_message(format!("Enriching {contacts} contacts"));
    }

    fn contact_done(&self, outcome: &ContactOutcome, current: usize, total: usize) {
        let detail = match outcome {
            ContactOutcome::Updated { website, .. } => format!("updated {website}"),
            ContactOutcome::Skipped { contact_id, .. } => format!("skipped contact {contact_id}"),
            ContactOutcome::Failed { contact_id, .. } => format!("failed contact {contact_id}"),
        };
        self.spinner.set_message(format!("[{current}/{total}] {detail}"));
    }

    fn pass_finished(&self, _report: &PassReport) {
        self.spinner.finish_and_clear();
    }
}
