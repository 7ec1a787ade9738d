//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use campusmenu_core::{MenuPipeline, PipelineState, ProgressReporter};
use campusmenu_shared::{
    AppConfig, MenuItem, PipelineResult, PipelineWarning, ScrapeEnvelope, ScrapedMenu,
    StrategyConfig, init_config, load_config, load_config_from, validate_scrape_keys,
};
use campusmenu_source::{AcquisitionTarget, parse_menu_date};
use chrono::Local;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// campusmenu: today's dining-hall menu, normalized.
#[derive(Parser)]
#[command(
    name = "campusmenu",
    version,
    about = "Fetch and normalize a dining-hall menu from its web page or menu API.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.campusmenu/campusmenu.toml).
    #[arg(long, global = true, env = "CAMPUSMENU_CONFIG")]
    pub config: Option<PathBuf>,

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
    /// Fetch the current menu and print it.
    Fetch {
        /// Read the JSON menu API instead of the page.
        #[arg(long, conflicts_with = "scrape")]
        api: bool,

        /// Render the page through the scrape service and parse its Markdown.
        #[arg(long)]
        scrape: bool,

        /// Menu date (YYYY-MM-DD or MM/DD/YYYY). Only the API honours it.
        #[arg(long)]
        date: Option<String>,

        /// Override the configured page (or API, with --api) URL.
        #[arg(long)]
        url: Option<String>,

        /// Print the result as a scrape envelope instead of a listing.
        #[arg(long)]
        json: bool,
    },

    /// Print a menu saved earlier with `fetch --json`.
    Show {
        /// Envelope file to read.
        file: PathBuf,
    },

    /// Manage configuration.
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
        0 => "campusmenu=info",
        1 => "campusmenu=debug",
        _ => "campusmenu=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command routing
// ---------------------------------------------------------------------------

/// Route to the appropriate command handler.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Fetch {
            api,
            scrape,
            date,
            url,
            json,
        } => {
            let opts = FetchOptions {
                api,
                scrape,
                date,
                url,
                json,
            };
            cmd_fetch(config_path, opts).await
        }
        Command::Show { file } => cmd_show(&file),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

struct FetchOptions {
    api: bool,
    scrape: bool,
    date: Option<String>,
    url: Option<String>,
    json: bool,
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    })
}

/// Apply `fetch` flags on top of the loaded config.
fn apply_fetch_overrides(config: &mut AppConfig, opts: &FetchOptions) -> Result<()> {
    if let Some(url) = &opts.url {
        url::Url::parse(url).map_err(|e| eyre!("invalid URL '{url}': {e}"))?;
        if opts.api {
            config.source.api_url = Some(url.clone());
        } else {
            config.source.page_url = url.clone();
        }
    }

    if opts.scrape {
        let mut scrapers: Vec<StrategyConfig> = config
            .source
            .strategies
            .iter()
            .filter(|s| s.is_scrape_service())
            .cloned()
            .collect();
        if scrapers.is_empty() {
            scrapers.push(StrategyConfig::default_scrape_service());
        }
        config.source.strategies = scrapers;
        validate_scrape_keys(&config.source)?;
    }

    Ok(())
}

async fn cmd_fetch(config_path: Option<&Path>, opts: FetchOptions) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    apply_fetch_overrides(&mut config, &opts)?;

    let mut target = AcquisitionTarget::from_config(&config.source, opts.api)?;
    if let Some(date) = &opts.date {
        target = target.with_date(parse_menu_date(date)?);
    }

    info!(
        url = %target.url,
        format = %target.format,
        strategies = config.source.strategies.len(),
        "fetching menu"
    );

    let pipeline = MenuPipeline::from_config(&config)?;
    let reporter = CliProgress::new();

    let cancel = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let outcome = pipeline.run(&target, &reporter, cancel).await;
    reporter.spinner.finish_and_clear();

    if opts.json {
        let envelope = ScrapeEnvelope::from_outcome(&outcome);
        println!("{}", serde_json::to_string_pretty(&envelope)?);
        outcome?;
        return Ok(());
    }

    let result = outcome?;
    print!("{}", render_menu(&result, config.cache.window()));
    Ok(())
}

fn cmd_show(file: &Path) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .wrap_err_with(|| format!("failed to read {}", file.display()))?;
    let menu = ScrapeEnvelope::parse(&text)?.into_result()?;
    print!("{}", render_saved(&menu));
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Station-grouped listing, stations in first-seen order.
fn render_menu(result: &PipelineResult, fresh_for: chrono::Duration) -> String {
    let mut out = String::new();
    let period = capitalize(&result.meal_period);
    let fresh_until = (result.retrieved_at + fresh_for).with_timezone(&Local);

    out.push('\n');
    out.push_str(&format!(
        "  {period} · {} items · via {} ({})\n",
        result.items.len(),
        result.source.strategy,
        result.source.extractor
    ));
    out.push_str(&format!("  Fresh until {}\n", fresh_until.format("%H:%M")));
    push_stations(&mut out, &result.items);

    for warning in &result.warnings {
        let note = match warning {
            PipelineWarning::PartialExtraction { dropped } => {
                format!("{dropped} record(s) skipped for a missing name")
            }
            PipelineWarning::FallbackUsed { from, to } => {
                format!("no {from} items found, used {to} extraction")
            }
        };
        out.push_str(&format!("\n  note: {note}"));
    }
    out.push('\n');
    out
}

/// Listing for a saved envelope. Provenance is not part of the envelope.
fn render_saved(menu: &ScrapedMenu) -> String {
    let mut out = String::new();
    out.push('\n');
    out.push_str(&format!(
        "  {} · {} items · saved {}\n",
        capitalize(&menu.meal_period),
        menu.items.len(),
        menu.scraped_at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
    ));
    push_stations(&mut out, &menu.items);
    out.push('\n');
    out
}

fn push_stations(out: &mut String, items: &[MenuItem]) {
    for (station, items) in group_by_station(items) {
        out.push_str(&format!("\n  {station}\n"));
        for item in items {
            out.push_str(&format!("    {}\n", item_line(item)));
        }
    }
}

fn group_by_station(items: &[MenuItem]) -> Vec<(&str, Vec<&MenuItem>)> {
    let mut groups: Vec<(&str, Vec<&MenuItem>)> = Vec::new();
    for item in items {
        match groups.iter().position(|(s, _)| *s == item.station) {
            Some(i) => groups[i].1.push(item),
            None => groups.push((item.station.as_str(), vec![item])),
        }
    }
    groups
}

fn item_line(item: &MenuItem) -> String {
    let mut line = format!("{:>3}. {}", item.id, item.name);
    if item.nutrition.calories > 0 {
        line.push_str(&format!("  {} cal", item.nutrition.calories));
    }

    let d = &item.dietary;
    let badges: Vec<&str> = [
        (d.vegan, "VG"),
        (d.vegetarian && !d.vegan, "V"),
        (d.gluten_free, "GF"),
        (d.no_dairy, "DF"),
        (d.eat_well, "EW"),
        (d.low_carbon, "LC"),
    ]
    .into_iter()
    .filter_map(|(on, label)| on.then_some(label))
    .collect();
    if !badges.is_empty() {
        line.push_str(&format!("  [{}]", badges.join(" ")));
    }
    line
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
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
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn state(&self, state: PipelineState) {
        match state {
            PipelineState::Idle => {}
            PipelineState::Acquiring => self.spinner.set_message("Fetching menu"),
            PipelineState::Extracting => self.spinner.set_message("Reading menu"),
            PipelineState::Normalizing => self.spinner.set_message("Normalizing items"),
            PipelineState::Done | PipelineState::Failed(_) => self.spinner.finish_and_clear(),
        }
    }

    fn done(&self, _result: &PipelineResult) {
        self.spinner.finish_and_clear();
    }
}
