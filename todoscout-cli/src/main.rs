use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::{io, num::NonZeroUsize, path::PathBuf};
use todoscout::{
    delivery::{deliver_all_with_progress, Deliverer, DeliveryReport},
    export::{self, ExportFormat},
    CliOverrides, DeliveryConfig, EncodingMode, NotionDatabase, RetryPolicy, ScanConfig,
    SlackWebhook, TodoItem, TodoScanner,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    scan: CliScanConfig,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CliScanConfig {
    /// Root directory to scan (default: current directory)
    #[arg(short = 'd', long, global = true)]
    root: Option<PathBuf>,

    /// Configuration file layered over the global and local ones
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// File extensions to include (e.g. rs,ts,py)
    #[arg(short = 'e', long = "ext", global = true)]
    extensions: Option<String>,

    /// Folder names to skip, in addition to the configured ones
    #[arg(long = "exclude-folder", global = true)]
    exclude_folders: Vec<String>,

    /// Glob patterns to skip, relative to the root
    #[arg(short = 'x', long = "exclude", global = true)]
    exclude_patterns: Vec<String>,

    /// Marker keywords (e.g. TODO,FIXME)
    #[arg(short = 'k', long, global = true)]
    keywords: Option<String>,

    /// Number of files read at once
    #[arg(short = 'j', long, global = true)]
    jobs: Option<NonZeroUsize>,

    /// How to handle invalid UTF-8 (lossy|failfast)
    #[arg(long, global = true)]
    encoding: Option<EncodingMode>,
}

#[derive(Subcommand)]
enum Commands {
    /// List TODOs grouped by file
    Scan {
        /// Print only counts
        #[arg(short, long)]
        stats: bool,
    },

    /// Write TODOs to a file
    Export {
        /// Output format (txt|json|csv)
        #[arg(short, long, default_value = "txt")]
        format: ExportFormat,

        /// Output path (default: todos.<format> in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Post TODOs to a Slack incoming webhook
    SendSlack {
        /// Webhook URL, overriding the configured one
        #[arg(long)]
        webhook: Option<String>,

        /// Post one message per TODO instead of a grouped digest
        #[arg(long)]
        per_item: bool,

        /// Only check that the webhook accepts a message
        #[arg(long)]
        test: bool,
    },

    /// Create one page per TODO in a Notion database
    SendNotion {
        /// Integration token, overriding the configured one
        #[arg(long)]
        api_key: Option<String>,

        /// Target database ID, overriding the configured one
        #[arg(long)]
        database_id: Option<String>,

        /// Only check that the database can be retrieved
        #[arg(long)]
        test: bool,
    },
}

/// Delivery settings given on the command line
#[derive(Default)]
struct DeliveryFlags {
    webhook: Option<String>,
    notion_api_key: Option<String>,
    notion_database_id: Option<String>,
}

impl DeliveryFlags {
    fn from_command(command: &Commands) -> Self {
        match command {
            Commands::SendSlack { webhook, .. } => Self {
                webhook: webhook.clone(),
                ..Self::default()
            },
            Commands::SendNotion {
                api_key,
                database_id,
                ..
            } => Self {
                notion_api_key: api_key.clone(),
                notion_database_id: database_id.clone(),
                ..Self::default()
            },
            _ => Self::default(),
        }
    }
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl CliScanConfig {
    fn overrides(&self, flags: DeliveryFlags) -> CliOverrides {
        CliOverrides {
            root_path: self.root.clone(),
            include_extensions: self.extensions.as_deref().map(split_list),
            exclude_folders: self.exclude_folders.clone(),
            exclude_patterns: self.exclude_patterns.clone(),
            keywords: self.keywords.as_deref().map(split_list),
            concurrency_limit: self.jobs,
            encoding_mode: self.encoding,
            log_level: None,
            slack_webhook_url: flags.webhook,
            notion_api_key: flags.notion_api_key,
            notion_database_id: flags.notion_database_id,
        }
    }
}

fn init_logging(level: &str, verbose: bool) {
    let level = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let flags = DeliveryFlags::from_command(&cli.command);
    let mut config = ScanConfig::load_from(cli.scan.config.as_deref())?
        .merge_with_cli(cli.scan.overrides(flags));
    if config.root_path.is_none() {
        config.root_path = Some(PathBuf::from("."));
    }

    init_logging(&config.log_level, cli.verbose);
    debug!("Effective configuration: {:?}", config);

    match cli.command {
        Commands::Scan { stats } => run_scan(config, stats),
        Commands::Export { format, output } => run_export(config, format, output),
        Commands::SendSlack { per_item, test, .. } => run_send_slack(config, per_item, test),
        Commands::SendNotion { test, .. } => run_send_notion(config, test),
    }
}

fn collect(config: ScanConfig) -> Result<Vec<TodoItem>> {
    let scanner = TodoScanner::new(config)?;
    let output = scanner.scan()?;
    if output.files_failed > 0 {
        eprintln!(
            "{}",
            format!("Skipped {} unreadable file(s)", output.files_failed).yellow()
        );
    }
    Ok(output.items)
}

fn run_scan(config: ScanConfig, stats_only: bool) -> Result<()> {
    let scanner = TodoScanner::new(config)?;
    let output = scanner.scan()?;

    if stats_only {
        println!(
            "Found {} TODOs in {} of {} files",
            output.total_todos(),
            output.files_with_todos,
            output.files_scanned
        );
        if output.files_failed > 0 {
            println!("{} file(s) could not be read", output.files_failed);
        }
        return Ok(());
    }

    let stdout = io::stdout();
    export::print_to_terminal(&output.items, &mut stdout.lock())?;
    Ok(())
}

fn run_export(config: ScanConfig, format: ExportFormat, output: Option<PathBuf>) -> Result<()> {
    let items = collect(config)?;
    let path = output.unwrap_or_else(|| PathBuf::from(format.default_file_name()));
    export::export_to_path(&items, format, &path)
        .with_context(|| format!("failed to export to {}", path.display()))?;
    println!(
        "Exported {} TODOs to {}",
        items.len(),
        path.display().to_string().blue()
    );
    Ok(())
}

fn run_send_slack(config: ScanConfig, per_item: bool, test_only: bool) -> Result<()> {
    let delivery = config.delivery.clone();
    let Some(url) = delivery.slack_webhook_url.clone() else {
        bail!("no Slack webhook configured; pass --webhook or set delivery.slack_webhook_url");
    };
    let webhook = SlackWebhook::new(url, delivery.timeout())?;

    if test_only {
        if webhook.test_connection() {
            println!("{}", "Slack webhook accepted the test message".green());
            return Ok(());
        }
        bail!("Slack webhook did not accept the test message");
    }

    let items = collect(config)?;
    if items.is_empty() {
        println!("{}", "No TODOs to send.".yellow());
        return Ok(());
    }

    if per_item {
        return deliver_with_progress(&items, &webhook, &delivery);
    }

    let policy = RetryPolicy::from(&delivery);
    let messages = webhook.send_digest(&items, &policy)?;
    println!("Sent {} TODOs to Slack in {} message(s)", items.len(), messages);
    Ok(())
}

fn run_send_notion(config: ScanConfig, test_only: bool) -> Result<()> {
    let delivery = config.delivery.clone();
    let (Some(api_key), Some(database_id)) = (
        delivery.notion_api_key.clone(),
        delivery.notion_database_id.clone(),
    ) else {
        bail!(
            "no Notion database configured; pass --api-key and --database-id or set \
             delivery.notion_api_key and delivery.notion_database_id"
        );
    };
    let notion = NotionDatabase::new(api_key, database_id, delivery.timeout())?;

    if test_only {
        if notion.test_connection() {
            println!("{}", "Notion database is reachable".green());
            return Ok(());
        }
        bail!("Notion database {} could not be retrieved", notion.database_id());
    }

    let items = collect(config)?;
    if items.is_empty() {
        println!("{}", "No TODOs to send.".yellow());
        return Ok(());
    }

    deliver_with_progress(&items, &notion, &delivery)
}

fn deliver_with_progress<D: Deliverer>(
    items: &[TodoItem],
    deliverer: &D,
    delivery: &DeliveryConfig,
) -> Result<()> {
    let progress = ProgressBar::new(items.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} TODOs")?
            .progress_chars("=>-"),
    );

    let report = deliver_all_with_progress(
        items,
        deliverer,
        delivery.concurrency,
        &RetryPolicy::from(delivery),
        |_, _| progress.inc(1),
    )?;
    progress.finish_and_clear();
    print_report(&report, deliverer.name())
}

fn print_report(report: &DeliveryReport, service: &str) -> Result<()> {
    info!(
        "{} delivery finished: {} ok, {} failed",
        service,
        report.delivered,
        report.failures.len()
    );

    println!("Sent {} of {} TODOs to {}", report.delivered, report.total(), service);
    for failure in &report.failures {
        eprintln!(
            "{} {}:{} after {} attempt(s): {}",
            "failed".red(),
            failure.file_path,
            failure.line_number,
            failure.attempts,
            failure.error
        );
    }
    if !report.is_success() {
        bail!("{} TODO(s) could not be delivered", report.failures.len());
    }
    Ok(())
}
