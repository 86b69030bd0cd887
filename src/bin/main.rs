//! Aspire Duck Sync CLI

use aspire_duck_sync::config::parse_entities_json;
use aspire_duck_sync::{SyncClient, SyncConfig, SyncMode, SyncProgress};
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "aspire-duck-sync")]
#[command(author, version, about = "Sync data from the Aspire API to MotherDuck")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Full refresh of every entity
    #[arg(long, global = true)]
    full: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log level
    #[arg(long, default_value = "info", global = true, env = "LOG_LEVEL")]
    log_level: String,

    /// Log format (text or json)
    #[arg(long, default_value = "text", global = true, env = "LOG_FORMAT")]
    log_format: String,

    /// JSON output
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run sync (default)
    Sync {
        /// Only sync these entities (repeatable)
        #[arg(short, long = "entity")]
        entities: Vec<String>,
        /// Fetch and transform without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Test API authentication and warehouse connectivity
    Test,
    /// Show stored row counts and watermarks
    Status {
        /// Only show these entities (repeatable)
        #[arg(short, long = "entity")]
        entities: Vec<String>,
    },
    /// Generate sample config
    Init {
        #[arg(short, long, default_value = "aspire-duck-sync.toml")]
        output: String,
    },
    /// Generate base64 secret from entities.local.json
    GenerateSecret {
        /// Input JSON file path
        #[arg(short, long, default_value = "entities.local.json")]
        input: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level, &cli.log_format, cli.quiet);

    match run(cli).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mode = if cli.full {
        SyncMode::Full
    } else {
        SyncMode::Incremental
    };

    match cli.command {
        Some(Commands::Init { output }) => run_init(&output),
        Some(Commands::GenerateSecret { input }) => run_generate_secret(&input),
        None => {
            let config = load_config(cli.config.as_deref())?;
            run_sync(config, mode, &[], false, cli.json, cli.quiet).await
        }
        Some(Commands::Sync { entities, dry_run }) => {
            let config = load_config(cli.config.as_deref())?;
            run_sync(config, mode, &entities, dry_run, cli.json, cli.quiet).await
        }
        Some(Commands::Test) => {
            let config = load_config(cli.config.as_deref())?;
            run_test(config, cli.json).await
        }
        Some(Commands::Status { entities }) => {
            let config = load_config(cli.config.as_deref())?;
            run_status(config, &entities, cli.json).await
        }
    }
}

fn load_config(path: Option<&str>) -> Result<SyncConfig, Box<dyn std::error::Error>> {
    if let Some(p) = path {
        info!("Loading config from: {}", p);
        return Ok(SyncConfig::from_file(p)?);
    }

    for default in &["aspire-duck-sync.toml", ".aspire-duck-sync.toml"] {
        if std::path::Path::new(default).exists() {
            info!("Loading config from: {}", default);
            return Ok(SyncConfig::from_file(default)?);
        }
    }

    info!("Loading config from environment");
    Ok(SyncConfig::from_env()?)
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn progress_message(progress: &SyncProgress) -> String {
    match progress.total_records {
        Some(total) => format!("{}: {} ({} records)", progress.entity, progress.phase, total),
        None => format!("{}: {}", progress.entity, progress.phase),
    }
}

async fn run_sync(
    mut config: SyncConfig,
    mode: SyncMode,
    entities: &[String],
    dry_run: bool,
    json: bool,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    config.sync.dry_run |= dry_run;
    let interactive = !quiet && !json;

    if interactive {
        println!("{} v{}", style("Aspire Duck Sync").bold(), aspire_duck_sync::VERSION);
        println!("Mode: {}{}\n", mode, if config.sync.dry_run { " (dry run)" } else { "" });
    }

    let mut client = SyncClient::new(config).await?;
    let pb = interactive.then(spinner);
    if let Some(pb) = pb.clone() {
        client = client.with_progress(move |p| pb.set_message(progress_message(&p)));
    }

    let result = client.sync(mode, entities).await;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    let result = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if !quiet {
        if result.success {
            println!("{} Sync completed successfully", style("✓").green());
        } else {
            println!("{} Sync completed with errors", style("✗").red());
        }
        println!("\nRun: {}", result.run_id);
        println!("Duration: {}ms", result.duration_ms);
        println!("Fetched: {} records", result.total_fetched());
        println!("Written: {} rows\n", result.total_written());

        for er in &result.entities {
            let icon = if er.success {
                style("✓").green()
            } else {
                style("✗").red()
            };
            println!(
                "  {} {} → {} [{}]: {} fetched, {} rows ({}ms)",
                icon,
                er.entity,
                er.target_table,
                er.mode,
                er.records_fetched,
                er.parent_rows,
                er.duration_ms
            );
            if let Some(ref w) = er.watermark {
                println!("      Since: {}", w);
            }
            for (table, rows) in &er.tables_written {
                println!("      {} {}: {} rows", style("→").dim(), table, rows);
            }
            if let Some(ref e) = er.error {
                println!("      {}", style(format!("Error: {}", e)).red());
            }
        }
    }

    if result.success {
        Ok(())
    } else {
        Err("Sync failed".into())
    }
}

async fn run_test(config: SyncConfig, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !json {
        println!("Testing connectivity...\n");
    }

    let client = SyncClient::new(config).await?;
    client.test_connectivity().await?;

    if json {
        println!(r#"{{"aspire":"ok","motherduck":"ok"}}"#);
    } else {
        println!("\n{} All connectivity tests passed!", style("✓").green());
    }
    Ok(())
}

async fn run_status(
    config: SyncConfig,
    entities: &[String],
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = SyncClient::new(config).await?;
    let statuses = client.status(entities)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
    } else {
        println!("Stored Entities\n");
        for s in &statuses {
            match s.rows {
                Some(rows) => println!(
                    "  {} → {} [{}]: {} rows, watermark {}",
                    s.entity,
                    s.target_table,
                    s.mode,
                    rows,
                    s.watermark.as_deref().unwrap_or("-")
                ),
                None => println!(
                    "  {} → {} [{}]: {}",
                    s.entity,
                    s.target_table,
                    s.mode,
                    style("(table not found)").dim()
                ),
            }
        }
        let total: usize = statuses.iter().filter_map(|s| s.rows).sum();
        println!("\nTotal: {} rows", total);
    }
    Ok(())
}

fn run_generate_secret(input: &str) -> Result<(), Box<dyn std::error::Error>> {
    use base64::{Engine, engine::general_purpose::STANDARD};

    let content =
        std::fs::read_to_string(input).map_err(|e| format!("Failed to read {}: {}", input, e))?;

    let parsed: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| format!("Invalid JSON in {}: {}", input, e))?;
    let entities = parse_entities_json(&content)?;

    let minified = serde_json::to_string(&parsed)?;
    let encoded = STANDARD.encode(minified.as_bytes());

    println!("=== ASPIRE_ENTITIES_CONFIG Secret ({} entities) ===\n", entities.len());
    println!("{}\n", encoded);
    println!("=== Instructions ===");
    println!("1. Go to GitHub repo → Settings → Secrets → Actions");
    println!("2. Create/update secret: ASPIRE_ENTITIES_CONFIG");
    println!("3. Paste the value above");

    Ok(())
}

fn run_init(output: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = r#"# Aspire Duck Sync Configuration

[aspire]
client_id = "your_client_id"
client_secret = "your_client_secret"
page_size = 1000
request_timeout = "60s"

[motherduck]
token = "your_motherduck_token"
database = "aspire"

[sync]
default_start_date = "2015-01-01"
table_prefix = "aspire_"
batch_size = 1000

[retry]
max_retries = 3

[[entities]]
entity = "Properties"
date_column = "ModifiedDate"
id_column = "PropertyID"
full_refresh = false

[[entities]]
entity = "WorkTickets"
date_column = "LastModifiedDateTime"
id_column = "WorkTicketID"

[[entities]]
entity = "Invoices"
date_column = "LastModifiedDateTime"
id_column = "InvoiceID"

[[entities]]
entity = "Services"
id_column = "ServiceID"
"#;

    std::fs::write(output, config)?;
    println!("{} Created: {}", style("✓").green(), output);
    println!("\nEdit the file or use environment variables:");
    println!("  ASPIRE_CLIENT_ID, ASPIRE_CLIENT_SECRET, MOTHERDUCK_TOKEN");
    Ok(())
}

fn init_logging(level: &str, format: &str, quiet: bool) {
    if quiet {
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Logs go to stderr so that JSON results on stdout stay parseable.
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}
