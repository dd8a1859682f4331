mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use logging::{init_logging, LogFormat, LoggingConfig};
use sessreg_schema::{connect, initialize_schema, migration_status, DatabaseConfig, MigrationStatus, SchemaPool};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "sessreg")]
#[command(about = "Bring the session registry database schema up to date")]
struct Cli {
    /// Connection URL; overrides the DB_* variables
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Directory holding the embedded SQLite database
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log output format (console or json)
    #[arg(long, default_value = "console", global = true)]
    log_type: LogFormat,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Colorize console output
    #[arg(long, global = true)]
    color: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migrations (default)
    Migrate,

    /// Show which migrations are applied
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let logging = LoggingConfig {
        level: cli.log_level.clone(),
        format: cli.log_type,
        color: cli.color,
    };
    if let Err(e) = init_logging(&logging) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Failed to initialize schema");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.database_url {
        Some(url) => DatabaseConfig::from_url(url)?,
        None => DatabaseConfig::from_env(cli.data_dir.as_deref())?,
    };
    let pool = connect(&config).await?;

    let outcome = match cli.command.unwrap_or(Commands::Migrate) {
        Commands::Migrate => migrate(&pool).await,
        Commands::Status { json } => status(&pool, json).await,
    };

    pool.close().await;
    outcome
}

async fn migrate(pool: &SchemaPool) -> anyhow::Result<()> {
    let result = initialize_schema(pool).await?;
    info!(
        applied = ?result.applied_migrations,
        skipped = result.skipped_count,
        "Database schema is up to date"
    );
    Ok(())
}

async fn status(pool: &SchemaPool, json: bool) -> anyhow::Result<()> {
    let entries = migration_status(pool).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for entry in entries {
        let state = match entry.status {
            MigrationStatus::Pending => "pending".to_string(),
            MigrationStatus::Applied { applied_at: Some(at) } => format!("applied {}", at),
            MigrationStatus::Applied { applied_at: None } => "applied".to_string(),
        };
        println!("{:>4}  {:<24} {}", entry.id, entry.name, state);
    }
    Ok(())
}
