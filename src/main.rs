//! `tally` command line: serve the JSON-RPC endpoint, initialise storage, or
//! print the running activity.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tally_core::timestamp;
use tally_settings::TallySettings;
use tally_store::{Database, SqliteStorage, Storage};
use tally_telemetry::TelemetryConfig;

#[derive(Parser)]
#[command(name = "tally", version, about = "JSON-RPC time tracker")]
struct Cli {
    /// Settings file (defaults to ~/.tally/settings.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the JSON-RPC server (default).
    Serve,
    /// Write default settings and create the database schema.
    Init,
    /// Print the running activity, if any.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings_path = cli.config.unwrap_or_else(tally_settings::settings_path);

    if matches!(cli.command, Some(Command::Init)) {
        let _ = tally_settings::ensure_settings_file(&settings_path)
            .with_context(|| format!("writing {}", settings_path.display()))?;
    }

    let settings = tally_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("loading {}", settings_path.display()))?;

    let telemetry = TelemetryConfig::from_level_name(&settings.logging.level, settings.logging.json);
    tally_telemetry::init_telemetry(&telemetry).context("initializing logging")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings).await,
        Command::Init => init(&settings),
        Command::Status => status(&settings),
    }
}

fn open_database(settings: &TallySettings) -> anyhow::Result<Database> {
    let db_path = settings.database.resolve(&tally_settings::tally_home());
    Database::open(&db_path).with_context(|| format!("opening database {}", db_path.display()))
}

fn open_storage(settings: &TallySettings) -> anyhow::Result<SqliteStorage> {
    Ok(SqliteStorage::new(open_database(settings)?))
}

fn init(settings: &TallySettings) -> anyhow::Result<()> {
    let storage = open_storage(settings)?;
    storage.create_schema().context("creating schema")?;
    println!("Database ready (schema version {}).", storage.schema_version()?);
    Ok(())
}

fn status(settings: &TallySettings) -> anyhow::Result<()> {
    let storage = open_storage(settings)?;
    match storage.running_activity().context("reading running activity")? {
        Some(activity) => println!(
            "{} (project {}) started {}, running for {}",
            activity.name,
            activity.project_id,
            timestamp::format(&activity.started),
            activity.duration_formatted(timestamp::now())
        ),
        None => println!("There is no running activity."),
    }
    Ok(())
}

async fn serve(settings: TallySettings) -> anyhow::Result<()> {
    let db = open_database(&settings)?;
    let storage = SqliteStorage::new(db.clone());
    if storage.schema_version()? == 0 {
        tracing::info!("empty database, creating schema");
        storage.create_schema().context("creating schema")?;
    }

    let config = tally_server::ServerConfig {
        host: settings.server.host.clone(),
        port: settings.server.port,
        max_body_bytes: settings.server.max_body_bytes,
    };
    let handle = tally_server::start(config, db)
        .await
        .context("starting server")?;

    tracing::info!(port = handle.port, "tally server ready");

    tokio::signal::ctrl_c()
        .await
        .context("listening for ctrl+c")?;

    tracing::info!("shutting down");
    handle.shutdown().await;
    Ok(())
}
