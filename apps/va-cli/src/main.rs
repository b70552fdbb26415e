use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use va_config::{ConfigError, ScreenDefaults, ServerConfig, load_database};
use va_records::{NullSink, RecordDatabase, RecordError, RecordStore};
use va_server::{MirrorModel, ServerError, SimServer, serve_stream, serve_tcp};

#[derive(Parser)]
#[command(name = "va-cli")]
#[command(about = "Virtual accelerator - control points backed by a live model", long_about = None)]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and build a record database
    Validate(Sources),
    /// List every field with its kind and initial value
    Points(Sources),
    /// Serve the database over the line protocol
    Serve {
        #[command(flatten)]
        sources: Sources,
        /// Server settings (YAML or JSON), later files override earlier ones
        #[arg(long)]
        config: Vec<PathBuf>,
        /// Evaluate before each write returns instead of debouncing
        #[arg(long)]
        sync: bool,
        /// Debounce interval in seconds
        #[arg(long)]
        timeout: Option<f64>,
        /// Serve TCP on this address instead of stdin/stdout
        #[arg(long)]
        listen: Option<String>,
        /// Prefix for every record name
        #[arg(long)]
        prefix: Option<String>,
    },
}

#[derive(Args)]
struct Sources {
    /// Record database files (YAML or JSON), deep-merged in order
    files: Vec<PathBuf>,
    /// Device controls files
    #[arg(long)]
    devices: Vec<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Records(#[from] RecordError),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error("no record or device files given")]
    NoSources,
}

type CliResult<T> = Result<T, CliError>;

fn main() -> CliResult<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the protocol.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Commands::Validate(sources) => cmd_validate(&sources),
        Commands::Points(sources) => cmd_points(&sources),
        Commands::Serve {
            sources,
            config,
            sync,
            timeout,
            listen,
            prefix,
        } => {
            let mut config = if config.is_empty() {
                ServerConfig::default()
            } else {
                ServerConfig::load(&config)?
            };
            if sync {
                config.threaded = false;
            }
            if let Some(timeout) = timeout {
                config.debounce_interval_s = timeout;
            }
            if let Some(prefix) = prefix {
                config.prefix = prefix;
            }
            cmd_serve(&sources, config, listen.as_deref())
        }
    }
}

fn load(sources: &Sources, screen: &ScreenDefaults) -> CliResult<RecordDatabase> {
    if sources.files.is_empty() && sources.devices.is_empty() {
        return Err(CliError::NoSources);
    }
    Ok(load_database(&sources.files, &sources.devices, screen)?)
}

fn build(db: &RecordDatabase) -> CliResult<RecordStore> {
    Ok(RecordStore::build_all(db, Arc::new(NullSink))?)
}

fn cmd_validate(sources: &Sources) -> CliResult<()> {
    let store = build(&load(sources, &ScreenDefaults::default())?)?;
    let fields = store.catalog().len();
    println!("✓ {} records, {} fields", store.len(), fields);
    Ok(())
}

fn cmd_points(sources: &Sources) -> CliResult<()> {
    let store = build(&load(sources, &ScreenDefaults::default())?)?;
    let fields = store.catalog();
    let width = fields.iter().map(|f| f.name.len()).max().unwrap_or(0);
    for field in fields {
        println!(
            "{:<width$}  {:<11}  {}",
            field.name,
            field.kind.name(),
            field.value,
            width = width
        );
    }
    Ok(())
}

fn cmd_serve(sources: &Sources, config: ServerConfig, listen: Option<&str>) -> CliResult<()> {
    let db = load(sources, &config.screen)?;
    let reset = config.reset_name();
    let server = SimServer::start_with(db, config, |store| {
        let model = MirrorModel::from_store(store);
        Box::new(match reset {
            Some(reset) => model.with_reset_point(reset),
            None => model,
        })
    })?;
    log_ready(&server, listen);

    match listen {
        Some(addr) => serve_tcp(Arc::new(server), addr)?,
        None => {
            let stdin = io::stdin();
            serve_stream(&server, stdin.lock(), io::stdout().lock())?;
        }
    }
    Ok(())
}

fn log_ready(server: &SimServer, listen: Option<&str>) {
    let status = server.config().status_name();
    info!(
        fields = server.list().len(),
        status = %status,
        transport = listen.unwrap_or("stdio"),
        "ready"
    );
}
