use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use describer::config::Config;
use describer::describer::{Collector, JsonLinesSink, Sink};
use describer::providers::http::format_api_error;
use describer::providers::{ClientOverrides, Clients};
use describer::resource;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Describe cloud resources as normalized JSON
#[derive(Parser, Debug)]
#[command(name = "describer", version, about, long_about = None)]
struct Args {
    /// Resource type to describe (see --list-types)
    resource_type: Option<String>,

    /// Describe a single resource by id instead of listing
    #[arg(long, value_name = "ID")]
    get: Option<String>,

    /// Narrow the listing to one parent, e.g. an app name
    #[arg(long)]
    scope: Option<String>,

    /// Organization to describe
    #[arg(short, long)]
    org: Option<String>,

    /// API token for the provider of the resource type
    #[arg(long)]
    token: Option<String>,

    /// Print resources as JSON lines while the listing runs
    #[arg(long)]
    stream: bool,

    /// Keep provider order in buffered output
    #[arg(long)]
    ordered: bool,

    /// Maximum items mapped concurrently
    #[arg(long)]
    max_concurrency: Option<usize>,

    /// Abort the listing after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Config file (defaults to <config dir>/describer/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// List known resource types and exit
    #[arg(long)]
    list_types: bool,

    /// Write a default config file (to --config if given) and exit
    #[arg(long)]
    init_config: bool,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {:?}", log_path))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("describer started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("describer").join("describer.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".describer").join("describer.log");
    }
    PathBuf::from("describer.log")
}

fn print_resource_types() {
    for provider in resource::get_all_providers() {
        println!("{}:", provider);
        for key in resource::get_provider_resource_keys(provider) {
            if let Some(def) = resource::get_resource(key) {
                let get = if def.supports_get() { " (--get)" } else { "" };
                println!("  {:<22} {:<18} {}{}", key, def.kind, def.display_name, get);
            }
        }
    }
}

/// Write a default config, refusing to overwrite an existing file
fn init_config(path: Option<&Path>) -> Result<PathBuf> {
    let Some(path) = path.map(Path::to_path_buf).or_else(Config::config_path) else {
        anyhow::bail!("No config directory on this platform, pass --config");
    };
    if path.exists() {
        anyhow::bail!("Config file {:?} already exists", path);
    }
    Config::default().save_to(&path)?;
    Ok(path)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Dropped on return so buffered log lines are flushed
    let _log_guard = match setup_logging(args.log_level) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            return ExitCode::FAILURE;
        }
    };

    ExitCode::from(run_cli(&args).await)
}

/// Exit status: 0 on success, 1 on failure, 2 on a usage error
async fn run_cli(args: &Args) -> u8 {
    if args.list_types {
        print_resource_types();
        return 0;
    }

    if args.init_config {
        return match init_config(args.config.as_deref()) {
            Ok(path) => {
                println!("Wrote {}", path.display());
                0
            }
            Err(err) => {
                eprintln!("Error: {:#}", err);
                1
            }
        };
    }

    let Some(resource_type) = args.resource_type.as_deref() else {
        eprintln!("No resource type given. Known types:");
        print_resource_types();
        return 2;
    };

    match run(args, resource_type).await {
        Ok(()) => 0,
        Err(err) => {
            tracing::error!("describe failed: {:#}", err);
            eprintln!("Error: {}", format_api_error(&err));
            eprintln!("  {:#}", err);
            1
        }
    }
}

async fn run(args: &Args, resource_type: &str) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };

    // CLI > config file
    if let Some(max) = args.max_concurrency {
        config.collector.max_concurrency = max.max(1);
    }
    if let Some(secs) = args.timeout {
        config.collector.timeout_secs = Some(secs);
    }
    config.collector.ordered |= args.ordered;

    let overrides = ClientOverrides {
        token: args.token.clone(),
        org: args.org.clone(),
    };
    let clients = Clients::from_config(&config, &overrides)?;

    let cancel = CancellationToken::new();
    let collector = Collector::with_cancellation(config.collector.clone(), cancel.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling");
            cancel.cancel();
        }
    });

    let stdout = io::stdout();

    if let Some(id) = &args.get {
        let found = resource::describe_single(resource_type, &clients, &collector, args.scope.as_deref(), id).await?;
        let Some(found) = found else {
            anyhow::bail!("{} {} has nothing to describe", resource_type, id);
        };
        let mut out = stdout.lock();
        serde_json::to_writer_pretty(&mut out, &found)?;
        writeln!(out)?;
        return Ok(());
    }

    if args.stream {
        let mut sink = JsonLinesSink::new(io::stdout());
        resource::describe(
            resource_type,
            &clients,
            &collector,
            args.scope.as_deref(),
            Some(&mut sink as &mut dyn Sink),
        )
        .await?;
        tracing::info!("Streamed {} resources", sink.written());
        return Ok(());
    }

    let resources = resource::describe(resource_type, &clients, &collector, args.scope.as_deref(), None).await?;
    tracing::info!("Collected {} resources", resources.len());

    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, &resources)?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config() -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!("describer-cli-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.json");
        (dir, path)
    }

    #[tokio::test]
    async fn test_missing_resource_type_is_a_usage_error() {
        let args = Args::parse_from(["describer"]);
        assert_eq!(run_cli(&args).await, 2);
    }

    #[tokio::test]
    async fn test_unknown_resource_type_fails() {
        let (dir, path) = temp_config();
        let path_arg = path.to_string_lossy().to_string();

        let args = Args::parse_from(["describer", "--init-config", "--config", &path_arg]);
        assert_eq!(run_cli(&args).await, 0);

        let args = Args::parse_from(["describer", "no-such-type", "--config", &path_arg]);
        assert_eq!(run_cli(&args).await, 1);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_init_config_never_overwrites() {
        let (dir, path) = temp_config();

        let written = init_config(Some(&path)).unwrap();
        assert_eq!(written, path);
        assert!(Config::load_from(&path).is_ok());

        let err = init_config(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("already exists"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_list_types_succeeds() {
        let args = Args::parse_from(["describer", "--list-types"]);
        assert_eq!(run_cli(&args).await, 0);
    }
}
