//! shellcache - drive the offline caching engine from the command line.
//!
//! Each invocation plays the host for one event (install, activate, a fetch,
//! a control message) against the on-disk store, so a sequence of commands
//! walks an application through its upgrade cycle.

mod config;
mod host;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use shellcache_core::{
    DiskCacheStorage, Engine, HttpFetcher, Request, RouteOutcome, SignalOutcome,
};

use config::Config;
use host::LoggingHost;

#[derive(Parser, Debug)]
#[command(name = "shellcache", author, version, about)]
struct Cli {
    /// Config file (defaults to the user config directory).
    #[arg(long, global = true, env = "SHELLCACHE_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Root of the on-disk cache store.
    #[arg(long, global = true, env = "SHELLCACHE_CACHE_DIR", value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Also write logs to this file.
    #[arg(long, global = true, env = "SHELLCACHE_LOG_FILE", value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the config file.
    Init {
        #[arg(long, env = "SHELLCACHE_ORIGIN")]
        origin: String,
        /// JSON file mapping resource keys to content hashes.
        #[arg(long, env = "SHELLCACHE_MANIFEST", value_name = "PATH")]
        manifest: PathBuf,
        /// Core resource key; repeat for each. Defaults to the built-in set.
        #[arg(long = "core", value_name = "KEY")]
        core: Vec<String>,
    },
    /// Stage the core set for the current manifest.
    Install,
    /// Promote staging into the live cache.
    Activate,
    /// Install, then activate.
    Upgrade,
    /// Route a single request through the engine.
    Fetch {
        url: String,
        #[arg(long, default_value = "GET")]
        method: String,
    },
    /// Deliver a control message (skipWaiting or downloadOffline).
    Signal { name: String },
    /// Summarize the caches.
    Status,
}

/// Initialize the tracing subscriber. The returned guard flushes the log
/// file and must live until exit.
fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    // RUST_LOG overrides the default level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter);

    let Some(path) = log_file else {
        registry.init();
        return Ok(None);
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Log file path has no file name: {}", path.display()))?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
    registry
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .init();
    Ok(Some(guard))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.cache_dir.clone() {
        config.cache_dir = Some(dir);
    }
    if let Some(file) = cli.log_file.clone() {
        config.log_file = Some(file);
    }

    let _guard = init_tracing(config.log_file.as_deref())?;
    info!(command = ?cli.command, "shellcache starting");

    run(cli.command, config, cli.config.as_deref()).await
}

async fn run(command: Command, mut config: Config, config_path: Option<&Path>) -> Result<()> {
    match command {
        Command::Init {
            origin,
            manifest,
            core,
        } => {
            config.engine.origin = origin;
            config.manifest_path = Some(
                manifest
                    .canonicalize()
                    .with_context(|| format!("Manifest not found: {}", manifest.display()))?,
            );
            if !core.is_empty() {
                config.engine.core = core;
            }
            // Refuse to write a config the engine would reject
            build_engine(&config)?;
            let path = config.save(config_path)?;
            println!("Wrote {}", path.display());
        }
        Command::Install => {
            let staged = build_engine(&config)?.install().await?;
            println!("Staged {} core resources", staged);
        }
        Command::Activate => {
            let report = build_engine(&config)?.activate().await?;
            print_json(&report)?;
        }
        Command::Upgrade => {
            let engine = build_engine(&config)?;
            engine.install().await?;
            print_json(&engine.activate().await?)?;
        }
        Command::Fetch { url, method } => {
            let engine = build_engine(&config)?;
            match engine.handle_request(&Request::new(method, url)).await? {
                RouteOutcome::NotHandled => println!("not handled"),
                RouteOutcome::Handled { response, source } => println!(
                    "{} {} bytes from {}",
                    response.status,
                    response.body.len(),
                    source
                ),
            }
        }
        Command::Signal { name } => match build_engine(&config)?.handle_message(&name).await? {
            SignalOutcome::ActivationRequested => println!("activation requested"),
            SignalOutcome::Filled(report) => {
                print_json(&report)?;
                if !report.is_complete() {
                    anyhow::bail!("{} of {} resources failed to download", report.failed(), report.requested);
                }
            }
        },
        Command::Status => {
            print_json(&build_engine(&config)?.status().await?)?;
        }
    }
    Ok(())
}

fn build_engine(config: &Config) -> Result<Engine> {
    let manifest = config.load_manifest()?;
    let cache_dir = config.cache_dir()?;
    let storage = DiskCacheStorage::new(cache_dir.clone())
        .with_context(|| format!("Failed to open cache store: {}", cache_dir.display()))?;
    let fetcher = HttpFetcher::new(Duration::from_secs(config.engine.request_timeout_secs))?;
    let engine = Engine::new(
        &config.engine,
        manifest,
        Arc::new(storage),
        Arc::new(fetcher),
        Arc::new(LoggingHost),
    )?;
    Ok(engine)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::tempdir;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_init_with_repeated_core() {
        let cli = Cli::try_parse_from([
            "shellcache",
            "init",
            "--origin",
            "https://app.example.com",
            "--manifest",
            "manifest.json",
            "--core",
            "index.html",
            "--core",
            "main.dart.js",
        ])
        .unwrap();
        let Command::Init { origin, core, .. } = cli.command else {
            panic!("expected init");
        };
        assert_eq!(origin, "https://app.example.com");
        assert_eq!(core, vec!["index.html", "main.dart.js"]);
    }

    #[test]
    fn test_parse_fetch_defaults_to_get() {
        let cli = Cli::try_parse_from(["shellcache", "--cache-dir", "/tmp/x", "fetch", "https://a.test/"])
            .unwrap();
        assert_eq!(cli.cache_dir, Some(PathBuf::from("/tmp/x")));
        let Command::Fetch { method, .. } = cli.command else {
            panic!("expected fetch");
        };
        assert_eq!(method, "GET");
    }

    #[test]
    fn test_build_engine_rejects_missing_core_key() {
        let temp = tempdir().unwrap();
        let manifest_path = temp.path().join("manifest.json");
        std::fs::write(&manifest_path, r#"{"/": "a", "index.html": "a"}"#).unwrap();

        let mut config = Config {
            manifest_path: Some(manifest_path),
            cache_dir: Some(temp.path().join("store")),
            ..Config::default()
        };
        assert!(build_engine(&config).is_err());

        config.engine.core = vec!["index.html".to_string()];
        assert!(build_engine(&config).is_ok());
    }

    #[tokio::test]
    async fn test_status_on_fresh_store() {
        let temp = tempdir().unwrap();
        let manifest_path = temp.path().join("manifest.json");
        std::fs::write(&manifest_path, r#"{"/": "a", "index.html": "a"}"#).unwrap();
        let mut config = Config {
            manifest_path: Some(manifest_path),
            cache_dir: Some(temp.path().join("store")),
            ..Config::default()
        };
        config.engine.core = vec!["index.html".to_string()];

        let status = build_engine(&config).unwrap().status().await.unwrap();
        assert_eq!(status.live_entries, 0);
        assert_eq!(status.missing.len(), 2);
    }
}
