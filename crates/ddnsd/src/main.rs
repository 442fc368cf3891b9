// # ddnsd - DDNS Daemon
//
// Thin integration layer around `ddns-core`:
// 1. Parse the command line and initialize logging
// 2. Register the built-in providers
// 3. Load and validate the configuration file
// 4. Run the DNS manager (continuously, or once with `run_once`)
//
// All update logic lives in `ddns-core`.
//
// ## Configuration
//
// - `-c/--config`: config file (JSON or YAML), default `./config.json`;
//   `DDNS_CONFIG` takes precedence when set
// - `-a/--addr`: control panel address when `web_panel.addr` is empty
// - `--log-level` / `DDNS_LOG_LEVEL`: trace, debug, info, warn, error
// - `DDNS_*`: overrides for individual settings, e.g. `DDNS_INTERVAL=60`
//
// ## Example
//
// ```bash
// ddnsd -c /etc/ddns/config.yaml --log-level debug
// ```

mod panel;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use ddns_core::{DnsManager, Error, ProviderRegistry, Settings};
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use crate::panel::WebPanel;

/// How long a stopping manager may take before the process gives up on it.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// - 0: Clean shutdown, or every run-once update succeeded
/// - 1: Configuration error, or a run-once update failed
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DdnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown,
    /// Configuration error or startup failure
    ConfigError,
    /// At least one domain failed in run-once mode
    UpdateFailed,
    /// Runtime error (unexpected failure)
    RuntimeError,
}

impl DdnsExitCode {
    fn code(self) -> u8 {
        match self {
            Self::CleanShutdown => 0,
            Self::ConfigError | Self::UpdateFailed => 1,
            Self::RuntimeError => 2,
        }
    }
}

impl From<DdnsExitCode> for ExitCode {
    fn from(code: DdnsExitCode) -> Self {
        ExitCode::from(code.code())
    }
}

/// Dynamic DNS updater daemon
#[derive(Debug, Parser)]
#[command(name = "ddnsd", version, about)]
struct Args {
    /// Config file (JSON or YAML)
    #[arg(short = 'c', long = "config", default_value = "./config.json")]
    config: PathBuf,

    /// Control panel listen address, used when web_panel.addr is empty
    #[arg(short = 'a', long = "addr", default_value = ":9000")]
    addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log-level", env = "DDNS_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    /// `DDNS_CONFIG` wins over `-c`.
    fn config_path(&self) -> PathBuf {
        match std::env::var("DDNS_CONFIG") {
            Ok(path) if !path.trim().is_empty() => PathBuf::from(path.trim()),
            _ => self.config.clone(),
        }
    }
}

fn parse_log_level(level: &str) -> Option<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let Some(log_level) = parse_log_level(&args.log_level) else {
        eprintln!(
            "Log level '{}' is not valid. Valid levels: trace, debug, info, warn, error",
            args.log_level
        );
        return DdnsExitCode::ConfigError.into();
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DdnsExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DdnsExitCode::RuntimeError.into();
        }
    };

    rt.block_on(run_daemon(args)).into()
}

/// Register every provider compiled into this binary
fn register_providers(registry: &ProviderRegistry) {
    #[cfg(feature = "cloudflare")]
    ddns_provider_cloudflare::register(registry);

    #[cfg(feature = "duckdns")]
    ddns_provider_duckdns::register(registry);

    info!("Registered providers: {}", registry.list_providers().join(", "));
}

fn load_settings(path: &std::path::Path) -> ddns_core::Result<Settings> {
    let settings = Settings::load(path)?;
    settings.validate()?;
    Ok(settings)
}

/// Run the daemon
async fn run_daemon(args: Args) -> DdnsExitCode {
    let config_path = args.config_path();
    info!("Starting ddnsd with config {}", config_path.display());

    let registry = Arc::new(ProviderRegistry::new());
    register_providers(&registry);

    let settings = match load_settings(&config_path) {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load {}: {}", config_path.display(), e);
            return DdnsExitCode::ConfigError;
        }
    };
    let run_once = settings.run_once;

    let manager = match DnsManager::builder(settings, registry)
        .config_path(config_path)
        .control_panel(Arc::new(WebPanel::new(args.addr)))
        .build()
    {
        Ok(manager) => manager,
        Err(e) => {
            error!("Failed to initialize the DNS manager: {}", e);
            return DdnsExitCode::ConfigError;
        }
    };

    if run_once {
        return match manager.run_once().await {
            Ok(()) => {
                info!("All domains updated");
                DdnsExitCode::CleanShutdown
            }
            Err(e) => {
                error!("Run-once failed: {}", e);
                DdnsExitCode::UpdateFailed
            }
        };
    }

    let mut runner = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.run().await })
    };

    let finished = tokio::select! {
        signal = wait_for_shutdown() => {
            match signal {
                Ok(name) => info!("Received shutdown signal: {}", name),
                Err(e) => error!("Signal handling failed, shutting down: {}", e),
            }
            manager.stop();
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut runner).await {
                Ok(result) => result,
                Err(_) => {
                    error!("Shutdown timeout after {:?}", SHUTDOWN_TIMEOUT);
                    runner.abort();
                    return DdnsExitCode::RuntimeError;
                }
            }
        }
        result = &mut runner => result,
    };

    match finished {
        Ok(Ok(())) => {
            info!("Shutting down daemon");
            DdnsExitCode::CleanShutdown
        }
        Ok(Err(e @ Error::Config(_))) => {
            error!("DNS manager failed to start: {}", e);
            DdnsExitCode::ConfigError
        }
        Ok(Err(e)) => {
            error!("DNS manager error: {}", e);
            DdnsExitCode::RuntimeError
        }
        Err(e) => {
            error!("DNS manager task failed: {}", e);
            DdnsExitCode::RuntimeError
        }
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        assert_eq!(DdnsExitCode::CleanShutdown.code(), 0);
        assert_eq!(DdnsExitCode::ConfigError.code(), 1);
        assert_eq!(DdnsExitCode::UpdateFailed.code(), 1);
        assert_eq!(DdnsExitCode::RuntimeError.code(), 2);
    }

    #[test]
    fn log_levels() {
        assert_eq!(parse_log_level("DEBUG"), Some(Level::DEBUG));
        assert_eq!(parse_log_level("verbose"), None);
    }

    #[test]
    fn cli_defaults() {
        let args = Args::parse_from(["ddnsd"]);
        assert_eq!(args.config, PathBuf::from("./config.json"));
        assert_eq!(args.addr, ":9000");
    }

    #[test]
    fn unknown_provider_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"provider": "nowhere", "domains": [{"domain_name": "example.com", "sub_domains": ["www"]}]}"#,
        )
        .unwrap();

        let settings = load_settings(&path).unwrap();
        let registry = Arc::new(ProviderRegistry::new());
        register_providers(&registry);
        assert!(matches!(
            DnsManager::builder(settings, registry).build(),
            Err(Error::Config(_))
        ));
    }
}
