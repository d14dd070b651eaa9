//! sepd - IEEE 2030.5 Server Daemon
//!
//! Usage:
//!   sepd [OPTIONS] <config.toml>
//!
//! Options:
//!   --fingerprint <fp>  Print the LFDI and SFDI of a certificate fingerprint
//!   --log-json          Emit logs as JSON

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use sep_control::{Clock, SystemClock, TimeSource, TICK_PERIOD};
use sep_core::lfdi_from_fingerprint;
use sepd::{ServerConfig, ServerContext};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Parsed command-line arguments
struct Args {
    /// Server config file (TOML or YAML)
    config_path: Option<String>,
    /// Fingerprint to convert and exit
    fingerprint: Option<String>,
    log_json: bool,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut result = Args {
        config_path: None,
        fingerprint: None,
        log_json: false,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--fingerprint" | "-f" => {
                if i + 1 < args.len() {
                    result.fingerprint = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    eprintln!("Missing argument for --fingerprint");
                    i += 1;
                }
            }
            "--log-json" => {
                result.log_json = true;
                i += 1;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            arg if !arg.starts_with('-') => {
                // Positional argument = config file
                result.config_path = Some(arg.to_string());
                i += 1;
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                i += 1;
            }
        }
    }

    result
}

fn print_help() {
    eprintln!(
        r#"sepd - IEEE 2030.5 Server Daemon

Usage: sepd [OPTIONS] <config.toml>

Options:
  -f, --fingerprint <fp>  Print the LFDI and SFDI of a certificate fingerprint
                          (colon-delimited hex) and exit
      --log-json          Emit logs as JSON
  -h, --help              Print this help message

Examples:
  # Run with a config file
  sepd server.toml

  # Identity of a device certificate
  sepd --fingerprint 3E:4F:45:AB:31:ED:FE:5B:67:E3:43:E5:E4:56:2E:31:98:4E:23:E5
"#
    );
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "sepd=info,sep_control=info,sep_store=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Grace period for each background task after shutdown is signalled
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Wait up to `limit` for a task to finish. Returns `false` and logs a
/// warning when it does not stop cleanly.
async fn await_stopped(name: &str, handle: JoinHandle<()>, limit: Duration) -> bool {
    match tokio::time::timeout(limit, handle).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::warn!(task = name, error = %e, "Task ended abnormally");
            false
        }
        Err(_) => {
            tracing::warn!(task = name, timeout_ms = limit.as_millis() as u64, "Task did not stop in time");
            false
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args();

    if let Some(fingerprint) = &args.fingerprint {
        let lfdi = lfdi_from_fingerprint(fingerprint)?;
        println!("LFDI: {}", lfdi);
        println!("SFDI: {}", lfdi.sfdi());
        return Ok(());
    }

    init_logging(args.log_json);
    tracing::info!("Starting sepd (IEEE 2030.5 Server Daemon)");

    let Some(config_path) = args.config_path else {
        print_help();
        anyhow::bail!("no config file given");
    };

    tracing::info!("Loading config from: {}", config_path);
    let config = ServerConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path))?;
    tracing::info!(
        server = %config.server_hostname(),
        mode = ?config.server_mode,
        devices = config.devices.len(),
        "Config loaded"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let context = ServerContext::from_config(config)?;
    context.initialize(clock.now())?;

    for device in &context.config().devices {
        match context.certs().lfdi(&device.id) {
            Ok(lfdi) => tracing::info!(
                device = %device.id,
                lfdi = %lfdi,
                sfdi = lfdi.sfdi(),
                "Device identity"
            ),
            Err(e) => tracing::error!(device = %device.id, error = %e, "Device identity unavailable"),
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let time_source = TimeSource::new(TICK_PERIOD);
    let scheduler = Arc::new(context.scheduler());

    // Subscribe before the clock starts so the first tick is not missed
    let scheduler_handle = scheduler.spawn(time_source.subscribe(), shutdown_rx.clone());
    let clock_handle = time_source.spawn(clock, shutdown_rx);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");
    if shutdown_tx.send(true).is_err() {
        tracing::warn!("No task was listening for shutdown");
    }

    await_stopped("clock", clock_handle, SHUTDOWN_TIMEOUT).await;
    await_stopped("scheduler", scheduler_handle, SHUTDOWN_TIMEOUT).await;

    tracing::info!("sepd stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_await_stopped_finished_task() {
        let handle = tokio::spawn(async {});
        assert!(await_stopped("done", handle, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_await_stopped_hung_task() {
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        assert!(!await_stopped("hung", handle, Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn test_await_stopped_panicked_task() {
        let handle = tokio::spawn(async { panic!("boom") });
        assert!(!await_stopped("panicked", handle, Duration::from_secs(1)).await);
    }
}
