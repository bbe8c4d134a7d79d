//! OSC ⇄ WebSocket bridge — entry point.
//!
//! Listens for OSC peers over TCP and forwards every message to all connected
//! WebSocket clients as JSON.  JSON messages sent by WebSocket clients are
//! encoded back to OSC and written to a single upstream OSC device.
//!
//! # Usage
//!
//! ```text
//! osc-bridge [OPTIONS]
//!
//! Options:
//!   --config <PATH>                 TOML configuration file
//!   --osc-listen <ADDR>             OSC TCP listen address [default: 0.0.0.0:8000]
//!   --osc-upstream <ADDR>           OSC upstream device [default: 127.0.0.1:8001]
//!   --ws-bind <ADDR>                WebSocket bind address [default: 127.0.0.1:8080]
//!   --ws-path <PATH>                WebSocket endpoint path [default: /osc]
//!   --max-frame-len <BYTES>         Largest accepted OSC frame body [default: 1048576]
//!   --session-queue <N>             Outbound queue depth per session [default: 256]
//!   --session-send-timeout-ms <MS>  Per-frame WebSocket send timeout [default: 5000]
//!   --upstream-retries <N>          Upstream write attempts per message [default: 3]
//!   --upstream-backoff-ms <MS>      First retry delay, doubled each retry [default: 200]
//!   --log-level <FILTER>            tracing filter [default: info]
//! ```
//!
//! # Precedence
//!
//! Built-in defaults < config file < environment variables < CLI flags.
//! `RUST_LOG`, when set, overrides `--log-level`.
//!
//! | Variable                     | Setting                  |
//! |------------------------------|--------------------------|
//! | `OSC_BRIDGE_OSC_LISTEN`      | `osc_listen_addr`        |
//! | `OSC_BRIDGE_OSC_UPSTREAM`    | `osc_upstream_addr`      |
//! | `OSC_BRIDGE_WS_BIND`         | `ws_bind_addr`           |
//! | `OSC_BRIDGE_WS_PATH`         | `ws_path`                |
//! | `OSC_BRIDGE_MAX_FRAME_LEN`   | `max_frame_len`          |
//! | `OSC_BRIDGE_SESSION_QUEUE`   | `session_queue_capacity` |

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use osc_bridge::domain::BridgeConfig;
use osc_bridge::infrastructure::{resolve_addr, run_bridge, FileConfig};

const DEFAULT_LOG_LEVEL: &str = "info";

// ── CLI argument definitions ──────────────────────────────────────────────────

/// OSC-over-TCP to JSON-over-WebSocket bridge.
///
/// Every option is optional; unset options fall back to the config file and
/// then to the built-in defaults.
#[derive(Debug, Default, Parser)]
#[command(
    name = "osc-bridge",
    about = "Bridge between OSC-over-TCP equipment and JSON-over-WebSocket clients",
    version
)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Address OSC peers connect to (`host:port`).
    #[arg(long, value_name = "ADDR", env = "OSC_BRIDGE_OSC_LISTEN")]
    osc_listen: Option<String>,

    /// OSC device that receives messages from WebSocket clients (`host:port`).
    #[arg(long, value_name = "ADDR", env = "OSC_BRIDGE_OSC_UPSTREAM")]
    osc_upstream: Option<String>,

    /// Address the WebSocket server binds to (`host:port`).
    #[arg(long, value_name = "ADDR", env = "OSC_BRIDGE_WS_BIND")]
    ws_bind: Option<String>,

    /// HTTP path WebSocket clients must request.
    #[arg(long, value_name = "PATH", env = "OSC_BRIDGE_WS_PATH")]
    ws_path: Option<String>,

    /// Largest OSC frame body accepted from a peer, in bytes.
    #[arg(long, value_name = "BYTES", env = "OSC_BRIDGE_MAX_FRAME_LEN")]
    max_frame_len: Option<usize>,

    /// Outbound message queue depth per WebSocket session.
    #[arg(long, value_name = "N", env = "OSC_BRIDGE_SESSION_QUEUE")]
    session_queue: Option<usize>,

    /// Per-frame WebSocket send timeout in milliseconds.
    #[arg(long, value_name = "MS")]
    session_send_timeout_ms: Option<u64>,

    /// Upstream write attempts per WebSocket message.
    #[arg(long, value_name = "N")]
    upstream_retries: Option<u32>,

    /// Delay before the first upstream retry in milliseconds.
    #[arg(long, value_name = "MS")]
    upstream_backoff_ms: Option<u64>,

    /// Upstream frame write timeout in milliseconds.
    #[arg(long, value_name = "MS")]
    upstream_write_timeout_ms: Option<u64>,

    /// `tracing` filter directive (e.g. `debug`, `osc_bridge=trace`).
    #[arg(long, value_name = "FILTER")]
    log_level: Option<String>,
}

/// Fully layered settings ready to run.
#[derive(Debug)]
struct Settings {
    bridge: BridgeConfig,
    log_level: String,
}

impl Cli {
    /// Layers defaults, the config file and the CLI/env values.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed, or if an
    /// address does not resolve.
    fn into_settings(self) -> anyhow::Result<Settings> {
        let mut bridge = BridgeConfig::default();
        let mut log_level = None;

        if let Some(path) = &self.config {
            let file = FileConfig::load(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?;
            file.apply_to(&mut bridge)
                .with_context(|| format!("invalid setting in {}", path.display()))?;
            log_level = file.log_level;
        }

        if let Some(v) = &self.osc_listen {
            bridge.osc_listen_addr =
                resolve_addr(v).with_context(|| format!("invalid --osc-listen address '{v}'"))?;
        }
        if let Some(v) = &self.osc_upstream {
            bridge.osc_upstream_addr = resolve_addr(v)
                .with_context(|| format!("invalid --osc-upstream address '{v}'"))?;
        }
        if let Some(v) = &self.ws_bind {
            bridge.ws_bind_addr =
                resolve_addr(v).with_context(|| format!("invalid --ws-bind address '{v}'"))?;
        }
        if let Some(v) = self.ws_path {
            bridge.ws_path = v;
        }
        if let Some(v) = self.max_frame_len {
            bridge.max_frame_len = v;
        }
        if let Some(v) = self.session_queue {
            bridge.session_queue_capacity = v;
        }
        if let Some(ms) = self.session_send_timeout_ms {
            bridge.session_send_timeout = Duration::from_millis(ms);
        }
        if let Some(v) = self.upstream_retries {
            bridge.upstream_retry_attempts = v;
        }
        if let Some(ms) = self.upstream_backoff_ms {
            bridge.upstream_retry_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = self.upstream_write_timeout_ms {
            bridge.upstream_write_timeout = Duration::from_millis(ms);
        }

        bridge.validate().context("invalid configuration")?;

        Ok(Settings {
            bridge,
            log_level: self
                .log_level
                .or(log_level)
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Cli::parse().into_settings()?;

    // `RUST_LOG` wins over `--log-level` and the config file.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))
        .with_context(|| format!("invalid log filter '{}'", settings.log_level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(
        "OSC bridge starting: osc={}, upstream={}, ws=ws://{}{}",
        settings.bridge.osc_listen_addr,
        settings.bridge.osc_upstream_addr,
        settings.bridge.ws_bind_addr,
        settings.bridge.ws_path
    );

    let token = CancellationToken::new();
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                ctrl_c_token.cancel();
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    run_bridge(settings.bridge, token).await?;

    info!("OSC bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_arguments_yields_defaults() {
        // Arrange
        let cli = Cli::parse_from(["osc-bridge"]);

        // Act
        let settings = cli.into_settings().unwrap();

        // Assert
        assert_eq!(settings.bridge.osc_listen_addr.to_string(), "0.0.0.0:8000");
        assert_eq!(settings.bridge.osc_upstream_addr.to_string(), "127.0.0.1:8001");
        assert_eq!(settings.bridge.ws_bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(settings.bridge.ws_path, "/osc");
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn test_cli_overrides_addresses() {
        let cli = Cli::parse_from([
            "osc-bridge",
            "--osc-listen",
            "127.0.0.1:9000",
            "--osc-upstream",
            "192.168.1.50:9001",
            "--ws-bind",
            "0.0.0.0:8081",
        ]);
        let settings = cli.into_settings().unwrap();
        assert_eq!(settings.bridge.osc_listen_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(settings.bridge.osc_upstream_addr.to_string(), "192.168.1.50:9001");
        assert_eq!(settings.bridge.ws_bind_addr.to_string(), "0.0.0.0:8081");
    }

    #[test]
    fn test_cli_overrides_tuning_values() {
        let cli = Cli::parse_from([
            "osc-bridge",
            "--session-queue",
            "8",
            "--session-send-timeout-ms",
            "100",
            "--upstream-retries",
            "5",
            "--upstream-backoff-ms",
            "10",
            "--upstream-write-timeout-ms",
            "2000",
            "--max-frame-len",
            "4096",
        ]);
        let settings = cli.into_settings().unwrap();
        assert_eq!(settings.bridge.session_queue_capacity, 8);
        assert_eq!(settings.bridge.session_send_timeout, Duration::from_millis(100));
        assert_eq!(settings.bridge.upstream_retry_attempts, 5);
        assert_eq!(settings.bridge.upstream_retry_backoff, Duration::from_millis(10));
        assert_eq!(settings.bridge.upstream_write_timeout, Duration::from_secs(2));
        assert_eq!(settings.bridge.max_frame_len, 4096);
    }

    #[test]
    fn test_invalid_address_returns_error() {
        // Arrange: an address with no port cannot be resolved
        let cli = Cli {
            osc_listen: Some("not-an-address".to_string()),
            ..Cli::default()
        };

        // Act
        let result = cli.into_settings();

        // Assert: must return an error, not panic
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_ws_path_fails_validation() {
        let cli = Cli {
            ws_path: Some("osc".to_string()),
            ..Cli::default()
        };
        assert!(cli.into_settings().is_err());
    }

    #[test]
    fn test_zero_session_queue_fails_validation() {
        let cli = Cli::parse_from(["osc-bridge", "--session-queue", "0"]);
        assert!(cli.into_settings().is_err());
    }

    #[test]
    fn test_cli_takes_precedence_over_config_file() {
        // Arrange
        let path = std::env::temp_dir().join(format!(
            "osc-bridge-test-{}.toml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            "ws_path = \"/file\"\nsession_queue_capacity = 32\nlog_level = \"debug\"\n",
        )
        .unwrap();
        let cli = Cli {
            config: Some(path.clone()),
            ws_path: Some("/cli".to_string()),
            ..Cli::default()
        };

        // Act
        let settings = cli.into_settings().unwrap();
        std::fs::remove_file(&path).ok();

        // Assert
        assert_eq!(settings.bridge.ws_path, "/cli");
        assert_eq!(settings.bridge.session_queue_capacity, 32);
        assert_eq!(settings.log_level, "debug");
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let cli = Cli {
            config: Some(PathBuf::from("/nonexistent/osc-bridge.toml")),
            ..Cli::default()
        };
        assert!(cli.into_settings().is_err());
    }

    #[test]
    fn test_log_level_flag_overrides_default() {
        let cli = Cli::parse_from(["osc-bridge", "--log-level", "warn"]);
        assert_eq!(cli.into_settings().unwrap().log_level, "warn");
    }
}
