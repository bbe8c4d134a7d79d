//! Wires listeners, the upstream, the session registry and the router
//! together, and owns the shutdown sequence.
//!
//! ```text
//!  OSC peers ──TCP──▶ ingest ──▶ BridgeRouter ──▶ SessionRegistry ──▶ WS sessions
//!  OSC upstream ◀──TCP── SharedUpstream ◀── BridgeRouter ◀── WS sessions
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::application::{BridgeRouter, RetryPolicy};
use crate::domain::config::BridgeConfig;
use crate::infrastructure::ingest::run_ingest;
use crate::infrastructure::sessions::SessionRegistry;
use crate::infrastructure::tasks::TaskSet;
use crate::infrastructure::upstream::SharedUpstream;
use crate::infrastructure::ws_server::run_ws_server;

/// How long aborted tasks get to unwind after the drain timeout.
const ABORT_GRACE: Duration = Duration::from_secs(1);

/// A bound but not yet running bridge.
///
/// Binding is separate from running so callers (and tests using port 0) can
/// learn the actual local addresses before traffic starts.
pub struct Bridge {
    config: Arc<BridgeConfig>,
    osc_listener: TcpListener,
    ws_listener: TcpListener,
    sessions: Arc<SessionRegistry>,
    upstream: Arc<SharedUpstream>,
    router: Arc<BridgeRouter>,
}

impl Bridge {
    /// Validates `config`, binds both listeners and tries the upstream once.
    ///
    /// An unreachable upstream is only a warning; it is retried on the first
    /// write.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or either listener
    /// cannot be bound.
    pub async fn bind(config: BridgeConfig) -> anyhow::Result<Self> {
        config.validate().context("invalid bridge configuration")?;

        let osc_listener = TcpListener::bind(config.osc_listen_addr)
            .await
            .with_context(|| format!("failed to bind OSC listener on {}", config.osc_listen_addr))?;
        let ws_listener = TcpListener::bind(config.ws_bind_addr)
            .await
            .with_context(|| format!("failed to bind WebSocket listener on {}", config.ws_bind_addr))?;

        let sessions = Arc::new(SessionRegistry::new());
        let upstream = Arc::new(SharedUpstream::connect(
            config.osc_upstream_addr,
            config.upstream_write_timeout,
        )
        .await);
        let retry = RetryPolicy {
            attempts: config.upstream_retry_attempts,
            backoff: config.upstream_retry_backoff,
        };
        let router = Arc::new(BridgeRouter::new(
            sessions.clone(),
            upstream.clone(),
            retry,
        ));

        Ok(Self {
            config: Arc::new(config),
            osc_listener,
            ws_listener,
            sessions,
            upstream,
            router,
        })
    }

    pub fn osc_local_addr(&self) -> std::io::Result<SocketAddr> {
        self.osc_listener.local_addr()
    }

    pub fn ws_local_addr(&self) -> std::io::Result<SocketAddr> {
        self.ws_listener.local_addr()
    }

    /// The live session registry, e.g. to wait for clients in tests.
    pub fn sessions(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.sessions)
    }

    /// Serves until `token` is cancelled, then shuts down in order:
    /// stop accepting, close every session, wait for tasks (bounded by
    /// `shutdown_timeout`), abort the stragglers, close the upstream.
    pub async fn run(self, token: CancellationToken) -> anyhow::Result<()> {
        let Bridge {
            config,
            osc_listener,
            ws_listener,
            sessions,
            upstream,
            router,
        } = self;

        if let Ok(addr) = osc_listener.local_addr() {
            info!("OSC TCP listening on {addr}");
        }
        if let Ok(addr) = ws_listener.local_addr() {
            info!("WebSocket listening on ws://{addr}{}", config.ws_path);
        }
        info!("OSC upstream at {}", upstream.addr());

        let tasks = TaskSet::new();
        tasks.spawn(run_ingest(
            osc_listener,
            Arc::clone(&router),
            config.max_frame_len,
            tasks.clone(),
            token.clone(),
        ));
        tasks.spawn(run_ws_server(
            ws_listener,
            Arc::clone(&router),
            Arc::clone(&sessions),
            Arc::clone(&config),
            tasks.clone(),
            token.clone(),
        ));

        token.cancelled().await;
        info!("shutting down");

        let closed = sessions.close_all().await;
        info!("closing {closed} WebSocket session(s)");

        tasks.close();
        if tokio::time::timeout(config.shutdown_timeout, tasks.wait())
            .await
            .is_err()
        {
            warn!(
                "{} task(s) still running after {:?}; aborting them",
                tasks.len(),
                config.shutdown_timeout
            );
            tasks.abort_all();
            if tokio::time::timeout(ABORT_GRACE, tasks.wait()).await.is_err() {
                warn!("{} task(s) did not unwind after abort", tasks.len());
            }
        }

        upstream.shutdown().await;
        info!("shutdown complete");
        Ok(())
    }
}

/// Binds and runs a bridge until `token` is cancelled.
pub async fn run_bridge(config: BridgeConfig, token: CancellationToken) -> anyhow::Result<()> {
    Bridge::bind(config).await?.run(token).await
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    async fn dead_addr() -> SocketAddr {
        let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap()
    }

    fn loopback_config(upstream: SocketAddr) -> BridgeConfig {
        BridgeConfig {
            osc_listen_addr: "127.0.0.1:0".parse().unwrap(),
            osc_upstream_addr: upstream,
            ws_bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..BridgeConfig::default()
        }
    }

    #[tokio::test]
    async fn test_bind_reports_local_addresses() {
        // Arrange
        let config = loopback_config(dead_addr().await);

        // Act
        let bridge = Bridge::bind(config).await.unwrap();

        // Assert
        assert_ne!(bridge.osc_local_addr().unwrap().port(), 0);
        assert_ne!(bridge.ws_local_addr().unwrap().port(), 0);
        assert!(bridge.sessions().is_empty().await);
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_config() {
        let config = BridgeConfig {
            ws_path: "osc".to_string(),
            ..loopback_config(dead_addr().await)
        };

        assert!(Bridge::bind(config).await.is_err());
    }

    #[tokio::test]
    async fn test_run_returns_once_token_is_cancelled() {
        // Arrange
        let bridge = Bridge::bind(loopback_config(dead_addr().await)).await.unwrap();
        let token = CancellationToken::new();
        let handle = tokio::spawn(bridge.run(token.clone()));

        // Act
        token.cancel();

        // Assert
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
