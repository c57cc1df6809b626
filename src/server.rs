//! Listener, accept loop, and shutdown coordination (spec §4.H).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::connection;
use crate::error::{Result, ServerError};
use crate::registry::Registry;
use crate::utils::bind_tcp_listener;

/// How long `Server::run` waits for in-flight connection handlers to drain
/// after a shutdown is requested before force-aborting them (spec §4.H,
/// §6.3: "suggested 5 s").
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

/// How often the optional status reporter logs (spec §4.H, SPEC_FULL
/// §10.5: "every 30 s").
const STATUS_REPORT_INTERVAL: Duration = Duration::from_secs(30);

pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    registry: Arc<Registry>,
    status_reporting: bool,
}

impl Server {
    /// Bind the configured host/port. Uses [`bind_tcp_listener`] rather
    /// than `tokio::net::TcpListener::bind` directly so an IPv6 `host`
    /// gets an explicit `IPV6_V6ONLY` socket option instead of whatever
    /// the platform defaults to.
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|_| ServerError::InvalidAddress(config.host.clone()))?;

        let std_listener =
            bind_tcp_listener(addr).map_err(|source| ServerError::Bind { addr, source })?;
        let listener = TcpListener::from_std(std_listener)?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
            registry: Registry::new(),
            status_reporting: config.status_reporting,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Accept connections until `shutdown` fires, then drain.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let Server { listener, local_addr, registry, status_reporting } = self;
        info!(%local_addr, "timecode-sync listening");

        if status_reporting {
            spawn_status_reporter(registry.clone(), shutdown.clone());
        }

        let handlers: Arc<Mutex<Vec<JoinHandle<()>>>> = Arc::new(Mutex::new(Vec::new()));

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("shutdown requested, closing listener");
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let registry = registry.clone();
                            let handle = tokio::spawn(async move {
                                connection::handle_connection(stream, peer, registry).await;
                            });
                            let mut handlers = handlers.lock().await;
                            handlers.retain(|h| !h.is_finished());
                            handlers.push(handle);
                        }
                        Err(err) => {
                            warn!(%err, "accept failed");
                        }
                    }
                }
            }
        }

        registry.shutdown().await;

        let mut pending: Vec<JoinHandle<()>> = std::mem::take(&mut *handlers.lock().await);
        if tokio::time::timeout(SHUTDOWN_DEADLINE, futures::future::join_all(pending.iter_mut()))
            .await
            .is_err()
        {
            warn!("connection handlers did not finish within the shutdown deadline; aborting stragglers");
        }
        for handle in &pending {
            if !handle.is_finished() {
                handle.abort();
            }
        }

        info!("server shutdown complete");
        Ok(())
    }
}

fn spawn_status_reporter(registry: Arc<Registry>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(STATUS_REPORT_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let sessions = registry.session_snapshots().await;
                    let clients = registry.client_count().await;
                    info!(
                        session_count = sessions.len(),
                        client_count = clients,
                        "status report"
                    );
                    for snapshot in &sessions {
                        let id_prefix: String = snapshot.id.chars().take(8).collect();
                        info!(
                            session_id_prefix = %id_prefix,
                            framerate = snapshot.framerate_key,
                            running = snapshot.running,
                            timecode = %snapshot.current_timecode,
                            "session status"
                        );
                    }
                }
            }
        }
    });
}
