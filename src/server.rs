//! Server setup and lifecycle management.

use hickory_server::ServerFuture;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::error::TldError;
use crate::handler::RegistrationHandler;
use crate::http;
use crate::registry::Registry;

/// Idle timeout for DNS-over-TCP connections.
const TCP_TIMEOUT: Duration = Duration::from_secs(30);

/// DNS and HTTP front ends over one registry.
pub struct Server {
    config: Config,
    registry: Registry,
}

impl Server {
    /// Create the server and load the hosts file, if one is configured.
    pub fn new(config: Config) -> Result<Self, TldError> {
        let domains = config.dns.domains()?;
        let registry = Registry::with_store(domains, config.store.hosts_file());
        registry.load_from_store();

        Ok(Self { config, registry })
    }

    /// Get a handle to the registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Serve until `shutdown` is cancelled.
    ///
    /// Failing to bind any listener returns an error right away. On the way
    /// out the registry is saved exactly once, before the listeners close.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), TldError> {
        let dns_addr = self.config.dns.socket_addr();
        info!(
            dns_addr = %dns_addr,
            http_addr = ?self.config.http.socket_addr(),
            domains = %self.registry.domains(),
            hosts = self.registry.len(),
            "Starting tinytld"
        );

        let handler = RegistrationHandler::new(self.registry.clone(), self.config.dns.ttl);
        let mut dns = ServerFuture::new(handler);

        // Bind UDP
        let udp_socket = UdpSocket::bind(dns_addr).await?;
        info!(addr = %dns_addr, "DNS UDP listening");
        dns.register_socket(udp_socket);

        // Bind TCP
        let tcp_listener = TcpListener::bind(dns_addr).await?;
        info!(addr = %dns_addr, "DNS TCP listening");
        dns.register_listener(tcp_listener, TCP_TIMEOUT);

        let http_shutdown = shutdown.child_token();
        let mut http_task = match self.config.http.socket_addr() {
            Some(addr) => Some(self.spawn_http(addr, http_shutdown.clone()).await?),
            None => None,
        };

        info!(
            register_at = %self.registry.domains().registration_suffix(),
            "ready to serve queries"
        );

        let outcome = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("shutdown requested");
                Ok(())
            }
            result = dns.block_until_done() => {
                let reason = match result {
                    Ok(()) => "no listeners left".to_string(),
                    Err(e) => e.to_string(),
                };
                error!(%reason, "DNS server stopped");
                Err(TldError::Serve("DNS", reason))
            }
            result = async {
                match http_task.as_mut() {
                    Some(task) => task.await,
                    None => std::future::pending().await,
                }
            } => {
                let reason = match result {
                    Ok(Ok(())) => "stopped".to_string(),
                    Ok(Err(e)) => e.to_string(),
                    Err(e) => e.to_string(),
                };
                error!(%reason, "HTTP server stopped");
                Err(TldError::Serve("HTTP", reason))
            }
        };

        // Already joined.
        if matches!(outcome, Err(TldError::Serve("HTTP", _))) {
            http_task = None;
        }

        // The one final save, while the listeners are still open.
        match self.registry.save_to_store() {
            Ok(()) => info!(hosts = self.registry.len(), "final save complete"),
            Err(e) => error!(error = %e, "final save failed"),
        }

        if let Err(e) = dns.shutdown_gracefully().await {
            error!(error = %e, "DNS server shutdown error");
        }

        http_shutdown.cancel();
        if let Some(task) = http_task {
            match task.await {
                Ok(Err(e)) => error!(error = %e, "HTTP server shutdown error"),
                Err(e) => error!(error = %e, "HTTP server task failed"),
                Ok(Ok(())) => {}
            }
        }

        info!("tinytld stopped");
        outcome
    }

    async fn spawn_http(
        &self,
        addr: SocketAddr,
        shutdown: CancellationToken,
    ) -> Result<JoinHandle<std::io::Result<()>>, TldError> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %addr, "HTTP listening");

        let app = http::router(self.registry.clone())
            .into_make_service_with_connect_info::<SocketAddr>();

        Ok(tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
        }))
    }
}
