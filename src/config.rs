//! Configuration types for tinytld.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use crate::error::TldError;
use crate::names::DomainConfig;
use crate::store::HostsFile;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// DNS server configuration.
    #[serde(default)]
    pub dns: DnsConfig,

    /// HTTP front end configuration.
    #[serde(default)]
    pub http: HttpConfig,

    /// Hosts file configuration.
    #[serde(default)]
    pub store: StoreConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// DNS server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Address to listen on (UDP and TCP).
    #[serde(default = "default_listen_addr")]
    pub listen_addr: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_dns_port")]
    pub port: u16,

    /// Top-level domain lookups are served under (e.g., "host").
    #[serde(default = "default_tld")]
    pub tld: String,

    /// Label marking registration queries (e.g., "in" for `<host>.in.host.`).
    #[serde(default = "default_registration_label")]
    pub registration_label: String,

    /// TTL for DNS records in seconds.
    #[serde(default = "default_ttl")]
    pub ttl: u32,
}

impl DnsConfig {
    /// Socket address for both DNS listeners.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_addr, self.port)
    }

    /// The configured domain suffixes.
    pub fn domains(&self) -> Result<DomainConfig, TldError> {
        DomainConfig::new(&self.tld, &self.registration_label)
    }
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            port: default_dns_port(),
            tld: default_tld(),
            registration_label: default_registration_label(),
            ttl: default_ttl(),
        }
    }
}

/// HTTP front end configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Address to listen on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: IpAddr,

    /// Port to listen on; 0 disables the HTTP front end.
    #[serde(default)]
    pub port: u16,
}

impl HttpConfig {
    /// Socket address to serve HTTP on, if enabled.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        (self.port != 0).then(|| SocketAddr::new(self.listen_addr, self.port))
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            port: 0,
        }
    }
}

/// Hosts file configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Hosts file path; empty disables persistence.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl StoreConfig {
    /// The hosts file, if persistence is enabled.
    pub fn hosts_file(&self) -> Option<HostsFile> {
        (!self.path.as_os_str().is_empty()).then(|| HostsFile::new(&self.path))
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "debug", "tinytld=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus metrics exporter address.
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            prometheus_addr: None,
        }
    }
}

fn default_listen_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_dns_port() -> u16 {
    9753
}

fn default_tld() -> String {
    "host".to_string()
}

fn default_registration_label() -> String {
    "in".to_string()
}

fn default_ttl() -> u32 {
    60
}

fn default_store_path() -> PathBuf {
    PathBuf::from("saved.hosts")
}

fn default_log_level() -> String {
    "info".to_string()
}
