//! tinytld - a self-registering authoritative DNS server for a local
//! top-level domain.
//!
//! Hosts announce themselves with an ordinary DNS query under a reserved
//! registration subdomain; the server remembers the query's source address
//! and answers later lookups for that host under the top-level domain.
//!
//! ## Names
//!
//! ```text
//! alice.in.host.   (any type, from 10.0.0.5)
//!   → registry: alice = 10.0.0.5
//!   → additional section: alice.in.host. 60 IN A 10.0.0.5
//!
//! alice.host.      (type A)
//!   → answer section: alice.host. 60 IN A 10.0.0.5
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          tinytld                             │
//! │                                                              │
//! │  UDP/TCP :9753 ──▶ ┌─────────────────────┐                   │
//! │                    │ RegistrationHandler │──┐                │
//! │                    └─────────────────────┘  │  ┌──────────┐  │
//! │                                             ├─▶│ Registry │  │
//! │  HTTP (optional) ─▶ ┌─────────────────────┐ │  └────┬─────┘  │
//! │                     │    axum router      │─┘       │        │
//! │                     └─────────────────────┘         ▼        │
//! │                                              saved.hosts     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use tinytld::{Config, Server};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = Server::new(Config::default()).unwrap();
//!     let shutdown = CancellationToken::new();
//!     server.run(shutdown).await.unwrap();
//! }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod metrics;
pub mod names;
pub mod registry;
pub mod server;
pub mod store;
pub mod telemetry;

// Re-export main types
pub use config::{Config, DnsConfig, HttpConfig, StoreConfig, TelemetryConfig};
pub use error::TldError;
pub use handler::{Peer, PeerAddress, RegistrationHandler, SENTINEL_ADDR};
pub use names::{DomainConfig, QueryClass};
pub use registry::{Registration, Registry};
pub use server::Server;
pub use store::HostsFile;
