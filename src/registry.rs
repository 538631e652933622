//! In-memory registry of self-registered hosts, written through to a hosts
//! file.
//!
//! Every mutation saves the full entry set while still holding the write
//! lock, so saves land on disk in the same order as the mutations that
//! caused them.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::TldError;
use crate::metrics::{self, StoreOp, StoreResult};
use crate::names::DomainConfig;
use crate::store::HostsFile;

/// Where a host was last seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Address handed out for the host.
    pub ip: Ipv4Addr,
    /// Time of the most recent registration.
    pub registered: DateTime<Utc>,
}

/// Thread-safe handle to the host registry.
///
/// Clones share the same entries.
#[derive(Debug, Clone)]
pub struct Registry {
    inner: Arc<RwLock<RegistryInner>>,
}

#[derive(Debug)]
struct RegistryInner {
    /// short hostname -> Registration
    entries: BTreeMap<String, Registration>,

    /// Suffixes currently served, persisted alongside the entries.
    domains: DomainConfig,

    /// None when persistence is disabled.
    store: Option<HostsFile>,
}

impl RegistryInner {
    /// Write-through saves skip the fsync; only the final save pays for it.
    fn save(&self, synced: bool) -> Result<(), TldError> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        let tld = self.domains.top_level_domain();
        let registration = self.domains.registration_suffix();
        let result = if synced {
            store.save_synced(&self.entries, &tld, &registration)
        } else {
            store.save(&self.entries, &tld, &registration)
        };
        metrics::record_store_op(
            StoreOp::Save,
            if result.is_ok() {
                StoreResult::Success
            } else {
                StoreResult::Error
            },
        );
        result
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DomainConfig::default())
    }
}

impl Registry {
    /// Create an empty registry without persistence.
    pub fn new(domains: DomainConfig) -> Self {
        Self::with_store(domains, None)
    }

    /// Create an empty registry persisted to `store`. Nothing is read yet;
    /// call [`Registry::load_from_store`] for that.
    pub fn with_store(domains: DomainConfig, store: Option<HostsFile>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryInner {
                entries: BTreeMap::new(),
                domains,
                store,
            })),
        }
    }

    /// Remember `ip` for `host`, replacing any earlier registration, then
    /// save. A failed save is logged; the new entry stays in memory.
    pub fn register(&self, host: &str, ip: Ipv4Addr) {
        if host.is_empty() {
            warn!(%ip, "ignoring registration with empty hostname");
            return;
        }

        let mut inner = self.inner.write();
        inner.entries.insert(
            host.to_string(),
            Registration {
                ip,
                registered: Utc::now(),
            },
        );
        debug!(host, %ip, hosts = inner.entries.len(), "registered host");
        metrics::record_registry_size(inner.entries.len());

        if let Err(e) = inner.save(false) {
            error!(host, error = %e, "failed to save hosts file after registration");
        }
    }

    /// Address registered for `host`.
    pub fn lookup(&self, host: &str) -> Option<Ipv4Addr> {
        self.inner.read().entries.get(host).map(|entry| entry.ip)
    }

    /// All entries, sorted by hostname.
    pub fn snapshot(&self) -> Vec<(String, Registration)> {
        self.inner
            .read()
            .entries
            .iter()
            .map(|(host, entry)| (host.clone(), entry.clone()))
            .collect()
    }

    /// Suffixes currently served.
    pub fn domains(&self) -> DomainConfig {
        self.inner.read().domains.clone()
    }

    /// Number of registered hosts.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// True if no host is registered.
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// Save the entries and suffixes now, synced to disk.
    pub fn save_to_store(&self) -> Result<(), TldError> {
        // Write lock: saves share one temporary file.
        let inner = self.inner.write();
        inner.save(true)?;
        if let Some(store) = &inner.store {
            info!(path = %store.path().display(), hosts = inner.entries.len(), "saved hosts file");
        }
        Ok(())
    }

    /// Replace the entries, and possibly the suffixes, with the hosts file's
    /// contents.
    ///
    /// Nothing here is fatal: a missing or unreadable file is logged and
    /// leaves the registry as it was, and each stored value is applied only
    /// if it decoded. Stored suffixes take over from the configured ones when
    /// they form a valid pair.
    pub fn load_from_store(&self) {
        let mut inner = self.inner.write();
        let Some(store) = inner.store.clone() else {
            return;
        };

        info!(path = %store.path().display(), "loading hosts file");
        let stored = match store.load() {
            Ok(stored) => stored,
            Err(e) => {
                warn!(path = %store.path().display(), error = %e, "could not load hosts file");
                metrics::record_store_op(StoreOp::Load, StoreResult::Error);
                return;
            }
        };
        metrics::record_store_op(StoreOp::Load, StoreResult::Success);

        if let Some(entries) = stored.entries {
            inner.entries = entries;
        }

        match (stored.top_level_domain, stored.registration_suffix) {
            (Some(tld), Some(registration)) => {
                match DomainConfig::from_suffixes(&tld, &registration) {
                    Ok(domains) => {
                        if domains != inner.domains {
                            warn!(
                                configured_tld = %inner.domains.top_level_domain(),
                                configured_registration = %inner.domains.registration_suffix(),
                                stored_tld = %tld,
                                stored_registration = %registration,
                                "hosts file overrides configured domains"
                            );
                        }
                        inner.domains = domains;
                    }
                    Err(e) => {
                        warn!(error = %e, "ignoring stored domains");
                    }
                }
            }
            (None, None) => {}
            _ => warn!("hosts file holds only one of the two domains, keeping configured ones"),
        }

        metrics::record_registry_size(inner.entries.len());
        info!(
            path = %store.path().display(),
            hosts = inner.entries.len(),
            "loaded hosts file"
        );
    }
}
