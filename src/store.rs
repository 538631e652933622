//! Hosts file: the on-disk copy of the registry.
//!
//! The file holds three bincode values written back to back: the entry map,
//! the top-level domain and the registration suffix. Each value is decoded on
//! its own so a damaged tail still yields whatever precedes it.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use bincode::Options;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::TldError;
use crate::registry::Registration;

/// Upper bound on a single decoded value, so a damaged length prefix cannot
/// trigger a huge allocation.
const MAX_FIELD_BYTES: u64 = 64 * 1024 * 1024;

/// Fixed-width integers, the same layout as `bincode::serialize`.
fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_limit(MAX_FIELD_BYTES)
}

/// Everything that could be decoded from a hosts file.
#[derive(Debug, Default)]
pub struct StoredHosts {
    /// Registered names, if the map decoded.
    pub entries: Option<BTreeMap<String, Registration>>,
    /// Fully qualified top-level domain, if it decoded.
    pub top_level_domain: Option<String>,
    /// Fully qualified registration suffix, if it decoded.
    pub registration_suffix: Option<String>,
}

/// A hosts file at a fixed path.
#[derive(Debug, Clone)]
pub struct HostsFile {
    path: PathBuf,
}

impl HostsFile {
    /// Use the file at `path`; it need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the hosts file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write all three values.
    ///
    /// The data goes to a sibling temporary file which replaces the hosts
    /// file once flushed. The file is not synced to disk; see
    /// [`HostsFile::save_synced`].
    pub fn save(
        &self,
        entries: &BTreeMap<String, Registration>,
        top_level_domain: &str,
        registration_suffix: &str,
    ) -> Result<(), TldError> {
        self.write(entries, top_level_domain, registration_suffix, false)
    }

    /// Like [`HostsFile::save`], but syncs the temporary file before the
    /// rename.
    pub fn save_synced(
        &self,
        entries: &BTreeMap<String, Registration>,
        top_level_domain: &str,
        registration_suffix: &str,
    ) -> Result<(), TldError> {
        self.write(entries, top_level_domain, registration_suffix, true)
    }

    fn write(
        &self,
        entries: &BTreeMap<String, Registration>,
        top_level_domain: &str,
        registration_suffix: &str,
        sync: bool,
    ) -> Result<(), TldError> {
        let tmp = self.tmp_path();

        let written = (|| -> Result<(), TldError> {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            codec().serialize_into(&mut writer, entries)?;
            codec().serialize_into(&mut writer, top_level_domain)?;
            codec().serialize_into(&mut writer, registration_suffix)?;
            writer.flush()?;
            if sync {
                writer.get_ref().sync_all()?;
            }
            Ok(())
        })();

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), hosts = entries.len(), sync, "saved hosts file");
        Ok(())
    }

    /// Read the hosts file.
    ///
    /// An empty file yields `StoredHosts::default()`. A missing file is an
    /// error. Fields that fail to decode are logged and left as `None`.
    pub fn load(&self) -> Result<StoredHosts, TldError> {
        let file = File::open(&self.path)?;
        if file.metadata()?.len() == 0 {
            debug!(path = %self.path.display(), "hosts file is empty");
            return Ok(StoredHosts::default());
        }

        let mut reader = BufReader::new(file);
        Ok(StoredHosts {
            entries: decode_field(&mut reader, "entries"),
            top_level_domain: decode_field(&mut reader, "top-level domain"),
            registration_suffix: decode_field(&mut reader, "registration suffix"),
        })
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn decode_field<T: DeserializeOwned>(reader: &mut BufReader<File>, field: &str) -> Option<T> {
    match codec().deserialize_from(reader) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(field, error = %e, "failed to decode hosts file field");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::net::Ipv4Addr;
    use tempfile::TempDir;

    fn entries() -> BTreeMap<String, Registration> {
        let mut map = BTreeMap::new();
        map.insert(
            "alice".to_string(),
            Registration {
                ip: Ipv4Addr::new(10, 0, 0, 5),
                registered: Utc::now(),
            },
        );
        map.insert(
            "bob".to_string(),
            Registration {
                ip: Ipv4Addr::new(10, 0, 0, 6),
                registered: Utc::now(),
            },
        );
        map
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let file = HostsFile::new(dir.path().join("saved.hosts"));
        let map = entries();

        file.save(&map, "host.", "in.host.").unwrap();
        let stored = file.load().unwrap();

        assert_eq!(stored.entries.unwrap(), map);
        assert_eq!(stored.top_level_domain.as_deref(), Some("host."));
        assert_eq!(stored.registration_suffix.as_deref(), Some("in.host."));
        assert!(!dir.path().join("saved.hosts.tmp").exists());
    }

    #[test]
    fn test_synced_save_then_load() {
        let dir = TempDir::new().unwrap();
        let file = HostsFile::new(dir.path().join("saved.hosts"));
        let map = entries();

        file.save(&BTreeMap::new(), "host.", "in.host.").unwrap();
        file.save_synced(&map, "lan.", "in.lan.").unwrap();

        let stored = file.load().unwrap();
        assert_eq!(stored.entries.unwrap(), map);
        assert_eq!(stored.top_level_domain.as_deref(), Some("lan."));
        assert!(!dir.path().join("saved.hosts.tmp").exists());
    }

    #[test]
    fn test_save_replaces_longer_file() {
        let dir = TempDir::new().unwrap();
        let file = HostsFile::new(dir.path().join("saved.hosts"));

        file.save(&entries(), "host.", "in.host.").unwrap();
        file.save(&BTreeMap::new(), "lan.", "in.lan.").unwrap();

        let stored = file.load().unwrap();
        assert!(stored.entries.unwrap().is_empty());
        assert_eq!(stored.top_level_domain.as_deref(), Some("lan."));
        assert_eq!(stored.registration_suffix.as_deref(), Some("in.lan."));
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        let file = HostsFile::new(dir.path().join("absent.hosts"));
        assert!(matches!(file.load(), Err(TldError::Io(_))));
    }

    #[test]
    fn test_load_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("saved.hosts");
        File::create(&path).unwrap();

        let stored = HostsFile::new(&path).load().unwrap();
        assert!(stored.entries.is_none());
        assert!(stored.top_level_domain.is_none());
        assert!(stored.registration_suffix.is_none());
    }

    #[test]
    fn test_truncated_tail_keeps_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("saved.hosts");
        let map = entries();

        let mut bytes = codec().serialize(&map).unwrap();
        bytes.extend_from_slice(&[0xff, 0xff]);
        fs::write(&path, bytes).unwrap();

        let stored = HostsFile::new(&path).load().unwrap();
        assert_eq!(stored.entries.unwrap(), map);
        assert!(stored.top_level_domain.is_none());
        assert!(stored.registration_suffix.is_none());
    }

    #[test]
    fn test_garbage_file_decodes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("saved.hosts");
        fs::write(&path, b"not a hosts file").unwrap();

        let stored = HostsFile::new(&path).load().unwrap();
        assert!(stored.entries.is_none());
    }
}
