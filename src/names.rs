//! Domain suffix configuration and query-name classification.
//!
//! Two suffixes are served:
//! - `<host>.<marker>.<tld>` registers `<host>` at the requester's address
//! - `<host>.<tld>` looks `<host>` up
//!
//! The marker is a single label, so the registration suffix always sits
//! exactly one label below the top-level domain.

use std::fmt;

use crate::error::TldError;

/// The pair of suffixes this server is authoritative for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainConfig {
    /// Labels of the top-level domain, root-most last.
    tld: Vec<String>,
    /// Labels of the registration suffix: the marker followed by `tld`.
    registration: Vec<String>,
}

/// How a query name relates to the configured suffixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryClass {
    /// `<host>.<marker>.<tld>`: remember the requester as `host`.
    Registration(String),
    /// `<host>.<tld>`: resolve `host`.
    Lookup(String),
    /// The bare suffixes, or a name outside the top-level domain.
    Neither,
}

impl DomainConfig {
    /// Build from a top-level domain (`host` or `host.`) and a registration
    /// marker label (`in`).
    pub fn new(tld: &str, marker: &str) -> Result<Self, TldError> {
        let tld = split_labels(tld);
        if tld.is_empty() {
            return Err(TldError::InvalidDomain(
                "top-level domain must have at least one label".to_string(),
            ));
        }

        let marker = marker.trim_end_matches('.');
        if marker.is_empty() || marker.contains('.') {
            return Err(TldError::InvalidDomain(format!(
                "registration marker must be a single label, got {marker:?}"
            )));
        }

        let mut registration = Vec::with_capacity(tld.len() + 1);
        registration.push(marker.to_string());
        registration.extend(tld.iter().cloned());

        Ok(Self { tld, registration })
    }

    /// Rebuild from the two fully-qualified suffix strings, as persisted.
    pub fn from_suffixes(tld: &str, registration: &str) -> Result<Self, TldError> {
        let tld_labels = split_labels(tld);
        let registration_labels = split_labels(registration);

        if registration_labels.len() != tld_labels.len() + 1
            || !ends_with(&registration_labels, &tld_labels)
        {
            return Err(TldError::InvalidDomain(format!(
                "{registration:?} is not one label below {tld:?}"
            )));
        }

        Self::new(tld, &registration_labels[0])
    }

    /// Top-level domain, fully qualified (`host.`).
    pub fn top_level_domain(&self) -> String {
        fqdn(&self.tld)
    }

    /// Registration suffix, fully qualified (`in.host.`).
    pub fn registration_suffix(&self) -> String {
        fqdn(&self.registration)
    }

    /// The registration marker label (`in`).
    pub fn marker(&self) -> &str {
        &self.registration[0]
    }

    /// Classify a query name given as labels, root-most last.
    ///
    /// Suffixes match case-insensitively; the extracted host keeps the case
    /// it was queried with.
    pub fn classify<S: AsRef<str>>(&self, labels: &[S]) -> QueryClass {
        if let Some(host) = label_before(labels, &self.registration) {
            return QueryClass::Registration(host);
        }

        // The bare registration suffix is not a lookup for `<marker>`.
        if ends_with(labels, &self.registration) {
            return QueryClass::Neither;
        }

        match label_before(labels, &self.tld) {
            Some(host) => QueryClass::Lookup(host),
            None => QueryClass::Neither,
        }
    }

    /// Classify a dotted name (`alice.in.host.`).
    pub fn classify_name(&self, name: &str) -> QueryClass {
        self.classify(&split_labels(name))
    }
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            tld: vec!["host".to_string()],
            registration: vec!["in".to_string(), "host".to_string()],
        }
    }
}

impl fmt::Display for DomainConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(whatever).{} / (host).{}",
            self.registration_suffix(),
            self.top_level_domain()
        )
    }
}

fn split_labels(name: &str) -> Vec<String> {
    name.split('.')
        .filter(|label| !label.is_empty())
        .map(str::to_string)
        .collect()
}

fn fqdn(labels: &[String]) -> String {
    let mut name = labels.join(".");
    name.push('.');
    name
}

fn ends_with<S: AsRef<str>>(labels: &[S], suffix: &[String]) -> bool {
    labels.len() >= suffix.len()
        && labels[labels.len() - suffix.len()..]
            .iter()
            .zip(suffix)
            .all(|(label, want)| label.as_ref().eq_ignore_ascii_case(want))
}

/// The label immediately preceding `suffix`, if `labels` ends with it and
/// has at least one more label.
fn label_before<S: AsRef<str>>(labels: &[S], suffix: &[String]) -> Option<String> {
    if labels.len() <= suffix.len() || !ends_with(labels, suffix) {
        return None;
    }
    Some(labels[labels.len() - suffix.len() - 1].as_ref().to_string())
}
