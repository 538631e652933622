//! HTTP front end: host listing and manual registration.
//!
//! Routes:
//! - `GET  /` - listing page with a registration form
//! - `POST /register` - register `name` at `ip`, then redirect to `/`

use askama::Template;
use axum::{
    extract::{
        rejection::{FormRejection, QueryRejection},
        ConnectInfo, Query, Request, State,
    },
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tracing::{debug, error, info};

use crate::handler::SENTINEL_ADDR;
use crate::metrics::{self, RegistrationSource};
use crate::registry::Registry;

/// Headers set by reverse proxies, checked in order.
const FORWARDING_HEADERS: [&str; 2] = ["x-real-ip", "x-forwarded-for"];

/// Build the router. Serve it with connect info to prefill the form with
/// the caller's address.
pub fn router(registry: Registry) -> Router {
    Router::new()
        .route("/", get(listing))
        .route("/register", post(register))
        .with_state(registry)
}

#[derive(Template)]
#[template(path = "listing.html")]
struct ListingTemplate {
    guess: String,
    rows: Vec<ListingRow>,
}

struct ListingRow {
    name: String,
    ip: String,
    registered: String,
}

/// Fields of the registration form. Missing fields read as empty.
#[derive(Debug, Default, Deserialize)]
pub struct RegistrationForm {
    /// Short hostname to register.
    #[serde(default)]
    pub name: String,
    /// IPv4 address for the host.
    #[serde(default)]
    pub ip: String,
}

impl RegistrationForm {
    /// Fill empty fields from `other`.
    pub fn or(self, other: RegistrationForm) -> RegistrationForm {
        RegistrationForm {
            name: if self.name.is_empty() { other.name } else { self.name },
            ip: if self.ip.is_empty() { other.ip } else { self.ip },
        }
    }

    /// The hostname and address, or one diagnostic line per problem.
    pub fn validate(&self) -> Result<(&str, Ipv4Addr), Vec<String>> {
        let mut problems = Vec::new();

        if self.name.is_empty() {
            problems.push("Missing name".to_string());
        }

        let ip = self.ip.trim();
        let parsed = if ip.is_empty() {
            problems.push("Missing ip".to_string());
            None
        } else {
            match ip.parse::<Ipv4Addr>() {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    problems.push(format!("Bad IP? {ip} ({e})"));
                    None
                }
            }
        };

        match parsed {
            Some(parsed) if problems.is_empty() => Ok((self.name.as_str(), parsed)),
            _ => Err(problems),
        }
    }
}

async fn listing(State(registry): State<Registry>, request: Request) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let guess = guess_remote_ip(request.headers(), peer);
    debug!(%guess, "serving host listing");

    let rows = registry
        .snapshot()
        .into_iter()
        .map(|(name, entry)| ListingRow {
            name,
            ip: entry.ip.to_string(),
            registered: entry.registered.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        })
        .collect();

    match (ListingTemplate { guess, rows }).render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!(error = %e, "failed to render host listing");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to render listing\n").into_response()
        }
    }
}

/// Body fields win over query-string fields. A body or query string that
/// cannot be parsed counts as empty, so it ends in the usual diagnostics.
async fn register(
    State(registry): State<Registry>,
    query: Result<Query<RegistrationForm>, QueryRejection>,
    body: Result<Form<RegistrationForm>, FormRejection>,
) -> Response {
    let query = query.map(|Query(form)| form).unwrap_or_else(|e| {
        debug!(error = %e, "unreadable registration query string");
        RegistrationForm::default()
    });
    let body = body.map(|Form(form)| form).unwrap_or_else(|e| {
        debug!(error = %e, "unreadable registration form body");
        RegistrationForm::default()
    });
    let form = body.or(query);

    match form.validate() {
        Ok((name, ip)) => {
            registry.register(name, ip);
            metrics::record_registration(RegistrationSource::Http);
            info!(host = name, %ip, "registered host over HTTP");
            Redirect::to("/").into_response()
        }
        Err(problems) => {
            debug!(?problems, "rejected HTTP registration");
            let mut body = problems.join("\n");
            body.push('\n');
            (StatusCode::OK, body).into_response()
        }
    }
}

/// Best guess at the caller's address: forwarding headers first, then the
/// connection's peer, then the sentinel.
pub fn guess_remote_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    for header in FORWARDING_HEADERS {
        let first = headers
            .get(header)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty());
        if let Some(addr) = first {
            return addr.to_string();
        }
    }

    let v4 = peer.and_then(|addr| match addr.ip() {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(v6) => v6.to_ipv4_mapped(),
    });
    v4.unwrap_or(SENTINEL_ADDR).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn form(name: &str, ip: &str) -> RegistrationForm {
        RegistrationForm {
            name: name.to_string(),
            ip: ip.to_string(),
        }
    }

    #[test]
    fn test_validate_ok() {
        let form = form("carol", "10.0.0.9");
        assert_eq!(form.validate(), Ok(("carol", Ipv4Addr::new(10, 0, 0, 9))));
    }

    #[test]
    fn test_validate_reports_every_problem() {
        assert_eq!(
            form("", "").validate(),
            Err(vec!["Missing name".to_string(), "Missing ip".to_string()])
        );
        assert_eq!(
            form("", "10.0.0.9").validate(),
            Err(vec!["Missing name".to_string()])
        );
    }

    #[test]
    fn test_validate_bad_ip() {
        let problems = form("carol", "10.0.0.999").validate().unwrap_err();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].starts_with("Bad IP? 10.0.0.999"));

        // Only IPv4 can be served as an A record.
        assert!(form("carol", "fd00::1").validate().is_err());
    }

    #[test]
    fn test_body_fields_win_over_query() {
        let merged = form("carol", "").or(form("dave", "10.0.0.9"));
        assert_eq!(merged.name, "carol");
        assert_eq!(merged.ip, "10.0.0.9");
    }

    #[test]
    fn test_guess_prefers_real_ip_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.2, 10.0.0.3"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.1"));
        let peer = Some("192.168.1.1:5000".parse().unwrap());
        assert_eq!(guess_remote_ip(&headers, peer), "10.0.0.1");
    }

    #[test]
    fn test_guess_takes_first_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.2, 10.0.0.3"));
        assert_eq!(guess_remote_ip(&headers, None), "10.0.0.2");
    }

    #[test]
    fn test_guess_falls_back_to_peer_then_sentinel() {
        let headers = HeaderMap::new();
        assert_eq!(
            guess_remote_ip(&headers, Some("192.168.1.1:5000".parse().unwrap())),
            "192.168.1.1"
        );
        assert_eq!(
            guess_remote_ip(&headers, Some("[fd00::1]:5000".parse().unwrap())),
            "1.2.3.4"
        );
        assert_eq!(guess_remote_ip(&headers, None), "1.2.3.4");
    }
}
