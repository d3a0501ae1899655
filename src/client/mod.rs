//! # Client Module
//!
//! Core client infrastructure for full-text discovery. Implements a fan-out
//! architecture that queries multiple scholarly sources in parallel,
//! aggregates their candidate URLs, and handles rate limiting and fault
//! tolerance.
//!
//! ## Architecture
//!
//! - **Collection Layer**: [`CandidateCollector`] fans out across providers
//! - **Provider Layer**: individual source adapters (PMC, Unpaywall, ...)
//! - **Rate-Limit Layer**: one shared token bucket per provider
//!
//! ## Example Usage
//!
//! ```no_run
//! use litharvest::client::{CandidateCollector, CollectorConfig};
//! use litharvest::identity::IdentifierSet;
//! use litharvest::Config;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let collector = CandidateCollector::new(&config)?;
//!
//! let ids = IdentifierSet::from_pmid("33199918");
//! let candidates = collector.collect(&ids).await;
//! println!("Found {} candidate URLs", candidates.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Security Considerations
//!
//! HTTP clients are configured with security defaults: certificate
//! validation, request timeouts, bounded redirects, and connection limits.

pub mod collector;
pub mod providers;
pub mod rate_limiter;

pub use collector::{CandidateCollector, CollectorConfig};
pub use rate_limiter::RateLimiter;

use crate::config::HttpSettings;
use crate::fetch::DownloadAttempt;
use crate::identity::IdentifierSet;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Build a hardened `reqwest` client from the shared HTTP settings.
///
/// Timeouts, bounded redirects, connection pooling and the optional proxy
/// all come from `[http]` configuration, so every component downloads
/// through the same posture. A provider that must present its own identity
/// upstream (Crossref's mailto convention, the mirrors' browser string)
/// passes `user_agent` to override the configured one.
///
/// # Errors
///
/// Returns an error when the proxy URL is invalid or client construction
/// fails.
pub fn build_http_client(http: &HttpSettings, user_agent: Option<&str>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(Duration::from_secs(http.timeout_secs))
        .connect_timeout(Duration::from_secs(http.connect_timeout_secs))
        .redirect(reqwest::redirect::Policy::limited(
            http.max_redirects as usize,
        ))
        .user_agent(user_agent.unwrap_or(&http.user_agent))
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(30));

    if let Some(proxy_url) = &http.proxy {
        let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| crate::Error::InvalidInput {
            field: "http.proxy".to_string(),
            reason: format!("Invalid proxy URL: {e}"),
        })?;
        builder = builder.proxy(proxy);
    }

    builder.build().map_err(crate::Error::Http)
}

/// One publication as it accumulates through the pipeline.
///
/// Created the moment any provider or citation strategy first sees it;
/// enriched (never destroyed) as more sources respond. Uniquely owned by
/// its canonical identifier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Publication {
    /// All known identifier variants.
    pub identifiers: IdentifierSet,
    /// Paper title
    pub title: Option<String>,
    /// Authors
    pub authors: Vec<String>,
    /// Journal or venue name
    pub venue: Option<String>,
    /// Publication year
    pub year: Option<u32>,
    /// Citation count, when a citation-graph provider reported one
    pub citation_count: Option<u64>,
    /// Candidate URLs collected so far
    #[serde(default)]
    pub candidates: Vec<providers::SourceCandidate>,
    /// Attempt log from the download orchestrator
    #[serde(default)]
    pub attempts: Vec<DownloadAttempt>,
    /// Local artifact path after a validated success
    pub artifact_path: Option<PathBuf>,
}

impl Publication {
    #[must_use]
    pub fn new(identifiers: IdentifierSet) -> Self {
        let title = identifiers.title.clone();
        Self {
            identifiers,
            title,
            ..Default::default()
        }
    }

    /// Merge another record for the same canonical identifier into this one.
    /// Existing fields win; lists are appended.
    pub fn enrich(&mut self, other: Publication) {
        self.identifiers.merge(&other.identifiers);
        if self.title.is_none() {
            self.title = other.title;
        }
        if self.authors.is_empty() {
            self.authors = other.authors;
        }
        if self.venue.is_none() {
            self.venue = other.venue;
        }
        if self.year.is_none() {
            self.year = other.year;
        }
        if self.citation_count.is_none() {
            self.citation_count = other.citation_count;
        }
        self.candidates.extend(other.candidates);
        self.attempts.extend(other.attempts);
        if self.artifact_path.is_none() {
            self.artifact_path = other.artifact_path;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_client_from_defaults() {
        let client = build_http_client(&HttpSettings::default(), None);
        assert!(client.is_ok());
    }

    #[test]
    fn test_build_http_client_with_user_agent_override() {
        let client = build_http_client(&HttpSettings::default(), Some("test-agent/1.0"));
        assert!(client.is_ok());
    }

    #[test]
    fn test_build_http_client_proxy_handling() {
        let mut http = HttpSettings::default();
        http.proxy = Some("http://proxy.example.com:8080".to_string());
        assert!(build_http_client(&http, None).is_ok());

        http.proxy = Some(":::invalid:::".to_string());
        assert!(build_http_client(&http, None).is_err());
    }

    #[test]
    fn test_publication_enrich_keeps_existing_fields() {
        let mut a = Publication::new(IdentifierSet::from_pmid("33199918"));
        a.title = Some("Array programming with NumPy".to_string());

        let mut b = Publication::new(IdentifierSet::from_doi("10.1038/s41586-020-2649-2"));
        b.title = Some("A different title from a sloppier source".to_string());
        b.year = Some(2020);

        a.enrich(b);
        assert_eq!(a.title.as_deref(), Some("Array programming with NumPy"));
        assert_eq!(a.year, Some(2020));
        assert!(a.identifiers.doi.is_some());
        assert!(a.identifiers.pmid.is_some());
    }
}
