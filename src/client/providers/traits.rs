//! # Provider Traits Module
//!
//! Core traits and types for full-text source providers. Each provider wraps
//! one external source (PMC, Unpaywall, OpenAlex, CORE, preprint servers,
//! Crossref, an institutional proxy, last-resort mirrors) and turns an
//! identifier set into zero or more candidate URLs.
//!
//! ## Key Components
//!
//! - [`SourceProvider`]: trait every provider implements
//! - [`SourceCandidate`]: a single candidate URL with ranking metadata
//! - [`CollectContext`]: per-call context (timeout, rate limiter, headers)
//! - [`ProviderError`]: provider-boundary errors; these never escape the
//!   collection barrier - the collector degrades them to zero candidates
//!
//! ## Provider Implementation Guide
//!
//! ```no_run
//! use async_trait::async_trait;
//! use litharvest::client::providers::{
//!     CollectContext, ProviderError, SourceCandidate, SourceProvider,
//! };
//! use litharvest::identity::IdentifierSet;
//! use std::time::Duration;
//!
//! struct MyProvider {
//!     client: reqwest::Client,
//! }
//!
//! #[async_trait]
//! impl SourceProvider for MyProvider {
//!     fn name(&self) -> &'static str { "my_provider" }
//!     fn priority(&self) -> u8 { 50 }
//!     fn base_delay(&self) -> Duration { Duration::from_millis(500) }
//!
//!     async fn collect(
//!         &self,
//!         ids: &IdentifierSet,
//!         context: &CollectContext,
//!     ) -> Result<Vec<SourceCandidate>, ProviderError> {
//!         todo!()
//!     }
//! }
//! ```

use crate::classifier::UrlKind;
use crate::client::rate_limiter::RateLimiter;
use crate::identity::IdentifierSet;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// A single candidate URL for one publication's full text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCandidate {
    /// Candidate URL.
    pub url: String,
    /// Provider that produced it.
    pub provider: String,
    /// Declared priority; lower is tried first.
    pub priority: u8,
    /// Classified URL kind. `Unknown` until the classifier runs.
    pub kind: UrlKind,
    /// Classifier confidence in `kind`, 0.0..=1.0.
    pub confidence: f32,
    /// Whether fetching this URL needs credentials (institutional proxy).
    pub requires_auth: bool,
}

impl SourceCandidate {
    pub fn new(url: impl Into<String>, provider: &str, priority: u8) -> Self {
        Self {
            url: url.into(),
            provider: provider.to_string(),
            priority,
            kind: UrlKind::Unknown,
            confidence: 0.0,
            requires_auth: false,
        }
    }

    pub fn with_auth(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    /// Declared priority adjusted by the classified kind's fixed delta.
    /// Candidates are always fully ordered on this before use.
    pub fn effective_priority(&self) -> i32 {
        i32::from(self.priority) + self.kind.priority_delta()
    }
}

/// Context for collection operations.
///
/// Carries the shared rate limiter so adapters never keep module-level
/// timing state; the limiter is the one piece of mutable state shared
/// across concurrent fan-out.
#[derive(Debug, Clone)]
pub struct CollectContext {
    /// Timeout for one provider's whole collect call.
    pub timeout: Duration,
    /// User agent string.
    pub user_agent: String,
    /// Shared per-provider token bucket.
    pub rate_limiter: Arc<RateLimiter>,
    /// Additional headers.
    pub headers: HashMap<String, String>,
}

impl CollectContext {
    pub fn new(timeout: Duration, user_agent: impl Into<String>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            timeout,
            user_agent: user_agent.into(),
            rate_limiter: limiter,
            headers: HashMap::new(),
        }
    }
}

/// Errors that can occur during provider operations
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Provider error: {0}")]
    Other(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Network(_)
                | ProviderError::Timeout
                | ProviderError::RateLimit
                | ProviderError::ServiceUnavailable(_)
        )
    }
}

/// Core trait for full-text source providers.
///
/// Implementors must be thread-safe (`Send + Sync`), map failures to
/// [`ProviderError`] variants rather than panicking, and respect the shared
/// rate limiter in [`CollectContext`] before every outbound request. A
/// provider failure degrades to zero candidates at the collection barrier;
/// it never aborts the pipeline.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Unique lowercase identifier, used for logging, configuration and
    /// rate-limit bucketing ("pmc", "unpaywall", ...).
    fn name(&self) -> &'static str;

    /// Declared priority (0-255, lower = tried first).
    ///
    /// # Priority Guidelines
    /// - 0-19: authenticated/authoritative full-text sources
    /// - 20-49: open-access repositories with direct PDFs
    /// - 50-79: aggregators and metadata-first sources
    /// - 80+: last-resort fallbacks
    fn priority(&self) -> u8 {
        50
    }

    /// Minimum interval between requests to this provider. Feeds the
    /// shared token bucket's refill rate.
    fn base_delay(&self) -> Duration {
        Duration::from_millis(1000)
    }

    /// Human-readable description for logging and the `sources` listing.
    fn description(&self) -> &'static str {
        "Full-text source provider"
    }

    /// Whether candidates from this provider need credentials.
    fn requires_auth(&self) -> bool {
        false
    }

    /// Collect candidate URLs for the given identifier set.
    ///
    /// Returns an empty list when the provider has nothing for these
    /// identifiers; errors are reserved for operational failures. A
    /// provider that knows the record is not open access must filter the
    /// URL here rather than hand it to the classifier.
    async fn collect(
        &self,
        ids: &IdentifierSet,
        context: &CollectContext,
    ) -> Result<Vec<SourceCandidate>, ProviderError>;

    /// Health check for the provider. Rate limiting counts as healthy.
    async fn health_check(&self, context: &CollectContext) -> Result<bool, ProviderError> {
        let ids = IdentifierSet::from_doi("10.1038/nature12373");
        match self.collect(&ids, context).await {
            Ok(_) => Ok(true),
            Err(ProviderError::RateLimit) => Ok(true),
            Err(_) => Ok(false),
        }
    }
}
