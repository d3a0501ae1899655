//! Concurrent candidate collection across all configured providers.
//!
//! The collector is the barrier that partial-failure tolerance hangs on:
//! every provider runs as its own task with its own timeout, a failed
//! or slow provider degrades to zero candidates with a `warn!`, and only
//! after all tasks join does the classifier rank the combined list.

use crate::classifier;
use crate::client::providers::{
    CollectContext, CoreProvider, CrossrefProvider, InstitutionalProvider, MirrorProvider,
    OpenAlexProvider, PreprintProvider, ProviderError, PubMedCentralProvider, SourceCandidate,
    SourceProvider, UnpaywallProvider,
};
use crate::client::rate_limiter::RateLimiter;
use crate::identity::IdentifierSet;
use crate::{Config, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for the collection fan-out.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Timeout for one provider's whole collect call.
    pub provider_timeout: Duration,
    /// User agent for provider requests.
    pub user_agent: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            provider_timeout: Duration::from_secs(30),
            user_agent: "litharvest/0.3.0 (Dataset Literature Tool)".to_string(),
        }
    }
}

/// Fan-out client over every configured [`SourceProvider`].
pub struct CandidateCollector {
    providers: Vec<Arc<dyn SourceProvider>>,
    context: CollectContext,
}

impl CandidateCollector {
    /// Build the full provider roster from configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let collector_config = CollectorConfig {
            provider_timeout: Duration::from_secs(config.providers.provider_timeout_secs),
            user_agent: config.http.user_agent.clone(),
        };

        let mut providers: Vec<Arc<dyn SourceProvider>> = Vec::new();

        if let Some(proxy_url) = &config.providers.institutional_proxy_url {
            match InstitutionalProvider::new(proxy_url.clone()) {
                Ok(p) => providers.push(Arc::new(p)),
                Err(e) => warn!("Skipping institutional provider: {}", e),
            }
        }

        let http = &config.http;
        providers.push(Arc::new(
            PubMedCentralProvider::new(http).map_err(provider_init)?,
        ));
        providers.push(Arc::new(
            UnpaywallProvider::new(http, config.providers.unpaywall_email.clone())
                .map_err(provider_init)?,
        ));
        providers.push(Arc::new(
            PreprintProvider::biorxiv(http).map_err(provider_init)?,
        ));
        providers.push(Arc::new(
            PreprintProvider::medrxiv(http).map_err(provider_init)?,
        ));
        providers.push(Arc::new(OpenAlexProvider::new(http).map_err(provider_init)?));
        providers.push(Arc::new(
            CoreProvider::new(http, config.providers.core_api_key.clone())
                .map_err(provider_init)?,
        ));
        providers.push(Arc::new(CrossrefProvider::new(http).map_err(provider_init)?));

        if !config.providers.mirror_primary_hosts.is_empty() {
            providers.push(Arc::new(
                MirrorProvider::primary(http, config.providers.mirror_primary_hosts.clone())
                    .map_err(provider_init)?,
            ));
        }
        if !config.providers.mirror_secondary_hosts.is_empty() {
            providers.push(Arc::new(
                MirrorProvider::secondary(http, config.providers.mirror_secondary_hosts.clone())
                    .map_err(provider_init)?,
            ));
        }

        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(
            config.rate_limiting.default_interval_ms,
        )));
        let context = CollectContext::new(
            collector_config.provider_timeout,
            collector_config.user_agent.clone(),
            limiter,
        );

        Ok(Self { providers, context })
    }

    /// Register every provider's interval with the shared limiter, letting
    /// config override the provider's declared base delay.
    pub async fn register_rate_limits(&self, overrides: &HashMap<String, u64>) {
        for provider in &self.providers {
            let interval = overrides
                .get(provider.name())
                .map(|ms| Duration::from_millis(*ms))
                .unwrap_or_else(|| provider.base_delay());
            self.context
                .rate_limiter
                .register(provider.name(), interval)
                .await;
        }
    }

    /// Test seam: build a collector over an explicit provider list.
    pub fn with_providers(
        providers: Vec<Arc<dyn SourceProvider>>,
        config: CollectorConfig,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(1)));
        let context =
            CollectContext::new(config.provider_timeout, config.user_agent.clone(), limiter);
        Self { providers, context }
    }

    /// Shared limiter, for wiring the download engine onto the same
    /// per-provider buckets.
    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.context.rate_limiter)
    }

    /// Collection context, shared with the citation strategies.
    pub fn collect_context(&self) -> &CollectContext {
        &self.context
    }

    /// Query every provider concurrently and return the ranked candidate
    /// list. Never fails: provider errors and timeouts degrade to zero
    /// candidates from that provider.
    pub async fn collect(&self, ids: &IdentifierSet) -> Vec<SourceCandidate> {
        let key = ids.canonical_key();
        info!(
            "Collecting candidates for {} across {} providers",
            key,
            self.providers.len()
        );

        let tasks = self.providers.iter().map(|provider| {
            let provider = Arc::clone(provider);
            let context = self.context.clone();
            let ids = ids.clone();
            async move {
                let name = provider.name();
                let outcome =
                    tokio::time::timeout(context.timeout, provider.collect(&ids, &context)).await;
                match outcome {
                    Ok(Ok(candidates)) => {
                        debug!("Provider {} returned {} candidates", name, candidates.len());
                        candidates
                    }
                    Ok(Err(ProviderError::RateLimit)) => {
                        context
                            .rate_limiter
                            .penalize(name, provider.base_delay() * 4)
                            .await;
                        warn!("Provider {} rate limited, degrading to zero candidates", name);
                        Vec::new()
                    }
                    Ok(Err(e)) => {
                        warn!("Provider {} failed: {}, degrading to zero candidates", name, e);
                        Vec::new()
                    }
                    Err(_) => {
                        warn!("Provider {} timed out after {:?}", name, context.timeout);
                        Vec::new()
                    }
                }
            }
        });

        let results = futures::future::join_all(tasks).await;

        // Cross-provider URL dedup before ranking; the first provider to
        // report a URL keeps it, preserving discovery order.
        let mut seen = HashSet::new();
        let mut combined = Vec::new();
        for candidate in results.into_iter().flatten() {
            if seen.insert(candidate.url.clone()) {
                combined.push(candidate);
            }
        }

        let ranked = classifier::rank(combined);
        info!("Collected {} distinct candidates for {}", ranked.len(), key);
        ranked
    }

    /// Health-check every provider concurrently.
    pub async fn health_check(&self) -> HashMap<String, bool> {
        let tasks = self.providers.iter().map(|provider| {
            let provider = Arc::clone(provider);
            let context = self.context.clone();
            async move {
                let healthy = provider
                    .health_check(&context)
                    .await
                    .unwrap_or(false);
                (provider.name().to_string(), healthy)
            }
        });
        futures::future::join_all(tasks).await.into_iter().collect()
    }

    /// Provider roster for the `sources` listing.
    pub fn provider_info(&self) -> Vec<(&'static str, &'static str, u8)> {
        self.providers
            .iter()
            .map(|p| (p.name(), p.description(), p.priority()))
            .collect()
    }
}

fn provider_init(e: ProviderError) -> crate::Error {
    crate::Error::Service(format!("Failed to initialize provider: {e}"))
}
