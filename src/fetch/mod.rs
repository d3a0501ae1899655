//! Waterfall download orchestration.
//!
//! Consumes the ranked candidate list for one publication and attempts
//! retrieval in order: bounded retries for transient errors only, payload
//! validation before anything is persisted, content-hash dedup across
//! candidates, and stop at the first validated success. Candidates of one
//! publication are strictly sequential; concurrency lives across
//! publications in the discovery pipeline, which calls [`FetchEngine::fetch`]
//! from one task per publication.

pub mod validate;

use crate::client::providers::SourceCandidate;
use crate::client::RateLimiter;
use crate::{Config, Error, ErrorCategory, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Outcome of a single download attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptOutcome {
    Success,
    InvalidContent,
    NetworkError,
    AuthRequired,
    NotFound,
    RateLimited,
}

/// One entry in a publication's attempt log. Created per attempt, appended,
/// never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadAttempt {
    pub url: String,
    pub provider: String,
    pub outcome: AttemptOutcome,
    pub bytes: u64,
    pub elapsed_ms: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Result of running the waterfall for one publication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchOutcome {
    /// Validated artifact path; `None` means every candidate exhausted.
    pub artifact_path: Option<PathBuf>,
    /// SHA-256 of the validated payload.
    pub content_hash: Option<String>,
    /// Full attempt log, preserved on failure for diagnosis and retry.
    pub attempts: Vec<DownloadAttempt>,
    /// True when the artifact came from a prior run without network work.
    pub from_cache: bool,
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        self.artifact_path.is_some()
    }
}

/// The waterfall download engine.
pub struct FetchEngine {
    client: Client,
    rate_limiter: Arc<RateLimiter>,
    max_retries: u32,
    retry_backoff: Duration,
    max_file_size: u64,
    /// Content hash to artifact path, shared across a run so the same
    /// document reached through different URLs is stored once.
    seen_hashes: DashMap<String, PathBuf>,
}

impl FetchEngine {
    pub fn new(config: &Config) -> Result<Self> {
        let client = crate::client::build_http_client(&config.http, None)?;

        Ok(Self {
            client,
            rate_limiter: Arc::new(RateLimiter::new(Duration::from_millis(
                config.rate_limiting.default_interval_ms,
            ))),
            max_retries: config.downloads.max_retries,
            retry_backoff: Duration::from_millis(config.downloads.retry_backoff_ms),
            max_file_size: config.downloads.max_file_size_mb * 1024 * 1024,
            seen_hashes: DashMap::new(),
        })
    }

    /// Share the collector's limiter so collection and download respect the
    /// same per-provider buckets.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = limiter;
        self
    }

    /// Run the waterfall for one publication.
    ///
    /// `candidates` must already be ranked; the engine never reorders them.
    /// The artifact lands in `artifact_dir` under `filename` with a `.pdf`
    /// extension.
    pub async fn fetch(
        &self,
        candidates: &[SourceCandidate],
        filename: &str,
        artifact_dir: &Path,
    ) -> Result<FetchOutcome> {
        let final_path = artifact_dir.join(format!("{filename}.pdf"));

        // A prior run already produced this artifact: skip the network
        // phase entirely.
        if final_path.exists() {
            debug!("Artifact already present, skipping network: {}", final_path.display());
            return Ok(FetchOutcome {
                artifact_path: Some(final_path),
                content_hash: None,
                attempts: Vec::new(),
                from_cache: true,
            });
        }

        tokio::fs::create_dir_all(artifact_dir).await?;

        let mut attempts = Vec::new();
        for candidate in candidates {
            match self.try_candidate(candidate, &mut attempts).await {
                Some(payload) => {
                    let hash = hash_bytes(&payload);

                    // Same document reached via a different URL earlier in
                    // this run: reuse the existing artifact.
                    if let Some(existing) = self.seen_hashes.get(&hash) {
                        info!(
                            "Duplicate content ({}), reusing {}",
                            &hash[..12],
                            existing.display()
                        );
                        return Ok(FetchOutcome {
                            artifact_path: Some(existing.clone()),
                            content_hash: Some(hash),
                            attempts,
                            from_cache: false,
                        });
                    }

                    self.persist(&payload, &final_path).await?;
                    self.seen_hashes.insert(hash.clone(), final_path.clone());
                    info!(
                        "Downloaded {} ({} bytes) from {}",
                        final_path.display(),
                        payload.len(),
                        candidate.provider
                    );
                    return Ok(FetchOutcome {
                        artifact_path: Some(final_path),
                        content_hash: Some(hash),
                        attempts,
                        from_cache: false,
                    });
                }
                None => continue,
            }
        }

        warn!(
            "All {} candidates exhausted for {}",
            candidates.len(),
            filename
        );
        Ok(FetchOutcome {
            artifact_path: None,
            content_hash: None,
            attempts,
            from_cache: false,
        })
    }

    /// Attempt one candidate with bounded retries for transient errors.
    /// Returns the validated payload on success; failures are recorded in
    /// the attempt log and answered with `None` so the caller moves on.
    async fn try_candidate(
        &self,
        candidate: &SourceCandidate,
        attempts: &mut Vec<DownloadAttempt>,
    ) -> Option<Vec<u8>> {
        let mut tries = 0;
        loop {
            let started = Instant::now();
            let result = self.download_once(candidate).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(payload) => {
                    attempts.push(DownloadAttempt {
                        url: candidate.url.clone(),
                        provider: candidate.provider.clone(),
                        outcome: AttemptOutcome::Success,
                        bytes: payload.len() as u64,
                        elapsed_ms,
                        timestamp: Utc::now(),
                        detail: None,
                    });
                    return Some(payload);
                }
                Err(e) => {
                    let category = e.category();
                    attempts.push(DownloadAttempt {
                        url: candidate.url.clone(),
                        provider: candidate.provider.clone(),
                        outcome: outcome_for(category),
                        bytes: 0,
                        elapsed_ms,
                        timestamp: Utc::now(),
                        detail: Some(e.to_string()),
                    });

                    if category == ErrorCategory::RateLimited {
                        // Provider-wide backoff, not just this request.
                        self.rate_limiter
                            .penalize(&candidate.provider, self.retry_backoff * 8)
                            .await;
                    }

                    // Only transient errors are retried, and only within
                    // the bounded budget for this candidate.
                    if category == ErrorCategory::Transient && tries < self.max_retries {
                        tries += 1;
                        debug!(
                            "Transient failure on {} (try {}/{}): {}",
                            candidate.url, tries, self.max_retries, e
                        );
                        tokio::time::sleep(self.retry_backoff * tries).await;
                        continue;
                    }

                    debug!("Abandoning candidate {}: {}", candidate.url, e);
                    return None;
                }
            }
        }
    }

    /// One fetch of one candidate: rate limit, request, status mapping,
    /// bounded streaming read, signature validation.
    async fn download_once(&self, candidate: &SourceCandidate) -> Result<Vec<u8>> {
        self.rate_limiter.acquire(&candidate.provider).await;

        let response = self.client.get(&candidate.url).send().await?;
        let status = response.status();

        match status.as_u16() {
            200..=299 => {}
            401 | 403 => {
                return Err(Error::AuthRequired {
                    url: candidate.url.clone(),
                })
            }
            429 => {
                return Err(Error::RateLimited {
                    provider: candidate.provider.clone(),
                })
            }
            code => {
                return Err(Error::Download {
                    code,
                    message: format!("HTTP {status} from {}", candidate.provider),
                })
            }
        }

        if let Some(length) = response.content_length() {
            if length > self.max_file_size {
                return Err(Error::Download {
                    code: 200,
                    message: format!("declared size {length} exceeds limit"),
                });
            }
        }

        let mut payload = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if payload.len() as u64 + chunk.len() as u64 > self.max_file_size {
                return Err(Error::Download {
                    code: 200,
                    message: "payload exceeds size limit".to_string(),
                });
            }
            payload.extend_from_slice(&chunk);
        }

        validate::validate_pdf(&payload).map_err(|reason| Error::InvalidContent {
            url: candidate.url.clone(),
            reason,
            signature: validate::signature_hex(&payload),
        })?;

        Ok(payload)
    }

    /// Atomic persist: temp file then rename, partial file removed on error.
    async fn persist(&self, payload: &[u8], final_path: &Path) -> Result<()> {
        let temp_path = final_path.with_extension("part");
        let write_result = async {
            let mut file = tokio::fs::File::create(&temp_path).await?;
            file.write_all(payload).await?;
            file.flush().await?;
            tokio::fs::rename(&temp_path, final_path).await?;
            Ok::<(), std::io::Error>(())
        }
        .await;

        if write_result.is_err() {
            let _ = tokio::fs::remove_file(&temp_path).await;
        }
        write_result.map_err(Error::Io)
    }
}

fn outcome_for(category: ErrorCategory) -> AttemptOutcome {
    match category {
        ErrorCategory::Transient => AttemptOutcome::NetworkError,
        ErrorCategory::Permanent => AttemptOutcome::NotFound,
        ErrorCategory::RateLimited => AttemptOutcome::RateLimited,
        ErrorCategory::Auth => AttemptOutcome::AuthRequired,
        ErrorCategory::InvalidContent => AttemptOutcome::InvalidContent,
    }
}

/// SHA-256 of a payload as lowercase hex.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_mapping_covers_taxonomy() {
        assert_eq!(
            outcome_for(ErrorCategory::Transient),
            AttemptOutcome::NetworkError
        );
        assert_eq!(outcome_for(ErrorCategory::Auth), AttemptOutcome::AuthRequired);
        assert_eq!(
            outcome_for(ErrorCategory::InvalidContent),
            AttemptOutcome::InvalidContent
        );
        assert_eq!(
            outcome_for(ErrorCategory::RateLimited),
            AttemptOutcome::RateLimited
        );
        assert_eq!(outcome_for(ErrorCategory::Permanent), AttemptOutcome::NotFound);
    }

    #[test]
    fn test_hash_bytes_is_stable() {
        let a = hash_bytes(b"same payload");
        let b = hash_bytes(b"same payload");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, hash_bytes(b"different payload"));
    }
}
