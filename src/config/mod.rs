//! Layered configuration.
//!
//! Precedence, lowest to highest: built-in defaults, TOML config file,
//! `LITHARVEST_`-prefixed environment variables, CLI overrides. Every field
//! carries a serde default so partial files and partial environments are
//! fine.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Environment profile (development, production)
    pub profile: String,
    pub http: HttpSettings,
    pub providers: ProviderSettings,
    pub rate_limiting: RateLimitSettings,
    pub downloads: DownloadSettings,
    pub cache: CacheSettings,
    pub citations: CitationSettings,
    pub logging: LoggingSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile: "development".to_string(),
            http: HttpSettings::default(),
            providers: ProviderSettings::default(),
            rate_limiting: RateLimitSettings::default(),
            downloads: DownloadSettings::default(),
            cache: CacheSettings::default(),
            citations: CitationSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub max_redirects: u32,
    pub user_agent: String,
    pub proxy: Option<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
            max_redirects: 10,
            user_agent: "litharvest/0.3.0 (Dataset Literature Tool)".to_string(),
            proxy: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Contact email required by the Unpaywall API terms.
    pub unpaywall_email: String,
    /// Optional CORE API key; anonymous access works at a reduced rate.
    pub core_api_key: Option<String>,
    /// EZproxy-style institutional gateway; provider disabled when unset.
    pub institutional_proxy_url: Option<String>,
    pub mirror_primary_hosts: Vec<String>,
    pub mirror_secondary_hosts: Vec<String>,
    /// Per-provider collect timeout.
    pub provider_timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            unpaywall_email: "litharvest@example.org".to_string(),
            core_api_key: None,
            institutional_proxy_url: None,
            mirror_primary_hosts: vec![
                "https://sci-hub.se".to_string(),
                "https://sci-hub.st".to_string(),
                "https://sci-hub.ru".to_string(),
            ],
            mirror_secondary_hosts: vec![
                "https://sci-hub.ren".to_string(),
                "https://sci-hub.ee".to_string(),
            ],
            provider_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Fallback minimum inter-request interval.
    pub default_interval_ms: u64,
    /// Per-provider overrides of the provider's declared base delay.
    pub per_provider_ms: HashMap<String, u64>,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            default_interval_ms: 1000,
            per_provider_ms: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    /// Root directory for discovery runs and artifacts.
    pub directory: PathBuf,
    pub max_file_size_mb: u64,
    /// Bounded retries for transient errors within one candidate.
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Concurrency across publications (never across candidates).
    pub max_concurrent: usize,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        let directory = dirs::download_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("litharvest");
        Self {
            directory,
            max_file_size_mb: 100,
            max_retries: 2,
            retry_backoff_ms: 500,
            max_concurrent: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Warm-tier directory; defaults next to the platform cache dir.
    pub directory: Option<PathBuf>,
    /// Hot tier TTL, short (days).
    pub hot_ttl_secs: u64,
    /// Warm tier TTL, long (months).
    pub warm_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            directory: None,
            hot_ttl_secs: 60 * 60 * 24 * 3,
            warm_ttl_secs: 60 * 60 * 24 * 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CitationSettings {
    /// Cap on merged citing publications per discovery run.
    pub max_results: usize,
}

impl Default for CitationSettings {
    fn default() -> Self {
        Self { max_results: 200 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// CLI-sourced overrides, the highest-precedence layer.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub profile: Option<String>,
    pub download_directory: Option<PathBuf>,
    pub cache_directory: Option<PathBuf>,
}

/// Environment layer, flat keys under the `LITHARVEST_` prefix
/// (e.g. `LITHARVEST_UNPAYWALL_EMAIL`, `LITHARVEST_LOG_LEVEL`).
#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    log_level: Option<String>,
    profile: Option<String>,
    download_dir: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    unpaywall_email: Option<String>,
    core_api_key: Option<String>,
    institutional_proxy_url: Option<String>,
}

impl Config {
    /// Load configuration with full layering precedence.
    pub fn load_with_overrides(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let file = match path {
            Some(explicit) => {
                if !explicit.exists() {
                    return Err(Error::Config(format!(
                        "Config file not found: {}",
                        explicit.display()
                    )));
                }
                Some(explicit.to_path_buf())
            }
            None => Self::default_config_path().filter(|p| p.exists()),
        };

        let mut builder = config::Config::builder();
        if let Some(file) = &file {
            info!("Loading config from: {}", file.display());
            builder = builder.add_source(config::File::from(file.clone()));
        }

        let mut cfg: Config = if file.is_some() {
            builder.build()?.try_deserialize()?
        } else {
            Config::default()
        };

        cfg.apply_env()?;
        cfg.apply_overrides(overrides);
        cfg.validate()?;
        Ok(cfg)
    }

    fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("litharvest").join("config.toml"))
    }

    fn apply_env(&mut self) -> Result<()> {
        let env: EnvOverrides = envy::prefixed("LITHARVEST_")
            .from_env()
            .map_err(|e| Error::Config(format!("Invalid environment variable: {e}")))?;

        if let Some(level) = env.log_level {
            self.logging.level = level;
        }
        if let Some(profile) = env.profile {
            self.profile = profile;
        }
        if let Some(dir) = env.download_dir {
            self.downloads.directory = dir;
        }
        if let Some(dir) = env.cache_dir {
            self.cache.directory = Some(dir);
        }
        if let Some(email) = env.unpaywall_email {
            self.providers.unpaywall_email = email;
        }
        if let Some(key) = env.core_api_key {
            self.providers.core_api_key = Some(key);
        }
        if let Some(proxy) = env.institutional_proxy_url {
            self.providers.institutional_proxy_url = Some(proxy);
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(level) = &overrides.log_level {
            self.logging.level = level.clone();
        }
        if let Some(profile) = &overrides.profile {
            self.profile = profile.clone();
        }
        if let Some(dir) = &overrides.download_directory {
            self.downloads.directory = dir.clone();
        }
        if let Some(dir) = &overrides.cache_directory {
            self.cache.directory = Some(dir.clone());
        }
    }

    /// Validate cross-field constraints after all layers are applied.
    pub fn validate(&self) -> Result<()> {
        if !self.providers.unpaywall_email.contains('@') {
            return Err(Error::Config(
                "providers.unpaywall_email must be a valid email address".to_string(),
            ));
        }
        if self.downloads.max_file_size_mb == 0 {
            return Err(Error::Config(
                "downloads.max_file_size_mb must be positive".to_string(),
            ));
        }
        if self.downloads.max_concurrent == 0 {
            return Err(Error::Config(
                "downloads.max_concurrent must be positive".to_string(),
            ));
        }
        if self.cache.hot_ttl_secs > self.cache.warm_ttl_secs {
            return Err(Error::Config(
                "cache.hot_ttl_secs must not exceed cache.warm_ttl_secs".to_string(),
            ));
        }
        if let Some(proxy) = &self.providers.institutional_proxy_url {
            if !proxy.starts_with("http") {
                return Err(Error::Config(
                    "providers.institutional_proxy_url must be an absolute URL".to_string(),
                ));
            }
        }
        debug!("Configuration validated");
        Ok(())
    }

    /// Clone with secrets redacted for logging.
    #[must_use]
    pub fn safe_for_logging(&self) -> Self {
        let mut safe = self.clone();
        if safe.providers.core_api_key.is_some() {
            safe.providers.core_api_key = Some("***redacted***".to_string());
        }
        safe
    }

    /// Warm cache directory with its platform default applied.
    #[must_use]
    pub fn cache_directory(&self) -> PathBuf {
        self.cache.directory.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("litharvest")
        })
    }
}
