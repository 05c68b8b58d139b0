use crate::tls::Verification;
use crate::transport::PoolConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub session: SessionConfig,
    /// Adapters mounted on URL prefixes, in addition to the defaults
    #[serde(default)]
    pub mounts: Vec<MountConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional log file; console logging is always on
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub json: bool,
    /// Rotate the log file daily
    #[serde(default)]
    pub rotation: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Per-request timeout in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountConfig {
    /// URL prefix the adapter is mounted on (e.g. "https://93.184.215.14")
    pub prefix: String,
    /// Hostname presented for SNI and checked against the certificate
    #[serde(default)]
    pub hostname: Option<String>,
    /// Require a non-empty hostname
    #[serde(default = "default_true")]
    pub strict: bool,
    /// Verify the server certificate
    #[serde(default = "default_true")]
    pub verify: bool,
    /// PEM bundle of trusted roots; native roots are used when unset
    #[serde(default)]
    pub ca_file: Option<String>,
    #[serde(default = "default_pool_maxsize")]
    pub pool_maxsize: usize,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_pool_maxsize() -> usize {
    10
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_idle_timeout_secs() -> u64 {
    60
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
            json: false,
            rotation: false,
        }
    }
}

impl MountConfig {
    pub fn new(prefix: impl Into<String>, hostname: Option<String>) -> Self {
        Self {
            prefix: prefix.into(),
            hostname,
            strict: true,
            verify: true,
            ca_file: None,
            pool_maxsize: default_pool_maxsize(),
            connect_timeout_secs: default_connect_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }

    pub fn verification(&self) -> Verification {
        match (&self.ca_file, self.verify) {
            (_, false) => Verification::Disabled,
            (Some(path), true) => Verification::CaFile(PathBuf::from(path)),
            (None, true) => Verification::NativeRoots,
        }
    }

    /// Pool arguments for the base adapter of this mount
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_idle_per_host: self.pool_maxsize,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            verification: self.verification(),
            ..PoolConfig::default()
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse config file")?;
        Ok(config)
    }

    /// Load configuration from file or use default
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::from_file(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config file, using defaults: {}", e);
            Self::default()
        })
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.session.timeout_secs.map(Duration::from_secs)
    }

    /// Check the configuration before any adapter is built
    pub fn validate(&self) -> Result<()> {
        if self.session.timeout_secs == Some(0) {
            anyhow::bail!("session.timeout_secs must be greater than zero");
        }

        let mut prefixes = HashSet::new();
        for mount in &self.mounts {
            let prefix = mount.prefix.to_ascii_lowercase();
            if !(prefix.starts_with("https://") || prefix.starts_with("http://")) {
                anyhow::bail!(
                    "Mount prefix '{}' must start with https:// or http://",
                    mount.prefix
                );
            }
            if !prefixes.insert(prefix) {
                anyhow::bail!("Duplicate mount prefix '{}'", mount.prefix);
            }
            if mount.strict && mount.hostname.as_deref().is_none_or(str::is_empty) {
                anyhow::bail!("Mount '{}' is strict but has no hostname", mount.prefix);
            }
            if mount.pool_maxsize == 0 {
                anyhow::bail!("Mount '{}' has pool_maxsize = 0", mount.prefix);
            }
            if let Some(ca_file) = &mount.ca_file {
                if !Path::new(ca_file).exists() {
                    anyhow::bail!(
                        "CA bundle '{}' for mount '{}' does not exist",
                        ca_file,
                        mount.prefix
                    );
                }
            }
        }
        Ok(())
    }
}
