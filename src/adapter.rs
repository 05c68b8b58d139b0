//! Transport adapter that connects to one address while presenting another
//! hostname during the TLS handshake.
//!
//! The adapter wraps a base [`Transport`]. Pool initialization is intercepted
//! to inject the override as the SNI name, and every send re-applies it as
//! the certificate hostname assertion, since a pool manager may be created
//! lazily or reconfigured between requests.

use crate::error::{AdapterError, AdapterResult};
use crate::transport::{HttpsAdapter, PoolConfig, SendOptions, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Request, Response};
use tracing::debug;

/// Inject `hostname` as the SNI name of a pool configuration.
///
/// Every other caller-supplied argument is kept as is. A caller-supplied
/// `server_hostname` that differs from the override is rejected.
pub fn apply_server_hostname(
    mut config: PoolConfig,
    hostname: Option<&str>,
) -> AdapterResult<PoolConfig> {
    let Some(hostname) = hostname else {
        return Ok(config);
    };

    match config.server_hostname.as_deref() {
        Some(existing) if existing != hostname => Err(AdapterError::Configuration(format!(
            "server_hostname is already set to '{}', cannot override it with '{}'",
            existing, hostname
        ))),
        _ => {
            config.server_hostname = Some(hostname.to_string());
            Ok(config)
        }
    }
}

/// Set or clear the certificate hostname assertion of a pool configuration.
///
/// With no override a previous assertion is removed, so verification falls
/// back to the name derived from the request URL.
pub fn apply_assert_hostname(mut config: PoolConfig, hostname: Option<&str>) -> PoolConfig {
    match hostname {
        Some(hostname) => config.assert_hostname = Some(hostname.to_string()),
        None => {
            if let Some(previous) = config.assert_hostname.take() {
                debug!("Cleared assert_hostname '{}'", previous);
            }
        }
    }
    config
}

/// Presents `hostname` for SNI and certificate verification on every
/// connection made through the wrapped transport.
#[derive(Debug)]
pub struct AlternateHostnameAdapter<T = HttpsAdapter> {
    hostname: Option<String>,
    /// Pool arguments as supplied by the caller, before the override.
    pool_args: PoolConfig,
    inner: T,
}

impl AlternateHostnameAdapter<HttpsAdapter> {
    /// Strict constructor over a default [`HttpsAdapter`].
    pub fn with_hostname(hostname: impl Into<String>) -> AdapterResult<Self> {
        Self::new(hostname, HttpsAdapter::default())
    }
}

impl<T: Transport> AlternateHostnameAdapter<T> {
    /// Wrap `inner`, failing if `hostname` is empty.
    pub fn new(hostname: impl Into<String>, inner: T) -> AdapterResult<Self> {
        let hostname = hostname.into();
        if hostname.is_empty() {
            return Err(AdapterError::Configuration(
                "Hostname is required".to_string(),
            ));
        }
        Self::build(Some(hostname), inner)
    }

    /// Wrap `inner`; an empty or absent hostname means no override.
    pub fn optional(hostname: Option<String>, inner: T) -> AdapterResult<Self> {
        Self::build(hostname.filter(|h| !h.is_empty()), inner)
    }

    fn build(hostname: Option<String>, inner: T) -> AdapterResult<Self> {
        let pool_args = inner.pool_config().clone();
        let mut adapter = Self {
            hostname,
            pool_args: pool_args.clone(),
            inner,
        };
        adapter.init_pool(pool_args)?;
        Ok(adapter)
    }

    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    /// Replace or clear the override and rebuild the pool from the caller's
    /// original arguments.
    pub fn set_hostname(&mut self, hostname: Option<String>) -> AdapterResult<()> {
        self.hostname = hostname.filter(|h| !h.is_empty());
        let pool_args = self.pool_args.clone();
        self.init_pool(pool_args)
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[async_trait]
impl<T: Transport> Transport for AlternateHostnameAdapter<T> {
    fn init_pool(&mut self, config: PoolConfig) -> AdapterResult<()> {
        let with_override = apply_server_hostname(config.clone(), self.hostname.as_deref())?;
        self.pool_args = config;
        self.inner.init_pool(with_override)
    }

    fn pool_config(&self) -> &PoolConfig {
        self.inner.pool_config()
    }

    fn set_pool_config(&mut self, config: PoolConfig) {
        self.inner.set_pool_config(config);
    }

    async fn send(
        &mut self,
        request: Request<Full<Bytes>>,
        options: &SendOptions,
    ) -> AdapterResult<Response<Bytes>> {
        let config = apply_assert_hostname(
            self.inner.pool_config().clone(),
            self.hostname.as_deref(),
        );
        self.inner.set_pool_config(config);
        self.inner.send(request, options).await
    }
}
