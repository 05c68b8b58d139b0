use crate::error::{AdapterError, AdapterResult};
use crate::tls::{self, Verification};
use dashmap::DashMap;
use http_body_util::Full;
use hyper::Uri;
use hyper::body::Bytes;
use hyper_rustls::{FixedServerNameResolver, HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default keepalive timeout (60 seconds)
const DEFAULT_KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default connection timeout (10 seconds)
const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Default max idle connections per host
const DEFAULT_MAX_IDLE_CONNECTIONS: usize = 10;

/// HTTP client type with HTTPS support
pub type HttpClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Keyword configuration of a pool manager.
///
/// `server_hostname` is the name sent as SNI; `assert_hostname` is the name
/// the leaf certificate is checked against. When neither is set both come
/// from the request URL.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    pub max_idle_per_host: usize,
    pub idle_timeout: Duration,
    pub connect_timeout: Duration,
    pub keepalive: Duration,
    pub verification: Verification,
    pub server_hostname: Option<String>,
    pub assert_hostname: Option<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: DEFAULT_MAX_IDLE_CONNECTIONS,
            idle_timeout: DEFAULT_KEEPALIVE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECTION_TIMEOUT,
            keepalive: DEFAULT_KEEPALIVE_TIMEOUT,
            verification: Verification::default(),
            server_hostname: None,
            assert_hostname: None,
        }
    }
}

impl PoolConfig {
    /// The name the server certificate will be checked against for `url_host`.
    pub fn verified_hostname<'a>(&'a self, url_host: &'a str) -> &'a str {
        self.assert_hostname
            .as_deref()
            .or(self.server_hostname.as_deref())
            .unwrap_or(url_host)
    }

    /// Whether two configs build identical clients apart from the hostnames,
    /// which are part of the pool key.
    fn same_transport(&self, other: &PoolConfig) -> bool {
        self.max_idle_per_host == other.max_idle_per_host
            && self.idle_timeout == other.idle_timeout
            && self.connect_timeout == other.connect_timeout
            && self.keepalive == other.keepalive
            && self.verification == other.verification
    }
}

/// Identity of a cached client. Requests only share connections when every
/// field matches, so a hostname change never reuses a stale handshake.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub server_hostname: Option<String>,
    pub assert_hostname: Option<String>,
}

/// Pool manager that maintains a separate HTTP client per [`PoolKey`]
pub struct PoolManager {
    config: PoolConfig,
    clients: Arc<DashMap<PoolKey, Arc<HttpClient>>>,
}

impl PoolManager {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            clients: Arc::new(DashMap::new()),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Replace the keyword configuration. Cached clients stay valid unless
    /// something outside the pool key changed.
    pub fn set_config(&mut self, config: PoolConfig) {
        if !self.config.same_transport(&config) {
            debug!("Pool transport settings changed, dropping {} clients", self.clients.len());
            self.clients.clear();
        }
        self.config = config;
    }

    /// Number of cached clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Build the pool key for `uri` under the current configuration.
    pub fn key_for(&self, uri: &Uri) -> AdapterResult<PoolKey> {
        let scheme = uri
            .scheme_str()
            .ok_or_else(|| AdapterError::InvalidUrl(format!("{} (missing scheme)", uri)))?
            .to_ascii_lowercase();
        let host = uri
            .host()
            .ok_or_else(|| AdapterError::InvalidUrl(format!("{} (missing host)", uri)))?
            .to_ascii_lowercase();
        let port = match (uri.port_u16(), scheme.as_str()) {
            (Some(port), _) => port,
            (None, "https") => 443,
            (None, "http") => 80,
            (None, other) => {
                return Err(AdapterError::InvalidUrl(format!(
                    "{} (unsupported scheme '{}')",
                    uri, other
                )));
            }
        };

        Ok(PoolKey {
            scheme,
            host,
            port,
            server_hostname: self.config.server_hostname.clone(),
            assert_hostname: self.config.assert_hostname.clone(),
        })
    }

    /// Get or create the client serving `uri`
    pub fn connection_for(&self, uri: &Uri) -> AdapterResult<Arc<HttpClient>> {
        let key = self.key_for(uri)?;

        // Fast path: check if client already exists
        if let Some(client) = self.clients.get(&key) {
            debug!("Reusing existing HTTP client for {:?}", key);
            return Ok(Arc::clone(client.value()));
        }

        debug!("Creating new HTTP client for {:?}", key);
        let client = Arc::new(self.create_client(&key)?);

        Ok(Arc::clone(
            self.clients
                .entry(key)
                .or_insert_with(|| Arc::clone(&client))
                .value(),
        ))
    }

    fn create_client(&self, key: &PoolKey) -> AdapterResult<HttpClient> {
        let tls_config =
            tls::client_config(&self.config.verification, key.assert_hostname.as_deref())?;

        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false);
        http_connector.set_keepalive(Some(self.config.keepalive));
        http_connector.set_connect_timeout(Some(self.config.connect_timeout));

        let builder = HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http();
        let builder = match key.server_hostname.as_deref() {
            Some(hostname) => builder.with_server_name_resolver(FixedServerNameResolver::new(
                tls::parse_server_name(hostname)?,
            )),
            None => builder,
        };
        let https_connector = builder
            .enable_http1()
            .enable_http2()
            .wrap_connector(http_connector);

        Ok(Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(self.config.max_idle_per_host)
            .pool_idle_timeout(self.config.idle_timeout)
            .build(https_connector))
    }
}

impl Default for PoolManager {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl fmt::Debug for PoolManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolManager")
            .field("config", &self.config)
            .field("clients", &self.clients.len())
            .finish()
    }
}
