use super::{PoolConfig, PoolManager, SendOptions, Transport};
use crate::error::{AdapterError, AdapterResult};
use crate::tls;
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response};
use std::error::Error as StdError;
use tracing::{debug, warn};

/// Base HTTPS transport: one pool manager, no hostname rewriting.
#[derive(Debug, Default)]
pub struct HttpsAdapter {
    pool: PoolManager,
}

impl HttpsAdapter {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            pool: PoolManager::new(config),
        }
    }

    pub fn pool(&self) -> &PoolManager {
        &self.pool
    }
}

#[async_trait]
impl Transport for HttpsAdapter {
    fn init_pool(&mut self, config: PoolConfig) -> AdapterResult<()> {
        debug!("Initializing pool manager: {:?}", config);
        self.pool = PoolManager::new(config);
        Ok(())
    }

    fn pool_config(&self) -> &PoolConfig {
        self.pool.config()
    }

    fn set_pool_config(&mut self, config: PoolConfig) {
        self.pool.set_config(config);
    }

    async fn send(
        &mut self,
        request: Request<Full<Bytes>>,
        options: &SendOptions,
    ) -> AdapterResult<Response<Bytes>> {
        let method = request.method().clone();
        let url = request.uri().to_string();
        let client = self.pool.connection_for(request.uri())?;

        debug!(
            "Sending {} request to {} (server_hostname: {:?}, assert_hostname: {:?})",
            method,
            url,
            self.pool.config().server_hostname,
            self.pool.config().assert_hostname
        );

        // One deadline covers connect, headers and body
        let exchange = async {
            let response = client
                .request(request)
                .await
                .map_err(|e| classify_client_error(&e, &url))?;
            let (parts, body) = response.into_parts();
            let body_bytes = body
                .collect()
                .await
                .map_err(|e| {
                    AdapterError::Http(format!("Failed to read response body from {}: {}", url, e))
                })?
                .to_bytes();
            Ok::<_, AdapterError>((parts, body_bytes))
        };

        let (parts, body_bytes) = match options.timeout {
            Some(timeout) => tokio::time::timeout(timeout, exchange)
                .await
                .map_err(|_| AdapterError::Timeout {
                    url: url.clone(),
                    timeout,
                })??,
            None => exchange.await?,
        };
        let status = parts.status;

        debug!(
            "Received response from {}: {} ({} bytes)",
            url,
            status,
            body_bytes.len()
        );

        Ok(Response::from_parts(parts, body_bytes))
    }
}

/// Map a client failure onto [`AdapterError`], keeping TLS failures distinct.
fn classify_client_error(err: &hyper_util::client::legacy::Error, url: &str) -> AdapterError {
    if let Some(tls_err) = tls::find_rustls_error(err) {
        let message = tls::describe_tls_error(tls_err);
        warn!("TLS handshake with {} failed: {}", url, message);
        return AdapterError::Ssl(message);
    }

    let reason = error_chain(err);
    if err.is_connect() {
        AdapterError::Connection {
            url: url.to_string(),
            reason,
        }
    } else {
        AdapterError::Http(reason)
    }
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
