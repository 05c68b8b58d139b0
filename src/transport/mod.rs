pub mod http;
pub mod pool;

pub use http::HttpsAdapter;
pub use pool::{HttpClient, PoolConfig, PoolKey, PoolManager};

use crate::error::AdapterResult;
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Request, Response};
use std::time::Duration;

/// Per-request options passed from the session to the mounted adapter
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Upper bound on the whole exchange, connect through body
    pub timeout: Option<Duration>,
}

/// A pluggable transport governing the connections for one URL prefix.
///
/// The pool configuration is an explicit value: callers read it with
/// [`Transport::pool_config`], derive a new one, and hand it back with
/// [`Transport::set_pool_config`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// (Re)create the pool manager from the given pool arguments.
    fn init_pool(&mut self, config: PoolConfig) -> AdapterResult<()>;

    /// The live pool configuration.
    fn pool_config(&self) -> &PoolConfig;

    /// Replace the live pool configuration.
    fn set_pool_config(&mut self, config: PoolConfig);

    /// Send one request and return the fully buffered response.
    async fn send(
        &mut self,
        request: Request<Full<Bytes>>,
        options: &SendOptions,
    ) -> AdapterResult<Response<Bytes>>;
}
