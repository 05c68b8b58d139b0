use crate::adapter::AlternateHostnameAdapter;
use crate::config::AppConfig;
use crate::error::{AdapterError, AdapterResult};
use crate::transport::{HttpsAdapter, SendOptions, Transport};
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Method, Request, Response};
use std::time::Duration;
use tracing::{debug, info};

/// Dispatches requests to transports mounted on URL prefixes.
///
/// The longest matching prefix wins; `https://` and `http://` are mounted
/// with a plain [`HttpsAdapter`] by default.
pub struct Session {
    adapters: Vec<(String, Box<dyn Transport>)>,
    timeout: Option<Duration>,
}

impl Session {
    pub fn new() -> Self {
        let mut session = Self {
            adapters: Vec::new(),
            timeout: None,
        };
        session.mount("https://", HttpsAdapter::default());
        session.mount("http://", HttpsAdapter::default());
        session
    }

    /// Build a session with every mount from the configuration.
    pub fn from_config(config: &AppConfig) -> AdapterResult<Self> {
        let mut session = Self::new();
        session.set_timeout(config.timeout());

        for mount in &config.mounts {
            let base = HttpsAdapter::new(mount.pool_config());
            let adapter = if mount.strict {
                AlternateHostnameAdapter::new(mount.hostname.clone().unwrap_or_default(), base)?
            } else {
                AlternateHostnameAdapter::optional(mount.hostname.clone(), base)?
            };
            info!(
                "Mounted {} with hostname {:?}",
                mount.prefix,
                adapter.hostname()
            );
            session.mount(mount.prefix.clone(), adapter);
        }

        Ok(session)
    }

    /// Register `adapter` for every URL starting with `prefix`.
    /// Re-mounting a prefix replaces its adapter.
    pub fn mount<T: Transport + 'static>(&mut self, prefix: impl Into<String>, adapter: T) {
        let prefix = prefix.into();
        self.adapters.retain(|(existing, _)| *existing != prefix);
        // Before the first shorter prefix, so equal lengths keep mount order
        let position = self
            .adapters
            .iter()
            .position(|(existing, _)| existing.len() < prefix.len())
            .unwrap_or(self.adapters.len());
        debug!("Mounting adapter on {}", prefix);
        self.adapters.insert(position, (prefix, Box::new(adapter)));
    }

    /// Mounted prefixes in dispatch order
    pub fn prefixes(&self) -> Vec<&str> {
        self.adapters.iter().map(|(p, _)| p.as_str()).collect()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// The adapter that would serve `url`.
    pub fn get_adapter(&mut self, url: &str) -> AdapterResult<&mut (dyn Transport + 'static)> {
        let lowered = url.to_lowercase();
        self.adapters
            .iter_mut()
            .find(|(prefix, _)| lowered.starts_with(&prefix.to_lowercase()))
            .map(|(_, adapter)| adapter.as_mut())
            .ok_or_else(|| AdapterError::NoAdapter(url.to_string()))
    }

    pub async fn get(&mut self, url: &str) -> AdapterResult<Response<Bytes>> {
        self.request(Method::GET, url, Bytes::new()).await
    }

    pub async fn request(
        &mut self,
        method: Method,
        url: &str,
        body: Bytes,
    ) -> AdapterResult<Response<Bytes>> {
        let request = Request::builder()
            .method(method)
            .uri(url)
            .body(Full::new(body))
            .map_err(|e| AdapterError::InvalidUrl(format!("{}: {}", url, e)))?;
        self.send(request).await
    }

    /// Send a prepared request through the adapter mounted for its URL.
    pub async fn send(&mut self, request: Request<Full<Bytes>>) -> AdapterResult<Response<Bytes>> {
        let url = request.uri().to_string();
        let options = SendOptions {
            timeout: self.timeout,
        };
        let adapter = self.get_adapter(&url)?;
        adapter.send(request, &options).await
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
