pub mod adapter;
pub mod config;
pub mod error;
pub mod logging;
pub mod session;
pub mod tls;
pub mod transport;

// Re-export commonly used types for convenience
pub use adapter::{AlternateHostnameAdapter, apply_assert_hostname, apply_server_hostname};
pub use config::{AppConfig, LoggingConfig, MountConfig, SessionConfig};
pub use error::{AdapterError, AdapterResult};
pub use session::Session;
pub use tls::Verification;
pub use transport::{HttpsAdapter, PoolConfig, SendOptions, Transport};
