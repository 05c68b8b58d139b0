use alt_sni::adapter::AlternateHostnameAdapter;
use alt_sni::config::AppConfig;
use alt_sni::logging;
use alt_sni::session::Session;
use alt_sni::tls::Verification;
use alt_sni::transport::{HttpsAdapter, PoolConfig};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Fetch a URL while presenting an alternate hostname for SNI and
/// certificate verification
#[derive(Parser, Debug)]
#[command(name = "alt-sni", version)]
struct Cli {
    /// URL to fetch, typically https://<ip address>/
    url: String,

    #[arg(short, long, env = "ALT_SNI_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Hostname presented during the TLS handshake
    #[arg(long)]
    hostname: Option<String>,

    /// PEM bundle of trusted root certificates
    #[arg(long)]
    ca_file: Option<PathBuf>,

    /// Skip certificate verification
    #[arg(short = 'k', long)]
    insecure: bool,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

impl Cli {
    fn verification(&self) -> Verification {
        match (&self.ca_file, self.insecure) {
            (_, true) => Verification::Disabled,
            (Some(path), false) => Verification::CaFile(path.clone()),
            (None, false) => Verification::NativeRoots,
        }
    }

    fn overrides_transport(&self) -> bool {
        self.hostname.is_some() || self.ca_file.is_some() || self.insecure
    }
}

/// `scheme://authority` of a URL, the prefix a command-line adapter is mounted on
fn mount_prefix(url: &str) -> Result<String> {
    let uri: hyper::Uri = url
        .parse()
        .with_context(|| format!("Invalid URL: {}", url))?;
    let scheme = uri
        .scheme_str()
        .with_context(|| format!("URL has no scheme: {}", url))?;
    let authority = uri
        .authority()
        .with_context(|| format!("URL has no host: {}", url))?;
    Ok(format!("{}://{}", scheme, authority))
}

/// Text encoding declared by a `Content-Type` header.
///
/// The `charset` parameter wins; `text/*` without one falls back to
/// ISO-8859-1 and JSON to UTF-8, as HTTP/1.1 clients conventionally do.
fn declared_encoding(content_type: Option<&str>) -> Option<String> {
    let content_type = content_type?;
    let mut parts = content_type.split(';');
    let media_type = parts.next()?.trim().to_ascii_lowercase();

    for param in parts {
        if let Some((key, value)) = param.split_once('=') {
            if key.trim().eq_ignore_ascii_case("charset") {
                let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }

    if media_type.starts_with("text/") {
        Some("ISO-8859-1".to_string())
    } else if media_type == "application/json" {
        Some("utf-8".to_string())
    } else {
        None
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config first (before logging init) to get logging config
    let config = AppConfig::load_or_default(&cli.config);
    config
        .validate()
        .context("Configuration validation failed")?;

    let _guard =
        logging::init_logging(&config.logging).context("Failed to initialize logging system")?;

    let mut session = Session::from_config(&config).context("Failed to build session")?;
    if let Some(timeout) = cli.timeout {
        session.set_timeout(Some(Duration::from_secs(timeout)));
    }

    if cli.overrides_transport() {
        let prefix = mount_prefix(&cli.url)?;
        let base = HttpsAdapter::new(PoolConfig {
            verification: cli.verification(),
            ..PoolConfig::default()
        });
        let adapter = AlternateHostnameAdapter::optional(cli.hostname.clone(), base)
            .context("Failed to create adapter")?;
        info!("Mounted {} with hostname {:?}", prefix, adapter.hostname());
        session.mount(prefix, adapter);
    }

    let response = session
        .get(&cli.url)
        .await
        .with_context(|| format!("Request to {} failed", cli.url))?;

    println!("Status Code: {}", response.status().as_u16());
    println!("Headers Length (Count): {}", response.headers().len());
    println!("Text Length (Bytes): {}", response.body().len());
    let content_type = response
        .headers()
        .get(hyper::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    println!(
        "Encoding: {}",
        declared_encoding(content_type).as_deref().unwrap_or("None")
    );

    Ok(())
}
