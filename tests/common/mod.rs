#![allow(dead_code)]

use alt_sni::tls::Verification;
use alt_sni::transport::PoolConfig;
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use rustls::ServerConfig;
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use std::convert::Infallible;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tracing_subscriber::fmt::MakeWriter;

pub const TEST_HOST: &str = "example.org";

/// Local HTTPS server presenting a self-signed certificate for the given
/// names. Each response body is the SNI name the client sent.
pub struct TestServer {
    pub addr: SocketAddr,
    pub ca_file: NamedTempFile,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(names: &[&str]) -> Self {
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        let certified =
            rcgen::generate_simple_self_signed(names).expect("certificate generation");
        let (cert, key_pair) = (certified.cert, certified.key_pair);

        let mut ca_file = NamedTempFile::new().unwrap();
        ca_file.write_all(cert.pem().as_bytes()).unwrap();
        ca_file.flush().unwrap();

        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));
        let config = ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::aws_lc_rs::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert.der().clone()], key)
        .unwrap();
        let acceptor = TlsAcceptor::from(Arc::new(config));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    let Ok(tls) = acceptor.accept(stream).await else {
                        return;
                    };
                    let sni = tls.get_ref().1.server_name().unwrap_or_default().to_string();
                    let service = service_fn(move |_req: Request<hyper::body::Incoming>| {
                        let sni = sni.clone();
                        async move { Ok::<_, Infallible>(Response::new(Full::new(Bytes::from(sni)))) }
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(tls), service)
                        .await;
                });
            }
        });

        Self {
            addr,
            ca_file,
            handle,
        }
    }

    /// URL addressing the server by IP
    pub fn url(&self) -> String {
        format!("https://{}", self.addr)
    }

    /// Pool arguments trusting this server's certificate
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            verification: Verification::CaFile(self.ca_file.path().to_path_buf()),
            ..PoolConfig::default()
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn get(url: &str) -> Request<Full<Bytes>> {
    Request::get(url).body(Full::new(Bytes::new())).unwrap()
}

pub fn assert_hostname_mismatch(message: &str, hostname: &str) {
    let expected = format!("hostname '{}' doesn't match", hostname);
    assert!(
        message.contains(&expected),
        "expected '{}' in '{}'",
        expected,
        message
    );
}

/// Shared in-memory sink for log output written by a scoped subscriber
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    /// Subscriber that writes plain-text events into this buffer
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + 'static {
        tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .finish()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Second self-signed certificate, unrelated to any [`TestServer`]
pub fn foreign_ca_file() -> NamedTempFile {
    let certified = rcgen::generate_simple_self_signed(vec![TEST_HOST.to_string()])
        .expect("certificate generation");
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(certified.cert.pem().as_bytes()).unwrap();
    file.flush().unwrap();
    file
}
