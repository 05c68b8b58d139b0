use crate::error::{AdapterError, AdapterResult, ToAdapterError};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::{
    WebPkiServerVerifier, verify_server_cert_signed_by_trust_anchor, verify_server_name,
};
use rustls::crypto::{
    CryptoProvider, WebPkiSupportedAlgorithms, verify_tls12_signature, verify_tls13_signature,
};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::server::ParsedCertificate;
use rustls::{
    CertificateError, ClientConfig, DigitallySignedStruct, OtherError, RootCertStore,
    SignatureScheme,
};
use std::error::Error as StdError;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// How the server certificate chain is validated.
#[derive(Debug, Clone, Default)]
pub enum Verification {
    /// Trust the platform's native root store
    #[default]
    NativeRoots,
    /// Trust the certificates in a PEM bundle on disk
    CaFile(PathBuf),
    /// Trust an in-memory root store
    Roots(Arc<RootCertStore>),
    /// Accept any certificate chain and any name
    Disabled,
}

impl Verification {
    pub fn is_disabled(&self) -> bool {
        matches!(self, Verification::Disabled)
    }
}

impl PartialEq for Verification {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Verification::NativeRoots, Verification::NativeRoots) => true,
            (Verification::CaFile(a), Verification::CaFile(b)) => a == b,
            (Verification::Roots(a), Verification::Roots(b)) => Arc::ptr_eq(a, b),
            (Verification::Disabled, Verification::Disabled) => true,
            _ => false,
        }
    }
}

/// Raised by the certificate verifier when the leaf certificate is not valid
/// for the asserted hostname.
#[derive(Error, Debug)]
#[error("hostname '{hostname}' doesn't match the server certificate")]
pub struct HostnameMismatch {
    pub hostname: String,
}

/// Crypto provider shared by every client config this crate builds.
pub fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::aws_lc_rs::default_provider())
}

/// Load every certificate from a PEM bundle into a root store.
pub fn load_ca_file(path: &Path) -> AdapterResult<RootCertStore> {
    let pem = std::fs::read(path).map_err(|e| {
        AdapterError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to read CA bundle {}: {}", path.display(), e),
        ))
    })?;

    let mut reader = BufReader::new(pem.as_slice());
    let mut roots = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut reader) {
        let cert = cert.to_adapter_error(&format!("Failed to parse CA bundle {}", path.display()))?;
        roots
            .add(cert)
            .to_adapter_error(&format!("Invalid certificate in {}", path.display()))?;
    }

    if roots.is_empty() {
        return Err(AdapterError::Configuration(format!(
            "No certificates found in CA bundle {}",
            path.display()
        )));
    }

    debug!("Loaded {} root certificates from {}", roots.len(), path.display());
    Ok(roots)
}

/// Load the platform's trusted roots.
pub fn load_native_roots() -> AdapterResult<RootCertStore> {
    let result = rustls_native_certs::load_native_certs();
    for e in &result.errors {
        warn!("Failed to load native root certificate: {}", e);
    }

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(result.certs);
    debug!("Loaded {} native root certificates ({} ignored)", added, ignored);

    if roots.is_empty() {
        return Err(AdapterError::Configuration(
            "No native root certificates available".to_string(),
        ));
    }
    Ok(roots)
}

/// Build the rustls client config for one pool.
///
/// When `assert_hostname` is set the leaf certificate is checked against it
/// instead of the name the connection was opened with (the SNI name, or the
/// URL host when no SNI override is configured).
pub fn client_config(
    verification: &Verification,
    assert_hostname: Option<&str>,
) -> AdapterResult<ClientConfig> {
    let provider = crypto_provider();

    let verifier: Arc<dyn ServerCertVerifier> = match verification {
        Verification::Disabled => Arc::new(NoVerification::new(provider.clone())),
        Verification::NativeRoots => {
            asserting_verifier(Arc::new(load_native_roots()?), &provider, assert_hostname)?
        }
        Verification::CaFile(path) => {
            asserting_verifier(Arc::new(load_ca_file(path)?), &provider, assert_hostname)?
        }
        Verification::Roots(roots) => {
            asserting_verifier(roots.clone(), &provider, assert_hostname)?
        }
    };

    Ok(ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .to_adapter_error("Failed to select TLS protocol versions")?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth())
}

fn asserting_verifier(
    roots: Arc<RootCertStore>,
    provider: &Arc<CryptoProvider>,
    assert_hostname: Option<&str>,
) -> AdapterResult<Arc<dyn ServerCertVerifier>> {
    let assert_hostname = assert_hostname
        .map(parse_server_name)
        .transpose()?;

    let inner = WebPkiServerVerifier::builder_with_provider(roots.clone(), provider.clone())
        .build()
        .to_adapter_error("Failed to build certificate verifier")?;

    Ok(Arc::new(AssertHostnameVerifier {
        inner,
        roots,
        algorithms: provider.signature_verification_algorithms,
        assert_hostname,
    }))
}

/// Parse a hostname (or IP literal) into an owned rustls server name.
pub fn parse_server_name(hostname: &str) -> AdapterResult<ServerName<'static>> {
    ServerName::try_from(hostname.to_owned())
        .map_err(|e| AdapterError::Configuration(format!("Invalid hostname '{}': {}", hostname, e)))
}

fn display_name(name: &ServerName<'_>) -> String {
    match name {
        ServerName::DnsName(dns) => dns.as_ref().to_owned(),
        ServerName::IpAddress(ip) => std::net::IpAddr::from(*ip).to_string(),
        _ => format!("{:?}", name),
    }
}

/// Validates the chain with webpki, then the leaf against the asserted name.
#[derive(Debug)]
pub struct AssertHostnameVerifier {
    inner: Arc<WebPkiServerVerifier>,
    roots: Arc<RootCertStore>,
    algorithms: WebPkiSupportedAlgorithms,
    assert_hostname: Option<ServerName<'static>>,
}

impl ServerCertVerifier for AssertHostnameVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let expected = self.assert_hostname.as_ref().unwrap_or(server_name);

        let leaf = ParsedCertificate::try_from(end_entity)?;
        // Chain errors take precedence over a name mismatch
        verify_server_cert_signed_by_trust_anchor(
            &leaf,
            &self.roots,
            intermediates,
            now,
            self.algorithms.all,
        )?;

        if verify_server_name(&leaf, expected).is_err() {
            let hostname = display_name(expected);
            debug!("Certificate is not valid for {}", hostname);
            return Err(rustls::Error::InvalidCertificate(CertificateError::Other(
                OtherError(Arc::new(HostnameMismatch { hostname })),
            )));
        }

        self.inner
            .verify_server_cert(end_entity, intermediates, expected, ocsp_response, now)
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// Accepts any certificate. Handshake signatures are still checked.
#[derive(Debug)]
pub struct NoVerification {
    provider: Arc<CryptoProvider>,
}

impl NoVerification {
    pub fn new(provider: Arc<CryptoProvider>) -> Self {
        Self { provider }
    }
}

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        warn!(
            "Unverified HTTPS request is being made to host '{}'. Adding certificate verification is strongly advised.",
            display_name(server_name)
        );
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Find the rustls error behind a client error, looking through `io::Error`
/// wrappers which hide their payload from `source()`.
pub fn find_rustls_error<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a rustls::Error> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(tls) = e.downcast_ref::<rustls::Error>() {
            return Some(tls);
        }
        if let Some(inner) = e.downcast_ref::<std::io::Error>().and_then(|io| io.get_ref()) {
            if let Some(tls) = find_rustls_error(inner) {
                return Some(tls);
            }
        }
        current = e.source();
    }
    None
}

/// Turn a handshake failure into the message carried by [`AdapterError::Ssl`].
pub fn describe_tls_error(err: &rustls::Error) -> String {
    if let rustls::Error::InvalidCertificate(CertificateError::Other(other)) = err {
        if let Some(mismatch) = other.0.downcast_ref::<HostnameMismatch>() {
            return mismatch.to_string();
        }
    }
    err.to_string()
}
