mod common;

use alt_sni::adapter::AlternateHostnameAdapter;
use alt_sni::error::AdapterError;
use alt_sni::session::Session;
use alt_sni::tls::Verification;
use alt_sni::transport::{HttpsAdapter, PoolConfig, SendOptions, Transport};
use common::{
    LogBuffer, TEST_HOST, TestServer, assert_hostname_mismatch, foreign_ca_file, get,
};

#[tokio::test]
async fn test_default_when_hostname_mismatch() {
    let server = TestServer::start(&[TEST_HOST]).await;
    let mut session = Session::new();
    session.mount(server.url(), HttpsAdapter::new(server.pool_config()));

    let err = session.get(&server.url()).await.unwrap_err();

    assert!(err.is_ssl(), "unexpected error: {}", err);
    assert_hostname_mismatch(&err.to_string(), "127.0.0.1");
}

#[tokio::test]
async fn test_no_verify_when_hostname_mismatch() {
    let server = TestServer::start(&[TEST_HOST]).await;
    let mut session = Session::new();
    session.mount(
        server.url(),
        HttpsAdapter::new(PoolConfig {
            verification: Verification::Disabled,
            ..PoolConfig::default()
        }),
    );

    let logs = LogBuffer::default();
    let _guard = tracing::subscriber::set_default(logs.subscriber());

    let response = session.get(&server.url()).await.unwrap();
    assert_eq!(response.status(), 200);
    assert!(
        logs.contents().contains(
            "Unverified HTTPS request is being made to host '127.0.0.1'. \
             Adding certificate verification is strongly advised."
        ),
        "missing warning in: {}",
        logs.contents()
    );
}

#[tokio::test]
async fn test_no_verify_when_hostname_match() {
    let server = TestServer::start(&[TEST_HOST]).await;
    let base = HttpsAdapter::new(PoolConfig {
        verification: Verification::Disabled,
        ..PoolConfig::default()
    });
    let mut session = Session::new();
    session.mount(
        server.url(),
        AlternateHostnameAdapter::new(TEST_HOST, base).unwrap(),
    );

    let logs = LogBuffer::default();
    let _guard = tracing::subscriber::set_default(logs.subscriber());

    let response = session.get(&server.url()).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.body().as_ref(), TEST_HOST.as_bytes());
    assert!(
        logs.contents()
            .contains("Unverified HTTPS request is being made to host 'example.org'"),
        "missing warning in: {}",
        logs.contents()
    );
}

#[tokio::test]
async fn test_untrusted_certificate_is_not_a_hostname_mismatch() {
    let server = TestServer::start(&[TEST_HOST]).await;
    let foreign_ca = foreign_ca_file();
    let base = HttpsAdapter::new(PoolConfig {
        verification: Verification::CaFile(foreign_ca.path().to_path_buf()),
        ..PoolConfig::default()
    });
    let mut session = Session::new();
    session.mount(
        server.url(),
        AlternateHostnameAdapter::new("notamatch.com", base).unwrap(),
    );

    let err = session.get(&server.url()).await.unwrap_err();

    assert!(err.is_ssl(), "unexpected error: {}", err);
    assert!(
        !err.to_string().contains("doesn't match"),
        "chain failure reported as name mismatch: {}",
        err
    );
}

#[tokio::test]
async fn test_verify_pass_when_cert_match_alt_host() {
    let server = TestServer::start(&[TEST_HOST]).await;
    let adapter =
        AlternateHostnameAdapter::new(TEST_HOST, HttpsAdapter::new(server.pool_config())).unwrap();

    let mut session = Session::new();
    session.mount(server.url(), adapter);
    let response = session.get(&server.url()).await.unwrap();

    assert_eq!(response.status(), 200);
    // The server echoes the SNI name it received
    assert_eq!(response.body().as_ref(), TEST_HOST.as_bytes());
}

#[tokio::test]
async fn test_verify_fail_when_cert_mismatch_alt_host() {
    let server = TestServer::start(&[TEST_HOST]).await;
    let adapter =
        AlternateHostnameAdapter::new("notamatch.com", HttpsAdapter::new(server.pool_config()))
            .unwrap();

    let mut session = Session::new();
    session.mount(server.url(), adapter);
    let err = session.get(&server.url()).await.unwrap_err();

    assert!(matches!(err, AdapterError::Ssl(_)), "unexpected error: {}", err);
    assert_hostname_mismatch(&err.to_string(), "notamatch.com");
}

#[tokio::test]
async fn test_strict_adapter_rejects_empty_hostname() {
    let err = AlternateHostnameAdapter::new("", HttpsAdapter::default()).unwrap_err();
    assert!(matches!(err, AdapterError::Configuration(_)));
}

#[tokio::test]
async fn test_repeated_sends_keep_pool_state() {
    let server = TestServer::start(&[TEST_HOST]).await;
    let mut adapter =
        AlternateHostnameAdapter::new(TEST_HOST, HttpsAdapter::new(server.pool_config())).unwrap();
    let options = SendOptions::default();

    let first = adapter.send(get(&server.url()), &options).await.unwrap();
    let config_after_first = adapter.pool_config().clone();
    let second = adapter.send(get(&server.url()), &options).await.unwrap();

    assert_eq!(first.status(), 200);
    assert_eq!(second.status(), 200);
    assert_eq!(adapter.pool_config(), &config_after_first);
    assert_eq!(
        adapter.pool_config().assert_hostname.as_deref(),
        Some(TEST_HOST)
    );
    assert_eq!(adapter.inner().pool().len(), 1);
}

#[tokio::test]
async fn test_clearing_hostname_reverts_to_url_verification() {
    let server = TestServer::start(&[TEST_HOST]).await;
    let mut adapter =
        AlternateHostnameAdapter::new(TEST_HOST, HttpsAdapter::new(server.pool_config())).unwrap();
    let options = SendOptions::default();

    let response = adapter.send(get(&server.url()), &options).await.unwrap();
    assert_eq!(response.status(), 200);

    adapter.set_hostname(Some(String::new())).unwrap();
    let err = adapter
        .send(get(&server.url()), &options)
        .await
        .unwrap_err();

    assert_eq!(adapter.pool_config().assert_hostname, None);
    assert_eq!(adapter.pool_config().server_hostname, None);
    assert_hostname_mismatch(&err.to_string(), "127.0.0.1");
}

#[tokio::test]
async fn test_send_clears_stale_assertion() {
    let server = TestServer::start(&[TEST_HOST]).await;
    let mut adapter =
        AlternateHostnameAdapter::optional(None, HttpsAdapter::new(server.pool_config())).unwrap();

    // Someone else left an assertion behind on the shared pool configuration
    let mut stale = adapter.pool_config().clone();
    stale.assert_hostname = Some(TEST_HOST.to_string());
    adapter.set_pool_config(stale);

    let err = adapter
        .send(get(&server.url()), &SendOptions::default())
        .await
        .unwrap_err();

    assert_eq!(adapter.pool_config().assert_hostname, None);
    assert_hostname_mismatch(&err.to_string(), "127.0.0.1");
}

#[tokio::test]
async fn test_switching_hostname_uses_new_identity() {
    let server = TestServer::start(&[TEST_HOST, "www.example.org"]).await;
    let mut adapter =
        AlternateHostnameAdapter::new(TEST_HOST, HttpsAdapter::new(server.pool_config())).unwrap();
    let options = SendOptions::default();

    let first = adapter.send(get(&server.url()), &options).await.unwrap();
    assert_eq!(first.body().as_ref(), TEST_HOST.as_bytes());

    adapter
        .set_hostname(Some("www.example.org".to_string()))
        .unwrap();
    let second = adapter.send(get(&server.url()), &options).await.unwrap();
    assert_eq!(second.body().as_ref(), b"www.example.org");
}
