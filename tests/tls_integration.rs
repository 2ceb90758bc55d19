//! HTTPS listener tests with real credentials from `tests/fixtures`.
//!
//! `pem/` holds a self-signed localhost certificate and its PKCS#8 key;
//! `pfx/server.pfx` is the same pair bundled with the default passphrase.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use print_proxy::config::schema::DEFAULT_CERT_PASSPHRASE;
use print_proxy::config::ProxyConfig;
use print_proxy::lifecycle::{start_with, RunningProxy};
use print_proxy::net::{OsFs, TlsCredential, TlsResolver};
use reqwest::StatusCode;
use serde_json::Value;

mod common;

use common::{client, dead_url, proxy_config};

fn fixture_dir(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures").join(name)
}

/// Resolve a credential from one fixture directory, nothing else on the path.
fn resolve(dir: &str, passphrase: &str) -> TlsCredential {
    let empty = fixture_dir("absent");
    TlsResolver::conventional(Some(&fixture_dir(dir)), &empty, None)
        .resolve(&OsFs, passphrase)
        .credential
        .expect("fixture credential should resolve")
}

fn tls_client() -> reqwest::Client {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

async fn start_tls(credential: TlsCredential) -> RunningProxy {
    start_with(Arc::new(proxy_config(&dead_url(), 100)), Some(credential))
        .await
        .unwrap()
}

fn leaf_der() -> Vec<u8> {
    let pem = std::fs::read(fixture_dir("pem").join("server.crt")).unwrap();
    let der = rustls_pemfile::certs(&mut pem.as_slice())
        .next()
        .unwrap()
        .unwrap()
        .as_ref()
        .to_vec();
    der
}

async fn cert_info(base: &str) -> Value {
    client()
        .get(format!("{}/cert-info", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn pem_credential_serves_https() {
    let credential = resolve("pem", DEFAULT_CERT_PASSPHRASE);
    assert_eq!(credential.source(), "pem");
    let proxy = start_tls(credential).await;
    let https = proxy.https_addr().expect("HTTPS listener should be up");
    let base = format!("https://{}", https);

    let res = tls_client().get(format!("{}/proxy-health", base)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "healthy");

    let info = cert_info(&format!("http://{}", proxy.http_addr())).await;
    assert_eq!(info["httpsEnabled"], true);
    assert_eq!(info["httpsPort"], https.port());
    assert_eq!(info["source"], "pem");

    let res = tls_client().get(format!("{}/download-cert", base)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "application/x-pem-file");
    let served = res.bytes().await.unwrap();
    let on_disk = std::fs::read(fixture_dir("pem").join("server.crt")).unwrap();
    assert_eq!(&served[..], &on_disk[..]);

    proxy.shutdown(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn pkcs12_bundle_serves_https() {
    let credential = resolve("pfx", DEFAULT_CERT_PASSPHRASE);
    assert_eq!(credential.source(), "pkcs12");
    assert_eq!(credential.certificate_chain_der().unwrap(), vec![leaf_der()]);

    let proxy = start_tls(credential).await;
    let https = proxy.https_addr().expect("HTTPS listener should be up");
    let base = format!("https://{}", https);

    let res = tls_client().get(format!("{}/proxy-health", base)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let info = cert_info(&format!("http://{}", proxy.http_addr())).await;
    assert_eq!(info["httpsEnabled"], true);
    assert_eq!(info["httpsPort"], https.port());
    assert_eq!(info["source"], "pkcs12");

    let res = tls_client().get(format!("{}/download-cert", base)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "application/pkix-cert");
    assert_eq!(res.bytes().await.unwrap().to_vec(), leaf_der());

    proxy.shutdown(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn wrong_pkcs12_passphrase_degrades_to_http() {
    let credential = resolve("pfx", "not-the-passphrase");
    assert!(credential.certificate_chain_der().is_err());

    let proxy = start_tls(credential).await;
    assert!(proxy.https_addr().is_none());

    let base = format!("http://{}", proxy.http_addr());
    let res = client().get(format!("{}/proxy-health", base)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(cert_info(&base).await["httpsEnabled"], false);

    proxy.shutdown(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn taken_https_port_keeps_http_serving() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let config = ProxyConfig {
        https_port: taken.local_addr().unwrap().port(),
        ..proxy_config(&dead_url(), 100)
    };
    let proxy = start_with(Arc::new(config), Some(resolve("pem", DEFAULT_CERT_PASSPHRASE)))
        .await
        .unwrap();
    assert!(proxy.https_addr().is_none());

    let base = format!("http://{}", proxy.http_addr());
    let res = client().get(format!("{}/proxy-health", base)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let info = cert_info(&base).await;
    assert_eq!(info["httpsEnabled"], false);
    assert_eq!(info["source"], "pem");

    let status: Value = client()
        .get(format!("{}/status", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["httpsActive"], false);

    proxy.shutdown(Duration::from_secs(2)).await.unwrap();
    drop(taken);
}
