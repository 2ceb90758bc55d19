//! TLS credential discovery and certificate loading.
//!
//! Credentials are resolved once at startup by walking an ordered list of
//! probes. PKCS#12 bundles are always tried before PEM pairs and the first
//! usable candidate wins. A candidate that is missing, unreadable or holds a
//! key without a private-key marker is recorded as a rejection and skipped;
//! nothing here ever fails the process.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};

use axum_server::tls_rustls::RustlsConfig;

use crate::config::TlsSettings;

const PFX_FILE: &str = "server.pfx";
const CERT_FILE: &str = "server.crt";
const KEY_FILE: &str = "server.key";
const CERTS_DIR: &str = "certs";

const PRIVATE_KEY_MARKERS: [&str; 2] = ["BEGIN PRIVATE KEY", "BEGIN RSA PRIVATE KEY"];

/// Read access to candidate certificate files.
///
/// The resolver only ever reads whole files, so tests can swap in an
/// in-memory implementation.
pub trait CertSource: Send + Sync {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// The real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFs;

impl CertSource for OsFs {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}

/// A single place credentials may live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertProbe {
    Pkcs12 { path: PathBuf },
    PemPair { cert: PathBuf, key: PathBuf },
}

impl CertProbe {
    fn pkcs12_in(dir: &Path) -> Self {
        CertProbe::Pkcs12 {
            path: dir.join(PFX_FILE),
        }
    }

    fn pem_in(dir: &Path) -> Self {
        CertProbe::PemPair {
            cert: dir.join(CERT_FILE),
            key: dir.join(KEY_FILE),
        }
    }

    fn try_load(&self, fs: &dyn CertSource, passphrase: &str) -> Result<TlsCredential, RejectReason> {
        match self {
            CertProbe::Pkcs12 { path } => {
                let bundle = read_candidate(fs, path)?;
                Ok(TlsCredential::Pkcs12 {
                    path: path.clone(),
                    bundle,
                    passphrase: passphrase.to_string(),
                })
            }
            CertProbe::PemPair { cert, key } => {
                let cert_pem = read_candidate(fs, cert)?;
                let key_pem = read_candidate(fs, key)?;
                if !has_private_key_marker(&key_pem) {
                    return Err(RejectReason::MalformedKey(key.clone()));
                }
                Ok(TlsCredential::Pem {
                    cert_path: cert.clone(),
                    key_path: key.clone(),
                    cert: cert_pem,
                    key: key_pem,
                })
            }
        }
    }
}

impl fmt::Display for CertProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertProbe::Pkcs12 { path } => write!(f, "pkcs12 {}", path.display()),
            CertProbe::PemPair { cert, key } => {
                write!(f, "pem {} + {}", cert.display(), key.display())
            }
        }
    }
}

fn read_candidate(fs: &dyn CertSource, path: &Path) -> Result<Vec<u8>, RejectReason> {
    fs.read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => RejectReason::Missing(path.to_path_buf()),
        _ => RejectReason::Unreadable {
            path: path.to_path_buf(),
            error: e.to_string(),
        },
    })
}

/// True if the PEM text carries a PKCS#8 or PKCS#1 private key header.
pub fn has_private_key_marker(pem: &[u8]) -> bool {
    let text = String::from_utf8_lossy(pem);
    PRIVATE_KEY_MARKERS.iter().any(|m| text.contains(m))
}

/// Why a probe was skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    #[error("{} does not exist", .0.display())]
    Missing(PathBuf),
    #[error("{} could not be read: {error}", .path.display())]
    Unreadable { path: PathBuf, error: String },
    #[error("{} has no private key marker", .0.display())]
    MalformedKey(PathBuf),
}

/// A skipped probe and the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub probe: CertProbe,
    pub reason: RejectReason,
}

/// Usable TLS material.
#[derive(Clone)]
pub enum TlsCredential {
    Pkcs12 {
        path: PathBuf,
        bundle: Vec<u8>,
        passphrase: String,
    },
    Pem {
        cert_path: PathBuf,
        key_path: PathBuf,
        cert: Vec<u8>,
        key: Vec<u8>,
    },
}

impl fmt::Debug for TlsCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsCredential::Pkcs12 { path, .. } => {
                f.debug_struct("Pkcs12").field("path", path).finish_non_exhaustive()
            }
            TlsCredential::Pem { cert_path, key_path, .. } => f
                .debug_struct("Pem")
                .field("cert_path", cert_path)
                .field("key_path", key_path)
                .finish_non_exhaustive(),
        }
    }
}

/// Errors turning resolved material into a usable server config.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to decode PKCS#12 bundle: {0}")]
    Pkcs12(String),
    #[error("PKCS#12 bundle contains no private key")]
    EmptyBundle,
    #[error("no certificate found in {}", .0.display())]
    NoCertificate(PathBuf),
    #[error("failed to build TLS config: {0}")]
    Load(#[from] io::Error),
}

impl TlsCredential {
    /// `"pkcs12"` or `"pem"`.
    pub fn source(&self) -> &'static str {
        match self {
            TlsCredential::Pkcs12 { .. } => "pkcs12",
            TlsCredential::Pem { .. } => "pem",
        }
    }

    /// Path of the file holding the certificate.
    pub fn certificate_path(&self) -> &Path {
        match self {
            TlsCredential::Pkcs12 { path, .. } => path,
            TlsCredential::Pem { cert_path, .. } => cert_path,
        }
    }

    /// Build the rustls server config used by the HTTPS listener.
    pub async fn rustls_config(&self) -> Result<RustlsConfig, TlsError> {
        match self {
            TlsCredential::Pem { cert, key, .. } => {
                Ok(RustlsConfig::from_pem(cert.clone(), key.clone()).await?)
            }
            TlsCredential::Pkcs12 { bundle, passphrase, .. } => {
                let (chain, key) = decode_pkcs12(bundle, passphrase)?;
                Ok(RustlsConfig::from_der(chain, key).await?)
            }
        }
    }

    /// DER encoded certificate chain, leaf first.
    pub fn certificate_chain_der(&self) -> Result<Vec<Vec<u8>>, TlsError> {
        match self {
            TlsCredential::Pem { cert, cert_path, .. } => {
                let chain: Vec<Vec<u8>> = rustls_pemfile::certs(&mut cert.as_slice())
                    .filter_map(Result::ok)
                    .map(|c| c.as_ref().to_vec())
                    .collect();
                if chain.is_empty() {
                    return Err(TlsError::NoCertificate(cert_path.clone()));
                }
                Ok(chain)
            }
            TlsCredential::Pkcs12 { bundle, passphrase, .. } => {
                decode_pkcs12(bundle, passphrase).map(|(chain, _)| chain)
            }
        }
    }
}

fn decode_pkcs12(bundle: &[u8], passphrase: &str) -> Result<(Vec<Vec<u8>>, Vec<u8>), TlsError> {
    let keystore = p12_keystore::KeyStore::from_pkcs12(bundle, passphrase)
        .map_err(|e| TlsError::Pkcs12(e.to_string()))?;
    let (_alias, chain) = keystore.private_key_chain().ok_or(TlsError::EmptyBundle)?;
    let certs = chain.chain().iter().map(|c| c.as_der().to_vec()).collect();
    Ok((certs, chain.key().to_vec()))
}

/// Outcome of a resolution pass.
#[derive(Debug, Default)]
pub struct Resolution {
    pub credential: Option<TlsCredential>,
    pub rejections: Vec<Rejection>,
}

/// Ordered credential search.
#[derive(Debug, Clone)]
pub struct TlsResolver {
    probes: Vec<CertProbe>,
}

impl TlsResolver {
    pub fn new(probes: Vec<CertProbe>) -> Self {
        Self { probes }
    }

    /// The conventional search order.
    ///
    /// All PKCS#12 locations come first, then PEM pairs: the extra
    /// directory, `certs/` under the working directory, the working
    /// directory itself, then the same two under the installation directory.
    pub fn conventional(extra_dir: Option<&Path>, work_dir: &Path, install_dir: Option<&Path>) -> Self {
        let mut bundle_dirs: Vec<PathBuf> = Vec::new();
        let mut pem_dirs: Vec<PathBuf> = Vec::new();

        if let Some(extra) = extra_dir {
            bundle_dirs.push(extra.to_path_buf());
            pem_dirs.push(extra.to_path_buf());
        }
        bundle_dirs.push(work_dir.join(CERTS_DIR));
        pem_dirs.push(work_dir.join(CERTS_DIR));
        pem_dirs.push(work_dir.to_path_buf());
        if let Some(install) = install_dir {
            bundle_dirs.push(install.join(CERTS_DIR));
            pem_dirs.push(install.join(CERTS_DIR));
            pem_dirs.push(install.to_path_buf());
        }

        let mut probes: Vec<CertProbe> = Vec::new();
        let candidates = bundle_dirs
            .iter()
            .map(|d| CertProbe::pkcs12_in(d))
            .chain(pem_dirs.iter().map(|d| CertProbe::pem_in(d)));
        for probe in candidates {
            if !probes.contains(&probe) {
                probes.push(probe);
            }
        }

        Self { probes }
    }

    /// Search order for this process: working directory and the directory
    /// holding the executable.
    pub fn from_settings(settings: &TlsSettings) -> Self {
        let work_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let install_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));
        Self::conventional(settings.extra_dir.as_deref(), &work_dir, install_dir.as_deref())
    }

    pub fn probes(&self) -> &[CertProbe] {
        &self.probes
    }

    /// Walk the probes in order and stop at the first usable one.
    pub fn resolve(&self, fs: &dyn CertSource, passphrase: &str) -> Resolution {
        let mut resolution = Resolution::default();

        for probe in &self.probes {
            match probe.try_load(fs, passphrase) {
                Ok(credential) => {
                    tracing::info!(candidate = %probe, source = credential.source(), "TLS credential found");
                    resolution.credential = Some(credential);
                    break;
                }
                Err(reason) => {
                    match &reason {
                        RejectReason::Missing(_) => {
                            tracing::debug!(candidate = %probe, reason = %reason, "TLS candidate skipped")
                        }
                        _ => tracing::warn!(candidate = %probe, reason = %reason, "TLS candidate rejected"),
                    }
                    resolution.rejections.push(Rejection {
                        probe: probe.clone(),
                        reason,
                    });
                }
            }
        }

        if resolution.credential.is_none() {
            tracing::info!(probed = self.probes.len(), "No usable TLS credential; HTTPS disabled");
        }

        resolution
    }
}

/// TLS state visible to the request pipeline.
///
/// The credential is fixed after startup; `https_active` flips once the
/// HTTPS listener is actually serving, and `https_port` then holds the
/// port it bound.
#[derive(Debug, Default)]
pub struct TlsStatus {
    credential: Option<TlsCredential>,
    https_active: AtomicBool,
    https_port: AtomicU16,
}

impl TlsStatus {
    pub fn new(credential: Option<TlsCredential>) -> Self {
        Self {
            credential,
            https_active: AtomicBool::new(false),
            https_port: AtomicU16::new(0),
        }
    }

    pub fn credential(&self) -> Option<&TlsCredential> {
        self.credential.as_ref()
    }

    pub fn set_https_active(&self, active: bool) {
        self.https_active.store(active, Ordering::Release);
    }

    pub fn https_active(&self) -> bool {
        self.https_active.load(Ordering::Acquire)
    }

    pub fn set_https_port(&self, port: u16) {
        self.https_port.store(port, Ordering::Release);
    }

    /// Port the HTTPS listener bound, if it ever did.
    pub fn https_port(&self) -> Option<u16> {
        match self.https_port.load(Ordering::Acquire) {
            0 => None,
            port => Some(port),
        }
    }
}
