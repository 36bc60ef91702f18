//! TLS material for the RDP server
//!
//! GNOME Remote Desktop refuses RDP without a certificate. The installer
//! has no CA to ask, so a self-signed pair is generated once per boot and
//! reused if it is already there.

use rcgen::{Certificate, CertificateParams, DistinguishedName, DnType, KeyPair};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Result, SessionError};

/// Certificate file name inside the certificate directory
pub const CERT_FILE: &str = "rdp-tls.crt";

/// Private key file name inside the certificate directory
pub const KEY_FILE: &str = "rdp-tls.key";

/// Paths of the certificate and key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    /// PEM certificate
    pub cert: PathBuf,
    /// PEM private key (mode 0600)
    pub key: PathBuf,
}

impl TlsFiles {
    /// File locations inside `dir`
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            cert: dir.join(CERT_FILE),
            key: dir.join(KEY_FILE),
        }
    }

    fn exist(&self) -> bool {
        self.cert.is_file() && self.key.is_file()
    }
}

fn tls_error(reason: impl std::fmt::Display) -> SessionError {
    SessionError::startup_failed("RDP TLS certificate", reason.to_string())
}

/// Generate a self-signed certificate for `hostname`
///
/// Returns the certificate and private key as PEM.
pub fn generate_self_signed(hostname: &str, validity_days: u32) -> Result<(String, String)> {
    info!("Generating self-signed RDP certificate for '{}'", hostname);

    let mut params = CertificateParams::new(vec![hostname.to_string()]);

    let mut distinguished_name = DistinguishedName::new();
    distinguished_name.push(DnType::CommonName, hostname);
    distinguished_name.push(DnType::OrganizationName, "Installer");
    params.distinguished_name = distinguished_name;

    let now = time::OffsetDateTime::now_utc();
    params.not_before = now - time::Duration::days(1);
    params.not_after = now + time::Duration::days(i64::from(validity_days));

    let key_pair = KeyPair::generate(&rcgen::PKCS_ECDSA_P256_SHA256).map_err(tls_error)?;
    params.key_pair = Some(key_pair);

    let cert = Certificate::from_params(params).map_err(tls_error)?;
    let cert_pem = cert.serialize_pem().map_err(tls_error)?;
    let key_pem = cert.serialize_private_key_pem();

    Ok((cert_pem, key_pem))
}

/// Make sure a certificate and key exist in `dir`
pub fn ensure_tls_files(dir: &Path, hostname: &str, validity_days: u32) -> Result<TlsFiles> {
    let files = TlsFiles::in_dir(dir);
    if files.exist() {
        debug!("Reusing RDP certificate {}", files.cert.display());
        return Ok(files);
    }

    let (cert_pem, key_pem) = generate_self_signed(hostname, validity_days)?;

    fs::create_dir_all(dir)?;
    fs::write(&files.cert, cert_pem.as_bytes())?;

    // Never readable by others, not even briefly
    let mut key = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(&files.key)?;
    key.write_all(key_pem.as_bytes())?;

    info!("RDP certificate written to {}", files.cert.display());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn test_generate_self_signed() {
        let (cert_pem, key_pem) = generate_self_signed("installer.example.com", 30).unwrap();

        assert!(cert_pem.contains("BEGIN CERTIFICATE"));
        assert!(key_pem.contains("BEGIN PRIVATE KEY"));
    }

    #[test]
    fn test_ensure_tls_files_creates_and_reuses() {
        let dir = TempDir::new().unwrap();
        let cert_dir = dir.path().join("gnome-remote-desktop");

        let files = ensure_tls_files(&cert_dir, "localhost", 30).unwrap();
        assert!(files.cert.exists());

        let mode = fs::metadata(&files.key).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        let first = fs::read_to_string(&files.cert).unwrap();
        let again = ensure_tls_files(&cert_dir, "localhost", 30).unwrap();
        assert_eq!(again, files);
        assert_eq!(fs::read_to_string(&again.cert).unwrap(), first);
    }
}
