//! Certificate handling module
//!
//! Generates the self-signed loopback identity the proxy serves, persists it
//! for operators (and for clients that want to trust it), and exposes a few
//! inspection helpers used for logging.

use log::{debug, info};
use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::extension::{
    BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAlternativeName,
};
use openssl::x509::{X509NameBuilder, X509Ref, X509};
use std::cmp::Ordering;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use crate::common::{read_file, write_file_atomic, ProxyError, Result};
use crate::config::defaults::{CERT_FILE_NAME, KEY_BITS, KEY_FILE_NAME, VALIDITY_DAYS};
use crate::config::ProxyConfig;

/// Organization written into the certificate subject
pub const SUBJECT_ORGANIZATION: &str = "Service Bus Emulator";

/// Common name written into the certificate subject
pub const SUBJECT_COMMON_NAME: &str = "localhost";

/// DNS names covered by the certificate
pub const SAN_DNS_NAMES: [&str; 1] = ["localhost"];

/// IP addresses covered by the certificate
pub const SAN_IP_ADDRESSES: [&str; 2] = ["127.0.0.1", "::1"];

const CERT_FILE_MODE: u32 = 0o644;
const KEY_FILE_MODE: u32 = 0o600;

/// A private key and the self-signed certificate issued for it
pub struct Identity {
    key: PKey<Private>,
    certificate: X509,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("subject", &subject_string(&self.certificate).unwrap_or_default())
            .field("key", &"<private key>")
            .finish()
    }
}

impl Identity {
    /// The private key
    pub fn key(&self) -> &PKey<Private> {
        &self.key
    }

    /// The certificate
    pub fn certificate(&self) -> &X509Ref {
        &self.certificate
    }

    /// PEM encoded certificate (`CERTIFICATE` block)
    pub fn certificate_pem(&self) -> Result<Vec<u8>> {
        Ok(self.certificate.to_pem()?)
    }

    /// PEM encoded PKCS#1 private key (`RSA PRIVATE KEY` block)
    pub fn private_key_pem(&self) -> Result<Vec<u8>> {
        Ok(self.key.rsa()?.private_key_to_pem()?)
    }

    /// Whether the current time falls inside the certificate validity window
    pub fn is_valid_now(&self) -> Result<bool> {
        let now = Asn1Time::days_from_now(0)?;

        let started = self.certificate.not_before().compare(&now)? != Ordering::Greater;
        let not_expired = now.compare(self.certificate.not_after())? == Ordering::Less;

        Ok(started && not_expired)
    }
}

/// Where an identity was written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityPaths {
    /// Certificate file
    pub cert: PathBuf,
    /// Private key file
    pub key: PathBuf,
}

/// Produces and persists the proxy's self-signed identity
///
/// A fresh identity is generated on every start; files from previous runs are
/// overwritten.
#[derive(Debug, Clone)]
pub struct CertificateProvisioner {
    cert_dir: PathBuf,
    key_bits: u32,
    validity_days: u32,
}

impl CertificateProvisioner {
    /// Provisioner writing to `cert_dir` with default key size and validity
    pub fn new(cert_dir: impl Into<PathBuf>) -> Self {
        Self {
            cert_dir: cert_dir.into(),
            key_bits: KEY_BITS,
            validity_days: VALIDITY_DAYS,
        }
    }

    /// Provisioner configured from the proxy configuration
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::new(config.cert_dir())
            .with_key_bits(config.key_bits())
            .with_validity_days(config.validity_days())
    }

    /// Set the RSA key size
    pub fn with_key_bits(mut self, key_bits: u32) -> Self {
        self.key_bits = key_bits;
        self
    }

    /// Set the validity window, counted from generation time
    pub fn with_validity_days(mut self, validity_days: u32) -> Self {
        self.validity_days = validity_days;
        self
    }

    /// Paths the identity is written to
    pub fn paths(&self) -> IdentityPaths {
        IdentityPaths {
            cert: self.cert_dir.join(CERT_FILE_NAME),
            key: self.cert_dir.join(KEY_FILE_NAME),
        }
    }

    /// Generate, persist and report a new identity
    pub fn provision(&self) -> Result<Identity> {
        let identity = self.generate()?;
        let paths = self.persist(&identity)?;

        info!("Certificate written to: {}", paths.cert.display());
        info!("Private key written to: {}", paths.key.display());
        info!("Certificate subject: {}", subject_string(identity.certificate())?);
        info!("Certificate fingerprint: {}", fingerprint(identity.certificate())?);

        Ok(identity)
    }

    /// Generate a key pair and a certificate self-signed by it
    pub fn generate(&self) -> Result<Identity> {
        debug!("Generating {}-bit RSA key", self.key_bits);

        let rsa = Rsa::generate(self.key_bits).map_err(generation_error("generate RSA key"))?;
        let key = PKey::from_rsa(rsa).map_err(generation_error("wrap RSA key"))?;

        let certificate = self
            .build_certificate(&key)
            .map_err(generation_error("sign certificate"))?;

        Ok(Identity { key, certificate })
    }

    fn build_certificate(&self, key: &PKey<Private>) -> std::result::Result<X509, ErrorStack> {
        let mut name = X509NameBuilder::new()?;
        name.append_entry_by_nid(Nid::ORGANIZATIONNAME, SUBJECT_ORGANIZATION)?;
        name.append_entry_by_nid(Nid::COMMONNAME, SUBJECT_COMMON_NAME)?;
        let name = name.build();

        let serial = {
            let mut serial = BigNum::new()?;
            serial.rand(127, MsbOption::MAYBE_ZERO, false)?;
            serial.to_asn1_integer()?
        };

        let mut builder = X509::builder()?;
        builder.set_version(2)?;
        builder.set_serial_number(&serial)?;
        builder.set_subject_name(&name)?;
        builder.set_issuer_name(&name)?;
        builder.set_pubkey(key)?;
        let not_before = Asn1Time::days_from_now(0)?;
        let not_after = Asn1Time::days_from_now(self.validity_days)?;
        builder.set_not_before(&not_before)?;
        builder.set_not_after(&not_after)?;

        builder.append_extension(BasicConstraints::new().critical().build()?)?;
        builder.append_extension(
            KeyUsage::new()
                .critical()
                .digital_signature()
                .key_encipherment()
                .build()?,
        )?;
        builder.append_extension(ExtendedKeyUsage::new().server_auth().build()?)?;

        let san = {
            let mut san = SubjectAlternativeName::new();
            for dns in SAN_DNS_NAMES {
                san.dns(dns);
            }
            for ip in SAN_IP_ADDRESSES {
                san.ip(ip);
            }
            san.build(&builder.x509v3_context(None, None))?
        };
        builder.append_extension(san)?;

        builder.sign(key, MessageDigest::sha256())?;

        Ok(builder.build())
    }

    /// Write the identity as PEM files, replacing earlier ones
    ///
    /// Each file is written to a temporary sibling and renamed into place, and
    /// the pair is read back to make sure the key matches the certificate.
    pub fn persist(&self, identity: &Identity) -> Result<IdentityPaths> {
        fs::create_dir_all(&self.cert_dir)?;

        let paths = self.paths();
        write_file_atomic(&paths.cert, &identity.certificate_pem()?, CERT_FILE_MODE)?;
        write_file_atomic(&paths.key, &identity.private_key_pem()?, KEY_FILE_MODE)?;

        verify_persisted(&paths)?;

        Ok(paths)
    }
}

fn generation_error(action: &'static str) -> impl Fn(ErrorStack) -> ProxyError {
    move |e| ProxyError::CertGeneration(format!("failed to {}: {}", action, e))
}

/// Check that the files on disk form a matching certificate/key pair
pub fn verify_persisted(paths: &IdentityPaths) -> Result<()> {
    let certificate = load_cert(&paths.cert)?;
    let key_pem = read_file(&paths.key)?;
    let key = PKey::private_key_from_pem(&key_pem)
        .map_err(|e| ProxyError::Certificate(format!("Failed to parse private key: {}", e)))?;

    if !certificate.public_key()?.public_eq(&key) {
        return Err(ProxyError::Certificate(format!(
            "Private key {} does not match certificate {}",
            paths.key.display(),
            paths.cert.display()
        )));
    }

    Ok(())
}

/// Load certificate from PEM file
pub fn load_cert(cert_path: &Path) -> Result<X509> {
    let cert_data = read_file(cert_path)?;

    X509::from_pem(&cert_data)
        .map_err(|e| ProxyError::Certificate(format!("Failed to parse certificate: {}", e)))
}

/// Get certificate subject information, e.g. `O=Service Bus Emulator, CN=localhost`
pub fn get_cert_subject(cert_path: &Path) -> Result<String> {
    let cert = load_cert(cert_path)?;
    subject_string(&cert)
}

/// Get the SHA-256 certificate fingerprint as colon separated hex
pub fn get_cert_fingerprint(cert_path: &Path) -> Result<String> {
    let cert = load_cert(cert_path)?;
    fingerprint(&cert)
}

/// Get the subject alternative names (DNS names and IP addresses) of a certificate
pub fn get_subject_alt_names(cert_path: &Path) -> Result<Vec<String>> {
    let cert = load_cert(cert_path)?;
    Ok(subject_alt_names(&cert))
}

fn subject_string(cert: &X509Ref) -> Result<String> {
    let mut parts = Vec::new();
    for entry in cert.subject_name().entries() {
        parts.push(format!(
            "{}={}",
            entry.object().nid().short_name()?,
            entry.data().as_utf8()?
        ));
    }

    Ok(parts.join(", "))
}

fn fingerprint(cert: &X509Ref) -> Result<String> {
    let digest = cert.digest(MessageDigest::sha256())?;

    Ok(digest
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<String>>()
        .join(":"))
}

fn subject_alt_names(cert: &X509Ref) -> Vec<String> {
    let Some(names) = cert.subject_alt_names() else {
        return Vec::new();
    };

    names
        .iter()
        .filter_map(|name| {
            if let Some(dns) = name.dnsname() {
                return Some(dns.to_string());
            }

            name.ipaddress().and_then(|bytes| match bytes.len() {
                4 => <[u8; 4]>::try_from(bytes).ok().map(|b| IpAddr::from(b).to_string()),
                16 => <[u8; 16]>::try_from(bytes).ok().map(|b| IpAddr::from(b).to_string()),
                _ => None,
            })
        })
        .collect()
}
