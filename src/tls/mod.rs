//! TLS handling module
//!
//! Identity provisioning and the TLS server configuration built from it.

mod acceptor;
pub mod cert;

pub use acceptor::create_tls_acceptor;
pub use cert::{
    get_cert_fingerprint, get_cert_subject, get_subject_alt_names, load_cert,
    CertificateProvisioner, Identity, IdentityPaths,
};
