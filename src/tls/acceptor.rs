//! TLS acceptor creation from a provisioned identity

use log::{debug, info};
use openssl::ssl::{SslAcceptor, SslMethod, SslVerifyMode};

use crate::common::{ProxyError, Result};
use super::cert::Identity;

/// Create the TLS server configuration for the relay listener
///
/// Uses the Mozilla intermediate profile. Clients are not asked for
/// certificates. An identity outside its validity window is refused so the
/// listener never serves traffic with an expired certificate.
///
/// # Example
///
/// ```no_run
/// # use servicebus_proxy::tls::{create_tls_acceptor, CertificateProvisioner};
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let identity = CertificateProvisioner::new("docker/service-bus/certs").provision()?;
/// let acceptor = create_tls_acceptor(&identity)?;
/// # Ok(())
/// # }
/// ```
pub fn create_tls_acceptor(identity: &Identity) -> Result<SslAcceptor> {
    if !identity.is_valid_now()? {
        return Err(ProxyError::Certificate(
            "Refusing to serve a certificate outside its validity window".to_string(),
        ));
    }

    let mut acceptor = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls())?;

    acceptor.set_certificate(identity.certificate())?;
    acceptor.set_private_key(identity.key())?;
    acceptor.check_private_key()?;
    acceptor.set_verify(SslVerifyMode::NONE);

    debug!("TLS acceptor configured with {}-bit key", identity.key().bits());
    info!("TLS identity installed (client certificates not requested)");

    Ok(acceptor.build())
}
