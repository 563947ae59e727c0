//! TLS policy shared by the HTTP client and the subscription WebSocket.

use std::fmt;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{ring, verify_tls12_signature, verify_tls13_signature, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use sha2::{Digest, Sha256};
use tokio_tungstenite::Connector;

use crate::error::{Result, VantiqError};

/// How the client validates the server's certificate.
#[derive(Clone, Default)]
pub enum TlsMode {
    /// Validate against the bundled web PKI roots.
    #[default]
    Verify,
    /// Accept any certificate. For test servers only.
    Disabled,
    /// Use a caller-built rustls configuration as-is.
    Custom(Arc<ClientConfig>),
    /// Accept only a leaf certificate whose DER SHA-256 digest matches.
    Fingerprint([u8; 32]),
}

impl fmt::Debug for TlsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Verify => write!(f, "Verify"),
            Self::Disabled => write!(f, "Disabled"),
            Self::Custom(_) => write!(f, "Custom(..)"),
            Self::Fingerprint(digest) => write!(f, "Fingerprint({})", hex::encode(digest)),
        }
    }
}

impl TlsMode {
    /// Pin a certificate by its hex SHA-256 fingerprint.
    ///
    /// Accepts plain hex or colon-separated pairs, in either case
    /// (`AB:CD:...` as printed by `openssl x509 -fingerprint -sha256`).
    pub fn fingerprint_from_hex(fingerprint: &str) -> Result<Self> {
        let cleaned: String = fingerprint
            .chars()
            .filter(|c| !matches!(c, ':' | ' '))
            .collect();
        let bytes = hex::decode(&cleaned).map_err(|e| {
            VantiqError::ConfigurationError(format!("Invalid certificate fingerprint: {}", e))
        })?;
        let digest: [u8; 32] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            VantiqError::ConfigurationError(format!(
                "Certificate fingerprint must be 32 bytes (SHA-256), got {}",
                bytes.len()
            ))
        })?;
        Ok(Self::Fingerprint(digest))
    }

    /// The rustls configuration for this mode, or `None` to use the
    /// library defaults (platform verification).
    pub(crate) fn client_config(&self) -> Result<Option<Arc<ClientConfig>>> {
        match self {
            Self::Verify => Ok(None),
            Self::Custom(config) => Ok(Some(config.clone())),
            Self::Disabled => pinned_config(None).map(Some),
            Self::Fingerprint(digest) => pinned_config(Some(*digest)).map(Some),
        }
    }

    pub(crate) fn apply_to_http(&self, builder: reqwest::ClientBuilder) -> Result<reqwest::ClientBuilder> {
        Ok(match self.client_config()? {
            Some(config) => builder.use_preconfigured_tls(ClientConfig::clone(&config)),
            None => builder,
        })
    }

    pub(crate) fn ws_connector(&self) -> Result<Option<Connector>> {
        Ok(self.client_config()?.map(Connector::Rustls))
    }
}

fn pinned_config(expected: Option<[u8; 32]>) -> Result<Arc<ClientConfig>> {
    let provider = Arc::new(ring::default_provider());
    let verifier = PinnedCertVerifier {
        expected,
        algorithms: provider.signature_verification_algorithms,
    };
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| VantiqError::ConfigurationError(format!("TLS setup failed: {}", e)))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// Skips chain validation. With `expected` set, the leaf must match that
/// SHA-256 digest; without it any certificate is accepted. Handshake
/// signatures are always checked.
#[derive(Debug)]
struct PinnedCertVerifier {
    expected: Option<[u8; 32]>,
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for PinnedCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        let Some(expected) = self.expected else {
            return Ok(ServerCertVerified::assertion());
        };

        let actual: [u8; 32] = Sha256::digest(end_entity.as_ref()).into();
        if actual == expected {
            Ok(ServerCertVerified::assertion())
        } else {
            log::warn!(
                "[TLS] Certificate fingerprint mismatch: expected {}, got {}",
                hex::encode(expected),
                hex::encode(actual)
            );
            Err(rustls::Error::General(
                "server certificate fingerprint does not match the pinned value".to_string(),
            ))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}
