//! Self-signed ECDSA P-256 identity the gateway presents during the DTLS
//! handshake, and the SHA-256 fingerprint published in `a=fingerprint`.

use p256::pkcs8::DecodePrivateKey;
use rcgen::{CertificateParams, KeyPair};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// An X.509 certificate and its matching private key, in the two forms the
/// rest of the gateway needs: DER bytes for `dtls::DtlsConfig` and an
/// `a=fingerprint` line for SDP.
pub struct Identity {
    pub certificate_der: Vec<u8>,
    pub private_key: p256::ecdsa::SigningKey,
}

impl Identity {
    /// Generates a fresh self-signed identity with a random subject name.
    /// There is no certificate pool or persistence: a new gateway process
    /// gets a new identity, same as every ICE session gets a new ufrag/pwd.
    pub fn generate() -> Result<Self> {
        let key_pair = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256)?;
        let subject = uuid::Uuid::new_v4().to_string();
        let params = CertificateParams::new(vec![subject])?;
        let x509 = params.self_signed(&key_pair)?;
        let certificate_der = x509.der().to_vec();
        let private_key = p256::ecdsa::SigningKey::from_pkcs8_der(&key_pair.serialize_der())
            .map_err(|e| Error::KeyParse(e.to_string()))?;
        Ok(Identity { certificate_der, private_key })
    }

    /// `"sha-256 XX:XX:..."`, per RFC 8122 §5's grammar, using uppercase hex
    /// octets as required for the hash-func/fingerprint SDP attribute value.
    pub fn fingerprint(&self) -> String {
        fingerprint_sha256(&self.certificate_der)
    }
}

pub fn fingerprint_sha256(certificate_der: &[u8]) -> String {
    let digest = Sha256::digest(certificate_der);
    let hex: Vec<String> = digest.iter().map(|b| format!("{:02X}", b)).collect();
    format!("sha-256 {}", hex.join(":"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_identity_has_parseable_fingerprint() {
        let identity = Identity::generate().unwrap();
        let fp = identity.fingerprint();
        assert!(fp.starts_with("sha-256 "));
        let hex_part = &fp["sha-256 ".len()..];
        assert_eq!(hex_part.split(':').count(), 32);
        assert!(hex_part.chars().all(|c| c.is_ascii_hexdigit() || c == ':'));
        assert!(!hex_part.contains(|c: char| c.is_ascii_lowercase()));
    }

    #[test]
    fn fingerprint_is_deterministic_for_same_der() {
        let der = vec![1u8, 2, 3, 4, 5];
        assert_eq!(fingerprint_sha256(&der), fingerprint_sha256(&der));
    }
}
