use crate::context::SrtpContext;
use crate::error::{Error, Result};
use crate::option::ContextSide;
use crate::protection_profile::ProtectionProfile;

/// The pair of SRTP contexts derived from one DTLS-SRTP handshake's
/// exported keying material: `local` protects packets this gateway sends,
/// `remote` unprotects packets the peer sends.
pub struct SrtpConfig {
    pub local: SrtpContext,
    pub remote: SrtpContext,
}

impl SrtpConfig {
    /// `keying_material` must be exactly
    /// `2 * (profile.key_len() + profile.salt_len())` bytes, the length this
    /// gateway asks `export_keying_material` for with label
    /// `"EXTRACTOR-dtls_srtp"`.
    pub fn from_keying_material(profile: ProtectionProfile, keying_material: &[u8], side: ContextSide) -> Result<Self> {
        let key_len = profile.key_len();
        let salt_len = profile.salt_len();
        let expected_len = 2 * (key_len + salt_len);
        if keying_material.len() != expected_len {
            return Err(Error::ProfileUnset);
        }

        let mut offset = 0;
        let client_key = &keying_material[offset..offset + key_len];
        offset += key_len;
        let server_key = &keying_material[offset..offset + key_len];
        offset += key_len;
        let client_salt = &keying_material[offset..offset + salt_len];
        offset += salt_len;
        let server_salt = &keying_material[offset..offset + salt_len];

        let (local_key, local_salt, remote_key, remote_salt) = match side {
            ContextSide::Server => (server_key, server_salt, client_key, client_salt),
            ContextSide::Client => (client_key, client_salt, server_key, server_salt),
        };

        Ok(SrtpConfig {
            local: SrtpContext::new(profile, local_key, local_salt),
            remote: SrtpContext::new(profile, remote_key, remote_salt),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_length_keying_material() {
        let err = SrtpConfig::from_keying_material(ProtectionProfile::AeadAes128Gcm, &[0u8; 10], ContextSide::Server)
            .unwrap_err();
        assert!(matches!(err, Error::ProfileUnset));
    }

    #[test]
    fn splits_client_and_server_halves() {
        let profile = ProtectionProfile::Aes128CmHmacSha1_80;
        let len = 2 * (profile.key_len() + profile.salt_len());
        let material: Vec<u8> = (0..len as u8).collect();
        let server = SrtpConfig::from_keying_material(profile, &material, ContextSide::Server).unwrap();
        let client = SrtpConfig::from_keying_material(profile, &material, ContextSide::Client).unwrap();
        // The server's local context and the client's remote context must
        // derive from the same server_write_SRTP_master_key/salt slice.
        assert_eq!(server.local.debug_key(), client.remote.debug_key());
    }
}
