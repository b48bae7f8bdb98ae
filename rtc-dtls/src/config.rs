use std::time::Duration;

use crate::srtp_profile::SrtpProfile;

/// Server-side DTLS configuration: the certificate this gateway presents
/// (its DER bytes are what the signalling layer publishes as `a=fingerprint`)
/// and the retransmission bounds for RFC 6347 §4.2.4's handshake FSM.
#[derive(Clone)]
pub struct DtlsConfig {
    pub certificate_der: Vec<u8>,
    pub private_key: p256::ecdsa::SigningKey,
    pub srtp_profiles: Vec<SrtpProfile>,
    pub initial_retransmit_interval: Duration,
    pub max_retransmit_interval: Duration,
    pub max_retransmissions: u32,
    pub cookie_pool_size: usize,
    pub cookie_length: usize,
    pub cookie_key_lifetime: Duration,
}

impl DtlsConfig {
    pub fn new(certificate_der: Vec<u8>, private_key: p256::ecdsa::SigningKey) -> Self {
        DtlsConfig {
            certificate_der,
            private_key,
            srtp_profiles: vec![
                SrtpProfile::AeadAes128Gcm,
                SrtpProfile::Aes128CmSha1_80,
                SrtpProfile::Aes128CmSha1_32,
            ],
            initial_retransmit_interval: Duration::from_millis(1000),
            max_retransmit_interval: Duration::from_secs(60),
            max_retransmissions: 10,
            cookie_pool_size: crate::cookie::DEFAULT_POOL_SIZE,
            cookie_length: crate::cookie::DEFAULT_COOKIE_LENGTH,
            cookie_key_lifetime: crate::cookie::DEFAULT_KEY_LIFETIME,
        }
    }
}
