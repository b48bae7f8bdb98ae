//! TLS 1.2 PRF (RFC 5246 §5) specialized to HMAC-SHA256, the only hash this
//! gateway's single supported cipher suite
//! (`TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256`) ever uses.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::Result;

const MASTER_SECRET_LENGTH: usize = 48;
const VERIFY_DATA_LENGTH: usize = 12;

pub fn p_hash(secret: &[u8], seed: &[u8], length: usize) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(length);
    let mut a = hmac_once(secret, seed)?;
    while result.len() < length {
        let mut input = a.clone();
        input.extend_from_slice(seed);
        let chunk = hmac_once(secret, &input)?;
        result.extend_from_slice(&chunk);
        a = hmac_once(secret, &a)?;
    }
    result.truncate(length);
    Ok(result)
}

fn hmac_once(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).map_err(|e| crate::error::Error::Crypto(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// `master_secret = PRF(pre_master_secret, "master secret", client_random + server_random)[0..48]`
pub fn master_secret(pre_master_secret: &[u8], client_random: &[u8], server_random: &[u8]) -> Result<Vec<u8>> {
    let mut seed = Vec::with_capacity(client_random.len() + server_random.len());
    seed.extend_from_slice(client_random);
    seed.extend_from_slice(server_random);
    p_hash(pre_master_secret, &seed_with_label(b"master secret", &seed), MASTER_SECRET_LENGTH)
}

/// Finished message `verify_data = PRF(master_secret, label, Hash(handshake_messages))[0..12]`.
pub fn verify_data(master_secret: &[u8], handshake_hash: &[u8], label: &'static [u8]) -> Result<Vec<u8>> {
    p_hash(master_secret, &seed_with_label(label, handshake_hash), VERIFY_DATA_LENGTH)
}

fn seed_with_label(label: &[u8], seed: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(label.len() + seed.len());
    out.extend_from_slice(label);
    out.extend_from_slice(seed);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p_hash_is_deterministic() {
        let a = p_hash(b"secret", b"seed", 32).unwrap();
        let b = p_hash(b"secret", b"seed", 32).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn longer_output_extends_consistently() {
        let short = p_hash(b"secret", b"seed", 16).unwrap();
        let long = p_hash(b"secret", b"seed", 32).unwrap();
        assert_eq!(&long[..16], short.as_slice());
    }
}
