//! RFC 3711 §4.3.1 key derivation: each session key/salt/auth-key is AES-CM
//! keystream from the master key, keyed by a one-byte label and (with
//! `key_derivation_rate` fixed at zero, as this gateway never re-derives)
//! index zero.

use aes::{Aes128, Aes256};
use aes::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;

pub const LABEL_RTP_ENCRYPTION: u8 = 0x00;
pub const LABEL_RTP_AUTHENTICATION: u8 = 0x01;
pub const LABEL_RTP_SALT: u8 = 0x02;
pub const LABEL_RTCP_ENCRYPTION: u8 = 0x03;
pub const LABEL_RTCP_AUTHENTICATION: u8 = 0x04;
pub const LABEL_RTCP_SALT: u8 = 0x05;

/// `master_salt` must be 14 bytes (112 bits); shorter AEAD salts are
/// zero-extended by the caller before invoking this, matching how the
/// master key itself is always AES's full block-cipher key width.
pub fn derive(master_key: &[u8], master_salt: &[u8], label: u8, out_len: usize) -> Vec<u8> {
    let mut iv = [0u8; 16];
    iv[..master_salt.len().min(14)].copy_from_slice(&master_salt[..master_salt.len().min(14)]);
    iv[7] ^= label;

    let mut out = vec![0u8; out_len];
    match master_key.len() {
        32 => {
            let mut cipher = Ctr128BE::<Aes256>::new(master_key.into(), &iv.into());
            cipher.apply_keystream(&mut out);
        }
        _ => {
            let mut cipher = Ctr128BE::<Aes128>::new(master_key.into(), &iv.into());
            cipher.apply_keystream(&mut out);
        }
    }
    out
}
