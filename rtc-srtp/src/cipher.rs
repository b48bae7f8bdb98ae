use aes::{Aes128, Aes256};
use aes::cipher::{KeyIvInit, StreamCipher};
use aes_gcm::{Aes128Gcm, Aes256Gcm, aead::{Aead, KeyInit, Payload}};
use ctr::Ctr128BE;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq;

use crate::error::{Error, Result};
use crate::protection_profile::ProtectionProfile;

/// Per-direction session keys derived once at association time (RFC 3711
/// §4.3), plus the pieces needed to build an IV/nonce and authenticate a
/// packet for whichever profile was negotiated.
pub struct SessionKeys {
    pub profile: ProtectionProfile,
    pub rtp_session_key: Vec<u8>,
    pub rtp_session_salt: Vec<u8>,
    pub rtp_session_auth_key: Vec<u8>,
}

impl SessionKeys {
    /// Builds the 128-bit AES-CM counter block or 96-bit GCM nonce per
    /// RFC 3711 §4.1.1 / RFC 7714 §8.3: the session salt XORed against the
    /// SSRC and packet index placed at fixed bit offsets.
    fn iv(&self, ssrc: u32, roc: u32, seq: u16) -> Vec<u8> {
        if self.profile.is_aead() {
            let mut iv = [0u8; 12];
            iv[2..6].copy_from_slice(&ssrc.to_be_bytes());
            iv[6..10].copy_from_slice(&roc.to_be_bytes());
            iv[10..12].copy_from_slice(&seq.to_be_bytes());
            for (b, s) in iv.iter_mut().zip(self.rtp_session_salt.iter()) {
                *b ^= s;
            }
            iv.to_vec()
        } else {
            let mut iv = [0u8; 16];
            iv[4..8].copy_from_slice(&ssrc.to_be_bytes());
            iv[8..12].copy_from_slice(&roc.to_be_bytes());
            iv[12..14].copy_from_slice(&seq.to_be_bytes());
            for (b, s) in iv.iter_mut().zip(self.rtp_session_salt.iter()) {
                *b ^= s;
            }
            iv.to_vec()
        }
    }

    fn apply_keystream(&self, iv: &[u8], data: &mut [u8]) {
        match self.rtp_session_key.len() {
            32 => {
                let mut c = Ctr128BE::<Aes256>::new(self.rtp_session_key.as_slice().into(), iv.into());
                c.apply_keystream(data);
            }
            _ => {
                let mut c = Ctr128BE::<Aes128>::new(self.rtp_session_key.as_slice().into(), iv.into());
                c.apply_keystream(data);
            }
        }
    }

    /// Encrypts `plaintext` in place (AES-CM profiles) or returns the
    /// ciphertext+tag (AEAD profiles) for one RTP payload, and appends the
    /// authentication tag this profile uses.
    pub fn protect(&self, header: &[u8], payload: &[u8], ssrc: u32, roc: u32, seq: u16) -> Result<Vec<u8>> {
        let iv = self.iv(ssrc, roc, seq);
        if self.profile.is_aead() {
            let aad = [header, &roc.to_be_bytes()].concat();
            let ciphertext = self.gcm_seal(&iv, payload, &aad)?;
            Ok(ciphertext)
        } else {
            let mut out = payload.to_vec();
            self.apply_keystream(&iv, &mut out);
            let tag = self.auth_tag(header, &out, roc);
            out.extend_from_slice(&tag[..self.profile.auth_tag_len()]);
            Ok(out)
        }
    }

    /// Inverse of `protect`: verifies the tag (constant-time for the HMAC
    /// profiles; the AEAD tag check happens inside the AEAD decrypt itself)
    /// and returns the plaintext payload.
    pub fn unprotect(&self, header: &[u8], protected: &[u8], ssrc: u32, roc: u32, seq: u16) -> Result<Vec<u8>> {
        let iv = self.iv(ssrc, roc, seq);
        if self.profile.is_aead() {
            let aad = [header, &roc.to_be_bytes()].concat();
            self.gcm_open(&iv, protected, &aad)
        } else {
            let tag_len = self.profile.auth_tag_len();
            if protected.len() < tag_len {
                return Err(Error::PacketTooShort);
            }
            let (ciphertext, tag) = protected.split_at(protected.len() - tag_len);
            let expected = self.auth_tag(header, ciphertext, roc);
            if expected[..tag_len].ct_eq(tag).unwrap_u8() != 1 {
                return Err(Error::AuthenticationFailed);
            }
            let mut out = ciphertext.to_vec();
            self.apply_keystream(&iv, &mut out);
            Ok(out)
        }
    }

    fn auth_tag(&self, header: &[u8], ciphertext: &[u8], roc: u32) -> [u8; 20] {
        let mut mac = Hmac::<Sha1>::new_from_slice(&self.rtp_session_auth_key).expect("hmac accepts any key length");
        mac.update(header);
        mac.update(ciphertext);
        mac.update(&roc.to_be_bytes());
        let tag = mac.finalize().into_bytes();
        let mut out = [0u8; 20];
        out.copy_from_slice(&tag);
        out
    }

    fn gcm_seal(&self, iv: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let payload = Payload { msg: plaintext, aad };
        match self.rtp_session_key.len() {
            32 => {
                let cipher = Aes256Gcm::new(self.rtp_session_key.as_slice().into());
                cipher.encrypt(iv.into(), payload).map_err(|_| Error::AuthenticationFailed)
            }
            _ => {
                let cipher = Aes128Gcm::new(self.rtp_session_key.as_slice().into());
                cipher.encrypt(iv.into(), payload).map_err(|_| Error::AuthenticationFailed)
            }
        }
    }

    fn gcm_open(&self, iv: &[u8], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let payload = Payload { msg: ciphertext, aad };
        match self.rtp_session_key.len() {
            32 => {
                let cipher = Aes256Gcm::new(self.rtp_session_key.as_slice().into());
                cipher.decrypt(iv.into(), payload).map_err(|_| Error::AuthenticationFailed)
            }
            _ => {
                let cipher = Aes128Gcm::new(self.rtp_session_key.as_slice().into());
                cipher.decrypt(iv.into(), payload).map_err(|_| Error::AuthenticationFailed)
            }
        }
    }
}
