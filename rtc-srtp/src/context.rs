use std::collections::HashMap;

use crate::cipher::SessionKeys;
use crate::error::{Error, Result};
use crate::key_derivation::{self, LABEL_RTP_AUTHENTICATION, LABEL_RTP_ENCRYPTION, LABEL_RTP_SALT};
use crate::protection_profile::ProtectionProfile;

const REPLAY_WINDOW_SIZE: u64 = 64;

/// Per-SSRC rollover-counter and replay state (RFC 3711 Appendix A). One of
/// these exists per direction per SSRC this context has seen.
struct SsrcState {
    roc: u32,
    highest_seq: u16,
    seen_any: bool,
    replay_window: u64,
}

impl SsrcState {
    fn new() -> Self {
        SsrcState {
            roc: 0,
            highest_seq: 0,
            seen_any: false,
            replay_window: 0,
        }
    }

    /// Guesses the rollover counter for an arriving `seq`, per RFC 3711's
    /// "nearest index" rule: half of the 16-bit space wraps forward, half
    /// wraps back, so whichever interpretation keeps the packet close to
    /// the last-seen index wins.
    fn estimate_roc(&self, seq: u16) -> u32 {
        if !self.seen_any {
            return self.roc;
        }
        let half = 1u32 << 15;
        let diff = seq as i32 - self.highest_seq as i32;
        if self.highest_seq as i32 >= half as i32 - 1 {
            if diff > half as i32 {
                self.roc.wrapping_sub(1)
            } else {
                self.roc
            }
        } else if diff < -(half as i32) {
            self.roc.wrapping_add(1)
        } else {
            self.roc
        }
    }

    fn index(&self, seq: u16) -> (u32, u64) {
        let roc = self.estimate_roc(seq);
        (roc, ((roc as u64) << 16) | seq as u64)
    }

    fn accept(&mut self, seq: u16) -> Result<()> {
        let (roc, index) = self.index(seq);
        if self.seen_any {
            let (_, highest_index) = self.index(self.highest_seq);
            if index + REPLAY_WINDOW_SIZE <= highest_index {
                return Err(Error::Replayed);
            }
            if index <= highest_index {
                let back = (highest_index - index) as u32;
                if back < REPLAY_WINDOW_SIZE as u32 && self.replay_window & (1 << back) != 0 {
                    return Err(Error::Replayed);
                }
                self.replay_window |= 1 << back;
                return Ok(());
            }
            let shift = (index - highest_index).min(REPLAY_WINDOW_SIZE);
            self.replay_window = if shift >= REPLAY_WINDOW_SIZE { 0 } else { self.replay_window << shift };
            self.replay_window |= 1;
        } else {
            self.replay_window = 1;
        }
        self.roc = roc;
        self.highest_seq = seq;
        self.seen_any = true;
        Ok(())
    }
}

/// One SRTP cryptographic context, bound to a single DTLS-derived master
/// key/salt pair and profile, tracking per-SSRC rollover/replay state for
/// every SSRC multiplexed over the session's one 5-tuple.
pub struct SrtpContext {
    keys: SessionKeys,
    send_state: HashMap<u32, SsrcState>,
    recv_state: HashMap<u32, SsrcState>,
}

impl SrtpContext {
    pub fn new(profile: ProtectionProfile, master_key: &[u8], master_salt: &[u8]) -> Self {
        let rtp_session_key = key_derivation::derive(master_key, master_salt, LABEL_RTP_ENCRYPTION, profile.key_len());
        let rtp_session_salt = key_derivation::derive(master_key, master_salt, LABEL_RTP_SALT, profile.salt_len());
        let rtp_session_auth_key = if profile.is_aead() {
            Vec::new()
        } else {
            key_derivation::derive(master_key, master_salt, LABEL_RTP_AUTHENTICATION, 20)
        };
        SrtpContext {
            keys: SessionKeys {
                profile,
                rtp_session_key,
                rtp_session_salt,
                rtp_session_auth_key,
            },
            send_state: HashMap::new(),
            recv_state: HashMap::new(),
        }
    }

    /// Encrypts and authenticates one RTP packet. `header` is the 12-byte
    /// (or longer, with CSRCs) fixed RTP header; `payload` is everything
    /// after it. Advances this SSRC's send rollover state.
    pub fn protect(&mut self, header: &[u8], payload: &[u8], ssrc: u32, seq: u16) -> Result<Vec<u8>> {
        let state = self.send_state.entry(ssrc).or_insert_with(SsrcState::new);
        let roc = state.estimate_roc(seq);
        let protected = self.keys.protect(header, payload, ssrc, roc, seq)?;
        state.accept(seq)?;
        Ok(protected)
    }

    /// Decrypts and verifies one RTP packet, rejecting replays and stale
    /// indices outside the replay window.
    pub fn unprotect(&mut self, header: &[u8], protected: &[u8], ssrc: u32, seq: u16) -> Result<Vec<u8>> {
        let state = self.recv_state.entry(ssrc).or_insert_with(SsrcState::new);
        let roc = state.estimate_roc(seq);
        let plaintext = self.keys.unprotect(header, protected, ssrc, roc, seq)?;
        state.accept(seq)?;
        Ok(plaintext)
    }

    #[cfg(test)]
    pub(crate) fn debug_key(&self) -> &[u8] {
        &self.keys.rtp_session_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(profile: ProtectionProfile) -> (Vec<u8>, Vec<u8>) {
        (vec![0x11; profile.key_len()], vec![0x22; profile.salt_len()])
    }

    #[test]
    fn aes_cm_protect_unprotect_roundtrips() {
        let profile = ProtectionProfile::Aes128CmHmacSha1_80;
        let (key, salt) = keys(profile);
        let mut sender = SrtpContext::new(profile, &key, &salt);
        let mut receiver = SrtpContext::new(profile, &key, &salt);

        let header = [0x80u8, 0x60, 0x00, 0x01, 0, 0, 0, 1, 0xDE, 0xAD, 0xBE, 0xEF];
        let payload = b"opus frame payload";
        let protected = sender.protect(&header, payload, 0xDEADBEEF, 1).unwrap();
        let recovered = receiver.unprotect(&header, &protected, 0xDEADBEEF, 1).unwrap();
        assert_eq!(recovered, payload);
    }

    #[test]
    fn aead_gcm_protect_unprotect_roundtrips() {
        let profile = ProtectionProfile::AeadAes128Gcm;
        let (key, salt) = keys(profile);
        let mut sender = SrtpContext::new(profile, &key, &salt);
        let mut receiver = SrtpContext::new(profile, &key, &salt);

        let header = [0x80u8, 0x60, 0x00, 0x02, 0, 0, 0, 2, 0xDE, 0xAD, 0xBE, 0xEF];
        let payload = b"another payload";
        let protected = sender.protect(&header, payload, 0xDEADBEEF, 2).unwrap();
        let recovered = receiver.unprotect(&header, &protected, 0xDEADBEEF, 2).unwrap();
        assert_eq!(recovered, payload);
    }

    #[test]
    fn replayed_sequence_number_is_rejected() {
        let profile = ProtectionProfile::Aes128CmHmacSha1_80;
        let (key, salt) = keys(profile);
        let mut sender = SrtpContext::new(profile, &key, &salt);
        let mut receiver = SrtpContext::new(profile, &key, &salt);

        let header = [0x80u8, 0x60, 0x00, 0x05, 0, 0, 0, 3, 0xDE, 0xAD, 0xBE, 0xEF];
        let protected = sender.protect(&header, b"x", 0xDEADBEEF, 5).unwrap();
        receiver.unprotect(&header, &protected, 0xDEADBEEF, 5).unwrap();
        let err = receiver.unprotect(&header, &protected, 0xDEADBEEF, 5).unwrap_err();
        assert!(matches!(err, Error::Replayed));
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let profile = ProtectionProfile::Aes128CmHmacSha1_80;
        let (key, salt) = keys(profile);
        let mut sender = SrtpContext::new(profile, &key, &salt);
        let mut receiver = SrtpContext::new(profile, &key, &salt);

        let header = [0x80u8, 0x60, 0x00, 0x06, 0, 0, 0, 4, 0xDE, 0xAD, 0xBE, 0xEF];
        let mut protected = sender.protect(&header, b"payload", 0xDEADBEEF, 6).unwrap();
        protected[0] ^= 0xFF;
        let err = receiver.unprotect(&header, &protected, 0xDEADBEEF, 6).unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailed));
    }
}
