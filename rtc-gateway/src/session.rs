//! Session engine (component C6) and its owned streams. A `Session` is one
//! negotiated `m=` SDP exchange; a `Stream` is one of its media lines,
//! carrying exactly one ICE checklist, one DTLS handshake per candidate
//! pair it has heard from, and (once DTLS completes) one SRTP context pair.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use ice::{Candidate, Checklist};

use crate::cert::Identity;
use crate::config::GatewayConfig;
use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Running,
    Completed,
    Failed,
}

/// One `m=` line: its checklist, ICE credentials, DTLS connections (one per
/// candidate pair under active handshake), and the SRTP context installed
/// once that stream's DTLS completes on the nominated pair.
pub struct Stream {
    pub index: usize,
    pub local_ufrag: String,
    pub local_pwd: String,
    pub remote_ufrag: Option<String>,
    pub remote_pwd: Option<String>,
    pub remote_fingerprint: Option<String>,
    pub local_ssrc: u32,
    pub remote_ssrc: Option<u32>,
    /// Negotiated RTP payload type number (the `m=` line's single format,
    /// e.g. `111` for Opus) this stream rewrites onto every outbound packet.
    pub payload_format: u8,
    pub checklist: Checklist,
    pub dtls: HashMap<SocketAddr, dtls::Connection>,
    pub srtp: Option<srtp::SrtpConfig>,
    /// Named internal loop attachments this stream fans inbound RTP out to,
    /// resolved once on `talk{on:true}` (see `forwarding::LoopTable`).
    pub loops: HashMap<String, SocketAddr>,
    pub end_of_candidates: bool,
}

impl Stream {
    fn new(index: usize, local_ssrc: u32) -> Self {
        Stream {
            index,
            local_ufrag: shared::util::math_rand_alpha_number(4),
            local_pwd: shared::util::math_rand_alpha_number(22),
            remote_ufrag: None,
            remote_pwd: None,
            remote_fingerprint: None,
            local_ssrc,
            remote_ssrc: None,
            payload_format: 111,
            checklist: Checklist::new(),
            dtls: HashMap::new(),
            srtp: None,
            loops: HashMap::new(),
            end_of_candidates: false,
        }
    }

    pub fn is_srtp_ready(&self) -> bool {
        self.srtp.is_some()
    }

    /// Installs the SRTP context from exported DTLS keying material once a
    /// pair's handshake has finished, per RFC 5764 §4.2.
    fn install_srtp(&mut self, profile: dtls::SrtpProfile, keying_material: &[u8]) -> Result<()> {
        let profile = map_profile(profile);
        let config = srtp::SrtpConfig::from_keying_material(profile, keying_material, srtp::ContextSide::Server)?;
        self.srtp = Some(config);
        Ok(())
    }
}

fn map_profile(p: dtls::SrtpProfile) -> srtp::ProtectionProfile {
    match p {
        dtls::SrtpProfile::Aes128CmSha1_80 => srtp::ProtectionProfile::Aes128CmHmacSha1_80,
        dtls::SrtpProfile::Aes128CmSha1_32 => srtp::ProtectionProfile::Aes128CmHmacSha1_32,
        dtls::SrtpProfile::AeadAes128Gcm => srtp::ProtectionProfile::AeadAes128Gcm,
        dtls::SrtpProfile::AeadAes256Gcm => srtp::ProtectionProfile::AeadAes256Gcm,
    }
}

/// One negotiated ICE/DTLS-SRTP session: a controlling/controlled role, a
/// tiebreaker for RFC 8445 §7.3.1.1 role-conflict resolution, and the
/// streams it owns.
pub struct Session {
    pub uuid: String,
    pub controlling: bool,
    pub tiebreaker: u64,
    pub streams: Vec<Stream>,
    pub state: SessionState,
    last_activity: Instant,
    session_timeout: Duration,
    connectivity_pace: Duration,
    next_pace_tick: Instant,
}

impl Session {
    pub fn new(uuid: impl Into<String>, controlling: bool, config: &GatewayConfig, now: Instant) -> Self {
        use rand::RngCore;
        let mut tb = [0u8; 8];
        rand::rng().fill_bytes(&mut tb);
        Session {
            uuid: uuid.into(),
            controlling,
            tiebreaker: u64::from_be_bytes(tb),
            streams: Vec::new(),
            state: SessionState::Running,
            last_activity: now,
            session_timeout: config.limits.session_timeout(),
            connectivity_pace: config.limits.connectivity_pace(),
            next_pace_tick: now,
        }
    }

    pub fn add_stream(&mut self) -> &mut Stream {
        let index = self.streams.len();
        use rand::RngCore;
        let local_ssrc = rand::rng().next_u32();
        self.streams.push(Stream::new(index, local_ssrc));
        self.streams.last_mut().unwrap()
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    pub fn is_timed_out(&self, now: Instant) -> bool {
        now.duration_since(self.last_activity) >= self.session_timeout
    }

    /// RFC 8445 §7.3.1.1: on a role conflict, the side with the smaller
    /// tiebreaker switches role and recomputes every stream's pair
    /// priorities; the side with the larger tiebreaker keeps its role and
    /// replies with error 487 (handled by the caller).
    pub fn resolve_role_conflict(&mut self, peer_tiebreaker: u64) -> bool {
        if self.tiebreaker < peer_tiebreaker {
            self.controlling = !self.controlling;
            for stream in &mut self.streams {
                stream.checklist.recompute_priorities(self.controlling);
            }
            true
        } else {
            false
        }
    }

    /// One pacing tick across every stream: the next outstanding connectivity
    /// check per stream, falling back to unfreezing a stream with no other
    /// work. Returns `(stream_index, remote_addr, request_bytes)` for every
    /// check this tick fired, empty if the pace interval hasn't elapsed.
    pub fn tick(&mut self, now: Instant) -> Vec<(usize, SocketAddr, BytesMut)> {
        let mut out = Vec::new();
        if now < self.next_pace_tick {
            return out;
        }
        self.next_pace_tick = now + self.connectivity_pace;

        let mut any_work = false;
        for stream in &mut self.streams {
            if let Some(remote) = stream.checklist.next_check() {
                any_work = true;
                let Some(remote_ufrag) = stream.remote_ufrag.clone() else { continue };
                let Some(remote_pwd) = stream.remote_pwd.clone() else { continue };
                let use_candidate = self.controlling && stream.checklist.best_nomination_candidate() == Some(remote);
                stream.checklist.mark_in_progress(remote, stun::TransactionId::random());
                if let Ok((_tid, buf)) = stream.checklist.build_binding_request(
                    remote,
                    &stream.local_ufrag,
                    &remote_ufrag,
                    remote_pwd.as_bytes(),
                    self.controlling,
                    self.tiebreaker,
                    use_candidate,
                ) {
                    out.push((stream.index, remote, buf));
                }
            }
        }
        if !any_work {
            for stream in &mut self.streams {
                if stream.checklist.unfreeze() {
                    break;
                }
            }
        }
        out
    }

    /// Reduces per-stream checklist state to one session-wide state, per the
    /// nomination-driven RUNNING/COMPLETED/FAILED rollup.
    pub fn reduce_state(&mut self, now: Instant) -> SessionState {
        if self.is_timed_out(now) {
            self.state = SessionState::Failed;
            return self.state;
        }
        let all_selected = !self.streams.is_empty() && self.streams.iter().all(|s| s.checklist.selected.is_some());
        let all_ready = all_selected && self.streams.iter().all(|s| s.is_srtp_ready());
        let any_failed = self.streams.iter().any(|s| {
            s.checklist.selected.is_none() && s.checklist.pairs().iter().all(|p| p.state == ice::PairState::Failed)
        });
        self.state = if all_ready {
            SessionState::Completed
        } else if any_failed {
            SessionState::Failed
        } else {
            SessionState::Running
        };
        self.state
    }

    /// Drives the DTLS handshake for `remote` on `stream_index`, creating a
    /// new `dtls::Connection` on the first datagram seen from that pair.
    /// Installs SRTP the moment the handshake finishes.
    pub fn handle_dtls_datagram(
        &mut self,
        stream_index: usize,
        remote: SocketAddr,
        datagram: &[u8],
        identity: &Identity,
        config: &GatewayConfig,
        now: Instant,
    ) -> Result<Vec<BytesMut>> {
        let stream = self.streams.get_mut(stream_index).ok_or_else(|| Error::InternalInvariant("stream index".into()))?;
        let conn = stream.dtls.entry(remote).or_insert_with(|| {
            let mut dtls_config = dtls::DtlsConfig::new(identity.certificate_der.clone(), identity.private_key.clone());
            dtls_config.srtp_profiles = config.srtp_profiles_parsed();
            dtls_config.cookie_pool_size = config.dtls_key_pool.quantity;
            dtls_config.cookie_length = config.dtls_key_pool.length;
            dtls_config.cookie_key_lifetime = Duration::from_micros(config.dtls_key_pool.lifetime_usecs);
            dtls::Connection::new(dtls_config, remote)
        });
        let was_established = conn.is_established();
        let out = conn.handle_datagram(datagram, now)?;
        if !was_established && conn.is_established() {
            match stream.checklist.selected {
                // ICE has converged on this very pair: safe to install.
                Some(selected) if selected == remote => {
                    let profile = conn.negotiated_srtp_profile().ok_or(dtls::Error::NoMatchingSrtpProfile)?;
                    let (key_len, salt_len) = profile.key_salt_lengths();
                    let keying_material = shared::crypto::KeyingMaterialExporter::export_keying_material(
                        conn.state(),
                        "EXTRACTOR-dtls_srtp",
                        &[],
                        2 * (key_len + salt_len),
                    )?;
                    stream.install_srtp(profile, &keying_material)?;
                }
                // STUN nominated a different pair: this handshake's keying
                // material cannot be trusted for the media path ICE picked.
                Some(_) => {
                    self.state = SessionState::Failed;
                }
                // ICE has not nominated a pair yet; wait for it to converge
                // before trusting this handshake's keying material.
                None => {}
            }
        }
        Ok(out)
    }
}

/// A `candidate::priority()` call needs a component id the gateway always
/// fixes to 1 (rtcp-mux), so host candidates are built directly here rather
/// than importing the crate's component constant.
pub fn host_candidate(foundation: impl Into<String>, addr: SocketAddr) -> Candidate {
    Candidate::host(foundation, addr, u16::MAX)
}
