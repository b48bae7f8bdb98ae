//! Transport demultiplexer (component C7): one external UDP socket shared
//! by every session, dispatched per RFC 7983's byte-range rule, plus the
//! `(host,port) -> stream` lookup the original multiplexing proxy keeps to
//! route a datagram without first decoding it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use bytes::BytesMut;
use stun::{attributes, Class, Message, BINDING};

use crate::cert::Identity;
use crate::config::GatewayConfig;
use crate::error::{Error, Result};
use crate::forwarding;
use crate::session::{host_candidate, Session};

/// A datagram this gateway needs to emit, tagged with which socket it goes
/// out on: the shared external port (STUN/DTLS handshake traffic, or SRTP
/// back to the browser) or one of a stream's internal loop attachments.
pub enum Outbound {
    External(SocketAddr, BytesMut),
    Internal(SocketAddr, BytesMut),
}

/// Where a multiplexed session's external traffic lands. This gateway only
/// implements the single shared-port variant; a `PortAllocator` that hands
/// out a fresh socket per stream (the "dynamic" proxy variant) is a
/// documented seam, not an implemented one — see `DynamicPortAllocator`.
pub trait PortAllocator {
    fn allocate(&mut self) -> Result<SocketAddr>;
}

/// The only allocator this gateway wires up: every stream of every session
/// shares the one external socket the gateway was configured with.
pub struct MultiplexedPortAllocator {
    external: SocketAddr,
}

impl MultiplexedPortAllocator {
    pub fn new(external: SocketAddr) -> Self {
        MultiplexedPortAllocator { external }
    }
}

impl PortAllocator for MultiplexedPortAllocator {
    fn allocate(&mut self) -> Result<SocketAddr> {
        Ok(self.external)
    }
}

/// Owns every live session and the two lookup tables that let an inbound
/// datagram find its stream without a linear scan: by remote address (once
/// a pair has been learned) and by local ufrag (to resolve the very first
/// STUN request from an address no pair yet references).
pub struct Proxy {
    pub external_addr: SocketAddr,
    pub sessions: HashMap<String, Session>,
    peer_index: HashMap<SocketAddr, (String, usize)>,
    ufrag_index: HashMap<String, (String, usize)>,
    port_allocator: Box<dyn PortAllocator + Send>,
}

impl Proxy {
    pub fn new(external_addr: SocketAddr) -> Self {
        Proxy {
            external_addr,
            sessions: HashMap::new(),
            peer_index: HashMap::new(),
            ufrag_index: HashMap::new(),
            port_allocator: Box::new(MultiplexedPortAllocator::new(external_addr)),
        }
    }

    pub fn session(&self, uuid: &str) -> Option<&Session> {
        self.sessions.get(uuid)
    }

    pub fn session_mut(&mut self, uuid: &str) -> Option<&mut Session> {
        self.sessions.get_mut(uuid)
    }

    pub fn remove_session(&mut self, uuid: &str) -> Option<Session> {
        self.peer_index.retain(|_, (sid, _)| sid != uuid);
        self.ufrag_index.retain(|_, (sid, _)| sid != uuid);
        self.sessions.remove(uuid)
    }

    /// Registers a stream's local ufrag so the first connectivity check
    /// arriving from an unseen address can be routed by USERNAME alone.
    pub fn index_stream(&mut self, session_uuid: &str, stream_index: usize, local_ufrag: &str) {
        self.ufrag_index.insert(local_ufrag.to_string(), (session_uuid.to_string(), stream_index));
    }

    pub fn external_socket_for(&mut self) -> Result<SocketAddr> {
        self.port_allocator.allocate()
    }

    /// RFC 7983 dispatch for one datagram arriving on the external socket.
    pub fn handle_external_datagram(
        &mut self,
        source: SocketAddr,
        datagram: &[u8],
        identity: &Identity,
        config: &GatewayConfig,
        now: Instant,
    ) -> Result<Vec<Outbound>> {
        if Message::is_message(datagram) {
            return self.handle_stun(source, datagram);
        }
        let Some((session_uuid, stream_index)) = self.peer_index.get(&source).cloned() else {
            return Ok(Vec::new());
        };
        let Some(session) = self.sessions.get_mut(&session_uuid) else {
            return Ok(Vec::new());
        };

        if shared::util::match_dtls(datagram) {
            let out = session.handle_dtls_datagram(stream_index, source, datagram, identity, config, now)?;
            return Ok(out.into_iter().map(|b| Outbound::External(source, b)).collect());
        }

        if shared::util::match_srtp(datagram) {
            let Some(stream) = session.streams.get_mut(stream_index) else {
                return Ok(Vec::new());
            };
            let plaintext = forwarding::unprotect_inbound(stream, datagram)?;
            return Ok(stream
                .loops
                .values()
                .map(|loop_addr| Outbound::Internal(*loop_addr, plaintext.clone()))
                .collect());
        }

        // SRTCP and anything else unmultiplexed is not forwarded: this
        // gateway's downstream mixer only consumes media, not RTCP reports.
        Ok(Vec::new())
    }

    fn handle_stun(&mut self, source: SocketAddr, datagram: &[u8]) -> Result<Vec<Outbound>> {
        let msg = Message::decode(datagram)?;
        match msg.class {
            Class::Request if msg.method == BINDING => self.handle_binding_request(source, datagram, &msg),
            Class::Success | Class::Error => self.handle_binding_reply(source, &msg),
            _ => Ok(Vec::new()),
        }
    }

    fn handle_binding_request(&mut self, source: SocketAddr, raw: &[u8], msg: &Message) -> Result<Vec<Outbound>> {
        let Some(username_attr) = msg.get(attributes::USERNAME) else {
            // Plain, ICE-less STUN: no credentials to check against, no pair
            // to learn — just tell the sender what address we saw it from.
            let tid = msg.transaction_id;
            let response = Message::build(Class::Success, BINDING, tid)
                .with_attribute(attributes::xor_mapped_address(source, &tid))
                .encode();
            return Ok(vec![Outbound::External(source, response)]);
        };
        let username = attributes::decode_username(username_attr)?;
        let (local_ufrag, _remote_ufrag) = username.split_once(':').ok_or(Error::StunUnauthorized)?;

        let (session_uuid, stream_index) = match self.peer_index.get(&source) {
            Some(key) => key.clone(),
            None => self.ufrag_index.get(local_ufrag).cloned().ok_or(Error::StunUnauthorized)?,
        };
        let Some(session) = self.sessions.get_mut(&session_uuid) else {
            return Err(Error::StunUnauthorized);
        };
        let Some(stream) = session.streams.get_mut(stream_index) else {
            return Err(Error::StunUnauthorized);
        };

        if !Message::verify_message_integrity(raw, mi_offset(raw), stream.local_pwd.as_bytes()) {
            return Err(Error::StunUnauthorized);
        }

        if let Some(conflict) = check_role_conflict(msg, session.controlling) {
            if !session.resolve_role_conflict(conflict) {
                let tid = msg.transaction_id;
                let err = ice::Checklist::build_role_conflict_error(tid);
                return Ok(vec![Outbound::External(source, err)]);
            }
        }

        // A request with no PRIORITY carries nothing a pair could be built
        // from; answer it but do not learn a peer-reflexive candidate.
        let priority = msg.get(attributes::PRIORITY).and_then(|a| attributes::decode_priority(a).ok());
        if let Some(priority) = priority {
            if self.peer_index.get(&source).is_none() {
                let local = host_candidate("host-1", self.external_addr);
                stream.checklist.learn_peer_reflexive(local, source, priority, session.controlling);
                self.peer_index.insert(source, (session_uuid.clone(), stream_index));
            }
        }

        if msg.get(attributes::USE_CANDIDATE).is_some() {
            stream.checklist.observe_use_candidate(source);
        }

        let tid = msg.transaction_id;
        let response = ice::Checklist::build_binding_success(tid, source, stream.local_pwd.as_bytes())?;
        Ok(vec![Outbound::External(source, response)])
    }

    fn handle_binding_reply(&mut self, source: SocketAddr, msg: &Message) -> Result<Vec<Outbound>> {
        let Some((session_uuid, stream_index)) = self.peer_index.get(&source).cloned() else {
            return Ok(Vec::new());
        };
        let Some(session) = self.sessions.get_mut(&session_uuid) else {
            return Ok(Vec::new());
        };
        let Some(stream) = session.streams.get_mut(stream_index) else {
            return Ok(Vec::new());
        };

        match msg.class {
            Class::Success => {
                let Some(remote) = stream.checklist.find_by_transaction(msg.transaction_id, source) else {
                    return Ok(Vec::new());
                };
                stream.checklist.handle_success(remote, session.controlling);
                if session.controlling {
                    if let Some(candidate) = stream.checklist.best_nomination_candidate() {
                        stream.checklist.nominate(candidate);
                    }
                }
            }
            Class::Error => {
                if let Some(remote) = stream.checklist.find_by_transaction(msg.transaction_id, source) {
                    stream.checklist.handle_failure(remote);
                }
            }
            _ => {}
        }
        Ok(Vec::new())
    }
}

/// RFC 8445 §7.3.1.1: a conflict exists when our stored role and the
/// request's role attribute agree (both controlling, or both controlled).
/// Returns the peer's tiebreaker when that's the case, so the caller can
/// decide who yields.
fn check_role_conflict(msg: &Message, we_are_controlling: bool) -> Option<u64> {
    if we_are_controlling {
        msg.get(attributes::ICE_CONTROLLING).and_then(|a| attributes::decode_tiebreaker(a).ok())
    } else {
        msg.get(attributes::ICE_CONTROLLED).and_then(|a| attributes::decode_tiebreaker(a).ok())
    }
}

/// MESSAGE-INTEGRITY sits right before FINGERPRINT when both are present
/// (this gateway always receives both from spec-conformant ICE agents);
/// its offset is the total length minus the 8-byte FINGERPRINT attribute
/// and the 24-byte MESSAGE-INTEGRITY attribute.
fn mi_offset(raw: &[u8]) -> usize {
    raw.len().saturating_sub(8 + 24)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_source_without_stun_is_dropped() {
        let mut proxy = Proxy::new("127.0.0.1:9".parse().unwrap());
        let identity = crate::cert::Identity::generate().unwrap();
        let config = GatewayConfig::new("127.0.0.1", 9);
        let out = proxy
            .handle_external_datagram("203.0.113.5:5000".parse().unwrap(), &[0x80, 0x60, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], &identity, &config, Instant::now())
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn role_conflict_detected_when_both_sides_claim_controlling() {
        let tid = stun::TransactionId::random();
        let msg = Message::build(Class::Request, BINDING, tid).with_attribute(attributes::ice_controlling(42));
        assert_eq!(check_role_conflict(&msg, true), Some(42));
        assert_eq!(check_role_conflict(&msg, false), None);
    }
}
