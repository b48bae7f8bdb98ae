use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

use bytes::{Buf, BufMut, BytesMut};
use p256::ecdsa::signature::Signer;

use crate::config::DtlsConfig;
use crate::cookie::CookieStore;
use crate::error::{Error, Result};
use crate::flight::Flight;
use crate::handshake::{
    CertificateMessage, ClientHello, ClientKeyExchange, Finished, HelloVerifyRequest, ServerHello, ServerKeyExchange,
};
use crate::record::{ContentType, HandshakeHeader, HandshakeType, RecordHeader};
use crate::state::ConnectionState;

/// RFC 6347 §4.2.4's generic retransmission states, specialized: we are
/// always the flight's sender after Flight0, so there is no analogue of the
/// teacher's client-side "waiting on our own ChangeCipherSpec" substates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HandshakeState {
    WaitingFlight0,
    WaitingFlight2,
    WaitingFlight6,
    Finished,
    Errored,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

pub struct Connection {
    config: DtlsConfig,
    cookies: CookieStore,
    state: ConnectionState,
    flight: Flight,
    handshake_state: HandshakeState,
    message_seq: u16,
    last_flight: Vec<BytesMut>,
    retransmit_count: u32,
    next_retransmit_deadline: Option<Instant>,
    peer_addr: SocketAddr,
}

impl Connection {
    pub fn new(config: DtlsConfig, peer_addr: SocketAddr) -> Self {
        let cookies = CookieStore::with_params(config.cookie_pool_size, config.cookie_length, config.cookie_key_lifetime);
        Connection {
            config,
            cookies,
            state: ConnectionState::new(),
            flight: Flight::Flight0,
            handshake_state: HandshakeState::WaitingFlight0,
            message_seq: 0,
            last_flight: Vec::new(),
            retransmit_count: 0,
            next_retransmit_deadline: None,
            peer_addr,
        }
    }

    pub fn is_established(&self) -> bool {
        self.handshake_state == HandshakeState::Finished
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn negotiated_srtp_profile(&self) -> Option<crate::srtp_profile::SrtpProfile> {
        self.state.srtp_profile
    }

    /// Feeds one UDP datagram's worth of DTLS records through the handshake.
    /// Returns the records to send back, if any. A datagram after the
    /// handshake is Finished and carrying `ApplicationData` is rejected —
    /// application data (SRTP) never rides the DTLS channel in this gateway.
    pub fn handle_datagram(&mut self, datagram: &[u8], now: Instant) -> Result<Vec<BytesMut>> {
        let mut cursor = datagram;
        while !cursor.is_empty() {
            if cursor.len() < RecordHeader::SIZE {
                return Err(Error::RecordTooShort);
            }
            let header = RecordHeader::decode(cursor)?;
            let body_start = RecordHeader::SIZE;
            let body_end = body_start + header.length as usize;
            if cursor.len() < body_end {
                return Err(Error::RecordTooShort);
            }
            let body = &cursor[body_start..body_end];
            match header.content_type {
                ContentType::Handshake => self.handle_handshake_record(body)?,
                ContentType::ChangeCipherSpec => {
                    // No-op marker in this single-epoch server flow: the
                    // client's subsequent Finished is still read in the
                    // clear since record protection only begins once the
                    // SRTP keys are exported, not a DTLS application-data
                    // epoch.
                }
                ContentType::Alert => return Err(Error::UnexpectedMessage(header.content_type.id())),
                ContentType::ApplicationData => return Err(Error::UnexpectedMessage(header.content_type.id())),
            }
            cursor = &cursor[body_end..];
        }
        self.drive(now)
    }

    fn handle_handshake_record(&mut self, body: &[u8]) -> Result<()> {
        let mut cursor = body;
        while cursor.remaining() >= HandshakeHeader::SIZE {
            let header = HandshakeHeader::decode(&mut cursor)?;
            let msg_len = header.length as usize;
            if cursor.remaining() < msg_len {
                return Err(Error::HandshakeMessageTooShort);
            }
            let msg_body = &cursor[..msg_len];
            cursor.advance(msg_len);
            let transcript_entry = transcript_record(header.msg_type, msg_body);

            match (self.flight, header.msg_type) {
                (Flight::Flight0, HandshakeType::ClientHello) => {
                    self.on_first_client_hello(msg_body)?;
                }
                (Flight::Flight2, HandshakeType::ClientHello) => {
                    self.on_verified_client_hello(msg_body, &transcript_entry)?;
                }
                (Flight::Flight4, HandshakeType::ClientKeyExchange) => {
                    self.state.record_handshake_message(&transcript_entry);
                    let client_key_exchange = ClientKeyExchange::decode(msg_body)?;
                    self.state.derive_master_secret(&client_key_exchange.public_key)?;
                }
                (Flight::Flight4, HandshakeType::Finished) => {
                    let finished = Finished::decode(msg_body);
                    let expected = self.state.verify_data(true)?;
                    if finished.verify_data != expected {
                        self.handshake_state = HandshakeState::Errored;
                        return Err(Error::FinishedMismatch);
                    }
                    self.state.record_handshake_message(&transcript_entry);
                    self.flight = Flight::Flight6;
                }
                _ => {
                    // Stray retransmit of an earlier flight's message;
                    // ignore rather than erroring, since UDP may reorder
                    // or duplicate client retransmissions.
                }
            }
        }
        Ok(())
    }

    fn on_first_client_hello(&mut self, msg_body: &[u8]) -> Result<()> {
        let client_hello = ClientHello::decode(msg_body)?;
        let cookie = self.cookies.generate(self.peer_addr);
        self.state.client_random = Some(client_hello.random);
        self.handshake_state = HandshakeState::WaitingFlight2;
        self.flight = Flight::Flight2;
        self.last_flight = vec![self.build_hello_verify_request(cookie)];
        Ok(())
    }

    fn on_verified_client_hello(&mut self, msg_body: &[u8], transcript_entry: &[u8]) -> Result<()> {
        let client_hello = ClientHello::decode(msg_body)?;
        if !self.cookies.verify(self.peer_addr, &client_hello.cookie) {
            return Err(Error::CookieMismatch);
        }
        self.state.record_handshake_message(transcript_entry);
        self.state.client_random = Some(client_hello.random);
        self.state.extended_master_secret = client_hello.extended_master_secret;

        let cipher_suite = client_hello.select_cipher_suite()?;
        let _named_curve = client_hello.select_curve()?;
        let srtp_profile = client_hello.select_srtp_profile(&self.config.srtp_profiles)?;
        self.state.srtp_profile = Some(srtp_profile);

        self.flight = Flight::Flight4;
        self.handshake_state = HandshakeState::WaitingFlight6;
        self.last_flight = self.build_flight4(cipher_suite, srtp_profile)?;
        Ok(())
    }

    fn build_flight4(
        &mut self,
        cipher_suite: u16,
        srtp_profile: crate::srtp_profile::SrtpProfile,
    ) -> Result<Vec<BytesMut>> {
        let server_hello = ServerHello {
            random: self.state.server_random.clone(),
            cipher_suite,
            srtp_profile,
            extended_master_secret: self.state.extended_master_secret,
        };
        let server_hello_raw = self.wrap_handshake(HandshakeType::ServerHello, &server_hello.encode());

        let certificate = CertificateMessage {
            certificate_der: self.config.certificate_der.clone(),
        };
        let certificate_raw = self.wrap_handshake(HandshakeType::Certificate, &certificate.encode());

        let server_point = self.state.generate_server_keypair();
        let public_key = server_point.as_bytes().to_vec();
        let client_random = self
            .state
            .client_random
            .as_ref()
            .expect("client random recorded before flight4")
            .to_bytes();
        let server_random = self.state.server_random.to_bytes();
        let signed = ServerKeyExchange::signed_params(
            &client_random,
            &server_random,
            crate::handshake::NAMED_CURVE_SECP256R1,
            &public_key,
        );
        let signature: p256::ecdsa::Signature = self.config.private_key.sign(&signed);
        let server_key_exchange = ServerKeyExchange {
            named_curve: crate::handshake::NAMED_CURVE_SECP256R1,
            public_key,
            signature: signature.to_der().as_bytes().to_vec(),
        };
        let ske_raw = self.wrap_handshake(HandshakeType::ServerKeyExchange, &server_key_exchange.encode());

        let hello_done_raw = self.wrap_handshake(HandshakeType::ServerHelloDone, &BytesMut::new());

        self.state.record_handshake_message(&transcript_record(HandshakeType::ServerHello, &server_hello.encode()));
        self.state
            .record_handshake_message(&transcript_record(HandshakeType::Certificate, &certificate.encode()));
        self.state
            .record_handshake_message(&transcript_record(HandshakeType::ServerKeyExchange, &server_key_exchange.encode()));
        self.state
            .record_handshake_message(&transcript_record(HandshakeType::ServerHelloDone, &[]));

        Ok(vec![
            self.wrap_record(ContentType::Handshake, &server_hello_raw),
            self.wrap_record(ContentType::Handshake, &certificate_raw),
            self.wrap_record(ContentType::Handshake, &ske_raw),
            self.wrap_record(ContentType::Handshake, &hello_done_raw),
        ])
    }

    fn build_hello_verify_request(&mut self, cookie: Vec<u8>) -> BytesMut {
        let hvr = HelloVerifyRequest { cookie };
        let raw = self.wrap_handshake(HandshakeType::HelloVerifyRequest, &hvr.encode());
        self.wrap_record(ContentType::Handshake, &raw)
    }

    fn wrap_handshake(&mut self, msg_type: HandshakeType, body: &[u8]) -> BytesMut {
        let header = HandshakeHeader {
            msg_type,
            length: body.len() as u32,
            message_seq: self.message_seq,
        };
        self.message_seq += 1;
        let mut out = BytesMut::with_capacity(HandshakeHeader::SIZE + body.len());
        header.encode(&mut out);
        out.extend_from_slice(body);
        out
    }

    fn wrap_record(&mut self, content_type: ContentType, body: &[u8]) -> BytesMut {
        let header = RecordHeader {
            content_type,
            epoch: self.state.local_epoch,
            sequence_number: self.state.next_local_sequence_number(),
            length: body.len() as u16,
        };
        let mut out = BytesMut::with_capacity(RecordHeader::SIZE + body.len());
        header.encode(&mut out);
        out.extend_from_slice(body);
        out
    }

    fn finish_handshake(&mut self, now: Instant) -> Result<Vec<BytesMut>> {
        let verify_data = self.state.verify_data(false)?;
        let finished = Finished { verify_data };
        let finished_body = finished.encode();
        self.state
            .record_handshake_message(&transcript_record(HandshakeType::Finished, &finished_body));
        let raw = self.wrap_handshake(HandshakeType::Finished, &finished_body);
        self.state.local_epoch = 1;
        let packet = self.wrap_record(ContentType::Handshake, &raw);
        self.handshake_state = HandshakeState::Finished;
        self.last_flight = Vec::new();
        self.next_retransmit_deadline = None;
        let _ = now;
        Ok(vec![packet])
    }

    fn drive(&mut self, now: Instant) -> Result<Vec<BytesMut>> {
        match self.handshake_state {
            HandshakeState::WaitingFlight6 if self.flight == Flight::Flight6 => self.finish_handshake(now),
            HandshakeState::WaitingFlight2 | HandshakeState::WaitingFlight6 => {
                self.next_retransmit_deadline = Some(now + self.config.initial_retransmit_interval);
                Ok(self.last_flight.clone())
            }
            _ => Ok(Vec::new()),
        }
    }

    pub fn poll_timeout(&self) -> Option<Instant> {
        self.next_retransmit_deadline
    }

    /// RFC 6347 §4.2.4: on a retransmit timeout, resend the last flight
    /// unchanged and double the backoff, bounded by `max_retransmissions`.
    pub fn handle_timeout(&mut self, now: Instant) -> Result<Vec<BytesMut>> {
        if self.next_retransmit_deadline.map(|d| now < d).unwrap_or(true) {
            return Ok(Vec::new());
        }
        self.retransmit_count += 1;
        if self.retransmit_count > self.config.max_retransmissions {
            self.handshake_state = HandshakeState::Errored;
            return Err(Error::HandshakeTimeout(self.retransmit_count));
        }
        let backoff = self.config.initial_retransmit_interval * 2u32.pow(self.retransmit_count.min(6));
        self.next_retransmit_deadline = Some(now + backoff.min(self.config.max_retransmit_interval));
        Ok(self.last_flight.clone())
    }

    pub fn cookie_rotation_due(&self) -> Instant {
        self.cookies.poll_timeout()
    }

    pub fn rotate_cookies(&mut self, now: Instant) {
        self.cookies.rotate(now);
    }
}

/// RFC 6347 §4.2.6: the Finished MAC is computed over the handshake messages
/// as if each had been sent unfragmented in a single DTLS record, using the
/// plain TLS 1.2 handshake header (type + 3-byte length) rather than the
/// DTLS header's extra message_seq/fragment fields.
fn transcript_record(msg_type: HandshakeType, body: &[u8]) -> BytesMut {
    let mut out = BytesMut::with_capacity(4 + body.len());
    out.put_u8(msg_type.id());
    out.put_slice(&(body.len() as u32).to_be_bytes()[1..4]);
    out.extend_from_slice(body);
    out
}
