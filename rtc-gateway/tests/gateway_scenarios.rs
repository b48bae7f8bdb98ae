//! End-to-end scenarios spanning `control`, `sdp_offer`, `session`, and
//! `demux` together: each test drives the gateway the way a signaling peer
//! and a browser actually would, rather than exercising one module alone.

use std::time::{Duration, Instant};

use bytes::{BufMut, BytesMut};

use dtls::handshake::{Random, CIPHER_SUITE_ECDHE_ECDSA_AES128_GCM_SHA256, NAMED_CURVE_SECP256R1};
use dtls::record::{ContentType, HandshakeHeader, HandshakeType, RecordHeader};

use rtc_gateway::control::{self, CandidateParams, Event, LoopRef, LoopSocket, OfferOrAnswer, Request, SessionRef, TalkParams};
use rtc_gateway::demux::Outbound;
use rtc_gateway::{GatewayConfig, Identity, Proxy};

fn offer(ufrag: &str, pwd: &str) -> String {
    format!(
        concat!(
            "v=0\r\n",
            "o=- 1 1 IN IP4 0.0.0.0\r\n",
            "s=-\r\n",
            "t=0 0\r\n",
            "a=ice-options:trickle\r\n",
            "m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n",
            "c=IN IP4 198.51.100.1\r\n",
            "a=ice-ufrag:{ufrag}\r\n",
            "a=ice-pwd:{pwd}\r\n",
            "a=setup:actpass\r\n",
            "a=rtcp-mux\r\n",
            "a=fingerprint:sha-256 AA:BB:CC:DD\r\n",
        ),
        ufrag = ufrag,
        pwd = pwd,
    )
}

/// Builds a signed, fingerprinted STUN Binding Request the way a real ICE
/// agent would send one to this gateway: USERNAME keyed to the gateway's
/// own ufrag (the recipient), an optional PRIORITY, a role attribute, and
/// an optional USE-CANDIDATE, closed out with MESSAGE-INTEGRITY (keyed by
/// the gateway's local password, since the gateway verifies with its own)
/// and FINGERPRINT.
fn signed_request(
    gateway_ufrag: &str,
    browser_ufrag: &str,
    gateway_pwd: &[u8],
    priority: Option<u32>,
    controlling: bool,
    tiebreaker: u64,
    use_candidate: bool,
) -> (stun::TransactionId, BytesMut) {
    let tid = stun::TransactionId::random();
    let mut msg = stun::Message::build(stun::Class::Request, stun::BINDING, tid)
        .with_attribute(stun::attributes::username(gateway_ufrag, browser_ufrag));
    if let Some(priority) = priority {
        msg = msg.with_attribute(stun::attributes::priority(priority));
    }
    msg = if controlling {
        msg.with_attribute(stun::attributes::ice_controlling(tiebreaker))
    } else {
        msg.with_attribute(stun::attributes::ice_controlled(tiebreaker))
    };
    if use_candidate {
        msg = msg.with_attribute(stun::attributes::use_candidate());
    }
    let mut buf = msg.encode();
    stun::Message::append_message_integrity(&mut buf, gateway_pwd).unwrap();
    stun::Message::append_fingerprint(&mut buf);
    (tid, buf)
}

fn mi_offset(raw: &[u8]) -> usize {
    raw.len().saturating_sub(8 + 24)
}

fn rtp_packet(pt: u8, ssrc: u32, seq: u16, payload: &[u8]) -> BytesMut {
    let mut out = BytesMut::new();
    out.put_u8(0x80);
    out.put_u8(pt);
    out.put_u16(seq);
    out.put_u32(0); // timestamp
    out.put_u32(ssrc);
    out.extend_from_slice(payload);
    out
}

fn wrap_handshake(msg_type: HandshakeType, body: &[u8], message_seq: u16) -> BytesMut {
    let header = HandshakeHeader { msg_type, length: body.len() as u32, message_seq };
    let mut out = BytesMut::with_capacity(HandshakeHeader::SIZE + body.len());
    header.encode(&mut out);
    out.extend_from_slice(body);
    out
}

fn wrap_record(content_type: ContentType, epoch: u16, sequence_number: u64, body: &[u8]) -> BytesMut {
    let header = RecordHeader { content_type, epoch, sequence_number, length: body.len() as u16 };
    let mut out = BytesMut::with_capacity(RecordHeader::SIZE + body.len());
    header.encode(&mut out);
    out.extend_from_slice(body);
    out
}

fn transcript_entry(msg_type: HandshakeType, body: &[u8]) -> BytesMut {
    let mut out = BytesMut::with_capacity(4 + body.len());
    out.put_u8(msg_type.id());
    out.put_slice(&(body.len() as u32).to_be_bytes()[1..4]);
    out.extend_from_slice(body);
    out
}

fn sha256(data: &[u8]) -> Vec<u8> {
    use sha2::{Digest, Sha256};
    Sha256::digest(data).to_vec()
}

/// A ClientHello body matching what `dtls::handshake::ClientHello::decode`
/// expects: no session id, the cookie under test, and `use_srtp` +
/// `supported_groups` + `extended_master_secret` extensions.
fn client_hello_body(random: &Random, cookie: &[u8], cipher_suites: &[u16], srtp_profiles: &[u16]) -> BytesMut {
    let mut out = BytesMut::new();
    out.put_u8(254);
    out.put_u8(253);
    random.encode(&mut out);
    out.put_u8(0); // session_id
    out.put_u8(cookie.len() as u8);
    out.extend_from_slice(cookie);
    out.put_u16((cipher_suites.len() * 2) as u16);
    for cs in cipher_suites {
        out.put_u16(*cs);
    }
    out.put_u8(1);
    out.put_u8(0);

    let mut extensions = BytesMut::new();
    extensions.put_u16(14); // use_srtp
    let list_len = 2 + srtp_profiles.len() * 2 + 1;
    extensions.put_u16(list_len as u16);
    extensions.put_u16((srtp_profiles.len() * 2) as u16);
    for p in srtp_profiles {
        extensions.put_u16(*p);
    }
    extensions.put_u8(0);
    extensions.put_u16(10); // supported_groups
    extensions.put_u16(4);
    extensions.put_u16(2);
    extensions.put_u16(NAMED_CURVE_SECP256R1);
    extensions.put_u16(23); // extended_master_secret
    extensions.put_u16(0);

    out.put_u16(extensions.len() as u16);
    out.extend_from_slice(&extensions);
    out
}

fn datagram_with_client_hello(body: &BytesMut, message_seq: u16, record_seq: u64) -> BytesMut {
    let handshake = wrap_handshake(HandshakeType::ClientHello, body, message_seq);
    wrap_record(ContentType::Handshake, 0, record_seq, &handshake)
}

fn extract_cookie(hello_verify_datagram: &[u8]) -> Vec<u8> {
    let body = &hello_verify_datagram[RecordHeader::SIZE..];
    let handshake_body = &body[HandshakeHeader::SIZE..];
    let cookie_len = handshake_body[2] as usize;
    handshake_body[3..3 + cookie_len].to_vec()
}

fn handshake_body(datagram: &[u8]) -> BytesMut {
    let record_body = &datagram[RecordHeader::SIZE..];
    BytesMut::from(&record_body[HandshakeHeader::SIZE..])
}

fn server_public_key(server_key_exchange_body: &[u8]) -> Vec<u8> {
    let pubkey_len = server_key_exchange_body[3] as usize;
    server_key_exchange_body[4..4 + pubkey_len].to_vec()
}

#[test]
fn happy_path_offer_produces_a_well_formed_answer() {
    let config = GatewayConfig::new("127.0.0.1", 40000);
    let identity = Identity::generate().unwrap();
    let mut proxy = Proxy::new(config.external_addr().unwrap());

    let request = Request::SessionCreate {
        uuid: "req-1".to_string(),
        request: OfferOrAnswer { sdp_type: "offer".to_string(), sdp: offer("browser-ufrag", "012345678901234567890123") },
    };
    let events = control::handle_request(&mut proxy, &identity, &config, request, Instant::now());
    assert_eq!(events.len(), 1);
    let Event::Media { response, .. } = &events[0] else { panic!("expected a media event") };
    assert_eq!(response.sdp_type, "answer");

    let parsed = sdp::SessionDescription::parse(&response.sdp).unwrap();
    assert_eq!(parsed.media_descriptions.len(), 1);
    let media = &parsed.media_descriptions[0];
    assert!(media.attribute("candidate").unwrap().value.as_deref().unwrap().contains("typ host"));
    assert!(media.attribute("candidate").unwrap().value.as_deref().unwrap().contains("127.0.0.1 40000"));
    let fingerprint = media.attribute("fingerprint").unwrap().value.clone().unwrap();
    assert!(fingerprint.starts_with("sha-256 "));
    let local_pwd = media.attribute("ice-pwd").unwrap().value.clone().unwrap();
    assert!(local_pwd.len() >= 22);
    assert_eq!(media.attribute("setup").unwrap().value.as_deref(), Some("passive"));
    assert!(media.has_attribute("rtcp-mux"));
    assert!(media.has_attribute("end-of-candidates"));
    let ssrc_attr = media.attribute("ssrc").unwrap().value.clone().unwrap();
    assert!(ssrc_attr.contains(&format!("cname:{}", response.session)));
}

#[test]
fn trickle_candidate_after_offer_creates_a_new_pair() {
    let config = GatewayConfig::new("127.0.0.1", 40000);
    let identity = Identity::generate().unwrap();
    let mut proxy = Proxy::new(config.external_addr().unwrap());

    let create = Request::SessionCreate {
        uuid: "req-1".to_string(),
        request: OfferOrAnswer { sdp_type: "offer".to_string(), sdp: offer("browser-ufrag", "012345678901234567890123") },
    };
    let events = control::handle_request(&mut proxy, &identity, &config, create, Instant::now());
    let Event::Media { response, .. } = &events[0] else { panic!("expected a media event") };
    let session_uuid = response.session.clone();

    let trickle = Request::Candidate {
        uuid: "req-2".to_string(),
        request: CandidateParams {
            session: session_uuid.clone(),
            sdp_mid: None,
            sdp_mline_index: 0,
            ufrag: "peer".to_string(),
            candidate: "candidate:1 1 udp 2122260223 198.51.100.7 50001 typ host".to_string(),
        },
    };
    let events = control::handle_request(&mut proxy, &identity, &config, trickle, Instant::now());
    assert!(events.is_empty(), "trickle candidates do not themselves emit an event");

    let session = proxy.session(&session_uuid).unwrap();
    let remote: std::net::SocketAddr = "198.51.100.7:50001".parse().unwrap();
    assert!(session.streams[0].checklist.find(remote).is_some());
}

#[test]
fn session_times_out_and_a_later_drop_reports_unknown_session() {
    let mut config = GatewayConfig::new("127.0.0.1", 40000);
    config.limits.session_timeout_usecs = 1;
    let identity = Identity::generate().unwrap();
    let mut proxy = Proxy::new(config.external_addr().unwrap());

    let create = Request::SessionCreate {
        uuid: "req-1".to_string(),
        request: OfferOrAnswer { sdp_type: "offer".to_string(), sdp: offer("browser-ufrag", "012345678901234567890123") },
    };
    let events = control::handle_request(&mut proxy, &identity, &config, create, Instant::now());
    let Event::Media { response, .. } = &events[0] else { panic!("expected a media event") };
    let session_uuid = response.session.clone();

    let later = Instant::now() + Duration::from_millis(5);
    let state = Request::SessionState { uuid: "req-2".to_string(), request: SessionRef { session: session_uuid.clone() } };
    let events = control::handle_request(&mut proxy, &identity, &config, state, later);
    let Event::SessionStateResponse { response, .. } = &events[0] else { panic!("expected a session-state event") };
    assert_eq!(response.state, "failed");

    proxy.remove_session(&session_uuid);
    let drop = Request::SessionDrop { uuid: "req-3".to_string(), request: SessionRef { session: session_uuid } };
    let events = control::handle_request(&mut proxy, &identity, &config, drop, later);
    assert!(matches!(events[0], Event::Error { .. }));
}

#[test]
fn wire_level_stun_binding_exchange_produces_a_valid_reply() {
    let config = GatewayConfig::new("127.0.0.1", 40000);
    let identity = Identity::generate().unwrap();
    let mut proxy = Proxy::new(config.external_addr().unwrap());

    let create = Request::SessionCreate {
        uuid: "req-1".to_string(),
        request: OfferOrAnswer { sdp_type: "offer".to_string(), sdp: offer("browser-ufrag", "012345678901234567890123") },
    };
    let events = control::handle_request(&mut proxy, &identity, &config, create, Instant::now());
    let Event::Media { response, .. } = &events[0] else { panic!("expected a media event") };
    let session_uuid = response.session.clone();
    let gateway_ufrag = proxy.session(&session_uuid).unwrap().streams[0].local_ufrag.clone();
    let gateway_pwd = proxy.session(&session_uuid).unwrap().streams[0].local_pwd.clone();

    let source: std::net::SocketAddr = "198.51.100.7:50001".parse().unwrap();
    let (tid, request) = signed_request(&gateway_ufrag, "browser-reflexive", gateway_pwd.as_bytes(), Some(2113929471), true, 0x1122, false);

    let outbound = proxy.handle_external_datagram(source, &request, &identity, &config, Instant::now()).unwrap();
    assert_eq!(outbound.len(), 1);
    let Outbound::External(dst, reply) = &outbound[0] else { panic!("expected an external reply") };
    assert_eq!(*dst, source);

    assert!(stun::Message::verify_fingerprint(reply));
    assert!(stun::Message::verify_message_integrity(reply, mi_offset(reply), gateway_pwd.as_bytes()));

    let msg = stun::Message::decode(reply).unwrap();
    assert_eq!(msg.class, stun::Class::Success);
    assert_eq!(msg.transaction_id, tid);
    let xor_mapped = msg.get(stun::attributes::XOR_MAPPED_ADDRESS).unwrap();
    let addr = stun::attributes::decode_xor_mapped_address(xor_mapped, &tid).unwrap();
    assert_eq!(addr, source);

    let session = proxy.session(&session_uuid).unwrap();
    assert!(session.streams[0].checklist.find(source).is_some());
}

#[test]
fn role_conflict_round_trip_flips_or_errors_by_tiebreaker() {
    let config = GatewayConfig::new("127.0.0.1", 40000);
    let identity = Identity::generate().unwrap();
    let mut proxy = Proxy::new(config.external_addr().unwrap());

    let create = Request::SessionCreate {
        uuid: "req-1".to_string(),
        request: OfferOrAnswer { sdp_type: "offer".to_string(), sdp: offer("browser-ufrag", "012345678901234567890123") },
    };
    let events = control::handle_request(&mut proxy, &identity, &config, create, Instant::now());
    let Event::Media { response, .. } = &events[0] else { panic!("expected a media event") };
    let session_uuid = response.session.clone();
    let gateway_ufrag = proxy.session(&session_uuid).unwrap().streams[0].local_ufrag.clone();
    let gateway_pwd = proxy.session(&session_uuid).unwrap().streams[0].local_pwd.clone();
    assert!(!proxy.session(&session_uuid).unwrap().controlling);

    // The peer also claims controlled with a tiebreaker we cannot beat: we
    // give way, flip to controlling, and answer normally.
    let winner: std::net::SocketAddr = "198.51.100.8:51000".parse().unwrap();
    let (tid, request) = signed_request(&gateway_ufrag, "peer-a", gateway_pwd.as_bytes(), Some(2113929471), false, u64::MAX, false);
    let outbound = proxy.handle_external_datagram(winner, &request, &identity, &config, Instant::now()).unwrap();
    assert_eq!(outbound.len(), 1);
    let Outbound::External(_, reply) = &outbound[0] else { panic!("expected an external reply") };
    let msg = stun::Message::decode(reply).unwrap();
    assert_eq!(msg.class, stun::Class::Success);
    assert_eq!(msg.transaction_id, tid);
    assert!(proxy.session(&session_uuid).unwrap().controlling);

    // Put the gateway back to controlled and present a tiebreaker it beats:
    // it keeps its role and answers with a 487 instead of a pair.
    proxy.session_mut(&session_uuid).unwrap().controlling = false;
    let loser: std::net::SocketAddr = "198.51.100.9:52000".parse().unwrap();
    let (tid2, request2) = signed_request(&gateway_ufrag, "peer-b", gateway_pwd.as_bytes(), Some(2113929471), false, 0, false);
    let outbound2 = proxy.handle_external_datagram(loser, &request2, &identity, &config, Instant::now()).unwrap();
    assert_eq!(outbound2.len(), 1);
    let Outbound::External(_, reply2) = &outbound2[0] else { panic!("expected an external reply") };
    let msg2 = stun::Message::decode(reply2).unwrap();
    assert_eq!(msg2.class, stun::Class::Error);
    assert_eq!(msg2.transaction_id, tid2);
    let (code, _reason) = stun::attributes::decode_error_code(msg2.get(stun::attributes::ERROR_CODE).unwrap()).unwrap();
    assert_eq!(code, 487);
    assert!(!proxy.session(&session_uuid).unwrap().controlling);
}

#[test]
fn dtls_handshake_installs_srtp_and_rewrites_rtp_both_directions() {
    let config = GatewayConfig::new("127.0.0.1", 40000);
    let identity = Identity::generate().unwrap();
    let mut proxy = Proxy::new(config.external_addr().unwrap());

    let create = Request::SessionCreate {
        uuid: "req-1".to_string(),
        request: OfferOrAnswer { sdp_type: "offer".to_string(), sdp: offer("browser-ufrag", "012345678901234567890123") },
    };
    let events = control::handle_request(&mut proxy, &identity, &config, create, Instant::now());
    let Event::Media { response, .. } = &events[0] else { panic!("expected a media event") };
    let session_uuid = response.session.clone();
    let gateway_ufrag = proxy.session(&session_uuid).unwrap().streams[0].local_ufrag.clone();
    let gateway_pwd = proxy.session(&session_uuid).unwrap().streams[0].local_pwd.clone();

    let browser: std::net::SocketAddr = "198.51.100.20:53000".parse().unwrap();

    // One request creates the peer-reflexive pair and nominates it in the
    // same round trip (PRIORITY builds the pair, USE-CANDIDATE selects it).
    let (_tid, nominate) = signed_request(&gateway_ufrag, "browser", gateway_pwd.as_bytes(), Some(2113929471), true, 0xAABB, true);
    let nominate_out = proxy.handle_external_datagram(browser, &nominate, &identity, &config, Instant::now()).unwrap();
    assert_eq!(nominate_out.len(), 1);
    assert_eq!(proxy.session(&session_uuid).unwrap().streams[0].checklist.selected, Some(browser));

    // Flight0: ClientHello with no cookie, answered with HelloVerifyRequest.
    let client_random = Random::generate();
    let ch0_body = client_hello_body(&client_random, &[], &[CIPHER_SUITE_ECDHE_ECDSA_AES128_GCM_SHA256], &[0x0001]);
    let ch0 = datagram_with_client_hello(&ch0_body, 0, 0);
    let out0 = proxy.handle_external_datagram(browser, &ch0, &identity, &config, Instant::now()).unwrap();
    assert_eq!(out0.len(), 1);
    let Outbound::External(_, hvr_datagram) = &out0[0] else { panic!("expected a hello verify request") };
    let cookie = extract_cookie(hvr_datagram);

    // Flight2: ClientHello with the cookie, answered with the full flight4.
    let ch2_body = client_hello_body(&client_random, &cookie, &[CIPHER_SUITE_ECDHE_ECDSA_AES128_GCM_SHA256], &[0x0001]);
    let ch2 = datagram_with_client_hello(&ch2_body, 1, 1);
    let out2 = proxy.handle_external_datagram(browser, &ch2, &identity, &config, Instant::now()).unwrap();
    assert_eq!(out2.len(), 4);
    let flight4: Vec<BytesMut> = out2
        .iter()
        .map(|o| match o {
            Outbound::External(_, b) => b.clone(),
            Outbound::Internal(..) => panic!("flight4 is external traffic"),
        })
        .collect();
    let server_hello_body = handshake_body(&flight4[0]);
    let certificate_body = handshake_body(&flight4[1]);
    let ske_body = handshake_body(&flight4[2]);
    let shd_body = handshake_body(&flight4[3]);

    let server_random =
        proxy.session(&session_uuid).unwrap().streams[0].dtls.get(&browser).unwrap().state().server_random.clone();

    // ECDHE: our own ephemeral key against the server's published point.
    let client_secret = p256::ecdh::EphemeralSecret::random(&mut rand::rngs::OsRng);
    let client_public = p256::EncodedPoint::from(client_secret.public_key()).as_bytes().to_vec();
    let server_point = p256::PublicKey::from_sec1_bytes(&server_public_key(&ske_body)).unwrap();
    let shared = client_secret.diffie_hellman(&server_point);
    let pre_master_secret = shared.raw_secret_bytes().to_vec();
    let master_secret =
        dtls::prf::master_secret(&pre_master_secret, &client_random.to_bytes(), &server_random.to_bytes()).unwrap();

    let cke_body = {
        let mut out = BytesMut::new();
        out.put_u8(client_public.len() as u8);
        out.put_slice(&client_public);
        out
    };

    // Transcript over ClientHello(flight2)..ClientKeyExchange, matching
    // what the server records before checking our Finished.
    let mut transcript6 = BytesMut::new();
    transcript6.extend_from_slice(&transcript_entry(HandshakeType::ClientHello, &ch2_body));
    transcript6.extend_from_slice(&transcript_entry(HandshakeType::ServerHello, &server_hello_body));
    transcript6.extend_from_slice(&transcript_entry(HandshakeType::Certificate, &certificate_body));
    transcript6.extend_from_slice(&transcript_entry(HandshakeType::ServerKeyExchange, &ske_body));
    transcript6.extend_from_slice(&transcript_entry(HandshakeType::ServerHelloDone, &shd_body));
    transcript6.extend_from_slice(&transcript_entry(HandshakeType::ClientKeyExchange, &cke_body));

    let hash6 = sha256(&transcript6);
    let client_verify_data = dtls::prf::verify_data(&master_secret, &hash6, b"client finished").unwrap();
    let finished_body = BytesMut::from(client_verify_data.as_slice());

    // Flight6: ClientKeyExchange and Finished in one datagram.
    let mut flight6 = BytesMut::new();
    flight6.extend_from_slice(&wrap_record(ContentType::Handshake, 0, 2, &wrap_handshake(HandshakeType::ClientKeyExchange, &cke_body, 2)));
    flight6.extend_from_slice(&wrap_record(ContentType::Handshake, 0, 3, &wrap_handshake(HandshakeType::Finished, &finished_body, 3)));

    assert!(!proxy.session(&session_uuid).unwrap().streams[0].is_srtp_ready());
    let out6 = proxy.handle_external_datagram(browser, &flight6, &identity, &config, Instant::now()).unwrap();
    assert_eq!(out6.len(), 1);
    assert!(proxy.session(&session_uuid).unwrap().streams[0].is_srtp_ready());

    // The server's own Finished, checked against the 7-entry transcript
    // (the six above plus our own Finished).
    let Outbound::External(_, server_finished_datagram) = &out6[0] else { panic!("expected the server's Finished") };
    let server_finished_body = handshake_body(server_finished_datagram);
    let mut transcript7 = transcript6.clone();
    transcript7.extend_from_slice(&transcript_entry(HandshakeType::Finished, &finished_body));
    let hash7 = sha256(&transcript7);
    let expected_server_finished = dtls::prf::verify_data(&master_secret, &hash7, b"server finished").unwrap();
    assert_eq!(server_finished_body.as_ref(), expected_server_finished.as_slice());

    // Derive our own SRTP keys from the same exported material the server used.
    let (key_len, salt_len) = (16usize, 14usize); // Aes128CmSha1_80
    let mut seed = b"EXTRACTOR-dtls_srtp".to_vec();
    seed.extend_from_slice(&client_random.to_bytes());
    seed.extend_from_slice(&server_random.to_bytes());
    let keying_material = dtls::prf::p_hash(&master_secret, &seed, 2 * (key_len + salt_len)).unwrap();
    let mut client_srtp = srtp::SrtpConfig::from_keying_material(
        srtp::ProtectionProfile::Aes128CmHmacSha1_80,
        &keying_material,
        srtp::ContextSide::Client,
    )
    .unwrap();

    let talk_on = Request::Talk {
        uuid: "req-talk".to_string(),
        request: TalkParams {
            session: session_uuid.clone(),
            loop_ref: LoopRef { name: "room-1".to_string(), socket: LoopSocket { host: "127.0.0.1".to_string(), port: 9100 } },
            on: true,
        },
    };
    control::handle_request(&mut proxy, &identity, &config, talk_on, Instant::now());

    // Inbound: the browser's own SSRC gets rewritten to the stream's local one.
    let browser_ssrc = 0x1234_5678u32;
    let inbound_plaintext = rtp_packet(0x60, browser_ssrc, 500, b"hello");
    let protected_inbound = client_srtp.local.protect(&inbound_plaintext[..12], &inbound_plaintext[12..], browser_ssrc, 500).unwrap();
    let mut inbound_packet = BytesMut::new();
    inbound_packet.extend_from_slice(&inbound_plaintext[..12]);
    inbound_packet.extend_from_slice(&protected_inbound);

    let inbound_out = proxy.handle_external_datagram(browser, &inbound_packet, &identity, &config, Instant::now()).unwrap();
    assert_eq!(inbound_out.len(), 1);
    let Outbound::Internal(dst, delivered) = &inbound_out[0] else { panic!("expected an internal delivery") };
    assert_eq!(*dst, "127.0.0.1:9100".parse().unwrap());
    let local_ssrc = proxy.session(&session_uuid).unwrap().streams[0].local_ssrc;
    assert_eq!(u32::from_be_bytes([delivered[8], delivered[9], delivered[10], delivered[11]]), local_ssrc);

    // Outbound: the mixer's own SSRC and payload type are rewritten to what
    // this stream negotiated before the packet is protected.
    let session = proxy.session_mut(&session_uuid).unwrap();
    let stream = &mut session.streams[0];
    let mixer_plaintext = rtp_packet(96, 0x9999_0000, 700, b"reply");
    let protected_outbound = rtc_gateway::forwarding::protect_outbound(stream, &mixer_plaintext).unwrap();

    let outbound_header = &protected_outbound[..12];
    assert_eq!(
        u32::from_be_bytes([outbound_header[8], outbound_header[9], outbound_header[10], outbound_header[11]]),
        stream.local_ssrc
    );
    assert_eq!(outbound_header[1] & 0x7f, stream.payload_format);

    let decrypted = client_srtp.remote.unprotect(outbound_header, &protected_outbound[12..], stream.local_ssrc, 700).unwrap();
    assert_eq!(decrypted, b"reply");
}
