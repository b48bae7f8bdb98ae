//! JSON control-plane adapter (component C10): the event/parameter shapes a
//! signaling peer uses to create sessions, trickle candidates, and attach
//! streams to named internal loops. One `Request` comes in, zero or more
//! `Event`s go out (an immediate response plus any async completion/
//! candidate events this call triggers).

use std::net::SocketAddr;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::cert::Identity;
use crate::config::GatewayConfig;
use crate::demux::Proxy;
use crate::error::{Error, Result};
use crate::session::{Session, SessionState};
use crate::sdp_offer;

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Request {
    #[serde(rename = "ice_session_create")]
    SessionCreate { uuid: String, request: OfferOrAnswer },
    #[serde(rename = "ice_session_update")]
    SessionUpdate { uuid: String, request: SessionUpdateParams },
    #[serde(rename = "ice_session_drop")]
    SessionDrop { uuid: String, request: SessionRef },
    #[serde(rename = "ice_session_state")]
    SessionState { uuid: String, request: SessionRef },
    #[serde(rename = "candidate")]
    Candidate { uuid: String, request: CandidateParams },
    #[serde(rename = "end-of-candidates")]
    EndOfCandidates { uuid: String, request: SessionRef },
    #[serde(rename = "talk")]
    Talk { uuid: String, request: TalkParams },
}

#[derive(Clone, Debug, Deserialize)]
pub struct OfferOrAnswer {
    #[serde(rename = "type")]
    pub sdp_type: String,
    pub sdp: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SessionUpdateParams {
    pub session: String,
    #[serde(rename = "type")]
    pub sdp_type: String,
    pub sdp: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SessionRef {
    pub session: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CandidateParams {
    pub session: String,
    #[serde(rename = "SDPMid")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "SDPMLineIndex")]
    pub sdp_mline_index: usize,
    pub ufrag: String,
    pub candidate: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TalkParams {
    pub session: String,
    #[serde(rename = "loop")]
    pub loop_ref: LoopRef,
    pub on: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LoopRef {
    pub name: String,
    pub socket: LoopSocket,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LoopSocket {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    #[serde(rename = "media")]
    Media { uuid: String, response: MediaResponse },
    #[serde(rename = "ice_session_failed")]
    SessionFailed { uuid: String, response: SessionFailedResponse },
    #[serde(rename = "ice_session_completed")]
    SessionCompleted { uuid: String, response: SessionCompletedResponse },
    #[serde(rename = "ice_session_state")]
    SessionStateResponse { uuid: String, response: SessionStateResponse },
    #[serde(rename = "ice_session_drop")]
    SessionDropAck { uuid: String, response: SessionRef },
    #[serde(rename = "error")]
    Error { uuid: String, response: ErrorResponse },
}

#[derive(Clone, Debug, Serialize)]
pub struct MediaResponse {
    pub session: String,
    #[serde(rename = "type")]
    pub sdp_type: String,
    pub sdp: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionFailedResponse {
    pub session: String,
    pub cause: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionCompletedResponse {
    pub session: String,
    pub state: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionStateResponse {
    pub session: String,
    pub state: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn state_name(state: SessionState) -> &'static str {
    match state {
        SessionState::Running => "running",
        SessionState::Completed => "completed",
        SessionState::Failed => "failed",
    }
}

/// Dispatches one decoded control-plane request against `proxy`, returning
/// the events it produces. Every handler is synchronous: the gateway's
/// event loop feeds requests in and drains the resulting outbound STUN/DTLS
/// bytes (via `Proxy`/`Session`) and control events separately.
pub fn handle_request(
    proxy: &mut Proxy,
    identity: &Identity,
    config: &GatewayConfig,
    request: Request,
    now: Instant,
) -> Vec<Event> {
    match request {
        Request::SessionCreate { uuid, request } => handle_session_create(proxy, identity, config, uuid, request, now),
        Request::SessionUpdate { uuid, request } => handle_session_update(proxy, identity, config, uuid, request),
        Request::SessionDrop { uuid, request } => handle_session_drop(proxy, uuid, request),
        Request::SessionState { uuid, request } => handle_session_state(proxy, uuid, request, now),
        Request::Candidate { uuid, request } => handle_candidate(proxy, uuid, request),
        Request::EndOfCandidates { uuid, request } => handle_end_of_candidates(proxy, uuid, request),
        Request::Talk { uuid, request } => handle_talk(proxy, uuid, request),
    }
}

fn error_event(uuid: String, err: Error) -> Vec<Event> {
    vec![Event::Error {
        uuid,
        response: ErrorResponse { error: err.to_string() },
    }]
}

fn handle_session_create(
    proxy: &mut Proxy,
    identity: &Identity,
    config: &GatewayConfig,
    uuid: String,
    offer: OfferOrAnswer,
    now: Instant,
) -> Vec<Event> {
    if offer.sdp_type != "offer" {
        return error_event(uuid, Error::SdpMalformed(sdp::Error::InvalidField("type", offer.sdp_type)));
    }
    // This gateway never initiates a session: it always answers, so it is
    // always controlled on creation (the peer's USE-CANDIDATE/role attributes
    // may still flip this via role-conflict resolution).
    let mut session = Session::new(uuid.clone(), false, config, now);
    let offered = match sdp_offer::apply_offer(&mut session, &offer.sdp) {
        Ok(offered) => offered,
        Err(err) => return error_event(uuid, err),
    };
    for (index, stream) in session.streams.iter().enumerate() {
        proxy.index_stream(&session.uuid, index, &stream.local_ufrag);
    }
    let answer_sdp = match sdp_offer::build_answer(&session, &offered, identity, config) {
        Ok(sdp) => sdp,
        Err(err) => return error_event(uuid, err),
    };

    let session_uuid = session.uuid.clone();
    proxy.sessions.insert(session_uuid.clone(), session);
    vec![Event::Media {
        uuid,
        response: MediaResponse { session: session_uuid, sdp_type: "answer".to_string(), sdp: answer_sdp },
    }]
}

fn handle_session_update(
    proxy: &mut Proxy,
    _identity: &Identity,
    _config: &GatewayConfig,
    uuid: String,
    params: SessionUpdateParams,
) -> Vec<Event> {
    let Some(session) = proxy.session_mut(&params.session) else {
        return error_event(uuid, Error::UnknownSession(params.session));
    };
    // Renegotiation only updates remote credentials/candidates on already
    // existing streams; it never adds or removes streams.
    match sdp::SessionDescription::parse(&params.sdp) {
        Ok(parsed) => {
            for (stream, media) in session.streams.iter_mut().zip(parsed.media_descriptions.iter()) {
                if let Some(ufrag) = media.attribute("ice-ufrag").and_then(|a| a.value.clone()) {
                    stream.remote_ufrag = Some(ufrag);
                }
                if let Some(pwd) = media.attribute("ice-pwd").and_then(|a| a.value.clone()) {
                    stream.remote_pwd = Some(pwd);
                }
            }
            Vec::new()
        }
        Err(err) => error_event(uuid, Error::SdpMalformed(err)),
    }
}

fn handle_session_drop(proxy: &mut Proxy, uuid: String, params: SessionRef) -> Vec<Event> {
    match proxy.remove_session(&params.session) {
        Some(_) => vec![Event::SessionDropAck { uuid, response: SessionRef { session: params.session } }],
        None => error_event(uuid, Error::UnknownSession(params.session)),
    }
}

fn handle_session_state(proxy: &mut Proxy, uuid: String, params: SessionRef, now: Instant) -> Vec<Event> {
    let Some(session) = proxy.session_mut(&params.session) else {
        return error_event(uuid, Error::UnknownSession(params.session));
    };
    let state = session.reduce_state(now);
    vec![Event::SessionStateResponse {
        uuid,
        response: SessionStateResponse { session: params.session, state: state_name(state).to_string() },
    }]
}

fn handle_candidate(proxy: &mut Proxy, uuid: String, params: CandidateParams) -> Vec<Event> {
    let Some(session) = proxy.session_mut(&params.session) else {
        return error_event(uuid, Error::UnknownSession(params.session));
    };
    let controlling = session.controlling;
    let Some(stream) = session.streams.get_mut(params.sdp_mline_index) else {
        return error_event(uuid, Error::InternalInvariant("candidate references unknown stream".into()));
    };
    match ice::Candidate::parse(&params.candidate) {
        Ok(remote) => {
            let local = crate::session::host_candidate("host-1", remote.addr());
            stream.checklist.add_pair(local, remote, controlling, false);
            Vec::new()
        }
        Err(err) => error_event(uuid, Error::CandidateMalformed(err)),
    }
}

fn handle_end_of_candidates(proxy: &mut Proxy, uuid: String, params: SessionRef) -> Vec<Event> {
    let Some(session) = proxy.session_mut(&params.session) else {
        return error_event(uuid, Error::UnknownSession(params.session));
    };
    for stream in &mut session.streams {
        stream.end_of_candidates = true;
    }
    Vec::new()
}

fn handle_talk(proxy: &mut Proxy, uuid: String, params: TalkParams) -> Vec<Event> {
    let Some(session) = proxy.session_mut(&params.session) else {
        return error_event(uuid, Error::UnknownSession(params.session));
    };
    let addr: Result<SocketAddr> = format!("{}:{}", params.loop_ref.socket.host, params.loop_ref.socket.port)
        .parse()
        .map_err(|_| Error::ConfigInvalid(format!("loop socket {}:{} invalid", params.loop_ref.socket.host, params.loop_ref.socket.port)));
    let addr = match addr {
        Ok(addr) => addr,
        Err(err) => return error_event(uuid, err),
    };
    for stream in &mut session.streams {
        if params.on {
            stream.loops.insert(params.loop_ref.name.clone(), addr);
        } else {
            stream.loops.remove(&params.loop_ref.name);
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn proxy_and_config() -> (Proxy, Identity, GatewayConfig) {
        let config = GatewayConfig::new("203.0.113.9", 40000);
        let proxy = Proxy::new(config.external_addr().unwrap());
        let identity = Identity::generate().unwrap();
        (proxy, identity, config)
    }

    fn sample_offer(ufrag: &str, pwd: &str) -> String {
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
                "a=fingerprint:sha-256 AA:BB\r\n",
            ),
            ufrag = ufrag,
            pwd = pwd,
        )
    }

    #[test]
    fn session_create_returns_media_event() {
        let (mut proxy, identity, config) = proxy_and_config();
        let req = Request::SessionCreate {
            uuid: "req-1".to_string(),
            request: OfferOrAnswer { sdp_type: "offer".to_string(), sdp: sample_offer("ufrg", "0123456789012345678901") },
        };
        let events = handle_request(&mut proxy, &identity, &config, req, Instant::now());
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::Media { .. }));
        assert_eq!(proxy.sessions.len(), 1);
    }

    #[test]
    fn drop_unknown_session_errors() {
        let (mut proxy, identity, config) = proxy_and_config();
        let req = Request::SessionDrop { uuid: "req-2".to_string(), request: SessionRef { session: "nope".to_string() } };
        let events = handle_request(&mut proxy, &identity, &config, req, Instant::now());
        assert!(matches!(events[0], Event::Error { .. }));
    }

    #[test]
    fn talk_attaches_and_detaches_named_loop() {
        let (mut proxy, identity, config) = proxy_and_config();
        let create = Request::SessionCreate {
            uuid: "req-1".to_string(),
            request: OfferOrAnswer { sdp_type: "offer".to_string(), sdp: sample_offer("ufrg", "0123456789012345678901") },
        };
        handle_request(&mut proxy, &identity, &config, create, Instant::now());
        let session_uuid = proxy.sessions.keys().next().unwrap().clone();

        let talk_on = Request::Talk {
            uuid: "req-3".to_string(),
            request: TalkParams {
                session: session_uuid.clone(),
                loop_ref: LoopRef { name: "room-1".to_string(), socket: LoopSocket { host: "127.0.0.1".to_string(), port: 9000 } },
                on: true,
            },
        };
        handle_request(&mut proxy, &identity, &config, talk_on, Instant::now());
        assert_eq!(proxy.session(&session_uuid).unwrap().streams[0].loops.len(), 1);

        let talk_off = Request::Talk {
            uuid: "req-4".to_string(),
            request: TalkParams {
                session: session_uuid.clone(),
                loop_ref: LoopRef { name: "room-1".to_string(), socket: LoopSocket { host: "127.0.0.1".to_string(), port: 9000 } },
                on: false,
            },
        };
        handle_request(&mut proxy, &identity, &config, talk_off, Instant::now());
        assert_eq!(proxy.session(&session_uuid).unwrap().streams[0].loops.len(), 0);
    }
}
