//! SDP construction and parsing (component C8): turns a browser's offer into
//! per-stream ICE/DTLS credentials, and turns a `Session`'s negotiated state
//! back into the answer this gateway sends.

use sdp::description::media::MediaDescription;
use sdp::description::session::{Connection, Origin, SessionDescription};
use sdp::{Attribute, AttributeHolder};

use crate::cert::Identity;
use crate::config::GatewayConfig;
use crate::error::{Error, Result};
use crate::session::{host_candidate, Session};

/// What an offer's `m=` line told us about one stream: the credentials and
/// fingerprint the gateway needs to drive that stream's checklist and DTLS.
pub struct OfferedStream {
    pub media: String,
    pub remote_ufrag: String,
    pub remote_pwd: String,
    pub remote_fingerprint: String,
    pub end_of_candidates: bool,
}

/// Parses a browser's SDP offer into one `OfferedStream` per `m=` line and
/// populates `session` with a matching `Stream` for each, wiring in the
/// remote ICE credentials, fingerprint, and any candidates already present
/// (non-trickle offers carry them inline).
pub fn apply_offer(session: &mut Session, offer_sdp: &str) -> Result<Vec<OfferedStream>> {
    let parsed = SessionDescription::parse(offer_sdp)?;
    if parsed.media_descriptions.is_empty() {
        return Err(Error::SdpMalformed(sdp::Error::MissingLine("m")));
    }

    let session_ufrag = parsed.attribute("ice-ufrag").and_then(|a| a.value.clone());
    let session_pwd = parsed.attribute("ice-pwd").and_then(|a| a.value.clone());
    let session_fingerprint = parsed.attribute("fingerprint").and_then(|a| a.value.clone());

    let mut offered = Vec::with_capacity(parsed.media_descriptions.len());
    for media in &parsed.media_descriptions {
        let remote_ufrag = media
            .attribute("ice-ufrag")
            .and_then(|a| a.value.clone())
            .or_else(|| session_ufrag.clone())
            .ok_or_else(|| Error::SdpMalformed(sdp::Error::MissingLine("ice-ufrag")))?;
        let remote_pwd = media
            .attribute("ice-pwd")
            .and_then(|a| a.value.clone())
            .or_else(|| session_pwd.clone())
            .ok_or_else(|| Error::SdpMalformed(sdp::Error::MissingLine("ice-pwd")))?;
        let remote_fingerprint = media
            .attribute("fingerprint")
            .and_then(|a| a.value.clone())
            .or_else(|| session_fingerprint.clone())
            .ok_or_else(|| Error::SdpMalformed(sdp::Error::MissingLine("fingerprint")))?;
        let end_of_candidates = media.has_attribute("end-of-candidates");
        let controlling = session.controlling;
        let payload_format = media
            .formats
            .first()
            .and_then(|f| f.parse::<u8>().ok())
            .ok_or_else(|| Error::SdpMalformed(sdp::Error::MissingLine("m")))?;

        let stream = session.add_stream();
        stream.remote_ufrag = Some(remote_ufrag.clone());
        stream.remote_pwd = Some(remote_pwd.clone());
        stream.remote_fingerprint = Some(remote_fingerprint.clone());
        stream.end_of_candidates = end_of_candidates;
        stream.payload_format = payload_format;

        for attr in media.iter_attribute("candidate") {
            if let Some(value) = &attr.value {
                if let Ok(candidate) = ice::Candidate::parse(value) {
                    let local = host_candidate("host-1", candidate.addr());
                    stream.checklist.add_pair(local, candidate, controlling, false);
                }
            }
        }

        offered.push(OfferedStream {
            media: media.media.clone(),
            remote_ufrag,
            remote_pwd,
            remote_fingerprint,
            end_of_candidates,
        });
    }
    Ok(offered)
}

/// Builds this gateway's answer for an already-populated `session`, one
/// `m=` line per stream in the same order streams were added.
pub fn build_answer(
    session: &Session,
    offered: &[OfferedStream],
    identity: &Identity,
    config: &GatewayConfig,
) -> Result<String> {
    let external = config.external_addr()?;
    let origin = Origin {
        username: "-".to_string(),
        session_id: session_id_from_uuid(&session.uuid),
        session_version: 1,
        connection: Connection::new_ip4("0.0.0.0"),
    };
    let mut sdp = SessionDescription::new(origin, session.uuid.clone());
    sdp.add_attribute(Attribute::property("ice-options:trickle"));

    for (stream, info) in session.streams.iter().zip(offered.iter()) {
        let mut media = MediaDescription::new(
            info.media.clone(),
            external.port(),
            "UDP/TLS/RTP/SAVPF",
            vec![stream.payload_format.to_string()],
        );
        media.connection.push(Connection::new_ip4(external.ip().to_string()));
        media.add_attribute(Attribute::value_pair("ice-ufrag", stream.local_ufrag.clone()));
        media.add_attribute(Attribute::value_pair("ice-pwd", stream.local_pwd.clone()));
        media.add_attribute(Attribute::value_pair("setup", "passive"));
        media.add_attribute(Attribute::property("rtcp-mux"));
        media.add_attribute(Attribute::value_pair("fingerprint", identity.fingerprint()));
        media.add_attribute(Attribute::value_pair("ssrc", format!("{} cname:{}", stream.local_ssrc, session.uuid)));

        let local = host_candidate("host-1", external);
        media.add_attribute(Attribute::value_pair("candidate", local.marshal()));
        media.add_attribute(Attribute::property("end-of-candidates"));

        sdp.media_descriptions.push(media);
    }

    Ok(sdp.marshal()?)
}

/// `o=` session-id fields want a `u64`; a session's uuid string is hashed
/// down to one rather than parsed, since it is never itself numeric.
fn session_id_from_uuid(uuid: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    uuid.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn offer(ufrag: &str, pwd: &str, fp: &str) -> String {
        format!(
            concat!(
                "v=0\r\n",
                "o=- 1 1 IN IP4 0.0.0.0\r\n",
                "s=-\r\n",
                "t=0 0\r\n",
                "a=ice-options:trickle\r\n",
                "m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n",
                "c=IN IP4 203.0.113.1\r\n",
                "a=ice-ufrag:{ufrag}\r\n",
                "a=ice-pwd:{pwd}\r\n",
                "a=setup:actpass\r\n",
                "a=rtcp-mux\r\n",
                "a=fingerprint:{fp}\r\n",
            ),
            ufrag = ufrag,
            pwd = pwd,
            fp = fp,
        )
    }

    #[test]
    fn applies_single_stream_offer() {
        let config = GatewayConfig::new("127.0.0.1", 40000);
        let mut session = Session::new("sess-1", false, &config, Instant::now());
        let offered = apply_offer(&mut session, &offer("ufrg", "0123456789012345678901", "sha-256 AA:BB")).unwrap();
        assert_eq!(offered.len(), 1);
        assert_eq!(session.streams.len(), 1);
        assert_eq!(session.streams[0].remote_ufrag.as_deref(), Some("ufrg"));
    }

    #[test]
    fn rejects_offer_without_media() {
        let config = GatewayConfig::new("127.0.0.1", 40000);
        let mut session = Session::new("sess-1", false, &config, Instant::now());
        let bad = "v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\ns=-\r\nt=0 0\r\n";
        assert!(apply_offer(&mut session, bad).is_err());
    }

    #[test]
    fn answer_contains_local_credentials() {
        let config = GatewayConfig::new("203.0.113.9", 40000);
        let mut session = Session::new("sess-1", false, &config, Instant::now());
        let offered = apply_offer(&mut session, &offer("ufrg", "0123456789012345678901", "sha-256 AA:BB")).unwrap();
        let identity = Identity::generate().unwrap();
        let answer = build_answer(&session, &offered, &identity, &config).unwrap();
        assert!(answer.contains(&format!("a=ice-ufrag:{}", session.streams[0].local_ufrag)));
        assert!(answer.contains("a=setup:passive"));
        assert!(answer.contains("a=rtcp-mux"));
    }
}
