//! Forwarding plane (component C9): the non-cryptographic half of turning
//! an inbound SRTP datagram into plaintext RTP on an internal loop socket,
//! and the reverse path for audio mixed back toward the browser. The
//! cryptographic transforms themselves live in `srtp::SrtpContext`; this
//! module owns RTP header parsing and the SSRC rewrite the original
//! multiplexing proxy performs on every forwarded packet.

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};
use crate::session::Stream;

const FIXED_HEADER_LEN: usize = 12;

/// Length of one RTP packet's header, accounting for the CSRC list (low
/// nibble of byte 0) and an optional extension header (bit 0x10 of byte 0),
/// per RFC 3550 §5.1. Returns `None` if the buffer is too short to contain
/// what its own header fields claim.
fn rtp_header_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < FIXED_HEADER_LEN {
        return None;
    }
    let cc = (buf[0] & 0x0f) as usize;
    let mut len = FIXED_HEADER_LEN + cc * 4;
    if buf[0] & 0x10 != 0 {
        if buf.len() < len + 4 {
            return None;
        }
        let ext_len = u16::from_be_bytes([buf[len + 2], buf[len + 3]]) as usize;
        len += 4 + ext_len * 4;
    }
    if buf.len() < len {
        return None;
    }
    Some(len)
}

fn rtp_seq(header: &[u8]) -> u16 {
    u16::from_be_bytes([header[2], header[3]])
}

fn rtp_ssrc(header: &[u8]) -> u32 {
    u32::from_be_bytes([header[8], header[9], header[10], header[11]])
}

fn rewrite_ssrc(header: &mut [u8], ssrc: u32) {
    header[8..12].copy_from_slice(&ssrc.to_be_bytes());
}

/// Rewrites the low 7 bits of byte 1 (the marker bit, bit 0x80, is left
/// untouched), per RFC 3550 §5.1.
fn rewrite_payload_type(header: &mut [u8], pt: u8) {
    header[1] = (header[1] & 0x80) | (pt & 0x7f);
}

/// Unprotects one SRTP packet from the browser, rewrites its SSRC to this
/// stream's local SSRC (matching the original proxy's `io_external_rtp`
/// behavior so every downstream consumer sees one stable SSRC per stream
/// regardless of what the peer advertised), and returns the plaintext RTP
/// packet ready to forward internally.
pub fn unprotect_inbound(stream: &mut Stream, datagram: &[u8]) -> Result<BytesMut> {
    let header_len = rtp_header_len(datagram).ok_or(Error::InternalInvariant("rtp header truncated".into()))?;
    let (header, protected) = datagram.split_at(header_len);
    let ssrc = rtp_ssrc(header);
    let seq = rtp_seq(header);

    let srtp = stream.srtp.as_mut().ok_or(srtp::Error::ProfileUnset)?;
    let plaintext_payload = srtp.remote.unprotect(header, protected, ssrc, seq)?;

    let mut out = BytesMut::with_capacity(header_len + plaintext_payload.len());
    out.put_slice(header);
    rewrite_ssrc(&mut out, stream.local_ssrc);
    out.put_slice(&plaintext_payload);
    Ok(out)
}

/// Protects one plaintext RTP packet (mixed audio coming back from a loop)
/// for delivery to the browser over the nominated pair. The mixer's own
/// SSRC and payload type are local to the loop side, so both are rewritten
/// to what this stream actually negotiated with the browser before the
/// packet is protected.
pub fn protect_outbound(stream: &mut Stream, plaintext: &[u8]) -> Result<BytesMut> {
    let header_len = rtp_header_len(plaintext).ok_or(Error::InternalInvariant("rtp header truncated".into()))?;
    let (header, payload) = plaintext.split_at(header_len);
    let seq = rtp_seq(header);

    let mut rewritten = BytesMut::with_capacity(header_len);
    rewritten.put_slice(header);
    rewrite_payload_type(&mut rewritten, stream.payload_format);
    rewrite_ssrc(&mut rewritten, stream.local_ssrc);
    let ssrc = stream.local_ssrc;

    let srtp = stream.srtp.as_mut().ok_or(srtp::Error::ProfileUnset)?;
    let protected_payload = srtp.local.protect(&rewritten, payload, ssrc, seq)?;

    let mut out = BytesMut::with_capacity(header_len + protected_payload.len());
    out.put_slice(&rewritten);
    out.put_slice(&protected_payload);
    Ok(out)
}
