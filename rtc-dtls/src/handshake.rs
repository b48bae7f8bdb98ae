use bytes::{Buf, BufMut, BytesMut};
use rand::RngCore;

use crate::error::{Error, Result};
use crate::srtp_profile::SrtpProfile;

pub const RANDOM_LENGTH: usize = 32;
/// Our one supported cipher suite: ECDHE key exchange, ECDSA server
/// authentication, AES-128-GCM record protection, SHA-256 PRF.
pub const CIPHER_SUITE_ECDHE_ECDSA_AES128_GCM_SHA256: u16 = 0xC02B;
/// secp256r1 (NIST P-256), RFC 8422 named-curve id 23 — the only curve this
/// gateway offers in its ServerKeyExchange.
pub const NAMED_CURVE_SECP256R1: u16 = 23;
const EXTENSION_SUPPORTED_GROUPS: u16 = 10;
const EXTENSION_USE_SRTP: u16 = 14;
const EXTENSION_EXTENDED_MASTER_SECRET: u16 = 23;

#[derive(Clone, Debug)]
pub struct Random {
    pub gmt_unix_time: u32,
    pub random_bytes: [u8; 28],
}

impl Random {
    pub fn generate() -> Self {
        let mut random_bytes = [0u8; 28];
        rand::rng().fill_bytes(&mut random_bytes);
        Random {
            gmt_unix_time: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs() as u32)
                .unwrap_or(0),
            random_bytes,
        }
    }

    pub fn encode(&self, out: &mut BytesMut) {
        out.put_u32(self.gmt_unix_time);
        out.put_slice(&self.random_bytes);
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Random> {
        if buf.remaining() < RANDOM_LENGTH {
            return Err(Error::HandshakeMessageTooShort);
        }
        let gmt_unix_time = buf.get_u32();
        let mut random_bytes = [0u8; 28];
        buf.copy_to_slice(&mut random_bytes);
        Ok(Random {
            gmt_unix_time,
            random_bytes,
        })
    }

    pub fn to_bytes(&self) -> [u8; RANDOM_LENGTH] {
        let mut out = [0u8; RANDOM_LENGTH];
        out[..4].copy_from_slice(&self.gmt_unix_time.to_be_bytes());
        out[4..].copy_from_slice(&self.random_bytes);
        out
    }
}

#[derive(Clone, Debug)]
pub struct ClientHello {
    pub random: Random,
    pub cookie: Vec<u8>,
    pub cipher_suites: Vec<u16>,
    pub srtp_profiles: Vec<u16>,
    pub supported_groups: Vec<u16>,
    pub extended_master_secret: bool,
}

impl ClientHello {
    pub fn decode(buf: &[u8]) -> Result<ClientHello> {
        let mut cursor = buf;
        if cursor.remaining() < 2 {
            return Err(Error::HandshakeMessageTooShort);
        }
        cursor.advance(2); // client_version
        let random = Random::decode(&mut cursor)?;

        let session_id_len = get_u8(&mut cursor)?;
        advance(&mut cursor, session_id_len as usize)?;

        let cookie_len = get_u8(&mut cursor)?;
        let cookie = take(&mut cursor, cookie_len as usize)?.to_vec();

        let cipher_suites_len = get_u16(&mut cursor)? as usize;
        let cipher_suite_bytes = take(&mut cursor, cipher_suites_len)?;
        let cipher_suites = cipher_suite_bytes
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();

        let compression_len = get_u8(&mut cursor)?;
        advance(&mut cursor, compression_len as usize)?;

        let mut srtp_profiles = Vec::new();
        let mut supported_groups = Vec::new();
        let mut extended_master_secret = false;

        if cursor.remaining() >= 2 {
            let extensions_len = get_u16(&mut cursor)? as usize;
            let mut ext_buf = take(&mut cursor, extensions_len)?;
            while ext_buf.remaining() >= 4 {
                let ext_type = get_u16(&mut ext_buf)?;
                let ext_len = get_u16(&mut ext_buf)? as usize;
                let mut body = take(&mut ext_buf, ext_len)?;
                match ext_type {
                    EXTENSION_USE_SRTP => {
                        let list_len = get_u16(&mut body)? as usize;
                        let list = take(&mut body, list_len)?;
                        srtp_profiles = list.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect();
                    }
                    EXTENSION_SUPPORTED_GROUPS => {
                        let list_len = get_u16(&mut body)? as usize;
                        let list = take(&mut body, list_len)?;
                        supported_groups = list.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect();
                    }
                    EXTENSION_EXTENDED_MASTER_SECRET => extended_master_secret = true,
                    _ => {}
                }
            }
        }

        Ok(ClientHello {
            random,
            cookie,
            cipher_suites,
            srtp_profiles,
            supported_groups,
            extended_master_secret,
        })
    }

    pub fn select_cipher_suite(&self) -> Result<u16> {
        if self.cipher_suites.contains(&CIPHER_SUITE_ECDHE_ECDSA_AES128_GCM_SHA256) {
            Ok(CIPHER_SUITE_ECDHE_ECDSA_AES128_GCM_SHA256)
        } else {
            Err(Error::NoMatchingCipherSuite)
        }
    }

    pub fn select_curve(&self) -> Result<u16> {
        if self.supported_groups.is_empty() || self.supported_groups.contains(&NAMED_CURVE_SECP256R1) {
            Ok(NAMED_CURVE_SECP256R1)
        } else {
            Err(Error::NoMatchingCurve)
        }
    }

    pub fn select_srtp_profile(&self, configured: &[SrtpProfile]) -> Result<SrtpProfile> {
        configured
            .iter()
            .find(|p| self.srtp_profiles.contains(&p.wire_id()))
            .copied()
            .ok_or(Error::NoMatchingSrtpProfile)
    }
}

#[derive(Clone, Debug)]
pub struct HelloVerifyRequest {
    pub cookie: Vec<u8>,
}

impl HelloVerifyRequest {
    pub fn encode(&self) -> BytesMut {
        let mut out = BytesMut::new();
        out.put_u8(DTLS1_2_MAJOR);
        out.put_u8(DTLS1_2_MINOR);
        out.put_u8(self.cookie.len() as u8);
        out.put_slice(&self.cookie);
        out
    }
}

const DTLS1_2_MAJOR: u8 = 254;
const DTLS1_2_MINOR: u8 = 253;

#[derive(Clone, Debug)]
pub struct ServerHello {
    pub random: Random,
    pub cipher_suite: u16,
    pub srtp_profile: SrtpProfile,
    pub extended_master_secret: bool,
}

impl ServerHello {
    pub fn encode(&self) -> BytesMut {
        let mut out = BytesMut::new();
        out.put_u8(DTLS1_2_MAJOR);
        out.put_u8(DTLS1_2_MINOR);
        self.random.encode(&mut out);
        out.put_u8(0); // session_id length
        out.put_u16(self.cipher_suite);
        out.put_u8(0); // compression method: null

        let mut extensions = BytesMut::new();
        extensions.put_u16(EXTENSION_USE_SRTP);
        extensions.put_u16(5); // extension_data length
        extensions.put_u16(2); // srtp protection profiles length
        extensions.put_u16(self.srtp_profile.wire_id());
        extensions.put_u8(0); // mki length

        if self.extended_master_secret {
            extensions.put_u16(EXTENSION_EXTENDED_MASTER_SECRET);
            extensions.put_u16(0);
        }

        out.put_u16(extensions.len() as u16);
        out.extend_from_slice(&extensions);
        out
    }
}

/// A single X.509 certificate in DER form, matching the self-signed
/// certificates WebRTC peers exchange (trust is established out-of-band via
/// the SDP `a=fingerprint`, not a CA chain).
#[derive(Clone, Debug)]
pub struct CertificateMessage {
    pub certificate_der: Vec<u8>,
}

impl CertificateMessage {
    pub fn encode(&self) -> BytesMut {
        let mut out = BytesMut::new();
        let mut list = BytesMut::new();
        list.put_slice(&(self.certificate_der.len() as u32).to_be_bytes()[1..4]);
        list.put_slice(&self.certificate_der);
        out.put_slice(&(list.len() as u32).to_be_bytes()[1..4]);
        out.extend_from_slice(&list);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<CertificateMessage> {
        let mut cursor = buf;
        let list_len = get_u24(&mut cursor)?;
        let mut list = take(&mut cursor, list_len)?;
        let cert_len = get_u24(&mut list)?;
        let certificate_der = take(&mut list, cert_len)?.to_vec();
        Ok(CertificateMessage { certificate_der })
    }
}

/// ECDHE ServerKeyExchange: named curve + uncompressed point + ECDSA
/// signature over `client_random || server_random || curve || point`.
#[derive(Clone, Debug)]
pub struct ServerKeyExchange {
    pub named_curve: u16,
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
}

impl ServerKeyExchange {
    pub fn encode(&self) -> BytesMut {
        let mut out = BytesMut::new();
        out.put_u8(3); // curve_type: named_curve
        out.put_u16(self.named_curve);
        out.put_u8(self.public_key.len() as u8);
        out.put_slice(&self.public_key);
        out.put_u16(0x0403); // signature_algorithm: ecdsa_secp256r1_sha256
        out.put_u16(self.signature.len() as u16);
        out.put_slice(&self.signature);
        out
    }

    pub fn signed_params(client_random: &[u8], server_random: &[u8], named_curve: u16, public_key: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(client_random.len() + server_random.len() + 3 + public_key.len());
        out.extend_from_slice(client_random);
        out.extend_from_slice(server_random);
        out.push(3);
        out.extend_from_slice(&named_curve.to_be_bytes());
        out.push(public_key.len() as u8);
        out.extend_from_slice(public_key);
        out
    }
}

#[derive(Clone, Debug)]
pub struct ClientKeyExchange {
    pub public_key: Vec<u8>,
}

impl ClientKeyExchange {
    pub fn decode(buf: &[u8]) -> Result<ClientKeyExchange> {
        let mut cursor = buf;
        let len = get_u8(&mut cursor)?;
        let public_key = take(&mut cursor, len as usize)?.to_vec();
        Ok(ClientKeyExchange { public_key })
    }
}

#[derive(Clone, Debug)]
pub struct Finished {
    pub verify_data: Vec<u8>,
}

impl Finished {
    pub fn encode(&self) -> BytesMut {
        BytesMut::from(self.verify_data.as_slice())
    }

    pub fn decode(buf: &[u8]) -> Finished {
        Finished {
            verify_data: buf.to_vec(),
        }
    }
}

fn get_u8(buf: &mut impl Buf) -> Result<u8> {
    if buf.remaining() < 1 {
        return Err(Error::HandshakeMessageTooShort);
    }
    Ok(buf.get_u8())
}

fn get_u16(buf: &mut impl Buf) -> Result<u16> {
    if buf.remaining() < 2 {
        return Err(Error::HandshakeMessageTooShort);
    }
    Ok(buf.get_u16())
}

fn get_u24(buf: &mut impl Buf) -> Result<usize> {
    if buf.remaining() < 3 {
        return Err(Error::HandshakeMessageTooShort);
    }
    let a = buf.get_u8() as usize;
    let b = buf.get_u8() as usize;
    let c = buf.get_u8() as usize;
    Ok((a << 16) | (b << 8) | c)
}

fn advance(buf: &mut impl Buf, n: usize) -> Result<()> {
    if buf.remaining() < n {
        return Err(Error::HandshakeMessageTooShort);
    }
    buf.advance(n);
    Ok(())
}

fn take<'a>(buf: &mut &'a [u8], n: usize) -> Result<&'a [u8]> {
    if buf.len() < n {
        return Err(Error::HandshakeMessageTooShort);
    }
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Ok(head)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_client_hello(cipher_suites: &[u16], srtp_profiles: &[u16], groups: &[u16]) -> BytesMut {
        let mut out = BytesMut::new();
        out.put_u8(254);
        out.put_u8(253);
        Random::generate().encode(&mut out);
        out.put_u8(0); // session_id
        out.put_u8(0); // cookie (first ClientHello carries none)
        out.put_u16((cipher_suites.len() * 2) as u16);
        for cs in cipher_suites {
            out.put_u16(*cs);
        }
        out.put_u8(1); // compression methods length
        out.put_u8(0); // null compression

        let mut extensions = BytesMut::new();
        if !srtp_profiles.is_empty() {
            extensions.put_u16(EXTENSION_USE_SRTP);
            let list_len = 2 + srtp_profiles.len() * 2 + 1;
            extensions.put_u16(list_len as u16);
            extensions.put_u16((srtp_profiles.len() * 2) as u16);
            for p in srtp_profiles {
                extensions.put_u16(*p);
            }
            extensions.put_u8(0);
        }
        if !groups.is_empty() {
            extensions.put_u16(EXTENSION_SUPPORTED_GROUPS);
            extensions.put_u16((2 + groups.len() * 2) as u16);
            extensions.put_u16((groups.len() * 2) as u16);
            for g in groups {
                extensions.put_u16(*g);
            }
        }
        extensions.put_u16(EXTENSION_EXTENDED_MASTER_SECRET);
        extensions.put_u16(0);

        out.put_u16(extensions.len() as u16);
        out.extend_from_slice(&extensions);
        out
    }

    #[test]
    fn decodes_offered_srtp_profiles_and_groups() {
        let raw = synthetic_client_hello(
            &[CIPHER_SUITE_ECDHE_ECDSA_AES128_GCM_SHA256, 0x0035],
            &[0x0007, 0x0001],
            &[NAMED_CURVE_SECP256R1],
        );
        let hello = ClientHello::decode(&raw).unwrap();
        assert_eq!(hello.select_cipher_suite().unwrap(), CIPHER_SUITE_ECDHE_ECDSA_AES128_GCM_SHA256);
        assert_eq!(hello.select_curve().unwrap(), NAMED_CURVE_SECP256R1);
        assert!(hello.extended_master_secret);
        let configured = [SrtpProfile::AeadAes128Gcm, SrtpProfile::Aes128CmSha1_80];
        assert_eq!(hello.select_srtp_profile(&configured).unwrap(), SrtpProfile::AeadAes128Gcm);
    }

    #[test]
    fn rejects_client_hello_without_our_cipher_suite() {
        let raw = synthetic_client_hello(&[0x0035], &[0x0001], &[NAMED_CURVE_SECP256R1]);
        let hello = ClientHello::decode(&raw).unwrap();
        assert!(matches!(hello.select_cipher_suite(), Err(Error::NoMatchingCipherSuite)));
    }

    #[test]
    fn rejects_client_hello_without_a_shared_srtp_profile() {
        let raw = synthetic_client_hello(
            &[CIPHER_SUITE_ECDHE_ECDSA_AES128_GCM_SHA256],
            &[0x0002],
            &[NAMED_CURVE_SECP256R1],
        );
        let hello = ClientHello::decode(&raw).unwrap();
        let configured = [SrtpProfile::AeadAes128Gcm];
        assert!(matches!(hello.select_srtp_profile(&configured), Err(Error::NoMatchingSrtpProfile)));
    }

    #[test]
    fn hello_verify_request_roundtrips_cookie_length() {
        let hvr = HelloVerifyRequest {
            cookie: vec![7u8; 20],
        };
        let encoded = hvr.encode();
        assert_eq!(encoded[2], 20);
        assert_eq!(&encoded[3..], &[7u8; 20][..]);
    }
}
