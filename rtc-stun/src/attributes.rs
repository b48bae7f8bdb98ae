use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::error::{Error, Result};
use crate::message::{TransactionId, MAGIC_COOKIE};

pub const MAPPED_ADDRESS: u16 = 0x0001;
pub const USERNAME: u16 = 0x0006;
pub const MESSAGE_INTEGRITY: u16 = 0x0008;
pub const ERROR_CODE: u16 = 0x0009;
pub const XOR_MAPPED_ADDRESS: u16 = 0x0020;
pub const PRIORITY: u16 = 0x0024;
pub const USE_CANDIDATE: u16 = 0x0025;
pub const FINGERPRINT: u16 = 0x8028;
pub const ICE_CONTROLLED: u16 = 0x8029;
pub const ICE_CONTROLLING: u16 = 0x802a;

/// An attribute as it appears on the wire: a type and its raw (unpadded) value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawAttribute {
    pub typ: u16,
    pub value: Vec<u8>,
}

impl RawAttribute {
    pub fn new(typ: u16, value: Vec<u8>) -> Self {
        RawAttribute { typ, value }
    }

    pub fn decode_all(body: &[u8]) -> Result<Vec<RawAttribute>> {
        let mut attrs = Vec::new();
        let mut offset = 0;
        while offset + 4 <= body.len() {
            let typ = u16::from_be_bytes([body[offset], body[offset + 1]]);
            let len = u16::from_be_bytes([body[offset + 2], body[offset + 3]]) as usize;
            let value_start = offset + 4;
            if value_start + len > body.len() {
                return Err(Error::AttributeOutOfBounds);
            }
            attrs.push(RawAttribute {
                typ,
                value: body[value_start..value_start + len].to_vec(),
            });
            let padding = (4 - (len % 4)) % 4;
            offset = value_start + len + padding;
        }
        Ok(attrs)
    }

    /// Find the last complete attribute in a fully encoded message, used to
    /// validate that FINGERPRINT is the terminal attribute.
    pub fn last(raw: &[u8]) -> Option<RawAttribute> {
        if raw.len() < 20 {
            return None;
        }
        let attrs = Self::decode_all(&raw[20..]).ok()?;
        attrs.into_iter().last()
    }
}

pub fn username(remote_ufrag: &str, local_ufrag: &str) -> RawAttribute {
    RawAttribute::new(
        USERNAME,
        format!("{remote_ufrag}:{local_ufrag}").into_bytes(),
    )
}

pub fn decode_username(attr: &RawAttribute) -> Result<String> {
    String::from_utf8(attr.value.clone()).map_err(|_| Error::MalformedAttribute("USERNAME"))
}

pub fn priority(p: u32) -> RawAttribute {
    RawAttribute::new(PRIORITY, p.to_be_bytes().to_vec())
}

pub fn decode_priority(attr: &RawAttribute) -> Result<u32> {
    let bytes: [u8; 4] = attr
        .value
        .as_slice()
        .try_into()
        .map_err(|_| Error::MalformedAttribute("PRIORITY"))?;
    Ok(u32::from_be_bytes(bytes))
}

pub fn use_candidate() -> RawAttribute {
    RawAttribute::new(USE_CANDIDATE, Vec::new())
}

pub fn ice_controlling(tiebreaker: u64) -> RawAttribute {
    RawAttribute::new(ICE_CONTROLLING, tiebreaker.to_be_bytes().to_vec())
}

pub fn ice_controlled(tiebreaker: u64) -> RawAttribute {
    RawAttribute::new(ICE_CONTROLLED, tiebreaker.to_be_bytes().to_vec())
}

pub fn decode_tiebreaker(attr: &RawAttribute) -> Result<u64> {
    let bytes: [u8; 8] = attr
        .value
        .as_slice()
        .try_into()
        .map_err(|_| Error::MalformedAttribute("ICE-CONTROL(LED|LING)"))?;
    Ok(u64::from_be_bytes(bytes))
}

/// ERROR-CODE: class (top 3 bits of the 3rd byte) * 100 + number (last byte), plus a reason phrase.
pub fn error_code(code: u16, reason: &str) -> RawAttribute {
    let class = (code / 100) as u8;
    let number = (code % 100) as u8;
    let mut value = vec![0, 0, class, number];
    value.extend_from_slice(reason.as_bytes());
    RawAttribute::new(ERROR_CODE, value)
}

pub fn decode_error_code(attr: &RawAttribute) -> Result<(u16, String)> {
    if attr.value.len() < 4 {
        return Err(Error::MalformedAttribute("ERROR-CODE"));
    }
    let class = attr.value[2] as u16;
    let number = attr.value[3] as u16;
    let reason = String::from_utf8_lossy(&attr.value[4..]).to_string();
    Ok((class * 100 + number, reason))
}

pub fn xor_mapped_address(addr: SocketAddr, tid: &TransactionId) -> RawAttribute {
    let mut value = Vec::with_capacity(8);
    value.push(0);
    match addr.ip() {
        IpAddr::V4(ip) => {
            value.push(0x01);
            let xport = (addr.port() ^ (MAGIC_COOKIE >> 16) as u16).to_be_bytes();
            value.extend_from_slice(&xport);
            let xip = u32::from(ip) ^ MAGIC_COOKIE;
            value.extend_from_slice(&xip.to_be_bytes());
        }
        IpAddr::V6(ip) => {
            value.push(0x02);
            let xport = (addr.port() ^ (MAGIC_COOKIE >> 16) as u16).to_be_bytes();
            value.extend_from_slice(&xport);
            let mut key = Vec::with_capacity(16);
            key.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
            key.extend_from_slice(&tid.0);
            let octets = ip.octets();
            let xored: Vec<u8> = octets.iter().zip(key.iter()).map(|(a, b)| a ^ b).collect();
            value.extend_from_slice(&xored);
        }
    }
    RawAttribute::new(XOR_MAPPED_ADDRESS, value)
}

pub fn decode_xor_mapped_address(attr: &RawAttribute, tid: &TransactionId) -> Result<SocketAddr> {
    if attr.value.len() < 8 {
        return Err(Error::MalformedAttribute("XOR-MAPPED-ADDRESS"));
    }
    let family = attr.value[1];
    let xport = u16::from_be_bytes([attr.value[2], attr.value[3]]);
    let port = xport ^ (MAGIC_COOKIE >> 16) as u16;
    match family {
        0x01 => {
            let xip = u32::from_be_bytes([attr.value[4], attr.value[5], attr.value[6], attr.value[7]]);
            let ip = Ipv4Addr::from(xip ^ MAGIC_COOKIE);
            Ok(SocketAddr::new(IpAddr::V4(ip), port))
        }
        0x02 => {
            if attr.value.len() < 20 {
                return Err(Error::MalformedAttribute("XOR-MAPPED-ADDRESS"));
            }
            let mut key = Vec::with_capacity(16);
            key.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
            key.extend_from_slice(&tid.0);
            let mut octets = [0u8; 16];
            for i in 0..16 {
                octets[i] = attr.value[4 + i] ^ key[i];
            }
            Ok(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), port))
        }
        other => Err(Error::UnsupportedFamily(other)),
    }
}
