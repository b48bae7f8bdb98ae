use bytes::{BufMut, BytesMut};
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::attributes::{RawAttribute, FINGERPRINT, MESSAGE_INTEGRITY};
use crate::error::{Error, Result};

pub const MAGIC_COOKIE: u32 = 0x2112_A442;
const HEADER_LENGTH: usize = 20;
const FINGERPRINT_XOR: u32 = 0x5354_554e;

/// STUN message class, the two bits spread across the message type per RFC 5389 §6.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Class {
    Request,
    Indication,
    Success,
    Error,
}

impl Class {
    fn bits(self) -> u16 {
        match self {
            Class::Request => 0b00,
            Class::Indication => 0b01,
            Class::Success => 0b10,
            Class::Error => 0b11,
        }
    }

    fn from_bits(bits: u16) -> Self {
        match bits {
            0b00 => Class::Request,
            0b01 => Class::Indication,
            0b10 => Class::Success,
            _ => Class::Error,
        }
    }
}

/// STUN method, the 12 significant bits of the message type excluding the class bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Method(pub u16);

pub const BINDING: Method = Method(0x0001);

fn message_type(class: Class, method: Method) -> u16 {
    let m = method.0;
    let c = class.bits();
    // RFC 5389 figure 3: method split into M11-M7, M6-M4, M3-M0 with C1, C0 interleaved.
    let m_low = m & 0x000f;
    let m_mid = (m >> 4) & 0x0007;
    let m_high = (m >> 7) & 0x001f;
    (m_high << 9) | ((c & 0b10) << 7) | (m_mid << 5) | ((c & 0b01) << 4) | m_low
}

fn split_message_type(typ: u16) -> (Class, Method) {
    let m_high = (typ >> 9) & 0x001f;
    let c1 = (typ >> 8) & 0x1;
    let m_mid = (typ >> 5) & 0x0007;
    let c0 = (typ >> 4) & 0x1;
    let m_low = typ & 0x000f;
    let method = (m_high << 7) | (m_mid << 4) | m_low;
    let class = Class::from_bits((c1 << 1) | c0);
    (class, Method(method))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TransactionId(pub [u8; 12]);

impl TransactionId {
    pub fn new(bytes: [u8; 12]) -> Self {
        TransactionId(bytes)
    }

    pub fn random() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 12];
        rand::rng().fill_bytes(&mut bytes);
        TransactionId(bytes)
    }
}

/// A decoded or to-be-encoded STUN message.
///
/// Built with [`Message::build`], the message can then have
/// [`append_message_integrity`](Message::append_message_integrity) and
/// [`append_fingerprint`](Message::append_fingerprint) applied, matching the
/// wire requirement that FINGERPRINT (when present) is the last attribute and
/// that MESSAGE-INTEGRITY covers the frame up to its own boundary with the
/// length field temporarily rewritten.
#[derive(Clone, Debug)]
pub struct Message {
    pub class: Class,
    pub method: Method,
    pub transaction_id: TransactionId,
    pub attributes: Vec<RawAttribute>,
}

impl Message {
    pub fn build(class: Class, method: Method, transaction_id: TransactionId) -> Self {
        Message {
            class,
            method,
            transaction_id,
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, attr: RawAttribute) -> Self {
        self.attributes.push(attr);
        self
    }

    pub fn get(&self, typ: u16) -> Option<&RawAttribute> {
        self.attributes.iter().find(|a| a.typ == typ)
    }

    /// True if the first byte of `buf` indicates a STUN message per RFC 7983 (top two bits zero).
    pub fn is_message(buf: &[u8]) -> bool {
        !buf.is_empty() && buf[0] <= 3
    }

    pub fn encode(&self) -> BytesMut {
        let mut body = BytesMut::new();
        for attr in &self.attributes {
            encode_raw_attribute(&mut body, attr);
        }

        let mut out = BytesMut::with_capacity(HEADER_LENGTH + body.len());
        write_header(&mut out, self.class, self.method, body.len() as u16, &self.transaction_id);
        out.extend_from_slice(&body);
        out
    }

    /// Append MESSAGE-INTEGRITY computed with `key` over the frame as it
    /// stands, with the length field rewritten to end at this attribute's
    /// boundary (RFC 5389 §15.4).
    pub fn append_message_integrity(buf: &mut BytesMut, key: &[u8]) -> Result<()> {
        let body_len_with_mi = (buf.len() - HEADER_LENGTH + 4 + 20) as u16;
        rewrite_length(buf, body_len_with_mi);

        let mut mac = Hmac::<Sha1>::new_from_slice(key).map_err(|_| Error::IntegrityMismatch)?;
        mac.update(buf);
        let tag = mac.finalize().into_bytes();

        append_attribute(buf, MESSAGE_INTEGRITY, &tag);
        Ok(())
    }

    pub fn verify_message_integrity(raw: &[u8], mi_offset: usize, key: &[u8]) -> bool {
        if raw.len() < mi_offset + 24 {
            return false;
        }
        let mut scratch = BytesMut::from(&raw[..mi_offset]);
        rewrite_length(&mut scratch, (mi_offset - HEADER_LENGTH + 24) as u16);

        let mut mac = match Hmac::<Sha1>::new_from_slice(key) {
            Ok(m) => m,
            Err(_) => return false,
        };
        mac.update(&scratch);
        let expected = mac.finalize().into_bytes();
        let got = &raw[mi_offset + 4..mi_offset + 24];
        subtle_eq(expected.as_slice(), got)
    }

    /// Append FINGERPRINT = CRC32 XOR 0x5354554e, MUST be the last attribute.
    pub fn append_fingerprint(buf: &mut BytesMut) {
        let body_len_with_fp = (buf.len() - HEADER_LENGTH + 8) as u16;
        rewrite_length(buf, body_len_with_fp);

        let crc = crc32(buf);
        let value = (crc ^ FINGERPRINT_XOR).to_be_bytes();
        append_attribute(buf, FINGERPRINT, &value);
    }

    pub fn verify_fingerprint(raw: &[u8]) -> bool {
        let Some(last) = RawAttribute::last(raw) else {
            return false;
        };
        if last.typ != FINGERPRINT || last.value.len() != 4 {
            return false;
        }
        let boundary = raw.len() - 8;
        let crc = crc32(&raw[..boundary]);
        let expected = (crc ^ FINGERPRINT_XOR).to_be_bytes();
        last.value == expected
    }

    pub fn decode(raw: &[u8]) -> Result<Self> {
        if raw.len() < HEADER_LENGTH {
            return Err(Error::MessageTooShort);
        }
        let typ = u16::from_be_bytes([raw[0], raw[1]]);
        let length = u16::from_be_bytes([raw[2], raw[3]]) as usize;
        let cookie = u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]);
        if cookie != MAGIC_COOKIE {
            return Err(Error::BadMagicCookie);
        }
        if raw.len() < HEADER_LENGTH + length {
            return Err(Error::AttributeOutOfBounds);
        }
        let mut transaction_id = [0u8; 12];
        transaction_id.copy_from_slice(&raw[8..20]);

        let (class, method) = split_message_type(typ);
        let attributes = RawAttribute::decode_all(&raw[HEADER_LENGTH..HEADER_LENGTH + length])?;

        Ok(Message {
            class,
            method,
            transaction_id: TransactionId(transaction_id),
            attributes,
        })
    }
}

fn write_header(out: &mut BytesMut, class: Class, method: Method, length: u16, tid: &TransactionId) {
    out.put_u16(message_type(class, method));
    out.put_u16(length);
    out.put_u32(MAGIC_COOKIE);
    out.put_slice(&tid.0);
}

fn rewrite_length(buf: &mut BytesMut, length: u16) {
    let bytes = length.to_be_bytes();
    buf[2] = bytes[0];
    buf[3] = bytes[1];
}

fn append_attribute(buf: &mut BytesMut, typ: u16, value: &[u8]) {
    let attr = RawAttribute {
        typ,
        value: value.to_vec(),
    };
    encode_raw_attribute(buf, &attr);
}

fn encode_raw_attribute(out: &mut BytesMut, attr: &RawAttribute) {
    out.put_u16(attr.typ);
    out.put_u16(attr.value.len() as u16);
    out.put_slice(&attr.value);
    let padding = (4 - (attr.value.len() % 4)) % 4;
    for _ in 0..padding {
        out.put_u8(0);
    }
}

fn subtle_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

fn crc32(buf: &[u8]) -> u32 {
    use crc::{Crc, CRC_32_ISO_HDLC};
    const STUN_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);
    STUN_CRC.checksum(buf)
}
