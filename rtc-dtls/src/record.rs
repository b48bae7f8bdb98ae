use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Error, Result};

pub const DTLS1_2: (u8, u8) = (254, 253);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentType {
    ChangeCipherSpec,
    Alert,
    Handshake,
    ApplicationData,
}

impl ContentType {
    pub fn id(self) -> u8 {
        match self {
            ContentType::ChangeCipherSpec => 20,
            ContentType::Alert => 21,
            ContentType::Handshake => 22,
            ContentType::ApplicationData => 23,
        }
    }

    fn from_id(id: u8) -> Result<Self> {
        match id {
            20 => Ok(ContentType::ChangeCipherSpec),
            21 => Ok(ContentType::Alert),
            22 => Ok(ContentType::Handshake),
            23 => Ok(ContentType::ApplicationData),
            _ => Err(Error::UnexpectedMessage(id)),
        }
    }
}

/// The 13-byte DTLS record header (RFC 6347 §4.1).
#[derive(Clone, Debug)]
pub struct RecordHeader {
    pub content_type: ContentType,
    pub epoch: u16,
    pub sequence_number: u64,
    pub length: u16,
}

impl RecordHeader {
    pub const SIZE: usize = 13;

    pub fn encode(&self, out: &mut BytesMut) {
        out.put_u8(self.content_type.id());
        out.put_u8(DTLS1_2.0);
        out.put_u8(DTLS1_2.1);
        out.put_u16(self.epoch);
        out.put_slice(&self.sequence_number.to_be_bytes()[2..8]);
        out.put_u16(self.length);
    }

    pub fn decode(buf: &[u8]) -> Result<RecordHeader> {
        if buf.len() < Self::SIZE {
            return Err(Error::RecordTooShort);
        }
        let content_type = ContentType::from_id(buf[0])?;
        if (buf[1], buf[2]) != DTLS1_2 {
            return Err(Error::UnsupportedProtocolVersion);
        }
        let epoch = u16::from_be_bytes([buf[3], buf[4]]);
        let mut seq_bytes = [0u8; 8];
        seq_bytes[2..8].copy_from_slice(&buf[5..11]);
        let sequence_number = u64::from_be_bytes(seq_bytes);
        let length = u16::from_be_bytes([buf[11], buf[12]]);
        Ok(RecordHeader {
            content_type,
            epoch,
            sequence_number,
            length,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandshakeType {
    HelloRequest,
    ClientHello,
    ServerHello,
    HelloVerifyRequest,
    Certificate,
    ServerKeyExchange,
    CertificateRequest,
    ServerHelloDone,
    CertificateVerify,
    ClientKeyExchange,
    Finished,
}

impl HandshakeType {
    pub fn id(self) -> u8 {
        match self {
            HandshakeType::HelloRequest => 0,
            HandshakeType::ClientHello => 1,
            HandshakeType::ServerHello => 2,
            HandshakeType::HelloVerifyRequest => 3,
            HandshakeType::Certificate => 11,
            HandshakeType::ServerKeyExchange => 12,
            HandshakeType::CertificateRequest => 13,
            HandshakeType::ServerHelloDone => 14,
            HandshakeType::CertificateVerify => 15,
            HandshakeType::ClientKeyExchange => 16,
            HandshakeType::Finished => 20,
        }
    }

    pub fn from_id(id: u8) -> Result<Self> {
        Ok(match id {
            0 => HandshakeType::HelloRequest,
            1 => HandshakeType::ClientHello,
            2 => HandshakeType::ServerHello,
            3 => HandshakeType::HelloVerifyRequest,
            11 => HandshakeType::Certificate,
            12 => HandshakeType::ServerKeyExchange,
            13 => HandshakeType::CertificateRequest,
            14 => HandshakeType::ServerHelloDone,
            15 => HandshakeType::CertificateVerify,
            16 => HandshakeType::ClientKeyExchange,
            20 => HandshakeType::Finished,
            other => return Err(Error::UnexpectedMessage(other)),
        })
    }
}

/// The 12-byte DTLS handshake message header (RFC 6347 §4.2.2): adds
/// `message_seq`, `fragment_offset`, and `fragment_length` to TLS's header
/// so retransmitted flights can be matched and reassembled. This gateway
/// never fragments a handshake message across records, so
/// `fragment_offset` is always 0 and `fragment_length == length`.
#[derive(Clone, Debug)]
pub struct HandshakeHeader {
    pub msg_type: HandshakeType,
    pub length: u32,
    pub message_seq: u16,
}

impl HandshakeHeader {
    pub const SIZE: usize = 12;

    pub fn encode(&self, out: &mut BytesMut) {
        out.put_u8(self.msg_type.id());
        out.put_slice(&self.length.to_be_bytes()[1..4]);
        out.put_u16(self.message_seq);
        out.put_slice(&[0, 0, 0]); // fragment_offset
        out.put_slice(&self.length.to_be_bytes()[1..4]); // fragment_length
    }

    pub fn decode(buf: &mut impl Buf) -> Result<HandshakeHeader> {
        if buf.remaining() < Self::SIZE {
            return Err(Error::HandshakeMessageTooShort);
        }
        let msg_type = HandshakeType::from_id(buf.get_u8())?;
        let mut len_bytes = [0u8; 4];
        buf.copy_to_slice(&mut len_bytes[1..4]);
        let length = u32::from_be_bytes(len_bytes);
        let message_seq = buf.get_u16();
        let mut skip = [0u8; 6];
        buf.copy_to_slice(&mut skip);
        Ok(HandshakeHeader {
            msg_type,
            length,
            message_seq,
        })
    }
}
