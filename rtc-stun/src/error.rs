use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("stun message too short")]
    MessageTooShort,

    #[error("bad magic cookie")]
    BadMagicCookie,

    #[error("attribute length exceeds message bounds")]
    AttributeOutOfBounds,

    #[error("message-integrity mismatch")]
    IntegrityMismatch,

    #[error("fingerprint mismatch")]
    FingerprintMismatch,

    #[error("fingerprint is not the last attribute")]
    FingerprintNotLast,

    #[error("missing attribute {0}")]
    MissingAttribute(&'static str),

    #[error("malformed attribute {0}")]
    MalformedAttribute(&'static str),

    #[error("unsupported address family {0}")]
    UnsupportedFamily(u8),
}

pub type Result<T> = std::result::Result<T, Error>;
