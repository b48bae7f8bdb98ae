use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid fsm transition from {0}")]
    InvalidFsmTransition(&'static str),

    #[error("record too short")]
    RecordTooShort,

    #[error("handshake message too short")]
    HandshakeMessageTooShort,

    #[error("unsupported protocol version")]
    UnsupportedProtocolVersion,

    #[error("no matching cipher suite")]
    NoMatchingCipherSuite,

    #[error("no matching srtp profile")]
    NoMatchingSrtpProfile,

    #[error("no matching elliptic curve")]
    NoMatchingCurve,

    #[error("cookie mismatch")]
    CookieMismatch,

    #[error("unexpected handshake message type {0}")]
    UnexpectedMessage(u8),

    #[error("certificate verify failed")]
    CertificateVerifyFailed,

    #[error("finished verify_data mismatch")]
    FinishedMismatch,

    #[error("handshake timed out after {0} retransmits")]
    HandshakeTimeout(u32),

    #[error("no certificate configured")]
    NoCertificate,

    #[error(transparent)]
    Shared(#[from] shared::error::Error),

    #[error("crypto error: {0}")]
    Crypto(String),
}

pub type Result<T> = std::result::Result<T, Error>;
