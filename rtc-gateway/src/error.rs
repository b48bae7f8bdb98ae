use thiserror::Error;

/// Outward-facing error for the whole gateway. Every lower-crate error
/// converts into one of these variants, mirroring how `rtc-ice`/`rtc-dtls`
/// convert into `shared::error::Error` at their own boundary.
#[derive(Error, Debug)]
pub enum Error {
    #[error("config invalid: {0}")]
    ConfigInvalid(String),

    #[error("failed to bind socket: {0}")]
    SocketBind(String),

    #[error("sdp malformed: {0}")]
    SdpMalformed(#[from] sdp::Error),

    #[error("stun malformed: {0}")]
    StunMalformed(#[from] stun::Error),

    #[error("stun request unauthorized")]
    StunUnauthorized,

    #[error("role conflict")]
    RoleConflict,

    #[error("dtls handshake failed: {0}")]
    DtlsHandshakeFailed(#[from] dtls::Error),

    #[error("srtp profile unsupported or key install failed: {0}")]
    SrtpProfileUnsupported(#[from] srtp::Error),

    #[error("candidate malformed: {0}")]
    CandidateMalformed(#[from] ice::Error),

    #[error("peer address {0} already assigned to another stream")]
    PeerAddressReassignment(std::net::SocketAddr),

    #[error("session {0} timed out")]
    SessionTimeout(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),

    #[error("unknown session {0}")]
    UnknownSession(String),

    #[error("shared error: {0}")]
    Shared(#[from] shared::error::Error),

    #[error("certificate generation failed: {0}")]
    Certificate(#[from] rcgen::Error),

    #[error("could not parse generated private key: {0}")]
    KeyParse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
