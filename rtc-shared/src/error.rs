use std::net::SocketAddr;

use thiserror::Error;

/// Error kinds shared by every crate in this workspace.
///
/// Individual crates add their own narrower errors and convert into this one
/// at their public boundary, the way `rtc-ice`/`rtc-dtls` convert into
/// `shared::error::Error` in the teacher workspace.
#[non_exhaustive]
#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("config invalid: {0}")]
    ConfigInvalid(String),

    #[error("failed to bind socket: {0}")]
    SocketBind(String),

    #[error("invalid remote address {0}")]
    InvalidRemoteAddress(SocketAddr),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),

    #[error("handshake still in progress")]
    HandshakeInProgress,

    #[error("export_keying_material does not support a context")]
    ContextUnsupported,

    #[error("cipher suite has not been chosen")]
    CipherSuiteUnset,

    #[error("export_keying_material reserved label {0}")]
    ReservedExportKeyingMaterial(String),

    #[error("prf: hash error: {0}")]
    Hash(String),

    #[error("address parse failed")]
    AddressParseFailed,

    #[error("io error: {0}")]
    Io(String),

    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
