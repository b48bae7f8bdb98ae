use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("candidate string missing field {0}")]
    MissingField(&'static str),

    #[error("unknown candidate transport {0}")]
    UnknownTransport(String),

    #[error("unknown candidate type {0}")]
    UnknownCandidateType(String),

    #[error("invalid candidate priority {0}")]
    InvalidPriority(String),

    #[error("invalid candidate port {0}")]
    InvalidPort(String),

    #[error("invalid candidate address {0}")]
    InvalidAddress(String),

    #[error("stun error: {0}")]
    Stun(#[from] stun::Error),

    #[error("role conflict: peer tiebreaker wins")]
    RoleConflict,
}

pub type Result<T> = std::result::Result<T, Error>;
