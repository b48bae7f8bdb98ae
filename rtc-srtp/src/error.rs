use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("srtp packet too short")]
    PacketTooShort,

    #[error("srtp authentication failed")]
    AuthenticationFailed,

    #[error("replay: packet index already seen")]
    Replayed,

    #[error("no protection profile negotiated")]
    ProfileUnset,

    #[error(transparent)]
    Shared(#[from] shared::error::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
