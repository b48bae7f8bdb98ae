pub mod config;
pub mod conn;
pub mod cookie;
pub mod error;
pub mod flight;
pub mod handshake;
pub mod prf;
pub mod record;
pub mod srtp_profile;
pub mod state;

pub use config::DtlsConfig;
pub use conn::Connection;
pub use error::{Error, Result};
pub use srtp_profile::SrtpProfile;
pub use state::ConnectionState;
