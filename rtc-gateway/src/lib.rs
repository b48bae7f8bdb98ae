//! ICE/DTLS-SRTP media gateway: terminates browser transport (ICE
//! connectivity checks, DTLS handshake, SRTP key derivation) on one shared
//! UDP socket per process and forwards decrypted RTP to internal plaintext
//! loop sockets. A JSON control plane drives session lifecycle; everything
//! else is pure sans-IO state machines wired together by `demux::Proxy`.

#![warn(rust_2018_idioms)]

pub mod cert;
pub mod config;
pub mod control;
pub mod demux;
pub mod error;
pub mod forwarding;
pub mod sdp_offer;
pub mod session;

pub use cert::Identity;
pub use config::GatewayConfig;
pub use control::{Event, Request};
pub use demux::Proxy;
pub use error::{Error, Result};
pub use session::{Session, SessionState, Stream};
