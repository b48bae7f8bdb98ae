#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod crypto;
pub mod error;
pub mod time;
pub(crate) mod transport;
pub mod util;

pub use transport::{
    EcnCodepoint, FiveTuple, FourTuple, TaggedBytesMut, TransportContext, TransportMessage,
    TransportProtocol,
};
