#![warn(rust_2018_idioms)]
#![allow(dead_code)]

//! RFC 4566 SDP lexical predicates, a typed session/media description tree,
//! and the attribute-cursor API used to query `a=` lines without scanning
//! the whole list for every lookup.

pub mod attribute;
pub mod description;
pub mod direction;
pub mod error;
pub mod util;

pub(crate) mod lexer;

pub use attribute::{Attribute, AttributeCursor, AttributeHolder, RtpMap};
pub use description::{media::MediaDescription, session::SessionDescription};
pub use direction::Direction;
pub use error::{Error, Result};
