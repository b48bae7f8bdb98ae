//! The server-side flight sequence for our one supported handshake:
//!
//! ```text
//! Flight0 (wait ClientHello) -> Flight2 (HelloVerifyRequest) ->
//! Flight0again (wait ClientHello+cookie) ->
//! Flight4 (ServerHello, Certificate, ServerKeyExchange, ServerHelloDone) ->
//! Flight6 (wait ClientKeyExchange, ChangeCipherSpec, Finished) -> done
//! ```
//!
//! Grounded on the RFC 6347 §4.2.4 flight-retransmission FSM: each flight is
//! "generate packets, send, wait for the next flight's trigger, repeat on
//! timeout". We never act as the handshake's initiator (no ClientHello,
//! no flight1/3/5), so the teacher's generic `Flight` trait collapses to a
//! plain enum matched over in `Connection::step`.

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flight {
    /// Waiting for the first ClientHello.
    Flight0,
    /// Sent HelloVerifyRequest, waiting for ClientHello+cookie.
    Flight2,
    /// Sent ServerHello..ServerHelloDone, waiting for the client's response flight.
    Flight4,
    /// Sent ChangeCipherSpec+Finished, handshake complete.
    Flight6,
}

impl fmt::Display for Flight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Flight::Flight0 => "Flight0",
            Flight::Flight2 => "Flight2",
            Flight::Flight4 => "Flight4",
            Flight::Flight6 => "Flight6",
        };
        write!(f, "{name}")
    }
}
