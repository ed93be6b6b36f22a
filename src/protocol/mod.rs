//! # Microlink Protocol Module
//!
//! Everything needed to decode the reverse-engineered APC Microlink serial
//! protocol: message framing, the link synchronization state machine, the
//! per-id payload decoder, the live parameter store and the engine that ties
//! them to a transport.
//!
//! Data flow:
//!
//! ```text
//! transport bytes -> Framer -> Frame -> { LinkStateMachine (tx bytes out),
//!                                         decode (parameter updates) }
//!                                     -> ParameterStore
//! ```
//!
//! The protocol is undocumented; byte layouts and command bytes come from
//! observed device captures. Unknown message ids are tolerated everywhere:
//! they keep the link alive but decode to nothing.

pub mod checksum;
pub mod decode;
pub mod engine;
pub mod framer;
pub mod link;
pub mod store;

/// Total wire length of one message: id + payload + check bytes.
pub const MSG_LEN: usize = 19;
/// Payload bytes carried by every message.
pub const PAYLOAD_LEN: usize = 16;

/// Handshake probe sent while waiting for the device to respond.
pub const CMD_INIT: &[u8] = &[0xF7, 0xFD];
/// Request retransmission of the previous message.
pub const CMD_BACK: &[u8] = &[0xF7];
/// Reset the device's protocol session.
pub const CMD_RESET: &[u8] = &[0xFD];
/// Acknowledge a message and request the next one.
pub const CMD_NEXT: &[u8] = &[0xFE];

/// Highest message id; the device ends its identifier sweep here and expects
/// the authentication challenge answer.
pub const SWEEP_TERMINAL_ID: u8 = 0x7F;

/// One framed message: identifier byte plus its raw payload. Ephemeral; the
/// engine hands it to the state machine and decoder and drops it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: u8,
    pub payload: Vec<u8>,
}

/// Build an outbound write message: `<id><offset><len><data...><trailer>`.
/// Used for the challenge answer and operator-issued writes.
pub fn build_write_message(id: u8, offset: u8, data: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(3 + data.len() + 2);
    msg.push(id);
    msg.push(offset);
    msg.push(data.len() as u8);
    msg.extend_from_slice(data);
    let trailer = checksum::message_trailer(&msg);
    msg.extend_from_slice(&trailer.to_be_bytes());
    msg
}
