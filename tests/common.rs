//! Test utilities & fixtures.
//! Scripted transport plus wire-message builders shared by the integration
//! tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use microlink::protocol::{checksum, PAYLOAD_LEN};
use microlink::transport::{Transport, TransportError};

/// Build a full wire message for a device->host frame: id + payload padded
/// to 16 bytes + Fletcher trailer.
pub fn frame_bytes(id: u8, payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() <= PAYLOAD_LEN, "payload too long for a frame");
    let mut msg = Vec::with_capacity(19);
    msg.push(id);
    msg.extend_from_slice(payload);
    msg.resize(1 + PAYLOAD_LEN, 0);
    let trailer = checksum::message_trailer(&msg);
    msg.extend_from_slice(&trailer.to_be_bytes());
    msg
}

/// A status frame (id 0x6F) carrying the given output voltage in the
/// device's binary-point encoding (fractional point at bit 6).
pub fn status_frame_with_voltage(volts: f64) -> Vec<u8> {
    let mut payload = [0u8; PAYLOAD_LEN];
    let wire = microlink::protocol::decode::f64_to_bp(volts, 6);
    payload[6] = wire[0];
    payload[7] = wire[1];
    frame_bytes(0x6F, &payload)
}

/// Transport that replays scripted receive chunks and records every write.
/// Once the script is exhausted, reads return nothing (after a short nap so
/// the engine loop does not spin hot in tests).
pub struct MockTransport {
    rx: VecDeque<Vec<u8>>,
    pub written: Arc<Mutex<Vec<u8>>>,
}

impl MockTransport {
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            rx: chunks.into(),
            written: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Handle for inspecting writes after the transport has been moved into
    /// the engine.
    pub fn written_handle(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.written)
    }
}

impl Transport for MockTransport {
    fn read_available(&mut self, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
        match self.rx.pop_front() {
            Some(chunk) => Ok(chunk),
            None => {
                std::thread::sleep(Duration::from_millis(1));
                Ok(Vec::new())
            }
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.written
            .lock()
            .expect("mock transport lock")
            .extend_from_slice(bytes);
        Ok(())
    }
}
