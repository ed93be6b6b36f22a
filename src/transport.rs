//! Transport boundary: the byte source/sink the protocol engine drives.
//!
//! The engine only sees the [`Transport`] trait, so tests substitute a
//! scripted mock and the binary plugs in [`SerialTransport`] (behind the
//! default-on `serial` feature, matching how device support is gated).
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "serial")]
    #[error("failed to open serial port {port}: {source}")]
    Open {
        port: String,
        source: serialport::Error,
    },
}

/// A byte stream with bounded-wait reads. `read_available` returns whatever
/// arrived within `timeout`, possibly nothing; running dry is not an error.
/// Real I/O failures (device unplugged) are, and the engine treats them as
/// fatal.
pub trait Transport: Send {
    fn read_available(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError>;
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
}

/// Serial link to the UPS. Microlink runs at 9600 8N1.
#[cfg(feature = "serial")]
pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
}

#[cfg(feature = "serial")]
impl SerialTransport {
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self, TransportError> {
        let mut builder =
            serialport::new(port_name, baud_rate).timeout(Duration::from_millis(250));
        // Some USB serial adapters need explicit settings
        #[cfg(unix)]
        {
            builder = builder
                .data_bits(serialport::DataBits::Eight)
                .stop_bits(serialport::StopBits::One)
                .parity(serialport::Parity::None);
        }
        let port = builder.open().map_err(|source| TransportError::Open {
            port: port_name.to_string(),
            source,
        })?;
        Ok(Self { port })
    }
}

#[cfg(feature = "serial")]
impl Transport for SerialTransport {
    fn read_available(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        // Best effort; keep the previous timeout if the driver refuses.
        let _ = self.port.set_timeout(timeout);
        let mut buf = [0u8; 256];
        match self.port.read(&mut buf) {
            Ok(n) => Ok(buf[..n].to_vec()),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }
}
