//! # Microlink - APC Smart-UPS serial protocol decoder
//!
//! Microlink is the undocumented serial protocol APC Smart-UPS units use to
//! report status and telemetry. This crate synchronizes onto the 19-byte
//! message framing of a raw serial byte stream, walks the device's
//! identifier-sweep handshake into streaming mode, decodes known message ids
//! into typed parameters and keeps a live name→value store an operator CLI
//! can query without disturbing the decode loop.
//!
//! The protocol is reverse-engineered; layouts come from device captures and
//! scattered APC documentation. Unknown message ids are tolerated
//! everywhere: they keep the link alive and decode to nothing.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use microlink::config::Config;
//! use microlink::protocol::engine::ProtocolEngine;
//! use microlink::transport::SerialTransport;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let transport = SerialTransport::open(&config.ups.port, config.ups.baud_rate)?;
//!     let (engine, handle) = ProtocolEngine::new(
//!         transport,
//!         config.link.timeouts(),
//!         config.link.poll_interval(),
//!     );
//!     let task = tokio::spawn(engine.run());
//!
//!     // ... query `handle` from elsewhere ...
//!     println!("link: {}", handle.link_state());
//!
//!     handle.shutdown();
//!     task.await??;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`protocol`] - Framer, link state machine, decoder, store, engine
//! - [`transport`] - `Transport` trait and the serialport-backed link
//! - [`config`] - Configuration management and validation
//! - [`logutil`] - Log sanitization helpers for binary traffic

pub mod config;
pub mod logutil;
pub mod protocol;
pub mod transport;
