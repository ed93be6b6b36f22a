//! Protocol engine: the loop tying transport, framer, state machine,
//! decoder and store together.
//!
//! Byte order matters for framing, so there is exactly one decode loop and
//! it is the store's sole writer. External consumers hold an
//! [`EngineHandle`]: parameter reads go straight to the shared store, the
//! link state is observed over a watch channel, and commands (shutdown,
//! operator writes) travel over an mpsc channel that the loop drains every
//! poll cycle. The transport is polled with a bounded timeout so liveness
//! checks and shutdown stay prompt even when the line is silent.
use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use tokio::sync::{mpsc, watch};

use crate::logutil::{escape_log, hex_snippet};
use crate::transport::Transport;

use super::decode;
use super::framer::Framer;
use super::link::{LinkAction, LinkState, LinkStateMachine, LinkTimeouts};
use super::store::{ParameterEntry, ParameterStore};

#[derive(Debug)]
pub enum EngineCommand {
    /// Raw pre-built write message to interleave into the MODE1 stream.
    Write(Vec<u8>),
    Shutdown,
}

/// Read-side handle for the operator CLI (or any other consumer). All
/// methods are non-blocking with respect to the decode loop.
#[derive(Clone)]
pub struct EngineHandle {
    store: ParameterStore,
    state_rx: watch::Receiver<LinkState>,
    cmd_tx: mpsc::UnboundedSender<EngineCommand>,
}

impl EngineHandle {
    pub fn link_state(&self) -> LinkState {
        *self.state_rx.borrow()
    }

    /// Last decoded value for `name`; `None` means never seen.
    pub fn parameter(&self, name: &str) -> Option<ParameterEntry> {
        self.store.get(name)
    }

    /// Point-in-time snapshot of all known parameters.
    pub fn parameters(&self) -> HashMap<String, ParameterEntry> {
        self.store.snapshot()
    }

    /// Queue an operator write message. Returns false once the engine is
    /// gone. The engine drops the write (with a warning) if the link is not
    /// in MODE1 when it drains the command.
    pub fn queue_write(&self, msg: Vec<u8>) -> bool {
        self.cmd_tx.send(EngineCommand::Write(msg)).is_ok()
    }

    /// Ask the engine loop to stop after the current poll cycle.
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(EngineCommand::Shutdown);
    }
}

/// The decode loop. Constructed together with its [`EngineHandle`]; consume
/// it with [`run`](ProtocolEngine::run).
pub struct ProtocolEngine<T: Transport> {
    transport: T,
    framer: Framer,
    link: LinkStateMachine,
    store: ParameterStore,
    state_tx: watch::Sender<LinkState>,
    cmd_rx: mpsc::UnboundedReceiver<EngineCommand>,
    poll_interval: Duration,
}

impl<T: Transport> ProtocolEngine<T> {
    pub fn new(
        transport: T,
        timeouts: LinkTimeouts,
        poll_interval: Duration,
    ) -> (Self, EngineHandle) {
        let store = ParameterStore::new();
        let (state_tx, state_rx) = watch::channel(LinkState::Init);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let handle = EngineHandle {
            store: store.clone(),
            state_rx,
            cmd_tx,
        };
        let engine = Self {
            transport,
            framer: Framer::new(),
            link: LinkStateMachine::new(timeouts, Instant::now()),
            store,
            state_tx,
            cmd_rx,
            poll_interval,
        };
        (engine, handle)
    }

    /// Run until shutdown is requested or the transport fails. Transport
    /// errors are fatal and propagate; reconnection policy belongs to the
    /// caller.
    pub async fn run(mut self) -> Result<()> {
        info!("protocol engine starting");
        loop {
            while let Ok(cmd) = self.cmd_rx.try_recv() {
                match cmd {
                    EngineCommand::Shutdown => {
                        info!("protocol engine shutting down");
                        return Ok(());
                    }
                    EngineCommand::Write(msg) => {
                        if !self.link.queue_write(msg) {
                            warn!("dropping operator write, link not in MODE1");
                        }
                    }
                }
            }

            let chunk = self
                .transport
                .read_available(self.poll_interval)
                .context("transport read failed")?;
            if !chunk.is_empty() {
                debug!("rx {} bytes: {}", chunk.len(), hex_snippet(&chunk, 64));
                self.framer.push(&chunk);
            }

            let now = Instant::now();
            while let Some(frame) = self.framer.next_frame() {
                debug!(
                    "frame id {:#04x} payload {}",
                    frame.id,
                    hex_snippet(&frame.payload, 32)
                );
                let actions = self.link.on_frame(&frame, now);
                self.dispatch(actions)?;
                let updates = decode::decode(frame.id, &frame.payload);
                if updates.is_empty() {
                    if decode::rule_for(frame.id).is_none() {
                        debug!("no decode rule for id {:#04x}", frame.id);
                    }
                } else {
                    for (name, value) in &updates {
                        if let decode::ParamValue::Text(text) = value {
                            debug!("{} = \"{}\"", name, escape_log(text));
                        }
                    }
                    self.store.apply(updates);
                }
            }

            let dropped = self.framer.take_dropped();
            if dropped > 0 {
                debug!("resynchronized, dropped {} bytes", dropped);
                let actions = self.link.on_desync();
                self.dispatch(actions)?;
            }

            let actions = self.link.on_tick(Instant::now());
            self.dispatch(actions)?;

            self.publish_state();

            // The transport read above blocks the thread; yield so other
            // tasks on this worker get scheduled between poll cycles.
            tokio::task::yield_now().await;
        }
    }

    fn dispatch(&mut self, actions: Vec<LinkAction>) -> Result<()> {
        for action in actions {
            match action {
                LinkAction::Send(bytes) => {
                    debug!("tx {}", hex_snippet(&bytes, 32));
                    self.transport
                        .write_bytes(&bytes)
                        .context("transport write failed")?;
                }
            }
        }
        Ok(())
    }

    fn publish_state(&self) {
        let state = self.link.state();
        if *self.state_tx.borrow() != state {
            let _ = self.state_tx.send(state);
        }
    }
}
