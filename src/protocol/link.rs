//! Link synchronization state machine.
//!
//! Tracks how far the session with the UPS has progressed and decides what,
//! if anything, to transmit. The machine is pure with respect to I/O: inputs
//! are framed messages and time-based ticks, outputs are [`LinkAction`]s the
//! engine writes to the transport. This keeps the whole synchronization
//! protocol testable without a device.
//!
//! Session shape, as reverse-engineered:
//!
//! 1. `INIT` — probe with `F7 FD` until the device answers.
//! 2. `INIT_RESET` — a reset (`FD`) was issued; re-issue only after a
//!    cooldown so a dead link is not flooded.
//! 3. `MODE0` — the device replays its full identifier sweep, one message
//!    per `FE` acknowledgement. When the sweep wraps to an already-seen id,
//!    or reaches the terminal id `0x7F` (where the device poses its
//!    authentication challenge), streaming starts.
//! 4. `MODE1` — continuous status frames, each acknowledged with `FE` or an
//!    operator-queued write message. Silence beyond the liveness timeout
//!    regresses to `INIT`.
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use super::{build_write_message, Frame, CMD_BACK, CMD_INIT, CMD_NEXT, CMD_RESET, SWEEP_TERMINAL_ID};

/// Current synchronization state of the serial link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinkState {
    Init,
    InitReset,
    Mode0,
    Mode1,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::Init => "INIT",
            LinkState::InitReset => "INIT_RESET",
            LinkState::Mode0 => "MODE0",
            LinkState::Mode1 => "MODE1",
        };
        write!(f, "{}", name)
    }
}

/// Side effect requested by a transition. The machine never touches the
/// transport itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAction {
    Send(Vec<u8>),
}

/// Time thresholds driving the machine's tick transitions.
#[derive(Debug, Clone)]
pub struct LinkTimeouts {
    /// Gap between `F7 FD` probes while in INIT.
    pub probe_interval: Duration,
    /// Silence in INIT before escalating to INIT_RESET.
    pub init_threshold: Duration,
    /// Minimum gap between reset bytes in INIT_RESET.
    pub reset_cooldown: Duration,
    /// Silence in MODE0 before the sweep is considered stalled.
    pub sweep_stall: Duration,
    /// Silence in MODE1 before the link is presumed lost.
    pub liveness: Duration,
}

impl Default for LinkTimeouts {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_millis(2000),
            init_threshold: Duration::from_millis(6000),
            reset_cooldown: Duration::from_millis(1000),
            sweep_stall: Duration::from_millis(5000),
            liveness: Duration::from_millis(5000),
        }
    }
}

/// Bytes captured during the sweep that feed the challenge answer: series id
/// and header from id 0x00, serial number from 0x40, password from 0x7E.
#[derive(Debug, Default)]
struct ChallengeSeed {
    series: Option<[u8; 2]>,
    header: Option<[u8; 8]>,
    serial: Option<[u8; 14]>,
    password: Option<[u8; 2]>,
}

impl ChallengeSeed {
    fn record(&mut self, frame: &Frame) {
        match frame.id {
            0x00 if frame.payload.len() >= 8 => {
                let mut header = [0u8; 8];
                header.copy_from_slice(&frame.payload[0..8]);
                self.header = Some(header);
                self.series = Some([frame.payload[3], frame.payload[4]]);
            }
            0x40 if frame.payload.len() >= 14 => {
                let mut serial = [0u8; 14];
                serial.copy_from_slice(&frame.payload[0..14]);
                self.serial = Some(serial);
            }
            0x7E if frame.payload.len() >= 10 => {
                self.password = Some([frame.payload[8], frame.payload[9]]);
            }
            _ => {}
        }
    }

    /// Challenge answer message, if every seed component was observed. The
    /// rolling sums are the same Fletcher-style mod-255 pair the checksum
    /// uses, seeded from the series id.
    fn answer(&self) -> Option<Vec<u8>> {
        let series = self.series?;
        let header = self.header?;
        let serial = self.serial?;
        let password = self.password?;
        let mut b0 = u32::from(series[1]);
        let mut b1 = u32::from(series[0]);
        for &byte in header.iter().chain(serial.iter()).chain(password.iter()) {
            b0 = (b0 + u32::from(byte)) % 255;
            b1 = (b1 + b0) % 255;
        }
        Some(build_write_message(0x7E, 12, &[1, 1, b0 as u8, b1 as u8]))
    }
}

/// The link state machine. Owned by the protocol engine; readers observe the
/// state through the engine's watch channel.
pub struct LinkStateMachine {
    state: LinkState,
    timeouts: LinkTimeouts,
    entered_at: Instant,
    last_frame_at: Option<Instant>,
    last_probe_at: Option<Instant>,
    last_reset_at: Option<Instant>,
    ids_seen: Vec<u8>,
    seed: ChallengeSeed,
    pending_write: Option<Vec<u8>>,
}

impl LinkStateMachine {
    pub fn new(timeouts: LinkTimeouts, now: Instant) -> Self {
        Self {
            state: LinkState::Init,
            timeouts,
            entered_at: now,
            last_frame_at: None,
            last_probe_at: None,
            last_reset_at: None,
            ids_seen: Vec::new(),
            seed: ChallengeSeed::default(),
            pending_write: None,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Distinct ids recorded during the current sweep.
    pub fn sweep_len(&self) -> usize {
        self.ids_seen.len()
    }

    /// Queue an operator write message. Accepted only while streaming; the
    /// message replaces the next `FE` acknowledgement, which is how the
    /// device expects writes to be interleaved.
    pub fn queue_write(&mut self, msg: Vec<u8>) -> bool {
        if self.state != LinkState::Mode1 {
            return false;
        }
        self.pending_write = Some(msg);
        true
    }

    /// Feed one framed message through the machine.
    pub fn on_frame(&mut self, frame: &Frame, now: Instant) -> Vec<LinkAction> {
        self.last_frame_at = Some(now);
        match self.state {
            LinkState::Init | LinkState::InitReset => {
                info!(
                    "device responded (id {:#04x}), identifier sweep started",
                    frame.id
                );
                self.ids_seen.clear();
                self.seed = ChallengeSeed::default();
                self.seed.record(frame);
                self.ids_seen.push(frame.id);
                self.enter(LinkState::Mode0, now);
                vec![LinkAction::Send(CMD_NEXT.to_vec())]
            }
            LinkState::Mode0 => {
                self.seed.record(frame);
                if frame.id == SWEEP_TERMINAL_ID {
                    let action = match self.seed.answer() {
                        Some(answer) => LinkAction::Send(answer),
                        None => {
                            warn!("sweep ended before challenge seed complete, not answering");
                            LinkAction::Send(CMD_NEXT.to_vec())
                        }
                    };
                    info!(
                        "identifier sweep complete ({} ids), streaming",
                        self.ids_seen.len()
                    );
                    self.enter(LinkState::Mode1, now);
                    vec![action]
                } else if self.ids_seen.contains(&frame.id) {
                    info!(
                        "identifier sweep wrapped at id {:#04x} ({} ids), streaming",
                        frame.id,
                        self.ids_seen.len()
                    );
                    self.enter(LinkState::Mode1, now);
                    vec![LinkAction::Send(CMD_NEXT.to_vec())]
                } else {
                    self.ids_seen.push(frame.id);
                    vec![LinkAction::Send(CMD_NEXT.to_vec())]
                }
            }
            LinkState::Mode1 => {
                let msg = self
                    .pending_write
                    .take()
                    .unwrap_or_else(|| CMD_NEXT.to_vec());
                vec![LinkAction::Send(msg)]
            }
        }
    }

    /// Time-based check, run every engine poll cycle regardless of whether
    /// bytes arrived, so timeouts fire during silence.
    pub fn on_tick(&mut self, now: Instant) -> Vec<LinkAction> {
        match self.state {
            LinkState::Init => {
                if now.duration_since(self.entered_at) >= self.timeouts.init_threshold {
                    warn!("no response from device, issuing reset");
                    self.enter(LinkState::InitReset, now);
                    self.last_reset_at = Some(now);
                    return vec![LinkAction::Send(CMD_RESET.to_vec())];
                }
                let probe_due = match self.last_probe_at {
                    None => true,
                    Some(at) => now.duration_since(at) >= self.timeouts.probe_interval,
                };
                if probe_due {
                    self.last_probe_at = Some(now);
                    debug!("probing device");
                    return vec![LinkAction::Send(CMD_INIT.to_vec())];
                }
                Vec::new()
            }
            LinkState::InitReset => {
                let cooldown_over = match self.last_reset_at {
                    None => true,
                    Some(at) => now.duration_since(at) >= self.timeouts.reset_cooldown,
                };
                if cooldown_over {
                    self.last_reset_at = Some(now);
                    debug!("re-issuing reset");
                    return vec![LinkAction::Send(CMD_RESET.to_vec())];
                }
                Vec::new()
            }
            LinkState::Mode0 => {
                if self.silent_for(now) >= self.timeouts.sweep_stall {
                    warn!("identifier sweep stalled, resetting");
                    self.enter(LinkState::InitReset, now);
                    self.last_reset_at = Some(now);
                    return vec![LinkAction::Send(CMD_RESET.to_vec())];
                }
                Vec::new()
            }
            LinkState::Mode1 => {
                if self.silent_for(now) >= self.timeouts.liveness {
                    warn!(
                        "link silent for {:?}, presumed lost, back to INIT",
                        self.silent_for(now)
                    );
                    self.ids_seen.clear();
                    self.seed = ChallengeSeed::default();
                    self.pending_write = None;
                    self.last_probe_at = None;
                    self.enter(LinkState::Init, now);
                }
                Vec::new()
            }
        }
    }

    /// The framer discarded bytes resynchronizing. While talking to the
    /// device, ask it to replay the previous message.
    pub fn on_desync(&mut self) -> Vec<LinkAction> {
        match self.state {
            LinkState::Mode0 | LinkState::Mode1 => vec![LinkAction::Send(CMD_BACK.to_vec())],
            _ => Vec::new(),
        }
    }

    fn silent_for(&self, now: Instant) -> Duration {
        let reference = self.last_frame_at.unwrap_or(self.entered_at);
        now.duration_since(reference.max(self.entered_at))
    }

    fn enter(&mut self, state: LinkState, now: Instant) {
        if state != self.state {
            debug!("link state {} -> {}", self.state, state);
            self.state = state;
            self.entered_at = now;
        }
    }
}
