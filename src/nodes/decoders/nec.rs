//! NEC infrared protocol recogniser
//!
//! Runs at 20 kHz (50 µs per tick). Pulse and space lengths are measured in
//! ticks and classified with generous tolerances:
//!
//! | symbol         | nominal   | ticks |
//! |----------------|-----------|-------|
//! | leader pulse   | 9 ms      | 180   |
//! | leader space   | 4.5 ms    | 90    |
//! | repeat space   | 2.25 ms   | 45    |
//! | bit pulse      | 562.5 µs  | 11    |
//! | zero space     | 562.5 µs  | 11    |
//! | one space      | 1687.5 µs | 34    |
//!
//! A data frame is 32 bits LSB first: address, inverted address (or the
//! high address byte for extended NEC), command, inverted command, closed
//! by a stop pulse. A key release is reported after 150 ms without a
//! repeat frame.

use super::ir::{ProtocolResult, SymbolLibrary};
use std::ops::RangeInclusive;
use tracing::{debug, trace};

pub const NEC_SAMPLE_RATE: u64 = 20_000;
pub const NEC_PROTOCOL_ID: u32 = 2;

const LEADER_PULSE: RangeInclusive<u64> = 160..=200;
const LEADER_SPACE: RangeInclusive<u64> = 80..=100;
const REPEAT_SPACE: RangeInclusive<u64> = 38..=52;
const BIT_PULSE: RangeInclusive<u64> = 8..=15;
const ZERO_SPACE: RangeInclusive<u64> = 8..=15;
const ONE_SPACE: RangeInclusive<u64> = 28..=40;
const RELEASE_TICKS: u64 = 3_000;
const FRAME_BITS: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    /// Leader pulse seen, waiting for the space that follows it
    Leader { start: u64 },
    Bits { start: u64, bits: u32, count: u32 },
    /// Repeat space seen, waiting for the stop pulse
    Repeat { start: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LastFrame {
    address: u32,
    command: u32,
}

/// NEC protocol symbol library
pub struct NecLibrary {
    ticks: u64,
    in_pulse: bool,
    run: u64,
    state: State,
    last: Option<LastFrame>,
    ready: Option<ProtocolResult>,
}

impl NecLibrary {
    pub fn new() -> Self {
        Self {
            ticks: 0,
            in_pulse: false,
            run: 0,
            state: State::Idle,
            last: None,
            ready: None,
        }
    }

    fn frame(&self, address: u32, command: u32, repeat: bool, release: bool, start: u64, end: u64) -> ProtocolResult {
        ProtocolResult {
            protocol_id: NEC_PROTOCOL_ID,
            protocol_name: "NEC".to_string(),
            address,
            command,
            repeat,
            release,
            start,
            end,
        }
    }

    /// A pulse or space of `duration` ticks ended; `index` is the first tick after it.
    fn end_of_run(&mut self, was_pulse: bool, duration: u64, index: u64) -> bool {
        let run_start = index - duration;

        self.state = match (self.state, was_pulse) {
            (State::Idle, true) if LEADER_PULSE.contains(&duration) => State::Leader { start: run_start },
            (State::Idle, _) => State::Idle,

            (State::Leader { start }, false) if LEADER_SPACE.contains(&duration) => State::Bits {
                start,
                bits: 0,
                count: 0,
            },
            (State::Leader { start }, false) if REPEAT_SPACE.contains(&duration) => State::Repeat { start },

            (State::Bits { start, bits, count }, true) if BIT_PULSE.contains(&duration) => {
                if count == FRAME_BITS {
                    self.state = State::Idle;
                    return self.complete(start, bits, index - 1);
                }
                State::Bits { start, bits, count }
            }
            (State::Bits { start, bits, count }, false) if count < FRAME_BITS => {
                if ZERO_SPACE.contains(&duration) {
                    State::Bits {
                        start,
                        bits,
                        count: count + 1,
                    }
                } else if ONE_SPACE.contains(&duration) {
                    State::Bits {
                        start,
                        bits: bits | (1 << count),
                        count: count + 1,
                    }
                } else {
                    trace!("NEC: bad space of {} ticks after {} bits", duration, count);
                    State::Idle
                }
            }

            (State::Repeat { start }, true) if BIT_PULSE.contains(&duration) => {
                self.state = State::Idle;
                return match self.last {
                    Some(last) => {
                        self.ready = Some(self.frame(last.address, last.command, true, false, start, index - 1));
                        true
                    }
                    None => {
                        debug!("NEC: repeat frame without a preceding data frame");
                        false
                    }
                };
            }

            (state, _) => {
                trace!("NEC: {:?} aborted by a {} tick run", state, duration);
                // A leader pulse can restart recognition directly
                if was_pulse && LEADER_PULSE.contains(&duration) {
                    State::Leader { start: run_start }
                } else {
                    State::Idle
                }
            }
        };
        false
    }

    fn complete(&mut self, start: u64, bits: u32, end: u64) -> bool {
        let [addr_lo, addr_hi, command, command_inv] = bits.to_le_bytes();
        if command != !command_inv {
            debug!("NEC: command 0x{:02x} fails inverse check 0x{:02x}", command, command_inv);
            return false;
        }
        let address = if addr_hi == !addr_lo {
            u32::from(addr_lo)
        } else {
            u32::from(u16::from_le_bytes([addr_lo, addr_hi]))
        };
        let command = u32::from(command);

        self.last = Some(LastFrame { address, command });
        self.ready = Some(self.frame(address, command, false, false, start, end));
        true
    }
}

impl Default for NecLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolLibrary for NecLibrary {
    fn reset(&mut self) {
        *self = Self::new();
    }

    fn sample_rate(&self) -> u64 {
        NEC_SAMPLE_RATE
    }

    fn feed(&mut self, bit: bool) -> bool {
        let pulse = !bit;
        let index = self.ticks;
        self.ticks += 1;

        let mut ready = false;
        if pulse != self.in_pulse {
            ready = self.end_of_run(self.in_pulse, self.run, index);
            self.in_pulse = pulse;
            self.run = 0;
        }
        self.run += 1;

        if !self.in_pulse
            && self.run == RELEASE_TICKS
            && let Some(last) = self.last.take()
        {
            let start = index + 1 - RELEASE_TICKS;
            self.ready = Some(self.frame(last.address, last.command, false, true, start, index));
            ready = true;
        }
        ready
    }

    fn result(&mut self) -> ProtocolResult {
        self.ready.take().unwrap_or_default()
    }
}
