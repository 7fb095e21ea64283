//! DS2432 1-Wire SHA-1 EEPROM decoder
//!
//! Stacks on a one-wire network decoder and consumes its
//! [`OneWireFrame`]s. After a reset (and optional ROM selection) the first
//! data byte is a memory/SHA function command. Every command has a fixed
//! field sequence:
//!
//! | command                  | fields after the command byte                      |
//! |--------------------------|----------------------------------------------------|
//! | Write Scratchpad (0x0F)  | TA1 TA2, data to end of scratchpad, CRC16          |
//! | Read Scratchpad (0xAA)   | TA1 TA2, E/S, data to end of scratchpad, CRC16     |
//! | Load First Secret (0x5A) | TA1 TA2, E/S, status                               |
//! | Compute Next Secret (0x33)| TA1 TA2, status                                   |
//! | Copy Scratchpad (0x55)   | TA1 TA2, E/S, MAC, status                          |
//! | Read Auth. Page (0xA5)   | TA1 TA2, data to end of page, 0xFF, CRC16, MAC, CRC16, status |
//! | Read Memory (0xF0)       | TA1 TA2, data bytes until reset                    |
//!
//! A field annotation spans exactly the upstream frames it was built from.
//! Fields still incomplete at a reset or at the end of the stream are dropped.

use super::StackedDecoder;
use super::descriptor::{
    AnnotationClass, AnnotationRow, BinaryClass, Descriptor, OptionFormat, OptionSpec, OptionValues,
};
use super::render::hex_bytes;
use super::types::{NetworkEvent, OneWireFrame, RecordSink};
use crate::runtime::errors::{ConfigError, WorkResult};
use crc::{CRC_16_MAXIM_DOW, Crc};
use sha1::{Digest, Sha1};
use tracing::{debug, trace, warn};

pub const ANN_RESET: usize = 0;
pub const ANN_ROM: usize = 1;
pub const ANN_COMMAND: usize = 2;
pub const ANN_ADDRESS: usize = 3;
pub const ANN_ES: usize = 4;
pub const ANN_DATA: usize = 5;
pub const ANN_CRC: usize = 6;
pub const ANN_MAC: usize = 7;
pub const ANN_STATUS: usize = 8;
pub const ANN_UNKNOWN: usize = 9;

pub const BIN_DATA: usize = 0;
pub const BIN_MAC: usize = 1;

pub static DESCRIPTOR: Descriptor = Descriptor {
    id: "ds2432",
    name: "DS2432",
    longname: "Maxim DS2432",
    desc: "1-Wire 1Kbit protected EEPROM with SHA-1 engine.",
    license: "gplv2+",
    inputs: &["onewire_network"],
    outputs: &[],
    channels: &[],
    optional_channels: &[],
    options: &[OptionSpec {
        id: "secret",
        desc: "Device secret (16 hex digits, secret byte 0 first)",
        default: "0000000000000000",
        format: OptionFormat::Hex(16),
        values: &[],
    }],
    annotations: &[
        AnnotationClass {
            id: "reset",
            desc: "Reset/presence",
        },
        AnnotationClass {
            id: "rom",
            desc: "ROM id",
        },
        AnnotationClass {
            id: "command",
            desc: "Command",
        },
        AnnotationClass {
            id: "address",
            desc: "Target address",
        },
        AnnotationClass {
            id: "es",
            desc: "Ending address and status",
        },
        AnnotationClass {
            id: "data",
            desc: "Data",
        },
        AnnotationClass {
            id: "crc",
            desc: "CRC16",
        },
        AnnotationClass {
            id: "mac",
            desc: "Message authentication code",
        },
        AnnotationClass {
            id: "status",
            desc: "Status",
        },
        AnnotationClass {
            id: "unknown",
            desc: "Unknown",
        },
    ],
    annotation_rows: &[
        AnnotationRow {
            id: "network",
            desc: "Network",
            classes: &[ANN_RESET, ANN_ROM],
        },
        AnnotationRow {
            id: "commands",
            desc: "Commands",
            classes: &[ANN_COMMAND],
        },
        AnnotationRow {
            id: "fields",
            desc: "Fields",
            classes: &[ANN_ADDRESS, ANN_ES, ANN_DATA, ANN_CRC, ANN_MAC, ANN_STATUS, ANN_UNKNOWN],
        },
    ],
    binary: &[
        BinaryClass {
            id: "data",
            desc: "Data bytes",
        },
        BinaryClass {
            id: "mac",
            desc: "MAC bytes",
        },
    ],
    meta: None,
};

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_MAXIM_DOW);

/// CRC16 as the device transmits it (inverted), to be sent LSB first
pub fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

pub const MAC_MESSAGE_LEN: usize = 55;
pub const MAC_LEN: usize = 20;
const SCRATCHPAD_LEN: usize = 8;
const PAGE_LEN: usize = 32;

/// Computes the 20-byte MAC the device sends for a 55-byte message
pub trait Authenticator: Send {
    fn mac(&self, message: &[u8; MAC_MESSAGE_LEN]) -> [u8; MAC_LEN];
}

/// SHA-1 digest, transmitted last byte first
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha1Authenticator;

impl Authenticator for Sha1Authenticator {
    fn mac(&self, message: &[u8; MAC_MESSAGE_LEN]) -> [u8; MAC_LEN] {
        let digest = Sha1::digest(message);
        let mut mac = [0u8; MAC_LEN];
        mac.copy_from_slice(&digest);
        mac.reverse();
        mac
    }
}

/// Message authenticated by Read Authenticated Page
pub fn mac_message(
    secret: &[u8; 8],
    page: &[u8; PAGE_LEN],
    page_number: u8,
    rom: u64,
    challenge: [u8; 3],
) -> [u8; MAC_MESSAGE_LEN] {
    let mut message = [0u8; MAC_MESSAGE_LEN];
    message[0..4].copy_from_slice(&secret[0..4]);
    message[4..36].copy_from_slice(page);
    message[36..40].fill(0xff);
    message[40] = 0x40 | (page_number & 0x0f);
    message[41..48].copy_from_slice(&rom.to_le_bytes()[0..7]);
    message[48..52].copy_from_slice(&secret[4..8]);
    message[52..55].copy_from_slice(&challenge);
    message
}

/// Parse the `secret` option: 16 hex digits, secret byte 0 first
pub fn parse_secret(value: &str) -> Result<[u8; 8], ConfigError> {
    let invalid = || ConfigError::InvalidSecret(value.to_string());
    if value.len() != 16 || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    let mut secret = [0u8; 8];
    for (i, byte) in secret.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&value[2 * i..2 * i + 2], 16).map_err(|_| invalid())?;
    }
    Ok(secret)
}

/// DS2432 function commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    WriteScratchpad,
    ReadScratchpad,
    LoadFirstSecret,
    ComputeNextSecret,
    CopyScratchpad,
    ReadAuthPage,
    ReadMemory,
}

impl Command {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x0f => Command::WriteScratchpad,
            0xaa => Command::ReadScratchpad,
            0x5a => Command::LoadFirstSecret,
            0x33 => Command::ComputeNextSecret,
            0x55 => Command::CopyScratchpad,
            0xa5 => Command::ReadAuthPage,
            0xf0 => Command::ReadMemory,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        match self {
            Command::WriteScratchpad => 0x0f,
            Command::ReadScratchpad => 0xaa,
            Command::LoadFirstSecret => 0x5a,
            Command::ComputeNextSecret => 0x33,
            Command::CopyScratchpad => 0x55,
            Command::ReadAuthPage => 0xa5,
            Command::ReadMemory => 0xf0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::WriteScratchpad => "Write scratchpad",
            Command::ReadScratchpad => "Read scratchpad",
            Command::LoadFirstSecret => "Load first secret",
            Command::ComputeNextSecret => "Compute next secret",
            Command::CopyScratchpad => "Copy scratchpad",
            Command::ReadAuthPage => "Read authenticated page",
            Command::ReadMemory => "Read memory",
        }
    }

    pub fn abbreviation(self) -> &'static str {
        match self {
            Command::WriteScratchpad => "WS",
            Command::ReadScratchpad => "RS",
            Command::LoadFirstSecret => "LFS",
            Command::ComputeNextSecret => "CNS",
            Command::CopyScratchpad => "CS",
            Command::ReadAuthPage => "RAP",
            Command::ReadMemory => "RM",
        }
    }
}

/// Field currently being collected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Address,
    Es,
    Data(usize),
    Filler,
    Crc,
    Mac,
    Status,
    Memory,
}

impl Step {
    fn len(self) -> usize {
        match self {
            Step::Address | Step::Crc => 2,
            Step::Data(n) => n,
            Step::Mac => MAC_LEN,
            Step::Es | Step::Filler | Step::Status | Step::Memory => 1,
        }
    }
}

struct Transaction {
    command: Command,
    step: Step,
    target: u16,
    /// Bytes covered by the next CRC16
    crc_input: Vec<u8>,
    crcs_seen: u8,
    page: Option<[u8; PAGE_LEN]>,
    memory_address: u16,
    field: Vec<u8>,
    field_start: u64,
}

impl Transaction {
    fn new(command: Command) -> Self {
        Self {
            command,
            step: Step::Address,
            target: 0,
            crc_input: vec![command.code()],
            crcs_seen: 0,
            page: None,
            memory_address: 0,
            field: Vec::new(),
            field_start: 0,
        }
    }

    fn offset_in_scratchpad(&self) -> usize {
        usize::from(self.target) & (SCRATCHPAD_LEN - 1)
    }

    fn offset_in_page(&self) -> usize {
        usize::from(self.target) & (PAGE_LEN - 1)
    }

    fn page_number(&self) -> u8 {
        ((self.target >> 5) & 0x03) as u8
    }

    fn next_step(&self) -> Step {
        use Command::*;
        match (self.command, self.step) {
            (_, Step::Status) => Step::Status,
            (ReadMemory, _) => Step::Memory,
            (WriteScratchpad, Step::Address) => Step::Data(SCRATCHPAD_LEN - self.offset_in_scratchpad()),
            (WriteScratchpad, Step::Data(_)) => Step::Crc,
            (ReadScratchpad | LoadFirstSecret | CopyScratchpad, Step::Address) => Step::Es,
            (ReadScratchpad, Step::Es) => Step::Data(SCRATCHPAD_LEN - self.offset_in_scratchpad()),
            (ReadScratchpad, Step::Data(_)) => Step::Crc,
            (CopyScratchpad, Step::Es) => Step::Mac,
            (ReadAuthPage, Step::Address) => Step::Data(PAGE_LEN - self.offset_in_page()),
            (ReadAuthPage, Step::Data(_)) => Step::Filler,
            (ReadAuthPage, Step::Filler) => Step::Crc,
            (ReadAuthPage, Step::Crc) if self.crcs_seen == 1 => Step::Mac,
            (ReadAuthPage, Step::Mac) => Step::Crc,
            _ => Step::Status,
        }
    }
}

enum Phase {
    /// No reset seen yet, or an unknown command is running
    Unsynced,
    /// Reset seen; the next data byte is a function command
    Command,
    Transaction(Box<Transaction>),
}

/// DS2432 decoder stacked on one-wire network frames
pub struct Ds2432Decoder<A: Authenticator = Sha1Authenticator> {
    authenticator: A,
    secret: [u8; 8],
    /// ROM id selected since the last reset
    selected: Option<u64>,
    last_rom: Option<u64>,
    scratchpad: [Option<u8>; SCRATCHPAD_LEN],
    phase: Phase,
}

impl Ds2432Decoder<Sha1Authenticator> {
    pub fn new() -> Self {
        Self::with_authenticator(Sha1Authenticator)
    }
}

impl Default for Ds2432Decoder<Sha1Authenticator> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Authenticator> Ds2432Decoder<A> {
    pub fn with_authenticator(authenticator: A) -> Self {
        Self {
            authenticator,
            secret: [0; 8],
            selected: None,
            last_rom: None,
            scratchpad: [None; SCRATCHPAD_LEN],
            phase: Phase::Unsynced,
        }
    }

    /// Last ROM id selected on the bus
    pub fn rom(&self) -> Option<u64> {
        self.last_rom
    }

    /// Scratchpad contents observed so far
    pub fn scratchpad(&self) -> [Option<u8>; SCRATCHPAD_LEN] {
        self.scratchpad
    }

    fn abandon(&mut self, reason: &str) {
        if let Phase::Transaction(tx) = &self.phase
            && !tx.field.is_empty()
        {
            debug!(
                "DS2432: {} dropped partial {:?} field of {} ({} of {} bytes)",
                reason,
                tx.step,
                tx.command.name(),
                tx.field.len(),
                tx.step.len()
            );
        }
        self.phase = Phase::Unsynced;
    }

    fn on_byte(&mut self, frame: &OneWireFrame, byte: u8, out: &mut dyn RecordSink) -> WorkResult<()> {
        match std::mem::replace(&mut self.phase, Phase::Unsynced) {
            Phase::Unsynced => {
                out.annotate(
                    ANN_UNKNOWN,
                    frame.start,
                    frame.end,
                    vec![format!("Unknown byte: 0x{:02x}", byte), format!("{:02x}", byte)],
                )?;
            }
            Phase::Command => match Command::from_byte(byte) {
                Some(command) => {
                    debug!("DS2432: {} at {}", command.name(), frame.start);
                    out.annotate(
                        ANN_COMMAND,
                        frame.start,
                        frame.end,
                        vec![
                            format!("Command: {} (0x{:02x})", command.name(), byte),
                            command.name().to_string(),
                            command.abbreviation().to_string(),
                        ],
                    )?;
                    self.phase = Phase::Transaction(Box::new(Transaction::new(command)));
                }
                None => {
                    warn!("DS2432: unknown command 0x{:02x} at {}", byte, frame.start);
                    out.annotate(
                        ANN_UNKNOWN,
                        frame.start,
                        frame.end,
                        vec![format!("Unknown command: 0x{:02x}", byte), format!("{:02x}", byte)],
                    )?;
                }
            },
            Phase::Transaction(mut tx) => {
                if tx.field.is_empty() {
                    tx.field_start = frame.start;
                }
                tx.field.push(byte);
                if tx.field.len() == tx.step.len() {
                    self.complete_field(&mut tx, frame.end, out)?;
                    tx.step = tx.next_step();
                }
                self.phase = Phase::Transaction(tx);
            }
        }
        Ok(())
    }

    fn complete_field(&mut self, tx: &mut Transaction, end: u64, out: &mut dyn RecordSink) -> WorkResult<()> {
        let field = std::mem::take(&mut tx.field);
        let start = tx.field_start;
        trace!("DS2432: {:?} field {}..{}: {}", tx.step, start, end, hex_bytes(&field));

        match tx.step {
            Step::Address => {
                tx.target = u16::from_le_bytes([field[0], field[1]]);
                tx.memory_address = tx.target;
                tx.crc_input.extend_from_slice(&field);
                out.annotate(
                    ANN_ADDRESS,
                    start,
                    end,
                    vec![
                        format!("Target address: 0x{:04x}", tx.target),
                        format!("TA: 0x{:04x}", tx.target),
                        format!("{:04x}", tx.target),
                    ],
                )?;
            }
            Step::Es => {
                tx.crc_input.push(field[0]);
                out.annotate(
                    ANN_ES,
                    start,
                    end,
                    vec![format!("E/S: 0x{:02x}", field[0]), format!("{:02x}", field[0])],
                )?;
            }
            Step::Data(_) => {
                tx.crc_input.extend_from_slice(&field);
                match tx.command {
                    Command::WriteScratchpad | Command::ReadScratchpad => {
                        let offset = tx.offset_in_scratchpad();
                        for (slot, byte) in self.scratchpad[offset..].iter_mut().zip(&field) {
                            *slot = Some(*byte);
                        }
                    }
                    Command::ReadAuthPage if tx.offset_in_page() == 0 => {
                        let mut page = [0u8; PAGE_LEN];
                        page.copy_from_slice(&field);
                        tx.page = Some(page);
                    }
                    _ => {}
                }
                out.annotate(
                    ANN_DATA,
                    start,
                    end,
                    vec![format!("Data: {}", hex_bytes(&field)), format!("{} bytes", field.len())],
                )?;
                out.binary(BIN_DATA, start, field)?;
            }
            Step::Filler => {
                tx.crc_input.push(field[0]);
                out.annotate(
                    ANN_DATA,
                    start,
                    end,
                    vec![format!("End of page: 0x{:02x}", field[0]), format!("{:02x}", field[0])],
                )?;
            }
            Step::Crc => {
                let received = u16::from_le_bytes([field[0], field[1]]);
                let expected = crc16(&tx.crc_input);
                tx.crc_input.clear();
                tx.crcs_seen += 1;
                let texts = if received == expected {
                    vec![
                        format!("CRC16: 0x{:04x} (ok)", received),
                        "CRC ok".to_string(),
                        "ok".to_string(),
                    ]
                } else {
                    warn!(
                        "DS2432: CRC16 mismatch at {}: got 0x{:04x}, expected 0x{:04x}",
                        start, received, expected
                    );
                    vec![
                        format!("CRC16: 0x{:04x} (error, expected 0x{:04x})", received, expected),
                        "CRC error".to_string(),
                        "!".to_string(),
                    ]
                };
                out.annotate(ANN_CRC, start, end, texts)?;
            }
            Step::Mac => {
                tx.crc_input.extend_from_slice(&field);
                let verdict = if tx.command == Command::ReadAuthPage {
                    self.verify_mac(tx, &field)
                } else {
                    "not verified"
                };
                out.annotate(
                    ANN_MAC,
                    start,
                    end,
                    vec![format!("MAC: {} ({})", hex_bytes(&field), verdict), format!("MAC {}", verdict)],
                )?;
                out.binary(BIN_MAC, start, field)?;
            }
            Step::Status => {
                out.annotate(
                    ANN_STATUS,
                    start,
                    end,
                    vec![format!("Status: 0x{:02x}", field[0]), format!("{:02x}", field[0])],
                )?;
            }
            Step::Memory => {
                let address = tx.memory_address;
                tx.memory_address = tx.memory_address.wrapping_add(1);
                out.annotate(
                    ANN_DATA,
                    start,
                    end,
                    vec![
                        format!("Data [0x{:04x}]: 0x{:02x}", address, field[0]),
                        format!("0x{:02x}", field[0]),
                        format!("{:02x}", field[0]),
                    ],
                )?;
                out.binary(BIN_DATA, start, field)?;
            }
        }
        Ok(())
    }

    fn verify_mac(&self, tx: &Transaction, mac: &[u8]) -> &'static str {
        let challenge = match self.scratchpad[4..7] {
            [Some(a), Some(b), Some(c)] => [a, b, c],
            _ => return "not verified",
        };
        let (Some(rom), Some(page)) = (self.selected, tx.page.as_ref()) else {
            return "not verified";
        };
        let message = mac_message(&self.secret, page, tx.page_number(), rom, challenge);
        if self.authenticator.mac(&message)[..] == *mac {
            "valid"
        } else {
            warn!("DS2432: MAC mismatch for page {}", tx.page_number());
            "invalid"
        }
    }
}

impl<A: Authenticator> StackedDecoder for Ds2432Decoder<A> {
    type Frame = OneWireFrame;

    fn descriptor(&self) -> &'static Descriptor {
        &DESCRIPTOR
    }

    fn reset(&mut self) {
        self.selected = None;
        self.last_rom = None;
        self.scratchpad = [None; SCRATCHPAD_LEN];
        self.phase = Phase::Unsynced;
    }

    fn start(&mut self, options: &OptionValues) -> Result<(), ConfigError> {
        self.secret = parse_secret(options.require(&DESCRIPTOR, "secret")?)?;
        Ok(())
    }

    fn decode(&mut self, frame: OneWireFrame, out: &mut dyn RecordSink) -> WorkResult<()> {
        frame.check()?;
        match frame.event {
            NetworkEvent::ResetPresence(presence) => {
                self.abandon("reset");
                self.selected = None;
                self.phase = Phase::Command;
                out.annotate(
                    ANN_RESET,
                    frame.start,
                    frame.end,
                    vec![
                        format!("Reset/presence: {}", presence),
                        if presence { "Presence" } else { "No presence" }.to_string(),
                        "RP".to_string(),
                    ],
                )
            }
            NetworkEvent::Rom(rom) => {
                self.abandon("ROM selection");
                self.selected = Some(rom);
                self.last_rom = Some(rom);
                self.phase = Phase::Command;
                out.annotate(
                    ANN_ROM,
                    frame.start,
                    frame.end,
                    vec![format!("ROM: 0x{:016x}", rom), format!("{:016x}", rom)],
                )
            }
            NetworkEvent::Data(byte) => self.on_byte(&frame, byte, out),
        }
    }

    fn finish(&mut self) {
        self.abandon("end of stream");
    }
}
