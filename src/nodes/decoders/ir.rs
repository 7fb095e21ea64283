//! Infrared remote control decoder
//!
//! Symbol recognition is delegated to a [`SymbolLibrary`] clocked at its own
//! fixed rate. The decoder decimates the capture down to that rate, feeds
//! one bit per library tick and scales reported frame positions back to
//! capture sample numbers.

use super::descriptor::{
    AnnotationClass, AnnotationRow, ChannelSpec, Descriptor, OptionFormat, OptionSpec, OptionValues,
};
use super::nec::NecLibrary;
use super::render::{check_flag_table, ir_texts};
use super::types::{Polarity, RecordSink};
use super::{LogicDecoder, Metadata};
use crate::runtime::cursor::{BlockSource, Condition, SampleCursor, Wait};
use crate::runtime::errors::{ConfigError, WorkError, WorkResult};
use tracing::{debug, info};

pub const ANN_PACKET: usize = 0;

pub static DESCRIPTOR: Descriptor = Descriptor {
    id: "ir_irmp",
    name: "IR IRMP",
    longname: "IR IRMP",
    desc: "IRMP infrared remote control multi protocol.",
    license: "gplv2+",
    inputs: &["logic"],
    outputs: &[],
    channels: &[ChannelSpec {
        id: "ir",
        name: "IR",
        desc: "Data line",
    }],
    optional_channels: &[],
    options: &[OptionSpec {
        id: "polarity",
        desc: "Polarity",
        default: "active-low",
        format: OptionFormat::Choice,
        values: &["active-low", "active-high"],
    }],
    annotations: &[AnnotationClass {
        id: "packet",
        desc: "Packet",
    }],
    annotation_rows: &[AnnotationRow {
        id: "packets",
        desc: "IR Packets",
        classes: &[ANN_PACKET],
    }],
    binary: &[],
    meta: None,
};

/// A frame recognised by a symbol library.
///
/// `start` and `end` are in library ticks until the decoder scales them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolResult {
    pub protocol_id: u32,
    pub protocol_name: String,
    pub address: u32,
    pub command: u32,
    pub repeat: bool,
    pub release: bool,
    pub start: u64,
    pub end: u64,
}

/// Stateful symbol recogniser fed one bit per tick.
///
/// Input bits are active-low: `false` means the IR carrier is present.
pub trait SymbolLibrary: Send {
    fn reset(&mut self);

    /// Fixed tick rate in Hz
    fn sample_rate(&self) -> u64;

    /// Feed one tick. Returns true exactly when a frame is ready.
    fn feed(&mut self, bit: bool) -> bool;

    /// The frame that made the last `feed` return true
    fn result(&mut self) -> ProtocolResult;
}

/// IR decoder over an injected symbol library
pub struct IrDecoder<L: SymbolLibrary = NecLibrary> {
    library: L,
    polarity: Polarity,
    samplerate: Option<u64>,
    rate_factor: u64,
    frames: u64,
}

impl IrDecoder<NecLibrary> {
    pub fn new() -> Self {
        Self::with_library(NecLibrary::new())
    }
}

impl Default for IrDecoder<NecLibrary> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: SymbolLibrary> IrDecoder<L> {
    pub fn with_library(library: L) -> Self {
        Self {
            library,
            polarity: Polarity::ActiveLow,
            samplerate: None,
            rate_factor: 1,
            frames: 0,
        }
    }

    /// Capture samples per library tick, valid after `start()`
    pub fn rate_factor(&self) -> u64 {
        self.rate_factor
    }

    pub fn library(&self) -> &L {
        &self.library
    }
}

impl<L: SymbolLibrary> LogicDecoder for IrDecoder<L> {
    fn descriptor(&self) -> &'static Descriptor {
        &DESCRIPTOR
    }

    fn reset(&mut self) {
        self.library.reset();
        self.rate_factor = 1;
        self.frames = 0;
    }

    fn metadata(&mut self, metadata: Metadata) {
        match metadata {
            Metadata::SampleRate(rate) => self.samplerate = Some(rate),
        }
    }

    fn start(&mut self, options: &OptionValues) -> Result<(), ConfigError> {
        let value = options.require(&DESCRIPTOR, "polarity")?;
        self.polarity = Polarity::from_option(value).ok_or_else(|| ConfigError::InvalidOptionValue {
            option: "polarity".into(),
            value: value.into(),
            allowed: "active-low, active-high".into(),
        })?;

        let capture = match self.samplerate {
            Some(rate) if rate > 0 => rate,
            _ => return Err(ConfigError::MissingSampleRate),
        };
        let library = self.library.sample_rate();
        if library == 0 || capture % library != 0 {
            return Err(ConfigError::RateMismatch { capture, library });
        }
        self.rate_factor = capture / library;
        info!(
            "IR: capture {} Hz, library {} Hz, rate factor {}",
            capture, library, self.rate_factor
        );
        Ok(())
    }

    fn decode<S: BlockSource>(&mut self, cursor: &mut SampleCursor<S>, out: &mut dyn RecordSink) -> WorkResult<()> {
        let factor = self.rate_factor;
        let invert = self.polarity == Polarity::ActiveHigh;
        let decimate = Wait::from(Condition::skip(factor));

        let mut pins = cursor.wait(&Wait::next())?;
        let base = cursor.samplenum();

        loop {
            let bit = pins.get(0) != invert;
            if self.library.feed(bit) {
                let mut frame = self.library.result();
                if frame.start > frame.end {
                    return Err(WorkError::Defect(format!(
                        "symbol library reported frame ending at tick {} before its start {}",
                        frame.end, frame.start
                    )));
                }
                frame.start = base + frame.start * factor;
                frame.end = base + frame.end * factor;
                self.frames += 1;
                debug!(
                    "IR frame {}: {} addr 0x{:x} cmd 0x{:x} at {}..{}",
                    self.frames, frame.protocol_name, frame.address, frame.command, frame.start, frame.end
                );
                out.annotate(ANN_PACKET, frame.start, frame.end, ir_texts(&frame))?;
            }
            pins = cursor.wait(&decimate)?;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        DESCRIPTOR.validate()?;
        check_flag_table()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::decoders::node::decode_blocks;
    use crate::nodes::decoders::types::Record;
    use crate::runtime::sample::SampleBlock;

    /// Reports a frame every `period` ticks and records every bit it saw
    struct ScriptedLibrary {
        rate: u64,
        period: u64,
        ticks: u64,
        seen: Vec<bool>,
    }

    impl ScriptedLibrary {
        fn new(rate: u64, period: u64) -> Self {
            Self {
                rate,
                period,
                ticks: 0,
                seen: Vec::new(),
            }
        }
    }

    impl SymbolLibrary for ScriptedLibrary {
        fn reset(&mut self) {
            self.ticks = 0;
            self.seen.clear();
        }

        fn sample_rate(&self) -> u64 {
            self.rate
        }

        fn feed(&mut self, bit: bool) -> bool {
            self.seen.push(bit);
            self.ticks += 1;
            self.ticks % self.period == 0
        }

        fn result(&mut self) -> ProtocolResult {
            ProtocolResult {
                protocol_id: 7,
                protocol_name: "TEST".into(),
                address: 0x12,
                command: self.ticks as u32,
                repeat: true,
                release: false,
                start: self.ticks - self.period,
                end: self.ticks - 1,
            }
        }
    }

    fn blocks(samples: &[u8]) -> Vec<SampleBlock> {
        vec![SampleBlock::from_bytes(0, samples)]
    }

    #[test]
    fn test_rate_mismatch_rejected_before_decoding() {
        let mut decoder = IrDecoder::with_library(ScriptedLibrary::new(20_000, 4));
        let options = OptionValues::defaults(&DESCRIPTOR);
        let err = decode_blocks(&mut decoder, Some(30_000), &options, vec![0], blocks(&[1; 16])).unwrap_err();
        assert!(matches!(
            err,
            WorkError::Config(ConfigError::RateMismatch {
                capture: 30_000,
                library: 20_000
            })
        ));
        assert!(decoder.library().seen.is_empty());
    }

    #[test]
    fn test_missing_samplerate_rejected() {
        let mut decoder = IrDecoder::with_library(ScriptedLibrary::new(20_000, 4));
        let options = OptionValues::defaults(&DESCRIPTOR);
        let err = decode_blocks(&mut decoder, None, &options, vec![0], blocks(&[1; 16])).unwrap_err();
        assert!(matches!(err, WorkError::Config(ConfigError::MissingSampleRate)));
    }

    #[test]
    fn test_decimation_and_timestamp_scaling() {
        let mut decoder = IrDecoder::with_library(ScriptedLibrary::new(10_000, 4));
        let options = OptionValues::defaults(&DESCRIPTOR);
        // 30 kHz capture: factor 3, samples 0, 3, 6, ... reach the library
        let samples: Vec<u8> = (0..24).map(|i| u8::from(i % 6 == 0)).collect();
        let records = decode_blocks(&mut decoder, Some(30_000), &options, vec![0], blocks(&samples)).unwrap();

        assert_eq!(decoder.rate_factor(), 3);
        // Positions 0, 6, 12, 18 are high; the rest of the decimated ticks are low
        assert_eq!(
            decoder.library().seen,
            vec![true, false, true, false, true, false, true, false]
        );

        let frames: Vec<_> = records.iter().filter_map(Record::as_annotation).collect();
        assert_eq!(frames.len(), 2);
        assert_eq!((frames[0].start, frames[0].end), (0, 9));
        assert_eq!((frames[1].start, frames[1].end), (12, 21));
        assert_eq!(frames[0].texts[4], "C:4");
        assert!(frames[0].texts[0].ends_with("Flags: repeat"));
    }

    #[test]
    fn test_active_high_inverts_bits() {
        let mut decoder = IrDecoder::with_library(ScriptedLibrary::new(1_000, 100));
        let options = OptionValues::resolve(&DESCRIPTOR, &[("polarity", "active-high")]).unwrap();
        decode_blocks(&mut decoder, Some(1_000), &options, vec![0], blocks(&[1, 0, 0])).unwrap();
        assert_eq!(decoder.library().seen, vec![false, true, true]);
    }

    #[test]
    fn test_validate_checks_flag_table() {
        assert!(IrDecoder::new().validate().is_ok());
    }
}
