//! PWM decoder: duty cycle and period per cycle
//!
//! Flow:
//!   1. Wait for the first edge; if it is not the start edge, wait for the
//!      next one. That edge opens the first cycle.
//!   2. Opposite edge: remember it as the end of the active phase.
//!   3. Start edge: the previous cycle is complete. Emit duty cycle,
//!      binary ratio, period and the running average, then open the next
//!      cycle at this edge.

use super::descriptor::{
    AnnotationClass, AnnotationRow, BinaryClass, ChannelSpec, Descriptor, MetaSpec, OptionFormat, OptionSpec, OptionValues,
};
use super::render::{duty_text, period_text};
use super::types::{Polarity, RecordSink};
use super::{LogicDecoder, Metadata};
use crate::runtime::cursor::{BlockSource, Condition, SampleCursor, Wait};
use crate::runtime::errors::{ConfigError, WorkResult};
use tracing::{debug, trace};

pub const ANN_DUTY_CYCLE: usize = 0;
pub const ANN_PERIOD: usize = 1;
pub const BIN_RAW: usize = 0;

pub static DESCRIPTOR: Descriptor = Descriptor {
    id: "pwm",
    name: "PWM",
    longname: "Pulse-width modulation",
    desc: "Analog level encoded in duty cycle percentage.",
    license: "gplv2+",
    inputs: &["logic"],
    outputs: &["pwm"],
    channels: &[ChannelSpec {
        id: "data",
        name: "Data",
        desc: "Data line",
    }],
    optional_channels: &[],
    options: &[OptionSpec {
        id: "polarity",
        desc: "Polarity",
        default: "active-high",
        format: OptionFormat::Choice,
        values: &["active-low", "active-high"],
    }],
    annotations: &[
        AnnotationClass {
            id: "duty-cycle",
            desc: "Duty cycle",
        },
        AnnotationClass {
            id: "period",
            desc: "Period",
        },
    ],
    annotation_rows: &[
        AnnotationRow {
            id: "duty-cycle",
            desc: "Duty cycle",
            classes: &[ANN_DUTY_CYCLE],
        },
        AnnotationRow {
            id: "period",
            desc: "Period",
            classes: &[ANN_PERIOD],
        },
    ],
    binary: &[BinaryClass {
        id: "raw",
        desc: "RAW file",
    }],
    meta: Some(MetaSpec {
        value_type: "float",
        label: "Average",
        desc: "PWM base (cycle) frequency",
    }),
};

/// Duty ratio as a byte: `floor(ratio * 256)` clamped to `0..=255`
pub fn ratio_byte(ratio: f64) -> u8 {
    (ratio * 256.0).floor().clamp(0.0, 255.0) as u8
}

/// Duty-cycle measurement state machine
pub struct PwmDecoder {
    polarity: Polarity,
    samplerate: Option<u64>,
    first_samplenum: Option<u64>,
    start_samplenum: Option<u64>,
    end_samplenum: Option<u64>,
    num_cycles: u64,
    percent_sum: f64,
}

impl PwmDecoder {
    pub fn new() -> Self {
        Self {
            polarity: Polarity::ActiveHigh,
            samplerate: None,
            first_samplenum: None,
            start_samplenum: None,
            end_samplenum: None,
            num_cycles: 0,
            percent_sum: 0.0,
        }
    }

    /// Number of complete cycles measured in the current run
    pub fn num_cycles(&self) -> u64 {
        self.num_cycles
    }

    fn complete_cycle(&mut self, samplenum: u64, samplerate: u64, out: &mut dyn RecordSink) -> WorkResult<()> {
        let (Some(first), Some(start)) = (self.first_samplenum, self.start_samplenum) else {
            return Ok(());
        };
        self.start_samplenum = Some(samplenum);

        // A start edge right after another start edge has no active phase
        let Some(end) = self.end_samplenum.take() else {
            debug!("PWM: cycle at {} has no opposite edge, skipped", start);
            return Ok(());
        };

        let period = samplenum - start;
        let duty = end - start;
        let ratio = duty as f64 / period as f64;
        let percent = ratio * 100.0;

        out.annotate(ANN_DUTY_CYCLE, start, samplenum, vec![duty_text(percent)])?;
        out.binary(BIN_RAW, samplenum, vec![ratio_byte(ratio)])?;

        let period_s = period as f64 / samplerate as f64;
        out.annotate(ANN_PERIOD, start, samplenum, vec![period_text(period_s)])?;

        self.num_cycles += 1;
        self.percent_sum += percent;
        let average = self.percent_sum / self.num_cycles as f64;
        out.meta(first, samplenum, average, "Average")?;

        trace!(
            "PWM cycle {}: {}..{} duty {} period {} ({:.3}%)",
            self.num_cycles, start, samplenum, duty, period, percent
        );
        Ok(())
    }
}

impl Default for PwmDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl LogicDecoder for PwmDecoder {
    fn descriptor(&self) -> &'static Descriptor {
        &DESCRIPTOR
    }

    fn reset(&mut self) {
        let samplerate = self.samplerate;
        *self = Self::new();
        self.samplerate = samplerate;
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
        if !matches!(self.samplerate, Some(rate) if rate > 0) {
            return Err(ConfigError::MissingSampleRate);
        }
        Ok(())
    }

    fn decode<S: BlockSource>(&mut self, cursor: &mut SampleCursor<S>, out: &mut dyn RecordSink) -> WorkResult<()> {
        let samplerate = self.samplerate.filter(|&r| r > 0).ok_or(ConfigError::MissingSampleRate)?;
        let start_level = self.polarity.active_level();
        let any_edge = Wait::from(Condition::either(0));

        let mut pins = cursor.wait(&any_edge)?;
        if pins.get(0) != start_level {
            debug!("PWM: first edge at {} is not a start edge, discarded", cursor.samplenum());
            pins = cursor.wait(&any_edge)?;
        }
        debug_assert_eq!(pins.get(0), start_level);
        self.first_samplenum = Some(cursor.samplenum());
        self.start_samplenum = Some(cursor.samplenum());

        loop {
            let pins = cursor.wait(&any_edge)?;
            let samplenum = cursor.samplenum();

            if pins.get(0) == start_level {
                self.complete_cycle(samplenum, samplerate, out)?;
            } else {
                self.end_samplenum = Some(samplenum);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::decoders::node::decode_blocks;
    use crate::nodes::decoders::types::Record;
    use crate::runtime::sample::SampleBlock;

    /// Square wave: `lead` idle samples, then `cycles` of (high, low) runs
    fn square(idle: bool, lead: usize, high: usize, low: usize, cycles: usize) -> Vec<u8> {
        let mut samples = vec![u8::from(idle); lead];
        for _ in 0..cycles {
            samples.extend(std::iter::repeat_n(1u8, high));
            samples.extend(std::iter::repeat_n(0u8, low));
        }
        samples
    }

    fn run(samples: &[u8], polarity: &str, samplerate: u64) -> Vec<Record> {
        let mut decoder = PwmDecoder::new();
        let options = OptionValues::resolve(&DESCRIPTOR, &[("polarity", polarity)]).unwrap();
        let blocks = samples
            .chunks(7)
            .enumerate()
            .map(|(i, c)| SampleBlock::from_bytes((i * 7) as u64, c))
            .collect::<Vec<_>>();
        decode_blocks(&mut decoder, Some(samplerate), &options, vec![0], blocks).unwrap()
    }

    fn annotations(records: &[Record], class: usize) -> Vec<&crate::nodes::decoders::Annotation> {
        records
            .iter()
            .filter_map(Record::as_annotation)
            .filter(|a| a.class == class)
            .collect()
    }

    #[test]
    fn test_ratio_byte() {
        assert_eq!(ratio_byte(0.0), 0);
        assert_eq!(ratio_byte(0.25), 64);
        assert_eq!(ratio_byte(0.999), 255);
        assert_eq!(ratio_byte(1.0), 255);
        assert_eq!(ratio_byte(-0.1), 0);
    }

    #[test]
    fn test_quarter_duty_cycle() {
        // low idle, 4 cycles of 25% high over 8 samples
        let samples = square(false, 3, 2, 6, 4);
        let records = run(&samples, "active-high", 1_000);

        let duty = annotations(&records, ANN_DUTY_CYCLE);
        let period = annotations(&records, ANN_PERIOD);
        // Rising edges at 3, 11, 19, 27: three complete cycles
        assert_eq!(duty.len(), 3);
        assert_eq!(period.len(), 3);
        assert_eq!(duty[0].texts, vec!["25.000000%".to_string()]);
        assert_eq!((duty[0].start, duty[0].end), (3, 11));
        assert_eq!((duty[2].start, duty[2].end), (19, 27));
        assert_eq!(period[0].texts, vec!["8.0 ms".to_string()]);

        let binary: Vec<_> = records.iter().filter_map(Record::as_binary).collect();
        assert_eq!(binary.len(), 3);
        assert_eq!(binary[0].data, vec![64]);
        assert_eq!(binary[0].position, 11);
    }

    #[test]
    fn test_running_average() {
        // Cycles of increasing duty: 2/8, 4/8, 6/8
        let mut samples = vec![0u8; 2];
        for high in [2usize, 4, 6, 1] {
            samples.extend(std::iter::repeat_n(1u8, high));
            samples.extend(std::iter::repeat_n(0u8, 8 - high));
        }
        let records = run(&samples, "active-high", 1_000_000);

        let meta: Vec<_> = records.iter().filter_map(Record::as_meta).collect();
        assert_eq!(meta.len(), 3);
        let expected = [25.0, (25.0 + 50.0) / 2.0, (25.0 + 50.0 + 75.0) / 3.0];
        for (m, e) in meta.iter().zip(expected) {
            assert!((m.value - e).abs() < 1e-9);
            assert_eq!(m.start, 2);
            assert_eq!(m.label, "Average");
        }
        assert_eq!(meta[2].end, 26);
    }

    #[test]
    fn test_first_edge_of_wrong_polarity_discarded() {
        // Idle high, so the first edge is falling; active-high starts on rising
        let mut samples = vec![1u8; 4];
        for _ in 0..3 {
            samples.extend([0, 0, 0, 1, 1, 1]);
        }
        samples.push(0);
        let records = run(&samples, "active-high", 1_000);
        let duty = annotations(&records, ANN_DUTY_CYCLE);
        // Falling at 4 dropped, rising at 7 opens the first cycle
        assert_eq!(duty.len(), 2);
        assert_eq!((duty[0].start, duty[0].end), (7, 13));
        assert_eq!(duty[0].texts[0], "50.000000%");
    }

    #[test]
    fn test_active_low_measures_low_phase() {
        let samples = square(true, 2, 6, 2, 3);
        let records = run(&samples, "active-low", 1_000);
        let duty = annotations(&records, ANN_DUTY_CYCLE);
        // Falling edges at 8, 16, 24 start cycles; low phase lasts 2 of 8
        assert_eq!(duty.len(), 2);
        assert_eq!(duty[0].texts[0], "25.000000%");
        assert_eq!(duty[0].start, 8);
    }

    #[test]
    fn test_missing_samplerate_rejected() {
        let mut decoder = PwmDecoder::new();
        let options = OptionValues::defaults(&DESCRIPTOR);
        assert_eq!(decoder.start(&options), Err(ConfigError::MissingSampleRate));
        decoder.metadata(Metadata::SampleRate(0));
        assert_eq!(decoder.start(&options), Err(ConfigError::MissingSampleRate));
        decoder.metadata(Metadata::SampleRate(1_000));
        assert!(decoder.start(&options).is_ok());
    }

    #[test]
    fn test_decoder_reused_across_captures() {
        let mut decoder = PwmDecoder::new();
        let options = OptionValues::defaults(&DESCRIPTOR);

        // 6 of 8 samples high: rising edges at 1, 9, 17
        let first = vec![SampleBlock::from_bytes(0, &square(false, 1, 6, 2, 3))];
        let records = decode_blocks(&mut decoder, Some(1_000), &options, vec![0], first).unwrap();
        let meta: Vec<_> = records.iter().filter_map(Record::as_meta).collect();
        assert_eq!(meta.len(), 2);
        assert!((meta[1].value - 75.0).abs() < 1e-9);
        assert_eq!(decoder.num_cycles(), 2);

        // Sample rate carries over; nothing else does
        let second = vec![SampleBlock::from_bytes(0, &square(false, 3, 2, 6, 4))];
        let records = decode_blocks(&mut decoder, None, &options, vec![0], second).unwrap();
        let meta: Vec<_> = records.iter().filter_map(Record::as_meta).collect();
        assert_eq!(meta.len(), 3);
        for m in &meta {
            assert!((m.value - 25.0).abs() < 1e-9, "average {} includes earlier capture", m.value);
            assert_eq!(m.start, 3);
        }
        assert_eq!(decoder.num_cycles(), 3);
        assert_eq!(annotations(&records, ANN_PERIOD)[0].texts[0], "8.0 ms");
    }

    #[test]
    fn test_meta_declares_float_average() {
        let meta = DESCRIPTOR.meta.unwrap();
        assert_eq!(meta.value_type, "float");
        assert_eq!(meta.label, "Average");
    }

    #[test]
    fn test_duty_matches_ratio_for_many_shapes() {
        for period in 2usize..12 {
            for high in 1..period {
                let mut samples = vec![0u8];
                for _ in 0..3 {
                    samples.extend(std::iter::repeat_n(1u8, high));
                    samples.extend(std::iter::repeat_n(0u8, period - high));
                }
                let records = run(&samples, "active-high", 1_000);
                let ratio = high as f64 / period as f64;
                let duty = annotations(&records, ANN_DUTY_CYCLE);
                assert_eq!(duty.len(), 2);
                assert_eq!(duty[0].texts[0], duty_text(100.0 * ratio));
                let byte = records.iter().find_map(Record::as_binary).unwrap().data[0];
                assert_eq!(byte, ratio_byte(ratio));
            }
        }
    }
}
