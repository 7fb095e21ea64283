//! End-to-end decode runs through the pipeline and scheduler

use logic_pd::nodes::decoders::ds2432::{self, Authenticator, MAC_LEN, MAC_MESSAGE_LEN, crc16};
use logic_pd::nodes::decoders::pwm::{ANN_DUTY_CYCLE, ANN_PERIOD};
use logic_pd::nodes::decoders::{Ds2432Decoder, IrDecoder, PwmDecoder};
use logic_pd::{
    Annotation, BinaryRecord, ConfigError, FrameSource, LogicDecoderNode, LogicSource, MetaRecord, NodeOutcome,
    OneWireFrame, Pipeline, RecordCollector, StackedDecoderNode,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

struct Outputs {
    annotations: Arc<Mutex<Vec<Annotation>>>,
    binary: Arc<Mutex<Vec<BinaryRecord>>>,
    meta: Arc<Mutex<Vec<MetaRecord>>>,
    outcomes: HashMap<String, NodeOutcome>,
}

/// Wire `source -> decoder -> {annotations, binary, meta}` collectors and run
fn run_decoder<S, D>(source: S, source_port: &str, decoder: D, decoder_port: &str) -> Outputs
where
    S: logic_pd::ProcessNode + 'static,
    D: logic_pd::ProcessNode + 'static,
{
    let annotations = RecordCollector::<Annotation>::new();
    let binary = RecordCollector::<BinaryRecord>::new();
    let meta = RecordCollector::<MetaRecord>::new();
    let handles = (annotations.handle(), binary.handle(), meta.handle());

    let mut pipeline = Pipeline::new();
    pipeline.add_process("source", source).unwrap();
    pipeline.add_process("decoder", decoder).unwrap();
    pipeline.add_process("annotations", annotations).unwrap();
    pipeline.add_process("binary", binary).unwrap();
    pipeline.add_process("meta", meta).unwrap();
    pipeline.connect("source", source_port, "decoder", decoder_port).unwrap();
    pipeline.connect("decoder", "annotations", "annotations", "records").unwrap();
    pipeline.connect("decoder", "binary", "binary", "records").unwrap();
    pipeline.connect("decoder", "meta", "meta", "records").unwrap();

    let outcomes = pipeline.build().unwrap().wait();
    Outputs {
        annotations: handles.0,
        binary: handles.1,
        meta: handles.2,
        outcomes,
    }
}

fn completed(outcome: &NodeOutcome) -> bool {
    matches!(outcome, NodeOutcome::Completed { .. })
}

/// Idle high, then five 10-sample cycles that are low for 3 samples
fn active_low_wave() -> Vec<bool> {
    let mut levels = vec![true; 5];
    for _ in 0..5 {
        levels.extend([false; 3]);
        levels.extend([true; 7]);
    }
    levels
}

#[test]
fn pwm_active_low_end_to_end() {
    let source = LogicSource::from_levels(&active_low_wave()).with_block_samples(7);
    let decoder = LogicDecoderNode::new(PwmDecoder::new())
        .unwrap()
        .with_options(&[("polarity", "active-low")])
        .unwrap()
        .with_samplerate(1_000_000);
    let out = run_decoder(source, "logic", decoder, "logic");

    assert!(out.outcomes.values().all(completed), "{:?}", out.outcomes);

    let annotations = out.annotations.lock().unwrap();
    let duty: Vec<&Annotation> = annotations.iter().filter(|a| a.class == ANN_DUTY_CYCLE).collect();
    let period: Vec<&Annotation> = annotations.iter().filter(|a| a.class == ANN_PERIOD).collect();
    // Falling edges at 5, 15, 25, 35, 45
    assert_eq!(duty.len(), 4);
    assert_eq!(period.len(), 4);
    assert!(duty.iter().all(|a| a.texts[0] == "30.000000%"));
    assert_eq!((duty[0].start, duty[0].end), (5, 15));
    assert_eq!((duty[3].start, duty[3].end), (35, 45));

    let binary = out.binary.lock().unwrap();
    assert_eq!(binary.len(), 4);
    assert!(binary.iter().all(|b| b.data == vec![76]));

    let meta = out.meta.lock().unwrap();
    assert_eq!(meta.len(), 4);
    assert!(meta.iter().all(|m| (m.value - 30.0).abs() < 1e-9));
    assert_eq!(meta[3].start, 5);
    assert_eq!(meta[3].end, 45);
}

#[test]
fn pwm_active_high_discards_first_edge() {
    let source = LogicSource::from_levels(&active_low_wave());
    let decoder = LogicDecoderNode::new(PwmDecoder::new())
        .unwrap()
        .with_samplerate(1_000_000);
    let out = run_decoder(source, "logic", decoder, "logic");

    let annotations = out.annotations.lock().unwrap();
    let duty: Vec<&Annotation> = annotations.iter().filter(|a| a.class == ANN_DUTY_CYCLE).collect();
    // Falling edge at 5 dropped; rising edges at 8, 18, 28, 38, 48
    assert_eq!(duty.len(), 4);
    assert_eq!((duty[0].start, duty[0].end), (8, 18));
    assert!(duty.iter().all(|a| a.texts[0] == "70.000000%"));
}

#[test]
fn ir_rate_mismatch_fails_node_without_output() {
    let source = LogicSource::from_levels(&vec![true; 10_000]).with_block_samples(64);
    let decoder = LogicDecoderNode::new(IrDecoder::new())
        .unwrap()
        .with_samplerate(30_000);
    let out = run_decoder(source, "logic", decoder, "logic");

    match &out.outcomes["decoder"] {
        NodeOutcome::Failed { error } => assert!(error.contains("must be a multiple"), "{}", error),
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(out.annotations.lock().unwrap().is_empty());
    assert!(completed(&out.outcomes["annotations"]));
    assert!(completed(&out.outcomes["source"]));
}

/// NEC frame at 20 kHz ticks, active-low
fn nec_ticks(address: u8, command: u8) -> Vec<bool> {
    let bytes = [address, !address, command, !command];
    let mut levels = vec![false; 180];
    levels.extend(vec![true; 90]);
    for bit in 0..32 {
        levels.extend(vec![false; 11]);
        let one = (bytes[bit / 8] >> (bit % 8)) & 1 == 1;
        levels.extend(vec![true; if one { 34 } else { 11 }]);
    }
    levels.extend(vec![false; 11]);
    levels
}

#[test]
fn nec_frame_through_ir_decoder_at_40khz() {
    let mut ticks = vec![true; 20];
    let frame_ticks = nec_ticks(0x04, 0x1a);
    let frame_len = frame_ticks.len() as u64;
    ticks.extend(frame_ticks);
    ticks.extend(vec![true; 3_100]);
    // Two capture samples per library tick
    let levels: Vec<bool> = ticks.iter().flat_map(|&t| [t, t]).collect();

    let source = LogicSource::from_levels(&levels).with_block_samples(1000);
    let decoder = LogicDecoderNode::new(IrDecoder::new())
        .unwrap()
        .with_samplerate(40_000);
    let out = run_decoder(source, "logic", decoder, "logic");
    assert!(out.outcomes.values().all(completed), "{:?}", out.outcomes);

    let frames = out.annotations.lock().unwrap();
    assert_eq!(frames.len(), 2);
    assert_eq!(
        frames[0].texts[0],
        "Protocol: NEC (2), Address 0x0004, Command: 0x001a, Flags: -"
    );
    assert_eq!(frames[0].texts[4], "C:1a");
    assert_eq!(frames[0].start, 40);
    assert_eq!(frames[0].end, 2 * (20 + frame_len - 1));
    // Key release after the quiet period
    assert!(frames[1].texts[0].ends_with("Flags: release"));
    assert!(frames[1].start > frames[0].end);
}

/// Contiguous one-wire frames, 10 samples each
#[derive(Default)]
struct Bus {
    position: u64,
    frames: Vec<OneWireFrame>,
}

impl Bus {
    fn span(&mut self) -> (u64, u64) {
        let start = self.position;
        self.position += 10;
        (start, start + 9)
    }

    fn reset(&mut self) -> &mut Self {
        let (s, e) = self.span();
        self.frames.push(OneWireFrame::reset(s, e, true));
        self
    }

    fn rom(&mut self, rom: u64) -> &mut Self {
        let (s, e) = self.span();
        self.frames.push(OneWireFrame::rom(s, e, rom));
        self
    }

    fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        for &b in bytes {
            let (s, e) = self.span();
            self.frames.push(OneWireFrame::data(s, e, b));
        }
        self
    }
}

/// Accepts exactly one MAC regardless of the message
struct FixedMac([u8; MAC_LEN]);

impl Authenticator for FixedMac {
    fn mac(&self, _message: &[u8; MAC_MESSAGE_LEN]) -> [u8; MAC_LEN] {
        self.0
    }
}

fn ds2432_session(mac: [u8; MAC_LEN]) -> Vec<OneWireFrame> {
    const ROM: u64 = 0x2200_0000_0bad_cafe;
    let mut bus = Bus::default();

    let mut write = vec![0x0f, 0x00, 0x00];
    write.extend([0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17]);
    bus.reset().rom(ROM).bytes(&write).bytes(&crc16(&write).to_le_bytes());

    let mut read = vec![0xa5, 0x00, 0x00];
    read.extend([0x5a; 32]);
    read.push(0xff);
    bus.reset().rom(ROM).bytes(&read).bytes(&crc16(&read).to_le_bytes());
    bus.bytes(&mac).bytes(&crc16(&mac).to_le_bytes()).bytes(&[0xaa]);

    // Interrupted Read Memory: the partial address is dropped at the reset
    bus.reset().bytes(&[0xf0, 0x00]);
    bus.reset();
    bus.frames
}

#[test]
fn ds2432_stacked_on_frames() {
    let mac = [0x3c; MAC_LEN];
    let source = FrameSource::new(ds2432_session(mac));
    let decoder = StackedDecoderNode::new(Ds2432Decoder::with_authenticator(FixedMac(mac))).unwrap();
    let out = run_decoder(source, "frames", decoder, "frames");
    assert!(out.outcomes.values().all(completed), "{:?}", out.outcomes);

    let annotations = out.annotations.lock().unwrap();
    for pair in annotations.windows(2) {
        assert!(pair[0].end < pair[1].start, "overlap: {} / {}", pair[0], pair[1]);
    }

    let class_of = |id: &str| {
        ds2432::DESCRIPTOR
            .annotations
            .iter()
            .position(|c| c.id == id)
            .unwrap()
    };
    let mac_annotation = annotations.iter().find(|a| a.class == class_of("mac")).unwrap();
    assert_eq!(mac_annotation.texts[1], "MAC valid");
    assert!(
        annotations
            .iter()
            .filter(|a| a.class == class_of("crc"))
            .all(|a| a.texts[1] == "CRC ok")
    );
    assert_eq!(annotations.iter().filter(|a| a.class == class_of("command")).count(), 3);
    assert_eq!(annotations.iter().filter(|a| a.class == class_of("address")).count(), 2);

    let binary = out.binary.lock().unwrap();
    // Scratchpad data, page data, MAC
    assert_eq!(binary.len(), 3);
    assert_eq!(binary[2].data, mac.to_vec());
}

#[test]
fn ds2432_rejects_bad_secret_when_configured() {
    let result = StackedDecoderNode::new(Ds2432Decoder::new())
        .unwrap()
        .with_options(&[("secret", "xyz")]);
    match result {
        Err(ConfigError::InvalidOptionValue { option, .. }) => assert_eq!(option, "secret"),
        Err(other) => panic!("unexpected error {}", other),
        Ok(_) => panic!("secret 'xyz' accepted"),
    }
}
