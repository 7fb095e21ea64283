//! Example: DS2432 transaction replay
//!
//! Replays a text dump of one-wire network frames through the DS2432
//! decoder. One frame per line, `#` starts a comment:
//!
//! ```text
//! # start  end   event  value
//! 0        480   reset  1
//! 560      1200  rom    0x5c00000123456733
//! 1210     1290  data   0x0f
//! ```
//!
//! Usage:
//!   cargo run --release --example ds2432_replay -- \
//!       --file session.txt --secret 0011223344556677

use clap::Parser;
use logic_pd::nodes::decoders::ds2432::{BIN_MAC, DESCRIPTOR};
use logic_pd::{
    Annotation, BinaryRecord, Ds2432Decoder, FrameSource, NodeOutcome, OneWireFrame, Pipeline, RecordCollector,
    StackedDecoderNode,
};
use std::fs;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the frame dump
    #[arg(short, long)]
    file: String,

    /// Device secret, 16 hex digits
    #[arg(long, default_value = "0000000000000000")]
    secret: String,

    /// Annotation text width
    #[arg(long, default_value = "80")]
    width: usize,
}

fn parse_number(text: &str) -> Option<u64> {
    match text.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

fn parse_frame(line: &str) -> Option<OneWireFrame> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let [start, end, kind, value] = fields.as_slice() else {
        return None;
    };
    let (start, end, value) = (parse_number(start)?, parse_number(end)?, parse_number(value)?);
    match *kind {
        "reset" => Some(OneWireFrame::reset(start, end, value != 0)),
        "rom" => Some(OneWireFrame::rom(start, end, value)),
        "data" => Some(OneWireFrame::data(start, end, u8::try_from(value).ok()?)),
        _ => None,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("=== DS2432 Replay Example ===");
    info!("File: {}", args.file);

    let text = fs::read_to_string(&args.file)?;
    let mut frames = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        match parse_frame(line) {
            Some(frame) => frames.push(frame),
            None => warn!("line {}: cannot parse '{}'", number + 1, line),
        }
    }
    info!("Replaying {} frames", frames.len());

    let decoder = StackedDecoderNode::new(Ds2432Decoder::new())?.with_options(&[("secret", args.secret.as_str())])?;
    let annotations = RecordCollector::<Annotation>::new();
    let binary = RecordCollector::<BinaryRecord>::new();
    let (annotation_store, binary_store) = (annotations.handle(), binary.handle());

    let mut pipeline = Pipeline::new();
    pipeline.add_process("frames", FrameSource::new(frames))?;
    pipeline.add_process("ds2432", decoder)?;
    pipeline.add_process("annotations", annotations)?;
    pipeline.add_process("binary", binary)?;
    pipeline.connect("frames", "frames", "ds2432", "frames")?;
    pipeline.connect("ds2432", "annotations", "annotations", "records")?;
    pipeline.connect("ds2432", "binary", "binary", "records")?;

    let outcomes = pipeline.build()?.wait();
    if let Some(NodeOutcome::Failed { error }) = outcomes.get("ds2432") {
        error!("DS2432 decoder failed: {}", error);
        return Err(error.clone().into());
    }

    let annotations = annotation_store.lock().map_err(|_| "annotation storage poisoned")?;
    for a in annotations.iter() {
        let class = DESCRIPTOR.annotations.get(a.class).map_or("?", |c| c.id);
        println!("{:>10}-{:<10} {:<8} {}", a.start, a.end, class, a.text_for_width(args.width));
    }

    let binary = binary_store.lock().map_err(|_| "binary storage poisoned")?;
    let macs = binary.iter().filter(|b| b.class == BIN_MAC).count();
    info!(
        "Done! {} annotations, {} binary records ({} MACs)",
        annotations.len(),
        binary.len(),
        macs
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame() {
        assert_eq!(parse_frame("0 480 reset 1"), Some(OneWireFrame::reset(0, 480, true)));
        assert_eq!(parse_frame("10 20 data 0x0f"), Some(OneWireFrame::data(10, 20, 0x0f)));
        assert_eq!(parse_frame("10 20 data 0x1ff"), None);
        assert_eq!(parse_frame("10 20 crc 1"), None);
        assert_eq!(parse_frame("10 20"), None);
    }
}
