//! Example: NEC infrared remote decoding
//!
//! Decodes an IR receiver output from a DSL capture. The capture sample
//! rate must be a multiple of 20 kHz.
//!
//! Usage:
//!   cargo run --release --example ir_decode -- --file remote.dsl --channel 0
//!
//! With a terse listing:
//!   cargo run --release --example ir_decode -- --file remote.dsl --width 12

use clap::Parser;
use logic_pd::{Annotation, DslCapture, IrDecoder, LogicDecoderNode, NodeOutcome, Pipeline, RecordCollector};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to DSL file
    #[arg(short, long)]
    file: String,

    /// Probe carrying the IR receiver output
    #[arg(long, default_value = "0")]
    channel: usize,

    /// Polarity (active-low or active-high)
    #[arg(long, default_value = "active-low")]
    polarity: String,

    /// Annotation text width
    #[arg(long, default_value = "80")]
    width: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("=== IR Decode Example ===");
    info!("File: {}", args.file);

    let capture = DslCapture::open(&args.file)?;
    let samplerate = capture.samplerate();

    let decoder = LogicDecoderNode::new(IrDecoder::new())?
        .with_options(&[("polarity", args.polarity.as_str())])?
        .with_channels(vec![args.channel])?
        .with_samplerate(samplerate);
    let collector = RecordCollector::<Annotation>::new();
    let frames = collector.handle();

    let mut pipeline = Pipeline::new();
    pipeline.add_process("source", capture.into_source())?;
    pipeline.add_process("ir", decoder)?;
    pipeline.add_process("frames", collector)?;
    pipeline.connect("source", "logic", "ir", "logic")?;
    pipeline.connect("ir", "annotations", "frames", "records")?;

    info!("Running...");
    let outcomes = pipeline.build()?.wait();
    if let Some(NodeOutcome::Failed { error }) = outcomes.get("ir") {
        error!("IR decoder failed: {}", error);
        return Err(error.clone().into());
    }

    let frames = frames.lock().map_err(|_| "frame storage poisoned")?;
    for frame in frames.iter() {
        let seconds = frame.start as f64 / samplerate as f64;
        println!("{:>12.6}s  {}", seconds, frame.text_for_width(args.width));
    }
    info!("Done! {} frames", frames.len());
    Ok(())
}
