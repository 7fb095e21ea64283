//! Example: PWM duty cycle measurement
//!
//! Decodes one probe of a DSL capture and prints duty cycle and period per
//! cycle, plus the running average.
//!
//! Usage:
//!   cargo run --release --example pwm_decode -- \
//!       --file fan.dsl --channel 3 --polarity active-high -n 20

use clap::Parser;
use logic_pd::nodes::decoders::pwm::ANN_PERIOD;
use logic_pd::runtime::{InputPort, OutputPort, PortDirection, PortSchema, ProcessNode, WorkError, WorkResult};
use logic_pd::{Annotation, DslCapture, LogicDecoderNode, MetaRecord, NodeOutcome, Pipeline, PwmDecoder};
use std::collections::VecDeque;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to DSL file
    #[arg(short, long)]
    file: String,

    /// Probe carrying the PWM signal
    #[arg(long, default_value = "0")]
    channel: usize,

    /// Polarity (active-low or active-high)
    #[arg(long, default_value = "active-high")]
    polarity: String,

    /// Number of cycles to print (0 = unlimited)
    #[arg(short, long, default_value = "0")]
    n: usize,

    /// Annotation text width
    #[arg(long, default_value = "40")]
    width: usize,
}

/// Sink that prints duty cycle and period annotations
struct CyclePrinter {
    buffer: VecDeque<Annotation>,
    samplerate: u64,
    width: usize,
    max_cycles: usize,
    cycles: usize,
}

impl ProcessNode for CyclePrinter {
    fn name(&self) -> &str {
        "cycle_printer"
    }

    fn input_schema(&self) -> Vec<PortSchema> {
        vec![PortSchema::new::<Annotation>("annotations", 0, PortDirection::Input)]
    }

    fn work(&mut self, inputs: &[InputPort], _outputs: &[OutputPort]) -> WorkResult<usize> {
        let mut input = inputs
            .first()
            .and_then(|port| port.get::<Annotation>(&mut self.buffer))
            .ok_or_else(|| WorkError::NodeError("Missing input channel".to_string()))?;

        let annotation = input.recv()?;
        // Keep draining past the limit so the decoder can finish
        if self.max_cycles > 0 && self.cycles >= self.max_cycles {
            return Ok(0);
        }

        let seconds = annotation.start as f64 / self.samplerate as f64;
        println!("{:>12.6}s  {}", seconds, annotation.text_for_width(self.width));
        if annotation.class == ANN_PERIOD {
            self.cycles += 1;
            if self.cycles == self.max_cycles {
                info!("[CyclePrinter] {} cycles printed", self.cycles);
            }
        }
        Ok(1)
    }
}

/// Sink that keeps the last running average
struct AverageTracker {
    buffer: VecDeque<MetaRecord>,
    last: Option<MetaRecord>,
}

impl ProcessNode for AverageTracker {
    fn name(&self) -> &str {
        "average"
    }

    fn input_schema(&self) -> Vec<PortSchema> {
        vec![PortSchema::new::<MetaRecord>("meta", 0, PortDirection::Input)]
    }

    fn work(&mut self, inputs: &[InputPort], _outputs: &[OutputPort]) -> WorkResult<usize> {
        let mut input = inputs
            .first()
            .and_then(|port| port.get::<MetaRecord>(&mut self.buffer))
            .ok_or_else(|| WorkError::NodeError("Missing input channel".to_string()))?;

        match input.recv() {
            Ok(record) => {
                self.last = Some(record);
                Ok(1)
            }
            Err(e) => {
                if let Some(last) = &self.last {
                    println!("{}: {:.3}% over samples {}..{}", last.label, last.value, last.start, last.end);
                }
                Err(e)
            }
        }
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

    info!("=== PWM Decode Example ===");
    info!("File: {}", args.file);

    let capture = DslCapture::open(&args.file)?;
    let samplerate = capture.samplerate();
    info!(
        "Probe {} ({}) at {} Hz, {} samples",
        args.channel,
        capture.header().probe_names.get(args.channel).map_or("?", String::as_str),
        samplerate,
        capture.total_samples()
    );

    let decoder = LogicDecoderNode::new(PwmDecoder::new())?
        .with_options(&[("polarity", args.polarity.as_str())])?
        .with_channels(vec![args.channel])?
        .with_samplerate(samplerate);

    let mut pipeline = Pipeline::new();
    pipeline.add_process("source", capture.into_source())?;
    pipeline.add_process("pwm", decoder)?;
    pipeline.add_process(
        "printer",
        CyclePrinter {
            buffer: VecDeque::new(),
            samplerate,
            width: args.width,
            max_cycles: args.n,
            cycles: 0,
        },
    )?;
    pipeline.add_process(
        "average",
        AverageTracker {
            buffer: VecDeque::new(),
            last: None,
        },
    )?;
    pipeline.connect("source", "logic", "pwm", "logic")?;
    pipeline.connect("pwm", "annotations", "printer", "annotations")?;
    pipeline.connect("pwm", "meta", "average", "meta")?;

    info!("Running...");
    let outcomes = pipeline.build()?.wait();
    for (node, outcome) in &outcomes {
        if let NodeOutcome::Failed { error } = outcome {
            error!("{} failed: {}", node, error);
        }
    }

    info!("Done!");
    Ok(())
}
