//! Pipeline nodes
//!
//! - **Sources**: [`LogicSource`] streams packed logic samples,
//!   [`DslCapture`] loads DSLogic captures into one, [`FrameSource`] replays
//!   upstream records for stacked decoders
//! - **Decoders**: protocol decoders wrapped as nodes (see [`decoders`])
//! - **Sinks**: [`RecordCollector`] gathers any record stream
//!
//! # Example
//!
//! ```no_run
//! use logic_pd::nodes::decoders::{LogicDecoderNode, PwmDecoder};
//! use logic_pd::nodes::{DslCapture, RecordCollector};
//! use logic_pd::nodes::decoders::Annotation;
//! use logic_pd::Pipeline;
//!
//! let capture = DslCapture::open("capture.dsl")?;
//! let pwm = LogicDecoderNode::new(PwmDecoder::new())?.with_samplerate(capture.samplerate());
//! let collector = RecordCollector::<Annotation>::new();
//! let records = collector.handle();
//!
//! let mut pipeline = Pipeline::new();
//! pipeline.add_process("capture", capture.into_source())?;
//! pipeline.add_process("pwm", pwm)?;
//! pipeline.add_process("out", collector)?;
//! pipeline.connect("capture", "logic", "pwm", "logic")?;
//! pipeline.connect("pwm", "annotations", "out", "records")?;
//! pipeline.build()?.wait();
//! println!("{} annotations", records.lock().unwrap().len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod collector;
pub mod decoders;
mod dsl_file;
mod frame_source;
mod logic_source;

pub use collector::RecordCollector;
pub use dsl_file::{DslCapture, DslHeader, parse_sample_rate};
pub use frame_source::FrameSource;
pub use logic_source::{DEFAULT_BLOCK_SAMPLES, LogicSource};
