//! Sample-driven logic protocol decoders with a streaming node pipeline
//!
//! Decoders pull samples through a [`SampleCursor`] by waiting on edge and
//! level conditions, and emit annotations, binary payloads and measurements.
//! Each decoder runs as one node on its own thread; nodes are wired by name
//! through a [`Pipeline`] and driven by a [`Scheduler`].
//!
//! # Architecture
//!
//! - **Sources**: [`LogicSource`] (in-memory), [`DslCapture`] (DSLogic files),
//!   [`FrameSource`] (upstream records for stacked decoders)
//! - **Decoders**: PWM, IR (over an injected symbol library, NEC built in)
//!   and DS2432 stacked on one-wire network frames
//! - **Sinks**: [`RecordCollector`]
//!
//! # Example
//!
//! ```no_run
//! use logic_pd::nodes::decoders::{Annotation, IrDecoder, LogicDecoderNode};
//! use logic_pd::{DslCapture, Pipeline, RecordCollector};
//!
//! let capture = DslCapture::open("remote.dsl")?;
//! let ir = LogicDecoderNode::new(IrDecoder::new())?.with_samplerate(capture.samplerate());
//! let collector = RecordCollector::<Annotation>::new();
//! let frames = collector.handle();
//!
//! let mut pipeline = Pipeline::new();
//! pipeline.add_process("capture", capture.into_source())?;
//! pipeline.add_process("ir", ir)?;
//! pipeline.add_process("frames", collector)?;
//! pipeline.connect("capture", "logic", "ir", "logic")?;
//! pipeline.connect("ir", "annotations", "frames", "records")?;
//! let outcomes = pipeline.build()?.wait();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use thiserror::Error;

pub mod nodes;
pub mod runtime;

// Re-export decoder contracts and record types
pub use nodes::decoders::{
    Annotation, BinaryRecord, Descriptor, LogicDecoder, LogicDecoderNode, MetaRecord, Metadata, OneWireFrame,
    OptionValues, Record, RecordSink, StackedDecoder, StackedDecoderNode,
};

// Re-export built-in decoders
pub use nodes::decoders::{Ds2432Decoder, IrDecoder, NecLibrary, PwmDecoder};

// Re-export sources and sinks
pub use nodes::{DslCapture, DslHeader, FrameSource, LogicSource, RecordCollector};

// Re-export streaming runtime components
pub use runtime::{
    BlockSource, Condition, ConfigError, ConnectionError, Edge, InputPort, NodeOutcome, OutputPort, Pins, Pipeline,
    PortDirection, PortError, PortSchema, ProcessNode, SampleBlock, SampleCursor, Scheduler, Wait, WorkError,
    WorkResult, register_type,
};

/// Errors loading a capture file
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Header parsing error: {0}")]
    ParseHeader(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid probe number: {0}")]
    InvalidProbe(usize),

    #[error("Invalid block number: {0}")]
    InvalidBlock(u64),

    #[error("Position out of bounds: {0}")]
    OutOfBounds(u64),
}

pub type Result<T> = std::result::Result<T, CaptureError>;
