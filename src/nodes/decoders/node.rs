//! Pipeline nodes wrapping decoders
//!
//! A decoder node has three output ports, in this order:
//!
//! | index | name          | type             |
//! |-------|---------------|------------------|
//! | 0     | `annotations` | [`Annotation`]   |
//! | 1     | `binary`      | [`BinaryRecord`] |
//! | 2     | `meta`        | [`MetaRecord`]   |
//!
//! Records go only to connected ports. The whole decode run happens inside
//! one `work()` call; the node is done afterwards and closes its outputs
//! whether the run ended cleanly or not.

use super::descriptor::OptionValues;
use super::types::{Annotation, BinaryRecord, MetaRecord, Record, RecordSink};
use super::{LogicDecoder, Metadata, StackedDecoder};
use crate::runtime::cursor::SampleCursor;
use crate::runtime::errors::{ConfigError, WorkError, WorkResult};
use crate::runtime::node::ProcessNode;
use crate::runtime::ports::{InputPort, OutputPort, PortDirection, PortSchema};
use crate::runtime::sample::SampleBlock;
use crate::runtime::sender::Sender;
use std::collections::VecDeque;
use tracing::{debug, error, info};

fn record_outputs() -> Vec<PortSchema> {
    vec![
        PortSchema::new::<Annotation>("annotations", 0, PortDirection::Output),
        PortSchema::new::<BinaryRecord>("binary", 1, PortDirection::Output),
        PortSchema::new::<MetaRecord>("meta", 2, PortDirection::Output),
    ]
}

/// Routes records to whichever output ports are connected
struct PortSink {
    annotations: Option<Sender<Annotation>>,
    binary: Option<Sender<BinaryRecord>>,
    meta: Option<Sender<MetaRecord>>,
    emitted: usize,
}

impl PortSink {
    fn new(outputs: &[OutputPort]) -> Self {
        Self {
            annotations: outputs.first().and_then(|p| p.get::<Annotation>()),
            binary: outputs.get(1).and_then(|p| p.get::<BinaryRecord>()),
            meta: outputs.get(2).and_then(|p| p.get::<MetaRecord>()),
            emitted: 0,
        }
    }

    fn close(&self) {
        if let Some(tx) = &self.annotations {
            tx.close();
        }
        if let Some(tx) = &self.binary {
            tx.close();
        }
        if let Some(tx) = &self.meta {
            tx.close();
        }
    }
}

impl RecordSink for PortSink {
    fn put(&mut self, record: Record) -> WorkResult<()> {
        let sent = match record {
            Record::Annotation(a) => self.annotations.as_ref().map(|tx| tx.send(a).map_err(WorkError::from)),
            Record::Binary(b) => self.binary.as_ref().map(|tx| tx.send(b).map_err(WorkError::from)),
            Record::Meta(m) => self.meta.as_ref().map(|tx| tx.send(m).map_err(WorkError::from)),
        };
        if let Some(result) = sent {
            result?;
            self.emitted += 1;
        }
        Ok(())
    }
}

/// Close outputs and turn the end of a run into the node's work result
fn finish_run(name: &str, sink: &PortSink, result: WorkResult<()>) -> WorkResult<usize> {
    sink.close();
    match result {
        Ok(()) => Ok(sink.emitted),
        Err(e) if e.is_shutdown() => {
            info!("[{}] End of stream after {} records", name, sink.emitted);
            Ok(sink.emitted)
        }
        Err(e) => {
            error!("[{}] Decode aborted: {}", name, e);
            Err(e)
        }
    }
}

/// Pipeline node running a [`LogicDecoder`] over the `logic` input
pub struct LogicDecoderNode<D: LogicDecoder> {
    name: String,
    decoder: D,
    options: OptionValues,
    samplerate: Option<u64>,
    /// Stream channel for each declared channel
    channels: Vec<usize>,
    buffer: VecDeque<SampleBlock>,
    done: bool,
}

impl<D: LogicDecoder> LogicDecoderNode<D> {
    /// Wrap a decoder after checking its descriptor tables.
    pub fn new(decoder: D) -> Result<Self, ConfigError> {
        decoder.validate()?;
        let descriptor = decoder.descriptor();
        Ok(Self {
            name: descriptor.id.to_string(),
            options: OptionValues::defaults(descriptor),
            samplerate: None,
            channels: (0..descriptor.num_channels()).collect(),
            buffer: VecDeque::new(),
            done: false,
            decoder,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Override option defaults
    pub fn with_options(mut self, overrides: &[(&str, &str)]) -> Result<Self, ConfigError> {
        self.options = OptionValues::resolve(self.decoder.descriptor(), overrides)?;
        Ok(self)
    }

    pub fn with_samplerate(mut self, samplerate: u64) -> Self {
        self.samplerate = Some(samplerate);
        self
    }

    /// Map declared channels to stream channels, in declaration order
    pub fn with_channels(mut self, channels: Vec<usize>) -> Result<Self, ConfigError> {
        let descriptor = self.decoder.descriptor();
        if channels.len() != descriptor.num_channels() {
            return Err(ConfigError::ChannelCount {
                decoder: descriptor.id.to_string(),
                expected: descriptor.num_channels(),
                actual: channels.len(),
            });
        }
        self.channels = channels;
        Ok(self)
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    fn run(&mut self, inputs: &[InputPort], sink: &mut PortSink) -> WorkResult<()> {
        self.decoder.reset();
        if let Some(rate) = self.samplerate {
            self.decoder.metadata(Metadata::SampleRate(rate));
        }
        self.decoder.start(&self.options)?;

        let mut receiver = inputs
            .first()
            .and_then(|p| p.get::<SampleBlock>(&mut self.buffer))
            .ok_or_else(|| WorkError::NodeError(format!("{}: logic input not connected", self.name)))?;

        let available = receiver.peek()?.num_channels();
        if let Some(&highest) = self.channels.iter().max()
            && highest >= available
        {
            return Err(ConfigError::ChannelCount {
                decoder: self.decoder.descriptor().id.to_string(),
                expected: highest + 1,
                actual: available,
            }
            .into());
        }

        debug!("[{}] Decoding channels {:?}", self.name, self.channels);
        let mut cursor = SampleCursor::new(receiver, self.channels.clone());
        self.decoder.decode(&mut cursor, sink)
    }
}

impl<D: LogicDecoder> ProcessNode for LogicDecoderNode<D> {
    fn name(&self) -> &str {
        &self.name
    }

    fn should_stop(&self) -> bool {
        self.done
    }

    fn input_schema(&self) -> Vec<PortSchema> {
        vec![PortSchema::new::<SampleBlock>("logic", 0, PortDirection::Input)]
    }

    fn output_schema(&self) -> Vec<PortSchema> {
        record_outputs()
    }

    fn work(&mut self, inputs: &[InputPort], outputs: &[OutputPort]) -> WorkResult<usize> {
        let mut sink = PortSink::new(outputs);
        let result = self.run(inputs, &mut sink);
        self.done = true;
        finish_run(&self.name, &sink, result)
    }
}

/// Pipeline node running a [`StackedDecoder`] over the `frames` input
pub struct StackedDecoderNode<D: StackedDecoder> {
    name: String,
    decoder: D,
    options: OptionValues,
    buffer: VecDeque<D::Frame>,
    done: bool,
}

impl<D: StackedDecoder> StackedDecoderNode<D> {
    pub fn new(decoder: D) -> Result<Self, ConfigError> {
        decoder.validate()?;
        let descriptor = decoder.descriptor();
        Ok(Self {
            name: descriptor.id.to_string(),
            options: OptionValues::defaults(descriptor),
            buffer: VecDeque::new(),
            done: false,
            decoder,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_options(mut self, overrides: &[(&str, &str)]) -> Result<Self, ConfigError> {
        self.options = OptionValues::resolve(self.decoder.descriptor(), overrides)?;
        Ok(self)
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    fn run(&mut self, inputs: &[InputPort], sink: &mut PortSink) -> WorkResult<()> {
        self.decoder.reset();
        self.decoder.start(&self.options)?;

        let mut receiver = inputs
            .first()
            .and_then(|p| p.get::<D::Frame>(&mut self.buffer))
            .ok_or_else(|| WorkError::NodeError(format!("{}: frames input not connected", self.name)))?;

        loop {
            match receiver.recv() {
                Ok(frame) => self.decoder.decode(frame, sink)?,
                Err(e) => {
                    self.decoder.finish();
                    return Err(e);
                }
            }
        }
    }
}

impl<D: StackedDecoder> ProcessNode for StackedDecoderNode<D> {
    fn name(&self) -> &str {
        &self.name
    }

    fn should_stop(&self) -> bool {
        self.done
    }

    fn input_schema(&self) -> Vec<PortSchema> {
        vec![PortSchema::new::<D::Frame>("frames", 0, PortDirection::Input)]
    }

    fn output_schema(&self) -> Vec<PortSchema> {
        record_outputs()
    }

    fn work(&mut self, inputs: &[InputPort], outputs: &[OutputPort]) -> WorkResult<usize> {
        let mut sink = PortSink::new(outputs);
        let result = self.run(inputs, &mut sink);
        self.done = true;
        finish_run(&self.name, &sink, result)
    }
}

/// Run a logic decoder over in-memory blocks and collect every record.
///
/// Performs the same reset, metadata and start sequence as
/// [`LogicDecoderNode`]; the end of `blocks` ends the run.
pub fn decode_blocks<D: LogicDecoder>(
    decoder: &mut D,
    samplerate: Option<u64>,
    options: &OptionValues,
    channels: Vec<usize>,
    blocks: Vec<SampleBlock>,
) -> WorkResult<Vec<Record>> {
    decoder.reset();
    if let Some(rate) = samplerate {
        decoder.metadata(Metadata::SampleRate(rate));
    }
    decoder.start(options)?;

    let mut records = Vec::new();
    let mut cursor = SampleCursor::new(VecDeque::from(blocks), channels);
    match decoder.decode(&mut cursor, &mut records) {
        Ok(()) => Ok(records),
        Err(e) if e.is_shutdown() => Ok(records),
        Err(e) => Err(e),
    }
}

/// Run a stacked decoder over in-memory frames and collect every record.
pub fn decode_frames<D: StackedDecoder>(
    decoder: &mut D,
    options: &OptionValues,
    frames: impl IntoIterator<Item = D::Frame>,
) -> WorkResult<Vec<Record>> {
    decoder.reset();
    decoder.start(options)?;

    let mut records = Vec::new();
    for frame in frames {
        decoder.decode(frame, &mut records)?;
    }
    decoder.finish();
    Ok(records)
}
