//! In-memory logic capture source
//!
//! Streams packed samples (`unit_size` bytes per sample, channel `c` in bit
//! `c % 8` of byte `c / 8`) as contiguous [`SampleBlock`]s on its `logic`
//! output, then closes the stream.

use crate::runtime::errors::{WorkError, WorkResult};
use crate::runtime::node::{InputPort, OutputPort, ProcessNode};
use crate::runtime::ports::{PortDirection, PortSchema};
use crate::runtime::sample::SampleBlock;
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_BLOCK_SAMPLES: usize = 4096;

/// Source node replaying a capture held in memory
pub struct LogicSource {
    name: String,
    data: Vec<u8>,
    unit_size: usize,
    block_samples: usize,
    position: usize,
    done: bool,
}

impl LogicSource {
    /// Packed capture; a trailing partial unit is ignored.
    pub fn new(data: Vec<u8>, unit_size: usize) -> Self {
        let unit_size = unit_size.max(1);
        let mut data = data;
        data.truncate(data.len() - data.len() % unit_size);
        Self {
            name: "logic_source".to_string(),
            data,
            unit_size,
            block_samples: DEFAULT_BLOCK_SAMPLES,
            position: 0,
            done: false,
        }
    }

    /// Single-channel capture on channel 0
    pub fn from_levels(levels: &[bool]) -> Self {
        Self::new(levels.iter().map(|&l| u8::from(l)).collect(), 1)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Samples per emitted block
    pub fn with_block_samples(mut self, block_samples: usize) -> Self {
        self.block_samples = block_samples.max(1);
        self
    }

    pub fn num_samples(&self) -> usize {
        self.data.len() / self.unit_size
    }

    pub fn unit_size(&self) -> usize {
        self.unit_size
    }

    /// Level of `channel` at sample `position`
    pub fn level(&self, channel: usize, position: usize) -> Option<bool> {
        if channel >= self.unit_size * 8 {
            return None;
        }
        let byte = self.data.get(position * self.unit_size + channel / 8)?;
        Some((byte >> (channel % 8)) & 1 == 1)
    }

    fn next_block(&mut self) -> Option<SampleBlock> {
        let total = self.num_samples();
        if self.position >= total {
            return None;
        }
        let count = self.block_samples.min(total - self.position);
        let bytes = &self.data[self.position * self.unit_size..(self.position + count) * self.unit_size];
        let block = SampleBlock::new(Arc::from(bytes), self.position as u64, count, self.unit_size);
        self.position += count;
        Some(block)
    }
}

impl ProcessNode for LogicSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn should_stop(&self) -> bool {
        self.done
    }

    fn output_schema(&self) -> Vec<PortSchema> {
        vec![PortSchema::new::<SampleBlock>("logic", 0, PortDirection::Output)]
    }

    fn work(&mut self, _inputs: &[InputPort], outputs: &[OutputPort]) -> WorkResult<usize> {
        let Some(sender) = outputs.first().and_then(|p| p.get::<SampleBlock>()) else {
            debug!("[{}] logic output not connected", self.name);
            self.done = true;
            return Err(WorkError::Shutdown);
        };

        match self.next_block() {
            Some(block) => {
                if sender.send(block).is_err() {
                    debug!("[{}] All receivers disconnected at sample {}", self.name, self.position);
                    self.done = true;
                    return Err(WorkError::Shutdown);
                }
                Ok(1)
            }
            None => {
                info!("[{}] Streamed {} samples", self.name, self.num_samples());
                sender.close();
                self.done = true;
                Err(WorkError::Shutdown)
            }
        }
    }
}
