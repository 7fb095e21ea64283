//! Replays pre-built upstream records into a stacked decoder

use crate::runtime::errors::{WorkError, WorkResult};
use crate::runtime::node::{InputPort, OutputPort, ProcessNode};
use crate::runtime::ports::{PortDirection, PortSchema};
use std::collections::VecDeque;
use tracing::debug;

/// Source node emitting a fixed list of records on its `frames` output
pub struct FrameSource<T> {
    name: String,
    frames: VecDeque<T>,
    done: bool,
}

impl<T: Clone + Send + 'static> FrameSource<T> {
    pub fn new(frames: impl IntoIterator<Item = T>) -> Self {
        Self {
            name: "frame_source".to_string(),
            frames: frames.into_iter().collect(),
            done: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl<T: Clone + Send + 'static> ProcessNode for FrameSource<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn should_stop(&self) -> bool {
        self.done
    }

    fn output_schema(&self) -> Vec<PortSchema> {
        vec![PortSchema::new::<T>("frames", 0, PortDirection::Output)]
    }

    fn work(&mut self, _inputs: &[InputPort], outputs: &[OutputPort]) -> WorkResult<usize> {
        self.done = true;
        let Some(sender) = outputs.first().and_then(|p| p.get::<T>()) else {
            return Err(WorkError::Shutdown);
        };

        let mut sent = 0;
        while let Some(frame) = self.frames.pop_front() {
            if sender.send(frame).is_err() {
                debug!("[{}] Receivers gone, {} frames unsent", self.name, self.frames.len());
                return Err(WorkError::Shutdown);
            }
            sent += 1;
        }
        sender.close();
        Ok(sent)
    }
}
