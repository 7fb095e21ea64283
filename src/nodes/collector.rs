//! Sink node gathering records into shared storage

use crate::runtime::errors::{WorkError, WorkResult};
use crate::runtime::node::{InputPort, OutputPort, ProcessNode};
use crate::runtime::ports::{PortDirection, PortSchema};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Collects everything arriving on its `records` input.
///
/// Keep a [`RecordCollector::handle`] before handing the node to a pipeline
/// to read the records after the run.
pub struct RecordCollector<T> {
    name: String,
    records: Arc<Mutex<Vec<T>>>,
    buffer: VecDeque<T>,
    done: bool,
}

impl<T: Clone + Send + 'static> RecordCollector<T> {
    pub fn new() -> Self {
        Self {
            name: "collector".to_string(),
            records: Arc::new(Mutex::new(Vec::new())),
            buffer: VecDeque::new(),
            done: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Shared view of the collected records
    pub fn handle(&self) -> Arc<Mutex<Vec<T>>> {
        Arc::clone(&self.records)
    }
}

impl<T: Clone + Send + 'static> Default for RecordCollector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> ProcessNode for RecordCollector<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn should_stop(&self) -> bool {
        self.done
    }

    fn input_schema(&self) -> Vec<PortSchema> {
        vec![PortSchema::new::<T>("records", 0, PortDirection::Input)]
    }

    fn work(&mut self, inputs: &[InputPort], _outputs: &[OutputPort]) -> WorkResult<usize> {
        let mut receiver = inputs
            .first()
            .and_then(|p| p.get::<T>(&mut self.buffer))
            .ok_or_else(|| WorkError::NodeError(format!("{}: records input not connected", self.name)))?;

        match receiver.recv() {
            Ok(record) => {
                self.records
                    .lock()
                    .map_err(|_| WorkError::NodeError("collector storage poisoned".into()))?
                    .push(record);
                Ok(1)
            }
            Err(e) => {
                self.done = true;
                if e.is_shutdown() {
                    info!("[{}] Collected {} records", self.name, self.records.lock().map_or(0, |r| r.len()));
                }
                Err(e)
            }
        }
    }
}
