//! Node trait for streaming processing
//!
//! Every pipeline stage (capture sources, decoders, sinks) implements
//! [`ProcessNode`]. The scheduler calls `work()` in a loop on the node's own
//! thread until the node reports it is done.

pub use super::errors::{WorkError, WorkResult};
pub use super::ports::{InputPort, OutputPort, PortSchema};
pub use super::receiver::Receiver;
pub use super::sender::Sender;

/// A processing node in a decode pipeline
/// - Sources have 0 inputs and N outputs
/// - Sinks have N inputs and 0 outputs
/// - Decoders have 1 input (samples or upstream frames) and M outputs
pub trait ProcessNode: Send {
    /// Get a debug name for this node
    fn name(&self) -> &str;

    /// Check if this node has finished and should not be called again
    fn should_stop(&self) -> bool {
        false
    }

    /// Number of input ports this node requires
    fn num_inputs(&self) -> usize {
        self.input_schema().len()
    }

    /// Number of output ports this node provides
    fn num_outputs(&self) -> usize {
        self.output_schema().len()
    }

    /// Schema for all input ports (name + type + index)
    fn input_schema(&self) -> Vec<PortSchema> {
        Vec::new()
    }

    /// Schema for all output ports (name + type + index)
    fn output_schema(&self) -> Vec<PortSchema> {
        Vec::new()
    }

    /// Do work: read from inputs, process, write to outputs.
    ///
    /// Returns `Ok(n)` with the number of items produced. `Err(Shutdown)`
    /// ends the node cleanly; any other error aborts it.
    fn work(&mut self, inputs: &[InputPort], outputs: &[OutputPort]) -> WorkResult<usize>;
}
