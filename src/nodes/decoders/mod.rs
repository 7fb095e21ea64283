//! Protocol decoders
//!
//! Two decoder contracts:
//!
//! - [`LogicDecoder`] pulls raw samples through a [`SampleCursor`] and runs
//!   its whole protocol state machine inside one `decode()` call.
//! - [`StackedDecoder`] consumes records emitted by another decoder, one
//!   frame at a time.
//!
//! Both are wrapped into pipeline nodes by [`LogicDecoderNode`] and
//! [`StackedDecoderNode`].

pub mod descriptor;
pub mod ds2432;
pub mod ir;
pub mod nec;
pub mod node;
pub mod pwm;
pub mod render;
pub mod types;

use crate::runtime::cursor::{BlockSource, SampleCursor};
use crate::runtime::errors::{ConfigError, WorkResult};

pub use descriptor::{
    AnnotationClass, AnnotationRow, BinaryClass, ChannelSpec, Descriptor, MetaSpec, OptionFormat, OptionSpec, OptionValues,
};
pub use ds2432::{Authenticator, Ds2432Decoder, Sha1Authenticator};
pub use ir::{IrDecoder, ProtocolResult, SymbolLibrary};
pub use nec::NecLibrary;
pub use node::{LogicDecoderNode, StackedDecoderNode, decode_blocks, decode_frames};
pub use pwm::PwmDecoder;
pub use types::{Annotation, BinaryRecord, MetaRecord, NetworkEvent, OneWireFrame, Polarity, Record, RecordSink};

/// Capture properties supplied by the host before a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metadata {
    SampleRate(u64),
}

/// Decoder driven by raw logic samples
pub trait LogicDecoder: Send {
    fn descriptor(&self) -> &'static Descriptor;

    /// Return to the initial state. Called before every run.
    fn reset(&mut self);

    fn metadata(&mut self, _metadata: Metadata) {}

    /// Apply resolved options and check run preconditions.
    ///
    /// Called once per run before any sample is consumed.
    fn start(&mut self, options: &OptionValues) -> Result<(), ConfigError>;

    /// Run the state machine until the sample stream ends.
    fn decode<S: BlockSource>(&mut self, cursor: &mut SampleCursor<S>, out: &mut dyn RecordSink) -> WorkResult<()>;

    /// Registration-time consistency check
    fn validate(&self) -> Result<(), ConfigError> {
        self.descriptor().validate()
    }
}

/// Decoder consuming another decoder's records
pub trait StackedDecoder: Send {
    type Frame: Clone + Send + 'static;

    fn descriptor(&self) -> &'static Descriptor;

    fn reset(&mut self);

    fn start(&mut self, options: &OptionValues) -> Result<(), ConfigError>;

    /// Handle one upstream frame. Frames are never split or merged.
    fn decode(&mut self, frame: Self::Frame, out: &mut dyn RecordSink) -> WorkResult<()>;

    /// Stream ended. Partial fields are dropped.
    fn finish(&mut self) {}

    fn validate(&self) -> Result<(), ConfigError> {
        self.descriptor().validate()
    }
}

/// Descriptors of the built-in decoders
pub fn registry() -> [&'static Descriptor; 3] {
    [&pwm::DESCRIPTOR, &ir::DESCRIPTOR, &ds2432::DESCRIPTOR]
}

/// Look up a built-in decoder by id
pub fn find(id: &str) -> Option<&'static Descriptor> {
    registry().into_iter().find(|d| d.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_descriptors_validate() {
        for descriptor in registry() {
            descriptor.validate().unwrap();
        }
        render::check_flag_table().unwrap();
    }

    #[test]
    fn test_find() {
        assert_eq!(find("pwm").unwrap().name, "PWM");
        assert_eq!(find("ir_irmp").unwrap().channels[0].id, "ir");
        assert_eq!(find("ds2432").unwrap().inputs, &["onewire_network"]);
        assert!(find("uart").is_none());
    }
}
