//! Runtime support for streaming decode pipelines

pub mod cursor;
pub mod errors;
pub mod node;
pub mod pipeline;
pub mod ports;
pub mod receiver;
pub mod sample;
pub mod scheduler;
pub mod sender;
pub mod type_registry;
pub mod watchdog;

pub use cursor::{BlockSource, Condition, Edge, SampleCursor, Term, Wait};
pub use errors::{ConfigError, ConnectionError, PortError, WorkError, WorkResult};
pub use node::ProcessNode;
pub use ports::{InputPort, OutputPort, Pipeline, PortDirection, PortSchema, register_type};
pub use receiver::Receiver;
pub use sample::{Pins, SampleBlock};
pub use scheduler::{NodeOutcome, Scheduler};
pub use sender::{ChannelMessage, Sender};
pub use watchdog::Watchdog;
