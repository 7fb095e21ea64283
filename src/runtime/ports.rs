//! Typed port schemas and type-erased channel endpoints
//!
//! Nodes describe their ports with [`PortSchema`]; the [`Pipeline`] matches
//! schemas by name and `TypeId` when wiring one decoder's output stream into
//! another decoder's input.

use std::any::{Any, TypeId};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::AtomicBool;

use crossbeam_channel::Receiver as CrossbeamReceiver;

pub use super::errors::{ConnectionError, PortError};
pub use super::pipeline::Pipeline;
pub use super::receiver::Receiver;
pub use super::sender::{ChannelMessage, Sender};
pub use super::type_registry::register_type;
pub use super::watchdog::{Watchdog, WatchdogHandle};

/// Direction of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

/// Schema describing a port's metadata
#[derive(Debug, Clone)]
pub struct PortSchema {
    pub name: String,
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub index: usize,
    pub direction: PortDirection,
}

impl PortSchema {
    /// Create a new port schema with type information
    pub fn new<T: 'static>(name: impl Into<String>, index: usize, direction: PortDirection) -> Self {
        Self {
            name: name.into(),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            index,
            direction,
        }
    }
}

/// Type-erased input port wrapping a crossbeam receiver of `ChannelMessage<T>`
pub struct InputPort {
    channel: Box<dyn Any + Send>,
    watchdog_handle: Option<WatchdogHandle>,
    eos: AtomicBool,
}

impl InputPort {
    /// Create from type-erased box (for internal use by Pipeline).
    pub(crate) fn from_type_erased(channel: Box<dyn Any + Send>) -> Self {
        Self {
            channel,
            watchdog_handle: None,
            eos: AtomicBool::new(false),
        }
    }

    /// Create a new InputPort with a watchdog (for tests and hand-wired graphs).
    pub fn new_with_watchdog<T: Send + 'static>(
        receiver: CrossbeamReceiver<ChannelMessage<T>>,
        watchdog: &Watchdog,
        node_name: &str,
        port_name: &str,
    ) -> Self {
        Self {
            channel: Box::new(receiver),
            watchdog_handle: Some(watchdog.register_port(node_name, "recv", port_name)),
            eos: AtomicBool::new(false),
        }
    }

    /// Set watchdog context for this port
    pub(crate) fn with_watchdog(mut self, watchdog: &Watchdog, node_name: &str, port_name: &str) -> Self {
        self.watchdog_handle = Some(watchdog.register_port(node_name, "recv", port_name));
        self
    }

    /// Whether a channel is attached to this port
    pub fn is_connected(&self) -> bool {
        !self.channel.is::<()>()
    }

    /// Get a Receiver over this port's channel.
    ///
    /// Returns None if the port doesn't carry `T` or is unconnected.
    pub fn get<'a, T: Send + 'static>(&'a self, buffer: &'a mut VecDeque<T>) -> Option<Receiver<'a, T>> {
        let receiver = self.channel.downcast_ref::<CrossbeamReceiver<ChannelMessage<T>>>()?;
        Some(match &self.watchdog_handle {
            Some(handle) => Receiver::new(receiver, buffer, handle.clone(), &self.eos),
            None => Receiver::unmonitored(receiver, buffer, &self.eos),
        })
    }
}

/// Type-erased output port wrapping a broadcast Sender<T>
pub struct OutputPort {
    channel: Box<dyn Any + Send>,
    watchdog_handle: Option<WatchdogHandle>,
}

impl OutputPort {
    /// Create from type-erased box (for internal use by Pipeline).
    pub(crate) fn from_type_erased(channel: Box<dyn Any + Send>) -> Self {
        Self {
            channel,
            watchdog_handle: None,
        }
    }

    /// Create a new OutputPort with a watchdog (for tests and hand-wired graphs).
    pub fn new_with_watchdog<T: Send + Clone + 'static>(
        sender: Sender<T>,
        watchdog: &Watchdog,
        node_name: &str,
        port_name: &str,
    ) -> Self {
        Self {
            channel: Box::new(sender),
            watchdog_handle: Some(watchdog.register_port(node_name, "send", port_name)),
        }
    }

    /// Set watchdog context for this port
    pub(crate) fn with_watchdog(mut self, watchdog: &Watchdog, node_name: &str, port_name: &str) -> Self {
        self.watchdog_handle = Some(watchdog.register_port(node_name, "send", port_name));
        self
    }

    /// Whether any consumer is attached to this port
    pub fn is_connected(&self) -> bool {
        !self.channel.is::<()>()
    }

    /// Get a Sender with watchdog monitoring attached.
    ///
    /// Returns None if the port doesn't carry `T` or is unconnected.
    pub fn get<T: Send + Clone + 'static>(&self) -> Option<Sender<T>> {
        let sender = self.channel.downcast_ref::<Sender<T>>()?;
        Some(match &self.watchdog_handle {
            Some(handle) => sender.with_watchdog(handle.clone()),
            None => sender.clone(),
        })
    }
}

impl fmt::Debug for InputPort {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "InputPort(connected={})", self.is_connected())
    }
}

impl fmt::Debug for OutputPort {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "OutputPort(connected={})", self.is_connected())
    }
}
