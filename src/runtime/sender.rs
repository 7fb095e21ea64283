//! Broadcast sender with watchdog monitoring for deadlock detection

use crossbeam_channel::{SendError, Sender as CrossbeamSender};

use super::watchdog::{OperationGuard, WatchdogHandle};

/// Channel message wrapper for end-of-stream signaling
///
/// Sources and decoders close their outputs explicitly when a run ends so
/// downstream stages stop even while other handles to the channel are alive.
///
/// Nodes never see this enum directly: `Sender::send()` wraps values
/// in `Sample(T)` and `Receiver::recv()` unwraps them.
#[derive(Clone, Debug)]
pub enum ChannelMessage<T> {
    /// A data item (sample block, record, upstream frame)
    Sample(T),
    /// End-of-stream marker, no more data will be sent
    EndOfStream,
}

/// Broadcast sender that clones each record to every subscribed consumer
pub struct Sender<T> {
    destinations: Vec<CrossbeamSender<ChannelMessage<T>>>,
    watchdog_handle: Option<WatchdogHandle>,
}

impl<T: Clone> Sender<T> {
    /// Create a new Sender from a vector of crossbeam senders
    pub fn new(destinations: Vec<CrossbeamSender<ChannelMessage<T>>>) -> Self {
        Self {
            destinations,
            watchdog_handle: None,
        }
    }

    /// Attach a watchdog handle to monitor send operations
    pub fn with_watchdog(&self, watchdog_handle: WatchdogHandle) -> Self {
        Self {
            destinations: self.destinations.clone(),
            watchdog_handle: Some(watchdog_handle),
        }
    }

    /// Get the number of broadcast destinations
    pub fn num_destinations(&self) -> usize {
        self.destinations.len()
    }

    /// Send a value to all destinations
    ///
    /// Fails only when every destination has disconnected.
    pub fn send(&self, value: T) -> Result<(), SendError<T>> {
        let Some((last, rest)) = self.destinations.split_last() else {
            return Ok(());
        };

        let _guard = self.watchdog_handle.as_ref().map(OperationGuard::new);

        let mut any_success = false;
        for dest in rest {
            any_success |= dest.send(ChannelMessage::Sample(value.clone())).is_ok();
        }
        match last.send(ChannelMessage::Sample(value)) {
            Ok(()) => Ok(()),
            Err(SendError(ChannelMessage::Sample(v))) if !any_success => Err(SendError(v)),
            Err(_) => Ok(()),
        }
    }

    /// Signal end-of-stream to all destinations
    ///
    /// Downstream `Receiver`s return `WorkError::Shutdown` once they have
    /// drained everything sent before this call.
    pub fn close(&self) {
        let _guard = self.watchdog_handle.as_ref().map(OperationGuard::new);
        for dest in &self.destinations {
            let _ = dest.send(ChannelMessage::EndOfStream);
        }
    }

    /// Check if this sender has any connected receivers
    pub fn is_connected(&self) -> bool {
        !self.destinations.is_empty()
    }
}

impl<T: Clone> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            destinations: self.destinations.clone(),
            watchdog_handle: self.watchdog_handle.clone(),
        }
    }
}
