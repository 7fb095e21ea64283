//! Channel receiver with a put-back buffer and watchdog monitoring
//!
//! [`Receiver`] wraps a single `crossbeam_channel::Receiver<ChannelMessage<T>>`,
//! transparently unwraps `ChannelMessage` and caches end-of-stream state so
//! every call after the end returns `WorkError::Shutdown`.
//!
//! Decoders pull from it in two ways: the sample cursor asks for the next
//! [`SampleBlock`](super::sample::SampleBlock), and stacked decoders take one
//! upstream record at a time.

use crossbeam_channel::Receiver as CrossbeamReceiver;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use super::errors::{WorkError, WorkResult};
use super::sender::ChannelMessage;
use super::watchdog::{OperationGuard, WatchdogHandle};

/// A single crossbeam receiver with a put-back buffer.
///
/// The buffer and the end-of-stream flag are externally owned so they
/// persist across `work()` calls in the owning node.
pub struct Receiver<'a, T> {
    receiver: &'a CrossbeamReceiver<ChannelMessage<T>>,
    buffer: &'a mut VecDeque<T>,
    watchdog_handle: Option<WatchdogHandle>,
    eos: &'a AtomicBool,
}

impl<'a, T> Receiver<'a, T> {
    /// Create a new receiver with watchdog monitoring.
    pub fn new(
        receiver: &'a CrossbeamReceiver<ChannelMessage<T>>,
        buffer: &'a mut VecDeque<T>,
        watchdog_handle: WatchdogHandle,
        eos: &'a AtomicBool,
    ) -> Self {
        Self {
            receiver,
            buffer,
            watchdog_handle: Some(watchdog_handle),
            eos,
        }
    }

    /// Create a receiver without watchdog monitoring.
    pub fn unmonitored(
        receiver: &'a CrossbeamReceiver<ChannelMessage<T>>,
        buffer: &'a mut VecDeque<T>,
        eos: &'a AtomicBool,
    ) -> Self {
        Self {
            receiver,
            buffer,
            watchdog_handle: None,
            eos,
        }
    }

    /// Blocking receive. Returns from the put-back buffer first, then
    /// falls through to the underlying channel.
    ///
    /// Returns `Err(WorkError::Shutdown)` once end-of-stream was seen or every
    /// sender is gone.
    pub fn recv(&mut self) -> WorkResult<T> {
        if let Some(item) = self.buffer.pop_front() {
            return Ok(item);
        }
        if self.eos.load(Ordering::Relaxed) {
            return Err(WorkError::Shutdown);
        }

        let _guard = self.watchdog_handle.as_ref().map(OperationGuard::new);
        match self.receiver.recv() {
            Ok(ChannelMessage::Sample(item)) => Ok(item),
            Ok(ChannelMessage::EndOfStream) => {
                self.eos.store(true, Ordering::Relaxed);
                tracing::debug!("Receiver::recv() - EndOfStream received");
                Err(WorkError::Shutdown)
            }
            Err(_) => {
                self.eos.store(true, Ordering::Relaxed);
                tracing::debug!("Receiver::recv() - channel disconnected, returning Shutdown");
                Err(WorkError::Shutdown)
            }
        }
    }

    /// Peek at the front item, blocking until one is available.
    pub fn peek(&mut self) -> WorkResult<&T> {
        if self.buffer.is_empty() {
            let item = self.recv()?;
            self.buffer.push_back(item);
        }
        self.buffer.front().ok_or(WorkError::Shutdown)
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Result<T, crossbeam_channel::TryRecvError> {
        if let Some(item) = self.buffer.pop_front() {
            return Ok(item);
        }
        if self.eos.load(Ordering::Relaxed) {
            return Err(crossbeam_channel::TryRecvError::Disconnected);
        }
        match self.receiver.try_recv() {
            Ok(ChannelMessage::Sample(item)) => Ok(item),
            Ok(ChannelMessage::EndOfStream) => {
                self.eos.store(true, Ordering::Relaxed);
                Err(crossbeam_channel::TryRecvError::Disconnected)
            }
            Err(e) => Err(e),
        }
    }

    /// Push an item back so the next `recv()` returns it.
    pub fn put_back(&mut self, item: T) {
        self.buffer.push_front(item);
    }

    /// Check if there are any buffered items.
    pub fn has_buffered(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Whether end-of-stream has been observed on this channel.
    pub fn is_finished(&self) -> bool {
        self.buffer.is_empty() && self.eos.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    fn test_watchdog() -> crate::runtime::Watchdog {
        crate::runtime::Watchdog::new()
    }

    #[test]
    fn test_recv_from_buffer_then_channel() {
        let (tx, rx) = bounded::<ChannelMessage<u8>>(4);
        let mut buf = VecDeque::from(vec![0x0f]);
        let wd = test_watchdog();
        let eos = AtomicBool::new(false);
        let mut r = Receiver::new(&rx, &mut buf, wd.register_port("test", "recv", "frames"), &eos);

        assert_eq!(r.recv().unwrap(), 0x0f);
        tx.send(ChannelMessage::Sample(0xaa)).unwrap();
        assert_eq!(r.recv().unwrap(), 0xaa);
    }

    #[test]
    fn test_put_back_and_peek() {
        let (_tx, rx) = bounded::<ChannelMessage<u8>>(4);
        let mut buf = VecDeque::new();
        let eos = AtomicBool::new(false);
        let mut r = Receiver::unmonitored(&rx, &mut buf, &eos);

        assert!(!r.has_buffered());
        r.put_back(0x33);
        assert_eq!(r.peek().unwrap(), &0x33);
        assert_eq!(r.recv().unwrap(), 0x33);
        assert!(!r.has_buffered());
    }

    #[test]
    fn test_buffered_items_drain_before_shutdown() {
        let (tx, rx) = bounded::<ChannelMessage<u8>>(4);
        let mut buf = VecDeque::new();
        let eos = AtomicBool::new(false);
        let mut r = Receiver::unmonitored(&rx, &mut buf, &eos);

        tx.send(ChannelMessage::Sample(1)).unwrap();
        tx.send(ChannelMessage::EndOfStream).unwrap();

        assert_eq!(r.peek().unwrap(), &1);
        assert!(r.recv().is_ok());
        assert!(r.recv().unwrap_err().is_shutdown());
        assert!(r.is_finished());
    }

    #[test]
    fn test_eos_persists_across_receivers() {
        let (tx, rx) = bounded::<ChannelMessage<u8>>(4);
        let mut buf = VecDeque::new();
        let eos = AtomicBool::new(false);
        tx.send(ChannelMessage::EndOfStream).unwrap();

        {
            let mut r = Receiver::unmonitored(&rx, &mut buf, &eos);
            assert!(r.recv().unwrap_err().is_shutdown());
        }
        // A later work() call builds a fresh Receiver over the same state.
        let mut r = Receiver::unmonitored(&rx, &mut buf, &eos);
        assert!(r.recv().unwrap_err().is_shutdown());
        assert_eq!(
            r.try_recv().unwrap_err(),
            crossbeam_channel::TryRecvError::Disconnected
        );
    }

    #[test]
    fn test_disconnect_is_shutdown() {
        let (tx, rx) = bounded::<ChannelMessage<u8>>(4);
        drop(tx);
        let mut buf = VecDeque::new();
        let eos = AtomicBool::new(false);
        let mut r = Receiver::unmonitored(&rx, &mut buf, &eos);
        assert!(r.recv().unwrap_err().is_shutdown());
    }
}
