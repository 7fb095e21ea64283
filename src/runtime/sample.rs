//! Core data types for logic sample streams

use std::fmt;
use std::sync::Arc;

/// A block of multi-channel logic samples
///
/// Sample `N` occupies `unit_size` bytes starting at `data[N * unit_size]`.
/// Channel `c` is bit `c % 8` of byte `c / 8` within that unit, which is the
/// interleaved layout logic analyzers hand to protocol decoders.
///
/// Blocks in a stream are contiguous: the next block's `start_position` equals
/// this block's `end_position()`.
#[derive(Clone, Debug)]
pub struct SampleBlock {
    /// Packed sample units. Shared via Arc for cheap cloning across broadcast.
    pub data: Arc<[u8]>,
    /// Position of the first sample in this block (0-based, global sample index)
    pub start_position: u64,
    /// Number of valid samples in this block
    pub num_samples: usize,
    /// Bytes per sample (1 for up to 8 channels, 2 for up to 16, ...)
    pub unit_size: usize,
}

impl SampleBlock {
    /// Create a new SampleBlock
    pub fn new(data: Arc<[u8]>, start_position: u64, num_samples: usize, unit_size: usize) -> Self {
        Self {
            data,
            start_position,
            num_samples,
            unit_size,
        }
    }

    /// Build a block from one byte per sample (channels 0..8).
    pub fn from_bytes(start_position: u64, samples: &[u8]) -> Self {
        Self::new(Arc::from(samples), start_position, samples.len(), 1)
    }

    /// O(1) lookup of all channel bits at a global sample position, packed
    /// with channel 0 in bit 0. At most 64 channels are returned.
    ///
    /// `position` must be in `[self.start_position, self.end_position())`.
    #[inline]
    pub fn bits_at(&self, position: u64) -> u64 {
        let offset = (position - self.start_position) as usize * self.unit_size;
        self.data[offset..offset + self.unit_size.min(8)]
            .iter()
            .enumerate()
            .fold(0u64, |acc, (i, byte)| acc | (u64::from(*byte) << (8 * i)))
    }

    /// O(1) bit lookup for a single channel at a global sample position.
    #[inline]
    pub fn get_bit(&self, position: u64, channel: usize) -> bool {
        let offset = (position - self.start_position) as usize * self.unit_size;
        (self.data[offset + channel / 8] >> (channel % 8)) & 1 == 1
    }

    /// The position one past the last valid sample in this block
    #[inline]
    pub fn end_position(&self) -> u64 {
        self.start_position + self.num_samples as u64
    }

    /// Number of channels addressable in this block
    pub fn num_channels(&self) -> usize {
        self.unit_size * 8
    }
}

impl fmt::Display for SampleBlock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "SampleBlock[start={}, samples={}, unit={}]",
            self.start_position, self.num_samples, self.unit_size
        )
    }
}

/// Instantaneous values of a decoder's declared channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pins {
    bits: u64,
    count: usize,
}

impl Pins {
    pub fn new(bits: u64, count: usize) -> Self {
        let mask = if count >= 64 { u64::MAX } else { (1u64 << count) - 1 };
        Self {
            bits: bits & mask,
            count,
        }
    }

    /// Value of the declared channel at `index`.
    #[inline]
    pub fn get(&self, index: usize) -> bool {
        index < self.count && (self.bits >> index) & 1 == 1
    }

    /// Raw bit mask, declared channel 0 in bit 0.
    pub fn bits(&self) -> u64 {
        self.bits
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl fmt::Display for Pins {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for i in (0..self.count).rev() {
            write!(f, "{}", u8::from(self.get(i)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_at_single_byte_units() {
        let block = SampleBlock::from_bytes(100, &[0b01, 0b10, 0b11]);
        assert_eq!(block.bits_at(100), 0b01);
        assert_eq!(block.bits_at(101), 0b10);
        assert!(block.get_bit(102, 0));
        assert!(block.get_bit(102, 1));
        assert!(!block.get_bit(101, 0));
        assert_eq!(block.end_position(), 103);
    }

    #[test]
    fn test_bits_at_two_byte_units() {
        let data: Arc<[u8]> = Arc::from(vec![0x01, 0x80, 0x00, 0x01]);
        let block = SampleBlock::new(data, 0, 2, 2);
        assert_eq!(block.bits_at(0), 0x8001);
        assert!(block.get_bit(0, 15));
        assert!(block.get_bit(1, 8));
        assert!(!block.get_bit(1, 0));
        assert_eq!(block.num_channels(), 16);
    }

    #[test]
    fn test_pins_masks_undeclared_channels() {
        let pins = Pins::new(0b1110, 2);
        assert!(!pins.get(0));
        assert!(pins.get(1));
        assert!(!pins.get(2));
        assert_eq!(pins.bits(), 0b10);
        assert_eq!(pins.to_string(), "10");
    }
}
