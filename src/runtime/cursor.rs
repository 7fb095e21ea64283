//! Sample cursor with blocking wait conditions
//!
//! A decoder's `decode()` is written as a straight sequence of waits:
//!
//! ```ignore
//! let pins = cursor.wait(&Wait::from(Condition::either(0)))?;
//! ```
//!
//! Each `wait` pulls samples from the block stream until the condition holds,
//! then returns the values of the decoder's declared channels at that sample.
//! The cursor never rewinds. When the stream ends while waiting, `wait`
//! returns `WorkError::Shutdown`, which node wrappers treat as a clean stop.
//!
//! A [`Wait`] is a list of alternatives (OR). Each [`Condition`] is a list of
//! terms that must all hold on the same sample (AND).

use std::collections::VecDeque;

use super::errors::{WorkError, WorkResult};
use super::receiver::Receiver;
use super::sample::{Pins, SampleBlock};
use tracing::trace;

/// Direction of an edge term
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
    Either,
}

/// One term of a condition, addressed by declared channel index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Term {
    /// Channel changed from the previous sample in the given direction
    Edge { channel: usize, edge: Edge },
    /// Channel holds a static level
    Level { channel: usize, high: bool },
    /// Exactly N samples after the position the wait started from
    Skip(u64),
}

/// Terms that must hold simultaneously. An empty condition matches the next sample.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Condition {
    terms: Vec<Term>,
}

impl Condition {
    pub fn edge(channel: usize, edge: Edge) -> Self {
        Self {
            terms: vec![Term::Edge { channel, edge }],
        }
    }

    pub fn rising(channel: usize) -> Self {
        Self::edge(channel, Edge::Rising)
    }

    pub fn falling(channel: usize) -> Self {
        Self::edge(channel, Edge::Falling)
    }

    pub fn either(channel: usize) -> Self {
        Self::edge(channel, Edge::Either)
    }

    pub fn level(channel: usize, high: bool) -> Self {
        Self {
            terms: vec![Term::Level { channel, high }],
        }
    }

    /// Skip `n` samples. A skip of 0 is treated as 1; the cursor cannot
    /// match the sample it already returned.
    pub fn skip(n: u64) -> Self {
        Self {
            terms: vec![Term::Skip(n.max(1))],
        }
    }

    pub fn and_edge(mut self, channel: usize, edge: Edge) -> Self {
        self.terms.push(Term::Edge { channel, edge });
        self
    }

    pub fn and_level(mut self, channel: usize, high: bool) -> Self {
        self.terms.push(Term::Level { channel, high });
        self
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// `skip_from` is the first position a skip counts: one past the last
    /// returned sample, or the start of the stream before the first wait.
    fn matches(&self, position: u64, bits: u64, prev: Option<u64>, skip_from: u64) -> bool {
        self.terms.iter().all(|term| match *term {
            Term::Edge { channel, edge } => {
                let Some(prev) = prev else {
                    return false;
                };
                let old = (prev >> channel) & 1 == 1;
                let new = (bits >> channel) & 1 == 1;
                match edge {
                    Edge::Rising => !old && new,
                    Edge::Falling => old && !new,
                    Edge::Either => old != new,
                }
            }
            Term::Level { channel, high } => ((bits >> channel) & 1 == 1) == high,
            Term::Skip(n) => position == skip_from + n - 1,
        })
    }
}

/// Alternatives for a single wait. Empty means "the next sample".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Wait {
    alternatives: Vec<Condition>,
}

impl Wait {
    /// Match the very next sample
    pub fn next() -> Self {
        Self::default()
    }

    /// Match when any of the given conditions holds
    pub fn any(alternatives: Vec<Condition>) -> Self {
        Self { alternatives }
    }

    pub fn alternatives(&self) -> &[Condition] {
        &self.alternatives
    }
}

impl From<Condition> for Wait {
    fn from(condition: Condition) -> Self {
        Self {
            alternatives: vec![condition],
        }
    }
}

/// Pull-based supply of contiguous sample blocks.
///
/// Returns `WorkError::Shutdown` once the stream is exhausted.
pub trait BlockSource {
    fn next_block(&mut self) -> WorkResult<SampleBlock>;
}

impl BlockSource for Receiver<'_, SampleBlock> {
    fn next_block(&mut self) -> WorkResult<SampleBlock> {
        self.recv()
    }
}

impl BlockSource for VecDeque<SampleBlock> {
    fn next_block(&mut self) -> WorkResult<SampleBlock> {
        self.pop_front().ok_or(WorkError::Shutdown)
    }
}

/// Cursor over a block stream, mapping declared channels to stream channels.
pub struct SampleCursor<S> {
    source: S,
    /// Stream channel index for each declared channel
    channels: Vec<usize>,
    block: Option<SampleBlock>,
    /// Position of the next sample to scan; None until the first block arrives
    next_position: Option<u64>,
    /// Start position of the first block
    first_position: Option<u64>,
    /// Position of the sample returned by the last successful wait
    samplenum: Option<u64>,
    /// Declared-channel bits of the last scanned sample
    prev_bits: Option<u64>,
    matched: Vec<bool>,
}

impl<S: BlockSource> SampleCursor<S> {
    /// Create a cursor. `channels[i]` is the stream channel carrying the
    /// decoder's declared channel `i`.
    pub fn new(source: S, channels: Vec<usize>) -> Self {
        Self {
            source,
            channels,
            block: None,
            next_position: None,
            first_position: None,
            samplenum: None,
            prev_bits: None,
            matched: Vec::new(),
        }
    }

    /// Position of the sample returned by the last wait (0 before the first wait)
    pub fn samplenum(&self) -> u64 {
        self.samplenum.unwrap_or(0)
    }

    /// Whether alternative `index` of the last wait held at the returned sample
    pub fn matched(&self, index: usize) -> bool {
        self.matched.get(index).copied().unwrap_or(false)
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Block until `wait` is satisfied and return the declared channel values.
    pub fn wait(&mut self, wait: &Wait) -> WorkResult<Pins> {
        loop {
            let (position, bits) = self.next_sample()?;
            let prev = self.prev_bits.replace(bits);
            let skip_from = match self.samplenum {
                Some(last) => last + 1,
                None => self.first_position.unwrap_or(position),
            };

            let hit = if wait.alternatives.is_empty() {
                self.matched.clear();
                true
            } else {
                self.matched.clear();
                self.matched.extend(
                    wait.alternatives
                        .iter()
                        .map(|c| c.matches(position, bits, prev, skip_from)),
                );
                self.matched.iter().any(|m| *m)
            };

            if hit {
                trace!("wait satisfied at sample {}", position);
                self.samplenum = Some(position);
                return Ok(Pins::new(bits, self.channels.len()));
            }
        }
    }

    fn next_sample(&mut self) -> WorkResult<(u64, u64)> {
        loop {
            if let Some(block) = &self.block
                && let Some(position) = self.next_position
                && position < block.end_position()
            {
                self.next_position = Some(position + 1);
                let bits = self
                    .channels
                    .iter()
                    .enumerate()
                    .fold(0u64, |acc, (i, &ch)| {
                        acc | (u64::from(block.get_bit(position, ch)) << i)
                    });
                return Ok((position, bits));
            }

            let block = self.source.next_block()?;
            let expected = self.next_position.unwrap_or(block.start_position);
            if block.start_position != expected {
                return Err(WorkError::Defect(format!(
                    "non-contiguous sample block: expected start {}, got {}",
                    expected, block.start_position
                )));
            }
            if let Some(&ch) = self.channels.iter().find(|&&ch| ch >= block.num_channels()) {
                return Err(WorkError::Defect(format!(
                    "channel {} not present in {}-byte sample units",
                    ch, block.unit_size
                )));
            }
            self.first_position.get_or_insert(block.start_position);
            self.next_position = Some(block.start_position);
            self.block = Some(block);
        }
    }
}
