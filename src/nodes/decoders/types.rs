//! Common decoder record types and enums

use crate::runtime::errors::{WorkError, WorkResult};
use std::fmt;

/// Time-ranged, human-readable label with several verbosity variants
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// Index into the decoder's annotation class list
    pub class: usize,
    pub start: u64,
    pub end: u64,
    /// Text variants, most to least detailed
    pub texts: Vec<String>,
}

impl Annotation {
    pub fn new(class: usize, start: u64, end: u64, texts: Vec<String>) -> Self {
        debug_assert!(start <= end, "annotation ends before it starts");
        Self {
            class,
            start,
            end,
            texts,
        }
    }

    /// Pick the most detailed text that fits `width` characters.
    ///
    /// Falls back to the tersest variant when none fit. The list order is
    /// never changed.
    pub fn text_for_width(&self, width: usize) -> &str {
        self.texts
            .iter()
            .find(|t| t.chars().count() <= width)
            .or_else(|| self.texts.last())
            .map(String::as_str)
            .unwrap_or("")
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}-{} [{}] {}",
            self.start,
            self.end,
            self.class,
            self.texts.first().map(String::as_str).unwrap_or("")
        )
    }
}

/// Point-in-time byte payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryRecord {
    /// Index into the decoder's binary class list
    pub class: usize,
    pub position: u64,
    pub data: Vec<u8>,
}

/// Derived scalar measurement over a sample range
#[derive(Debug, Clone, PartialEq)]
pub struct MetaRecord {
    pub start: u64,
    pub end: u64,
    pub value: f64,
    pub label: &'static str,
}

/// Any record a decoder emits
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Annotation(Annotation),
    Binary(BinaryRecord),
    Meta(MetaRecord),
}

impl Record {
    pub fn as_annotation(&self) -> Option<&Annotation> {
        match self {
            Record::Annotation(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&BinaryRecord> {
        match self {
            Record::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_meta(&self) -> Option<&MetaRecord> {
        match self {
            Record::Meta(m) => Some(m),
            _ => None,
        }
    }
}

impl From<Annotation> for Record {
    fn from(a: Annotation) -> Self {
        Record::Annotation(a)
    }
}

impl From<BinaryRecord> for Record {
    fn from(b: BinaryRecord) -> Self {
        Record::Binary(b)
    }
}

impl From<MetaRecord> for Record {
    fn from(m: MetaRecord) -> Self {
        Record::Meta(m)
    }
}

/// Destination for records emitted by a decoder
pub trait RecordSink {
    fn put(&mut self, record: Record) -> WorkResult<()>;

    fn annotate(&mut self, class: usize, start: u64, end: u64, texts: Vec<String>) -> WorkResult<()> {
        self.put(Annotation::new(class, start, end, texts).into())
    }

    fn binary(&mut self, class: usize, position: u64, data: Vec<u8>) -> WorkResult<()> {
        self.put(BinaryRecord { class, position, data }.into())
    }

    fn meta(&mut self, start: u64, end: u64, value: f64, label: &'static str) -> WorkResult<()> {
        self.put(MetaRecord {
            start,
            end,
            value,
            label,
        }
        .into())
    }
}

impl RecordSink for Vec<Record> {
    fn put(&mut self, record: Record) -> WorkResult<()> {
        self.push(record);
        Ok(())
    }
}

/// Which level (and therefore which edge) is "asserted"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// Low level is asserted; falling edge starts a cycle
    ActiveLow,
    /// High level is asserted; rising edge starts a cycle
    ActiveHigh,
}

impl Polarity {
    /// Parse the `polarity` option value
    pub fn from_option(value: &str) -> Option<Self> {
        match value {
            "active-low" => Some(Polarity::ActiveLow),
            "active-high" => Some(Polarity::ActiveHigh),
            _ => None,
        }
    }

    /// Logic level of the asserted state
    pub fn active_level(self) -> bool {
        self == Polarity::ActiveHigh
    }
}

/// Event decoded by a one-wire network layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    /// Bus reset; `true` when a device answered with a presence pulse
    ResetPresence(bool),
    /// 64-bit ROM id selected by a ROM command
    Rom(u64),
    /// Transport byte after ROM selection
    Data(u8),
}

/// Upstream record consumed by decoders stacked on a one-wire network layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OneWireFrame {
    pub start: u64,
    pub end: u64,
    pub event: NetworkEvent,
}

impl OneWireFrame {
    pub fn reset(start: u64, end: u64, presence: bool) -> Self {
        Self {
            start,
            end,
            event: NetworkEvent::ResetPresence(presence),
        }
    }

    pub fn rom(start: u64, end: u64, rom: u64) -> Self {
        Self {
            start,
            end,
            event: NetworkEvent::Rom(rom),
        }
    }

    pub fn data(start: u64, end: u64, byte: u8) -> Self {
        Self {
            start,
            end,
            event: NetworkEvent::Data(byte),
        }
    }

    /// Reject frames a producer could not have emitted
    pub fn check(&self) -> WorkResult<()> {
        if self.start > self.end {
            return Err(WorkError::Defect(format!(
                "malformed one-wire frame: start {} after end {}",
                self.start, self.end
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_for_width_picks_first_fit() {
        let a = Annotation::new(
            0,
            10,
            20,
            vec!["Command: 0x0f".into(), "Cmd: 0f".into(), "0f".into()],
        );
        assert_eq!(a.text_for_width(80), "Command: 0x0f");
        assert_eq!(a.text_for_width(8), "Cmd: 0f");
        assert_eq!(a.text_for_width(2), "0f");
        assert_eq!(a.text_for_width(1), "0f");
    }

    #[test]
    fn test_vec_sink_collects_in_order() {
        let mut sink: Vec<Record> = Vec::new();
        sink.annotate(1, 0, 5, vec!["x".into()]).unwrap();
        sink.binary(0, 5, vec![0x80]).unwrap();
        sink.meta(0, 5, 50.0, "Average").unwrap();
        assert_eq!(sink.len(), 3);
        assert_eq!(sink[1].as_binary().unwrap().data, vec![0x80]);
        assert_eq!(sink[2].as_meta().unwrap().value, 50.0);
    }

    #[test]
    fn test_polarity_option() {
        assert_eq!(Polarity::from_option("active-low"), Some(Polarity::ActiveLow));
        assert!(Polarity::from_option("active-high").unwrap().active_level());
        assert_eq!(Polarity::from_option("high"), None);
    }

    #[test]
    fn test_malformed_frame_is_defect() {
        assert!(OneWireFrame::data(5, 9, 0xaa).check().is_ok());
        assert!(matches!(
            OneWireFrame::data(9, 5, 0xaa).check(),
            Err(WorkError::Defect(_))
        ));
    }
}
