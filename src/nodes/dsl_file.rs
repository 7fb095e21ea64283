//! DSLogic `.dsl` capture loader
//!
//! A `.dsl` file is a ZIP archive holding a `header` text file and one
//! bit-packed entry per probe and block, named `L-{probe}/{block}`. Bit `i`
//! of a block (LSB first within each byte) is the probe's level at sample
//! `block * samples_per_block + i`. Every block except the last has the same
//! size, so the size of `L-0/0` gives the block length.
//!
//! [`DslCapture`] interleaves the probes into packed sample units and hands
//! them to a [`LogicSource`].

use super::logic_source::LogicSource;
use crate::{CaptureError, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use tracing::{debug, info};
use zip::ZipArchive;

/// Header information from a DSL file
#[derive(Debug, Clone)]
pub struct DslHeader {
    /// Total number of probes/channels
    pub total_probes: usize,
    /// Sample rate as written in the file (e.g., "50 MHz")
    pub samplerate: String,
    /// Sample rate in Hz
    pub samplerate_hz: u64,
    /// Total number of samples captured
    pub total_samples: u64,
    /// Total number of data blocks per probe
    pub total_blocks: u64,
    /// Samples per full block
    pub samples_per_block: u64,
    /// Probe names indexed by probe number (0-based)
    pub probe_names: Vec<String>,
}

/// A fully loaded capture, packed `unit_size` bytes per sample
#[derive(Debug, Clone)]
pub struct DslCapture {
    header: DslHeader,
    unit_size: usize,
    data: Vec<u8>,
}

impl DslCapture {
    /// Load a capture file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    /// Load a capture from any seekable archive stream
    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let header = parse_header(&mut archive)?;
        let unit_size = header.total_probes.div_ceil(8).max(1);
        let total = usize::try_from(header.total_samples)
            .map_err(|_| CaptureError::ParseHeader(format!("capture too large: {} samples", header.total_samples)))?;
        let mut data = vec![0u8; total * unit_size];

        for probe in 0..header.total_probes {
            for block in 0..header.total_blocks {
                let base = block * header.samples_per_block;
                if base >= header.total_samples {
                    break;
                }
                let bits = read_entry(&mut archive, &format!("L-{}/{}", probe, block))
                    .map_err(|_| CaptureError::InvalidBlock(block))?;
                let count = ((bits.len() * 8) as u64).min(header.total_samples - base) as usize;
                for i in 0..count {
                    if get_bit(&bits, i) {
                        let position = base as usize + i;
                        data[position * unit_size + probe / 8] |= 1 << (probe % 8);
                    }
                }
            }
            debug!("Loaded probe {} ({})", probe, header.probe_names[probe]);
        }

        info!(
            "Loaded capture: {} probes, {} samples at {}",
            header.total_probes, header.total_samples, header.samplerate
        );
        Ok(Self {
            header,
            unit_size,
            data,
        })
    }

    pub fn header(&self) -> &DslHeader {
        &self.header
    }

    /// Sample rate in Hz, for the decoder metadata callback
    pub fn samplerate(&self) -> u64 {
        self.header.samplerate_hz
    }

    pub fn total_samples(&self) -> u64 {
        self.header.total_samples
    }

    pub fn unit_size(&self) -> usize {
        self.unit_size
    }

    /// Total capture duration in seconds
    pub fn capture_duration(&self) -> f64 {
        self.header.total_samples as f64 / self.header.samplerate_hz as f64
    }

    /// Probe number carrying `name`
    pub fn probe_index(&self, name: &str) -> Option<usize> {
        self.header.probe_names.iter().position(|n| n == name)
    }

    /// Level of one probe at one sample position
    pub fn level(&self, probe: usize, position: u64) -> Result<bool> {
        if probe >= self.header.total_probes {
            return Err(CaptureError::InvalidProbe(probe));
        }
        if position >= self.header.total_samples {
            return Err(CaptureError::OutOfBounds(position));
        }
        let byte = self.data[position as usize * self.unit_size + probe / 8];
        Ok((byte >> (probe % 8)) & 1 == 1)
    }

    /// Stream the capture through a pipeline
    pub fn into_source(self) -> LogicSource {
        LogicSource::new(self.data, self.unit_size).with_name("dsl_capture")
    }
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Vec<u8>> {
    let mut file = archive.by_name(name)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(buf)
}

fn parse_header<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<DslHeader> {
    let content = read_entry(archive, "header")
        .map_err(|e| CaptureError::ParseHeader(format!("Cannot read header file: {}", e)))?;
    let content = String::from_utf8_lossy(&content);

    let mut total_probes: Option<usize> = None;
    let mut samplerate: Option<String> = None;
    let mut total_samples: Option<u64> = None;
    let mut total_blocks: Option<u64> = None;
    let mut probe_names_map: HashMap<usize, String> = HashMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(value) = line.strip_prefix("total probes = ") {
            total_probes = value.parse().ok();
        } else if let Some(value) = line.strip_prefix("samplerate = ") {
            samplerate = Some(value.to_string());
        } else if let Some(value) = line.strip_prefix("total samples = ") {
            total_samples = value.parse().ok();
        } else if let Some(value) = line.strip_prefix("total blocks = ") {
            total_blocks = value.parse().ok();
        } else if line.starts_with("probe")
            && let Some((probe_part, name)) = line.split_once(" = ")
            && let Some(num_str) = probe_part.strip_prefix("probe")
            && let Ok(probe_num) = num_str.parse::<usize>()
        {
            probe_names_map.insert(probe_num, name.to_string());
        }
    }

    let total_probes = total_probes.ok_or_else(|| CaptureError::MissingField("total probes".to_string()))?;
    let samplerate = samplerate.ok_or_else(|| CaptureError::MissingField("samplerate".to_string()))?;
    let total_samples = total_samples.ok_or_else(|| CaptureError::MissingField("total samples".to_string()))?;
    let total_blocks = total_blocks.ok_or_else(|| CaptureError::MissingField("total blocks".to_string()))?;

    let samplerate_hz = parse_sample_rate(&samplerate)
        .ok_or_else(|| CaptureError::ParseHeader(format!("Invalid sample rate: {}", samplerate)))?;
    if total_probes == 0 {
        return Err(CaptureError::ParseHeader("capture has no probes".to_string()));
    }

    let samples_per_block = read_entry(archive, "L-0/0")
        .map_err(|_| CaptureError::ParseHeader("Could not read first block".to_string()))?
        .len() as u64
        * 8;
    if samples_per_block == 0 && total_samples > 0 {
        return Err(CaptureError::ParseHeader("first block is empty".to_string()));
    }

    debug!(
        "File has {} samples across {} blocks ({} samples/block)",
        total_samples, total_blocks, samples_per_block
    );

    let probe_names = (0..total_probes)
        .map(|i| probe_names_map.get(&i).cloned().unwrap_or_else(|| format!("Probe{}", i)))
        .collect();

    Ok(DslHeader {
        total_probes,
        samplerate,
        samplerate_hz,
        total_samples,
        total_blocks,
        samples_per_block,
        probe_names,
    })
}

/// Extract a single bit from a byte array at the given bit index
#[inline]
fn get_bit(data: &[u8], bit_index: usize) -> bool {
    data.get(bit_index / 8)
        .is_some_and(|byte| (byte >> (bit_index % 8)) & 1 == 1)
}

/// Parse a sample rate string (e.g., "50 MHz") into Hz
pub fn parse_sample_rate(samplerate: &str) -> Option<u64> {
    let parts: Vec<&str> = samplerate.split_whitespace().collect();
    if parts.len() >= 2
        && let Ok(value) = parts[0].parse::<f64>()
    {
        let multiplier = match parts[1] {
            "GHz" => 1_000_000_000.0,
            "MHz" => 1_000_000.0,
            "KHz" | "kHz" => 1_000.0,
            "Hz" => 1.0,
            _ => return None,
        };
        let hz = (value * multiplier).round();
        if hz.is_finite() && hz > 0.0 {
            return Some(hz as u64);
        }
    }
    None
}
