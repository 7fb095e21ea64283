//! Text rendering for decoder output
//!
//! Annotations carry several text variants ordered from most to least
//! detailed; hosts pick one with [`Annotation::text_for_width`].
//!
//! [`Annotation::text_for_width`]: super::types::Annotation::text_for_width

use super::ir::ProtocolResult;
use crate::runtime::errors::ConfigError;

/// Duty cycle percentage, six decimals
pub fn duty_text(percent: f64) -> String {
    format!("{:.6}%", percent)
}

/// Period with an auto-scaled time unit.
///
/// Zero and anything from one second upwards stay in seconds; smaller
/// values step down in powers of 1000.
pub fn period_text(seconds: f64) -> String {
    if seconds == 0.0 || seconds >= 1.0 {
        format!("{:.1} s", seconds)
    } else if seconds <= 1e-12 {
        format!("{:.1} fs", seconds * 1e15)
    } else if seconds <= 1e-9 {
        format!("{:.1} ps", seconds * 1e12)
    } else if seconds <= 1e-6 {
        format!("{:.1} ns", seconds * 1e9)
    } else if seconds <= 1e-3 {
        format!("{:.1} μs", seconds * 1e6)
    } else {
        format!("{:.1} ms", seconds * 1e3)
    }
}

/// Flag word index within a vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKind {
    Repeat = 0,
    Release = 1,
}

/// Flag words keyed by (vocabulary, kind)
pub const FLAG_WORDS: [[&str; 2]; 3] = [["repeat", "release"], ["rep", "rel"], ["r", "R"]];

/// Number of IR text variants
pub const IR_TIERS: usize = 5;

/// Vocabulary used by each IR text tier; `None` for tiers without flags
pub const TIER_VOCABULARY: [Option<usize>; IR_TIERS] = [Some(0), Some(1), Some(1), Some(2), None];

const _: () = {
    let mut i = 0;
    while i < IR_TIERS {
        if let Some(vocab) = TIER_VOCABULARY[i] {
            assert!(vocab < FLAG_WORDS.len(), "tier references a missing flag vocabulary");
        }
        i += 1;
    }
};

/// Check that the tier table and the flag vocabularies line up.
///
/// Every vocabulary must be referenced by at least one tier and no tier may
/// reference a vocabulary that does not exist.
pub fn check_flag_table() -> Result<(), ConfigError> {
    let defect = |reason: String| ConfigError::Descriptor {
        decoder: "ir_irmp".to_string(),
        reason,
    };

    let mut used = [false; FLAG_WORDS.len()];
    for (tier, vocab) in TIER_VOCABULARY.iter().enumerate() {
        if let Some(vocab) = *vocab {
            let slot = used
                .get_mut(vocab)
                .ok_or_else(|| defect(format!("tier {} references flag vocabulary {}", tier, vocab)))?;
            *slot = true;
        }
    }
    if let Some(unused) = used.iter().position(|u| !u) {
        return Err(defect(format!("flag vocabulary {} is not referenced by any tier", unused)));
    }
    Ok(())
}

/// Flag words of one vocabulary joined by spaces, `-` when no flag is set
pub fn flag_text(vocab: usize, repeat: bool, release: bool) -> String {
    let words = &FLAG_WORDS[vocab];
    let mut parts = Vec::with_capacity(2);
    if repeat {
        parts.push(words[FlagKind::Repeat as usize]);
    }
    if release {
        parts.push(words[FlagKind::Release as usize]);
    }
    if parts.is_empty() {
        "-".to_string()
    } else {
        parts.join(" ")
    }
}

/// The five IR text variants for one frame
pub fn ir_texts(frame: &ProtocolResult) -> Vec<String> {
    let flags: Vec<String> = TIER_VOCABULARY
        .iter()
        .map(|vocab| match vocab {
            Some(v) => flag_text(*v, frame.repeat, frame.release),
            None => String::new(),
        })
        .collect();
    let (name, nr, addr, cmd) = (&frame.protocol_name, frame.protocol_id, frame.address, frame.command);

    vec![
        format!(
            "Protocol: {} ({}), Address 0x{:04x}, Command: 0x{:04x}, Flags: {}",
            name, nr, addr, cmd, flags[0]
        ),
        format!("P: {} ({}), Addr: 0x{:x}, Cmd: 0x{:x}, Flg: {}", name, nr, addr, cmd, flags[1]),
        format!("P: {} A: 0x{:x} C: 0x{:x} F: {}", nr, addr, cmd, flags[2]),
        format!("C:{:x} A:{:x} {}", cmd, addr, flags[3]),
        format!("C:{:x}", cmd),
    ]
}

/// Hex dump used for multi-byte DS2432 fields
pub fn hex_bytes(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
