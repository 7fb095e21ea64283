//! Static decoder declarations and option resolution
//!
//! A [`Descriptor`] is what a host sees before running a decoder: channels,
//! options with their legal values, annotation classes and rows, binary
//! classes and the meta stream. [`OptionValues`] is the resolved, read-only
//! option set handed to the decoder once per run.

use crate::runtime::errors::ConfigError;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSpec {
    pub id: &'static str,
    pub name: &'static str,
    pub desc: &'static str,
}

/// Shape of an option value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionFormat {
    /// One of `OptionSpec::values`
    Choice,
    /// Exactly this many hex digits
    Hex(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionSpec {
    pub id: &'static str,
    pub desc: &'static str,
    pub default: &'static str,
    pub format: OptionFormat,
    /// Legal values of a `Choice` option
    pub values: &'static [&'static str],
}

impl OptionSpec {
    pub fn accepts(&self, value: &str) -> bool {
        match self.format {
            OptionFormat::Choice => self.values.contains(&value),
            OptionFormat::Hex(digits) => value.len() == digits && value.bytes().all(|b| b.is_ascii_hexdigit()),
        }
    }

    /// Human-readable description of the legal values
    pub fn allowed(&self) -> String {
        match self.format {
            OptionFormat::Choice => self.values.join(", "),
            OptionFormat::Hex(digits) => format!("{} hex digits", digits),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotationClass {
    pub id: &'static str,
    pub desc: &'static str,
}

/// Display row grouping annotation classes by index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotationRow {
    pub id: &'static str,
    pub desc: &'static str,
    pub classes: &'static [usize],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryClass {
    pub id: &'static str,
    pub desc: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaSpec {
    /// Value type of the measurement, e.g. "float"
    pub value_type: &'static str,
    pub label: &'static str,
    pub desc: &'static str,
}

/// Registration surface of a decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub id: &'static str,
    pub name: &'static str,
    pub longname: &'static str,
    pub desc: &'static str,
    pub license: &'static str,
    /// "logic" for raw samples, or the id of the upstream record stream
    pub inputs: &'static [&'static str],
    pub outputs: &'static [&'static str],
    pub channels: &'static [ChannelSpec],
    pub optional_channels: &'static [ChannelSpec],
    pub options: &'static [OptionSpec],
    pub annotations: &'static [AnnotationClass],
    pub annotation_rows: &'static [AnnotationRow],
    pub binary: &'static [BinaryClass],
    pub meta: Option<MetaSpec>,
}

impl Descriptor {
    pub fn option(&self, id: &str) -> Option<&'static OptionSpec> {
        self.options.iter().find(|o| o.id == id)
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len() + self.optional_channels.len()
    }

    /// Check the internal references of the declaration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let defect = |reason: String| ConfigError::Descriptor {
            decoder: self.id.to_string(),
            reason,
        };

        for row in self.annotation_rows {
            if let Some(&class) = row.classes.iter().find(|&&c| c >= self.annotations.len()) {
                return Err(defect(format!(
                    "row '{}' references annotation class {} of {}",
                    row.id,
                    class,
                    self.annotations.len()
                )));
            }
        }

        for option in self.options {
            if !option.accepts(option.default) {
                return Err(defect(format!(
                    "default '{}' of option '{}' is not a legal value",
                    option.default, option.id
                )));
            }
        }

        let mut ids: Vec<&str> = self
            .channels
            .iter()
            .chain(self.optional_channels)
            .map(|c| c.id)
            .collect();
        ids.sort_unstable();
        if ids.windows(2).any(|w| w[0] == w[1]) {
            return Err(defect("duplicate channel id".to_string()));
        }

        Ok(())
    }
}

/// Option values resolved against a descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionValues {
    values: BTreeMap<&'static str, String>,
}

impl OptionValues {
    /// Apply `overrides` on top of the descriptor defaults.
    ///
    /// Unknown option ids and values the option does not accept are rejected.
    pub fn resolve(descriptor: &Descriptor, overrides: &[(&str, &str)]) -> Result<Self, ConfigError> {
        let mut values: BTreeMap<&'static str, String> = descriptor
            .options
            .iter()
            .map(|o| (o.id, o.default.to_string()))
            .collect();

        for &(id, value) in overrides {
            let spec = descriptor.option(id).ok_or_else(|| ConfigError::UnknownOption {
                decoder: descriptor.id.to_string(),
                option: id.to_string(),
            })?;
            if !spec.accepts(value) {
                return Err(ConfigError::InvalidOptionValue {
                    option: id.to_string(),
                    value: value.to_string(),
                    allowed: spec.allowed(),
                });
            }
            values.insert(spec.id, value.to_string());
        }

        Ok(Self { values })
    }

    /// Defaults only
    pub fn defaults(descriptor: &Descriptor) -> Self {
        Self {
            values: descriptor
                .options
                .iter()
                .map(|o| (o.id, o.default.to_string()))
                .collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.values.get(id).map(String::as_str)
    }

    /// Value of an option the decoder itself declares
    pub fn require(&self, descriptor: &Descriptor, id: &str) -> Result<&str, ConfigError> {
        self.get(id).ok_or_else(|| ConfigError::UnknownOption {
            decoder: descriptor.id.to_string(),
            option: id.to_string(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.values.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST: Descriptor = Descriptor {
        id: "test",
        name: "Test",
        longname: "Test decoder",
        desc: "Declaration used by unit tests.",
        license: "gplv2+",
        inputs: &["logic"],
        outputs: &[],
        channels: &[ChannelSpec {
            id: "data",
            name: "Data",
            desc: "Data line",
        }],
        optional_channels: &[],
        options: &[
            OptionSpec {
                id: "polarity",
                desc: "Polarity",
                default: "active-high",
                format: OptionFormat::Choice,
                values: &["active-low", "active-high"],
            },
            OptionSpec {
                id: "key",
                desc: "Key",
                default: "0000",
                format: OptionFormat::Hex(4),
                values: &[],
            },
        ],
        annotations: &[
            AnnotationClass {
                id: "a",
                desc: "A",
            },
            AnnotationClass {
                id: "b",
                desc: "B",
            },
        ],
        annotation_rows: &[AnnotationRow {
            id: "all",
            desc: "All",
            classes: &[0, 1],
        }],
        binary: &[],
        meta: None,
    };

    #[test]
    fn test_defaults_and_overrides() {
        let opts = OptionValues::resolve(&TEST, &[]).unwrap();
        assert_eq!(opts.get("polarity"), Some("active-high"));

        let opts = OptionValues::resolve(&TEST, &[("polarity", "active-low"), ("key", "beEF")]).unwrap();
        assert_eq!(opts.get("polarity"), Some("active-low"));
        assert_eq!(opts.get("key"), Some("beEF"));
        assert_eq!(opts, {
            let mut o = OptionValues::defaults(&TEST);
            o.values.insert("polarity", "active-low".into());
            o.values.insert("key", "beEF".into());
            o
        });
    }

    #[test]
    fn test_unknown_option_rejected() {
        let err = OptionValues::resolve(&TEST, &[("speed", "fast")]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownOption { .. }));
    }

    #[test]
    fn test_illegal_value_rejected() {
        let err = OptionValues::resolve(&TEST, &[("polarity", "inverted")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidOptionValue {
                option: "polarity".into(),
                value: "inverted".into(),
                allowed: "active-low, active-high".into(),
            }
        );
    }

    #[test]
    fn test_hex_option_checked_on_resolve() {
        for bad in ["123", "12345", "12g4", "0x12"] {
            let err = OptionValues::resolve(&TEST, &[("key", bad)]).unwrap_err();
            assert_eq!(
                err,
                ConfigError::InvalidOptionValue {
                    option: "key".into(),
                    value: bad.into(),
                    allowed: "4 hex digits".into(),
                }
            );
        }
    }

    #[test]
    fn test_validate_catches_bad_row() {
        assert!(TEST.validate().is_ok());
        let broken = Descriptor {
            annotation_rows: &[AnnotationRow {
                id: "bad",
                desc: "Bad",
                classes: &[2],
            }],
            ..TEST
        };
        assert!(matches!(broken.validate(), Err(ConfigError::Descriptor { .. })));
    }

    #[test]
    fn test_validate_catches_bad_hex_default() {
        let broken = Descriptor {
            options: &[OptionSpec {
                id: "key",
                desc: "Key",
                default: "00",
                format: OptionFormat::Hex(4),
                values: &[],
            }],
            ..TEST
        };
        assert!(matches!(broken.validate(), Err(ConfigError::Descriptor { .. })));
    }

    #[test]
    fn test_validate_catches_bad_default() {
        let broken = Descriptor {
            options: &[OptionSpec {
                id: "polarity",
                desc: "Polarity",
                default: "both",
                format: OptionFormat::Choice,
                values: &["active-low", "active-high"],
            }],
            ..TEST
        };
        assert!(broken.validate().is_err());
    }
}
