//! Converter configuration, persisted as TOML.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Settings shared by forward and back conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Encoding of the reconstructed document. Characters it cannot represent
    /// are written as numeric character references in the skeleton.
    #[serde(default = "default_output_encoding")]
    pub output_encoding: String,
    /// NFC-normalize text runs before offsets are computed.
    #[serde(default = "default_normalize_nfc")]
    pub normalize_nfc: bool,
    /// Element used to wrap annotated text that has no enclosing element.
    #[serde(default = "default_wrapper_element")]
    pub wrapper_element: String,
    /// Prefix of the secondary attribute listing all grouped values.
    #[serde(default = "default_group_prefix")]
    pub group_prefix: String,
}

fn default_output_encoding() -> String {
    "utf-8".into()
}
fn default_normalize_nfc() -> bool {
    true
}
fn default_wrapper_element() -> String {
    "span".into()
}
fn default_group_prefix() -> String {
    "data-".into()
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            output_encoding: default_output_encoding(),
            normalize_nfc: default_normalize_nfc(),
            wrapper_element: default_wrapper_element(),
            group_prefix: default_group_prefix(),
        }
    }
}

impl ConverterConfig {
    /// Resolve the configured output encoding.
    pub fn target_encoding(&self) -> ConfigResult<TargetEncoding> {
        TargetEncoding::from_label(&self.output_encoding)
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml(&content, &path.display().to_string())
    }

    /// Parse TOML text; `origin` names the source in diagnostics.
    pub fn from_toml(content: &str, origin: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        config.target_encoding()?;
        Ok(config)
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                    path: parent.display().to_string(),
                    source: e,
                })?;
            }
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }
}

/// The character repertoire of the output document.
#[derive(Debug, Clone, Copy)]
pub enum TargetEncoding {
    /// Any Unicode encoding; every character passes through.
    Unicode,
    Ascii,
    Latin1,
    /// A legacy encoding known to `encoding_rs`.
    Legacy(&'static encoding_rs::Encoding),
}

impl TargetEncoding {
    pub fn from_label(label: &str) -> ConfigResult<Self> {
        let normalized = label.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "utf-8" | "utf8" | "utf-16" | "utf-16le" | "utf-16be" => Ok(Self::Unicode),
            "us-ascii" | "ascii" => Ok(Self::Ascii),
            "iso-8859-1" | "latin1" | "latin-1" => Ok(Self::Latin1),
            other => encoding_rs::Encoding::for_label(other.as_bytes())
                .map(|enc| {
                    if enc.output_encoding() == encoding_rs::UTF_8 {
                        Self::Unicode
                    } else {
                        Self::Legacy(enc)
                    }
                })
                .ok_or_else(|| ConfigError::UnknownEncoding {
                    label: label.to_string(),
                }),
        }
    }

    /// Whether `c` can be written literally in this encoding.
    pub fn can_encode(&self, c: char) -> bool {
        match self {
            Self::Unicode => true,
            Self::Ascii => c.is_ascii(),
            Self::Latin1 => (c as u32) <= 0xFF,
            Self::Legacy(enc) => {
                if c.is_ascii() {
                    return true;
                }
                let mut buf = [0u8; 4];
                let (_, _, had_errors) = enc.encode(c.encode_utf8(&mut buf));
                !had_errors
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = ConverterConfig::from_toml("wrapper_element = \"mark\"\n", "inline").unwrap();
        assert_eq!(config.wrapper_element, "mark");
        assert_eq!(config.output_encoding, "utf-8");
        assert!(config.normalize_nfc);
        assert_eq!(config.group_prefix, "data-");
    }

    #[test]
    fn unknown_encoding_is_rejected() {
        let err = ConverterConfig::from_toml("output_encoding = \"klingon-8\"\n", "inline")
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownEncoding { .. }));
    }

    #[test]
    fn encodability() {
        let ascii = TargetEncoding::from_label("US-ASCII").unwrap();
        assert!(ascii.can_encode('a'));
        assert!(!ascii.can_encode('é'));

        let latin1 = TargetEncoding::from_label("latin1").unwrap();
        assert!(latin1.can_encode('é'));
        assert!(!latin1.can_encode('€'));

        let cp1252 = TargetEncoding::from_label("windows-1252").unwrap();
        assert!(cp1252.can_encode('€'));
        assert!(!cp1252.can_encode('日'));

        assert!(TargetEncoding::from_label("utf-8").unwrap().can_encode('日'));
    }
}
