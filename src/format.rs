//! Document format detection.
//!
//! The conversion core has no notion of MIME types; format requests are
//! checked here, before a parser is selected, and unsupported ones rejected.

use serde::{Deserialize, Serialize};

use crate::error::FormatError;

/// Document formats whose parsers produce the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Html,
    Xml,
    Xliff,
    Odt,
}

impl DocumentFormat {
    /// Human-readable name for diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Xml => "xml",
            Self::Xliff => "xliff",
            Self::Odt => "odt",
        }
    }

    /// Resolve a format request given as a name, file path, or MIME type.
    pub fn parse(request: &str) -> Result<Self, FormatError> {
        let lower = request.trim().to_lowercase();
        let by_name = match lower.as_str() {
            "html" | "htm" | "xhtml" => Some(Self::Html),
            "xml" => Some(Self::Xml),
            "xliff" | "xlf" => Some(Self::Xliff),
            "odt" => Some(Self::Odt),
            _ => None,
        };
        by_name
            .or_else(|| detect_format_from_content_type(&lower))
            .or_else(|| detect_format(&lower))
            .ok_or_else(|| FormatError::UnsupportedFormat {
                format: request.to_string(),
            })
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detect the document format from a file extension.
pub fn detect_format(path: &str) -> Option<DocumentFormat> {
    let lower = path.to_lowercase();
    if lower.ends_with(".html") || lower.ends_with(".htm") || lower.ends_with(".xhtml") {
        Some(DocumentFormat::Html)
    } else if lower.ends_with(".xlf") || lower.ends_with(".xliff") {
        Some(DocumentFormat::Xliff)
    } else if lower.ends_with(".xml") {
        Some(DocumentFormat::Xml)
    } else if lower.ends_with(".odt") {
        Some(DocumentFormat::Odt)
    } else {
        None
    }
}

/// Detect the document format from an HTTP Content-Type header value.
pub fn detect_format_from_content_type(content_type: &str) -> Option<DocumentFormat> {
    let ct = content_type.to_lowercase();
    if ct.contains("text/html") || ct.contains("application/xhtml") {
        Some(DocumentFormat::Html)
    } else if ct.contains("application/x-xliff") || ct.contains("application/xliff") {
        Some(DocumentFormat::Xliff)
    } else if ct.contains("application/vnd.oasis.opendocument.text") {
        Some(DocumentFormat::Odt)
    } else if ct.contains("text/xml") || ct.contains("application/xml") {
        Some(DocumentFormat::Xml)
    } else {
        None
    }
}
