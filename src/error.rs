//! Rich diagnostic error types for the conversion engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so callers know exactly
//! which document stage failed and why.

use miette::Diagnostic;
use thiserror::Error;

use crate::span::ContextKind;

/// Top-level error type for the conversion engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text, sources) through to the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum EnrichError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Span(#[from] SpanError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Skeleton(#[from] SkeletonError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    BackConvert(#[from] BackConvertError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Format(#[from] FormatError),
}

// ---------------------------------------------------------------------------
// Span errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SpanError {
    #[error("span [{begin}, {end}) violates the offset invariant for the {context} context of length {len}")]
    #[diagnostic(
        code(enrich::span::offset_invariant),
        help(
            "Every span must satisfy begin <= end <= length(context). \
             Spans are never clamped, since a shifted span would misalign every \
             annotation attached to it. Check that the unit records belong to \
             this skeleton context."
        )
    )]
    OffsetInvariantViolation {
        context: ContextKind,
        begin: usize,
        end: usize,
        len: usize,
    },
}

// ---------------------------------------------------------------------------
// Forward conversion errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SkeletonError {
    #[error("pointer [#${id}] in skeleton entry \"{entry}\" references an unregistered unit")]
    #[diagnostic(
        code(enrich::skeleton::malformed_pointer),
        help(
            "The document parser emitted a reference to a text unit it never produced. \
             This is a parser bug; the document cannot be converted."
        )
    )]
    MalformedPointer { id: String, entry: String },

    #[error("{count} pointer token(s) remain after resolution (first: \"{sample}\")")]
    #[diagnostic(
        code(enrich::skeleton::unresolved_pointer),
        help(
            "Pointer resolution finished with placeholders left in the skeleton. \
             This happens when text units reference each other in a cycle."
        )
    )]
    UnresolvedPointerRemaining { count: usize, sample: String },

    #[error("fragment \"{fragment}\" has an invalid inline code marker at character {position}")]
    #[diagnostic(
        code(enrich::skeleton::invalid_marker),
        help(
            "Every marker character in coded text must be followed by an index \
             character that refers to an entry of the fragment's code list."
        )
    )]
    InvalidMarker { fragment: String, position: usize },

    #[error("placement of unit \"{unit}\" at byte {offset} lies outside skeleton entry \"{entry}\"")]
    #[diagnostic(
        code(enrich::skeleton::placement),
        help("The unit's recorded offset does not address literal text of its entry.")
    )]
    Placement {
        unit: String,
        entry: String,
        offset: usize,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Span(#[from] SpanError),
}

// ---------------------------------------------------------------------------
// Back-conversion errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum BackConvertError {
    #[error("unit text at skeleton offset {begin} does not match: expected \"{expected}\", found \"{found}\"")]
    #[diagnostic(
        code(enrich::backconvert::text_mismatch),
        help(
            "The unit records were produced for a different skeleton context. \
             Pass the skeleton context from the same forward conversion."
        )
    )]
    UnitTextMismatch {
        begin: usize,
        expected: String,
        found: String,
    },

    #[error("skeleton span starting at {begin} overlaps the previous unit ending at {cursor}")]
    #[diagnostic(
        code(enrich::backconvert::overlap),
        help("Text units of one skeleton context never overlap; the unit list is corrupted.")
    )]
    OverlappingUnits { begin: usize, cursor: usize },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Span(#[from] SpanError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read converter config: {path}")]
    #[diagnostic(
        code(enrich::config::read),
        help("Ensure the config file exists and is valid TOML.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse converter config: {path}: {message}")]
    #[diagnostic(
        code(enrich::config::parse),
        help("Check the TOML syntax in the converter config file.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write converter config: {path}")]
    #[diagnostic(
        code(enrich::config::write),
        help("Ensure you have write permissions to the target directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown output encoding: \"{label}\"")]
    #[diagnostic(
        code(enrich::config::unknown_encoding),
        help(
            "Use utf-8, us-ascii, iso-8859-1, or any WHATWG encoding label \
             such as windows-1252 or shift_jis."
        )
    )]
    UnknownEncoding { label: String },
}

// ---------------------------------------------------------------------------
// Format errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum FormatError {
    #[error("unsupported document format: \"{format}\"")]
    #[diagnostic(
        code(enrich::format::unsupported),
        help(
            "Supported formats are: html, xml, xliff, and odt. \
             Pass a file extension or a MIME type such as text/html."
        )
    )]
    UnsupportedFormat { format: String },
}

/// Convenience alias for engine results.
pub type EnrichResult<T> = std::result::Result<T, EnrichError>;
