//! Addressable ranges over the skeleton and plain-text contexts.
//!
//! All exported offsets count Unicode scalar values, so annotation producers
//! working in any language address the same characters. Internally the engine
//! works on byte offsets and converts through [`CharIndex`].

use serde::{Deserialize, Serialize};

use crate::annotation::InlineAnnotation;
use crate::error::SpanError;

/// Which of the two text contexts a span addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    Skeleton,
    PlainText,
}

impl ContextKind {
    /// Human-readable name for diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skeleton => "skeleton",
            Self::PlainText => "plain-text",
        }
    }
}

impl std::fmt::Display for ContextKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A half-open range `[begin, end)` into exactly one context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub begin: usize,
    pub end: usize,
    /// Language of the addressed text, when the source document declared one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

impl Span {
    pub fn new(begin: usize, end: usize) -> Self {
        Self {
            begin,
            end,
            locale: None,
        }
    }

    pub fn with_locale(mut self, locale: Option<String>) -> Self {
        self.locale = locale;
        self
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.begin)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.begin
    }

    /// Same range, ignoring the locale tag.
    pub fn same_range(&self, other: &Span) -> bool {
        self.begin == other.begin && self.end == other.end
    }

    /// Whether `other` lies fully inside this span.
    pub fn contains(&self, other: &Span) -> bool {
        self.begin <= other.begin && other.end <= self.end
    }

    /// Check `begin <= end <= context_len`.
    ///
    /// Violations are reported, never clamped.
    pub fn validate(&self, context: ContextKind, context_len: usize) -> Result<(), SpanError> {
        if self.begin <= self.end && self.end <= context_len {
            Ok(())
        } else {
            Err(SpanError::OffsetInvariantViolation {
                context,
                begin: self.begin,
                end: self.end,
                len: context_len,
            })
        }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.begin, self.end)
    }
}

/// One in-context text unit as exposed to annotation consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextUnitRecord {
    /// Position in the plain-text context.
    pub plain: Span,
    /// Position in the skeleton context (`convertedFrom`); absent when the
    /// unit never reached the skeleton.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skeleton: Option<Span>,
    /// The unit's text, identical in both contexts.
    pub text: String,
}

/// A set of inline annotations attached to a plain-text span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedSpan {
    pub span: Span,
    /// Accepts category-tagged entries and logical key/value statement maps.
    #[serde(deserialize_with = "crate::annotation::deserialize_annotations")]
    pub annotations: Vec<InlineAnnotation>,
}

impl AnnotatedSpan {
    pub fn new(span: Span, annotations: Vec<InlineAnnotation>) -> Self {
        Self { span, annotations }
    }
}

/// Character/byte offset conversion table for one string.
#[derive(Debug, Clone)]
pub struct CharIndex {
    /// Byte offset of every character, followed by the total byte length.
    boundaries: Vec<usize>,
}

impl CharIndex {
    pub fn new(text: &str) -> Self {
        let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        boundaries.push(text.len());
        Self { boundaries }
    }

    /// Length of the indexed string in characters.
    pub fn char_len(&self) -> usize {
        self.boundaries.len() - 1
    }

    /// Byte offset of the given character offset.
    pub fn byte_offset(&self, char_offset: usize) -> Option<usize> {
        self.boundaries.get(char_offset).copied()
    }

    /// Character offset of a byte offset that falls on a character boundary.
    pub fn char_offset(&self, byte_offset: usize) -> Option<usize> {
        self.boundaries.binary_search(&byte_offset).ok()
    }
}

/// Number of characters in `text`.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_in_range() {
        assert!(Span::new(0, 0).validate(ContextKind::Skeleton, 0).is_ok());
        assert!(Span::new(2, 5).validate(ContextKind::PlainText, 5).is_ok());
    }

    #[test]
    fn validate_rejects_without_clamping() {
        let err = Span::new(3, 9)
            .validate(ContextKind::PlainText, 5)
            .unwrap_err();
        match err {
            SpanError::OffsetInvariantViolation { begin, end, len, .. } => {
                assert_eq!((begin, end, len), (3, 9, 5));
            }
        }
        assert!(Span::new(4, 2).validate(ContextKind::Skeleton, 10).is_err());
    }

    #[test]
    fn containment_and_range_equality() {
        let outer = Span::new(2, 10);
        assert!(outer.contains(&Span::new(2, 10)));
        assert!(outer.contains(&Span::new(4, 6)));
        assert!(!outer.contains(&Span::new(1, 6)));
        let tagged = Span::new(2, 10).with_locale(Some("de".into()));
        assert!(outer.same_range(&tagged));
        assert_ne!(outer, tagged);
    }

    #[test]
    fn char_index_round_trips_multibyte() {
        let index = CharIndex::new("Grüße!");
        assert_eq!(index.char_len(), 6);
        assert_eq!(index.byte_offset(3), Some(4));
        assert_eq!(index.char_offset(4), Some(3));
        assert_eq!(index.char_offset(3), None); // inside 'ü'
        assert_eq!(index.byte_offset(6), Some("Grüße!".len()));
        assert_eq!(index.byte_offset(7), None);
    }
}
