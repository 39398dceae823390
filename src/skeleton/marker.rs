//! Marker resolution: one fragment's coded text to skeleton pieces.
//!
//! The coded text is scanned character by character. Text between markers is
//! NFC-normalized and escaped into runs; each marker contributes its code's
//! markup verbatim. Opening codes that carry annotations start an annotated
//! sub-run, which is emitted when the matching closing code arrives, or when
//! an isolated code interrupts it.

use unicode_normalization::UnicodeNormalization;

use crate::annotation::InlineAnnotation;
use crate::config::TargetEncoding;
use crate::error::SkeletonError;
use crate::event::{CodeKind, CodedText, index_of, is_marker};

/// One piece of a resolved fragment, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    /// An escaped, normalized text run.
    Text(String),
    /// Inline code markup, written to the skeleton as-is.
    Markup(String),
}

/// An annotated sub-run, in byte offsets over the concatenated text runs.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalAnnotation {
    pub start: usize,
    pub end: usize,
    pub annotations: Vec<InlineAnnotation>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedText {
    pub pieces: Vec<Piece>,
    pub annotations: Vec<LocalAnnotation>,
}

impl ResolvedText {
    pub fn run_count(&self) -> usize {
        self.pieces
            .iter()
            .filter(|p| matches!(p, Piece::Text(_)))
            .count()
    }
}

struct OpenRun {
    code_id: u32,
    start: usize,
    annotations: Vec<InlineAnnotation>,
}

fn close_run(opened: OpenRun, end: usize, annotations: &mut Vec<LocalAnnotation>) {
    // Zero-width runs carry nothing to anchor.
    if end > opened.start && !opened.annotations.is_empty() {
        annotations.push(LocalAnnotation {
            start: opened.start,
            end,
            annotations: opened.annotations,
        });
    }
}

/// Resolves coded text for a given output encoding.
#[derive(Debug, Clone, Copy)]
pub struct MarkerResolver {
    encoding: TargetEncoding,
    normalize: bool,
}

impl MarkerResolver {
    pub fn new(encoding: TargetEncoding, normalize: bool) -> Self {
        Self {
            encoding,
            normalize,
        }
    }

    pub fn resolve(&self, fragment: &str, coded: &CodedText) -> Result<ResolvedText, SkeletonError> {
        let mut resolved = ResolvedText::default();
        let mut run = String::new();
        let mut text_len = 0usize;
        let mut open: Vec<OpenRun> = Vec::new();

        let mut chars = coded.text.chars().enumerate();
        while let Some((position, c)) = chars.next() {
            if !is_marker(c) {
                run.push(c);
                continue;
            }

            text_len += self.flush(&mut run, &mut resolved.pieces);

            let invalid = || SkeletonError::InvalidMarker {
                fragment: fragment.to_string(),
                position,
            };
            let index = chars.next().and_then(|(_, ic)| index_of(ic)).ok_or_else(invalid)?;
            let code = coded.codes.get(index).ok_or_else(invalid)?;

            match CodeKind::from_marker(c).unwrap_or(code.kind) {
                CodeKind::Opening => open.push(OpenRun {
                    code_id: code.id,
                    start: text_len,
                    annotations: code.annotations.clone(),
                }),
                CodeKind::Closing => {
                    if let Some(at) = open.iter().rposition(|o| o.code_id == code.id) {
                        let mut opened = open.remove(at);
                        opened.annotations.extend(code.annotations.iter().cloned());
                        close_run(opened, text_len, &mut resolved.annotations);
                    } else {
                        tracing::debug!(fragment, code = code.id, "closing code without opening");
                    }
                }
                CodeKind::Isolated => {
                    if let Some(at) = open.iter().rposition(|o| !o.annotations.is_empty()) {
                        close_run(open.remove(at), text_len, &mut resolved.annotations);
                    }
                }
            }

            if !code.data.is_empty() {
                resolved.pieces.push(Piece::Markup(code.data.clone()));
            }
        }
        self.flush(&mut run, &mut resolved.pieces);

        Ok(resolved)
    }

    /// Escape text for the skeleton: markup-significant characters become
    /// entity references, unencodable ones numeric character references.
    pub fn escape(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '<' => out.push_str("&lt;"),
                '&' => out.push_str("&amp;"),
                '\r' => out.push_str("&#13;"),
                '"' => out.push_str("&quot;"),
                c if self.encoding.can_encode(c) => out.push(c),
                c => out.push_str(&format!("&#x{:X};", c as u32)),
            }
        }
        out
    }

    /// Turn the pending raw run into a text piece; returns its escaped length.
    fn flush(&self, run: &mut String, pieces: &mut Vec<Piece>) -> usize {
        if run.is_empty() {
            return 0;
        }
        let escaped = if self.normalize {
            let normalized: String = run.nfc().collect();
            self.escape(&normalized)
        } else {
            self.escape(run)
        };
        run.clear();
        let len = escaped.len();
        pieces.push(Piece::Text(escaped));
        len
    }
}
