//! Structural event stream produced by the format-specific document parser.
//!
//! The parser (HTML, XML, XLIFF, ODT) is an external collaborator; this module
//! only defines the events it hands over. Every event type is serde
//! (de)serializable so event streams can be stored and replayed as JSON.
//!
//! Inline markup inside a text fragment is carried as *coded text*: the text
//! interleaved with marker characters, each followed by one index character
//! pointing into the fragment's code list.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::annotation::InlineAnnotation;

/// Marker for an opening inline code.
pub const MARKER_OPENING: char = '\u{E101}';
/// Marker for a closing inline code.
pub const MARKER_CLOSING: char = '\u{E102}';
/// Marker for an isolated (self-contained) inline code.
pub const MARKER_ISOLATED: char = '\u{E103}';

const INDEX_BASE: u32 = 0xE110;
const INDEX_LAST: u32 = 0xF8FF;

/// Whether `c` is one of the three marker characters.
pub fn is_marker(c: char) -> bool {
    matches!(c, MARKER_OPENING | MARKER_CLOSING | MARKER_ISOLATED)
}

/// Encode a code-list index as the character following a marker.
pub fn index_char(index: usize) -> Option<char> {
    let value = INDEX_BASE.checked_add(u32::try_from(index).ok()?)?;
    if value > INDEX_LAST {
        return None;
    }
    char::from_u32(value)
}

/// Decode the code-list index carried by the character following a marker.
pub fn index_of(c: char) -> Option<usize> {
    let value = c as u32;
    if (INDEX_BASE..=INDEX_LAST).contains(&value) {
        Some((value - INDEX_BASE) as usize)
    } else {
        None
    }
}

/// Role of an inline code in its fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeKind {
    Opening,
    Closing,
    Isolated,
}

impl CodeKind {
    pub fn marker(self) -> char {
        match self {
            Self::Opening => MARKER_OPENING,
            Self::Closing => MARKER_CLOSING,
            Self::Isolated => MARKER_ISOLATED,
        }
    }

    pub fn from_marker(c: char) -> Option<Self> {
        match c {
            MARKER_OPENING => Some(Self::Opening),
            MARKER_CLOSING => Some(Self::Closing),
            MARKER_ISOLATED => Some(Self::Isolated),
            _ => None,
        }
    }
}

/// One inline code: a piece of markup inside a text fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineCode {
    /// Pairing id: an opening and its closing code share the same id.
    pub id: u32,
    pub kind: CodeKind,
    /// The literal markup, written verbatim into the skeleton. May contain
    /// pointer tokens referencing other fragments (e.g. attribute values).
    #[serde(default)]
    pub data: String,
    /// Annotations the source markup already carries for the enclosed run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<InlineAnnotation>,
}

/// Text interleaved with inline code markers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodedText {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub codes: Vec<InlineCode>,
}

impl CodedText {
    /// Coded text without any inline codes.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            codes: Vec::new(),
        }
    }

    pub fn builder() -> CodedTextBuilder {
        CodedTextBuilder::default()
    }
}

/// Incremental construction of [`CodedText`], keeping code ids paired.
#[derive(Debug, Default)]
pub struct CodedTextBuilder {
    text: String,
    codes: Vec<InlineCode>,
    next_id: u32,
    open: Vec<u32>,
}

impl CodedTextBuilder {
    pub fn text(mut self, text: &str) -> Self {
        self.text.push_str(text);
        self
    }

    /// Open an inline code; `annotations` apply to the run it encloses.
    pub fn open(mut self, data: &str, annotations: Vec<InlineAnnotation>) -> Self {
        self.next_id += 1;
        let id = self.next_id;
        self.open.push(id);
        self.push_code(id, CodeKind::Opening, data, annotations);
        self
    }

    /// Close the most recently opened code.
    pub fn close(mut self, data: &str) -> Self {
        let id = match self.open.pop() {
            Some(id) => id,
            None => {
                self.next_id += 1;
                self.next_id
            }
        };
        self.push_code(id, CodeKind::Closing, data, Vec::new());
        self
    }

    pub fn isolated(mut self, data: &str) -> Self {
        self.next_id += 1;
        let id = self.next_id;
        self.push_code(id, CodeKind::Isolated, data, Vec::new());
        self
    }

    pub fn build(self) -> CodedText {
        CodedText {
            text: self.text,
            codes: self.codes,
        }
    }

    fn push_code(&mut self, id: u32, kind: CodeKind, data: &str, annotations: Vec<InlineAnnotation>) {
        let index = self.codes.len();
        self.text.push(kind.marker());
        // Index space covers several thousand codes per fragment.
        if let Some(c) = index_char(index) {
            self.text.push(c);
        }
        self.codes.push(InlineCode {
            id,
            kind,
            data: data.to_string(),
            annotations,
        });
    }
}

/// What a fragment represents in the source document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    /// Regular flowing text (paragraphs, headings, cells).
    #[default]
    Block,
    /// An attribute value (`alt`, `title`, ...). Only reachable through a
    /// pointer and never part of the plain-text context.
    Attribute,
    /// Text nested inside another fragment's markup (footnotes, inline
    /// sub-flows). Only reachable through a pointer, part of the plain text.
    Subflow,
}

impl FragmentKind {
    /// Whether the fragment is stored for pointer substitution instead of
    /// being emitted in document order.
    pub fn is_referent(self) -> bool {
        matches!(self, Self::Attribute | Self::Subflow)
    }

    pub fn include_in_context(self) -> bool {
        !matches!(self, Self::Attribute)
    }
}

/// A translatable text fragment with its skeleton template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFragment {
    pub id: String,
    /// Markup surrounding the fragment, with `[#$$self$]` where its text goes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skeleton: Option<String>,
    pub coded_text: CodedText,
    #[serde(default)]
    pub kind: FragmentKind,
}

impl TextFragment {
    pub fn block(id: impl Into<String>, skeleton: Option<&str>, coded_text: CodedText) -> Self {
        Self {
            id: id.into(),
            skeleton: skeleton.map(str::to_string),
            coded_text,
            kind: FragmentKind::Block,
        }
    }

    pub fn referent(id: impl Into<String>, kind: FragmentKind, coded_text: CodedText) -> Self {
        Self {
            id: id.into(),
            skeleton: None,
            coded_text,
            kind,
        }
    }
}

/// Markup with no extractable text, possibly carrying property placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkeletonPart {
    pub id: String,
    pub skeleton: String,
    /// Named properties of the source node, substituted for
    /// `[#$$self$@%<name>]` placeholders.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl SkeletonPart {
    pub fn new(id: impl Into<String>, skeleton: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            skeleton: skeleton.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

/// One event of the parser's structural stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DocumentEvent {
    StartDocument {
        #[serde(default)]
        locale: Option<String>,
        #[serde(default)]
        name: Option<String>,
    },
    TextFragment(TextFragment),
    SkeletonPart(SkeletonPart),
    EndDocument {
        #[serde(default)]
        final_skeleton: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_chars_round_trip() {
        for i in [0usize, 1, 17, 500] {
            let c = index_char(i).unwrap();
            assert!(!is_marker(c));
            assert_eq!(index_of(c), Some(i));
        }
        assert_eq!(index_of('a'), None);
        assert_eq!(index_char(100_000), None);
    }

    #[test]
    fn builder_pairs_codes() {
        let coded = CodedText::builder()
            .text("Hello ")
            .open("<b>", Vec::new())
            .text("World")
            .close("</b>")
            .isolated("<br/>")
            .build();

        assert_eq!(coded.codes.len(), 3);
        assert_eq!(coded.codes[0].id, coded.codes[1].id);
        assert_ne!(coded.codes[1].id, coded.codes[2].id);
        assert_eq!(coded.codes[1].kind, CodeKind::Closing);

        let markers: Vec<char> = coded.text.chars().filter(|c| is_marker(*c)).collect();
        assert_eq!(markers, vec![MARKER_OPENING, MARKER_CLOSING, MARKER_ISOLATED]);
    }

    #[test]
    fn fragment_kinds() {
        assert!(FragmentKind::Attribute.is_referent());
        assert!(!FragmentKind::Attribute.include_in_context());
        assert!(FragmentKind::Subflow.is_referent());
        assert!(FragmentKind::Subflow.include_in_context());
        assert!(!FragmentKind::Block.is_referent());
    }

    #[test]
    fn events_deserialize_from_json() {
        let json = r#"[
            {"event": "start_document", "locale": "en", "name": "doc.html"},
            {"event": "skeleton_part", "id": "dp1", "skeleton": "<html lang=\"[#$$self$@%language]\">",
             "properties": {"language": "en"}},
            {"event": "text_fragment", "id": "tu1", "skeleton": "<p>[#$$self$]</p>",
             "coded_text": {"text": "Hi"}},
            {"event": "end_document", "final_skeleton": "</html>"}
        ]"#;
        let events: Vec<DocumentEvent> = serde_json::from_str(json).unwrap();
        assert_eq!(events.len(), 4);
        match &events[2] {
            DocumentEvent::TextFragment(f) => {
                assert_eq!(f.kind, FragmentKind::Block);
                assert_eq!(f.coded_text.text, "Hi");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
