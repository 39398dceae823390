//! Back-conversion: splice plain-text annotations into the skeleton context.
//!
//! Every annotated plain-text span is anchored on the unit records first. A
//! span equal to a unit's plain span decorates the unit itself; a span strictly
//! inside one becomes a *nested* entry, which is spliced into the text of the
//! unit containing it before that unit is written out. A unit that never
//! reached the skeleton is nested the same way, into the nearest later unit
//! whose text holds its text.
//!
//! Work items are processed in skeleton order with nested ranges before their
//! containers (ascending end, then descending start). A cursor walks the
//! skeleton: the literal text between the cursor and a unit's start is the
//! unit's *parent*, whose trailing open tag receives the unit's attributes when
//! it encloses exactly that unit.

pub mod attributes;

use std::collections::HashMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::annotation::{InlineAnnotation, Statement};
use crate::config::ConverterConfig;
use crate::error::{BackConvertError, SpanError};
use crate::span::{AnnotatedSpan, CharIndex, ContextKind, Span, TextUnitRecord};

use self::attributes::{decorate, group_statements, render_groups, wrap};

/// Everything back-conversion needs: the stored skeleton context, the unit
/// records of the same forward conversion, and the annotations to splice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackConversionInput {
    pub skeleton_context: String,
    pub units: Vec<TextUnitRecord>,
    #[serde(default)]
    pub annotations: Vec<AnnotatedSpan>,
}

/// Why an annotation did not make it into the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// The span matches no unit and lies inside none.
    Unanchored,
    /// No later unit contains the nested span's text.
    NoContainer,
    /// The nested span overlaps an earlier splice into the same unit.
    OverlappingSplice,
    /// The span matches a unit that never reached the skeleton, and no later
    /// unit holds its text.
    NoSkeletonCounterpart,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unanchored => "unanchored",
            Self::NoContainer => "no container",
            Self::OverlappingSplice => "overlapping splice",
            Self::NoSkeletonCounterpart => "no skeleton counterpart",
        }
    }
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedAnnotation {
    pub span: Span,
    pub reason: DropReason,
}

/// The reconstructed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackConversion {
    pub document: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped: Vec<DroppedAnnotation>,
}

enum Item {
    Unit {
        index: usize,
        range: Range<usize>,
        annotations: Vec<InlineAnnotation>,
    },
    Nested {
        span: Span,
        range: Range<usize>,
        text: String,
        annotations: Vec<InlineAnnotation>,
    },
}

impl Item {
    fn range(&self) -> &Range<usize> {
        match self {
            Self::Unit { range, .. } | Self::Nested { range, .. } => range,
        }
    }
}

/// One wrapper already spliced into a container, in original-text offsets.
struct Splice {
    start: usize,
    end: usize,
    added: usize,
}

/// A container's text while nested wrappers are spliced into it.
struct Working {
    text: String,
    /// Markup bytes inserted so far.
    additional_offset: usize,
    splices: Vec<Splice>,
}

impl Working {
    /// Where `[start, end)` of the original text now sits, or `None` when it
    /// partially overlaps an earlier splice. Earlier splices lying wholly
    /// inside the range are wrapped along with it.
    ///
    /// Splices arrive in ascending end order, so every earlier splice ends at
    /// or before `end` and all inserted markup precedes the new end.
    fn locate(&self, start: usize, end: usize) -> Option<Range<usize>> {
        let mut before = 0;
        for splice in &self.splices {
            if splice.end <= start {
                before += splice.added;
            } else if splice.start < start || splice.end > end {
                return None;
            }
        }
        Some(start + before..end + self.additional_offset)
    }
}

pub struct BackConverter<'c> {
    config: &'c ConverterConfig,
}

impl<'c> BackConverter<'c> {
    pub fn new(config: &'c ConverterConfig) -> Self {
        Self { config }
    }

    pub fn convert(&self, input: &BackConversionInput) -> Result<BackConversion, BackConvertError> {
        let skeleton = input.skeleton_context.as_str();
        let chars = CharIndex::new(skeleton);
        let ranges = unit_ranges(input, &chars)?;

        let mut dropped = Vec::new();
        let mut unit_annotations: HashMap<usize, Vec<InlineAnnotation>> = HashMap::new();
        let mut nested = Vec::new();

        for annotated in merge_spans(&input.annotations) {
            let span = &annotated.span;
            if span.is_empty() {
                dropped.push(drop_annotation(span, DropReason::Unanchored));
                continue;
            }
            if let Some(i) = input.units.iter().position(|u| u.plain.same_range(span)) {
                if ranges[i].is_some() {
                    unit_annotations
                        .entry(i)
                        .or_default()
                        .extend(annotated.annotations.iter().cloned());
                } else {
                    match detached_item(input, &ranges, i, &annotated) {
                        Some(item) => nested.push(item),
                        None => {
                            dropped.push(drop_annotation(span, DropReason::NoSkeletonCounterpart))
                        }
                    }
                }
                continue;
            }
            let container = input
                .units
                .iter()
                .enumerate()
                .find(|(i, u)| ranges[*i].is_some() && u.plain.contains(span));
            match container.and_then(|(i, u)| nested_item(u, ranges[i].as_ref(), &annotated)) {
                Some(item) => nested.push(item),
                None => dropped.push(drop_annotation(span, DropReason::Unanchored)),
            }
        }

        let mut items: Vec<Item> = ranges
            .iter()
            .enumerate()
            .filter_map(|(i, range)| {
                range.clone().map(|range| Item::Unit {
                    index: i,
                    range,
                    annotations: unit_annotations.remove(&i).unwrap_or_default(),
                })
            })
            .collect();
        items.extend(nested);
        items.sort_by_key(|item| {
            let range = item.range();
            (
                range.end,
                std::cmp::Reverse(range.start),
                matches!(item, Item::Unit { .. }),
            )
        });

        let mut document = String::with_capacity(skeleton.len());
        let mut cursor = 0usize;
        let mut working: HashMap<usize, Working> = HashMap::new();

        for (position, item) in items.iter().enumerate() {
            match item {
                Item::Nested {
                    span,
                    range,
                    text,
                    annotations,
                } => {
                    let container = items[position + 1..].iter().find_map(|later| match later {
                        Item::Unit {
                            index,
                            range: outer,
                            ..
                        } if outer.start <= range.start
                            && range.end <= outer.end
                            && input.units[*index].text.contains(text.as_str()) =>
                        {
                            Some((*index, outer.start))
                        }
                        _ => None,
                    });
                    let Some((container, base)) = container else {
                        dropped.push(drop_annotation(span, DropReason::NoContainer));
                        continue;
                    };
                    let original = &input.units[container].text;
                    let relative = range.start - base;
                    if original.get(relative..).is_none_or(|rest| !rest.starts_with(text.as_str())) {
                        dropped.push(drop_annotation(span, DropReason::NoContainer));
                        continue;
                    }
                    let work = working.entry(container).or_insert_with(|| Working {
                        text: original.clone(),
                        additional_offset: 0,
                        splices: Vec::new(),
                    });
                    let Some(at) = work.locate(relative, relative + text.len()) else {
                        dropped.push(drop_annotation(span, DropReason::OverlappingSplice));
                        continue;
                    };

                    let groups = group_statements(&statements(annotations), "");
                    let attributes = render_groups(&groups, &self.config.group_prefix);
                    let inner = work.text[at.clone()].to_string();
                    let wrapped = wrap(&inner, &attributes, &self.config.wrapper_element);
                    let added = wrapped.len() - inner.len();
                    work.text.replace_range(at, &wrapped);
                    work.additional_offset += added;
                    work.splices.push(Splice {
                        start: relative,
                        end: relative + text.len(),
                        added,
                    });
                }
                Item::Unit {
                    index,
                    range,
                    annotations,
                } => {
                    if range.start < cursor {
                        return Err(BackConvertError::OverlappingUnits {
                            begin: chars.char_offset(range.start).unwrap_or(range.start),
                            cursor: chars.char_offset(cursor).unwrap_or(cursor),
                        });
                    }
                    let parent = &skeleton[cursor..range.start];
                    let text = working
                        .remove(index)
                        .map_or_else(|| input.units[*index].text.clone(), |w| w.text);
                    if annotations.is_empty() {
                        document.push_str(parent);
                        document.push_str(&text);
                    } else {
                        let following = &skeleton[range.end..];
                        document.push_str(&decorate(
                            parent,
                            &text,
                            following,
                            &statements(annotations),
                            self.config,
                        ));
                    }
                    cursor = range.end;
                }
            }
        }
        document.push_str(&skeleton[cursor..]);

        for entry in &dropped {
            tracing::warn!(span = %entry.span, reason = %entry.reason, "annotation dropped");
        }
        tracing::debug!(
            units = input.units.len(),
            annotations = input.annotations.len(),
            dropped = dropped.len(),
            "back-conversion finished"
        );

        Ok(BackConversion { document, dropped })
    }
}

/// Byte range of each unit's skeleton span, checked against the skeleton.
fn unit_ranges(
    input: &BackConversionInput,
    index: &CharIndex,
) -> Result<Vec<Option<Range<usize>>>, BackConvertError> {
    let skeleton = input.skeleton_context.as_str();
    input
        .units
        .iter()
        .map(|unit| {
            let Some(span) = &unit.skeleton else {
                return Ok(None);
            };
            span.validate(ContextKind::Skeleton, index.char_len())?;
            let violation = || SpanError::OffsetInvariantViolation {
                context: ContextKind::Skeleton,
                begin: span.begin,
                end: span.end,
                len: index.char_len(),
            };
            let start = index.byte_offset(span.begin).ok_or_else(violation)?;
            let end = index.byte_offset(span.end).ok_or_else(violation)?;
            let found = &skeleton[start..end];
            if found != unit.text {
                return Err(BackConvertError::UnitTextMismatch {
                    begin: span.begin,
                    expected: unit.text.clone(),
                    found: found.to_string(),
                });
            }
            Ok(Some(start..end))
        })
        .collect()
}

/// Merge annotations on identical ranges, keeping first-appearance order.
fn merge_spans(annotated: &[AnnotatedSpan]) -> Vec<AnnotatedSpan> {
    let mut merged: Vec<AnnotatedSpan> = Vec::with_capacity(annotated.len());
    for item in annotated {
        match merged.iter_mut().find(|m| m.span.same_range(&item.span)) {
            Some(existing) => existing.annotations.extend(item.annotations.iter().cloned()),
            None => merged.push(item.clone()),
        }
    }
    merged.retain(|m| !m.annotations.is_empty());
    merged
}

/// The nested item for a span strictly inside `unit`'s plain span.
fn nested_item(
    unit: &TextUnitRecord,
    range: Option<&Range<usize>>,
    annotated: &AnnotatedSpan,
) -> Option<Item> {
    let range = range?;
    let chars = CharIndex::new(&unit.text);
    let from = chars.byte_offset(annotated.span.begin - unit.plain.begin)?;
    let to = chars.byte_offset(annotated.span.end - unit.plain.begin)?;
    Some(Item::Nested {
        span: annotated.span.clone(),
        range: range.start + from..range.start + to,
        text: unit.text[from..to].to_string(),
        annotations: annotated.annotations.clone(),
    })
}

/// The nested item for an annotated unit without a skeleton span: its text
/// is located in the nearest later unit that reached the skeleton.
fn detached_item(
    input: &BackConversionInput,
    ranges: &[Option<Range<usize>>],
    detached: usize,
    annotated: &AnnotatedSpan,
) -> Option<Item> {
    let unit = &input.units[detached];
    let mut later: Vec<usize> = (0..input.units.len())
        .filter(|&i| ranges[i].is_some() && input.units[i].plain.begin >= unit.plain.end)
        .collect();
    later.sort_by_key(|&i| input.units[i].plain.begin);
    let (range, at) = later.into_iter().find_map(|i| {
        let at = input.units[i].text.find(unit.text.as_str())?;
        Some((ranges[i].as_ref()?, at))
    })?;
    Some(Item::Nested {
        span: annotated.span.clone(),
        range: range.start + at..range.start + at + unit.text.len(),
        text: unit.text.clone(),
        annotations: annotated.annotations.clone(),
    })
}

fn statements(annotations: &[InlineAnnotation]) -> Vec<Statement> {
    annotations.iter().flat_map(InlineAnnotation::statements).collect()
}

fn drop_annotation(span: &Span, reason: DropReason) -> DroppedAnnotation {
    DroppedAnnotation {
        span: span.clone(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(plain: (usize, usize), skeleton: Option<(usize, usize)>, text: &str) -> TextUnitRecord {
        TextUnitRecord {
            plain: Span::new(plain.0, plain.1),
            skeleton: skeleton.map(|(b, e)| Span::new(b, e)),
            text: text.into(),
        }
    }

    fn convert(input: &BackConversionInput) -> BackConversion {
        BackConverter::new(&ConverterConfig::default())
            .convert(input)
            .unwrap()
    }

    fn hello_world() -> BackConversionInput {
        BackConversionInput {
            skeleton_context: "Hello World!".into(),
            units: vec![
                unit((0, 6), Some((0, 6)), "Hello "),
                unit((6, 11), Some((6, 11)), "World"),
                unit((11, 12), Some((11, 12)), "!"),
            ],
            annotations: Vec::new(),
        }
    }

    #[test]
    fn no_annotations_reproduces_skeleton() {
        let out = convert(&hello_world());
        assert_eq!(out.document, "Hello World!");
        assert!(out.dropped.is_empty());
    }

    #[test]
    fn annotated_unit_is_wrapped() {
        let mut input = hello_world();
        input.annotations.push(AnnotatedSpan::new(
            Span::new(6, 11),
            vec![InlineAnnotation::ident_ref("Berlin")],
        ));
        assert_eq!(
            convert(&input).document,
            "Hello <span its-ta-ident-ref=\"Berlin\">World</span>!"
        );
    }

    #[test]
    fn nested_spans_track_additional_offset() {
        let input = BackConversionInput {
            skeleton_context: "<p>Berlin and Paris</p>".into(),
            units: vec![unit((0, 16), Some((3, 19)), "Berlin and Paris")],
            annotations: vec![
                AnnotatedSpan::new(Span::new(11, 16), vec![InlineAnnotation::ident_ref("P")]),
                AnnotatedSpan::new(Span::new(0, 6), vec![InlineAnnotation::ident_ref("B")]),
            ],
        };
        assert_eq!(
            convert(&input).document,
            "<p><span its-ta-ident-ref=\"B\">Berlin</span> and \
             <span its-ta-ident-ref=\"P\">Paris</span></p>"
        );
    }

    #[test]
    fn enclosing_nested_span_wraps_earlier_splice() {
        let input = BackConversionInput {
            skeleton_context: "<p>I love New York City</p>".into(),
            units: vec![unit((0, 20), Some((3, 23)), "I love New York City")],
            annotations: vec![
                AnnotatedSpan::new(Span::new(7, 15), vec![InlineAnnotation::ident_ref("NY")]),
                AnnotatedSpan::new(Span::new(11, 15), vec![InlineAnnotation::class_ref("Y")]),
            ],
        };
        let out = convert(&input);
        assert_eq!(
            out.document,
            "<p>I love <span its-ta-ident-ref=\"NY\">New \
             <span its-ta-class-ref=\"Y\">York</span></span> City</p>"
        );
        assert!(out.dropped.is_empty());
    }

    #[test]
    fn partially_overlapping_nested_span_is_dropped() {
        let input = BackConversionInput {
            skeleton_context: "<p>I love New York City</p>".into(),
            units: vec![unit((0, 20), Some((3, 23)), "I love New York City")],
            annotations: vec![
                AnnotatedSpan::new(Span::new(7, 15), vec![InlineAnnotation::ident_ref("NY")]),
                AnnotatedSpan::new(Span::new(11, 20), vec![InlineAnnotation::ident_ref("YC")]),
            ],
        };
        let out = convert(&input);
        assert_eq!(
            out.document,
            "<p>I love <span its-ta-ident-ref=\"NY\">New York</span> City</p>"
        );
        assert_eq!(out.dropped.len(), 1);
        assert_eq!(out.dropped[0].reason, DropReason::OverlappingSplice);
    }

    #[test]
    fn unit_without_skeleton_span_is_spliced_into_later_unit() {
        let input = BackConversionInput {
            skeleton_context: "<p>I love Paris</p>".into(),
            units: vec![
                unit((0, 5), None, "Paris"),
                unit((6, 18), Some((3, 15)), "I love Paris"),
            ],
            annotations: vec![
                AnnotatedSpan::new(Span::new(0, 5), vec![InlineAnnotation::ident_ref("P")]),
                AnnotatedSpan::new(Span::new(6, 7), vec![InlineAnnotation::ident_ref("I")]),
            ],
        };
        let out = convert(&input);
        assert_eq!(
            out.document,
            "<p><span its-ta-ident-ref=\"I\">I</span> love \
             <span its-ta-ident-ref=\"P\">Paris</span></p>"
        );
        assert!(out.dropped.is_empty());
    }

    #[test]
    fn unit_without_skeleton_span_or_container_is_dropped() {
        let input = BackConversionInput {
            skeleton_context: "<p>I love Rome</p>".into(),
            units: vec![
                unit((0, 5), None, "Paris"),
                unit((6, 17), Some((3, 14)), "I love Rome"),
            ],
            annotations: vec![AnnotatedSpan::new(
                Span::new(0, 5),
                vec![InlineAnnotation::ident_ref("P")],
            )],
        };
        let out = convert(&input);
        assert_eq!(out.document, "<p>I love Rome</p>");
        assert_eq!(out.dropped[0].reason, DropReason::NoSkeletonCounterpart);
    }

    #[test]
    fn identical_spans_are_merged_and_grouped() {
        let mut input = hello_world();
        for class in ["A", "B", "C"] {
            input.annotations.push(AnnotatedSpan::new(
                Span::new(6, 11),
                vec![InlineAnnotation::class_ref(class)],
            ));
        }
        assert_eq!(
            convert(&input).document,
            "Hello <span its-ta-class-ref=\"A\" data-its-ta-class-refs=\"A B C\">World</span>!"
        );
    }

    #[test]
    fn enclosing_element_receives_attributes() {
        let input = BackConversionInput {
            skeleton_context: "<p>Hello <b>World</b>!</p>".into(),
            units: vec![
                unit((0, 6), Some((3, 9)), "Hello "),
                unit((6, 11), Some((12, 17)), "World"),
                unit((11, 12), Some((21, 22)), "!"),
            ],
            annotations: vec![AnnotatedSpan::new(
                Span::new(6, 11),
                vec![InlineAnnotation::ident_ref("Berlin")],
            )],
        };
        assert_eq!(
            convert(&input).document,
            "<p>Hello <b its-ta-ident-ref=\"Berlin\">World</b>!</p>"
        );
    }

    #[test]
    fn unanchored_spans_are_reported() {
        let mut input = hello_world();
        input.annotations.push(AnnotatedSpan::new(
            Span::new(4, 8),
            vec![InlineAnnotation::confidence(0.5)],
        ));
        input.annotations.push(AnnotatedSpan::new(
            Span::new(3, 3),
            vec![InlineAnnotation::confidence(0.5)],
        ));
        let out = convert(&input);
        assert_eq!(out.document, "Hello World!");
        let reasons: Vec<DropReason> = out.dropped.iter().map(|d| d.reason).collect();
        assert_eq!(reasons, vec![DropReason::Unanchored, DropReason::Unanchored]);
    }

    #[test]
    fn mismatched_unit_text_is_an_error() {
        let mut input = hello_world();
        input.units[1].text = "Welt!".into();
        let err = BackConverter::new(&ConverterConfig::default())
            .convert(&input)
            .unwrap_err();
        assert!(matches!(err, BackConvertError::UnitTextMismatch { begin: 6, .. }));
    }

    #[test]
    fn out_of_range_span_is_not_clamped() {
        let mut input = hello_world();
        input.units[2].skeleton = Some(Span::new(11, 13));
        let err = BackConverter::new(&ConverterConfig::default())
            .convert(&input)
            .unwrap_err();
        assert!(matches!(err, BackConvertError::Span(_)));
    }
}
