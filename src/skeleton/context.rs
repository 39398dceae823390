//! Context assembly: the two contexts and the dual-offset unit records.

use std::collections::HashMap;

use crate::error::{SkeletonError, SpanError};
use crate::span::{AnnotatedSpan, CharIndex, ContextKind, Span, TextUnitRecord, char_len};

use super::pointer::ResolvedSkeleton;
use super::{EntryId, EntryRole, Registry, UnitId};

/// Output of a complete forward conversion, before serialization.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    pub skeleton_context: String,
    pub plain_text: String,
    pub units: Vec<TextUnitRecord>,
    /// Annotations the source document already carried.
    pub annotations: Vec<AnnotatedSpan>,
}

pub fn assemble(
    registry: &Registry,
    resolved: ResolvedSkeleton,
) -> Result<AssembledContext, SkeletonError> {
    let sequence = unit_sequence(registry, &resolved);
    let locale = registry.locale.clone();
    let skeleton_index = CharIndex::new(&resolved.skeleton);

    let mut plain_text = String::new();
    let mut plain_len = 0usize;
    let mut last_set = None;
    let mut plain_begin: Vec<Option<usize>> = vec![None; registry.units().len()];
    let mut units = Vec::with_capacity(sequence.len());

    for unit_id in sequence {
        let unit = registry.unit(unit_id);
        if last_set.is_some_and(|set| set != unit.unit_set) {
            plain_text.push(' ');
            plain_len += 1;
        }
        last_set = Some(unit.unit_set);

        let len = char_len(&unit.text);
        let plain = Span::new(plain_len, plain_len + len).with_locale(locale.clone());
        let skeleton = resolved.unit_offsets[unit_id.0]
            .map(|byte| skeleton_span(&resolved.skeleton, &skeleton_index, byte, &unit.text))
            .transpose()?
            .map(|span| span.with_locale(locale.clone()));

        plain_begin[unit_id.0] = Some(plain_len);
        plain_text.push_str(&unit.text);
        plain_len += len;
        units.push(TextUnitRecord {
            plain,
            skeleton,
            text: unit.text.clone(),
        });
    }

    for record in &units {
        record.plain.validate(ContextKind::PlainText, plain_len)?;
        if let Some(span) = &record.skeleton {
            span.validate(ContextKind::Skeleton, skeleton_index.char_len())?;
        }
    }

    let mut annotations = Vec::new();
    for pending in &registry.annotations {
        let (start_unit, start_byte) = pending.start;
        let (end_unit, end_byte) = pending.end;
        let begin = plain_begin[start_unit.0].zip(registry.unit(start_unit).text.get(..start_byte));
        let end = plain_begin[end_unit.0].zip(registry.unit(end_unit).text.get(..end_byte));
        match (begin, end) {
            (Some((b, head)), Some((e, tail))) if b + char_len(head) < e + char_len(tail) => {
                let span = Span::new(b + char_len(head), e + char_len(tail))
                    .with_locale(locale.clone());
                span.validate(ContextKind::PlainText, plain_len)?;
                annotations.push(AnnotatedSpan::new(span, pending.annotations.clone()));
            }
            _ => tracing::debug!(
                start = %registry.unit(start_unit).key,
                end = %registry.unit(end_unit).key,
                "inline annotation not in the plain-text context, skipping"
            ),
        }
    }

    tracing::debug!(
        units = units.len(),
        annotations = annotations.len(),
        plain_chars = plain_len,
        "contexts assembled"
    );

    Ok(AssembledContext {
        skeleton_context: resolved.skeleton,
        plain_text,
        units,
        annotations,
    })
}

/// In-context units in plain-text order.
///
/// The ordering list decides where units without a skeleton position go; units
/// with one are then put in ascending skeleton order within the slots they
/// occupy.
fn unit_sequence(registry: &Registry, resolved: &ResolvedSkeleton) -> Vec<UnitId> {
    let mut by_home: HashMap<EntryId, Vec<UnitId>> = HashMap::new();
    for (i, home) in resolved.unit_home.iter().enumerate() {
        if let Some(home) = home {
            by_home.entry(*home).or_default().push(UnitId(i));
        }
    }

    let mut sequence = Vec::with_capacity(registry.units().len());
    for &id in &resolved.order {
        let entry = registry.entry(id);
        match entry.role {
            EntryRole::TopLevel => {
                if let Some(homed) = by_home.get_mut(&id) {
                    homed.sort_by_key(|u| resolved.unit_offsets[u.0]);
                    sequence.extend(homed.iter().copied());
                }
            }
            EntryRole::Referent if !resolved.consumed[id.0] => sequence.extend(
                entry
                    .placements
                    .iter()
                    .map(|p| p.unit)
                    .filter(|u| resolved.unit_offsets[u.0].is_none()),
            ),
            EntryRole::Referent => {}
        }
    }
    sequence.retain(|u| registry.unit(*u).include_in_context);

    let slots: Vec<usize> = sequence
        .iter()
        .enumerate()
        .filter(|(_, u)| resolved.unit_offsets[u.0].is_some())
        .map(|(i, _)| i)
        .collect();
    let mut placed: Vec<UnitId> = slots.iter().map(|&i| sequence[i]).collect();
    placed.sort_by_key(|u| resolved.unit_offsets[u.0]);
    for (slot, unit) in slots.into_iter().zip(placed) {
        sequence[slot] = unit;
    }
    sequence
}

fn skeleton_span(
    skeleton: &str,
    index: &CharIndex,
    byte: usize,
    text: &str,
) -> Result<Span, SpanError> {
    let violation = || SpanError::OffsetInvariantViolation {
        context: ContextKind::Skeleton,
        begin: byte,
        end: byte + text.len(),
        len: skeleton.len(),
    };
    if skeleton.get(byte..byte + text.len()) != Some(text) {
        return Err(violation());
    }
    let begin = index.char_offset(byte).ok_or_else(violation)?;
    Ok(Span::new(begin, begin + char_len(text)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::InlineAnnotation;
    use crate::config::TargetEncoding;
    use crate::event::{CodedText, DocumentEvent, FragmentKind, TextFragment};
    use crate::skeleton::builder::SkeletonBuilder;
    use crate::skeleton::marker::MarkerResolver;
    use crate::skeleton::pointer;

    fn forward(events: &[DocumentEvent]) -> AssembledContext {
        let mut builder = SkeletonBuilder::new(MarkerResolver::new(TargetEncoding::Unicode, true));
        for event in events {
            builder.process(event).unwrap();
        }
        let registry = builder.finish();
        let resolved = pointer::resolve(&registry).unwrap();
        assemble(&registry, resolved).unwrap()
    }

    fn paragraph(id: &str, text: &str) -> DocumentEvent {
        DocumentEvent::TextFragment(TextFragment::block(
            id,
            Some("<p>[#$$self$]</p>"),
            CodedText::plain(text),
        ))
    }

    #[test]
    fn hello_world_spans() {
        let coded = CodedText::builder()
            .text("Hello ")
            .open("<b>", Vec::new())
            .text("World")
            .close("</b>")
            .text("!")
            .build();
        let out = forward(&[DocumentEvent::TextFragment(TextFragment::block(
            "p1",
            Some("<p>[#$$self$]</p>"),
            coded,
        ))]);
        assert_eq!(out.plain_text, "Hello World!");
        assert_eq!(out.units.len(), 3);
        assert!(out.units[1].plain.same_range(&Span::new(6, 11)));
        assert!(out.units[1].skeleton.as_ref().unwrap().same_range(&Span::new(12, 17)));
        for unit in &out.units {
            let skeleton = unit.skeleton.as_ref().unwrap();
            assert_eq!(unit.plain.len(), skeleton.len());
            assert_eq!(unit.plain.len(), unit.text.chars().count());
        }
    }

    #[test]
    fn separator_only_between_fragments() {
        let out = forward(&[paragraph("a", "First."), paragraph("b", "Second.")]);
        assert_eq!(out.plain_text, "First. Second.");
        assert!(out.units[1].plain.same_range(&Span::new(7, 14)));
    }

    #[test]
    fn attribute_text_is_not_in_plain_text() {
        let image = CodedText::builder()
            .text("Look ")
            .isolated("<img alt=\"[#$alt1]\"/>")
            .build();
        let out = forward(&[
            DocumentEvent::TextFragment(TextFragment::referent(
                "alt1",
                FragmentKind::Attribute,
                CodedText::plain("A cat"),
            )),
            DocumentEvent::TextFragment(TextFragment::block("p", Some("<p>[#$$self$]</p>"), image)),
        ]);
        assert_eq!(out.skeleton_context, "<p>Look <img alt=\"A cat\"/></p>");
        assert_eq!(out.plain_text, "Look ");
        assert_eq!(out.units.len(), 1);
    }

    #[test]
    fn unreferenced_subflow_has_no_skeleton_span() {
        let out = forward(&[
            paragraph("a", "Body"),
            DocumentEvent::TextFragment(TextFragment::referent(
                "orphan",
                FragmentKind::Subflow,
                CodedText::plain("floating"),
            )),
        ]);
        assert_eq!(out.plain_text, "Body floating");
        assert!(out.units[1].skeleton.is_none());
        assert_eq!(out.skeleton_context, "<p>Body</p>");
    }

    #[test]
    fn offsets_count_characters() {
        let out = forward(&[paragraph("a", "Grüße"), paragraph("b", "日本")]);
        assert_eq!(out.plain_text, "Grüße 日本");
        assert!(out.units[1].plain.same_range(&Span::new(6, 8)));
        assert!(out.units[1].skeleton.as_ref().unwrap().same_range(&Span::new(15, 17)));
    }

    #[test]
    fn source_annotations_are_exported() {
        let entity = InlineAnnotation::ident_ref("http://dbpedia.org/resource/Berlin");
        let coded = CodedText::builder()
            .text("I love ")
            .open("<a>", vec![entity.clone()])
            .text("Berlin")
            .close("</a>")
            .build();
        let out = forward(&[
            DocumentEvent::StartDocument {
                locale: Some("en".into()),
                name: None,
            },
            DocumentEvent::TextFragment(TextFragment::block("p", Some("<p>[#$$self$]</p>"), coded)),
        ]);
        assert_eq!(out.annotations.len(), 1);
        let span = &out.annotations[0].span;
        assert!(span.same_range(&Span::new(7, 13)));
        assert_eq!(span.locale.as_deref(), Some("en"));
        assert_eq!(out.annotations[0].annotations, vec![entity]);
    }
}
