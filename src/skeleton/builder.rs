//! Skeleton building: parser events to skeleton entries and text units.
//!
//! Fragments are rendered into their skeleton template. The template is split
//! into a queue of chunks at each `[#$$self$]` placeholder; text runs consume
//! the placeholders left to right and are placed in-line. Runs left over once
//! the placeholders are exhausted become standalone referent entries, and a
//! pointer token marks the spot where they occurred.
//!
//! Referent fragments (attribute values, sub-flows) never reach the top level
//! directly; each run is stored under its own id for pointer substitution.

use std::collections::VecDeque;

use crate::error::SkeletonError;
use crate::event::{DocumentEvent, SkeletonPart, TextFragment};

use super::marker::{LocalAnnotation, MarkerResolver, Piece};
use super::{
    EntryRole, PROPERTY_PREFIX, POINTER_SUFFIX, PendingAnnotation, Placement, Registry,
    SELF_PLACEHOLDER, STANDOFF_MARKER, SkeletonEntry, TextUnit, UnitId, pointer_token,
    sub_unit_id,
};

/// Key of the entry holding the end-of-document skeleton.
const END_DOCUMENT_KEY: &str = "$end-document$";

/// A run's unit and its byte range over the fragment's concatenated runs.
struct RunSpan {
    unit: UnitId,
    start: usize,
    len: usize,
}

/// Consumes one document's events into a fresh [`Registry`].
pub struct SkeletonBuilder {
    resolver: MarkerResolver,
    registry: Registry,
    fragments: usize,
    started: bool,
    ended: bool,
}

impl SkeletonBuilder {
    pub fn new(resolver: MarkerResolver) -> Self {
        Self {
            resolver,
            registry: Registry::new(),
            fragments: 0,
            started: false,
            ended: false,
        }
    }

    pub fn process(&mut self, event: &DocumentEvent) -> Result<(), SkeletonError> {
        if self.ended {
            tracing::warn!("event received after end of document, processing anyway");
        }
        match event {
            DocumentEvent::StartDocument { locale, name } => {
                if self.started {
                    tracing::warn!(?name, "second start-document event overrides document metadata");
                }
                self.started = true;
                self.registry.locale = locale.clone();
                self.registry.document_name = name.clone();
                Ok(())
            }
            DocumentEvent::TextFragment(fragment) => self.fragment(fragment),
            DocumentEvent::SkeletonPart(part) => {
                self.skeleton_part(part);
                Ok(())
            }
            DocumentEvent::EndDocument { final_skeleton } => {
                self.ended = true;
                if let Some(skeleton) = final_skeleton.as_deref() {
                    let text = skeleton.replace(STANDOFF_MARKER, "");
                    if !text.is_empty() {
                        self.registry.push_entry(SkeletonEntry {
                            key: END_DOCUMENT_KEY.into(),
                            text,
                            role: EntryRole::TopLevel,
                            placements: Vec::new(),
                        });
                    }
                }
                Ok(())
            }
        }
    }

    /// Hand over the filled registry.
    pub fn finish(self) -> Registry {
        tracing::debug!(
            entries = self.registry.entries().len(),
            units = self.registry.units().len(),
            fragments = self.fragments,
            "skeleton built"
        );
        self.registry
    }

    fn fragment(&mut self, fragment: &TextFragment) -> Result<(), SkeletonError> {
        let resolved = self.resolver.resolve(&fragment.id, &fragment.coded_text)?;
        self.fragments += 1;
        let unit_set = self.fragments;
        let run_count = resolved.run_count();

        let runs = if fragment.kind.is_referent() {
            self.referent_fragment(fragment, resolved.pieces, run_count, unit_set)
        } else {
            self.block_fragment(fragment, resolved.pieces, run_count, unit_set)
        };

        for local in resolved.annotations {
            self.anchor(&fragment.id, &runs, local);
        }
        Ok(())
    }

    fn new_unit(&mut self, key: String, text: &str, fragment: &TextFragment, unit_set: usize) -> UnitId {
        self.registry.push_unit(TextUnit {
            key,
            text: text.to_string(),
            include_in_context: fragment.kind.include_in_context(),
            unit_set,
        })
    }

    fn block_fragment(
        &mut self,
        fragment: &TextFragment,
        pieces: Vec<Piece>,
        run_count: usize,
        unit_set: usize,
    ) -> Vec<RunSpan> {
        let template = fragment.skeleton.as_deref().unwrap_or("");
        let mut chunks: VecDeque<&str> = template.split(SELF_PLACEHOLDER).collect();
        let placeholders = chunks.len().saturating_sub(1);

        let mut text = chunks.pop_front().unwrap_or_default().to_string();
        let mut placements = Vec::new();
        let mut runs = Vec::with_capacity(run_count);
        let mut consumed = 0usize;
        let mut run_no = 0usize;
        let mut run_offset = 0usize;

        for piece in pieces {
            let run = match piece {
                Piece::Markup(markup) => {
                    text.push_str(&markup);
                    continue;
                }
                Piece::Text(run) => run,
            };
            run_no += 1;

            let unit = if consumed < placeholders {
                if consumed > 0 {
                    text.push_str(chunks.pop_front().unwrap_or_default());
                }
                consumed += 1;
                let key = if run_count == 1 {
                    fragment.id.clone()
                } else {
                    sub_unit_id(&fragment.id, run_no)
                };
                let unit = self.new_unit(key, &run, fragment, unit_set);
                placements.push(Placement {
                    unit,
                    offset: text.len(),
                });
                text.push_str(&run);
                unit
            } else {
                let key = sub_unit_id(&fragment.id, run_no);
                let unit = self.new_unit(key.clone(), &run, fragment, unit_set);
                text.push_str(&pointer_token(&key));
                self.registry.push_entry(SkeletonEntry {
                    key,
                    text: run.clone(),
                    role: EntryRole::Referent,
                    placements: vec![Placement { unit, offset: 0 }],
                });
                unit
            };

            runs.push(RunSpan {
                unit,
                start: run_offset,
                len: run.len(),
            });
            run_offset += run.len();
        }

        // Unconsumed placeholders had no text; drop them with the split.
        for chunk in chunks {
            text.push_str(chunk);
        }

        if text.is_empty() {
            tracing::debug!(fragment = %fragment.id, "structural fragment produced nothing");
            return runs;
        }

        self.registry.push_entry(SkeletonEntry {
            key: fragment.id.clone(),
            text,
            role: EntryRole::TopLevel,
            placements,
        });
        runs
    }

    fn referent_fragment(
        &mut self,
        fragment: &TextFragment,
        pieces: Vec<Piece>,
        run_count: usize,
        unit_set: usize,
    ) -> Vec<RunSpan> {
        let template = fragment.skeleton.as_deref().unwrap_or("");
        let mut chunks = template.split(SELF_PLACEHOLDER);
        let mut leading = chunks.next().unwrap_or_default().to_string();
        let trailing: String = chunks.collect();

        let mut current: Option<SkeletonEntry> = None;
        let mut runs = Vec::with_capacity(run_count);
        let mut run_no = 0usize;
        let mut run_offset = 0usize;

        for piece in pieces {
            match piece {
                Piece::Markup(markup) => match current.as_mut() {
                    Some(entry) => entry.text.push_str(&markup),
                    None => leading.push_str(&markup),
                },
                Piece::Text(run) => {
                    run_no += 1;
                    if let Some(done) = current.take() {
                        self.registry.push_entry(done);
                    }
                    let key = if run_count == 1 {
                        fragment.id.clone()
                    } else {
                        sub_unit_id(&fragment.id, run_no)
                    };
                    let unit = self.new_unit(key.clone(), &run, fragment, unit_set);
                    let mut text = std::mem::take(&mut leading);
                    let offset = text.len();
                    text.push_str(&run);
                    current = Some(SkeletonEntry {
                        key,
                        text,
                        role: EntryRole::Referent,
                        placements: vec![Placement { unit, offset }],
                    });
                    runs.push(RunSpan {
                        unit,
                        start: run_offset,
                        len: run.len(),
                    });
                    run_offset += run.len();
                }
            }
        }

        match current {
            Some(mut entry) => {
                entry.text.push_str(&trailing);
                self.registry.push_entry(entry);
            }
            None => {
                leading.push_str(&trailing);
                if !leading.is_empty() {
                    self.registry.push_entry(SkeletonEntry {
                        key: fragment.id.clone(),
                        text: leading,
                        role: EntryRole::Referent,
                        placements: Vec::new(),
                    });
                }
            }
        }
        runs
    }

    fn skeleton_part(&mut self, part: &SkeletonPart) {
        let stripped = part.skeleton.replace(STANDOFF_MARKER, "");
        let mut text = String::with_capacity(stripped.len());
        let mut rest = stripped.as_str();

        while let Some(pos) = rest.find(PROPERTY_PREFIX) {
            text.push_str(&rest[..pos]);
            let after = &rest[pos + PROPERTY_PREFIX.len()..];
            let Some(close) = after.find(POINTER_SUFFIX) else {
                text.push_str(&rest[pos..]);
                rest = "";
                break;
            };
            let name = &after[..close];
            match part.properties.get(name) {
                Some(value) => text.push_str(&self.resolver.escape(value)),
                None => {
                    tracing::warn!(part = %part.id, property = name, "unknown property placeholder, substituting empty value");
                }
            }
            rest = &after[close + 1..];
        }
        text.push_str(rest);

        if text.contains(SELF_PLACEHOLDER) {
            tracing::debug!(part = %part.id, "skeleton part has no text of its own, dropping self placeholder");
            text = text.replace(SELF_PLACEHOLDER, "");
        }
        if text.is_empty() {
            return;
        }

        self.registry.push_entry(SkeletonEntry {
            key: part.id.clone(),
            text,
            role: EntryRole::TopLevel,
            placements: Vec::new(),
        });
    }

    /// Re-anchor a fragment-relative annotation on the units holding its ends.
    fn anchor(&mut self, fragment: &str, runs: &[RunSpan], local: LocalAnnotation) {
        let start = runs
            .iter()
            .find(|r| local.start >= r.start && local.start < r.start + r.len)
            .map(|r| (r.unit, local.start - r.start));
        let end = runs
            .iter()
            .find(|r| local.end > r.start && local.end <= r.start + r.len)
            .map(|r| (r.unit, local.end - r.start));

        match (start, end) {
            (Some(start), Some(end)) => self.registry.annotations.push(PendingAnnotation {
                start,
                end,
                annotations: local.annotations,
            }),
            _ => tracing::debug!(fragment, start = local.start, end = local.end, "annotation outside any run"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::InlineAnnotation;
    use crate::config::TargetEncoding;
    use crate::event::{CodedText, FragmentKind};

    fn builder() -> SkeletonBuilder {
        SkeletonBuilder::new(MarkerResolver::new(TargetEncoding::Unicode, true))
    }

    fn hello_world() -> CodedText {
        CodedText::builder()
            .text("Hello ")
            .open("<b>", Vec::new())
            .text("World")
            .close("</b>")
            .text("!")
            .build()
    }

    #[test]
    fn first_run_fills_placeholder_rest_become_pointers() {
        let mut b = builder();
        b.process(&DocumentEvent::TextFragment(TextFragment::block(
            "p1",
            Some("<p>[#$$self$]</p>"),
            hello_world(),
        )))
        .unwrap();
        let registry = b.finish();

        let top: Vec<&SkeletonEntry> = registry
            .entries()
            .iter()
            .filter(|e| e.role == EntryRole::TopLevel)
            .collect();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].text, "<p>Hello <b>[#$p1-2]</b>[#$p1-3]</p>");
        assert_eq!(top[0].placements.len(), 1);
        assert_eq!(top[0].placements[0].offset, 3);

        let keys: Vec<&str> = registry.units().iter().map(|u| u.key.as_str()).collect();
        assert_eq!(keys, vec!["p1-1", "p1-2", "p1-3"]);
        assert!(registry.units().iter().all(|u| u.unit_set == 1));

        let referent = registry.entry(registry.entry_id("p1-2").unwrap());
        assert_eq!(referent.role, EntryRole::Referent);
        assert_eq!(referent.text, "World");
    }

    #[test]
    fn runs_consume_placeholders_left_to_right() {
        let mut b = builder();
        let coded = CodedText::builder()
            .text("left")
            .isolated("")
            .text("right")
            .build();
        b.process(&DocumentEvent::TextFragment(TextFragment::block(
            "row",
            Some("<td>[#$$self$]</td><td>[#$$self$]</td>"),
            coded,
        )))
        .unwrap();
        let registry = b.finish();
        let entry = registry.entry(registry.entry_id("row").unwrap());
        assert_eq!(entry.text, "<td>left</td><td>right</td>");
        let offsets: Vec<usize> = entry.placements.iter().map(|p| p.offset).collect();
        assert_eq!(offsets, vec![4, 17]);
    }

    #[test]
    fn single_run_without_placeholder_is_standalone() {
        let mut b = builder();
        b.process(&DocumentEvent::TextFragment(TextFragment::block(
            "t1",
            None,
            CodedText::plain("Just text"),
        )))
        .unwrap();
        let registry = b.finish();
        let top = registry.entry(registry.entry_id("t1").unwrap());
        assert_eq!(top.text, "[#$t1-1]");
        assert!(top.placements.is_empty());
        assert_eq!(registry.unit(UnitId(0)).key, "t1-1");
    }

    #[test]
    fn purely_structural_fragment_emits_nothing() {
        let mut b = builder();
        b.process(&DocumentEvent::TextFragment(TextFragment::block(
            "empty",
            None,
            CodedText::default(),
        )))
        .unwrap();
        let registry = b.finish();
        assert!(registry.entries().is_empty());
        assert!(registry.units().is_empty());
    }

    #[test]
    fn referent_runs_keep_their_markup() {
        let mut b = builder();
        let coded = CodedText::builder()
            .open("<i>", Vec::new())
            .text("a")
            .close("</i>")
            .text("b")
            .build();
        b.process(&DocumentEvent::TextFragment(TextFragment::referent(
            "note",
            FragmentKind::Subflow,
            coded,
        )))
        .unwrap();
        let registry = b.finish();
        let first = registry.entry(registry.entry_id("note-1").unwrap());
        let second = registry.entry(registry.entry_id("note-2").unwrap());
        assert_eq!(first.text, "<i>a</i>");
        assert_eq!(first.placements[0].offset, 3);
        assert_eq!(second.text, "b");
        assert!(registry.entry_id("note").is_none());
    }

    #[test]
    fn attribute_units_are_out_of_context() {
        let mut b = builder();
        b.process(&DocumentEvent::TextFragment(TextFragment::referent(
            "alt1",
            FragmentKind::Attribute,
            CodedText::plain("A cat"),
        )))
        .unwrap();
        let registry = b.finish();
        assert!(!registry.unit(UnitId(0)).include_in_context);
        assert_eq!(registry.entry(registry.entry_id("alt1").unwrap()).text, "A cat");
    }

    #[test]
    fn skeleton_part_substitutes_properties_and_strips_standoff() {
        let mut b = builder();
        let part = SkeletonPart::new(
            "dp1",
            "<html lang=\"[#$$self$@%language]\">[#$$self$@%standoff]<meta x=\"[#$$self$@%missing]\">",
        )
        .with_property("language", "de-AT");
        b.process(&DocumentEvent::SkeletonPart(part)).unwrap();
        let registry = b.finish();
        assert_eq!(
            registry.entry(registry.entry_id("dp1").unwrap()).text,
            "<html lang=\"de-AT\"><meta x=\"\">"
        );
    }

    #[test]
    fn annotations_anchor_on_units() {
        let mut b = builder();
        let coded = CodedText::builder()
            .text("See ")
            .open("<span>", vec![InlineAnnotation::class_ref("http://example.org/C")])
            .text("New ")
            .open("<i>", Vec::new())
            .text("York")
            .close("</i>")
            .close("</span>")
            .build();
        b.process(&DocumentEvent::TextFragment(TextFragment::block(
            "p",
            Some("<p>[#$$self$]</p>"),
            coded,
        )))
        .unwrap();
        let registry = b.finish();
        assert_eq!(registry.annotations.len(), 1);
        let pending = &registry.annotations[0];
        assert_eq!(registry.unit(pending.start.0).text, "New ");
        assert_eq!(pending.start.1, 0);
        assert_eq!(registry.unit(pending.end.0).text, "York");
        assert_eq!(pending.end.1, 4);
    }

    #[test]
    fn start_document_records_metadata() {
        let mut b = builder();
        b.process(&DocumentEvent::StartDocument {
            locale: Some("en".into()),
            name: Some("index.html".into()),
        })
        .unwrap();
        b.process(&DocumentEvent::EndDocument {
            final_skeleton: Some("</html>".into()),
        })
        .unwrap();
        let registry = b.finish();
        assert_eq!(registry.locale.as_deref(), Some("en"));
        assert_eq!(registry.entries().len(), 1);
        assert_eq!(registry.entries()[0].text, "</html>");
    }
}
