//! Pointer resolution: substitute every `[#$<id>]` token and fix unit offsets.
//!
//! Resolution runs in two passes. The first tokenizes every entry into an
//! immutable list of literal segments and pointer segments, and pins each
//! queued unit to the literal segment that holds it. The second folds the
//! top-level entries, in emission order, into one flat buffer; pointer
//! segments recurse into their targets, and every unit's final offset is read
//! off the buffer length at the moment its segment is written.
//!
//! Entries are never mutated, so there is no in-place offset shifting to keep
//! consistent.

use std::ops::Range;

use crate::error::SkeletonError;

use super::{
    EntryId, EntryRole, POINTER_PREFIX, POINTER_SUFFIX, Registry, UnitId, pointer_token,
    sub_unit_id,
};

enum Segment {
    /// Byte range of literal text in the entry.
    Literal(Range<usize>),
    Pointer { id: String, targets: Vec<EntryId> },
}

struct EntryTree {
    segments: Vec<Segment>,
    /// Segment index, unit, and offset relative to the segment start.
    placements: Vec<(usize, UnitId, usize)>,
}

/// The flat skeleton with the final position of every unit.
#[derive(Debug, Clone)]
pub struct ResolvedSkeleton {
    pub skeleton: String,
    /// Byte offset of each unit in `skeleton`, `None` for units whose entry
    /// was never reached.
    pub unit_offsets: Vec<Option<usize>>,
    /// Top-level entry whose emission placed each unit.
    pub unit_home: Vec<Option<EntryId>>,
    /// Global ordering list after pointer re-splicing.
    pub order: Vec<EntryId>,
    /// Entries written to the skeleton, directly or through a pointer.
    pub consumed: Vec<bool>,
}

/// Resolve all pointer tokens of `registry` into one flat skeleton.
pub fn resolve(registry: &Registry) -> Result<ResolvedSkeleton, SkeletonError> {
    let trees = (0..registry.entries().len())
        .map(|i| tokenize(registry, EntryId(i)))
        .collect::<Result<Vec<_>, _>>()?;

    let unit_count = registry.units().len();
    let mut fold = Fold {
        registry,
        trees: &trees,
        out: String::new(),
        unit_offsets: vec![None; unit_count],
        unit_home: vec![None; unit_count],
        consumed: vec![false; registry.entries().len()],
        order: registry.order().to_vec(),
        stack: Vec::new(),
        substitutions: 0,
    };

    for &id in registry.order() {
        if registry.entry(id).role != EntryRole::TopLevel || fold.consumed[id.0] {
            continue;
        }
        fold.consumed[id.0] = true;
        fold.render(id, id)?;
    }

    let Fold {
        out,
        unit_offsets,
        unit_home,
        consumed,
        order,
        substitutions,
        ..
    } = fold;

    check_no_dangling(registry, &out, &unit_offsets)?;
    tracing::debug!(
        substitutions,
        skeleton_bytes = out.len(),
        "pointer tokens resolved"
    );

    Ok(ResolvedSkeleton {
        skeleton: out,
        unit_offsets,
        unit_home,
        order,
        consumed,
    })
}

fn tokenize(registry: &Registry, id: EntryId) -> Result<EntryTree, SkeletonError> {
    let entry = registry.entry(id);
    let text = entry.text.as_str();
    // Unit text is content, not markup: pointer-like sequences in it stay.
    let protected: Vec<Range<usize>> = entry
        .placements
        .iter()
        .map(|p| p.offset..p.offset + registry.unit(p.unit).text.len())
        .collect();

    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut search = 0;
    while let Some(found) = text[search..].find(POINTER_PREFIX) {
        let at = search + found;
        if let Some(range) = protected.iter().find(|r| r.contains(&at)) {
            search = range.end;
            continue;
        }
        let body = at + POINTER_PREFIX.len();
        let Some(close) = text[body..].find(POINTER_SUFFIX) else {
            break;
        };
        let pointer = &text[body..body + close];
        let targets = registry.pointer_targets(pointer);
        if targets.is_empty() {
            return Err(SkeletonError::MalformedPointer {
                id: pointer.to_string(),
                entry: entry.key.clone(),
            });
        }
        if at > literal_start {
            segments.push(Segment::Literal(literal_start..at));
        }
        segments.push(Segment::Pointer {
            id: pointer.to_string(),
            targets,
        });
        literal_start = body + close + POINTER_SUFFIX.len_utf8();
        search = literal_start;
    }
    if literal_start < text.len() {
        segments.push(Segment::Literal(literal_start..text.len()));
    }

    let mut placements = Vec::with_capacity(entry.placements.len());
    for placement in &entry.placements {
        let len = registry.unit(placement.unit).text.len();
        let holder = segments.iter().enumerate().find_map(|(i, s)| match s {
            Segment::Literal(r) if r.start <= placement.offset && placement.offset + len <= r.end => {
                Some((i, placement.offset - r.start))
            }
            _ => None,
        });
        let Some((segment, relative)) = holder else {
            return Err(SkeletonError::Placement {
                unit: registry.unit(placement.unit).key.clone(),
                entry: entry.key.clone(),
                offset: placement.offset,
            });
        };
        placements.push((segment, placement.unit, relative));
    }

    Ok(EntryTree {
        segments,
        placements,
    })
}

struct Fold<'r> {
    registry: &'r Registry,
    trees: &'r [EntryTree],
    out: String,
    unit_offsets: Vec<Option<usize>>,
    unit_home: Vec<Option<EntryId>>,
    consumed: Vec<bool>,
    order: Vec<EntryId>,
    /// Entries currently being rendered, for cycle detection.
    stack: Vec<EntryId>,
    substitutions: usize,
}

impl Fold<'_> {
    fn render(&mut self, id: EntryId, home: EntryId) -> Result<(), SkeletonError> {
        let registry = self.registry;
        let trees = self.trees;
        let entry = registry.entry(id);
        let tree = &trees[id.0];

        self.stack.push(id);
        for (index, segment) in tree.segments.iter().enumerate() {
            match segment {
                Segment::Literal(range) => {
                    let base = self.out.len();
                    for &(seg, unit, relative) in &tree.placements {
                        if seg == index {
                            self.unit_offsets[unit.0] = Some(base + relative);
                            self.unit_home[unit.0] = Some(home);
                        }
                    }
                    self.out.push_str(&entry.text[range.clone()]);
                }
                Segment::Pointer { id: pointer, targets } => {
                    let before = self.out.len();
                    for &target in targets {
                        if self.stack.contains(&target) {
                            return Err(SkeletonError::UnresolvedPointerRemaining {
                                count: 1,
                                sample: pointer_token(pointer),
                            });
                        }
                        if self.consumed[target.0] {
                            tracing::warn!(
                                pointer = %pointer,
                                target = %registry.entry(target).key,
                                "skeleton entry referenced more than once, writing it again"
                            );
                        }
                        self.consumed[target.0] = true;
                        self.render(target, home)?;
                    }
                    let token_len = pointer_token(pointer).len();
                    let delta = (self.out.len() - before) as isize - token_len as isize;
                    tracing::debug!(entry = %entry.key, pointer = %pointer, delta, "pointer substituted");
                    self.substitutions += 1;
                    self.reorder(id, pointer, targets);
                }
            }
        }
        self.stack.pop();
        Ok(())
    }

    /// Move the referencing entry into the referenced entry's place in the
    /// global ordering list, when the referenced text is in context.
    ///
    /// The referenced position is looked up by exact key first, then by the
    /// first numbered sub-entry only.
    fn reorder(&mut self, referencing: EntryId, pointer: &str, targets: &[EntryId]) {
        let registry = self.registry;
        if !targets.iter().any(|&t| registry.has_context_units(t)) {
            return;
        }
        let position = |order: &[EntryId], key: &str| {
            registry
                .entry_id(key)
                .and_then(|id| order.iter().position(|&e| e == id))
        };
        let Some(target_pos) = position(&self.order, pointer)
            .or_else(|| position(&self.order, &sub_unit_id(pointer, 1)))
        else {
            return;
        };
        let Some(referencing_pos) = self.order.iter().position(|&e| e == referencing) else {
            return;
        };
        if referencing_pos == target_pos {
            return;
        }
        let moved = self.order.remove(referencing_pos);
        let at = if referencing_pos < target_pos {
            target_pos - 1
        } else {
            target_pos
        };
        self.order.insert(at, moved);
    }
}

/// Fail if any pointer prefix survives outside of placed unit text.
fn check_no_dangling(
    registry: &Registry,
    skeleton: &str,
    unit_offsets: &[Option<usize>],
) -> Result<(), SkeletonError> {
    let protected: Vec<Range<usize>> = unit_offsets
        .iter()
        .enumerate()
        .filter_map(|(i, offset)| offset.map(|o| o..o + registry.unit(UnitId(i)).text.len()))
        .collect();

    let dangling: Vec<usize> = skeleton
        .match_indices(POINTER_PREFIX)
        .map(|(at, _)| at)
        .filter(|at| !protected.iter().any(|r| r.contains(at)))
        .collect();

    match dangling.first() {
        None => Ok(()),
        Some(&at) => {
            let end = skeleton[at..]
                .find(POINTER_SUFFIX)
                .map_or(skeleton.len(), |e| at + e + POINTER_SUFFIX.len_utf8());
            Err(SkeletonError::UnresolvedPointerRemaining {
                count: dangling.len(),
                sample: skeleton[at..end].to_string(),
            })
        }
    }
}
