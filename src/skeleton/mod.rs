//! Forward conversion: structural events to skeleton and plain-text contexts.
//!
//! The stages run in order over one per-document [`Registry`]:
//!
//! 1. [`builder`] consumes events and, through [`marker`], fills the registry
//!    with skeleton entries (markup with pointer tokens) and text units.
//! 2. [`pointer`] substitutes every pointer token and fixes unit offsets.
//! 3. [`context`] concatenates the result into the two contexts and emits the
//!    dual-offset unit records.
//!
//! The registry is an arena: entries and units are addressed by dense indices,
//! with a side table from the parser's string ids to entry indices.

pub mod builder;
pub mod context;
pub mod marker;
pub mod pointer;

use std::collections::HashMap;

use crate::annotation::InlineAnnotation;

/// Start of every pointer token: `[#$<id>]`.
pub const POINTER_PREFIX: &str = "[#$";
/// End of every pointer token.
pub const POINTER_SUFFIX: char = ']';
/// Where a fragment's own text goes in its skeleton template.
pub const SELF_PLACEHOLDER: &str = "[#$$self$]";
/// Start of a property placeholder: `[#$$self$@%<name>]`.
pub const PROPERTY_PREFIX: &str = "[#$$self$@%";
/// Reserved standoff marker, stripped from skeleton parts.
pub const STANDOFF_MARKER: &str = "[#$$self$@%standoff]";

/// The pointer token referencing `id`.
pub fn pointer_token(id: &str) -> String {
    format!("{POINTER_PREFIX}{id}{POINTER_SUFFIX}")
}

/// Id of the `n`-th run (1-based) of a split fragment.
pub fn sub_unit_id(base: &str, n: usize) -> String {
    format!("{base}-{n}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryRole {
    /// Emitted in document order.
    TopLevel,
    /// Reachable only by pointer substitution.
    Referent,
}

/// A text unit queued at a byte offset of its entry's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub unit: UnitId,
    pub offset: usize,
}

/// Literal skeleton text, possibly containing pointer tokens, with the units
/// that live in it.
#[derive(Debug, Clone)]
pub struct SkeletonEntry {
    pub key: String,
    pub text: String,
    pub role: EntryRole,
    pub placements: Vec<Placement>,
}

/// One contiguous extracted text run.
#[derive(Debug, Clone)]
pub struct TextUnit {
    pub key: String,
    /// Skeleton-escaped text, identical in both contexts.
    pub text: String,
    pub include_in_context: bool,
    /// Index of the fragment the unit came from.
    pub unit_set: usize,
}

/// An inline annotation found in coded text, anchored at unit-local byte
/// offsets until the plain-text context exists.
#[derive(Debug, Clone)]
pub struct PendingAnnotation {
    pub start: (UnitId, usize),
    pub end: (UnitId, usize),
    pub annotations: Vec<InlineAnnotation>,
}

/// Per-document store of skeleton entries and text units.
#[derive(Debug, Default)]
pub struct Registry {
    entries: Vec<SkeletonEntry>,
    units: Vec<TextUnit>,
    entry_ids: HashMap<String, EntryId>,
    /// Global ordering list: every entry in registration order.
    order: Vec<EntryId>,
    pub annotations: Vec<PendingAnnotation>,
    pub locale: Option<String>,
    pub document_name: Option<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_entry(&mut self, entry: SkeletonEntry) -> EntryId {
        let id = EntryId(self.entries.len());
        if let Some(previous) = self.entry_ids.insert(entry.key.clone(), id) {
            tracing::warn!(key = %entry.key, ?previous, "duplicate skeleton entry key, later entry wins");
        }
        self.order.push(id);
        self.entries.push(entry);
        id
    }

    pub fn push_unit(&mut self, unit: TextUnit) -> UnitId {
        let id = UnitId(self.units.len());
        self.units.push(unit);
        id
    }

    pub fn entry(&self, id: EntryId) -> &SkeletonEntry {
        &self.entries[id.0]
    }

    pub fn unit(&self, id: UnitId) -> &TextUnit {
        &self.units[id.0]
    }

    pub fn entries(&self) -> &[SkeletonEntry] {
        &self.entries
    }

    pub fn units(&self) -> &[TextUnit] {
        &self.units
    }

    pub fn order(&self) -> &[EntryId] {
        &self.order
    }

    pub fn entry_id(&self, key: &str) -> Option<EntryId> {
        self.entry_ids.get(key).copied()
    }

    /// Entries a pointer to `id` stands for: the entry keyed `id`, or else all
    /// numbered sub-entries `<id>-1`, `<id>-2`, ... in ascending order.
    pub fn pointer_targets(&self, id: &str) -> Vec<EntryId> {
        if let Some(exact) = self.entry_id(id) {
            return vec![exact];
        }
        (1..)
            .map(|n| self.entry_id(&sub_unit_id(id, n)))
            .take_while(Option::is_some)
            .flatten()
            .collect()
    }

    /// Whether any unit placed in `entry` belongs to the plain-text context.
    pub fn has_context_units(&self, entry: EntryId) -> bool {
        self.entry(entry)
            .placements
            .iter()
            .any(|p| self.unit(p.unit).include_in_context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn referent(registry: &mut Registry, key: &str, text: &str) -> EntryId {
        registry.push_entry(SkeletonEntry {
            key: key.into(),
            text: text.into(),
            role: EntryRole::Referent,
            placements: Vec::new(),
        })
    }

    #[test]
    fn tokens() {
        assert_eq!(pointer_token("tu3"), "[#$tu3]");
        assert_eq!(sub_unit_id("tu3", 2), "tu3-2");
        assert!(SELF_PLACEHOLDER.starts_with(POINTER_PREFIX));
        assert!(STANDOFF_MARKER.starts_with(PROPERTY_PREFIX));
    }

    #[test]
    fn pointer_targets_prefer_exact_then_numbered() {
        let mut registry = Registry::new();
        let exact = referent(&mut registry, "a", "A");
        let a1 = referent(&mut registry, "b-1", "B1");
        let a2 = referent(&mut registry, "b-2", "B2");
        referent(&mut registry, "b-4", "gap");

        assert_eq!(registry.pointer_targets("a"), vec![exact]);
        assert_eq!(registry.pointer_targets("b"), vec![a1, a2]);
        assert!(registry.pointer_targets("c").is_empty());
        assert_eq!(registry.order(), &[EntryId(0), EntryId(1), EntryId(2), EntryId(3)]);
    }
}
