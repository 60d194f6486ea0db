//! Entity index: named blocks, actions and their fields mapped to source spans.
//!
//! Built in one pass over the document, driven by [`ScopeScanner`] events.
//! Field lookups are scoped to the extent of the owning entity so that two
//! blocks defining the same field never resolve to each other's lines.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::document::{DocumentSnapshot, Position, Span};
use crate::scope::{entity_frames, KeyValue, Line, ScopeEvent, ScopeFrame, ScopeScanner};
use crate::vocabulary::Vocabulary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Block,
    Action,
    Field,
}

/// A defining occurrence of an entity or field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    /// `alpha`, `alpha.plan`, `alpha.from`, or a bare top-level field name.
    pub identity: String,
    /// Span of the defining token.
    pub span: Span,
}

/// A field occurrence with its raw scalar value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldEntry {
    pub name: String,
    pub reference: EntityRef,
    pub value: Option<String>,
}

/// An indexed block or action together with its extent and fields.
#[derive(Debug, Clone)]
pub struct EntityEntry {
    pub reference: EntityRef,
    /// From the `- ` marker line through the item's last non-blank line.
    pub extent: Span,
    pub fields: Vec<FieldEntry>,
}

impl EntityEntry {
    /// First occurrence of `name` within this entity's extent.
    pub fn field(&self, name: &str) -> Option<&FieldEntry> {
        self.fields
            .iter()
            .filter(|f| self.extent.contains_line(f.reference.span.start.line))
            .find(|f| f.name == name)
    }
}

/// How precisely [`EntityIndex::locate`] resolved a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Field,
    Entity,
    Document,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub span: Span,
    pub precision: Precision,
}

#[derive(Debug, Clone, Default)]
pub struct EntityIndex {
    entries: Vec<EntityEntry>,
    by_identity: HashMap<String, Vec<usize>>,
    top_level: Vec<FieldEntry>,
    /// Fields of items that sit where a block or action would, but never got a name.
    unnamed: Vec<FieldEntry>,
    revision: u64,
}

/// An item frame still open during the build.
struct OpenItem {
    start_line: usize,
    entry: Option<usize>,
    name_span: Option<Span>,
    pending: Vec<FieldEntry>,
    /// Would be indexed as an entity if it carried a name.
    entity_position: bool,
}

impl EntityIndex {
    pub fn build(doc: &DocumentSnapshot) -> Self {
        Self::build_with(doc, &Vocabulary::default())
    }

    pub fn build_with(doc: &DocumentSnapshot, vocabulary: &Vocabulary) -> Self {
        let mut index = EntityIndex {
            revision: doc.revision(),
            ..Default::default()
        };
        let mut scanner = ScopeScanner::new(vocabulary);
        let mut open: Vec<OpenItem> = Vec::new();

        for (line_no, text) in doc.lines() {
            let scan = scanner.feed(line_no, text);
            for event in scan.events {
                match event {
                    ScopeEvent::Closed { frame, end_line } if frame.is_item() => {
                        index.close_item(open.pop(), end_line);
                    }
                    ScopeEvent::Opened(frame) if frame.is_item() => open.push(OpenItem {
                        start_line: frame.start_line,
                        entry: None,
                        name_span: None,
                        pending: Vec::new(),
                        entity_position: in_entity_position(scanner.stack(), scanner.vocabulary()),
                    }),
                    _ => {}
                }
            }

            match &scan.line {
                Line::Item { entry: Some(kv), .. } => {
                    if let Some(item) = open.last_mut() {
                        item.take_field(line_no, kv);
                    }
                }
                Line::Key { indent, entry: kv } => {
                    let parent = scanner.stack().get(scan.parent_depth.wrapping_sub(1));
                    if scan.parent_depth == 1 && *indent == 0 {
                        index.top_level.push(field_entry(line_no, kv, kv.key.to_string()));
                    } else if parent.is_some_and(|p| p.is_item() && p.body_column == Some(*indent))
                    {
                        if let Some(item) = open.last_mut() {
                            item.take_field(line_no, kv);
                        }
                    }
                }
                _ => {}
            }

            let Some(item) = open.last_mut() else {
                continue;
            };
            if item.entry.is_none() {
                let stack = scanner.stack();
                let innermost_item = stack.iter().rposition(|f| f.is_item());
                let entities = entity_frames(stack, scanner.vocabulary());
                if let Some((_, kind, identity)) =
                    entities.last().filter(|(i, _, _)| Some(*i) == innermost_item)
                {
                    let at = index.entries.len();
                    index.entries.push(EntityEntry {
                        reference: EntityRef {
                            kind: *kind,
                            identity: identity.clone(),
                            span: item
                                .name_span
                                .unwrap_or_else(|| Span::on_line(item.start_line, 0, 0)),
                        },
                        extent: Span::new(
                            Position::new(item.start_line, 0),
                            Position::new(line_no, 0),
                        ),
                        fields: Vec::new(),
                    });
                    index.by_identity.entry(identity.clone()).or_default().push(at);
                    item.entry = Some(at);
                }
            }
            if let Some(at) = item.entry {
                let entry = &mut index.entries[at];
                for mut field in item.pending.drain(..) {
                    field.reference.identity = format!("{}.{}", entry.reference.identity, field.name);
                    entry.fields.push(field);
                }
            }
        }

        for event in scanner.finish() {
            if let ScopeEvent::Closed { frame, end_line } = event {
                if frame.is_item() {
                    index.close_item(open.pop(), end_line);
                }
            }
        }

        tracing::trace!(
            revision = index.revision,
            entities = index.entries.len(),
            "entity index built"
        );
        index
    }

    fn close_item(&mut self, item: Option<OpenItem>, end_line: usize) {
        let Some(item) = item else {
            return;
        };
        match item.entry {
            Some(at) => {
                let entry = &mut self.entries[at];
                let end = end_line.max(entry.extent.start.line);
                entry.extent.end = Position::new(end, usize::MAX);
            }
            None if item.entity_position => self.unnamed.extend(item.pending),
            None => {}
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.top_level.is_empty() && self.unnamed.is_empty()
    }

    /// Blocks and actions in document order.
    pub fn entities(&self) -> impl Iterator<Item = &EntityEntry> {
        self.entries.iter()
    }

    /// Top-level (column 0) fields in document order.
    pub fn top_level_fields(&self) -> &[FieldEntry] {
        &self.top_level
    }

    pub fn top_level_field(&self, name: &str) -> Option<&FieldEntry> {
        self.top_level.iter().find(|f| f.name == name)
    }

    /// First definition of a block or action.
    pub fn entry(&self, identity: &str) -> Option<&EntityEntry> {
        let first = *self.by_identity.get(identity)?.first()?;
        self.entries.get(first)
    }

    /// First definition of a block or action, else of a field identity.
    pub fn resolve(&self, identity: &str) -> Option<&EntityRef> {
        if let Some(entry) = self.entry(identity) {
            return Some(&entry.reference);
        }
        if let Some(field) = self.top_level_field(identity) {
            return Some(&field.reference);
        }
        let (owner, field) = identity.rsplit_once('.')?;
        self.entry(owner)?.field(field).map(|f| &f.reference)
    }

    /// Every definition of a block or action, in document order.
    pub fn resolve_all(&self, identity: &str) -> Vec<&EntityRef> {
        self.entries_named(identity).map(|e| &e.reference).collect()
    }

    /// Every entry sharing `identity`, in document order.
    pub fn entries_named<'a>(&'a self, identity: &str) -> impl Iterator<Item = &'a EntityEntry> + 'a {
        self.by_identity
            .get(identity)
            .into_iter()
            .flatten()
            .filter_map(|i| self.entries.get(*i))
    }

    /// Like [`locate`](Self::locate) for the `ordinal`-th definition of a
    /// duplicated identity. Falls back to the first one when there are fewer.
    pub fn locate_nth(&self, subject: &str, ordinal: usize, field: Option<&str>) -> Location {
        match self.entries_named(subject).nth(ordinal) {
            Some(entry) => {
                let (span, precision) = match field.and_then(|name| entry.field(name)) {
                    Some(f) => (f.reference.span, Precision::Field),
                    None => (entry.reference.span, Precision::Entity),
                };
                Location { span, precision }
            }
            None => self.locate(Some(subject), field),
        }
    }

    /// Span of `field` inside `entity`, or of the entity's identity token when
    /// the field is missing. `None` only when the entity is unknown.
    pub fn resolve_field(&self, entity: &str, field: &str) -> Option<Span> {
        let entry = self.entry(entity)?;
        Some(entry.field(field).map_or(entry.reference.span, |f| f.reference.span))
    }

    /// Total resolution with a document-start fallback.
    ///
    /// `subject: None` addresses top-level fields.
    pub fn locate(&self, subject: Option<&str>, field: Option<&str>) -> Location {
        let hit = match subject {
            Some(entity) => self.entry(entity).map(|entry| {
                match field.and_then(|name| entry.field(name)) {
                    Some(f) => (f.reference.span, Precision::Field),
                    None => (entry.reference.span, Precision::Entity),
                }
            }),
            None => field
                .and_then(|name| self.top_level_field(name))
                .map(|f| (f.reference.span, Precision::Field)),
        };
        let (span, precision) = hit.unwrap_or((Span::document_start(), Precision::Document));
        Location { span, precision }
    }

    /// Every field called `name`, top-level first, then per entity in
    /// document order. The owner is `None` for top-level fields.
    pub fn fields_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = (Option<&'a EntityEntry>, &'a FieldEntry)> + 'a {
        let top = self
            .top_level
            .iter()
            .filter(move |f| f.name == name)
            .map(|f| (None, f));
        let nested = self.entries.iter().flat_map(move |e| {
            e.fields
                .iter()
                .filter(move |f| f.name == name)
                .map(move |f| (Some(e), f))
        });
        top.chain(nested)
    }

    /// Fields called `name` on unnamed block or action items.
    pub fn unnamed_fields_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a FieldEntry> + 'a {
        self.unnamed.iter().filter(move |f| f.name == name)
    }

    /// The innermost block whose extent covers `line`.
    pub fn block_at_line(&self, line: usize) -> Option<&EntityEntry> {
        self.entries
            .iter()
            .filter(|e| e.reference.kind == EntityKind::Block && e.extent.contains_line(line))
            .max_by_key(|e| e.extent.start.line)
    }

    /// The innermost entity whose extent covers `line`.
    pub fn entity_at_line(&self, line: usize) -> Option<&EntityEntry> {
        self.entries
            .iter()
            .filter(|e| e.extent.contains_line(line))
            .max_by_key(|e| e.extent.start.line)
    }
}

impl OpenItem {
    fn take_field(&mut self, line_no: usize, kv: &KeyValue<'_>) {
        if kv.key == "name" && kv.value.is_some() && self.name_span.is_none() {
            self.name_span = Some(Span::on_line(line_no, kv.value_start, kv.value_end));
        }
        self.pending.push(field_entry(line_no, kv, kv.key.to_string()));
    }
}

/// Whether the innermost item on `stack` is placed where a block or action
/// would be recognised once it has a name.
fn in_entity_position(stack: &[ScopeFrame], vocabulary: &Vocabulary) -> bool {
    let Some(at) = stack.iter().rposition(ScopeFrame::is_item) else {
        return false;
    };
    let mut named = stack[..=at].to_vec();
    if named[at].name.is_none() {
        named[at].name = Some(String::new());
    }
    entity_frames(&named, vocabulary)
        .last()
        .is_some_and(|(i, _, _)| *i == at)
}

fn field_entry(line_no: usize, kv: &KeyValue<'_>, identity: String) -> FieldEntry {
    let end = if kv.value.is_some() { kv.value_end } else { kv.key_end };
    FieldEntry {
        name: kv.key.to_string(),
        reference: EntityRef {
            kind: EntityKind::Field,
            identity,
            span: Span::on_line(line_no, kv.key_start, end),
        },
        value: kv.value.clone(),
    }
}
