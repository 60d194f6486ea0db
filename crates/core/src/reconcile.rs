//! Snapshot reconciliation: semantic snapshot + raw text → anomalies.
//!
//! Three rule sets feed the result:
//!
//! - snapshot rules, run only when the oracle produced a snapshot, trust its
//!   resolved values (defaults and inheritance already applied);
//! - raw-text rules always run and inspect literal source values that the
//!   snapshot normalizes away, one entity at a time;
//! - fallback rules replace the snapshot rules when no snapshot exists and
//!   check only the non-negotiable identity fields.
//!
//! Results are unioned, never suppressed by one another, then ordered by the
//! best-known source line.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::document::DocumentSnapshot;
use crate::index::{EntityIndex, FieldEntry, Location, Precision};
use crate::snapshot::SemanticValue;
use crate::vocabulary::Vocabulary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Information,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnomalyCode {
    MissingField,
    BlockMissingName,
    UnknownBlockKind,
    ActionMissingName,
    ActionMissingDirective,
    FloatingVersion,
    UnpinnedVersion,
}

impl AnomalyCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyCode::MissingField => "missing-field",
            AnomalyCode::BlockMissingName => "block-missing-name",
            AnomalyCode::UnknownBlockKind => "unknown-block-kind",
            AnomalyCode::ActionMissingName => "action-missing-name",
            AnomalyCode::ActionMissingDirective => "action-missing-directive",
            AnomalyCode::FloatingVersion => "floating-version",
            AnomalyCode::UnpinnedVersion => "unpinned-version",
        }
    }
}

impl std::fmt::Display for AnomalyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A problem found before it is mapped onto a source range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anomaly {
    pub severity: Severity,
    /// Block or action identity; `None` for document-level findings.
    pub subject: Option<String>,
    /// Field the finding is about, used to narrow the range.
    pub field: Option<String>,
    pub message: String,
    pub code: AnomalyCode,
    /// Set when the rule knows which occurrence it inspected, so duplicated
    /// identities and unnamed items still map to their own lines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl Anomaly {
    fn new(
        severity: Severity,
        code: AnomalyCode,
        subject: Option<&str>,
        field: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        Anomaly {
            severity,
            subject: subject.map(str::to_owned),
            field: field.map(str::to_owned),
            message: message.into(),
            code,
            location: None,
        }
    }

    fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// The pinned occurrence if any, else the first match for subject and field.
    pub fn location(&self, index: &EntityIndex) -> Location {
        self.location
            .unwrap_or_else(|| index.locate(self.subject.as_deref(), self.field.as_deref()))
    }
}

/// Reconcile with the default vocabulary, building the index on the fly.
pub fn reconcile(doc: &DocumentSnapshot, snapshot: Option<&SemanticValue>) -> Vec<Anomaly> {
    let vocabulary = Vocabulary::default();
    let index = EntityIndex::build_with(doc, &vocabulary);
    reconcile_with(&index, snapshot, &vocabulary)
}

/// Reconcile against a prebuilt index of the same document revision.
pub fn reconcile_with(
    index: &EntityIndex,
    snapshot: Option<&SemanticValue>,
    vocabulary: &Vocabulary,
) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();
    match snapshot {
        Some(snapshot) => snapshot_rules(snapshot, index, vocabulary, &mut anomalies),
        None => fallback_rules(index, vocabulary, &mut anomalies),
    }
    raw_text_rules(index, vocabulary, &mut anomalies);
    order_by_line(index, anomalies)
}

// ── Snapshot rules ───────────────────────────────────────────────────

/// Snapshot blocks are matched to text occurrences by name and ordinal, so
/// the second `a` in the snapshot reports on the second `a` in the text.
fn snapshot_rules(
    snapshot: &SemanticValue,
    index: &EntityIndex,
    vocab: &Vocabulary,
    out: &mut Vec<Anomaly>,
) {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for field in &vocab.required_fields {
        if snapshot.get(field).non_empty_str().is_none() {
            out.push(Anomaly::new(
                Severity::Error,
                AnomalyCode::MissingField,
                None,
                Some(field.as_str()),
                format!("missing required field `{field}`"),
            ));
        }
    }

    for (i, block) in snapshot.get("blocks").as_sequence().iter().enumerate() {
        let Some(name) = block.get("name").non_empty_str() else {
            out.push(Anomaly::new(
                Severity::Error,
                AnomalyCode::BlockMissingName,
                None,
                Some("blocks"),
                format!("block #{} has no `name`", i + 1),
            ));
            continue;
        };
        let ordinal = seen.entry(name).or_default();
        let nth = *ordinal;
        *ordinal += 1;

        match block.get("kind").non_empty_str() {
            Some(kind) if vocab.is_block_kind(kind) => {}
            Some(kind) => out.push(
                Anomaly::new(
                    Severity::Error,
                    AnomalyCode::UnknownBlockKind,
                    Some(name),
                    Some("kind"),
                    format!(
                        "block `{name}` has unknown kind `{kind}`; expected one of: {}",
                        vocab.block_kinds.join(", ")
                    ),
                )
                .at(index.locate_nth(name, nth, Some("kind"))),
            ),
            None => out.push(
                Anomaly::new(
                    Severity::Error,
                    AnomalyCode::UnknownBlockKind,
                    Some(name),
                    Some("kind"),
                    format!("block `{name}` has no `kind`"),
                )
                .at(index.locate_nth(name, nth, Some("kind"))),
            ),
        }

        for (j, action) in block.get("actions").as_sequence().iter().enumerate() {
            let Some(action_name) = action.get("name").non_empty_str() else {
                out.push(
                    Anomaly::new(
                        Severity::Error,
                        AnomalyCode::ActionMissingName,
                        Some(name),
                        Some("actions"),
                        format!("action #{} of block `{name}` has no `name`", j + 1),
                    )
                    .at(index.locate_nth(name, nth, Some("actions"))),
                );
                continue;
            };
            let executable = vocab
                .executable_directives
                .iter()
                .any(|d| action.get(d).non_empty_str().is_some());
            if !executable {
                let identity = format!("{name}.{action_name}");
                let anomaly = Anomaly::new(
                    Severity::Error,
                    AnomalyCode::ActionMissingDirective,
                    Some(identity.as_str()),
                    None,
                    format!(
                        "action `{action_name}` of block `{name}` needs one of: {}",
                        vocab.executable_directives.join(", ")
                    ),
                );
                out.push(match action_in_block(index, name, nth, &identity) {
                    Some(location) => anomaly.at(location),
                    None => anomaly,
                });
            }
        }
    }
}

/// The first `identity` action inside the `nth` block called `block`.
fn action_in_block(index: &EntityIndex, block: &str, nth: usize, identity: &str) -> Option<Location> {
    let owner = index.entries_named(block).nth(nth)?;
    index
        .entries_named(identity)
        .find(|action| owner.extent.contains_line(action.reference.span.start.line))
        .map(|action| Location {
            span: action.reference.span,
            precision: Precision::Entity,
        })
}

// ── Fallback rules ───────────────────────────────────────────────────

fn fallback_rules(index: &EntityIndex, vocab: &Vocabulary, out: &mut Vec<Anomaly>) {
    for field in &vocab.fallback_required_fields {
        let present = index
            .top_level_field(field)
            .and_then(|f| f.value.as_deref())
            .is_some_and(|v| !v.trim().is_empty());
        if !present {
            out.push(Anomaly::new(
                Severity::Error,
                AnomalyCode::MissingField,
                None,
                Some(field.as_str()),
                format!("missing required field `{field}`"),
            ));
        }
    }
}

// ── Raw-text rules ───────────────────────────────────────────────────

/// Version-reference checks, evaluated for every occurrence independently.
fn raw_text_rules(index: &EntityIndex, vocab: &Vocabulary, out: &mut Vec<Anomaly>) {
    for field_name in &vocab.version_fields {
        for (owner, field) in index.fields_named(field_name) {
            let subject = owner.map(|e| e.reference.identity.as_str());
            let who = subject.map_or_else(|| "document".to_string(), |s| format!("`{s}`"));
            check_version(field, subject, &who, vocab, out);
        }
        for field in index.unnamed_fields_named(field_name) {
            check_version(field, None, "unnamed entry", vocab, out);
        }
    }
}

fn check_version(
    field: &FieldEntry,
    subject: Option<&str>,
    who: &str,
    vocab: &Vocabulary,
    out: &mut Vec<Anomaly>,
) {
    let Some(value) = field.value.as_deref().map(str::trim).filter(|v| !v.is_empty()) else {
        return;
    };
    let here = Location {
        span: field.reference.span,
        precision: Precision::Field,
    };
    let anomaly = match version_of(value) {
        Some(tag) if vocab.is_floating_tag(tag) => Anomaly::new(
            Severity::Warning,
            AnomalyCode::FloatingVersion,
            subject,
            Some(field.name.as_str()),
            format!("{who} references `{value}`, which floats to `{tag}`; pin an explicit version"),
        ),
        Some(_) => return,
        None => Anomaly::new(
            Severity::Warning,
            AnomalyCode::UnpinnedVersion,
            subject,
            Some(field.name.as_str()),
            format!("{who} references `{value}` without a version; append `:<version>` to pin it"),
        ),
    };
    out.push(anomaly.at(here));
}

/// The version tag of a reference such as `registry/x:1.2` or `x@sha256:..`.
///
/// Only the final path segment is inspected, so a `host:port` prefix is not
/// mistaken for a tag. A bare `latest` counts as a tag.
fn version_of(reference: &str) -> Option<&str> {
    let segment = reference.rsplit('/').next().unwrap_or(reference);
    if let Some((_, digest)) = segment.split_once('@') {
        return Some(digest).filter(|d| !d.is_empty());
    }
    if let Some((_, tag)) = segment.rsplit_once(':') {
        return Some(tag).filter(|t| !t.is_empty());
    }
    if segment.eq_ignore_ascii_case("latest") {
        return Some(segment);
    }
    None
}

// ── Ordering ─────────────────────────────────────────────────────────

/// Stable sort by resolved line; document-level fallbacks go last.
fn order_by_line(index: &EntityIndex, anomalies: Vec<Anomaly>) -> Vec<Anomaly> {
    let mut keyed: Vec<((bool, usize, usize), Anomaly)> = anomalies
        .into_iter()
        .map(|a| {
            let loc = a.location(index);
            let unresolved = loc.precision == Precision::Document;
            ((unresolved, loc.span.start.line, loc.span.start.character), a)
        })
        .collect();
    keyed.sort_by_key(|(key, _)| *key);
    keyed.into_iter().map(|(_, a)| a).collect()
}
