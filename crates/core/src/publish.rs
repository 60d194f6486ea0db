//! Anomaly-to-diagnostic mapping and per-document replace-only publishing.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::document::Span;
use crate::index::EntityIndex;
use crate::reconcile::{Anomaly, AnomalyCode, Severity};

/// An anomaly pinned to a source range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub span: Span,
    pub severity: Severity,
    pub message: String,
    pub code: AnomalyCode,
}

/// Map anomalies onto ranges, one diagnostic each, then drop exact duplicates
/// (same span and message) keeping the first.
pub fn to_diagnostics(anomalies: &[Anomaly], index: &EntityIndex) -> Vec<Diagnostic> {
    let mut seen: HashSet<(Span, String)> = HashSet::new();
    let mut out = Vec::with_capacity(anomalies.len());
    for anomaly in anomalies {
        let location = anomaly.location(index);
        if !seen.insert((location.span, anomaly.message.clone())) {
            continue;
        }
        out.push(Diagnostic {
            span: location.span,
            severity: anomaly.severity,
            message: anomaly.message.clone(),
            code: anomaly.code,
        });
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The document's diagnostic set was replaced with this one.
    Replaced(Vec<Diagnostic>),
    /// An older revision arrived after a newer one was published.
    Stale { current: u64 },
}

#[derive(Debug, Clone)]
struct Published {
    revision: u64,
    diagnostics: Vec<Diagnostic>,
}

/// Holds the last published diagnostic set per document.
#[derive(Debug, Default)]
pub struct DiagnosticPublisher {
    published: HashMap<String, Published>,
}

impl DiagnosticPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the set for `uri` unless `revision` is older than the one
    /// already published.
    pub fn publish(
        &mut self,
        uri: &str,
        revision: u64,
        anomalies: &[Anomaly],
        index: &EntityIndex,
    ) -> PublishOutcome {
        if let Some(last) = self.published.get(uri) {
            if revision < last.revision {
                return PublishOutcome::Stale {
                    current: last.revision,
                };
            }
        }
        let diagnostics = to_diagnostics(anomalies, index);
        self.published.insert(
            uri.to_owned(),
            Published {
                revision,
                diagnostics: diagnostics.clone(),
            },
        );
        PublishOutcome::Replaced(diagnostics)
    }

    pub fn current(&self, uri: &str) -> Option<&[Diagnostic]> {
        self.published.get(uri).map(|p| p.diagnostics.as_slice())
    }

    pub fn last_revision(&self, uri: &str) -> Option<u64> {
        self.published.get(uri).map(|p| p.revision)
    }

    pub fn close(&mut self, uri: &str) {
        self.published.remove(uri);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentSnapshot;
    use crate::reconcile::reconcile;

    const DOC: &str = "blocks:\n  - name: a\n    from: r/a\n";

    #[test]
    fn every_anomaly_yields_a_diagnostic() {
        let doc = DocumentSnapshot::new(DOC, 1);
        let index = EntityIndex::build(&doc);
        let anomalies = reconcile(&doc, None);
        let diagnostics = to_diagnostics(&anomalies, &index);
        assert_eq!(diagnostics.len(), anomalies.len());
        assert_eq!(diagnostics[0].span.start.line, 2);
        assert_eq!(diagnostics[1].span, Span::document_start());
    }

    #[test]
    fn duplicates_collapse() {
        let doc = DocumentSnapshot::new(DOC, 1);
        let index = EntityIndex::build(&doc);
        let mut anomalies = reconcile(&doc, None);
        anomalies.extend(anomalies.clone());
        assert_eq!(to_diagnostics(&anomalies, &index).len(), 2);
    }

    #[test]
    fn older_revision_is_stale() {
        let doc = DocumentSnapshot::new(DOC, 2);
        let index = EntityIndex::build(&doc);
        let anomalies = reconcile(&doc, None);
        let mut publisher = DiagnosticPublisher::new();
        assert!(matches!(
            publisher.publish("file:///w.yaml", 2, &anomalies, &index),
            PublishOutcome::Replaced(_)
        ));
        let before = publisher.current("file:///w.yaml").map(<[_]>::to_vec);
        assert_eq!(
            publisher.publish("file:///w.yaml", 1, &[], &index),
            PublishOutcome::Stale { current: 2 }
        );
        assert_eq!(publisher.current("file:///w.yaml").map(<[_]>::to_vec), before);
        publisher.close("file:///w.yaml");
        assert_eq!(publisher.last_revision("file:///w.yaml"), None);
    }
}
