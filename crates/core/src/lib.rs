//! blockyard-core: structural context and diagnostic correlation for
//! workspace/block configuration documents.
//!
//! The crate never performs I/O. It works on a [`DocumentSnapshot`] of one
//! document revision and, optionally, a position-less [`SemanticValue`]
//! produced by the external validation tool.
//!
//! # Pipeline
//!
//! - [`scope`] -- indentation scope stack over raw text
//! - [`index`] -- entity identity to source span, scoped field lookup
//! - [`reconcile`] -- snapshot + raw-text rules to [`Anomaly`] records
//! - [`publish`] -- anomalies to ranged [`Diagnostic`]s, replace-only per revision
//! - [`context`] -- entity/section at a cursor position

pub mod context;
pub mod document;
pub mod index;
pub mod publish;
pub mod reconcile;
pub mod scope;
pub mod snapshot;
pub mod vocabulary;

// ── Convenience re-exports ───────────────────────────────────────────

pub use context::{context_at, context_at_with, Context};
pub use document::{DocumentSnapshot, Position, Span};
pub use index::{EntityEntry, EntityIndex, EntityKind, EntityRef, FieldEntry, Location, Precision};
pub use publish::{to_diagnostics, Diagnostic, DiagnosticPublisher, PublishOutcome};
pub use reconcile::{reconcile, reconcile_with, Anomaly, AnomalyCode, Severity};
pub use scope::{scopes_at, scopes_at_with, ScopeFrame, ScopeKind};
pub use snapshot::SemanticValue;
pub use vocabulary::Vocabulary;
