//! Conversion from engine diagnostics to `lsp_types`.
//!
//! Columns are passed through as character offsets. The engine counts
//! `char`s, which matches UTF-16 for everything outside the astral planes.

use blockyard_core::{Diagnostic, Position, Severity, Span};
use lsp_types::{DiagnosticSeverity, NumberOrString, PublishDiagnosticsParams, Range, Uri};

pub const SOURCE: &str = "blockyard";

pub fn to_lsp_position(position: Position) -> lsp_types::Position {
    lsp_types::Position::new(clamp(position.line), clamp(position.character))
}

pub fn from_lsp_position(position: lsp_types::Position) -> Position {
    Position::new(position.line as usize, position.character as usize)
}

pub fn to_lsp_range(span: Span) -> Range {
    Range::new(to_lsp_position(span.start), to_lsp_position(span.end))
}

fn clamp(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

pub fn to_lsp_severity(severity: Severity) -> DiagnosticSeverity {
    match severity {
        Severity::Error => DiagnosticSeverity::ERROR,
        Severity::Warning => DiagnosticSeverity::WARNING,
        Severity::Information => DiagnosticSeverity::INFORMATION,
    }
}

pub fn to_lsp_diagnostic(diagnostic: &Diagnostic) -> lsp_types::Diagnostic {
    lsp_types::Diagnostic {
        range: to_lsp_range(diagnostic.span),
        severity: Some(to_lsp_severity(diagnostic.severity)),
        code: Some(NumberOrString::String(diagnostic.code.as_str().to_string())),
        source: Some(SOURCE.to_string()),
        message: diagnostic.message.clone(),
        ..Default::default()
    }
}

/// The full replacement set for one document.
pub fn publish_params(
    uri: Uri,
    diagnostics: &[Diagnostic],
    version: Option<i32>,
) -> PublishDiagnosticsParams {
    PublishDiagnosticsParams {
        uri,
        diagnostics: diagnostics.iter().map(to_lsp_diagnostic).collect(),
        version,
    }
}
