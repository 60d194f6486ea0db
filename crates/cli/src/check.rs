//! `blockyard check`: reconcile one document and print its diagnostics.

use std::path::{Path, PathBuf};
use std::process;

use blockyard_core::{
    reconcile_with, to_diagnostics, Diagnostic, DocumentSnapshot, EntityIndex, SemanticValue,
    Severity,
};
use blockyard_lsp::config::ServerConfig;
use blockyard_lsp::oracle::{CommandOracle, Oracle};
use blockyard_lsp::workspace::find_project_root;
use serde::Serialize;

use crate::{read_source, report_error, OutputFormat};

/// Where the semantic snapshot comes from.
pub(crate) enum SnapshotSource {
    /// Raw-text and fallback rules only.
    Skip,
    File(PathBuf),
    Oracle { block: Option<String> },
}

impl SnapshotSource {
    pub(crate) fn from_flags(
        snapshot: Option<PathBuf>,
        oracle: bool,
        block: Option<String>,
    ) -> Self {
        match (snapshot, oracle) {
            (Some(path), _) => SnapshotSource::File(path),
            (None, true) => SnapshotSource::Oracle { block },
            (None, false) => SnapshotSource::Skip,
        }
    }
}

#[derive(Serialize)]
struct CheckReport<'a> {
    file: String,
    snapshot: bool,
    diagnostics: &'a [Diagnostic],
}

pub(crate) fn cmd_check(
    file: &Path,
    source: SnapshotSource,
    config: &ServerConfig,
    output: OutputFormat,
    quiet: bool,
) {
    let text = read_source(file, output, quiet);
    let snapshot = load_snapshot(file, source, config, output, quiet);

    let doc = DocumentSnapshot::new(&text, 1);
    let index = EntityIndex::build_with(&doc, &config.vocabulary);
    let anomalies = reconcile_with(&index, snapshot.as_ref(), &config.vocabulary);
    let diagnostics = to_diagnostics(&anomalies, &index);
    let errors = count(&diagnostics, Severity::Error);

    match output {
        OutputFormat::Json => {
            let report = CheckReport {
                file: file.display().to_string(),
                snapshot: snapshot.is_some(),
                diagnostics: &diagnostics,
            };
            let json = serde_json::to_string_pretty(&report)
                .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e));
            println!("{}", json);
        }
        OutputFormat::Text => {
            for d in &diagnostics {
                println!(
                    "{}:{}:{}: {}[{}]: {}",
                    file.display(),
                    d.span.start.line + 1,
                    d.span.start.character + 1,
                    severity_label(d.severity),
                    d.code,
                    d.message
                );
            }
            if !quiet {
                println!(
                    "{} error(s), {} warning(s)",
                    errors,
                    count(&diagnostics, Severity::Warning)
                );
            }
        }
    }

    if errors > 0 {
        process::exit(1);
    }
}

fn load_snapshot(
    file: &Path,
    source: SnapshotSource,
    config: &ServerConfig,
    output: OutputFormat,
    quiet: bool,
) -> Option<SemanticValue> {
    match source {
        SnapshotSource::Skip => None,
        SnapshotSource::File(path) => {
            let json = read_source(&path, output, quiet);
            match SemanticValue::from_json_str(&json) {
                Ok(value) => value,
                Err(e) => {
                    let msg = format!("error parsing snapshot '{}': {}", path.display(), e);
                    report_error(&msg, output, quiet);
                    process::exit(1);
                }
            }
        }
        SnapshotSource::Oracle { block } => {
            let Some(root) = find_project_root(file, &config.root_marker) else {
                tracing::warn!(marker = %config.root_marker, "no project root; using fallback rules");
                return None;
            };
            let runtime = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    report_error(&format!("failed to start runtime: {}", e), output, quiet);
                    process::exit(1);
                }
            };
            let oracle = CommandOracle::new(config.oracle.clone());
            match runtime.block_on(oracle.evaluate(&root, block.as_deref())) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(error = %e, "oracle unavailable; using fallback rules");
                    None
                }
            }
        }
    }
}

fn count(diagnostics: &[Diagnostic], severity: Severity) -> usize {
    diagnostics.iter().filter(|d| d.severity == severity).count()
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
        Severity::Information => "info",
    }
}
