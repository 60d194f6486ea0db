//! `blockyard context`: the structural context at one position.

use std::path::Path;

use blockyard_core::{context_at_with, DocumentSnapshot, EntityKind, Position};
use blockyard_lsp::config::ServerConfig;

use crate::{read_source, OutputFormat};

pub(crate) fn cmd_context(
    file: &Path,
    line: usize,
    character: usize,
    config: &ServerConfig,
    output: OutputFormat,
    quiet: bool,
) {
    let text = read_source(file, output, quiet);
    let doc = DocumentSnapshot::new(&text, 1);
    let ctx = context_at_with(&doc, Position::new(line, character), &config.vocabulary);

    match output {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&ctx)
                .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e));
            println!("{}", json);
        }
        OutputFormat::Text => {
            if ctx.is_empty() {
                println!("top level");
                return;
            }
            match (&ctx.entity, ctx.entity_kind) {
                (Some(entity), Some(EntityKind::Action)) => println!("action: {}", entity),
                (Some(entity), _) => println!("block: {}", entity),
                (None, _) => {}
            }
            if !ctx.section_path.is_empty() {
                println!("section: {}", ctx.section_path.join(" › "));
            }
            if ctx.entity.is_some() {
                println!(
                    "in body: {}",
                    if ctx.inside_entity_body { "yes" } else { "no" }
                );
            }
        }
    }
}
