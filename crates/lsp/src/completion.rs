//! Context-aware completion.
//!
//! Offers keys based on where the cursor sits: top-level keys outside any
//! block, block fields in a block body, action fields in an action, a new
//! `- name:` item inside `blocks`/`actions`, and block kinds after `kind:`.

use blockyard_core::{context_at_with, DocumentSnapshot, EntityKind, Vocabulary};
use lsp_types::{CompletionItem, CompletionItemKind, InsertTextFormat, Position};

use crate::diagnostics::from_lsp_position;

/// Keys that only make sense at the top of a document.
static TOP_LEVEL_KEYS: &[&str] = &["name", "kind", "description", "blocks"];

/// Keys of a block item.
static BLOCK_FIELDS: &[&str] = &[
    "name",
    "kind",
    "from",
    "config",
    "inputs",
    "outputs",
    "env",
    "depends_on",
    "actions",
];

/// Keys of an action item besides the executable directives.
static ACTION_FIELDS: &[&str] = &["name", "env", "inputs"];

pub fn compute_completions(
    doc: &DocumentSnapshot,
    position: Position,
    vocabulary: &Vocabulary,
) -> Vec<CompletionItem> {
    let position = from_lsp_position(position);
    let prefix: String = doc
        .line(position.line)
        .unwrap_or("")
        .chars()
        .take(position.character)
        .collect();

    let ctx = context_at_with(doc, position, vocabulary);
    let in_block_body =
        ctx.entity_kind == Some(EntityKind::Block) && ctx.inside_entity_body;
    // A bare `kind:` opens a frame of its own on the cursor line.
    let at_block_level = match ctx.body_path.as_slice() {
        [] => true,
        [only] => only == "kind",
        _ => false,
    };

    if in_block_body && at_block_level && value_of_key(&prefix) == Some("kind") {
        return vocabulary
            .block_kinds
            .iter()
            .map(|kind| item(kind, CompletionItemKind::ENUM_MEMBER, "block kind"))
            .collect();
    }
    if ctx.is_empty() {
        return top_level(vocabulary);
    }

    match ctx.entity_kind {
        // Deeper paths are mappings of an item that has no name yet.
        None => match ctx.section_path.as_slice() {
            [section] if !vocabulary.is_action_section(section) => vec![new_item("block")],
            _ => Vec::new(),
        },
        Some(_) if !ctx.inside_entity_body => Vec::new(),
        Some(EntityKind::Block) => match ctx.body_path.as_slice() {
            [] => BLOCK_FIELDS
                .iter()
                .map(|f| item(f, CompletionItemKind::PROPERTY, "block field"))
                .collect(),
            [section] if vocabulary.is_action_section(section) => vec![new_item("action")],
            _ => Vec::new(),
        },
        Some(EntityKind::Action) if ctx.body_path.is_empty() => ACTION_FIELDS
            .iter()
            .map(|f| item(f, CompletionItemKind::PROPERTY, "action field"))
            .chain(
                vocabulary
                    .executable_directives
                    .iter()
                    .map(|d| item(d, CompletionItemKind::PROPERTY, "executable directive")),
            )
            .collect(),
        Some(_) => Vec::new(),
    }
}

/// The key whose value the cursor is typing, e.g. `kind` for `  kind: he`.
fn value_of_key(prefix: &str) -> Option<&str> {
    let body = prefix.trim_start();
    let body = body.strip_prefix("- ").unwrap_or(body);
    let (key, _) = body.split_once(':')?;
    let key = key.trim();
    (!key.is_empty() && !key.contains(char::is_whitespace)).then_some(key)
}

fn top_level(vocabulary: &Vocabulary) -> Vec<CompletionItem> {
    let mut keys: Vec<&str> = TOP_LEVEL_KEYS.to_vec();
    for field in &vocabulary.required_fields {
        if !keys.contains(&field.as_str()) {
            keys.push(field);
        }
    }
    keys.into_iter()
        .map(|k| item(k, CompletionItemKind::KEYWORD, "top-level key"))
        .collect()
}

fn item(label: &str, kind: CompletionItemKind, detail: &str) -> CompletionItem {
    CompletionItem {
        label: label.to_string(),
        kind: Some(kind),
        detail: Some(detail.to_string()),
        ..Default::default()
    }
}

fn new_item(what: &str) -> CompletionItem {
    CompletionItem {
        label: "- name:".to_string(),
        kind: Some(CompletionItemKind::SNIPPET),
        detail: Some(format!("new {what}")),
        insert_text: Some("- name: ${1:name}".to_string()),
        insert_text_format: Some(InsertTextFormat::SNIPPET),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_under_cursor() {
        assert_eq!(value_of_key("    kind: he"), Some("kind"));
        assert_eq!(value_of_key("  - kind: "), Some("kind"));
        assert_eq!(value_of_key("    kin"), None);
        assert_eq!(value_of_key("run: echo a b: c"), Some("run"));
    }
}
