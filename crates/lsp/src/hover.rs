//! Hover information for keys.
//!
//! Shows a short description of the key under the cursor followed by where
//! the cursor sits, e.g. "block `alpha` › config".

use blockyard_core::{context_at_with, Context, DocumentSnapshot, EntityKind, Vocabulary};
use lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind, Position};

use crate::diagnostics::from_lsp_position;
use crate::navigation::word_at;

pub fn compute_hover(
    doc: &DocumentSnapshot,
    position: Position,
    vocabulary: &Vocabulary,
) -> Option<Hover> {
    let position = from_lsp_position(position);
    let word = word_at(doc, position)?;
    let ctx = context_at_with(doc, position, vocabulary);

    let description = keyword_description(&word).map(str::to_owned).or_else(|| {
        vocabulary
            .is_block_kind(&word)
            .then(|| format!("**{word}** -- block kind"))
    })?;

    let markdown = match context_line(&ctx) {
        Some(line) => format!("{description}\n\n{line}"),
        None => description,
    };
    Some(Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value: markdown,
        }),
        range: None,
    })
}

fn context_line(ctx: &Context) -> Option<String> {
    let mut parts = Vec::new();
    match (&ctx.entity, ctx.entity_kind) {
        (Some(identity), Some(EntityKind::Action)) => parts.push(format!("action `{identity}`")),
        (Some(identity), _) => parts.push(format!("block `{identity}`")),
        (None, _) => parts.extend(ctx.section_path.iter().cloned()),
    }
    if ctx.entity.is_some() {
        parts.extend(ctx.body_path.iter().cloned());
    }
    (!parts.is_empty()).then(|| parts.join(" › "))
}

fn keyword_description(word: &str) -> Option<&'static str> {
    let desc = match word {
        "name" => "**name** -- identity of the workspace, block or action",
        "kind" => "**kind** -- what a block provisions; one of the configured block kinds",
        "description" => "**description** -- free-form text",
        "blocks" => "**blocks** -- the units this workspace is built from",
        "from" => {
            "**from** -- artifact the block is built from; pin it with a version tag or digest"
        }
        "config" => "**config** -- block-specific settings passed to the block kind",
        "inputs" => "**inputs** -- values consumed from other blocks",
        "outputs" => "**outputs** -- values this block exposes to others",
        "env" => "**env** -- environment variables for the block or action",
        "depends_on" => "**depends_on** -- blocks that must be applied first",
        "actions" => "**actions** -- named operations runnable on this block",
        "run" | "script" | "command" => {
            "**executable directive** -- what an action executes; every action needs one"
        }
        _ => return None,
    };
    Some(desc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hover_text(source: &str, line: u32, character: u32) -> Option<String> {
        let doc = DocumentSnapshot::new(source, 1);
        compute_hover(&doc, Position::new(line, character), &Vocabulary::default()).map(|h| {
            match h.contents {
                HoverContents::Markup(m) => m.value,
                _ => String::new(),
            }
        })
    }

    const DOC: &str = "\
name: platform
blocks:
  - name: alpha
    kind: helm
    config:
      env: prod
";

    #[test]
    fn key_in_block_config_shows_path() {
        let text = hover_text(DOC, 5, 7).unwrap();
        assert!(text.starts_with("**env**"), "{text}");
        assert!(text.ends_with("block `alpha` › config"), "{text}");
    }

    #[test]
    fn block_kind_value_is_described() {
        let text = hover_text(DOC, 3, 11).unwrap();
        assert!(text.contains("block kind"), "{text}");
    }

    #[test]
    fn top_level_key_has_no_context_line() {
        let text = hover_text(DOC, 0, 1).unwrap();
        assert!(!text.contains('›'));
        assert!(!text.contains("block `"));
    }

    #[test]
    fn unknown_word_has_no_hover() {
        assert_eq!(hover_text(DOC, 0, 8), None);
    }
}
