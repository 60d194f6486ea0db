//! Cursor context for completion and hover.
//!
//! Answers "which entity and section is this position inside" from the scope
//! stack alone. Never consults the oracle.

use serde::Serialize;

use crate::document::{DocumentSnapshot, Position};
use crate::index::EntityKind;
use crate::scope::{entity_frames, indent_of, scopes_at_with, ScopeFrame};
use crate::vocabulary::Vocabulary;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Context {
    pub entity: Option<String>,
    pub entity_kind: Option<EntityKind>,
    /// Section and nested-mapping keys from the root to the cursor.
    pub section_path: Vec<String>,
    /// The tail of `section_path` opened inside the innermost entity.
    pub body_path: Vec<String>,
    pub inside_entity_body: bool,
}

impl Context {
    /// No entity and no section: callers fall back to generic suggestions.
    pub fn is_empty(&self) -> bool {
        self.entity.is_none() && self.section_path.is_empty()
    }

    pub fn innermost_section(&self) -> Option<&str> {
        self.section_path.last().map(String::as_str)
    }
}

pub fn context_at(doc: &DocumentSnapshot, position: Position) -> Context {
    context_at_with(doc, position, &Vocabulary::default())
}

pub fn context_at_with(
    doc: &DocumentSnapshot,
    position: Position,
    vocabulary: &Vocabulary,
) -> Context {
    let mut stack = scopes_at_with(doc, position.line, vocabulary);

    // On a blank line, or with the cursor inside the leading whitespace, the
    // cursor column decides which frames are still open.
    let text = doc.line(position.line).unwrap_or("");
    let indent = indent_of(text);
    let blank = text.trim().is_empty() || text.trim_start().starts_with('#');
    if blank || position.character <= indent {
        let column = if blank {
            position.character
        } else {
            position.character.min(indent)
        };
        stack.retain(|f| {
            f.indent_column.map_or(true, |c| c < column) || opened_here(f, position, blank)
        });
    }

    let entities = entity_frames(&stack, vocabulary);
    let innermost = entities.last();
    let inside_entity_body = innermost.is_some_and(|(i, _, _)| {
        let frame = &stack[*i];
        frame.start_line < position.line
            || frame
                .indent_column
                .is_some_and(|c| position.character > c + 1)
    });

    let section_names = |frames: &[ScopeFrame]| -> Vec<String> {
        frames
            .iter()
            .filter(|f| f.is_section_like())
            .filter_map(|f| f.name.clone())
            .collect()
    };
    let section_path = section_names(&stack);
    let body_path = innermost
        .map(|(i, _, _)| section_names(&stack[i + 1..]))
        .unwrap_or_default();

    Context {
        entity: innermost.map(|(_, _, identity)| identity.clone()),
        entity_kind: innermost.map(|(_, kind, _)| *kind),
        section_path,
        body_path,
        inside_entity_body,
    }
}

/// A frame opened on the cursor line stays open when the cursor is on that
/// line's content rather than in front of it.
fn opened_here(frame: &ScopeFrame, position: Position, blank: bool) -> bool {
    !blank
        && frame.start_line == position.line
        && frame.indent_column.is_some_and(|c| position.character > c)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "\
name: platform
blocks:
  - name: alpha
    kind: terraform
    config:
      region: eu

    actions:
      - name: plan
        run: terraform plan
";

    #[test]
    fn top_level_has_no_context() {
        let doc = DocumentSnapshot::new(DOC, 1);
        assert!(context_at(&doc, Position::new(0, 3)).is_empty());
    }

    #[test]
    fn inside_block_config() {
        let doc = DocumentSnapshot::new(DOC, 1);
        let ctx = context_at(&doc, Position::new(5, 8));
        assert_eq!(ctx.entity.as_deref(), Some("alpha"));
        assert_eq!(ctx.section_path, vec!["blocks", "config"]);
        assert_eq!(ctx.body_path, vec!["config"]);
        assert!(ctx.inside_entity_body);
    }

    #[test]
    fn blank_line_column_decides_scope() {
        let doc = DocumentSnapshot::new(DOC, 1);
        let deep = context_at(&doc, Position::new(6, 6));
        assert_eq!(deep.innermost_section(), Some("config"));
        let shallow = context_at(&doc, Position::new(6, 4));
        assert_eq!(shallow.entity.as_deref(), Some("alpha"));
        assert_eq!(shallow.section_path, vec!["blocks"]);
        let outside = context_at(&doc, Position::new(6, 2));
        assert_eq!(outside.entity, None);
        assert_eq!(outside.section_path, vec!["blocks"]);
    }

    #[test]
    fn action_context_is_qualified() {
        let doc = DocumentSnapshot::new(DOC, 1);
        let ctx = context_at(&doc, Position::new(9, 10));
        assert_eq!(ctx.entity.as_deref(), Some("alpha.plan"));
        assert_eq!(ctx.entity_kind, Some(EntityKind::Action));
        assert_eq!(ctx.section_path, vec!["blocks", "actions"]);
        assert!(ctx.body_path.is_empty());
    }

    #[test]
    fn cursor_on_marker_line_content_is_in_body() {
        let doc = DocumentSnapshot::new(DOC, 1);
        let on_name = context_at(&doc, Position::new(2, 10));
        assert_eq!(on_name.entity.as_deref(), Some("alpha"));
        assert!(on_name.inside_entity_body);
    }

    #[test]
    fn mapping_opened_on_an_item_line_is_part_of_the_path() {
        let doc = DocumentSnapshot::new(
            "blocks:\n  - name: a\n    actions:\n      - env:\n          FOO: bar\n",
            1,
        );
        let ctx = context_at(&doc, Position::new(4, 12));
        assert_eq!(ctx.entity.as_deref(), Some("a"));
        assert_eq!(ctx.body_path, vec!["actions", "env"]);
    }

    #[test]
    fn past_end_of_document_is_safe() {
        let doc = DocumentSnapshot::new(DOC, 1);
        let ctx = context_at(&doc, Position::new(400, 0));
        assert!(ctx.is_empty());
    }
}
