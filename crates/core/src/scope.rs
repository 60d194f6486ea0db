//! Indentation-based scope tracking over raw text.
//!
//! The tracker never builds a syntax tree. It classifies each line by its
//! leading whitespace and shape (`key:`, `key: value`, `- item`) and keeps a
//! stack of open frames. A non-blank line closes every frame whose indent
//! column is at or beyond its own indent; blank and comment lines close
//! nothing. Frames therefore close in LIFO order and the indent columns on
//! the stack are strictly increasing from the root outward.
//!
//! The scan is total: any text, however malformed, yields a stack that is
//! at least the root frame.

use serde::{Deserialize, Serialize};

use crate::document::DocumentSnapshot;
use crate::index::EntityKind;
use crate::vocabulary::Vocabulary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeKind {
    Root,
    BlockSequenceItem,
    Section,
    Other,
}

/// An open indentation-delimited region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeFrame {
    pub kind: ScopeKind,
    /// Item identity (the `name:` value) or the section key.
    pub name: Option<String>,
    pub start_line: usize,
    /// `None` for the root frame, which sits below every real column.
    pub indent_column: Option<usize>,
    /// Column of the keys directly owned by a sequence item.
    pub body_column: Option<usize>,
}

impl ScopeFrame {
    fn root() -> Self {
        Self {
            kind: ScopeKind::Root,
            name: None,
            start_line: 0,
            indent_column: None,
            body_column: Some(0),
        }
    }

    pub fn is_item(&self) -> bool {
        self.kind == ScopeKind::BlockSequenceItem
    }

    pub fn is_section_like(&self) -> bool {
        matches!(self.kind, ScopeKind::Section | ScopeKind::Other)
    }
}

/// A `key: value` pair found on a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue<'a> {
    pub key: &'a str,
    pub key_start: usize,
    pub key_end: usize,
    /// Scalar value with quotes and trailing comment removed.
    pub value: Option<String>,
    pub value_start: usize,
    pub value_end: usize,
}

/// Shape of a single source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line<'a> {
    /// Empty, whitespace-only, or comment-only.
    Blank,
    /// `- ...` at `indent`, optionally with an inline `key: value`.
    Item {
        indent: usize,
        body_column: Option<usize>,
        entry: Option<KeyValue<'a>>,
    },
    /// `key:` or `key: value` at `indent`.
    Key { indent: usize, entry: KeyValue<'a> },
    /// Any other non-blank content.
    Scalar { indent: usize },
}

impl Line<'_> {
    pub fn indent(&self) -> Option<usize> {
        match self {
            Line::Blank => None,
            Line::Item { indent, .. } | Line::Key { indent, .. } | Line::Scalar { indent } => {
                Some(*indent)
            }
        }
    }
}

/// Count leading spaces and tabs, one column each.
pub fn indent_of(text: &str) -> usize {
    text.chars().take_while(|c| *c == ' ' || *c == '\t').count()
}

/// Classify one line of text.
pub fn classify(text: &str) -> Line<'_> {
    let indent = indent_of(text);
    let rest = text.trim_start_matches([' ', '\t']);
    if rest.is_empty() || rest.starts_with('#') {
        return Line::Blank;
    }
    let rest_start = text.len() - rest.len();

    if rest == "-" || rest.starts_with("- ") || rest.starts_with("-\t") {
        let after = &rest[1..];
        let inner = after.trim_start_matches([' ', '\t']);
        if inner.is_empty() || inner.starts_with('#') {
            return Line::Item {
                indent,
                body_column: None,
                entry: None,
            };
        }
        let inner_byte = rest_start + 1 + (after.len() - inner.len());
        let body_column = char_column(text, inner_byte);
        let entry = parse_key_value(text, inner_byte);
        return Line::Item {
            indent,
            body_column: Some(body_column),
            entry,
        };
    }

    match parse_key_value(text, rest_start) {
        Some(entry) => Line::Key { indent, entry },
        None => Line::Scalar { indent },
    }
}

/// Parse `key: value` starting at byte offset `at`.
fn parse_key_value(text: &str, at: usize) -> Option<KeyValue<'_>> {
    let body = &text[at..];
    let first = body.chars().next()?;
    if matches!(first, '{' | '[' | '&' | '*' | '!' | '|' | '>' | '-') {
        return None;
    }

    let (raw_key, colon) = if first == '"' || first == '\'' {
        let close = body[1..].find(first)? + 1;
        let after = &body[close + 1..];
        if !after.starts_with(':') {
            return None;
        }
        (&body[1..close], close + 1)
    } else {
        let colon = find_mapping_colon(body)?;
        (body[..colon].trim_end(), colon)
    };
    if raw_key.is_empty() {
        return None;
    }

    let key_byte = if first == '"' || first == '\'' { at + 1 } else { at };
    let key_start = char_column(text, key_byte);
    let key_end = key_start + raw_key.chars().count();

    let after_colon = &body[colon + 1..];
    let value_text = strip_comment(after_colon);
    let trimmed = value_text.trim();
    let value_byte = at + colon + 1 + (value_text.len() - value_text.trim_start().len());
    let value_start = char_column(text, value_byte);
    let value_end = value_start + trimmed.chars().count();
    let value = if trimmed.is_empty() {
        None
    } else {
        Some(unquote(trimmed).to_string())
    };

    Some(KeyValue {
        key: raw_key,
        key_start,
        key_end,
        value,
        value_start,
        value_end,
    })
}

/// Byte offset of the first `:` that is followed by whitespace or ends the line.
fn find_mapping_colon(body: &str) -> Option<usize> {
    let bytes = body.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        match b {
            b'#' if i > 0 && bytes[i - 1].is_ascii_whitespace() => return None,
            b':' => {
                let next = bytes.get(i + 1);
                if next.is_none() || next.is_some_and(|n| n.is_ascii_whitespace()) {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Drop a trailing ` # comment` that is outside quotes.
fn strip_comment(value: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut prev_ws = true;
    for (i, c) in value.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '#' && prev_ws => return &value[..i],
            None => {}
        }
        prev_ws = c.is_whitespace();
    }
    value
}

pub fn unquote(value: &str) -> &str {
    for q in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(q) && value.ends_with(q) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn char_column(text: &str, byte: usize) -> usize {
    text.get(..byte).map_or(0, |p| p.chars().count())
}

/// Frame transitions reported by [`ScopeScanner::feed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeEvent {
    Opened(ScopeFrame),
    /// A frame closed; `end_line` is its last non-blank line.
    Closed { frame: ScopeFrame, end_line: usize },
    /// An unnamed item received its identity from a later `name:` line.
    Named { start_line: usize, name: String },
}

/// Result of feeding one line.
#[derive(Debug)]
pub struct LineScan<'a> {
    pub line: Line<'a>,
    pub events: Vec<ScopeEvent>,
    /// Stack depth after closing and before this line opened anything.
    pub parent_depth: usize,
}

/// Incremental line-by-line scope scanner.
pub struct ScopeScanner<'v> {
    vocabulary: &'v Vocabulary,
    stack: Vec<ScopeFrame>,
    last_content_line: Option<usize>,
}

impl<'v> ScopeScanner<'v> {
    pub fn new(vocabulary: &'v Vocabulary) -> Self {
        Self {
            vocabulary,
            stack: vec![ScopeFrame::root()],
            last_content_line: None,
        }
    }

    pub fn stack(&self) -> &[ScopeFrame] {
        &self.stack
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        self.vocabulary
    }

    pub fn feed<'a>(&mut self, line_no: usize, text: &'a str) -> LineScan<'a> {
        let line = classify(text);
        let Some(indent) = line.indent() else {
            return LineScan {
                line,
                events: Vec::new(),
                parent_depth: self.stack.len(),
            };
        };

        let mut events = Vec::new();
        while let Some(top) = self.stack.last() {
            match top.indent_column {
                Some(col) if col >= indent => {
                    if let Some(frame) = self.stack.pop() {
                        let end_line = self.last_content_line.unwrap_or(frame.start_line);
                        events.push(ScopeEvent::Closed { frame, end_line });
                    }
                }
                _ => break,
            }
        }
        let parent_depth = self.stack.len();

        match &line {
            Line::Item {
                indent,
                body_column,
                entry,
            } => {
                let name = entry
                    .as_ref()
                    .filter(|e| e.key == "name")
                    .and_then(|e| e.value.clone());
                let frame = ScopeFrame {
                    kind: ScopeKind::BlockSequenceItem,
                    name,
                    start_line: line_no,
                    indent_column: Some(*indent),
                    body_column: *body_column,
                };
                self.stack.push(frame.clone());
                events.push(ScopeEvent::Opened(frame));
                // `- config:` opens the mapping at the item's body column too.
                if let (Some(entry), Some(column)) = (entry, body_column) {
                    if entry.value.is_none() {
                        let frame = self.section_frame(entry.key, line_no, *column);
                        self.stack.push(frame.clone());
                        events.push(ScopeEvent::Opened(frame));
                    }
                }
            }
            Line::Key { indent, entry } => {
                if let Some(event) = self.attach_to_item(*indent, entry) {
                    events.push(event);
                }
                if entry.value.is_none() {
                    let frame = self.section_frame(entry.key, line_no, *indent);
                    self.stack.push(frame.clone());
                    events.push(ScopeEvent::Opened(frame));
                }
            }
            Line::Scalar { .. } | Line::Blank => {}
        }

        self.last_content_line = Some(line_no);
        LineScan {
            line,
            events,
            parent_depth,
        }
    }

    /// Close every open frame at end of input, innermost first.
    pub fn finish(mut self) -> Vec<ScopeEvent> {
        let mut events = Vec::new();
        while self.stack.len() > 1 {
            if let Some(frame) = self.stack.pop() {
                let end_line = self.last_content_line.unwrap_or(frame.start_line);
                events.push(ScopeEvent::Closed { frame, end_line });
            }
        }
        events
    }

    fn section_frame(&self, key: &str, line_no: usize, column: usize) -> ScopeFrame {
        let kind = if self.vocabulary.is_section_keyword(key) {
            ScopeKind::Section
        } else {
            ScopeKind::Other
        };
        ScopeFrame {
            kind,
            name: Some(key.to_string()),
            start_line: line_no,
            indent_column: Some(column),
            body_column: None,
        }
    }

    /// A key line directly under an item fixes the item's body column and,
    /// for `name:`, its identity.
    fn attach_to_item(&mut self, indent: usize, entry: &KeyValue<'_>) -> Option<ScopeEvent> {
        let top = self.stack.last_mut()?;
        if !top.is_item() {
            return None;
        }
        match top.body_column {
            None => top.body_column = Some(indent),
            Some(col) if col != indent => return None,
            Some(_) => {}
        }
        if entry.key != "name" || top.name.is_some() {
            return None;
        }
        let name = entry.value.clone()?;
        top.name = Some(name.clone());
        Some(ScopeEvent::Named {
            start_line: top.start_line,
            name,
        })
    }
}

/// The scope stack in effect at `line`, root first and innermost last.
pub fn scopes_at(doc: &DocumentSnapshot, line: usize) -> Vec<ScopeFrame> {
    scopes_at_with(doc, line, &Vocabulary::default())
}

pub fn scopes_at_with(
    doc: &DocumentSnapshot,
    line: usize,
    vocabulary: &Vocabulary,
) -> Vec<ScopeFrame> {
    let mut scanner = ScopeScanner::new(vocabulary);
    for (line_no, text) in doc.lines().take(line.saturating_add(1)) {
        scanner.feed(line_no, text);
    }
    scanner.stack().to_vec()
}

/// Entity frames on `stack` as `(frame index, kind, identity)`, outermost first.
///
/// A named item directly under the root or under a non-action section is a
/// block, provided no entity encloses it. A named item under an action
/// section of a block is an action of that block. Any other item (for
/// example a list entry inside a block's `depends_on`) is opaque and hides
/// everything nested below it.
pub fn entity_frames(stack: &[ScopeFrame], vocabulary: &Vocabulary) -> Vec<(usize, EntityKind, String)> {
    let mut found: Vec<(usize, EntityKind, String)> = Vec::new();
    for (i, frame) in stack.iter().enumerate() {
        if !frame.is_item() {
            continue;
        }
        let Some(name) = frame.name.as_deref() else {
            break;
        };
        let parent = i.checked_sub(1).and_then(|p| stack.get(p));
        let under_action_section = parent.is_some_and(|p| {
            p.is_section_like() && p.name.as_deref().is_some_and(|n| vocabulary.is_action_section(n))
        });
        match found.last() {
            None if !under_action_section => {
                found.push((i, EntityKind::Block, name.to_string()));
            }
            Some((_, EntityKind::Block, block)) if under_action_section => {
                let identity = format!("{block}.{name}");
                found.push((i, EntityKind::Action, identity));
            }
            _ => break,
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
name: platform
kind: workspace
blocks:
  - name: alpha
    kind: terraform
    config:
      region: eu-west-1

    actions:
      - name: plan
        run: terraform plan
  - name: \"beta\"
    from: registry/y:latest
";

    fn kinds(stack: &[ScopeFrame]) -> Vec<ScopeKind> {
        stack.iter().map(|f| f.kind).collect()
    }

    #[test]
    fn classify_item_with_name() {
        match classify("  - name: \"alpha\"  # comment") {
            Line::Item {
                indent,
                body_column,
                entry: Some(entry),
            } => {
                assert_eq!(indent, 2);
                assert_eq!(body_column, Some(4));
                assert_eq!(entry.key, "name");
                assert_eq!(entry.value.as_deref(), Some("alpha"));
                assert_eq!(entry.value_start, 10);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn classify_urls_are_values_not_keys() {
        match classify("from: https://host:5000/x") {
            Line::Key { entry, .. } => {
                assert_eq!(entry.key, "from");
                assert_eq!(entry.value.as_deref(), Some("https://host:5000/x"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(classify("just text"), Line::Scalar { indent: 0 });
        assert_eq!(classify("   # note"), Line::Blank);
    }

    #[test]
    fn nested_section_inside_item() {
        let doc = DocumentSnapshot::new(SAMPLE, 1);
        let stack = scopes_at(&doc, 6);
        assert_eq!(
            kinds(&stack),
            vec![
                ScopeKind::Root,
                ScopeKind::Section,
                ScopeKind::BlockSequenceItem,
                ScopeKind::Section
            ]
        );
        assert_eq!(stack[2].name.as_deref(), Some("alpha"));
        assert_eq!(stack[3].name.as_deref(), Some("config"));
    }

    #[test]
    fn blank_line_does_not_close() {
        let doc = DocumentSnapshot::new(SAMPLE, 1);
        let stack = scopes_at(&doc, 7);
        assert_eq!(stack.last().and_then(|f| f.name.as_deref()), Some("config"));
    }

    #[test]
    fn sibling_items_are_distinct_frames() {
        let doc = DocumentSnapshot::new(SAMPLE, 1);
        let stack = scopes_at(&doc, 12);
        assert_eq!(stack.len(), 3);
        assert_eq!(stack[2].name.as_deref(), Some("beta"));
        assert_eq!(stack[2].start_line, 11);
    }

    #[test]
    fn indent_columns_strictly_increase_on_every_line() {
        let doc = DocumentSnapshot::new(SAMPLE, 1);
        for line in 0..doc.line_count() + 2 {
            let stack = scopes_at(&doc, line);
            assert!(
                stack.windows(2).all(|w| w[0].indent_column < w[1].indent_column),
                "line {line}: {stack:?}"
            );
        }
    }

    #[test]
    fn late_name_is_attached() {
        let doc = DocumentSnapshot::new("blocks:\n  - kind: helm\n    name: late\n    from: x\n", 1);
        let stack = scopes_at(&doc, 3);
        assert_eq!(stack[2].name.as_deref(), Some("late"));
        assert_eq!(stack[2].body_column, Some(4));
    }

    #[test]
    fn action_identity_is_composite() {
        let doc = DocumentSnapshot::new(SAMPLE, 1);
        let vocab = Vocabulary::default();
        let stack = scopes_at(&doc, 10);
        let entities = entity_frames(&stack, &vocab);
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].2, "alpha");
        assert_eq!(entities[1].1, EntityKind::Action);
        assert_eq!(entities[1].2, "alpha.plan");
    }

    #[test]
    fn item_opening_a_mapping_nests_a_section() {
        let doc = DocumentSnapshot::new(
            "blocks:\n  - config:\n      region: eu\n    name: a\n",
            1,
        );
        let stack = scopes_at(&doc, 2);
        assert_eq!(
            kinds(&stack),
            vec![
                ScopeKind::Root,
                ScopeKind::Section,
                ScopeKind::BlockSequenceItem,
                ScopeKind::Other
            ]
        );
        assert_eq!(stack[3].name.as_deref(), Some("config"));
        assert_eq!(stack[3].indent_column, Some(4));

        let stack = scopes_at(&doc, 3);
        assert_eq!(kinds(&stack).last(), Some(&ScopeKind::BlockSequenceItem));
        assert_eq!(stack[2].name.as_deref(), Some("a"));
    }

    #[test]
    fn garbage_degrades_to_root() {
        let doc = DocumentSnapshot::new("{ not: [yaml\n\t\t}}}\n", 1);
        let stack = scopes_at(&doc, 1);
        assert_eq!(kinds(&stack), vec![ScopeKind::Root]);
    }
}
