//! Document symbols and go-to-definition from the entity index.

use blockyard_core::{DocumentSnapshot, EntityEntry, EntityIndex, EntityKind, Position};
use lsp_types::{DocumentSymbol, Location, SymbolKind, Uri};

use crate::diagnostics::{from_lsp_position, to_lsp_range};

/// Blocks with their actions nested underneath, in document order.
pub fn document_symbols(index: &EntityIndex) -> Vec<DocumentSymbol> {
    index
        .entities()
        .filter(|e| e.reference.kind == EntityKind::Block)
        .map(|block| {
            let prefix = format!("{}.", block.reference.identity);
            let children: Vec<DocumentSymbol> = index
                .entities()
                .filter(|e| e.reference.kind == EntityKind::Action)
                .filter(|e| block.extent.contains_line(e.reference.span.start.line))
                .filter_map(|action| {
                    let short = action.reference.identity.strip_prefix(&prefix)?;
                    Some(symbol(action, short, SymbolKind::METHOD, Vec::new()))
                })
                .collect();
            symbol(block, &block.reference.identity, SymbolKind::MODULE, children)
        })
        .collect()
}

#[allow(deprecated)] // DocumentSymbol::deprecated is required by the struct literal
fn symbol(
    entry: &EntityEntry,
    name: &str,
    kind: SymbolKind,
    children: Vec<DocumentSymbol>,
) -> DocumentSymbol {
    let detail = match entry.reference.kind {
        EntityKind::Block => entry.field("kind").and_then(|f| f.value.clone()),
        _ => None,
    };
    DocumentSymbol {
        name: name.to_string(),
        detail,
        kind,
        tags: None,
        deprecated: None,
        range: to_lsp_range(entry.extent),
        selection_range: to_lsp_range(entry.reference.span),
        children: if children.is_empty() {
            None
        } else {
            Some(children)
        },
    }
}

/// Jump from a block or action name (e.g. inside `depends_on`) to the
/// `name:` value that defines it.
pub fn goto_definition(
    index: &EntityIndex,
    doc: &DocumentSnapshot,
    uri: &Uri,
    position: lsp_types::Position,
) -> Option<Location> {
    let position = from_lsp_position(position);
    let word = word_at(doc, position)?;
    let entry = index.entry(&word).or_else(|| {
        // A bare action name resolves within the block under the cursor.
        let block = index.block_at_line(position.line)?;
        let identity = format!("{}.{word}", block.reference.identity);
        index
            .entries_named(&identity)
            .find(|action| block.extent.contains_line(action.reference.span.start.line))
    })?;
    if entry.reference.kind == EntityKind::Field {
        return None;
    }
    Some(Location::new(uri.clone(), to_lsp_range(entry.reference.span)))
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}

/// The identifier-like word under the cursor, if any.
pub fn word_at(doc: &DocumentSnapshot, position: Position) -> Option<String> {
    let chars: Vec<char> = doc.line(position.line)?.chars().collect();
    let col = position.character.min(chars.len());
    let start = chars[..col]
        .iter()
        .rposition(|c| !is_word_char(*c))
        .map_or(0, |i| i + 1);
    let end = chars[col..]
        .iter()
        .position(|c| !is_word_char(*c))
        .map_or(chars.len(), |i| col + i);
    let word: String = chars[start..end].iter().collect();
    let word = word.trim_matches('.');
    (!word.is_empty() && word != "-").then(|| word.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "\
name: platform
blocks:
  - name: network
    kind: terraform
  - name: app
    kind: helm
    depends_on:
      - network
    actions:
      - name: deploy
        run: helm upgrade
      - name: smoke
        run: ./smoke.sh deploy
";

    #[test]
    fn word_boundaries() {
        let doc = DocumentSnapshot::new("    from: registry/x:1.0", 1);
        assert_eq!(word_at(&doc, Position::new(0, 6)).as_deref(), Some("from"));
        assert_eq!(word_at(&doc, Position::new(0, 12)).as_deref(), Some("registry"));
        assert_eq!(word_at(&doc, Position::new(0, 0)), None);
        assert_eq!(word_at(&doc, Position::new(9, 0)), None);
    }

    #[test]
    fn symbols_nest_actions_under_blocks() {
        let doc = DocumentSnapshot::new(DOC, 1);
        let index = EntityIndex::build(&doc);
        let symbols = document_symbols(&index);
        let names: Vec<_> = symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["network", "app"]);
        assert_eq!(symbols[0].detail.as_deref(), Some("terraform"));
        assert!(symbols[0].children.is_none());
        let actions: Vec<_> = symbols[1]
            .children
            .as_ref()
            .unwrap()
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(actions, ["deploy", "smoke"]);
    }

    #[test]
    fn dependency_jumps_to_block_name() {
        let doc = DocumentSnapshot::new(DOC, 1);
        let index = EntityIndex::build(&doc);
        let uri: Uri = "file:///ws/workspace.yaml".parse().unwrap();
        let location =
            goto_definition(&index, &doc, &uri, lsp_types::Position::new(7, 9)).unwrap();
        assert_eq!(location.range.start, lsp_types::Position::new(2, 10));
    }

    #[test]
    fn bare_action_name_resolves_in_enclosing_block() {
        let doc = DocumentSnapshot::new(DOC, 1);
        let index = EntityIndex::build(&doc);
        let uri: Uri = "file:///ws/workspace.yaml".parse().unwrap();
        let location =
            goto_definition(&index, &doc, &uri, lsp_types::Position::new(12, 25)).unwrap();
        assert_eq!(location.range.start.line, 9);
    }

    #[test]
    fn action_lookup_keeps_dotted_block_names_whole() {
        let doc = DocumentSnapshot::new(
            "blocks:\n  - name: web.v2\n    actions:\n      - name: deploy\n        run: make\n      - name: smoke\n        run: check deploy\n",
            1,
        );
        let index = EntityIndex::build(&doc);
        let uri: Uri = "file:///ws/workspace.yaml".parse().unwrap();
        let location =
            goto_definition(&index, &doc, &uri, lsp_types::Position::new(6, 22)).unwrap();
        assert_eq!(location.range.start, lsp_types::Position::new(3, 14));
    }
}
