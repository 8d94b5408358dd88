//! Function declarations located in source text
//!
//! `syn` drops ordinary comments, so the syntax tree is only used to find
//! where each function starts and ends. Everything else is sliced from the
//! original text.

use std::ops::Range;

use proc_macro2::LineColumn;
use quote::ToTokens;

use crate::core::{MergeError, SourceOrigin};

/// Byte offsets of line starts, for turning span locations into offsets
pub(crate) struct LineIndex<'a> {
    text: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self { text, line_starts }
    }

    /// Byte offset of a 1-based line and 0-based character column
    pub(crate) fn offset(&self, location: LineColumn) -> usize {
        let Some(&line_start) = self.line_starts.get(location.line.saturating_sub(1)) else {
            return self.text.len();
        };
        self.text[line_start..]
            .char_indices()
            .nth(location.column)
            .map(|(i, _)| line_start + i)
            .unwrap_or(self.text.len())
    }

    /// Offset of the start of the line containing `offset`
    pub(crate) fn line_start(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(line) => self.line_starts[line],
            Err(line) => self.line_starts[line - 1],
        }
    }
}

/// A top-level function and the text that belongs to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Declaration {
    pub name: String,
    /// Start of the leading comment and attribute lines
    pub start: usize,
    /// Start of the signature, after any attributes
    pub item_start: usize,
    /// One past the closing brace of the body
    pub end: usize,
    /// The body including its braces
    pub body: Range<usize>,
}

impl Declaration {
    pub(crate) fn text<'s>(&self, source: &'s str) -> &'s str {
        &source[self.start..self.end]
    }

    pub(crate) fn body<'s>(&self, source: &'s str) -> &'s str {
        &source[self.body.clone()]
    }

    /// Comment and attribute lines directly above the item
    pub(crate) fn leading<'s>(&self, source: &'s str) -> &'s str {
        &source[self.start..self.item_start]
    }
}

/// Parse `source` and list its top-level functions in source order.
pub(crate) fn declarations(
    source: &str,
    origin: SourceOrigin,
) -> Result<Vec<Declaration>, MergeError> {
    let file = syn::parse_file(source).map_err(|e| MergeError::syntax(origin, &e))?;
    let index = LineIndex::new(source);

    let declarations = file
        .items
        .iter()
        .filter_map(|item| match item {
            syn::Item::Fn(item_fn) => Some(item_fn),
            _ => None,
        })
        .map(|item_fn| {
            let head = match &item_fn.vis {
                syn::Visibility::Inherited => item_fn.sig.to_token_stream(),
                vis => vis.to_token_stream(),
            };
            let first = head
                .into_iter()
                .next()
                .map(|token| token.span().start())
                .unwrap_or_else(|| item_fn.sig.fn_token.span.start());
            let item_start = index.offset(first);
            let braces = item_fn.block.brace_token.span;
            let body_start = index.offset(braces.open().start());
            let end = index.offset(braces.close().end());

            Declaration {
                name: item_fn.sig.ident.to_string(),
                start: leading_start(source, &index, item_start),
                item_start,
                end,
                body: body_start..end,
            }
        })
        .collect();

    Ok(declarations)
}

/// Walk up over contiguous comment and attribute lines above an item
fn leading_start(source: &str, index: &LineIndex<'_>, item_start: usize) -> usize {
    let mut start = index.line_start(item_start);
    if !source[start..item_start].trim().is_empty() {
        return item_start;
    }

    while start > 0 {
        let previous = index.line_start(start - 1);
        let line = source[previous..start].trim();
        if line.starts_with("//") || line.starts_with("#[") {
            start = previous;
        } else {
            break;
        }
    }
    start
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "use std::fmt;\n\
\n\
// +vectorsigma:action:SwitchIn\n\
/// Switches the light.\n\
#[allow(unused)]\n\
pub fn switch_in(x: u8) -> u8 {\n    x // TODO: Implement me!\n}\n\
\n\
fn helper() {}\n";

    #[test]
    fn test_line_index_offsets() {
        let index = LineIndex::new("ab\ncdé\nf");
        assert_eq!(index.offset(LineColumn { line: 1, column: 0 }), 0);
        assert_eq!(index.offset(LineColumn { line: 2, column: 1 }), 4);
        assert_eq!(index.offset(LineColumn { line: 2, column: 3 }), 7);
        assert_eq!(index.offset(LineColumn { line: 3, column: 0 }), 8);
        assert_eq!(index.offset(LineColumn { line: 3, column: 1 }), 9);
        assert_eq!(index.offset(LineColumn { line: 9, column: 0 }), 9);
        assert_eq!(index.line_start(5), 3);
        assert_eq!(index.line_start(3), 3);
    }

    #[test]
    fn test_declarations_include_leading_lines() {
        let decls = declarations(SOURCE, SourceOrigin::Existing).unwrap();
        assert_eq!(decls.len(), 2);

        let switch_in = &decls[0];
        assert_eq!(switch_in.name, "switch_in");
        assert!(switch_in
            .text(SOURCE)
            .starts_with("// +vectorsigma:action:SwitchIn\n/// Switches"));
        assert!(switch_in.text(SOURCE).ends_with("// TODO: Implement me!\n}"));
        assert!(switch_in.leading(SOURCE).contains("#[allow(unused)]"));
        assert!(switch_in.body(SOURCE).starts_with('{'));

        assert_eq!(decls[1].text(SOURCE), "fn helper() {}");
    }

    #[test]
    fn test_blank_line_ends_leading_block() {
        let source = "// unrelated\n\nfn a() {}\n";
        let decls = declarations(source, SourceOrigin::Generated).unwrap();
        assert_eq!(decls[0].text(source), "fn a() {}");
    }

    #[test]
    fn test_syntax_error() {
        let err = declarations("fn broken( {", SourceOrigin::Existing).unwrap_err();
        assert!(matches!(
            err,
            MergeError::Syntax {
                origin: SourceOrigin::Existing,
                ..
            }
        ));
    }
}
