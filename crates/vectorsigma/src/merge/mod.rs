//! Incremental merge of regenerated source into user-edited source
//!
//! Regeneration must not destroy code a user has written. Two comment
//! markers decide what the generator may touch:
//!
//! - [`OWNERSHIP_MARKER`] in the comment lines above a function marks it
//!   as generator owned. Owned functions that are no longer generated are
//!   removed.
//! - [`NOT_IMPLEMENTED_MARKER`] in a function body marks it as not yet
//!   customized. Such functions are replaced by their regenerated text.
//!
//! Functions are matched by name. Everything outside the touched functions
//! is kept byte for byte.

mod declarations;

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use tracing::{debug, span, Level};

use crate::core::{MergeError, SourceOrigin};
use declarations::{declarations, Declaration};

/// Comment prefix tagging a function as generator owned
pub const OWNERSHIP_MARKER: &str = "// +vectorsigma:";

/// Body comment marking a function as safe to overwrite
pub const NOT_IMPLEMENTED_MARKER: &str = "// TODO: Implement me!";

/// Result of a merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub source: String,
    /// Whether any function was added, replaced or removed
    pub changed: bool,
}

/// Merge `generated` into `existing`.
///
/// Fails only when either input is not valid Rust; no partial output is
/// produced in that case.
pub fn merge(existing: &str, generated: &str) -> Result<MergeOutcome, MergeError> {
    let merge_span = span!(Level::DEBUG, "merge", existing_len = existing.len());
    let _enter = merge_span.enter();

    let existing_decls = declarations(existing, SourceOrigin::Existing)?;
    let generated_decls = declarations(generated, SourceOrigin::Generated)?;

    let mut by_name: HashMap<&str, &Declaration> = HashMap::new();
    for decl in &existing_decls {
        by_name.entry(decl.name.as_str()).or_insert(decl);
    }
    let generated_names: HashSet<&str> = generated_decls.iter().map(|d| d.name.as_str()).collect();

    let mut edits: Vec<(Range<usize>, &str)> = Vec::new();
    let mut appended: Vec<&str> = Vec::new();

    for decl in &generated_decls {
        let text = decl.text(generated);
        match by_name.get(decl.name.as_str()) {
            None => {
                debug!(function = %decl.name, "Adding function");
                appended.push(text);
            }
            Some(current) if current.body(existing).contains(NOT_IMPLEMENTED_MARKER) => {
                if current.text(existing) != text {
                    debug!(function = %decl.name, "Replacing unimplemented function");
                    edits.push((current.start..current.end, text));
                }
            }
            Some(_) => {
                debug!(function = %decl.name, "Keeping customized function");
            }
        }
    }

    for (i, decl) in existing_decls.iter().enumerate() {
        if generated_names.contains(decl.name.as_str()) || !is_owned(decl, existing) {
            continue;
        }
        debug!(function = %decl.name, "Removing stale generated function");
        let limit = existing_decls
            .get(i + 1)
            .map_or(existing.len(), |next| next.start);
        edits.push((removal_range(existing, decl, limit), ""));
    }

    let changed = !edits.is_empty() || !appended.is_empty();
    if !changed {
        return Ok(MergeOutcome {
            source: existing.to_string(),
            changed,
        });
    }

    let mut source = existing.to_string();
    edits.sort_by(|a, b| b.0.start.cmp(&a.0.start));
    for (range, text) in edits {
        source.replace_range(range, text);
    }

    for text in appended {
        let body = source.trim_end();
        source = if body.is_empty() {
            format!("{}\n", text)
        } else {
            format!("{}\n\n{}\n", body, text)
        };
    }

    Ok(MergeOutcome { source, changed })
}

fn is_owned(decl: &Declaration, source: &str) -> bool {
    decl.leading(source)
        .lines()
        .any(|line| line.trim_start().starts_with(OWNERSHIP_MARKER))
}

/// Whole lines of a declaration plus one blank line after it, never
/// reaching past `limit`
fn removal_range(source: &str, decl: &Declaration, limit: usize) -> Range<usize> {
    let line_end = |from: usize| {
        source[from..]
            .find('\n')
            .map(|i| from + i + 1)
            .unwrap_or(source.len())
    };

    let mut end = line_end(decl.end);
    let next = line_end(end);
    if end < source.len() && source[end..next].trim().is_empty() {
        end = next;
    }
    decl.start..end.min(limit)
}
