//! Shared chumsky parser utilities for diagram line parsing
//!
//! The diagram grammar is line oriented, so none of these combinators
//! consume newlines.

use chumsky::prelude::*;

/// Extra state shared by every diagram line parser.
pub type LineExtra<'src> = extra::Err<Rich<'src, char>>;

/// Parse optional inline whitespace (spaces and tabs).
pub fn inline_whitespace<'src>() -> impl Parser<'src, &'src str, (), LineExtra<'src>> + Clone {
    one_of(" \t").repeated().ignored()
}

/// Parse required inline whitespace (at least one space or tab).
pub fn inline_whitespace_required<'src>(
) -> impl Parser<'src, &'src str, (), LineExtra<'src>> + Clone {
    one_of(" \t").repeated().at_least(1).ignored()
}

/// Parse a word identifier: letters, digits and underscores.
pub fn identifier<'src>() -> impl Parser<'src, &'src str, String, LineExtra<'src>> + Clone {
    any()
        .filter(|c: &char| c.is_alphanumeric() || *c == '_')
        .repeated()
        .at_least(1)
        .collect::<String>()
}

/// Parse a transition arrow, padded with optional whitespace.
///
/// Accepts `->`, `-->` and longer runs of dashes; style annotations such
/// as `-[dotted]->` are stripped before the line reaches the parser.
pub fn arrow<'src>() -> impl Parser<'src, &'src str, (), LineExtra<'src>> + Clone {
    just('-')
        .repeated()
        .at_least(1)
        .then(just('>'))
        .padded_by(inline_whitespace())
        .ignored()
}

/// Parse a parenthesized parameter list: `(a, "b" ,c)`.
///
/// Parameters are split on commas, trimmed, and stripped of double quotes.
/// An empty or blank list yields no parameters.
pub fn call_params<'src>() -> impl Parser<'src, &'src str, Vec<String>, LineExtra<'src>> + Clone
{
    just('(')
        .ignore_then(none_of(')').repeated().collect::<String>())
        .then_ignore(just(')'))
        .map(|raw| split_params(&raw))
}

/// Split a raw comma separated parameter string.
pub fn split_params(raw: &str) -> Vec<String> {
    let raw = raw.replace('"', "");
    if raw.trim().is_empty() {
        return Vec::new();
    }
    raw.split(',').map(|p| p.trim().to_string()).collect()
}
