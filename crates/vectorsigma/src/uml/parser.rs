//! PlantUML state diagram parser using chumsky
//!
//! A permissive, line oriented recognizer. Each line is tried against a
//! fixed list of shapes and the first match wins; lines matching no shape
//! are skipped.

use super::model::{Action, Composite, Fsm, Transition, BOUNDARY_MARKER, FINAL_STATE, INITIAL_STATE};
use crate::core::chumsky_utils::{
    arrow, call_params, identifier, inline_whitespace, inline_whitespace_required, LineExtra,
};
use chumsky::prelude::*;
use tracing::{debug, span, trace, Level};

/// Arrow style annotations that carry no meaning for the machine.
const DECORATIONS: &[&str] = &["[dotted]", "[bold]", "[dashed]", "[hidden]"];

/// Parsed diagram statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `title Traffic Light`
    Title(String),
    /// `InitialState --> Red`, after boundary marker rewriting
    InitialTransition { to: String },
    /// `Red: do / SwitchIn(5)`
    Action { state: String, action: Action },
    /// `Red --> Blinking: [ IsBroken ] :: Alert(ops)`
    GuardedTransition {
        from: String,
        to: String,
        guard: String,
        action: Option<Action>,
    },
    /// `Red --> Green`
    DefaultTransition { from: String, to: String },
    /// `state Switching {`
    CompositeStart { name: String },
}

/// State diagram parser
#[derive(Debug, Clone, Copy)]
pub struct UmlParser;

impl UmlParser {
    pub fn new() -> Self {
        Self
    }

    fn title_parser<'src>(
    ) -> impl chumsky::Parser<'src, &'src str, Statement, LineExtra<'src>> + Clone {
        just("title")
            .ignore_then(inline_whitespace_required())
            .ignore_then(any().repeated().collect::<String>())
            .map(|title| Statement::Title(title.split_whitespace().collect()))
    }

    fn initial_transition_parser<'src>(
    ) -> impl chumsky::Parser<'src, &'src str, Statement, LineExtra<'src>> + Clone {
        just(INITIAL_STATE)
            .ignore_then(arrow())
            .ignore_then(identifier())
            .map(|to| Statement::InitialTransition { to })
    }

    /// `Name` or `Name(params)`
    fn action_call<'src>() -> impl chumsky::Parser<'src, &'src str, Action, LineExtra<'src>> + Clone
    {
        identifier()
            .then(call_params().or_not())
            .map(|(name, params)| Action::new(name, params.unwrap_or_default()))
    }

    fn action_parser<'src>(
    ) -> impl chumsky::Parser<'src, &'src str, Statement, LineExtra<'src>> + Clone {
        identifier()
            .then_ignore(just(':').padded_by(inline_whitespace()))
            .then_ignore(just("do"))
            .then_ignore(just('/').padded_by(inline_whitespace()))
            .then(Self::action_call())
            .map(|(state, action)| Statement::Action { state, action })
    }

    fn guarded_transition_parser<'src>(
    ) -> impl chumsky::Parser<'src, &'src str, Statement, LineExtra<'src>> + Clone {
        let guard = just('[')
            .or_not()
            .ignore_then(identifier().padded_by(inline_whitespace()))
            .then_ignore(just(']').or_not());

        let guarded_action = just("::")
            .padded_by(inline_whitespace())
            .ignore_then(Self::action_call())
            .or_not();

        identifier()
            .then_ignore(arrow())
            .then(identifier())
            .then_ignore(just(':').padded_by(inline_whitespace()))
            .then(guard)
            .then_ignore(inline_whitespace())
            .then(guarded_action)
            .map(|(((from, to), guard), action)| Statement::GuardedTransition {
                from,
                to,
                guard,
                action,
            })
    }

    fn default_transition_parser<'src>(
    ) -> impl chumsky::Parser<'src, &'src str, Statement, LineExtra<'src>> + Clone {
        identifier()
            .then_ignore(arrow())
            .then(identifier())
            .map(|(from, to)| Statement::DefaultTransition { from, to })
    }

    fn composite_start_parser<'src>(
    ) -> impl chumsky::Parser<'src, &'src str, Statement, LineExtra<'src>> + Clone {
        just("state")
            .ignore_then(inline_whitespace_required())
            .ignore_then(identifier())
            .then_ignore(just('{').padded_by(inline_whitespace()))
            .map(|name| Statement::CompositeStart { name })
    }

    /// Line shapes in priority order.
    ///
    /// Each shape must span the whole line; a shape that only matches a
    /// prefix falls through to the next one.
    fn statement_parser<'src>(
    ) -> impl chumsky::Parser<'src, &'src str, Statement, LineExtra<'src>> + Clone {
        whole_line(Self::title_parser())
            .or(whole_line(Self::initial_transition_parser()))
            .or(whole_line(Self::action_parser()))
            .or(whole_line(Self::guarded_transition_parser()))
            .or(whole_line(Self::default_transition_parser()))
            .or(whole_line(Self::composite_start_parser()))
    }

    /// Parse a single, already normalized line
    pub fn parse_statement(&self, line: &str) -> Option<Statement> {
        Self::statement_parser()
            .parse(line.trim())
            .into_result()
            .ok()
    }

    /// Parse diagram text into a model. Never fails.
    pub fn parse(&self, input: &str) -> Fsm {
        let parse_span = span!(Level::DEBUG, "parse_uml", input_len = input.len());
        let _enter = parse_span.enter();

        let lines: Vec<&str> = input.lines().collect();
        let mut fsm = Fsm::new();
        let mut marker_seen = false;
        let mut index = 0;

        while index < lines.len() {
            let line = normalize_line(lines[index], &mut marker_seen);
            index += 1;

            let Some(statement) = self.parse_statement(&line) else {
                if !line.trim().is_empty() {
                    trace!(line = %line.trim(), "Skipping unrecognized line");
                }
                continue;
            };

            trace!(?statement, "Parsed line");
            match statement {
                Statement::Title(title) => fsm.title = title,
                Statement::InitialTransition { to } => {
                    fsm.initial_state = INITIAL_STATE.to_string();
                    add_transition(&mut fsm, INITIAL_STATE, Transition::default_to(to));
                }
                Statement::Action { state, action } => {
                    fsm.register_action(&action.name);
                    fsm.ensure_state(&state).actions.push(action);
                }
                Statement::GuardedTransition {
                    from,
                    to,
                    guard,
                    action,
                } => {
                    fsm.register_guard(&guard);
                    if let Some(action) = &action {
                        fsm.register_action(&action.name);
                    }
                    add_transition(&mut fsm, &from, Transition::guarded(to, guard, action));
                }
                Statement::DefaultTransition { from, to } => {
                    add_transition(&mut fsm, &from, Transition::default_to(to));
                }
                Statement::CompositeStart { name } => {
                    let end = block_end(&lines, index);
                    let body = lines[index..end].join("\n");
                    debug!(state = %name, lines = end - index, "Parsing composite state");

                    let nested = self.parse(&body);
                    fsm.absorb(&nested);
                    fsm.ensure_state(&name).composite = Some(Composite {
                        initial_state: nested.initial_state,
                        states: nested.states,
                    });

                    // Skip the block body and its closing brace
                    index = (end + 1).min(lines.len());
                }
            }
        }

        fsm.finalize();
        debug!(
            states = fsm.state_count(),
            actions = fsm.action_names.len(),
            guards = fsm.guard_names.len(),
            "Parsed diagram"
        );
        fsm
    }
}

impl Default for UmlParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Anchor a line shape to the end of the line
fn whole_line<'src, P>(
    shape: P,
) -> impl chumsky::Parser<'src, &'src str, Statement, LineExtra<'src>> + Clone
where
    P: chumsky::Parser<'src, &'src str, Statement, LineExtra<'src>> + Clone,
{
    shape.then_ignore(inline_whitespace()).then_ignore(end())
}

/// Strip decorations and rewrite the boundary marker.
///
/// The first marker in the text is the entry, every later one the exit.
fn normalize_line(line: &str, marker_seen: &mut bool) -> String {
    let mut line = line.to_string();
    for decoration in DECORATIONS {
        line = line.replace(decoration, "");
    }

    if !*marker_seen && line.contains(BOUNDARY_MARKER) {
        line = line.replacen(BOUNDARY_MARKER, INITIAL_STATE, 1);
        *marker_seen = true;
    }
    line.replace(BOUNDARY_MARKER, FINAL_STATE)
}

/// Append a transition and make sure its target exists in the same table
fn add_transition(fsm: &mut Fsm, from: &str, transition: Transition) {
    let target = transition.target.clone();
    fsm.ensure_state(from).transitions.push(transition);
    fsm.ensure_state(&target);
}

/// Index of the line closing the block whose body starts at `start`.
///
/// Nested `state X {` blocks are skipped; an unterminated block ends at
/// the end of the input.
fn block_end(lines: &[&str], start: usize) -> usize {
    let mut depth = 0usize;
    for (offset, line) in lines[start..].iter().enumerate() {
        let trimmed = line.trim();
        if trimmed == "}" {
            if depth == 0 {
                return start + offset;
            }
            depth -= 1;
        } else if trimmed.starts_with("state ") && trimmed.ends_with('{') {
            depth += 1;
        }
    }
    lines.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_title() {
        let parser = UmlParser::new();
        assert_eq!(
            parser.parse_statement("title My Title"),
            Some(Statement::Title("MyTitle".to_string()))
        );
        assert_eq!(parser.parse_statement("No Title"), None);
    }

    #[test]
    fn test_parse_action_with_params() {
        let parser = UmlParser::new();
        let result = parser
            .parse_statement(r#"Red: do / SwitchIn(5,  "north" , east)"#)
            .unwrap();
        assert_eq!(
            result,
            Statement::Action {
                state: "Red".to_string(),
                action: Action::new(
                    "SwitchIn",
                    vec!["5".to_string(), "north".to_string(), "east".to_string()]
                ),
            }
        );
    }

    #[test]
    fn test_parse_action_no_spaces() {
        let parser = UmlParser::new();
        let result = parser.parse_statement("State:do/action").unwrap();
        assert_eq!(
            result,
            Statement::Action {
                state: "State".to_string(),
                action: Action::new("action", vec![]),
            }
        );
    }

    #[test]
    fn test_parse_guarded_transition() {
        let parser = UmlParser::new();
        let result = parser
            .parse_statement("Red --> FinalState: [ IsError ]")
            .unwrap();
        assert_eq!(
            result,
            Statement::GuardedTransition {
                from: "Red".to_string(),
                to: "FinalState".to_string(),
                guard: "IsError".to_string(),
                action: None,
            }
        );
    }

    #[test]
    fn test_parse_guarded_transition_without_brackets() {
        let parser = UmlParser::new();
        let result = parser.parse_statement("Red-->Green:HasCars").unwrap();
        assert!(matches!(
            result,
            Statement::GuardedTransition { ref guard, .. } if guard == "HasCars"
        ));
    }

    #[test]
    fn test_parse_guarded_transition_with_action() {
        let parser = UmlParser::new();
        let result = parser
            .parse_statement("Red --> Blinking: [ IsBroken ] :: Alert(ops, 2)")
            .unwrap();
        assert_eq!(
            result,
            Statement::GuardedTransition {
                from: "Red".to_string(),
                to: "Blinking".to_string(),
                guard: "IsBroken".to_string(),
                action: Some(Action::new(
                    "Alert",
                    vec!["ops".to_string(), "2".to_string()]
                )),
            }
        );
    }

    #[test]
    fn test_parse_default_transition() {
        let parser = UmlParser::new();
        assert_eq!(
            parser.parse_statement("  Red   -->   Yellow  "),
            Some(Statement::DefaultTransition {
                from: "Red".to_string(),
                to: "Yellow".to_string(),
            })
        );
    }

    #[test]
    fn test_guarded_initial_transition_is_not_cut_short() {
        let parser = UmlParser::new();
        assert_eq!(
            parser.parse_statement("InitialState --> Red: [ IsReady ]"),
            Some(Statement::GuardedTransition {
                from: "InitialState".to_string(),
                to: "Red".to_string(),
                guard: "IsReady".to_string(),
                action: None,
            })
        );
    }

    #[test]
    fn test_parse_composite_start() {
        let parser = UmlParser::new();
        assert_eq!(
            parser.parse_statement("state Switching {"),
            Some(Statement::CompositeStart {
                name: "Switching".to_string()
            })
        );
    }

    #[test]
    fn test_unrecognized_lines() {
        let parser = UmlParser::new();
        assert_eq!(parser.parse_statement("@startuml"), None);
        assert_eq!(parser.parse_statement("Red --> Green : turn green now"), None);
        assert_eq!(parser.parse_statement(""), None);
    }

    #[test]
    fn test_normalize_line_marker_positions() {
        let mut seen = false;
        assert_eq!(
            normalize_line("[*] --> Red", &mut seen),
            "InitialState --> Red"
        );
        assert_eq!(normalize_line("Red --> [*]", &mut seen), "Red --> FinalState");
        assert_eq!(
            normalize_line("Red -[dotted]-> Green", &mut seen),
            "Red --> Green"
        );
    }

    #[test]
    fn test_block_end_nested() {
        let lines = vec![
            "  [*] --> A",
            "  state Inner {",
            "    [*] --> B",
            "  }",
            "  A --> [*]",
            "}",
            "Outer --> [*]",
        ];
        assert_eq!(block_end(&lines, 0), 5);
        assert_eq!(block_end(&lines[..3], 0), 3);
    }
}
