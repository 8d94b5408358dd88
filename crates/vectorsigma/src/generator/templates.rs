//! Source templates for generated packages
//!
//! Each template renders one file from the parsed model. The generated
//! runtime follows the same run semantics as [`crate::machine::Machine`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write};

use crate::merge::{NOT_IMPLEMENTED_MARKER, OWNERSHIP_MARKER};
use crate::uml::{Action, Fsm, State, FINAL_STATE, INITIAL_STATE};

/// Struct name used when a diagram has no title
const DEFAULT_MACHINE_NAME: &str = "StateMachine";

/// Line width used by `rustfmt`
const MAX_WIDTH: usize = 100;

/// Guard that gets a working implementation instead of a stub
const ERROR_GUARD: &str = "IsError";

/// Convert a diagram name such as `ParseUML` to `parse_uml`
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_lower)
            {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }
    out
}

/// Name of the generated machine struct
pub fn machine_name(fsm: &Fsm) -> &str {
    if fsm.title.is_empty() {
        DEFAULT_MACHINE_NAME
    } else {
        &fsm.title
    }
}

pub(crate) fn actions(fsm: &Fsm) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "//! Actions of the {} state machine", machine_name(fsm))?;
    writeln!(out)?;
    writeln!(out, "use super::extended_state::ExtendedState;")?;

    for name in &fsm.action_names {
        writeln!(out)?;
        writeln!(out, "{}action:{}", OWNERSHIP_MARKER, name)?;
        write_signature(
            &mut out,
            &to_snake_case(name),
            &["_state: &mut ExtendedState", "_params: &[&str]"],
            "anyhow::Result<()>",
        )?;
        writeln!(out, "    {}", NOT_IMPLEMENTED_MARKER)?;
        writeln!(out, "    Ok(())")?;
        writeln!(out, "}}")?;
    }
    Ok(out)
}

pub(crate) fn guards(fsm: &Fsm) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "//! Guards of the {} state machine", machine_name(fsm))?;
    writeln!(out)?;
    writeln!(out, "use super::extended_state::ExtendedState;")?;

    for name in &fsm.guard_names {
        writeln!(out)?;
        writeln!(out, "{}guard:{}", OWNERSHIP_MARKER, name)?;
        if name == ERROR_GUARD {
            write_signature(&mut out, &to_snake_case(name), &["state: &ExtendedState"], "bool")?;
            writeln!(out, "    state.error.is_some()")?;
        } else {
            write_signature(&mut out, &to_snake_case(name), &["_state: &ExtendedState"], "bool")?;
            writeln!(out, "    {}", NOT_IMPLEMENTED_MARKER)?;
            writeln!(out, "    false")?;
        }
        writeln!(out, "}}")?;
    }
    Ok(out)
}

/// Imports of the generated test files; some stay unused in small machines
fn write_test_header(out: &mut String, title: &str, imports: &[&str]) -> fmt::Result {
    writeln!(out, "//! {}", title)?;
    writeln!(out)?;
    writeln!(out, "#![allow(unused_imports)]")?;
    writeln!(out)?;
    for import in imports {
        writeln!(out, "use {};", import)?;
    }
    Ok(())
}

pub(crate) fn actions_test(fsm: &Fsm) -> Result<String, fmt::Error> {
    let mut out = String::new();
    write_test_header(
        &mut out,
        &format!("Tests for the actions of the {} state machine", machine_name(fsm)),
        &["super::actions", "super::extended_state::ExtendedState"],
    )?;

    for name in &fsm.action_names {
        let snake = to_snake_case(name);
        writeln!(out)?;
        writeln!(out, "{}action_test:{}", OWNERSHIP_MARKER, name)?;
        writeln!(out, "#[test]")?;
        writeln!(out, "fn test_{}() {{", snake)?;
        writeln!(out, "    let mut state = ExtendedState::default();")?;
        writeln!(out, "    {}", NOT_IMPLEMENTED_MARKER)?;
        writeln!(out, "    assert!(actions::{}(&mut state, &[]).is_ok());", snake)?;
        writeln!(out, "}}")?;
    }
    Ok(out)
}

pub(crate) fn guards_test(fsm: &Fsm) -> Result<String, fmt::Error> {
    let mut out = String::new();
    write_test_header(
        &mut out,
        &format!("Tests for the guards of the {} state machine", machine_name(fsm)),
        &["super::extended_state::ExtendedState", "super::guards"],
    )?;

    for name in &fsm.guard_names {
        let snake = to_snake_case(name);
        writeln!(out)?;
        writeln!(out, "{}guard_test:{}", OWNERSHIP_MARKER, name)?;
        writeln!(out, "#[test]")?;
        writeln!(out, "fn test_{}() {{", snake)?;
        if name == ERROR_GUARD {
            writeln!(out, "    let mut state = ExtendedState::default();")?;
            writeln!(out, "    assert!(!guards::{}(&state));", snake)?;
            writeln!(out, "    state.error = Some(anyhow::anyhow!(\"failed\"));")?;
            writeln!(out, "    assert!(guards::{}(&state));", snake)?;
        } else {
            writeln!(out, "    let state = ExtendedState::default();")?;
            writeln!(out, "    {}", NOT_IMPLEMENTED_MARKER)?;
            writeln!(out, "    assert!(!guards::{}(&state));", snake)?;
        }
        writeln!(out, "}}")?;
    }
    Ok(out)
}

pub(crate) fn state_machine_test(fsm: &Fsm) -> Result<String, fmt::Error> {
    let name = machine_name(fsm);
    let mut out = String::new();
    writeln!(out, "// This file is generated by VectorSigma. DO NOT EDIT.")?;
    writeln!(out)?;
    writeln!(out, "use super::{{{}, StateName}};", name)?;
    writeln!(out)?;
    writeln!(out, "#[test]")?;
    writeln!(out, "fn test_run_returns_to_initial_state() {{")?;
    writeln!(out, "    let mut machine = {}::new();", name)?;
    writeln!(out, "    let _ = machine.run();")?;
    writeln!(
        out,
        "    assert_eq!(machine.current_state, StateName::{});",
        fsm.initial_state
    )?;
    writeln!(out, "}}")?;
    Ok(out)
}

pub(crate) fn extended_state(fsm: &Fsm) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(
        out,
        "//! Extended state of the {} state machine",
        machine_name(fsm)
    )?;
    writeln!(out)?;
    writeln!(
        out,
        "/// Data shared by the actions and guards of the state machine"
    )?;
    writeln!(out, "#[derive(Debug, Default)]")?;
    writeln!(out, "pub struct ExtendedState {{")?;
    writeln!(out, "    /// Error of the last failed action, if any")?;
    writeln!(out, "    pub error: Option<anyhow::Error>,")?;
    writeln!(out, "}}")?;
    Ok(out)
}

pub(crate) fn module(fsm: &Fsm) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(
        out,
        "//! {} state machine generated by VectorSigma",
        machine_name(fsm)
    )?;
    writeln!(out)?;
    for line in [
        "pub mod actions;",
        "pub mod extended_state;",
        "pub mod guards;",
        "mod zz_generated_statemachine;",
        "",
        "#[cfg(test)]",
        "mod actions_test;",
        "#[cfg(test)]",
        "mod guards_test;",
        "#[cfg(test)]",
        "mod zz_generated_statemachine_test;",
        "",
        "#[allow(unused_imports)]",
        "pub use extended_state::ExtendedState;",
        "pub use zz_generated_statemachine::*;",
    ] {
        writeln!(out, "{}", line)?;
    }
    Ok(out)
}

pub(crate) fn cargo_toml(module: &str) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "[package]")?;
    writeln!(out, "name = \"{}\"", module)?;
    writeln!(out, "version = \"0.1.0\"")?;
    writeln!(out, "edition = \"2021\"")?;
    writeln!(out)?;
    writeln!(out, "[dependencies]")?;
    writeln!(out, "anyhow = \"1.0\"")?;
    writeln!(out, "tracing = \"0.1\"")?;
    writeln!(out, "tracing-subscriber = \"0.3\"")?;
    Ok(out)
}

pub(crate) fn main_rs(fsm: &Fsm, package: &str) -> Result<String, fmt::Error> {
    let name = machine_name(fsm);
    let mut out = String::new();
    writeln!(out, "mod {};", package)?;
    writeln!(out)?;
    writeln!(out, "use tracing::Level;")?;
    writeln!(out)?;
    writeln!(out, "fn main() {{")?;
    writeln!(
        out,
        "    let level = if std::env::var_os(\"{}_DEBUG\").is_some() {{",
        to_snake_case(name).to_uppercase()
    )?;
    writeln!(out, "        Level::DEBUG")?;
    writeln!(out, "    }} else {{")?;
    writeln!(out, "        Level::INFO")?;
    writeln!(out, "    }};")?;
    writeln!(
        out,
        "    tracing_subscriber::fmt().with_max_level(level).init();"
    )?;
    writeln!(out)?;
    writeln!(out, "    let mut machine = {}::{}::new();", package, name)?;
    writeln!(out, "    if let Err(err) = machine.run() {{")?;
    writeln!(
        out,
        "        eprintln!(\"State machine run ended with error: {{err}}\");"
    )?;
    writeln!(out, "    }}")?;
    writeln!(out, "}}")?;
    Ok(out)
}

pub(crate) fn state_machine(fsm: &Fsm) -> Result<String, fmt::Error> {
    let name = machine_name(fsm);
    let mut out = String::new();

    writeln!(out, "// This file is generated by VectorSigma. DO NOT EDIT.")?;
    writeln!(out)?;
    writeln!(out, "use std::collections::HashMap;")?;
    writeln!(out)?;
    writeln!(out, "use tracing::{{debug, error}};")?;
    writeln!(out)?;
    writeln!(out, "use super::actions;")?;
    writeln!(out, "use super::extended_state::ExtendedState;")?;
    writeln!(out, "use super::guards;")?;
    writeln!(out)?;
    writeln!(out, "const MAX_STATE_DEPTH: usize = {};", crate::machine::DEFAULT_MAX_DEPTH)?;
    writeln!(out)?;

    let mut states: BTreeSet<&str> = fsm.all_states.iter().map(String::as_str).collect();
    states.insert(INITIAL_STATE);
    states.insert(FINAL_STATE);
    write_enum(&mut out, "StateName", "Hash", states)?;
    write_enum(
        &mut out,
        "ActionName",
        "",
        fsm.action_names.iter().map(String::as_str),
    )?;
    write_enum(
        &mut out,
        "GuardName",
        "",
        fsm.guard_names.iter().map(String::as_str),
    )?;

    out.push_str(RUNTIME_TYPES);
    writeln!(out)?;

    writeln!(out, "/// The {} finite state machine", name)?;
    writeln!(out, "pub struct {} {{", name)?;
    writeln!(out, "    pub current_state: StateName,")?;
    writeln!(out, "    pub extended_state: ExtendedState,")?;
    writeln!(out, "    pub state_configs: HashMap<StateName, StateConfig>,")?;
    writeln!(out, "}}")?;
    writeln!(out)?;
    writeln!(out, "impl {} {{", name)?;
    writeln!(out, "    pub fn new() -> Self {{")?;
    writeln!(out, "        Self {{")?;
    writeln!(
        out,
        "            current_state: StateName::{},",
        fsm.initial_state
    )?;
    writeln!(out, "            extended_state: ExtendedState::default(),")?;
    write!(out, "            state_configs: ")?;
    write_state_table(&mut out, &fsm.states, 3)?;
    writeln!(out, ",")?;
    writeln!(out, "        }}")?;
    writeln!(out, "    }}")?;
    writeln!(out)?;
    writeln!(out, "    /// Run until the final state is reached.")?;
    writeln!(out, "    ///")?;
    writeln!(
        out,
        "    /// The machine is back in its initial state afterwards, even when"
    )?;
    writeln!(out, "    /// the run ends with an error.")?;
    writeln!(out, "    pub fn run(&mut self) -> anyhow::Result<()> {{")?;
    writeln!(out, "        let result = run(")?;
    writeln!(out, "            &mut self.current_state,")?;
    writeln!(out, "            &mut self.extended_state,")?;
    writeln!(out, "            &self.state_configs,")?;
    writeln!(out, "            StateName::{},", fsm.initial_state)?;
    writeln!(out, "            0,")?;
    writeln!(out, "        );")?;
    writeln!(out, "        if result.is_err() {{")?;
    writeln!(
        out,
        "            self.current_state = StateName::{};",
        fsm.initial_state
    )?;
    writeln!(out, "        }}")?;
    writeln!(out, "        result")?;
    writeln!(out, "    }}")?;
    writeln!(out, "}}")?;
    writeln!(out)?;
    writeln!(out, "impl Default for {} {{", name)?;
    writeln!(out, "    fn default() -> Self {{")?;
    writeln!(out, "        Self::new()")?;
    writeln!(out, "    }}")?;
    writeln!(out, "}}")?;

    out.push_str(RUN_LOOP);
    Ok(out)
}

/// Write a function signature the way `rustfmt` lays it out, so that
/// formatted files merge cleanly with fresh output.
fn write_signature(out: &mut String, name: &str, args: &[&str], ret: &str) -> fmt::Result {
    let line = format!("pub fn {}({}) -> {} {{", name, args.join(", "), ret);
    if line.len() <= MAX_WIDTH {
        return writeln!(out, "{}", line);
    }
    writeln!(out, "pub fn {}(", name)?;
    for arg in args {
        writeln!(out, "    {},", arg)?;
    }
    writeln!(out, ") -> {} {{", ret)
}

fn write_enum<'a>(
    out: &mut String,
    name: &str,
    extra_derive: &str,
    variants: impl IntoIterator<Item = &'a str>,
) -> fmt::Result {
    let extra = if extra_derive.is_empty() {
        String::new()
    } else {
        format!(", {}", extra_derive)
    };
    writeln!(
        out,
        "#[derive(Debug, Clone, Copy, PartialEq, Eq{})]",
        extra
    )?;
    writeln!(out, "pub enum {} {{", name)?;
    for variant in variants {
        writeln!(out, "    {},", variant)?;
    }
    writeln!(out, "}}")?;
    writeln!(out)
}

fn action_expr(action: &Action) -> String {
    format!(
        "Action {{ name: ActionName::{}, params: &[{}], execute: actions::{} }}",
        action.name,
        action.params_literal(),
        to_snake_case(&action.name)
    )
}

/// Write a `HashMap::from([...])` expression for a state table
fn write_state_table(
    out: &mut String,
    states: &BTreeMap<String, State>,
    indent: usize,
) -> fmt::Result {
    let pad = "    ".repeat(indent);
    writeln!(out, "HashMap::from([")?;

    for (name, state) in states.iter().filter(|(n, _)| n.as_str() != FINAL_STATE) {
        writeln!(out, "{pad}    (")?;
        writeln!(out, "{pad}        StateName::{name},")?;
        writeln!(out, "{pad}        StateConfig {{")?;

        writeln!(out, "{pad}            actions: vec![")?;
        for action in &state.actions {
            writeln!(out, "{pad}                {},", action_expr(action))?;
        }
        writeln!(out, "{pad}            ],")?;

        writeln!(out, "{pad}            guards: vec![")?;
        for transition in state.guarded_transitions() {
            let action = transition
                .action
                .as_ref()
                .map(|a| format!("Some({})", action_expr(a)))
                .unwrap_or_else(|| "None".to_string());
            writeln!(
                out,
                "{pad}                Guard {{ name: GuardName::{}, check: guards::{}, action: {} }},",
                transition.guard,
                to_snake_case(&transition.guard),
                action
            )?;
        }
        writeln!(out, "{pad}            ],")?;

        writeln!(out, "{pad}            transitions: HashMap::from([")?;
        for (slot, target) in state.transition_slots() {
            writeln!(out, "{pad}                ({slot}, StateName::{target}),")?;
        }
        writeln!(out, "{pad}            ]),")?;

        match &state.composite {
            Some(composite) => {
                writeln!(out, "{pad}            composite: Some(CompositeState {{")?;
                writeln!(
                    out,
                    "{pad}                initial_state: StateName::{},",
                    composite.initial_state
                )?;
                write!(out, "{pad}                state_configs: ")?;
                write_state_table(out, &composite.states, indent + 4)?;
                writeln!(out, ",")?;
                writeln!(out, "{pad}            }}),")?;
            }
            None => writeln!(out, "{pad}            composite: None,")?,
        }

        writeln!(out, "{pad}        }},")?;
        writeln!(out, "{pad}    ),")?;
    }

    write!(out, "{pad}])")
}

const RUNTIME_TYPES: &str = r#"/// Errors that end a run immediately
#[derive(Debug)]
pub enum FatalError {
    DepthExceeded,
    MissingConfig(StateName),
    Stalled(StateName),
}

impl std::fmt::Display for FatalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FatalError::DepthExceeded => write!(f, "max state depth exceeded"),
            FatalError::MissingConfig(state) => write!(f, "missing config for state: {:?}", state),
            FatalError::Stalled(state) => {
                write!(f, "state {:?} has no matching guard and no default transition", state)
            }
        }
    }
}

impl std::error::Error for FatalError {}

/// An action bound to the parameters it was declared with
pub struct Action {
    pub name: ActionName,
    pub params: &'static [&'static str],
    pub execute: fn(&mut ExtendedState, &[&str]) -> anyhow::Result<()>,
}

/// A guard and the action to run when it wins
pub struct Guard {
    pub name: GuardName,
    pub check: fn(&ExtendedState) -> bool,
    pub action: Option<Action>,
}

/// Actions, guards and transitions of a single state
///
/// `transitions` maps a guard index to the next state; the default
/// transition is stored at `guards.len()`.
#[derive(Default)]
pub struct StateConfig {
    pub actions: Vec<Action>,
    pub guards: Vec<Guard>,
    pub transitions: HashMap<usize, StateName>,
    pub composite: Option<CompositeState>,
}

/// A nested state machine scoped to one state
pub struct CompositeState {
    pub initial_state: StateName,
    pub state_configs: HashMap<StateName, StateConfig>,
}
"#;

const RUN_LOOP: &str = r#"
fn run(
    current_state: &mut StateName,
    extended_state: &mut ExtendedState,
    state_configs: &HashMap<StateName, StateConfig>,
    initial_state: StateName,
    depth: usize,
) -> anyhow::Result<()> {
    if depth > MAX_STATE_DEPTH {
        return Err(FatalError::DepthExceeded.into());
    }

    loop {
        if *current_state == StateName::FinalState {
            // Reset so the machine can be run again
            *current_state = initial_state;
            return match extended_state.error.take() {
                Some(err) => Err(err),
                None => Ok(()),
            };
        }

        let state = *current_state;
        let Some(config) = state_configs.get(&state) else {
            error!(?state, "Missing config");
            return Err(FatalError::MissingConfig(state).into());
        };

        if let Some(composite) = &config.composite {
            *current_state = composite.initial_state;
            debug!(?state, initial = ?composite.initial_state, "Entering composite state");
            if let Err(err) = run(
                current_state,
                extended_state,
                &composite.state_configs,
                composite.initial_state,
                depth + 1,
            ) {
                if err.is::<FatalError>() {
                    return Err(err);
                }
                error!(?state, error = %err, "Composite state machine failed");
                extended_state.error = Some(err);
            }
            debug!(?state, "Exiting composite state");
            *current_state = state;
        } else {
            for action in &config.actions {
                debug!(action = ?action.name, ?state, "Executing");
                if let Err(err) = (action.execute)(extended_state, action.params) {
                    error!(action = ?action.name, ?state, error = %err, "Action failed");
                    extended_state.error = Some(err);
                    break;
                }
            }
        }

        match run_guards(state, config, extended_state) {
            Ok(Some(next)) => {
                *current_state = next;
                continue;
            }
            Ok(None) => {}
            Err(err) => {
                // A failed guarded action always ends the run
                extended_state.error = Some(err);
                *current_state = StateName::FinalState;
                continue;
            }
        }

        match config.transitions.get(&config.guards.len()) {
            Some(next) => {
                debug!(current = ?state, next = ?next, "Unguarded transition");
                *current_state = *next;
            }
            None => {
                error!(?state, "No guard matched and no default transition");
                return Err(FatalError::Stalled(state).into());
            }
        }
    }
}

fn run_guards(
    state: StateName,
    config: &StateConfig,
    extended_state: &mut ExtendedState,
) -> anyhow::Result<Option<StateName>> {
    for (index, guard) in config.guards.iter().enumerate() {
        if !(guard.check)(extended_state) {
            continue;
        }

        if let Some(action) = &guard.action {
            if let Err(err) = (action.execute)(extended_state, action.params) {
                debug!(?state, guard = ?guard.name, action = ?action.name, error = %err, "Guarded action failed");
                return Err(err);
            }
        }

        if let Some(next) = config.transitions.get(&index) {
            debug!(guard = ?guard.name, current = ?state, next = ?next, "Guarded transition");
            return Ok(Some(*next));
        }
    }
    Ok(None)
}
"#;
