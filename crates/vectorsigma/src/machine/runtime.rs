//! The run loop shared by every state table

use tracing::{debug, error, span, trace, Level};

use super::table::{build_table, ExtendedState, Registry, StateConfig, StateTable};
use crate::core::MachineError;
use crate::uml::{Fsm, FINAL_STATE};

/// Maximum composite nesting before a run is aborted
pub const DEFAULT_MAX_DEPTH: usize = 5;

/// A runnable finite state machine
///
/// Reaching the final state ends a run and resets the machine to its
/// initial state, so the same instance can be run again.
pub struct Machine<C> {
    name: String,
    initial_state: String,
    current_state: String,
    table: StateTable<C>,
    extended_state: C,
    max_depth: usize,
}

/// Borrowed view of the mutable parts of a machine during a run
struct Cursor<'a, C> {
    current_state: &'a mut String,
    extended_state: &'a mut C,
    max_depth: usize,
}

impl<C: ExtendedState> Machine<C> {
    pub fn new(
        name: impl Into<String>,
        initial_state: impl Into<String>,
        table: StateTable<C>,
        extended_state: C,
    ) -> Self {
        let initial_state = initial_state.into();
        Self {
            name: name.into(),
            current_state: initial_state.clone(),
            initial_state,
            table,
            extended_state,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Bind a parsed model to executable actions and guards
    pub fn from_model(
        fsm: &Fsm,
        registry: &Registry<C>,
        extended_state: C,
    ) -> Result<Self, MachineError> {
        let table = build_table(&fsm.states, registry)?;
        Ok(Self::new(
            fsm.title.clone(),
            fsm.initial_state.clone(),
            table,
            extended_state,
        ))
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn current_state(&self) -> &str {
        &self.current_state
    }

    pub fn extended_state(&self) -> &C {
        &self.extended_state
    }

    pub fn extended_state_mut(&mut self) -> &mut C {
        &mut self.extended_state
    }

    pub fn into_extended_state(self) -> C {
        self.extended_state
    }

    /// Run until the final state is reached.
    ///
    /// Returns the error captured during the run, if any, as
    /// [`MachineError::Failed`]. Missing states, stalls and depth overflow
    /// are fatal and returned as soon as they occur.
    ///
    /// Every run ends in the initial state, so the machine can be run again
    /// after any error.
    pub fn run(&mut self) -> Result<(), MachineError> {
        let run_span = span!(Level::INFO, "run_machine", machine = %self.name);
        let _enter = run_span.enter();

        let mut cursor = Cursor {
            current_state: &mut self.current_state,
            extended_state: &mut self.extended_state,
            max_depth: self.max_depth,
        };
        let result = run_table(&self.table, &self.initial_state, &mut cursor, 0);
        if let Err(err) = &result {
            debug!(state = %self.current_state, error = %err, "Resetting after failed run");
            self.current_state.clone_from(&self.initial_state);
        }
        result
    }
}

fn run_table<C: ExtendedState>(
    table: &StateTable<C>,
    initial_state: &str,
    cursor: &mut Cursor<'_, C>,
    depth: usize,
) -> Result<(), MachineError> {
    if depth > cursor.max_depth {
        error!(depth, max = cursor.max_depth, "Max state depth exceeded");
        return Err(MachineError::DepthExceeded {
            depth,
            max: cursor.max_depth,
        });
    }

    loop {
        if cursor.current_state.as_str() == FINAL_STATE {
            *cursor.current_state = initial_state.to_string();
            return match cursor.extended_state.take_error() {
                Some(err) => Err(MachineError::Failed(err)),
                None => Ok(()),
            };
        }

        let state = cursor.current_state.clone();
        let config = table.get(&state).ok_or_else(|| {
            error!(state = %state, "Missing config");
            MachineError::MissingState {
                state: state.clone(),
            }
        })?;

        if let Some(composite) = &config.composite {
            *cursor.current_state = composite.initial_state.clone();
            debug!(state = %state, initial = %composite.initial_state, "Entering composite state");

            match run_table(
                &composite.states,
                &composite.initial_state,
                cursor,
                depth + 1,
            ) {
                Ok(()) => {}
                Err(MachineError::Failed(err)) => {
                    error!(state = %state, error = %err, "Composite state machine failed");
                    cursor.extended_state.set_error(err);
                }
                Err(fatal) => return Err(fatal),
            }

            debug!(state = %state, "Exiting composite state");
            *cursor.current_state = state.clone();
        } else {
            run_actions(&state, config, cursor.extended_state);
        }

        match select_guard(&state, config, cursor.extended_state) {
            GuardOutcome::Transition(next) => {
                *cursor.current_state = next;
            }
            GuardOutcome::Aborted => {
                *cursor.current_state = FINAL_STATE.to_string();
            }
            GuardOutcome::NoMatch => match config.default_target() {
                Some(next) => {
                    debug!(current = %state, next, "Unguarded transition");
                    *cursor.current_state = next.to_string();
                }
                None => {
                    error!(state = %state, "No guard matched and no default transition");
                    return Err(MachineError::Stalled { state });
                }
            },
        }
    }
}

/// Run entry actions in order, stopping at the first failure
fn run_actions<C: ExtendedState>(state: &str, config: &StateConfig<C>, extended_state: &mut C) {
    for action in &config.actions {
        debug!(action = %action.name, state, "Executing");
        if let Err(err) = action.execute(extended_state) {
            error!(action = %action.name, state, error = %err, "Action failed");
            extended_state.set_error(err);
            break;
        }
    }
}

enum GuardOutcome {
    Transition(String),
    Aborted,
    NoMatch,
}

/// Evaluate guards in declaration order; the first true guard with a slot
/// wins.
fn select_guard<C: ExtendedState>(
    state: &str,
    config: &StateConfig<C>,
    extended_state: &mut C,
) -> GuardOutcome {
    for (index, guard) in config.guards.iter().enumerate() {
        let passed = guard.guard.check(extended_state);
        trace!(guard = %guard.name, state, passed, "Checked guard");
        if !passed {
            continue;
        }

        if let Some(action) = &guard.action {
            if let Err(err) = action.execute(extended_state) {
                debug!(state, guard = %guard.name, action = %action.name, error = %err, "Guarded action failed");
                extended_state.set_error(err);
                return GuardOutcome::Aborted;
            }
        }

        if let Some(next) = config.transitions.get(&index) {
            debug!(guard = %guard.name, current = state, next = %next, "Guarded transition");
            return GuardOutcome::Transition(next.clone());
        }
    }

    GuardOutcome::NoMatch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uml::{UmlParser, INITIAL_STATE};
    use anyhow::anyhow;

    #[derive(Default)]
    struct Crossing {
        error: Option<anyhow::Error>,
        cars: bool,
        visited: Vec<String>,
    }

    impl ExtendedState for Crossing {
        fn error(&self) -> Option<&anyhow::Error> {
            self.error.as_ref()
        }

        fn set_error(&mut self, error: anyhow::Error) {
            self.error = Some(error);
        }

        fn take_error(&mut self) -> Option<anyhow::Error> {
            self.error.take()
        }
    }

    fn registry() -> Registry<Crossing> {
        Registry::new()
            .action("Record", |c: &mut Crossing, p: &[String]| -> anyhow::Result<()> {
                c.visited.push(p.join(","));
                Ok(())
            })
            .action("Fail", |_: &mut Crossing, p: &[String]| -> anyhow::Result<()> {
                Err(anyhow!("failed: {}", p.join(",")))
            })
            .guard("IsError", |c: &Crossing| c.error.is_some())
            .guard("HasCars", |c: &Crossing| c.cars)
            .guard("Never", |_: &Crossing| false)
    }

    fn machine(diagram: &str, crossing: Crossing) -> Machine<Crossing> {
        let fsm = UmlParser::new().parse(diagram);
        Machine::from_model(&fsm, &registry(), crossing).unwrap()
    }

    const LIGHTS: &str = "\
title Lights
[*] --> Red
Red: do / Record(red)
Red --> [*]: [ IsError ]
Red --> Green: [ HasCars ]
Red --> Yellow
Green: do / Record(green)
Green --> [*]
Yellow: do / Record(yellow)
Yellow --> [*]
";

    #[test]
    fn test_first_true_guard_wins() {
        let mut m = machine(
            LIGHTS,
            Crossing {
                cars: true,
                ..Default::default()
            },
        );
        m.run().unwrap();
        assert_eq!(m.extended_state().visited, vec!["red", "green"]);
        assert_eq!(m.current_state(), INITIAL_STATE);
        assert_eq!(m.name(), "Lights");
    }

    #[test]
    fn test_default_transition_when_no_guard_matches() {
        let mut m = machine(LIGHTS, Crossing::default());
        m.run().unwrap();
        assert_eq!(m.extended_state().visited, vec!["red", "yellow"]);
    }

    #[test]
    fn test_rerun_after_final_state() {
        let mut m = machine(LIGHTS, Crossing::default());
        m.run().unwrap();
        m.extended_state_mut().cars = true;
        m.run().unwrap();
        assert_eq!(
            m.into_extended_state().visited,
            vec!["red", "yellow", "red", "green"]
        );
    }

    #[test]
    fn test_actions_stop_at_first_failure() {
        let mut m = machine(
            "[*] --> A\n\
             A: do / Record(first)\n\
             A: do / Fail(boom)\n\
             A: do / Record(never)\n\
             A --> [*]: [ IsError ]\n\
             A --> B\n\
             B: do / Record(b)\n\
             B --> [*]",
            Crossing::default(),
        );
        let err = m.run().unwrap_err();
        assert!(matches!(err, MachineError::Failed(_)));
        assert_eq!(err.to_string(), "failed: boom");
        assert_eq!(m.extended_state().visited, vec!["first"]);
        assert!(m.extended_state().error().is_none());
        assert_eq!(m.current_state(), INITIAL_STATE);
    }

    #[test]
    fn test_guarded_action_failure_ends_run() {
        let mut m = machine(
            "[*] --> A\n\
             A --> B: [ HasCars ] :: Fail(guarded)\n\
             A --> B\n\
             B: do / Record(b)\n\
             B --> [*]",
            Crossing {
                cars: true,
                ..Default::default()
            },
        );
        let err = m.run().unwrap_err();
        assert_eq!(err.to_string(), "failed: guarded");
        assert!(m.extended_state().visited.is_empty());
    }

    #[test]
    fn test_guarded_action_runs_before_transition() {
        let mut m = machine(
            "[*] --> A\n\
             A --> B: [ HasCars ] :: Record(guarded)\n\
             B: do / Record(b)\n\
             B --> [*]",
            Crossing {
                cars: true,
                ..Default::default()
            },
        );
        m.run().unwrap();
        assert_eq!(m.extended_state().visited, vec!["guarded", "b"]);
    }

    const NESTED: &str = "\
[*] --> Outer
state Outer {
    [*] --> Inner
    Inner: do / Record(inner)
    Inner: do / Fail(inner)
    Inner --> [*]: [ IsError ]
    Inner --> [*]
}
Outer: do / Record(outer)
Outer --> [*]: [ IsError ]
Outer --> After
After: do / Record(after)
After --> [*]
";

    #[test]
    fn test_composite_failure_reaches_parent() {
        let mut m = machine(NESTED, Crossing::default());
        let err = m.run().unwrap_err();
        assert_eq!(err.to_string(), "failed: inner");
        // The composite's own entry actions are not run
        assert_eq!(m.extended_state().visited, vec!["inner"]);
        assert_eq!(m.current_state(), INITIAL_STATE);
    }

    #[test]
    fn test_composite_success_continues_in_parent() {
        let diagram = NESTED.replace("    Inner: do / Fail(inner)\n", "");
        let mut m = machine(&diagram, Crossing::default());
        m.run().unwrap();
        assert_eq!(m.extended_state().visited, vec!["inner", "after"]);
    }

    #[test]
    fn test_depth_ceiling() {
        let mut m = machine(NESTED, Crossing::default()).with_max_depth(0);
        let err = m.run().unwrap_err();
        assert!(matches!(err, MachineError::DepthExceeded { depth: 1, max: 0 }));
    }

    #[test]
    fn test_stalled_state() {
        let mut m = machine("[*] --> A\nA --> B: [ Never ]", Crossing::default());
        let err = m.run().unwrap_err();
        assert!(matches!(err, MachineError::Stalled { ref state } if state == "A"));
    }

    #[test]
    fn test_fatal_error_resets_machine() {
        let mut m = machine("[*] --> A\nA: do / Record(a)\nA --> B: [ Never ]", Crossing::default());
        assert!(matches!(m.run(), Err(MachineError::Stalled { .. })));
        assert_eq!(m.current_state(), INITIAL_STATE);

        // A second run starts over instead of resuming in the stalled state
        assert!(matches!(m.run(), Err(MachineError::Stalled { .. })));
        assert_eq!(m.extended_state().visited, vec!["a", "a"]);
        assert_eq!(m.current_state(), INITIAL_STATE);
    }

    #[test]
    fn test_missing_state_config() {
        let mut m = Machine::new("empty", INITIAL_STATE, StateTable::new(), Crossing::default());
        let err = m.run().unwrap_err();
        assert!(matches!(err, MachineError::MissingState { ref state } if state == INITIAL_STATE));
    }
}
