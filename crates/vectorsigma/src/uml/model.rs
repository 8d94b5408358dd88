//! Finite state machine model built from a diagram
//!
//! The model is shared by the parser (which builds it), the code generator
//! (which renders it) and the machine runtime (which binds it to
//! executable actions and guards).

use serde::Serialize;
use std::collections::BTreeMap;

/// Reserved name of the entry state.
pub const INITIAL_STATE: &str = "InitialState";

/// Reserved name of the terminal state.
pub const FINAL_STATE: &str = "FinalState";

/// The diagram token used for both the entry and the exit boundary.
pub const BOUNDARY_MARKER: &str = "[*]";

/// A side-effecting action with its literal parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    pub name: String,
    pub params: Vec<String>,
}

impl Action {
    pub fn new(name: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// Parameters as a quoted literal list, e.g. `"5", "red"`.
    pub fn params_literal(&self) -> String {
        self.params
            .iter()
            .map(|p| format!("{:?}", p))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// An outgoing edge of a state
///
/// An empty `guard` marks the default edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub target: String,
    pub guard: String,
    pub action: Option<Action>,
}

impl Transition {
    /// Create an unguarded (default) transition
    pub fn default_to(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            guard: String::new(),
            action: None,
        }
    }

    /// Create a guarded transition with an optional guarded action
    pub fn guarded(
        target: impl Into<String>,
        guard: impl Into<String>,
        action: Option<Action>,
    ) -> Self {
        Self {
            target: target.into(),
            guard: guard.into(),
            action,
        }
    }

    pub fn is_default(&self) -> bool {
        self.guard.is_empty()
    }
}

/// A nested machine scoped to a single state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Composite {
    pub initial_state: String,
    pub states: BTreeMap<String, State>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct State {
    pub name: String,
    pub actions: Vec<Action>,
    pub transitions: Vec<Transition>,
    pub composite: Option<Composite>,
}

impl State {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Guarded transitions in declaration order.
    ///
    /// The position of a guard in this sequence is its transition slot.
    pub fn guarded_transitions(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.iter().filter(|t| !t.is_default())
    }

    /// The first default transition, if any. It occupies the slot after
    /// the last guard.
    pub fn default_transition(&self) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.is_default())
    }

    /// Transition slots: guard index to target, default edge at
    /// `guard_count`.
    pub fn transition_slots(&self) -> BTreeMap<usize, &str> {
        let mut slots: BTreeMap<usize, &str> = self
            .guarded_transitions()
            .enumerate()
            .map(|(index, t)| (index, t.target.as_str()))
            .collect();
        if let Some(default) = self.default_transition() {
            slots.insert(slots.len(), default.target.as_str());
        }
        slots
    }
}

/// The parsed diagram
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fsm {
    pub title: String,
    pub initial_state: String,
    pub states: BTreeMap<String, State>,
    pub action_names: Vec<String>,
    pub guard_names: Vec<String>,
    pub all_states: Vec<String>,
}

impl Default for Fsm {
    fn default() -> Self {
        Self {
            title: String::new(),
            initial_state: INITIAL_STATE.to_string(),
            states: BTreeMap::new(),
            action_names: Vec::new(),
            guard_names: Vec::new(),
            all_states: Vec::new(),
        }
    }
}

impl Fsm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a state, creating an empty placeholder if it does not exist
    pub fn ensure_state(&mut self, name: &str) -> &mut State {
        self.states
            .entry(name.to_string())
            .or_insert_with(|| State::new(name))
    }

    /// Register an action name
    pub fn register_action(&mut self, name: &str) {
        if !self.action_names.iter().any(|n| n == name) {
            self.action_names.push(name.to_string());
        }
    }

    /// Register a guard name
    pub fn register_guard(&mut self, name: &str) {
        if !self.guard_names.iter().any(|n| n == name) {
            self.guard_names.push(name.to_string());
        }
    }

    /// Fold a nested machine's name sets into this one
    pub fn absorb(&mut self, nested: &Fsm) {
        for name in &nested.action_names {
            self.register_action(name);
        }
        for name in &nested.guard_names {
            self.register_guard(name);
        }
        self.all_states.extend(nested.all_states.iter().cloned());
    }

    /// Sort and deduplicate the name sets so generated output is stable
    pub fn finalize(&mut self) {
        self.all_states.extend(self.states.keys().cloned());
        for names in [
            &mut self.action_names,
            &mut self.guard_names,
            &mut self.all_states,
        ] {
            names.sort();
            names.dedup();
        }
    }

    /// Look up a top-level state
    pub fn state(&self, name: &str) -> Option<&State> {
        self.states.get(name)
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Deepest composite nesting level; a flat machine has depth zero.
    pub fn depth(&self) -> usize {
        fn table_depth(states: &BTreeMap<String, State>) -> usize {
            states
                .values()
                .filter_map(|s| s.composite.as_ref())
                .map(|c| 1 + table_depth(&c.states))
                .max()
                .unwrap_or(0)
        }
        table_depth(&self.states)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_literal() {
        let action = Action::new("SwitchIn", vec!["5".into(), "red".into()]);
        assert_eq!(action.params_literal(), r#""5", "red""#);
        assert_eq!(Action::new("Noop", vec![]).params_literal(), "");
    }

    #[test]
    fn test_ensure_state_creates_placeholder_once() {
        let mut fsm = Fsm::new();
        fsm.ensure_state("Red").actions.push(Action::new("On", vec![]));
        fsm.ensure_state("Red");
        assert_eq!(fsm.state_count(), 1);
        assert_eq!(fsm.state("Red").unwrap().actions.len(), 1);
    }

    #[test]
    fn test_transition_slots_put_default_last() {
        let mut state = State::new("Red");
        state.transitions.push(Transition::default_to("Yellow"));
        state
            .transitions
            .push(Transition::guarded("FinalState", "IsError", None));
        state
            .transitions
            .push(Transition::guarded("Blinking", "IsBroken", None));

        let slots = state.transition_slots();
        assert_eq!(slots.get(&0), Some(&"FinalState"));
        assert_eq!(slots.get(&1), Some(&"Blinking"));
        assert_eq!(slots.get(&2), Some(&"Yellow"));
    }

    #[test]
    fn test_finalize_sorts_and_dedups() {
        let mut fsm = Fsm::new();
        fsm.register_guard("IsError");
        fsm.register_guard("HasCars");
        fsm.register_guard("IsError");
        fsm.ensure_state("B");
        fsm.ensure_state("A");
        fsm.all_states.push("A".into());
        fsm.finalize();
        assert_eq!(fsm.guard_names, vec!["HasCars", "IsError"]);
        assert_eq!(fsm.all_states, vec!["A", "B"]);
    }

    #[test]
    fn test_depth() {
        let mut fsm = Fsm::new();
        assert_eq!(fsm.depth(), 0);
        let inner = Composite {
            initial_state: INITIAL_STATE.into(),
            states: BTreeMap::new(),
        };
        fsm.ensure_state("Outer").composite = Some(inner);
        assert_eq!(fsm.depth(), 1);
    }
}
