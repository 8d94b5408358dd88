//! State tables and the capabilities bound into them

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use tracing::warn;

use crate::core::MachineError;
use crate::uml::{self, FINAL_STATE};

/// A side-effecting step executed on state entry or when a guard wins
pub trait Action<C> {
    fn execute(&self, state: &mut C, params: &[String]) -> anyhow::Result<()>;
}

impl<C, F> Action<C> for F
where
    F: Fn(&mut C, &[String]) -> anyhow::Result<()>,
{
    fn execute(&self, state: &mut C, params: &[String]) -> anyhow::Result<()> {
        self(state, params)
    }
}

/// A read-only check deciding whether a transition is eligible
pub trait Guard<C> {
    fn check(&self, state: &C) -> bool;
}

impl<C, F> Guard<C> for F
where
    F: Fn(&C) -> bool,
{
    fn check(&self, state: &C) -> bool {
        self(state)
    }
}

/// Shared execution state of a run
///
/// Action failures are recorded here instead of aborting the run, so that
/// guards such as `IsError` can route the machine to its final state.
pub trait ExtendedState {
    fn error(&self) -> Option<&anyhow::Error>;
    fn set_error(&mut self, error: anyhow::Error);
    fn take_error(&mut self) -> Option<anyhow::Error>;
}

/// An action bound to the parameters it was declared with
pub struct ActionBinding<C> {
    pub name: String,
    pub params: Vec<String>,
    pub action: Rc<dyn Action<C>>,
}

impl<C> ActionBinding<C> {
    pub fn execute(&self, state: &mut C) -> anyhow::Result<()> {
        self.action.execute(state, &self.params)
    }
}

impl<C> Clone for ActionBinding<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            params: self.params.clone(),
            action: Rc::clone(&self.action),
        }
    }
}

/// A guard with the action to run when it wins
pub struct GuardBinding<C> {
    pub name: String,
    pub guard: Rc<dyn Guard<C>>,
    pub action: Option<ActionBinding<C>>,
}

/// A nested machine scoped to one state
pub struct CompositeConfig<C> {
    pub initial_state: String,
    pub states: StateTable<C>,
}

/// Actions, guards and transition slots of a single state
///
/// `transitions` maps a guard index to its target; the default edge lives
/// at `guards.len()`.
pub struct StateConfig<C> {
    pub actions: Vec<ActionBinding<C>>,
    pub guards: Vec<GuardBinding<C>>,
    pub transitions: BTreeMap<usize, String>,
    pub composite: Option<CompositeConfig<C>>,
}

impl<C> Default for StateConfig<C> {
    fn default() -> Self {
        Self {
            actions: Vec::new(),
            guards: Vec::new(),
            transitions: BTreeMap::new(),
            composite: None,
        }
    }
}

impl<C> StateConfig<C> {
    /// Target of the default edge, if any
    pub fn default_target(&self) -> Option<&str> {
        self.transitions
            .get(&self.guards.len())
            .map(String::as_str)
    }
}

pub type StateTable<C> = HashMap<String, StateConfig<C>>;

/// Explicit name to capability table used to bind a model
pub struct Registry<C> {
    actions: HashMap<String, Rc<dyn Action<C>>>,
    guards: HashMap<String, Rc<dyn Guard<C>>>,
}

impl<C> Default for Registry<C> {
    fn default() -> Self {
        Self {
            actions: HashMap::new(),
            guards: HashMap::new(),
        }
    }
}

impl<C> Registry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an action name
    pub fn action(mut self, name: impl Into<String>, action: impl Action<C> + 'static) -> Self {
        self.actions.insert(name.into(), Rc::new(action));
        self
    }

    /// Bind a guard name
    pub fn guard(mut self, name: impl Into<String>, guard: impl Guard<C> + 'static) -> Self {
        self.guards.insert(name.into(), Rc::new(guard));
        self
    }

    fn bind_action(&self, action: &uml::Action) -> Result<ActionBinding<C>, MachineError> {
        let bound = self
            .actions
            .get(&action.name)
            .ok_or_else(|| MachineError::UnboundAction {
                name: action.name.clone(),
            })?;
        Ok(ActionBinding {
            name: action.name.clone(),
            params: action.params.clone(),
            action: Rc::clone(bound),
        })
    }

    fn bind_guard(&self, name: &str) -> Result<Rc<dyn Guard<C>>, MachineError> {
        self.guards
            .get(name)
            .cloned()
            .ok_or_else(|| MachineError::UnboundGuard {
                name: name.to_string(),
            })
    }
}

/// Build a state table from a model table.
///
/// Guards keep their declaration order; each guard's index is its
/// transition slot and the first default edge takes slot `guards.len()`.
/// The final state gets no config: reaching it ends the run.
pub fn build_table<C>(
    states: &BTreeMap<String, uml::State>,
    registry: &Registry<C>,
) -> Result<StateTable<C>, MachineError> {
    let mut table = StateTable::new();

    for (name, state) in states {
        if name == FINAL_STATE {
            continue;
        }

        let mut config = StateConfig::default();

        for action in &state.actions {
            config.actions.push(registry.bind_action(action)?);
        }

        for transition in state.guarded_transitions() {
            let slot = config.guards.len();
            config.guards.push(GuardBinding {
                name: transition.guard.clone(),
                guard: registry.bind_guard(&transition.guard)?,
                action: transition
                    .action
                    .as_ref()
                    .map(|a| registry.bind_action(a))
                    .transpose()?,
            });
            config.transitions.insert(slot, transition.target.clone());
        }

        let mut defaults = state.transitions.iter().filter(|t| t.is_default());
        if let Some(default) = defaults.next() {
            config
                .transitions
                .insert(config.guards.len(), default.target.clone());
        }
        if defaults.next().is_some() {
            warn!(state = %name, "Multiple default transitions, keeping the first");
        }

        if let Some(composite) = &state.composite {
            config.composite = Some(CompositeConfig {
                initial_state: composite.initial_state.clone(),
                states: build_table(&composite.states, registry)?,
            });
        }

        table.insert(name.clone(), config);
    }

    Ok(table)
}
