//! Abstract finite state machine
//!
//! A parsed [`Fsm`](crate::uml::Fsm) is bound to executable actions and
//! guards through a [`Registry`] and driven by [`Machine::run`]. The same
//! run semantics are rendered into every generated package, and this crate
//! uses the runtime to drive its own generation pipeline.

mod runtime;
mod table;

pub use runtime::{Machine, DEFAULT_MAX_DEPTH};
pub use table::{
    build_table, Action, ActionBinding, CompositeConfig, ExtendedState, Guard, GuardBinding,
    Registry, StateConfig, StateTable,
};
