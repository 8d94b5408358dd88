//! PlantUML state diagram front end
//!
//! Syntax examples:
//! ```text
//! title Traffic Light
//! [*] --> Red
//! Red: do / SwitchIn(5)
//! Red --> [*]: [ IsError ]
//! Red --> Green
//! state Green {
//!     [*] --> Walking
//!     Walking --> [*]
//! }
//! ```

mod extract;
mod model;
mod parser;

pub use extract::extract_plantuml;
pub use model::{
    Action, Composite, Fsm, State, Transition, BOUNDARY_MARKER, FINAL_STATE, INITIAL_STATE,
};
pub use parser::{Statement, UmlParser};
