//! VectorSigma - generate Rust state machines from PlantUML state diagrams
//!
//! A diagram is parsed into an [`Fsm`](uml::Fsm), rendered into a Rust
//! module and merged into earlier generations without touching code the
//! user has written.
//!
//! # Quick Start
//!
//! ```rust
//! let fsm = vectorsigma::parse(
//!     "title Lights\n\
//!      [*] --> Red\n\
//!      Red: do / SwitchIn(5)\n\
//!      Red --> [*]: [ IsError ]\n\
//!      Red --> Yellow",
//! );
//!
//! let red = fsm.state("Red").unwrap();
//! assert_eq!(red.actions[0].name, "SwitchIn");
//! assert_eq!(red.actions[0].params, vec!["5"]);
//! assert_eq!(red.transitions.len(), 2);
//! assert_eq!(fsm.guard_names, vec!["IsError"]);
//! ```
//!
//! # Running a model
//!
//! The same model can be executed directly, with actions and guards bound
//! by name:
//!
//! ```rust
//! use vectorsigma::prelude::*;
//!
//! #[derive(Default)]
//! struct Counter {
//!     count: u32,
//!     error: Option<anyhow::Error>,
//! }
//!
//! impl ExtendedState for Counter {
//!     fn error(&self) -> Option<&anyhow::Error> {
//!         self.error.as_ref()
//!     }
//!     fn set_error(&mut self, error: anyhow::Error) {
//!         self.error = Some(error);
//!     }
//!     fn take_error(&mut self) -> Option<anyhow::Error> {
//!         self.error.take()
//!     }
//! }
//!
//! let fsm = vectorsigma::parse("[*] --> Counting\nCounting: do / Add(2)\nCounting --> [*]");
//! let registry = Registry::new().action("Add", |c: &mut Counter, p: &[String]| -> anyhow::Result<()> {
//!     c.count += p[0].parse::<u32>()?;
//!     Ok(())
//! });
//!
//! let mut machine = Machine::from_model(&fsm, &registry, Counter::default()).unwrap();
//! machine.run().unwrap();
//! assert_eq!(machine.extended_state().count, 2);
//! ```
//!
//! # Generating a package
//!
//! ```no_run
//! use vectorsigma::generator::GeneratorConfig;
//!
//! let config = GeneratorConfig::new("traffic.puml").with_output("src");
//! let written = vectorsigma::pipeline::run(config).unwrap();
//! ```

pub mod core;
pub mod generator;
pub mod machine;
pub mod merge;
pub mod pipeline;
pub mod uml;

pub use core::*;
pub use merge::{merge, MergeOutcome, NOT_IMPLEMENTED_MARKER, OWNERSHIP_MARKER};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{MachineError, VectorSigmaError};
    pub use crate::generator::{Generator, GeneratorConfig, Manifest};
    pub use crate::machine::{Action, ExtendedState, Guard, Machine, Registry};
    pub use crate::merge::{merge, MergeOutcome};
    pub use crate::uml::{Fsm, State, Transition, UmlParser};
}

/// Parse diagram text into a model
///
/// Unrecognized lines are skipped, so this never fails.
///
/// # Example
/// ```rust
/// let fsm = vectorsigma::parse("[*] --> Idle\nIdle --> [*]");
/// assert_eq!(fsm.initial_state, "InitialState");
/// assert_eq!(fsm.all_states, vec!["FinalState", "Idle", "InitialState"]);
/// ```
pub fn parse(input: &str) -> uml::Fsm {
    uml::UmlParser::new().parse(input)
}
