//! Shared infrastructure: error types, logging and parser combinators

pub mod chumsky_utils;
mod error;
pub mod logging;

pub use error::*;
pub use logging::*;
