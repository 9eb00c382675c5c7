//! Shell - Command-line interpreter
//!
//! A line-oriented shell over the virtual filesystem:
//! - Line parsing with quoting, escapes, variables, and redirections
//! - Commands resolved from builtins, `PATH`, or a direct path
//! - Long-running commands split into steps and driven by a scheduler
//!   that can cancel them between steps
//!
//! The host supplies a [`Process`] for output and input and drives the
//! futures [`Shell::execute`] returns on a [`crate::kernel::Runtime`].

pub mod builtins;
pub mod command;
pub mod environment;
pub mod executor;
pub mod io;
pub mod parser;
pub mod programs;
pub mod scheduler;

pub use command::{Command, Computation, Executable, Outcome, Step};
pub use environment::Environment;
pub use executor::{Shell, ShellState};
pub use io::{Io, Process};
pub use parser::{Assignment, ParsedLine, RedirectMode, Redirection, parse};
pub use programs::base_tree;
