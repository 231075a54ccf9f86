//! Mysh - a minimal line shell
//!
//! Each input line is tokenized, turned into an `ExecutionPlan`, and launched
//! as a single child process with optional stdin/stdout file redirection.
//! Lines ending in `&` run in the background and are tracked in a job table
//! that the `myjobs` builtin lists.

#![deny(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications
)]

#[macro_use]
mod util;

pub mod core;
pub mod errors;
pub mod execute_command;
pub mod shell;

pub use crate::errors::{Error, ErrorKind, Result};
pub use crate::shell::{Shell, ShellConfig};
pub use crate::util::{isatty, MyshExitStatusExt};
