//! Command safety validation for the shell executor.
//!
//! A command is parsed with a POSIX-shell grammar ([`parser`]) and the
//! resulting tree is checked against the operator's policy ([`validator`],
//! configured by [`config`]). Command substitution and background execution
//! are always denied; pipes, redirections and chaining are denied unless the
//! policy allows them; an optional interpreter/path whitelist restricts what
//! may actually be launched.
//!
//! The validator never executes anything. Every verdict is a pure function of
//! the command string, the current config snapshot and the filesystem state
//! consulted by the whitelist phase.

pub mod config;
pub mod parser;
pub mod validator;

pub use config::{DefaultPolicy, SecurityConfig};
pub use validator::{CommandValidator, ValidationResult};
