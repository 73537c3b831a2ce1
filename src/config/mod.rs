//! Settings, platform detection and the fixed names of the global stack.
//!
//! Nothing in here talks to Docker. Every other module receives a
//! [`Settings`] (and through it a [`GlobalNames`]) instead of reaching for
//! process-wide constants.

mod names;
mod parser;
mod types;

pub use names::{GlobalNames, GlobalService};
pub use parser::Parser;
pub use types::{ImageVersions, Platform, Settings, DEFAULT_ROOT, ROOT_ENV_VAR};
