//! Configuration module for treecopy
//!
//! Provides the copy policy types, CLI arguments, and config files.

mod options;
mod settings;

pub use options::*;
pub use settings::*;
