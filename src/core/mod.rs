//! Error types, findings and configuration shared by every stage.
//!
//! Fatal conditions are a [`SaftError`]; everything else is collected as a
//! [`Finding`] so that a single run reports all problems in a file.

mod config;
mod error;

pub use config::*;
pub use error::*;
