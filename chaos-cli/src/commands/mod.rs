//! CLI command implementations.

pub mod injectors;
pub mod run;
pub mod validate;
