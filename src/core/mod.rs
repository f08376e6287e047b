//! Core engine: result tree, errors, recipe documents, compilation, execution.

pub mod compiler;
pub mod debug;
pub mod error;
pub mod executor;
pub mod prompt;
pub mod recipe;
pub mod render;
pub mod result;
pub mod types;
