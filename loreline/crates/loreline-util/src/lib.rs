//! loreline-util - Shared infrastructure for the Loreline runtime.
//!
//! This crate provides the types every pipeline stage depends on:
//! source positions and the common error model (kinds, messages,
//! positions and trace frames).

pub mod error;
pub mod position;

pub use error::{
    Error, ErrorKind, LexErrorKind, ParseErrorKind, Result, RuntimeErrorKind, TraceFrame,
};
pub use position::Position;
