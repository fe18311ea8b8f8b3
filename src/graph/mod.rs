//! Graph source boundary.
//!
//! The bundle engine never looks inside statements. It only needs to list
//! named contexts, write one context in a stable order, and follow the
//! imports relation between contexts.

mod memory;

use std::io::Write;

pub use memory::{MemoryGraph, Statement, Term};

use crate::error::Result;

/// Predicate used for context import edges.
pub const IMPORTS_PREDICATE: &str = "http://www.w3.org/2002/07/owl#imports";

pub trait GraphSource {
    /// Identifiers of every named context.
    fn contexts(&self) -> Vec<String>;

    /// Write the canonical serialization of `context`: identical statement
    /// sets must produce identical bytes regardless of insertion order.
    fn write_canonical(&self, context: &str, out: &mut dyn Write) -> Result<()>;

    /// Contexts directly imported by `context`, as recorded in
    /// `imports_context`.
    fn imported_contexts(&self, imports_context: &str, context: &str) -> Vec<String>;
}
