//! Deterministic JSON serialization for files written by tokenrelay.
//!
//! Output is stable across runs: keys sorted (via `BTreeMap`), 2-space
//! indentation and a trailing newline.

mod json;

pub use json::*;
