//! Command output.
//!
//! `OutputWriter` renders rounds, parts and configuration as text tables or
//! JSON depending on `--output`.

mod writer;

pub use writer::OutputWriter;
