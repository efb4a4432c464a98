//! Report generation.

mod generator;

pub use generator::*;
