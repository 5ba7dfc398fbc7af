//! Utility functions for factorized filtering
//!
//! Numerical conditioning policy shared by every factorizing operation.

mod conditioning;

pub use conditioning::*;
