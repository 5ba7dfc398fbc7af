//! Model traits for factorized Kalman filtering
//!
//! This module defines the capability sets the UD filter consumes: a
//! linearizable prediction model and the observation model shapes each
//! observe algorithm requires, along with a few concrete models.

mod predict;
mod observe;

pub use predict::*;
pub use observe::*;
