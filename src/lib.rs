//! udfilter: UdU' factorized covariance Kalman filtering for Rust
//!
//! A numerically robust Kalman filter that never propagates the state
//! covariance directly. The covariance `X` is held as a unit upper triangular
//! factor `U` and a diagonal `D` with `U * D * U' == X`, and both factors are
//! updated in place by Bierman-Thornton algorithms:
//!
//! - prediction by the modified weighted Gram-Schmidt (MWG-S) method
//! - observation by Bierman's sequential scalar rank-one update
//!
//! Every factorizing operation reports a reciprocal condition number which is
//! checked against a configurable [`ConditioningLimit`](utils::ConditioningLimit).
//!
//! # Features
//!
//! - `std` (default): implies `alloc`, enables `std::error::Error` support
//! - `alloc`: required for the dynamic-dimension filter and models
//! - `libm`: floating point math for `no_std` targets
//! - `serde`: serializable filter configuration
//!
//! # Example
//!
//! ```
//! use nalgebra::{dmatrix, dvector};
//! use udfilter::filters::ud::UdFilter;
//! use udfilter::models::{LinearPredictModel, LinearUncorrelatedObserveModel};
//!
//! // Position / velocity state, one process noise input
//! let predict = LinearPredictModel::new(
//!     dmatrix![1.0, 0.1; 0.0, 1.0],
//!     dmatrix![0.0; 1.0],
//!     dvector![0.01],
//! )
//! .unwrap();
//! let position = LinearUncorrelatedObserveModel::new(dmatrix![1.0, 0.0], dvector![0.25]).unwrap();
//!
//! let mut filter = UdFilter::new(2, 1, 1).unwrap();
//! filter
//!     .init_kalman(&dvector![0.0, 1.0], &dmatrix![10.0, 0.0; 0.0, 1.0])
//!     .unwrap();
//!
//! filter.predict(&predict).unwrap();
//! filter.observe_uncorrelated(&position, &dvector![0.12]).unwrap();
//!
//! filter.update();
//! assert!(filter.covariance()[(0, 0)] < 10.0);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
pub mod filters;
#[cfg(feature = "alloc")]
pub mod models;
#[cfg(feature = "alloc")]
pub mod types;
pub mod utils;

#[cfg(feature = "alloc")]
pub mod prelude {
    pub use crate::filters::ud::*;
    pub use crate::models::*;
    pub use crate::types::state::*;
    pub use crate::utils::*;
    pub use crate::{FilterError, Result};
}

/// Error types for the library
///
/// Numeric failures come from the data (noise that is not positive
/// semi-definite, a factorization below the conditioning limit). Logic
/// failures are caller programming errors and are never worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    /// A covariance, variance or factor update failed the conditioning check
    #[error("numeric failure: {0}")]
    Numeric(&'static str),
    /// A precondition the caller controls was violated
    #[error("logic failure: {0}")]
    Logic(&'static str),
}

impl FilterError {
    /// The human readable cause attached to the failure.
    pub fn message(&self) -> &'static str {
        match self {
            FilterError::Numeric(message) | FilterError::Logic(message) => message,
        }
    }

    /// Returns true for data dependent numeric failures.
    pub fn is_numeric(&self) -> bool {
        matches!(self, FilterError::Numeric(_))
    }
}

pub type Result<T> = ::core::result::Result<T, FilterError>;
