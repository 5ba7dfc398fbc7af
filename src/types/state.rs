//! Explicit Kalman state representation
//!
//! The mean and covariance a caller reads and writes. Factorized filters keep
//! their covariance implicitly and only synchronise this explicit form on
//! `init` and `update`.

use nalgebra::{DMatrix, DVector, RealField};

use crate::{FilterError, Result};

/// State estimate as a mean and an explicit covariance.
///
/// # Type Parameters
///
/// - `T`: Scalar type (typically `f32` or `f64`)
#[derive(Debug, Clone, PartialEq)]
pub struct KalmanState<T: RealField> {
    /// State estimate mean
    pub mean: DVector<T>,
    /// State estimate covariance
    pub covariance: DMatrix<T>,
}

impl<T: RealField + Copy> KalmanState<T> {
    /// Creates a new state, checking that mean and covariance agree in size.
    pub fn new(mean: DVector<T>, covariance: DMatrix<T>) -> Result<Self> {
        if covariance.nrows() != mean.len() || covariance.ncols() != mean.len() {
            return Err(FilterError::Logic(
                "State covariance does not match state dimension",
            ));
        }
        Ok(Self { mean, covariance })
    }

    /// Creates a zero mean, zero covariance state of dimension `n`.
    pub fn zeros(n: usize) -> Self {
        Self {
            mean: DVector::zeros(n),
            covariance: DMatrix::zeros(n, n),
        }
    }

    /// Creates a state with diagonal covariance.
    pub fn with_diagonal_covariance(mean: DVector<T>, diagonal: &DVector<T>) -> Result<Self> {
        Self::new(mean, DMatrix::from_diagonal(diagonal))
    }

    /// State dimension.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.mean.len()
    }

    /// Returns the trace of the covariance matrix (sum of variances).
    #[inline]
    pub fn uncertainty(&self) -> T {
        self.covariance.trace()
    }
}
