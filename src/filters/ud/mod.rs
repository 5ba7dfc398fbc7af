//! UdU' factorized covariance Kalman filter (Bierman-Thornton)
//!
//! The filter keeps its covariance `X` implicitly as `U * D * U'` with `U`
//! unit upper triangular and `D` diagonal, packed into a single matrix `UD`
//! of size `n x (n + q_max)`. The right `n x q_max` block holds the noise
//! coupling during prediction.
//!
//! - [`UdFilter::predict`]: modified weighted Gram-Schmidt (MWG-S) prediction
//! - `observe_*`: sequential scalar observations by Bierman's rank-one update
//! - [`UdFilter::init`] / [`UdFilter::update`]: convert between `X` and `UD`
//!
//! The explicit covariance is only synchronised on `init` and `update`; call
//! [`UdFilter::update`] before reading [`UdFilter::covariance`].
//!
//! Every predict and observe call either succeeds or leaves the mean and
//! factor exactly as they were before the call.
//!
//! # References
//!
//! - Bierman, G. J. (1977). "Factorization Methods for Discrete Sequential
//!   Estimation." Academic Press.
//! - Thornton, C. L., & Bierman, G. J. (1980). "UDU^T Covariance Factorization
//!   for Kalman Filtering." Control and Dynamic Systems, 16.

mod observe;
mod predict;

use nalgebra::{DMatrix, DVector, RealField};
use num_traits::Float;

use crate::types::state::KalmanState;
use crate::types::udu::{ud_factorize_from, ud_recompose_into};
use crate::utils::ConditioningLimit;
use crate::{FilterError, Result};

pub use observe::ScalarUpdate;

const ZERO_STATE: &str = "Zero state filter constructed";
const INITIAL_NOT_PSD: &str = "Initial state covariance not positive-semi-definite";
const MEAN_SIZE_MISMATCH: &str = "State mean does not match filter dimension";
const COVARIANCE_SIZE_MISMATCH: &str = "State covariance does not match filter dimension";

// ============================================================================
// Configuration
// ============================================================================

/// Construction parameters for a [`UdFilter`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(bound(deserialize = "T: RealField + Float + Copy + serde::Deserialize<'de>"))
)]
pub struct UdFilterConfig<T> {
    /// State dimension `n` (must be non-zero)
    pub state_size: usize,
    /// Largest process noise dimension any predict model will use
    pub q_max: usize,
    /// Observation dimension to preallocate for; 0 allocates lazily
    pub z_initial_size: usize,
    /// Conditioning floor applied to every factorization
    pub limit: ConditioningLimit<T>,
}

impl<T: RealField + Float + Copy> UdFilterConfig<T> {
    /// Creates a configuration with the default conditioning limit.
    pub fn new(state_size: usize, q_max: usize) -> Self {
        Self {
            state_size,
            q_max,
            z_initial_size: 0,
            limit: ConditioningLimit::default_limit(),
        }
    }

    /// Preallocates observation buffers for `z_size` measurements.
    pub fn with_observation_size(mut self, z_size: usize) -> Self {
        self.z_initial_size = z_size;
        self
    }

    /// Overrides the minimum acceptable reciprocal condition number.
    ///
    /// # Panics
    /// Panics if `limit` is negative or not finite.
    pub fn with_limit(mut self, limit: T) -> Self {
        self.limit = ConditioningLimit::new(limit);
        self
    }
}

// ============================================================================
// Scratch Buffers
// ============================================================================

/// Augmented (n + q_max) vectors used by MWG-S prediction.
#[derive(Debug, Clone)]
struct PredictScratch<T: RealField> {
    d: DVector<T>,
    dv: DVector<T>,
    v: DVector<T>,
}

/// State sized vectors used by the Bierman update.
#[derive(Debug, Clone)]
struct GainScratch<T: RealField> {
    /// U' h
    a: DVector<T>,
    /// D U' h, becomes the unweighted gain
    b: DVector<T>,
    /// Observation coefficients of the current scalar component
    h1: DVector<T>,
    /// Kalman gain of the last scalar component
    w: DVector<T>,
}

/// Observation sized buffers, resized only when the measurement size changes.
#[derive(Debug, Clone)]
struct ObserveScratch<T: RealField> {
    last_z_size: usize,
    /// Innovation of each component
    s: DVector<T>,
    /// Innovation variance of each component
    sd: DVector<T>,
    znorm: DVector<T>,
    zp: DVector<T>,
    // Decorrelation of correlated noise
    zpdecol: DVector<T>,
    gz: DMatrix<T>,
    gihx: DMatrix<T>,
}

/// Copy of the mutable filter state taken at the start of each operation.
#[derive(Debug, Clone)]
struct Rollback<T: RealField> {
    mean: DVector<T>,
    ud: DMatrix<T>,
}

// ============================================================================
// UD Filter
// ============================================================================

/// UdU' factorized covariance Kalman filter.
///
/// # Type Parameters
///
/// - `T`: Scalar type (typically `f32` or `f64`)
///
/// # Example
///
/// ```
/// use nalgebra::{dmatrix, dvector};
/// use udfilter::filters::ud::UdFilter;
///
/// let mut filter = UdFilter::<f64>::new(2, 0, 0).unwrap();
/// filter
///     .init_kalman(&dvector![0.0, 0.0], &dmatrix![4.0, 1.0; 1.0, 2.0])
///     .unwrap();
///
/// // Observe the first component with unit variance
/// let update = filter.observe_ud(&dvector![1.0, 0.0], 1.0).unwrap();
/// assert!((update.innovation_variance - 5.0).abs() < 1e-12);
/// assert!((filter.gain()[0] - 0.8).abs() < 1e-12);
/// ```
#[derive(Debug, Clone)]
pub struct UdFilter<T: RealField> {
    state: KalmanState<T>,
    ud: DMatrix<T>,
    q_max: usize,
    limit: ConditioningLimit<T>,
    predict_scratch: PredictScratch<T>,
    gain_scratch: GainScratch<T>,
    observe_scratch: ObserveScratch<T>,
    rollback: Rollback<T>,
}

impl<T: RealField + Float + Copy> UdFilter<T> {
    /// Creates a filter with the default conditioning limit.
    ///
    /// # Arguments
    /// - `state_size`: State dimension `n`
    /// - `q_max`: Largest process noise dimension of any predict model
    /// - `z_initial_size`: Observation size to preallocate for (0 for none)
    ///
    /// # Returns
    /// A zero mean, zero covariance filter, or a logic failure if
    /// `state_size` is 0.
    pub fn new(state_size: usize, q_max: usize, z_initial_size: usize) -> Result<Self> {
        Self::from_config(
            UdFilterConfig::new(state_size, q_max).with_observation_size(z_initial_size),
        )
    }

    /// Creates a filter from a configuration.
    pub fn from_config(config: UdFilterConfig<T>) -> Result<Self> {
        let n = config.state_size;
        if n == 0 {
            return Err(FilterError::Logic(ZERO_STATE));
        }
        let augmented = n + config.q_max;

        let mut filter = Self {
            state: KalmanState::zeros(n),
            ud: DMatrix::zeros(n, augmented),
            q_max: config.q_max,
            limit: config.limit,
            predict_scratch: PredictScratch {
                d: DVector::zeros(augmented),
                dv: DVector::zeros(augmented),
                v: DVector::zeros(augmented),
            },
            gain_scratch: GainScratch {
                a: DVector::zeros(n),
                b: DVector::zeros(n),
                h1: DVector::zeros(n),
                w: DVector::zeros(n),
            },
            observe_scratch: ObserveScratch {
                last_z_size: 0,
                s: DVector::zeros(0),
                sd: DVector::zeros(0),
                znorm: DVector::zeros(0),
                zp: DVector::zeros(0),
                zpdecol: DVector::zeros(0),
                gz: DMatrix::zeros(0, 0),
                gihx: DMatrix::zeros(0, n),
            },
            rollback: Rollback {
                mean: DVector::zeros(n),
                ud: DMatrix::zeros(n, augmented),
            },
        };
        filter.observe_size(config.z_initial_size);

        log::debug!(
            "UD filter constructed: n={}, q_max={}, limit={:?}",
            n,
            config.q_max,
            config.limit.limit()
        );
        Ok(filter)
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Factorizes the explicit covariance into the UD factor.
    ///
    /// # Returns
    /// Reciprocal condition number of the factor, or a numeric failure if
    /// the covariance is not positive semi-definite or poorly conditioned.
    /// On failure the previous factor is kept.
    pub fn init(&mut self) -> Result<T> {
        self.transaction(|filter| {
            let rcond = ud_factorize_from(&mut filter.ud, &filter.state.covariance);
            log::debug!("init rcond={:?}", rcond);
            filter.limit.check_psd(rcond, INITIAL_NOT_PSD)
        })
    }

    /// Sets the mean and covariance, then factorizes them with [`init`](Self::init).
    pub fn init_kalman(&mut self, mean: &DVector<T>, covariance: &DMatrix<T>) -> Result<T> {
        self.set_mean(mean)?;
        self.set_covariance(covariance)?;
        self.init()
    }

    /// Recomposes the explicit covariance from the UD factor.
    pub fn update(&mut self) {
        ud_recompose_into(&mut self.state.covariance, &self.ud);
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Mean and explicit covariance. The covariance is current as of the last
    /// [`init`](Self::init) or [`update`](Self::update).
    #[inline]
    pub fn state(&self) -> &KalmanState<T> {
        &self.state
    }

    #[inline]
    pub fn mean(&self) -> &DVector<T> {
        &self.state.mean
    }

    #[inline]
    pub fn covariance(&self) -> &DMatrix<T> {
        &self.state.covariance
    }

    /// The packed factor, `n x (n + q_max)`. Only the upper triangle of the
    /// leading `n x n` block is meaningful.
    #[inline]
    pub fn ud(&self) -> &DMatrix<T> {
        &self.ud
    }

    /// Kalman gain of the most recent scalar observation.
    #[inline]
    pub fn gain(&self) -> &DVector<T> {
        &self.gain_scratch.w
    }

    /// Innovation of each component of the last successful observation.
    #[inline]
    pub fn innovation(&self) -> &DVector<T> {
        &self.observe_scratch.s
    }

    /// Innovation variance of each component of the last successful observation.
    #[inline]
    pub fn innovation_variance(&self) -> &DVector<T> {
        &self.observe_scratch.sd
    }

    #[inline]
    pub fn limit(&self) -> &ConditioningLimit<T> {
        &self.limit
    }

    #[inline]
    pub fn state_size(&self) -> usize {
        self.state.mean.len()
    }

    #[inline]
    pub fn q_max(&self) -> usize {
        self.q_max
    }

    /// Replaces the mean. The factor is unaffected.
    pub fn set_mean(&mut self, mean: &DVector<T>) -> Result<()> {
        if mean.len() != self.state_size() {
            return Err(FilterError::Logic(MEAN_SIZE_MISMATCH));
        }
        self.state.mean.copy_from(mean);
        Ok(())
    }

    /// Replaces the explicit covariance. Takes effect on the next [`init`](Self::init).
    pub fn set_covariance(&mut self, covariance: &DMatrix<T>) -> Result<()> {
        let n = self.state_size();
        if covariance.shape() != (n, n) {
            return Err(FilterError::Logic(COVARIANCE_SIZE_MISMATCH));
        }
        self.state.covariance.copy_from(covariance);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Runs `op`, restoring the mean and factor if it fails.
    fn transaction<R>(&mut self, op: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        self.rollback.mean.copy_from(&self.state.mean);
        self.rollback.ud.copy_from(&self.ud);

        let result = op(self);
        if result.is_err() {
            self.state.mean.copy_from(&self.rollback.mean);
            self.ud.copy_from(&self.rollback.ud);
        }
        result
    }

    /// Resizes the per-component buffers when the measurement size changes.
    fn observe_size(&mut self, z_size: usize) {
        let scratch = &mut self.observe_scratch;
        if z_size != scratch.last_z_size {
            scratch.last_z_size = z_size;
            scratch.s = DVector::zeros(z_size);
            scratch.sd = DVector::zeros(z_size);
            scratch.znorm = DVector::zeros(z_size);
            scratch.zp = DVector::zeros(z_size);
        }
    }

    /// Resizes the decorrelation buffers used by correlated observations.
    fn decorrelation_size(&mut self, z_size: usize) {
        let n = self.state_size();
        let scratch = &mut self.observe_scratch;
        if z_size != scratch.zpdecol.len() {
            scratch.zpdecol = DVector::zeros(z_size);
            scratch.gz = DMatrix::zeros(z_size, z_size);
            scratch.gihx = DMatrix::zeros(z_size, n);
        }
    }
}
