//! Sequential observation by Bierman's rank-one UD update

use nalgebra::{DMatrix, DVector, RealField};
use num_traits::Float;

use super::{GainScratch, ObserveScratch, UdFilter};
use crate::models::{
    LinearCorrelatedObserveModel, LinrzCorrelatedObserveModel, LinrzUncorrelatedObserveModel,
    SequentialObserveModel,
};
use crate::types::udu::{ud_factorize_from, ud_rcond};
use crate::utils::{indefinite_rcond, ConditioningLimit};
use crate::{FilterError, Result};

const NOISE_VARIANCE_NOT_PSD: &str = "Observation noise variance not positive-semi-definite";
const INNOVATION_NOT_PD: &str = "Innovation variance not positive-definite";
const NOISE_COVARIANCE_NOT_PSD: &str = "Observation noise covariance not positive-semi-definite";
const NO_LINRZ_CORRELATED: &str = "No UD solution for a linearized model with correlated noise";
const NOISE_SIZE_MISMATCH: &str = "Observation noise does not match measurement dimension";
const PREDICTION_SIZE_MISMATCH: &str =
    "Predicted measurement does not match measurement dimension";
const JACOBIAN_SIZE_MISMATCH: &str =
    "Observation model Jacobian does not match state or measurement";
const COEFFICIENT_SIZE_MISMATCH: &str = "Observation coefficients do not match state dimension";

/// Result of one scalar Bierman update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalarUpdate<T> {
    /// Reciprocal condition number of the updated factor, `-1` if the
    /// innovation variance was not positive (factor untouched)
    pub rcond: T,
    /// Innovation variance `h' X h + r`
    pub innovation_variance: T,
}

impl<T: RealField + Copy> ScalarUpdate<T> {
    /// True when the update was rejected for a non-positive innovation variance.
    #[inline]
    pub fn is_singular(&self) -> bool {
        self.rcond < T::zero()
    }
}

impl<T: RealField + Float + Copy> UdFilter<T> {
    /// Bierman rank-one update of the factor for one scalar observation.
    ///
    /// Incorporates an observation with coefficients `h` and noise variance
    /// `r` into the factor and computes the gain (see [`gain`](Self::gain)).
    /// The mean is not changed and the result is not checked against the
    /// conditioning limit.
    ///
    /// # Returns
    /// The rcond of the updated factor and the innovation variance. An rcond
    /// of `-1` means the innovation variance was not positive; the factor is
    /// then left unchanged.
    pub fn observe_ud(&mut self, h: &DVector<T>, r: T) -> Result<ScalarUpdate<T>> {
        if h.len() != self.state_size() {
            return Err(FilterError::Logic(COEFFICIENT_SIZE_MISMATCH));
        }
        self.gain_scratch.h1.copy_from(h);
        Ok(bierman_update(&mut self.ud, &mut self.gain_scratch, r))
    }

    /// Observes through a linearized model with uncorrelated noise.
    ///
    /// Components are applied in order. The model is re-evaluated at the
    /// updated mean before each component.
    ///
    /// # Returns
    /// Minimum rcond over all components.
    pub fn observe_uncorrelated<M>(&mut self, model: &M, z: &DVector<T>) -> Result<T>
    where
        M: LinrzUncorrelatedObserveModel<T> + ?Sized,
    {
        let z_size = z.len();
        let n = self.state_size();
        let zv = model.noise_variance();
        check_noise_variance(zv, z_size)?;
        self.observe_size(z_size);

        self.transaction(|filter| {
            let UdFilter {
                state,
                ud,
                limit,
                gain_scratch,
                observe_scratch,
                ..
            } = filter;

            let mut rcond_min = <T as Float>::max_value();
            for o in 0..z_size {
                let zp = model.observe(&state.mean);
                if zp.len() != z_size {
                    return Err(FilterError::Logic(PREDICTION_SIZE_MISMATCH));
                }
                let hx = model.jacobian(&state.mean);
                if hx.shape() != (z_size, n) {
                    return Err(FilterError::Logic(JACOBIAN_SIZE_MISMATCH));
                }

                observe_scratch.znorm.copy_from(z);
                model.normalise(&mut observe_scratch.znorm, &zp);
                gain_scratch.h1.tr_copy_from(&hx.row(o));

                let innovation = observe_scratch.znorm[o] - zp[o];
                let update =
                    scalar_update(ud, gain_scratch, limit, &mut state.mean, zv[o], innovation)?;

                observe_scratch.s[o] = innovation;
                observe_scratch.sd[o] = update.innovation_variance;
                rcond_min = Float::min(rcond_min, update.rcond);
            }
            log::debug!("observe uncorrelated z={} rcond={:?}", z_size, rcond_min);
            Ok(rcond_min)
        })
    }

    /// Linearized models with correlated noise cannot be decorrelated.
    ///
    /// Always fails with a logic error; the filter is not modified.
    pub fn observe_linrz_correlated<M>(&mut self, _model: &M, _z: &DVector<T>) -> Result<T>
    where
        M: LinrzCorrelatedObserveModel<T> + ?Sized,
    {
        Err(FilterError::Logic(NO_LINRZ_CORRELATED))
    }

    /// Observes through a linear model with correlated noise.
    ///
    /// The noise covariance is factorized as `Z = Gz * Dz * Gz'` and the
    /// model and measurement decorrelated by back substitution against `Gz`,
    /// after which the components are applied sequentially with variances
    /// `Dz`.
    ///
    /// # Returns
    /// Minimum rcond over all components.
    pub fn observe_linear_correlated<M>(&mut self, model: &M, z: &DVector<T>) -> Result<T>
    where
        M: LinearCorrelatedObserveModel<T> + ?Sized,
    {
        let z_size = z.len();
        let n = self.state_size();
        let hx = model.observation_matrix();
        let noise = model.noise_covariance();
        if noise.shape() != (z_size, z_size) {
            return Err(FilterError::Logic(NOISE_SIZE_MISMATCH));
        }
        if hx.shape() != (z_size, n) {
            return Err(FilterError::Logic(JACOBIAN_SIZE_MISMATCH));
        }

        self.observe_size(z_size);
        self.decorrelation_size(z_size);

        let rcond = ud_factorize_from(&mut self.observe_scratch.gz, noise);
        self.limit.check_psd(rcond, NOISE_COVARIANCE_NOT_PSD)?;

        self.transaction(|filter| {
            let UdFilter {
                state,
                ud,
                limit,
                gain_scratch,
                observe_scratch,
                ..
            } = filter;

            let zp = model.observe(&state.mean);
            if zp.len() != z_size {
                return Err(FilterError::Logic(PREDICTION_SIZE_MISMATCH));
            }
            observe_scratch.znorm.copy_from(z);
            model.normalise(&mut observe_scratch.znorm, &zp);
            observe_scratch.zpdecol.copy_from(&zp);
            observe_scratch.gihx.copy_from(hx);
            decorrelate(observe_scratch);

            let mut rcond_min = <T as Float>::max_value();
            for o in 0..z_size {
                gain_scratch.h1.tr_copy_from(&observe_scratch.gihx.row(o));
                let innovation = observe_scratch.znorm[o] - observe_scratch.zpdecol[o];
                let variance = observe_scratch.gz[(o, o)];
                let update =
                    scalar_update(ud, gain_scratch, limit, &mut state.mean, variance, innovation)?;

                // Carry the state correction into the remaining predictions
                for k in (o + 1)..z_size {
                    let correction = observe_scratch.gihx.row(k).tr_dot(&gain_scratch.w);
                    observe_scratch.zpdecol[k] += correction * innovation;
                }

                observe_scratch.s[o] = innovation;
                observe_scratch.sd[o] = update.innovation_variance;
                rcond_min = Float::min(rcond_min, update.rcond);
            }
            log::debug!("observe correlated z={} rcond={:?}", z_size, rcond_min);
            Ok(rcond_min)
        })
    }

    /// Observes through a model evaluated one component at a time.
    ///
    /// Each component's prediction and coefficients are computed at the mean
    /// updated by all previous components.
    ///
    /// # Returns
    /// Minimum rcond over all components. Fails with a logic error if the
    /// model is built for a different state dimension.
    pub fn observe_sequential<M>(&mut self, model: &M, z: &DVector<T>) -> Result<T>
    where
        M: SequentialObserveModel<T> + ?Sized,
    {
        let z_size = z.len();
        if model.state_size() != self.state_size() {
            return Err(FilterError::Logic(JACOBIAN_SIZE_MISMATCH));
        }
        let zv = model.noise_variance();
        check_noise_variance(zv, z_size)?;
        self.observe_size(z_size);

        self.transaction(|filter| {
            let UdFilter {
                state,
                ud,
                limit,
                gain_scratch,
                observe_scratch,
                ..
            } = filter;

            let mut rcond_min = <T as Float>::max_value();
            for o in 0..z_size {
                gain_scratch.h1.fill(T::zero());
                model.observe_component(
                    &state.mean,
                    o,
                    &mut observe_scratch.zp,
                    &mut gain_scratch.h1,
                );
                observe_scratch.znorm.copy_from(z);
                model.normalise(&mut observe_scratch.znorm, &observe_scratch.zp);

                let innovation = observe_scratch.znorm[o] - observe_scratch.zp[o];
                let update =
                    scalar_update(ud, gain_scratch, limit, &mut state.mean, zv[o], innovation)?;

                observe_scratch.s[o] = innovation;
                observe_scratch.sd[o] = update.innovation_variance;
                rcond_min = Float::min(rcond_min, update.rcond);
            }
            log::debug!("observe sequential z={} rcond={:?}", z_size, rcond_min);
            Ok(rcond_min)
        })
    }
}

// ============================================================================
// Scalar Update
// ============================================================================

fn check_noise_variance<T: RealField + Copy>(zv: &DVector<T>, z_size: usize) -> Result<()> {
    if zv.len() != z_size {
        return Err(FilterError::Logic(NOISE_SIZE_MISMATCH));
    }
    // Negated comparison also rejects NaN
    if zv.iter().any(|v| !(*v >= T::zero())) {
        log::warn!("{}", NOISE_VARIANCE_NOT_PSD);
        return Err(FilterError::Numeric(NOISE_VARIANCE_NOT_PSD));
    }
    Ok(())
}

/// Applies one scalar component: factor update, conditioning check and
/// mean correction `x += w * innovation`.
fn scalar_update<T: RealField + Float + Copy>(
    ud: &mut DMatrix<T>,
    gain: &mut GainScratch<T>,
    limit: &ConditioningLimit<T>,
    mean: &mut DVector<T>,
    r: T,
    innovation: T,
) -> Result<ScalarUpdate<T>> {
    let update = bierman_update(ud, gain, r);
    limit.check_psd(update.rcond, INNOVATION_NOT_PD)?;
    mean.axpy(innovation, &gain.w, T::one());

    log::trace!(
        "scalar update innovation={:?} variance={:?} rcond={:?}",
        innovation,
        update.innovation_variance,
        update.rcond
    );
    Ok(update)
}

/// Bierman rank-one update of `ud` for coefficients `gain.h1` and variance `r`.
///
/// Writes the gain to `gain.w`. Every partial innovation variance is checked
/// before the factor is touched, so a rejected update leaves `ud` unchanged.
fn bierman_update<T: RealField + Float + Copy>(
    ud: &mut DMatrix<T>,
    gain: &mut GainScratch<T>,
    r: T,
) -> ScalarUpdate<T> {
    let n = ud.nrows();
    if n == 0 {
        return ScalarUpdate {
            rcond: ud_rcond(ud, 0),
            innovation_variance: r,
        };
    }
    let GainScratch { a, b, h1, w } = gain;

    // a = U' h, b = D U' h
    a.copy_from(h1);
    for j in (1..n).rev() {
        let mut aj = a[j];
        for k in 0..j {
            aj += ud[(k, j)] * a[k];
        }
        a[j] = aj;
        b[j] = ud[(j, j)] * aj;
    }
    b[0] = ud[(0, 0)] * a[0];

    // b[j] is unchanged until step j so every alpha is known up front
    let mut alpha = r;
    for j in 0..n {
        alpha += b[j] * a[j];
        if !(alpha > T::zero()) {
            return ScalarUpdate {
                rcond: indefinite_rcond(),
                innovation_variance: alpha,
            };
        }
    }

    let mut alpha = r + b[0] * a[0];
    let mut gamma = T::one() / alpha;
    ud[(0, 0)] *= r * gamma;

    for j in 1..n {
        let alpha_prev = alpha;
        alpha += b[j] * a[j];
        let lambda = -a[j] * gamma;
        gamma = T::one() / alpha;
        ud[(j, j)] *= alpha_prev * gamma;

        let bj = b[j];
        for i in 0..j {
            let u_prev = ud[(i, j)];
            ud[(i, j)] = u_prev + lambda * b[i];
            b[i] += bj * u_prev;
        }
    }

    for j in 0..n {
        w[j] = b[j] * gamma;
    }

    ScalarUpdate {
        rcond: ud_rcond(ud, n),
        innovation_variance: alpha,
    }
}

/// Solves `Gz * GIHx = Hx`, `Gz * z~ = z` and `Gz * zp~ = zp` in place by
/// back substitution against the unit upper triangular `Gz`.
fn decorrelate<T: RealField + Copy>(scratch: &mut ObserveScratch<T>) {
    let z_size = scratch.zpdecol.len();
    let n = scratch.gihx.ncols();
    let ObserveScratch {
        znorm,
        zpdecol,
        gz,
        gihx,
        ..
    } = scratch;

    for i in (0..z_size).rev() {
        for k in (i + 1)..z_size {
            let g = gz[(i, k)];
            for j in 0..n {
                let below = gihx[(k, j)];
                gihx[(i, j)] -= g * below;
            }
            let z_below = znorm[k];
            znorm[i] -= g * z_below;
            let zp_below = zpdecol[k];
            zpdecol[i] -= g * zp_below;
        }
    }
}
