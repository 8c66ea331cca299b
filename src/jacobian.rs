//! Finite-difference Jacobian estimation
//!
//! Approximates the rate function's partial derivatives for the implicit
//! stiff steppers by one-sided forward differences, perturbing each state
//! component and the bound in turn against the evaluation context.

use nalgebra::DMatrix;

use crate::model::EvalContext;

/// Relative perturbation applied to each state component.
const STATE_PERTURB: f64 = 1e-10;

/// Relative perturbation applied to the bound. Smaller than the state
/// scale: state magnitudes vary far more widely across model variables.
const BOUND_PERTURB: f64 = 1e-13;

/// Absolute fallback when the perturbed quantity is exactly zero, so the
/// difference quotient never divides by zero.
const PERTURB_FLOOR: f64 = 1e-90;

/// One-sided forward-difference Jacobian estimator.
///
/// Owns two rate-sized scratch vectors so repeated estimates allocate
/// nothing. Each call costs `dim + 2` model evaluation pairs: one
/// baseline, one per perturbed state component, one for the perturbed
/// bound. Forward (not centered) differences halve the evaluation count
/// at the cost of first-order accuracy in the perturbation term.
///
/// There is no error path: a model that misbehaves under perturbation
/// yields non-finite Jacobian entries rather than a failure report.
#[derive(Debug, Clone)]
pub struct JacobianEstimator {
    rate0: Vec<f64>,
    rate1: Vec<f64>,
}

impl JacobianEstimator {
    /// Create an estimator for a `dim`-variable system.
    pub fn new(dim: usize) -> Self {
        Self {
            rate0: vec![0.0; dim],
            rate1: vec![0.0; dim],
        }
    }

    /// Estimate `jac[(j, i)] = d(rate_j)/d(state_i)` and
    /// `dfdb[i] = d(rate_i)/d(bound)` at `(bound, state)`.
    ///
    /// `jac` must be `dim x dim` and `dfdb` of length `dim`.
    pub fn estimate(
        &mut self,
        ctx: &mut EvalContext<'_>,
        bound: f64,
        state: &[f64],
        jac: &mut DMatrix<f64>,
        dfdb: &mut [f64],
    ) {
        let dim = state.len();

        // Baseline rates at the unperturbed point. This also seeds the
        // context's variable buffer with `state`.
        ctx.eval_rates(bound, state, &mut self.rate0);

        for i in 0..dim {
            let mut perturb = state[i] * STATE_PERTURB;
            if perturb == 0.0 {
                perturb = PERTURB_FLOOR;
            }

            // Only component i moves; the rest of the buffer still holds
            // the unperturbed state.
            ctx.variables_mut()[i] = state[i] + perturb;
            ctx.eval_in_place(bound, &mut self.rate1);

            for j in 0..dim {
                jac[(j, i)] = (self.rate1[j] - self.rate0[j]) / perturb;
            }

            ctx.variables_mut()[i] = state[i];
        }

        // Now perturb the bound itself, reusing the baseline rates.
        let mut perturb = bound * BOUND_PERTURB;
        if perturb == 0.0 {
            perturb = PERTURB_FLOOR;
        }
        ctx.eval_in_place(bound + perturb, &mut self.rate1);
        for i in 0..dim {
            dfdb[i] = (self.rate1[i] - self.rate0[i]) / perturb;
        }
    }
}
