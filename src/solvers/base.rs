//! Base stepper trait and solver errors

use nalgebra::DVector;
use thiserror::Error;

use crate::model::EvalContext;

/// Solver-related errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("implicit iteration did not converge after {0} iterations")]
    ConvergenceFailure(usize),

    #[error("step size collapsed below bound resolution at bound {bound}")]
    StepUnderflow { bound: f64 },
}

/// One integration algorithm, configured for a fixed state dimension.
///
/// A stepper proposes steps; it never commits them. The evolver owns
/// accept/reject, so `try_step` must leave the stepper reusable for a
/// retry at a smaller step size from the same `(t, y)`.
pub trait Stepper {
    /// Attempt one step of size `h` from `(t, y)`.
    ///
    /// Writes the proposed state into `y_out`, a local error estimate
    /// into `y_err` (sign is irrelevant, only magnitudes are used), and
    /// the derivative at the proposed endpoint into `dydt_out`.
    ///
    /// Explicit methods cannot fail; implicit methods report
    /// `ConvergenceFailure` when the stage iteration stalls, which the
    /// evolver answers with a smaller step.
    fn try_step(
        &mut self,
        ctx: &mut EvalContext<'_>,
        t: f64,
        h: f64,
        y: &DVector<f64>,
        y_out: &mut DVector<f64>,
        y_err: &mut DVector<f64>,
        dydt_out: &mut DVector<f64>,
    ) -> Result<(), SolverError>;

    /// Order of the method (drives step-size scaling in the controller)
    fn order(&self) -> usize;

    /// Number of stages
    fn stages(&self) -> usize;

    /// Is this an explicit method?
    fn is_explicit(&self) -> bool;

    /// Does stepping estimate a Jacobian?
    fn needs_jacobian(&self) -> bool {
        false
    }

    /// A step of size `h` away from the previous state `y_prev` was
    /// accepted. Multistep methods record history here; single-step
    /// methods ignore it.
    fn accept(&mut self, h: f64, y_prev: &DVector<f64>) {
        let _ = (h, y_prev);
    }
}

/// Richardson error estimate for step-doubling methods: the difference
/// between one full step and two half steps, scaled by `1 / (2^p - 1)`
/// for a method of order `p`.
pub(crate) fn step_doubling_error(
    order: usize,
    y_full: &DVector<f64>,
    y_halves: &DVector<f64>,
    y_err: &mut DVector<f64>,
) {
    let denom = (1u32 << order) as f64 - 1.0;
    y_err.copy_from(y_halves);
    *y_err -= y_full;
    *y_err /= denom;
}
