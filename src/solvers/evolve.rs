//! Adaptive evolution of one state vector
//!
//! The evolver drives a stepper/controller pair through single adaptive
//! steps: it clamps the attempt to a target bound, retries rejected or
//! non-converged attempts at a smaller step size, and commits accepted
//! steps back into the caller's state and bound.

use nalgebra::DVector;

use crate::model::EvalContext;
use crate::solvers::base::{SolverError, Stepper};
use crate::solvers::control::{Adjustment, StepControl};

/// Owns the scratch state for adaptive stepping plus step counters.
#[derive(Debug)]
pub struct Evolver {
    y0: DVector<f64>,
    y_prop: DVector<f64>,
    y_err: DVector<f64>,
    dydt: DVector<f64>,
    accepted: u64,
    rejected: u64,
}

impl Evolver {
    pub fn new(dim: usize) -> Self {
        Self {
            y0: DVector::zeros(dim),
            y_prop: DVector::zeros(dim),
            y_err: DVector::zeros(dim),
            dydt: DVector::zeros(dim),
            accepted: 0,
            rejected: 0,
        }
    }

    /// Steps accepted so far.
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Step attempts rejected (error too large or iteration stalled).
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Advance `(t, y)` by one accepted step toward `limit`, never past
    /// it. `h` carries the step-size estimate between calls: it is
    /// clamped for the attempt and updated with the controller's
    /// suggestion for the next call.
    ///
    /// Fails with `StepUnderflow` only when repeated rejection shrinks
    /// the step below the bound's floating-point resolution.
    pub fn apply(
        &mut self,
        stepper: &mut dyn Stepper,
        control: &StepControl,
        ctx: &mut EvalContext<'_>,
        t: &mut f64,
        limit: f64,
        h: &mut f64,
        y: &mut DVector<f64>,
    ) -> Result<(), SolverError> {
        let t0 = *t;
        self.y0.copy_from(y);

        let mut h0 = *h;
        let mut clamped = false;
        if t0 + h0 >= limit {
            h0 = limit - t0;
            clamped = true;
        }

        loop {
            let attempt = stepper.try_step(
                ctx,
                t0,
                h0,
                y,
                &mut self.y_prop,
                &mut self.y_err,
                &mut self.dydt,
            );

            match attempt {
                Err(SolverError::ConvergenceFailure(_)) => {
                    // The stage iteration stalled; a smaller step is the
                    // only remedy available here.
                    self.rejected += 1;
                    h0 *= 0.5;
                    clamped = false;
                    if t0 + h0 == t0 {
                        return Err(SolverError::StepUnderflow { bound: t0 });
                    }
                    continue;
                }
                Err(e) => return Err(e),
                Ok(()) => {}
            }

            let mut h_next = h0;
            match control.adjust(stepper.order(), &self.y_prop, &self.dydt, &self.y_err, &mut h_next) {
                Adjustment::Decrease => {
                    self.rejected += 1;
                    h0 = h_next;
                    clamped = false;
                    if t0 + h0 == t0 {
                        return Err(SolverError::StepUnderflow { bound: t0 });
                    }
                }
                Adjustment::NoChange | Adjustment::Increase => {
                    self.accepted += 1;
                    y.copy_from(&self.y_prop);
                    // A clamped final step lands exactly on the target so
                    // the caller's loop condition terminates; it also
                    // keeps the pre-clamp step estimate for the next
                    // sub-interval instead of the truncated one.
                    if clamped {
                        *t = limit;
                    } else {
                        *t = t0 + h0;
                        *h = h_next;
                    }
                    stepper.accept(h0, &self.y0);
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EvalContext, ModelFunctions};
    use crate::solvers::rkf45::Fehlberg45;
    use approx::assert_relative_eq;

    fn no_variables(_b: f64, _r: &mut [f64], _c: &[f64], _v: &mut [f64]) {}

    fn decay(_b: f64, rates: &mut [f64], _c: &[f64], variables: &mut [f64]) {
        rates[0] = -variables[0];
    }

    fn context<'a>(
        model: &'a ModelFunctions,
        variables: &'a mut [f64],
        rates: &'a mut [f64],
    ) -> EvalContext<'a> {
        EvalContext::new(model, &[], variables, rates)
    }

    #[test]
    fn test_apply_reaches_limit_exactly() {
        let model = ModelFunctions {
            compute_variables: no_variables,
            compute_rates: decay,
        };
        let mut variables = [1.0];
        let mut rates = [0.0];
        let mut ctx = context(&model, &mut variables, &mut rates);

        let mut stepper = Fehlberg45::new(1);
        let control = StepControl::new(1e-8, 1e-8, 1.0, 0.0);
        let mut evolver = Evolver::new(1);

        let mut t = 0.0;
        let mut h = 1e-6;
        let mut y = DVector::from_vec(vec![1.0]);

        while t < 1.0 {
            evolver
                .apply(&mut stepper, &control, &mut ctx, &mut t, 1.0, &mut h, &mut y)
                .unwrap();
        }
        assert_eq!(t, 1.0);
        assert_relative_eq!(y[0], (-1.0f64).exp(), max_relative = 1e-5);
        assert!(evolver.accepted() > 0);
    }

    #[test]
    fn test_oversized_first_step_is_rejected_then_recovered() {
        let model = ModelFunctions {
            compute_variables: no_variables,
            compute_rates: decay,
        };
        let mut variables = [1.0];
        let mut rates = [0.0];
        let mut ctx = context(&model, &mut variables, &mut rates);

        let mut stepper = Fehlberg45::new(1);
        let control = StepControl::new(1e-12, 1e-12, 1.0, 0.0);
        let mut evolver = Evolver::new(1);

        let mut t = 0.0;
        let mut h = 10.0;
        let mut y = DVector::from_vec(vec![1.0]);

        while t < 2.0 {
            evolver
                .apply(&mut stepper, &control, &mut ctx, &mut t, 2.0, &mut h, &mut y)
                .unwrap();
        }
        assert!(evolver.rejected() > 0, "a 2.0-wide first step at 1e-12 tolerance must be rejected");
        assert_relative_eq!(y[0], (-2.0f64).exp(), max_relative = 1e-8);
    }
}
