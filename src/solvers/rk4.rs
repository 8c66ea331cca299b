//! Classical 4th order Runge-Kutta stepper

use nalgebra::DVector;

use crate::model::EvalContext;
use crate::solvers::base::{step_doubling_error, SolverError, Stepper};

/// Classical 4th order Runge-Kutta with step-doubling error estimate
///
/// The textbook tableau has no embedded companion, so the local error is
/// estimated by Richardson extrapolation: each attempt takes one full
/// step and two half steps and compares the endpoints. The half-step
/// solution is propagated.
///
/// # Characteristics
/// - Order: 4
/// - Stages: 4 (12 evaluations per attempt including the doubling)
/// - Explicit
///
/// # Note
/// Kept for continuity with fixed-step reference results; the embedded
/// pairs get the same error control at roughly half the evaluations.
#[derive(Debug, Clone)]
pub struct RungeKutta4 {
    k: Vec<DVector<f64>>,
    ytmp: DVector<f64>,
    yfull: DVector<f64>,
    ymid: DVector<f64>,
}

/// One plain RK4 step from `(t, y)` into `out`.
fn rk4_step(
    ctx: &mut EvalContext<'_>,
    t: f64,
    h: f64,
    y: &DVector<f64>,
    k: &mut [DVector<f64>],
    ytmp: &mut DVector<f64>,
    out: &mut DVector<f64>,
) {
    ctx.eval_rates(t, y.as_slice(), k[0].as_mut_slice());

    ytmp.copy_from(y);
    ytmp.axpy(h / 2.0, &k[0], 1.0);
    ctx.eval_rates(t + h / 2.0, ytmp.as_slice(), k[1].as_mut_slice());

    ytmp.copy_from(y);
    ytmp.axpy(h / 2.0, &k[1], 1.0);
    ctx.eval_rates(t + h / 2.0, ytmp.as_slice(), k[2].as_mut_slice());

    ytmp.copy_from(y);
    ytmp.axpy(h, &k[2], 1.0);
    ctx.eval_rates(t + h, ytmp.as_slice(), k[3].as_mut_slice());

    out.copy_from(y);
    out.axpy(h / 6.0, &k[0], 1.0);
    out.axpy(h / 3.0, &k[1], 1.0);
    out.axpy(h / 3.0, &k[2], 1.0);
    out.axpy(h / 6.0, &k[3], 1.0);
}

impl RungeKutta4 {
    pub fn new(dim: usize) -> Self {
        Self {
            k: vec![DVector::zeros(dim); 4],
            ytmp: DVector::zeros(dim),
            yfull: DVector::zeros(dim),
            ymid: DVector::zeros(dim),
        }
    }
}

impl Stepper for RungeKutta4 {
    fn try_step(
        &mut self,
        ctx: &mut EvalContext<'_>,
        t: f64,
        h: f64,
        y: &DVector<f64>,
        y_out: &mut DVector<f64>,
        y_err: &mut DVector<f64>,
        dydt_out: &mut DVector<f64>,
    ) -> Result<(), SolverError> {
        // One full step against two half steps; the finer solution wins.
        rk4_step(ctx, t, h, y, &mut self.k, &mut self.ytmp, &mut self.yfull);
        rk4_step(ctx, t, h / 2.0, y, &mut self.k, &mut self.ytmp, &mut self.ymid);
        rk4_step(
            ctx,
            t + h / 2.0,
            h / 2.0,
            &self.ymid,
            &mut self.k,
            &mut self.ytmp,
            y_out,
        );

        step_doubling_error(4, &self.yfull, y_out, y_err);

        ctx.eval_rates(t + h, y_out.as_slice(), dydt_out.as_mut_slice());
        Ok(())
    }

    fn order(&self) -> usize {
        4
    }

    fn stages(&self) -> usize {
        4
    }

    fn is_explicit(&self) -> bool {
        true
    }
}
