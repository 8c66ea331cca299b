//! Implicit Runge-Kutta steppers
//!
//! Single-step implicit methods solved by fixed-point corrector passes.
//! A-stable, so they tolerate moderate stiffness without the Jacobian
//! machinery of the Gear family; for severely stiff systems the fixed
//! iteration itself becomes the limit and Gear is the better choice.

use nalgebra::DVector;

use crate::model::EvalContext;
use crate::solvers::base::{step_doubling_error, SolverError, Stepper};

// Corrector passes per stage solve
const CORRECTOR_PASSES: usize = 3;

/// Implicit midpoint rule
///
/// One implicit stage at the interval midpoint, solved by fixed-point
/// iteration seeded with the explicit derivative. Error estimated by
/// step doubling.
///
/// # Characteristics
/// - Order: 2
/// - Stages: 1 implicit
/// - A-stable, symplectic
#[derive(Debug, Clone)]
pub struct ImplicitMidpoint {
    k: DVector<f64>,
    ytmp: DVector<f64>,
    yfull: DVector<f64>,
    ymid: DVector<f64>,
}

fn midpoint_step(
    ctx: &mut EvalContext<'_>,
    t: f64,
    h: f64,
    y: &DVector<f64>,
    k: &mut DVector<f64>,
    ytmp: &mut DVector<f64>,
    out: &mut DVector<f64>,
) {
    // Seed with the explicit slope, then correct: k = f(t + h/2, y + h/2 k).
    ctx.eval_rates(t, y.as_slice(), k.as_mut_slice());
    for _ in 0..CORRECTOR_PASSES {
        ytmp.copy_from(y);
        ytmp.axpy(h / 2.0, k, 1.0);
        ctx.eval_rates(t + h / 2.0, ytmp.as_slice(), k.as_mut_slice());
    }
    out.copy_from(y);
    out.axpy(h, k, 1.0);
}

impl ImplicitMidpoint {
    pub fn new(dim: usize) -> Self {
        Self {
            k: DVector::zeros(dim),
            ytmp: DVector::zeros(dim),
            yfull: DVector::zeros(dim),
            ymid: DVector::zeros(dim),
        }
    }
}

impl Stepper for ImplicitMidpoint {
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
        midpoint_step(ctx, t, h, y, &mut self.k, &mut self.ytmp, &mut self.yfull);
        midpoint_step(ctx, t, h / 2.0, y, &mut self.k, &mut self.ytmp, &mut self.ymid);
        midpoint_step(
            ctx,
            t + h / 2.0,
            h / 2.0,
            &self.ymid,
            &mut self.k,
            &mut self.ytmp,
            y_out,
        );

        step_doubling_error(2, &self.yfull, y_out, y_err);

        ctx.eval_rates(t + h, y_out.as_slice(), dydt_out.as_mut_slice());
        Ok(())
    }

    fn order(&self) -> usize {
        2
    }

    fn stages(&self) -> usize {
        1
    }

    fn is_explicit(&self) -> bool {
        false
    }
}

/// Two-stage Gauss-Legendre implicit Runge-Kutta
///
/// 4th order from two implicit stages at the Gauss nodes, solved by
/// simultaneous fixed-point correction. Error estimated by step
/// doubling.
///
/// # Characteristics
/// - Order: 4
/// - Stages: 2 implicit
/// - A-stable, symplectic
#[derive(Debug, Clone)]
pub struct ImplicitGauss4 {
    k1: DVector<f64>,
    k2: DVector<f64>,
    k1n: DVector<f64>,
    ytmp: DVector<f64>,
    yfull: DVector<f64>,
    ymid: DVector<f64>,
}

fn gauss4_step(
    ctx: &mut EvalContext<'_>,
    t: f64,
    h: f64,
    y: &DVector<f64>,
    k1: &mut DVector<f64>,
    k2: &mut DVector<f64>,
    k1n: &mut DVector<f64>,
    ytmp: &mut DVector<f64>,
    out: &mut DVector<f64>,
) {
    // Gauss nodes c = 1/2 -+ sqrt(3)/6 and the associated stage matrix.
    let s3 = 3.0f64.sqrt();
    let c1 = 0.5 - s3 / 6.0;
    let c2 = 0.5 + s3 / 6.0;
    let a11 = 0.25;
    let a12 = 0.25 - s3 / 6.0;
    let a21 = 0.25 + s3 / 6.0;
    let a22 = 0.25;

    ctx.eval_rates(t, y.as_slice(), k1.as_mut_slice());
    k2.copy_from(k1);

    for _ in 0..CORRECTOR_PASSES {
        ytmp.copy_from(y);
        ytmp.axpy(h * a11, k1, 1.0);
        ytmp.axpy(h * a12, k2, 1.0);
        ctx.eval_rates(t + c1 * h, ytmp.as_slice(), k1n.as_mut_slice());

        ytmp.copy_from(y);
        ytmp.axpy(h * a21, k1, 1.0);
        ytmp.axpy(h * a22, k2, 1.0);
        ctx.eval_rates(t + c2 * h, ytmp.as_slice(), k2.as_mut_slice());

        k1.copy_from(k1n);
    }

    out.copy_from(y);
    out.axpy(h / 2.0, k1, 1.0);
    out.axpy(h / 2.0, k2, 1.0);
}

impl ImplicitGauss4 {
    pub fn new(dim: usize) -> Self {
        Self {
            k1: DVector::zeros(dim),
            k2: DVector::zeros(dim),
            k1n: DVector::zeros(dim),
            ytmp: DVector::zeros(dim),
            yfull: DVector::zeros(dim),
            ymid: DVector::zeros(dim),
        }
    }
}

impl Stepper for ImplicitGauss4 {
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
        gauss4_step(
            ctx,
            t,
            h,
            y,
            &mut self.k1,
            &mut self.k2,
            &mut self.k1n,
            &mut self.ytmp,
            &mut self.yfull,
        );
        gauss4_step(
            ctx,
            t,
            h / 2.0,
            y,
            &mut self.k1,
            &mut self.k2,
            &mut self.k1n,
            &mut self.ytmp,
            &mut self.ymid,
        );
        gauss4_step(
            ctx,
            t + h / 2.0,
            h / 2.0,
            &self.ymid,
            &mut self.k1,
            &mut self.k2,
            &mut self.k1n,
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
        2
    }

    fn is_explicit(&self) -> bool {
        false
    }
}
