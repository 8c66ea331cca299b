//! Bogacki-Shampine 3(2) stepper

use nalgebra::DVector;

use crate::model::EvalContext;
use crate::solvers::base::{SolverError, Stepper};

/// Bogacki-Shampine 3(2) embedded pair
///
/// Four stages, 3rd order propagation with an embedded 2nd order error
/// estimate. The fourth stage evaluates the derivative at the proposed
/// solution (First-Same-As-Last), so the endpoint derivative comes for
/// free.
///
/// # Characteristics
/// - Order: 3 (propagating) / 2 (embedded)
/// - Stages: 4 (3 effective with FSAL)
/// - Explicit
///
/// # Note
/// The cheapest adaptive pair in the set. A good choice for quick
/// exploratory runs of a new model or when the reporting increment, not
/// truncation error, dominates the step size. The underlying method of
/// MATLAB's `ode23`.
///
/// # References
/// - Bogacki, P., & Shampine, L. F. (1989). "A 3(2) pair of
///   Runge-Kutta formulas". Applied Mathematics Letters, 2(4), 321-325.
#[derive(Debug, Clone)]
pub struct RungeKutta23 {
    k: Vec<DVector<f64>>,
    ytmp: DVector<f64>,
}

// c = [0, 1/2, 3/4, 1]
const C: [f64; 4] = [0.0, 1.0 / 2.0, 3.0 / 4.0, 1.0];

#[rustfmt::skip]
const A: [&[f64]; 3] = [
    &[1.0/2.0],
    &[0.0, 3.0/4.0],
    &[2.0/9.0, 1.0/3.0, 4.0/9.0],
];

// 3rd order solution weights (also row 3 of A: FSAL)
const B: [f64; 4] = [2.0 / 9.0, 1.0 / 3.0, 4.0 / 9.0, 0.0];

// Error weights: 3rd order minus embedded 2nd order solution
const ERR: [f64; 4] = [-5.0 / 72.0, 1.0 / 12.0, 1.0 / 9.0, -1.0 / 8.0];

impl RungeKutta23 {
    pub fn new(dim: usize) -> Self {
        Self {
            k: vec![DVector::zeros(dim); 4],
            ytmp: DVector::zeros(dim),
        }
    }
}

impl Stepper for RungeKutta23 {
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
        ctx.eval_rates(t, y.as_slice(), self.k[0].as_mut_slice());

        for s in 1..4 {
            self.ytmp.copy_from(y);
            for (i, &coef) in A[s - 1].iter().enumerate() {
                self.ytmp.axpy(h * coef, &self.k[i], 1.0);
            }
            ctx.eval_rates(t + C[s] * h, self.ytmp.as_slice(), self.k[s].as_mut_slice());
        }

        y_out.copy_from(y);
        y_err.fill(0.0);
        for i in 0..4 {
            y_out.axpy(h * B[i], &self.k[i], 1.0);
            y_err.axpy(h * ERR[i], &self.k[i], 1.0);
        }

        // FSAL: stage 3 was evaluated at (t + h, y_out).
        dydt_out.copy_from(&self.k[3]);
        Ok(())
    }

    fn order(&self) -> usize {
        3
    }

    fn stages(&self) -> usize {
        4
    }

    fn is_explicit(&self) -> bool {
        true
    }
}
