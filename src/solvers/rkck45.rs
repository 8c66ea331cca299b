//! Cash-Karp 5(4) stepper

use nalgebra::DVector;

use crate::model::EvalContext;
use crate::solvers::base::{SolverError, Stepper};

/// Cash-Karp 5(4) embedded pair
///
/// Six stages, 5th order propagation with an embedded 4th order error
/// estimate.
///
/// # Characteristics
/// - Order: 5 (propagating) / 4 (embedded)
/// - Stages: 6
/// - Explicit
///
/// # Note
/// Better accuracy per function evaluation than the Fehlberg pair on
/// most smooth problems; the workhorse choice for non-stiff cell models
/// at moderate tolerances.
///
/// # References
/// - Cash, J. R., & Karp, A. H. (1990). "A variable order Runge-Kutta
///   method for initial value problems with rapidly varying right-hand
///   sides". ACM Transactions on Mathematical Software, 16(3), 201-222.
#[derive(Debug, Clone)]
pub struct CashKarp45 {
    k: Vec<DVector<f64>>,
    ytmp: DVector<f64>,
}

// c = [0, 1/5, 3/10, 3/5, 1, 7/8]
const C: [f64; 6] = [0.0, 1.0 / 5.0, 3.0 / 10.0, 3.0 / 5.0, 1.0, 7.0 / 8.0];

#[rustfmt::skip]
const A: [&[f64]; 5] = [
    &[1.0/5.0],
    &[3.0/40.0, 9.0/40.0],
    &[3.0/10.0, -9.0/10.0, 6.0/5.0],
    &[-11.0/54.0, 5.0/2.0, -70.0/27.0, 35.0/27.0],
    &[1631.0/55296.0, 175.0/512.0, 575.0/13824.0, 44275.0/110592.0, 253.0/4096.0],
];

// 5th order solution weights
const B: [f64; 6] = [
    37.0 / 378.0,
    0.0,
    250.0 / 621.0,
    125.0 / 594.0,
    0.0,
    512.0 / 1771.0,
];

// Error weights: 5th order minus embedded 4th order solution
const ERR: [f64; 6] = [
    -277.0 / 64512.0,
    0.0,
    6925.0 / 370944.0,
    -6925.0 / 202752.0,
    -277.0 / 14336.0,
    277.0 / 7084.0,
];

impl CashKarp45 {
    pub fn new(dim: usize) -> Self {
        Self {
            k: vec![DVector::zeros(dim); 6],
            ytmp: DVector::zeros(dim),
        }
    }
}

impl Stepper for CashKarp45 {
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

        for s in 1..6 {
            self.ytmp.copy_from(y);
            for (i, &coef) in A[s - 1].iter().enumerate() {
                self.ytmp.axpy(h * coef, &self.k[i], 1.0);
            }
            ctx.eval_rates(t + C[s] * h, self.ytmp.as_slice(), self.k[s].as_mut_slice());
        }

        y_out.copy_from(y);
        y_err.fill(0.0);
        for i in 0..6 {
            y_out.axpy(h * B[i], &self.k[i], 1.0);
            y_err.axpy(h * ERR[i], &self.k[i], 1.0);
        }

        ctx.eval_rates(t + h, y_out.as_slice(), dydt_out.as_mut_slice());
        Ok(())
    }

    fn order(&self) -> usize {
        5
    }

    fn stages(&self) -> usize {
        6
    }

    fn is_explicit(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelFunctions;
    use approx::assert_relative_eq;

    fn no_variables(_b: f64, _r: &mut [f64], _c: &[f64], _v: &mut [f64]) {}

    fn decay(_b: f64, rates: &mut [f64], _c: &[f64], variables: &mut [f64]) {
        rates[0] = -variables[0];
    }

    #[test]
    fn test_properties() {
        let stepper = CashKarp45::new(1);
        assert_eq!(stepper.order(), 5);
        assert_eq!(stepper.stages(), 6);
        assert!(stepper.is_explicit());
    }

    #[test]
    fn test_exponential_decay() {
        let model = ModelFunctions {
            compute_variables: no_variables,
            compute_rates: decay,
        };
        let mut variables = [1.0];
        let mut rates = [0.0];
        let mut ctx = EvalContext::new(&model, &[], &mut variables, &mut rates);

        let mut stepper = CashKarp45::new(1);
        let mut y = DVector::from_vec(vec![1.0]);
        let mut y_out = DVector::zeros(1);
        let mut y_err = DVector::zeros(1);
        let mut dydt = DVector::zeros(1);

        let h = 0.1;
        let mut t = 0.0;
        for _ in 0..10 {
            stepper
                .try_step(&mut ctx, t, h, &y, &mut y_out, &mut y_err, &mut dydt)
                .unwrap();
            y.copy_from(&y_out);
            t += h;
        }

        assert_relative_eq!(y[0], (-1.0f64).exp(), max_relative = 1e-7);
    }
}
