//! Runge-Kutta-Fehlberg 4(5) stepper

use nalgebra::DVector;

use crate::model::EvalContext;
use crate::solvers::base::{SolverError, Stepper};

/// Runge-Kutta-Fehlberg 4(5) embedded pair
///
/// Six stages, 4th order propagation with a 5th order companion solution
/// providing the local error estimate.
///
/// # Characteristics
/// - Order: 4 (propagating) / 5 (error estimate)
/// - Stages: 6
/// - Explicit
///
/// # Note
/// The historically first widely-used embedded pair for automatic
/// step-size control, and a sound default for non-stiff cell models at
/// typical tolerances. Largely superseded by the Cash-Karp coefficients
/// for accuracy per function evaluation; both are provided because
/// published electrophysiology results frequently used one or the other.
///
/// # References
/// - Fehlberg, E. (1969). "Low-order classical Runge-Kutta formulas
///   with stepsize control and their application to some heat transfer
///   problems". NASA Technical Report TR R-315.
#[derive(Debug, Clone)]
pub struct Fehlberg45 {
    k: Vec<DVector<f64>>,
    ytmp: DVector<f64>,
}

// c (evaluation offsets) = [0, 1/4, 3/8, 12/13, 1, 1/2]
const C: [f64; 6] = [0.0, 1.0 / 4.0, 3.0 / 8.0, 12.0 / 13.0, 1.0, 1.0 / 2.0];

#[rustfmt::skip]
const A: [&[f64]; 5] = [
    &[1.0/4.0],
    &[3.0/32.0, 9.0/32.0],
    &[1932.0/2197.0, -7200.0/2197.0, 7296.0/2197.0],
    &[439.0/216.0, -8.0, 3680.0/513.0, -845.0/4104.0],
    &[-8.0/27.0, 2.0, -3544.0/2565.0, 1859.0/4104.0, -11.0/40.0],
];

// 4th order solution weights
const B: [f64; 6] = [25.0 / 216.0, 0.0, 1408.0 / 2565.0, 2197.0 / 4104.0, -1.0 / 5.0, 0.0];

// Error weights: 5th order minus 4th order solution
const ERR: [f64; 6] = [
    1.0 / 360.0,
    0.0,
    -128.0 / 4275.0,
    -2197.0 / 75240.0,
    1.0 / 50.0,
    2.0 / 55.0,
];

impl Fehlberg45 {
    pub fn new(dim: usize) -> Self {
        Self {
            k: vec![DVector::zeros(dim); 6],
            ytmp: DVector::zeros(dim),
        }
    }
}

impl Stepper for Fehlberg45 {
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
        4
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
        let stepper = Fehlberg45::new(1);
        assert_eq!(stepper.order(), 4);
        assert_eq!(stepper.stages(), 6);
        assert!(stepper.is_explicit());
        assert!(!stepper.needs_jacobian());
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

        let mut stepper = Fehlberg45::new(1);
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

        assert_relative_eq!(y[0], (-1.0f64).exp(), max_relative = 1e-6);
    }

    #[test]
    fn test_error_estimate_tracks_true_error() {
        let model = ModelFunctions {
            compute_variables: no_variables,
            compute_rates: decay,
        };
        let mut variables = [1.0];
        let mut rates = [0.0];
        let mut ctx = EvalContext::new(&model, &[], &mut variables, &mut rates);

        let mut stepper = Fehlberg45::new(1);
        let y = DVector::from_vec(vec![1.0]);
        let mut y_out = DVector::zeros(1);
        let mut y_err = DVector::zeros(1);
        let mut dydt = DVector::zeros(1);

        let h = 0.5;
        stepper
            .try_step(&mut ctx, 0.0, h, &y, &mut y_out, &mut y_err, &mut dydt)
            .unwrap();

        let true_err = (y_out[0] - (-h).exp()).abs();
        // Same magnitude, not orders apart.
        assert!(y_err[0].abs() < 100.0 * true_err + 1e-12);
        assert!(y_err[0].abs() > true_err / 100.0);
    }
}
