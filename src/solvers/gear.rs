//! Gear-type BDF steppers with Newton iteration
//!
//! Implicit multistep methods for stiff systems. The BDF coefficients
//! are computed from the actual step history, so the methods stay
//! consistent on the non-uniform grids the adaptive controller produces.
//! The stage equation is solved by Newton iteration preconditioned with
//! the finite-difference Jacobian.

use std::collections::VecDeque;

use nalgebra::{DMatrix, DVector};

use crate::jacobian::JacobianEstimator;
use crate::model::EvalContext;
use crate::solvers::base::{SolverError, Stepper};

const NEWTON_TOL: f64 = 1e-8;
const NEWTON_MAX_ITERATIONS: usize = 50;

/// Compute BDF coefficients for variable-timestep integration.
///
/// For an m-th order BDF the new state satisfies
///
/// ```text
/// x_n = beta * h_n * f(x_n, t_n) + sum(alpha_j * x_{n-1-j}; j=0..order-1)
/// ```
///
/// # Arguments
/// * `order` - Order of the BDF method
/// * `timesteps` - Step buffer `h_{n-j}, j=0..order-1`, most recent first
///
/// # Returns
/// * `beta` - Weight for the endpoint derivative
/// * `alpha` - Weights for previous states, most recent first
///
/// # Panics
/// Panics if `order < 1`.
pub fn compute_bdf_coefficients(order: usize, timesteps: &[f64]) -> (f64, Vec<f64>) {
    assert!(order >= 1, "BDF coefficients of order {} not possible", order);

    // Order 1 is backward Euler regardless of the grid.
    if order == 1 || timesteps.len() < 2 {
        return (1.0, vec![1.0]);
    }

    // Step ratios rho_j = h_{n-j} / h_n and normalized node offsets
    // theta_j (theta_0 = 0 is the new point, theta_1 = -1 the current).
    let h_n = timesteps[0];
    let rho: Vec<f64> = timesteps[1..].iter().map(|&h| h / h_n).collect();

    let mut theta = vec![-1.0; order + 1];
    theta[0] = 0.0;
    for j in 2..=order {
        let sum: f64 = rho[..j - 1].iter().sum();
        theta[j] -= sum;
    }

    // Vandermonde system A[m][j] = theta_j^m, right-hand side selecting
    // the first-derivative condition.
    let mut a = DMatrix::zeros(order + 1, order + 1);
    let mut b = DVector::zeros(order + 1);
    b[1] = 1.0;
    for m in 0..=order {
        for j in 0..=order {
            a[(m, j)] = theta[j].powi(m as i32);
        }
    }

    // Distinct nodes make this solvable for any positive step history.
    let alphas = a
        .lu()
        .solve(&b)
        .expect("BDF coefficient system is singular");

    let beta = 1.0 / alphas[0];
    let alpha: Vec<f64> = alphas.iter().skip(1).map(|&v| -v / alphas[0]).collect();
    (beta, alpha)
}

/// Shared implementation behind the Gear variants.
#[derive(Debug)]
struct GearBase {
    order: usize,
    history: VecDeque<DVector<f64>>,
    history_dt: VecDeque<f64>,
    jac_est: JacobianEstimator,
    jac: DMatrix<f64>,
    dfdb: Vec<f64>,
    ftmp: DVector<f64>,
    g_hist: DVector<f64>,
    x: DVector<f64>,
}

impl GearBase {
    fn new(dim: usize, order: usize) -> Self {
        Self {
            order,
            history: VecDeque::with_capacity(order),
            history_dt: VecDeque::with_capacity(order),
            jac_est: JacobianEstimator::new(dim),
            jac: DMatrix::zeros(dim, dim),
            dfdb: vec![0.0; dim],
            ftmp: DVector::zeros(dim),
            g_hist: DVector::zeros(dim),
            x: DVector::zeros(dim),
        }
    }

    /// Order actually usable with the history accumulated so far; ramps
    /// up from backward Euler on the first step.
    fn effective_order(&self) -> usize {
        self.order.min(self.history.len() + 1)
    }

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
        let dim = y.len();
        let m = self.effective_order();

        let mut timesteps = Vec::with_capacity(m);
        timesteps.push(h);
        timesteps.extend(self.history_dt.iter().take(m - 1));
        let (beta, alpha) = compute_bdf_coefficients(m, &timesteps);

        // History part of the BDF target: alpha_0 weighs the current
        // state, later entries the stored predecessors.
        self.g_hist.fill(0.0);
        self.g_hist.axpy(alpha[0], y, 1.0);
        for (j, prev) in self.history.iter().take(m - 1).enumerate() {
            self.g_hist.axpy(alpha[j + 1], prev, 1.0);
        }

        // Newton iteration for x = beta*h*f(t+h, x) + g_hist, with the
        // iteration matrix I - beta*h*J factored once per attempt.
        self.jac_est
            .estimate(ctx, t + h, y.as_slice(), &mut self.jac, &mut self.dfdb);
        let eye = DMatrix::<f64>::identity(dim, dim);
        let newton = eye - (beta * h) * &self.jac;
        let lu = newton.lu();

        self.x.copy_from(y);
        let mut converged = false;
        for _ in 0..NEWTON_MAX_ITERATIONS {
            ctx.eval_rates(t + h, self.x.as_slice(), self.ftmp.as_mut_slice());

            // residual = g(x) - x
            let mut residual = self.g_hist.clone();
            residual.axpy(beta * h, &self.ftmp, 1.0);
            residual -= &self.x;

            if residual.norm() < NEWTON_TOL {
                converged = true;
                break;
            }

            match lu.solve(&residual) {
                Some(dx) => self.x += dx,
                // Singular iteration matrix: fall back to the fixed-point
                // update g(x).
                None => {
                    self.x.copy_from(&self.g_hist);
                    self.x.axpy(beta * h, &self.ftmp, 1.0);
                }
            }
        }
        if !converged {
            return Err(SolverError::ConvergenceFailure(NEWTON_MAX_ITERATIONS));
        }

        y_out.copy_from(&self.x);
        ctx.eval_rates(t + h, y_out.as_slice(), dydt_out.as_mut_slice());

        // Truncation error from the next-lower-order solution built on
        // the same history and endpoint derivative; against forward
        // Euler when already at order 1.
        if m == 1 {
            ctx.eval_rates(t, y.as_slice(), self.ftmp.as_mut_slice());
            y_err.copy_from(y_out);
            y_err.axpy(-1.0, y, 1.0);
            y_err.axpy(-h, &self.ftmp, 1.0);
        } else {
            let (beta_low, alpha_low) = compute_bdf_coefficients(m - 1, &timesteps[..m - 1]);
            y_err.copy_from(y_out);
            y_err.axpy(-beta_low * h, dydt_out, 1.0);
            y_err.axpy(-alpha_low[0], y, 1.0);
            for (j, prev) in self.history.iter().take(m - 2).enumerate() {
                y_err.axpy(-alpha_low[j + 1], prev, 1.0);
            }
        }

        Ok(())
    }

    fn accept(&mut self, h: f64, y_prev: &DVector<f64>) {
        let keep = self.order - 1;
        if keep == 0 {
            return;
        }
        while self.history.len() >= keep {
            self.history.pop_back();
        }
        while self.history_dt.len() >= keep {
            self.history_dt.pop_back();
        }
        self.history.push_front(y_prev.clone());
        self.history_dt.push_front(h);
    }
}

/// Backward Euler, the order-1 Gear method
///
/// # Characteristics
/// - Order: 1
/// - Implicit, L-stable
///
/// # Note
/// Unconditionally stable and maximally damping; accuracy is poor but
/// it never blows up, which makes it the method of last resort for
/// severely stiff gating models.
#[derive(Debug)]
pub struct Gear1 {
    inner: GearBase,
}

impl Gear1 {
    pub fn new(dim: usize) -> Self {
        Self {
            inner: GearBase::new(dim, 1),
        }
    }
}

impl Stepper for Gear1 {
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
        self.inner.try_step(ctx, t, h, y, y_out, y_err, dydt_out)
    }

    fn order(&self) -> usize {
        1
    }

    fn stages(&self) -> usize {
        1
    }

    fn is_explicit(&self) -> bool {
        false
    }

    fn needs_jacobian(&self) -> bool {
        true
    }
}

/// Variable-step BDF2, the order-2 Gear method
///
/// # Characteristics
/// - Order: 2
/// - Implicit multistep, A-stable
///
/// # Note
/// The default stiff choice: one implicit solve per step like backward
/// Euler, but second order by reusing the previous accepted state.
/// Starts itself with a backward Euler step until history exists.
#[derive(Debug)]
pub struct Gear2 {
    inner: GearBase,
}

impl Gear2 {
    pub fn new(dim: usize) -> Self {
        Self {
            inner: GearBase::new(dim, 2),
        }
    }
}

impl Stepper for Gear2 {
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
        self.inner.try_step(ctx, t, h, y, y_out, y_err, dydt_out)
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

    fn needs_jacobian(&self) -> bool {
        true
    }

    fn accept(&mut self, h: f64, y_prev: &DVector<f64>) {
        self.inner.accept(h, y_prev);
    }
}
