//! Standard step-size controller
//!
//! Weighs each component's local error against a tolerance built from
//! variable magnitude and rate of change, then shrinks, holds, or grows
//! the step size accordingly.

use nalgebra::DVector;

// Safety factor applied to every rescale
const SAFETY: f64 = 0.9;
// A step is rejected only when the scaled error exceeds this
const REJECT_THRESHOLD: f64 = 1.1;
// The step grows only when the scaled error is below this
const GROW_THRESHOLD: f64 = 0.5;
// Rescale limits per adjustment
const SHRINK_FLOOR: f64 = 0.2;
const GROW_CEIL: f64 = 5.0;

/// Controller verdict on a completed step attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    /// Error too large: retry from the same point with the reduced step
    Decrease,
    /// Error in band: accept, keep the step size
    NoChange,
    /// Error comfortably small: accept, enlarge the next step
    Increase,
}

/// Standard error controller over absolute/relative tolerances and two
/// scale factors.
///
/// The tolerance for component `i` at step size `h` is
///
/// ```text
/// d_i = eps_abs + eps_rel * (scal_var*|y_i| + scal_rate*h*|y'_i|)
/// ```
///
/// and the step is judged by `r = max_i |err_i| / d_i`. Rejection shrinks
/// by `SAFETY * r^(-1/order)` (floored at 0.2); growth uses the order+1
/// root and is capped at 5.0.
#[derive(Debug, Clone, Copy)]
pub struct StepControl {
    eps_abs: f64,
    eps_rel: f64,
    scal_var: f64,
    scal_rate: f64,
}

impl StepControl {
    pub fn new(eps_abs: f64, eps_rel: f64, scal_var: f64, scal_rate: f64) -> Self {
        Self {
            eps_abs,
            eps_rel,
            scal_var,
            scal_rate,
        }
    }

    /// Judge a step of size `h` that produced state `y`, derivative
    /// `dydt` and error estimate `y_err`; rescale `h` in place.
    pub fn adjust(
        &self,
        order: usize,
        y: &DVector<f64>,
        dydt: &DVector<f64>,
        y_err: &DVector<f64>,
        h: &mut f64,
    ) -> Adjustment {
        let mut rmax = 0.0f64;
        for i in 0..y.len() {
            let d = self.eps_abs
                + self.eps_rel * (self.scal_var * y[i].abs() + self.scal_rate * h.abs() * dydt[i].abs());
            rmax = rmax.max(y_err[i].abs() / d);
        }

        if rmax > REJECT_THRESHOLD {
            let scale = (SAFETY / rmax.powf(1.0 / order as f64)).max(SHRINK_FLOOR);
            *h *= scale;
            Adjustment::Decrease
        } else if rmax < GROW_THRESHOLD {
            let scale = (SAFETY / rmax.powf(1.0 / (order as f64 + 1.0))).clamp(1.0, GROW_CEIL);
            *h *= scale;
            Adjustment::Increase
        } else {
            Adjustment::NoChange
        }
    }
}
