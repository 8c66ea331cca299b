//! Run configuration types
//!
//! Everything here is validated once, before the integration loop starts;
//! nothing is re-checked inside the loop.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Available integration algorithms.
///
/// Selected once per run and immutable thereafter. The implicit multistep
/// Gear family drives the finite-difference Jacobian estimator; all other
/// kinds work from rate evaluations alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepperKind {
    /// Bogacki-Shampine 3(2) embedded pair
    RungeKutta23,
    /// Classical 4th order Runge-Kutta with step-doubling error estimate
    RungeKutta4,
    /// Runge-Kutta-Fehlberg 4(5) embedded pair
    Fehlberg45,
    /// Cash-Karp 5(4) embedded pair
    CashKarp45,
    /// Prince-Dormand 8(7) embedded pair
    PrinceDormand87,
    /// Implicit midpoint rule (2nd order)
    ImplicitMidpoint,
    /// Two-stage Gauss-Legendre implicit Runge-Kutta (4th order)
    ImplicitGauss4,
    /// Backward Euler, the order-1 Gear method
    Gear1,
    /// Variable-step BDF2, the order-2 Gear method
    Gear2,
}

impl Default for StepperKind {
    fn default() -> Self {
        StepperKind::Fehlberg45
    }
}

impl StepperKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepperKind::RungeKutta23 => "RungeKutta23",
            StepperKind::RungeKutta4 => "RungeKutta4",
            StepperKind::Fehlberg45 => "Fehlberg45",
            StepperKind::CashKarp45 => "CashKarp45",
            StepperKind::PrinceDormand87 => "PrinceDormand87",
            StepperKind::ImplicitMidpoint => "ImplicitMidpoint",
            StepperKind::ImplicitGauss4 => "ImplicitGauss4",
            StepperKind::Gear1 => "Gear1",
            StepperKind::Gear2 => "Gear2",
        }
    }

    /// Whether this kind estimates a Jacobian during stepping.
    pub fn requires_jacobian(&self) -> bool {
        matches!(self, StepperKind::Gear1 | StepperKind::Gear2)
    }

    /// Whether the stage equations are implicit.
    pub fn is_implicit(&self) -> bool {
        matches!(
            self,
            StepperKind::ImplicitMidpoint
                | StepperKind::ImplicitGauss4
                | StepperKind::Gear1
                | StepperKind::Gear2
        )
    }
}

/// Parameters of one integration run.
///
/// `start`, `stop` and `increment` define the reporting grid: one
/// snapshot per `increment` of the bound. `max_step` caps the adaptive
/// step inside each sub-interval, which also bounds cancellation latency.
/// The error weight for component `i` is
/// `eps_abs + eps_rel * (scal_var*|y_i| + scal_rate*h*|y'_i|)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunParams {
    /// First value of the bound (independent variable)
    pub start: f64,

    /// Final value of the bound
    pub stop: f64,

    /// Reporting granularity: one snapshot per increment
    pub increment: f64,

    /// Upper limit on a single adaptive step
    pub max_step: f64,

    /// Absolute error tolerance
    pub eps_abs: f64,

    /// Relative error tolerance
    pub eps_rel: f64,

    /// Weight of variable magnitude in the error norm
    pub scal_var: f64,

    /// Weight of rate of change in the error norm
    pub scal_rate: f64,

    /// Integration algorithm
    pub stepper: StepperKind,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            start: 0.0,
            stop: 10.0,
            increment: 0.1,
            max_step: 1.0,
            eps_abs: 1e-6,
            eps_rel: 1e-6,
            scal_var: 1.0,
            scal_rate: 0.0,
            stepper: StepperKind::default(),
        }
    }
}

impl RunParams {
    /// Check the parameter set before a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.start.is_finite() || !self.stop.is_finite() || self.stop <= self.start {
            return Err(ConfigError::InvalidInterval {
                start: self.start,
                stop: self.stop,
            });
        }
        // The increment must be positive and large enough to actually
        // advance the bound at the magnitude of the interval endpoints.
        if !(self.increment > 0.0) || self.start + self.increment == self.start {
            return Err(ConfigError::InvalidIncrement {
                increment: self.increment,
            });
        }
        if !(self.max_step > 0.0) || !self.max_step.is_finite() {
            return Err(ConfigError::InvalidMaxStep {
                max_step: self.max_step,
            });
        }
        if !(self.eps_abs > 0.0) || !(self.eps_rel >= 0.0) {
            return Err(ConfigError::InvalidTolerance {
                eps_abs: self.eps_abs,
                eps_rel: self.eps_rel,
            });
        }
        if self.scal_var < 0.0 || self.scal_rate < 0.0 {
            return Err(ConfigError::InvalidErrorScaling {
                scal_var: self.scal_var,
                scal_rate: self.scal_rate,
            });
        }
        Ok(())
    }
}

/// Configuration errors, surfaced to the caller before the loop starts.
/// No observer interaction happens on this path.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("integration interval [{start}, {stop}] is empty or not finite")]
    InvalidInterval { start: f64, stop: f64 },

    #[error("bound increment {increment} cannot advance the bound")]
    InvalidIncrement { increment: f64 },

    #[error("maximum step size {max_step} must be positive and finite")]
    InvalidMaxStep { max_step: f64 },

    #[error("tolerances eps_abs={eps_abs}, eps_rel={eps_rel} are invalid (eps_abs must be > 0)")]
    InvalidTolerance { eps_abs: f64, eps_rel: f64 },

    #[error("error-norm scale factors scal_var={scal_var}, scal_rate={scal_rate} must be non-negative")]
    InvalidErrorScaling { scal_var: f64, scal_rate: f64 },

    #[error("model has no state variables")]
    EmptyState,

    #[error("variable count {variables} does not match rate count {rates}")]
    SizeMismatch { variables: usize, rates: usize },

    #[error("snapshot of {width} variables exceeds the {limit}-byte staging budget")]
    SnapshotTooLarge { width: usize, limit: usize },
}
