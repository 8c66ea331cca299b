//! Adaptive integration steppers
//!
//! Provides the algorithms behind [`StepperKind`](crate::StepperKind):
//! - Explicit embedded pairs (RungeKutta23, Fehlberg45, CashKarp45,
//!   PrinceDormand87)
//! - Classical RK4 with step-doubling error control
//! - Implicit Runge-Kutta methods (midpoint, two-stage Gauss)
//! - Gear/BDF stiff solvers driven by the finite-difference Jacobian
//!
//! plus the step-size controller and the evolver that drives a
//! stepper/controller pair through adaptive steps.

mod base;
mod control;
mod evolve;
mod gear;
mod imprk;
mod rk23;
mod rk4;
mod rkck45;
mod rkf45;
mod rkpd87;

pub use base::{SolverError, Stepper};
pub use control::{Adjustment, StepControl};
pub use evolve::Evolver;
pub use gear::{compute_bdf_coefficients, Gear1, Gear2};
pub use imprk::{ImplicitGauss4, ImplicitMidpoint};
pub use rk23::RungeKutta23;
pub use rk4::RungeKutta4;
pub use rkck45::CashKarp45;
pub use rkf45::Fehlberg45;
pub use rkpd87::PrinceDormand87;
