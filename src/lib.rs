//! cellsim - adaptive ODE integration for compiled cell models
//!
//! Integrates the systems of ordinary differential equations produced
//! from biophysical model descriptions (gating variables, concentrations
//! and the like), advancing a flat state vector over an independent
//! variable - the "bound", typically time - with adaptive step-size
//! control, and streaming results to an observer at bounded memory and
//! bounded latency.
//!
//! # Architecture
//!
//! - A compiled model is a pair of flat-array routines behind the
//!   [`CellModel`] trait; [`EvalContext`] adapts them to the derivative
//!   callback the steppers consume.
//! - [`solvers`] holds the closed set of integration algorithms
//!   (explicit embedded Runge-Kutta pairs, implicit Runge-Kutta, the
//!   Gear/BDF stiff family), the standard step-size controller, and the
//!   evolver driving them. Stiff methods estimate the system Jacobian by
//!   one-sided finite differences ([`JacobianEstimator`]).
//! - [`IntegrationRun`] wires everything together: it advances the
//!   bound across reporting sub-intervals, records one post-recompute
//!   snapshot per sub-interval, and flushes batches to the [`Observer`]
//!   whenever the 1 MiB staging buffer fills or one second has passed,
//!   whichever comes first. A relaxed [`AtomicBool`] cancels the run
//!   cooperatively between steps.
//!
//! # Example
//!
//! ```
//! use cellsim::{IntegrationRun, MemoryObserver, ModelFunctions, RunParams, StepperKind};
//!
//! // dy/dt = -y, y(0) = 1
//! fn no_variables(_b: f64, _r: &mut [f64], _c: &[f64], _v: &mut [f64]) {}
//! fn decay(_b: f64, rates: &mut [f64], _c: &[f64], variables: &mut [f64]) {
//!     rates[0] = -variables[0];
//! }
//!
//! let model = ModelFunctions {
//!     compute_variables: no_variables,
//!     compute_rates: decay,
//! };
//! let constants: [f64; 0] = [];
//! let mut variables = [1.0];
//! let mut rates = [0.0];
//! let mut observer = MemoryObserver::new();
//!
//! let params = RunParams {
//!     start: 0.0,
//!     stop: 1.0,
//!     increment: 0.1,
//!     stepper: StepperKind::Fehlberg45,
//!     ..Default::default()
//! };
//!
//! let run = IntegrationRun::new(&model, &constants, &mut variables, &mut rates, params)
//!     .unwrap();
//! let outcome = run.with_observer(&mut observer).run().unwrap();
//!
//! assert_eq!(outcome.snapshots, 10);
//! assert!(observer.completed());
//! assert!((variables[0] - (-1.0f64).exp()).abs() < 1e-4);
//! ```
//!
//! [`AtomicBool`]: std::sync::atomic::AtomicBool

pub mod buffer;
pub mod driver;
pub mod jacobian;
pub mod model;
pub mod observer;
pub mod params;
pub mod solvers;

pub use buffer::ResultBuffer;
pub use driver::{solve_ode_problem, IntegrationRun, RunOutcome, SolveError};
pub use jacobian::JacobianEstimator;
pub use model::{CellModel, EvalContext, ModelFn, ModelFunctions};
pub use observer::{MemoryObserver, Observer};
pub use params::{ConfigError, RunParams, StepperKind};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::driver::{solve_ode_problem, IntegrationRun, RunOutcome, SolveError};
    pub use crate::model::{CellModel, ModelFunctions};
    pub use crate::observer::{MemoryObserver, Observer};
    pub use crate::params::{ConfigError, RunParams, StepperKind};
    pub use crate::solvers::*;
}
