//! Integration driver
//!
//! Owns the adaptive-step loop: selects the stepper for the configured
//! kind, advances the bound across reporting sub-intervals, stages a
//! snapshot per completed sub-interval, and pushes batches to the
//! observer under the dual size/time flush policy. Cancellation is
//! polled once per inner step and once per sub-interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use nalgebra::DVector;
use thiserror::Error;

use crate::buffer::ResultBuffer;
use crate::model::{CellModel, EvalContext};
use crate::observer::Observer;
use crate::params::{ConfigError, RunParams, StepperKind};
use crate::solvers::{
    CashKarp45, Evolver, Fehlberg45, Gear1, Gear2, ImplicitGauss4, ImplicitMidpoint,
    PrinceDormand87, RungeKutta23, RungeKutta4, SolverError, StepControl, Stepper,
};

/// First step-size guess; the controller takes over immediately.
const INITIAL_STEP: f64 = 1e-6;

/// A run failure.
///
/// Configuration errors surface before the loop starts and before any
/// observer interaction. A solver error mid-run is the one deviation
/// from the silent-adapter scheme: the run stops, but the observer
/// still receives already-staged batches and the completion signal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Solver(#[from] SolverError),
}

/// Summary of a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOutcome {
    /// The run ended via the cancellation flag
    pub cancelled: bool,
    /// Adaptive steps accepted
    pub accepted_steps: u64,
    /// Step attempts rejected by the error controller or a stalled
    /// implicit iteration
    pub rejected_steps: u64,
    /// Snapshots recorded (equals completed sub-intervals)
    pub snapshots: u64,
    /// Batches delivered to the observer
    pub batches: u64,
}

/// One configured integration run.
///
/// Created with [`IntegrationRun::new`], optionally decorated with an
/// observer and a cancellation flag, then consumed by [`run`].
///
/// The context buffers, the staging buffer and all solver state live
/// exactly as long as the run; nothing is shared across runs or
/// threads. The cancellation flag is the only value another thread may
/// touch, and only ever by storing `true`.
///
/// [`run`]: IntegrationRun::run
pub struct IntegrationRun<'a> {
    ctx: EvalContext<'a>,
    params: RunParams,
    observer: Option<&'a mut dyn Observer>,
    cancel: Option<&'a AtomicBool>,
}

impl std::fmt::Debug for IntegrationRun<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrationRun")
            .field("params", &self.params)
            .field("observer", &self.observer.is_some())
            .field("cancel", &self.cancel.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a> IntegrationRun<'a> {
    /// Validate the configuration and bundle the run inputs.
    ///
    /// `variables` carries the initial condition in and the final state
    /// out; `rates` is scratch of the same length. All validation
    /// happens here, so a returned run cannot fail to configure.
    pub fn new(
        model: &'a dyn CellModel,
        constants: &'a [f64],
        variables: &'a mut [f64],
        rates: &'a mut [f64],
        params: RunParams,
    ) -> Result<Self, ConfigError> {
        params.validate()?;
        if variables.is_empty() {
            return Err(ConfigError::EmptyState);
        }
        if variables.len() != rates.len() {
            return Err(ConfigError::SizeMismatch {
                variables: variables.len(),
                rates: rates.len(),
            });
        }
        // Probe the snapshot budget now: a model too wide to stage even
        // one snapshot must fail before the loop, not at allocation
        // time inside it.
        ResultBuffer::capacity_for(variables.len())?;

        Ok(Self {
            ctx: EvalContext::new(model, constants, variables, rates),
            params,
            observer: None,
            cancel: None,
        })
    }

    /// Attach the consumer of snapshot batches and the completion
    /// signal. Without one, results are silently discarded.
    pub fn with_observer(mut self, observer: &'a mut dyn Observer) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Attach an externally-owned cancellation flag. Another thread may
    /// store `true` at any time, without synchronization; the driver
    /// only ever reads it (relaxed).
    pub fn with_cancel_flag(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.map_or(false, |f| f.load(Ordering::Relaxed))
    }

    fn build_stepper(kind: StepperKind, dim: usize) -> Box<dyn Stepper> {
        match kind {
            StepperKind::RungeKutta23 => Box::new(RungeKutta23::new(dim)),
            StepperKind::RungeKutta4 => Box::new(RungeKutta4::new(dim)),
            StepperKind::Fehlberg45 => Box::new(Fehlberg45::new(dim)),
            StepperKind::CashKarp45 => Box::new(CashKarp45::new(dim)),
            StepperKind::PrinceDormand87 => Box::new(PrinceDormand87::new(dim)),
            StepperKind::ImplicitMidpoint => Box::new(ImplicitMidpoint::new(dim)),
            StepperKind::ImplicitGauss4 => Box::new(ImplicitGauss4::new(dim)),
            StepperKind::Gear1 => Box::new(Gear1::new(dim)),
            StepperKind::Gear2 => Box::new(Gear2::new(dim)),
        }
    }

    /// Integrate from `start` to `stop`, delivering one snapshot per
    /// `increment` of the bound.
    ///
    /// Blocks the calling thread until the run completes, is cancelled,
    /// or fails. When an observer is attached, it receives zero or more
    /// `results` batches followed by exactly one `done`, on every exit
    /// path.
    pub fn run(mut self) -> Result<RunOutcome, SolveError> {
        let dim = self.ctx.dim();
        let mut stepper = Self::build_stepper(self.params.stepper, dim);
        let control = StepControl::new(
            self.params.eps_abs,
            self.params.eps_rel,
            self.params.scal_var,
            self.params.scal_rate,
        );
        let mut evolver = Evolver::new(dim);
        // Capacity was probed at configuration; this cannot fail.
        let mut buffer = ResultBuffer::new(dim, Instant::now())?;

        let mut outcome = RunOutcome::default();
        let result = self.advance(stepper.as_mut(), &control, &mut evolver, &mut buffer, &mut outcome);

        outcome.accepted_steps = evolver.accepted();
        outcome.rejected_steps = evolver.rejected();

        // Drain and complete on every exit path, including cancellation
        // and a mid-run solver failure.
        if let Some(observer) = self.observer.as_deref_mut() {
            if !buffer.is_empty() {
                observer.results(buffer.as_slice());
                outcome.batches += 1;
            }
            observer.done();
        }

        result.map(|()| outcome)
    }

    fn advance(
        &mut self,
        stepper: &mut dyn Stepper,
        control: &StepControl,
        evolver: &mut Evolver,
        buffer: &mut ResultBuffer,
        outcome: &mut RunOutcome,
    ) -> Result<(), SolveError> {
        let RunParams {
            start,
            stop,
            increment,
            max_step,
            ..
        } = self.params;

        let mut y = DVector::from_column_slice(self.ctx.variables_mut());
        let mut h = INITIAL_STEP;
        let mut boundhigh = start;
        let mut interval: u64 = 0;

        while boundhigh < stop {
            let mut bound = boundhigh;
            // Reporting bounds come from the grid formula, not a running
            // sum, so accumulated rounding cannot produce a spurious
            // sliver interval before `stop`.
            interval += 1;
            boundhigh = start + interval as f64 * increment;
            if boundhigh >= stop {
                boundhigh = stop;
            }

            while bound < boundhigh {
                let limit = boundhigh.min(bound + max_step);
                evolver.apply(stepper, control, &mut self.ctx, &mut bound, limit, &mut h, &mut y)?;
                self.ctx.store_state(y.as_slice());
                if self.cancelled() {
                    break;
                }
            }

            // A cancelled sub-interval is abandoned: no snapshot, no
            // flush, straight to the drain.
            if self.cancelled() {
                outcome.cancelled = true;
                break;
            }

            self.ctx.write_snapshot(bound, y.as_slice(), buffer.append());
            outcome.snapshots += 1;

            let now = Instant::now();
            if buffer.flush_due(now) {
                if let Some(observer) = self.observer.as_deref_mut() {
                    observer.results(buffer.as_slice());
                    outcome.batches += 1;
                }
                buffer.reset(now);
            }
        }

        Ok(())
    }
}

/// Convenience wrapper: configure and run in one call.
///
/// Equivalent to building an [`IntegrationRun`] with the given observer
/// and cancellation flag and calling [`run`](IntegrationRun::run).
pub fn solve_ode_problem<'a>(
    model: &'a dyn CellModel,
    constants: &'a [f64],
    variables: &'a mut [f64],
    rates: &'a mut [f64],
    params: RunParams,
    observer: Option<&'a mut dyn Observer>,
    cancel: Option<&'a AtomicBool>,
) -> Result<RunOutcome, SolveError> {
    let mut run = IntegrationRun::new(model, constants, variables, rates, params)?;
    if let Some(observer) = observer {
        run = run.with_observer(observer);
    }
    if let Some(flag) = cancel {
        run = run.with_cancel_flag(flag);
    }
    run.run()
}
