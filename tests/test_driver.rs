//! End-to-end tests of the integration driver: snapshot delivery,
//! flush bounds, cancellation, and configuration rejection.

use std::sync::atomic::{AtomicBool, Ordering};

use cellsim::{
    solve_ode_problem, CellModel, ConfigError, IntegrationRun, MemoryObserver, ModelFunctions,
    Observer, RunParams, SolveError, StepperKind,
};

fn no_variables(_b: f64, _r: &mut [f64], _c: &[f64], _v: &mut [f64]) {}

fn decay(_b: f64, rates: &mut [f64], _c: &[f64], variables: &mut [f64]) {
    for i in 0..variables.len() {
        rates[i] = -variables[i];
    }
}

fn decay_model() -> ModelFunctions {
    ModelFunctions {
        compute_variables: no_variables,
        compute_rates: decay,
    }
}

fn decay_params(stepper: StepperKind) -> RunParams {
    RunParams {
        start: 0.0,
        stop: 1.0,
        increment: 0.1,
        max_step: 1.0,
        stepper,
        ..Default::default()
    }
}

// ===========================================================================
// SNAPSHOT DELIVERY
// ===========================================================================

#[test]
fn test_decay_delivers_one_snapshot_per_increment() {
    let model = decay_model();
    let mut variables = [1.0];
    let mut rates = [0.0];
    let mut observer = MemoryObserver::new();

    let run = IntegrationRun::new(
        &model,
        &[],
        &mut variables,
        &mut rates,
        decay_params(StepperKind::RungeKutta23),
    )
    .unwrap();
    let outcome = run.with_observer(&mut observer).run().unwrap();

    assert!(!outcome.cancelled);
    assert_eq!(outcome.snapshots, 10);
    assert!(observer.completed());

    let snapshots = observer.snapshots(1);
    assert_eq!(snapshots.len(), 10);

    // Values decrease monotonically toward exp(-1).
    for pair in snapshots.windows(2) {
        assert!(pair[1][0] < pair[0][0]);
    }
    let last = snapshots.last().unwrap()[0];
    assert!((last - (-1.0f64).exp()).abs() < 1e-4);

    // The caller's variable buffer carries the final state out.
    assert!((variables[0] - (-1.0f64).exp()).abs() < 1e-4);
}

#[test]
fn test_snapshots_reflect_recomputed_variables() {
    // Component 1 is algebraic: compute_variables overwrites it with the
    // bound, and its rate is zero. Snapshot rows must show the
    // recomputed value, not the raw integrator state.
    fn variables_from_bound(bound: f64, _r: &mut [f64], _c: &[f64], variables: &mut [f64]) {
        variables[1] = bound;
    }
    fn rates(_b: f64, rates: &mut [f64], _c: &[f64], variables: &mut [f64]) {
        rates[0] = -variables[0];
        rates[1] = 0.0;
    }
    let model = ModelFunctions {
        compute_variables: variables_from_bound,
        compute_rates: rates,
    };
    let mut variables = [1.0, 0.0];
    let mut scratch = [0.0, 0.0];
    let mut observer = MemoryObserver::new();

    let run = IntegrationRun::new(
        &model,
        &[],
        &mut variables,
        &mut scratch,
        decay_params(StepperKind::Fehlberg45),
    )
    .unwrap();
    run.with_observer(&mut observer).run().unwrap();

    let snapshots = observer.snapshots(2);
    assert_eq!(snapshots.len(), 10);
    for (i, row) in snapshots.iter().enumerate() {
        let bound = 0.1 * (i + 1) as f64;
        assert!(
            (row[1] - bound).abs() < 1e-9,
            "snapshot {} carries bound {} instead of {}",
            i,
            row[1],
            bound
        );
    }
}

#[test]
fn test_run_without_observer_discards_results() {
    let model = decay_model();
    let mut variables = [1.0];
    let mut rates = [0.0];

    let run = IntegrationRun::new(
        &model,
        &[],
        &mut variables,
        &mut rates,
        decay_params(StepperKind::CashKarp45),
    )
    .unwrap();
    let outcome = run.run().unwrap();

    assert_eq!(outcome.snapshots, 10);
    assert_eq!(outcome.batches, 0);
}

// ===========================================================================
// BUFFER AND FLUSH BOUNDS
// ===========================================================================

/// Records the size of every batch it receives.
#[derive(Default)]
struct BatchSizeObserver {
    batch_sizes: Vec<usize>,
    done_calls: usize,
}

impl Observer for BatchSizeObserver {
    fn results(&mut self, values: &[f64]) {
        self.batch_sizes.push(values.len());
    }

    fn done(&mut self) {
        self.done_calls += 1;
    }
}

#[test]
fn test_batches_never_exceed_buffer_capacity() {
    // 16384 variables of 8 bytes: the 1 MiB budget holds 8 snapshots,
    // so 10 sub-intervals cannot arrive in one batch.
    const WIDTH: usize = 16384;
    let model = decay_model();
    let mut variables = vec![1.0; WIDTH];
    let mut rates = vec![0.0; WIDTH];
    let mut observer = BatchSizeObserver::default();

    let outcome = solve_ode_problem(
        &model,
        &[],
        &mut variables,
        &mut rates,
        decay_params(StepperKind::RungeKutta23),
        Some(&mut observer),
        None,
    )
    .unwrap();

    assert_eq!(outcome.snapshots, 10);
    assert_eq!(observer.done_calls, 1);
    assert!(observer.batch_sizes.len() >= 2);

    let capacity_values = 8 * WIDTH;
    for &size in &observer.batch_sizes {
        assert!(size <= capacity_values);
        assert_eq!(size % WIDTH, 0);
    }
    let total: usize = observer.batch_sizes.iter().sum();
    assert_eq!(total, 10 * WIDTH);
}

// ===========================================================================
// COMPLETION SIGNAL AND CANCELLATION
// ===========================================================================

#[test]
fn test_done_fires_exactly_once() {
    let model = decay_model();
    let mut variables = [1.0];
    let mut rates = [0.0];
    let mut observer = BatchSizeObserver::default();

    solve_ode_problem(
        &model,
        &[],
        &mut variables,
        &mut rates,
        decay_params(StepperKind::Fehlberg45),
        Some(&mut observer),
        None,
    )
    .unwrap();

    assert_eq!(observer.done_calls, 1);
}

#[test]
fn test_pre_cancelled_run_delivers_nothing_but_completes() {
    let model = decay_model();
    let mut variables = [1.0];
    let mut rates = [0.0];
    let mut observer = BatchSizeObserver::default();
    let cancel = AtomicBool::new(true);

    let outcome = solve_ode_problem(
        &model,
        &[],
        &mut variables,
        &mut rates,
        decay_params(StepperKind::Fehlberg45),
        Some(&mut observer),
        Some(&cancel),
    )
    .unwrap();

    assert!(outcome.cancelled);
    assert_eq!(outcome.snapshots, 0);
    assert!(observer.batch_sizes.is_empty());
    assert_eq!(observer.done_calls, 1);
}

/// Decay model that raises the cancellation flag the first time it is
/// evaluated past a trigger bound, standing in for an external caller.
struct SelfCancellingModel<'a> {
    flag: &'a AtomicBool,
    trigger: f64,
}

impl CellModel for SelfCancellingModel<'_> {
    fn compute_variables(&self, _b: f64, _r: &mut [f64], _c: &[f64], _v: &mut [f64]) {}

    fn compute_rates(&self, bound: f64, rates: &mut [f64], _c: &[f64], variables: &mut [f64]) {
        if bound > self.trigger {
            self.flag.store(true, Ordering::Relaxed);
        }
        rates[0] = -variables[0];
    }
}

#[test]
fn test_cancellation_discards_partial_interval() {
    // The flag goes up while integrating the fourth sub-interval
    // [0.3, 0.4]; exactly the three completed intervals are delivered.
    let cancel = AtomicBool::new(false);
    let model = SelfCancellingModel {
        flag: &cancel,
        trigger: 0.35,
    };
    let mut variables = [1.0];
    let mut rates = [0.0];
    let mut observer = MemoryObserver::new();

    let outcome = solve_ode_problem(
        &model,
        &[],
        &mut variables,
        &mut rates,
        decay_params(StepperKind::RungeKutta23),
        Some(&mut observer),
        Some(&cancel),
    )
    .unwrap();

    assert!(outcome.cancelled);
    assert_eq!(outcome.snapshots, 3);
    assert_eq!(observer.snapshots(1).len(), 3);
    assert!(observer.completed());
}

// ===========================================================================
// CONFIGURATION REJECTION
// ===========================================================================

#[test]
fn test_oversized_model_rejected_without_observer_calls() {
    // One snapshot would need more than 1 MiB: capacity truncates to
    // zero and configuration must fail before any observer interaction.
    const WIDTH: usize = (1 << 20) / 8 + 1;
    let model = decay_model();
    let mut variables = vec![1.0; WIDTH];
    let mut rates = vec![0.0; WIDTH];
    let mut observer = BatchSizeObserver::default();

    let err = solve_ode_problem(
        &model,
        &[],
        &mut variables,
        &mut rates,
        decay_params(StepperKind::Fehlberg45),
        Some(&mut observer),
        None,
    )
    .unwrap_err();

    assert!(matches!(
        err,
        SolveError::Config(ConfigError::SnapshotTooLarge { .. })
    ));
    assert!(observer.batch_sizes.is_empty());
    assert_eq!(observer.done_calls, 0);
}

#[test]
fn test_length_mismatch_rejected() {
    let model = decay_model();
    let mut variables = [1.0, 2.0];
    let mut rates = [0.0];

    let err = IntegrationRun::new(
        &model,
        &[],
        &mut variables,
        &mut rates,
        decay_params(StepperKind::Fehlberg45),
    )
    .unwrap_err();

    assert_eq!(
        err,
        ConfigError::SizeMismatch {
            variables: 2,
            rates: 1
        }
    );
}

#[test]
fn test_empty_interval_rejected() {
    let model = decay_model();
    let mut variables = [1.0];
    let mut rates = [0.0];
    let mut observer = BatchSizeObserver::default();

    let params = RunParams {
        start: 1.0,
        stop: 1.0,
        ..decay_params(StepperKind::Fehlberg45)
    };
    let err = solve_ode_problem(
        &model,
        &[],
        &mut variables,
        &mut rates,
        params,
        Some(&mut observer),
        None,
    )
    .unwrap_err();

    assert!(matches!(
        err,
        SolveError::Config(ConfigError::InvalidInterval { .. })
    ));
    assert_eq!(observer.done_calls, 0);
}

#[test]
fn test_empty_state_rejected() {
    let model = decay_model();
    let mut variables: [f64; 0] = [];
    let mut rates: [f64; 0] = [];

    let err = IntegrationRun::new(
        &model,
        &[],
        &mut variables,
        &mut rates,
        decay_params(StepperKind::Fehlberg45),
    )
    .unwrap_err();
    assert_eq!(err, ConfigError::EmptyState);
}
