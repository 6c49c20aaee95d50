// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Post-rewrite smoke tests (`spec.md` §3, §4.5).

use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use crate::error::MigrationError;

/// A single named, zero-argument smoke predicate.
///
/// Returning `Ok(false)` and returning `Err` are both treated as failure
/// (`spec.md` §4.5: "a false return is equivalent to a thrown exception").
pub trait SmokeTest: Send + Sync {
    /// Stable name surfaced in [`MigrationError::SmokeFailed`] and events.
    fn name(&self) -> &str;
    /// Runs the predicate.
    ///
    /// # Errors
    /// Any `Err` is treated identically to `Ok(false)`.
    fn run(&self) -> Result<bool, String>;
}

/// Runs a registered, ordered list of [`SmokeTest`]s sequentially, aborting
/// on the first failure.
#[derive(Default)]
pub struct SmokeTestRunner {
    tests: Vec<Box<dyn SmokeTest>>,
}

impl SmokeTestRunner {
    /// Builds an empty runner.
    #[must_use]
    pub fn new() -> Self {
        Self { tests: Vec::new() }
    }

    /// Appends a test, preserving registration order as run order.
    pub fn register(&mut self, test: Box<dyn SmokeTest>) {
        self.tests.push(test);
    }

    /// True when no tests are registered; the caller should treat this as
    /// "smoke testing vacuously passes" per `spec.md` §4.5.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Runs every registered test in order, stopping at the first failure.
    ///
    /// `per_test_timeout` of [`Duration::ZERO`] means no timeout. Since a
    /// predicate is an arbitrary (possibly panicking) application callback,
    /// a panic is caught and folded into [`MigrationError::SmokeFailed`]
    /// rather than unwinding through the engine.
    ///
    /// # Errors
    /// Returns [`MigrationError::SmokeFailed`] naming the first predicate
    /// that returned `false`, errored, panicked, or exceeded
    /// `per_test_timeout`.
    pub fn run_all(&self, per_test_timeout: Duration) -> Result<(), MigrationError> {
        for test in &self.tests {
            let started = Instant::now();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| test.run()));

            let result = match outcome {
                Ok(result) => result,
                Err(payload) => Err(panic_message(&payload)),
            };

            if !per_test_timeout.is_zero() && started.elapsed() > per_test_timeout {
                return Err(MigrationError::SmokeFailed {
                    name: test.name().to_string(),
                    cause: format!("exceeded timeout of {per_test_timeout:?}"),
                });
            }

            match result {
                Ok(true) => {}
                Ok(false) => {
                    return Err(MigrationError::SmokeFailed {
                        name: test.name().to_string(),
                        cause: "predicate returned false".to_string(),
                    });
                }
                Err(cause) => {
                    return Err(MigrationError::SmokeFailed {
                        name: test.name().to_string(),
                        cause,
                    });
                }
            }
        }
        Ok(())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "smoke test panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;

    struct Predicate {
        name: &'static str,
        result: Result<bool, String>,
    }
    impl SmokeTest for Predicate {
        fn name(&self) -> &str {
            self.name
        }
        fn run(&self) -> Result<bool, String> {
            self.result.clone()
        }
    }

    #[test]
    fn empty_runner_is_empty_and_passes() {
        let runner = SmokeTestRunner::new();
        assert!(runner.is_empty());
        assert!(runner.run_all(Duration::ZERO).is_ok());
    }

    #[test]
    fn all_passing_predicates_succeed() {
        let mut runner = SmokeTestRunner::new();
        runner.register(Box::new(Predicate {
            name: "a",
            result: Ok(true),
        }));
        runner.register(Box::new(Predicate {
            name: "b",
            result: Ok(true),
        }));
        assert!(runner.run_all(Duration::ZERO).is_ok());
    }

    #[test]
    fn first_failure_aborts_remaining_tests() {
        let mut runner = SmokeTestRunner::new();
        runner.register(Box::new(Predicate {
            name: "ok",
            result: Ok(true),
        }));
        runner.register(Box::new(Predicate {
            name: "boom",
            result: Ok(false),
        }));
        runner.register(Box::new(Predicate {
            name: "never-runs",
            result: Err("should not execute".to_string()),
        }));

        let err = runner
            .run_all(Duration::ZERO)
            .expect_err("second predicate fails");
        match err {
            MigrationError::SmokeFailed { name, .. } => assert_eq!(name, "boom"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn errored_predicate_is_treated_as_failure() {
        let mut runner = SmokeTestRunner::new();
        runner.register(Box::new(Predicate {
            name: "fails",
            result: Err("disk unavailable".to_string()),
        }));
        let err = runner.run_all(Duration::ZERO).expect_err("errors fail too");
        match err {
            MigrationError::SmokeFailed { name, cause } => {
                assert_eq!(name, "fails");
                assert_eq!(cause, "disk unavailable");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
