use std::{
    fmt,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use futures::FutureExt;
use typed_builder::TypedBuilder;

use super::TestDecorator;
use crate::{ConfigError, Executable, Fault, LoadTest, LoadTestConfig, Outcome, ResultSink, concurrency};

/// Deadline settings of a [`TimedTest`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct TimedTestConfig {
    pub max_elapsed: Duration,
    /// `true`: run to completion, then judge. `false`: stop waiting at the deadline.
    #[builder(default = true)]
    pub wait_for_completion: bool,
    /// Do not print the elapsed time.
    #[builder(default)]
    pub quiet: bool,
}

/// Fails the wrapped test when it takes longer than `max_elapsed`.
///
/// - **Waiting** mode runs the test in the calling task and checks the
///   elapsed time afterwards.
/// - **Non-waiting** mode runs the test on its own task and gives up on it at
///   the deadline. The abandoned task keeps running and may still report to
///   the sink afterwards.
///
/// A breach adds one failure against the wrapped test and calls
/// [`ResultSink::stop`].
///
/// The racing task belongs to the caller's concurrency group when there is
/// one, so an atomic [`LoadTest`] around a racing `TimedTest` still waits for
/// everything the wrapped test started.
pub struct TimedTest {
    base: TestDecorator,
    max_elapsed: Duration,
    wait_for_completion: bool,
    quiet: bool,
    exceeded: AtomicBool,
}

impl TimedTest {
    pub fn new(test: Arc<dyn Executable>, config: TimedTestConfig) -> Self {
        Self {
            base: TestDecorator::new(test),
            max_elapsed: config.max_elapsed,
            wait_for_completion: config.wait_for_completion,
            quiet: config.quiet,
            exceeded: AtomicBool::new(false),
        }
    }

    pub fn waiting(test: Arc<dyn Executable>, max_elapsed: Duration) -> Self {
        Self::new(test, TimedTestConfig::builder().max_elapsed(max_elapsed).build())
    }

    pub fn racing(test: Arc<dyn Executable>, max_elapsed: Duration) -> Self {
        Self::new(
            test,
            TimedTestConfig::builder()
                .max_elapsed(max_elapsed)
                .wait_for_completion(false)
                .build(),
        )
    }

    /// Waiting deadline over a load test of `users` users, each running `test`
    /// `iterations` times.
    pub fn load_test_case(
        test: Arc<dyn Executable>,
        max_elapsed: Duration,
        users: usize,
        iterations: u32,
    ) -> Result<Self, ConfigError> {
        let config = LoadTestConfig::builder()
            .users(users)
            .iterations(iterations)
            .build();
        let load = LoadTest::new(test, config)?;
        Ok(Self::waiting(Arc::new(load), max_elapsed))
    }

    /// Whether the last run went over the deadline. Cleared when a run starts.
    pub fn out_of_time(&self) -> bool {
        self.exceeded.load(Ordering::SeqCst)
    }

    pub fn max_elapsed(&self) -> Duration {
        self.max_elapsed
    }

    async fn run_until_test_completion(&self, result: Arc<dyn ResultSink>) -> Outcome {
        let begin = Instant::now();
        let outcome = self.base.basic_run(result.clone()).await;
        let elapsed = begin.elapsed();
        self.print_elapsed(elapsed);

        if elapsed > self.max_elapsed {
            self.deadline_exceeded(
                result.as_ref(),
                format!(
                    "Maximum elapsed time exceeded! Expected {} sec., but was {} sec.",
                    self.max_elapsed.as_secs_f64(),
                    elapsed.as_secs_f64()
                ),
            );
        }
        outcome
    }

    async fn run_until_time_expires(&self, result: Arc<dyn ResultSink>) -> Outcome {
        let test = self.base.test().clone();
        let racer_result = result.clone();
        let begin = Instant::now();
        let racer = concurrency::spawn_in_current_group(async move {
            AssertUnwindSafe(test.run(racer_result))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(Fault::from_panic(payload)))
        });
        let finished = tokio::time::timeout(self.max_elapsed, racer).await;
        self.print_elapsed(begin.elapsed());

        match finished {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_err)) => Err(Fault::error(join_err.to_string())),
            Err(_) => {
                // Dropping the handle detaches the racer; it is not aborted
                self.deadline_exceeded(
                    result.as_ref(),
                    format!(
                        "Maximum elapsed time ({} sec.) exceeded!",
                        self.max_elapsed.as_secs_f64()
                    ),
                );
                Ok(())
            }
        }
    }

    fn deadline_exceeded(&self, result: &dyn ResultSink, message: String) {
        self.exceeded.store(true, Ordering::SeqCst);
        tracing::info!(test = %self, max_elapsed = ?self.max_elapsed, "Deadline exceeded");
        result.add_failure(&self.base.to_string(), &Fault::assertion(message));
        result.stop();
    }

    fn print_elapsed(&self, elapsed: Duration) {
        if !self.quiet {
            println!("{self}: {} sec.", elapsed.as_secs_f64());
        }
    }
}

impl fmt::Display for TimedTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.wait_for_completion {
            "WAITING"
        } else {
            "NON-WAITING"
        };
        write!(f, "TimedTest ({mode}): {}", self.base)
    }
}

#[async_trait]
impl Executable for TimedTest {
    fn count_test_cases(&self) -> usize {
        self.base.count_test_cases()
    }

    async fn run(&self, result: Arc<dyn ResultSink>) -> Outcome {
        self.exceeded.store(false, Ordering::SeqCst);
        if self.wait_for_completion {
            self.run_until_test_completion(result).await
        } else {
            self.run_until_time_expires(result).await
        }
    }
}
