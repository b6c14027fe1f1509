//! LoadTest: replays one test concurrently for a number of simulated users.
//!
//! A `LoadTest` wraps its test as `ThreadedTest(RepeatedTest(test, iterations))`,
//! bound to a [`FaultFunnel`] and a [`CompletionBarrier`] sized to `users`.
//! Running it:
//!
//! 1. binds the result sink to the funnel,
//! 2. dispatches `users` units one after the other, sleeping for the timer's
//!    delay after each dispatch,
//! 3. waits for completion (see below),
//! 4. tears the group down, ignoring teardown errors.
//!
//! # Atomicity
//! - **Non-atomic** (default): done once every top-level user unit has
//!   reached the barrier. Tasks a test body started on its own may still be
//!   running when `run` returns.
//! - **Atomic**: done once the group has no member left, including the
//!   sub-units test bodies started through [`concurrency::spawn`](crate::concurrency::spawn).
//!
//! # Single use
//! The barrier and the group are created with the load test and never reset.
//! A second `run` finds the barrier already reached and does not wait for its
//! own users. Build a new `LoadTest` per run.
use std::{fmt, sync::Arc};

use async_trait::async_trait;
use typed_builder::TypedBuilder;

use crate::{
    ConfigError, Executable, Outcome, ResultSink,
    concurrency::{CompletionBarrier, FaultFunnel, UnitGroup},
    decorator::{RepeatedTest, ThreadedTest},
    timer::{ConstantTimer, Timer},
};

/// Shape of a [`LoadTest`].
///
/// Use `LoadTestConfig::builder().users(10).build()` for ten users with no
/// repetition and no delay between dispatches.
#[derive(Clone, TypedBuilder)]
pub struct LoadTestConfig {
    /// Number of concurrent users, at least 1
    pub users: usize,
    /// Times each user repeats the test. 0 runs it once, without a repetition wrapper.
    #[builder(default)]
    pub iterations: u32,
    /// Delay between two user dispatches
    #[builder(default = no_delay())]
    pub timer: Arc<dyn Timer>,
    #[builder(default)]
    pub enforce_atomicity: bool,
}

fn no_delay() -> Arc<dyn Timer> {
    Arc::new(ConstantTimer::default())
}

pub struct LoadTest {
    name: String,
    users: usize,
    timer: Arc<dyn Timer>,
    enforce_atomicity: bool,
    barrier: Arc<CompletionBarrier>,
    group: Arc<FaultFunnel>,
    test: ThreadedTest,
}

impl LoadTest {
    pub fn new(test: Arc<dyn Executable>, config: LoadTestConfig) -> Result<Self, ConfigError> {
        if config.users < 1 {
            return Err(ConfigError::NoUsers);
        }
        let test: Arc<dyn Executable> = if config.iterations > 0 {
            Arc::new(RepeatedTest::new(test, i64::from(config.iterations))?)
        } else {
            test
        };

        let mode = if config.enforce_atomicity {
            "ATOMIC"
        } else {
            "NON-ATOMIC"
        };
        let name = format!("LoadTest ({mode}): ThreadedTest: {test}");
        let barrier = Arc::new(CompletionBarrier::new(config.users));
        let group = Arc::new(FaultFunnel::new(name.clone(), "LoadTest:ThreadedTestGroup"));
        let test = ThreadedTest::with_group(test, group.clone(), barrier.clone());

        Ok(Self {
            name,
            users: config.users,
            timer: config.timer,
            enforce_atomicity: config.enforce_atomicity,
            barrier,
            group,
            test,
        })
    }

    /// `users` users, one pass each, no delay.
    pub fn with_users(test: Arc<dyn Executable>, users: usize) -> Result<Self, ConfigError> {
        Self::new(test, LoadTestConfig::builder().users(users).build())
    }

    pub fn users(&self) -> usize {
        self.users
    }

    pub fn is_atomic(&self) -> bool {
        self.enforce_atomicity
    }

    pub fn barrier(&self) -> &Arc<CompletionBarrier> {
        &self.barrier
    }

    pub fn group(&self) -> &Arc<FaultFunnel> {
        &self.group
    }

    async fn wait_for_test_completion(&self) {
        if self.enforce_atomicity {
            self.group.group().wait_until_empty().await;
        } else {
            self.barrier.wait().await;
        }
    }

    fn cleanup(&self) {
        if let Err(err) = self.group.group().destroy() {
            tracing::debug!(%err, "Ignoring group teardown error");
        }
    }
}

impl fmt::Display for LoadTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[async_trait]
impl Executable for LoadTest {
    fn count_test_cases(&self) -> usize {
        self.users.saturating_mul(self.test.count_test_cases())
    }

    async fn run(&self, result: Arc<dyn ResultSink>) -> Outcome {
        self.group.bind_result_sink(result.clone());

        tracing::info!(users = self.users, "Dispatching users...");
        for _ in 0..self.users {
            self.test.run(result.clone()).await?;
            tokio::time::sleep(self.timer.delay()).await;
        }

        tracing::info!(atomic = self.enforce_atomicity, "Waiting for users to complete...");
        self.wait_for_test_completion().await;
        self.cleanup();
        tracing::info!("Done running load test: {}!", self.name);
        Ok(())
    }
}
