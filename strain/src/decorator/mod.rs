//! Decorators wrap exactly one [`Executable`] and are themselves executable,
//! so any decorator can wrap any other.
pub mod repeated;
pub mod threaded;
pub mod timed;

pub use repeated::RepeatedTest;
pub use threaded::ThreadedTest;
pub use timed::{TimedTest, TimedTestConfig};

use std::{fmt, sync::Arc};

use async_trait::async_trait;

use crate::{Executable, Outcome, ResultSink};

/// Pass-through decorator. The other decorators embed it and intercept
/// around [`basic_run`](Self::basic_run).
#[derive(Clone)]
pub struct TestDecorator {
    test: Arc<dyn Executable>,
}

impl TestDecorator {
    pub fn new(test: Arc<dyn Executable>) -> Self {
        Self { test }
    }

    /// Runs the wrapped test in the calling task.
    pub async fn basic_run(&self, result: Arc<dyn ResultSink>) -> Outcome {
        self.test.run(result).await
    }

    pub fn test(&self) -> &Arc<dyn Executable> {
        &self.test
    }
}

impl fmt::Display for TestDecorator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.test)
    }
}

#[async_trait]
impl Executable for TestDecorator {
    fn count_test_cases(&self) -> usize {
        self.test.count_test_cases()
    }

    async fn run(&self, result: Arc<dyn ResultSink>) -> Outcome {
        self.basic_run(result).await
    }
}
