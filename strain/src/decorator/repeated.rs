use std::{fmt, sync::Arc};

use async_trait::async_trait;

use super::TestDecorator;
use crate::{ConfigError, Executable, Outcome, ResultSink};

/// Runs the wrapped test `repeat` times in a row, in the calling task.
///
/// Failures reported by one iteration do not stop the next one. A fault the
/// inner test returns ends the loop and is passed up.
pub struct RepeatedTest {
    base: TestDecorator,
    repeat: usize,
}

impl RepeatedTest {
    pub fn new(test: Arc<dyn Executable>, repeat: i64) -> Result<Self, ConfigError> {
        let repeat = usize::try_from(repeat).map_err(|_| ConfigError::NegativeRepeat(repeat))?;
        Ok(Self {
            base: TestDecorator::new(test),
            repeat,
        })
    }

    pub fn repeat(&self) -> usize {
        self.repeat
    }
}

impl fmt::Display for RepeatedTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(repeated)", self.base)
    }
}

#[async_trait]
impl Executable for RepeatedTest {
    fn count_test_cases(&self) -> usize {
        self.repeat.saturating_mul(self.base.count_test_cases())
    }

    async fn run(&self, result: Arc<dyn ResultSink>) -> Outcome {
        for iteration in 0..self.repeat {
            tracing::trace!(test = %self.base, iteration, "Running iteration");
            self.base.basic_run(result.clone()).await?;
        }
        Ok(())
    }
}
