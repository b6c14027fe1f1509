use std::{fmt, sync::Arc};

use async_trait::async_trait;

use crate::{
    Executable, Outcome, ResultSink,
    concurrency::{self, CompletionBarrier, ConcurrencyGroup, Membership, UnitGroup},
};

/// Runs the wrapped test on a new unit of `group` and returns right away.
///
/// The unit signals `barrier` once it is done, however it ended, and then
/// leaves the group. Faults of the inner test go to the group, never to the
/// caller of [`run`](Executable::run).
pub struct ThreadedTest {
    test: Arc<dyn Executable>,
    group: Arc<dyn UnitGroup>,
    barrier: Arc<CompletionBarrier>,
}

impl ThreadedTest {
    /// Uses a private group and a barrier expecting a single completion.
    pub fn new(test: Arc<dyn Executable>) -> Self {
        Self::with_group(
            test,
            Arc::new(ConcurrencyGroup::new("ThreadedTest")),
            Arc::new(CompletionBarrier::new(1)),
        )
    }

    pub fn with_group(
        test: Arc<dyn Executable>,
        group: Arc<dyn UnitGroup>,
        barrier: Arc<CompletionBarrier>,
    ) -> Self {
        Self {
            test,
            group,
            barrier,
        }
    }

    pub fn barrier(&self) -> &Arc<CompletionBarrier> {
        &self.barrier
    }

    pub fn group(&self) -> &Arc<dyn UnitGroup> {
        &self.group
    }
}

impl fmt::Display for ThreadedTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ThreadedTest: {}", self.test)
    }
}

#[async_trait]
impl Executable for ThreadedTest {
    fn count_test_cases(&self) -> usize {
        self.test.count_test_cases()
    }

    async fn run(&self, result: Arc<dyn ResultSink>) -> Outcome {
        // Joined before the task starts, so the group already counts it
        let membership = Membership::join(self.group.clone());
        let test = self.test.clone();
        let barrier = self.barrier.clone();
        concurrency::spawn_member(
            membership,
            async move { test.run(result).await },
            move |unit| barrier.on_completion(unit),
        );
        Ok(())
    }
}
