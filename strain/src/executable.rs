use std::{
    fmt,
    panic::AssertUnwindSafe,
    sync::{Arc, OnceLock},
    time::Instant,
};

use async_trait::async_trait;
use futures::FutureExt;

use crate::{Fault, Outcome, ResultSink};

/// Anything that can be counted and run against a [`ResultSink`].
///
/// Every decorator in this crate implements `Executable` and wraps another
/// `Executable`, so trees of any shape can be built and run from their root.
/// The `Display` output is the test's identity in the sink.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
///
/// use async_trait::async_trait;
/// use strain::{Executable, Fault, Outcome, ResultSink};
///
/// struct AlwaysBroken;
///
/// impl std::fmt::Display for AlwaysBroken {
///     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
///         f.write_str("AlwaysBroken")
///     }
/// }
///
/// #[async_trait]
/// impl Executable for AlwaysBroken {
///     fn count_test_cases(&self) -> usize {
///         1
///     }
///
///     async fn run(&self, _result: Arc<dyn ResultSink>) -> Outcome {
///         Err(Fault::error("backend unreachable"))
///     }
/// }
/// ```
#[async_trait]
pub trait Executable: Send + Sync + fmt::Display {
    /// Number of leaf test invocations this node stands for.
    fn count_test_cases(&self) -> usize;

    /// Runs the test, reporting through `result`.
    ///
    /// An `Err` is a fault the test did not handle itself.
    async fn run(&self, result: Arc<dyn ResultSink>) -> Outcome;
}

/// Leaf test built from an async closure.
///
/// Like a classic xUnit test case it reports its own failures: an assertion
/// fault becomes a failure, any other fault or a panic becomes an error, both
/// against the test case's name, and `run` returns `Ok`. Only
/// [`Fault::Teardown`] is passed up.
pub struct TestCase<F> {
    name: String,
    action: F,
}

impl<F, Fut> TestCase<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    pub fn new(name: impl Into<String>, action: F) -> Self {
        Self {
            name: name.into(),
            action,
        }
    }

    /// Same as [`TestCase::new`], already shared.
    pub fn shared(name: impl Into<String>, action: F) -> Arc<dyn Executable> {
        Arc::new(Self::new(name, action))
    }
}

/// Test case that calls `action` with a fixed set of arguments.
///
/// It is named `"<name>-><args>"`, with the arguments in their `Debug` form,
/// so the same action bound to different arguments stays distinguishable in
/// the sink. Every run gets its own clone of `args`.
///
/// ```rust
/// use strain::{Fault, executable::parameterized};
///
/// let args = ("alice".to_string(), 3);
/// let test = parameterized("login", args, |(user, attempts): (String, u32)| async move {
///     if attempts > 0 && !user.is_empty() {
///         Ok(())
///     } else {
///         Err(Fault::assertion("bad credentials"))
///     }
/// });
/// assert_eq!(test.to_string(), r#"login->("alice", 3)"#);
/// ```
pub fn parameterized<A, G, Fut>(name: &str, args: A, action: G) -> Arc<dyn Executable>
where
    A: fmt::Debug + Clone + Send + Sync + 'static,
    G: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    let name = format!("{name}->{args:?}");
    TestCase::shared(name, move || action(args.clone()))
}

impl<F> fmt::Display for TestCase<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[async_trait]
impl<F, Fut> Executable for TestCase<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    fn count_test_cases(&self) -> usize {
        1
    }

    async fn run(&self, result: Arc<dyn ResultSink>) -> Outcome {
        let start = Instant::now();
        let outcome = AssertUnwindSafe(async { (self.action)().await })
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(Fault::from_panic(payload)));
        tracing::debug!(test = %self.name, elapsed = ?start.elapsed(), "Test case finished");

        match outcome {
            Err(Fault::Teardown) => Err(Fault::Teardown),
            Err(fault) => {
                fault.report(result.as_ref(), &self.name);
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }
}

/// Builds a fresh test for every `run`.
///
/// Use it when the test body keeps state, so each load test user gets its own
/// instance instead of sharing one. Counting builds one instance the first
/// time and remembers its count.
pub struct TestFactory<F> {
    name: String,
    factory: F,
    count: OnceLock<usize>,
}

impl<F> TestFactory<F>
where
    F: Fn() -> Arc<dyn Executable> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, factory: F) -> Self {
        Self {
            name: name.into(),
            factory,
            count: OnceLock::new(),
        }
    }
}

impl<F> fmt::Display for TestFactory<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TestFactory: {}", self.name)
    }
}

#[async_trait]
impl<F> Executable for TestFactory<F>
where
    F: Fn() -> Arc<dyn Executable> + Send + Sync + 'static,
{
    fn count_test_cases(&self) -> usize {
        *self
            .count
            .get_or_init(|| (self.factory)().count_test_cases())
    }

    async fn run(&self, result: Arc<dyn ResultSink>) -> Outcome {
        let test = (self.factory)();
        test.run(result).await
    }
}
