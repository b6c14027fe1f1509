//! Strain: load and deadline decorators for concurrent test execution.
//!
//! Strain takes one test and replays it concurrently for a number of simulated
//! users, optionally repeating it per user, spacing the users out with a
//! pluggable timer and putting a wall-clock deadline on the whole thing. It does
//! orchestration only: assertions live in your test bodies and outcomes go to a
//! [`ResultSink`] you provide (or the builtin [`RecordingSink`](result::RecordingSink)).
//!
//! # Architecture
//!
//! Everything is an [`Executable`]. Decorators wrap one executable and are
//! executables themselves, so they nest in any order:
//!
//! - [`TestCase`]: leaf test built from an async closure.
//! - [`RepeatedTest`]: runs its test `n` times in a row.
//! - [`ThreadedTest`]: runs its test on a new concurrency unit and returns at once.
//! - [`LoadTest`]: dispatches `users` threaded copies of its test, spaced by a
//!   [`Timer`], and waits for them.
//! - [`TimedTest`]: fails its test if it runs longer than a deadline.
//!
//! Concurrency units are tokio tasks tracked by a [`ConcurrencyGroup`](concurrency::ConcurrencyGroup)
//! and counted by a [`CompletionBarrier`](concurrency::CompletionBarrier). A fault in
//! any unit is caught at the task boundary and funneled into the result sink by a
//! [`FaultFunnel`](concurrency::FaultFunnel); it never takes the harness down.
//!
//! # Example
//!
//! Ten users, two iterations each, the whole load test bounded to 1.5 seconds:
//!
//! ```rust
//! use std::{sync::Arc, time::Duration};
//!
//! use strain::{
//!     Executable, LoadTest, LoadTestConfig, TestCase, TimedTest, result::RecordingSink,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let test = TestCase::shared("one second response", || async {
//!         // NEVER block inside a test body; it stalls the runtime workers
//!         tokio::time::sleep(Duration::from_millis(100)).await;
//!         Ok(())
//!     });
//!
//!     let load = LoadTest::new(test, LoadTestConfig::builder().users(10).iterations(2).build())
//!         .expect("valid load test");
//!     let timed = TimedTest::waiting(Arc::new(load), Duration::from_millis(1500));
//!
//!     let sink = Arc::new(RecordingSink::new());
//!     timed.run(sink.clone()).await.expect("faults are funneled");
//!
//!     assert!(sink.was_successful());
//!     assert!(!timed.out_of_time());
//! }
//! ```
//!
//! # Feature flags
//!
//! - `macros`: the [`test_case`](macros::test_case) attribute. (Enabled by default)
//! - `builtins`: [`RecordingSink`](result::RecordingSink) and
//!   [`RandomTimer`](timer::RandomTimer). (Enabled by default)

extern crate self as strain;

/// Units, groups, funnels and barriers
pub mod concurrency;
/// Decorators that wrap one executable
pub mod decorator;
/// The executable abstraction and leaf tests
pub mod executable;
/// Faults and construction errors
pub mod fault;
/// The load test orchestrator
pub mod load;
/// Result sinks
pub mod result;
/// Delays between user dispatches
pub mod timer;

pub use decorator::{RepeatedTest, TestDecorator, ThreadedTest, TimedTest, TimedTestConfig};
pub use executable::{Executable, TestCase, TestFactory, parameterized};
pub use fault::{ConfigError, Fault, GroupError, Outcome};
pub use load::{LoadTest, LoadTestConfig};
pub use result::ResultSink;
pub use timer::{ConstantTimer, Timer};

#[cfg(feature = "macros")]
/// Procedural macros to reduce boilerplate
pub mod macros {
    pub use strain_macros::*;
}
