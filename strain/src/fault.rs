use std::any::Any;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::result::ResultSink;

/// Result of running an [`Executable`](crate::Executable).
///
/// `Ok(())` means every outcome went through the result sink. `Err` is a fault
/// that escaped the test and has to be handled by whoever spawned it.
pub type Outcome = Result<(), Fault>;

/// Anything that can end a test body abnormally.
///
/// The tag decides how the fault is reported: assertion failures become
/// failures, everything else except [`Fault::Teardown`] becomes an error.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum Fault {
    /// A check inside the test body did not hold
    #[error("{0}")]
    Assertion(String),

    /// Any non-assertion failure
    #[error("{0}")]
    Error(String),

    /// The test body panicked
    #[error("panicked: {0}")]
    Panic(String),

    /// The unit was asked to stop. Not a real error.
    #[error("unit torn down")]
    Teardown,
}

impl Fault {
    pub fn assertion(msg: impl Into<String>) -> Self {
        Fault::Assertion(msg.into())
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Fault::Error(msg.into())
    }

    /// Builds a [`Fault::Panic`] from a payload caught by `catch_unwind`.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "test body panicked".to_string()
        };
        Fault::Panic(msg)
    }

    pub fn is_teardown(&self) -> bool {
        matches!(self, Fault::Teardown)
    }

    /// Records this fault against `source`.
    ///
    /// Returns `false` when nothing was recorded (teardown).
    pub fn report(&self, sink: &dyn ResultSink, source: &str) -> bool {
        match self {
            Fault::Teardown => false,
            Fault::Assertion(_) => {
                sink.add_failure(source, self);
                true
            }
            Fault::Error(_) | Fault::Panic(_) => {
                sink.add_error(source, self);
                true
            }
        }
    }
}

/// Invalid construction arguments. Raised before anything runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Number of users must be > 0")]
    NoUsers,

    #[error("Repetition count must be >= 0, got {0}")]
    NegativeRepeat(i64),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupError {
    /// `destroy` found members that had not exited yet
    #[error("group destroyed with {0} active member(s)")]
    ActiveMembers(usize),
}
