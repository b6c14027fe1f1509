use crate::Fault;

/// Where every test outcome ends up.
///
/// Sinks are shared by all concurrently running users, so implementations
/// must tolerate calls from many tasks at once.
pub trait ResultSink: Send + Sync {
    /// Records an assertion-style failure against `source`.
    fn add_failure(&self, source: &str, reason: &Fault);
    /// Records a non-assertion fault against `source`.
    fn add_error(&self, source: &str, reason: &Fault);
    /// Asks the surrounding run to halt further processing.
    fn stop(&self);
    /// Whether `stop` has been requested.
    fn should_stop(&self) -> bool {
        false
    }
}

#[cfg(feature = "builtins")]
pub use builtins::*;

#[cfg(feature = "builtins")]
mod builtins {
    use super::*;

    use parking_lot::Mutex;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// One failure or error as it was reported.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct FaultRecord {
        pub source: String,
        pub reason: String,
    }

    impl FaultRecord {
        fn new(source: &str, reason: &Fault) -> Self {
            Self {
                source: source.to_string(),
                reason: reason.to_string(),
            }
        }
    }

    /// In-memory sink that keeps everything it is told.
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        failures: Mutex<Vec<FaultRecord>>,
        errors: Mutex<Vec<FaultRecord>>,
        stops: AtomicUsize,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failures(&self) -> Vec<FaultRecord> {
            self.failures.lock().clone()
        }

        pub fn errors(&self) -> Vec<FaultRecord> {
            self.errors.lock().clone()
        }

        /// How many times `stop` was called.
        pub fn stop_count(&self) -> usize {
            self.stops.load(Ordering::SeqCst)
        }

        pub fn was_successful(&self) -> bool {
            self.failures.lock().is_empty() && self.errors.lock().is_empty()
        }

        pub fn summary(&self) -> Summary {
            Summary {
                failures: self.failures(),
                errors: self.errors(),
                stopped: self.should_stop(),
            }
        }
    }

    impl ResultSink for RecordingSink {
        fn add_failure(&self, source: &str, reason: &Fault) {
            self.failures.lock().push(FaultRecord::new(source, reason));
        }

        fn add_error(&self, source: &str, reason: &Fault) {
            self.errors.lock().push(FaultRecord::new(source, reason));
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }

        fn should_stop(&self) -> bool {
            self.stops.load(Ordering::SeqCst) > 0
        }
    }

    /// Snapshot of a [`RecordingSink`], ready to be printed or shipped somewhere.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Summary {
        pub failures: Vec<FaultRecord>,
        pub errors: Vec<FaultRecord>,
        pub stopped: bool,
    }

    impl Summary {
        pub fn to_json(&self) -> serde_json::Result<String> {
            serde_json::to_string_pretty(self)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_is_counted_and_sticky() {
        let sink = RecordingSink::new();
        assert!(!sink.should_stop());
        sink.stop();
        sink.stop();
        assert!(sink.should_stop());
        assert_eq!(sink.stop_count(), 2);
    }

    #[test]
    fn summary_serializes_every_record() {
        let sink = RecordingSink::new();
        sink.add_failure("LoadTest", &Fault::assertion("too slow"));
        sink.add_error("LoadTest", &Fault::error("connection reset"));
        assert!(!sink.was_successful());

        let json = sink.summary().to_json().unwrap();
        let back: Summary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sink.summary());
        assert_eq!(back.failures[0].reason, "too slow");
        assert!(!back.stopped);
    }
}
