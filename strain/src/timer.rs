use std::time::Duration;

/// Decides how long a [`LoadTest`](crate::LoadTest) waits between two user dispatches.
pub trait Timer: Send + Sync {
    fn delay(&self) -> Duration;
}

/// A [`Timer`] that always returns the same delay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConstantTimer {
    delay: Duration,
}

impl ConstantTimer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Timer for ConstantTimer {
    fn delay(&self) -> Duration {
        self.delay
    }
}

#[cfg(feature = "builtins")]
pub use builtins::*;

#[cfg(feature = "builtins")]
mod builtins {
    use super::*;
    use rand::Rng;

    /// A [`Timer`] that adds a uniformly distributed variation to a base delay.
    ///
    /// Every call returns a value in `[delay, delay + variation)`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RandomTimer {
        delay: Duration,
        variation: Duration,
    }

    impl RandomTimer {
        pub fn new(delay: Duration, variation: Duration) -> Self {
            Self { delay, variation }
        }
    }

    impl Timer for RandomTimer {
        fn delay(&self) -> Duration {
            if self.variation.is_zero() {
                return self.delay;
            }
            let factor: f64 = rand::thread_rng().gen_range(0.0..1.0);
            self.delay + self.variation.mul_f64(factor)
        }
    }
}
