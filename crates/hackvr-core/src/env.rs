//! Environment abstraction.
//!
//! Protocol logic never touches the system clock or OS entropy directly:
//! time and randomness come in through this trait so the same state machines
//! run under real resources in production and under a virtual clock with a
//! seeded RNG in tests. Nonce expiry, transition playback, and token TTLs
//! are all computed against `Instant` values obtained here.

use std::time::Duration;

/// Time and randomness for protocol state machines.
///
/// Implementations must guarantee that `now()` is monotonic within one
/// execution context and that `random_bytes()` draws from a CSPRNG in
/// production; authentication nonces and session tokens come straight out
/// of it.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant type; `std::time::Instant` in production.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current monotonic time.
    fn now(&self) -> Self::Instant;

    /// Fill `buffer` with cryptographically secure random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Async sleep, for driver code only; state machines never await.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// A fresh 16-byte authentication nonce.
    fn nonce(&self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        self.random_bytes(&mut bytes);
        bytes
    }

    /// A fresh 32-byte session token.
    fn token_bytes(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        self.random_bytes(&mut bytes);
        bytes
    }
}

/// Deterministic environment for tests: a manually advanced virtual clock
/// and a counting "RNG".
///
/// Lives in the library (not behind `cfg(test)`) so downstream crates can
/// drive their own state-machine tests with it.
pub mod testing {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use super::Environment;

    /// Deterministic environment: manually advanced clock, counting "RNG".
    #[derive(Clone, Default)]
    pub struct TestEnv {
        inner: Arc<Mutex<Inner>>,
    }

    #[derive(Default)]
    struct Inner {
        now: Duration,
        counter: u8,
    }

    /// Virtual instant: duration since an arbitrary epoch.
    pub type TestInstant = Duration;

    impl TestEnv {
        /// Advance the virtual clock.
        pub fn advance(&self, by: Duration) {
            self.with(|inner| inner.now += by);
        }

        fn with<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> T {
            // A poisoned lock only means another test thread panicked; the
            // virtual clock state is still coherent.
            let mut guard = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            f(&mut guard)
        }
    }

    impl Environment for TestEnv {
        type Instant = TestInstant;

        fn now(&self) -> TestInstant {
            self.with(|inner| inner.now)
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            self.with(|inner| {
                inner.counter = inner.counter.wrapping_add(1);
                buffer.fill(inner.counter);
            });
        }

        fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            std::future::ready(())
        }
    }
}
