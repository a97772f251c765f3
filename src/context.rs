use crate::{
    config::Config,
    sync::{GitBackend, Synchronizer},
};
use std::sync::{Mutex, PoisonError};

/// Everything a webhook needs: the configuration, the synchronizer and the lock
/// that keeps synchronizations from running at the same time.
///
/// There is one context per process, shared between the request threads.
pub struct HookContext {
    config: Config,
    synchronizer: Synchronizer,
    lock: Mutex<()>,
}

impl HookContext {
    pub fn new(config: Config, backend: Box<dyn GitBackend>) -> Self {
        HookContext {
            config,
            synchronizer: Synchronizer::new(backend),
            lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn synchronizer(&self) -> &Synchronizer {
        &self.synchronizer
    }

    /// Run the function while holding the process-wide update lock.
    ///
    /// Other callers block until the function returns, on every repository.
    /// The lock is released on every return path. If a previous holder panicked,
    /// the lock is taken over, so one broken update doesn't stop the rest.
    pub fn serialized<T, F>(&self, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }
}
