//! A teardown callback that runs at most once.
//!
//! Owners call [`ShutdownHook::run`] for explicit teardown; dropping the hook
//! runs it too if nobody did. Repeated calls are no-ops.

use parking_lot::Mutex;

type Callback = Box<dyn FnOnce() + Send>;

pub struct ShutdownHook {
    callback: Mutex<Option<Callback>>,
}

impl ShutdownHook {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self { callback: Mutex::new(Some(Box::new(callback))) }
    }

    /// Run the callback if it has not run yet. Returns whether this call ran it.
    pub fn run(&self) -> bool {
        // Taken under the lock, invoked outside it.
        let callback = self.callback.lock().take();
        match callback {
            Some(f) => { f(); true }
            None => false,
        }
    }

    pub fn has_run(&self) -> bool {
        self.callback.lock().is_none()
    }
}

impl Drop for ShutdownHook {
    fn drop(&mut self) {
        self.run();
    }
}

impl std::fmt::Debug for ShutdownHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownHook").field("has_run", &self.has_run()).finish()
    }
}
