//! Listener registries
//!
//! The event pipelines are explicit phases - Before, Perform, After - where
//! each phase walks a list of handlers serially. Three registry flavors
//! cover the kernel's needs:
//!
//! - [`Notifier`]: infallible after-phase listeners (`query`, `update`,
//!   `queryFail`, ...).
//! - [`TryNotifier`]: fallible listeners whose failure propagates to the
//!   caller (`transform`, consumed by replication).
//! - [`InterceptNotifier`]: fallible before-phase listeners that share a
//!   mutable hints value; the first failure aborts the pipeline.
//!
//! Listeners run in registration order. All registries hand back a
//! [`ListenerKey`] for removal.

use orrery_core::Result;
use parking_lot::Mutex;

/// Handle for removing a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerKey(u64);

fn next_key(counter: &Mutex<u64>) -> ListenerKey {
    let mut next = counter.lock();
    *next += 1;
    ListenerKey(*next)
}

/// Serial infallible listeners over one argument
pub struct Notifier<A> {
    listeners: Mutex<Vec<(ListenerKey, Box<dyn FnMut(&A) + Send>)>>,
    counter: Mutex<u64>,
}

impl<A> Default for Notifier<A> {
    fn default() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            counter: Mutex::new(0),
        }
    }
}

impl<A> Notifier<A> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener
    pub fn on(&self, listener: impl FnMut(&A) + Send + 'static) -> ListenerKey {
        let key = next_key(&self.counter);
        self.listeners.lock().push((key, Box::new(listener)));
        key
    }

    /// Remove a listener
    pub fn off(&self, key: ListenerKey) {
        self.listeners.lock().retain(|(k, _)| *k != key);
    }

    /// Invoke every listener serially
    pub fn emit(&self, argument: &A) {
        let mut listeners = self.listeners.lock();
        for (_, listener) in listeners.iter_mut() {
            listener(argument);
        }
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Check whether no listeners are registered
    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }
}

/// Serial fallible listeners; the first error aborts emission
pub struct TryNotifier<A> {
    listeners: Mutex<Vec<(ListenerKey, Box<dyn FnMut(&A) -> Result<()> + Send>)>>,
    counter: Mutex<u64>,
}

impl<A> Default for TryNotifier<A> {
    fn default() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            counter: Mutex::new(0),
        }
    }
}

impl<A> TryNotifier<A> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener
    pub fn on(&self, listener: impl FnMut(&A) -> Result<()> + Send + 'static) -> ListenerKey {
        let key = next_key(&self.counter);
        self.listeners.lock().push((key, Box::new(listener)));
        key
    }

    /// Remove a listener
    pub fn off(&self, key: ListenerKey) {
        self.listeners.lock().retain(|(k, _)| *k != key);
    }

    /// Invoke every listener serially, stopping at the first error
    pub fn emit(&self, argument: &A) -> Result<()> {
        let mut listeners = self.listeners.lock();
        for (_, listener) in listeners.iter_mut() {
            listener(argument)?;
        }
        Ok(())
    }
}

/// Serial fallible listeners sharing a mutable hints value
pub struct InterceptNotifier<R, H> {
    #[allow(clippy::type_complexity)]
    listeners: Mutex<Vec<(ListenerKey, Box<dyn FnMut(&R, &mut H) -> Result<()> + Send>)>>,
    counter: Mutex<u64>,
}

impl<R, H> Default for InterceptNotifier<R, H> {
    fn default() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            counter: Mutex::new(0),
        }
    }
}

impl<R, H> InterceptNotifier<R, H> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener
    pub fn on(
        &self,
        listener: impl FnMut(&R, &mut H) -> Result<()> + Send + 'static,
    ) -> ListenerKey {
        let key = next_key(&self.counter);
        self.listeners.lock().push((key, Box::new(listener)));
        key
    }

    /// Remove a listener
    pub fn off(&self, key: ListenerKey) {
        self.listeners.lock().retain(|(k, _)| *k != key);
    }

    /// Invoke every listener serially with the shared hints value
    pub fn emit(&self, request: &R, hints: &mut H) -> Result<()> {
        let mut listeners = self.listeners.lock();
        for (_, listener) in listeners.iter_mut() {
            listener(request, hints)?;
        }
        Ok(())
    }
}
