//! Live queries
//!
//! A live query subscribes a structured query to cache change notifications.
//! Nothing is published eagerly on subscription; deliveries start with the
//! first applied patch. In debounced mode (the default) all notifications
//! from one patch batch coalesce into exactly one delivery at batch end; in
//! non-debounced mode every applied operation delivers.
//!
//! Each delivery carries a [`LiveQueryUpdate`] whose `query()` re-evaluates
//! the compiled expressions against the current cache. Re-evaluation errors
//! (e.g. `RecordNotFound` after a removal) surface through that call; the
//! live query itself keeps running until `unsubscribe()`.

use crate::cache::CacheState;
use crate::query_engine;
use orrery_core::{Query, QueryData, QueryResult, Result};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Handle for removing one subscriber from a live query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionKey(u64);

type Subscriber = Box<dyn FnMut(LiveQueryUpdate) + Send>;

/// A notification payload: re-evaluates the query on demand
#[derive(Clone)]
pub struct LiveQueryUpdate {
    query: Query,
    state: Arc<RwLock<CacheState>>,
}

impl LiveQueryUpdate {
    /// Re-evaluate the live query against the current cache
    pub fn query(&self) -> Result<QueryData> {
        let state = self.state.read();
        let mut results: Vec<QueryResult> = Vec::with_capacity(self.query.expressions.len());
        for expression in &self.query.expressions {
            results.push(query_engine::evaluate(&state.store, expression)?);
        }
        Ok(QueryData::from_results(results, self.query.is_single()))
    }
}

pub(crate) struct LiveQueryInner {
    query: Query,
    debounce: bool,
    state: Arc<RwLock<CacheState>>,
    dirty: Mutex<bool>,
    subscribers: Mutex<Vec<(SubscriptionKey, Subscriber)>>,
    next_key: Mutex<u64>,
}

impl LiveQueryInner {
    pub(crate) fn new(query: Query, debounce: bool, state: Arc<RwLock<CacheState>>) -> Self {
        Self {
            query,
            debounce,
            state,
            dirty: Mutex::new(false),
            subscribers: Mutex::new(Vec::new()),
            next_key: Mutex::new(0),
        }
    }

    fn notify(&self) {
        let update = LiveQueryUpdate {
            query: self.query.clone(),
            state: self.state.clone(),
        };
        let mut subscribers = self.subscribers.lock();
        for (_, subscriber) in subscribers.iter_mut() {
            subscriber(update.clone());
        }
    }

    /// Called by the cache for every applied operation
    pub(crate) fn on_patch(&self) {
        if self.debounce {
            *self.dirty.lock() = true;
        } else {
            self.notify();
        }
    }

    /// Called by the cache when a patch batch completes
    pub(crate) fn flush(&self) {
        if !self.debounce {
            return;
        }
        let was_dirty = {
            let mut dirty = self.dirty.lock();
            std::mem::take(&mut *dirty)
        };
        if was_dirty {
            self.notify();
        }
    }
}

/// A standing query over the cache
///
/// Obtained from `RecordCache::live_query`. Dropping the handle does not
/// detach the query; call [`LiveQuery::unsubscribe`].
pub struct LiveQuery {
    inner: Arc<LiveQueryInner>,
    registry: Arc<Mutex<Vec<Arc<LiveQueryInner>>>>,
}

impl LiveQuery {
    pub(crate) fn new(
        inner: Arc<LiveQueryInner>,
        registry: Arc<Mutex<Vec<Arc<LiveQueryInner>>>>,
    ) -> Self {
        Self { inner, registry }
    }

    /// Attach a downstream listener
    pub fn subscribe(
        &self,
        listener: impl FnMut(LiveQueryUpdate) + Send + 'static,
    ) -> SubscriptionKey {
        let key = {
            let mut next = self.inner.next_key.lock();
            *next += 1;
            SubscriptionKey(*next)
        };
        self.inner
            .subscribers
            .lock()
            .push((key, Box::new(listener)));
        key
    }

    /// Detach one downstream listener
    pub fn unsubscribe_listener(&self, key: SubscriptionKey) {
        self.inner.subscribers.lock().retain(|(k, _)| *k != key);
    }

    /// Evaluate the query immediately, outside any notification
    pub fn query(&self) -> Result<QueryData> {
        LiveQueryUpdate {
            query: self.inner.query.clone(),
            state: self.inner.state.clone(),
        }
        .query()
    }

    /// Detach the live query from the cache and release retained state
    pub fn unsubscribe(&self) {
        self.registry
            .lock()
            .retain(|registered| !Arc::ptr_eq(registered, &self.inner));
        self.inner.subscribers.lock().clear();
    }
}
