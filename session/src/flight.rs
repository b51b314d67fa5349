//! Single-flight cache for in-flight async operations.
//!
//! DESIGN
//! ======
//! Each key maps to one `Shared` future. The first caller for a key starts
//! the operation; callers arriving while it is outstanding await a clone of
//! the same future and observe the same output. Any caller that sees the
//! operation complete evicts the entry, so the next call starts fresh.
//!
//! If the starting caller is dropped mid-flight the shared future survives
//! in the map and is driven by whichever caller polls it next.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

pub struct SingleFlight<K, T>
where
    T: Clone,
{
    inflight: Mutex<HashMap<K, Shared<BoxFuture<'static, T>>>>,
}

impl<K, T> SingleFlight<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self { inflight: Mutex::new(HashMap::new()) }
    }

    /// Run `start()` under `key`, or join the call already in flight.
    pub async fn run<F, Fut>(&self, key: K, start: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let flight = {
            let mut inflight = self.lock();
            inflight
                .entry(key.clone())
                .or_insert_with(|| start().boxed().shared())
                .clone()
        };

        let output = flight.await;

        let mut inflight = self.lock();
        if inflight.get(&key).is_some_and(|current| current.peek().is_some()) {
            inflight.remove(&key);
        }
        output
    }

    /// True while an operation for `key` is outstanding.
    #[must_use]
    pub fn in_flight(&self, key: &K) -> bool {
        self.lock().get(key).is_some_and(|current| current.peek().is_none())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Shared<BoxFuture<'static, T>>>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, T> Default for SingleFlight<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "flight_test.rs"]
mod tests;
