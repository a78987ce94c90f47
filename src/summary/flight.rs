use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared};

type Flight<T> = Shared<BoxFuture<'static, T>>;

struct Entry<T> {
    id: u64,
    waiters: usize,
    flight: Flight<T>,
}

/// Collapses concurrent calls for the same key into one execution.
///
/// The first caller for a key starts the work; everyone arriving while it is
/// in flight awaits the same shared future and receives a clone of its
/// output. The entry is removed once the flight finishes, or when its last
/// waiter is dropped, which abandons the work.
pub struct SingleFlight<T: Clone> {
    flights: Mutex<HashMap<String, Entry<T>>>,
    next_id: AtomicU64,
}

/// Counts one caller against an entry; dropping it releases the entry.
struct Waiter<'a, T: Clone> {
    owner: &'a SingleFlight<T>,
    key: &'a str,
    id: u64,
}

impl<T: Clone> Drop for Waiter<'_, T> {
    fn drop(&mut self) {
        let mut table = self.owner.table();
        let Some(entry) = table.get_mut(self.key).filter(|entry| entry.id == self.id) else {
            return;
        };
        entry.waiters -= 1;
        if entry.waiters == 0 {
            table.remove(self.key);
        }
    }
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> SingleFlight<T> {
    fn table(&self) -> MutexGuard<'_, HashMap<String, Entry<T>>> {
        match self.flights.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            flights: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Run `make()` for `key` unless a flight for it is already running.
    pub async fn run<F, Fut>(&self, key: &str, make: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (waiter, flight) = {
            let mut table = self.table();
            let entry = table.entry(key.to_string()).or_insert_with(|| Entry {
                id: self.next_id.fetch_add(1, Ordering::Relaxed),
                waiters: 0,
                flight: make().boxed().shared(),
            });
            entry.waiters += 1;
            let waiter = Waiter {
                owner: self,
                key,
                id: entry.id,
            };
            (waiter, entry.flight.clone())
        };

        let output = flight.await;

        let mut table = self.table();
        if table.get(key).is_some_and(|entry| entry.id == waiter.id) {
            table.remove(key);
        }
        drop(table);
        output
    }

    /// Number of keys currently in flight.
    pub fn in_flight(&self) -> usize {
        self.table().len()
    }
}
