//! Request deduplication
//!
//! For any request key, at most one computation is in flight at a time.
//! The first caller becomes the leader and computes; concurrent callers
//! block until the leader broadcasts its outcome. The registry entry is
//! removed on completion, success or failure, so a later request starts
//! fresh.

use crossbeam_channel::{bounded, Sender};
use std::collections::HashMap;
use std::sync::Mutex;

type Outcome<T> = std::result::Result<T, String>;

/// Single-flight registry for blocking computations
///
/// `T` must be cloneable so one result can be handed to every waiter.
/// Failures are broadcast as strings; callers that need a typed error
/// re-wrap at their own boundary.
pub struct SingleFlight<T: Clone + Send> {
    waiters: Mutex<HashMap<String, Vec<Sender<Outcome<T>>>>>,
}

impl<T: Clone + Send> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Run `compute` under the given key, or wait for the identical
    /// in-flight computation to finish.
    ///
    /// The leader runs `compute` without holding the registry lock, so
    /// long computations never block unrelated keys.
    pub fn run<F>(&self, key: &str, compute: F) -> Outcome<T>
    where
        F: FnOnce() -> Outcome<T>,
    {
        // Register as leader or waiter
        let receiver = {
            let mut waiters = match self.waiters.lock() {
                Ok(w) => w,
                Err(poisoned) => poisoned.into_inner(),
            };
            match waiters.get_mut(key) {
                Some(list) => {
                    let (tx, rx) = bounded(1);
                    list.push(tx);
                    Some(rx)
                }
                None => {
                    waiters.insert(key.to_string(), Vec::new());
                    None
                }
            }
        };

        if let Some(rx) = receiver {
            return match rx.recv() {
                Ok(outcome) => outcome,
                // Leader died without broadcasting (panicked)
                Err(_) => Err("in-flight computation aborted".to_string()),
            };
        }

        let outcome = compute();

        // Remove the entry and broadcast, success or failure
        let pending = {
            let mut waiters = match self.waiters.lock() {
                Ok(w) => w,
                Err(poisoned) => poisoned.into_inner(),
            };
            waiters.remove(key).unwrap_or_default()
        };
        for tx in pending {
            let _ = tx.send(outcome.clone());
        }

        outcome
    }

    /// Number of distinct keys currently in flight
    pub fn in_flight(&self) -> usize {
        match self.waiters.lock() {
            Ok(w) => w.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn single_caller_computes() {
        let flight: SingleFlight<u32> = SingleFlight::new();
        let result = flight.run("k", || Ok(7)).unwrap();
        assert_eq!(result, 7);
        assert_eq!(flight.in_flight(), 0);
    }

    #[test]
    fn concurrent_callers_share_one_computation() {
        let flight: Arc<SingleFlight<u32>> = Arc::new(SingleFlight::new());
        let computations = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flight = flight.clone();
            let computations = computations.clone();
            handles.push(thread::spawn(move || {
                flight.run("same-key", || {
                    computations.fetch_add(1, Ordering::SeqCst);
                    // Hold the flight open long enough for every thread
                    // to register as a waiter
                    thread::sleep(Duration::from_millis(50));
                    Ok(42)
                })
            }));
        }

        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), 42);
        }
        assert_eq!(computations.load(Ordering::SeqCst), 1);
        assert_eq!(flight.in_flight(), 0);
    }

    #[test]
    fn distinct_keys_compute_independently() {
        let flight: Arc<SingleFlight<u32>> = Arc::new(SingleFlight::new());
        let computations = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..4 {
            let flight = flight.clone();
            let computations = computations.clone();
            handles.push(thread::spawn(move || {
                flight.run(&format!("key-{}", i), || {
                    computations.fetch_add(1, Ordering::SeqCst);
                    Ok(i)
                })
            }));
        }
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        assert_eq!(computations.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn failure_is_broadcast_and_entry_removed() {
        let flight: Arc<SingleFlight<u32>> = Arc::new(SingleFlight::new());

        let leader = {
            let flight = flight.clone();
            thread::spawn(move || {
                flight.run("k", || {
                    thread::sleep(Duration::from_millis(50));
                    Err("analyser exploded".to_string())
                })
            })
        };
        thread::sleep(Duration::from_millis(10));
        let waiter = {
            let flight = flight.clone();
            thread::spawn(move || flight.run("k", || Ok(1)))
        };

        assert!(leader.join().unwrap().is_err());
        // The waiter either observed the broadcast failure or, if it
        // registered after completion, became a fresh leader
        let waited = waiter.join().unwrap();
        assert!(waited == Err("analyser exploded".to_string()) || waited == Ok(1));

        // Entry is gone: a new run computes again
        assert_eq!(flight.run("k", || Ok(9)).unwrap(), 9);
        assert_eq!(flight.in_flight(), 0);
    }
}
