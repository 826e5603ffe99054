//! Simulated Object Store with Fault Injection
//!
//! Wraps another store and fails operations either at random (seeded, so a
//! failing run can be replayed) or for specific keys. Used to drive the
//! transfer-failure paths of commit.

use crate::staging::object_store::{ObjectBody, ObjectMeta, ObjectStore, StoreFuture};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;
use std::io::{Error as IoError, ErrorKind};
use std::sync::Arc;

/// Configuration for simulated fault injection
#[derive(Debug, Clone)]
pub struct SimulatedStoreConfig {
    /// Probability of PUT operation failure
    pub put_fail_prob: f64,
    /// Probability of GET operation failure
    pub get_fail_prob: f64,
}

impl Default for SimulatedStoreConfig {
    fn default() -> Self {
        SimulatedStoreConfig {
            put_fail_prob: 0.01, // 1%
            get_fail_prob: 0.01, // 1%
        }
    }
}

impl SimulatedStoreConfig {
    /// No random faults; only keys registered with `fail_key` fail
    pub fn no_faults() -> Self {
        SimulatedStoreConfig {
            put_fail_prob: 0.0,
            get_fail_prob: 0.0,
        }
    }
}

/// Statistics for fault injection
#[derive(Debug, Clone, Default)]
pub struct SimulatedStoreStats {
    pub put_attempts: u64,
    pub put_failures: u64,
    pub get_attempts: u64,
    pub get_failures: u64,
}

struct SimulatedStoreInner {
    rng: ChaCha8Rng,
    stats: SimulatedStoreStats,
    failing_keys: HashSet<String>,
}

/// Object store wrapper that injects faults
#[derive(Clone)]
pub struct SimulatedObjectStore<S: ObjectStore> {
    inner_store: S,
    config: SimulatedStoreConfig,
    state: Arc<Mutex<SimulatedStoreInner>>,
}

impl<S: ObjectStore> SimulatedObjectStore<S> {
    /// Create a new simulated store seeded with `seed`
    pub fn new(inner_store: S, seed: u64, config: SimulatedStoreConfig) -> Self {
        SimulatedObjectStore {
            inner_store,
            config,
            state: Arc::new(Mutex::new(SimulatedStoreInner {
                rng: ChaCha8Rng::seed_from_u64(seed),
                stats: SimulatedStoreStats::default(),
                failing_keys: HashSet::new(),
            })),
        }
    }

    /// Make every PUT of `key` fail
    pub fn fail_key(&self, key: &str) {
        self.state.lock().failing_keys.insert(key.to_string());
    }

    /// Get current statistics
    pub fn stats(&self) -> SimulatedStoreStats {
        self.state.lock().stats.clone()
    }

    pub fn inner(&self) -> &S {
        &self.inner_store
    }
}

impl<S: ObjectStore> ObjectStore for SimulatedObjectStore<S> {
    fn put<'a>(
        &'a self,
        key: &'a str,
        body: ObjectBody,
        size: u64,
        content_type: &'a str,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let should_fail = {
                let mut s = self.state.lock();
                s.stats.put_attempts += 1;
                let fail = s.failing_keys.contains(key) || s.rng.gen_bool(self.config.put_fail_prob);
                if fail {
                    s.stats.put_failures += 1;
                }
                fail
            };
            if should_fail {
                return Err(IoError::new(ErrorKind::Other, "simulated put failure"));
            }

            self.inner_store.put(key, body, size, content_type).await
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<u8>> {
        Box::pin(async move {
            let should_fail = {
                let mut s = self.state.lock();
                s.stats.get_attempts += 1;
                let fail = s.rng.gen_bool(self.config.get_fail_prob);
                if fail {
                    s.stats.get_failures += 1;
                }
                fail
            };
            if should_fail {
                return Err(IoError::new(ErrorKind::Other, "simulated get failure"));
            }

            self.inner_store.get(key).await
        })
    }

    fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        self.inner_store.exists(key)
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        self.inner_store.delete(key)
    }

    fn head<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ObjectMeta> {
        self.inner_store.head(key)
    }
}
