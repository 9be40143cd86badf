//! # Per-Product Lock Registry
//!
//! SQLite has no `SELECT … FOR UPDATE`, so the row lock a relational
//! checkout would take on product rows is replaced by an application-level
//! mutex keyed by `(tenant, product)`.
//!
//! ## Serialization Property
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Checkout A: products {P1, P2}   ──┐                                    │
//! │  Checkout B: products {P2, P3}   ──┼── overlap on P2 → B waits for A    │
//! │  Checkout C: products {P4}       ──┘   disjoint → C runs in parallel    │
//! │                                                                         │
//! │  Locks are acquired in sorted key order, so two checkouts can never     │
//! │  hold-and-wait in opposite orders (no deadlock).                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The lock guards the *decision* (can we sell N?), not the write —
//! appending to the ledger is always safe. Locks are acquired before the
//! transaction opens and held until after commit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of per-product async mutexes, shared by all engine handles.
#[derive(Debug, Clone, Default)]
pub struct ProductLocks {
    inner: Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>,
}

/// Guards for one checkout's product set. Dropping releases every lock.
#[derive(Debug)]
pub struct LockSet {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl ProductLocks {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the locks for `product_ids` under `tenant_id`, deduplicated
    /// and in sorted order.
    pub async fn lock_products<I, S>(&self, tenant_id: &str, product_ids: I) -> LockSet
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keys: Vec<String> = product_ids
            .into_iter()
            .map(|p| format!("{tenant_id}\u{1f}{}", p.as_ref()))
            .collect();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            let handle = self.handle(&key);
            guards.push(handle.lock_owned().await);
        }
        LockSet { _guards: guards }
    }

    fn handle(&self, key: &str) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().expect("lock registry poisoned");
        map.entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
