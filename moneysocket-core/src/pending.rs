//! Pending request table: request references awaiting a correlated response.
//!
//! # Thread Safety
//!
//! The table uses a `Mutex` internally. Lock poisoning is recovered from, since
//! every operation leaves the map in a consistent state.

use crate::{LayerError, Result};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug)]
struct Entry<C> {
    issued_at: Instant,
    context: C,
}

/// Maps outstanding request references to the context they were issued for.
///
/// With a timeout set, entries older than the timeout are abandoned: they are
/// pruned before every operation, free their slot, and a late response to
/// them is treated as unmatched.
#[derive(Debug)]
pub struct PendingRequests<C> {
    entries: Mutex<HashMap<Uuid, Entry<C>>>,
    limit: usize,
    timeout: Option<Duration>,
}

impl<C> PendingRequests<C> {
    /// Create a table that holds at most `limit` outstanding requests.
    pub fn new(limit: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            limit,
            timeout: None,
        }
    }

    /// Create a table whose entries expire after `timeout`.
    pub fn with_timeout(limit: usize, timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::new(limit)
        }
    }

    /// Allocate a fresh request reference for `context`.
    ///
    /// References are unique among the currently pending ones.
    pub fn insert(&self, context: C) -> Result<Uuid> {
        let mut entries = self.lock_pruned();
        if entries.len() >= self.limit {
            return Err(LayerError::TooManyPending { limit: self.limit });
        }

        let mut reference = Uuid::new_v4();
        while entries.contains_key(&reference) {
            reference = Uuid::new_v4();
        }
        entries.insert(
            reference,
            Entry {
                issued_at: Instant::now(),
                context,
            },
        );
        Ok(reference)
    }

    /// Remove and return the context for a response's reference.
    ///
    /// `None` means the response is unmatched and should be dropped.
    pub fn take(&self, reference: &Uuid) -> Option<C> {
        self.lock_pruned()
            .remove(reference)
            .map(|entry| entry.context)
    }

    /// Drop a request that could not be sent.
    pub fn cancel(&self, reference: &Uuid) -> bool {
        self.take(reference).is_some()
    }

    pub fn contains(&self, reference: &Uuid) -> bool {
        self.lock_pruned().contains_key(reference)
    }

    pub fn len(&self) -> usize {
        self.lock_pruned().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn lock_pruned(&self) -> MutexGuard<'_, HashMap<Uuid, Entry<C>>> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(timeout) = self.timeout {
            entries.retain(|_, entry| entry.issued_at.elapsed() < timeout);
        }
        entries
    }
}
