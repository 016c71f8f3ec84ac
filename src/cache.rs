//! Time-to-live caching shared by every collector.

use crate::error::CollectError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    value: Option<T>,
    captured_at: Option<Instant>,
}

impl<T> Default for CacheEntry<T> {
    fn default() -> Self {
        Self {
            value: None,
            captured_at: None,
        }
    }
}

impl<T> CacheEntry<T> {
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn captured_at(&self) -> Option<Instant> {
        self.captured_at
    }
}

/// A single cached value with a fixed time-to-live.
#[derive(Debug, Clone)]
pub struct TtlCell<T> {
    ttl: Duration,
    entry: CacheEntry<T>,
}

impl<T> TtlCell<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: CacheEntry::default(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The stored value if it is younger than the TTL.
    pub fn fresh(&self) -> Option<&T> {
        let at = self.entry.captured_at?;
        if Instant::now().saturating_duration_since(at) < self.ttl {
            self.entry.value.as_ref()
        } else {
            None
        }
    }

    /// The stored value regardless of age.
    pub fn last(&self) -> Option<&T> {
        self.entry.value.as_ref()
    }

    pub fn store(&mut self, value: T) {
        let now = Instant::now();
        // Instant is monotonic, but keep the invariant explicit.
        let at = match self.entry.captured_at {
            Some(prev) if prev > now => prev,
            _ => now,
        };
        self.entry = CacheEntry {
            value: Some(value),
            captured_at: Some(at),
        };
    }

    pub fn clear(&mut self) {
        self.entry = CacheEntry::default();
    }

    pub fn entry(&self) -> &CacheEntry<T> {
        &self.entry
    }
}

/// A metric domain that can be sampled.
#[async_trait]
pub trait Collect: Send {
    type Output: Clone + Send;

    const NAME: &'static str;

    /// Samples the domain. May perform I/O and may fail.
    async fn collect(&mut self) -> Result<Self::Output, CollectError>;

    /// Value handed out when collection fails and nothing was cached before.
    fn fallback(&self, err: &CollectError) -> Self::Output;
}

/// Wraps a collector with a TTL cache.
///
/// `get` never fails: a failed collection falls back to the previous value,
/// or to the collector's sentinel when there is none.
pub struct Cached<C: Collect> {
    collector: C,
    cell: TtlCell<C::Output>,
}

impl<C: Collect> Cached<C> {
    pub fn new(collector: C, ttl: Duration) -> Self {
        Self {
            collector,
            cell: TtlCell::new(ttl),
        }
    }

    pub async fn get(&mut self) -> C::Output {
        if let Some(value) = self.cell.fresh() {
            return value.clone();
        }

        match self.collector.collect().await {
            Ok(value) => {
                debug!(collector = C::NAME, "collected fresh value");
                self.cell.store(value.clone());
                value
            }
            Err(err) => {
                warn!(collector = C::NAME, error = %err, "collection failed");
                if let Some(prev) = self.cell.last() {
                    return prev.clone();
                }
                let value = self.collector.fallback(&err);
                self.cell.store(value.clone());
                value
            }
        }
    }

    pub fn clear_cache(&mut self) {
        self.cell.clear();
    }

    pub fn ttl(&self) -> Duration {
        self.cell.ttl()
    }

    pub fn collector(&self) -> &C {
        &self.collector
    }

    pub fn collector_mut(&mut self) -> &mut C {
        &mut self.collector
    }
}
