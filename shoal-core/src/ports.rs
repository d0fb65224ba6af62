//! Listen port allocation for engine instances.
//!
//! Every engine binds its own listen port, so concurrent sessions need
//! distinct numbers. The allocator draws random candidates from a primary
//! range and tracks them in an in-use set guarded by its own mutex,
//! independent of the session map.
//!
//! When every draw collides, a port from a disjoint fallback range is
//! returned without uniqueness tracking. Under pathological load two engines
//! can then receive the same number; engine construction reports that as
//! [`crate::EngineError::Bind`], which callers may retry.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, warn};

use crate::config::PortConfig;

/// Hands out listen ports and tracks which ones are leased.
///
/// Cheap to clone; clones share the same in-use set.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    inner: Arc<AllocatorInner>,
}

#[derive(Debug)]
struct AllocatorInner {
    in_use: Mutex<HashSet<u16>>,
    config: PortConfig,
}

impl AllocatorInner {
    fn release(&self, port: u16) -> bool {
        self.in_use.lock().remove(&port)
    }
}

impl PortAllocator {
    /// Creates an allocator over the configured ranges.
    pub fn new(config: PortConfig) -> Self {
        Self {
            inner: Arc::new(AllocatorInner {
                in_use: Mutex::new(HashSet::new()),
                config,
            }),
        }
    }

    /// Leases a port.
    ///
    /// The returned lease releases the port when dropped or when
    /// [`PortLease::release`] is called, whichever happens first.
    pub fn allocate(&self) -> PortLease {
        let config = &self.inner.config;
        let mut rng = rand::rng();

        if !config.primary.is_empty() {
            let mut in_use = self.inner.in_use.lock();
            for _ in 0..config.max_attempts {
                let candidate = rng.random_range(config.primary.clone());
                if in_use.insert(candidate) {
                    debug!(port = candidate, "Leased port");
                    return PortLease::tracked(candidate, self.inner.clone());
                }
            }
        }

        let port = if config.fallback.is_empty() {
            config.primary.start
        } else {
            rng.random_range(config.fallback.clone())
        };
        warn!(
            port,
            attempts = config.max_attempts,
            "Primary port range exhausted, using untracked fallback port"
        );
        PortLease::untracked(port)
    }

    /// Returns a port to the pool.
    ///
    /// Idempotent: releasing a port that is not leased is a no-op.
    pub fn release(&self, port: u16) {
        if self.inner.release(port) {
            debug!(port, "Released port");
        }
    }

    /// Checks whether `port` is currently leased from the primary range.
    pub fn is_in_use(&self, port: u16) -> bool {
        self.inner.in_use.lock().contains(&port)
    }

    /// Number of ports currently leased from the primary range.
    pub fn in_use_count(&self) -> usize {
        self.inner.in_use.lock().len()
    }
}

/// Exclusive claim on a listen port.
#[derive(Debug)]
pub struct PortLease {
    port: u16,
    owner: Option<Arc<AllocatorInner>>,
    released: AtomicBool,
}

impl PortLease {
    fn tracked(port: u16, owner: Arc<AllocatorInner>) -> Self {
        Self {
            port,
            owner: Some(owner),
            released: AtomicBool::new(false),
        }
    }

    fn untracked(port: u16) -> Self {
        Self {
            port,
            owner: None,
            released: AtomicBool::new(false),
        }
    }

    /// The leased port number.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether this lease came from the untracked fallback range.
    pub fn is_fallback(&self) -> bool {
        self.owner.is_none()
    }

    /// Returns the port to the pool. Later calls and the eventual drop are
    /// no-ops.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(owner) = &self.owner
            && owner.release(self.port)
        {
            debug!(port = self.port, "Released port");
        }
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        self.release();
    }
}
