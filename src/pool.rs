//! Bounded pool of layout-engine instances.
//!
//! The engine is the scarce, stateful resource: one instance serves at most
//! one render at a time. A lease grants exclusive use until it is dropped.
//! Leases from failed or timed-out renders are discarded instead of returned,
//! because partially navigated engine state is not reliable to reset in
//! place; the pool simply creates a fresh instance for the next caller.

use crate::engine::LayoutEngine;
use crate::error::RenderError;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;

type EngineFactory = dyn Fn() -> Box<dyn LayoutEngine> + Send + Sync;

struct PoolState {
    idle: Vec<Box<dyn LayoutEngine>>,
    // Instances in existence, idle or leased.
    live: usize,
    closed: bool,
}

pub struct EnginePool {
    state: Mutex<PoolState>,
    available: Condvar,
    factory: Box<EngineFactory>,
    capacity: usize,
}

impl EnginePool {
    pub fn new(
        capacity: usize,
        factory: impl Fn() -> Box<dyn LayoutEngine> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                live: 0,
                closed: false,
            }),
            available: Condvar::new(),
            factory: Box::new(factory),
            capacity: capacity.max(1),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Block until an instance is free or `deadline` passes. The pool itself
    /// never retries; exhaustion surfaces as `Timeout` for the caller to
    /// handle.
    pub fn acquire(self: &Arc<Self>, deadline: Instant) -> Result<EngineLease, RenderError> {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(_) => return Err(RenderError::PoolClosed),
        };
        loop {
            if state.closed {
                return Err(RenderError::PoolClosed);
            }
            if let Some(engine) = state.idle.pop() {
                return Ok(EngineLease::new(Arc::clone(self), engine));
            }
            if state.live < self.capacity {
                state.live += 1;
                drop(state);
                let engine = (self.factory)();
                return Ok(EngineLease::new(Arc::clone(self), engine));
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(RenderError::Timeout { elapsed_ms: 0 });
            }
            let (next, result) = match self.available.wait_timeout(state, deadline - now) {
                Ok(pair) => pair,
                Err(_) => return Err(RenderError::PoolClosed),
            };
            state = next;
            if result.timed_out() && state.idle.is_empty() && state.live >= self.capacity {
                return Err(RenderError::Timeout { elapsed_ms: 0 });
            }
        }
    }

    /// Shut the pool down: idle instances are dropped and waiting callers get
    /// `PoolClosed`.
    pub fn close(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.closed = true;
            state.idle.clear();
        }
        self.available.notify_all();
    }

    fn release(&self, engine: Box<dyn LayoutEngine>) {
        if let Ok(mut state) = self.state.lock() {
            if state.closed {
                state.live = state.live.saturating_sub(1);
            } else {
                state.idle.push(engine);
            }
        }
        self.available.notify_one();
    }

    fn forget(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.live = state.live.saturating_sub(1);
        }
        self.available.notify_one();
    }
}

/// Exclusive use of one engine instance. Dropping the lease returns the
/// instance to the pool unless it was marked discarded.
pub struct EngineLease {
    pool: Arc<EnginePool>,
    engine: Option<Box<dyn LayoutEngine>>,
    discarded: bool,
}

impl EngineLease {
    fn new(pool: Arc<EnginePool>, engine: Box<dyn LayoutEngine>) -> Self {
        Self {
            pool,
            engine: Some(engine),
            discarded: false,
        }
    }

    pub fn engine(&mut self) -> &mut dyn LayoutEngine {
        self.engine
            .as_mut()
            .expect("engine present until drop")
            .as_mut()
    }

    /// Mark the instance as unfit for reuse. It is torn down on drop and the
    /// pool slot becomes free for a fresh instance.
    pub fn discard(&mut self) {
        self.discarded = true;
    }
}

impl Drop for EngineLease {
    fn drop(&mut self) {
        let Some(engine) = self.engine.take() else {
            return;
        };
        if self.discarded {
            drop(engine);
            self.pool.forget();
        } else {
            self.pool.release(engine);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FlowEngine;
    use std::time::Duration;

    fn pool(capacity: usize) -> Arc<EnginePool> {
        EnginePool::new(capacity, || Box::new(FlowEngine::new()))
    }

    fn soon() -> Instant {
        Instant::now() + Duration::from_millis(50)
    }

    #[test]
    fn acquire_up_to_capacity_then_timeout() {
        let pool = pool(2);
        let a = pool.acquire(soon()).unwrap();
        let _b = pool.acquire(soon()).unwrap();
        assert!(matches!(
            pool.acquire(soon()),
            Err(RenderError::Timeout { .. })
        ));
        drop(a);
        assert!(pool.acquire(soon()).is_ok());
    }

    #[test]
    fn discarded_lease_frees_the_slot() {
        let pool = pool(1);
        let mut lease = pool.acquire(soon()).unwrap();
        lease.discard();
        drop(lease);
        assert!(pool.acquire(soon()).is_ok());
    }

    #[test]
    fn closed_pool_rejects_acquire() {
        let pool = pool(1);
        pool.close();
        assert!(matches!(pool.acquire(soon()), Err(RenderError::PoolClosed)));
    }

    #[test]
    fn blocked_acquire_wakes_on_release() {
        let pool = pool(1);
        let lease = pool.acquire(soon()).unwrap();
        let waiter = {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || pool.acquire(Instant::now() + Duration::from_secs(5)))
        };
        std::thread::sleep(Duration::from_millis(20));
        drop(lease);
        assert!(waiter.join().unwrap().is_ok());
    }
}
