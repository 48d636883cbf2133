use crate::{error::ResourceError, memory::MemoryMonitor};
use engine_config::settings::resource::ResourceConfig;
use serde::Serialize;
use std::{
    collections::HashMap,
    ops::{Deref, DerefMut},
    sync::{
        Arc, Mutex, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug)]
struct Entry {
    name: String,
    created: Instant,
    released: Arc<AtomicBool>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: Mutex<HashMap<Uuid, Entry>>,
    total_created: AtomicU64,
    total_cleaned: AtomicU64,
    force_cleaned: AtomicU64,
    shut_down: AtomicBool,
}

impl Inner {
    /// Counts a release once, whichever side (guard or sweep) gets there first.
    fn release(&self, id: Uuid, released: &AtomicBool, forced: bool) -> bool {
        if released.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(&id);
        }
        self.total_cleaned.fetch_add(1, Ordering::Relaxed);
        if forced {
            self.force_cleaned.fetch_add(1, Ordering::Relaxed);
        }
        true
    }

    fn sweep(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let expired: Vec<(Uuid, String, Arc<AtomicBool>)> = match self.entries.lock() {
            Ok(entries) => entries
                .iter()
                .filter(|(_, e)| now.duration_since(e.created) >= max_age)
                .map(|(id, e)| (*id, e.name.clone(), e.released.clone()))
                .collect(),
            Err(_) => return 0,
        };

        let mut cleaned = 0;
        for (id, name, released) in expired {
            if self.release(id, &released, true) {
                warn!(resource_id = %id, name = %name, "Force-released expired resource");
                cleaned += 1;
            }
        }
        cleaned
    }

    fn active(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResourceStats {
    pub active: usize,
    pub total_created: u64,
    pub total_cleaned: u64,
    pub force_cleaned: u64,
}

/// Scoped handle. Dropping it releases the resource exactly once.
#[derive(Debug)]
pub struct ResourceGuard<T = ()> {
    id: Uuid,
    name: String,
    payload: T,
    released: Arc<AtomicBool>,
    manager: Weak<Inner>,
}

impl<T> ResourceGuard<T> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once the handle has been released, including by a forced sweep.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl<T> Deref for ResourceGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.payload
    }
}

impl<T> DerefMut for ResourceGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.payload
    }
}

impl<T> Drop for ResourceGuard<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.manager.upgrade()
            && inner.release(self.id, &self.released, false)
        {
            debug!(resource_id = %self.id, name = %self.name, "Released resource");
        }
    }
}

/// Tracks scoped handles used during batch execution.
///
/// Handles are released when their guard drops; a background sweep and
/// memory-triggered reclamation catch anything that outlives its maximum age.
#[derive(Debug)]
pub struct ResourceManager {
    inner: Arc<Inner>,
    config: ResourceConfig,
    sweeper: Mutex<Option<CancellationToken>>,
}

impl ResourceManager {
    pub fn new(config: ResourceConfig) -> Self {
        Self {
            inner: Arc::new(Inner::default()),
            config,
            sweeper: Mutex::new(None),
        }
    }

    pub fn acquire(&self, name: impl Into<String>) -> Result<ResourceGuard<()>, ResourceError> {
        self.acquire_with(name, ())
    }

    pub fn acquire_with<T>(
        &self,
        name: impl Into<String>,
        payload: T,
    ) -> Result<ResourceGuard<T>, ResourceError> {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return Err(ResourceError::ShutDown);
        }

        let id = Uuid::new_v4();
        let name = name.into();
        let released = Arc::new(AtomicBool::new(false));

        if let Ok(mut entries) = self.inner.entries.lock() {
            entries.insert(
                id,
                Entry {
                    name: name.clone(),
                    created: Instant::now(),
                    released: released.clone(),
                },
            );
        }
        self.inner.total_created.fetch_add(1, Ordering::Relaxed);
        debug!(resource_id = %id, name = %name, "Acquired resource");

        Ok(ResourceGuard {
            id,
            name,
            payload,
            released,
            manager: Arc::downgrade(&self.inner),
        })
    }

    pub fn stats(&self) -> ResourceStats {
        ResourceStats {
            active: self.inner.active(),
            total_created: self.inner.total_created.load(Ordering::Relaxed),
            total_cleaned: self.inner.total_cleaned.load(Ordering::Relaxed),
            force_cleaned: self.inner.force_cleaned.load(Ordering::Relaxed),
        }
    }

    pub fn active_count(&self) -> usize {
        self.inner.active()
    }

    /// Force-releases every handle older than `max_age`.
    pub fn cleanup_expired(&self, max_age: Duration) -> usize {
        self.inner.sweep(max_age)
    }

    /// Sweeps with half the normal age limit while memory is above the cleanup threshold.
    pub fn reclaim_under_pressure(&self, monitor: &MemoryMonitor) -> usize {
        let pressure = monitor.pressure();
        if pressure < self.config.memory_cleanup_threshold {
            return 0;
        }

        let cleaned = self.inner.sweep(self.config.max_resource_age() / 2);
        if cleaned > 0 {
            info!(pressure, cleaned, "Reclaimed resources under memory pressure");
        }
        cleaned
    }

    /// Starts the periodic sweep if auto cleanup is enabled and a runtime is available.
    pub fn start_auto_cleanup(&self) {
        if !self.config.auto_cleanup_enabled || self.inner.shut_down.load(Ordering::Acquire) {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let Ok(mut sweeper) = self.sweeper.lock() else {
            return;
        };
        if sweeper.is_some() {
            return;
        }

        let token = CancellationToken::new();
        let weak = Arc::downgrade(&self.inner);
        let interval = self.config.cleanup_interval();
        let max_age = self.config.max_resource_age();
        let cancel = token.clone();

        handle.spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        let Some(inner) = weak.upgrade() else { break };
                        inner.sweep(max_age);
                    }
                }
            }
        });

        *sweeper = Some(token);
        debug!(interval_secs = interval.as_secs(), "Started resource sweep");
    }

    /// Releases every handle and stops the sweep. Safe to call repeatedly.
    pub fn cleanup(&self) -> usize {
        let first = !self.inner.shut_down.swap(true, Ordering::AcqRel);

        if let Ok(mut sweeper) = self.sweeper.lock()
            && let Some(token) = sweeper.take()
        {
            token.cancel();
        }

        let cleaned = self.inner.sweep(Duration::ZERO);
        if first {
            info!(cleaned, "Resource manager cleaned up");
        }
        cleaned
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        if let Ok(mut sweeper) = self.sweeper.lock()
            && let Some(token) = sweeper.take()
        {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn manager() -> ResourceManager {
        ResourceManager::new(ResourceConfig::default())
    }

    #[test]
    fn nested_scopes_release_everything() {
        let rm = manager();
        {
            let _outer = rm.acquire("outer").unwrap();
            {
                let _inner = rm.acquire("inner").unwrap();
                assert_eq!(rm.active_count(), 2);
            }
            assert_eq!(rm.active_count(), 1);
        }

        let stats = rm.stats();
        assert_eq!(stats.active, 0);
        assert_eq!(stats.total_created, 2);
        assert_eq!(stats.total_cleaned, 2);
    }

    #[test]
    fn release_happens_on_panic_unwind() {
        let rm = manager();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = rm.acquire("doomed").unwrap();
            panic!("batch failed");
        }));

        assert!(result.is_err());
        assert_eq!(rm.active_count(), 0);
    }

    #[test]
    fn payload_is_reachable_through_guard() {
        let rm = manager();
        let mut buffer = rm.acquire_with("buffer", Vec::<u32>::new()).unwrap();
        buffer.push(7);
        assert_eq!(*buffer, vec![7]);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_handles_are_force_released_once() {
        let rm = manager();
        let guard = rm.acquire("leaky").unwrap();

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(rm.cleanup_expired(Duration::from_secs(5)), 1);
        assert!(guard.is_released());

        drop(guard);
        let stats = rm.stats();
        assert_eq!(stats.total_cleaned, 1);
        assert_eq!(stats.force_cleaned, 1);
        assert_eq!(stats.active, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn background_sweep_collects_leaked_handles() {
        let rm = manager();
        rm.start_auto_cleanup();
        let leaked = rm.acquire("leaked").unwrap();

        tokio::time::sleep(Duration::from_secs(331)).await;

        assert!(leaked.is_released());
        assert_eq!(rm.active_count(), 0);
    }

    #[test]
    fn cleanup_is_idempotent() {
        let rm = manager();
        let _a = rm.acquire("a").unwrap();

        assert_eq!(rm.cleanup(), 1);
        assert_eq!(rm.cleanup(), 0);
        assert_eq!(rm.active_count(), 0);
        assert!(matches!(rm.acquire("late"), Err(ResourceError::ShutDown)));
    }

    proptest! {
        #[test]
        fn any_scope_sequence_leaves_nothing_active(ops in proptest::collection::vec(any::<bool>(), 0..64)) {
            let rm = manager();
            let mut stack = Vec::new();
            for push in ops {
                if push {
                    stack.push(rm.acquire("scope").unwrap());
                } else {
                    stack.pop();
                }
            }
            drop(stack);

            let stats = rm.stats();
            prop_assert_eq!(stats.active, 0);
            prop_assert_eq!(stats.total_cleaned, stats.total_created);
        }
    }
}
