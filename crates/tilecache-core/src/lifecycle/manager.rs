use std::collections::HashSet;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::widget::HostElement;

/// How many fresh ids we try before giving up on a collision streak.
pub const MAX_ID_ATTEMPTS: usize = 8;

/// Opaque token for one mounted map widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MapInstanceId(u64);

impl MapInstanceId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MapInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "map-{:016x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Unminted,
    Active,
    Released,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Could not mint a unique map instance id after {attempts} attempts")]
    IdSpaceExhausted { attempts: usize },
}

struct Registry {
    active: HashSet<MapInstanceId>,
    /// Ids are `salt ^ sequence`, so they look random but never repeat.
    salt: u64,
    /// Highest sequence handed out. Every id at or below it that is not
    /// active has been released.
    minted: u64,
}

impl Registry {
    fn sequence(&self, id: &MapInstanceId) -> u64 {
        id.0 ^ self.salt
    }
}

/// Registry of live map instances. Share it behind an `Arc`; every
/// transition happens under one lock. Memory is proportional to the number
/// of live instances, not to how many were ever minted.
pub struct LifecycleManager {
    registry: Mutex<Registry>,
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self::with_salt(rand::random::<u64>())
    }

    /// Deterministic ids for a given salt.
    pub fn with_salt(salt: u64) -> Self {
        Self::resuming_at(salt, 0)
    }

    /// Manager whose first `minted` sequence numbers count as already used.
    pub(crate) fn resuming_at(salt: u64, minted: u64) -> Self {
        Self {
            registry: Mutex::new(Registry {
                active: HashSet::new(),
                salt,
                minted,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mint and activate a new id.
    pub fn acquire(&self) -> Result<MapInstanceId, LifecycleError> {
        let mut registry = self.lock();
        for attempt in 1..=MAX_ID_ATTEMPTS {
            let Some(sequence) = registry.minted.checked_add(1) else {
                warn!(attempt, "Map instance id sequence exhausted");
                return Err(LifecycleError::IdSpaceExhausted { attempts: attempt });
            };
            registry.minted = sequence;
            let id = MapInstanceId(sequence ^ registry.salt);
            if registry.active.contains(&id) {
                warn!(%id, attempt, "Map instance id collision, regenerating");
                continue;
            }
            registry.active.insert(id);
            debug!(%id, active = registry.active.len(), "Map instance acquired");
            return Ok(id);
        }
        Err(LifecycleError::IdSpaceExhausted {
            attempts: MAX_ID_ATTEMPTS,
        })
    }

    /// Retire an id. Releasing something that is not active is a no-op.
    /// Returns whether the id was active.
    pub fn release(&self, id: &MapInstanceId) -> bool {
        let mut registry = self.lock();
        if registry.active.remove(id) {
            debug!(%id, active = registry.active.len(), "Map instance released");
            true
        } else {
            false
        }
    }

    pub fn is_active(&self, id: &MapInstanceId) -> bool {
        self.lock().active.contains(id)
    }

    pub fn state(&self, id: &MapInstanceId) -> InstanceState {
        let registry = self.lock();
        let sequence = registry.sequence(id);
        if registry.active.contains(id) {
            InstanceState::Active
        } else if sequence != 0 && sequence <= registry.minted {
            InstanceState::Released
        } else {
            InstanceState::Unminted
        }
    }

    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    /// Clear whatever a previous, no longer live, instance left on `host` so
    /// a new widget can claim it. A host held by a live instance is left
    /// untouched. Returns whether anything was scrubbed.
    pub fn reset(&self, host: &HostElement) -> bool {
        let scrubbed = host.scrub_unless_owned_by(|owner| self.is_active(owner));
        if scrubbed {
            info!(host = host.id(), "Scrubbed stale map state from host element");
        }
        scrubbed
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_acquire_activates() {
        let manager = LifecycleManager::new();
        let id = manager.acquire().unwrap();
        assert!(manager.is_active(&id));
        assert_eq!(manager.state(&id), InstanceState::Active);
        assert!(id.to_string().starts_with("map-"));
    }

    #[test]
    fn test_sequential_acquires_are_distinct() {
        let manager = LifecycleManager::new();
        let ids: HashSet<_> = (0..100).map(|_| manager.acquire().unwrap()).collect();
        assert_eq!(ids.len(), 100);
        assert_eq!(manager.active_count(), 100);
    }

    #[test]
    fn test_release_is_idempotent() {
        let manager = LifecycleManager::new();
        let keep = manager.acquire().unwrap();
        let id = manager.acquire().unwrap();

        assert!(manager.release(&id));
        let after_once = (manager.is_active(&id), manager.active_count(), manager.state(&id));
        assert!(!manager.release(&id));
        let after_twice = (manager.is_active(&id), manager.active_count(), manager.state(&id));

        assert_eq!(after_once, after_twice);
        assert_eq!(after_twice, (false, 1, InstanceState::Released));
        assert!(manager.is_active(&keep));
    }

    #[test]
    fn test_release_unknown_is_noop() {
        let manager = LifecycleManager::with_salt(0);
        assert!(!manager.release(&MapInstanceId(42)));
        assert_eq!(manager.state(&MapInstanceId(42)), InstanceState::Unminted);
    }

    #[test]
    fn test_ids_are_salted_sequence() {
        let manager = LifecycleManager::with_salt(0xff00);
        assert_eq!(manager.acquire().unwrap().as_u64(), 0xff01);
        assert_eq!(manager.acquire().unwrap().as_u64(), 0xff02);
        assert_eq!(manager.state(&MapInstanceId(0xff03)), InstanceState::Unminted);
    }

    #[test]
    fn test_collision_is_retried() {
        let manager = LifecycleManager::with_salt(0);
        manager.lock().active.insert(MapInstanceId(1));

        let id = manager.acquire().unwrap();
        assert_eq!(id.as_u64(), 2);
        assert_eq!(manager.active_count(), 2);
    }

    #[test]
    fn test_collision_exhaustion_is_error() {
        let manager = LifecycleManager::with_salt(0);
        for sequence in 1..=MAX_ID_ATTEMPTS as u64 {
            manager.lock().active.insert(MapInstanceId(sequence));
        }
        assert_eq!(
            manager.acquire(),
            Err(LifecycleError::IdSpaceExhausted {
                attempts: MAX_ID_ATTEMPTS
            })
        );
        assert_eq!(manager.active_count(), MAX_ID_ATTEMPTS);
    }

    #[test]
    fn test_sequence_overflow_is_error() {
        let manager = LifecycleManager::resuming_at(7, u64::MAX - 1);
        let last = manager.acquire().unwrap();
        assert_eq!(last.as_u64(), u64::MAX ^ 7);
        assert_eq!(manager.acquire(), Err(LifecycleError::IdSpaceExhausted { attempts: 1 }));
        assert!(manager.is_active(&last));
    }

    #[test]
    fn test_released_id_is_never_reactivated() {
        let manager = LifecycleManager::new();
        let first = manager.acquire().unwrap();
        manager.release(&first);

        let second = manager.acquire().unwrap();
        assert_ne!(second, first);
        assert_eq!(manager.state(&first), InstanceState::Released);
    }

    #[test]
    fn test_churn_keeps_bookkeeping_bounded() {
        let manager = LifecycleManager::new();
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let id = manager.acquire().unwrap();
            assert!(seen.insert(id));
            manager.release(&id);
        }

        assert_eq!(manager.active_count(), 0);
        assert!(manager.lock().active.capacity() < 64);
        assert!(seen.iter().all(|id| manager.state(id) == InstanceState::Released));
    }

    #[test]
    fn test_concurrent_acquire_release() {
        let manager = Arc::new(LifecycleManager::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                std::thread::spawn(move || {
                    let mut kept = Vec::new();
                    for i in 0..50 {
                        let id = manager.acquire().unwrap();
                        if i % 2 == 0 {
                            manager.release(&id);
                        } else {
                            kept.push(id);
                        }
                    }
                    kept
                })
            })
            .collect();

        let kept: Vec<_> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        let distinct: HashSet<_> = kept.iter().copied().collect();
        assert_eq!(distinct.len(), kept.len());
        assert_eq!(manager.active_count(), kept.len());
    }

    #[test]
    fn test_reset_scrubs_released_owner() {
        let manager = LifecycleManager::new();
        let host = HostElement::new("map");
        host.add_class("panel");

        let old = manager.acquire().unwrap();
        host.claim(&old).unwrap();
        host.add_class("tilecache-container");
        host.set_attribute("data-tilecache-instance", &old.to_string());
        manager.release(&old);

        assert!(manager.reset(&host));
        assert_eq!(host.owner(), None);
        assert!(!host.has_class("tilecache-container"));
        assert!(host.has_class("panel"));
        assert_eq!(host.attribute("data-tilecache-instance"), None);

        let new = manager.acquire().unwrap();
        assert!(host.claim(&new).is_ok());
    }

    #[test]
    fn test_reset_leaves_live_owner_alone() {
        let manager = LifecycleManager::new();
        let host = HostElement::new("map");
        let live = manager.acquire().unwrap();
        host.claim(&live).unwrap();
        host.add_class("tilecache-container");

        assert!(!manager.reset(&host));
        assert_eq!(host.owner(), Some(live));
        assert!(host.has_class("tilecache-container"));
    }

    #[test]
    fn test_reset_clean_host_is_noop() {
        let manager = LifecycleManager::new();
        let host = HostElement::new("map");
        host.add_class("panel");
        assert!(!manager.reset(&host));
        assert!(host.has_class("panel"));
    }

    #[test]
    fn test_reset_scrubs_markers_without_owner() {
        // A widget that crashed mid-construction can leave markers but no claim
        let manager = LifecycleManager::new();
        let host = HostElement::new("map");
        host.set_attribute("data-tilecache-zoom", "4");
        assert!(manager.reset(&host));
        assert_eq!(host.attribute("data-tilecache-zoom"), None);
    }
}
