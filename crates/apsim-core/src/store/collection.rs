// ── Reactive entity collection ──
//
// Insertion-ordered storage for one entity kind with an identity index
// and push-based change notification via `watch` channels.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::watch;

use crate::model::{Entity, EntityHandle, EntityKind, Identity, LocalId};

/// All entities of a single kind.
///
/// Every mutation bumps a version counter and rebuilds the snapshot that
/// subscribers receive. Iteration order is insertion order, which is what
/// FIFO promotion relies on.
pub(crate) struct EntityCollection {
    kind: EntityKind,

    /// Primary storage, in insertion order.
    by_handle: IndexMap<EntityHandle, Arc<Entity>>,

    /// Secondary index: identity -> handle. Pending and committed
    /// identities share the map; they never collide.
    by_identity: HashMap<Identity, EntityHandle>,

    /// Last local id handed out for this kind.
    last_local: u64,

    /// Version counter, bumped on every mutation.
    version: watch::Sender<u64>,

    /// Full snapshot, rebuilt on mutation.
    snapshot: watch::Sender<Arc<Vec<Arc<Entity>>>>,
}

impl EntityCollection {
    pub(crate) fn new(kind: EntityKind) -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            kind,
            by_handle: IndexMap::new(),
            by_identity: HashMap::new(),
            last_local: 0,
            version,
            snapshot,
        }
    }

    pub(crate) fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Reserve the next placeholder id for this kind.
    pub(crate) fn next_local_id(&mut self) -> LocalId {
        self.last_local += 1;
        LocalId::new(self.last_local)
    }

    /// Insert a new entity. Returns `false` (and stores nothing) if its
    /// identity is already present.
    pub(crate) fn insert(&mut self, entity: Entity) -> bool {
        if self.by_identity.contains_key(entity.identity()) {
            return false;
        }
        let handle = entity.handle();
        self.by_identity.insert(entity.identity().clone(), handle);
        self.by_handle.insert(handle, Arc::new(entity));
        self.publish();
        true
    }

    /// Replace the identity of `handle`, keeping its slot in the order.
    pub(crate) fn rekey(&mut self, handle: EntityHandle, identity: Identity) -> Option<Arc<Entity>> {
        let slot = self.by_handle.get_mut(&handle)?;
        self.by_identity.remove(slot.identity());
        self.by_identity.insert(identity.clone(), handle);
        Arc::make_mut(slot).set_identity(identity);
        let updated = Arc::clone(slot);
        self.publish();
        Some(updated)
    }

    /// Apply `f` to the entity behind `handle`.
    pub(crate) fn update(
        &mut self,
        handle: EntityHandle,
        f: impl FnOnce(&mut Entity),
    ) -> Option<Arc<Entity>> {
        let slot = self.by_handle.get_mut(&handle)?;
        f(Arc::make_mut(slot));
        let updated = Arc::clone(slot);
        self.publish();
        Some(updated)
    }

    /// Remove an entity. Later entities keep their relative order.
    pub(crate) fn remove(&mut self, handle: EntityHandle) -> Option<Arc<Entity>> {
        let removed = self.by_handle.shift_remove(&handle)?;
        self.by_identity.remove(removed.identity());
        self.publish();
        Some(removed)
    }

    pub(crate) fn get(&self, handle: EntityHandle) -> Option<&Arc<Entity>> {
        self.by_handle.get(&handle)
    }

    pub(crate) fn find(&self, identity: &Identity) -> Option<&Arc<Entity>> {
        let handle = self.by_identity.get(identity)?;
        self.by_handle.get(handle)
    }

    /// Earliest-inserted entity that is still pending.
    pub(crate) fn first_pending(&self) -> Option<&Arc<Entity>> {
        self.by_handle.values().find(|e| e.is_pending())
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Arc<Entity>> {
        self.by_handle.values()
    }

    /// Remove everything. Returns the removed handles in order.
    pub(crate) fn clear(&mut self) -> Vec<EntityHandle> {
        let handles: Vec<_> = self.by_handle.keys().copied().collect();
        self.by_handle.clear();
        self.by_identity.clear();
        self.publish();
        handles
    }

    pub(crate) fn len(&self) -> usize {
        self.by_handle.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.by_handle.is_empty()
    }

    pub(crate) fn version(&self) -> u64 {
        *self.version.borrow()
    }

    /// Get the current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<Entity>>> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes via a `watch::Receiver`.
    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<Entity>>>> {
        self.snapshot.subscribe()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn publish(&self) {
        let values: Vec<Arc<Entity>> = self.by_handle.values().map(Arc::clone).collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
        self.version.send_modify(|v| *v += 1);
    }
}
