// ── Entity store ──
//
// Per-kind collections of APs and clients plus the label side table.
// The store enforces identity rules (one promotion per entity, no
// duplicate committed ids per kind); deciding *when* to mutate is the
// reconciler's job.

mod collection;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::CoreError;
use crate::model::{
    Entity, EntityClass, EntityHandle, EntityKind, Identity, Label, Position, ServerId,
};
use crate::stream::EntityStream;

use collection::EntityCollection;

pub type Snapshot = Arc<Vec<Arc<Entity>>>;
pub type LabelMap = Arc<HashMap<EntityHandle, Label>>;

/// In-memory state of the floor plan.
pub struct EntityStore {
    aps: EntityCollection,
    clients: EntityCollection,
    labels: watch::Sender<LabelMap>,
    last_handle: u64,
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore {
    pub fn new() -> Self {
        let (labels, _) = watch::channel(Arc::new(HashMap::new()));
        Self {
            aps: EntityCollection::new(EntityKind::Ap),
            clients: EntityCollection::new(EntityKind::Client),
            labels,
            last_handle: 0,
        }
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Insert a locally placed entity with a fresh placeholder identity.
    pub fn insert_pending(&mut self, class: EntityClass, position: Position) -> EntityHandle {
        let handle = self.next_handle();
        let collection = self.collection_mut(class.kind());
        let local = collection.next_local_id();
        let inserted = collection.insert(Entity::new(
            handle,
            class,
            Identity::Pending(local),
            position,
        ));
        debug_assert!(inserted, "local ids are unique per kind");
        handle
    }

    /// Insert an entity the backend already knows about, and label it.
    pub fn insert_committed(
        &mut self,
        class: EntityClass,
        id: ServerId,
        position: Position,
    ) -> Result<EntityHandle, CoreError> {
        let kind = class.kind();
        if self.find_committed(kind, &id).is_some() {
            return Err(CoreError::DuplicateIdentity { kind, id });
        }
        let handle = self.next_handle();
        let entity = Entity::new(handle, class, Identity::Committed(id.clone()), position);
        self.collection_mut(kind).insert(entity);
        self.attach_label(handle, Label::for_committed(kind, &id));
        Ok(handle)
    }

    /// Swap a pending placeholder for its server id, in place, and label it.
    pub fn promote(&mut self, handle: EntityHandle, id: ServerId) -> Result<Arc<Entity>, CoreError> {
        let entity = self
            .get(handle)
            .ok_or(CoreError::EntityNotFound { handle })?;
        if !entity.is_pending() {
            return Err(CoreError::NotPending { handle });
        }
        let kind = entity.kind();
        if self.find_committed(kind, &id).is_some() {
            return Err(CoreError::DuplicateIdentity { kind, id });
        }

        let label = Label::for_committed(kind, &id);
        let promoted = self
            .collection_mut(kind)
            .rekey(handle, Identity::Committed(id))
            .ok_or(CoreError::EntityNotFound { handle })?;
        self.attach_label(handle, label);
        Ok(promoted)
    }

    /// Delete an entity and its label.
    pub fn remove(&mut self, handle: EntityHandle) -> Option<Arc<Entity>> {
        let kind = self.get(handle)?.kind();
        let removed = self.collection_mut(kind).remove(handle)?;
        self.labels.send_if_modified(|labels| {
            if labels.contains_key(&handle) {
                Arc::make_mut(labels).remove(&handle);
                true
            } else {
                false
            }
        });
        Some(removed)
    }

    pub fn set_position(
        &mut self,
        handle: EntityHandle,
        position: Position,
    ) -> Result<Arc<Entity>, CoreError> {
        let kind = self
            .get(handle)
            .ok_or(CoreError::EntityNotFound { handle })?
            .kind();
        self.collection_mut(kind)
            .update(handle, |e| e.set_position(position))
            .ok_or(CoreError::EntityNotFound { handle })
    }

    /// Remove every entity of both kinds and every label. Returns the
    /// removed handles, APs first.
    pub fn clear(&mut self) -> Vec<EntityHandle> {
        let mut removed = self.aps.clear();
        removed.extend(self.clients.clear());
        self.labels.send_modify(|labels| *labels = Arc::new(HashMap::new()));
        removed
    }

    // ── Lookup ───────────────────────────────────────────────────────

    pub fn get(&self, handle: EntityHandle) -> Option<Arc<Entity>> {
        self.aps
            .get(handle)
            .or_else(|| self.clients.get(handle))
            .map(Arc::clone)
    }

    pub fn find(&self, kind: EntityKind, identity: &Identity) -> Option<Arc<Entity>> {
        self.collection(kind).find(identity).map(Arc::clone)
    }

    pub fn find_committed(&self, kind: EntityKind, id: &ServerId) -> Option<Arc<Entity>> {
        self.find(kind, &Identity::Committed(id.clone()))
    }

    /// Earliest-created pending entity of `kind`.
    pub fn first_pending(&self, kind: EntityKind) -> Option<EntityHandle> {
        self.collection(kind).first_pending().map(|e| e.handle())
    }

    /// Entities of one kind in insertion order.
    pub fn iter(&self, kind: EntityKind) -> impl Iterator<Item = &Arc<Entity>> {
        self.collection(kind).iter()
    }

    pub fn len(&self, kind: EntityKind) -> usize {
        self.collection(kind).len()
    }

    pub fn total(&self) -> usize {
        self.aps.len() + self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aps.is_empty() && self.clients.is_empty()
    }

    /// Combined mutation counter of both collections.
    pub fn version(&self) -> u64 {
        self.aps.version() + self.clients.version()
    }

    pub fn label(&self, handle: EntityHandle) -> Option<Label> {
        self.labels.borrow().get(&handle).cloned()
    }

    // ── Snapshots ────────────────────────────────────────────────────

    pub fn snapshot(&self, kind: EntityKind) -> Snapshot {
        self.collection(kind).snapshot()
    }

    pub fn labels_snapshot(&self) -> LabelMap {
        self.labels.borrow().clone()
    }

    /// Reactive view of one kind.
    pub fn subscribe(&self, kind: EntityKind) -> EntityStream<Entity> {
        EntityStream::new(self.watch(kind))
    }

    pub(crate) fn watch(&self, kind: EntityKind) -> watch::Receiver<Snapshot> {
        self.collection(kind).subscribe()
    }

    pub(crate) fn watch_labels(&self) -> watch::Receiver<LabelMap> {
        self.labels.subscribe()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn next_handle(&mut self) -> EntityHandle {
        self.last_handle += 1;
        EntityHandle::new(self.last_handle)
    }

    fn attach_label(&self, handle: EntityHandle, label: Label) {
        self.labels
            .send_modify(|labels| {
                Arc::make_mut(labels).insert(handle, label);
            });
    }

    fn collection(&self, kind: EntityKind) -> &EntityCollection {
        match kind {
            EntityKind::Ap => &self.aps,
            EntityKind::Client => &self.clients,
        }
    }

    fn collection_mut(&mut self, kind: EntityKind) -> &mut EntityCollection {
        let collection = match kind {
            EntityKind::Ap => &mut self.aps,
            EntityKind::Client => &mut self.clients,
        };
        debug_assert_eq!(collection.kind(), kind);
        collection
    }
}
