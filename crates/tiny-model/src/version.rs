//! Shared version arena.
//!
//! Every versioned container (registry objects, [`TinyObject`](crate::object::TinyObject),
//! [`TinyList`](crate::list::TinyList)) owns a [`VersionSlot`]: a generational
//! index into one session-wide table of counters. A slot may point at a
//! parent slot and may name an owning top-level object.
//!
//! Bumping a slot walks the parent chain iteratively, incrementing every
//! counter on the way, and enqueues each owner it passes onto the session's
//! change queue. The [`Caretaker`](crate::caretaker::Caretaker) drains that
//! queue once per update tick.
//!
//! The table is `Rc<RefCell<..>>`: the whole object model is confined to the
//! editor's main thread.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use crate::id::TinyId;

// ---------------------------------------------------------------------------
// Table internals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SlotKey {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
struct SlotEntry {
    version: u64,
    generation: u32,
    live: bool,
    parent: Option<SlotKey>,
    owner: Option<TinyId>,
}

#[derive(Debug, Default)]
struct VersionTable {
    slots: Vec<SlotEntry>,
    free: Vec<u32>,
    /// Owners changed since the last drain, in first-change order.
    changed: Vec<TinyId>,
    changed_set: HashSet<TinyId>,
    /// Depth of active [`TrackingGuard`]s.
    suspended: u32,
}

impl VersionTable {
    fn allocate(&mut self, parent: Option<SlotKey>, owner: Option<TinyId>, version: u64) -> SlotKey {
        if let Some(index) = self.free.pop() {
            let entry = &mut self.slots[index as usize];
            entry.version = version;
            entry.live = true;
            entry.parent = parent;
            entry.owner = owner;
            SlotKey {
                index,
                generation: entry.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(SlotEntry {
                version,
                generation: 0,
                live: true,
                parent,
                owner,
            });
            SlotKey {
                index,
                generation: 0,
            }
        }
    }

    fn release(&mut self, key: SlotKey) {
        if let Some(entry) = self.slots.get_mut(key.index as usize) {
            if entry.live && entry.generation == key.generation {
                entry.live = false;
                entry.generation = entry.generation.wrapping_add(1);
                entry.parent = None;
                entry.owner = None;
                self.free.push(key.index);
            }
        }
    }

    fn get(&self, key: SlotKey) -> Option<&SlotEntry> {
        self.slots
            .get(key.index as usize)
            .filter(|e| e.live && e.generation == key.generation)
    }

    fn get_mut(&mut self, key: SlotKey) -> Option<&mut SlotEntry> {
        self.slots
            .get_mut(key.index as usize)
            .filter(|e| e.live && e.generation == key.generation)
    }

    fn enqueue(&mut self, id: TinyId) {
        if self.suspended == 0 && self.changed_set.insert(id) {
            self.changed.push(id);
        }
    }

    fn bump(&mut self, key: SlotKey) {
        let mut cursor = Some(key);
        // A chain can never be longer than the table.
        let mut remaining = self.slots.len();
        while let Some(current) = cursor {
            if remaining == 0 {
                break;
            }
            remaining -= 1;
            let (owner, parent) = match self.get_mut(current) {
                Some(entry) => {
                    entry.version += 1;
                    (entry.owner, entry.parent)
                }
                None => break,
            };
            if let Some(owner) = owner {
                self.enqueue(owner);
            }
            cursor = parent;
        }
    }
}

// ---------------------------------------------------------------------------
// VersionStorage
// ---------------------------------------------------------------------------

/// Cloneable handle to one version arena (one per editing session).
#[derive(Clone, Default)]
pub struct VersionStorage {
    inner: Rc<RefCell<VersionTable>>,
}

impl VersionStorage {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a slot, optionally chained under `parent` and owned by a
    /// top-level object.
    ///
    /// A `parent` from a different arena is ignored.
    pub fn allocate(
        &self,
        parent: Option<&VersionSlot>,
        owner: Option<TinyId>,
        initial_version: u64,
    ) -> VersionSlot {
        let parent_key = parent
            .filter(|p| p.storage.ptr_eq(self))
            .map(|p| p.key);
        let key = self
            .inner
            .borrow_mut()
            .allocate(parent_key, owner, initial_version);
        VersionSlot {
            storage: self.clone(),
            key,
        }
    }

    /// Enqueue `id` as changed without touching any counter.
    ///
    /// Used by the registry when an object is registered or unregistered.
    pub fn mark_changed(&self, id: TinyId) {
        self.inner.borrow_mut().enqueue(id);
    }

    /// Drain the change queue, in first-change order.
    pub fn take_changed(&self) -> Vec<TinyId> {
        let mut table = self.inner.borrow_mut();
        table.changed_set.clear();
        std::mem::take(&mut table.changed)
    }

    /// Whether any owner has been enqueued since the last drain.
    pub fn has_changes(&self) -> bool {
        !self.inner.borrow().changed.is_empty()
    }

    /// Suspend change-queue tracking until the returned guard is dropped.
    ///
    /// Counters still advance while suspended; only the queue is skipped.
    /// Guards nest.
    pub fn dont_track(&self) -> TrackingGuard {
        self.inner.borrow_mut().suspended += 1;
        TrackingGuard {
            storage: self.clone(),
        }
    }

    /// `false` while at least one [`TrackingGuard`] is alive.
    pub fn is_tracking(&self) -> bool {
        self.inner.borrow().suspended == 0
    }

    /// Number of live slots in the arena.
    pub fn live_slots(&self) -> usize {
        let table = self.inner.borrow();
        table.slots.len() - table.free.len()
    }

    /// Whether both handles point at the same arena.
    pub fn ptr_eq(&self, other: &VersionStorage) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for VersionStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(table) => f
                .debug_struct("VersionStorage")
                .field("slots", &(table.slots.len() - table.free.len()))
                .field("pending", &table.changed.len())
                .field("suspended", &table.suspended)
                .finish(),
            Err(_) => f.write_str("VersionStorage(<borrowed>)"),
        }
    }
}

// ---------------------------------------------------------------------------
// TrackingGuard
// ---------------------------------------------------------------------------

/// RAII scope returned by [`VersionStorage::dont_track`].
#[must_use = "tracking resumes as soon as the guard is dropped"]
pub struct TrackingGuard {
    storage: VersionStorage,
}

impl Drop for TrackingGuard {
    fn drop(&mut self) {
        if let Ok(mut table) = self.storage.inner.try_borrow_mut() {
            table.suspended = table.suspended.saturating_sub(1);
        }
    }
}

// ---------------------------------------------------------------------------
// VersionSlot
// ---------------------------------------------------------------------------

/// One container's entry in the version arena. Released on drop.
///
/// Cloning a slot yields a *detached* slot (its own private arena) carrying
/// the same counter value; registering the clone relinks it.
pub struct VersionSlot {
    storage: VersionStorage,
    key: SlotKey,
}

impl VersionSlot {
    /// A slot in a fresh private arena.
    pub fn detached() -> Self {
        Self::detached_at(0)
    }

    fn detached_at(version: u64) -> Self {
        VersionStorage::new().allocate(None, None, version)
    }

    /// Current counter value.
    pub fn version(&self) -> u64 {
        self.storage
            .inner
            .borrow()
            .get(self.key)
            .map(|e| e.version)
            .unwrap_or(0)
    }

    /// Increment this slot and every ancestor, enqueueing their owners.
    pub fn bump(&self) {
        self.storage.inner.borrow_mut().bump(self.key);
    }

    /// Lift the counter to at least `floor`. Ancestors are untouched and
    /// nothing is enqueued.
    pub fn raise_to(&self, floor: u64) {
        if let Some(entry) = self.storage.inner.borrow_mut().get_mut(self.key) {
            entry.version = entry.version.max(floor);
        }
    }

    /// Allocate a new slot chained under this one.
    pub fn child(&self) -> VersionSlot {
        self.storage.allocate(Some(self), None, 0)
    }

    /// The owner recorded on this slot, if any.
    pub fn owner(&self) -> Option<TinyId> {
        self.storage
            .inner
            .borrow()
            .get(self.key)
            .and_then(|e| e.owner)
    }

    /// The arena this slot lives in.
    pub fn storage(&self) -> &VersionStorage {
        &self.storage
    }

    /// Move this slot into `storage` under `parent`, keeping its counter.
    pub fn relink(&mut self, storage: &VersionStorage, parent: Option<&VersionSlot>, owner: Option<TinyId>) {
        let version = self.version();
        *self = storage.allocate(parent, owner, version);
    }
}

impl Drop for VersionSlot {
    fn drop(&mut self) {
        if let Ok(mut table) = self.storage.inner.try_borrow_mut() {
            table.release(self.key);
        }
    }
}

impl Clone for VersionSlot {
    fn clone(&self) -> Self {
        Self::detached_at(self.version())
    }
}

impl Default for VersionSlot {
    fn default() -> Self {
        Self::detached()
    }
}

impl fmt::Debug for VersionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "VersionSlot({}v{} = {})",
            self.key.index,
            self.key.generation,
            self.version()
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_propagates_to_ancestors_and_enqueues_owner() {
        let storage = VersionStorage::new();
        let owner = TinyId::from_raw(42);
        let root = storage.allocate(None, Some(owner), 0);
        let mid = root.child();
        let leaf = mid.child();

        leaf.bump();

        assert_eq!(leaf.version(), 1);
        assert_eq!(mid.version(), 1);
        assert_eq!(root.version(), 1);
        assert_eq!(storage.take_changed(), vec![owner]);
        assert!(!storage.has_changes());
    }

    #[test]
    fn change_queue_dedups_owners() {
        let storage = VersionStorage::new();
        let a = TinyId::from_raw(1);
        let b = TinyId::from_raw(2);
        let slot_a = storage.allocate(None, Some(a), 0);
        let slot_b = storage.allocate(None, Some(b), 0);

        slot_a.bump();
        slot_b.bump();
        slot_a.bump();

        assert_eq!(storage.take_changed(), vec![a, b]);
    }

    #[test]
    fn released_slot_generation_invalidates_stale_parent() {
        let storage = VersionStorage::new();
        let parent = storage.allocate(None, Some(TinyId::from_raw(9)), 0);
        let child = parent.child();
        drop(parent);

        // Reuse the freed index for an unrelated owner.
        let other = storage.allocate(None, Some(TinyId::from_raw(10)), 0);
        child.bump();

        assert_eq!(child.version(), 1);
        assert_eq!(other.version(), 0);
        assert!(storage.take_changed().is_empty());
    }

    #[test]
    fn dont_track_suspends_queue_but_not_counters() {
        let storage = VersionStorage::new();
        let id = TinyId::from_raw(3);
        let slot = storage.allocate(None, Some(id), 0);
        {
            let _guard = storage.dont_track();
            assert!(!storage.is_tracking());
            slot.bump();
        }
        assert!(storage.is_tracking());
        assert_eq!(slot.version(), 1);
        assert!(storage.take_changed().is_empty());
    }

    #[test]
    fn relink_keeps_counter() {
        let mut slot = VersionSlot::detached();
        slot.bump();
        slot.bump();

        let storage = VersionStorage::new();
        let owner = TinyId::from_raw(5);
        slot.relink(&storage, None, Some(owner));

        assert_eq!(slot.version(), 2);
        assert_eq!(slot.owner(), Some(owner));
        assert_eq!(storage.live_slots(), 1);
    }

    #[test]
    fn raise_to_never_lowers_and_stays_silent() {
        let storage = VersionStorage::new();
        let owner = TinyId::from_raw(8);
        let root = storage.allocate(None, Some(owner), 3);
        let child = root.child();

        child.raise_to(10);
        child.raise_to(4);

        assert_eq!(child.version(), 10);
        assert_eq!(root.version(), 3);
        assert!(!storage.has_changes());
    }

    #[test]
    fn clone_is_detached() {
        let storage = VersionStorage::new();
        let slot = storage.allocate(None, Some(TinyId::from_raw(1)), 4);
        let copy = slot.clone();
        copy.bump();
        assert_eq!(slot.version(), 4);
        assert_eq!(copy.version(), 5);
        assert!(!copy.storage().ptr_eq(&storage));
    }
}
