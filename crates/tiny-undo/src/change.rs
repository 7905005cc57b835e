//! Change records and changesets.
//!
//! A [`Change`] pairs the snapshot an object had before an edit with the one
//! it has after. `previous == None` means the edit created the object;
//! `next == None` means it deleted it. A [`Changeset`] is every change
//! recorded in one update tick, keyed by object id so two edits of the same
//! object in one tick collapse into one entry holding the latest snapshot.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use tiny_model::prelude::*;

// ---------------------------------------------------------------------------
// ChangeOrigin
// ---------------------------------------------------------------------------

/// Description of the registry object a change was recorded for, captured at
/// record time so a change can still be replayed after the object is gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeOrigin {
    pub kind: ObjectKind,
    pub name: String,
    /// Persistent (asset-backed) objects are never unregistered by replay.
    pub persistence_id: Option<String>,
}

impl ChangeOrigin {
    pub fn capture(object: &RegistryObject) -> Self {
        Self {
            kind: object.kind(),
            name: object.name().to_owned(),
            persistence_id: object.persistence_id().map(str::to_owned),
        }
    }

    /// Origin reconstructed from a snapshot when no live object is at hand.
    pub fn from_memento(memento: &Memento) -> Self {
        let field = |key: &str| {
            memento
                .state
                .get(key)
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned)
        };
        Self {
            kind: memento.kind,
            name: field("name").unwrap_or_default(),
            persistence_id: field("persistence_id").filter(|p| !p.is_empty()),
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.persistence_id.as_deref().is_some_and(|p| !p.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Change
// ---------------------------------------------------------------------------

/// One object's before/after snapshots within a changeset.
///
/// Equality and hashing look at the object id only.
#[derive(Debug, Clone)]
pub struct Change {
    pub id: TinyId,
    /// Undo version current when the change was recorded.
    pub version: u64,
    /// Operation group of the changeset the change was recorded in.
    pub group: u64,
    pub origin: ChangeOrigin,
    pub previous: Option<Arc<Memento>>,
    pub next: Option<Arc<Memento>>,
}

impl Change {
    /// The edit brought the object into existence.
    pub fn is_creation(&self) -> bool {
        self.previous.is_none()
    }

    /// The edit removed the object from the registry.
    pub fn is_deletion(&self) -> bool {
        self.next.is_none()
    }
}

impl PartialEq for Change {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Change {}

impl Hash for Change {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

// ---------------------------------------------------------------------------
// Changeset
// ---------------------------------------------------------------------------

/// All changes recorded in one update tick.
#[derive(Debug, Clone, Default)]
pub struct Changeset {
    pub version: u64,
    pub group: u64,
    changes: BTreeMap<TinyId, Change>,
}

impl Changeset {
    pub fn new(version: u64, group: u64) -> Self {
        Self {
            version,
            group,
            changes: BTreeMap::new(),
        }
    }

    /// Add a change, replacing any earlier change for the same id.
    ///
    /// The replaced change's `previous` snapshot is kept, so the entry still
    /// spans the whole tick.
    pub fn insert(&mut self, mut change: Change) {
        if let Some(existing) = self.changes.remove(&change.id) {
            change.previous = existing.previous;
        }
        self.changes.insert(change.id, change);
    }

    /// Add a change, overwriting any earlier change for the same id as is.
    pub fn replace(&mut self, change: Change) {
        self.changes.insert(change.id, change);
    }

    pub fn get(&self, id: TinyId) -> Option<&Change> {
        self.changes.get(&id)
    }

    pub fn remove(&mut self, id: TinyId) -> Option<Change> {
        self.changes.remove(&id)
    }

    pub fn contains(&self, id: TinyId) -> bool {
        self.changes.contains_key(&id)
    }

    /// Changes in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.changes.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = TinyId> + '_ {
        self.changes.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

impl IntoIterator for Changeset {
    type Item = Change;
    type IntoIter = std::collections::btree_map::IntoValues<TinyId, Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_values()
    }
}

impl<'a> IntoIterator for &'a Changeset {
    type Item = &'a Change;
    type IntoIter = std::collections::btree_map::Values<'a, TinyId, Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn memento(id: TinyId, name: &str) -> Arc<Memento> {
        Arc::new(
            Memento::capture(id, 1, ObjectKind::Entity, &json!({ "id": id, "name": name }))
                .unwrap(),
        )
    }

    fn change(id: TinyId, previous: Option<&str>, next: Option<&str>) -> Change {
        Change {
            id,
            version: 1,
            group: 1,
            origin: ChangeOrigin {
                kind: ObjectKind::Entity,
                name: "E".into(),
                persistence_id: None,
            },
            previous: previous.map(|n| memento(id, n)),
            next: next.map(|n| memento(id, n)),
        }
    }

    #[test]
    fn changes_compare_by_id_only() {
        let id = TinyId::from_raw(1);
        assert_eq!(change(id, None, Some("a")), change(id, Some("b"), None));
        assert_ne!(change(id, None, None), change(TinyId::from_raw(2), None, None));
    }

    #[test]
    fn insert_keeps_first_previous_and_latest_next() {
        let id = TinyId::from_raw(7);
        let mut changeset = Changeset::new(3, 3);
        changeset.insert(change(id, Some("start"), Some("middle")));
        changeset.insert(change(id, Some("middle"), Some("end")));

        assert_eq!(changeset.len(), 1);
        let entry = changeset.get(id).unwrap();
        assert_eq!(entry.previous.as_ref().unwrap().state["name"], "start");
        assert_eq!(entry.next.as_ref().unwrap().state["name"], "end");
    }

    #[test]
    fn origin_from_memento_reads_name_and_persistence() {
        let id = TinyId::from_raw(9);
        let snapshot = Memento::capture(
            id,
            1,
            ObjectKind::Entity,
            &json!({ "id": id, "name": "Crate", "persistence_id": "assets/crate" }),
        )
        .unwrap();
        let origin = ChangeOrigin::from_memento(&snapshot);
        assert_eq!(origin.name, "Crate");
        assert!(origin.is_persistent());
    }
}
