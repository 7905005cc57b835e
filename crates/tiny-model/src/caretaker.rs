//! Per-tick change tracker.
//!
//! The [`Caretaker`] drains the registry's change queue once per update and
//! emits one [`Memento`] per changed originator. A snapshot whose content hash
//! equals the last one emitted for that id is dropped, so an edit that was
//! reverted within the same tick records nothing.

use std::collections::HashMap;

use crate::id::TinyId;
use crate::memento::{Memento, Originator};
use crate::registry::Registry;

/// Tracks the last emitted snapshot hash of every originator.
#[derive(Debug, Default)]
pub struct Caretaker {
    last_hash: HashMap<TinyId, String>,
}

impl Caretaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the next [`update`](Self::update) has anything to look at.
    pub fn has_changes(&self, registry: &Registry) -> bool {
        registry.has_changes()
    }

    /// Snapshot every originator changed since the last update, in
    /// first-change order.
    ///
    /// Ids that are no longer registered are forgotten; objects whose save
    /// fails are logged and skipped.
    pub fn update(&mut self, registry: &Registry) -> Vec<Memento> {
        let mut mementos = Vec::new();
        for id in registry.take_changed() {
            let Some(object) = registry.find_object(id) else {
                self.last_hash.remove(&id);
                continue;
            };
            let memento = match object.save() {
                Ok(memento) => memento,
                Err(err) => {
                    tracing::warn!(id = %id, error = %err, "could not snapshot object -- skipping");
                    continue;
                }
            };
            if self.last_hash.get(&id) == Some(&memento.hash) {
                tracing::trace!(id = %id, "snapshot unchanged");
                continue;
            }
            self.last_hash.insert(id, memento.hash.clone());
            mementos.push(memento);
        }
        if !mementos.is_empty() {
            tracing::debug!(count = mementos.len(), "generated mementos");
        }
        mementos
    }

    /// Hash of the last snapshot emitted for `id`.
    pub fn last_hash(&self, id: TinyId) -> Option<&str> {
        self.last_hash.get(&id).map(String::as_str)
    }

    pub fn forget(&mut self, id: TinyId) {
        self.last_hash.remove(&id);
    }

    pub fn clear(&mut self) {
        self.last_hash.clear();
    }

    /// Number of originators with a recorded snapshot.
    pub fn tracked_len(&self) -> usize {
        self.last_hash.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::TinyEntity;
    use crate::schema::TypeCode;

    #[test]
    fn emits_one_memento_per_changed_object() {
        let mut registry = Registry::new();
        let mut caretaker = Caretaker::new();
        let a = TinyId::from_raw(1);
        let b = TinyId::from_raw(2);
        registry.create_entity(a, "A");
        registry.create_type(b, "B", TypeCode::Struct);

        let ids: Vec<TinyId> = caretaker.update(&registry).iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![a, b]);
        assert!(caretaker.update(&registry).is_empty());

        let entity = registry.find_by_id_mut::<TinyEntity>(a).unwrap();
        entity.set_name("A1");
        entity.set_name("A2");
        let mementos = caretaker.update(&registry);
        assert_eq!(mementos.len(), 1);
        assert_eq!(mementos[0].id, a);
    }

    #[test]
    fn reverted_edit_is_not_reemitted() {
        let mut registry = Registry::new();
        let mut caretaker = Caretaker::new();
        let id = TinyId::from_raw(3);
        registry.create_entity(id, "Door");
        caretaker.update(&registry);

        let door = registry.find_by_id_mut::<TinyEntity>(id).unwrap();
        door.set_enabled(false);
        door.set_enabled(true);
        assert!(caretaker.update(&registry).is_empty());
    }

    #[test]
    fn unregistered_ids_are_forgotten() {
        let mut registry = Registry::new();
        let mut caretaker = Caretaker::new();
        let id = TinyId::from_raw(4);
        registry.create_entity(id, "Ghost");
        caretaker.update(&registry);
        assert_eq!(caretaker.tracked_len(), 1);

        registry.unregister(id);
        assert!(caretaker.has_changes(&registry));
        assert!(caretaker.update(&registry).is_empty());
        assert_eq!(caretaker.tracked_len(), 0);
    }
}
