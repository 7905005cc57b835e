//! Scene entities: a name, an enabled flag and a list of components.

use serde::{Deserialize, Serialize};

use crate::id::TinyId;
use crate::object::TinyObject;
use crate::reference::{EntityRef, TypeRef};
use crate::version::{VersionSlot, VersionStorage};

/// A registered entity. Components are [`TinyObject`]s of component types,
/// at most one per type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TinyEntity {
    pub(crate) id: TinyId,
    pub(crate) name: String,
    #[serde(default = "enabled_default")]
    pub(crate) enabled: bool,
    #[serde(default)]
    pub(crate) components: Vec<TinyObject>,
    #[serde(default)]
    pub(crate) persistence_id: Option<String>,
    #[serde(skip)]
    pub(crate) slot: VersionSlot,
}

fn enabled_default() -> bool {
    true
}

impl TinyEntity {
    /// Create a detached entity. Register it to start tracking changes.
    pub fn new(id: TinyId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            enabled: true,
            components: Vec::new(),
            persistence_id: None,
            slot: VersionSlot::detached(),
        }
    }

    pub fn id(&self) -> TinyId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.slot.bump();
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            self.enabled = enabled;
            self.slot.bump();
        }
    }

    /// Non-empty persistence id, if this entity is asset-backed.
    pub fn persistence_id(&self) -> Option<&str> {
        self.persistence_id.as_deref().filter(|p| !p.is_empty())
    }

    pub fn set_persistence_id(&mut self, persistence_id: Option<String>) {
        self.persistence_id = persistence_id;
        self.slot.bump();
    }

    /// Change counter of the entity and all its components.
    pub fn version(&self) -> u64 {
        self.slot.version()
    }

    /// Reference to this entity, carrying its current name.
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.id, self.name.clone())
    }

    pub fn components(&self) -> &[TinyObject] {
        &self.components
    }

    /// Add an empty component of `type_ref`, or return the existing one.
    ///
    /// The component has no slots until refreshed; prefer
    /// [`Registry::add_component`](crate::registry::Registry::add_component)
    /// which refreshes it against the registered type.
    pub fn add_component(&mut self, type_ref: TypeRef) -> &mut TinyObject {
        let index = match self
            .components
            .iter()
            .position(|c| c.type_ref().id == type_ref.id)
        {
            Some(index) => index,
            None => {
                let component = TinyObject::with_slot(type_ref, self.slot.child());
                self.components.push(component);
                self.slot.bump();
                self.components.len() - 1
            }
        };
        &mut self.components[index]
    }

    pub fn get_component(&self, type_id: TinyId) -> Option<&TinyObject> {
        self.components.iter().find(|c| c.type_ref().id == type_id)
    }

    pub fn get_component_mut(&mut self, type_id: TinyId) -> Option<&mut TinyObject> {
        self.components
            .iter_mut()
            .find(|c| c.type_ref().id == type_id)
    }

    pub fn has_component(&self, type_id: TinyId) -> bool {
        self.get_component(type_id).is_some()
    }

    pub fn remove_component(&mut self, type_id: TinyId) -> Option<TinyObject> {
        let index = self
            .components
            .iter()
            .position(|c| c.type_ref().id == type_id)?;
        let removed = self.components.remove(index);
        self.slot.bump();
        Some(removed)
    }

    /// Relink this entity into `storage`, owned by its own id, with every
    /// component chained under it.
    pub(crate) fn attach(&mut self, storage: &VersionStorage) {
        self.slot.relink(storage, None, Some(self.id));
        let slot = &self.slot;
        for component in &mut self.components {
            component.attach(slot);
        }
    }

    /// Lift this entity and its components to at least `floor`.
    pub(crate) fn raise_versions(&self, floor: u64) {
        self.slot.raise_to(floor);
        for component in &self.components {
            component.raise_versions(floor);
        }
    }
}

impl PartialEq for TinyEntity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.enabled == other.enabled
            && self.components == other.components
            && self.persistence_id == other.persistence_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_edits_bump_entity() {
        let storage = VersionStorage::new();
        let mut entity = TinyEntity::new(TinyId::from_raw(1), "Player");
        entity.attach(&storage);
        storage.take_changed();

        let health = TypeRef::new(TinyId::from_raw(7), "Health");
        entity.add_component(health.clone()).set("hp", 10).unwrap();
        assert_eq!(storage.take_changed(), vec![entity.id()]);

        let before = entity.version();
        entity
            .get_component_mut(health.id)
            .unwrap()
            .set("hp", 11)
            .unwrap();
        assert!(entity.version() > before);

        // Adding the same type twice returns the existing component.
        entity.add_component(health.clone());
        assert_eq!(entity.components().len(), 1);

        assert!(entity.remove_component(health.id).is_some());
        assert!(!entity.has_component(health.id));
    }

    #[test]
    fn serde_reattaches_on_register() {
        let mut entity = TinyEntity::new(TinyId::from_raw(2), "Tree");
        entity.set_enabled(false);
        entity
            .add_component(TypeRef::new(TinyId::from_raw(8), "Leaves"))
            .set("count", 3)
            .unwrap();

        let json = serde_json::to_string(&entity).unwrap();
        let mut back: TinyEntity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entity);

        let storage = VersionStorage::new();
        back.attach(&storage);
        back.components[0].set("count", 4).unwrap();
        assert_eq!(storage.take_changed(), vec![back.id()]);
    }
}
