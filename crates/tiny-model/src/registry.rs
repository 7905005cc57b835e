//! The session-wide identity → object table.
//!
//! The [`Registry`] owns every live [`TinyType`] and [`TinyEntity`] and the
//! [`VersionStorage`] arena their containers version themselves in. It keeps
//! objects unregistered since the last [`clear_unregistered_objects`] so the
//! undo engine can record their deletion, and remembers which source
//! identifier (a document or module) registered each object.
//!
//! [`clear_unregistered_objects`]: Registry::clear_unregistered_objects

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::entity::TinyEntity;
use crate::id::TinyId;
use crate::memento::Memento;
use crate::object::TinyObject;
use crate::reference::{EntityRef, EnumRef};
use crate::schema::{builtin, TinyType, TypeCode};
use crate::value::Value;
use crate::version::{TrackingGuard, VersionStorage};
use crate::ModelError;

// ---------------------------------------------------------------------------
// Registry objects
// ---------------------------------------------------------------------------

/// Which kind of top-level object an id names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Type,
    Entity,
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectKind::Type => f.write_str("type"),
            ObjectKind::Entity => f.write_str("entity"),
        }
    }
}

/// A top-level object stored in the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryObject {
    Type(TinyType),
    Entity(TinyEntity),
}

impl RegistryObject {
    pub fn id(&self) -> TinyId {
        match self {
            RegistryObject::Type(ty) => ty.id(),
            RegistryObject::Entity(entity) => entity.id(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            RegistryObject::Type(ty) => ty.name(),
            RegistryObject::Entity(entity) => entity.name(),
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            RegistryObject::Type(_) => ObjectKind::Type,
            RegistryObject::Entity(_) => ObjectKind::Entity,
        }
    }

    pub fn version(&self) -> u64 {
        match self {
            RegistryObject::Type(ty) => ty.version(),
            RegistryObject::Entity(entity) => entity.version(),
        }
    }

    /// Non-empty persistence id: the object is backed by an asset and is
    /// never implicitly unregistered by undo bookkeeping.
    pub fn persistence_id(&self) -> Option<&str> {
        match self {
            RegistryObject::Type(ty) => ty.persistence_id(),
            RegistryObject::Entity(entity) => entity.persistence_id(),
        }
    }

    pub fn as_type(&self) -> Option<&TinyType> {
        TinyType::from_object(self)
    }

    pub fn as_entity(&self) -> Option<&TinyEntity> {
        TinyEntity::from_object(self)
    }

    fn attach(&mut self, storage: &VersionStorage) {
        match self {
            RegistryObject::Type(ty) => ty.attach(storage),
            RegistryObject::Entity(entity) => entity.attach(storage),
        }
    }

    fn raise_versions(&self, floor: u64) {
        match self {
            RegistryObject::Type(ty) => ty.raise_versions(floor),
            RegistryObject::Entity(entity) => entity.raise_versions(floor),
        }
    }
}

impl From<TinyType> for RegistryObject {
    fn from(ty: TinyType) -> Self {
        RegistryObject::Type(ty)
    }
}

impl From<TinyEntity> for RegistryObject {
    fn from(entity: TinyEntity) -> Self {
        RegistryObject::Entity(entity)
    }
}

/// A concrete kind of registry object, for typed lookups.
pub trait RegistryItem: Sized + 'static {
    const KIND: ObjectKind;

    fn from_object(object: &RegistryObject) -> Option<&Self>;
    fn from_object_mut(object: &mut RegistryObject) -> Option<&mut Self>;
}

impl RegistryItem for TinyType {
    const KIND: ObjectKind = ObjectKind::Type;

    fn from_object(object: &RegistryObject) -> Option<&Self> {
        match object {
            RegistryObject::Type(ty) => Some(ty),
            RegistryObject::Entity(_) => None,
        }
    }

    fn from_object_mut(object: &mut RegistryObject) -> Option<&mut Self> {
        match object {
            RegistryObject::Type(ty) => Some(ty),
            RegistryObject::Entity(_) => None,
        }
    }
}

impl RegistryItem for TinyEntity {
    const KIND: ObjectKind = ObjectKind::Entity;

    fn from_object(object: &RegistryObject) -> Option<&Self> {
        match object {
            RegistryObject::Entity(entity) => Some(entity),
            RegistryObject::Type(_) => None,
        }
    }

    fn from_object_mut(object: &mut RegistryObject) -> Option<&mut Self> {
        match object {
            RegistryObject::Entity(entity) => Some(entity),
            RegistryObject::Type(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Identity → live object table for one editing session.
#[derive(Debug)]
pub struct Registry {
    objects: BTreeMap<TinyId, RegistryObject>,
    storage: VersionStorage,
    unregistered: Vec<RegistryObject>,
    /// Last version of every object that has been unregistered.
    retired: HashMap<TinyId, u64>,
    sources: HashMap<TinyId, String>,
    source_stack: Vec<String>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// An empty registry holding only the built-in types.
    pub fn new() -> Self {
        let mut registry = Self {
            objects: BTreeMap::new(),
            storage: VersionStorage::new(),
            unregistered: Vec::new(),
            retired: HashMap::new(),
            sources: HashMap::new(),
            source_stack: vec![builtin::SOURCE.to_owned()],
        };
        {
            let _guard = registry.storage.dont_track();
            for ty in builtin::types() {
                registry.register(ty);
            }
        }
        registry.source_stack.clear();
        registry
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    fn insert(&mut self, mut object: RegistryObject) -> &mut RegistryObject {
        let id = object.id();
        object.attach(&self.storage);
        self.unregistered.retain(|o| o.id() != id);
        if let Some(source) = self.source_stack.last() {
            self.sources.insert(id, source.clone());
        }
        self.storage.mark_changed(id);
        match self.objects.entry(id) {
            Entry::Occupied(mut entry) => {
                entry.insert(object);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(object),
        }
    }

    /// Register (or replace) an object. Its containers are relinked into this
    /// registry's version arena and its id is marked changed.
    pub fn register(&mut self, object: impl Into<RegistryObject>) -> TinyId {
        self.insert(object.into()).id()
    }

    /// Remove an object, keeping it in the unregistered list until
    /// [`clear_unregistered_objects`](Self::clear_unregistered_objects).
    pub fn unregister(&mut self, id: TinyId) -> bool {
        let Some(object) = self.objects.remove(&id) else {
            return false;
        };
        self.storage.mark_changed(id);
        tracing::debug!(id = %id, kind = %object.kind(), name = %object.name(), "unregistered object");
        self.retired.insert(id, object.version());
        self.unregistered.push(object);
        true
    }

    /// Register a new type and return it for editing.
    pub fn create_type(&mut self, id: TinyId, name: impl Into<String>, code: TypeCode) -> &mut TinyType {
        match self.insert(TinyType::new(id, name, code).into()) {
            RegistryObject::Type(ty) => ty,
            RegistryObject::Entity(_) => unreachable!("a type was just inserted"),
        }
    }

    /// Register a new entity and return it for editing.
    pub fn create_entity(&mut self, id: TinyId, name: impl Into<String>) -> &mut TinyEntity {
        match self.insert(TinyEntity::new(id, name).into()) {
            RegistryObject::Entity(entity) => entity,
            RegistryObject::Type(_) => unreachable!("an entity was just inserted"),
        }
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    pub fn find_by_id<T: RegistryItem>(&self, id: TinyId) -> Option<&T> {
        self.objects.get(&id).and_then(T::from_object)
    }

    pub fn find_by_id_mut<T: RegistryItem>(&mut self, id: TinyId) -> Option<&mut T> {
        self.objects.get_mut(&id).and_then(T::from_object_mut)
    }

    pub fn find_object(&self, id: TinyId) -> Option<&RegistryObject> {
        self.objects.get(&id)
    }

    /// Every registered object of kind `T`, in id order.
    pub fn find_all_by_type<T: RegistryItem>(&self) -> impl Iterator<Item = &T> {
        self.objects.values().filter_map(T::from_object)
    }

    /// First object of kind `T` named `name`, in id order.
    pub fn find_by_name<T: RegistryItem>(&self, name: &str) -> Option<&T> {
        self.objects
            .values()
            .filter(|o| o.name() == name)
            .find_map(T::from_object)
    }

    pub fn all(&self) -> impl Iterator<Item = &RegistryObject> {
        self.objects.values()
    }

    /// Objects unregistered since the last clear, oldest first.
    pub fn all_unregistered(&self) -> &[RegistryObject] {
        &self.unregistered
    }

    pub fn clear_unregistered_objects(&mut self) {
        self.unregistered.clear();
    }

    pub fn contains(&self, id: TinyId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Number of registered objects, built-in types included.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    // -----------------------------------------------------------------------
    // Source identifiers
    // -----------------------------------------------------------------------

    /// Run `f` with `source` recorded against every object it registers.
    pub fn with_source_identifier<R>(
        &mut self,
        source: &str,
        f: impl FnOnce(&mut Registry) -> R,
    ) -> Result<R, ModelError> {
        if source == builtin::SOURCE {
            return Err(ModelError::ReservedSource(source.to_owned()));
        }
        self.source_stack.push(source.to_owned());
        let result = f(self);
        self.source_stack.pop();
        Ok(result)
    }

    /// Source the object was registered under, if any. Kept across
    /// unregistration so a recreated object returns to its source.
    pub fn source_of(&self, id: TinyId) -> Option<&str> {
        self.sources.get(&id).map(String::as_str)
    }

    /// Ids registered under `source`, sorted.
    pub fn find_all_by_source(&self, source: &str) -> Vec<TinyId> {
        let mut ids: Vec<TinyId> = self
            .sources
            .iter()
            .filter(|(id, s)| s.as_str() == source && self.objects.contains_key(id))
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    /// Unregister everything registered under `source`. Returns the count.
    pub fn unregister_all_by_source(&mut self, source: &str) -> usize {
        let ids = self.find_all_by_source(source);
        ids.into_iter().filter(|id| self.unregister(*id)).count()
    }

    // -----------------------------------------------------------------------
    // Change tracking
    // -----------------------------------------------------------------------

    /// The version arena every registered container lives in.
    pub fn storage(&self) -> &VersionStorage {
        &self.storage
    }

    /// Suspend change-queue tracking until the guard is dropped.
    pub fn dont_track_changes(&self) -> TrackingGuard {
        self.storage.dont_track()
    }

    /// Drain the ids changed since the last drain.
    pub fn take_changed(&self) -> Vec<TinyId> {
        self.storage.take_changed()
    }

    pub fn has_changes(&self) -> bool {
        self.storage.has_changes()
    }

    // -----------------------------------------------------------------------
    // Restore
    // -----------------------------------------------------------------------

    /// Replace (or recreate) the object a memento was taken from.
    ///
    /// Restored types get a schema version past both the memento's and the
    /// live type's, so every container built against either refreshes.
    /// Every restored container starts past the version of the object it
    /// replaces (or last had under this id), so object versions never go
    /// backwards.
    pub fn restore(&mut self, memento: &Memento) -> Result<(), ModelError> {
        let object = match memento.kind {
            ObjectKind::Type => {
                let mut ty: TinyType = memento.decode()?;
                let live = self
                    .find_by_id::<TinyType>(ty.id())
                    .map_or(0, TinyType::schema_version);
                ty.schema_version = ty.schema_version.max(live) + 1;
                RegistryObject::Type(ty)
            }
            ObjectKind::Entity => RegistryObject::Entity(memento.decode()?),
        };
        if object.id() != memento.id {
            return Err(ModelError::KindMismatch {
                id: memento.id,
                expected: memento.kind.to_string(),
                found: format!("snapshot of {}", object.id()),
            });
        }

        let kind = object.kind();
        let id = object.id();
        let live = match self.objects.get(&id) {
            Some(live) => live.version(),
            None => self.retired.get(&id).copied().unwrap_or(0),
        };
        object.raise_versions(live.max(memento.version) + 1);
        self.insert(object);
        tracing::debug!(id = %id, kind = %kind, version = memento.version, "restored object");
        match kind {
            ObjectKind::Type => self.refresh_type(id)?,
            ObjectKind::Entity => self.refresh_entity(id, true)?,
        };
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Refresh
    // -----------------------------------------------------------------------

    /// Bring a type's default-value object in line with its schema, creating
    /// it if needed, and resync cached field-type names.
    pub fn refresh_type(&mut self, id: TinyId) -> Result<bool, ModelError> {
        let renames: Vec<(usize, String)> = match self.find_by_id::<TinyType>(id) {
            Some(ty) => ty
                .fields()
                .iter()
                .enumerate()
                .filter_map(|(index, field)| {
                    let target = self.find_by_id::<TinyType>(field.field_type.id)?;
                    (target.name() != field.field_type.name).then(|| (index, target.name().to_owned()))
                })
                .collect(),
            None => return Ok(false),
        };

        let Some(ty) = self.find_by_id_mut::<TinyType>(id) else {
            return Ok(false);
        };
        for (index, name) in renames {
            ty.fields[index].field_type.name = name;
        }
        ty.ensure_default_object();
        let Some(mut default) = ty.default_value.take() else {
            return Ok(false);
        };

        let result = match self.find_by_id::<TinyType>(id) {
            Some(ty) => default.refresh_with(self, ty, None),
            None => Ok(false),
        };
        if let Some(ty) = self.find_by_id_mut::<TinyType>(id) {
            ty.default_value = Some(default);
        }
        result
    }

    /// Ids of every type reachable from `roots` through fields, dependencies
    /// before dependents.
    fn type_closure(&self, roots: impl IntoIterator<Item = TinyId>) -> Vec<TinyId> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        for root in roots {
            let mut stack = vec![(root, false)];
            while let Some((id, expanded)) = stack.pop() {
                if expanded {
                    order.push(id);
                    continue;
                }
                if !visited.insert(id) {
                    continue;
                }
                let Some(ty) = self.find_by_id::<TinyType>(id) else {
                    continue;
                };
                stack.push((id, true));
                for field in ty.fields() {
                    if !visited.contains(&field.field_type.id) {
                        stack.push((field.field_type.id, false));
                    }
                }
            }
        }
        order
    }

    fn refresh_types(&mut self, ids: Vec<TinyId>) -> Result<bool, ModelError> {
        let mut changed = false;
        for id in ids {
            changed |= self.refresh_type(id)?;
        }
        Ok(changed)
    }

    /// Refresh every component of an entity. Unless `skip_type_check`, the
    /// component types (and the types they reach) are refreshed first.
    pub fn refresh_entity(&mut self, id: TinyId, skip_type_check: bool) -> Result<bool, ModelError> {
        let Some(entity) = self.find_by_id::<TinyEntity>(id) else {
            return Ok(false);
        };
        if !skip_type_check {
            let roots: Vec<TinyId> = entity.components().iter().map(|c| c.type_ref().id).collect();
            let closure = self.type_closure(roots);
            self.refresh_types(closure)?;
        }

        let Some(entity) = self.find_by_id_mut::<TinyEntity>(id) else {
            return Ok(false);
        };
        let mut components = std::mem::take(&mut entity.components);

        let mut changed = false;
        let mut first_error = None;
        for component in &mut components {
            let Some(ty) = self.find_by_id::<TinyType>(component.type_ref().id) else {
                tracing::warn!(
                    entity = %id,
                    component = %component.type_ref().name,
                    "component type is not registered -- skipping refresh"
                );
                continue;
            };
            match component.refresh_with(self, ty, ty.default_value()) {
                Ok(migrated) => changed |= migrated,
                Err(err) => {
                    tracing::warn!(entity = %id, component = %ty.name(), error = %err, "component refresh failed");
                    first_error.get_or_insert(err);
                }
            }
        }

        if let Some(entity) = self.find_by_id_mut::<TinyEntity>(id) {
            entity.components = components;
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(changed),
        }
    }

    /// Refresh a free-standing object against its registered type.
    pub fn refresh_object(&mut self, object: &mut TinyObject, skip_type_check: bool) -> Result<bool, ModelError> {
        if !skip_type_check {
            let closure = self.type_closure([object.type_ref().id]);
            self.refresh_types(closure)?;
        }
        object.refresh(self)
    }

    /// Refresh every type, then every entity. Failures are logged and the
    /// pass continues.
    pub fn refresh_all(&mut self) -> bool {
        let types: Vec<TinyId> = self.find_all_by_type::<TinyType>().map(TinyType::id).collect();
        let closure = self.type_closure(types);
        let mut changed = false;
        for id in closure {
            match self.refresh_type(id) {
                Ok(migrated) => changed |= migrated,
                Err(err) => tracing::warn!(id = %id, error = %err, "type refresh failed -- continuing"),
            }
        }

        let entities: Vec<TinyId> = self.find_all_by_type::<TinyEntity>().map(TinyEntity::id).collect();
        for id in entities {
            match self.refresh_entity(id, true) {
                Ok(migrated) => changed |= migrated,
                Err(err) => tracing::warn!(id = %id, error = %err, "entity refresh failed -- continuing"),
            }
        }
        changed
    }

    /// The editable default-value object of a type, created on demand.
    pub fn type_default_mut(&mut self, id: TinyId) -> Option<&mut TinyObject> {
        let missing = self
            .find_by_id::<TinyType>(id)
            .is_some_and(|ty| ty.default_value().is_none());
        if missing {
            if let Err(err) = self.refresh_type(id) {
                tracing::warn!(id = %id, error = %err, "could not build type default");
            }
        }
        self.find_by_id_mut::<TinyType>(id)?.default_value_mut()
    }

    // -----------------------------------------------------------------------
    // Components
    // -----------------------------------------------------------------------

    /// Add a component of a registered component type to an entity, refreshed
    /// against the type's default. Returns the existing component when the
    /// entity already has one of that type.
    pub fn add_component(&mut self, entity_id: TinyId, type_id: TinyId) -> Result<&mut TinyObject, ModelError> {
        let ty = self
            .find_by_id::<TinyType>(type_id)
            .ok_or(ModelError::UnknownType { id: type_id })?;
        if ty.code() != TypeCode::Component {
            return Err(ModelError::KindMismatch {
                id: type_id,
                expected: "component type".to_owned(),
                found: format!("{:?} type", ty.code()),
            });
        }
        let type_ref = ty.type_ref();
        let closure = self.type_closure([type_id]);
        self.refresh_types(closure)?;

        match self.objects.get_mut(&entity_id) {
            Some(RegistryObject::Entity(entity)) => {
                entity.add_component(type_ref);
            }
            Some(other) => {
                return Err(ModelError::KindMismatch {
                    id: entity_id,
                    expected: ObjectKind::Entity.to_string(),
                    found: other.kind().to_string(),
                });
            }
            None => return Err(ModelError::ObjectNotFound { id: entity_id }),
        }
        self.refresh_entity(entity_id, true)?;

        self.find_by_id_mut::<TinyEntity>(entity_id)
            .and_then(|entity| entity.get_component_mut(type_id))
            .ok_or(ModelError::ObjectNotFound { id: entity_id })
    }

    // -----------------------------------------------------------------------
    // Schema helpers
    // -----------------------------------------------------------------------

    /// Summed schema versions of `ty` and every type reachable from it, and
    /// summed default-value versions of the reachable types (excluding `ty`).
    ///
    /// `ty` need not be registered (or may be temporarily detached).
    pub fn schema_versions(&self, ty: &TinyType) -> (u64, u64) {
        let mut visited = HashSet::from([ty.id()]);
        let mut schema = ty.schema_version();
        let mut defaults = 0u64;
        let mut stack: Vec<TinyId> = ty.fields().iter().map(|f| f.field_type.id).collect();
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(nested) = self.find_by_id::<TinyType>(id) else {
                continue;
            };
            schema = schema.wrapping_add(nested.schema_version());
            defaults = defaults.wrapping_add(nested.default_value().map_or(0, TinyObject::version));
            stack.extend(nested.fields().iter().map(|f| f.field_type.id));
        }
        (schema, defaults)
    }

    /// Whether `target` is reachable from `from` through non-array struct
    /// fields (so an instance of `from` would have to contain a `target`).
    pub fn type_reaches(&self, from: &TinyType, target: TinyId) -> bool {
        if from.id() == target {
            return true;
        }
        let mut visited = HashSet::from([from.id()]);
        let mut stack = vec![from];
        while let Some(ty) = stack.pop() {
            for field in ty.fields().iter().filter(|f| !f.array) {
                if field.field_type.id == target {
                    return true;
                }
                if !visited.insert(field.field_type.id) {
                    continue;
                }
                if let Some(nested) = self.find_by_id::<TinyType>(field.field_type.id) {
                    if nested.code().is_object() {
                        stack.push(nested);
                    }
                }
            }
        }
        false
    }

    /// A fresh value of `ty`: the zero value for scalars, an object refreshed
    /// against the type default for structs, the first member for enums, a
    /// none reference for entity references and `Null` for assets.
    pub fn create_instance(&self, ty: &TinyType) -> Value {
        match ty.code() {
            code if code.is_scalar() => Value::zero(code),
            TypeCode::EntityReference => Value::Entity(EntityRef::none()),
            TypeCode::Enum => {
                let member = ty.fields().first().map_or(TinyId::EMPTY, |f| f.id);
                Value::Enum(EnumRef::new(ty.type_ref(), member))
            }
            code if code.is_object() => {
                let mut object = TinyObject::new(ty.type_ref());
                if let Err(err) = object.refresh_with(self, ty, ty.default_value()) {
                    tracing::warn!(schema = %ty.name(), error = %err, "new instance could not be refreshed");
                }
                Value::Object(object)
            }
            _ => Value::Null,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
