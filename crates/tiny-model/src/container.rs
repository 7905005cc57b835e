//! Versioned field storage.
//!
//! [`PropertiesContainer`] keeps one [`FieldValue`] slot per schema field,
//! matched to the schema by stable field id, plus an optional map of dynamic
//! (non-schema) values. It is the storage behind [`TinyObject`]; the migration
//! helpers here are shared with [`TinyList`].
//!
//! Refresh compares a stamp of the schema and default-value versions. When
//! the stamp is unchanged only nested containers are visited; otherwise the
//! slots are re-synchronized and migrated.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity::TinyEntity;
use crate::id::TinyId;
use crate::list::TinyList;
use crate::object::TinyObject;
use crate::reference::{EntityRef, EnumRef, Reference, TypeRef};
use crate::registry::Registry;
use crate::schema::{TinyField, TinyType, TypeCode};
use crate::value::Value;
use crate::version::VersionSlot;
use crate::ModelError;

// ---------------------------------------------------------------------------
// Slots and layout
// ---------------------------------------------------------------------------

/// One field slot.
///
/// `overridden == false` means the value is whatever the schema default
/// currently says; the next refresh rebinds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub id: TinyId,
    pub value: Value,
    #[serde(default)]
    pub overridden: bool,
}

impl FieldValue {
    fn empty(id: TinyId) -> Self {
        Self {
            id,
            value: Value::Null,
            overridden: false,
        }
    }
}

/// Resolved description of the schema field behind slot `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldProperty {
    pub field_id: TinyId,
    pub name: String,
    pub type_ref: TypeRef,
    pub type_code: TypeCode,
    pub array: bool,
}

/// Versions a container was last refreshed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RefreshStamp {
    schema_id: TinyId,
    schema_version: u64,
    default_version: u64,
}

impl RefreshStamp {
    pub(crate) fn compute(registry: &Registry, schema: &TinyType, default: Option<&TinyObject>) -> Self {
        let (schema_version, nested_defaults) = registry.schema_versions(schema);
        Self {
            schema_id: schema.id(),
            schema_version,
            default_version: nested_defaults + default.map_or(0, TinyObject::version),
        }
    }
}

// ---------------------------------------------------------------------------
// PropertiesContainer
// ---------------------------------------------------------------------------

/// Field slots, dynamic extensions and the version slot of one object.
#[derive(Debug, Default)]
pub struct PropertiesContainer {
    pub(crate) values: Vec<FieldValue>,
    pub(crate) dynamic: Option<BTreeMap<String, Value>>,
    pub(crate) layout: Vec<FieldProperty>,
    pub(crate) stamp: Option<RefreshStamp>,
    pub(crate) slot: VersionSlot,
}

impl PropertiesContainer {
    pub(crate) fn with_slot(slot: VersionSlot) -> Self {
        Self {
            slot,
            ..Self::default()
        }
    }

    /// Rebuild from deserialized parts. Children are linked under the new
    /// (detached) slot.
    pub(crate) fn from_parts(values: Vec<FieldValue>, dynamic: Option<BTreeMap<String, Value>>) -> Self {
        let mut container = Self {
            values,
            dynamic: dynamic.filter(|d| !d.is_empty()),
            ..Self::default()
        };
        container.attach_children();
        container
    }

    pub fn version(&self) -> u64 {
        self.slot.version()
    }

    /// Field slots in schema order (as of the last refresh).
    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    /// Resolved schema layout (as of the last refresh).
    pub fn layout(&self) -> &[FieldProperty] {
        &self.layout
    }

    /// Names of the dynamic extension values, sorted.
    pub fn dynamic_names(&self) -> impl Iterator<Item = &str> {
        self.dynamic
            .iter()
            .flat_map(|d| d.keys())
            .map(String::as_str)
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.layout.iter().position(|p| p.name == name)
    }

    /// Schema field value (computed default when not overridden), then
    /// dynamic value, else `None`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        if let Some(index) = self.index_of(name) {
            return self.values.get(index).map(|slot| &slot.value);
        }
        self.dynamic.as_ref().and_then(|d| d.get(name))
    }

    /// Mutable access to a value, meant for reaching nested containers.
    ///
    /// Mutate nested objects and lists through their own setters; assigning
    /// through the reference bypasses type checks and version tracking.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        if let Some(index) = self.index_of(name) {
            return self.values.get_mut(index).map(|slot| &mut slot.value);
        }
        self.dynamic.as_mut().and_then(|d| d.get_mut(name))
    }

    /// Value of the slot with the given field id.
    pub fn get_by_id(&self, field_id: TinyId) -> Option<&Value> {
        self.values
            .iter()
            .find(|slot| slot.id == field_id)
            .map(|slot| &slot.value)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.index_of(name).is_some()
            || self.dynamic.as_ref().is_some_and(|d| d.contains_key(name))
    }

    /// Assign a value. See [`TinyObject::set`].
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), ModelError> {
        let Some(index) = self.index_of(name) else {
            return self.set_dynamic(name, value);
        };
        let prop = &self.layout[index];
        let coerced = if prop.array {
            match value {
                Value::List(list) => list
                    .retarget(prop.type_ref.clone(), prop.type_code)
                    .map(Value::List),
                other => Err(other),
            }
        } else {
            coerce(prop.type_code, &prop.type_ref, value)
        };
        let value = match coerced {
            Ok(value) => value,
            Err(rejected) => {
                let expected = if prop.array {
                    format!("List<{:?}>", prop.type_code)
                } else {
                    format!("{:?}", prop.type_code)
                };
                tracing::error!(
                    field = %prop.name,
                    expected = %expected,
                    found = rejected.kind_name(),
                    "could not assign value to field"
                );
                return Err(ModelError::TypeMismatch {
                    field: prop.name.clone(),
                    expected,
                    found: rejected.kind_name().to_owned(),
                });
            }
        };
        let slot = &mut self.values[index];
        slot.value = adopt(value, &self.slot);
        slot.overridden = true;
        self.slot.bump();
        Ok(())
    }

    fn set_dynamic(&mut self, name: &str, value: Value) -> Result<(), ModelError> {
        let dynamic = self.dynamic.get_or_insert_with(BTreeMap::new);
        let value = match dynamic.get(name) {
            None | Some(Value::Null) => value,
            Some(existing) if existing.kind_name() == value.kind_name() => value,
            Some(existing) if existing.is_scalar() && value.is_scalar() => {
                value.convert_to(existing.type_code())
            }
            Some(existing) => {
                tracing::error!(
                    field = %name,
                    expected = existing.kind_name(),
                    found = value.kind_name(),
                    "could not assign value to dynamic property"
                );
                return Err(ModelError::TypeMismatch {
                    field: name.to_owned(),
                    expected: existing.kind_name().to_owned(),
                    found: value.kind_name().to_owned(),
                });
            }
        };
        dynamic.insert(name.to_owned(), adopt(value, &self.slot));
        self.slot.bump();
        Ok(())
    }

    /// Drop a dynamic value. Schema fields cannot be removed this way.
    pub fn remove_property(&mut self, name: &str) -> Option<Value> {
        let dynamic = self.dynamic.as_mut()?;
        let removed = dynamic.remove(name)?;
        if dynamic.is_empty() {
            self.dynamic = None;
        }
        self.slot.bump();
        Some(removed)
    }

    /// Any slot overridden, any nested container overridden, or any dynamic
    /// value present.
    pub fn is_overridden(&self) -> bool {
        self.dynamic.as_ref().is_some_and(|d| !d.is_empty())
            || self.values.iter().any(slot_overridden)
    }

    /// Whether the named schema field diverges from its default.
    pub fn is_field_overridden(&self, name: &str) -> bool {
        self.index_of(name)
            .and_then(|index| self.values.get(index))
            .is_some_and(slot_overridden)
    }

    /// Force the overridden flag of a schema field. Returns `false` for
    /// unknown names.
    pub fn set_overridden(&mut self, name: &str, overridden: bool) -> bool {
        let Some(index) = self.index_of(name) else {
            return false;
        };
        let slot = &mut self.values[index];
        if slot.overridden != overridden {
            slot.overridden = overridden;
            if !overridden {
                // Rebind to the default on the next refresh.
                self.stamp = None;
            }
            self.slot.bump();
        }
        true
    }

    pub(crate) fn copy_from(&mut self, other: &PropertiesContainer) {
        self.values = other.values.clone();
        self.dynamic = other.dynamic.clone();
        self.layout = other.layout.clone();
        self.stamp = None;
        self.attach_children();
        self.slot.bump();
    }

    // -----------------------------------------------------------------------
    // Refresh / reset
    // -----------------------------------------------------------------------

    /// Re-synchronize against `schema`. Returns `true` when slots were
    /// migrated (here or in a nested container).
    pub(crate) fn refresh(
        &mut self,
        registry: &Registry,
        schema: &TinyType,
        default: Option<&TinyObject>,
    ) -> Result<bool, ModelError> {
        // An edited list stops following the default list.
        for slot in &mut self.values {
            if let Value::List(list) = &slot.value {
                slot.overridden |= list.touched;
            }
        }

        let stamp = RefreshStamp::compute(registry, schema, default);
        if self.stamp == Some(stamp) && self.values.len() == schema.fields().len() {
            return self.refresh_children(registry, schema, default);
        }

        migrate_slots(schema.fields(), &mut self.values);
        self.absorb_dynamic(schema);
        self.layout = schema
            .fields()
            .iter()
            .map(|field| FieldProperty {
                field_id: field.id,
                name: field.name.clone(),
                type_ref: field.field_type.clone(),
                type_code: resolve_field_type(registry, schema, field)
                    .map_or(TypeCode::Unknown, TinyType::code),
                array: field.array,
            })
            .collect();

        for (index, field) in schema.fields().iter().enumerate() {
            let Some(field_type) = resolve_field_type(registry, schema, field) else {
                tracing::warn!(
                    schema = %schema.name(),
                    field = %field.name,
                    field_type = %field.field_type.id,
                    "field type is not registered -- leaving slot untouched"
                );
                continue;
            };
            if !field.array && field_type.code().is_object() && registry.type_reaches(field_type, schema.id()) {
                tracing::warn!(
                    schema = %schema.name(),
                    field = %field.name,
                    "struct field would contain its own type -- leaving slot untouched"
                );
                continue;
            }

            let field_default = default.and_then(|d| d.get_by_id(field.id));
            let slot = &mut self.values[index];
            let current = std::mem::take(&mut slot.value);

            slot.value = if !slot.overridden && !field.array && field_type.is_primitive() {
                default_primitive(registry, field_type, field_default)
            } else if !slot.overridden && !field.array && field_type.is_enum() {
                default_enum(field_type, field_default)
            } else if !slot.overridden && field.array {
                let seed = match field_default {
                    Some(Value::List(list)) => adopt(Value::List(list.clone()), &self.slot),
                    _ => current,
                };
                migrate_field_value(registry, seed, field_type, true, field_default, &self.slot)?
            } else {
                migrate_field_value(registry, current, field_type, field.array, field_default, &self.slot)?
            };

            if let Value::Entity(target) = &mut slot.value {
                resync_entity_name(registry, target);
            }
        }

        self.stamp = Some(stamp);
        self.slot.bump();
        Ok(true)
    }

    /// Stamp unchanged: give nested containers their own stamp check.
    fn refresh_children(
        &mut self,
        registry: &Registry,
        schema: &TinyType,
        default: Option<&TinyObject>,
    ) -> Result<bool, ModelError> {
        let mut changed = false;
        for (index, field) in schema.fields().iter().enumerate() {
            let Some(field_type) = resolve_field_type(registry, schema, field) else {
                continue;
            };
            let field_default = default.and_then(|d| d.get_by_id(field.id));
            match &mut self.values[index].value {
                Value::Object(child) if !registry.type_reaches(field_type, schema.id()) => {
                    let nested_default = field_default
                        .and_then(Value::as_object)
                        .or_else(|| field_type.default_value());
                    changed |= child.refresh_with(registry, field_type, nested_default)?;
                }
                Value::List(list) => {
                    changed |= list.refresh_with(registry, field_type)?;
                }
                _ => {}
            }
        }
        Ok(changed)
    }

    /// Every field back to its default, clearing overridden flags. Dynamic
    /// values are kept.
    pub(crate) fn reset(
        &mut self,
        registry: &Registry,
        schema: &TinyType,
        default: Option<&TinyObject>,
    ) -> Result<(), ModelError> {
        self.refresh(registry, schema, default)?;

        for (index, field) in schema.fields().iter().enumerate() {
            let Some(field_type) = resolve_field_type(registry, schema, field) else {
                continue;
            };
            let field_default = default.and_then(|d| d.get_by_id(field.id));
            let slot = &mut self.values[index];
            slot.overridden = false;

            if field.array {
                let reset = match field_default {
                    Some(Value::List(list)) => list.clone(),
                    _ => TinyList::new(field_type.type_ref(), field_type.code()),
                };
                slot.value = adopt(Value::List(reset), &self.slot);
                if let Value::List(list) = &mut slot.value {
                    list.refresh_with(registry, field_type)?;
                }
            } else if field_type.is_primitive() {
                slot.value = default_primitive(registry, field_type, field_default);
            } else if field_type.is_enum() {
                slot.value = default_enum(field_type, field_default);
            } else if let Value::Object(child) = &mut slot.value {
                let nested_default = field_default
                    .and_then(Value::as_object)
                    .or_else(|| field_type.default_value());
                child.reset_with(registry, field_type, nested_default)?;
            }
        }

        self.slot.bump();
        Ok(())
    }

    /// Move dynamic values whose names now match schema fields into their
    /// slots (as overridden). Unmatched dynamic values are discarded.
    fn absorb_dynamic(&mut self, schema: &TinyType) {
        let Some(mut dynamic) = self.dynamic.take() else {
            return;
        };
        for (index, field) in schema.fields().iter().enumerate() {
            if let Some(value) = dynamic.remove(&field.name) {
                let slot = &mut self.values[index];
                slot.value = value;
                slot.overridden = true;
            }
        }
        if !dynamic.is_empty() {
            tracing::debug!(
                schema = %schema.name(),
                discarded = dynamic.len(),
                "dropping dynamic values with no matching schema field"
            );
        }
    }

    // -----------------------------------------------------------------------
    // Version arena linkage
    // -----------------------------------------------------------------------

    /// Relink under `parent` (same arena), then relink every child.
    pub(crate) fn attach_under(&mut self, parent: &VersionSlot) {
        self.slot.relink(parent.storage(), Some(parent), None);
        self.attach_children();
    }

    pub(crate) fn attach_children(&mut self) {
        let slot = &self.slot;
        for field in &mut self.values {
            attach_value(&mut field.value, slot);
        }
        if let Some(dynamic) = &mut self.dynamic {
            for value in dynamic.values_mut() {
                attach_value(value, slot);
            }
        }
    }

    /// Lift this container and every nested one to at least `floor`.
    pub(crate) fn raise_versions(&self, floor: u64) {
        self.slot.raise_to(floor);
        let dynamic = self.dynamic.iter().flat_map(|d| d.values());
        for value in self.values.iter().map(|f| &f.value).chain(dynamic) {
            raise_value(value, floor);
        }
    }
}

impl Clone for PropertiesContainer {
    fn clone(&self) -> Self {
        let mut copy = Self {
            values: self.values.clone(),
            dynamic: self.dynamic.clone(),
            layout: self.layout.clone(),
            stamp: self.stamp,
            slot: self.slot.clone(),
        };
        copy.attach_children();
        copy
    }
}

impl PartialEq for PropertiesContainer {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values && self.dynamic == other.dynamic
    }
}

fn slot_overridden(slot: &FieldValue) -> bool {
    slot.overridden
        || match &slot.value {
            Value::Object(child) => child.is_overridden(),
            Value::List(list) => list.touched,
            _ => false,
        }
}

// ---------------------------------------------------------------------------
// Migration helpers
// ---------------------------------------------------------------------------

/// Reorder `slots` to match `fields` by id. New fields get an empty,
/// non-overridden slot appended then swapped into place; slots for removed
/// fields end up past the field count and are truncated.
pub(crate) fn migrate_slots(fields: &[TinyField], slots: &mut Vec<FieldValue>) {
    for (f, field) in fields.iter().enumerate() {
        match slots[f..].iter().position(|slot| slot.id == field.id) {
            Some(offset) => slots.swap(f, f + offset),
            None => {
                slots.push(FieldValue::empty(field.id));
                let last = slots.len() - 1;
                slots.swap(f, last);
            }
        }
    }
    slots.truncate(fields.len());
}

/// Link a child container's slot under `parent`.
pub(crate) fn attach_value(value: &mut Value, parent: &VersionSlot) {
    match value {
        Value::Object(object) => object.props.attach_under(parent),
        Value::List(list) => list.attach_under(parent),
        _ => {}
    }
}

pub(crate) fn raise_value(value: &Value, floor: u64) {
    match value {
        Value::Object(object) => object.props.raise_versions(floor),
        Value::List(list) => list.raise_versions(floor),
        _ => {}
    }
}

/// Take ownership of a value inside a container whose slot is `parent`.
pub(crate) fn adopt(mut value: Value, parent: &VersionSlot) -> Value {
    attach_value(&mut value, parent);
    value
}

fn resolve_field_type<'r>(
    registry: &'r Registry,
    schema: &'r TinyType,
    field: &TinyField,
) -> Option<&'r TinyType> {
    if field.field_type.id == schema.id() {
        return Some(schema);
    }
    registry.find_by_id::<TinyType>(field.field_type.id)
}

fn resync_entity_name(registry: &Registry, target: &mut EntityRef) {
    if let Some(entity) = registry.find_by_id::<TinyEntity>(target.id) {
        if target.name != entity.name() {
            target.name = entity.name().to_owned();
        }
    }
}

/// Check a value against a target type, converting scalars.
///
/// `Err` hands back the rejected value.
pub(crate) fn coerce(code: TypeCode, type_ref: &TypeRef, value: Value) -> Result<Value, Value> {
    match code {
        c if c.is_scalar() => {
            if value.is_scalar() {
                Ok(value.convert_to(c))
            } else {
                Err(value)
            }
        }
        TypeCode::Struct | TypeCode::Component | TypeCode::Configuration => match value {
            Value::Object(mut object)
                if object.type_ref().is_none() || object.type_ref().id == type_ref.id =>
            {
                object.type_ref = type_ref.clone();
                object.props.stamp = None;
                Ok(Value::Object(object))
            }
            other => Err(other),
        },
        TypeCode::Enum => match value {
            Value::Enum(e) if e.type_ref.is_none() || e.type_ref.id == type_ref.id => {
                Ok(Value::Enum(EnumRef::new(type_ref.clone(), e.member)))
            }
            other => Err(other),
        },
        TypeCode::EntityReference => match value {
            Value::Entity(target) => Ok(Value::Entity(target)),
            Value::Null => Ok(Value::Entity(Reference::none())),
            other => Err(other),
        },
        TypeCode::Asset => match value {
            Value::Asset(handle) => Ok(Value::Asset(handle)),
            Value::Null => Ok(Value::Null),
            other => Err(other),
        },
        _ => Ok(value),
    }
}

/// Default for a non-overridden primitive (scalar, reference or asset) slot.
fn default_primitive(registry: &Registry, field_type: &TinyType, default: Option<&Value>) -> Value {
    let code = field_type.code();
    match default {
        Some(value) if code.is_scalar() => value.convert_to(code),
        Some(Value::Entity(target)) if code == TypeCode::EntityReference => {
            Value::Entity(target.clone())
        }
        Some(Value::Asset(handle)) if code == TypeCode::Asset => Value::Asset(handle.clone()),
        _ => registry.create_instance(field_type),
    }
}

/// Default for a non-overridden enum slot: the default's member, else the
/// first member.
fn default_enum(field_type: &TinyType, default: Option<&Value>) -> Value {
    let member = match default {
        Some(Value::Enum(e)) => e.member,
        _ => first_member(field_type),
    };
    Value::Enum(EnumRef::new(field_type.type_ref(), member))
}

fn first_member(enum_type: &TinyType) -> TinyId {
    enum_type.fields().first().map_or(TinyId::EMPTY, |f| f.id)
}

/// Carry a value over to a (possibly changed) field type.
///
/// Scalars are converted; nested objects and lists are refreshed in place;
/// enum and reference values are kept when they still fit, else replaced by
/// the default. Component and configuration types cannot be field types.
pub(crate) fn migrate_field_value(
    registry: &Registry,
    value: Value,
    field_type: &TinyType,
    array: bool,
    default: Option<&Value>,
    parent: &VersionSlot,
) -> Result<Value, ModelError> {
    if array {
        let mut list = match value {
            Value::List(list) => list,
            _ => TinyList::with_slot(field_type.type_ref(), field_type.code(), parent.child()),
        };
        list.set_element_type(field_type.type_ref(), field_type.code());
        list.refresh_with(registry, field_type)?;
        return Ok(Value::List(list));
    }

    let code = field_type.code();
    let migrated = match code {
        c if c.is_scalar() => value.convert_to(c),
        TypeCode::Unknown => Value::Null,
        TypeCode::Component | TypeCode::Configuration => {
            return Err(ModelError::UnsupportedFieldType {
                type_name: field_type.name().to_owned(),
                code,
            });
        }
        TypeCode::Struct => {
            let mut object = match value {
                Value::Object(object) => object,
                _ => TinyObject::with_slot(field_type.type_ref(), parent.child()),
            };
            if object.type_ref.id != field_type.id() {
                object.props.stamp = None;
            }
            object.type_ref = field_type.type_ref();
            let nested_default = default
                .and_then(Value::as_object)
                .or_else(|| field_type.default_value());
            object.refresh_with(registry, field_type, nested_default)?;
            Value::Object(object)
        }
        TypeCode::Enum => {
            let member = match (&value, default) {
                (Value::Enum(e), _) => e.member,
                (_, Some(Value::Enum(e))) => e.member,
                _ => first_member(field_type),
            };
            Value::Enum(EnumRef::new(field_type.type_ref(), member))
        }
        TypeCode::EntityReference => match (value, default) {
            (Value::Entity(target), _) => Value::Entity(target),
            (_, Some(Value::Entity(target))) => Value::Entity(target.clone()),
            _ => Value::Entity(Reference::none()),
        },
        TypeCode::Asset => match (value, default) {
            (Value::Asset(handle), _) => Value::Asset(handle),
            (_, Some(Value::Asset(handle))) => Value::Asset(handle.clone()),
            _ => Value::Null,
        },
        _ => value,
    };
    Ok(migrated)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
