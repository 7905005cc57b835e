//! Homogeneous, versioned arrays.

use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::container::{adopt, attach_value, coerce, migrate_field_value, raise_value, RefreshStamp};
use crate::reference::TypeRef;
use crate::registry::Registry;
use crate::schema::{TinyType, TypeCode};
use crate::value::Value;
use crate::version::VersionSlot;
use crate::ModelError;

/// A dynamic array whose element type comes from its own type reference.
///
/// Elements are checked against the element type on insertion. An untyped
/// list takes its element type from the first element pushed. Nested objects
/// are owned by the list, so mutating one bumps the list's version.
#[derive(Debug, Default)]
pub struct TinyList {
    pub(crate) element_type: TypeRef,
    pub(crate) element_code: TypeCode,
    pub(crate) items: Vec<Value>,
    pub(crate) stamp: Option<RefreshStamp>,
    /// Edited through the public API since it was adopted by its container.
    pub(crate) touched: bool,
    pub(crate) slot: VersionSlot,
}

impl TinyList {
    /// A detached list of `element_code` elements.
    pub fn new(element_type: TypeRef, element_code: TypeCode) -> Self {
        Self::with_slot(element_type, element_code, VersionSlot::detached())
    }

    /// A detached list of instances of `element`.
    pub fn of(element: &TinyType) -> Self {
        Self::new(element.type_ref(), element.code())
    }

    /// A detached list whose element type is inferred on first push.
    pub fn untyped() -> Self {
        Self::new(TypeRef::none(), TypeCode::Unknown)
    }

    pub(crate) fn with_slot(element_type: TypeRef, element_code: TypeCode, slot: VersionSlot) -> Self {
        Self {
            element_type,
            element_code,
            items: Vec::new(),
            stamp: None,
            touched: false,
            slot,
        }
    }

    pub fn element_type(&self) -> &TypeRef {
        &self.element_type
    }

    pub fn element_code(&self) -> TypeCode {
        self.element_code
    }

    pub fn version(&self) -> u64 {
        self.slot.version()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    /// Mutable access to an element, for reaching nested objects.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Value> {
        self.items.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }

    fn out_of_range(&self, index: usize) -> ModelError {
        ModelError::IndexOutOfRange {
            index,
            len: self.items.len(),
        }
    }

    fn check(&mut self, value: Value) -> Result<Value, ModelError> {
        if self.element_code == TypeCode::Unknown && self.element_type.is_none() {
            self.element_code = value.type_code();
            if let Value::Object(object) = &value {
                self.element_type = object.type_ref().clone();
            }
        }
        coerce(self.element_code, &self.element_type, value).map_err(|rejected| {
            let expected = format!("{:?}", self.element_code);
            tracing::error!(
                expected = %expected,
                found = rejected.kind_name(),
                "list element type mismatch"
            );
            ModelError::TypeMismatch {
                field: format!("[{}]", self.element_type.name),
                expected,
                found: rejected.kind_name().to_owned(),
            }
        })
    }

    /// Append an element (converted to the element type).
    pub fn push(&mut self, value: impl Into<Value>) -> Result<(), ModelError> {
        let value = self.check(value.into())?;
        self.items.push(adopt(value, &self.slot));
        self.touch();
        Ok(())
    }

    /// Replace the element at `index`.
    pub fn set(&mut self, index: usize, value: impl Into<Value>) -> Result<(), ModelError> {
        if index >= self.items.len() {
            return Err(self.out_of_range(index));
        }
        let value = self.check(value.into())?;
        self.items[index] = adopt(value, &self.slot);
        self.touch();
        Ok(())
    }

    pub fn remove_at(&mut self, index: usize) -> Result<Value, ModelError> {
        if index >= self.items.len() {
            return Err(self.out_of_range(index));
        }
        let removed = self.items.remove(index);
        self.touch();
        Ok(removed)
    }

    pub fn clear(&mut self) {
        if self.items.is_empty() {
            return;
        }
        self.items.clear();
        self.touch();
    }

    /// Truncate, or pad with the element type's default instance.
    pub fn resize(&mut self, registry: &Registry, len: usize) {
        if len == self.items.len() {
            return;
        }
        if len < self.items.len() {
            self.items.truncate(len);
        } else {
            let filler = match self.element_type.dereference(registry) {
                Some(element) => registry.create_instance(element),
                None => Value::zero(self.element_code),
            };
            while self.items.len() < len {
                self.items.push(adopt(filler.clone(), &self.slot));
            }
        }
        self.touch();
    }

    /// Deep copy of another list's element type and elements.
    pub fn copy_from(&mut self, other: &TinyList) {
        self.element_type = other.element_type.clone();
        self.element_code = other.element_code;
        self.items = other.items.clone();
        self.stamp = None;
        self.attach_children();
        self.touch();
    }

    /// Whether the list was edited since its container adopted it.
    pub fn is_touched(&self) -> bool {
        self.touched
    }

    fn touch(&mut self) {
        self.touched = true;
        self.slot.bump();
    }

    /// Refresh against the registered element type.
    pub fn refresh(&mut self, registry: &Registry) -> Result<bool, ModelError> {
        let Some(element) = registry.find_by_id::<TinyType>(self.element_type.id) else {
            return Ok(false);
        };
        self.refresh_with(registry, element)
    }

    /// Migrate every element to `element` when its schema or default changed
    /// since the last refresh; otherwise only visit nested objects.
    pub fn refresh_with(&mut self, registry: &Registry, element: &TinyType) -> Result<bool, ModelError> {
        let stamp = RefreshStamp::compute(registry, element, element.default_value());
        if self.stamp == Some(stamp) && self.element_type.id == element.id() {
            let mut changed = false;
            for item in &mut self.items {
                if let Value::Object(object) = item {
                    changed |= object.refresh_with(registry, element, element.default_value())?;
                }
            }
            return Ok(changed);
        }

        self.set_element_type(element.type_ref(), element.code());
        let items = std::mem::take(&mut self.items);
        let mut migrated = Vec::with_capacity(items.len());
        for item in items {
            migrated.push(migrate_field_value(registry, item, element, false, None, &self.slot)?);
        }
        self.items = migrated;
        self.stamp = Some(stamp);
        self.slot.bump();
        Ok(true)
    }

    pub(crate) fn set_element_type(&mut self, element_type: TypeRef, element_code: TypeCode) {
        if self.element_type.id != element_type.id || self.element_code != element_code {
            self.stamp = None;
        }
        self.element_type = element_type;
        self.element_code = element_code;
    }

    /// Convert this list for a field of another element type. `Err` hands
    /// back the first element that does not fit.
    pub(crate) fn retarget(mut self, element_type: TypeRef, element_code: TypeCode) -> Result<TinyList, Value> {
        let items = std::mem::take(&mut self.items);
        let mut converted = Vec::with_capacity(items.len());
        for item in items {
            converted.push(coerce(element_code, &element_type, item)?);
        }
        self.items = converted;
        self.set_element_type(element_type, element_code);
        self.attach_children();
        Ok(self)
    }

    pub(crate) fn attach_under(&mut self, parent: &VersionSlot) {
        self.slot.relink(parent.storage(), Some(parent), None);
        self.attach_children();
    }

    pub(crate) fn raise_versions(&self, floor: u64) {
        self.slot.raise_to(floor);
        for item in &self.items {
            raise_value(item, floor);
        }
    }

    fn attach_children(&mut self) {
        let slot = &self.slot;
        for item in &mut self.items {
            attach_value(item, slot);
        }
    }
}

impl Clone for TinyList {
    fn clone(&self) -> Self {
        let mut copy = Self {
            element_type: self.element_type.clone(),
            element_code: self.element_code,
            items: self.items.clone(),
            stamp: self.stamp,
            touched: false,
            slot: self.slot.clone(),
        };
        copy.attach_children();
        copy
    }
}

impl PartialEq for TinyList {
    fn eq(&self, other: &Self) -> bool {
        self.element_type == other.element_type && self.items == other.items
    }
}

impl<'a> IntoIterator for &'a TinyList {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

impl Serialize for TinyList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("TinyList", 3)?;
        state.serialize_field("type", &self.element_type)?;
        state.serialize_field("code", &self.element_code)?;
        state.serialize_field("items", &self.items)?;
        state.end()
    }
}

#[derive(Deserialize)]
struct ListRepr {
    #[serde(rename = "type", default)]
    element_type: TypeRef,
    #[serde(default)]
    code: TypeCode,
    #[serde(default)]
    items: Vec<Value>,
}

impl<'de> Deserialize<'de> for TinyList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = ListRepr::deserialize(deserializer)?;
        let mut list = TinyList::new(repr.element_type, repr.code);
        list.items = repr.items;
        list.attach_children();
        Ok(list)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
