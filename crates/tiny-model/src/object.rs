//! Struct, component and configuration instances.

use std::collections::BTreeMap;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::container::{FieldValue, PropertiesContainer};
use crate::id::TinyId;
use crate::list::TinyList;
use crate::reference::TypeRef;
use crate::registry::Registry;
use crate::schema::TinyType;
use crate::value::Value;
use crate::version::VersionSlot;
use crate::ModelError;

/// A versioned container of field values described by a [`TinyType`].
///
/// Fields fall back to the type's default until set. Every mutation (here or
/// in a nested object or list) increments [`TinyObject::version`] and, once
/// the object is owned by a registered entity or type, enqueues that owner
/// as changed.
#[derive(Debug, Clone, Default)]
pub struct TinyObject {
    pub(crate) type_ref: TypeRef,
    pub(crate) is_default_value: bool,
    pub(crate) props: PropertiesContainer,
}

impl TinyObject {
    /// A detached object of the given type. It has no slots until refreshed.
    pub fn new(type_ref: TypeRef) -> Self {
        Self::with_slot(type_ref, VersionSlot::detached())
    }

    /// A detached object with no type; every value is dynamic.
    pub fn untyped() -> Self {
        Self::new(TypeRef::none())
    }

    pub(crate) fn with_slot(type_ref: TypeRef, slot: VersionSlot) -> Self {
        Self {
            type_ref,
            is_default_value: false,
            props: PropertiesContainer::with_slot(slot),
        }
    }

    pub fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    /// Whether this object is the default value owned by its type.
    pub fn is_default_value(&self) -> bool {
        self.is_default_value
    }

    pub fn version(&self) -> u64 {
        self.props.version()
    }

    /// Raw slot storage.
    pub fn properties(&self) -> &PropertiesContainer {
        &self.props
    }

    // -----------------------------------------------------------------------
    // Field access
    // -----------------------------------------------------------------------

    /// Read a field. Schema fields always resolve (to the computed default
    /// when not overridden); dynamic values resolve once set; anything else
    /// is `None`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.props.get(name)
    }

    /// Like [`get`](Self::get) but failing with
    /// [`ModelError::FieldNotFound`].
    pub fn value(&self, name: &str) -> Result<&Value, ModelError> {
        self.get(name).ok_or_else(|| ModelError::FieldNotFound {
            owner: self.type_ref.name.clone(),
            name: name.to_owned(),
        })
    }

    pub fn get_by_id(&self, field_id: TinyId) -> Option<&Value> {
        self.props.get_by_id(field_id)
    }

    /// Mutable access to a value, for reaching nested containers.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.props.get_mut(name)
    }

    /// Nested object stored in `name`.
    pub fn object_mut(&mut self, name: &str) -> Option<&mut TinyObject> {
        self.get_mut(name).and_then(Value::as_object_mut)
    }

    /// Nested list stored in `name`.
    pub fn list_mut(&mut self, name: &str) -> Option<&mut TinyList> {
        self.get_mut(name).and_then(Value::as_list_mut)
    }

    /// Assign a field.
    ///
    /// Schema fields are type checked: primitive targets accept any scalar
    /// (converted, zero on failure); struct targets need an object of the
    /// field's type, list targets a list, enum targets an enum member,
    /// reference and asset targets a matching handle or `Null`. The slot is
    /// marked overridden. Unknown names create a dynamic value typed by the
    /// value itself.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), ModelError> {
        self.props.set(name, value.into())
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.props.has_property(name)
    }

    /// Drop a dynamic value.
    pub fn remove_property(&mut self, name: &str) -> Option<Value> {
        self.props.remove_property(name)
    }

    pub fn is_overridden(&self) -> bool {
        self.props.is_overridden()
    }

    pub fn is_field_overridden(&self, name: &str) -> bool {
        self.props.is_field_overridden(name)
    }

    pub fn set_overridden(&mut self, name: &str, overridden: bool) -> bool {
        self.props.set_overridden(name, overridden)
    }

    /// Deep copy of another object's type, slots and dynamic values.
    pub fn copy_from(&mut self, other: &TinyObject) {
        if !other.type_ref.is_none() {
            self.type_ref = other.type_ref.clone();
        }
        self.props.copy_from(&other.props);
    }

    // -----------------------------------------------------------------------
    // Refresh / reset
    // -----------------------------------------------------------------------

    /// Refresh against the registered type and its default value.
    ///
    /// Unregistered types leave the object untouched.
    pub fn refresh(&mut self, registry: &Registry) -> Result<bool, ModelError> {
        let Some(schema) = registry.find_by_id::<TinyType>(self.type_ref.id) else {
            return Ok(false);
        };
        let default = if self.is_default_value {
            None
        } else {
            schema.default_value()
        };
        self.refresh_with(registry, schema, default)
    }

    /// Refresh against an explicit schema and default.
    pub fn refresh_with(
        &mut self,
        registry: &Registry,
        schema: &TinyType,
        default: Option<&TinyObject>,
    ) -> Result<bool, ModelError> {
        if !schema.code().has_fields() {
            return Ok(false);
        }
        if self.type_ref.name != schema.name() {
            self.type_ref.name = schema.name().to_owned();
        }
        self.props.refresh(registry, schema, default)
    }

    /// Every field back to the type default.
    pub fn reset(&mut self, registry: &Registry) -> Result<(), ModelError> {
        let Some(schema) = registry.find_by_id::<TinyType>(self.type_ref.id) else {
            return Ok(());
        };
        let default = if self.is_default_value {
            None
        } else {
            schema.default_value()
        };
        self.reset_with(registry, schema, default)
    }

    pub fn reset_with(
        &mut self,
        registry: &Registry,
        schema: &TinyType,
        default: Option<&TinyObject>,
    ) -> Result<(), ModelError> {
        if !schema.code().has_fields() {
            return Ok(());
        }
        self.props.reset(registry, schema, default)
    }

    /// Relink under `parent`.
    pub(crate) fn attach(&mut self, parent: &VersionSlot) {
        self.props.attach_under(parent);
    }

    pub(crate) fn raise_versions(&self, floor: u64) {
        self.props.raise_versions(floor);
    }
}

impl PartialEq for TinyObject {
    fn eq(&self, other: &Self) -> bool {
        self.type_ref == other.type_ref && self.props == other.props
    }
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

impl Serialize for TinyObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("TinyObject", 3)?;
        state.serialize_field("type", &self.type_ref)?;
        state.serialize_field("values", &self.props.values)?;
        state.serialize_field("dynamic", &self.props.dynamic)?;
        state.end()
    }
}

#[derive(Deserialize)]
struct ObjectRepr {
    #[serde(rename = "type", default)]
    type_ref: TypeRef,
    #[serde(default)]
    values: Vec<FieldValue>,
    #[serde(default)]
    dynamic: Option<BTreeMap<String, Value>>,
}

impl<'de> Deserialize<'de> for TinyObject {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = ObjectRepr::deserialize(deserializer)?;
        Ok(Self {
            type_ref: repr.type_ref,
            is_default_value: false,
            props: PropertiesContainer::from_parts(repr.values, repr.dynamic),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{builtin, TypeCode};

    fn point_type(registry: &mut Registry) -> (TinyId, TinyId, TinyId) {
        let ty = TinyId::new();
        let x = TinyId::new();
        let y = TinyId::new();
        let int32 = builtin::type_ref(TypeCode::Int32).unwrap();
        let point = registry.create_type(ty, "Point", TypeCode::Struct);
        point.create_field(x, "x", int32.clone(), false).unwrap();
        point.create_field(y, "y", int32, false).unwrap();
        (ty, x, y)
    }

    #[test]
    fn fresh_object_reads_defaults() {
        let mut registry = Registry::new();
        let (ty, _, _) = point_type(&mut registry);
        registry.refresh_type(ty).unwrap();

        let type_ref = registry.find_by_id::<TinyType>(ty).unwrap().type_ref();
        let mut point = TinyObject::new(type_ref);
        assert!(point.get("x").is_none());
        assert!(point.refresh(&registry).unwrap());

        assert_eq!(point.get("x"), Some(&Value::Int32(0)));
        assert!(!point.is_overridden());
        assert!(matches!(
            point.value("nope"),
            Err(ModelError::FieldNotFound { .. })
        ));
    }

    #[test]
    fn set_marks_overridden_and_bumps_version() {
        let mut registry = Registry::new();
        let (ty, _, _) = point_type(&mut registry);
        let mut point = TinyObject::new(registry.find_by_id::<TinyType>(ty).unwrap().type_ref());
        point.refresh(&registry).unwrap();
        let before = point.version();

        point.set("x", 7).unwrap();
        assert!(point.version() > before);
        assert_eq!(point.get("x"), Some(&Value::Int32(7)));
        assert!(point.is_field_overridden("x"));
        assert!(!point.is_field_overridden("y"));

        let err = point.set("y", TinyObject::untyped()).unwrap_err();
        assert!(matches!(err, ModelError::TypeMismatch { .. }));
    }

    #[test]
    fn serde_roundtrip_preserves_values() {
        let mut registry = Registry::new();
        let (ty, _, _) = point_type(&mut registry);
        let mut point = TinyObject::new(registry.find_by_id::<TinyType>(ty).unwrap().type_ref());
        point.refresh(&registry).unwrap();
        point.set("y", 3).unwrap();
        point.set("label", "origin").unwrap();

        let json = serde_json::to_value(&point).unwrap();
        let mut back: TinyObject = serde_json::from_value(json).unwrap();
        assert_eq!(back, point);

        back.refresh(&registry).unwrap();
        assert_eq!(back.get("y"), Some(&Value::Int32(3)));
        assert!(back.is_field_overridden("y"));
    }

    #[test]
    fn copy_from_is_deep() {
        let mut source = TinyObject::untyped();
        source.set("inner", TinyObject::untyped()).unwrap();
        let mut target = TinyObject::untyped();
        target.copy_from(&source);

        source
            .object_mut("inner")
            .unwrap()
            .set("flag", true)
            .unwrap();
        assert!(target
            .get("inner")
            .and_then(Value::as_object)
            .unwrap()
            .get("flag")
            .is_none());
    }
}
