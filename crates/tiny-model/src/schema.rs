//! Type schemas.
//!
//! A [`TinyType`] describes the field set of a struct, component,
//! configuration or enum, or stands for one of the built-in primitive,
//! reference and asset types. Fields carry a stable [`TinyId`] so that
//! renames and reorders never lose container data.
//!
//! Every schema edit goes through a `TinyType` method, which bumps both the
//! type's version slot (so the change is recorded) and its `schema_version`
//! (so containers know they must migrate on their next refresh).

use serde::{Deserialize, Serialize};

use crate::id::TinyId;
use crate::object::TinyObject;
use crate::reference::{Reference, TypeRef};
use crate::value::AssetKind;
use crate::version::{VersionSlot, VersionStorage};
use crate::ModelError;

// ---------------------------------------------------------------------------
// TypeCode
// ---------------------------------------------------------------------------

/// Storage category of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TypeCode {
    #[default]
    Unknown,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Boolean,
    String,
    Component,
    Struct,
    Enum,
    Configuration,
    EntityReference,
    /// Handle to a host-owned asset (texture, sprite, font, ...).
    Asset,
}

impl TypeCode {
    /// Anything that is not a struct, component, enum or configuration.
    ///
    /// Reference and asset types count as primitive: they have no fields and
    /// their non-overridden slots are rebound to the default on refresh.
    pub fn is_primitive(self) -> bool {
        !matches!(
            self,
            TypeCode::Struct | TypeCode::Component | TypeCode::Enum | TypeCode::Configuration
        )
    }

    /// Numeric, boolean or string.
    pub fn is_scalar(self) -> bool {
        matches!(
            self,
            TypeCode::Int8
                | TypeCode::Int16
                | TypeCode::Int32
                | TypeCode::Int64
                | TypeCode::UInt8
                | TypeCode::UInt16
                | TypeCode::UInt32
                | TypeCode::UInt64
                | TypeCode::Float32
                | TypeCode::Float64
                | TypeCode::Boolean
                | TypeCode::String
        )
    }

    /// Types whose instances are [`TinyObject`]s.
    pub fn is_object(self) -> bool {
        matches!(
            self,
            TypeCode::Struct | TypeCode::Component | TypeCode::Configuration
        )
    }

    /// Types that may declare fields.
    pub fn has_fields(self) -> bool {
        !self.is_primitive()
    }
}

// ---------------------------------------------------------------------------
// TinyField
// ---------------------------------------------------------------------------

/// One declared field (or enum member) of a [`TinyType`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TinyField {
    pub id: TinyId,
    pub name: String,
    pub field_type: TypeRef,
    #[serde(default)]
    pub array: bool,
    #[serde(default)]
    pub documentation: String,
}

// ---------------------------------------------------------------------------
// TinyType
// ---------------------------------------------------------------------------

/// A registered type definition.
///
/// Struct-like and enum types lazily own a default-value [`TinyObject`]
/// (created by the registry on the first refresh). Editing that object edits
/// the default every non-overridden instance field falls back to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TinyType {
    pub(crate) id: TinyId,
    pub(crate) name: String,
    pub(crate) code: TypeCode,
    #[serde(default)]
    pub(crate) fields: Vec<TinyField>,
    #[serde(default)]
    pub(crate) default_value: Option<TinyObject>,
    #[serde(default)]
    pub(crate) schema_version: u64,
    #[serde(default)]
    pub(crate) persistence_id: Option<String>,
    #[serde(default)]
    pub(crate) documentation: String,
    #[serde(skip)]
    pub(crate) slot: VersionSlot,
}

impl TinyType {
    /// Create a detached type. Register it to start tracking changes.
    pub fn new(id: TinyId, name: impl Into<String>, code: TypeCode) -> Self {
        Self {
            id,
            name: name.into(),
            code,
            fields: Vec::new(),
            default_value: None,
            schema_version: 0,
            persistence_id: None,
            documentation: String::new(),
            slot: VersionSlot::detached(),
        }
    }

    pub fn id(&self) -> TinyId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code(&self) -> TypeCode {
        self.code
    }

    pub fn is_primitive(&self) -> bool {
        self.code.is_primitive()
    }

    pub fn is_enum(&self) -> bool {
        self.code == TypeCode::Enum
    }

    /// Reference to this type, carrying its current name.
    pub fn type_ref(&self) -> TypeRef {
        Reference::new(self.id, self.name.clone())
    }

    pub fn fields(&self) -> &[TinyField] {
        &self.fields
    }

    pub fn field_by_id(&self, id: TinyId) -> Option<&TinyField> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&TinyField> {
        self.fields.iter().find(|f| f.name == name)
    }

    fn field_index(&self, id: TinyId) -> Option<usize> {
        self.fields.iter().position(|f| f.id == id)
    }

    /// Counter of structural edits (fields, code). Containers compare it in
    /// their refresh stamp.
    pub fn schema_version(&self) -> u64 {
        self.schema_version
    }

    /// Change counter of the type and its default value.
    pub fn version(&self) -> u64 {
        self.slot.version()
    }

    pub fn default_value(&self) -> Option<&TinyObject> {
        self.default_value.as_ref()
    }

    /// Mutable access to the default-value object. `None` until the type has
    /// been refreshed through the registry.
    pub fn default_value_mut(&mut self) -> Option<&mut TinyObject> {
        self.default_value.as_mut()
    }

    /// Non-empty persistence id, if this type is asset-backed.
    pub fn persistence_id(&self) -> Option<&str> {
        self.persistence_id.as_deref().filter(|p| !p.is_empty())
    }

    pub fn set_persistence_id(&mut self, persistence_id: Option<String>) {
        self.persistence_id = persistence_id;
        self.slot.bump();
    }

    pub fn documentation(&self) -> &str {
        &self.documentation
    }

    pub fn set_documentation(&mut self, documentation: impl Into<String>) {
        self.documentation = documentation.into();
        self.slot.bump();
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.slot.bump();
    }

    /// Change the storage category. The default value is rebuilt on the next
    /// refresh.
    pub fn set_code(&mut self, code: TypeCode) {
        if self.code == code {
            return;
        }
        self.code = code;
        self.default_value = None;
        if code.is_primitive() {
            self.fields.clear();
        }
        self.touch_schema();
    }

    /// Append a field.
    pub fn create_field(
        &mut self,
        id: TinyId,
        name: impl Into<String>,
        field_type: TypeRef,
        array: bool,
    ) -> Result<&TinyField, ModelError> {
        if !self.code.has_fields() {
            return Err(ModelError::PrimitiveSchema {
                name: self.name.clone(),
            });
        }
        self.fields.push(TinyField {
            id,
            name: name.into(),
            field_type,
            array,
            documentation: String::new(),
        });
        self.touch_schema();
        let last = self.fields.len() - 1;
        Ok(&self.fields[last])
    }

    /// Remove a field by id, returning it.
    pub fn remove_field(&mut self, id: TinyId) -> Option<TinyField> {
        let index = self.field_index(id)?;
        let field = self.fields.remove(index);
        self.touch_schema();
        Some(field)
    }

    /// Insert a previously removed field at `index` (clamped).
    pub fn insert_field(&mut self, index: usize, field: TinyField) -> Result<(), ModelError> {
        if !self.code.has_fields() {
            return Err(ModelError::PrimitiveSchema {
                name: self.name.clone(),
            });
        }
        let index = index.min(self.fields.len());
        self.fields.insert(index, field);
        self.touch_schema();
        Ok(())
    }

    pub fn rename_field(&mut self, id: TinyId, name: impl Into<String>) -> bool {
        let Some(index) = self.field_index(id) else {
            return false;
        };
        self.fields[index].name = name.into();
        self.touch_schema();
        true
    }

    pub fn set_field_type(&mut self, id: TinyId, field_type: TypeRef, array: bool) -> bool {
        let Some(index) = self.field_index(id) else {
            return false;
        };
        let field = &mut self.fields[index];
        field.field_type = field_type;
        field.array = array;
        self.touch_schema();
        true
    }

    /// Move a field to position `index` (clamped).
    pub fn move_field(&mut self, id: TinyId, index: usize) -> bool {
        let Some(from) = self.field_index(id) else {
            return false;
        };
        let field = self.fields.remove(from);
        let to = index.min(self.fields.len());
        self.fields.insert(to, field);
        self.touch_schema();
        true
    }

    fn touch_schema(&mut self) {
        self.schema_version += 1;
        self.slot.bump();
    }

    /// Create the default-value object if this type needs one and has none.
    pub(crate) fn ensure_default_object(&mut self) -> bool {
        if self.is_primitive() || self.default_value.is_some() {
            return false;
        }
        let mut object = TinyObject::with_slot(self.type_ref(), self.slot.child());
        object.is_default_value = true;
        self.default_value = Some(object);
        true
    }

    /// Relink this type (and its default object) into `storage`, owned by its
    /// own id.
    pub(crate) fn attach(&mut self, storage: &VersionStorage) {
        self.slot.relink(storage, None, Some(self.id));
        if let Some(default) = &mut self.default_value {
            default.is_default_value = true;
            default.attach(&self.slot);
        }
    }

    /// Lift this type and its default object to at least `floor`.
    pub(crate) fn raise_versions(&self, floor: u64) {
        self.slot.raise_to(floor);
        if let Some(default) = &self.default_value {
            default.raise_versions(floor);
        }
    }
}

impl PartialEq for TinyType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.code == other.code
            && self.fields == other.fields
            && self.default_value == other.default_value
            && self.persistence_id == other.persistence_id
            && self.documentation == other.documentation
    }
}

// ---------------------------------------------------------------------------
// Built-in types
// ---------------------------------------------------------------------------

/// Built-in types shared by every registry, with their well-known ids.
pub mod builtin {
    use super::*;

    /// Source identifier the built-in types are registered under.
    pub const SOURCE: &str = "__builtin__";

    pub const INT8: TinyId = TinyId::from_raw(0x27c155635ccb4ab2bcb79ef5aaf129ec);
    pub const INT16: TinyId = TinyId::from_raw(0x2aa56ce081e14e8a93d276da72d813bc);
    pub const INT32: TinyId = TinyId::from_raw(0x9633c95a0a68473682f09ed6a01194b4);
    pub const INT64: TinyId = TinyId::from_raw(0x37695933217a49f68ce15db33f63cdf9);
    pub const UINT8: TinyId = TinyId::from_raw(0x7112767112f747e2a340404a5ceb31b5);
    pub const UINT16: TinyId = TinyId::from_raw(0x86fa32ad22614762afdacbf4dba8180f);
    pub const UINT32: TinyId = TinyId::from_raw(0x1da58c8ba95a4c85a2b5920bd0663f70);
    pub const UINT64: TinyId = TinyId::from_raw(0x574059163cda44b3ade6ea7b2daf67f2);
    pub const FLOAT32: TinyId = TinyId::from_raw(0x67325dccf2f047c19c7ef4a045354e67);
    pub const FLOAT64: TinyId = TinyId::from_raw(0x74cf32c2744342b7903871f8feb2fdd7);
    pub const BOOLEAN: TinyId = TinyId::from_raw(0x2b477f505af74487b7092b5617d88d3f);
    pub const STRING: TinyId = TinyId::from_raw(0x1bff5adddd7c41de98d3329c7c641208);
    pub const ENTITY_REFERENCE: TinyId = TinyId::from_raw(0x5a182d9d039d4dfd8fa96132d05f9ee7);

    pub const TEXTURE2D: TinyId = TinyId::from_raw(0x373ed9034ede4f84829bf01ed265f6ee);
    pub const SPRITE: TinyId = TinyId::from_raw(0xcf54a635a25248ab87f2563bb840ed5b);
    pub const TILE: TinyId = TinyId::from_raw(0xba863be1346c460f80e3e371b0cf255b);
    pub const TILEMAP: TinyId = TinyId::from_raw(0xfa36582cc6d14b179d858ce3744c9419);
    pub const AUDIO_CLIP: TinyId = TinyId::from_raw(0x1ae8c073dc444f4fb2d3120e5e618326);
    pub const FONT: TinyId = TinyId::from_raw(0x4b1f918c1c564e42a04a0cb8f4ee0665);
    pub const ANIMATION_CLIP: TinyId = TinyId::from_raw(0x631f4285c8ca41eeb480f7fbff0756bb);

    const TABLE: &[(TinyId, &str, TypeCode)] = &[
        (INT8, "Int8", TypeCode::Int8),
        (INT16, "Int16", TypeCode::Int16),
        (INT32, "Int32", TypeCode::Int32),
        (INT64, "Int64", TypeCode::Int64),
        (UINT8, "UInt8", TypeCode::UInt8),
        (UINT16, "UInt16", TypeCode::UInt16),
        (UINT32, "UInt32", TypeCode::UInt32),
        (UINT64, "UInt64", TypeCode::UInt64),
        (FLOAT32, "Float32", TypeCode::Float32),
        (FLOAT64, "Float64", TypeCode::Float64),
        (BOOLEAN, "Boolean", TypeCode::Boolean),
        (STRING, "String", TypeCode::String),
        (ENTITY_REFERENCE, "EntityReference", TypeCode::EntityReference),
        (TEXTURE2D, "Texture2DEntity", TypeCode::Asset),
        (SPRITE, "SpriteEntity", TypeCode::Asset),
        (TILE, "TileEntity", TypeCode::Asset),
        (TILEMAP, "TilemapEntity", TypeCode::Asset),
        (AUDIO_CLIP, "AudioClipEntity", TypeCode::Asset),
        (ANIMATION_CLIP, "AnimationClipEntity", TypeCode::Asset),
        (FONT, "FontEntity", TypeCode::Asset),
    ];

    /// Fresh, detached instances of every built-in type.
    pub fn types() -> Vec<TinyType> {
        TABLE
            .iter()
            .map(|&(id, name, code)| TinyType::new(id, name, code))
            .collect()
    }

    pub fn is_builtin(id: TinyId) -> bool {
        TABLE.iter().any(|&(builtin, _, _)| builtin == id)
    }

    /// Reference to the built-in type for a primitive code.
    ///
    /// Asset types are not addressable by code alone; use the constants.
    pub fn type_ref(code: TypeCode) -> Option<TypeRef> {
        if code == TypeCode::Asset {
            return None;
        }
        TABLE
            .iter()
            .find(|&&(_, _, c)| c == code)
            .map(|&(id, name, _)| Reference::new(id, name))
    }

    /// Resolve a built-in by name or common alias (`"int"`, `"float"`, ...).
    pub fn by_name(name: &str) -> Option<TypeRef> {
        let canonical = match name {
            "sbyte" => "Int8",
            "byte" => "UInt8",
            "short" => "Int16",
            "ushort" => "UInt16",
            "int" => "Int32",
            "uint" => "UInt32",
            "long" => "Int64",
            "ulong" => "UInt64",
            "float" | "Single" => "Float32",
            "double" | "Double" => "Float64",
            "bool" => "Boolean",
            "string" => "String",
            other => other,
        };
        TABLE
            .iter()
            .find(|&&(_, n, _)| n == canonical)
            .map(|&(id, name, _)| Reference::new(id, name))
    }

    /// Asset kind stored by a built-in asset type.
    pub fn asset_kind(id: TinyId) -> Option<AssetKind> {
        let kind = match id {
            TEXTURE2D => AssetKind::Texture2D,
            SPRITE => AssetKind::Sprite,
            TILE => AssetKind::Tile,
            TILEMAP => AssetKind::Tilemap,
            AUDIO_CLIP => AssetKind::AudioClip,
            ANIMATION_CLIP => AssetKind::AnimationClip,
            FONT => AssetKind::Font,
            _ => return None,
        };
        Some(kind)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
