//! Tiny model -- versioned, schema-driven object model for the Tiny editor.
//!
//! Objects are [`TinyObject`](object::TinyObject) containers whose field slots
//! are described by a registered [`TinyType`](schema::TinyType). A field
//! follows its type's default until it is set; setting it marks the slot
//! overridden. When a type's schema or default changes, containers migrate
//! their slots on the next refresh, matching fields by stable id so renames
//! and reorders keep their data.
//!
//! Every container versions itself in a shared arena
//! ([`VersionStorage`](version::VersionStorage)); a mutation bumps the
//! container, its ancestors and the owning top-level object, and queues that
//! object for the [`Caretaker`](caretaker::Caretaker), which snapshots it into
//! a [`Memento`](memento::Memento).
//!
//! # Quick Start
//!
//! ```
//! use tiny_model::prelude::*;
//!
//! let mut registry = Registry::new();
//! let transform = TinyId::new();
//! let x = TinyId::new();
//! registry
//!     .create_type(transform, "Transform", TypeCode::Component)
//!     .create_field(x, "x", builtin::type_ref(TypeCode::Float32).unwrap(), false)
//!     .unwrap();
//!
//! let player = TinyId::new();
//! registry.create_entity(player, "Player");
//! let component = registry.add_component(player, transform).unwrap();
//! assert_eq!(component.get("x"), Some(&Value::Float32(0.0)));
//!
//! component.set("x", 4.5f32).unwrap();
//! assert!(component.is_field_overridden("x"));
//!
//! let mut caretaker = Caretaker::new();
//! let mementos = caretaker.update(&registry);
//! assert!(mementos.iter().any(|m| m.id == player));
//! ```

#![deny(unsafe_code)]

pub mod caretaker;
pub mod container;
pub mod entity;
pub mod id;
pub mod list;
pub mod memento;
pub mod object;
pub mod reference;
pub mod registry;
pub mod schema;
pub mod value;
pub mod version;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by object-model operations.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// A name is neither a schema field nor a dynamic value.
    #[error("'{owner}' has no field named '{name}'")]
    FieldNotFound { owner: String, name: String },

    /// A value cannot be assigned to a field of another type.
    #[error("cannot assign {found} to field '{field}' of type {expected}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    /// A type id is not registered.
    #[error("type {id} is not registered")]
    UnknownType { id: id::TinyId },

    /// Component and configuration types cannot be used as field types.
    #[error("type '{type_name}' ({code:?}) cannot be used as a field type")]
    UnsupportedFieldType {
        type_name: String,
        code: schema::TypeCode,
    },

    /// A list index past the end.
    #[error("index {index} out of range for list of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// An id names an object of another kind.
    #[error("object {id} is not a {expected} (found {found})")]
    KindMismatch {
        id: id::TinyId,
        expected: String,
        found: String,
    },

    /// An object is not registered.
    #[error("object {id} is not registered")]
    ObjectNotFound { id: id::TinyId },

    /// Fields were added to a primitive type.
    #[error("type '{name}' is primitive and cannot have fields")]
    PrimitiveSchema { name: String },

    /// A source identifier reserved for built-in types.
    #[error("source identifier '{0}' is reserved")]
    ReservedSource(String),

    /// An object could not be serialized into a memento.
    #[error("failed to snapshot object {id}: {source}")]
    MementoEncode {
        id: id::TinyId,
        #[source]
        source: serde_json::Error,
    },

    /// A memento could not be decoded back into an object.
    #[error("failed to decode snapshot of object {id}: {source}")]
    MementoDecode {
        id: id::TinyId,
        #[source]
        source: serde_json::Error,
    },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::caretaker::Caretaker;
    pub use crate::container::{FieldProperty, FieldValue, PropertiesContainer};
    pub use crate::entity::TinyEntity;
    pub use crate::id::{IdGenerator, TinyId};
    pub use crate::list::TinyList;
    pub use crate::memento::{Memento, Originator};
    pub use crate::object::TinyObject;
    pub use crate::reference::{EntityRef, EnumRef, Reference, TypeRef};
    pub use crate::registry::{ObjectKind, Registry, RegistryItem, RegistryObject};
    pub use crate::schema::{builtin, TinyField, TinyType, TypeCode};
    pub use crate::value::{AssetHandle, AssetKind, Value};
    pub use crate::version::{TrackingGuard, VersionSlot, VersionStorage};
    pub use crate::ModelError;
}
