//! Weak, identity-based links between registry objects.
//!
//! A [`Reference`] carries the target id plus a cached display name. It never
//! owns the target; [`Reference::dereference`] resolves it through the
//! [`Registry`] and yields `None` once the target is gone.
//!
//! Equality and hashing only look at the id. The name is advisory and is
//! resynced during container refresh.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::entity::TinyEntity;
use crate::id::TinyId;
use crate::registry::{Registry, RegistryItem};
use crate::schema::TinyType;

/// Typed, non-owning handle to a registry object.
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Reference<T> {
    pub id: TinyId,
    #[serde(default)]
    pub name: String,
    #[serde(skip)]
    marker: PhantomData<fn() -> T>,
}

/// Reference to a [`TinyType`].
pub type TypeRef = Reference<TinyType>;

/// Reference to a [`TinyEntity`].
pub type EntityRef = Reference<TinyEntity>;

impl<T> Reference<T> {
    pub fn new(id: TinyId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            marker: PhantomData,
        }
    }

    /// The "no target" sentinel.
    pub fn none() -> Self {
        Self::new(TinyId::EMPTY, String::new())
    }

    pub fn is_none(&self) -> bool {
        self.id.is_empty()
    }
}

impl<T: RegistryItem> Reference<T> {
    /// Resolve through the registry. `None` when the target is not (or no
    /// longer) registered, or is a different kind of object.
    pub fn dereference<'r>(&self, registry: &'r Registry) -> Option<&'r T> {
        if self.is_none() {
            return None;
        }
        registry.find_by_id::<T>(self.id)
    }
}

impl<T> Clone for Reference<T> {
    fn clone(&self) -> Self {
        Self::new(self.id, self.name.clone())
    }
}

impl<T> Default for Reference<T> {
    fn default() -> Self {
        Self::none()
    }
}

impl<T> PartialEq for Reference<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Reference<T> {}

impl<T> Hash for Reference<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Reference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return f.write_str("Reference(None)");
        }
        write!(f, "Reference({} '{}')", self.id, self.name)
    }
}

/// One member of an enum type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnumRef {
    pub type_ref: TypeRef,
    /// Id of the member field on the enum type.
    pub member: TinyId,
}

impl EnumRef {
    pub fn new(type_ref: TypeRef, member: TinyId) -> Self {
        Self { type_ref, member }
    }

    /// Display name of the member, if the enum type is registered and still
    /// declares it.
    pub fn member_name<'r>(&self, registry: &'r Registry) -> Option<&'r str> {
        self.type_ref
            .dereference(registry)
            .and_then(|ty| ty.field_by_id(self.member))
            .map(|field| field.name.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
