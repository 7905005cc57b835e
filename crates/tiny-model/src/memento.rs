//! Snapshots of registry objects.
//!
//! A [`Memento`] is the JSON state of one [`Originator`] at one version, plus
//! a BLAKE3 digest of that state. Mementos are immutable; restoring one goes
//! through [`Registry::restore`](crate::registry::Registry::restore) so the
//! object is relinked into the session's version arena.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::entity::TinyEntity;
use crate::id::TinyId;
use crate::registry::{ObjectKind, RegistryObject};
use crate::schema::TinyType;
use crate::ModelError;

/// Immutable snapshot of one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memento {
    pub id: TinyId,
    /// Object version when the snapshot was taken.
    pub version: u64,
    pub kind: ObjectKind,
    pub state: serde_json::Value,
    /// Hex BLAKE3 digest of the canonical JSON encoding of `state`.
    pub hash: String,
}

impl Memento {
    /// Serialize `object` into a memento.
    pub fn capture<T: Serialize>(
        id: TinyId,
        version: u64,
        kind: ObjectKind,
        object: &T,
    ) -> Result<Self, ModelError> {
        let state = serde_json::to_value(object).map_err(|source| ModelError::MementoEncode { id, source })?;
        // serde_json maps are sorted, so the encoding is canonical.
        let bytes = serde_json::to_vec(&state).map_err(|source| ModelError::MementoEncode { id, source })?;
        Ok(Self {
            id,
            version,
            kind,
            state,
            hash: blake3::hash(&bytes).to_hex().to_string(),
        })
    }

    /// Rebuild the object this memento was taken from.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ModelError> {
        serde_json::from_value(self.state.clone()).map_err(|source| ModelError::MementoDecode { id: self.id, source })
    }

    /// Whether two snapshots hold the same state.
    pub fn same_state(&self, other: &Memento) -> bool {
        self.hash == other.hash
    }
}

// ---------------------------------------------------------------------------
// Originator
// ---------------------------------------------------------------------------

/// Something that can snapshot its own state.
pub trait Originator {
    fn id(&self) -> TinyId;
    fn version(&self) -> u64;
    fn kind(&self) -> ObjectKind;

    /// Non-empty when the object is asset-backed.
    fn persistence_id(&self) -> Option<&str>;

    fn save(&self) -> Result<Memento, ModelError>;
}

impl Originator for TinyType {
    fn id(&self) -> TinyId {
        self.id
    }

    fn version(&self) -> u64 {
        self.slot.version()
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Type
    }

    fn persistence_id(&self) -> Option<&str> {
        TinyType::persistence_id(self)
    }

    fn save(&self) -> Result<Memento, ModelError> {
        Memento::capture(self.id, self.slot.version(), ObjectKind::Type, self)
    }
}

impl Originator for TinyEntity {
    fn id(&self) -> TinyId {
        self.id
    }

    fn version(&self) -> u64 {
        self.slot.version()
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Entity
    }

    fn persistence_id(&self) -> Option<&str> {
        TinyEntity::persistence_id(self)
    }

    fn save(&self) -> Result<Memento, ModelError> {
        Memento::capture(self.id, self.slot.version(), ObjectKind::Entity, self)
    }
}

impl Originator for RegistryObject {
    fn id(&self) -> TinyId {
        RegistryObject::id(self)
    }

    fn version(&self) -> u64 {
        RegistryObject::version(self)
    }

    fn kind(&self) -> ObjectKind {
        RegistryObject::kind(self)
    }

    fn persistence_id(&self) -> Option<&str> {
        RegistryObject::persistence_id(self)
    }

    fn save(&self) -> Result<Memento, ModelError> {
        match self {
            RegistryObject::Type(ty) => ty.save(),
            RegistryObject::Entity(entity) => entity.save(),
        }
    }
}
