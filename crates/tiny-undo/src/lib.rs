//! Tiny undo -- changeset-based undo/redo for the Tiny object model.
//!
//! Each editor tick, the [`UndoManager`](undo::UndoManager) asks the
//! caretaker which registry objects changed, pairs each new snapshot with the
//! one recorded before it, and pushes the tick's edits as one
//! [`Changeset`](change::Changeset). Undo and redo walk those changesets,
//! restoring snapshots and unregistering objects that did not exist on the
//! other side of an edit. The [`EditorContext`](context::EditorContext) ties a
//! registry and its undo history into one session.
//!
//! # Quick Start
//!
//! ```
//! use tiny_model::prelude::*;
//! use tiny_undo::prelude::*;
//!
//! let mut context = EditorContext::new(UndoConfig::default());
//! let health = TinyId::new();
//! let value = TinyId::new();
//! context
//!     .registry_mut()
//!     .create_type(health, "Health", TypeCode::Component)
//!     .create_field(value, "value", builtin::type_ref(TypeCode::Int32).unwrap(), false)
//!     .unwrap();
//! context.load();
//!
//! let player = TinyId::new();
//! context.registry_mut().create_entity(player, "Player");
//! context.registry_mut().add_component(player, health).unwrap();
//! context.update();
//!
//! context
//!     .registry_mut()
//!     .find_by_id_mut::<TinyEntity>(player)
//!     .and_then(|e| e.get_component_mut(health))
//!     .unwrap()
//!     .set("value", 75)
//!     .unwrap();
//! context.update();
//!
//! context.undo().unwrap();
//! let component = context
//!     .registry()
//!     .find_by_id::<TinyEntity>(player)
//!     .and_then(|e| e.get_component(health))
//!     .unwrap();
//! assert_eq!(component.get("value"), Some(&Value::Int32(0)));
//! ```

#![deny(unsafe_code)]

pub mod change;
pub mod config;
pub mod context;
pub mod undo;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by the undo engine.
#[derive(Debug, thiserror::Error)]
pub enum UndoError {
    /// The session has not been loaded, or was unloaded.
    #[error("undo session is not loaded")]
    NotLoaded,

    /// An object-model operation failed.
    #[error(transparent)]
    Model(#[from] tiny_model::ModelError),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::change::{Change, ChangeOrigin, Changeset};
    pub use crate::config::UndoConfig;
    pub use crate::context::EditorContext;
    pub use crate::undo::{ReplayDirection, ReplayReport, ReplayScope, UndoManager};
    pub use crate::UndoError;
}
