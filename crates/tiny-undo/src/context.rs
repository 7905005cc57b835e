//! The editing session.
//!
//! An [`EditorContext`] owns the [`Registry`] and the [`UndoManager`] of one
//! editing session. The host calls [`update`](EditorContext::update) once per
//! editor tick and routes its undo/redo key bindings to
//! [`undo`](EditorContext::undo) and [`redo`](EditorContext::redo).

use tiny_model::prelude::*;

use crate::config::UndoConfig;
use crate::undo::{ReplayReport, UndoManager};
use crate::UndoError;

/// One editing session: the object registry plus its undo history.
#[derive(Debug)]
pub struct EditorContext {
    registry: Registry,
    undo: UndoManager,
}

impl EditorContext {
    /// Create an unloaded session with an empty registry.
    pub fn new(config: UndoConfig) -> Self {
        Self::with_registry(Registry::new(), config)
    }

    /// Create an unloaded session around an existing registry.
    pub fn with_registry(registry: Registry, config: UndoConfig) -> Self {
        Self {
            registry,
            undo: UndoManager::new(config),
        }
    }

    /// Start recording. Objects registered so far form the baseline.
    pub fn load(&mut self) {
        self.undo.load(&mut self.registry);
    }

    /// Stop recording and drop the undo history. The registry is kept.
    pub fn unload(&mut self) {
        self.undo.unload();
    }

    pub fn is_loaded(&self) -> bool {
        self.undo.is_loaded()
    }

    /// Per-tick update. Returns the version of the recorded changeset, if
    /// anything changed.
    pub fn update(&mut self) -> Option<u64> {
        self.undo.update(&mut self.registry)
    }

    pub fn undo(&mut self) -> Result<ReplayReport, UndoError> {
        self.undo.undo(&mut self.registry)
    }

    pub fn redo(&mut self) -> Result<ReplayReport, UndoError> {
        self.undo.redo(&mut self.registry)
    }

    /// Host "version changed" signal: undo or redo until the history is at
    /// `target`.
    pub fn sync_to_version(&mut self, target: u64) -> Result<usize, UndoError> {
        self.undo.sync_to_version(&mut self.registry, target)
    }

    pub fn flush_changes(&mut self, ids: impl IntoIterator<Item = TinyId>) -> Result<usize, UndoError> {
        self.undo.flush_changes(&self.registry, ids)
    }

    pub fn begin_operation(&mut self) -> u64 {
        self.undo.begin_operation()
    }

    pub fn end_operation(&mut self) {
        self.undo.end_operation();
    }

    pub fn set_drag_payload_active(&mut self, active: bool) {
        self.undo.set_drag_payload_active(active);
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn undo_manager(&self) -> &UndoManager {
        &self.undo
    }

    pub fn undo_manager_mut(&mut self) -> &mut UndoManager {
        &mut self.undo
    }

    /// Tear the session down and hand back its registry.
    pub fn into_registry(mut self) -> Registry {
        self.undo.unload();
        self.registry
    }
}

impl Default for EditorContext {
    fn default() -> Self {
        Self::new(UndoConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unload_keeps_registry_and_drops_history() {
        let mut context = EditorContext::default();
        context.load();
        let id = TinyId::from_raw(10);
        context.registry_mut().create_entity(id, "Tree");
        assert!(context.update().is_some());

        context.unload();
        assert!(!context.is_loaded());
        assert!(context.registry().contains(id));
        assert_eq!(context.undo_manager().undo_count(), 0);
        assert!(matches!(context.undo(), Err(UndoError::NotLoaded)));
    }

    #[test]
    fn reload_starts_from_current_state() {
        let mut context = EditorContext::default();
        context.load();
        let id = TinyId::from_raw(11);
        context.registry_mut().create_entity(id, "Rock");
        context.update();
        context.unload();

        context.load();
        assert!(!context.undo_manager().can_undo());
        assert!(context.undo_manager().undoable_changes()[0].contains(id));
    }
}
