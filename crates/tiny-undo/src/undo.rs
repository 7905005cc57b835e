//! Changeset-based undo/redo.
//!
//! The [`UndoManager`] keeps two stacks of [`Changeset`]s. Index 0 of the
//! undoable stack is the baseline captured on [`load`](UndoManager::load):
//! one creation change per object that existed when the session started. It
//! is never popped, so undo always stops at the loaded state.
//!
//! Every [`update`](UndoManager::update) runs the caretaker, pairs each new
//! snapshot with the last one recorded for that object, adds a deletion for
//! each object unregistered since the previous tick, and pushes the result as
//! one changeset. Undo restores `previous` snapshots and redo restores `next`
//! snapshots; a missing snapshot means the object did not exist on that side
//! of the edit, so replay unregisters it (unless it is persistent).
//!
//! # Example
//!
//! ```
//! use tiny_model::prelude::*;
//! use tiny_undo::prelude::*;
//!
//! let mut registry = Registry::new();
//! let mut undo = UndoManager::new(UndoConfig::default());
//! undo.load(&mut registry);
//!
//! let door = TinyId::new();
//! registry.create_entity(door, "Door");
//! undo.update(&mut registry);
//! assert!(undo.can_undo());
//!
//! undo.undo(&mut registry).unwrap();
//! assert!(!registry.contains(door));
//!
//! undo.redo(&mut registry).unwrap();
//! assert!(registry.contains(door));
//! ```

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use tiny_model::prelude::*;

use crate::change::{Change, ChangeOrigin, Changeset};
use crate::config::UndoConfig;
use crate::UndoError;

// ---------------------------------------------------------------------------
// ReplayReport
// ---------------------------------------------------------------------------

/// Which stack a replay walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplayDirection {
    Undo,
    Redo,
}

impl std::fmt::Display for ReplayDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplayDirection::Undo => f.write_str("undo"),
            ReplayDirection::Redo => f.write_str("redo"),
        }
    }
}

/// Outcome of one undo or redo call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub direction: ReplayDirection,
    /// Number of changesets moved between the stacks.
    pub changesets: usize,
    /// Objects rebuilt from a snapshot.
    pub restored: usize,
    /// Objects removed from the registry.
    pub unregistered: usize,
    /// Persistent objects left registered although the snapshot said they
    /// did not exist.
    pub kept: usize,
    /// Changes that could not be applied (missing or undecodable snapshot).
    pub skipped: usize,
    /// The call was ignored because a drag payload was active.
    pub ignored: bool,
    /// [`UndoManager::version`] after the replay.
    pub version: u64,
}

impl ReplayReport {
    fn new(direction: ReplayDirection) -> Self {
        Self {
            direction,
            changesets: 0,
            restored: 0,
            unregistered: 0,
            kept: 0,
            skipped: 0,
            ignored: false,
            version: 0,
        }
    }

    /// Whether the replay moved any changeset.
    pub fn is_empty(&self) -> bool {
        self.changesets == 0
    }
}

// ---------------------------------------------------------------------------
// ReplayScope
// ---------------------------------------------------------------------------

/// While alive, snapshots the caretaker produces are consumed but not
/// recorded as changes.
///
/// Undo and redo hold one around their own caretaker pass; a host can hold
/// one to apply edits that should not become undoable. Scopes nest.
#[derive(Debug)]
pub struct ReplayScope {
    depth: Rc<Cell<u32>>,
}

impl ReplayScope {
    fn enter(depth: &Rc<Cell<u32>>) -> Self {
        depth.set(depth.get() + 1);
        Self {
            depth: Rc::clone(depth),
        }
    }
}

impl Drop for ReplayScope {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

// ---------------------------------------------------------------------------
// UndoManager
// ---------------------------------------------------------------------------

/// Records per-tick changesets and replays them.
#[derive(Debug)]
pub struct UndoManager {
    config: UndoConfig,
    caretaker: Caretaker,
    undoable: Vec<Changeset>,
    redoable: Vec<Changeset>,
    loaded: bool,
    /// Version stamped on the next pushed changeset. Never decreases.
    next_version: u64,
    /// Group shared by every changeset pushed inside the open operation.
    operation: Option<u64>,
    operation_depth: u32,
    drag_payload_active: bool,
    replay_depth: Rc<Cell<u32>>,
}

impl UndoManager {
    pub fn new(config: UndoConfig) -> Self {
        Self {
            config,
            caretaker: Caretaker::new(),
            undoable: Vec::new(),
            redoable: Vec::new(),
            loaded: false,
            next_version: 0,
            operation: None,
            operation_depth: 0,
            drag_payload_active: false,
            replay_depth: Rc::new(Cell::new(0)),
        }
    }

    pub fn config(&self) -> &UndoConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Start a session: snapshot every registered object into the baseline.
    ///
    /// Loading an already loaded manager does nothing.
    pub fn load(&mut self, registry: &mut Registry) {
        if self.loaded {
            return;
        }
        self.reset_state();

        for id in registry.all().map(RegistryObject::id).collect::<Vec<_>>() {
            if !builtin::is_builtin(id) {
                registry.storage().mark_changed(id);
            }
        }
        registry.refresh_all();

        let mut baseline = Changeset::new(0, 0);
        for memento in self.caretaker.update(registry) {
            let origin = Self::origin_of(registry, &memento);
            baseline.replace(Change {
                id: memento.id,
                version: 0,
                group: 0,
                origin,
                previous: None,
                next: Some(Arc::new(memento)),
            });
        }
        registry.clear_unregistered_objects();

        tracing::info!(objects = baseline.len(), "undo session loaded");
        self.undoable.push(baseline);
        self.next_version = 1;
        self.loaded = true;
    }

    /// End the session, dropping both stacks and the caretaker's state.
    pub fn unload(&mut self) {
        if !self.loaded {
            return;
        }
        let undoable = self.undo_count();
        let redoable = self.redo_count();
        self.reset_state();
        tracing::info!(undoable, redoable, "undo session unloaded");
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn reset_state(&mut self) {
        self.caretaker.clear();
        self.undoable.clear();
        self.redoable.clear();
        self.loaded = false;
        self.next_version = 0;
        self.operation = None;
        self.operation_depth = 0;
        self.drag_payload_active = false;
    }

    // -----------------------------------------------------------------------
    // Recording
    // -----------------------------------------------------------------------

    /// Record this tick's edits as one changeset.
    ///
    /// Returns the version of the pushed changeset, or `None` when nothing
    /// changed, the session is not loaded, or a [`ReplayScope`] is alive.
    pub fn update(&mut self, registry: &mut Registry) -> Option<u64> {
        if !self.loaded {
            return None;
        }
        self.refresh_if_changed(registry);

        let version = self.next_version;
        let group = self.operation.unwrap_or(version);
        let mut frame = Changeset::new(version, group);

        for memento in self.take_snapshots(registry) {
            let id = memento.id;
            let origin = Self::origin_of(registry, &memento);
            frame.insert(Change {
                id,
                version,
                group,
                origin,
                previous: self.previous_snapshot(id),
                next: Some(Arc::new(memento)),
            });
        }

        if !self.is_replaying() {
            for object in registry.all_unregistered() {
                let id = object.id();
                if registry.contains(id) || builtin::is_builtin(id) {
                    continue;
                }
                let Some(previous) = self.previous_snapshot(id) else {
                    // Created and deleted between two ticks: nothing to undo.
                    frame.remove(id);
                    continue;
                };
                frame.replace(Change {
                    id,
                    version,
                    group,
                    origin: ChangeOrigin::capture(object),
                    previous: Some(previous),
                    next: None,
                });
            }
        }
        registry.clear_unregistered_objects();

        if frame.is_empty() {
            return None;
        }
        if self.try_merge_changes(&frame) {
            return None;
        }

        tracing::debug!(version, group, changes = frame.len(), "recorded changeset");
        self.undoable.push(frame);
        self.next_version += 1;
        self.redoable.clear();
        self.enforce_history();
        Some(version)
    }

    /// Whether `frame` was folded into the newest changeset. Always declines;
    /// every tick with changes is recorded on its own.
    fn try_merge_changes(&mut self, _frame: &Changeset) -> bool {
        false
    }

    /// Run the caretaker. Snapshots taken while replaying are dropped.
    fn take_snapshots(&mut self, registry: &Registry) -> Vec<Memento> {
        let mementos = self.caretaker.update(registry);
        if self.is_replaying() {
            if !mementos.is_empty() {
                tracing::trace!(count = mementos.len(), "discarding snapshots taken during replay");
            }
            return Vec::new();
        }
        mementos
    }

    /// The newest recorded state of `id`, scanning from the top of the
    /// undoable stack. `None` when the object was never recorded or its
    /// newest change deleted it.
    fn previous_snapshot(&self, id: TinyId) -> Option<Arc<Memento>> {
        self.undoable
            .iter()
            .rev()
            .find_map(|changeset| changeset.get(id))
            .and_then(|change| change.next.clone())
    }

    fn origin_of(registry: &Registry, memento: &Memento) -> ChangeOrigin {
        registry
            .find_object(memento.id)
            .map(ChangeOrigin::capture)
            .unwrap_or_else(|| ChangeOrigin::from_memento(memento))
    }

    fn refresh_if_changed(&self, registry: &mut Registry) {
        if self.caretaker.has_changes(registry) {
            registry.refresh_all();
        }
    }

    /// Fold the oldest changesets into the baseline until the history bound
    /// holds again.
    fn enforce_history(&mut self) {
        while self.undoable.len() > 1 && self.config.exceeds_history(self.undoable.len() - 1) {
            let oldest = self.undoable.remove(1);
            let folded = oldest.version;
            let Some(baseline) = self.undoable.first_mut() else {
                return;
            };
            for change in oldest {
                match change.next {
                    Some(next) => baseline.replace(Change {
                        version: baseline.version,
                        group: baseline.group,
                        previous: None,
                        next: Some(next),
                        ..change
                    }),
                    None => {
                        baseline.remove(change.id);
                    }
                }
            }
            tracing::debug!(version = folded, "folded oldest changeset into baseline");
        }
    }

    // -----------------------------------------------------------------------
    // Operation groups
    // -----------------------------------------------------------------------

    /// Open an operation: every changeset pushed until the matching
    /// [`end_operation`](Self::end_operation) shares one group and is undone
    /// and redone as a unit. Operations nest; the outermost one owns the
    /// group. Returns the group id.
    pub fn begin_operation(&mut self) -> u64 {
        let group = *self.operation.get_or_insert(self.next_version);
        self.operation_depth += 1;
        group
    }

    pub fn end_operation(&mut self) {
        match self.operation_depth {
            0 => tracing::warn!("end_operation without a matching begin_operation -- ignoring"),
            1 => {
                self.operation_depth = 0;
                self.operation = None;
            }
            _ => self.operation_depth -= 1,
        }
    }

    pub fn in_operation(&self) -> bool {
        self.operation_depth > 0
    }

    // -----------------------------------------------------------------------
    // Replay
    // -----------------------------------------------------------------------

    /// Tell the manager whether a drag-and-drop payload is active. Undo is
    /// ignored while it is.
    pub fn set_drag_payload_active(&mut self, active: bool) {
        self.drag_payload_active = active;
    }

    pub fn is_drag_payload_active(&self) -> bool {
        self.drag_payload_active
    }

    /// Suppress recording until the returned scope is dropped.
    pub fn replay_scope(&self) -> ReplayScope {
        ReplayScope::enter(&self.replay_depth)
    }

    pub fn is_replaying(&self) -> bool {
        self.replay_depth.get() > 0
    }

    /// Revert the newest operation group.
    pub fn undo(&mut self, registry: &mut Registry) -> Result<ReplayReport, UndoError> {
        if !self.loaded {
            return Err(UndoError::NotLoaded);
        }
        let mut report = ReplayReport::new(ReplayDirection::Undo);
        if self.drag_payload_active {
            tracing::debug!("drag payload active -- ignoring undo");
            report.ignored = true;
            report.version = self.version();
            return Ok(report);
        }

        let group = match self.undoable.last() {
            Some(top) if self.undoable.len() > 1 => top.group,
            _ => {
                report.version = self.version();
                return Ok(report);
            }
        };
        while self.undoable.len() > 1 && self.undoable.last().is_some_and(|c| c.group == group) {
            let Some(changeset) = self.undoable.pop() else {
                break;
            };
            for change in &changeset {
                Self::apply(registry, change, change.previous.as_deref(), &mut report);
            }
            report.changesets += 1;
            self.redoable.push(changeset);
        }

        self.finish_replay(registry, &mut report);
        Ok(report)
    }

    /// Re-apply the newest undone operation group.
    pub fn redo(&mut self, registry: &mut Registry) -> Result<ReplayReport, UndoError> {
        if !self.loaded {
            return Err(UndoError::NotLoaded);
        }
        let mut report = ReplayReport::new(ReplayDirection::Redo);
        let Some(group) = self.redoable.last().map(|c| c.group) else {
            report.version = self.version();
            return Ok(report);
        };
        while self.redoable.last().is_some_and(|c| c.group == group) {
            let Some(changeset) = self.redoable.pop() else {
                break;
            };
            for change in &changeset {
                Self::apply(registry, change, change.next.as_deref(), &mut report);
            }
            report.changesets += 1;
            self.undoable.push(changeset);
        }

        self.finish_replay(registry, &mut report);
        Ok(report)
    }

    /// Bring one object to the state `snapshot` describes; `None` means the
    /// object does not exist in that state.
    fn apply(registry: &mut Registry, change: &Change, snapshot: Option<&Memento>, report: &mut ReplayReport) {
        let id = change.id;
        match snapshot {
            Some(memento) => match registry.restore(memento) {
                Ok(()) => report.restored += 1,
                Err(err) => {
                    tracing::warn!(id = %id, error = %err, "could not restore snapshot -- skipping");
                    report.skipped += 1;
                }
            },
            None => {
                let persistent = match registry.find_object(id) {
                    Some(object) => object.persistence_id().is_some(),
                    None => change.origin.is_persistent(),
                };
                if persistent {
                    tracing::debug!(id = %id, "persistent object -- leaving it registered");
                    report.kept += 1;
                } else if registry.unregister(id) {
                    report.unregistered += 1;
                } else {
                    tracing::debug!(id = %id, name = %change.origin.name, "object already gone");
                }
            }
        }
    }

    /// Refresh derived state and let the caretaker absorb the replay so it is
    /// not recorded as a new edit.
    fn finish_replay(&mut self, registry: &mut Registry, report: &mut ReplayReport) {
        self.refresh_if_changed(registry);
        {
            let _scope = self.replay_scope();
            self.take_snapshots(registry);
        }
        registry.clear_unregistered_objects();
        report.version = self.version();

        if self.config.log_replays {
            tracing::info!(
                direction = %report.direction,
                changesets = report.changesets,
                restored = report.restored,
                unregistered = report.unregistered,
                skipped = report.skipped,
                version = report.version,
                "replayed changesets"
            );
        } else {
            tracing::debug!(
                direction = %report.direction,
                changesets = report.changesets,
                skipped = report.skipped,
                version = report.version,
                "replayed changesets"
            );
        }
    }

    /// Undo or redo until [`version`](Self::version) reaches `target`, for
    /// hosts that signal undo as a version change. Returns the number of
    /// replays performed.
    pub fn sync_to_version(&mut self, registry: &mut Registry, target: u64) -> Result<usize, UndoError> {
        if !self.loaded {
            return Err(UndoError::NotLoaded);
        }
        let mut steps = 0;
        while self.version() > target {
            if self.undo(registry)?.is_empty() {
                break;
            }
            steps += 1;
        }
        while self.version() < target && self.redoable.last().is_some_and(|c| c.version <= target) {
            if self.redo(registry)?.is_empty() {
                break;
            }
            steps += 1;
        }
        Ok(steps)
    }

    // -----------------------------------------------------------------------
    // Flush
    // -----------------------------------------------------------------------

    /// Make the current state of each object its baseline and drop the rest
    /// of its history from both stacks. Changesets left empty are removed.
    ///
    /// Returns the number of objects flushed; unregistered ids are skipped.
    pub fn flush_changes(
        &mut self,
        registry: &Registry,
        ids: impl IntoIterator<Item = TinyId>,
    ) -> Result<usize, UndoError> {
        if !self.loaded {
            return Err(UndoError::NotLoaded);
        }
        let mut flushed = 0;
        for id in ids {
            let Some(object) = registry.find_object(id) else {
                tracing::warn!(id = %id, "cannot flush an unregistered object -- skipping");
                continue;
            };
            let memento = object.save()?;
            let origin = ChangeOrigin::capture(object);
            let Some((baseline, rest)) = self.undoable.split_first_mut() else {
                return Err(UndoError::NotLoaded);
            };
            baseline.replace(Change {
                id,
                version: baseline.version,
                group: baseline.group,
                origin,
                previous: None,
                next: Some(Arc::new(memento)),
            });
            for changeset in rest.iter_mut().chain(self.redoable.iter_mut()) {
                changeset.remove(id);
            }
            flushed += 1;
        }

        let mut index = 0;
        self.undoable.retain(|changeset| {
            let keep = index == 0 || !changeset.is_empty();
            index += 1;
            keep
        });
        self.redoable.retain(|changeset| !changeset.is_empty());
        tracing::debug!(flushed, "flushed object history into baseline");
        Ok(flushed)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Version of the newest undoable changeset; `0` at the baseline.
    pub fn version(&self) -> u64 {
        self.undoable.last().map_or(0, |changeset| changeset.version)
    }

    pub fn can_undo(&self) -> bool {
        self.loaded && self.undoable.len() > 1
    }

    pub fn can_redo(&self) -> bool {
        self.loaded && !self.redoable.is_empty()
    }

    /// Changesets above the baseline.
    pub fn undo_count(&self) -> usize {
        self.undoable.len().saturating_sub(1)
    }

    pub fn redo_count(&self) -> usize {
        self.redoable.len()
    }

    /// The undoable stack, baseline first.
    pub fn undoable_changes(&self) -> &[Changeset] {
        &self.undoable
    }

    /// The redoable stack; the next redo is the last element.
    pub fn redoable_changes(&self) -> &[Changeset] {
        &self.redoable
    }

    pub fn caretaker(&self) -> &Caretaker {
        &self.caretaker
    }
}

impl Default for UndoManager {
    fn default() -> Self {
        Self::new(UndoConfig::default())
    }
}
