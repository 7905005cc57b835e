//! Property tests for undo/redo symmetry.
//!
//! Random edit sequences are recorded one tick at a time; walking the whole
//! history back and forth must visit exactly the recorded states.

use proptest::prelude::*;
use tiny_model::prelude::*;
use tiny_undo::prelude::*;

const FIELDS: [&str; 3] = ["a", "b", "c"];

fn setup() -> (EditorContext, TinyId, TinyId) {
    let mut ids = IdGenerator::seeded(99);
    let mut context = EditorContext::default();
    let counter = ids.next_id();
    {
        let ty = context
            .registry_mut()
            .create_type(counter, "Counter", TypeCode::Component);
        for name in FIELDS {
            ty.create_field(ids.next_id(), name, builtin::type_ref(TypeCode::Int32).unwrap(), false)
                .unwrap();
        }
    }
    context.load();

    let entity = ids.next_id();
    context.registry_mut().create_entity(entity, "Subject");
    context.registry_mut().add_component(entity, counter).unwrap();
    context.update().unwrap();
    (context, entity, counter)
}

fn state(context: &EditorContext, entity: TinyId) -> String {
    context.registry().find_object(entity).unwrap().save().unwrap().hash
}

/// `(entity version, component version)` while the entity is registered.
fn object_versions(context: &EditorContext, entity: TinyId, counter: TinyId) -> Option<(u64, u64)> {
    let object = context.registry().find_by_id::<TinyEntity>(entity)?;
    Some((object.version(), object.get_component(counter)?.version()))
}

#[derive(Debug, Clone)]
enum Edit {
    Set(usize, i32),
    ClearOverride(usize),
    Rename(String),
}

fn edit_strategy() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (0..FIELDS.len(), -3..3i32).prop_map(|(f, v)| Edit::Set(f, v)),
        (0..FIELDS.len()).prop_map(Edit::ClearOverride),
        prop::sample::select(vec!["Subject", "Object", "Thing"]).prop_map(|n| Edit::Rename(n.to_owned())),
    ]
}

fn apply(context: &mut EditorContext, entity: TinyId, counter: TinyId, edit: &Edit) {
    let object = context.registry_mut().find_by_id_mut::<TinyEntity>(entity).unwrap();
    match edit {
        Edit::Set(field, value) => {
            object
                .get_component_mut(counter)
                .unwrap()
                .set(FIELDS[*field], *value)
                .unwrap();
        }
        Edit::ClearOverride(field) => {
            object
                .get_component_mut(counter)
                .unwrap()
                .set_overridden(FIELDS[*field], false);
        }
        Edit::Rename(name) => object.set_name(name.as_str()),
    }
}

proptest! {
    /// Undo walks back through every recorded state; redo walks forward again.
    #[test]
    fn undo_redo_walk_recorded_states(edits in prop::collection::vec(edit_strategy(), 1..16)) {
        let (mut context, entity, counter) = setup();
        let mut states = vec![state(&context, entity)];
        for edit in &edits {
            apply(&mut context, entity, counter, edit);
            if context.update().is_some() {
                states.push(state(&context, entity));
            }
        }
        prop_assert_eq!(context.undo_manager().undo_count(), states.len());

        for expected in states.iter().rev().skip(1) {
            context.undo().unwrap();
            prop_assert_eq!(&state(&context, entity), expected);
        }
        context.undo().unwrap();
        prop_assert!(!context.registry().contains(entity));
        prop_assert!(!context.undo_manager().can_undo());

        context.redo().unwrap();
        for expected in states.iter().skip(1) {
            context.redo().unwrap();
            prop_assert_eq!(&state(&context, entity), expected);
        }
        prop_assert!(!context.undo_manager().can_redo());
    }

    /// The version reported after each update only grows, the edited
    /// object's versions never go backwards, and replay never records
    /// anything.
    #[test]
    fn versions_grow_and_replay_is_silent(edits in prop::collection::vec(edit_strategy(), 1..16)) {
        let (mut context, entity, counter) = setup();
        let mut last = context.undo_manager().version();
        for edit in &edits {
            apply(&mut context, entity, counter, edit);
            if let Some(version) = context.update() {
                prop_assert!(version > last);
                last = version;
            }
        }
        let mut seen = object_versions(&context, entity, counter);
        while context.undo_manager().can_undo() {
            context.undo().unwrap();
            prop_assert_eq!(context.update(), None);
            if let Some(now) = object_versions(&context, entity, counter) {
                prop_assert!(seen.map_or(true, |was| now.0 >= was.0 && now.1 >= was.1));
                seen = Some(now);
            }
        }
        while context.undo_manager().can_redo() {
            context.redo().unwrap();
            prop_assert_eq!(context.update(), None);
            if let Some(now) = object_versions(&context, entity, counter) {
                prop_assert!(seen.map_or(true, |was| now.0 >= was.0 && now.1 >= was.1));
                seen = Some(now);
            }
        }
        prop_assert_eq!(context.undo_manager().version(), last);
    }
}
