//! Integration tests for container refresh, migration and default tracking.

use tiny_model::prelude::*;

// -- helpers ----------------------------------------------------------------

fn int32() -> TypeRef {
    builtin::type_ref(TypeCode::Int32).unwrap()
}

fn float32() -> TypeRef {
    builtin::type_ref(TypeCode::Float32).unwrap()
}

struct Ids {
    ty: TinyId,
    a: TinyId,
    b: TinyId,
}

/// Struct type `Pair { a: Int32, b: Int32 }`.
fn pair_type(registry: &mut Registry) -> Ids {
    let mut generator = IdGenerator::seeded(7);
    let ids = Ids {
        ty: generator.next_id(),
        a: generator.next_id(),
        b: generator.next_id(),
    };
    let pair = registry.create_type(ids.ty, "Pair", TypeCode::Struct);
    pair.create_field(ids.a, "a", int32(), false).unwrap();
    pair.create_field(ids.b, "b", int32(), false).unwrap();
    ids
}

fn instance(registry: &mut Registry, ty: TinyId) -> TinyObject {
    let type_ref = registry.find_by_id::<TinyType>(ty).unwrap().type_ref();
    let mut object = TinyObject::new(type_ref);
    registry.refresh_object(&mut object, false).unwrap();
    object
}

fn schema(registry: &mut Registry, ty: TinyId) -> &mut TinyType {
    registry.find_by_id_mut::<TinyType>(ty).unwrap()
}

// -- override tracking --------------------------------------------------------

#[test]
fn set_survives_refresh_with_unchanged_schema() {
    let mut registry = Registry::new();
    let ids = pair_type(&mut registry);
    let mut pair = instance(&mut registry, ids.ty);

    pair.set("a", 5).unwrap();
    let version = pair.version();
    assert!(!registry.refresh_object(&mut pair, false).unwrap());

    assert_eq!(pair.get("a"), Some(&Value::Int32(5)));
    assert_eq!(pair.get("b"), Some(&Value::Int32(0)));
    assert!(pair.is_field_overridden("a"));
    assert!(!pair.is_field_overridden("b"));
    assert_eq!(pair.version(), version);
}

#[test]
fn non_overridden_fields_follow_the_type_default() {
    let mut registry = Registry::new();
    let ids = pair_type(&mut registry);
    let mut pair = instance(&mut registry, ids.ty);
    pair.set("a", 1).unwrap();

    let default = registry.type_default_mut(ids.ty).unwrap();
    default.set("a", 10).unwrap();
    default.set("b", 20).unwrap();
    registry.refresh_object(&mut pair, false).unwrap();

    assert_eq!(pair.get("a"), Some(&Value::Int32(1)));
    assert_eq!(pair.get("b"), Some(&Value::Int32(20)));
    assert!(!pair.is_field_overridden("b"));
}

#[test]
fn reset_restores_defaults_and_keeps_dynamic_values() {
    let mut registry = Registry::new();
    let ids = pair_type(&mut registry);
    registry.type_default_mut(ids.ty).unwrap().set("b", 3).unwrap();
    let mut pair = instance(&mut registry, ids.ty);
    pair.set("a", 5).unwrap();
    pair.set("b", 6).unwrap();
    pair.set("note", "keep me").unwrap();

    pair.reset(&registry).unwrap();

    assert_eq!(pair.get("a"), Some(&Value::Int32(0)));
    assert_eq!(pair.get("b"), Some(&Value::Int32(3)));
    assert!(!pair.is_field_overridden("a"));
    assert!(!pair.is_field_overridden("b"));
    assert_eq!(pair.get("note"), Some(&Value::String("keep me".into())));
    assert!(pair.is_overridden());
}

// -- migration ----------------------------------------------------------------

#[test]
fn rename_keeps_value_by_field_id() {
    let mut registry = Registry::new();
    let ids = pair_type(&mut registry);
    let mut pair = instance(&mut registry, ids.ty);
    pair.set("a", 5).unwrap();

    assert!(schema(&mut registry, ids.ty).rename_field(ids.a, "a2"));
    assert!(registry.refresh_object(&mut pair, false).unwrap());

    assert_eq!(pair.get("a2"), Some(&Value::Int32(5)));
    assert!(pair.is_field_overridden("a2"));
    assert!(pair.get("a").is_none());
}

#[test]
fn reorder_remove_and_add_fields() {
    let mut registry = Registry::new();
    let ids = pair_type(&mut registry);
    let mut pair = instance(&mut registry, ids.ty);
    pair.set("a", 1).unwrap();
    pair.set("b", 2).unwrap();

    let c = TinyId::new();
    let ty = schema(&mut registry, ids.ty);
    ty.move_field(ids.b, 0);
    ty.remove_field(ids.a);
    ty.create_field(c, "c", float32(), false).unwrap();
    registry.refresh_object(&mut pair, false).unwrap();

    let names: Vec<&str> = pair.properties().layout().iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["b", "c"]);
    assert_eq!(pair.get("b"), Some(&Value::Int32(2)));
    assert_eq!(pair.get("c"), Some(&Value::Float32(0.0)));
    assert!(!pair.is_field_overridden("c"));
    assert_eq!(pair.properties().values().len(), 2);
}

#[test]
fn field_type_change_converts_overridden_values() {
    let mut registry = Registry::new();
    let ids = pair_type(&mut registry);
    let mut pair = instance(&mut registry, ids.ty);
    pair.set("a", 42).unwrap();

    let string = builtin::type_ref(TypeCode::String).unwrap();
    let ty = schema(&mut registry, ids.ty);
    ty.set_field_type(ids.a, string.clone(), false);
    ty.set_field_type(ids.b, string, false);
    registry.refresh_object(&mut pair, false).unwrap();

    assert_eq!(pair.get("a"), Some(&Value::String("42".into())));
    assert_eq!(pair.get("b"), Some(&Value::String(String::new())));
}

#[test]
fn dynamic_value_is_absorbed_by_a_matching_new_field() {
    let mut registry = Registry::new();
    let ids = pair_type(&mut registry);
    let mut pair = instance(&mut registry, ids.ty);
    pair.set("speed", 3.5f32).unwrap();

    schema(&mut registry, ids.ty)
        .create_field(TinyId::new(), "speed", float32(), false)
        .unwrap();
    registry.refresh_object(&mut pair, false).unwrap();

    assert_eq!(pair.get("speed"), Some(&Value::Float32(3.5)));
    assert!(pair.is_field_overridden("speed"));
    assert_eq!(pair.properties().dynamic_names().count(), 0);
}

// -- nested structs and lists -------------------------------------------------

#[test]
fn nested_struct_defaults_propagate() {
    let mut registry = Registry::new();
    let vector = TinyId::new();
    let transform = TinyId::new();
    {
        let v = registry.create_type(vector, "Vector3", TypeCode::Struct);
        for axis in ["x", "y", "z"] {
            v.create_field(TinyId::new(), axis, float32(), false).unwrap();
        }
    }
    let vector_ref = registry.find_by_id::<TinyType>(vector).unwrap().type_ref();
    registry
        .create_type(transform, "Transform", TypeCode::Component)
        .create_field(TinyId::new(), "position", vector_ref, false)
        .unwrap();

    let player = TinyId::new();
    registry.create_entity(player, "Player");
    registry.add_component(player, transform).unwrap();

    registry.type_default_mut(vector).unwrap().set("x", 1.0f32).unwrap();
    registry.refresh_entity(player, false).unwrap();

    let component = registry
        .find_by_id::<TinyEntity>(player)
        .unwrap()
        .get_component(transform)
        .unwrap();
    let position = component.get("position").and_then(Value::as_object).unwrap();
    assert_eq!(position.get("x"), Some(&Value::Float32(1.0)));
    assert_eq!(position.get("y"), Some(&Value::Float32(0.0)));
    assert!(!component.is_overridden());

    // Editing the nested object overrides the parent field.
    let entity = registry.find_by_id_mut::<TinyEntity>(player).unwrap();
    let component = entity.get_component_mut(transform).unwrap();
    component.object_mut("position").unwrap().set("y", 2.0f32).unwrap();
    assert!(component.is_field_overridden("position"));
}

#[test]
fn array_fields_follow_default_list_until_overridden() {
    let mut registry = Registry::new();
    let ty = TinyId::new();
    let values = TinyId::new();
    registry
        .create_type(ty, "Samples", TypeCode::Struct)
        .create_field(values, "values", int32(), true)
        .unwrap();

    let mut seed = TinyList::new(int32(), TypeCode::Int32);
    seed.push(7).unwrap();
    registry.type_default_mut(ty).unwrap().set("values", seed).unwrap();

    let mut samples = instance(&mut registry, ty);
    let list = samples.get("values").and_then(Value::as_list).unwrap();
    assert_eq!(list.iter().cloned().collect::<Vec<_>>(), vec![Value::Int32(7)]);
    assert!(!samples.is_field_overridden("values"));

    let mut own = TinyList::new(int32(), TypeCode::Int32);
    own.push(1).unwrap();
    own.push(2).unwrap();
    samples.set("values", own).unwrap();

    schema(&mut registry, ty).set_field_type(values, float32(), true);
    registry.refresh_object(&mut samples, false).unwrap();

    let list = samples.get("values").and_then(Value::as_list).unwrap();
    assert_eq!(list.element_code(), TypeCode::Float32);
    assert_eq!(
        list.iter().cloned().collect::<Vec<_>>(),
        vec![Value::Float32(1.0), Value::Float32(2.0)]
    );
}

#[test]
fn list_field_rejects_non_list_values() {
    let mut registry = Registry::new();
    let ty = TinyId::new();
    registry
        .create_type(ty, "Samples", TypeCode::Struct)
        .create_field(TinyId::new(), "values", int32(), true)
        .unwrap();
    let mut samples = instance(&mut registry, ty);

    let err = samples.set("values", 3).unwrap_err();
    assert!(matches!(err, ModelError::TypeMismatch { .. }));
    assert!(!samples.is_overridden());
}

// -- enums and references -----------------------------------------------------

#[test]
fn enum_fields_default_to_first_member() {
    let mut registry = Registry::new();
    let color = TinyId::new();
    let red = TinyId::new();
    let green = TinyId::new();
    {
        let ty = registry.create_type(color, "Color", TypeCode::Enum);
        ty.create_field(red, "Red", int32(), false).unwrap();
        ty.create_field(green, "Green", int32(), false).unwrap();
    }
    let color_ref = registry.find_by_id::<TinyType>(color).unwrap().type_ref();
    let paint = TinyId::new();
    registry
        .create_type(paint, "Paint", TypeCode::Struct)
        .create_field(TinyId::new(), "color", color_ref.clone(), false)
        .unwrap();

    let mut object = instance(&mut registry, paint);
    let Some(Value::Enum(value)) = object.get("color") else {
        panic!("expected an enum value");
    };
    assert_eq!(value.member, red);
    assert_eq!(value.member_name(&registry), Some("Red"));

    object.set("color", EnumRef::new(color_ref, green)).unwrap();
    let Some(Value::Enum(value)) = object.get("color") else {
        panic!("expected an enum value");
    };
    assert_eq!(value.member_name(&registry), Some("Green"));
}

#[test]
fn entity_reference_names_resync_on_migration() {
    let mut registry = Registry::new();
    let target = TinyId::new();
    registry.create_entity(target, "Old Name");
    let ty = TinyId::new();
    registry
        .create_type(ty, "Follow", TypeCode::Struct)
        .create_field(
            TinyId::new(),
            "target",
            builtin::type_ref(TypeCode::EntityReference).unwrap(),
            false,
        )
        .unwrap();

    let mut follow = instance(&mut registry, ty);
    assert_eq!(follow.get("target"), Some(&Value::Entity(EntityRef::none())));
    follow.set("target", EntityRef::new(target, "Old Name")).unwrap();

    registry.find_by_id_mut::<TinyEntity>(target).unwrap().set_name("New Name");
    schema(&mut registry, ty)
        .create_field(TinyId::new(), "distance", float32(), false)
        .unwrap();
    registry.refresh_object(&mut follow, false).unwrap();

    let Some(Value::Entity(reference)) = follow.get("target") else {
        panic!("expected an entity reference");
    };
    assert_eq!(reference.name, "New Name");
    assert_eq!(reference.dereference(&registry).map(TinyEntity::name), Some("New Name"));

    registry.unregister(target);
    assert!(reference.dereference(&registry).is_none());
}

// -- version propagation ------------------------------------------------------

#[test]
fn nested_edits_bump_the_owning_entity() {
    let mut registry = Registry::new();
    let ty = TinyId::new();
    registry
        .create_type(ty, "Inventory", TypeCode::Component)
        .create_field(TinyId::new(), "slots", int32(), true)
        .unwrap();
    let chest = TinyId::new();
    registry.create_entity(chest, "Chest");
    registry.add_component(chest, ty).unwrap();
    registry.take_changed();

    let before = registry.find_by_id::<TinyEntity>(chest).unwrap().version();
    registry
        .find_by_id_mut::<TinyEntity>(chest)
        .unwrap()
        .get_component_mut(ty)
        .unwrap()
        .list_mut("slots")
        .unwrap()
        .push(3)
        .unwrap();

    assert!(registry.find_by_id::<TinyEntity>(chest).unwrap().version() > before);
    assert_eq!(registry.take_changed(), vec![chest]);

    // The edited list no longer follows the default list.
    registry.refresh_entity(chest, false).unwrap();
    let component = registry
        .find_by_id::<TinyEntity>(chest)
        .unwrap()
        .get_component(ty)
        .unwrap();
    assert!(component.is_field_overridden("slots"));
    assert_eq!(component.get("slots").and_then(Value::as_list).map(TinyList::len), Some(1));
}
