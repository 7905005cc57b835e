//! Caretaker and refresh throughput.
//!
//! Measures the per-tick cost of change tracking on a scene of entities that
//! each carry a `Transform { position: Vector3, scale: Vector3 }` component:
//!
//! - snapshotting the 10% of entities edited in one tick;
//! - the no-change refresh pass the undo engine runs before every tick;
//! - the full migration after a nested default changes.
//!
//! Run with: `cargo bench --bench caretaker_benchmarks`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use tiny_model::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Scene {
    registry: Registry,
    vector: TinyId,
    transform: TinyId,
    entities: Vec<TinyId>,
}

fn setup_scene(entity_count: usize) -> Scene {
    let mut ids = IdGenerator::seeded(42);
    let mut registry = Registry::new();
    let float32 = builtin::type_ref(TypeCode::Float32).expect("builtin float");

    let vector = ids.next_id();
    {
        let ty = registry.create_type(vector, "Vector3", TypeCode::Struct);
        for axis in ["x", "y", "z"] {
            ty.create_field(ids.next_id(), axis, float32.clone(), false)
                .expect("struct field");
        }
    }
    let vector_ref = registry.find_by_id::<TinyType>(vector).expect("vector").type_ref();

    let transform = ids.next_id();
    {
        let ty = registry.create_type(transform, "Transform", TypeCode::Component);
        ty.create_field(ids.next_id(), "position", vector_ref.clone(), false)
            .expect("position field");
        ty.create_field(ids.next_id(), "scale", vector_ref, false)
            .expect("scale field");
    }

    let mut entities = Vec::with_capacity(entity_count);
    for i in 0..entity_count {
        let id = ids.next_id();
        registry.create_entity(id, format!("entity_{i}"));
        registry.add_component(id, transform).expect("component");
        entities.push(id);
    }

    Scene {
        registry,
        vector,
        transform,
        entities,
    }
}

fn edit(scene: &mut Scene, index: usize, value: f32) {
    let id = scene.entities[index];
    let transform = scene.transform;
    let component = scene
        .registry
        .find_by_id_mut::<TinyEntity>(id)
        .and_then(|e| e.get_component_mut(transform))
        .expect("transform component");
    component
        .object_mut("position")
        .expect("position")
        .set("x", value)
        .expect("set x");
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_caretaker_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("caretaker_update_10pct");
    for count in [100usize, 1000] {
        let mut scene = setup_scene(count);
        let mut caretaker = Caretaker::new();
        caretaker.update(&scene.registry);

        let mut tick = 0u32;
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                tick += 1;
                for index in (0..count).step_by(10) {
                    edit(&mut scene, index, tick as f32);
                }
                black_box(caretaker.update(&scene.registry).len())
            });
        });
    }
    group.finish();
}

fn bench_refresh_unchanged(c: &mut Criterion) {
    let mut scene = setup_scene(1000);
    scene.registry.refresh_all();
    c.bench_function("refresh_all_unchanged_1000", |b| {
        b.iter(|| black_box(scene.registry.refresh_all()));
    });
}

fn bench_refresh_after_default_change(c: &mut Criterion) {
    let mut scene = setup_scene(1000);
    let vector = scene.vector;
    let mut value = 0.0f32;
    c.bench_function("refresh_all_nested_default_1000", |b| {
        b.iter(|| {
            value += 1.0;
            scene
                .registry
                .type_default_mut(vector)
                .expect("vector default")
                .set("y", value)
                .expect("set y");
            black_box(scene.registry.refresh_all())
        });
    });
}

criterion_group!(
    benches,
    bench_caretaker_update,
    bench_refresh_unchanged,
    bench_refresh_after_default_change
);
criterion_main!(benches);
