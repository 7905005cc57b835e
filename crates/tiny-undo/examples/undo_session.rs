//! A scripted editing session: edits, an operation group, undo and redo.
//!
//! Run with: `RUST_LOG=debug cargo run -p tiny-undo --example undo_session [config.json]`

use anyhow::Context;
use tiny_model::prelude::*;
use tiny_undo::prelude::*;

fn load_config() -> Result<UndoConfig, anyhow::Error> {
    match std::env::args().nth(1) {
        Some(path) => {
            let json = std::fs::read_to_string(&path).with_context(|| format!("failed to read {path}"))?;
            UndoConfig::from_json_str(&json)
        }
        None => Ok(UndoConfig {
            log_replays: true,
            ..Default::default()
        }),
    }
}

fn position(context: &EditorContext, entity: TinyId, transform: TinyId) -> (f32, f32) {
    let component = context
        .registry()
        .find_by_id::<TinyEntity>(entity)
        .and_then(|e| e.get_component(transform));
    let axis = |name: &str| match component.and_then(|c| c.get(name)) {
        Some(Value::Float32(v)) => *v,
        _ => 0.0,
    };
    (axis("x"), axis("y"))
}

fn move_to(context: &mut EditorContext, entity: TinyId, transform: TinyId, x: f32, y: f32) -> Result<(), anyhow::Error> {
    let component = context
        .registry_mut()
        .find_by_id_mut::<TinyEntity>(entity)
        .and_then(|e| e.get_component_mut(transform))
        .context("entity has no transform")?;
    component.set("x", x)?;
    component.set("y", y)?;
    Ok(())
}

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut context = EditorContext::new(load_config()?);
    let mut ids = IdGenerator::seeded(2024);

    let transform = ids.next_id();
    {
        let float32 = builtin::type_ref(TypeCode::Float32).context("float32 builtin")?;
        let ty = context
            .registry_mut()
            .create_type(transform, "Transform", TypeCode::Component);
        ty.create_field(ids.next_id(), "x", float32.clone(), false)?;
        ty.create_field(ids.next_id(), "y", float32, false)?;
    }
    context.load();

    let player = ids.next_id();
    context.registry_mut().create_entity(player, "Player");
    context.registry_mut().add_component(player, transform)?;
    context.update();

    move_to(&mut context, player, transform, 1.0, 2.0)?;
    context.update();

    // Two ticks of one drag, undone together.
    context.begin_operation();
    move_to(&mut context, player, transform, 3.0, 2.0)?;
    context.update();
    move_to(&mut context, player, transform, 5.0, 4.0)?;
    context.update();
    context.end_operation();
    println!("after edits:  {:?}", position(&context, player, transform));

    let report = context.undo()?;
    println!("after undo:   {:?}", position(&context, player, transform));
    println!("{}", serde_json::to_string_pretty(&report)?);

    context.redo()?;
    println!("after redo:   {:?}", position(&context, player, transform));

    context.sync_to_version(0)?;
    println!(
        "at baseline:  player registered = {}",
        context.registry().contains(player)
    );

    context.unload();
    Ok(())
}
