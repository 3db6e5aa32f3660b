//! Drops a stack of boxes onto a floor and walks a character through them.
//!
//! Run with `RUST_LOG=debug` to see bodies being created and destroyed.

use glam::Vec3;
use void_scene::prelude::*;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut scene = Scene::new(SceneConfig::default())?;

    scene.spawn((
        TransformComponent::IDENTITY,
        RigidBodyComponent::fixed(),
        BoxColliderComponent::new(Vec3::new(20.0, 0.5, 20.0)),
    ));

    let boxes: Vec<_> = (0..5)
        .map(|i| {
            scene.spawn((
                TransformComponent::from_translation(Vec3::new(3.0, 1.0 + i as f32 * 1.1, 0.0)),
                RigidBodyComponent::dynamic().with_mass(5.0),
                BoxColliderComponent::default(),
            ))
        })
        .collect();

    let zone = scene.spawn((
        TransformComponent::from_translation(Vec3::new(6.0, 1.5, 0.0)),
        RigidBodyComponent::trigger(),
        BoxColliderComponent::new(Vec3::new(1.0, 1.0, 2.0)),
    ));

    let mut player = CharacterControllerComponent::new(0.3, 0.6);
    player.desired_velocity = Vec3::new(1.5, 0.0, 0.0);
    let player = scene.spawn((
        TransformComponent::from_translation(Vec3::new(0.0, 1.5, 0.0)),
        player,
    ));

    scene.on_runtime_start();

    let frame_time = 1.0 / 60.0;
    for frame in 0..600 {
        scene.update(frame_time);

        for event in scene.collision_events() {
            if event.kind == CollisionEventKind::Enter && event.is_trigger && event.involves(zone) {
                log::info!("Frame {}: {:?} entered the zone", frame, event);
            }
        }
        for contact in scene.character_collisions() {
            log::info!("Frame {}: player touched {:?}", frame, contact.other_entity);
        }
    }

    for entity in boxes {
        if let Ok(transform) = scene.world().get::<&TransformComponent>(entity) {
            println!("box {:?} rests at {:?}", entity, transform.translation);
        }
    }
    if let Ok(transform) = scene.world().get::<&TransformComponent>(player) {
        println!("player ended at {:?}", transform.translation);
    }

    scene.on_runtime_stop();
    Ok(())
}
