//! World transform propagation
//!
//! Computes [`WorldTransformComponent`] for every entity with a
//! [`TransformComponent`], walking down from the roots so a parent's world
//! matrix is always final before its children read it.

use crate::components::{RelationshipComponent, TransformComponent, WorldTransformComponent};
use glam::Mat4;
use hecs::Entity;
use std::collections::HashSet;

/// Transform propagation system
pub struct TransformPropagationSystem;

impl TransformPropagationSystem {
    /// Run the transform propagation system. Returns the number of entities
    /// updated.
    pub fn run(world: &mut hecs::World) -> usize {
        let mut stack: Vec<(Entity, Mat4)> = Vec::new();
        for (entity, (transform, relationship)) in world
            .query::<(&TransformComponent, Option<&RelationshipComponent>)>()
            .iter()
        {
            if relationship.map_or(true, RelationshipComponent::is_root) {
                stack.push((entity, transform.to_matrix()));
            }
        }

        let mut updates = Vec::with_capacity(stack.len());
        let mut visited = HashSet::with_capacity(stack.len());
        while let Some((entity, matrix)) = stack.pop() {
            if !visited.insert(entity) {
                log::error!("Cyclic parent-child relationship detected at {:?}", entity);
                continue;
            }
            updates.push((entity, matrix));

            let Ok(relationship) = world.get::<&RelationshipComponent>(entity) else {
                continue;
            };
            for &child in &relationship.children {
                let local = world
                    .get::<&TransformComponent>(child)
                    .map(|t| t.to_matrix())
                    .unwrap_or(Mat4::IDENTITY);
                stack.push((child, matrix * local));
            }
        }

        let mut count = 0;
        for (entity, matrix) in updates {
            match world.query_one_mut::<&mut WorldTransformComponent>(entity) {
                Ok(world_transform) => world_transform.matrix = matrix,
                Err(_) => {
                    if let Err(err) =
                        world.insert_one(entity, WorldTransformComponent::from_matrix(matrix))
                    {
                        // Listed as a child after it was despawned
                        log::warn!("Skipping world transform of {:?}: {}", entity, err);
                        continue;
                    }
                }
            }
            count += 1;
        }

        log::trace!("Propagated {} world transforms", count);
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::HierarchyCommands;
    use glam::{Quat, Vec3};

    fn world_translation(world: &hecs::World, entity: Entity) -> Vec3 {
        world
            .get::<&WorldTransformComponent>(entity)
            .unwrap()
            .translation()
    }

    #[test]
    fn test_root_world_equals_local() {
        let mut world = hecs::World::new();
        let root = world.spawn((TransformComponent::from_translation(Vec3::new(1.0, 2.0, 3.0)),));

        assert_eq!(TransformPropagationSystem::run(&mut world), 1);
        assert!(world_translation(&world, root).abs_diff_eq(Vec3::new(1.0, 2.0, 3.0), 1.0e-6));
    }

    #[test]
    fn test_three_level_chain() {
        let mut world = hecs::World::new();
        let a = world.spawn((TransformComponent::from_translation(Vec3::new(10.0, 0.0, 0.0)),));
        let b = world.spawn((TransformComponent::from_translation(Vec3::new(0.0, 5.0, 0.0))
            .with_rotation(Quat::from_rotation_z(std::f32::consts::FRAC_PI_2)),));
        let c = world.spawn((TransformComponent::from_translation(Vec3::new(1.0, 0.0, 0.0)),));

        {
            let mut commands = HierarchyCommands::new(&mut world);
            commands.attach_entity(b, a).unwrap();
            commands.attach_entity(c, b).unwrap();
        }
        TransformPropagationSystem::run(&mut world);

        assert!(world_translation(&world, b).abs_diff_eq(Vec3::new(10.0, 5.0, 0.0), 1.0e-5));
        // b is rotated 90 degrees about Z, so c's local +X points along +Y
        assert!(world_translation(&world, c).abs_diff_eq(Vec3::new(10.0, 6.0, 0.0), 1.0e-5));
    }

    #[test]
    fn test_dangling_child_is_skipped() {
        let mut world = hecs::World::new();
        let parent = world.spawn((TransformComponent::from_translation(Vec3::Y),));
        let child = world.spawn((TransformComponent::IDENTITY,));
        HierarchyCommands::new(&mut world).attach_entity(child, parent).unwrap();
        world.despawn(child).unwrap();

        assert_eq!(TransformPropagationSystem::run(&mut world), 1);
        assert!(world_translation(&world, parent).abs_diff_eq(Vec3::Y, 1.0e-6));
        assert!(!world.contains(child));
    }

    #[test]
    fn test_updates_existing_world_transform() {
        let mut world = hecs::World::new();
        let e = world.spawn((TransformComponent::IDENTITY, WorldTransformComponent::default()));
        TransformPropagationSystem::run(&mut world);

        world.get::<&mut TransformComponent>(e).unwrap().translation = Vec3::X;
        TransformPropagationSystem::run(&mut world);
        assert!(world_translation(&world, e).abs_diff_eq(Vec3::X, 1.0e-6));
    }
}
