//! Hierarchy Commands API
//!
//! Validated parent/child edits on a `hecs::World`. Every operation keeps the
//! two-way links in [`RelationshipComponent`] consistent and refuses to
//! create cycles.
//!
//! Entities with a [`RigidBodyComponent`] simulate in world space and must
//! stay scene roots: attaching one is rejected with a warning and leaves the
//! hierarchy untouched.
//!
//! # Usage
//!
//! ```
//! use void_scene::{HierarchyCommands, TransformComponent};
//! use glam::Vec3;
//!
//! let mut world = hecs::World::new();
//! let parent = world.spawn((TransformComponent::from_translation(Vec3::X),));
//! let child = world.spawn((TransformComponent::IDENTITY,));
//!
//! let mut commands = HierarchyCommands::new(&mut world);
//! commands.attach_entity(child, parent).unwrap();
//! assert_eq!(commands.parent(child), Some(parent));
//! ```

use crate::components::{RelationshipComponent, RigidBodyComponent, TransformComponent};
use crate::error::HierarchyError;
use glam::Mat4;
use hecs::Entity;

/// Deepest parent chain followed before assuming the links are corrupt
const MAX_DEPTH: usize = 1024;

/// Commands for manipulating the entity hierarchy
pub struct HierarchyCommands<'w> {
    world: &'w mut hecs::World,
}

impl<'w> HierarchyCommands<'w> {
    /// Create a new HierarchyCommands with access to the world
    pub fn new(world: &'w mut hecs::World) -> Self {
        Self { world }
    }

    /// Parent of an entity
    pub fn parent(&self, entity: Entity) -> Option<Entity> {
        parent_of(self.world, entity)
    }

    /// Children of an entity
    pub fn children(&self, entity: Entity) -> Vec<Entity> {
        self.world
            .get::<&RelationshipComponent>(entity)
            .map(|r| r.children.clone())
            .unwrap_or_default()
    }

    /// Whether `ancestor` appears anywhere in `entity`'s parent chain
    pub fn is_ancestor(&self, entity: Entity, ancestor: Entity) -> bool {
        let mut current = self.parent(entity);
        for _ in 0..MAX_DEPTH {
            match current {
                Some(e) if e == ancestor => return true,
                Some(e) => current = self.parent(e),
                None => return false,
            }
        }
        false
    }

    /// Topmost ancestor of an entity, or the entity itself for roots
    pub fn root(&self, entity: Entity) -> Entity {
        let mut current = entity;
        for _ in 0..MAX_DEPTH {
            match self.parent(current) {
                Some(parent) => current = parent,
                None => break,
            }
        }
        current
    }

    /// World matrix derived from the local transforms up the parent chain
    pub fn world_matrix(&self, entity: Entity) -> Mat4 {
        world_matrix(self.world, entity)
    }

    /// Make `child` a child of `parent`, keeping its local transform.
    ///
    /// # Errors
    ///
    /// - `PhysicsBodyCannotBeChild` if `child` has a rigid body
    /// - `EntityNotFound` / `InvalidParent` if either entity is gone
    /// - `CycleDetected` if `child` is `parent` or one of its ancestors
    ///
    /// On error the hierarchy is unchanged.
    pub fn attach_entity(&mut self, child: Entity, parent: Entity) -> Result<(), HierarchyError> {
        self.validate_attach(child, parent)?;
        self.unlink(child);
        self.link(child, parent);
        Ok(())
    }

    /// Make `child` a child of `parent`, rewriting its local transform so
    /// its world transform does not change. Same errors as
    /// [`attach_entity`](Self::attach_entity).
    pub fn attach_entity_keep_world(
        &mut self,
        child: Entity,
        parent: Entity,
    ) -> Result<(), HierarchyError> {
        self.validate_attach(child, parent)?;

        let world = self.world_matrix(child);
        self.unlink(child);
        self.link(child, parent);
        let local = self.world_matrix(parent).inverse() * world;
        self.set_local(child, &local);
        Ok(())
    }

    /// Make an entity a root, keeping its local transform
    pub fn detach_entity(&mut self, entity: Entity) {
        self.unlink(entity);
    }

    /// Make an entity a root, keeping its world transform
    pub fn detach_entity_keep_world(&mut self, entity: Entity) {
        if self.parent(entity).is_none() {
            return;
        }
        let world = self.world_matrix(entity);
        self.unlink(entity);
        self.set_local(entity, &world);
    }

    fn validate_attach(&self, child: Entity, parent: Entity) -> Result<(), HierarchyError> {
        if self.world.get::<&RigidBodyComponent>(child).is_ok() {
            log::warn!(
                "Refusing to attach {:?} to {:?}: entities with a RigidBodyComponent must stay scene roots",
                child,
                parent
            );
            return Err(HierarchyError::PhysicsBodyCannotBeChild { entity: child });
        }
        if !self.world.contains(child) {
            return Err(HierarchyError::EntityNotFound { entity: child });
        }
        if !self.world.contains(parent) {
            return Err(HierarchyError::InvalidParent { child, parent });
        }
        if child == parent {
            return Err(HierarchyError::CycleDetected {
                entities: vec![child],
            });
        }
        if self.is_ancestor(parent, child) {
            return Err(HierarchyError::CycleDetected {
                entities: vec![child, parent],
            });
        }
        Ok(())
    }

    fn relationship_mut(&mut self, entity: Entity) -> Option<hecs::RefMut<'_, RelationshipComponent>> {
        if self.world.get::<&RelationshipComponent>(entity).is_err() {
            self.world
                .insert_one(entity, RelationshipComponent::default())
                .ok()?;
        }
        self.world.get::<&mut RelationshipComponent>(entity).ok()
    }

    fn link(&mut self, child: Entity, parent: Entity) {
        if let Some(mut relationship) = self.relationship_mut(child) {
            relationship.parent = Some(parent);
        }
        if let Some(mut relationship) = self.relationship_mut(parent) {
            if !relationship.children.contains(&child) {
                relationship.children.push(child);
            }
        }
    }

    /// Remove the parent link, returning the old parent
    fn unlink(&mut self, child: Entity) -> Option<Entity> {
        let old_parent = {
            let mut relationship = self.world.get::<&mut RelationshipComponent>(child).ok()?;
            relationship.parent.take()?
        };
        if let Ok(mut relationship) = self.world.get::<&mut RelationshipComponent>(old_parent) {
            relationship.children.retain(|c| *c != child);
        }
        Some(old_parent)
    }

    fn set_local(&mut self, entity: Entity, local: &Mat4) {
        if let Ok(mut transform) = self.world.get::<&mut TransformComponent>(entity) {
            *transform = TransformComponent::from_matrix(local);
        }
    }
}

pub(crate) fn parent_of(world: &hecs::World, entity: Entity) -> Option<Entity> {
    world
        .get::<&RelationshipComponent>(entity)
        .ok()
        .and_then(|r| r.parent)
}

pub(crate) fn world_matrix(world: &hecs::World, entity: Entity) -> Mat4 {
    let mut matrix = Mat4::IDENTITY;
    let mut current = Some(entity);
    for _ in 0..MAX_DEPTH {
        let Some(e) = current else {
            break;
        };
        let local = world
            .get::<&TransformComponent>(e)
            .map(|t| t.to_matrix())
            .unwrap_or(Mat4::IDENTITY);
        matrix = local * matrix;
        current = parent_of(world, e);
    }
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    #[test]
    fn test_attach_and_detach() {
        let mut world = hecs::World::new();
        let parent = world.spawn((TransformComponent::IDENTITY,));
        let child = world.spawn((TransformComponent::IDENTITY,));

        let mut commands = HierarchyCommands::new(&mut world);
        commands.attach_entity(child, parent).unwrap();
        assert_eq!(commands.parent(child), Some(parent));
        assert_eq!(commands.children(parent), vec![child]);

        commands.detach_entity(child);
        assert_eq!(commands.parent(child), None);
        assert!(commands.children(parent).is_empty());
    }

    #[test]
    fn test_reattach_moves_between_parents() {
        let mut world = hecs::World::new();
        let a = world.spawn(());
        let b = world.spawn(());
        let child = world.spawn(());

        let mut commands = HierarchyCommands::new(&mut world);
        commands.attach_entity(child, a).unwrap();
        commands.attach_entity(child, b).unwrap();
        assert!(commands.children(a).is_empty());
        assert_eq!(commands.children(b), vec![child]);
    }

    #[test]
    fn test_cycle_detection() {
        let mut world = hecs::World::new();
        let a = world.spawn(());
        let b = world.spawn(());
        let c = world.spawn(());

        let mut commands = HierarchyCommands::new(&mut world);
        commands.attach_entity(b, a).unwrap();
        commands.attach_entity(c, b).unwrap();

        assert!(matches!(
            commands.attach_entity(a, c),
            Err(HierarchyError::CycleDetected { .. })
        ));
        assert!(matches!(
            commands.attach_entity(a, a),
            Err(HierarchyError::CycleDetected { .. })
        ));
        assert_eq!(commands.parent(a), None);
        assert_eq!(commands.root(c), a);
        assert!(commands.is_ancestor(c, a));
    }

    #[test]
    fn test_rigid_body_rejected_either_way() {
        let mut world = hecs::World::new();
        let parent = world.spawn((TransformComponent::IDENTITY,));
        let body = world.spawn((TransformComponent::IDENTITY, RigidBodyComponent::dynamic()));

        let mut commands = HierarchyCommands::new(&mut world);
        assert_eq!(
            commands.attach_entity(body, parent),
            Err(HierarchyError::PhysicsBodyCannotBeChild { entity: body })
        );
        assert_eq!(
            commands.attach_entity_keep_world(body, parent),
            Err(HierarchyError::PhysicsBodyCannotBeChild { entity: body })
        );
        assert_eq!(commands.parent(body), None);
        assert!(commands.children(parent).is_empty());
    }

    #[test]
    fn test_attach_keep_world_preserves_pose() {
        let mut world = hecs::World::new();
        let parent = world.spawn((TransformComponent::from_translation(Vec3::new(10.0, 0.0, 0.0))
            .with_rotation(Quat::from_rotation_y(std::f32::consts::FRAC_PI_2)),));
        let child = world.spawn((TransformComponent::from_translation(Vec3::new(1.0, 2.0, 3.0)),));

        let mut commands = HierarchyCommands::new(&mut world);
        let before = commands.world_matrix(child);
        commands.attach_entity_keep_world(child, parent).unwrap();
        let after = commands.world_matrix(child);

        assert!(before.abs_diff_eq(after, 1.0e-4));
        let local = world.get::<&TransformComponent>(child).unwrap().translation;
        assert!(!local.abs_diff_eq(Vec3::new(1.0, 2.0, 3.0), 1.0e-3));
    }

    #[test]
    fn test_detach_keep_world_preserves_pose() {
        let mut world = hecs::World::new();
        let parent = world.spawn((TransformComponent::from_translation(Vec3::new(0.0, 5.0, 0.0)),));
        let child = world.spawn((TransformComponent::from_translation(Vec3::new(1.0, 0.0, 0.0)),));

        let mut commands = HierarchyCommands::new(&mut world);
        commands.attach_entity(child, parent).unwrap();
        commands.detach_entity_keep_world(child);

        let local = world.get::<&TransformComponent>(child).unwrap().translation;
        assert!(local.abs_diff_eq(Vec3::new(1.0, 5.0, 0.0), 1.0e-5));
    }

    #[test]
    fn test_missing_entities() {
        let mut world = hecs::World::new();
        let alive = world.spawn(());
        let gone = world.spawn(());
        world.despawn(gone).unwrap();

        let mut commands = HierarchyCommands::new(&mut world);
        assert_eq!(
            commands.attach_entity(gone, alive),
            Err(HierarchyError::EntityNotFound { entity: gone })
        );
        assert_eq!(
            commands.attach_entity(alive, gone),
            Err(HierarchyError::InvalidParent {
                child: alive,
                parent: gone
            })
        );
    }
}
