//! Error types for scenes and the entity hierarchy

use hecs::Entity;
use thiserror::Error;
use void_physics::PhysicsError;

/// Hierarchy operation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HierarchyError {
    /// Entity does not exist
    #[error("Entity not found: {entity:?}")]
    EntityNotFound {
        /// Missing entity
        entity: Entity,
    },

    /// Parent does not exist
    #[error("Invalid parent {parent:?} for child {child:?}")]
    InvalidParent {
        /// Child entity
        child: Entity,
        /// Invalid parent entity
        parent: Entity,
    },

    /// The operation would make an entity its own ancestor
    #[error("Cycle detected in hierarchy: {entities:?}")]
    CycleDetected {
        /// Entities involved in the cycle
        entities: Vec<Entity>,
    },

    /// Entities simulated by physics must stay scene roots
    #[error("Entity {entity:?} has a rigid body and cannot become a child")]
    PhysicsBodyCannotBeChild {
        /// Entity carrying the rigid body
        entity: Entity,
    },
}

/// Scene errors
#[derive(Debug, Error)]
pub enum SceneError {
    /// Physics world failed to initialize
    #[error(transparent)]
    Physics(#[from] PhysicsError),

    /// Hierarchy operation rejected
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),

    /// Entity does not exist
    #[error("No such entity: {0:?}")]
    NoSuchEntity(Entity),

    /// Invalid scene configuration
    #[error("Invalid scene configuration: {0}")]
    InvalidConfig(String),

    /// Scene configuration could not be parsed
    #[error("Failed to parse scene configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

/// Result type for scene operations
pub type Result<T> = std::result::Result<T, SceneError>;
