//! Void Scene - entities, hierarchy and physics synchronization
//!
//! A [`Scene`] pairs a `hecs::World` with its own
//! [`PhysicsWorld`](void_physics::PhysicsWorld). Entities describe bodies
//! with plain components ([`RigidBodyComponent`] plus one collider); the
//! runtime bodies behind them exist only while the scene is playing.
//!
//! # Rules
//!
//! - Entities with a rigid body are always hierarchy roots. Attaching one is
//!   rejected, and entering play mode detaches any that were parented.
//! - Dynamic bodies write their pose into [`TransformComponent`]; static and
//!   kinematic bodies follow theirs.
//! - World transforms are propagated after physics, once per fixed update.
//!
//! # Example
//!
//! ```no_run
//! use void_scene::prelude::*;
//! use glam::Vec3;
//!
//! let mut scene = Scene::new(SceneConfig::default())?;
//! scene.spawn((
//!     TransformComponent::IDENTITY,
//!     RigidBodyComponent::fixed(),
//!     BoxColliderComponent::new(Vec3::new(10.0, 0.5, 10.0)),
//! ));
//! let ball = scene.spawn((
//!     TransformComponent::from_translation(Vec3::new(0.0, 5.0, 0.0)),
//!     RigidBodyComponent::dynamic(),
//!     SphereColliderComponent::new(0.5),
//! ));
//!
//! scene.on_runtime_start();
//! for _ in 0..120 {
//!     scene.update(1.0 / 60.0);
//! }
//! let transform = scene.world().get::<&TransformComponent>(ball).map(|t| *t);
//! println!("ball at {:?}", transform);
//! scene.on_runtime_stop();
//! # Ok::<(), void_scene::SceneError>(())
//! ```

pub mod bridge;
pub mod components;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod hooks;
pub mod propagation;
pub mod scene;
pub mod time;

pub mod prelude {
    //! Common imports for scenes
    pub use crate::bridge::PhysicsBridge;
    pub use crate::components::{
        BoxColliderComponent, CapsuleColliderComponent, CharacterControllerComponent,
        RelationshipComponent, RigidBodyComponent, SphereColliderComponent, TransformComponent,
        WorldTransformComponent,
    };
    pub use crate::config::SceneConfig;
    pub use crate::error::{HierarchyError, Result, SceneError};
    pub use crate::hierarchy::HierarchyCommands;
    pub use crate::hooks::DestroyHooks;
    pub use crate::propagation::TransformPropagationSystem;
    pub use crate::scene::{EntityCharacterCollision, EntityCollision, Scene, SceneState};
    pub use crate::time::FixedTimestep;
    pub use void_physics::{BodyId, CharacterId, CollisionEventKind};
}

pub use prelude::*;
