//! Void Physics - Rapier 3D simulation for scenes
//!
//! One [`PhysicsWorld`] per scene owns the simulation, its worker pool and
//! every body and character in it. Everything outside the world refers to
//! simulation objects through [`BodyId`] and [`CharacterId`] keys.
//!
//! # Features
//!
//! - Static, dynamic and kinematic bodies with local shape offsets
//! - Trigger volumes
//! - Virtual capsule characters with stair stepping and slope limits
//! - Fixed object-layer collision policy
//! - Raycasts, overlaps and sphere sweeps
//! - Per-step collision event snapshots (enter, stay, exit, character)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                  PhysicsWorld                    │
//! │  ┌──────────────┐ ┌──────────────┐ ┌──────────┐ │
//! │  │ BodyId table │ │ CharacterId  │ │ Queries  │ │
//! │  │              │ │    table     │ │ (RwLock) │ │
//! │  └──────────────┘ └──────────────┘ └──────────┘ │
//! │  ┌──────────────────────────────────────────────┐│
//! │  │  PhysicsPipeline on a rayon worker pool      ││
//! │  │     └─ ContactListener ─► EventPipeline      ││
//! │  └──────────────────────────────────────────────┘│
//! └──────────────────────────────────────────────────┘
//!                         │ after each step
//!                         ▼
//!                  CollisionEvents
//! ```
//!
//! # Example
//!
//! ```no_run
//! use void_physics::prelude::*;
//! use glam::Vec3;
//!
//! let mut physics = PhysicsWorld::new(PhysicsConfig::default())?;
//!
//! physics.create_body(BodyDescriptor::fixed(ShapeDesc::cuboid(10.0, 0.5, 10.0)));
//! let ball = physics.create_body(
//!     BodyDescriptor::dynamic(ShapeDesc::sphere(0.5)).with_position(Vec3::new(0.0, 5.0, 0.0)),
//! );
//!
//! physics.step(1.0 / 60.0);
//! for event in physics.drain_collision_events().enter {
//!     println!("{:?} touched {:?}", event.body_a, event.body_b);
//! }
//! println!("ball at {:?}", physics.position(ball));
//! # Ok::<(), void_physics::PhysicsError>(())
//! ```

pub mod body;
pub mod character;
pub mod config;
mod convert;
pub mod error;
pub mod events;
pub mod geometry;
pub mod layers;
pub mod material;
pub mod query;
pub mod world;

pub mod prelude {
    //! Common imports for physics functionality
    pub use crate::body::{AxisLocks, BodyDescriptor, BodyId, BodyKind, MotionQuality};
    pub use crate::character::{CharacterDescriptor, CharacterId, GroundState};
    pub use crate::config::PhysicsConfig;
    pub use crate::error::{PhysicsError, Result};
    pub use crate::events::{
        CharacterCollision, CollisionEvent, CollisionEventKind, CollisionEvents,
    };
    pub use crate::geometry::{ShapeDesc, ShapeOffset};
    pub use crate::layers::{BroadPhaseLayer, LayerMask, ObjectLayer};
    pub use crate::material::{CombineRule, PhysicsMaterial};
    pub use crate::query::{PhysicsQuery, QueryOptions, RaycastHit, ShapeCastHit};
    pub use crate::world::PhysicsWorld;
}

pub use prelude::*;
