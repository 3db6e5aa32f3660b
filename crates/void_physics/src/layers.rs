//! Collision layers and filtering
//!
//! Two levels of filtering exist and they must not be confused:
//!
//! - [`ObjectLayer`] is the authority on whether two bodies collide. The
//!   rules are fixed: static never meets static, triggers only meet
//!   players, characters and dynamic bodies, everything else meets
//!   everything.
//! - [`BroadPhaseLayer`] collapses object layers into a non-moving and a
//!   moving bucket. It only decides which body-type pairs the broad phase
//!   bothers to pair up; it never accepts a pair the object layers reject.

use rapier3d::prelude as rapier;
use serde::{Deserialize, Serialize};
use std::ops::BitOr;

/// Fine-grained collision layer of a body or character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ObjectLayer {
    /// Level geometry that never moves
    Static,
    /// Simulated props
    #[default]
    Dynamic,
    /// Player-controlled bodies
    Player,
    /// Virtual characters
    Character,
    /// Overlap volumes without physical response
    Trigger,
}

impl ObjectLayer {
    /// Every layer, in bit order
    pub const ALL: [ObjectLayer; 5] = [
        ObjectLayer::Static,
        ObjectLayer::Dynamic,
        ObjectLayer::Player,
        ObjectLayer::Character,
        ObjectLayer::Trigger,
    ];

    /// Bit of this layer inside a [`LayerMask`]
    pub const fn bit(self) -> u32 {
        1 << (self as u32)
    }

    /// Fixed object-vs-object collision policy
    pub const fn collides_with(self, other: ObjectLayer) -> bool {
        use ObjectLayer::*;
        match (self, other) {
            (Static, Static) => false,
            (Trigger, Player | Character | Dynamic) | (Player | Character | Dynamic, Trigger) => {
                true
            }
            (Trigger, _) | (_, Trigger) => false,
            _ => true,
        }
    }

    /// Mask of every layer this layer collides with
    pub fn collision_mask(self) -> LayerMask {
        Self::ALL
            .iter()
            .filter(|other| self.collides_with(**other))
            .fold(LayerMask::NONE, |mask, layer| mask | *layer)
    }

    /// Broad-phase bucket this layer lives in
    pub const fn broad_phase_layer(self) -> BroadPhaseLayer {
        match self {
            ObjectLayer::Static => BroadPhaseLayer::NonMoving,
            _ => BroadPhaseLayer::Moving,
        }
    }

    /// Rapier interaction groups: membership is the layer bit, filter is the
    /// collision mask. Rapier tests both directions, which matches the
    /// symmetric policy above.
    pub(crate) fn interaction_groups(self) -> rapier::InteractionGroups {
        rapier::InteractionGroups::new(
            rapier::Group::from_bits_truncate(self.bit()),
            rapier::Group::from_bits_truncate(self.collision_mask().bits()),
        )
    }
}

/// Coarse broad-phase bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BroadPhaseLayer {
    /// Bodies that never move
    NonMoving,
    /// Everything else
    Moving,
}

impl BroadPhaseLayer {
    /// Whether the broad phase should pair objects from these two buckets
    pub const fn pairs_with(self, other: BroadPhaseLayer) -> bool {
        !matches!(
            (self, other),
            (BroadPhaseLayer::NonMoving, BroadPhaseLayer::NonMoving)
        )
    }

    /// Body-type pairs a collider in this bucket asks the broad phase to test
    pub(crate) fn active_collision_types(self) -> rapier::ActiveCollisionTypes {
        match self {
            BroadPhaseLayer::NonMoving => rapier::ActiveCollisionTypes::default(),
            BroadPhaseLayer::Moving => {
                rapier::ActiveCollisionTypes::default()
                    | rapier::ActiveCollisionTypes::KINEMATIC_KINEMATIC
                    | rapier::ActiveCollisionTypes::KINEMATIC_FIXED
            }
        }
    }
}

/// Set of object layers used to filter queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerMask(u32);

impl LayerMask {
    /// Every layer
    pub const ALL: Self = Self(0b1_1111);

    /// No layer
    pub const NONE: Self = Self(0);

    /// Mask from raw bits
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & Self::ALL.0)
    }

    /// Mask containing the given layers
    pub fn from_layers(layers: &[ObjectLayer]) -> Self {
        layers.iter().fold(Self::NONE, |mask, layer| mask | *layer)
    }

    /// Raw bits
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether the mask contains a layer
    pub const fn contains(self, layer: ObjectLayer) -> bool {
        self.0 & layer.bit() != 0
    }

    /// Remove a layer from the mask
    pub const fn without(self, layer: ObjectLayer) -> Self {
        Self(self.0 & !layer.bit())
    }

    /// Interaction groups for a query against this mask
    pub(crate) fn query_groups(self) -> rapier::InteractionGroups {
        rapier::InteractionGroups::new(
            rapier::Group::ALL,
            rapier::Group::from_bits_truncate(self.0),
        )
    }
}

impl Default for LayerMask {
    fn default() -> Self {
        Self::ALL
    }
}

impl From<ObjectLayer> for LayerMask {
    fn from(layer: ObjectLayer) -> Self {
        Self(layer.bit())
    }
}

impl BitOr<ObjectLayer> for LayerMask {
    type Output = LayerMask;

    fn bitor(self, rhs: ObjectLayer) -> LayerMask {
        LayerMask(self.0 | rhs.bit())
    }
}

impl BitOr for LayerMask {
    type Output = LayerMask;

    fn bitor(self, rhs: LayerMask) -> LayerMask {
        LayerMask(self.0 | rhs.0)
    }
}
