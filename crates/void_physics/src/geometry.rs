//! Geometry builder: collider descriptions to simulation shapes
//!
//! Pure and stateless. Failures here are reported as [`PhysicsError`] so the
//! callers can log them and substitute a safe default; nothing in this module
//! logs or panics on bad input.

use crate::convert;
use crate::error::{PhysicsError, Result};
use glam::{Quat, Vec3};
use rapier3d::prelude as rapier;
use serde::{Deserialize, Serialize};

/// Squared offset length below which an offset is treated as zero
pub const OFFSET_EPSILON_SQ: f32 = 1.0e-8;

/// Half-extent of the box used when an entity has no collider
pub const FALLBACK_BOX_HALF_EXTENT: f32 = 0.5;

/// Radius of the sphere used when a shape is degenerate
pub const FALLBACK_SPHERE_RADIUS: f32 = 0.5;

/// Collision shape description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShapeDesc {
    /// Box with half-extents
    Box { half_extents: Vec3 },
    /// Sphere with radius
    Sphere { radius: f32 },
    /// Capsule aligned along Y; `half_height` excludes the caps
    Capsule { radius: f32, half_height: f32 },
    /// Cylinder aligned along Y
    Cylinder { radius: f32, half_height: f32 },
    /// Triangle mesh
    Mesh {
        vertices: Vec<Vec3>,
        indices: Vec<[u32; 3]>,
    },
}

impl Default for ShapeDesc {
    fn default() -> Self {
        Self::fallback_box()
    }
}

impl ShapeDesc {
    /// Create a box shape from half-extents
    pub fn cuboid(hx: f32, hy: f32, hz: f32) -> Self {
        Self::Box {
            half_extents: Vec3::new(hx, hy, hz),
        }
    }

    /// Create a sphere shape
    pub fn sphere(radius: f32) -> Self {
        Self::Sphere { radius }
    }

    /// Create a Y-aligned capsule
    pub fn capsule(radius: f32, half_height: f32) -> Self {
        Self::Capsule {
            radius,
            half_height,
        }
    }

    /// Create a Y-aligned cylinder
    pub fn cylinder(radius: f32, half_height: f32) -> Self {
        Self::Cylinder {
            radius,
            half_height,
        }
    }

    /// Box substituted for entities without a collider
    pub fn fallback_box() -> Self {
        Self::Box {
            half_extents: Vec3::splat(FALLBACK_BOX_HALF_EXTENT),
        }
    }

    /// Sphere substituted for degenerate shapes
    pub fn fallback_sphere() -> Self {
        Self::Sphere {
            radius: FALLBACK_SPHERE_RADIUS,
        }
    }

    /// Short name for log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Box { .. } => "box",
            Self::Sphere { .. } => "sphere",
            Self::Capsule { .. } => "capsule",
            Self::Cylinder { .. } => "cylinder",
            Self::Mesh { .. } => "mesh",
        }
    }

    /// Check the dimensions describe a solid the simulation can use
    pub fn validate(&self) -> Result<()> {
        fn positive(name: &str, value: f32) -> Result<()> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(PhysicsError::ShapeCreationFailed(format!(
                    "{name} must be positive and finite, got {value}"
                )))
            }
        }

        match self {
            Self::Box { half_extents } => {
                positive("half_extents.x", half_extents.x)?;
                positive("half_extents.y", half_extents.y)?;
                positive("half_extents.z", half_extents.z)
            }
            Self::Sphere { radius } => positive("radius", *radius),
            Self::Capsule {
                radius,
                half_height,
            }
            | Self::Cylinder {
                radius,
                half_height,
            } => {
                positive("radius", *radius)?;
                positive("half_height", *half_height)
            }
            Self::Mesh { vertices, indices } => {
                if vertices.is_empty() || indices.is_empty() {
                    return Err(PhysicsError::ShapeCreationFailed(
                        "mesh needs at least one triangle".into(),
                    ));
                }
                if vertices.iter().any(|v| !v.is_finite()) {
                    return Err(PhysicsError::ShapeCreationFailed(
                        "mesh has non-finite vertices".into(),
                    ));
                }
                let count = vertices.len() as u32;
                if indices.iter().flatten().any(|&i| i >= count) {
                    return Err(PhysicsError::ShapeCreationFailed(format!(
                        "mesh index out of range for {count} vertices"
                    )));
                }
                Ok(())
            }
        }
    }
}

/// Local offset of a collision volume relative to its body origin
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShapeOffset {
    /// Translation relative to the body origin
    pub translation: Vec3,
    /// Rotation relative to the body orientation
    pub rotation: Quat,
}

impl Default for ShapeOffset {
    fn default() -> Self {
        Self::ZERO
    }
}

impl ShapeOffset {
    /// No offset
    pub const ZERO: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    /// Translation-only offset
    pub fn translation(translation: Vec3) -> Self {
        Self {
            translation,
            rotation: Quat::IDENTITY,
        }
    }

    /// Whether the offset moves the volume at all
    pub fn is_negligible(&self) -> bool {
        self.translation.length_squared() <= OFFSET_EPSILON_SQ
            && self.rotation.abs_diff_eq(Quat::IDENTITY, 1.0e-6)
    }
}

/// Build the simulation shape for a description
pub fn build_shape(desc: &ShapeDesc) -> Result<rapier::SharedShape> {
    desc.validate()?;

    let shape = match desc {
        ShapeDesc::Box { half_extents } => {
            rapier::SharedShape::cuboid(half_extents.x, half_extents.y, half_extents.z)
        }
        ShapeDesc::Sphere { radius } => rapier::SharedShape::ball(*radius),
        ShapeDesc::Capsule {
            radius,
            half_height,
        } => rapier::SharedShape::capsule_y(*half_height, *radius),
        ShapeDesc::Cylinder {
            radius,
            half_height,
        } => rapier::SharedShape::cylinder(*half_height, *radius),
        ShapeDesc::Mesh { vertices, indices } => {
            let points = vertices.iter().map(|v| convert::to_point(*v)).collect();
            rapier::SharedShape::trimesh(points, indices.clone())
        }
    };

    Ok(shape)
}

/// Wrap a shape in a single-child compound displaced by `offset`.
///
/// The body origin stays at the entity origin while the volume moves.
pub fn compose_offset(
    inner: rapier::SharedShape,
    offset: &ShapeOffset,
) -> Result<rapier::SharedShape> {
    if offset.is_negligible() {
        return Ok(inner);
    }
    if !offset.translation.is_finite() || !offset.rotation.is_finite() {
        return Err(PhysicsError::OffsetCompositionFailed(format!(
            "offset is not finite: {:?}",
            offset
        )));
    }
    if inner.as_composite_shape().is_some() {
        return Err(PhysicsError::OffsetCompositionFailed(
            "composite shapes cannot be nested inside an offset compound".into(),
        ));
    }

    let pose = convert::to_isometry(offset.translation, offset.rotation);
    Ok(rapier::SharedShape::compound(vec![(pose, inner)]))
}

/// Build a shape and apply its offset, ignoring an offset that cannot be
/// composed. The second value carries the composition error, if any, so the
/// caller can report it.
pub fn build_offset_shape(
    desc: &ShapeDesc,
    offset: &ShapeOffset,
) -> Result<(rapier::SharedShape, Option<PhysicsError>)> {
    let inner = build_shape(desc)?;
    match compose_offset(inner.clone(), offset) {
        Ok(shape) => Ok((shape, None)),
        Err(err) => Ok((inner, Some(err))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapier3d::parry::shape::ShapeType;

    #[test]
    fn test_builds_primitive_shapes() {
        let ball = build_shape(&ShapeDesc::sphere(1.0)).unwrap();
        assert_eq!(ball.shape_type(), ShapeType::Ball);

        let cuboid = build_shape(&ShapeDesc::cuboid(1.0, 2.0, 3.0)).unwrap();
        assert_eq!(cuboid.shape_type(), ShapeType::Cuboid);

        let capsule = build_shape(&ShapeDesc::capsule(0.5, 1.0)).unwrap();
        assert_eq!(capsule.shape_type(), ShapeType::Capsule);

        let cylinder = build_shape(&ShapeDesc::cylinder(0.5, 1.0)).unwrap();
        assert_eq!(cylinder.shape_type(), ShapeType::Cylinder);
    }

    #[test]
    fn test_degenerate_shapes_rejected() {
        assert!(build_shape(&ShapeDesc::sphere(0.0)).is_err());
        assert!(build_shape(&ShapeDesc::cuboid(1.0, -1.0, 1.0)).is_err());
        assert!(build_shape(&ShapeDesc::capsule(f32::NAN, 1.0)).is_err());
        let mesh = ShapeDesc::Mesh {
            vertices: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            indices: vec![[0, 1, 7]],
        };
        assert!(build_shape(&mesh).is_err());
    }

    #[test]
    fn test_negligible_offset_keeps_inner_shape() {
        let shape = build_shape(&ShapeDesc::sphere(1.0)).unwrap();
        let offset = ShapeOffset::translation(Vec3::splat(1.0e-6));
        let composed = compose_offset(shape, &offset).unwrap();
        assert_eq!(composed.shape_type(), ShapeType::Ball);
    }

    #[test]
    fn test_offset_wraps_in_compound() {
        let (shape, err) = build_offset_shape(
            &ShapeDesc::cuboid(0.5, 0.5, 0.5),
            &ShapeOffset::translation(Vec3::new(0.0, 1.0, 0.0)),
        )
        .unwrap();
        assert!(err.is_none());
        assert_eq!(shape.shape_type(), ShapeType::Compound);
    }

    #[test]
    fn test_mesh_offset_falls_back_to_inner() {
        let mesh = ShapeDesc::Mesh {
            vertices: vec![Vec3::ZERO, Vec3::X, Vec3::Z],
            indices: vec![[0, 1, 2]],
        };
        let (shape, err) =
            build_offset_shape(&mesh, &ShapeOffset::translation(Vec3::Y)).unwrap();
        assert!(matches!(err, Some(PhysicsError::OffsetCompositionFailed(_))));
        assert_eq!(shape.shape_type(), ShapeType::TriMesh);
    }

    #[test]
    fn test_non_finite_offset_rejected() {
        let shape = build_shape(&ShapeDesc::sphere(1.0)).unwrap();
        let offset = ShapeOffset::translation(Vec3::new(f32::INFINITY, 0.0, 0.0));
        assert!(compose_offset(shape, &offset).is_err());
    }
}
