//! Spatial queries (raycasts, overlaps, sphere sweeps)

use crate::body::{unpack_user_data, BodyId};
use crate::convert;
use crate::layers::LayerMask;
use glam::{Quat, Vec3};
use parking_lot::RwLockReadGuard;
use rapier3d::parry::query::ShapeCastOptions as RapierShapeCastOptions;
use rapier3d::parry::shape::{Ball, Cuboid, Shape};
use rapier3d::prelude as rapier;

/// Result of a raycast
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastHit {
    /// Body that was hit
    pub body: BodyId,
    /// Owner of the body
    pub owner: Option<u64>,
    /// Hit point in world space
    pub point: Vec3,
    /// Surface normal at the hit point
    pub normal: Vec3,
    /// Distance from the ray origin
    pub distance: f32,
}

/// Result of a shape sweep
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeCastHit {
    /// Body that was hit
    pub body: BodyId,
    /// Owner of the body
    pub owner: Option<u64>,
    /// Contact point on the hit body, in world space
    pub point: Vec3,
    /// Surface normal of the hit body at the contact point
    pub normal: Vec3,
    /// Distance travelled along the sweep before the hit
    pub distance: f32,
}

/// Options shared by every query
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Maximum distance for rays and sweeps
    pub max_distance: f32,
    /// Layers to test
    pub layers: LayerMask,
    /// Whether triggers can be hit
    pub include_triggers: bool,
    /// Bodies to skip
    pub exclude: Vec<BodyId>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            max_distance: f32::MAX,
            layers: LayerMask::ALL,
            include_triggers: false,
            exclude: Vec::new(),
        }
    }
}

impl QueryOptions {
    /// Set maximum distance
    pub fn with_max_distance(mut self, distance: f32) -> Self {
        self.max_distance = distance;
        self
    }

    /// Restrict to a set of layers
    pub fn with_layers(mut self, layers: LayerMask) -> Self {
        self.layers = layers;
        self
    }

    /// Set whether triggers can be hit
    pub fn with_triggers(mut self, include: bool) -> Self {
        self.include_triggers = include;
        self
    }

    /// Skip a body
    pub fn exclude(mut self, body: BodyId) -> Self {
        self.exclude.push(body);
        self
    }
}

/// Read-only query view over a world. Obtained from
/// [`PhysicsWorld::query`](crate::PhysicsWorld::query), which refreshes the
/// acceleration structure first.
///
/// Holds a read lock on the query structure for as long as it lives.
pub struct PhysicsQuery<'a> {
    pub(crate) query_pipeline: RwLockReadGuard<'a, rapier::QueryPipeline>,
    pub(crate) colliders: &'a rapier::ColliderSet,
    pub(crate) bodies: &'a rapier::RigidBodySet,
}

impl PhysicsQuery<'_> {
    fn with_filter<R>(
        &self,
        options: &QueryOptions,
        f: impl FnOnce(rapier::QueryFilter<'_>) -> R,
    ) -> R {
        let excluded = |_: rapier::ColliderHandle, collider: &rapier::Collider| {
            !options
                .exclude
                .contains(&unpack_user_data(collider.user_data).0)
        };

        let mut filter = rapier::QueryFilter::new().groups(options.layers.query_groups());
        if !options.include_triggers {
            filter = filter.exclude_sensors();
        }
        if !options.exclude.is_empty() {
            filter = filter.predicate(&excluded);
        }
        f(filter)
    }

    fn ray(origin: Vec3, direction: Vec3) -> Option<rapier::Ray> {
        let direction = direction.try_normalize()?;
        Some(rapier::Ray::new(
            convert::to_point(origin),
            convert::to_vector(direction),
        ))
    }

    fn hit_for(&self, handle: rapier::ColliderHandle) -> (BodyId, Option<u64>) {
        self.colliders
            .get(handle)
            .map(|c| unpack_user_data(c.user_data))
            .unwrap_or((BodyId::INVALID, None))
    }

    /// First hit along a ray. The direction does not need to be normalized.
    pub fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        options: &QueryOptions,
    ) -> Option<RaycastHit> {
        let ray = Self::ray(origin, direction)?;
        let (handle, intersection) = self.with_filter(options, |filter| {
            self.query_pipeline.cast_ray_and_get_normal(
                self.bodies,
                self.colliders,
                &ray,
                options.max_distance,
                true,
                filter,
            )
        })?;

        let (body, owner) = self.hit_for(handle);
        Some(RaycastHit {
            body,
            owner,
            point: convert::from_point(&ray.point_at(intersection.time_of_impact)),
            normal: convert::from_vector(&intersection.normal),
            distance: intersection.time_of_impact,
        })
    }

    /// Every hit along a ray, nearest first
    pub fn raycast_all(
        &self,
        origin: Vec3,
        direction: Vec3,
        options: &QueryOptions,
    ) -> Vec<RaycastHit> {
        let Some(ray) = Self::ray(origin, direction) else {
            return Vec::new();
        };

        let mut hits = Vec::new();
        self.with_filter(options, |filter| {
            self.query_pipeline.intersections_with_ray(
                self.bodies,
                self.colliders,
                &ray,
                options.max_distance,
                true,
                filter,
                |handle, intersection| {
                    let (body, owner) = self.hit_for(handle);
                    hits.push(RaycastHit {
                        body,
                        owner,
                        point: convert::from_point(&ray.point_at(intersection.time_of_impact)),
                        normal: convert::from_vector(&intersection.normal),
                        distance: intersection.time_of_impact,
                    });
                    true
                },
            )
        });

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }

    fn overlap(
        &self,
        shape: &dyn Shape,
        pose: &rapier::Isometry<f32>,
        options: &QueryOptions,
    ) -> Vec<BodyId> {
        let mut found = Vec::new();
        self.with_filter(options, |filter| {
            self.query_pipeline.intersections_with_shape(
                self.bodies,
                self.colliders,
                pose,
                shape,
                filter,
                |handle| {
                    let (body, _) = self.hit_for(handle);
                    if !found.contains(&body) {
                        found.push(body);
                    }
                    true
                },
            )
        });
        found
    }

    /// Bodies overlapping a sphere
    pub fn overlap_sphere(&self, center: Vec3, radius: f32, options: &QueryOptions) -> Vec<BodyId> {
        if radius.is_nan() || radius <= 0.0 {
            return Vec::new();
        }
        let ball = Ball::new(radius);
        self.overlap(&ball, &convert::to_isometry(center, Quat::IDENTITY), options)
    }

    /// Bodies overlapping an oriented box
    pub fn overlap_box(
        &self,
        center: Vec3,
        half_extents: Vec3,
        rotation: Quat,
        options: &QueryOptions,
    ) -> Vec<BodyId> {
        if !half_extents.cmpgt(Vec3::ZERO).all() {
            return Vec::new();
        }
        let cuboid = Cuboid::new(convert::to_vector(half_extents));
        self.overlap(&cuboid, &convert::to_isometry(center, rotation), options)
    }

    /// First body hit by a sphere swept along a direction
    pub fn cast_sphere(
        &self,
        origin: Vec3,
        radius: f32,
        direction: Vec3,
        options: &QueryOptions,
    ) -> Option<ShapeCastHit> {
        let direction = direction.try_normalize()?;
        if radius.is_nan() || radius <= 0.0 {
            return None;
        }

        let ball = Ball::new(radius);
        let pose = convert::to_isometry(origin, Quat::IDENTITY);
        let velocity = convert::to_vector(direction);
        let cast_options = RapierShapeCastOptions {
            max_time_of_impact: options.max_distance,
            stop_at_penetration: true,
            ..Default::default()
        };

        let (handle, hit) = self.with_filter(options, |filter| {
            self.query_pipeline.cast_shape(
                self.bodies,
                self.colliders,
                &pose,
                &velocity,
                &ball,
                cast_options,
                filter,
            )
        })?;

        let (body, owner) = self.hit_for(handle);
        let collider_pose = self
            .colliders
            .get(handle)
            .map(|c| *c.position())
            .unwrap_or_else(rapier::Isometry::identity);

        Some(ShapeCastHit {
            body,
            owner,
            // witness1/normal1 belong to the collider that was hit, in its local frame
            point: convert::from_point(&collider_pose.transform_point(&hit.witness1)),
            normal: convert::from_vector(&collider_pose.transform_vector(&hit.normal1)),
            distance: hit.time_of_impact,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyDescriptor;
    use crate::geometry::ShapeDesc;
    use crate::{PhysicsConfig, PhysicsWorld};
    use approx::assert_relative_eq;

    fn row_of_boxes() -> (PhysicsWorld, Vec<BodyId>) {
        let mut world = PhysicsWorld::new(PhysicsConfig::default().with_worker_threads(1)).unwrap();
        let ids = (1..=3)
            .map(|i| {
                world.create_body(
                    BodyDescriptor::dynamic(ShapeDesc::cuboid(0.5, 0.5, 0.5))
                        .with_position(Vec3::new(i as f32 * 3.0, 0.0, 0.0))
                        .with_gravity_factor(0.0),
                )
            })
            .collect();
        (world, ids)
    }

    #[test]
    fn test_raycast_all_sorted_by_distance() {
        let (world, ids) = row_of_boxes();
        let hits = world
            .query()
            .raycast_all(Vec3::ZERO, Vec3::X, &QueryOptions::default());

        assert_eq!(hits.iter().map(|h| h.body).collect::<Vec<_>>(), ids);
        assert_relative_eq!(hits[0].distance, 2.5, epsilon = 1.0e-4);
    }

    #[test]
    fn test_exclude_skips_body() {
        let (world, ids) = row_of_boxes();
        let options = QueryOptions::default().exclude(ids[0]);
        let hit = world.query().raycast(Vec3::ZERO, Vec3::X, &options);
        assert_eq!(hit.map(|h| h.body), Some(ids[1]));
    }

    #[test]
    fn test_max_distance_limits_hits() {
        let (world, _) = row_of_boxes();
        let options = QueryOptions::default().with_max_distance(4.0);
        let hits = world.query().raycast_all(Vec3::ZERO, Vec3::X, &options);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_zero_direction_hits_nothing() {
        let (world, _) = row_of_boxes();
        let query = world.query();
        assert!(query
            .raycast(Vec3::ZERO, Vec3::ZERO, &QueryOptions::default())
            .is_none());
        assert!(query
            .cast_sphere(Vec3::ZERO, 0.25, Vec3::ZERO, &QueryOptions::default())
            .is_none());
    }

    #[test]
    fn test_cast_sphere_stops_at_first_box() {
        let (world, ids) = row_of_boxes();
        let hit = world
            .query()
            .cast_sphere(Vec3::ZERO, 0.25, Vec3::X, &QueryOptions::default())
            .expect("sweep should hit");
        assert_eq!(hit.body, ids[0]);
        assert_relative_eq!(hit.distance, 2.25, epsilon = 1.0e-3);
        assert_relative_eq!(hit.normal.x, -1.0, epsilon = 1.0e-3);
    }

    #[test]
    fn test_cast_sphere_reports_surface_of_hit_body() {
        let (world, _) = row_of_boxes();
        let hit = world
            .query()
            .cast_sphere(Vec3::ZERO, 0.25, Vec3::X, &QueryOptions::default())
            .expect("sweep should hit");
        assert_relative_eq!(hit.point.x, 2.5, epsilon = 1.0e-3);
        assert_relative_eq!(hit.point.y, 0.0, epsilon = 1.0e-3);
        assert_relative_eq!(hit.point.z, 0.0, epsilon = 1.0e-3);
        assert!(hit.normal.dot(Vec3::X) < -0.999);
    }

    #[test]
    fn test_triggers_only_when_requested() {
        let mut world = PhysicsWorld::new(PhysicsConfig::default().with_worker_threads(1)).unwrap();
        let trigger = world.create_body(
            BodyDescriptor::trigger(ShapeDesc::cuboid(1.0, 1.0, 1.0))
                .with_position(Vec3::new(3.0, 0.0, 0.0)),
        );

        let query = world.query();
        assert!(query
            .raycast(Vec3::ZERO, Vec3::X, &QueryOptions::default())
            .is_none());
        let hit = query.raycast(Vec3::ZERO, Vec3::X, &QueryOptions::default().with_triggers(true));
        assert_eq!(hit.map(|h| h.body), Some(trigger));
    }
}
