//! Conversions between glam and the nalgebra types rapier speaks

use glam::{Quat, Vec3};
use rapier3d::na::{Quaternion, UnitQuaternion};
use rapier3d::prelude as rapier;

#[inline]
pub(crate) fn to_vector(v: Vec3) -> rapier::Vector<f32> {
    rapier::Vector::new(v.x, v.y, v.z)
}

#[inline]
pub(crate) fn to_point(v: Vec3) -> rapier::Point<f32> {
    rapier::Point::new(v.x, v.y, v.z)
}

#[inline]
pub(crate) fn from_vector(v: &rapier::Vector<f32>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

#[inline]
pub(crate) fn from_point(p: &rapier::Point<f32>) -> Vec3 {
    Vec3::new(p.x, p.y, p.z)
}

#[inline]
pub(crate) fn to_rotation(q: Quat) -> UnitQuaternion<f32> {
    UnitQuaternion::new_normalize(Quaternion::new(q.w, q.x, q.y, q.z))
}

#[inline]
pub(crate) fn from_rotation(q: &UnitQuaternion<f32>) -> Quat {
    Quat::from_xyzw(q.i, q.j, q.k, q.w)
}

#[inline]
pub(crate) fn to_isometry(position: Vec3, rotation: Quat) -> rapier::Isometry<f32> {
    rapier::Isometry::from_parts(
        rapier::Translation::new(position.x, position.y, position.z),
        to_rotation(rotation),
    )
}
