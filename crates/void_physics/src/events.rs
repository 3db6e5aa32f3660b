//! Collision event pipeline
//!
//! Contact callbacks run on the worker threads that execute a step and only
//! ever touch the mutex-guarded buffers in [`EventPipeline`]. Once the step
//! has returned, the world moves every buffer into a [`CollisionEvents`]
//! snapshot that the main thread reads or drains. Nothing is carried over
//! from one step to the next.

use crate::body::{unpack_user_data, BodyId};
use crate::character::CharacterId;
use crate::convert;
use glam::Vec3;
use parking_lot::Mutex;
use rapier3d::prelude as rapier;
use std::collections::{HashMap, HashSet};

/// Phase of a contact between two bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollisionEventKind {
    /// First contact during this step
    Enter,
    /// Contact carried over from the previous step
    Stay,
    /// Contact ended
    Exit,
}

/// A contact between two bodies.
///
/// Exit events only carry body ids: the owners are never resolved for them,
/// since the bodies may already be destroyed by the time the event is read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionEvent {
    /// Event phase
    pub kind: CollisionEventKind,
    /// First body
    pub body_a: BodyId,
    /// Second body
    pub body_b: BodyId,
    /// Owner of the first body, if resolved
    pub owner_a: Option<u64>,
    /// Owner of the second body, if resolved
    pub owner_b: Option<u64>,
    /// Contact point in world space
    pub point: Vec3,
    /// Contact normal pointing from `body_a` to `body_b`
    pub normal: Vec3,
    /// Penetration depth (0 when separated or for triggers)
    pub penetration_depth: f32,
    /// Whether either side is a trigger
    pub is_trigger: bool,
}

impl CollisionEvent {
    /// Check if this is an enter event
    pub fn is_enter(&self) -> bool {
        self.kind == CollisionEventKind::Enter
    }

    /// Check if this is an exit event
    pub fn is_exit(&self) -> bool {
        self.kind == CollisionEventKind::Exit
    }

    /// Whether `body` is one of the two sides
    pub fn involves(&self, body: BodyId) -> bool {
        self.body_a == body || self.body_b == body
    }

    /// The body on the other side from `body`
    pub fn other(&self, body: BodyId) -> Option<BodyId> {
        if self.body_a == body {
            Some(self.body_b)
        } else if self.body_b == body {
            Some(self.body_a)
        } else {
            None
        }
    }

    /// Order-independent key for the body pair
    pub fn pair_key(&self) -> (BodyId, BodyId) {
        pair_key(self.body_a, self.body_b)
    }
}

pub(crate) fn pair_key(a: BodyId, b: BodyId) -> (BodyId, BodyId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// A character touching a body for the first time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CharacterCollision {
    /// The character
    pub character: CharacterId,
    /// Owner of the character
    pub character_owner: Option<u64>,
    /// Body that was hit
    pub body: BodyId,
    /// Owner of the body, best effort
    pub other_owner: Option<u64>,
    /// Contact point in world space
    pub point: Vec3,
    /// Contact normal pointing away from the body, towards the character
    pub normal: Vec3,
}

/// Events produced by one step
#[derive(Debug, Clone, Default)]
pub struct CollisionEvents {
    /// Contacts that began this step
    pub enter: Vec<CollisionEvent>,
    /// Contacts that persisted from the previous step
    pub stay: Vec<CollisionEvent>,
    /// Contacts that ended this step
    pub exit: Vec<CollisionEvent>,
    /// New character contacts
    pub character: Vec<CharacterCollision>,
}

impl CollisionEvents {
    /// No events at all
    pub fn is_empty(&self) -> bool {
        self.enter.is_empty()
            && self.stay.is_empty()
            && self.exit.is_empty()
            && self.character.is_empty()
    }

    /// Total number of events
    pub fn len(&self) -> usize {
        self.enter.len() + self.stay.len() + self.exit.len() + self.character.len()
    }

    /// Trigger overlaps that began this step
    pub fn trigger_enters(&self) -> impl Iterator<Item = &CollisionEvent> {
        self.enter.iter().filter(|e| e.is_trigger)
    }

    /// Trigger overlaps that ended this step
    pub fn trigger_exits(&self) -> impl Iterator<Item = &CollisionEvent> {
        self.exit.iter().filter(|e| e.is_trigger)
    }

    /// Every body event touching `body`
    pub fn involving(&self, body: BodyId) -> impl Iterator<Item = &CollisionEvent> {
        self.enter
            .iter()
            .chain(self.stay.iter())
            .chain(self.exit.iter())
            .filter(move |e| e.involves(body))
    }
}

/// Buffers filled during a step, each behind its own lock
#[derive(Default)]
pub(crate) struct EventPipeline {
    enter: Mutex<Vec<CollisionEvent>>,
    stay: Mutex<Vec<CollisionEvent>>,
    exit: Mutex<Vec<CollisionEvent>>,
    character: Mutex<Vec<CharacterCollision>>,
}

impl EventPipeline {
    /// Drop whatever body events are still buffered
    pub(crate) fn clear_body_events(&self) {
        self.enter.lock().clear();
        self.stay.lock().clear();
        self.exit.lock().clear();
    }

    pub(crate) fn push(&self, event: CollisionEvent) {
        let buffer = match event.kind {
            CollisionEventKind::Enter => &self.enter,
            CollisionEventKind::Stay => &self.stay,
            CollisionEventKind::Exit => &self.exit,
        };
        buffer.lock().push(event);
    }

    pub(crate) fn push_character(&self, event: CharacterCollision) {
        self.character.lock().push(event);
    }

    /// Pairs that produced an enter event in the current step
    pub(crate) fn entered_pairs(&self) -> HashSet<(BodyId, BodyId)> {
        self.enter.lock().iter().map(CollisionEvent::pair_key).collect()
    }

    /// Move every buffer out, leaving them empty
    pub(crate) fn take(&self) -> CollisionEvents {
        CollisionEvents {
            enter: std::mem::take(&mut *self.enter.lock()),
            stay: std::mem::take(&mut *self.stay.lock()),
            exit: std::mem::take(&mut *self.exit.lock()),
            character: std::mem::take(&mut *self.character.lock()),
        }
    }
}

/// Rapier event handler feeding the pipeline from worker threads
pub(crate) struct ContactListener<'a> {
    pub(crate) pipeline: &'a EventPipeline,
    /// Colliders destroyed since the last step, still referenced by exits.
    /// A removed collider missing from here was discarded with its session.
    pub(crate) retired: &'a HashMap<rapier::ColliderHandle, BodyId>,
}

impl ContactListener<'_> {
    fn resolve(
        &self,
        colliders: &rapier::ColliderSet,
        handle: rapier::ColliderHandle,
    ) -> Option<(BodyId, Option<u64>)> {
        match colliders.get(handle) {
            Some(collider) => Some(unpack_user_data(collider.user_data)),
            None => self.retired.get(&handle).map(|&id| (id, None)),
        }
    }
}

impl rapier::EventHandler for ContactListener<'_> {
    fn handle_collision_event(
        &self,
        _bodies: &rapier::RigidBodySet,
        colliders: &rapier::ColliderSet,
        event: rapier::CollisionEvent,
        contact_pair: Option<&rapier::ContactPair>,
    ) {
        let (h1, h2) = (event.collider1(), event.collider2());
        let (Some((body_a, owner_a)), Some((body_b, owner_b))) =
            (self.resolve(colliders, h1), self.resolve(colliders, h2))
        else {
            log::trace!(
                "Dropping collision event for discarded colliders {:?}/{:?}",
                h1,
                h2
            );
            return;
        };

        if event.stopped() {
            self.pipeline.push(CollisionEvent {
                kind: CollisionEventKind::Exit,
                body_a,
                body_b,
                owner_a: None,
                owner_b: None,
                point: Vec3::ZERO,
                normal: Vec3::ZERO,
                penetration_depth: 0.0,
                is_trigger: event.sensor(),
            });
            return;
        }

        let (point, normal, penetration_depth) = match contact_pair {
            Some(pair) => deepest_contact(colliders, pair, h1),
            None => (midpoint(colliders, h1, h2), Vec3::ZERO, 0.0),
        };

        self.pipeline.push(CollisionEvent {
            kind: CollisionEventKind::Enter,
            body_a,
            body_b,
            owner_a,
            owner_b,
            point,
            normal,
            penetration_depth,
            is_trigger: event.sensor(),
        });
    }

    fn handle_contact_force_event(
        &self,
        _dt: f32,
        _bodies: &rapier::RigidBodySet,
        _colliders: &rapier::ColliderSet,
        _contact_pair: &rapier::ContactPair,
        _total_force_magnitude: f32,
    ) {
    }
}

/// World-space point, normal (oriented from `first` to the other collider)
/// and depth of the deepest contact in a pair
pub(crate) fn deepest_contact(
    colliders: &rapier::ColliderSet,
    pair: &rapier::ContactPair,
    first: rapier::ColliderHandle,
) -> (Vec3, Vec3, f32) {
    let Some((manifold, contact)) = pair.find_deepest_contact() else {
        return (
            midpoint(colliders, pair.collider1, pair.collider2),
            Vec3::ZERO,
            0.0,
        );
    };

    let point = colliders
        .get(pair.collider1)
        .map(|c| convert::from_point(&c.position().transform_point(&contact.local_p1)))
        .unwrap_or(Vec3::ZERO);
    let mut normal = convert::from_vector(&manifold.data.normal);
    if pair.collider1 != first {
        normal = -normal;
    }

    (point, normal, (-contact.dist).max(0.0))
}

/// Midpoint between two collider origins, used where no manifold exists
pub(crate) fn midpoint(
    colliders: &rapier::ColliderSet,
    h1: rapier::ColliderHandle,
    h2: rapier::ColliderHandle,
) -> Vec3 {
    match (colliders.get(h1), colliders.get(h2)) {
        (Some(c1), Some(c2)) => {
            let a = convert::from_vector(&c1.position().translation.vector);
            let b = convert::from_vector(&c2.position().translation.vector);
            (a + b) * 0.5
        }
        (Some(c), None) | (None, Some(c)) => {
            convert::from_vector(&c.position().translation.vector)
        }
        (None, None) => Vec3::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: CollisionEventKind, a: u32, b: u32) -> CollisionEvent {
        CollisionEvent {
            kind,
            body_a: BodyId::from_raw(a),
            body_b: BodyId::from_raw(b),
            owner_a: None,
            owner_b: None,
            point: Vec3::ZERO,
            normal: Vec3::Y,
            penetration_depth: 0.0,
            is_trigger: false,
        }
    }

    #[test]
    fn test_take_empties_buffers() {
        let pipeline = EventPipeline::default();
        pipeline.push(event(CollisionEventKind::Enter, 1, 2));
        pipeline.push(event(CollisionEventKind::Stay, 3, 4));
        pipeline.push(event(CollisionEventKind::Exit, 5, 6));

        let first = pipeline.take();
        assert_eq!(first.enter.len(), 1);
        assert_eq!(first.stay.len(), 1);
        assert_eq!(first.exit.len(), 1);
        assert_eq!(first.len(), 3);

        assert!(pipeline.take().is_empty());
    }

    #[test]
    fn test_clear_keeps_character_contacts() {
        let pipeline = EventPipeline::default();
        pipeline.push(event(CollisionEventKind::Enter, 1, 2));
        pipeline.push_character(CharacterCollision {
            character: CharacterId::from_raw(1),
            character_owner: None,
            body: BodyId::from_raw(2),
            other_owner: None,
            point: Vec3::ZERO,
            normal: Vec3::Y,
        });
        pipeline.clear_body_events();

        let events = pipeline.take();
        assert!(events.enter.is_empty());
        assert_eq!(events.character.len(), 1);
    }

    #[test]
    fn test_concurrent_pushes_all_arrive() {
        let pipeline = EventPipeline::default();
        std::thread::scope(|scope| {
            for t in 0..4u32 {
                let pipeline = &pipeline;
                scope.spawn(move || {
                    for i in 0..100u32 {
                        pipeline.push(event(CollisionEventKind::Enter, t * 1000 + i + 1, 0));
                    }
                });
            }
        });

        let events = pipeline.take();
        let unique: HashSet<_> = events.enter.iter().map(|e| e.body_a).collect();
        assert_eq!(events.enter.len(), 400);
        assert_eq!(unique.len(), 400);
    }

    #[test]
    fn test_pair_key_is_order_independent() {
        let a = event(CollisionEventKind::Enter, 9, 3);
        let b = event(CollisionEventKind::Enter, 3, 9);
        assert_eq!(a.pair_key(), b.pair_key());
        assert_eq!(a.other(BodyId::from_raw(9)), Some(BodyId::from_raw(3)));
        assert_eq!(a.other(BodyId::from_raw(1)), None);
    }
}
