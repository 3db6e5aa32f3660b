//! Component destroy hooks
//!
//! Hooks are registered once per component type when a scene is built and
//! run while the component is still stored, so whatever it references (a
//! body id, say) is still readable. The context `C` is the system the hook
//! cleans up in; components never point back at it.

use hecs::Entity;
use std::any::{type_name, TypeId};

type HookFn<C> = Box<dyn FnMut(&mut C, &hecs::World, Entity) + Send + Sync>;

struct Hook<C> {
    component: TypeId,
    name: &'static str,
    run: HookFn<C>,
}

/// Registry of destroy hooks keyed by component type
pub struct DestroyHooks<C> {
    hooks: Vec<Hook<C>>,
}

impl<C> Default for DestroyHooks<C> {
    fn default() -> Self {
        Self { hooks: Vec::new() }
    }
}

impl<C> DestroyHooks<C> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `hook` whenever a `T` is about to be destroyed
    pub fn on_destroy<T, F>(&mut self, mut hook: F)
    where
        C: 'static,
        T: hecs::Component,
        F: FnMut(&mut C, Entity, &T) + Send + Sync + 'static,
    {
        self.hooks.push(Hook {
            component: TypeId::of::<T>(),
            name: type_name::<T>(),
            run: Box::new(move |ctx: &mut C, world: &hecs::World, entity: Entity| {
                if let Ok(component) = world.get::<&T>(entity) {
                    hook(ctx, entity, &*component);
                }
            }),
        });
    }

    /// Run every hook whose component the entity carries. Call before
    /// despawning it.
    pub fn run_for_entity(&mut self, ctx: &mut C, world: &hecs::World, entity: Entity) {
        for hook in &mut self.hooks {
            log::trace!("Destroy hook {} on {:?}", hook.name, entity);
            (hook.run)(ctx, world, entity);
        }
    }

    /// Run the hooks of a single component type. Call before removing it.
    pub fn run_for_component<T: hecs::Component>(
        &mut self,
        ctx: &mut C,
        world: &hecs::World,
        entity: Entity,
    ) {
        let component = TypeId::of::<T>();
        for hook in self.hooks.iter_mut().filter(|h| h.component == component) {
            (hook.run)(ctx, world, entity);
        }
    }

    /// Number of registered hooks
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether no hook is registered
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tracked(u32);
    struct Other;

    #[test]
    fn test_hook_sees_component_before_removal() {
        let mut world = hecs::World::new();
        let entity = world.spawn((Tracked(7), Other));

        let mut hooks = DestroyHooks::<Vec<u32>>::new();
        hooks.on_destroy::<Tracked, _>(|log, _, tracked| log.push(tracked.0));

        let mut destroyed = Vec::new();
        hooks.run_for_entity(&mut destroyed, &world, entity);
        world.despawn(entity).unwrap();

        assert_eq!(destroyed, vec![7]);
    }

    #[test]
    fn test_component_hooks_are_selective() {
        let mut world = hecs::World::new();
        let entity = world.spawn((Tracked(1), Other));

        let mut hooks = DestroyHooks::<Vec<&'static str>>::new();
        hooks.on_destroy::<Tracked, _>(|log, _, _| log.push("tracked"));
        hooks.on_destroy::<Other, _>(|log, _, _| log.push("other"));

        let mut log = Vec::new();
        hooks.run_for_component::<Other>(&mut log, &world, entity);
        assert_eq!(log, vec!["other"]);

        log.clear();
        hooks.run_for_entity(&mut log, &world, entity);
        assert_eq!(log, vec!["tracked", "other"]);
    }

    #[test]
    fn test_hook_skips_entities_without_component() {
        let mut world = hecs::World::new();
        let entity = world.spawn((Other,));

        let mut hooks = DestroyHooks::<u32>::new();
        hooks.on_destroy::<Tracked, _>(|count, _, _| *count += 1);

        let mut count = 0;
        hooks.run_for_entity(&mut count, &world, entity);
        assert_eq!(count, 0);
        assert_eq!(hooks.len(), 1);
    }
}
