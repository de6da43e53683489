use std::sync::Arc;
use std::thread;

use tessera_ecs::{ConcurrentWorld, EcsError, Entity, FilterMask, World};

#[derive(Debug, Default, Clone, PartialEq)]
struct Counter(u64);

#[derive(Debug, Default, Clone, PartialEq)]
struct Frozen;

#[derive(Debug, Default, Clone, PartialEq)]
struct Spawned(u64);

tessera_ecs::declare_component!(Counter);
tessera_ecs::declare_component!(Frozen);
tessera_ecs::declare_component!(Spawned);

#[test]
fn thousand_entities_each_incremented_once() {
    let mut world = World::new();
    let counters = world.filter(FilterMask::new().include::<Counter>());
    let entities: Vec<Entity> = (0..1_000)
        .map(|_| {
            let e = world.create_entity().unwrap();
            world.add_component(e, Counter(0)).unwrap();
            e
        })
        .collect();

    world
        .par_for_each::<Counter, _>(counters, |_, _, counter| counter.0 += 1)
        .unwrap();

    for e in &entities {
        assert_eq!(world.get::<Counter>(*e), Ok(&Counter(1)));
    }
    assert_eq!(world.lock_depth(), 0);
}

#[test]
fn deferred_work_applies_once_and_in_order() {
    let mut world = World::new();
    let active = world.filter(FilterMask::new().include::<Counter>().exclude::<Frozen>());
    let spawned = world.filter(FilterMask::new().include::<Spawned>());
    for i in 0..200 {
        let e = world.create_entity().unwrap();
        world.add_component(e, Counter(i)).unwrap();
    }

    world
        .par_for_each::<Counter, _>(active, |ctx, e, counter| {
            counter.0 += 1;
            ctx.add_component(e, Spawned(counter.0));
            if counter.0 % 4 == 0 {
                ctx.add_component(e, Frozen);
                ctx.remove_component::<Spawned>(e);
            }
        })
        .unwrap();

    assert_eq!(world.filter_count(active), Ok(150));
    assert_eq!(world.filter_count(spawned), Ok(150));
    for e in world.filter_entities(spawned).unwrap().to_vec() {
        let counter = world.get::<Counter>(e).unwrap().0;
        assert_eq!(world.get::<Spawned>(e), Ok(&Spawned(counter)));
    }
}

#[test]
fn par_for_each_rejects_disposed_filter() {
    let mut world = World::new();
    let f = world.filter(FilterMask::new().include::<Counter>());
    world.clear().unwrap();
    let err = world
        .par_for_each::<Counter, _>(f, |_, _, counter| counter.0 += 1)
        .unwrap_err();
    assert_eq!(err, EcsError::DisposedFilter(f.index()));
    assert!(!world.is_locked());
}

#[test]
fn concurrent_readers_and_writers() {
    let world = Arc::new(ConcurrentWorld::default());
    let seeded: Vec<Entity> = (0..64)
        .map(|i| {
            let e = world.create_entity().unwrap();
            world.add_component(e, Counter(i)).unwrap();
            e
        })
        .collect();
    let seeded = Arc::new(seeded);

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let world = Arc::clone(&world);
            let seeded = Arc::clone(&seeded);
            thread::spawn(move || {
                for e in seeded.iter().skip(t).step_by(4) {
                    world
                        .with_component_mut::<Counter, _>(*e, |c| c.0 += 1000)
                        .unwrap();
                }
            })
        })
        .collect();
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let world = Arc::clone(&world);
            let seeded = Arc::clone(&seeded);
            thread::spawn(move || {
                for e in seeded.iter() {
                    assert!(world.is_alive(*e));
                    let value = world.with_component::<Counter, _>(*e, |c| c.0).unwrap();
                    assert!(value < 64 || (1000..1064).contains(&value));
                }
            })
        })
        .collect();
    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }

    for (i, e) in seeded.iter().enumerate() {
        assert_eq!(world.get_cloned::<Counter>(*e), Ok(Counter(i as u64 + 1000)));
    }
    let all = world.filter(FilterMask::new().include::<Counter>());
    assert_eq!(world.filter_count(all), Ok(64));
}
