//! Tessera - sparse-set entity component engine
//!
//! Command-line driver: loads a world config, builds a world and runs a
//! structural-churn workload followed by a data-parallel integration pass.
//!
//! Usage: `tessera [config.toml] [entities]`

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use rand::Rng;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use tessera_core::WorldConfig;
use tessera_ecs::{declare_component, FilterMask, World};

const DEFAULT_ENTITIES: usize = 10_000;
const CHURN_ROUNDS: usize = 20;
const STEPS: usize = 60;
const DT: f32 = 1.0 / 60.0;

#[derive(Debug, Default, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Default, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
struct Velocity {
    dx: f32,
    dy: f32,
}

/// Remaining rounds before the churn pass destroys the entity.
#[derive(Debug, Default, Clone)]
struct Lifetime(u32);

#[derive(Debug, Default, Clone)]
struct Fast;

declare_component!(pod Position);
declare_component!(pod Velocity);
declare_component!(Lifetime);
declare_component!(Fast);

fn load_config(path: Option<PathBuf>) -> Result<WorldConfig> {
    match path {
        Some(path) => WorldConfig::load(&path)
            .with_context(|| format!("Failed to load {}", path.display())),
        None => Ok(WorldConfig::load_or_default()),
    }
}

fn spawn(world: &mut World, rng: &mut impl Rng) -> Result<()> {
    let e = world.create_entity()?;
    world.add_component(
        e,
        Position {
            x: rng.gen_range(-100.0..100.0),
            y: rng.gen_range(-100.0..100.0),
        },
    )?;
    world.add_component(
        e,
        Velocity {
            dx: rng.gen_range(-10.0..10.0),
            dy: rng.gen_range(-10.0..10.0),
        },
    )?;
    world.add_component(e, Lifetime(rng.gen_range(1..CHURN_ROUNDS as u32)))?;
    Ok(())
}

/// Spawn, age and destroy entities, reading filters between rounds.
fn churn(world: &mut World, target: usize, rng: &mut impl Rng) -> Result<()> {
    let aging = world.filter(FilterMask::new().include::<Lifetime>());
    let started = Instant::now();
    let mut destroyed = 0usize;

    for _ in 0..CHURN_ROUNDS {
        while world.entity_count() < target {
            spawn(world, rng)?;
        }
        for e in world.filter_entities(aging)?.to_vec() {
            let lifetime = world.get_mut::<Lifetime>(e)?;
            lifetime.0 = lifetime.0.saturating_sub(1);
            if lifetime.0 == 0 {
                world.destroy_entity(e)?;
                destroyed += 1;
            }
        }
    }

    info!(
        "Churn: {} rounds, {} destroyed, {} alive in {:.2?}",
        CHURN_ROUNDS,
        destroyed,
        world.entity_count(),
        started.elapsed()
    );
    Ok(())
}

/// Integrate positions in parallel and tag fast movers through the deferred queue.
fn integrate(world: &mut World) -> Result<()> {
    let moving = world.filter(FilterMask::new().include::<Position>().include::<Velocity>());
    let fast = world.filter(FilterMask::new().include::<Fast>());
    let started = Instant::now();

    for _ in 0..STEPS {
        world.par_for_each::<Position, _>(moving, |ctx, e, position| {
            let Ok(v) = ctx.get::<Velocity>(e) else {
                return;
            };
            position.x += v.dx * DT;
            position.y += v.dy * DT;
            if v.dx.hypot(v.dy) > 12.0 && !ctx.has::<Fast>(e).unwrap_or(true) {
                ctx.add_component(e, Fast);
            }
        })?;
    }

    info!(
        "Integrated {} entities for {} steps in {:.2?}, {} fast",
        world.filter_count(moving)?,
        STEPS,
        started.elapsed(),
        world.filter_count(fast)?
    );
    Ok(())
}

fn main() -> Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")?;

    let mut args = std::env::args().skip(1);
    let config = load_config(args.next().map(PathBuf::from))?;
    let entities = match args.next() {
        Some(n) => n.parse().with_context(|| format!("Invalid entity count '{}'", n))?,
        None => DEFAULT_ENTITIES,
    };

    info!("Starting Tessera with {} entities ({:?} scan)", entities, config.scan_strategy);

    let mut world = World::with_config(config);
    let mut rng = rand::thread_rng();
    churn(&mut world, entities, &mut rng)?;
    integrate(&mut world)?;

    info!("Shutting down...");
    Ok(())
}
