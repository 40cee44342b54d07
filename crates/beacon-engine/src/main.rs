//! # Beacon
//!
//! Headless guidance run against a mock world: scan, select the nearest item,
//! guide to it, and report what happened.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use beacon_common::Vec3;
use beacon_engine::{BeaconConfig, Guide, GuideEvent, GuidanceMode, CONFIG_FILE};
use beacon_nav::{Announcement, Category, CycleDirection, MockWorld, RecordKind, WorldQuery};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Simulation step in seconds.
const TICK_DT: f32 = 1.0 / 60.0;

/// Walking speed of the demo observer in m/s.
const WALK_SPEED: f32 = 4.0;

#[derive(Debug)]
struct Args {
    ticks: u32,
    config: PathBuf,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        ticks: 3_600,
        config: PathBuf::from(CONFIG_FILE),
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--ticks" => {
                let value = iter.next().context("--ticks needs a value")?;
                args.ticks = value
                    .parse()
                    .with_context(|| format!("invalid tick count '{value}'"))?;
            },
            "--config" => {
                args.config = iter.next().context("--config needs a path")?.into();
            },
            other => bail!("unknown argument '{other}' (expected --ticks N or --config PATH)"),
        }
    }
    Ok(args)
}

fn demo_world() -> MockWorld {
    let mut world = MockWorld::new();
    world.spawn(RecordKind::Item, Vec3::new(4.0, 0.0, 22.0), "silver key");
    world.spawn(RecordKind::Item, Vec3::new(-18.0, 0.0, 30.0), "rope");
    world.spawn(RecordKind::Material, Vec3::new(10.0, 0.0, -6.0), "iron ore");
    world.spawn(RecordKind::Transition, Vec3::new(0.0, 0.0, 45.0), "north gate");
    world.spawn(RecordKind::Hostile, Vec3::new(-30.0, 0.0, -10.0), "wolf");
    world.add_blocker(Vec3::new(2.0, 0.0, 11.0), 3.0);
    world
}

fn main() -> Result<()> {
    let args = parse_args()?;
    let mut config = BeaconConfig::load_from(&args.config);
    if config.guidance_mode == GuidanceMode::AudioCue {
        config.guidance_mode = GuidanceMode::Both;
    }

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(config.log_filter.parse()?))
        .init();

    info!("Project Beacon {} starting", env!("CARGO_PKG_VERSION"));

    let mut world = demo_world();
    let mut guide = Guide::headless(&config);
    let mut spoken: Vec<Announcement> = Vec::new();
    let mut requested = false;
    let mut ticks_run = 0;
    let mut intents = 0;

    for _ in 0..args.ticks {
        ticks_run += 1;
        let tick = guide.tick(TICK_DT, &world, &world);
        spoken.extend(tick.announcements);
        world.walk(tick.intent, WALK_SPEED, TICK_DT);
        intents += guide
            .events()
            .drain()
            .iter()
            .filter(|e| matches!(e, GuideEvent::Intent { .. }))
            .count();

        if !requested && !guide.scanner().lists().get(Category::Item).is_empty() {
            requested = true;
            while guide.cursor().category() != Some(Category::Item) {
                spoken.push(guide.cycle_category(CycleDirection::Forward));
            }
            spoken.extend(guide.start_guidance(&world, &world));
        } else if requested && !guide.is_guiding() {
            break;
        }
    }

    println!("Ran {ticks_run} ticks ({:.1} s)", ticks_run as f32 * TICK_DT);
    println!("Observer ended at {}", world.observer().position);
    println!("{intents} intent changes published");
    for announcement in &spoken {
        println!("  \"{announcement}\"");
    }

    info!("Project Beacon shutdown complete");
    Ok(())
}
