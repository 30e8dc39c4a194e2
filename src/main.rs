use std::sync::Arc;

use dotenv::dotenv;
use dungeon_rl::config::{ConfigError, PolicyKind, SimConfig};
use dungeon_rl::infra::{
    CompositeObserver, DefaultObserver, ReplayFile, ReplayObserver, SimulationObserver,
};
use dungeon_rl::rl::{Policy, PolicyMap, RandomPolicy};
use dungeon_rl::simulation::Simulation;
use dungeon_rl::state::GridMap;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEMO_LEVEL: &str = "\
##########
#S.......#
#.####.#.#
#.#..#.#.#
#.#.##.#.#
#...#..#G#
##########
";

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("dungeon_rl=debug,info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("tracing subscriber already set");
    }
}

fn load_level(config: &SimConfig) -> Result<GridMap, Box<dyn std::error::Error>> {
    let text = match &config.level_path {
        Some(path) => std::fs::read_to_string(path)?,
        None => DEMO_LEVEL.to_string(),
    };
    Ok(GridMap::from_ascii(&text)?)
}

fn build_policy(config: &SimConfig) -> Result<Arc<dyn Policy>, Box<dyn std::error::Error>> {
    let random = || match config.seed {
        Some(seed) => RandomPolicy::seeded(seed),
        None => RandomPolicy::new(),
    };

    match config.policy {
        PolicyKind::Random => Ok(Arc::new(random())),
        PolicyKind::RandomMasked => Ok(Arc::new(random().mask_aware())),
        PolicyKind::Model => {
            let location = config
                .model_path
                .as_deref()
                .ok_or(ConfigError::Missing("DUNGEON_MODEL_PATH"))?;
            load_model(location)
        }
    }
}

#[cfg(feature = "rl")]
fn load_model(location: &str) -> Result<Arc<dyn Policy>, Box<dyn std::error::Error>> {
    use burn::backend::NdArray;
    use dungeon_rl::rl::{BurnModelStore, InferencePolicy};

    let store = BurnModelStore::<NdArray>::new(Default::default());
    Ok(Arc::new(InferencePolicy::open(&store, location)?))
}

#[cfg(not(feature = "rl"))]
fn load_model(location: &str) -> Result<Arc<dyn Policy>, Box<dyn std::error::Error>> {
    Err(format!(
        "cannot load model '{}': built without the `rl` feature (cargo run --features rl)",
        location
    )
    .into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_logging();

    let config = SimConfig::from_env()?;
    let level = load_level(&config)?;
    let policy = build_policy(&config)?;

    info!(
        "Policy: {}, actors: {}, episodes: {}",
        policy.name(),
        config.num_actors,
        config.episodes
    );
    println!("{}", level.draw_ascii_map(level.start_tiles()));

    if config.show_policy_map {
        let map = PolicyMap::evaluate(&level, policy.as_ref());
        println!("Policy map ({} tiles):\n{}", map.len(), map.render(&level));
    }

    let mut observers: Vec<Box<dyn SimulationObserver>> = vec![Box::new(DefaultObserver)];
    if let Some(folder) = &config.replays_folder {
        let file = ReplayFile::new(folder, policy.name())?;
        info!("Writing replay to {}", file.path().display());
        observers.push(Box::new(ReplayObserver::new(file)));
    }

    let starts = level.start_tiles().to_vec();
    let mut sim = Simulation::new(
        level,
        policy.clone(),
        config.num_actors,
        CompositeObserver::new(observers),
    )
    .with_start_tiles(starts)
    .with_max_steps(config.max_steps);
    if let Some(seed) = config.seed {
        sim = sim.with_seed(seed);
    }

    let mut interval = config.tick_interval().map(tokio::time::interval);
    for _ in 0..config.episodes {
        sim.begin_episode()?;
        loop {
            if let Some(interval) = interval.as_mut() {
                interval.tick().await;
            }
            if sim.step()?.is_done() {
                break;
            }
        }
    }

    sim.metrics().print_summary();
    policy.close()?;

    Ok(())
}
