//! Simulation settings read from `DUNGEON_*` environment variables

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}")]
    Invalid { key: &'static str, value: String },
    #[error("{0} is required when DUNGEON_POLICY=model")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    /// Uniform over all actions, ignoring the mask
    Random,
    /// Uniform over legal actions
    RandomMasked,
    /// Trained model loaded from `DUNGEON_MODEL_PATH`
    Model,
}

impl FromStr for PolicyKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(PolicyKind::Random),
            "random-masked" => Ok(PolicyKind::RandomMasked),
            "model" => Ok(PolicyKind::Model),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub policy: PolicyKind,
    pub model_path: Option<String>,
    /// ASCII level file; the built-in level is used when unset
    pub level_path: Option<String>,
    pub num_actors: usize,
    pub seed: Option<u64>,
    pub max_steps: usize,
    pub episodes: usize,
    /// Frame interval in milliseconds, 0 runs unpaced
    pub tick_ms: u64,
    pub replays_folder: Option<String>,
    pub show_policy_map: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::Random,
            model_path: None,
            level_path: None,
            num_actors: 1,
            seed: None,
            max_steps: 100,
            episodes: 10,
            tick_ms: 0,
            replays_folder: None,
            show_policy_map: false,
        }
    }
}

impl SimConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = SimConfig::default();

        let config = SimConfig {
            policy: parse(&lookup, "DUNGEON_POLICY")?.unwrap_or(defaults.policy),
            model_path: lookup("DUNGEON_MODEL_PATH"),
            level_path: lookup("DUNGEON_LEVEL"),
            num_actors: parse(&lookup, "DUNGEON_ACTORS")?.unwrap_or(defaults.num_actors),
            seed: parse(&lookup, "DUNGEON_SEED")?,
            max_steps: parse(&lookup, "DUNGEON_MAX_STEPS")?.unwrap_or(defaults.max_steps),
            episodes: parse(&lookup, "DUNGEON_EPISODES")?.unwrap_or(defaults.episodes),
            tick_ms: parse(&lookup, "DUNGEON_TICK_MS")?.unwrap_or(defaults.tick_ms),
            replays_folder: lookup("DUNGEON_REPLAYS_FOLDER"),
            show_policy_map: parse(&lookup, "DUNGEON_POLICY_MAP")?
                .unwrap_or(defaults.show_policy_map),
        };

        if config.policy == PolicyKind::Model && config.model_path.is_none() {
            return Err(ConfigError::Missing("DUNGEON_MODEL_PATH"));
        }
        for (key, value) in [
            ("DUNGEON_ACTORS", config.num_actors),
            ("DUNGEON_MAX_STEPS", config.max_steps),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    value: "0".to_string(),
                });
            }
        }

        Ok(config)
    }

    pub fn tick_interval(&self) -> Option<Duration> {
        (self.tick_ms > 0).then(|| Duration::from_millis(self.tick_ms))
    }
}

fn parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}
