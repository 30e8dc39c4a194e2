use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use time::{OffsetDateTime, format_description};
use tracing::warn;

use crate::infra::{Position, SimulationObserver};
use crate::rl::{Action, TickOutcome};
use crate::state::Actor;

/// One line of a replay file
#[derive(Debug, Clone, Serialize)]
pub struct ReplayRecord {
    pub episode: usize,
    pub tick: usize,
    pub actor: usize,
    pub action: Option<Action>,
    pub outcome: &'static str,
    pub position: Position,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// JSON-lines replay of every resolved tick
pub struct ReplayFile {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl ReplayFile {
    pub fn new(replays_folder: &str, policy_name: &str) -> Result<Self, io::Error> {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let format = format_description::parse("[year][month][day]-[hour][minute][second]")
            .map_err(io::Error::other)?;
        let date_time_str = now.format(&format).map_err(io::Error::other)?;

        let path = Path::new(replays_folder).join(format!("{} - {}.jsonl", policy_name, date_time_str));
        Self::create(path)
    }

    pub fn create(path: PathBuf) -> Result<Self, io::Error> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        let file = File::create(&path)?;
        Ok(ReplayFile {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, record: &ReplayRecord) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Observer that records every tick into a [`ReplayFile`]
pub struct ReplayObserver {
    file: ReplayFile,
}

impl ReplayObserver {
    pub fn new(file: ReplayFile) -> Self {
        Self { file }
    }

    fn write(&mut self, record: &ReplayRecord) {
        if let Err(e) = self.file.append(record) {
            warn!("failed to write replay {}: {}", self.file.path().display(), e);
        }
    }
}

impl SimulationObserver for ReplayObserver {
    fn on_episode_start(&mut self, _episode: usize, _actors: &[Actor]) {}

    fn on_tick(&mut self, episode: usize, tick: usize, actor: &Actor, outcome: &TickOutcome) {
        let error = match outcome {
            TickOutcome::Failed(err) => Some(err.to_string()),
            _ => None,
        };
        self.write(&ReplayRecord {
            episode,
            tick,
            actor: actor.id,
            action: outcome.action(),
            outcome: outcome.kind(),
            position: actor.position(),
            error,
        });
    }

    fn on_episode_finished(&mut self, _episode: usize, _steps: usize, _reached_goal: bool) {
        if let Err(e) = self.file.flush() {
            warn!("failed to flush replay {}: {}", self.file.path().display(), e);
        }
    }
}
