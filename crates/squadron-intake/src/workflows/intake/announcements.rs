use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use rand::seq::IndexedRandom;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum AnnouncementError {
    #[error("unable to read announcement bodies {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("announcement bodies are not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("announcement body pool is empty")]
    Empty,
}

/// Flavour lines appended to public welcome announcements.
#[derive(Debug, Clone)]
pub struct AnnouncementPool {
    bodies: Vec<String>,
}

impl AnnouncementPool {
    pub fn new(bodies: Vec<String>) -> Result<Self, AnnouncementError> {
        if bodies.is_empty() {
            return Err(AnnouncementError::Empty);
        }
        Ok(Self { bodies })
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, AnnouncementError> {
        #[derive(Deserialize)]
        struct RawPool {
            announcements: Vec<String>,
        }

        let raw: RawPool = serde_json::from_reader(reader)?;
        Self::new(raw.announcements)
    }

    pub fn load(path: &Path) -> Result<Self, AnnouncementError> {
        let file = File::open(path).map_err(|source| AnnouncementError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn bodies(&self) -> &[String] {
        &self.bodies
    }

    /// Picks one body uniformly at random.
    pub fn choose(&self) -> &str {
        self.bodies
            .choose(&mut rand::rng())
            .map(String::as_str)
            .unwrap_or_default()
    }
}
