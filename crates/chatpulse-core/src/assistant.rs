//! Assistant instructions, kept in a single JSON file read and written wholesale.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// Persisted assistant personality / instructions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantInstructions {
    pub instructions: String,
}

/// File-backed store for [`AssistantInstructions`].
#[derive(Debug, Clone)]
pub struct AssistantStore {
    path: PathBuf,
}

impl AssistantStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the instructions file. Returns `None` when it does not exist yet.
    pub async fn load(&self) -> Result<Option<AssistantInstructions>> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(&self.path).await?;
        Ok(Some(serde_json::from_str(&data)?))
    }

    /// Replace the instructions file with `instructions`.
    pub async fn save(&self, instructions: &AssistantInstructions) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(instructions)?;
        tokio::fs::write(&self.path, json).await?;
        debug!(path = %self.path.display(), "Assistant instructions saved");
        Ok(())
    }
}
