use crate::mission::mission::Mission;
use crate::mission::registry::MissionRegistry;
use crate::utils::error::Result;
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[derive(Serialize, Deserialize)]
struct PersistentState {
    saved_at: DateTime<Utc>,
    missions: Vec<Mission>,
}

/// JSON snapshots of every mission in a registry. Step hooks are not saved.
pub struct Persistence {
    file_path: PathBuf,
}

impl Persistence {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Persistence {
            file_path: file_path.into(),
        }
    }

    pub async fn save_state(&self, registry: &MissionRegistry) -> Result<()> {
        let state = PersistentState {
            saved_at: Utc::now(),
            missions: registry.get_missions().await,
        };
        let serialized = serde_json::to_string_pretty(&state)?;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.file_path)
            .await?;

        file.write_all(serialized.as_bytes()).await?;
        file.flush().await?;

        info!(
            "Saved {} mission(s) to {}",
            state.missions.len(),
            self.file_path.display()
        );
        Ok(())
    }

    /// Loads saved missions. A missing file is an empty snapshot.
    pub async fn load_state(&self) -> Result<Vec<Mission>> {
        if !self.file_path.exists() {
            return Ok(Vec::new());
        }

        let mut file = File::open(&self.file_path).await?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).await?;

        let state: PersistentState = serde_json::from_str(&contents)?;
        Ok(state.missions)
    }

    pub async fn restore_into(&self, registry: &MissionRegistry) -> Result<usize> {
        let missions = self.load_state().await?;
        let count = missions.len();
        registry.restore(missions).await;
        Ok(count)
    }
}
