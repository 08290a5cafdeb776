// # File State Store
//
// File-based implementation of StateStore with crash recovery.
//
// Persists health state and zone snapshots so a restarted daemon keeps its
// confirmed up/down view instead of tearing every record down while servers
// re-confirm from scratch.
//
// ## Crash Recovery
//
// - Atomic writes: new state written to a temp file, then renamed
// - Corruption detection: JSON is validated on load
// - Automatic backup: keeps a .backup of the last known good state
// - Recovery: falls back to the backup if corruption is detected

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

use crate::Error;
use crate::health::HealthState;
use crate::traits::state_store::{StateStore, ZoneSnapshot};

/// State file format version, for future migration if the format changes
const STATE_FILE_VERSION: &str = "1.0";

/// File-based state store with crash recovery
///
/// All mutations are written through to disk immediately; `flush` only has
/// work to do after a write failure left the in-memory view dirty.
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    state: Arc<RwLock<FileState>>,
    write_lock: Mutex<()>,
}

#[derive(Debug)]
struct FileState {
    health: HashMap<String, HealthState>,
    zones: HashMap<String, ZoneSnapshot>,
    dirty: bool,
}

/// Serializable state file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StateFileFormat {
    version: String,
    health: HashMap<String, HealthState>,
    #[serde(default)]
    zones: HashMap<String, ZoneSnapshot>,
}

impl FileStateStore {
    /// Create or load a file state store
    ///
    /// Loads the existing state file if present, recovering from the
    /// backup on corruption, and creates parent directories as needed.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create state directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let (health, zones) = Self::load_state_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(FileState {
                health,
                zones,
                dirty: false,
            })),
            write_lock: Mutex::new(()),
        })
    }

    /// Load state from file with automatic recovery
    ///
    /// Tries the main file first; on a parse error, tries the backup; if
    /// both fail, starts with empty state rather than refusing to run.
    async fn load_state_with_recovery(
        path: &Path,
    ) -> Result<(HashMap<String, HealthState>, HashMap<String, ZoneSnapshot>), Error> {
        match Self::load_state(path).await {
            Ok(state) => {
                tracing::debug!("Loaded state from file: {} health entries", state.0.len());
                Ok(state)
            }
            Err(e) if Self::looks_like_corruption(&e) => {
                tracing::warn!(
                    "State file appears corrupted: {}. Attempting recovery from backup.",
                    e
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with empty state.");
                    return Ok((HashMap::new(), HashMap::new()));
                }

                match Self::load_state(&backup_path).await {
                    Ok(state) => {
                        tracing::info!(
                            "Recovered state from backup: {} health entries",
                            state.0.len()
                        );
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!(
                                "Failed to restore state file from backup: {}",
                                restore_err
                            );
                        }
                        Ok(state)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also corrupted: {}. Starting with empty state.",
                            backup_err
                        );
                        Ok((HashMap::new(), HashMap::new()))
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    fn looks_like_corruption(e: &Error) -> bool {
        let error_str = e.to_string().to_lowercase();
        error_str.contains("json")
            || error_str.contains("parse")
            || error_str.contains("expected value")
    }

    async fn load_state(
        path: &Path,
    ) -> Result<(HashMap<String, HealthState>, HashMap<String, ZoneSnapshot>), Error> {
        if !path.exists() {
            tracing::debug!("State file does not exist: {}", path.display());
            return Ok((HashMap::new(), HashMap::new()));
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to read state file {}: {}",
                path.display(),
                e
            ))
        })?;

        let state_file: StateFileFormat = serde_json::from_str(&content).map_err(|e| {
            Error::state_store(format!(
                "Failed to parse state file {}: {}. \
                File may be corrupted. Try restoring from backup.",
                path.display(),
                e
            ))
        })?;

        if state_file.version != STATE_FILE_VERSION {
            tracing::warn!(
                "State file version mismatch: expected {}, got {}. \
                Attempting to load anyway.",
                STATE_FILE_VERSION,
                state_file.version
            );
        }

        Ok((state_file.health, state_file.zones))
    }

    /// Write state to file atomically
    async fn write_state(&self) -> Result<(), Error> {
        // The probe and sync loops both write through here and share one
        // temp path; interleaved writers would truncate each other's temp
        // file mid-write and could rename a half-written state file into
        // place.
        let _write_guard = self.write_lock.lock().await;

        let state_guard = self.state.read().await;
        let state_file = StateFileFormat {
            version: STATE_FILE_VERSION.to_string(),
            health: state_guard.health.clone(),
            zones: state_guard.zones.clone(),
        };
        drop(state_guard);

        let json = serde_json::to_string_pretty(&state_file)
            .map_err(|e| Error::state_store(format!("Failed to serialize state: {}", e)))?;

        // Write to temporary file first
        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.flush().await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        // Keep a backup of the current file before replacing it
        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        // Atomic rename (temp -> actual)
        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        let mut state_guard = self.state.write().await;
        state_guard.dirty = false;

        tracing::trace!("State written to file: {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load_health(&self) -> Result<HashMap<String, HealthState>, Error> {
        let state_guard = self.state.read().await;
        Ok(state_guard.health.clone())
    }

    async fn save_health(&self, states: &HashMap<String, HealthState>) -> Result<(), Error> {
        {
            let mut state_guard = self.state.write().await;
            state_guard.health = states.clone();
            state_guard.dirty = true;
        }
        self.write_state().await
    }

    async fn load_zone_snapshot(&self, zone_id: &str) -> Result<Option<ZoneSnapshot>, Error> {
        let state_guard = self.state.read().await;
        Ok(state_guard.zones.get(zone_id).cloned())
    }

    async fn save_zone_snapshot(&self, snapshot: &ZoneSnapshot) -> Result<(), Error> {
        {
            let mut state_guard = self.state.write().await;
            state_guard
                .zones
                .insert(snapshot.zone_id.clone(), snapshot.clone());
            state_guard.dirty = true;
        }
        self.write_state().await
    }

    async fn flush(&self) -> Result<(), Error> {
        let state_guard = self.state.read().await;
        if state_guard.dirty {
            drop(state_guard);
            self.write_state().await
        } else {
            Ok(())
        }
    }
}
