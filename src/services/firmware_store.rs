use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::models::{FirmwareInfo, FirmwareStatus};

#[derive(Default)]
struct FirmwareState {
    version: Option<String>,
    status: FirmwareStatus,
    // In-flight install request, if any. Never persisted.
    progress_id: Option<u64>,
}

/// Singleton record of the installed firmware, persisted to its own store.
#[derive(Clone)]
pub struct FirmwareStore {
    inner: Arc<Mutex<FirmwareState>>,
    store_path: PathBuf,
}

impl FirmwareStore {
    pub fn new(store_path: PathBuf) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FirmwareState::default())),
            store_path,
        }
    }

    /// Reads the persisted record; a missing or unreadable store leaves the
    /// default `{version: None, status: None}` state. Never fatal.
    pub fn load(&self) {
        let raw = match std::fs::read(&self.store_path) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::debug!(
                    "firmware record {} not loaded: {}",
                    self.store_path.display(),
                    err
                );
                return;
            }
        };

        match serde_json::from_slice::<FirmwareInfo>(&raw) {
            Ok(info) => {
                let mut state = self.lock();
                state.version = info.version;
                state.status = info.status;
            }
            Err(err) => {
                tracing::warn!(
                    "firmware record {} is corrupt, keeping defaults: {}",
                    self.store_path.display(),
                    err
                );
            }
        }
    }

    fn save_locked(&self, state: &FirmwareState) {
        let info = FirmwareInfo {
            version: state.version.clone(),
            status: state.status,
        };
        let write = serde_json::to_vec(&info)
            .map_err(crate::errors::LauncherError::from)
            .and_then(|payload| std::fs::write(&self.store_path, payload).map_err(Into::into));
        if let Err(err) = write {
            tracing::error!(
                "failed to write firmware record {}: {}",
                self.store_path.display(),
                err
            );
        }
    }

    /// Sets version and status together and persists, under the store lock.
    pub fn update_status(&self, version: Option<String>, status: FirmwareStatus) {
        let mut state = self.lock();
        state.version = version;
        state.status = status;
        self.save_locked(&state);
    }

    /// Native callback once firmware files are unpacked.
    pub fn on_installed(&self, version: Option<String>) {
        self.update_status(version, FirmwareStatus::Installed);
    }

    /// Native callback once firmware modules are compiled.
    pub fn on_compiled(&self, version: Option<String>) {
        self.update_status(version, FirmwareStatus::Compiled);
    }

    pub fn version(&self) -> Option<String> {
        self.lock().version.clone()
    }

    pub fn status(&self) -> FirmwareStatus {
        self.lock().status
    }

    pub fn progress_id(&self) -> Option<u64> {
        self.lock().progress_id
    }

    pub fn set_progress_id(&self, progress_id: Option<u64>) {
        self.lock().progress_id = progress_id;
    }

    fn lock(&self) -> MutexGuard<'_, FirmwareState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
