use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::errors::{LauncherError, Result};
use crate::models::{GameInfo, GameUpdate, OperationKind, ProgressTag};
use crate::services::progress_service::ProgressCleanup;

/// Path value of a catalog row created for an install whose real identity is
/// not known yet. Pending rows live only while tagged with an in-flight
/// operation and are never persisted.
pub const PENDING_ENTRY_KEY: &str = "$";

/// One catalog row: the persisted fields plus the in-flight operation tags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameEntry {
    pub path: String,
    pub name: Option<String>,
    pub icon_path: Option<String>,
    progress: Vec<ProgressTag>,
}

impl GameEntry {
    fn from_info(info: GameInfo) -> Self {
        Self {
            path: info.path,
            name: info.name,
            icon_path: info.icon_path,
            progress: Vec::new(),
        }
    }

    fn to_info(&self) -> GameInfo {
        GameInfo {
            path: self.path.clone(),
            name: self.name.clone(),
            icon_path: self.icon_path.clone(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.path == PENDING_ENTRY_KEY
    }

    pub fn progress(&self) -> &[ProgressTag] {
        &self.progress
    }

    pub fn find_progress(&self, kind: OperationKind) -> Option<ProgressTag> {
        self.progress.iter().copied().find(|tag| tag.kind == kind)
    }

    /// Attaches an operation tag. At most one tag per kind may exist:
    /// re-adding the identical tag is a no-op, while a second tag of the same
    /// kind under a different id is a caller error.
    fn add_progress(&mut self, tag: ProgressTag) -> Result<()> {
        match self.find_progress(tag.kind) {
            Some(existing) if existing.id == tag.id => Ok(()),
            Some(existing) => Err(LauncherError::DuplicateProgress(format!(
                "entry {} already tracks {:?} under progress {}",
                self.path, tag.kind, existing.id
            ))),
            None => {
                self.progress.push(tag);
                Ok(())
            }
        }
    }
}

/// Ordered, persisted catalog of installable games.
///
/// Every committed mutation rewrites the backing store wholesale; pending
/// rows are filtered out of the written list. The single interior lock spans
/// each mutation including its synchronous write, keeping list order and
/// on-disk state atomic relative to each other.
#[derive(Clone)]
pub struct GameLibrary {
    games: Arc<Mutex<Vec<GameEntry>>>,
    store_path: PathBuf,
}

impl GameLibrary {
    pub fn new(store_path: PathBuf) -> Self {
        Self {
            games: Arc::new(Mutex::new(Vec::new())),
            store_path,
        }
    }

    /// Replaces the in-memory list with the persisted one. A missing file or
    /// unreadable content resets to an empty catalog; never fatal. Runs at
    /// startup before any concurrent access.
    pub fn load(&self) {
        let mut games = self.lock();
        games.clear();

        let raw = match std::fs::read(&self.store_path) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::debug!(
                    "game catalog {} not loaded: {}",
                    self.store_path.display(),
                    err
                );
                return;
            }
        };

        match serde_json::from_slice::<Vec<GameInfo>>(&raw) {
            Ok(infos) => games.extend(infos.into_iter().map(GameEntry::from_info)),
            Err(err) => {
                tracing::warn!(
                    "game catalog {} is corrupt, starting empty: {}",
                    self.store_path.display(),
                    err
                );
            }
        }
    }

    pub fn save(&self) {
        let games = self.lock();
        self.save_locked(&games);
    }

    fn save_locked(&self, games: &[GameEntry]) {
        let infos: Vec<GameInfo> = games
            .iter()
            .filter(|entry| !entry.is_pending())
            .map(GameEntry::to_info)
            .collect();

        let write = serde_json::to_vec(&infos)
            .map_err(LauncherError::from)
            .and_then(|payload| std::fs::write(&self.store_path, payload).map_err(Into::into));
        if let Err(err) = write {
            // In-memory state stays authoritative; the next successful save
            // reconciles the file.
            tracing::error!(
                "failed to write game catalog {}: {}",
                self.store_path.display(),
                err
            );
        }
    }

    /// Inserts a pending row at the front, tagged with the install request.
    /// The row is not persisted until it gains a real identity.
    pub fn create_install_placeholder(&self, progress_id: u64) {
        let mut games = self.lock();
        games.insert(
            0,
            GameEntry {
                path: PENDING_ENTRY_KEY.to_string(),
                name: None,
                icon_path: None,
                progress: vec![ProgressTag {
                    id: progress_id,
                    kind: OperationKind::Install,
                }],
            },
        );
    }

    /// Merges install results into the catalog and persists once.
    ///
    /// The pending row carrying `progress_id` is superseded and removed.
    /// Updates apply in input order: an existing path is merged in place
    /// (last applied wins per field), a new path is inserted at the front;
    /// either way the entry gains the `(progress_id, Install)` tag. A
    /// rejected tag aborts the batch before the write.
    pub fn add_or_update(&self, updates: Vec<GameUpdate>, progress_id: u64) -> Result<()> {
        let mut games = self.lock();

        if let Some(index) = games.iter().position(|entry| {
            entry.is_pending()
                && entry
                    .find_progress(OperationKind::Install)
                    .is_some_and(|tag| tag.id == progress_id)
        }) {
            games.remove(index);
        }

        let tag = ProgressTag {
            id: progress_id,
            kind: OperationKind::Install,
        };
        for update in updates {
            match games.iter_mut().find(|entry| entry.path == update.path) {
                Some(existing) => {
                    existing.name = update.name.resolve(existing.name.take());
                    existing.icon_path = update.icon_path.resolve(existing.icon_path.take());
                    existing.add_progress(tag)?;
                }
                None => {
                    let mut entry = GameEntry {
                        path: update.path,
                        name: update.name.resolve(None),
                        icon_path: update.icon_path.resolve(None),
                        progress: Vec::new(),
                    };
                    entry.add_progress(tag)?;
                    games.insert(0, entry);
                }
            }
        }

        self.save_locked(&games);
        Ok(())
    }

    /// Drops `progress_id` from every entry's tags and removes pending rows
    /// left without tags. Persists only when a real entry changed.
    pub fn clear_progress(&self, progress_id: u64) {
        let mut games = self.lock();

        let mut real_entry_changed = false;
        for entry in games.iter_mut() {
            let before = entry.progress.len();
            entry.progress.retain(|tag| tag.id != progress_id);
            if entry.progress.len() != before && !entry.is_pending() {
                real_entry_changed = true;
            }
        }
        games.retain(|entry| !(entry.is_pending() && entry.progress.is_empty()));

        if real_entry_changed {
            self.save_locked(&games);
        }
    }

    /// Moves the entry to the front of the list, persisting only on an
    /// actual move.
    pub fn promote(&self, path: &str) {
        let mut games = self.lock();
        match games.iter().position(|entry| entry.path == path) {
            Some(0) | None => {}
            Some(index) => {
                let entry = games.remove(index);
                games.insert(0, entry);
                self.save_locked(&games);
            }
        }
    }

    pub fn remove(&self, path: &str) {
        let mut games = self.lock();
        let before = games.len();
        games.retain(|entry| entry.path != path);
        if games.len() != before {
            self.save_locked(&games);
        }
    }

    pub fn find(&self, path: &str) -> Option<GameEntry> {
        let games = self.lock();
        games.iter().find(|entry| entry.path == path).cloned()
    }

    pub fn list(&self) -> Vec<GameEntry> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<GameEntry>> {
        match self.games.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl ProgressCleanup for GameLibrary {
    fn clear_progress(&self, progress_id: u64) {
        GameLibrary::clear_progress(self, progress_id);
    }
}
