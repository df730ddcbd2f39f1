use std::sync::Arc;
use std::thread;

use crate::errors::{LauncherError, Result};
use crate::native::NativeRuntime;
use crate::services::firmware_store::FirmwareStore;
use crate::services::game_library::GameLibrary;
use crate::services::progress_service::ProgressService;

/// Launch glue for native install operations.
///
/// Each launch allocates a progress request, prepares the catalog, and hands
/// the request id to the native runtime on a fire-and-forget worker thread.
/// The worker is never joined; a rejected start is converted into a synthetic
/// failed report so cleanup always follows the normal terminal path.
#[derive(Clone)]
pub struct InstallService {
    progress: ProgressService,
    library: GameLibrary,
    firmware: FirmwareStore,
    native: Arc<dyn NativeRuntime>,
}

impl InstallService {
    pub fn new(
        progress: ProgressService,
        library: GameLibrary,
        firmware: FirmwareStore,
        native: Arc<dyn NativeRuntime>,
    ) -> Self {
        Self {
            progress,
            library,
            firmware,
            native,
        }
    }

    /// Starts a package install from an already-open descriptor and returns
    /// the progress id. A pending catalog row tagged with the id appears
    /// immediately and is reconciled once the native side resolves the real
    /// identity.
    pub fn install_package(&self, fd: i32) -> u64 {
        let progress_id = self.progress.create("Package Installation", false);
        self.library.create_install_placeholder(progress_id);

        let native = self.native.clone();
        let progress = self.progress.clone();
        thread::spawn(move || {
            if !native.install_package(fd, progress_id) {
                tracing::warn!("native rejected package install request {}", progress_id);
                progress.report(progress_id, -1, 0, None);
            }
        });

        progress_id
    }

    /// Starts a firmware install from an already-open descriptor. Only one
    /// firmware install may be in flight at a time; the slot clears itself
    /// once the terminal update is dispatched.
    pub fn install_firmware(&self, fd: i32) -> Result<u64> {
        if let Some(active) = self.firmware.progress_id() {
            return Err(LauncherError::DuplicateProgress(format!(
                "firmware install already in flight under progress {active}"
            )));
        }

        let firmware = self.firmware.clone();
        let progress_id =
            self.progress
                .create_with_observer("Firmware Installation", false, move |snapshot| {
                    if snapshot.is_finished() {
                        firmware.set_progress_id(None);
                    }
                });
        self.firmware.set_progress_id(Some(progress_id));

        let native = self.native.clone();
        let progress = self.progress.clone();
        thread::spawn(move || {
            if !native.install_firmware(fd, progress_id) {
                tracing::warn!("native rejected firmware install request {}", progress_id);
                progress.report(progress_id, -1, 0, None);
            }
        });

        Ok(progress_id)
    }
}
