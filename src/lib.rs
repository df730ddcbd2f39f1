//! Backend core for the Hoshi emulator launcher.
//!
//! Owns the in-flight operation registry, the persisted game catalog and
//! firmware record, and the USB device registry. The UI shell and the native
//! emulator runtime are collaborators: the UI consumes the progress event
//! channel on its serial context, the native side drives progress reports
//! from its own worker threads.

pub mod errors;
pub mod logging;
pub mod models;
pub mod native;
pub mod services;
pub mod utils;

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::native::NativeRuntime;
use crate::services::{
    FirmwareStore, GameLibrary, InstallService, ProgressEvent, ProgressService, UsbDeviceService,
};
use crate::utils::paths::{firmware_store_path, games_store_path};

/// The launcher's service bundle, constructed once and handed to every
/// consumer. There are no hidden global instances; single-instance semantics
/// come from owning exactly one `Launcher`.
#[derive(Clone)]
pub struct Launcher {
    pub progress: ProgressService,
    pub library: GameLibrary,
    pub firmware: FirmwareStore,
    pub usb_devices: UsbDeviceService,
    pub installs: InstallService,
}

impl Launcher {
    /// Loads both persisted stores from `root_dir` and wires the services
    /// together. The returned receiver is the sole consumer end of the
    /// progress event channel; the caller's UI context must drain it and
    /// dispatch each event.
    pub fn new(
        root_dir: &Path,
        native: Arc<dyn NativeRuntime>,
    ) -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let library = GameLibrary::new(games_store_path(root_dir));
        library.load();
        let firmware = FirmwareStore::new(firmware_store_path(root_dir));
        firmware.load();

        let (progress, events) = ProgressService::new(Arc::new(library.clone()));
        let usb_devices = UsbDeviceService::new(native.clone());
        let installs = InstallService::new(
            progress.clone(),
            library.clone(),
            firmware.clone(),
            native,
        );

        let launcher = Self {
            progress,
            library,
            firmware,
            usb_devices,
            installs,
        };
        (launcher, events)
    }
}
