pub mod firmware_store;
pub mod game_library;
pub mod install_service;
pub mod progress_service;
pub mod usb_device_service;

pub use firmware_store::FirmwareStore;
pub use game_library::{GameEntry, GameLibrary, PENDING_ENTRY_KEY};
pub use install_service::InstallService;
pub use progress_service::{
    ProgressCleanup, ProgressEvent, ProgressObserver, ProgressService, ProgressSnapshot,
};
pub use usb_device_service::{UsbDeviceConnection, UsbDeviceOpener, UsbDeviceService};
