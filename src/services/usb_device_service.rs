use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::native::{NativeRuntime, USB_EVENT_ATTACH, USB_EVENT_DETACH};

/// Opened native handle for one attached device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UsbDeviceConnection {
    pub fd: i32,
}

/// Collaborator that opens a device once attach is requested; typically the
/// platform USB manager. `None` means the device could not be opened (for
/// example, permission not yet granted) and the attach is dropped.
pub trait UsbDeviceOpener {
    fn open_device(&self, device: &str) -> Option<UsbDeviceConnection>;
}

/// Deduplicates device attach/detach events against the native boundary.
/// At most one live connection exists per device identity.
#[derive(Clone)]
pub struct UsbDeviceService {
    devices: Arc<Mutex<HashMap<String, UsbDeviceConnection>>>,
    native: Arc<dyn NativeRuntime>,
}

impl UsbDeviceService {
    pub fn new(native: Arc<dyn NativeRuntime>) -> Self {
        Self {
            devices: Arc::new(Mutex::new(HashMap::new())),
            native,
        }
    }

    /// Opens and registers the device, then signals the native attach event.
    /// A device that is already attached is left untouched. The whole
    /// transition runs under the device-map lock so a duplicate attach cannot
    /// race a concurrent detach for the same identity.
    pub fn attach(&self, device: &str, opener: &dyn UsbDeviceOpener) {
        let mut devices = self.lock();
        if devices.contains_key(device) {
            return;
        }

        let Some(connection) = opener.open_device(device) else {
            tracing::warn!("usb device {} could not be opened, attach dropped", device);
            return;
        };

        devices.insert(device.to_string(), connection);
        self.native.usb_device_event(connection.fd, USB_EVENT_ATTACH);
    }

    /// Signals the native detach event and releases the handle. Detaching an
    /// unattached device is a no-op.
    pub fn detach(&self, device: &str) {
        let mut devices = self.lock();
        if let Some(connection) = devices.remove(device) {
            self.native.usb_device_event(connection.fd, USB_EVENT_DETACH);
        }
    }

    pub fn is_attached(&self, device: &str) -> bool {
        self.lock().contains_key(device)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, UsbDeviceConnection>> {
        match self.devices.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingNative {
        events: StdMutex<Vec<(i32, i32)>>,
    }

    impl RecordingNative {
        fn events(&self) -> Vec<(i32, i32)> {
            self.events.lock().expect("events lock").clone()
        }
    }

    impl NativeRuntime for RecordingNative {
        fn install_firmware(&self, _fd: i32, _progress_id: u64) -> bool {
            true
        }

        fn install_package(&self, _fd: i32, _progress_id: u64) -> bool {
            true
        }

        fn usb_device_event(&self, fd: i32, event: i32) {
            self.events.lock().expect("events lock").push((fd, event));
        }
    }

    #[derive(Default)]
    struct CountingOpener {
        opened: AtomicI32,
    }

    impl UsbDeviceOpener for CountingOpener {
        fn open_device(&self, _device: &str) -> Option<UsbDeviceConnection> {
            let fd = 10 + self.opened.fetch_add(1, Ordering::SeqCst);
            Some(UsbDeviceConnection { fd })
        }
    }

    struct FailingOpener;

    impl UsbDeviceOpener for FailingOpener {
        fn open_device(&self, _device: &str) -> Option<UsbDeviceConnection> {
            None
        }
    }

    #[test]
    fn double_attach_opens_and_signals_once() {
        let native = Arc::new(RecordingNative::default());
        let service = UsbDeviceService::new(native.clone());
        let opener = CountingOpener::default();

        service.attach("usb:1-2", &opener);
        service.attach("usb:1-2", &opener);

        assert!(service.is_attached("usb:1-2"));
        assert_eq!(opener.opened.load(Ordering::SeqCst), 1);
        assert_eq!(native.events(), vec![(10, USB_EVENT_ATTACH)]);
    }

    #[test]
    fn detach_signals_and_releases() {
        let native = Arc::new(RecordingNative::default());
        let service = UsbDeviceService::new(native.clone());
        let opener = CountingOpener::default();

        service.attach("usb:1-2", &opener);
        service.detach("usb:1-2");

        assert!(!service.is_attached("usb:1-2"));
        assert_eq!(
            native.events(),
            vec![(10, USB_EVENT_ATTACH), (10, USB_EVENT_DETACH)]
        );
    }

    #[test]
    fn detach_of_unattached_device_is_noop() {
        let native = Arc::new(RecordingNative::default());
        let service = UsbDeviceService::new(native.clone());

        service.detach("usb:absent");
        assert!(native.events().is_empty());
    }

    #[test]
    fn reattach_after_detach_opens_again() {
        let native = Arc::new(RecordingNative::default());
        let service = UsbDeviceService::new(native.clone());
        let opener = CountingOpener::default();

        service.attach("usb:1-2", &opener);
        service.detach("usb:1-2");
        service.attach("usb:1-2", &opener);

        assert_eq!(opener.opened.load(Ordering::SeqCst), 2);
        assert_eq!(
            native.events(),
            vec![
                (10, USB_EVENT_ATTACH),
                (10, USB_EVENT_DETACH),
                (11, USB_EVENT_ATTACH)
            ]
        );
    }

    #[test]
    fn failed_open_leaves_device_unattached() {
        let native = Arc::new(RecordingNative::default());
        let service = UsbDeviceService::new(native.clone());

        service.attach("usb:1-2", &FailingOpener);
        assert!(!service.is_attached("usb:1-2"));
        assert!(native.events().is_empty());
    }
}
