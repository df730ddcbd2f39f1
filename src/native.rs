/// Event code passed to [`NativeRuntime::usb_device_event`] when a device is
/// plugged in.
pub const USB_EVENT_ATTACH: i32 = 0;
/// Event code for device removal.
pub const USB_EVENT_DETACH: i32 = 1;

/// Boundary to the native emulator runtime.
///
/// Install calls hand over an already-open raw descriptor together with a
/// progress request id. A `true` return means the native side accepted the
/// operation and will drive `ProgressService::report` for that id to a
/// terminal value on its own thread; `false` means nothing was started and
/// the caller must synthesize the failure report itself.
pub trait NativeRuntime: Send + Sync {
    fn install_firmware(&self, fd: i32, progress_id: u64) -> bool;

    fn install_package(&self, fd: i32, progress_id: u64) -> bool;

    /// Forwards a USB attach/detach signal for an opened device descriptor.
    fn usb_device_event(&self, fd: i32, event: i32);
}
