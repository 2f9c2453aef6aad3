use core::ops::{Deref, DerefMut};

use crate::device::CaptureDevice;

/// Keeps the device in out-of-memory tolerant mode for as long as it is alive.
///
/// Every exit path out of a capture drops the scope, so the device can't be left tolerant.
pub(crate) struct OomScope<'a, D: CaptureDevice> {
    device: &'a mut D,
}

impl<'a, D: CaptureDevice> OomScope<'a, D> {
    pub(crate) fn enter(device: &'a mut D) -> Self {
        device.set_oom_tolerant(true);
        Self { device }
    }
}

impl<D: CaptureDevice> Deref for OomScope<'_, D> {
    type Target = D;

    fn deref(&self) -> &D {
        self.device
    }
}

impl<D: CaptureDevice> DerefMut for OomScope<'_, D> {
    fn deref_mut(&mut self) -> &mut D {
        self.device
    }
}

impl<D: CaptureDevice> Drop for OomScope<'_, D> {
    fn drop(&mut self) {
        self.device.set_oom_tolerant(false);
    }
}
