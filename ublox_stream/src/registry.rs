use std::{collections::HashMap, fmt, sync::Arc};

use log::debug;

use crate::{
    device::Device,
    error::{Error, Result},
};

/// Opaque id of a device in a [`DeviceRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceHandle(u32);

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gnss#{}", self.0)
    }
}

/// Maps handles to open devices. Handles are never reused.
#[derive(Default)]
pub struct DeviceRegistry {
    next: u32,
    devices: HashMap<DeviceHandle, Arc<Device>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, device: Device) -> DeviceHandle {
        let handle = DeviceHandle(self.next);
        self.next = self.next.wrapping_add(1);
        debug!("{} added ({:?})", handle, device.transport_type());
        self.devices.insert(handle, Arc::new(device));
        handle
    }

    pub fn get(&self, handle: DeviceHandle) -> Result<Arc<Device>> {
        self.devices
            .get(&handle)
            .cloned()
            .ok_or(Error::UnknownDevice)
    }

    /// The device is closed once the last clone of it is dropped
    pub fn remove(&mut self, handle: DeviceHandle) -> Result<Arc<Device>> {
        let device = self.devices.remove(&handle).ok_or(Error::UnknownDevice)?;
        debug!("{} removed", handle);
        Ok(device)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn handles(&self) -> impl Iterator<Item = DeviceHandle> + '_ {
        self.devices.keys().copied()
    }
}
