use std::array;
use std::sync::{Arc, Mutex, RwLock};

use crate::device::StorageDevice;
use crate::error::StorageError;

/// Slot count of the device arena. More cards than this cannot be wired to
/// one board, so exhaustion is rejected at registration rather than grown
/// past.
pub const REGISTRY_CAPACITY: usize = 8;

pub type SharedDevice = Arc<Mutex<dyn StorageDevice>>;

/// Stable handle to a registered device slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(usize);

impl DeviceHandle {
    pub fn slot(&self) -> usize {
        self.0
    }
}

/// Fixed-capacity arena of live storage devices.
///
/// Collaborators that need to iterate all attached cards without holding
/// references query `count`/`nth`; lookups never allocate, so resolving a
/// handle is safe from interrupt context.
pub struct DeviceRegistry {
    slots: RwLock<[Option<SharedDevice>; REGISTRY_CAPACITY]>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        DeviceRegistry {
            slots: RwLock::new(array::from_fn(|_| None)),
        }
    }

    /// Places `device` in the first free slot and returns its handle, or
    /// [`StorageError::RegistryFull`] when every slot is taken.
    pub fn register(&self, device: SharedDevice) -> Result<DeviceHandle, StorageError> {
        let mut slots = self.slots.write().unwrap();
        for (index, slot) in slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(device);
                return Ok(DeviceHandle(index));
            }
        }
        Err(StorageError::registry_full())
    }

    /// Frees the slot and returns the device that occupied it.
    pub fn deregister(&self, handle: DeviceHandle) -> Option<SharedDevice> {
        self.slots.write().unwrap()[handle.0].take()
    }

    pub fn get(&self, handle: DeviceHandle) -> Option<SharedDevice> {
        self.slots.read().unwrap()[handle.0].clone()
    }

    /// Number of live devices.
    pub fn count(&self) -> usize {
        self.slots
            .read()
            .unwrap()
            .iter()
            .filter(|slot| slot.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// The n-th live device in slot order, skipping freed slots.
    pub fn nth(&self, n: usize) -> Option<SharedDevice> {
        self.slots
            .read()
            .unwrap()
            .iter()
            .flatten()
            .nth(n)
            .cloned()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
