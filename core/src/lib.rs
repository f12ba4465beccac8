pub mod device;
pub mod driver;
pub mod error;
pub mod registry;
pub mod test_utils;
pub mod timestamp;

pub use device::{AccessFlags, DirectoryEntry, StorageDevice};
pub use driver::{DriverResult, NativeStat, SpaceInfo, VolumeDriver};
pub use error::{DriverError, StorageError};
pub use registry::{DeviceHandle, DeviceRegistry, SharedDevice, REGISTRY_CAPACITY};
