use thiserror::Error;

use crate::registry::REGISTRY_CAPACITY;

/// Status reported by the underlying filesystem driver, reduced to the
/// conditions the storage contract actually exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("low-level disk I/O failed")]
    Disk,

    #[error("driver internal assertion failed")]
    Internal,

    #[error("storage device not ready")]
    NotReady,

    #[error("no such file")]
    NoFile,

    #[error("no such path")]
    NoPath,

    #[error("access denied")]
    Denied,

    #[error("object already exists")]
    Exists,

    #[error("invalid file or directory object")]
    InvalidObject,

    #[error("volume not mounted")]
    NotMounted,

    #[error("invalid parameter")]
    InvalidParameter,

    #[error("driver timed out")]
    Timeout,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("device registry full: all {capacity} slots in use")]
    RegistryFull { capacity: usize },

    #[error("driver error: {0}")]
    Driver(#[from] DriverError),
}

impl StorageError {
    pub fn registry_full() -> Self {
        StorageError::RegistryFull {
            capacity: REGISTRY_CAPACITY,
        }
    }
}
