pub mod bus;
pub mod device;
mod search;

pub use bus::{BusProfile, SdioBus, SpiBus, SDIO_BAUD_HZ, SPI_BAUD_HZ};
pub use device::FatStorageDevice;
