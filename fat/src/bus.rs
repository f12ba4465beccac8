// Bus wiring profiles. Electrical configuration belongs to the block-level
// driver; a profile only records which variant a device was built for and
// the pin/baud parameters the board reserves for it.

use serde::{Deserialize, Serialize};

/// SPI bus clock: 125 MHz system clock divided by 4.
pub const SPI_BAUD_HZ: u32 = 125 * 1000 * 1000 / 4;
/// SDIO bus clock: 125 MHz system clock divided by 6.
pub const SDIO_BAUD_HZ: u32 = 125 * 1000 * 1000 / 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpiBus {
    pub clk_pin: u8,
    pub miso_pin: u8,
    pub mosi_pin: u8,
    pub cs_pin: u8,
}

/// SDIO wiring. Only CMD and D0 are free choices; D1-D3 and CLK sit at
/// fixed offsets from D0 and must be reserved alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdioBus {
    pub cmd_pin: u8,
    pub d0_pin: u8,
}

impl SdioBus {
    pub fn d1_pin(&self) -> u8 {
        self.d0_pin + 1
    }

    pub fn d2_pin(&self) -> u8 {
        self.d0_pin + 2
    }

    pub fn d3_pin(&self) -> u8 {
        self.d0_pin + 3
    }

    pub fn clk_pin(&self) -> u8 {
        self.d0_pin - 2
    }
}

/// Bus variant a device was constructed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusProfile {
    Spi(SpiBus),
    Sdio(SdioBus),
}

impl BusProfile {
    pub fn baud_hz(&self) -> u32 {
        match self {
            BusProfile::Spi(_) => SPI_BAUD_HZ,
            BusProfile::Sdio(_) => SDIO_BAUD_HZ,
        }
    }
}
