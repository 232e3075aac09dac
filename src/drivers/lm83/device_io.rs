use i2cdev::core::I2CDevice;
use i2cdev::linux::LinuxI2CDevice;

use crate::error::BusError;

/// Byte-wide register access to one device on a bus.
///
/// One transaction per call, no retry. Timeouts are whatever the transport
/// enforces.
#[cfg_attr(test, mockall::automock)]
pub trait RegisterIo: Send + 'static {
    /// Bus address this handle talks to.
    fn address(&self) -> u16;

    fn read_register(&mut self, reg: u8) -> Result<u8, BusError>;

    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), BusError>;
}

/// A bus adapter able to hand out register handles for candidate addresses.
pub trait BusAdapter: Send + Sync {
    type Io: RegisterIo;

    /// Human readable adapter name used in logs and client names.
    fn name(&self) -> String;

    fn open(&self, addr: u16) -> Result<Self::Io, BusError>;
}

/// SMBus byte-data access through the Linux i2c-dev interface.
pub struct I2cDev {
    dev: LinuxI2CDevice,
    addr: u16,
}

impl std::fmt::Debug for I2cDev {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("I2cDev").field("addr", &self.addr).finish()
    }
}

impl RegisterIo for I2cDev {
    fn address(&self) -> u16 {
        self.addr
    }

    fn read_register(&mut self, reg: u8) -> Result<u8, BusError> {
        self.dev
            .smbus_read_byte_data(reg)
            .map_err(|e| BusError::Read {
                addr: self.addr,
                reg,
                reason: e.to_string(),
            })
    }

    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), BusError> {
        self.dev
            .smbus_write_byte_data(reg, value)
            .map_err(|e| BusError::Write {
                addr: self.addr,
                reg,
                value,
                reason: e.to_string(),
            })
    }
}

/// `/dev/i2c-N` adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinuxAdapter {
    pub bus: u8,
}

impl LinuxAdapter {
    pub const fn new(bus: u8) -> Self {
        Self { bus }
    }

    pub fn device_path(&self) -> String {
        format!("/dev/i2c-{}", self.bus)
    }
}

impl BusAdapter for LinuxAdapter {
    type Io = I2cDev;

    fn name(&self) -> String {
        format!("i2c-{}", self.bus)
    }

    fn open(&self, addr: u16) -> Result<I2cDev, BusError> {
        let path = self.device_path();
        LinuxI2CDevice::new(&path, addr)
            .map(|dev| I2cDev { dev, addr })
            .map_err(|e| BusError::Open {
                path,
                addr,
                reason: e.to_string(),
            })
    }
}
