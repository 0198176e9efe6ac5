// Licensed under the Apache-2.0 license

//! Common types and constants for the DMA-driven I2C driver.
//!
//! This module provides the bus identities, the error taxonomy, the per-bus
//! configuration builder and the DesignWare I2C register bits shared by the rest of
//! the driver.

use core::fmt;
use fugit::{HertzU32, MillisDurationU32};

/// Capacity of the per-bus command buffer, in bytes transferred (one command word each).
pub const MAX_TRANSFER_SIZE: usize = 1056;

/// Default bound on waiting for a transfer to complete.
pub const TRANSFER_TIMEOUT: MillisDurationU32 = MillisDurationU32::from_ticks(100);

/// Default bound on waiting for another caller's transaction to release the bus.
pub const LOCK_TIMEOUT: MillisDurationU32 = MillisDurationU32::from_ticks(10_000);

/// Maximum number of SCL pulses issued when clocking a stuck bus free.
pub const UNBLOCK_MAX_PULSES: u8 = 9;

/// Upper bound on the bit-banged SCL frequency used during bus unblocking.
pub const UNBLOCK_MAX_SCL_HZ: u32 = 100_000;

/// `IC_DATA_CMD.CMD`: the slot is a read request rather than a byte to write.
pub const DATA_CMD_READ: u16 = 1 << 8;
/// `IC_DATA_CMD.STOP`: issue a STOP after this slot.
pub const DATA_CMD_STOP: u16 = 1 << 9;
/// `IC_DATA_CMD.RESTART`: issue a (repeated) START before this slot.
pub const DATA_CMD_RESTART: u16 = 1 << 10;

/// `IC_INTR_STAT.R_TX_ABRT`
pub const INTR_STAT_TX_ABRT: u32 = 1 << 6;
/// `IC_INTR_STAT.R_STOP_DET`
pub const INTR_STAT_STOP_DET: u32 = 1 << 9;
/// `IC_INTR_MASK.M_TX_ABRT`
pub const INTR_MASK_TX_ABRT: u32 = 1 << 6;
/// `IC_INTR_MASK.M_STOP_DET`
pub const INTR_MASK_STOP_DET: u32 = 1 << 9;

/// Number of I2C controllers, and therefore bus slots.
pub const BUS_COUNT: usize = 2;

/// Identity of one physical I2C controller.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusId {
    I2c0,
    I2c1,
}

impl BusId {
    pub const ALL: [BusId; BUS_COUNT] = [BusId::I2c0, BusId::I2c1];

    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            BusId::I2c0 => 0,
            BusId::I2c1 => 1,
        }
    }

    /// NVIC line of the controller's interrupt.
    #[must_use]
    pub const fn irq_number(self) -> u16 {
        match self {
            BusId::I2c0 => 23,
            BusId::I2c1 => 24,
        }
    }
}

impl TryFrom<u8> for BusId {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(BusId::I2c0),
            1 => Ok(BusId::I2c1),
            _ => Err(Error::InvalidArgument),
        }
    }
}

impl fmt::Display for BusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i2c{}", self.index())
    }
}

/// Classified outcome of a failed driver operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Bad buffer/length combination. Nothing was touched.
    InvalidArgument,
    /// The bus lock or the transfer completion was not obtained in time.
    Timeout,
    /// The controller aborted the transfer, or never reported its STOP.
    Io,
    /// A DMA channel or runtime primitive was unavailable or misbehaved.
    Generic,
}

impl Error {
    /// `Timeout` and `Io` are transient: the bus has been recovered and the
    /// transaction may be retried after a short backoff.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Error::Timeout | Error::Io)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Error::InvalidArgument => "invalid argument",
            Error::Timeout => "timed out",
            Error::Io => "transfer aborted",
            Error::Generic => "resource failure",
        };
        f.write_str(text)
    }
}

impl embedded_hal::i2c::Error for Error {
    fn kind(&self) -> embedded_hal::i2c::ErrorKind {
        match self {
            // The controller does not say which phase went unacknowledged.
            Error::Io => embedded_hal::i2c::ErrorKind::NoAcknowledge(
                embedded_hal::i2c::NoAcknowledgeSource::Unknown,
            ),
            Error::InvalidArgument | Error::Timeout | Error::Generic => {
                embedded_hal::i2c::ErrorKind::Other
            }
        }
    }
}

/// Data movement direction relative to the controller.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Transmit,
    Receive,
}

/// Pad function select for the SDA/SCL pins.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinFunction {
    /// Software controlled through SIO, used while unblocking the bus.
    Sio,
    /// Owned by the I2C controller.
    I2c,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum I2cSpeed {
    Standard = 100_000,
    Fast = 400_000,
    FastPlus = 1_000_000,
}

impl I2cSpeed {
    #[must_use]
    pub const fn frequency(self) -> HertzU32 {
        HertzU32::from_raw(self as u32)
    }
}

/// Per-bus settings, fixed at init time.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct I2cDmaConfig {
    pub baud_rate: HertzU32,
    pub sda_pin: u8,
    pub scl_pin: u8,
    pub transfer_timeout: MillisDurationU32,
    pub lock_timeout: MillisDurationU32,
}

impl I2cDmaConfig {
    /// Configuration with default timeouts.
    #[must_use]
    pub const fn new(baud_rate: HertzU32, sda_pin: u8, scl_pin: u8) -> Self {
        Self {
            baud_rate,
            sda_pin,
            scl_pin,
            transfer_timeout: TRANSFER_TIMEOUT,
            lock_timeout: LOCK_TIMEOUT,
        }
    }
}

pub struct I2cDmaConfigBuilder {
    baud_rate: HertzU32,
    sda_pin: u8,
    scl_pin: u8,
    transfer_timeout: MillisDurationU32,
    lock_timeout: MillisDurationU32,
}

impl I2cDmaConfigBuilder {
    #[must_use]
    pub fn new(sda_pin: u8, scl_pin: u8) -> Self {
        Self {
            baud_rate: I2cSpeed::Standard.frequency(),
            sda_pin,
            scl_pin,
            transfer_timeout: TRANSFER_TIMEOUT,
            lock_timeout: LOCK_TIMEOUT,
        }
    }
    #[must_use]
    pub fn speed(mut self, speed: I2cSpeed) -> Self {
        self.baud_rate = speed.frequency();
        self
    }
    #[must_use]
    pub fn baud_rate(mut self, baud_rate: HertzU32) -> Self {
        self.baud_rate = baud_rate;
        self
    }
    #[must_use]
    pub fn transfer_timeout(mut self, timeout: MillisDurationU32) -> Self {
        self.transfer_timeout = timeout;
        self
    }
    #[must_use]
    pub fn lock_timeout(mut self, timeout: MillisDurationU32) -> Self {
        self.lock_timeout = timeout;
        self
    }
    #[must_use]
    pub fn build(self) -> I2cDmaConfig {
        I2cDmaConfig {
            baud_rate: self.baud_rate,
            sda_pin: self.sda_pin,
            scl_pin: self.scl_pin,
            transfer_timeout: self.transfer_timeout,
            lock_timeout: self.lock_timeout,
        }
    }
}
