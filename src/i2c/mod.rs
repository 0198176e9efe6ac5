// Licensed under the Apache-2.0 license

//! DMA-driven I2C master driver for the RP2040.
//!
//! Transactions are streamed to the DesignWare I2C controller by DMA, and the
//! calling task sleeps on a per-bus semaphore until the controller's STOP interrupt
//! fires. Every wait is bounded, and a failed transaction always leaves its bus
//! recovered (clocked free if a device was holding SDA, then re-initialized).

pub mod bus_recovery;
pub mod command;
pub mod common;
pub mod dma;
pub mod hardware_instantiation;
pub mod i2c_controller;
pub mod interrupt;
pub mod register_access;
pub mod traits;

#[cfg(test)]
pub(crate) mod mock;

pub use common::{
    BusId, Error, I2cDmaConfig, I2cDmaConfigBuilder, I2cSpeed, LOCK_TIMEOUT, MAX_TRANSFER_SIZE,
    TRANSFER_TIMEOUT,
};
pub use hardware_instantiation::BusRegistry;
pub use i2c_controller::BusHandle;
pub use traits::Platform;
