// Licensed under the Apache-2.0 license

//! Register-style helpers for devices addressed through a one-byte register pointer.
//!
//! Every helper is a single [`BusHandle::write_read`] transaction and shares its
//! error behavior.

use crate::common::Logger;
use crate::i2c::common::Error;
use crate::i2c::i2c_controller::BusHandle;
use crate::i2c::traits::Platform;

impl<P: Platform, L: Logger> BusHandle<'_, P, L> {
    /// Plain write transaction.
    ///
    /// # Errors
    ///
    /// See [`BusHandle::write_read`].
    pub fn write(&self, address: u8, bytes: &[u8]) -> Result<(), Error> {
        self.write_read(address, bytes, &mut [])
    }

    /// Plain read transaction.
    ///
    /// # Errors
    ///
    /// See [`BusHandle::write_read`].
    pub fn read(&self, address: u8, buffer: &mut [u8]) -> Result<(), Error> {
        self.write_read(address, &[], buffer)
    }

    /// # Errors
    ///
    /// See [`BusHandle::write_read`].
    pub fn write_byte(&self, address: u8, register: u8, value: u8) -> Result<(), Error> {
        self.write(address, &[register, value])
    }

    /// # Errors
    ///
    /// See [`BusHandle::write_read`].
    pub fn read_byte(&self, address: u8, register: u8) -> Result<u8, Error> {
        let mut value = [0u8; 1];
        self.write_read(address, &[register], &mut value)?;
        let [byte] = value;
        Ok(byte)
    }

    /// Writes `value` low byte first.
    ///
    /// # Errors
    ///
    /// See [`BusHandle::write_read`].
    pub fn write_word(&self, address: u8, register: u8, value: u16) -> Result<(), Error> {
        let [low, high] = value.to_le_bytes();
        self.write(address, &[register, low, high])
    }

    /// Reads a word transmitted low byte first.
    ///
    /// # Errors
    ///
    /// See [`BusHandle::write_read`].
    pub fn read_word(&self, address: u8, register: u8) -> Result<u16, Error> {
        let mut bytes = [0u8; 2];
        self.write_read(address, &[register], &mut bytes)?;
        Ok(u16::from_le_bytes(bytes))
    }

    /// Writes `value` high byte first.
    ///
    /// # Errors
    ///
    /// See [`BusHandle::write_read`].
    pub fn write_word_swapped(&self, address: u8, register: u8, value: u16) -> Result<(), Error> {
        let [high, low] = value.to_be_bytes();
        self.write(address, &[register, high, low])
    }

    /// Reads a word transmitted high byte first.
    ///
    /// # Errors
    ///
    /// See [`BusHandle::write_read`].
    pub fn read_word_swapped(&self, address: u8, register: u8) -> Result<u16, Error> {
        let mut bytes = [0u8; 2];
        self.write_read(address, &[register], &mut bytes)?;
        Ok(u16::from_be_bytes(bytes))
    }
}
