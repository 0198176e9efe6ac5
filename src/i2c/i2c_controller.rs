// Licensed under the Apache-2.0 license

//! DMA-driven I2C transaction engine.
//!
//! A [`BusHandle`] drives one controller. Each transaction builds its command stream,
//! programs the target address, arms RX and TX DMA channels and then blocks on the
//! bus semaphore until the interrupt handler reports STOP (or the wait expires).
//! Failed transactions always leave the bus recovered before returning.
//!
//! It implements `embedded_hal::i2c::I2c`, so any embedded-hal device driver can sit
//! on top of it.

use core::iter;

use crate::common::{Logger, NoOpLogger};
use crate::i2c::bus_recovery::BusRecovery;
use crate::i2c::command::validate_lengths;
use crate::i2c::common::{BusId, Error, I2cDmaConfig};
use crate::i2c::dma::{self, ClaimedChannel};
use crate::i2c::hardware_instantiation::{BusRegistry, BusSlot, Primitives};
use crate::i2c::interrupt::classify;
use crate::i2c::traits::{BinarySemaphore, Platform, TimedMutex};
use embedded_hal::i2c::{Operation, SevenBitAddress};

/// Handle to an initialized bus. Cheap to copy; all copies share the bus mutex.
pub struct BusHandle<'r, P: Platform, L: Logger = NoOpLogger> {
    registry: &'r BusRegistry<P, L>,
    bus: BusId,
}

impl<P: Platform, L: Logger> Clone for BusHandle<'_, P, L> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P: Platform, L: Logger> Copy for BusHandle<'_, P, L> {}

impl<'r, P: Platform, L: Logger> BusHandle<'r, P, L> {
    pub(crate) fn new(registry: &'r BusRegistry<P, L>, bus: BusId) -> Self {
        Self { registry, bus }
    }

    #[must_use]
    pub fn bus(&self) -> BusId {
        self.bus
    }

    /// Writes `wbuf`, then reads `rbuf.len()` bytes, as one transaction.
    ///
    /// Either buffer may be empty, but not both. With both non-empty the read is
    /// preceded by a repeated START.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument`: nothing to transfer, or the transfer exceeds
    ///   [`MAX_TRANSFER_SIZE`](crate::i2c::MAX_TRANSFER_SIZE)
    /// - `Timeout`: the bus lock or the completion wait expired
    /// - `Io`: the controller aborted the transfer (NACK, arbitration loss)
    /// - `Generic`: no free DMA channel, or the bus lock could not be released
    pub fn write_read(&self, address: u8, wbuf: &[u8], rbuf: &mut [u8]) -> Result<(), Error> {
        self.transact(address, iter::once(wbuf), rbuf)
    }

    /// Runs one transaction made of back-to-back write segments and an optional read.
    fn transact<'a, I>(&self, address: u8, writes: I, rbuf: &mut [u8]) -> Result<(), Error>
    where
        I: Iterator<Item = &'a [u8]> + Clone,
    {
        let write_len = writes.clone().map(<[u8]>::len).sum();
        validate_lengths(write_len, rbuf.len())?;

        let slot = self.registry.slot(self.bus);
        let (Some(primitives), Some(config)) = (slot.primitives(), slot.config()) else {
            return Err(Error::Generic);
        };
        let logger = self.registry.logger();

        if !primitives.mutex.lock(config.lock_timeout) {
            logger.warn(format_args!(
                "{}: bus lock not acquired within {} ms",
                self.bus,
                config.lock_timeout.to_millis()
            ));
            return Err(Error::Timeout);
        }

        let result = self.transfer_locked(slot, primitives, &config, address, writes, rbuf);

        if !primitives.mutex.unlock() {
            logger.error(format_args!("{}: failed to release bus lock", self.bus));
            return result.and(Err(Error::Generic));
        }
        result
    }

    fn transfer_locked<'a, I>(
        &self,
        slot: &BusSlot<P>,
        primitives: &Primitives<P>,
        config: &I2cDmaConfig,
        address: u8,
        writes: I,
        rbuf: &mut [u8],
    ) -> Result<(), Error>
    where
        I: Iterator<Item = &'a [u8]> + Clone,
    {
        let platform = self.registry.platform();
        let logger = self.registry.logger();
        let bus = self.bus;

        // SAFETY: the bus mutex is held until after the DMA channels are released.
        let commands = unsafe { slot.commands_mut() };
        let words = commands.build(writes, rbuf.len())?;

        platform.set_controller_enabled(bus, false);
        platform.set_target_address(bus, address);
        platform.set_controller_enabled(bus, true);

        slot.completion().reset();

        let Some(tx) = ClaimedChannel::claim(platform) else {
            logger.warn(format_args!("{}: no DMA channel for TX", bus));
            return Err(Error::Generic);
        };
        let rx = if rbuf.is_empty() {
            None
        } else {
            let Some(rx) = ClaimedChannel::claim(platform) else {
                logger.warn(format_args!("{}: no DMA channel for RX", bus));
                return Err(Error::Generic);
            };
            Some(rx)
        };

        if let Some(rx) = &rx {
            dma::start_rx(platform, rx.channel(), bus, rbuf);
        }
        dma::start_tx(platform, tx.channel(), bus, words);

        let completed = primitives.semaphore.take(config.transfer_timeout);
        let outcome = classify(completed, slot.completion().snapshot());

        if outcome.is_err() {
            tx.abort();
            if let Some(rx) = &rx {
                rx.abort();
            }
        }
        drop(rx);
        drop(tx);

        if let Err(error) = outcome {
            logger.error(format_args!(
                "{}: transfer to {:#04x} failed: {}",
                bus, address, error
            ));
            if let Err(recovery) = BusRecovery::reinitialize(platform, logger, slot) {
                logger.error(format_args!("{}: recovery failed: {}", bus, recovery));
            }
        }
        outcome
    }
}

impl<P: Platform, L: Logger> embedded_hal::i2c::ErrorType for BusHandle<'_, P, L> {
    type Error = Error;
}

impl<P: Platform, L: Logger> embedded_hal::i2c::I2c for BusHandle<'_, P, L> {
    fn read(&mut self, addr: SevenBitAddress, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.transact(addr, iter::empty(), buffer)
    }

    fn write(&mut self, addr: SevenBitAddress, bytes: &[u8]) -> Result<(), Self::Error> {
        self.transact(addr, iter::once(bytes), &mut [])
    }

    fn write_read(
        &mut self,
        addr: SevenBitAddress,
        bytes: &[u8],
        buffer: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.transact(addr, iter::once(bytes), buffer)
    }

    /// Supports any run of writes, optionally followed by a single read.
    fn transaction(
        &mut self,
        addr: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let Some((last, leading)) = operations.split_last_mut() else {
            return Ok(());
        };
        if leading
            .iter()
            .any(|operation| matches!(operation, Operation::Read(_)))
        {
            return Err(Error::InvalidArgument);
        }

        let writes = leading.iter().filter_map(|operation| match operation {
            Operation::Write(bytes) => Some(*bytes),
            Operation::Read(_) => None,
        });

        match last {
            Operation::Write(bytes) => {
                let bytes: &[u8] = bytes;
                self.transact(addr, writes.chain(iter::once(bytes)), &mut [])
            }
            Operation::Read(buffer) => self.transact(addr, writes, buffer),
        }
    }
}
