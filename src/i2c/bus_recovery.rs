// Licensed under the Apache-2.0 license

//! Bus recovery and (re)initialization.
//!
//! The same procedure brings a bus up at init time and heals it after every failed
//! transaction. It tolerates a bus left stuck by a device that was interrupted
//! mid-byte and is still holding SDA low.

use crate::common::Logger;
use crate::i2c::common::{
    Error, PinFunction, INTR_MASK_STOP_DET, INTR_MASK_TX_ABRT, UNBLOCK_MAX_PULSES,
    UNBLOCK_MAX_SCL_HZ,
};
use crate::i2c::hardware_instantiation::BusSlot;
use crate::i2c::traits::{BinarySemaphore, GpioControl, Platform, SystemClock};

/// Helper for bringing an I2C bus into a known-good state.
pub struct BusRecovery;

impl BusRecovery {
    /// Full recovery pass for one bus.
    ///
    /// Steps:
    /// 1. Mask the bus interrupt line
    /// 2. Clear the completion event
    /// 3. Drain a stale completion signal, if any
    /// 4. Probe SDA/SCL as open-drain inputs
    /// 5. Clock the bus free if either line is low (best effort)
    /// 6. Re-enable the controller and hand the pins back to it
    /// 7. Unmask STOP_DET and TX_ABRT
    /// 8. Bind and enable the bus interrupt handler
    ///
    /// # Errors
    ///
    /// `Generic` if the stale signal could not be drained. Every other step is best
    /// effort.
    pub fn reinitialize<P, L>(platform: &P, logger: &L, slot: &BusSlot<P>) -> Result<(), Error>
    where
        P: Platform,
        L: Logger,
    {
        let bus = slot.id();
        let irq = bus.irq_number();
        let Some(config) = slot.config() else {
            return Err(Error::Generic);
        };

        platform.set_irq_enabled(irq, false);
        slot.completion().reset();

        if let Some(semaphore) = slot.semaphore() {
            if semaphore.count() != 0 && !semaphore.try_take() {
                logger.error(format_args!("{}: failed to drain stale completion", bus));
                return Err(Error::Generic);
            }
        }

        if Self::is_blocked(platform, config.sda_pin, config.scl_pin) {
            let pulses = Self::unblock(platform, config.sda_pin, config.scl_pin);
            logger.warn(format_args!("{}: bus blocked, issued {} SCL pulses", bus, pulses));
            if !platform.read_pin(config.sda_pin) {
                logger.warn(format_args!("{}: SDA still held low", bus));
            }
        }

        let achieved = platform.enable_controller(bus, config.baud_rate);
        for pin in [config.sda_pin, config.scl_pin] {
            platform.set_pin_function(pin, PinFunction::I2c);
            platform.pull_up_pin(pin);
        }

        platform.set_interrupt_mask(bus, INTR_MASK_STOP_DET | INTR_MASK_TX_ABRT);

        platform.set_exclusive_handler(irq, slot.irq_handler());
        platform.set_irq_enabled(irq, true);

        logger.debug(format_args!("{}: ready at {} Hz", bus, achieved.raw()));
        Ok(())
    }

    /// Puts both lines in open-drain mode and reports whether either reads low.
    pub fn is_blocked<G: GpioControl + ?Sized>(gpio: &G, sda_pin: u8, scl_pin: u8) -> bool {
        Self::open_drain(gpio, sda_pin);
        Self::open_drain(gpio, scl_pin);
        !gpio.read_pin(sda_pin) || !gpio.read_pin(scl_pin)
    }

    /// SIO owned, released (input), with the output latch at 0.
    ///
    /// Switching the direction to output then drives the line low.
    pub fn open_drain<G: GpioControl + ?Sized>(gpio: &G, pin: u8) {
        gpio.set_pin_function(pin, PinFunction::Sio);
        gpio.set_pin_output(pin, false);
        gpio.put_pin(pin, false);
    }

    /// Toggles SCL until SDA is released, at most [`UNBLOCK_MAX_PULSES`] times.
    ///
    /// Returns the number of pulses issued. Expects both pins in open-drain mode.
    pub fn unblock<P>(platform: &P, sda_pin: u8, scl_pin: u8) -> u8
    where
        P: GpioControl + SystemClock + ?Sized,
    {
        let half_period = Self::half_period_cycles(platform.sys_clk_hz());

        for pulse in 1..=UNBLOCK_MAX_PULSES {
            platform.set_pin_output(scl_pin, true);
            platform.spin_cycles(half_period);
            platform.set_pin_output(scl_pin, false);
            platform.spin_cycles(half_period);

            if platform.read_pin(sda_pin) {
                return pulse;
            }
        }
        UNBLOCK_MAX_PULSES
    }

    /// Half of one SCL period at [`UNBLOCK_MAX_SCL_HZ`], in `clk_sys` cycles.
    #[must_use]
    pub const fn half_period_cycles(sys_clk_hz: u32) -> u32 {
        sys_clk_hz / UNBLOCK_MAX_SCL_HZ / 2
    }
}
