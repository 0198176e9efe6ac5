// Licensed under the Apache-2.0 license

//! # Platform Collaborator Traits
//!
//! The transaction engine drives hardware it does not own: the task scheduler, the
//! I2C controller registers, the DMA controller, the GPIO block, the NVIC and the
//! clock tree. Each of those is described here by one small trait, and the traits
//! compose into [`Platform`].
//!
//! ## Trait Hierarchy
//!
//! ```text
//! Platform (composite, blanket implemented)
//!     ├── TaskRuntime ── TimedMutex, BinarySemaphore
//!     ├── I2cRegisters
//!     ├── DmaController
//!     ├── GpioControl
//!     ├── InterruptControl
//!     └── SystemClock
//! ```
//!
//! Register-level traits take `&self` plus a [`BusId`], the same way a PAC hands out
//! shared references to register blocks. Implementations are expected to be thin
//! wrappers over volatile accesses and must be callable from interrupt context
//! where noted.

use crate::i2c::common::{BusId, Direction, PinFunction};
use crate::i2c::dma::ChannelConfig;
use fugit::{HertzU32, MillisDurationU32};

/// Interrupt entry point bound to one bus.
pub type InterruptHandler = fn();

/// Scheduler mutex with a bounded acquire.
pub trait TimedMutex: Send + Sync {
    /// Blocks the calling task for at most `timeout`. Returns `false` on timeout.
    fn lock(&self, timeout: MillisDurationU32) -> bool;

    /// Returns `false` if the runtime rejected the release.
    fn unlock(&self) -> bool;
}

/// Scheduler binary semaphore used for the ISR to task handoff.
pub trait BinarySemaphore: Send + Sync {
    /// Blocks the calling task for at most `timeout`. Returns `false` on timeout.
    fn take(&self, timeout: MillisDurationU32) -> bool;

    /// Non-blocking take.
    fn try_take(&self) -> bool;

    /// Number of pending signals (0 or 1).
    fn count(&self) -> u32;

    /// Interrupt-safe give.
    ///
    /// Returns `true` when the give made a higher-priority task runnable and a
    /// context switch should be requested on interrupt exit.
    fn give_from_isr(&self) -> bool;
}

/// Task scheduler services consumed by the driver.
pub trait TaskRuntime {
    type Mutex: TimedMutex;
    type Semaphore: BinarySemaphore;

    /// `None` when the runtime cannot allocate the primitive.
    fn create_mutex(&self) -> Option<Self::Mutex>;

    /// Creates an empty binary semaphore, or `None` on allocation failure.
    fn create_binary_semaphore(&self) -> Option<Self::Semaphore>;

    /// Requests a context switch on interrupt exit if `higher_priority_woken`.
    fn yield_from_isr(&self, higher_priority_woken: bool);
}

/// DesignWare APB I2C controller, master mode.
pub trait I2cRegisters {
    /// Toggles `IC_ENABLE`. The target address can only be written while disabled.
    fn set_controller_enabled(&self, bus: BusId, enabled: bool);

    /// Writes `IC_TAR`.
    fn set_target_address(&self, bus: BusId, address: u8);

    /// Resets and enables the controller as a master at `baud_rate`.
    ///
    /// Returns the baud rate actually achieved by the SCL divider.
    fn enable_controller(&self, bus: BusId, baud_rate: HertzU32) -> HertzU32;

    /// Writes `IC_INTR_MASK`.
    fn set_interrupt_mask(&self, bus: BusId, mask: u32);

    /// Reads `IC_INTR_STAT`. Must be callable from interrupt context.
    fn interrupt_status(&self, bus: BusId) -> u32;

    /// Reads `IC_CLR_TX_ABRT`. Must be callable from interrupt context.
    fn clear_tx_abort(&self, bus: BusId);

    /// Reads `IC_CLR_STOP_DET`. Must be callable from interrupt context.
    fn clear_stop_detected(&self, bus: BusId);

    /// Bus address of `IC_DATA_CMD`, used as a DMA endpoint.
    fn data_cmd_address(&self, bus: BusId) -> usize;

    /// DREQ line pacing DMA in the given direction.
    fn dreq(&self, bus: BusId, direction: Direction) -> u8;
}

/// Shared DMA channel pool.
pub trait DmaController {
    type Channel: Copy + core::fmt::Debug;

    /// `None` when every channel is in use.
    fn claim_unused_channel(&self) -> Option<Self::Channel>;

    fn unclaim_channel(&self, channel: Self::Channel);

    /// Programs the channel. Starts it immediately when `trigger` is set.
    fn configure_channel(&self, channel: Self::Channel, config: &ChannelConfig, trigger: bool);

    /// Aborts any transfer in progress on the channel and waits for it to settle.
    fn abort_channel(&self, channel: Self::Channel);
}

/// Pad and SIO control for the SDA/SCL pins.
pub trait GpioControl {
    fn set_pin_function(&self, pin: u8, function: PinFunction);

    /// `true` configures the pin as an output.
    fn set_pin_output(&self, pin: u8, output: bool);

    /// Sets the output latch.
    fn put_pin(&self, pin: u8, high: bool);

    fn read_pin(&self, pin: u8) -> bool;

    fn pull_up_pin(&self, pin: u8);
}

/// NVIC access.
pub trait InterruptControl {
    fn set_irq_enabled(&self, irq: u16, enabled: bool);

    /// Installs `handler` as the only handler for `irq`.
    fn set_exclusive_handler(&self, irq: u16, handler: InterruptHandler);
}

/// Clock tree queries and cycle-paced delays.
pub trait SystemClock {
    /// Live `clk_sys` frequency in Hz.
    fn sys_clk_hz(&self) -> u32;

    /// Busy-waits for at least `cycles` processor cycles.
    fn spin_cycles(&self, cycles: u32) {
        #[cfg(target_os = "none")]
        cortex_m::asm::delay(cycles);

        #[cfg(not(target_os = "none"))]
        for _ in 0..cycles {
            core::hint::spin_loop();
        }
    }
}

/// Everything the driver needs from the board.
pub trait Platform:
    'static + TaskRuntime + I2cRegisters + DmaController + GpioControl + InterruptControl + SystemClock
{
}

impl<T> Platform for T where
    T: 'static
        + TaskRuntime
        + I2cRegisters
        + DmaController
        + GpioControl
        + InterruptControl
        + SystemClock
{
}
