// Licensed under the Apache-2.0 license

//! # Bus Instance Registry
//!
//! The RP2040 has exactly two I2C controllers, and each needs state that outlives
//! every task using it: a mutex serializing transactions, a semaphore the ISR uses to
//! wake the waiting task, the completion flags, and a command buffer the TX DMA
//! channel reads from while the caller is blocked.
//!
//! ## Ownership Model
//!
//! All of that lives in a [`BusRegistry`] declared as a `static`, so the slots are
//! allocated once for the life of the firmware and never move. Interrupts reach the
//! right slot through [`BusRegistry::on_interrupt`], a fixed table lookup by
//! [`BusId`]; the per-bus `fn()` trampolines bound to the NVIC carry no state of
//! their own. The [`i2c_dma_registry!`](crate::i2c_dma_registry) macro declares the
//! static together with its two trampolines:
//!
//! ```rust,ignore
//! rp_i2c_dma::i2c_dma_registry!(pub I2C, Board, Board::new());
//!
//! let sensors = I2C.init(BusId::I2c0, I2cSpeed::Fast.frequency(), 4, 5)?;
//! let display = I2C.init(BusId::I2c1, I2cSpeed::FastPlus.frequency(), 6, 7)?;
//! let raw = sensors.read_word_swapped(0x48, 0x00)?;
//! ```
//!
//! ## Primitive Lifecycle
//!
//! Scheduler primitives are created on the first successful `init` of a slot and
//! never destroyed. Creation is guarded by a small state machine so that a failed
//! creation can be retried by a later `init`.

use core::cell::{Cell, UnsafeCell};

use grounded::uninit::GroundedCell;
use portable_atomic::{AtomicU8, Ordering};

use crate::common::{Logger, NoOpLogger};
use crate::i2c::bus_recovery::BusRecovery;
use crate::i2c::command::CommandBuffer;
use crate::i2c::common::{BusId, Error, I2cDmaConfig, BUS_COUNT};
use crate::i2c::i2c_controller::BusHandle;
use crate::i2c::interrupt::{self, CompletionEvent};
use crate::i2c::traits::{InterruptHandler, Platform, TaskRuntime};
use fugit::HertzU32;

const PRIMITIVES_UNINIT: u8 = 0;
const PRIMITIVES_CREATING: u8 = 1;
const PRIMITIVES_READY: u8 = 2;

/// Scheduler primitives owned by one bus.
pub struct Primitives<R: TaskRuntime> {
    pub mutex: R::Mutex,
    pub semaphore: R::Semaphore,
}

/// Driver state for one physical controller.
pub struct BusSlot<R: TaskRuntime> {
    id: BusId,
    irq_handler: InterruptHandler,
    primitives: GroundedCell<Primitives<R>>,
    primitives_state: AtomicU8,
    config: critical_section::Mutex<Cell<Option<I2cDmaConfig>>>,
    completion: CompletionEvent,
    commands: UnsafeCell<CommandBuffer>,
}

// SAFETY: `primitives` is written once, before `primitives_state` is published as
// READY, and only read afterwards. `commands` is only accessed by the holder of the
// bus mutex. Everything else is atomic or guarded by a critical section.
unsafe impl<R: TaskRuntime> Sync for BusSlot<R> {}

impl<R: TaskRuntime> BusSlot<R> {
    const fn new(id: BusId, irq_handler: InterruptHandler) -> Self {
        Self {
            id,
            irq_handler,
            primitives: GroundedCell::uninit(),
            primitives_state: AtomicU8::new(PRIMITIVES_UNINIT),
            config: critical_section::Mutex::new(Cell::new(None)),
            completion: CompletionEvent::new(),
            commands: UnsafeCell::new(CommandBuffer::new()),
        }
    }

    #[must_use]
    pub fn id(&self) -> BusId {
        self.id
    }

    #[must_use]
    pub fn irq_handler(&self) -> InterruptHandler {
        self.irq_handler
    }

    #[must_use]
    pub fn completion(&self) -> &CompletionEvent {
        &self.completion
    }

    /// Configuration stored by the last `init`, if any.
    #[must_use]
    pub fn config(&self) -> Option<I2cDmaConfig> {
        critical_section::with(|cs| self.config.borrow(cs).get())
    }

    fn set_config(&self, config: I2cDmaConfig) {
        critical_section::with(|cs| self.config.borrow(cs).set(Some(config)));
    }

    /// The slot's primitives, once created.
    #[must_use]
    pub fn primitives(&self) -> Option<&Primitives<R>> {
        if self.primitives_state.load(Ordering::Acquire) == PRIMITIVES_READY {
            // SAFETY: READY is only published after the cell has been written, and the
            // cell is never written again.
            Some(unsafe { &*self.primitives.get() })
        } else {
            None
        }
    }

    #[must_use]
    pub fn semaphore(&self) -> Option<&R::Semaphore> {
        self.primitives().map(|primitives| &primitives.semaphore)
    }

    /// Creates the semaphore and the mutex unless they already exist.
    fn ensure_primitives(&self, runtime: &R) -> Result<(), Error> {
        match self.primitives_state.compare_exchange(
            PRIMITIVES_UNINIT,
            PRIMITIVES_CREATING,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                let created = runtime.create_binary_semaphore().and_then(|semaphore| {
                    runtime
                        .create_mutex()
                        .map(|mutex| Primitives { mutex, semaphore })
                });
                match created {
                    Some(primitives) => {
                        // SAFETY: the CREATING state gives this call exclusive access to
                        // the uninitialized cell.
                        unsafe { self.primitives.get().write(primitives) };
                        self.primitives_state
                            .store(PRIMITIVES_READY, Ordering::Release);
                        Ok(())
                    }
                    None => {
                        self.primitives_state
                            .store(PRIMITIVES_UNINIT, Ordering::Release);
                        Err(Error::Generic)
                    }
                }
            }
            Err(PRIMITIVES_READY) => Ok(()),
            // Another context is creating them right now.
            Err(_) => Err(Error::Generic),
        }
    }

    /// Exclusive access to the command buffer.
    ///
    /// # Safety
    ///
    /// The caller must hold this bus's mutex for as long as the returned reference,
    /// or any DMA transfer reading from it, is alive.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn commands_mut(&self) -> &mut CommandBuffer {
        &mut *self.commands.get()
    }
}

/// The two I2C bus slots plus the platform and logger they share.
pub struct BusRegistry<P: Platform, L: Logger = NoOpLogger> {
    platform: P,
    logger: L,
    slots: [BusSlot<P>; BUS_COUNT],
}

impl<P: Platform, L: Logger> BusRegistry<P, L> {
    /// Builds the registry. `handlers` are bound to the I2C0 and I2C1 interrupt
    /// lines at init and must call [`Self::on_interrupt`] on this registry.
    pub const fn new(platform: P, logger: L, handlers: [InterruptHandler; BUS_COUNT]) -> Self {
        let [i2c0_handler, i2c1_handler] = handlers;
        Self {
            platform,
            logger,
            slots: [
                BusSlot::new(BusId::I2c0, i2c0_handler),
                BusSlot::new(BusId::I2c1, i2c1_handler),
            ],
        }
    }

    /// Initializes `bus` with default timeouts.
    ///
    /// # Errors
    ///
    /// `Generic` if the scheduler primitives cannot be created, or if a stale
    /// completion signal cannot be drained.
    pub fn init(
        &self,
        bus: BusId,
        baud_rate: HertzU32,
        sda_pin: u8,
        scl_pin: u8,
    ) -> Result<BusHandle<'_, P, L>, Error> {
        self.init_with_config(bus, I2cDmaConfig::new(baud_rate, sda_pin, scl_pin))
    }

    /// Initializes, or re-initializes, `bus` with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Same as [`Self::init`].
    pub fn init_with_config(
        &self,
        bus: BusId,
        config: I2cDmaConfig,
    ) -> Result<BusHandle<'_, P, L>, Error> {
        let slot = self.slot(bus);

        if let Err(error) = slot.ensure_primitives(&self.platform) {
            self.logger
                .error(format_args!("{}: cannot create bus primitives", bus));
            return Err(error);
        }

        slot.set_config(config);
        BusRecovery::reinitialize(&self.platform, &self.logger, slot)?;

        Ok(BusHandle::new(self, bus))
    }

    /// Handle to a bus that has already been initialized.
    #[must_use]
    pub fn handle(&self, bus: BusId) -> Option<BusHandle<'_, P, L>> {
        let slot = self.slot(bus);
        if slot.primitives().is_some() && slot.config().is_some() {
            Some(BusHandle::new(self, bus))
        } else {
            None
        }
    }

    /// Interrupt dispatch for `bus`. Call from that bus's interrupt handler only.
    pub fn on_interrupt(&self, bus: BusId) {
        let slot = self.slot(bus);
        interrupt::service(&self.platform, bus, slot.completion(), slot.semaphore());
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn logger(&self) -> &L {
        &self.logger
    }

    pub(crate) fn slot(&self, bus: BusId) -> &BusSlot<P> {
        let [i2c0, i2c1] = &self.slots;
        match bus {
            BusId::I2c0 => i2c0,
            BusId::I2c1 => i2c1,
        }
    }
}

/// Declares a `static` [`BusRegistry`] and the two interrupt handlers bound to it.
///
/// ```rust,ignore
/// i2c_dma_registry!(pub I2C, Board, Board::new());
/// i2c_dma_registry!(I2C_LOGGED, Board, Board::new(), DefmtLogger, DefmtLogger);
/// ```
///
/// The handlers are named `<name>_i2c0_irq` and `<name>_i2c1_irq` in lower case.
#[macro_export]
macro_rules! i2c_dma_registry {
    ($vis:vis $name:ident, $platform:ty, $init:expr) => {
        $crate::i2c_dma_registry!(
            $vis $name,
            $platform,
            $init,
            $crate::common::NoOpLogger,
            $crate::common::NoOpLogger
        );
    };
    ($vis:vis $name:ident, $platform:ty, $init:expr, $logger:ty, $logger_init:expr) => {
        $crate::__private::paste! {
            $vis static $name: $crate::i2c::BusRegistry<$platform, $logger> =
                $crate::i2c::BusRegistry::new(
                    $init,
                    $logger_init,
                    [[<$name:lower _i2c0_irq>], [<$name:lower _i2c1_irq>]],
                );

            fn [<$name:lower _i2c0_irq>]() {
                $name.on_interrupt($crate::i2c::BusId::I2c0);
            }

            fn [<$name:lower _i2c1_irq>]() {
                $name.on_interrupt($crate::i2c::BusId::I2c1);
            }
        }
    };
}
