// Licensed under the Apache-2.0 license

//! Interrupt-side completion signalling.
//!
//! The ISR and the waiting task share one [`CompletionEvent`] per bus. The ISR only
//! sets bits; the task clears the event before arming a transfer and reads it only
//! after its semaphore wait has returned.

use portable_atomic::{AtomicU8, Ordering};

use crate::i2c::common::{BusId, Error, INTR_STAT_STOP_DET, INTR_STAT_TX_ABRT};
use crate::i2c::traits::{BinarySemaphore, I2cRegisters, TaskRuntime};

const STOP_DETECTED: u8 = 1 << 0;
const ABORT_DETECTED: u8 = 1 << 1;

/// Stop/abort flags latched by the ISR for the transfer in flight.
pub struct CompletionEvent(AtomicU8);

/// Point-in-time copy of a [`CompletionEvent`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CompletionSnapshot {
    pub stopped: bool,
    pub aborted: bool,
}

impl CompletionEvent {
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::Release);
    }

    fn record(&self, bits: u8) {
        self.0.fetch_or(bits, Ordering::Release);
    }

    #[must_use]
    pub fn snapshot(&self) -> CompletionSnapshot {
        let bits = self.0.load(Ordering::Acquire);
        CompletionSnapshot {
            stopped: bits & STOP_DETECTED != 0,
            aborted: bits & ABORT_DETECTED != 0,
        }
    }
}

impl Default for CompletionEvent {
    fn default() -> Self {
        Self::new()
    }
}

/// Interrupt body for one bus.
///
/// Abort and stop are handled independently. Both can already be latched in the
/// same status read when an abort hits the first transfer after reset.
pub fn service<P>(
    platform: &P,
    bus: BusId,
    event: &CompletionEvent,
    semaphore: Option<&P::Semaphore>,
) where
    P: I2cRegisters + TaskRuntime + ?Sized,
{
    let status = platform.interrupt_status(bus);

    if status & INTR_STAT_TX_ABRT != 0 {
        platform.clear_tx_abort(bus);
        event.record(ABORT_DETECTED);
    }

    if status & INTR_STAT_STOP_DET != 0 {
        platform.clear_stop_detected(bus);
        event.record(STOP_DETECTED);
        if let Some(semaphore) = semaphore {
            let woken = semaphore.give_from_isr();
            platform.yield_from_isr(woken);
        }
    }
}

/// Classifies a finished wait.
///
/// # Errors
///
/// `Timeout` if the wait expired, `Io` if the controller aborted or never
/// reported its STOP.
pub fn classify(completed: bool, snapshot: CompletionSnapshot) -> Result<(), Error> {
    if !completed {
        Err(Error::Timeout)
    } else if snapshot.aborted || !snapshot.stopped {
        Err(Error::Io)
    } else {
        Ok(())
    }
}
