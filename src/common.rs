// Licensed under the Apache-2.0 license

//! Crate-wide logging hooks.
//!
//! Drivers take a `Logger` type parameter so that the logging backend is chosen by
//! the firmware image rather than by this crate. `NoOpLogger` compiles away entirely;
//! `DefmtLogger` forwards to `defmt` when the `defmt` feature is enabled.
//!
//! Nothing in interrupt context logs. Only task-context paths (init, recovery,
//! transaction classification) call into the logger.

use core::fmt::Arguments;

/// Sink for driver diagnostics.
pub trait Logger {
    fn debug(&self, args: Arguments<'_>);
    fn warn(&self, args: Arguments<'_>);
    fn error(&self, args: Arguments<'_>);
}

/// Logger that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpLogger;

impl Logger for NoOpLogger {
    #[inline]
    fn debug(&self, _args: Arguments<'_>) {}
    #[inline]
    fn warn(&self, _args: Arguments<'_>) {}
    #[inline]
    fn error(&self, _args: Arguments<'_>) {}
}

/// Logger backed by the `defmt` global logger.
#[cfg(feature = "defmt")]
#[derive(Clone, Copy, Debug, Default)]
pub struct DefmtLogger;

#[cfg(feature = "defmt")]
impl Logger for DefmtLogger {
    fn debug(&self, args: Arguments<'_>) {
        defmt::debug!("{}", defmt::Display2Format(&args));
    }

    fn warn(&self, args: Arguments<'_>) {
        defmt::warn!("{}", defmt::Display2Format(&args));
    }

    fn error(&self, args: Arguments<'_>) {
        defmt::error!("{}", defmt::Display2Format(&args));
    }
}
