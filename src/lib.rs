// Licensed under the Apache-2.0 license

// Panic-prone patterns are denied outside of tests
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::indexing_slicing))]
#![cfg_attr(not(test), warn(clippy::expect_used))]
#![cfg_attr(not(test), no_std)]
pub mod common;
pub mod i2c;

#[doc(hidden)]
pub mod __private {
    pub use paste::paste;
}
