// Licensed under the Apache-2.0 license

//! DMA channel acquisition and programming for one transfer.
//!
//! A transaction uses up to two channels from the shared pool:
//! - TX: command buffer to `IC_DATA_CMD`, half-word wide, paced by the TX DREQ.
//!   Triggering this channel is what actually drives the bus.
//! - RX: `IC_DATA_CMD` to the caller's read buffer, byte wide, paced by the RX
//!   DREQ. Armed before TX so no received byte is missed.

use core::sync::atomic::{compiler_fence, Ordering};

use crate::i2c::common::{BusId, Direction};
use crate::i2c::traits::{DmaController, I2cRegisters};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferSize {
    Byte,
    HalfWord,
}

/// Channel programming for one transfer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChannelConfig {
    pub read_addr: usize,
    pub write_addr: usize,
    pub transfer_count: u32,
    pub size: TransferSize,
    pub read_increment: bool,
    pub write_increment: bool,
    pub dreq: u8,
}

/// A channel claimed from the pool, returned to it on drop.
pub struct ClaimedChannel<'a, D: DmaController + ?Sized> {
    dma: &'a D,
    channel: D::Channel,
}

impl<'a, D: DmaController + ?Sized> ClaimedChannel<'a, D> {
    /// Claims a free channel, or `None` if the pool is exhausted.
    pub fn claim(dma: &'a D) -> Option<Self> {
        dma.claim_unused_channel()
            .map(|channel| Self { dma, channel })
    }

    #[must_use]
    pub fn channel(&self) -> D::Channel {
        self.channel
    }

    pub fn abort(&self) {
        self.dma.abort_channel(self.channel);
    }
}

impl<D: DmaController + ?Sized> Drop for ClaimedChannel<'_, D> {
    fn drop(&mut self) {
        self.dma.unclaim_channel(self.channel);
    }
}

/// Arms `channel` to drain the controller's RX FIFO into `rbuf`.
///
/// The channel is triggered immediately but only moves a byte each time the
/// controller raises its RX DREQ.
pub fn start_rx<P>(platform: &P, channel: P::Channel, bus: BusId, rbuf: &mut [u8])
where
    P: DmaController + I2cRegisters + ?Sized,
{
    let config = ChannelConfig {
        read_addr: platform.data_cmd_address(bus),
        write_addr: rbuf.as_mut_ptr() as usize,
        transfer_count: transfer_count(rbuf.len()),
        size: TransferSize::Byte,
        read_increment: false,
        write_increment: true,
        dreq: platform.dreq(bus, Direction::Receive),
    };
    compiler_fence(Ordering::SeqCst);
    platform.configure_channel(channel, &config, true);
}

/// Starts `channel` feeding `commands` to `IC_DATA_CMD`.
pub fn start_tx<P>(platform: &P, channel: P::Channel, bus: BusId, commands: &[u16])
where
    P: DmaController + I2cRegisters + ?Sized,
{
    let config = ChannelConfig {
        read_addr: commands.as_ptr() as usize,
        write_addr: platform.data_cmd_address(bus),
        transfer_count: transfer_count(commands.len()),
        size: TransferSize::HalfWord,
        read_increment: true,
        write_increment: false,
        dreq: platform.dreq(bus, Direction::Transmit),
    };
    // The command words must be in memory before the engine reads them.
    compiler_fence(Ordering::SeqCst);
    platform.configure_channel(channel, &config, true);
}

fn transfer_count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}
