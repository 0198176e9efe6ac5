// Licensed under the Apache-2.0 license

//! Command stream construction for `IC_DATA_CMD`.
//!
//! Every byte moved on the bus costs one 16-bit command word: the low byte carries
//! the data to write (ignored for reads) and the high bits carry the `CMD`, `STOP`
//! and `RESTART` markers. The TX DMA channel feeds these words to the controller.

use crate::i2c::common::{
    Error, DATA_CMD_READ, DATA_CMD_RESTART, DATA_CMD_STOP, MAX_TRANSFER_SIZE,
};

/// Checks a request against the command buffer capacity.
///
/// # Errors
///
/// `InvalidArgument` when nothing would be transferred, or when the transfer
/// does not fit in [`MAX_TRANSFER_SIZE`] command slots.
pub fn validate_lengths(write_len: usize, read_len: usize) -> Result<usize, Error> {
    let total = write_len
        .checked_add(read_len)
        .ok_or(Error::InvalidArgument)?;
    if total == 0 || total > MAX_TRANSFER_SIZE {
        return Err(Error::InvalidArgument);
    }
    Ok(total)
}

/// Fixed-capacity command word buffer, reused by every transaction on a bus.
pub struct CommandBuffer {
    words: [u16; MAX_TRANSFER_SIZE],
}

impl CommandBuffer {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            words: [0; MAX_TRANSFER_SIZE],
        }
    }

    /// Fills the buffer for one transaction and returns the used prefix.
    ///
    /// `writes` are laid back to back as write commands, followed by `read_len` read
    /// commands. The first write slot and the first read slot each get a restart
    /// marker; the final slot gets the stop marker.
    ///
    /// # Errors
    ///
    /// Same conditions as [`validate_lengths`].
    pub fn build<'a, I>(&mut self, writes: I, read_len: usize) -> Result<&[u16], Error>
    where
        I: Iterator<Item = &'a [u8]> + Clone,
    {
        let write_len = writes.clone().map(<[u8]>::len).sum();
        let total = validate_lengths(write_len, read_len)?;

        let used = self
            .words
            .get_mut(..total)
            .ok_or(Error::InvalidArgument)?;
        let (write_slots, read_slots) = used.split_at_mut(write_len);

        for (slot, byte) in write_slots
            .iter_mut()
            .zip(writes.flat_map(|segment| segment.iter()))
        {
            *slot = u16::from(*byte);
        }
        for slot in read_slots.iter_mut() {
            *slot = DATA_CMD_READ;
        }

        if let Some(first) = write_slots.first_mut() {
            *first |= DATA_CMD_RESTART;
        }
        if let Some(first) = read_slots.first_mut() {
            *first |= DATA_CMD_RESTART;
        }
        if let Some(last) = used.last_mut() {
            *last |= DATA_CMD_STOP;
        }

        Ok(used)
    }
}

impl Default for CommandBuffer {
    fn default() -> Self {
        Self::new()
    }
}
