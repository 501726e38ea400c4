//! Bootloader-managed application image backend
//!
//! Images carry the MCUboot header: a little-endian magic at offset 0
//! followed by load address, header size and image size. The image is
//! streamed into the secondary slot and marked pending on completion; the
//! bootloader performs the swap on next boot.

use dfu_core::{BackendError, BackendResult, DfuBackend, DfuCallback, DfuEvent};
use tracing::{debug, info};

use crate::flash::FlashArea;
use crate::transfer::Transfer;

/// MCUboot image header magic (little-endian at offset 0)
pub const MCUBOOT_MAGIC: u32 = 0x96f3_b83d;
/// Size of the MCUboot image header
pub const MCUBOOT_HEADER_SIZE: usize = 32;

/// Backend writing MCUboot images to a secondary flash slot
#[derive(Debug)]
pub struct McubootBackend {
    slot: FlashArea,
    transfer: Option<Transfer>,
}

impl McubootBackend {
    /// Create a backend writing to `slot`
    pub fn new(slot: FlashArea) -> Self {
        Self {
            slot,
            transfer: None,
        }
    }

    /// Secondary slot this backend writes to
    pub fn slot(&self) -> &FlashArea {
        &self.slot
    }

    /// Build an MCUboot image: header followed by `payload`
    pub fn build_image(payload: &[u8]) -> Vec<u8> {
        let mut image = Vec::with_capacity(MCUBOOT_HEADER_SIZE + payload.len());
        image.extend_from_slice(&MCUBOOT_MAGIC.to_le_bytes());
        // ih_load_addr
        image.extend_from_slice(&0u32.to_le_bytes());
        // ih_hdr_size
        image.extend_from_slice(&(MCUBOOT_HEADER_SIZE as u16).to_le_bytes());
        // ih_protect_tlv_size
        image.extend_from_slice(&0u16.to_le_bytes());
        // ih_img_size
        image.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        image.resize(MCUBOOT_HEADER_SIZE, 0);
        image.extend_from_slice(payload);
        image
    }

    fn transfer_mut(&mut self) -> BackendResult<&mut Transfer> {
        self.transfer
            .as_mut()
            .ok_or_else(|| BackendError::NotReady("mcuboot target not initialized".to_string()))
    }
}

fn has_magic(buf: &[u8]) -> bool {
    buf.get(..4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        == Some(MCUBOOT_MAGIC)
}

impl DfuBackend for McubootBackend {
    fn identify(&self, buf: &[u8]) -> bool {
        has_magic(buf)
    }

    fn init(&mut self, file_size: usize, callback: DfuCallback) -> BackendResult<()> {
        let capacity = self.slot.capacity();
        if file_size > capacity {
            return Err(BackendError::NoSpace {
                need: file_size,
                available: capacity,
            });
        }

        self.slot.erase();
        let mut transfer = Transfer::new(file_size, callback);
        transfer.notify(DfuEvent::EraseDone);
        self.transfer = Some(transfer);
        debug!(file_size, "MCUboot slot erased");
        Ok(())
    }

    fn offset_get(&self) -> BackendResult<usize> {
        self.transfer
            .as_ref()
            .map(Transfer::offset)
            .ok_or_else(|| BackendError::NotReady("mcuboot target not initialized".to_string()))
    }

    fn write(&mut self, buf: &[u8]) -> BackendResult<()> {
        let slot = self.slot.clone();
        let transfer = self.transfer_mut()?;
        transfer.check(buf.len())?;
        slot.write_at(transfer.offset(), buf)?;
        transfer.advance(buf.len());
        Ok(())
    }

    fn done(&mut self, successful: bool) -> BackendResult<()> {
        if !successful {
            // Written data stays in the slot so the transfer can resume
            debug!("MCUboot transfer stopped");
            return Ok(());
        }

        let transfer = self.transfer_mut()?;
        if !transfer.is_complete() {
            return Err(transfer.incomplete());
        }
        if !has_magic(&self.slot.contents()) {
            return Err(BackendError::InvalidImage(
                "missing MCUboot header magic".to_string(),
            ));
        }
        self.slot.mark_pending();
        self.transfer = None;
        info!("MCUboot image marked for swap on next boot");
        Ok(())
    }
}
