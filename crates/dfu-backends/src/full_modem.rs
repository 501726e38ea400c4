//! Full modem firmware image backend
//!
//! # Layout
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  Vendor preamble (16 bytes)         │  offset 0
//! ├─────────────────────────────────────┤
//! │  Signature "MODEMFW\0" (8 bytes)    │  offset 16
//! ├─────────────────────────────────────┤
//! │  CRC-32 of payload (4 bytes, LE)    │  offset 24
//! │  Payload length (4 bytes, LE)       │  offset 28
//! ├─────────────────────────────────────┤
//! │  Payload (variable)                 │  offset 32
//! └─────────────────────────────────────┘
//! ```
//!
//! The signature sits past the first bytes, so a short prefix cannot be
//! told apart from other data.

use crc::{Crc, CRC_32_ISO_HDLC};
use dfu_core::{BackendError, BackendResult, DfuBackend, DfuCallback, DfuEvent};
use tracing::{debug, info};

use crate::flash::FlashArea;
use crate::transfer::Transfer;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Image signature
pub const FULL_MODEM_SIGNATURE: &[u8; 8] = b"MODEMFW\0";
/// Offset of the signature
pub const FULL_MODEM_SIGNATURE_OFFSET: usize = 16;
/// Offset of the payload CRC
pub const FULL_MODEM_CRC_OFFSET: usize = 24;
/// Offset of the payload length
pub const FULL_MODEM_LEN_OFFSET: usize = 28;
/// Header size; payload starts here
pub const FULL_MODEM_HEADER_SIZE: usize = 32;

/// A full modem image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullModemImage {
    /// Modem firmware payload
    pub payload: Vec<u8>,
}

impl FullModemImage {
    /// Wrap a payload
    pub fn new(payload: &[u8]) -> Self {
        Self {
            payload: payload.to_vec(),
        }
    }

    /// Serialize to the binary layout
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FULL_MODEM_HEADER_SIZE + self.payload.len());
        buf.resize(FULL_MODEM_SIGNATURE_OFFSET, 0xFF);
        buf.extend_from_slice(FULL_MODEM_SIGNATURE);
        buf.extend_from_slice(&CRC32.checksum(&self.payload).to_le_bytes());
        buf.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Parse and check length and CRC
    pub fn from_bytes(data: &[u8]) -> BackendResult<Self> {
        let signature = data.get(FULL_MODEM_SIGNATURE_OFFSET..FULL_MODEM_CRC_OFFSET);
        if signature != Some(FULL_MODEM_SIGNATURE.as_slice()) {
            return Err(BackendError::InvalidImage(
                "missing full modem signature".to_string(),
            ));
        }

        let expected_crc = read_u32(data, FULL_MODEM_CRC_OFFSET)?;
        let len = read_u32(data, FULL_MODEM_LEN_OFFSET)? as usize;
        let payload = data.get(FULL_MODEM_HEADER_SIZE..).unwrap_or_default();
        if payload.len() != len {
            return Err(BackendError::Verification(format!(
                "payload length {} does not match header ({})",
                payload.len(),
                len
            )));
        }

        let actual_crc = CRC32.checksum(payload);
        if actual_crc != expected_crc {
            return Err(BackendError::Verification(format!(
                "CRC mismatch: expected {:08x}, got {:08x}",
                expected_crc, actual_crc
            )));
        }

        Ok(Self::new(payload))
    }
}

fn read_u32(data: &[u8], offset: usize) -> BackendResult<u32> {
    data.get(offset..offset + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| BackendError::InvalidImage("truncated full modem header".to_string()))
}

/// Backend writing full modem images to external flash
#[derive(Debug)]
pub struct FullModemBackend {
    flash: FlashArea,
    transfer: Option<Transfer>,
}

impl FullModemBackend {
    /// Create a backend writing to `flash`
    pub fn new(flash: FlashArea) -> Self {
        Self {
            flash,
            transfer: None,
        }
    }

    /// Flash area this backend writes to
    pub fn flash(&self) -> &FlashArea {
        &self.flash
    }

    fn transfer_mut(&mut self) -> BackendResult<&mut Transfer> {
        self.transfer.as_mut().ok_or_else(|| {
            BackendError::NotReady("full modem target not initialized".to_string())
        })
    }
}

impl DfuBackend for FullModemBackend {
    fn identify(&self, buf: &[u8]) -> bool {
        buf.get(FULL_MODEM_SIGNATURE_OFFSET..FULL_MODEM_CRC_OFFSET)
            == Some(FULL_MODEM_SIGNATURE.as_slice())
    }

    fn init(&mut self, file_size: usize, callback: DfuCallback) -> BackendResult<()> {
        let capacity = self.flash.capacity();
        if file_size > capacity {
            return Err(BackendError::NoSpace {
                need: file_size,
                available: capacity,
            });
        }

        let mut transfer = Transfer::new(file_size, callback);
        transfer.notify(DfuEvent::ErasePending);
        self.flash.erase();
        transfer.notify(DfuEvent::EraseDone);
        self.transfer = Some(transfer);
        debug!(file_size, "Full modem flash erased");
        Ok(())
    }

    fn offset_get(&self) -> BackendResult<usize> {
        self.transfer.as_ref().map(Transfer::offset).ok_or_else(|| {
            BackendError::NotReady("full modem target not initialized".to_string())
        })
    }

    fn write(&mut self, buf: &[u8]) -> BackendResult<()> {
        let flash = self.flash.clone();
        let transfer = self.transfer_mut()?;
        transfer.check(buf.len())?;
        flash.write_at(transfer.offset(), buf)?;
        transfer.advance(buf.len());
        Ok(())
    }

    fn done(&mut self, successful: bool) -> BackendResult<()> {
        if !successful {
            debug!("Full modem transfer stopped");
            return Ok(());
        }

        let transfer = self.transfer_mut()?;
        if !transfer.is_complete() {
            return Err(transfer.incomplete());
        }
        let image = FullModemImage::from_bytes(&self.flash.contents())?;
        self.flash.mark_pending();
        self.transfer = None;
        info!(payload_len = image.payload.len(), "Full modem image verified");
        Ok(())
    }
}
