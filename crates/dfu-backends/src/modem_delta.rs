//! Modem delta patch backend
//!
//! Delta patches are not stored by the application. They are streamed to
//! the modem over a dedicated DFU channel; the modem keeps what it has
//! received in its scratch area across channel close/reopen, which is what
//! makes a resumed transfer possible. Aborting closes the channel, so every
//! `init` has to reopen it.

use std::sync::Arc;

use dfu_core::{BackendError, BackendResult, DfuBackend, DfuCallback, DfuEvent};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::transfer::Transfer;

/// Modem delta header magic (little-endian at offset 4)
pub const MODEM_DELTA_MAGIC: u32 = 0x7544_656d;
/// Offset of the magic within the delta header
pub const MODEM_DELTA_MAGIC_OFFSET: usize = 4;

#[derive(Debug, Default)]
struct ChannelState {
    open: bool,
    open_count: usize,
    scratch_capacity: usize,
    scratch: Vec<u8>,
    scheduled: Option<Vec<u8>>,
    fail_open: Option<BackendError>,
}

/// Simulated modem DFU channel
///
/// Cloning yields another handle to the same channel.
#[derive(Debug, Clone)]
pub struct ModemChannel {
    state: Arc<Mutex<ChannelState>>,
}

impl ModemChannel {
    /// Create a closed channel whose modem scratch area holds `scratch_capacity` bytes
    pub fn new(scratch_capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(ChannelState {
                scratch_capacity,
                ..ChannelState::default()
            })),
        }
    }

    /// Open (or reopen) the channel
    pub fn open(&self) -> BackendResult<()> {
        let mut state = self.state.lock();
        if let Some(err) = state.fail_open.clone() {
            return Err(err);
        }
        if state.open {
            warn!("Modem DFU channel already open, reopening");
        }
        state.open = true;
        state.open_count += 1;
        Ok(())
    }

    /// Close the channel; received data stays in the modem
    pub fn close(&self) {
        self.state.lock().open = false;
    }

    /// Whether the channel is open
    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// How many times the channel was opened
    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    /// Size of the modem scratch area
    pub fn scratch_capacity(&self) -> usize {
        self.state.lock().scratch_capacity
    }

    /// Make every following `open` fail with `err` (or succeed again with `None`)
    pub fn set_open_failure(&self, err: Option<BackendError>) {
        self.state.lock().fail_open = err;
    }

    /// Offset the modem reports for the patch it is receiving
    pub fn offset(&self) -> BackendResult<usize> {
        let state = self.state.lock();
        if !state.open {
            return Err(BackendError::ChannelClosed("modem DFU channel".to_string()));
        }
        Ok(state.scratch.len())
    }

    fn send(&self, buf: &[u8]) -> BackendResult<()> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(BackendError::ChannelClosed("modem DFU channel".to_string()));
        }
        let need = state.scratch.len().saturating_add(buf.len());
        if need > state.scratch_capacity {
            return Err(BackendError::NoSpace {
                need,
                available: state.scratch_capacity,
            });
        }
        state.scratch.extend_from_slice(buf);
        Ok(())
    }

    fn erase_scratch(&self) {
        self.state.lock().scratch.clear();
    }

    /// Hand the received patch to the modem for application on next reboot
    fn schedule(&self) -> BackendResult<()> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(BackendError::ChannelClosed("modem DFU channel".to_string()));
        }
        let patch = std::mem::take(&mut state.scratch);
        state.scheduled = Some(patch);
        Ok(())
    }

    /// Patch scheduled for application, if any
    pub fn scheduled_patch(&self) -> Option<Vec<u8>> {
        self.state.lock().scheduled.clone()
    }
}

/// Backend streaming delta patches to the modem
#[derive(Debug)]
pub struct ModemDeltaBackend {
    channel: ModemChannel,
    transfer: Option<Transfer>,
}

impl ModemDeltaBackend {
    /// Create a backend using `channel`
    pub fn new(channel: ModemChannel) -> Self {
        Self {
            channel,
            transfer: None,
        }
    }

    /// Channel this backend talks to
    pub fn channel(&self) -> &ModemChannel {
        &self.channel
    }

    /// Build a delta patch: 8-byte header carrying the magic, then `body`
    pub fn build_patch(body: &[u8]) -> Vec<u8> {
        let mut patch = Vec::with_capacity(8 + body.len());
        patch.extend_from_slice(&0u32.to_le_bytes());
        patch.extend_from_slice(&MODEM_DELTA_MAGIC.to_le_bytes());
        patch.extend_from_slice(body);
        patch
    }

    fn transfer_mut(&mut self) -> BackendResult<&mut Transfer> {
        self.transfer.as_mut().ok_or_else(|| {
            BackendError::NotReady("modem delta target not initialized".to_string())
        })
    }
}

impl DfuBackend for ModemDeltaBackend {
    fn identify(&self, buf: &[u8]) -> bool {
        buf.get(MODEM_DELTA_MAGIC_OFFSET..MODEM_DELTA_MAGIC_OFFSET + 4)
            .and_then(|b| b.try_into().ok())
            .map(u32::from_le_bytes)
            == Some(MODEM_DELTA_MAGIC)
    }

    fn init(&mut self, file_size: usize, mut callback: DfuCallback) -> BackendResult<()> {
        let capacity = self.channel.scratch_capacity();
        if file_size > capacity {
            return Err(BackendError::NoSpace {
                need: file_size,
                available: capacity,
            });
        }

        if let Err(err) = self.channel.open() {
            if matches!(err, BackendError::Busy(_)) {
                warn!(error = %err, "Modem did not release the DFU channel");
                callback(DfuEvent::Timeout);
            }
            return Err(err);
        }
        let offset = self.channel.offset()?;

        // A fresh patch needs the scratch area erased; a partial one resumes.
        let resumable = self
            .transfer
            .as_ref()
            .is_some_and(|t| t.file_size() == file_size && offset > 0);
        if resumable {
            debug!(offset, file_size, "Resuming modem delta transfer");
            self.transfer = Some(Transfer::resume_at(file_size, offset, callback));
        } else {
            callback(DfuEvent::ErasePending);
            self.channel.erase_scratch();
            callback(DfuEvent::EraseDone);
            self.transfer = Some(Transfer::new(file_size, callback));
        }
        Ok(())
    }

    fn offset_get(&self) -> BackendResult<usize> {
        if self.transfer.is_none() {
            return Err(BackendError::NotReady(
                "modem delta target not initialized".to_string(),
            ));
        }
        self.channel.offset()
    }

    fn write(&mut self, buf: &[u8]) -> BackendResult<()> {
        let channel = self.channel.clone();
        let transfer = self.transfer_mut()?;
        transfer.check(buf.len())?;
        channel.send(buf)?;
        transfer.advance(buf.len());
        Ok(())
    }

    fn done(&mut self, successful: bool) -> BackendResult<()> {
        if !successful {
            self.channel.close();
            debug!("Modem DFU channel closed on abort");
            return Ok(());
        }

        let transfer = self.transfer_mut()?;
        if !transfer.is_complete() {
            return Err(transfer.incomplete());
        }
        self.channel.schedule()?;
        self.channel.close();
        self.transfer = None;
        info!("Modem delta patch scheduled, reboot to apply");
        Ok(())
    }
}
