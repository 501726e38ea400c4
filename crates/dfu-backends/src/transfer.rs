//! Bookkeeping shared by the streaming backends

use dfu_core::{BackendError, BackendResult, DfuCallback, DfuEvent};

/// One in-flight image transfer: announced size, bytes accepted, event sink
pub(crate) struct Transfer {
    file_size: usize,
    offset: usize,
    callback: DfuCallback,
}

impl std::fmt::Debug for Transfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transfer")
            .field("file_size", &self.file_size)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

impl Transfer {
    pub(crate) fn new(file_size: usize, callback: DfuCallback) -> Self {
        Self {
            file_size,
            offset: 0,
            callback,
        }
    }

    /// Resume at an offset the storage already holds
    pub(crate) fn resume_at(file_size: usize, offset: usize, callback: DfuCallback) -> Self {
        Self {
            file_size,
            offset: offset.min(file_size),
            callback,
        }
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn file_size(&self) -> usize {
        self.file_size
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.offset == self.file_size
    }

    /// Reject a write of `len` bytes that would run past the announced size
    pub(crate) fn check(&self, len: usize) -> BackendResult<()> {
        let need = self.offset.saturating_add(len);
        if need > self.file_size {
            return Err(BackendError::NoSpace {
                need,
                available: self.file_size,
            });
        }
        Ok(())
    }

    pub(crate) fn advance(&mut self, len: usize) {
        self.offset = self.offset.saturating_add(len);
        let event = DfuEvent::Progress {
            offset: self.offset,
            total: self.file_size,
        };
        (self.callback)(event);
    }

    pub(crate) fn notify(&mut self, event: DfuEvent) {
        (self.callback)(event);
    }

    /// Error for `done(true)` on a transfer that is not complete
    pub(crate) fn incomplete(&self) -> BackendError {
        BackendError::Verification(format!(
            "image incomplete: {} of {} bytes written",
            self.offset, self.file_size
        ))
    }
}
