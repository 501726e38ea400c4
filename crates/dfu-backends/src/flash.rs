//! Simulated flash area
//!
//! A fixed-capacity region written strictly sequentially after an erase,
//! the way a stream-flash writer fills a secondary image slot. Cloning a
//! [`FlashArea`] yields another handle to the same storage.

use std::sync::Arc;

use dfu_core::{BackendError, BackendResult};
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct FlashInner {
    capacity: usize,
    data: Vec<u8>,
    pending: bool,
    erase_count: usize,
}

/// Handle to a simulated flash slot
#[derive(Debug, Clone)]
pub struct FlashArea {
    inner: Arc<Mutex<FlashInner>>,
}

impl FlashArea {
    /// Create an erased area of `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FlashInner {
                capacity,
                ..FlashInner::default()
            })),
        }
    }

    /// Total size of the area
    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    /// Bytes written since the last erase
    pub fn len(&self) -> usize {
        self.inner.lock().data.len()
    }

    /// Whether nothing was written since the last erase
    pub fn is_empty(&self) -> bool {
        self.inner.lock().data.is_empty()
    }

    /// Erase the whole area and drop any pending-image mark
    pub fn erase(&self) {
        let mut inner = self.inner.lock();
        inner.data.clear();
        inner.pending = false;
        inner.erase_count += 1;
    }

    /// Number of erases performed
    pub fn erase_count(&self) -> usize {
        self.inner.lock().erase_count
    }

    /// Write `buf` at `offset`, which must be the current end of data
    pub fn write_at(&self, offset: usize, buf: &[u8]) -> BackendResult<()> {
        let mut inner = self.inner.lock();
        if offset != inner.data.len() {
            return Err(BackendError::Io(format!(
                "non-sequential flash write at {} (written {})",
                offset,
                inner.data.len()
            )));
        }
        let need = offset.saturating_add(buf.len());
        if need > inner.capacity {
            return Err(BackendError::NoSpace {
                need,
                available: inner.capacity,
            });
        }
        inner.data.extend_from_slice(buf);
        Ok(())
    }

    /// Copy of the written bytes
    pub fn contents(&self) -> Vec<u8> {
        self.inner.lock().data.clone()
    }

    /// Mark the stored image as ready for the bootloader to pick up
    pub fn mark_pending(&self) {
        self.inner.lock().pending = true;
    }

    /// Whether the stored image is marked ready
    pub fn is_pending(&self) -> bool {
        self.inner.lock().pending
    }
}
