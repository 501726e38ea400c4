//! DfuBackend trait - the contract every image format backend implements

use crate::error::BackendResult;

/// Event reported by a backend through the callback supplied to `init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DfuEvent {
    /// Storage erase is still running; writes may stall until it finishes
    ErasePending,
    /// Storage is erased and ready to accept data
    EraseDone,
    /// Backend gave up waiting on an external resource
    Timeout,
    /// Bytes accepted so far out of the announced image size
    Progress { offset: usize, total: usize },
}

/// Event sink handed to a backend on `init`.
///
/// The router passes it through and never calls it. The backend owns it
/// until the next `init`.
pub type DfuCallback = Box<dyn FnMut(DfuEvent) + Send>;

/// A callback that ignores every event.
pub fn noop_callback() -> DfuCallback {
    Box::new(|_| {})
}

/// Capability set of a firmware image backend.
///
/// # Lifecycle
///
/// ```text
/// identify() ──► init() ──► write()* / offset_get() ──► done(true)
///                  ▲                                      │
///                  │              done(false)             ▼
///                  └──────── (resume or re-init) ◄─── committed
/// ```
///
/// `done` must be safe to call once per init cycle. Backends own every
/// resource they open in `init`; callers only ever hold the selection.
pub trait DfuBackend {
    /// Whether `buf` starts with this backend's image format.
    ///
    /// Pure predicate. `buf` may be shorter than the header, in which case
    /// the answer must be `false` rather than a panic.
    fn identify(&self, buf: &[u8]) -> bool;

    /// Prepare to receive an image of `file_size` bytes.
    fn init(&mut self, file_size: usize, callback: DfuCallback) -> BackendResult<()>;

    /// Current write offset within the image.
    fn offset_get(&self) -> BackendResult<usize>;

    /// Consume `buf` at the current offset.
    fn write(&mut self, buf: &[u8]) -> BackendResult<()>;

    /// Commit (`successful == true`) or abort the transfer.
    fn done(&mut self, successful: bool) -> BackendResult<()>;
}

impl<B: DfuBackend + ?Sized> DfuBackend for Box<B> {
    fn identify(&self, buf: &[u8]) -> bool {
        (**self).identify(buf)
    }

    fn init(&mut self, file_size: usize, callback: DfuCallback) -> BackendResult<()> {
        (**self).init(file_size, callback)
    }

    fn offset_get(&self) -> BackendResult<usize> {
        (**self).offset_get()
    }

    fn write(&mut self, buf: &[u8]) -> BackendResult<()> {
        (**self).write(buf)
    }

    fn done(&mut self, successful: bool) -> BackendResult<()> {
        (**self).done(successful)
    }
}
