//! Plain application image backend
//!
//! Container layout, all offsets from the start of the image:
//!
//! | offset        | size | content                                  |
//! |---------------|------|------------------------------------------|
//! | 0             | 10   | `DFU_APPIMG`                             |
//! | 10            | 32   | version, zero filled                     |
//! | 42            | n    | payload                                  |
//! | 42 + n        | 32   | SHA-256 of everything before it          |
//! | 74 + n        | 10   | `APPIMG_END`                             |
//!
//! # Example
//!
//! ```rust
//! use dfu_backends::application::AppImage;
//!
//! let bytes = AppImage::build("v2.0.0", &[0xAA; 1024]).to_bytes();
//! let version = AppImage::verify_bytes(&bytes).unwrap();
//! assert_eq!(version, "v2.0.0");
//! ```

use dfu_core::{BackendError, BackendResult, DfuBackend, DfuCallback, DfuEvent};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use crate::flash::FlashArea;
use crate::transfer::Transfer;

/// Leading magic, also what `identify` matches on
pub const APP_HEADER_MAGIC: &[u8] = b"DFU_APPIMG";
/// Trailing magic
pub const APP_FOOTER_MAGIC: &[u8] = b"APPIMG_END";

pub const APP_VERSION_OFFSET: usize = APP_HEADER_MAGIC.len();
/// Version field width, zero filled
pub const APP_VERSION_LENGTH: usize = 32;
pub const APP_DATA_OFFSET: usize = APP_VERSION_OFFSET + APP_VERSION_LENGTH;

const DIGEST_LEN: usize = 32;

/// Digest plus trailing magic
pub const APP_FOOTER_SIZE: usize = DIGEST_LEN + APP_FOOTER_MAGIC.len();
/// An image with no payload
pub const APP_MIN_SIZE: usize = APP_DATA_OFFSET + APP_FOOTER_SIZE;

/// Reasons an application image is rejected
#[derive(Debug, Error)]
pub enum AppImageError {
    #[error("application image of {got} bytes is below the {need} byte minimum")]
    TooSmall { need: usize, got: usize },

    #[error("application header magic missing")]
    BadHeaderMagic,

    #[error("application footer magic missing")]
    BadFooterMagic,

    #[error("application digest {got} does not match stored {expected}")]
    ChecksumMismatch { expected: String, got: String },

    #[error("application version is empty")]
    EmptyVersion,

    #[error("application version is not UTF-8: {0}")]
    VersionEncoding(#[from] std::str::Utf8Error),
}

pub type AppImageResult<T> = Result<T, AppImageError>;

impl From<AppImageError> for BackendError {
    fn from(err: AppImageError) -> Self {
        match err {
            AppImageError::BadHeaderMagic => BackendError::InvalidImage(err.to_string()),
            other => BackendError::Verification(other.to_string()),
        }
    }
}

/// Application version and payload, independent of the container bytes
#[derive(Debug, Clone)]
pub struct AppImage {
    pub version: String,
    pub data: Vec<u8>,
}

impl AppImage {
    pub fn build(version: &str, data: &[u8]) -> Self {
        Self {
            version: version.to_string(),
            data: data.to_vec(),
        }
    }

    /// Encode as header, version, payload, digest, footer.
    ///
    /// A version longer than [`APP_VERSION_LENGTH`] is cut off.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut version = self.version.as_bytes().to_vec();
        version.resize(APP_VERSION_LENGTH, 0);

        let mut buf = Vec::with_capacity(APP_MIN_SIZE + self.data.len());
        buf.extend_from_slice(APP_HEADER_MAGIC);
        buf.extend_from_slice(&version);
        buf.extend_from_slice(&self.data);
        let digest = Sha256::digest(&buf);
        buf.extend_from_slice(&digest);
        buf.extend_from_slice(APP_FOOTER_MAGIC);
        buf
    }

    /// Validate a complete image and return its version
    pub fn verify_bytes(data: &[u8]) -> AppImageResult<String> {
        if data.len() < APP_MIN_SIZE {
            return Err(AppImageError::TooSmall {
                need: APP_MIN_SIZE,
                got: data.len(),
            });
        }
        if !data.starts_with(APP_HEADER_MAGIC) {
            return Err(AppImageError::BadHeaderMagic);
        }
        if !data.ends_with(APP_FOOTER_MAGIC) {
            return Err(AppImageError::BadFooterMagic);
        }

        let (body, footer) = data.split_at(data.len() - APP_FOOTER_SIZE);
        let stored = footer.get(..DIGEST_LEN).unwrap_or_default();
        let computed = Sha256::digest(body);
        if computed.as_slice() != stored {
            return Err(AppImageError::ChecksumMismatch {
                expected: hex::encode(stored),
                got: hex::encode(computed),
            });
        }

        let field = body
            .get(APP_VERSION_OFFSET..APP_DATA_OFFSET)
            .unwrap_or_default();
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        let version = std::str::from_utf8(field.get(..end).unwrap_or_default())?;
        if version.is_empty() {
            return Err(AppImageError::EmptyVersion);
        }
        Ok(version.to_string())
    }
}

/// Backend writing application images to a flash slot
#[derive(Debug)]
pub struct ApplicationBackend {
    slot: FlashArea,
    transfer: Option<Transfer>,
    installed_version: Option<String>,
}

impl ApplicationBackend {
    /// Create a backend writing to `slot`
    pub fn new(slot: FlashArea) -> Self {
        Self {
            slot,
            transfer: None,
            installed_version: None,
        }
    }

    /// Flash slot this backend writes to
    pub fn slot(&self) -> &FlashArea {
        &self.slot
    }

    /// Version of the last image committed through this backend
    pub fn installed_version(&self) -> Option<&str> {
        self.installed_version.as_deref()
    }

    fn transfer_mut(&mut self) -> BackendResult<&mut Transfer> {
        self.transfer.as_mut().ok_or_else(|| {
            BackendError::NotReady("application target not initialized".to_string())
        })
    }
}

impl DfuBackend for ApplicationBackend {
    fn identify(&self, buf: &[u8]) -> bool {
        buf.starts_with(APP_HEADER_MAGIC)
    }

    fn init(&mut self, file_size: usize, callback: DfuCallback) -> BackendResult<()> {
        if file_size < APP_MIN_SIZE {
            return Err(AppImageError::TooSmall {
                need: APP_MIN_SIZE,
                got: file_size,
            }
            .into());
        }
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
        debug!(file_size, "Application slot erased");
        Ok(())
    }

    fn offset_get(&self) -> BackendResult<usize> {
        self.transfer.as_ref().map(Transfer::offset).ok_or_else(|| {
            BackendError::NotReady("application target not initialized".to_string())
        })
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
            debug!("Application transfer stopped");
            return Ok(());
        }

        let transfer = self.transfer_mut()?;
        if !transfer.is_complete() {
            return Err(transfer.incomplete());
        }
        let version = AppImage::verify_bytes(&self.slot.contents())?;
        self.slot.mark_pending();
        self.transfer = None;
        info!(%version, "Application image verified");
        self.installed_version = Some(version);
        Ok(())
    }
}
