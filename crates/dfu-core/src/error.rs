//! Error types for DFU backends and the target router

use thiserror::Error;

use crate::image::ImageType;

/// Errno values used by the device's C-facing DFU API (Zephyr numbering).
pub mod errno {
    pub const EIO: i32 = 5;
    pub const EAGAIN: i32 = 11;
    pub const EACCES: i32 = 13;
    pub const EBUSY: i32 = 16;
    pub const EINVAL: i32 = 22;
    pub const ENOSPC: i32 = 28;
    pub const EPIPE: i32 = 32;
    pub const EBADMSG: i32 = 77;
    pub const ENOTSUP: i32 = 134;
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors raised by an individual image backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Storage read/write failure
    #[error("I/O error: {0}")]
    Io(String),

    /// Image data does not follow the backend's format
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Image does not fit in the target storage
    #[error("Not enough space: need {need} bytes, have {available}")]
    NoSpace { need: usize, available: usize },

    /// External channel (e.g. modem DFU socket) is not open
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// Backend cannot accept the request right now
    #[error("Backend busy: {0}")]
    Busy(String),

    /// Operation called before the backend was initialized
    #[error("Backend not ready: {0}")]
    NotReady(String),

    /// Image integrity check failed on completion
    #[error("Verification failed: {0}")]
    Verification(String),

    /// Backend-specific failure with a raw negative code
    #[error("Backend error {code}: {message}")]
    Other { code: i32, message: String },
}

impl BackendError {
    /// Negative errno-style code for this error
    pub fn code(&self) -> i32 {
        match self {
            BackendError::Io(_) => -errno::EIO,
            BackendError::InvalidImage(_) => -errno::EINVAL,
            BackendError::NoSpace { .. } => -errno::ENOSPC,
            BackendError::ChannelClosed(_) => -errno::EPIPE,
            BackendError::Busy(_) => -errno::EBUSY,
            BackendError::NotReady(_) => -errno::EACCES,
            BackendError::Verification(_) => -errno::EBADMSG,
            BackendError::Other { code, .. } => *code,
        }
    }
}

/// Result type for router operations
pub type DfuResult<T> = Result<T, DfuError>;

/// Semantic class of a [`DfuError`], for callers that only branch on policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DfuErrorKind {
    /// Configuration defect: several backends claim the same data
    Ambiguous,
    /// Retry identification with a longer prefix
    NeedMoreData,
    /// No backend for this data or image type
    Unsupported,
    /// Call-order bug: no backend is active
    NotInitialized,
    /// The active backend failed
    BackendFailure,
}

/// Errors returned by the target router
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DfuError {
    /// More than one registered backend recognised the buffer
    #[error("Ambiguous image type: matched by {matches:?}")]
    Ambiguous { matches: Vec<ImageType> },

    /// Buffer too short to tell which format it is
    #[error("Need more data to identify image: got {len} bytes, need {min}")]
    NeedMoreData { len: usize, min: usize },

    /// No registered backend recognised the buffer
    #[error("No supported image type found ({len} bytes inspected)")]
    UnsupportedImage { len: usize },

    /// Requested image type has no registered backend
    #[error("Unknown image type: {0}")]
    UnknownImageType(ImageType),

    /// Offset/write/done called with no active backend, or with an empty write
    #[error("Access denied: no DFU target initialized")]
    NotInitialized,

    /// The active backend's own operation failed
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl DfuError {
    /// Semantic class of this error
    pub fn kind(&self) -> DfuErrorKind {
        match self {
            DfuError::Ambiguous { .. } => DfuErrorKind::Ambiguous,
            DfuError::NeedMoreData { .. } => DfuErrorKind::NeedMoreData,
            DfuError::UnsupportedImage { .. } | DfuError::UnknownImageType(_) => {
                DfuErrorKind::Unsupported
            }
            DfuError::NotInitialized => DfuErrorKind::NotInitialized,
            DfuError::Backend(_) => DfuErrorKind::BackendFailure,
        }
    }

    /// Whether the caller should retry the same call with more data
    pub fn is_retryable(&self) -> bool {
        self.kind() == DfuErrorKind::NeedMoreData
    }

    /// Negative errno-style code; backend codes pass through verbatim
    pub fn code(&self) -> i32 {
        match self {
            DfuError::Ambiguous { .. } => -errno::EINVAL,
            DfuError::NeedMoreData { .. } => -errno::EAGAIN,
            DfuError::UnsupportedImage { .. } => -errno::ENOTSUP,
            DfuError::UnknownImageType(_) => -errno::ENOTSUP,
            DfuError::NotInitialized => -errno::EACCES,
            DfuError::Backend(err) => err.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn router_codes_follow_errno_contract() {
        assert_eq!(
            DfuError::Ambiguous {
                matches: vec![ImageType::Mcuboot, ImageType::Application]
            }
            .code(),
            -22
        );
        assert_eq!(DfuError::NeedMoreData { len: 4, min: 32 }.code(), -11);
        assert_eq!(DfuError::UnsupportedImage { len: 64 }.code(), -134);
        assert_eq!(DfuError::UnknownImageType(ImageType::FullModem).code(), -134);
        assert_eq!(DfuError::NotInitialized.code(), -13);
    }

    #[test]
    fn backend_code_passes_through() {
        let err = DfuError::from(BackendError::Other {
            code: -1234,
            message: "modem said no".to_string(),
        });
        assert_eq!(err.code(), -1234);
        assert_eq!(err.kind(), DfuErrorKind::BackendFailure);
        assert_eq!(err.to_string(), "Backend error -1234: modem said no");
    }

    #[test]
    fn only_need_more_data_is_retryable() {
        assert!(DfuError::NeedMoreData { len: 0, min: 32 }.is_retryable());
        assert!(!DfuError::UnsupportedImage { len: 32 }.is_retryable());
        assert!(!DfuError::NotInitialized.is_retryable());
        assert!(!DfuError::Backend(BackendError::Busy("erase".into())).is_retryable());
    }

    #[test]
    fn unsupported_kinds_share_a_class() {
        assert_eq!(
            DfuError::UnsupportedImage { len: 40 }.kind(),
            DfuErrorKind::Unsupported
        );
        assert_eq!(
            DfuError::UnknownImageType(ImageType::Mcuboot).kind(),
            DfuErrorKind::Unsupported
        );
    }

    #[test]
    fn backend_error_codes_are_negative() {
        let errors = [
            BackendError::Io("flash".into()),
            BackendError::InvalidImage("magic".into()),
            BackendError::NoSpace {
                need: 10,
                available: 5,
            },
            BackendError::ChannelClosed("socket".into()),
            BackendError::Busy("erase".into()),
            BackendError::NotReady("init".into()),
            BackendError::Verification("crc".into()),
        ];
        for err in errors {
            assert!(err.code() < 0, "{err} should map to a negative code");
        }
    }
}
