//! dfu-core - Core traits and types for DFU target backends
//!
//! This crate provides the contract that every firmware image backend
//! (bootloader image, modem delta, full modem, application image) implements
//! so the target router can select and drive it.

pub mod backend;
pub mod error;
pub mod image;

pub use backend::{noop_callback, DfuBackend, DfuCallback, DfuEvent};
pub use error::{BackendError, BackendResult, DfuError, DfuErrorKind, DfuResult};
pub use image::ImageType;
