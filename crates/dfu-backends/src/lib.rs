//! dfu-backends - Reference DFU backends
//!
//! In-memory implementations of the four image formats the target router
//! knows about, plus the configuration that decides which of them are
//! registered and in what order.
//!
//! # Modules
//!
//! - [`mcuboot`] - Bootloader-managed application image
//! - [`modem_delta`] - Modem delta patch streamed over a modem DFU channel
//! - [`full_modem`] - Full modem firmware image with CRC-32 check
//! - [`application`] - Plain application image with SHA-256 footer
//! - [`flash`] - Simulated flash area shared by the storage backends
//! - [`backend`] - [`Backend`] enum dispatch and registry assembly
//! - [`config`] - TOML configuration

pub mod application;
pub mod backend;
pub mod config;
pub mod flash;
pub mod full_modem;
pub mod mcuboot;
pub mod modem_delta;
mod transfer;

pub use application::{AppImage, AppImageError, ApplicationBackend};
pub use backend::{build_registry, build_router, Backend};
pub use config::{ConfigError, DfuConfig, ModemConfig, RegistryConfig, SlotConfig};
pub use flash::FlashArea;
pub use full_modem::{FullModemBackend, FullModemImage};
pub use mcuboot::McubootBackend;
pub use modem_delta::{ModemChannel, ModemDeltaBackend};

// Re-export for convenience
pub use dfu_core::{BackendError, BackendResult, DfuBackend, DfuCallback, DfuEvent, ImageType};
pub use dfu_target::{BackendRegistry, RouterConfig, TargetRouter};
