//! dfu-target - Routing layer of the device firmware update pipeline
//!
//! The [`TargetRouter`] owns a fixed, ordered [`BackendRegistry`] and at most
//! one active backend. It identifies which backend an incoming image belongs
//! to, initializes that backend, and forwards offset queries, writes and
//! completion to it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    DFU session driver                        │
//! └───────────────────────────┬──────────────────────────────────┘
//!                             │ identify / init / offset_get /
//!                             │ write / done / reset
//! ┌───────────────────────────▼──────────────────────────────────┐
//! │                      TargetRouter                            │
//! │  - current_target: none | one registry slot                  │
//! │  - ambiguity + need-more-data detection                      │
//! │  - idempotent re-init, precondition checks                   │
//! └───────────────────────────┬──────────────────────────────────┘
//!                             │
//!        ┌──────────────┬─────┴────────┬──────────────┐
//!        ▼              ▼              ▼              ▼
//!  ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌─────────────┐
//!  │  mcuboot  │  │modem_delta│  │full_modem │  │ application │
//!  └───────────┘  └───────────┘  └───────────┘  └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use dfu_target::TargetRouter;
//!
//! let mut router = TargetRouter::new(registry);
//!
//! let image_type = router.identify(&first_chunk)?;
//! router.init(image_type, file_size, Box::new(|evt| println!("{evt:?}")))?;
//! router.write(&first_chunk)?;
//! // ...
//! router.done(true)?;
//! ```

pub mod config;
pub mod registry;
mod router;

pub use config::{InitFailurePolicy, RouterConfig, MIN_IDENTIFY_LEN};
pub use registry::{BackendDescriptor, BackendRegistry, RegistryError};
pub use router::TargetRouter;

// Re-export core types for convenience
pub use dfu_core::{
    BackendError, DfuBackend, DfuCallback, DfuError, DfuErrorKind, DfuEvent, DfuResult, ImageType,
};
