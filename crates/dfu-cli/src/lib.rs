//! dfu-cli - DFU session driver
//!
//! The [`session`] module holds the transfer loop the command-line tool
//! runs: identify the image from a growing prefix, initialize the router,
//! stream chunks from the backend's reported offset, and finish or abort.

pub mod session;

pub use session::{apply_image, identify_image, ApplyOptions, ApplyReport};
