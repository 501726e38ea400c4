//! Command implementations

mod apply;
mod identify;

pub use apply::apply;
pub use identify::identify;

use std::path::Path;

use anyhow::{Context, Result};

/// Read a firmware file into memory
fn read_image(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read firmware file: {}", path.display()))
}
