//! Identify command - detect the image type of a file

use std::path::Path;

use anyhow::{Context, Result};
use dfu_backends::{build_router, DfuConfig};
use dfu_cli::identify_image;
use serde_json::json;

/// Print which backend a firmware file belongs to
pub fn identify(config: &DfuConfig, path: &Path, step: usize, json: bool) -> Result<()> {
    let image = super::read_image(path)?;
    let router = build_router(config).context("Invalid backend registry")?;

    let (image_type, inspected) = identify_image(&router, &image, step)
        .map_err(|e| anyhow::anyhow!("{} (code {})", e, e.code()))
        .with_context(|| format!("Failed to identify {}", path.display()))?;

    if json {
        let out = json!({
            "file": path.display().to_string(),
            "image_type": image_type,
            "bytes_inspected": inspected,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}: {} (decided after {} bytes)", path.display(), image_type, inspected);
    }
    Ok(())
}
