//! Apply command - stream a firmware file to its backend

use std::path::Path;

use anyhow::{Context, Result};
use dfu_backends::{build_router, DfuConfig};
use dfu_cli::{apply_image, ApplyOptions};
use dfu_core::{DfuCallback, DfuEvent};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

/// Run a full DFU transfer for a firmware file
pub fn apply(
    config: &DfuConfig,
    path: &Path,
    chunk_size: usize,
    abort_after: Option<usize>,
    json: bool,
) -> Result<()> {
    let image = super::read_image(path)?;
    let mut router = build_router(config).context("Invalid backend registry")?;

    let pb = ProgressBar::new(image.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
            .context("Invalid progress template")?
            .progress_chars("=>-"),
    );

    let make_callback = || -> DfuCallback {
        let pb = pb.clone();
        Box::new(move |event| match event {
            DfuEvent::Progress { offset, .. } => pb.set_position(offset as u64),
            DfuEvent::ErasePending => pb.set_message("Erasing..."),
            DfuEvent::EraseDone => pb.set_message("Writing..."),
            DfuEvent::Timeout => pb.set_message("Timed out"),
        })
    };

    let options = ApplyOptions {
        chunk_size,
        abort_after,
    };
    let result = apply_image(&mut router, &image, &options, make_callback);

    let report = match result {
        Ok(report) => {
            pb.finish_with_message("Done");
            report
        }
        Err(err) => {
            pb.abandon_with_message("Failed");
            anyhow::bail!("DFU transfer failed: {} (code {})", err, err.code());
        }
    };

    let staged = router.registry().get(report.image_type).is_some_and(|backend| {
        backend.flash().is_some_and(|f| f.is_pending())
            || backend
                .modem_channel()
                .is_some_and(|c| c.scheduled_patch().is_some())
    });
    debug!(staged, "Backend state after transfer");

    if json {
        let mut out = serde_json::to_value(&report)?;
        out["staged"] = serde_json::Value::Bool(staged);
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!(
            "{}: {} image, {} bytes in {} writes{}",
            path.display(),
            report.image_type,
            report.file_size,
            report.writes,
            report
                .resumed_from
                .map(|o| format!(", resumed at {}", o))
                .unwrap_or_default()
        );
        if staged {
            println!("Image staged; reboot to apply");
        }
    }
    Ok(())
}
