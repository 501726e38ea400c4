//! Transfer loop over a [`TargetRouter`]

use dfu_core::{BackendError, DfuBackend, DfuCallback, DfuError, DfuResult, ImageType};
use dfu_target::TargetRouter;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Default chunk size used when streaming an image
pub const DEFAULT_CHUNK_SIZE: usize = 512;

/// Options for [`apply_image`]
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Bytes handed to the router per write
    pub chunk_size: usize,
    /// Interrupt the transfer once this many bytes are written, then resume
    pub abort_after: Option<usize>,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            abort_after: None,
        }
    }
}

/// Outcome of a completed transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    /// Detected image type
    pub image_type: ImageType,
    /// Image size in bytes
    pub file_size: usize,
    /// Offset the backend reported after re-init, when the transfer was interrupted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resumed_from: Option<usize>,
    /// Number of write calls made
    pub writes: usize,
}

/// Identify `image` the way bytes arrive from a transport: retry with a
/// prefix `step` bytes longer for as long as the router needs more data.
///
/// Returns the image type and the prefix length that settled it.
pub fn identify_image<B: DfuBackend>(
    router: &TargetRouter<B>,
    image: &[u8],
    step: usize,
) -> DfuResult<(ImageType, usize)> {
    let step = step.max(1);
    let mut len = step.min(image.len());
    loop {
        let prefix = image.get(..len).unwrap_or(image);
        match router.identify(prefix) {
            Ok(image_type) => return Ok((image_type, len)),
            Err(err) if err.is_retryable() && len < image.len() => {
                debug!(len, "Need more data to identify image");
                len = len.saturating_add(step).min(image.len());
            }
            Err(err) => return Err(err),
        }
    }
}

/// Stream `image` through `router` from identification to `done(true)`.
///
/// `make_callback` is called once per `init` to produce the event sink
/// handed to the backend. Once a backend has been selected, any failure
/// (including its own `init`) resets the router before the error is returned.
pub fn apply_image<B, F>(
    router: &mut TargetRouter<B>,
    image: &[u8],
    options: &ApplyOptions,
    mut make_callback: F,
) -> DfuResult<ApplyReport>
where
    B: DfuBackend,
    F: FnMut() -> DfuCallback,
{
    let chunk_size = options.chunk_size.max(1);
    let (image_type, _) = identify_image(router, image, chunk_size)?;
    if let Err(err) = router.init(image_type, image.len(), make_callback()) {
        return Err(reset_after(router, err));
    }
    info!(%image_type, file_size = image.len(), "Starting DFU transfer");

    let mut report = ApplyReport {
        image_type,
        file_size: image.len(),
        resumed_from: None,
        writes: 0,
    };

    let result = transfer(router, image, options, chunk_size, &mut make_callback, &mut report);
    if let Err(err) = result {
        return Err(reset_after(router, err));
    }

    info!(%image_type, writes = report.writes, "DFU transfer complete");
    Ok(report)
}

/// Drop the selection after `err` so the next image starts clean
fn reset_after<B: DfuBackend>(router: &mut TargetRouter<B>, err: DfuError) -> DfuError {
    warn!(error = %err, "DFU transfer failed, resetting target");
    if let Err(reset_err) = router.reset() {
        warn!(error = %reset_err, "DFU target reset failed");
    }
    err
}

fn transfer<B, F>(
    router: &mut TargetRouter<B>,
    image: &[u8],
    options: &ApplyOptions,
    chunk_size: usize,
    make_callback: &mut F,
    report: &mut ApplyReport,
) -> DfuResult<()>
where
    B: DfuBackend,
    F: FnMut() -> DfuCallback,
{
    if let Some(limit) = options.abort_after.filter(|&n| n < image.len()) {
        report.writes += stream(router, image, limit, chunk_size)?;
        router.done(false)?;
        info!(offset = limit, "DFU transfer interrupted");

        router.init(report.image_type, image.len(), make_callback())?;
        let offset = router.offset_get()?;
        info!(offset, "Resuming DFU transfer");
        report.resumed_from = Some(offset);
    }

    report.writes += stream(router, image, image.len(), chunk_size)?;
    router.done(true)
}

/// Write `image[offset..end]` in chunks, starting at the backend's offset
fn stream<B: DfuBackend>(
    router: &mut TargetRouter<B>,
    image: &[u8],
    end: usize,
    chunk_size: usize,
) -> DfuResult<usize> {
    let mut writes = 0;
    loop {
        let offset = router.offset_get()?;
        if offset >= end {
            return Ok(writes);
        }
        let chunk_end = offset.saturating_add(chunk_size).min(end);
        let chunk = image.get(offset..chunk_end).ok_or_else(|| {
            BackendError::Io(format!(
                "backend offset {offset} is outside the {} byte image",
                image.len()
            ))
        })?;
        router.write(chunk)?;
        writes += 1;
    }
}
