//! Image type tags

use serde::{Deserialize, Serialize};

/// Firmware image format, one value per backend kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageType {
    /// Bootloader-managed application image (MCUboot)
    Mcuboot,
    /// Modem delta patch, applied by the modem over its DFU channel
    ModemDelta,
    /// Full modem firmware image
    FullModem,
    /// Plain application image
    Application,
}

impl ImageType {
    /// All image types, in the default registration order.
    pub const ALL: [ImageType; 4] = [
        ImageType::Mcuboot,
        ImageType::ModemDelta,
        ImageType::FullModem,
        ImageType::Application,
    ];

    /// Whether `init` must always reach the backend, even when it is
    /// already the active one.
    ///
    /// The modem delta backend reopens its DFU channel on init, and that
    /// channel is closed whenever a transfer is aborted.
    pub fn always_reinit(self) -> bool {
        matches!(self, ImageType::ModemDelta)
    }
}

impl std::fmt::Display for ImageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ImageType::Mcuboot => "mcuboot",
            ImageType::ModemDelta => "modem_delta",
            ImageType::FullModem => "full_modem",
            ImageType::Application => "application",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ImageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mcuboot" => Ok(ImageType::Mcuboot),
            "modem_delta" => Ok(ImageType::ModemDelta),
            "full_modem" => Ok(ImageType::FullModem),
            "application" => Ok(ImageType::Application),
            _ => Err(format!("Unknown image type: '{}'", s)),
        }
    }
}
