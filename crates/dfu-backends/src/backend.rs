//! Backend enum dispatch and registry assembly
//!
//! [`Backend`] is the closed set of image backends this firmware knows.
//! Which of them are registered, and in which order, comes from
//! [`RegistryConfig`]; the router logic is the same for every selection.

use dfu_core::{BackendResult, DfuBackend, DfuCallback, ImageType};
use dfu_target::{BackendDescriptor, BackendRegistry, RegistryError, TargetRouter};
use tracing::info;

use crate::application::ApplicationBackend;
use crate::config::{DfuConfig, RegistryConfig};
use crate::flash::FlashArea;
use crate::full_modem::FullModemBackend;
use crate::mcuboot::McubootBackend;
use crate::modem_delta::{ModemChannel, ModemDeltaBackend};

/// One of the supported image backends
#[derive(Debug)]
pub enum Backend {
    Mcuboot(McubootBackend),
    ModemDelta(ModemDeltaBackend),
    FullModem(FullModemBackend),
    Application(ApplicationBackend),
}

impl Backend {
    /// Create the backend for `image_type` with the settings in `config`
    pub fn from_config(image_type: ImageType, config: &RegistryConfig) -> Self {
        match image_type {
            ImageType::Mcuboot => Backend::Mcuboot(McubootBackend::new(FlashArea::new(
                config.mcuboot.flash_capacity,
            ))),
            ImageType::ModemDelta => Backend::ModemDelta(ModemDeltaBackend::new(
                ModemChannel::new(config.modem_delta.scratch_capacity),
            )),
            ImageType::FullModem => Backend::FullModem(FullModemBackend::new(FlashArea::new(
                config.full_modem.flash_capacity,
            ))),
            ImageType::Application => Backend::Application(ApplicationBackend::new(
                FlashArea::new(config.application.flash_capacity),
            )),
        }
    }

    /// Image type this backend handles
    pub fn image_type(&self) -> ImageType {
        match self {
            Backend::Mcuboot(_) => ImageType::Mcuboot,
            Backend::ModemDelta(_) => ImageType::ModemDelta,
            Backend::FullModem(_) => ImageType::FullModem,
            Backend::Application(_) => ImageType::Application,
        }
    }

    /// Flash area the backend writes to; the modem delta backend has none
    pub fn flash(&self) -> Option<&FlashArea> {
        match self {
            Backend::Mcuboot(b) => Some(b.slot()),
            Backend::FullModem(b) => Some(b.flash()),
            Backend::Application(b) => Some(b.slot()),
            Backend::ModemDelta(_) => None,
        }
    }

    /// Modem DFU channel, for the modem delta backend
    pub fn modem_channel(&self) -> Option<&ModemChannel> {
        match self {
            Backend::ModemDelta(b) => Some(b.channel()),
            _ => None,
        }
    }
}

impl From<Backend> for BackendDescriptor<Backend> {
    fn from(backend: Backend) -> Self {
        BackendDescriptor::new(backend.image_type(), backend)
    }
}

impl DfuBackend for Backend {
    fn identify(&self, buf: &[u8]) -> bool {
        match self {
            Backend::Mcuboot(b) => b.identify(buf),
            Backend::ModemDelta(b) => b.identify(buf),
            Backend::FullModem(b) => b.identify(buf),
            Backend::Application(b) => b.identify(buf),
        }
    }

    fn init(&mut self, file_size: usize, callback: DfuCallback) -> BackendResult<()> {
        match self {
            Backend::Mcuboot(b) => b.init(file_size, callback),
            Backend::ModemDelta(b) => b.init(file_size, callback),
            Backend::FullModem(b) => b.init(file_size, callback),
            Backend::Application(b) => b.init(file_size, callback),
        }
    }

    fn offset_get(&self) -> BackendResult<usize> {
        match self {
            Backend::Mcuboot(b) => b.offset_get(),
            Backend::ModemDelta(b) => b.offset_get(),
            Backend::FullModem(b) => b.offset_get(),
            Backend::Application(b) => b.offset_get(),
        }
    }

    fn write(&mut self, buf: &[u8]) -> BackendResult<()> {
        match self {
            Backend::Mcuboot(b) => b.write(buf),
            Backend::ModemDelta(b) => b.write(buf),
            Backend::FullModem(b) => b.write(buf),
            Backend::Application(b) => b.write(buf),
        }
    }

    fn done(&mut self, successful: bool) -> BackendResult<()> {
        match self {
            Backend::Mcuboot(b) => b.done(successful),
            Backend::ModemDelta(b) => b.done(successful),
            Backend::FullModem(b) => b.done(successful),
            Backend::Application(b) => b.done(successful),
        }
    }
}

/// Assemble the registry for the backends enabled in `config`, in order
pub fn build_registry(config: &RegistryConfig) -> Result<BackendRegistry<Backend>, RegistryError> {
    let registry: BackendRegistry<Backend> = BackendRegistry::new(
        config
            .backends
            .iter()
            .map(|&image_type| BackendDescriptor::from(Backend::from_config(image_type, config))),
    )?;
    info!(backends = ?registry.image_types(), "DFU backend registry assembled");
    Ok(registry)
}

/// Build a router from a full configuration
pub fn build_router(config: &DfuConfig) -> Result<TargetRouter<Backend>, RegistryError> {
    let registry = build_registry(&config.registry)?;
    Ok(TargetRouter::with_config(registry, config.router.clone()))
}
