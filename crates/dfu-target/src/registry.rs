//! Backend registry - the fixed, ordered list of enabled backends
//!
//! The registry is assembled once at startup and never changes afterwards.
//! Its order is the identification scan order.

use dfu_core::ImageType;
use thiserror::Error;
use tracing::debug;

/// Errors raised while assembling a registry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Two backends were registered for the same image type
    #[error("Image type registered twice: {0}")]
    DuplicateImageType(ImageType),
}

/// Pairs an image type with the backend that handles it
#[derive(Debug)]
pub struct BackendDescriptor<B> {
    image_type: ImageType,
    backend: B,
}

impl<B> BackendDescriptor<B> {
    /// Create a new descriptor
    pub fn new(image_type: ImageType, backend: B) -> Self {
        Self {
            image_type,
            backend,
        }
    }

    /// Image type this backend handles
    pub fn image_type(&self) -> ImageType {
        self.image_type
    }

    /// Backend instance
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub(crate) fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

/// Ordered, immutable set of backend descriptors
#[derive(Debug)]
pub struct BackendRegistry<B> {
    descriptors: Vec<BackendDescriptor<B>>,
}

impl<B> BackendRegistry<B> {
    /// Build a registry from descriptors, keeping their order.
    pub fn new(
        descriptors: impl IntoIterator<Item = BackendDescriptor<B>>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self {
            descriptors: Vec::new(),
        };
        for descriptor in descriptors {
            if registry.position(descriptor.image_type).is_some() {
                return Err(RegistryError::DuplicateImageType(descriptor.image_type));
            }
            debug!(image_type = %descriptor.image_type, "Registering DFU backend");
            registry.descriptors.push(descriptor);
        }
        Ok(registry)
    }

    /// Number of registered backends
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether no backend is registered
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Registered image types, in scan order
    pub fn image_types(&self) -> Vec<ImageType> {
        self.descriptors.iter().map(|d| d.image_type).collect()
    }

    /// Whether a backend is registered for `image_type`
    pub fn contains(&self, image_type: ImageType) -> bool {
        self.position(image_type).is_some()
    }

    /// Backend registered for `image_type`
    pub fn get(&self, image_type: ImageType) -> Option<&B> {
        self.descriptors
            .iter()
            .find(|d| d.image_type == image_type)
            .map(|d| &d.backend)
    }

    /// Iterate over descriptors in scan order
    pub fn iter(&self) -> impl Iterator<Item = &BackendDescriptor<B>> {
        self.descriptors.iter()
    }

    pub(crate) fn position(&self, image_type: ImageType) -> Option<usize> {
        self.descriptors
            .iter()
            .position(|d| d.image_type == image_type)
    }

    pub(crate) fn descriptor(&self, index: usize) -> Option<&BackendDescriptor<B>> {
        self.descriptors.get(index)
    }

    pub(crate) fn descriptor_mut(&mut self, index: usize) -> Option<&mut BackendDescriptor<B>> {
        self.descriptors.get_mut(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn keeps_registration_order() {
        let registry = BackendRegistry::new([
            BackendDescriptor::new(ImageType::FullModem, "fmfu"),
            BackendDescriptor::new(ImageType::Mcuboot, "mcuboot"),
        ])
        .unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.image_types(),
            vec![ImageType::FullModem, ImageType::Mcuboot]
        );
        assert_eq!(registry.get(ImageType::Mcuboot), Some(&"mcuboot"));
        assert_eq!(registry.get(ImageType::Application), None);
    }

    #[test]
    fn rejects_duplicate_image_type() {
        let err = BackendRegistry::new([
            BackendDescriptor::new(ImageType::Mcuboot, 1),
            BackendDescriptor::new(ImageType::Application, 2),
            BackendDescriptor::new(ImageType::Mcuboot, 3),
        ])
        .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateImageType(ImageType::Mcuboot));
    }

    #[test]
    fn empty_registry() {
        let registry = BackendRegistry::<()>::new([]).unwrap();
        assert!(registry.is_empty());
        assert!(!registry.contains(ImageType::ModemDelta));
    }
}
