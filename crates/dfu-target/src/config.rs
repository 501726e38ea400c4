//! Router configuration

use dfu_core::ImageType;
use serde::{Deserialize, Serialize};

/// Shortest prefix below which an unrecognised buffer is "need more data"
/// rather than "unsupported".
pub const MIN_IDENTIFY_LEN: usize = 32;

/// What happens to the selection when a backend's `init` fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitFailurePolicy {
    /// The failed backend stays selected; the caller must `reset`.
    #[default]
    KeepSelection,
    /// The selection is cleared to none.
    ClearSelection,
}

/// Configuration for a [`TargetRouter`](crate::TargetRouter)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Identification threshold in bytes
    #[serde(default = "default_min_identify_len")]
    pub min_identify_len: usize,
    /// Selection policy on backend init failure
    #[serde(default)]
    pub init_failure: InitFailurePolicy,
    /// Image types whose backend is re-initialized even when already active
    #[serde(default = "default_reinit_always")]
    pub reinit_always: Vec<ImageType>,
}

fn default_min_identify_len() -> usize {
    MIN_IDENTIFY_LEN
}

fn default_reinit_always() -> Vec<ImageType> {
    ImageType::ALL
        .into_iter()
        .filter(|t| t.always_reinit())
        .collect()
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            min_identify_len: default_min_identify_len(),
            init_failure: InitFailurePolicy::default(),
            reinit_always: default_reinit_always(),
        }
    }
}

impl RouterConfig {
    /// Whether `init` for `image_type` always reaches the backend
    pub fn always_reinit(&self, image_type: ImageType) -> bool {
        self.reinit_always.contains(&image_type)
    }
}
