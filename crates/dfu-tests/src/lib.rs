//! Integration tests for the DFU target router
//!
//! These tests drive the router with the reference backends from
//! `dfu-backends`, end to end:
//!
//! - `router_test.rs` - identification, selection and completion over real formats
//! - `resume_test.rs` - interrupted transfers, resumption and reset
//! - `config_test.rs` - configuration-driven registry assembly
//!
//! ```bash
//! cargo test -p dfu-tests
//! ```

use std::sync::Arc;

use dfu_core::{DfuCallback, DfuEvent};
use parking_lot::Mutex;

/// Collects every event a backend reports
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<DfuEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A callback that appends to this log
    pub fn callback(&self) -> DfuCallback {
        let events = self.events.clone();
        Box::new(move |event| events.lock().push(event))
    }

    /// Events recorded so far
    pub fn events(&self) -> Vec<DfuEvent> {
        self.events.lock().clone()
    }

    /// Last reported progress offset
    pub fn last_progress(&self) -> Option<usize> {
        self.events.lock().iter().rev().find_map(|e| match e {
            DfuEvent::Progress { offset, .. } => Some(*offset),
            _ => None,
        })
    }
}
