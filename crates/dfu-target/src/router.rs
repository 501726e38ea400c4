//! Target router - selects one backend and forwards the transfer to it

use dfu_core::{DfuBackend, DfuCallback, DfuError, DfuResult, ImageType};
use tracing::{debug, error, info, warn};

use crate::config::{InitFailurePolicy, RouterConfig};
use crate::registry::{BackendDescriptor, BackendRegistry};

/// Routes a firmware transfer to exactly one registered backend.
///
/// # State
///
/// ```text
///            init(T) ok / init(T) err (keep_selection)
///   ┌──────┐ ───────────────────────────────────────► ┌────────────┐
///   │ none │                                          │ active(T)  │ ◄─┐
///   └──────┘ ◄─────────────────────────────────────── └────────────┘   │
///              done(true) ok  |  reset() ok                 │          │
///                                                           └──────────┘
///                                        write / offset_get / done(false) ok
///                                        init(T) again (no-op unless T re-inits)
/// ```
///
/// A failing `done` or `reset` leaves the selection untouched so the caller
/// can retry.
pub struct TargetRouter<B> {
    registry: BackendRegistry<B>,
    config: RouterConfig,
    /// Index into `registry` of the active backend
    current: Option<usize>,
}

impl<B: DfuBackend> TargetRouter<B> {
    /// Create a router with the default configuration
    pub fn new(registry: BackendRegistry<B>) -> Self {
        Self::with_config(registry, RouterConfig::default())
    }

    /// Create a router with an explicit configuration
    pub fn with_config(registry: BackendRegistry<B>, config: RouterConfig) -> Self {
        Self {
            registry,
            config,
            current: None,
        }
    }

    /// Registered backends
    pub fn registry(&self) -> &BackendRegistry<B> {
        &self.registry
    }

    /// Active configuration
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Image type of the active backend, if any
    pub fn current_image_type(&self) -> Option<ImageType> {
        self.current
            .and_then(|idx| self.registry.descriptor(idx))
            .map(BackendDescriptor::image_type)
    }

    /// Whether a backend is active
    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    /// Identify which registered backend `buf` belongs to.
    ///
    /// Every backend is asked, so the outcome does not depend on
    /// registration order. A short buffer that nobody recognises is
    /// [`DfuError::NeedMoreData`]; a long one is
    /// [`DfuError::UnsupportedImage`].
    pub fn identify(&self, buf: &[u8]) -> DfuResult<ImageType> {
        let matches: Vec<ImageType> = self
            .registry
            .iter()
            .filter(|d| d.backend().identify(buf))
            .map(BackendDescriptor::image_type)
            .collect();

        match matches.as_slice() {
            [image_type] => Ok(*image_type),
            [] if buf.len() < self.config.min_identify_len => Err(DfuError::NeedMoreData {
                len: buf.len(),
                min: self.config.min_identify_len,
            }),
            [] => {
                error!(len = buf.len(), "No supported image type found");
                Err(DfuError::UnsupportedImage { len: buf.len() })
            }
            _ => {
                error!(?matches, "Multiple matches for image type");
                Err(DfuError::Ambiguous { matches })
            }
        }
    }

    /// Select the backend for `image_type` and initialize it.
    ///
    /// Re-initializing the backend that is already active is a no-op so an
    /// interrupted transfer continues where it left off, except for image
    /// types configured to always re-init (modem delta by default).
    pub fn init(
        &mut self,
        image_type: ImageType,
        file_size: usize,
        callback: DfuCallback,
    ) -> DfuResult<()> {
        let Some(index) = self.registry.position(image_type) else {
            error!(%image_type, "Unknown image type");
            return Err(DfuError::UnknownImageType(image_type));
        };

        if self.current == Some(index) && !self.config.always_reinit(image_type) {
            debug!(%image_type, "DFU target already initialized, continuing transfer");
            return Ok(());
        }

        self.current = Some(index);
        info!(%image_type, file_size, "Initializing DFU target");

        let result = match self.registry.descriptor_mut(index) {
            Some(descriptor) => descriptor.backend_mut().init(file_size, callback),
            None => return Err(DfuError::UnknownImageType(image_type)),
        };

        if let Err(err) = result {
            error!(%image_type, error = %err, "DFU target init failed");
            if self.config.init_failure == InitFailurePolicy::ClearSelection {
                self.current = None;
            }
            return Err(err.into());
        }
        Ok(())
    }

    /// Current write offset of the active backend
    pub fn offset_get(&self) -> DfuResult<usize> {
        let descriptor = self
            .current
            .and_then(|idx| self.registry.descriptor(idx))
            .ok_or(DfuError::NotInitialized)?;
        Ok(descriptor.backend().offset_get()?)
    }

    /// Forward `buf` to the active backend.
    ///
    /// An empty buffer is refused the same way as a missing backend.
    pub fn write(&mut self, buf: &[u8]) -> DfuResult<()> {
        if buf.is_empty() {
            return Err(DfuError::NotInitialized);
        }
        let descriptor = self.active_mut()?;
        debug!(image_type = %descriptor.image_type(), len = buf.len(), "DFU write");
        Ok(descriptor.backend_mut().write(buf)?)
    }

    /// Finish the transfer on the active backend.
    ///
    /// On success with `successful == true` the selection is cleared. With
    /// `successful == false` it is kept so a later `init` of the same type
    /// resumes the transfer.
    pub fn done(&mut self, successful: bool) -> DfuResult<()> {
        let descriptor = self.active_mut()?;
        let image_type = descriptor.image_type();

        if let Err(err) = descriptor.backend_mut().done(successful) {
            error!(%image_type, error = %err, "Unable to clean up DFU target");
            return Err(err.into());
        }

        if successful {
            info!(%image_type, "DFU target completed");
            self.current = None;
        } else {
            info!(%image_type, "DFU target stopped, selection kept for resume");
        }
        Ok(())
    }

    /// Abort whatever is active and clear the selection.
    ///
    /// Safe to call at any time. If the active backend fails to clean up,
    /// its error is returned and the selection is kept.
    pub fn reset(&mut self) -> DfuResult<()> {
        if let Some(index) = self.current {
            if let Some(descriptor) = self.registry.descriptor_mut(index) {
                let image_type = descriptor.image_type();
                if let Err(err) = descriptor.backend_mut().done(false) {
                    error!(%image_type, error = %err, "Unable to clean up DFU target");
                    return Err(err.into());
                }
                info!(%image_type, "DFU target reset");
            } else {
                warn!(index, "Active DFU target missing from registry");
            }
        }
        self.current = None;
        Ok(())
    }

    fn active_mut(&mut self) -> DfuResult<&mut BackendDescriptor<B>> {
        let index = self.current.ok_or(DfuError::NotInitialized)?;
        self.registry
            .descriptor_mut(index)
            .ok_or(DfuError::NotInitialized)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dfu_core::{noop_callback, BackendError, BackendResult, DfuErrorKind, DfuEvent};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    /// Calls observed by a [`MockBackend`] plus scripted failures
    #[derive(Debug, Default)]
    struct MockState {
        inits: Vec<usize>,
        writes: Vec<Vec<u8>>,
        dones: Vec<bool>,
        offset_queries: usize,
        offset: usize,
        fail_init: Option<BackendError>,
        fail_done: Option<BackendError>,
    }

    /// Backend that recognises buffers starting with `magic`
    struct MockBackend {
        magic: u8,
        state: Arc<Mutex<MockState>>,
    }

    impl MockBackend {
        fn new(magic: u8) -> (Self, Arc<Mutex<MockState>>) {
            let state = Arc::new(Mutex::new(MockState::default()));
            (
                Self {
                    magic,
                    state: state.clone(),
                },
                state,
            )
        }
    }

    impl DfuBackend for MockBackend {
        fn identify(&self, buf: &[u8]) -> bool {
            buf.first() == Some(&self.magic)
        }

        fn init(&mut self, file_size: usize, mut callback: DfuCallback) -> BackendResult<()> {
            let mut state = self.state.lock();
            state.inits.push(file_size);
            if let Some(err) = state.fail_init.clone() {
                return Err(err);
            }
            callback(DfuEvent::EraseDone);
            Ok(())
        }

        fn offset_get(&self) -> BackendResult<usize> {
            let mut state = self.state.lock();
            state.offset_queries += 1;
            Ok(state.offset)
        }

        fn write(&mut self, buf: &[u8]) -> BackendResult<()> {
            let mut state = self.state.lock();
            state.offset += buf.len();
            state.writes.push(buf.to_vec());
            Ok(())
        }

        fn done(&mut self, successful: bool) -> BackendResult<()> {
            let mut state = self.state.lock();
            state.dones.push(successful);
            match state.fail_done.clone() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    struct Harness {
        router: TargetRouter<MockBackend>,
        mcuboot: Arc<Mutex<MockState>>,
        modem_delta: Arc<Mutex<MockState>>,
        application: Arc<Mutex<MockState>>,
    }

    fn harness_with(config: RouterConfig) -> Harness {
        let (mcuboot, mcuboot_state) = MockBackend::new(0x3d);
        let (modem_delta, modem_state) = MockBackend::new(0x6d);
        let (application, app_state) = MockBackend::new(0xa5);
        let registry = BackendRegistry::new([
            BackendDescriptor::new(ImageType::Mcuboot, mcuboot),
            BackendDescriptor::new(ImageType::ModemDelta, modem_delta),
            BackendDescriptor::new(ImageType::Application, application),
        ])
        .unwrap();
        Harness {
            router: TargetRouter::with_config(registry, config),
            mcuboot: mcuboot_state,
            modem_delta: modem_state,
            application: app_state,
        }
    }

    fn harness() -> Harness {
        harness_with(RouterConfig::default())
    }

    fn prefix(magic: u8, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        if let Some(first) = buf.first_mut() {
            *first = magic;
        }
        buf
    }

    #[rstest]
    #[case(0x3d, ImageType::Mcuboot)]
    #[case(0x6d, ImageType::ModemDelta)]
    #[case(0xa5, ImageType::Application)]
    fn identify_single_match(#[case] magic: u8, #[case] expected: ImageType) {
        let h = harness();
        assert_eq!(h.router.identify(&prefix(magic, 64)), Ok(expected));
    }

    #[test]
    fn identify_short_buffer_that_matches() {
        let h = harness();
        assert_eq!(h.router.identify(&[0x3d]), Ok(ImageType::Mcuboot));
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(31)]
    fn identify_short_unknown_needs_more_data(#[case] len: usize) {
        let h = harness();
        let err = h.router.identify(&vec![0u8; len]).unwrap_err();
        assert_eq!(err, DfuError::NeedMoreData { len, min: 32 });
        assert!(err.is_retryable());
    }

    #[rstest]
    #[case(32)]
    #[case(33)]
    #[case(4096)]
    fn identify_long_unknown_is_unsupported(#[case] len: usize) {
        let h = harness();
        let err = h.router.identify(&vec![0u8; len]).unwrap_err();
        assert_eq!(err, DfuError::UnsupportedImage { len });
        assert_eq!(err.kind(), DfuErrorKind::Unsupported);
    }

    #[test]
    fn identify_threshold_follows_config() {
        let h = harness_with(RouterConfig {
            min_identify_len: 8,
            ..RouterConfig::default()
        });
        assert_eq!(
            h.router.identify(&[0u8; 7]),
            Err(DfuError::NeedMoreData { len: 7, min: 8 })
        );
        assert_eq!(
            h.router.identify(&[0u8; 8]),
            Err(DfuError::UnsupportedImage { len: 8 })
        );
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    fn identify_ambiguous_regardless_of_order(#[case] reversed: bool) {
        let (a, _) = MockBackend::new(0x11);
        let (b, _) = MockBackend::new(0x11);
        let (c, _) = MockBackend::new(0x22);
        let mut descriptors = vec![
            BackendDescriptor::new(ImageType::FullModem, c),
            BackendDescriptor::new(ImageType::Mcuboot, a),
            BackendDescriptor::new(ImageType::Application, b),
        ];
        if reversed {
            descriptors.reverse();
        }
        let router = TargetRouter::new(BackendRegistry::new(descriptors).unwrap());

        let err = router.identify(&[0x11]).unwrap_err();
        assert_eq!(err.kind(), DfuErrorKind::Ambiguous);
        let DfuError::Ambiguous { mut matches } = err else {
            panic!("expected ambiguous error");
        };
        matches.sort_by_key(|t| t.to_string());
        assert_eq!(matches, vec![ImageType::Application, ImageType::Mcuboot]);

        // Unambiguous data is still identified by the same registry
        assert_eq!(router.identify(&[0x22]), Ok(ImageType::FullModem));
    }

    #[test]
    fn identify_does_not_touch_selection() {
        let mut h = harness();
        h.router
            .init(ImageType::Application, 100, noop_callback())
            .unwrap();
        assert_eq!(h.router.identify(&prefix(0x3d, 32)), Ok(ImageType::Mcuboot));
        assert_eq!(h.router.current_image_type(), Some(ImageType::Application));
    }

    #[test]
    fn init_unknown_type_leaves_state() {
        let mut h = harness();
        let err = h
            .router
            .init(ImageType::FullModem, 10, noop_callback())
            .unwrap_err();
        assert_eq!(err, DfuError::UnknownImageType(ImageType::FullModem));
        assert!(!h.router.is_active());

        h.router.init(ImageType::Mcuboot, 10, noop_callback()).unwrap();
        let err = h
            .router
            .init(ImageType::FullModem, 10, noop_callback())
            .unwrap_err();
        assert_eq!(err.kind(), DfuErrorKind::Unsupported);
        assert_eq!(h.router.current_image_type(), Some(ImageType::Mcuboot));
    }

    #[test]
    fn init_passes_size_and_callback_through() {
        let mut h = harness();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        h.router
            .init(
                ImageType::Mcuboot,
                4096,
                Box::new(move |evt| sink.lock().push(evt)),
            )
            .unwrap();
        assert_eq!(h.mcuboot.lock().inits, vec![4096]);
        assert_eq!(*events.lock(), vec![DfuEvent::EraseDone]);
    }

    #[test]
    fn init_replaces_active_backend() {
        let mut h = harness();
        h.router.init(ImageType::Mcuboot, 10, noop_callback()).unwrap();
        assert_eq!(h.router.current_image_type(), Some(ImageType::Mcuboot));

        h.router
            .init(ImageType::Application, 20, noop_callback())
            .unwrap();
        assert_eq!(h.router.current_image_type(), Some(ImageType::Application));

        h.router.write(&[1, 2, 3]).unwrap();
        assert!(h.mcuboot.lock().writes.is_empty());
        assert_eq!(h.application.lock().writes, vec![vec![1, 2, 3]]);
    }

    #[test]
    fn reinit_same_backend_is_noop() {
        let mut h = harness();
        h.router.init(ImageType::Mcuboot, 10, noop_callback()).unwrap();
        h.router.write(&[0xaa; 4]).unwrap();
        h.router.init(ImageType::Mcuboot, 10, noop_callback()).unwrap();

        assert_eq!(h.mcuboot.lock().inits, vec![10]);
        assert_eq!(h.router.offset_get(), Ok(4));
    }

    #[test]
    fn reinit_modem_delta_always_reaches_backend() {
        let mut h = harness();
        h.router
            .init(ImageType::ModemDelta, 10, noop_callback())
            .unwrap();
        h.router
            .init(ImageType::ModemDelta, 10, noop_callback())
            .unwrap();
        h.router
            .init(ImageType::ModemDelta, 10, noop_callback())
            .unwrap();
        assert_eq!(h.modem_delta.lock().inits.len(), 3);
    }

    #[test]
    fn reinit_exemption_follows_config() {
        let mut h = harness_with(RouterConfig {
            reinit_always: vec![ImageType::Mcuboot],
            ..RouterConfig::default()
        });
        h.router.init(ImageType::Mcuboot, 1, noop_callback()).unwrap();
        h.router.init(ImageType::Mcuboot, 1, noop_callback()).unwrap();
        h.router
            .init(ImageType::ModemDelta, 1, noop_callback())
            .unwrap();
        h.router
            .init(ImageType::ModemDelta, 1, noop_callback())
            .unwrap();
        assert_eq!(h.mcuboot.lock().inits.len(), 2);
        assert_eq!(h.modem_delta.lock().inits.len(), 1);
    }

    #[test]
    fn init_failure_keeps_selection_by_default() {
        let mut h = harness();
        h.application.lock().fail_init = Some(BackendError::NoSpace {
            need: 100,
            available: 10,
        });

        let err = h
            .router
            .init(ImageType::Application, 100, noop_callback())
            .unwrap_err();
        assert_eq!(err.kind(), DfuErrorKind::BackendFailure);
        assert_eq!(err.code(), -28);
        assert_eq!(h.router.current_image_type(), Some(ImageType::Application));

        // A retry with the same type is now a no-op; reset clears it
        h.router
            .init(ImageType::Application, 100, noop_callback())
            .unwrap();
        assert_eq!(h.application.lock().inits.len(), 1);
        h.router.reset().unwrap();
        assert!(!h.router.is_active());
    }

    #[test]
    fn init_failure_can_clear_selection() {
        let mut h = harness_with(RouterConfig {
            init_failure: InitFailurePolicy::ClearSelection,
            ..RouterConfig::default()
        });
        h.router.init(ImageType::Mcuboot, 10, noop_callback()).unwrap();
        h.application.lock().fail_init = Some(BackendError::Io("erase".into()));

        assert!(h
            .router
            .init(ImageType::Application, 10, noop_callback())
            .is_err());
        assert!(!h.router.is_active());
    }

    #[test]
    fn operations_require_active_backend() {
        let mut h = harness();
        assert_eq!(h.router.offset_get(), Err(DfuError::NotInitialized));
        assert_eq!(h.router.write(&[1, 2, 3]), Err(DfuError::NotInitialized));
        assert_eq!(h.router.done(true), Err(DfuError::NotInitialized));
        assert_eq!(h.router.done(false), Err(DfuError::NotInitialized));

        for state in [&h.mcuboot, &h.modem_delta, &h.application] {
            let state = state.lock();
            assert!(state.inits.is_empty());
            assert!(state.writes.is_empty());
            assert!(state.dones.is_empty());
            assert_eq!(state.offset_queries, 0);
        }
    }

    #[test]
    fn empty_write_is_refused() {
        let mut h = harness();
        h.router.init(ImageType::Mcuboot, 10, noop_callback()).unwrap();
        assert_eq!(h.router.write(&[]), Err(DfuError::NotInitialized));
        assert!(h.mcuboot.lock().writes.is_empty());
        assert!(h.router.is_active());
    }

    #[test]
    fn offset_and_write_delegate() {
        let mut h = harness();
        h.router
            .init(ImageType::Application, 10, noop_callback())
            .unwrap();
        h.router.write(&[1, 2]).unwrap();
        h.router.write(&[3, 4, 5]).unwrap();
        assert_eq!(h.router.offset_get(), Ok(5));
        let state = h.application.lock();
        assert_eq!(state.writes, vec![vec![1, 2], vec![3, 4, 5]]);
        assert_eq!(state.offset_queries, 1);
    }

    #[test]
    fn done_true_clears_selection() {
        let mut h = harness();
        h.router.init(ImageType::Mcuboot, 10, noop_callback()).unwrap();
        h.router.done(true).unwrap();

        assert!(!h.router.is_active());
        assert_eq!(h.mcuboot.lock().dones, vec![true]);
        assert_eq!(h.router.write(&[1]), Err(DfuError::NotInitialized));
    }

    #[test]
    fn done_false_keeps_selection_for_resume() {
        let mut h = harness();
        h.router.init(ImageType::Mcuboot, 10, noop_callback()).unwrap();
        h.router.write(&[0; 6]).unwrap();
        h.router.done(false).unwrap();

        assert_eq!(h.router.current_image_type(), Some(ImageType::Mcuboot));
        h.router.init(ImageType::Mcuboot, 10, noop_callback()).unwrap();
        assert_eq!(h.mcuboot.lock().inits.len(), 1);
        assert_eq!(h.router.offset_get(), Ok(6));
    }

    #[rstest]
    #[case(true)]
    #[case(false)]
    fn done_failure_keeps_selection(#[case] successful: bool) {
        let mut h = harness();
        h.router.init(ImageType::Mcuboot, 10, noop_callback()).unwrap();
        h.mcuboot.lock().fail_done = Some(BackendError::Other {
            code: -5,
            message: "flash busy".into(),
        });

        let err = h.router.done(successful).unwrap_err();
        assert_eq!(err.code(), -5);
        assert_eq!(h.router.current_image_type(), Some(ImageType::Mcuboot));

        h.mcuboot.lock().fail_done = None;
        h.router.done(true).unwrap();
        assert!(!h.router.is_active());
    }

    #[test]
    fn reset_without_backend_is_ok() {
        let mut h = harness();
        assert_eq!(h.router.reset(), Ok(()));
        assert_eq!(h.router.reset(), Ok(()));
        assert!(!h.router.is_active());
    }

    #[test]
    fn reset_aborts_active_backend() {
        let mut h = harness();
        h.router
            .init(ImageType::ModemDelta, 10, noop_callback())
            .unwrap();
        h.router.reset().unwrap();

        assert_eq!(h.modem_delta.lock().dones, vec![false]);
        assert!(!h.router.is_active());

        // Second reset does not reach the backend again
        h.router.reset().unwrap();
        assert_eq!(h.modem_delta.lock().dones, vec![false]);
    }

    #[test]
    fn reset_failure_keeps_selection() {
        let mut h = harness();
        h.router
            .init(ImageType::Application, 10, noop_callback())
            .unwrap();
        h.application.lock().fail_done = Some(BackendError::Busy("erase".into()));

        assert!(h.router.reset().is_err());
        assert_eq!(h.router.current_image_type(), Some(ImageType::Application));

        h.application.lock().fail_done = None;
        h.router.reset().unwrap();
        assert!(!h.router.is_active());
    }

    #[test]
    fn after_reset_same_type_is_reinitialized() {
        let mut h = harness();
        h.router.init(ImageType::Mcuboot, 10, noop_callback()).unwrap();
        h.router.reset().unwrap();
        h.router.init(ImageType::Mcuboot, 10, noop_callback()).unwrap();
        assert_eq!(h.mcuboot.lock().inits.len(), 2);
    }
}
