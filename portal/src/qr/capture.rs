//! QR capture flow.
//!
//! ```text
//! idle ──start──▶ capturing ──frame──▶ captured ──decode──▶ decoding ──▶ decoded
//!   ▲                 │                                         └──────▶ decode_failed
//!   │                 └──capture failed──▶ idle                              │
//!   └────────────────────────────────reset────────────────────────────────────┘
//! ```
//!
//! The camera is opened only for the capture step. [`CameraSession`] is a
//! guard: dropping it releases the device, so the device is released when the
//! step succeeds, fails, or unwinds.

use super::image::decode_image;
use crate::error::{PortalError, Result};
use records_core::effect::Effect;
use records_core::reducer::Reducer;
use records_core::{SmallVec, smallvec};
use records_runtime::{Store, StoreError};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A source of still frames, such as a camera.
pub trait CaptureDevice: Send + Sync {
    /// Acquire the device. Blocking; called off the async runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be acquired.
    fn open(&self) -> Result<Box<dyn CameraSession>>;
}

/// An acquired capture device, released on drop.
pub trait CameraSession: Send {
    /// Capture one encoded (PNG or JPEG) frame.
    ///
    /// # Errors
    ///
    /// Returns an error if no frame can be captured.
    fn capture_frame(&mut self) -> Result<Vec<u8>>;
}

/// Where the capture flow currently is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CapturePhase {
    /// Nothing in progress
    #[default]
    Idle,
    /// Device acquired, waiting for a frame
    Capturing,
    /// A frame is held
    Captured,
    /// Looking for a QR code in the frame
    Decoding,
    /// A payload was read
    Decoded,
    /// The frame held no readable code
    DecodeFailed,
}

/// State of one capture flow.
#[derive(Clone, Debug, Default)]
pub struct CaptureState {
    /// Current phase
    pub phase: CapturePhase,
    /// The captured frame
    pub frame: Option<Arc<[u8]>>,
    /// The decoded payload
    pub payload: Option<String>,
    /// Why the last capture, decode or command failed
    pub last_error: Option<PortalError>,
}

/// Capture flow commands and effect feedback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaptureAction {
    /// Acquire the device and capture a frame
    Start,
    /// Feedback: a frame was captured
    FrameCaptured {
        /// Encoded image
        frame: Arc<[u8]>,
    },
    /// Feedback: the device could not deliver a frame
    CaptureFailed {
        /// Device error
        error: PortalError,
    },
    /// Decode the captured frame
    Decode,
    /// Feedback: a payload was read from the frame
    Decoded {
        /// Payload text
        payload: String,
    },
    /// Feedback: the frame could not be decoded
    DecodeFailed {
        /// Decoder error
        error: PortalError,
    },
    /// Drop the frame and return to idle
    Reset,
}

impl CaptureAction {
    /// Short action name for logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::FrameCaptured { .. } => "frame_captured",
            Self::CaptureFailed { .. } => "capture_failed",
            Self::Decode => "decode",
            Self::Decoded { .. } => "decoded",
            Self::DecodeFailed { .. } => "decode_failed",
            Self::Reset => "reset",
        }
    }

    /// Whether this action ends the capture step
    #[must_use]
    pub const fn ends_capture(&self) -> bool {
        matches!(self, Self::FrameCaptured { .. } | Self::CaptureFailed { .. })
    }

    /// Whether this action ends the decode step
    #[must_use]
    pub const fn ends_decode(&self) -> bool {
        matches!(self, Self::Decoded { .. } | Self::DecodeFailed { .. })
    }
}

/// Dependencies of the capture reducer.
#[derive(Clone)]
pub struct CaptureEnvironment {
    /// Frame source
    pub device: Arc<dyn CaptureDevice>,
}

impl CaptureEnvironment {
    /// Create an environment around `device`
    #[must_use]
    pub fn new(device: Arc<dyn CaptureDevice>) -> Self {
        Self { device }
    }
}

impl fmt::Debug for CaptureEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureEnvironment").finish_non_exhaustive()
    }
}

/// Reducer for the capture flow.
#[derive(Clone, Copy, Debug, Default)]
pub struct CaptureReducer;

impl CaptureReducer {
    fn refuse(state: &mut CaptureState, action: &CaptureAction) {
        tracing::debug!(
            phase = ?state.phase,
            action = action.name(),
            "Capture action ignored in this phase"
        );
        state.last_error = Some(PortalError::invalid(format!(
            "cannot {} while {:?}",
            action.name(),
            state.phase
        )));
    }
}

impl Reducer for CaptureReducer {
    type State = CaptureState;
    type Action = CaptureAction;
    type Environment = CaptureEnvironment;

    fn reduce(
        &self,
        state: &mut CaptureState,
        action: CaptureAction,
        env: &CaptureEnvironment,
    ) -> SmallVec<[Effect<CaptureAction>; 4]> {
        match (state.phase, action) {
            (CapturePhase::Idle, CaptureAction::Start) => {
                state.phase = CapturePhase::Capturing;
                state.last_error = None;
                smallvec![capture_frame(Arc::clone(&env.device))]
            },
            (CapturePhase::Capturing, CaptureAction::FrameCaptured { frame }) => {
                state.phase = CapturePhase::Captured;
                state.frame = Some(frame);
                smallvec![]
            },
            (CapturePhase::Capturing, CaptureAction::CaptureFailed { error }) => {
                tracing::warn!(error = %error, "Frame capture failed");
                state.phase = CapturePhase::Idle;
                state.last_error = Some(error);
                smallvec![]
            },
            (CapturePhase::Captured, CaptureAction::Decode) => match state.frame.clone() {
                Some(frame) => {
                    state.phase = CapturePhase::Decoding;
                    smallvec![decode_frame(frame)]
                },
                None => {
                    Self::refuse(state, &CaptureAction::Decode);
                    smallvec![]
                },
            },
            (CapturePhase::Decoding, CaptureAction::Decoded { payload }) => {
                state.phase = CapturePhase::Decoded;
                state.payload = Some(payload);
                smallvec![]
            },
            (CapturePhase::Decoding, CaptureAction::DecodeFailed { error }) => {
                state.phase = CapturePhase::DecodeFailed;
                state.last_error = Some(error);
                smallvec![]
            },
            (_, CaptureAction::Reset) => {
                *state = CaptureState::default();
                smallvec![]
            },
            (_, other) => {
                Self::refuse(state, &other);
                smallvec![]
            },
        }
    }
}

fn capture_frame(device: Arc<dyn CaptureDevice>) -> Effect<CaptureAction> {
    Effect::future(async move {
        let captured = tokio::task::spawn_blocking(move || {
            let mut session = device.open()?;
            session.capture_frame()
        })
        .await;

        Some(match captured {
            Ok(Ok(frame)) => CaptureAction::FrameCaptured {
                frame: Arc::from(frame),
            },
            Ok(Err(error)) => CaptureAction::CaptureFailed { error },
            Err(join) => CaptureAction::CaptureFailed {
                error: PortalError::Internal(format!("capture task failed: {join}")),
            },
        })
    })
}

fn decode_frame(frame: Arc<[u8]>) -> Effect<CaptureAction> {
    Effect::future(async move {
        let decoded = tokio::task::spawn_blocking(move || decode_image(&frame)).await;

        Some(match decoded {
            Ok(Ok(payload)) => CaptureAction::Decoded { payload },
            Ok(Err(error)) => CaptureAction::DecodeFailed { error },
            Err(join) => CaptureAction::DecodeFailed {
                error: PortalError::Internal(format!("decode task failed: {join}")),
            },
        })
    })
}

/// A capture flow running on its own store.
pub struct CaptureFlow {
    store: Store<CaptureState, CaptureAction, CaptureEnvironment, CaptureReducer>,
    step_timeout: Duration,
}

impl CaptureFlow {
    /// Start an idle flow over `device`. Each step waits at most `step_timeout`.
    #[must_use]
    pub fn new(device: Arc<dyn CaptureDevice>, step_timeout: Duration) -> Self {
        Self {
            store: Store::new(
                CaptureState::default(),
                CaptureReducer,
                CaptureEnvironment::new(device),
            ),
            step_timeout,
        }
    }

    /// Current phase
    pub async fn phase(&self) -> CapturePhase {
        self.store.state(|s| s.phase).await
    }

    /// Capture one frame.
    ///
    /// # Errors
    ///
    /// [`PortalError::InvalidTransition`] unless the flow is idle; the
    /// device's error if no frame was captured.
    pub async fn capture(&self) -> Result<()> {
        self.expect_phase(CapturePhase::Idle, "capture").await?;
        match self.step(CaptureAction::Start, CaptureAction::ends_capture).await? {
            CaptureAction::CaptureFailed { error } => Err(error),
            _ => Ok(()),
        }
    }

    /// Decode the captured frame.
    ///
    /// # Errors
    ///
    /// [`PortalError::InvalidTransition`] unless a frame is held;
    /// [`PortalError::NoCodeFound`] or [`PortalError::Validation`] from the
    /// decoder.
    pub async fn decode(&self) -> Result<String> {
        self.expect_phase(CapturePhase::Captured, "decode").await?;
        match self.step(CaptureAction::Decode, CaptureAction::ends_decode).await? {
            CaptureAction::Decoded { payload } => Ok(payload),
            CaptureAction::DecodeFailed { error } => Err(error),
            other => Err(PortalError::Internal(format!(
                "unexpected capture action {}",
                other.name()
            ))),
        }
    }

    /// Drop any frame or payload and return to idle.
    ///
    /// # Errors
    ///
    /// [`PortalError::Internal`] if the flow has been shut down.
    pub async fn reset(&self) -> Result<()> {
        self.store
            .send(CaptureAction::Reset)
            .await
            .map_err(store_error)
    }

    /// Capture, decode and reset, returning the payload.
    ///
    /// The flow is back in [`CapturePhase::Idle`] afterwards, whatever the
    /// outcome.
    ///
    /// # Errors
    ///
    /// See [`CaptureFlow::capture`] and [`CaptureFlow::decode`].
    pub async fn scan(&self) -> Result<String> {
        let outcome = match self.capture().await {
            Ok(()) => self.decode().await,
            Err(error) => Err(error),
        };
        self.reset().await?;
        outcome
    }

    /// Stop the flow, waiting for in-flight steps.
    ///
    /// # Errors
    ///
    /// [`PortalError::Internal`] if steps are still running at the deadline.
    pub async fn shutdown(&self) -> Result<()> {
        self.store
            .shutdown(self.step_timeout)
            .await
            .map_err(store_error)
    }

    async fn expect_phase(&self, expected: CapturePhase, step: &str) -> Result<()> {
        let phase = self.phase().await;
        if phase == expected {
            Ok(())
        } else {
            Err(PortalError::invalid(format!(
                "cannot {step} while {phase:?}"
            )))
        }
    }

    async fn step(
        &self,
        action: CaptureAction,
        ends: fn(&CaptureAction) -> bool,
    ) -> Result<CaptureAction> {
        self.store
            .send_and_wait_for(action, ends, self.step_timeout)
            .await
            .map_err(store_error)
    }
}

impl fmt::Debug for CaptureFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureFlow")
            .field("step_timeout", &self.step_timeout)
            .finish_non_exhaustive()
    }
}

fn store_error(error: StoreError) -> PortalError {
    PortalError::Internal(format!("capture flow: {error}"))
}

/// A device that yields one fixed image, e.g. an uploaded photo.
#[derive(Clone, Debug)]
pub struct StillImageDevice {
    frame: Option<Arc<[u8]>>,
    active: Arc<AtomicUsize>,
}

impl StillImageDevice {
    /// A device whose every capture returns `frame`
    pub fn new(frame: impl Into<Vec<u8>>) -> Self {
        let frame: Vec<u8> = frame.into();
        Self {
            frame: Some(Arc::from(frame)),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A device that opens but never delivers a frame
    #[must_use]
    pub fn empty() -> Self {
        Self {
            frame: None,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of sessions currently holding the device
    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

impl CaptureDevice for StillImageDevice {
    fn open(&self) -> Result<Box<dyn CameraSession>> {
        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StillSession {
            frame: self.frame.clone(),
            active: Arc::clone(&self.active),
        }))
    }
}

struct StillSession {
    frame: Option<Arc<[u8]>>,
    active: Arc<AtomicUsize>,
}

impl CameraSession for StillSession {
    fn capture_frame(&mut self) -> Result<Vec<u8>> {
        self.frame
            .as_deref()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| PortalError::validation("no frame available from capture device"))
    }
}

impl Drop for StillSession {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::qr::image::render_png;
    use records_testing::{ReducerTest, assertions};

    fn env(device: StillImageDevice) -> CaptureEnvironment {
        CaptureEnvironment::new(Arc::new(device))
    }

    fn holding_frame() -> CaptureState {
        CaptureState {
            phase: CapturePhase::Captured,
            frame: Some(Arc::from(vec![1_u8, 2, 3])),
            ..CaptureState::default()
        }
    }

    #[test]
    fn start_moves_to_capturing_with_an_effect() {
        ReducerTest::new(CaptureReducer)
            .with_env(env(StillImageDevice::empty()))
            .given_state(CaptureState::default())
            .when_action(CaptureAction::Start)
            .then_state(|s| assert_eq!(s.phase, CapturePhase::Capturing))
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn start_is_refused_while_holding_a_frame() {
        ReducerTest::new(CaptureReducer)
            .with_env(env(StillImageDevice::empty()))
            .given_state(holding_frame())
            .when_action(CaptureAction::Start)
            .then_state(|s| {
                assert_eq!(s.phase, CapturePhase::Captured);
                assert!(matches!(s.last_error, Some(PortalError::InvalidTransition(_))));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn failed_capture_returns_to_idle() {
        ReducerTest::new(CaptureReducer)
            .with_env(env(StillImageDevice::empty()))
            .given_state(CaptureState::default())
            .when_action(CaptureAction::Start)
            .when_action(CaptureAction::CaptureFailed {
                error: PortalError::validation("lens cap"),
            })
            .then_state(|s| {
                assert_eq!(s.phase, CapturePhase::Idle);
                assert!(s.last_error.is_some());
            })
            .run();
    }

    #[test]
    fn decode_and_reset() {
        ReducerTest::new(CaptureReducer)
            .with_env(env(StillImageDevice::empty()))
            .given_state(holding_frame())
            .when_action(CaptureAction::Decode)
            .then_state(|s| assert_eq!(s.phase, CapturePhase::Decoding))
            .then_effects(assertions::assert_has_future_effect)
            .run();

        ReducerTest::new(CaptureReducer)
            .with_env(env(StillImageDevice::empty()))
            .given_state(holding_frame())
            .when_action(CaptureAction::Decode)
            .when_action(CaptureAction::DecodeFailed {
                error: PortalError::NoCodeFound,
            })
            .when_action(CaptureAction::Reset)
            .then_state(|s| {
                assert_eq!(s.phase, CapturePhase::Idle);
                assert!(s.frame.is_none());
                assert!(s.last_error.is_none());
            })
            .run();
    }

    #[test]
    fn late_feedback_after_reset_is_ignored() {
        ReducerTest::new(CaptureReducer)
            .with_env(env(StillImageDevice::empty()))
            .given_state(CaptureState::default())
            .when_action(CaptureAction::Start)
            .when_action(CaptureAction::Reset)
            .when_action(CaptureAction::FrameCaptured {
                frame: Arc::from(vec![0_u8]),
            })
            .then_state(|s| {
                assert_eq!(s.phase, CapturePhase::Idle);
                assert!(s.frame.is_none());
            })
            .run();
    }

    #[tokio::test]
    async fn scan_reads_the_payload_and_releases_the_device() {
        let device = StillImageDevice::new(render_png("scan me").unwrap());
        let flow = CaptureFlow::new(Arc::new(device.clone()), Duration::from_secs(5));

        assert_eq!(flow.scan().await.unwrap(), "scan me");
        assert_eq!(flow.phase().await, CapturePhase::Idle);
        assert_eq!(device.active_sessions(), 0);
    }

    #[tokio::test]
    async fn device_is_released_when_capture_fails() {
        let device = StillImageDevice::empty();
        let flow = CaptureFlow::new(Arc::new(device.clone()), Duration::from_secs(5));

        assert!(matches!(flow.capture().await, Err(PortalError::Validation(_))));
        assert_eq!(flow.phase().await, CapturePhase::Idle);
        assert_eq!(device.active_sessions(), 0);
    }

    #[tokio::test]
    async fn decode_failure_is_reported_and_flow_stays_failed() {
        let device = StillImageDevice::new(b"not an image".to_vec());
        let flow = CaptureFlow::new(Arc::new(device.clone()), Duration::from_secs(5));

        flow.capture().await.unwrap();
        assert_eq!(flow.phase().await, CapturePhase::Captured);
        assert_eq!(device.active_sessions(), 0);

        assert!(flow.decode().await.is_err());
        assert_eq!(flow.phase().await, CapturePhase::DecodeFailed);
        assert!(matches!(
            flow.capture().await,
            Err(PortalError::InvalidTransition(_))
        ));

        flow.reset().await.unwrap();
        assert_eq!(flow.phase().await, CapturePhase::Idle);
    }
}
