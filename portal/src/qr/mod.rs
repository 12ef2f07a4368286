//! QR pickup verification: signed tokens, QR images and the capture flow.

pub mod capture;
pub mod image;
pub mod token;
pub mod verify;

pub use capture::{
    CameraSession, CaptureAction, CaptureDevice, CaptureFlow, CapturePhase, CaptureReducer,
    CaptureState, StillImageDevice,
};
pub use token::{PickupToken, TOKEN_TYPE, TokenSigner};
pub use verify::{IssuedToken, QrVerificationService, Verification};
