//! Action capture: the in-page module's installer and the normalizer that
//! turns its raw events into actions.

pub mod injector;
pub mod normalizer;

pub use injector::{is_verified, CaptureInjector, InstallOutcome, CAPTURE_KEYS};
pub use normalizer::CaptureNormalizer;
