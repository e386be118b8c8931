//! Deterministic input recording and playback for a PS2-class emulator core.
//!
//! The crate records the exact bytes of every controller data poll into a
//! movie file and can later feed those bytes back, byte for byte, so a replay
//! on the same emulator build reproduces the original session. Three layers:
//!
//! * [`pad`] decodes and encodes the 17-byte controller report.
//! * [`movie`] owns the on-disk format, including the legacy single-version
//!   layout, with random access per frame, slot and byte.
//! * [`engine`] is the per-session state machine the host drives from its
//!   controller interrupt and frame boundary; [`session`] receives the host's
//!   asynchronous boot/savestate completion events and [`host`] defines the
//!   services the engine needs from the emulator.

pub mod engine;
pub mod error;
pub mod host;
pub mod movie;
pub mod pad;
pub mod session;

pub use engine::{RecordingEngine, RecordingMode, companion_state_path};
pub use error::MovieError;
pub use host::Host;
pub use movie::{MovieFile, MovieHeader, StartType};
pub use pad::{Buttons, PadState, Pressure, REPORT_BYTES};
