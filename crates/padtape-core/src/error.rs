use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while opening, reading, or writing a movie file, or while
/// starting a session from one.
///
/// Frame counter desyncs after a savestate load are deliberately *not* errors:
/// the engine logs a warning and self-heals by clamping and switching modes.
#[derive(Error, Debug)]
pub enum MovieError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported movie file version: {0}")]
    UnsupportedVersion(u8),

    #[error("movie file declares no active controller slots")]
    EmptySlotMask,

    #[error("movie uses multitap slots but the platform has no multitap support")]
    MultitapUnsupported,

    #[error("companion savestate not found: {}", .0.display())]
    MissingCompanionState(PathBuf),

    #[error("emulator is not running; a savestate-based replay cannot start")]
    EmulatorNotRunning,

    #[error("no movie file is open")]
    NotOpen,
}
