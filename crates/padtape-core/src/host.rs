//! Seam between the recording engine and the host emulator.
//!
//! Boot and savestate operations are asynchronous: a request returns
//! immediately and the host reports completion later through the entry points
//! in [`session`](crate::session). The engine never assumes synchronous
//! completion.

use std::path::Path;

/// Services the host emulator provides to the recording engine.
///
/// Passed as `&mut dyn Host` into the lifecycle operations; the engine keeps
/// no reference to it between calls.
pub trait Host {
    /// Requests a (re)boot of the emulated machine.
    fn request_boot(&mut self);

    /// Requests loading a savestate from `path`.
    fn request_state_load(&mut self, path: &Path);

    /// Requests saving a savestate to `path`.
    fn request_state_save(&mut self, path: &Path);

    /// Identity of the currently loaded game, when one is known.
    fn current_game_identity(&self) -> Option<String>;

    /// Version string of the host emulator, stamped into new recordings.
    fn emulator_version(&self) -> String;

    /// Whether emulation is currently running.
    fn is_running(&self) -> bool;

    /// Whether this platform supports multitap slots at all.
    fn multitap_supported(&self) -> bool;

    /// Whether the multitap is enabled on the given port (0 or 1).
    fn multitap_enabled(&self, port: usize) -> bool;

    fn set_multitap_enabled(&mut self, port: usize, enabled: bool);

    fn fast_boot_enabled(&self) -> bool;

    fn set_fast_boot(&mut self, enabled: bool);

    /// Resumes normal, non-recording execution after an aborted open.
    fn resume(&mut self);
}
