//! Completion entry points for asynchronous host operations.
//!
//! Boot, state-load and state-save requests issued by
//! [`RecordingEngine::create`] and [`RecordingEngine::play`] finish on the
//! host's schedule. The host calls exactly one of these functions when the
//! corresponding operation completes; each decides whether the event anchors
//! a pending session, re-anchors a running one, or is unrelated to recording
//! and ignored.

use crate::engine::RecordingEngine;
use crate::host::Host;

/// The emulated machine finished booting.
pub fn boot_complete(engine: &mut RecordingEngine, host: &mut dyn Host) {
    if engine.is_initial_load() {
        // A fresh boot always lands on absolute frame 0.
        engine.on_initial_load_complete(host, 0);
    } else if engine.is_active() {
        engine.reconcile_frame_counter(0);
    } else {
        host.resume();
    }
}

/// A requested savestate finished loading; `absolute_frame` is the host's
/// frame counter carried inside the state.
pub fn state_load_complete(
    engine: &mut RecordingEngine,
    host: &mut dyn Host,
    absolute_frame: u32,
) {
    if engine.is_initial_load() {
        engine.on_initial_load_complete(host, absolute_frame);
    } else if engine.is_active() {
        engine.reconcile_frame_counter(absolute_frame);
    }
}

/// A requested savestate finished saving; `absolute_frame` is the host's
/// frame counter at save time.
///
/// This is how a savestate-anchored recording session completes its initial
/// load: the companion state written here is the point the session starts
/// from.
pub fn state_saved(engine: &mut RecordingEngine, host: &mut dyn Host, absolute_frame: u32) {
    if engine.is_initial_load() {
        engine.on_initial_load_complete(host, absolute_frame);
    } else if engine.is_active() {
        tracing::trace!(absolute_frame, "savestate saved during an active session");
    }
}
