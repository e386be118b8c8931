//! Record/replay state machine.
//!
//! One [`RecordingEngine`] instance is owned by the host emulator core and
//! driven from the emulation thread: [`controller_interrupt`] runs once per
//! byte of the controller-poll handshake, per frame, per active slot, and is
//! allocation-free. Lifecycle operations (`create`, `play`, `stop`) take the
//! [`Host`] seam by reference and return before the requested boot or
//! savestate operation completes; the [`session`](crate::session) entry
//! points anchor the frame counter once the host reports completion.
//!
//! [`controller_interrupt`]: RecordingEngine::controller_interrupt

use std::path::{Path, PathBuf};

use crate::error::MovieError;
use crate::host::Host;
use crate::movie::{MAX_SLOTS, MovieFile, StartType};
use crate::pad::{PadState, REPORT_BYTES};

/// First byte of a recognized data-poll handshake (the read-data command).
pub const FIRST_HANDSHAKE_BYTE: u8 = 0x42;
/// Second byte of a recognized data-poll handshake (the pad's reply tag).
pub const SECOND_HANDSHAKE_BYTE: u8 = 0x5A;

const COMPANION_STATE_SUFFIX: &str = "_SaveState.sav";

/// Recording mode, tracked once globally and once per slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecordingMode {
    #[default]
    Inactive,
    Recording,
    Replaying,
}

/// One logical controller slot's share of the session state.
#[derive(Debug, Clone, Copy, Default)]
struct SlotState {
    mode: RecordingMode,
    /// Ordinal among active slots; `None` while the slot is unused.
    ordinal: Option<u8>,
    /// Semantic mirror of the last report bytes seen on this slot.
    pad: PadState,
    /// Editor-supplied byte overrides, consumed by the next matching poll byte.
    overrides: [Option<u8>; REPORT_BYTES],
}

/// The recording/replay engine: global and per-slot modes, the relative frame
/// counter, and the byte-level poll interceptor.
#[derive(Debug)]
pub struct RecordingEngine {
    movie: Option<MovieFile>,
    mode: RecordingMode,
    slots: [SlotState; MAX_SLOTS],
    /// Relative frame counter; negative after a state load to a point before
    /// the recorded range.
    frame_counter: i64,
    /// Host's absolute frame counter at session frame 0.
    starting_frame: u32,
    /// Set between a `create`/`play` request and its completion callback.
    initial_load: bool,
    /// Set after a rewind; the next recorded byte bumps the divergence count.
    pending_divergence: bool,
    /// True while inside a recognized data-poll sequence.
    interrupt_frame_active: bool,
    saved_multitap: Option<[bool; 2]>,
    saved_fast_boot: Option<bool>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self {
            movie: None,
            mode: RecordingMode::Inactive,
            slots: [SlotState::default(); MAX_SLOTS],
            frame_counter: 0,
            starting_frame: 0,
            initial_load: false,
            pending_divergence: false,
            interrupt_frame_active: false,
            saved_multitap: None,
            saved_fast_boot: None,
        }
    }

    /// Creates a new recording file and requests the boot or savestate save
    /// that will anchor it. The request completes asynchronously through
    /// [`session`](crate::session).
    pub fn create(
        &mut self,
        host: &mut dyn Host,
        path: &Path,
        start_type: StartType,
        author: &str,
        slot_mask: u8,
    ) -> Result<(), MovieError> {
        let mut movie = MovieFile::open_new(path, start_type, slot_mask, host.multitap_supported())?;
        movie.header_mut().set_emulator_version(&host.emulator_version());
        movie.header_mut().set_author(author);
        if let Some(game) = host.current_game_identity() {
            movie.header_mut().set_game_name(&game);
        }
        movie.write_header()?;

        self.mode = RecordingMode::Recording;
        self.initial_load = true;
        self.pending_divergence = false;
        self.movie = Some(movie);

        if start_type.is_savestate() {
            let state_path = companion_state_path(path);
            if state_path.exists() {
                // Keep the previous anchor recoverable if the new save fails.
                let mut backup = state_path.clone().into_os_string();
                backup.push(".bak");
                if let Err(err) = std::fs::copy(&state_path, PathBuf::from(backup)) {
                    tracing::warn!(error = %err, "failed to back up existing companion savestate");
                }
            }
            host.request_state_save(&state_path);
        } else {
            self.saved_fast_boot = Some(host.fast_boot_enabled());
            host.set_fast_boot(start_type.wants_fast_boot());
            host.request_boot();
        }
        tracing::info!(file = %path.display(), "created input recording");
        Ok(())
    }

    /// Opens an existing recording for replay and requests the boot or state
    /// load its start type calls for. Fails without touching engine state
    /// when a savestate-based recording cannot start.
    pub fn play(&mut self, host: &mut dyn Host, path: &Path) -> Result<(), MovieError> {
        let movie = MovieFile::open_existing(path, host.multitap_supported())?;
        let start_type = movie.header().start_type();

        if start_type.is_savestate() {
            if !host.is_running() {
                return Err(MovieError::EmulatorNotRunning);
            }
            let state_path = companion_state_path(path);
            if !state_path.exists() {
                return Err(MovieError::MissingCompanionState(state_path));
            }
            self.mode = RecordingMode::Replaying;
            self.initial_load = true;
            self.movie = Some(movie);
            host.request_state_load(&state_path);
        } else {
            if matches!(start_type, StartType::FullBoot | StartType::FastBoot) {
                self.saved_fast_boot = Some(host.fast_boot_enabled());
                host.set_fast_boot(start_type.wants_fast_boot());
            }
            self.mode = RecordingMode::Replaying;
            self.initial_load = true;
            self.movie = Some(movie);
            host.request_boot();
        }
        Ok(())
    }

    /// Anchors the session once the boot or state load requested by
    /// `create`/`play` has actually finished. Invoked exactly once per
    /// session, by [`session`](crate::session).
    pub fn on_initial_load_complete(&mut self, host: &mut dyn Host, absolute_frame: u32) {
        self.starting_frame = absolute_frame;
        self.frame_counter = 0;
        self.initial_load = false;

        let Some(movie) = self.movie.as_ref() else {
            tracing::warn!("initial load completed without an open movie file");
            return;
        };
        let slot_mask = movie.header().slot_mask();
        let from_savestate = movie.header().start_type().is_savestate();

        if self.mode == RecordingMode::Replaying {
            let header = movie.header();
            if let Some(current) = host.current_game_identity() {
                // The same logical game may exist under different dump
                // filenames, so a mismatch is only worth a warning.
                if current != header.game_name() {
                    tracing::warn!(
                        recorded = header.game_name(),
                        current = %current,
                        "recording was possibly made for a different game"
                    );
                }
            }
            tracing::info!(
                file = %movie.path().display(),
                emulator_version = header.emulator_version(),
                file_version = header.file_version(),
                game = header.game_name(),
                author = header.author(),
                total_frames = header.total_frames(),
                divergence_count = header.divergence_count(),
                "replaying input recording"
            );
            self.pending_divergence = true;
            self.activate_slots(host, slot_mask);
            self.set_to_replay(false);
        } else {
            tracing::info!(file = %movie.path().display(), "started new input recording");
            self.activate_slots(host, slot_mask);
            self.set_to_record(false);
        }

        if from_savestate {
            tracing::info!(starting_frame = absolute_frame, "session anchored to savestate frame");
        }
    }

    /// The hot path: one byte of the controller-poll handshake.
    ///
    /// `poll_index` 0 and 1 carry the handshake; payload bytes follow at
    /// `poll_index - 2`. Replaying slots overwrite `out` from the movie file;
    /// recording slots commit `out` (after any editor override) to it. I/O
    /// failures are logged and never abort the poll.
    pub fn controller_interrupt(&mut self, raw: u8, slot: usize, poll_index: usize, out: &mut u8) {
        if poll_index == 0 {
            self.interrupt_frame_active = raw == FIRST_HANDSHAKE_BYTE;
            return;
        }
        if poll_index == 1 {
            if *out != SECOND_HANDSHAKE_BYTE {
                // Not a data exchange; ignore the rest of this poll.
                self.interrupt_frame_active = false;
            }
            return;
        }
        if !self.interrupt_frame_active {
            return;
        }
        let data_index = poll_index - 2;
        if data_index >= REPORT_BYTES {
            return;
        }
        let Some(slot_state) = self.slots.get_mut(slot) else {
            return;
        };

        if slot_state.mode == RecordingMode::Replaying {
            if self.frame_counter >= 0 && self.frame_counter < i64::from(i32::MAX) {
                if let (Some(movie), Some(ordinal)) = (self.movie.as_mut(), slot_state.ordinal) {
                    match movie.read_byte(self.frame_counter as u32, ordinal, data_index) {
                        Ok(byte) => *out = byte,
                        Err(err) => tracing::error!(
                            frame = self.frame_counter,
                            slot,
                            error = %err,
                            "failed to read input data"
                        ),
                    }
                }
                slot_state.pad.decode(data_index, *out);
            }
            return;
        }

        // Recording or inactive: mirror the live byte first, then honor any
        // editor override before it is committed or sent to the game.
        slot_state.pad.decode(data_index, *out);
        if let Some(value) = slot_state.overrides[data_index].take() {
            slot_state.pad.decode(data_index, value);
            *out = slot_state.pad.encode(data_index);
        }

        if slot_state.mode == RecordingMode::Recording && self.frame_counter >= 0 {
            if self.pending_divergence {
                if let Some(movie) = self.movie.as_mut() {
                    if let Err(err) = movie.increment_divergence_count() {
                        tracing::error!(error = %err, "failed to persist divergence count");
                    }
                }
                self.pending_divergence = false;
            }
            if let (Some(movie), Some(ordinal)) = (self.movie.as_mut(), slot_state.ordinal) {
                if let Err(err) =
                    movie.write_byte(self.frame_counter as u32, ordinal, data_index, *out)
                {
                    tracing::error!(
                        frame = self.frame_counter,
                        slot,
                        error = %err,
                        "failed to write input data"
                    );
                }
            }
        }
    }

    /// Called once per emulated frame boundary (not per poll byte).
    pub fn advance_frame(&mut self) {
        if self.frame_counter < i64::from(i32::MAX) {
            self.frame_counter += 1;
            if self.mode == RecordingMode::Recording && self.frame_counter >= 0 {
                if let Some(movie) = self.movie.as_mut() {
                    match movie.set_total_frames(self.frame_counter as u32) {
                        // A genuinely new frame, not a rewrite of an old one.
                        Ok(true) => self.pending_divergence = false,
                        Ok(false) => {}
                        Err(err) => {
                            tracing::error!(error = %err, "failed to persist total frame count");
                        }
                    }
                }
            }
        }
    }

    /// Re-anchors the relative frame counter after the host's absolute frame
    /// counter was forcibly set by a state load mid-session. Out-of-range
    /// loads are warnings, never errors: the engine clamps the counter and
    /// switches modes to protect committed frames.
    pub fn reconcile_frame_counter(&mut self, absolute_frame: u32) {
        let total = self
            .movie
            .as_ref()
            .map(|movie| movie.header().total_frames())
            .unwrap_or(0);
        let start = i64::from(self.starting_frame);
        let end = start + i64::from(total);
        let absolute = i64::from(absolute_frame);

        if absolute >= end {
            if absolute > end {
                tracing::warn!(
                    absolute_frame,
                    "loaded a state past the end of the recording; clamping to its final frame"
                );
            }
            if self.mode == RecordingMode::Replaying {
                self.set_to_record(true);
            }
            self.frame_counter = i64::from(total);
            self.pending_divergence = false;
        } else {
            if absolute < start {
                tracing::warn!(
                    absolute_frame,
                    starting_frame = self.starting_frame,
                    "loaded a state before the start of the recording"
                );
                if self.mode == RecordingMode::Recording {
                    self.set_to_replay(true);
                }
            } else if absolute_frame == 0 && self.mode == RecordingMode::Recording {
                // Loading to the very beginning is a rewind to the start.
                self.set_to_replay(true);
            }
            self.frame_counter = absolute - start;
            self.pending_divergence = true;
        }
    }

    /// Forces the session into Recording; slots currently Replaying follow,
    /// inactive slots stay untouched.
    pub fn set_to_record(&mut self, announce: bool) {
        self.mode = RecordingMode::Recording;
        for slot in &mut self.slots {
            if slot.mode == RecordingMode::Replaying {
                slot.mode = RecordingMode::Recording;
            }
        }
        if announce {
            tracing::info!("record mode on");
        }
    }

    /// Forces the session into Replaying; slots currently Recording follow,
    /// inactive slots stay untouched.
    pub fn set_to_replay(&mut self, announce: bool) {
        self.mode = RecordingMode::Replaying;
        for slot in &mut self.slots {
            if slot.mode == RecordingMode::Recording {
                slot.mode = RecordingMode::Replaying;
            }
        }
        if announce {
            tracing::info!("replay mode on");
        }
    }

    /// Ends the session: closes the movie file and restores the host
    /// configuration this session overrode.
    pub fn stop(&mut self, host: &mut dyn Host) {
        if let Some([port0, port1]) = self.saved_multitap.take() {
            host.set_multitap_enabled(0, port0);
            host.set_multitap_enabled(1, port1);
        }
        let from_savestate = self
            .movie
            .as_ref()
            .map(|movie| movie.header().start_type().is_savestate())
            .unwrap_or(false);
        if let Some(fast_boot) = self.saved_fast_boot.take() {
            if !from_savestate {
                host.set_fast_boot(fast_boot);
            }
        }

        self.mode = RecordingMode::Inactive;
        self.initial_load = false;
        self.pending_divergence = false;
        self.interrupt_frame_active = false;
        for slot in &mut self.slots {
            *slot = SlotState::default();
        }
        if let Some(movie) = self.movie.take() {
            if let Err(err) = movie.close() {
                tracing::warn!(error = %err, "failed to close movie file cleanly");
            }
        }
        tracing::info!("input recording stopped");
    }

    /// Aborts a session whose just-requested boot or state load failed (for
    /// example an incompatible companion savestate) and resumes normal
    /// execution.
    pub fn on_open_failure(&mut self, host: &mut dyn Host) {
        if let Some(movie) = self.movie.take() {
            tracing::error!(
                file = %movie.path().display(),
                "aborting session; its initial state could not be loaded"
            );
            let _ = movie.close();
        }
        self.initial_load = false;
        self.mode = RecordingMode::Inactive;
        host.resume();
    }

    /// Rewinds the session to its first frame by re-issuing the boot or
    /// companion state load; a Recording session demotes to Replaying so the
    /// committed frames are preserved.
    pub fn go_to_first_frame(&mut self, host: &mut dyn Host) -> Result<(), MovieError> {
        let movie = self.movie.as_ref().ok_or(MovieError::NotOpen)?;
        if movie.header().start_type().is_savestate() {
            let state_path = companion_state_path(movie.path());
            if !state_path.exists() {
                return Err(MovieError::MissingCompanionState(state_path));
            }
            host.request_state_load(&state_path);
        } else {
            host.request_boot();
        }
        if self.mode == RecordingMode::Recording {
            self.set_to_replay(true);
        }
        Ok(())
    }

    /// Queues an editor-supplied byte for a slot. Honored only while the slot
    /// is not Replaying; applied before the byte is mirrored and committed by
    /// the next matching poll, then cleared.
    pub fn submit_override(&mut self, slot: usize, byte_index: usize, value: u8) {
        let Some(slot_state) = self.slots.get_mut(slot) else {
            return;
        };
        if byte_index >= REPORT_BYTES || slot_state.mode == RecordingMode::Replaying {
            return;
        }
        slot_state.overrides[byte_index] = Some(value);
    }

    /// Trace-level dump of each active slot's raw report bytes.
    pub fn log_pad_states(&self) {
        for (index, slot) in self.slots.iter().enumerate() {
            if slot.ordinal.is_none() {
                continue;
            }
            let mut bytes = [0u8; REPORT_BYTES];
            for (i, byte) in bytes.iter_mut().enumerate() {
                *byte = slot.pad.encode(i);
            }
            tracing::trace!(
                slot = %slot_name(index),
                pressed = ?&bytes[0..2],
                right_analog = ?&bytes[2..4],
                left_analog = ?&bytes[4..6],
                pressure = ?&bytes[6..],
                "pad state"
            );
        }
    }

    #[inline]
    pub fn frame_counter(&self) -> i64 {
        self.frame_counter
    }

    #[inline]
    pub fn starting_frame(&self) -> u32 {
        self.starting_frame
    }

    #[inline]
    pub fn mode(&self) -> RecordingMode {
        self.mode
    }

    #[inline]
    pub fn is_recording(&self) -> bool {
        self.mode == RecordingMode::Recording
    }

    #[inline]
    pub fn is_replaying(&self) -> bool {
        self.mode == RecordingMode::Replaying
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.mode != RecordingMode::Inactive
    }

    /// Whether the session is waiting for its initial boot or state load to
    /// complete.
    #[inline]
    pub fn is_initial_load(&self) -> bool {
        self.initial_load
    }

    /// Whether the current poll is a recognized data-poll sequence.
    #[inline]
    pub fn is_interrupt_frame(&self) -> bool {
        self.interrupt_frame_active
    }

    /// Mode of one logical slot; out-of-range slots read as Inactive.
    pub fn slot_mode(&self, slot: usize) -> RecordingMode {
        self.slots.get(slot).map(|s| s.mode).unwrap_or_default()
    }

    /// Pad-state mirror of an active slot, for display consumers.
    pub fn pad_state(&self, slot: usize) -> Option<&PadState> {
        self.slots
            .get(slot)
            .filter(|s| s.ordinal.is_some())
            .map(|s| &s.pad)
    }

    #[inline]
    pub fn movie(&self) -> Option<&MovieFile> {
        self.movie.as_ref()
    }

    /// Mode string for the host's title bar.
    pub fn mode_label(&self) -> &'static str {
        match self.mode {
            RecordingMode::Recording => "Recording",
            RecordingMode::Replaying => "Replaying",
            RecordingMode::Inactive => "No Movie",
        }
    }

    /// Applies the slot mask to the slot table and enables any multitap
    /// ports the recording needs, buffering the previous settings.
    fn activate_slots(&mut self, host: &mut dyn Host, slot_mask: u8) {
        self.saved_multitap = Some([host.multitap_enabled(0), host.multitap_enabled(1)]);
        for port in 0..2 {
            let needs_multitap = slot_mask & (0b1110 << (port * 4)) != 0;
            if needs_multitap && !host.multitap_enabled(port) {
                host.set_multitap_enabled(port, true);
            }
        }

        let mut ordinal = 0u8;
        let mut names = String::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot_mask & (1 << index) != 0 {
                slot.mode = self.mode;
                slot.ordinal = Some(ordinal);
                ordinal += 1;
                if !names.is_empty() {
                    names.push_str(", ");
                }
                names.push_str(&slot_name(index));
            } else {
                slot.mode = RecordingMode::Inactive;
                slot.ordinal = None;
            }
            slot.pad = PadState::default();
            slot.overrides = [None; REPORT_BYTES];
        }
        tracing::info!(slots = %names, "active controller slots");
    }
}

impl Default for RecordingEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Human-readable slot name: port number plus sub-slot letter ("1A".."2D").
fn slot_name(slot: usize) -> String {
    let port = slot / 4 + 1;
    let sub = (b'A' + (slot % 4) as u8) as char;
    format!("{port}{sub}")
}

/// Path of the savestate paired with a recording that starts mid-game.
pub fn companion_state_path(movie_path: &Path) -> PathBuf {
    let mut path = movie_path.as_os_str().to_os_string();
    path.push(COMPANION_STATE_SUFFIX);
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::movie::StartType;

    #[derive(Debug)]
    struct MockHost {
        running: bool,
        multitap_supported: bool,
        multitap: [bool; 2],
        fast_boot: bool,
        boots: usize,
        state_loads: Vec<PathBuf>,
        state_saves: Vec<PathBuf>,
        resumes: usize,
        game: Option<String>,
    }

    impl Default for MockHost {
        fn default() -> Self {
            Self {
                running: true,
                multitap_supported: true,
                multitap: [false; 2],
                fast_boot: false,
                boots: 0,
                state_loads: Vec::new(),
                state_saves: Vec::new(),
                resumes: 0,
                game: Some("Test Game (NTSC-U)".to_string()),
            }
        }
    }

    impl Host for MockHost {
        fn request_boot(&mut self) {
            self.boots += 1;
        }

        fn request_state_load(&mut self, path: &Path) {
            self.state_loads.push(path.to_path_buf());
        }

        fn request_state_save(&mut self, path: &Path) {
            self.state_saves.push(path.to_path_buf());
        }

        fn current_game_identity(&self) -> Option<String> {
            self.game.clone()
        }

        fn emulator_version(&self) -> String {
            "padtape-test".to_string()
        }

        fn is_running(&self) -> bool {
            self.running
        }

        fn multitap_supported(&self) -> bool {
            self.multitap_supported
        }

        fn multitap_enabled(&self, port: usize) -> bool {
            self.multitap[port]
        }

        fn set_multitap_enabled(&mut self, port: usize, enabled: bool) {
            self.multitap[port] = enabled;
        }

        fn fast_boot_enabled(&self) -> bool {
            self.fast_boot
        }

        fn set_fast_boot(&mut self, enabled: bool) {
            self.fast_boot = enabled;
        }

        fn resume(&mut self) {
            self.resumes += 1;
        }
    }

    /// Drives one full data poll for a slot, returning the bytes the game saw.
    fn poll_frame(
        engine: &mut RecordingEngine,
        slot: usize,
        input: &[u8; REPORT_BYTES],
    ) -> [u8; REPORT_BYTES] {
        let mut scratch = 0u8;
        engine.controller_interrupt(FIRST_HANDSHAKE_BYTE, slot, 0, &mut scratch);
        let mut reply = SECOND_HANDSHAKE_BYTE;
        engine.controller_interrupt(0, slot, 1, &mut reply);
        let mut seen = [0u8; REPORT_BYTES];
        for (index, &byte) in input.iter().enumerate() {
            let mut out = byte;
            engine.controller_interrupt(0, slot, index + 2, &mut out);
            seen[index] = out;
        }
        seen
    }

    /// Creates a boot-anchored recording session on slot 0 and records
    /// `frames` frames of a fixed pattern.
    fn recording_session(
        dir: &tempfile::TempDir,
        host: &mut MockHost,
        frames: u32,
    ) -> RecordingEngine {
        let path = dir.path().join("session.ptm");
        let mut engine = RecordingEngine::new();
        engine
            .create(host, &path, StartType::FullBoot, "tester", 0b1)
            .unwrap();
        engine.on_initial_load_complete(host, 0);
        for frame in 0..frames {
            poll_frame(&mut engine, 0, &[frame as u8; REPORT_BYTES]);
            engine.advance_frame();
        }
        engine
    }

    #[test]
    fn handshake_gates_the_payload() {
        let mut engine = RecordingEngine::new();
        let mut out = 0u8;
        engine.controller_interrupt(FIRST_HANDSHAKE_BYTE, 0, 0, &mut out);
        assert!(engine.is_interrupt_frame());

        // A non-data reply tag cancels the sequence.
        let mut reply = 0x00;
        engine.controller_interrupt(0, 0, 1, &mut reply);
        assert!(!engine.is_interrupt_frame());

        // A non-poll command never opens a sequence.
        engine.controller_interrupt(0x43, 0, 0, &mut out);
        assert!(!engine.is_interrupt_frame());
    }

    #[test]
    fn create_requests_boot_and_anchors_on_completion() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = MockHost::default();
        let path = dir.path().join("new.ptm");
        let mut engine = RecordingEngine::new();
        engine
            .create(&mut host, &path, StartType::FastBoot, "tester", 0b1)
            .unwrap();

        assert_eq!(host.boots, 1);
        assert!(host.fast_boot);
        assert!(engine.is_initial_load());
        assert!(engine.is_recording());

        engine.on_initial_load_complete(&mut host, 0);
        assert!(!engine.is_initial_load());
        assert_eq!(engine.frame_counter(), 0);
        assert_eq!(engine.slot_mode(0), RecordingMode::Recording);
        assert_eq!(engine.slot_mode(1), RecordingMode::Inactive);

        let header = engine.movie().unwrap().header();
        assert_eq!(header.author(), "tester");
        assert_eq!(header.emulator_version(), "padtape-test");
        assert_eq!(header.game_name(), "Test Game (NTSC-U)");
    }

    #[test]
    fn recording_tracks_total_frames_monotonically() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = MockHost::default();
        let engine = recording_session(&dir, &mut host, 10);
        assert_eq!(engine.movie().unwrap().header().total_frames(), 10);
        assert_eq!(engine.frame_counter(), 10);
    }

    #[test]
    fn reconcile_clamps_and_switches_modes() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = MockHost::default();

        // starting_frame = 100, total_frames = 50, end = 150.
        let path = dir.path().join("anchored.ptm");
        let mut engine = RecordingEngine::new();
        engine
            .create(&mut host, &path, StartType::Savestate, "tester", 0b1)
            .unwrap();
        assert_eq!(host.state_saves.len(), 1);
        engine.on_initial_load_complete(&mut host, 100);
        assert_eq!(engine.starting_frame(), 100);
        for frame in 0..50u32 {
            poll_frame(&mut engine, 0, &[frame as u8; REPORT_BYTES]);
            engine.advance_frame();
        }

        // Past the end: clamp to the final frame and promote replay to record.
        engine.set_to_replay(false);
        engine.reconcile_frame_counter(200);
        assert_eq!(engine.frame_counter(), 50);
        assert!(engine.is_recording());

        // Before the start: negative counter and demotion to replay.
        engine.reconcile_frame_counter(50);
        assert_eq!(engine.frame_counter(), -50);
        assert!(engine.is_replaying());

        // Inside the recorded range: re-anchor without a mode change.
        engine.reconcile_frame_counter(120);
        assert_eq!(engine.frame_counter(), 20);
        assert!(engine.is_replaying());

        // Exactly at the end: clamp and promote, same as past-the-end.
        engine.reconcile_frame_counter(150);
        assert_eq!(engine.frame_counter(), 50);
        assert!(engine.is_recording());
    }

    #[test]
    fn rewound_recording_counts_one_divergence() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = MockHost::default();
        let mut engine = recording_session(&dir, &mut host, 20);
        assert_eq!(engine.movie().unwrap().header().divergence_count(), 0);

        // Rewind to frame 5 and keep recording: the first overwritten frame
        // counts exactly one divergence.
        engine.reconcile_frame_counter(5);
        engine.set_to_record(false);
        poll_frame(&mut engine, 0, &[0xAA; REPORT_BYTES]);
        assert_eq!(engine.movie().unwrap().header().divergence_count(), 1);

        engine.advance_frame();
        poll_frame(&mut engine, 0, &[0xBB; REPORT_BYTES]);
        assert_eq!(engine.movie().unwrap().header().divergence_count(), 1);
    }

    #[test]
    fn rewind_to_frame_zero_demotes_to_replay() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = MockHost::default();
        let mut engine = recording_session(&dir, &mut host, 8);
        engine.reconcile_frame_counter(0);
        assert!(engine.is_replaying());
        assert_eq!(engine.frame_counter(), 0);
    }

    #[test]
    fn overrides_apply_once_while_not_replaying() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = MockHost::default();
        let mut engine = recording_session(&dir, &mut host, 1);

        // Byte 2 is the right stick X axis; the override replaces the live value.
        engine.submit_override(0, 2, 0x77);
        let seen = poll_frame(&mut engine, 0, &[0x10; REPORT_BYTES]);
        assert_eq!(seen[2], 0x77);

        // Consumed: the next poll sees the live value again.
        let seen = poll_frame(&mut engine, 0, &[0x10; REPORT_BYTES]);
        assert_eq!(seen[2], 0x10);
    }

    #[test]
    fn overrides_are_ignored_while_replaying() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = MockHost::default();
        let mut engine = recording_session(&dir, &mut host, 2);
        engine.set_to_replay(false);
        engine.reconcile_frame_counter(0);

        engine.submit_override(0, 2, 0x77);
        let seen = poll_frame(&mut engine, 0, &[0u8; REPORT_BYTES]);
        // Frame 0 was recorded with the pattern byte 0.
        assert_eq!(seen[2], 0);
    }

    #[test]
    fn play_fails_cleanly_without_companion_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = MockHost::default();
        let path = dir.path().join("anchored.ptm");

        let mut engine = RecordingEngine::new();
        engine
            .create(&mut host, &path, StartType::Savestate, "tester", 0b1)
            .unwrap();
        engine.on_initial_load_complete(&mut host, 42);
        engine.stop(&mut host);

        // No companion savestate was ever written by the mock host.
        let mut replay = RecordingEngine::new();
        let err = replay.play(&mut host, &path).expect_err("must not start");
        assert!(matches!(err, MovieError::MissingCompanionState(_)));
        assert!(!replay.is_active());
        assert!(!replay.is_initial_load());
    }

    #[test]
    fn savestate_replay_requires_a_running_emulator() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = MockHost::default();
        let path = dir.path().join("anchored.ptm");

        let mut engine = RecordingEngine::new();
        engine
            .create(&mut host, &path, StartType::Savestate, "tester", 0b1)
            .unwrap();
        engine.on_initial_load_complete(&mut host, 0);
        engine.stop(&mut host);
        std::fs::write(companion_state_path(&path), b"state").unwrap();

        host.running = false;
        let mut replay = RecordingEngine::new();
        let err = replay.play(&mut host, &path).expect_err("must not start");
        assert!(matches!(err, MovieError::EmulatorNotRunning));
        assert!(!replay.is_active());

        host.running = true;
        replay.play(&mut host, &path).unwrap();
        assert_eq!(host.state_loads.len(), 1);
        assert!(replay.is_replaying());
    }

    #[test]
    fn stop_restores_overridden_host_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = MockHost::default();
        host.fast_boot = true;

        let path = dir.path().join("multitap.ptm");
        let mut engine = RecordingEngine::new();
        // Slot 1B needs the port-0 multitap.
        engine
            .create(&mut host, &path, StartType::FullBoot, "tester", 0b0000_0011)
            .unwrap();
        assert!(!host.fast_boot);
        engine.on_initial_load_complete(&mut host, 0);
        assert!(host.multitap[0]);

        engine.stop(&mut host);
        assert!(!host.multitap[0]);
        assert!(host.fast_boot);
        assert!(!engine.is_active());
        assert!(engine.movie().is_none());
        assert_eq!(engine.slot_mode(1), RecordingMode::Inactive);
    }

    #[test]
    fn open_failure_goes_inactive_and_resumes() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = MockHost::default();
        let path = dir.path().join("anchored.ptm");

        let mut engine = RecordingEngine::new();
        engine
            .create(&mut host, &path, StartType::Savestate, "tester", 0b1)
            .unwrap();
        engine.on_open_failure(&mut host);
        assert!(!engine.is_active());
        assert!(!engine.is_initial_load());
        assert!(engine.movie().is_none());
        assert_eq!(host.resumes, 1);
    }

    #[test]
    fn go_to_first_frame_demotes_and_reboots() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = MockHost::default();
        let mut engine = recording_session(&dir, &mut host, 4);
        let boots_before = host.boots;

        engine.go_to_first_frame(&mut host).unwrap();
        assert_eq!(host.boots, boots_before + 1);
        assert!(engine.is_replaying());
    }

    #[test]
    fn mode_label_reflects_the_session() {
        let mut engine = RecordingEngine::new();
        assert_eq!(engine.mode_label(), "No Movie");
        engine.set_to_record(false);
        assert_eq!(engine.mode_label(), "Recording");
        engine.set_to_replay(false);
        assert_eq!(engine.mode_label(), "Replaying");
    }
}
