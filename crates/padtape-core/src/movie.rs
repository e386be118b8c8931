//! Versioned binary movie file: header plus a seek-addressable stream of
//! fixed-size per-frame byte blocks.
//!
//! A frame block holds one frame's report bytes for every active slot,
//! contiguously, in slot-ordinal order. All geometry comes from the
//! [`Layout`] descriptor derived at open time; frame I/O never re-inspects
//! the file version.
//!
//! The frame and divergence counters are point-written and synced on every
//! change so an abrupt termination cannot silently truncate recorded
//! progress. Per-byte frame I/O reports failures to the caller instead of
//! panicking; the engine logs and keeps emulation running.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::MovieError;
use crate::pad::REPORT_BYTES;

pub mod header;

pub use header::{FILE_VERSION, LEGACY_FILE_VERSION, Layout, MAX_SLOTS, MovieHeader, StartType};

use header::{MULTITAP_MASK_BITS, SEEKPOINT_DIVERGENCE_COUNT, SEEKPOINT_TOTAL_FRAMES};

/// An open movie file handle plus its parsed header and layout.
#[derive(Debug)]
pub struct MovieFile {
    file: File,
    path: PathBuf,
    header: MovieHeader,
    layout: Layout,
}

impl MovieFile {
    /// Creates a new movie file in the current format version.
    ///
    /// Fails when the slot mask is empty or requests multitap slots on a
    /// platform without multitap support. The header is initialized in memory
    /// but not yet written; the caller populates the metadata fields and then
    /// calls [`write_header`](Self::write_header).
    pub fn open_new(
        path: &Path,
        start_type: StartType,
        slot_mask: u8,
        multitap_supported: bool,
    ) -> Result<Self, MovieError> {
        if slot_mask == 0 {
            return Err(MovieError::EmptySlotMask);
        }
        if slot_mask & MULTITAP_MASK_BITS != 0 && !multitap_supported {
            return Err(MovieError::MultitapUnsupported);
        }
        let header = MovieHeader::new(start_type, slot_mask);
        let layout = Layout::for_version(FILE_VERSION, slot_mask)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            header,
            layout,
        })
    }

    /// Opens an existing movie file, parsing and validating its header.
    ///
    /// Any format error closes the file and leaves no handle held.
    pub fn open_existing(path: &Path, multitap_supported: bool) -> Result<Self, MovieError> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let header = MovieHeader::read_from(&mut file)?;
        if (header.uses_multitap(0) || header.uses_multitap(1)) && !multitap_supported {
            return Err(MovieError::MultitapUnsupported);
        }
        let layout = Layout::for_version(header.file_version(), header.slot_mask())?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            header,
            layout,
        })
    }

    /// Serializes the full fixed-position header.
    pub fn write_header(&mut self) -> Result<(), MovieError> {
        self.header.write_to(&mut self.file)?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Reads one report byte at `(frame, slot ordinal, byte index)`.
    pub fn read_byte(
        &mut self,
        frame: u32,
        slot_ordinal: u8,
        byte_index: usize,
    ) -> Result<u8, MovieError> {
        debug_assert!(byte_index < REPORT_BYTES);
        let offset = self.layout.byte_offset(frame, slot_ordinal, byte_index);
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = [0u8; 1];
        self.file.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    /// Writes one report byte at `(frame, slot ordinal, byte index)`.
    pub fn write_byte(
        &mut self,
        frame: u32,
        slot_ordinal: u8,
        byte_index: usize,
        value: u8,
    ) -> Result<(), MovieError> {
        debug_assert!(byte_index < REPORT_BYTES);
        let offset = self.layout.byte_offset(frame, slot_ordinal, byte_index);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&[value])?;
        Ok(())
    }

    /// Extends the persisted total frame count to `frame` when it grew.
    ///
    /// Returns `true` when the total was extended or `frame` sits exactly at
    /// the existing boundary; the caller uses this to decide whether an
    /// upcoming overwrite is a divergence. The counter is point-written and
    /// synced immediately.
    pub fn set_total_frames(&mut self, frame: u32) -> Result<bool, MovieError> {
        if frame > self.header.total_frames() {
            self.header.set_total_frames(frame);
            self.point_write_u32(SEEKPOINT_TOTAL_FRAMES, frame)?;
            Ok(true)
        } else {
            self.file.sync_data()?;
            Ok(frame == self.header.total_frames())
        }
    }

    /// Bumps the persisted divergence counter by one.
    pub fn increment_divergence_count(&mut self) -> Result<(), MovieError> {
        let count = self.header.divergence_count() + 1;
        self.header.set_divergence_count(count);
        self.point_write_u32(SEEKPOINT_DIVERGENCE_COUNT, count)
    }

    fn point_write_u32(&mut self, offset: u64, value: u32) -> Result<(), MovieError> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&value.to_le_bytes())?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Flushes and closes the file, consuming the handle.
    pub fn close(self) -> Result<(), MovieError> {
        self.file.sync_all()?;
        Ok(())
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn header(&self) -> &MovieHeader {
        &self.header
    }

    #[inline]
    pub fn header_mut(&mut self) -> &mut MovieHeader {
        &mut self.header
    }

    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }
}
