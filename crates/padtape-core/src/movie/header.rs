//! Movie header serialization and version dispatch.
//!
//! The header occupies a fixed-position prefix of the file. Version dispatch
//! happens exactly once, at open time, and produces a normalized [`Layout`]
//! descriptor; no other part of the crate inspects the file version.
//!
//! Version 2 (current) layout:
//!
//! ```text
//! [1B version][64B emulator version][64B author][64B game name]
//! [4B total frames LE][4B divergence count LE][1B start type][1B slot mask]
//! [frame-block stream]
//! ```
//!
//! Version 1 (legacy) omits the slot mask, always stores exactly two slots
//! (ports 1 and 2, primary sub-slot) at 18 bytes each, and stores a boolean
//! at the start-type offset: zero means an unspecified boot, nonzero means
//! the recording starts from a savestate.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::MovieError;
use crate::pad::REPORT_BYTES;

/// Current on-disk format version.
pub const FILE_VERSION: u8 = 2;
/// Legacy format version still accepted for replay.
pub const LEGACY_FILE_VERSION: u8 = 1;

/// Capacity of the three null-padded text fields.
pub const TEXT_FIELD_LEN: usize = 64;

/// Number of logical controller slots a mask can address (2 ports x 4
/// multitap positions).
pub const MAX_SLOTS: usize = 8;

/// Implicit slot mask for legacy files: ports 1 and 2, primary sub-slot.
pub(crate) const LEGACY_SLOT_MASK: u8 = 0b0001_0001;

const FIXED_PREFIX_LEN: usize = 202;
pub(crate) const SEEKPOINT_TOTAL_FRAMES: u64 = 193;
pub(crate) const SEEKPOINT_DIVERGENCE_COUNT: u64 = 197;
const OFFSET_START_TYPE: usize = 201;

const LEGACY_DATA_OFFSET: u64 = 202;
const CURRENT_DATA_OFFSET: u64 = 203;
const LEGACY_BYTES_PER_SLOT: u64 = 18;
const LEGACY_BLOCK_SIZE: u64 = 36;

/// Mask bits that require a multitap on either port (any sub-slot past the
/// primary one).
pub(crate) const MULTITAP_MASK_BITS: u8 = 0b1110_1110;

/// How a session must be (re)initialized when the movie is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StartType {
    #[default]
    UnspecifiedBoot,
    FullBoot,
    FastBoot,
    Savestate,
}

impl StartType {
    /// Whether the session is anchored to a companion savestate rather than a
    /// power-on boot.
    #[inline]
    pub fn is_savestate(self) -> bool {
        matches!(self, Self::Savestate)
    }

    /// Whether the boot path must use fast boot.
    #[inline]
    pub fn wants_fast_boot(self) -> bool {
        matches!(self, Self::FastBoot)
    }

    fn to_byte(self) -> u8 {
        match self {
            Self::UnspecifiedBoot => 0,
            Self::FullBoot => 1,
            Self::FastBoot => 2,
            Self::Savestate => 3,
        }
    }

    fn from_byte(byte: u8) -> Self {
        match byte {
            1 => Self::FullBoot,
            2 => Self::FastBoot,
            3 => Self::Savestate,
            // Unknown values degrade to an unspecified boot rather than
            // rejecting an otherwise readable file.
            _ => Self::UnspecifiedBoot,
        }
    }

    fn from_legacy_byte(byte: u8) -> Self {
        if byte == 0 {
            Self::UnspecifiedBoot
        } else {
            Self::Savestate
        }
    }
}

/// Normalized frame-stream geometry, derived once at open time from the file
/// version and slot mask. Fixed for the lifetime of an open file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub slot_count: u8,
    pub bytes_per_slot: u64,
    pub block_size: u64,
    pub data_offset: u64,
}

impl Layout {
    pub(crate) fn for_version(version: u8, slot_mask: u8) -> Result<Self, MovieError> {
        match version {
            LEGACY_FILE_VERSION => Ok(Self {
                slot_count: 2,
                bytes_per_slot: LEGACY_BYTES_PER_SLOT,
                block_size: LEGACY_BLOCK_SIZE,
                data_offset: LEGACY_DATA_OFFSET,
            }),
            FILE_VERSION => {
                if slot_mask == 0 {
                    return Err(MovieError::EmptySlotMask);
                }
                let slot_count = slot_mask.count_ones() as u8;
                Ok(Self {
                    slot_count,
                    bytes_per_slot: REPORT_BYTES as u64,
                    block_size: REPORT_BYTES as u64 * u64::from(slot_count),
                    data_offset: CURRENT_DATA_OFFSET,
                })
            }
            other => Err(MovieError::UnsupportedVersion(other)),
        }
    }

    /// Absolute file offset of one report byte.
    #[inline]
    pub fn byte_offset(&self, frame: u32, slot_ordinal: u8, byte_index: usize) -> u64 {
        self.data_offset
            + u64::from(frame) * self.block_size
            + u64::from(slot_ordinal) * self.bytes_per_slot
            + byte_index as u64
    }
}

/// In-memory copy of the fixed-position header prefix.
#[derive(Debug, Clone)]
pub struct MovieHeader {
    file_version: u8,
    emulator_version: [u8; TEXT_FIELD_LEN],
    author: [u8; TEXT_FIELD_LEN],
    game_name: [u8; TEXT_FIELD_LEN],
    total_frames: u32,
    divergence_count: u32,
    start_type: StartType,
    slot_mask: u8,
}

impl MovieHeader {
    pub(crate) fn new(start_type: StartType, slot_mask: u8) -> Self {
        Self {
            file_version: FILE_VERSION,
            emulator_version: [0; TEXT_FIELD_LEN],
            author: [0; TEXT_FIELD_LEN],
            game_name: [0; TEXT_FIELD_LEN],
            total_frames: 0,
            divergence_count: 0,
            start_type,
            slot_mask,
        }
    }

    pub(crate) fn read_from(file: &mut File) -> Result<Self, MovieError> {
        let mut prefix = [0u8; FIXED_PREFIX_LEN];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut prefix)?;

        let file_version = prefix[0];
        let (start_type, slot_mask) = match file_version {
            LEGACY_FILE_VERSION => (
                StartType::from_legacy_byte(prefix[OFFSET_START_TYPE]),
                LEGACY_SLOT_MASK,
            ),
            FILE_VERSION => {
                let mut mask = [0u8; 1];
                file.read_exact(&mut mask)?;
                if mask[0] == 0 {
                    return Err(MovieError::EmptySlotMask);
                }
                (StartType::from_byte(prefix[OFFSET_START_TYPE]), mask[0])
            }
            other => return Err(MovieError::UnsupportedVersion(other)),
        };

        let mut emulator_version = [0u8; TEXT_FIELD_LEN];
        let mut author = [0u8; TEXT_FIELD_LEN];
        let mut game_name = [0u8; TEXT_FIELD_LEN];
        emulator_version.copy_from_slice(&prefix[1..65]);
        author.copy_from_slice(&prefix[65..129]);
        game_name.copy_from_slice(&prefix[129..193]);

        Ok(Self {
            file_version,
            emulator_version,
            author,
            game_name,
            total_frames: u32::from_le_bytes([prefix[193], prefix[194], prefix[195], prefix[196]]),
            divergence_count: u32::from_le_bytes([
                prefix[197], prefix[198], prefix[199], prefix[200],
            ]),
            start_type,
            slot_mask,
        })
    }

    pub(crate) fn write_to(&self, file: &mut File) -> Result<(), MovieError> {
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&[self.file_version])?;
        file.write_all(&self.emulator_version)?;
        file.write_all(&self.author)?;
        file.write_all(&self.game_name)?;
        file.write_all(&self.total_frames.to_le_bytes())?;
        file.write_all(&self.divergence_count.to_le_bytes())?;
        file.write_all(&[self.start_type.to_byte()])?;
        if self.file_version == FILE_VERSION {
            file.write_all(&[self.slot_mask])?;
        }
        Ok(())
    }

    #[inline]
    pub fn file_version(&self) -> u8 {
        self.file_version
    }

    pub fn emulator_version(&self) -> &str {
        text_field(&self.emulator_version)
    }

    pub fn author(&self) -> &str {
        text_field(&self.author)
    }

    pub fn game_name(&self) -> &str {
        text_field(&self.game_name)
    }

    #[inline]
    pub fn total_frames(&self) -> u32 {
        self.total_frames
    }

    #[inline]
    pub fn divergence_count(&self) -> u32 {
        self.divergence_count
    }

    #[inline]
    pub fn start_type(&self) -> StartType {
        self.start_type
    }

    #[inline]
    pub fn slot_mask(&self) -> u8 {
        self.slot_mask
    }

    /// Number of active slots in this recording.
    #[inline]
    pub fn slot_count(&self) -> u8 {
        self.slot_mask.count_ones() as u8
    }

    /// Whether the logical slot (0-7, port * 4 + sub-slot) is part of this
    /// recording.
    #[inline]
    pub fn is_slot_active(&self, slot: usize) -> bool {
        slot < MAX_SLOTS && self.slot_mask & (1 << slot) != 0
    }

    /// Whether the recording needs a multitap on the given port (0 or 1).
    pub fn uses_multitap(&self, port: usize) -> bool {
        let port_bits = 0b1110u8 << (port * 4);
        self.slot_mask & port_bits != 0
    }

    /// Ordinal position of an active slot among all active slots, used to
    /// locate its bytes inside a frame block.
    pub fn slot_ordinal(&self, slot: usize) -> Option<u8> {
        if !self.is_slot_active(slot) {
            return None;
        }
        let below = self.slot_mask & ((1u8 << slot) - 1);
        Some(below.count_ones() as u8)
    }

    pub fn set_emulator_version(&mut self, version: &str) {
        copy_text_field(&mut self.emulator_version, version);
    }

    pub fn set_author(&mut self, author: &str) {
        copy_text_field(&mut self.author, author);
    }

    pub fn set_game_name(&mut self, game_name: &str) {
        copy_text_field(&mut self.game_name, game_name);
    }

    pub(crate) fn set_total_frames(&mut self, frames: u32) {
        self.total_frames = frames;
    }

    pub(crate) fn set_divergence_count(&mut self, count: u32) {
        self.divergence_count = count;
    }
}

/// Text up to the first NUL; the last byte is always kept NUL on write.
fn text_field(field: &[u8; TEXT_FIELD_LEN]) -> &str {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    std::str::from_utf8(&field[..end]).unwrap_or("")
}

fn copy_text_field(field: &mut [u8; TEXT_FIELD_LEN], text: &str) {
    field.fill(0);
    let len = text.len().min(TEXT_FIELD_LEN - 1);
    field[..len].copy_from_slice(&text.as_bytes()[..len]);
}
