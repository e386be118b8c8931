//! Pad-state codec for the controller data-poll wire format.
//!
//! A data poll carries a fixed 17-byte report per controller:
//!
//! | index | contents                                   |
//! |-------|--------------------------------------------|
//! | 0     | button group 1, active-low bitmask         |
//! | 1     | button group 2, active-low bitmask         |
//! | 2-3   | right stick X, Y (128 = neutral)           |
//! | 4-5   | left stick X, Y (128 = neutral)            |
//! | 6-16  | per-button pressure values                 |
//!
//! [`PadState`] mirrors the last report seen on a slot regardless of the
//! recording mode, so display consumers always observe what the game observed.
//! `decode` followed by `encode` is the identity for every defined index and
//! byte value; both are allocation-free since they run once per poll byte on
//! the emulation thread.

use bitflags::bitflags;

/// Number of payload bytes in one controller data-poll report.
pub const REPORT_BYTES: usize = 17;

/// Neutral analog stick position on both axes.
pub const STICK_NEUTRAL: u8 = 128;

bitflags! {
    /// Digital button flags, one bit per button.
    ///
    /// The low 8 bits map to wire byte 0 and the high 8 bits to wire byte 1,
    /// in the exact bit positions of the wire protocol. On the wire a cleared
    /// bit means pressed; flags here use set-bit-means-pressed polarity and
    /// the codec inverts at the byte boundary.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct Buttons: u16 {
        const SELECT = 1 << 0;
        const L3 = 1 << 1;
        const R3 = 1 << 2;
        const START = 1 << 3;
        const UP = 1 << 4;
        const RIGHT = 1 << 5;
        const DOWN = 1 << 6;
        const LEFT = 1 << 7;
        const L2 = 1 << 8;
        const R2 = 1 << 9;
        const L1 = 1 << 10;
        const R1 = 1 << 11;
        const TRIANGLE = 1 << 12;
        const CIRCLE = 1 << 13;
        const CROSS = 1 << 14;
        const SQUARE = 1 << 15;
    }
}

/// Pressure-sensitive buttons, in wire order (report bytes 6 through 16).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pressure {
    Right = 0,
    Left = 1,
    Up = 2,
    Down = 3,
    Triangle = 4,
    Circle = 5,
    Cross = 6,
    Square = 7,
    L1 = 8,
    R1 = 9,
    L2 = 10,
}

/// Number of per-button pressure bytes in a report.
pub const PRESSURE_COUNT: usize = 11;

/// Decoded semantic report for one controller slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadState {
    pub buttons: Buttons,
    pub right_stick: (u8, u8),
    pub left_stick: (u8, u8),
    pub pressures: [u8; PRESSURE_COUNT],
}

impl Default for PadState {
    /// Neutral state: nothing pressed, sticks centered, pressures zero.
    fn default() -> Self {
        Self {
            buttons: Buttons::empty(),
            right_stick: (STICK_NEUTRAL, STICK_NEUTRAL),
            left_stick: (STICK_NEUTRAL, STICK_NEUTRAL),
            pressures: [0; PRESSURE_COUNT],
        }
    }
}

impl PadState {
    /// Folds one wire byte of a data-poll report into the mirror.
    ///
    /// Indices outside the 17-byte report are ignored.
    pub fn decode(&mut self, index: usize, byte: u8) {
        match index {
            0 => {
                let high = self.buttons.bits() & 0xFF00;
                self.buttons = Buttons::from_bits_retain(high | u16::from(!byte));
            }
            1 => {
                let low = self.buttons.bits() & 0x00FF;
                self.buttons = Buttons::from_bits_retain(low | (u16::from(!byte) << 8));
            }
            2 => self.right_stick.0 = byte,
            3 => self.right_stick.1 = byte,
            4 => self.left_stick.0 = byte,
            5 => self.left_stick.1 = byte,
            6..=16 => self.pressures[index - 6] = byte,
            _ => {}
        }
    }

    /// Produces the wire byte at `index` from the mirror.
    ///
    /// Indices outside the 17-byte report encode to 0; callers must not
    /// forward such indices into file I/O.
    pub fn encode(&self, index: usize) -> u8 {
        match index {
            0 => !(self.buttons.bits() as u8),
            1 => !((self.buttons.bits() >> 8) as u8),
            2 => self.right_stick.0,
            3 => self.right_stick.1,
            4 => self.left_stick.0,
            5 => self.left_stick.1,
            6..=16 => self.pressures[index - 6],
            _ => 0,
        }
    }

    /// Whether every button in `buttons` is currently pressed.
    #[inline]
    pub fn is_pressed(&self, buttons: Buttons) -> bool {
        self.buttons.contains(buttons)
    }

    /// Updates the pressed state of the given buttons.
    #[inline]
    pub fn set_pressed(&mut self, buttons: Buttons, pressed: bool) {
        self.buttons.set(buttons, pressed);
    }

    #[inline]
    pub fn pressure(&self, which: Pressure) -> u8 {
        self.pressures[which as usize]
    }

    #[inline]
    pub fn set_pressure(&mut self, which: Pressure, value: u8) {
        self.pressures[which as usize] = value;
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn encode_then_decode_is_identity_for_all_bytes() {
        for index in 0..REPORT_BYTES {
            for byte in 0..=u8::MAX {
                let mut state = PadState::default();
                state.decode(index, byte);
                assert_eq!(
                    state.encode(index),
                    byte,
                    "index {index} byte {byte:#04x} did not round-trip"
                );
            }
        }
    }

    #[test]
    fn wire_bytes_are_active_low() {
        let mut state = PadState::default();
        // All bits set on the wire means nothing is pressed.
        state.decode(0, 0xFF);
        state.decode(1, 0xFF);
        assert_eq!(state.buttons, Buttons::empty());

        // Clearing the MSB of byte 0 presses LEFT, nothing else.
        state.decode(0, 0x7F);
        assert_eq!(state.buttons, Buttons::LEFT);

        // Clearing the LSB of byte 1 presses L2.
        state.decode(1, 0xFE);
        assert_eq!(state.buttons, Buttons::LEFT | Buttons::L2);
    }

    #[test]
    fn idle_report_encodes_to_released_bytes() {
        let state = PadState::default();
        assert_eq!(state.encode(0), 0xFF);
        assert_eq!(state.encode(1), 0xFF);
        assert_eq!(state.encode(2), STICK_NEUTRAL);
        assert_eq!(state.encode(5), STICK_NEUTRAL);
        assert_eq!(state.encode(6), 0);
    }

    #[test]
    fn out_of_range_indices_are_inert() {
        let mut state = PadState::default();
        state.decode(REPORT_BYTES, 0xAB);
        state.decode(usize::MAX, 0xCD);
        assert_eq!(state, PadState::default());
        assert_eq!(state.encode(REPORT_BYTES), 0);
    }

    #[test]
    fn pressure_accessors_map_to_wire_order() {
        let mut state = PadState::default();
        state.set_pressure(Pressure::Triangle, 200);
        assert_eq!(state.encode(10), 200);
        state.decode(16, 55);
        assert_eq!(state.pressure(Pressure::L2), 55);
    }

    proptest! {
        #[test]
        fn state_survives_encode_decode(
            bits in any::<u16>(),
            sticks in any::<[u8; 4]>(),
            pressures in any::<[u8; PRESSURE_COUNT]>(),
        ) {
            let state = PadState {
                buttons: Buttons::from_bits_retain(bits),
                right_stick: (sticks[0], sticks[1]),
                left_stick: (sticks[2], sticks[3]),
                pressures,
            };
            let mut decoded = PadState::default();
            for index in 0..REPORT_BYTES {
                decoded.decode(index, state.encode(index));
            }
            prop_assert_eq!(decoded, state);
        }
    }
}
