//! Toggle sources packed into a single byte
//!
//! A button counts as "pressed" only on a 0→1 transition between two
//! consecutive observations. Recorder and player both go through
//! [`ButtonSet::rising_edges`] so the rule lives in one place.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Named toggle sources, one bit each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Button {
    /// Intake forward (reference only)
    IntakeForward,
    /// Intake reverse (reference only)
    IntakeReverse,
    /// Outtake forward (reference only)
    OuttakeForward,
    /// Outtake reverse (reference only)
    OuttakeReverse,
    /// Mid-scoring piston toggle
    MidScoring,
    /// Descore arm toggle
    Descore,
    /// Unloader toggle
    Unloader,
}

impl Button {
    /// Every button, in bit order
    pub const ALL: [Button; 7] = [
        Button::IntakeForward,
        Button::IntakeReverse,
        Button::OuttakeForward,
        Button::OuttakeReverse,
        Button::MidScoring,
        Button::Descore,
        Button::Unloader,
    ];

    /// Bit position within a [`ButtonSet`]
    pub const fn bit(self) -> u8 {
        match self {
            Button::IntakeForward => 0,
            Button::IntakeReverse => 1,
            Button::OuttakeForward => 2,
            Button::OuttakeReverse => 3,
            Button::MidScoring => 4,
            Button::Descore => 5,
            Button::Unloader => 6,
        }
    }

    /// Single-bit mask
    pub const fn mask(self) -> u8 {
        1 << self.bit()
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Button::IntakeForward => "intake_forward",
            Button::IntakeReverse => "intake_reverse",
            Button::OuttakeForward => "outtake_forward",
            Button::OuttakeReverse => "outtake_reverse",
            Button::MidScoring => "mid_scoring",
            Button::Descore => "descore",
            Button::Unloader => "unloader",
        };
        f.write_str(name)
    }
}

/// Fixed-width bitset of [`Button`] states
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ButtonSet(u8);

impl ButtonSet {
    /// No buttons held
    pub const EMPTY: ButtonSet = ButtonSet(0);

    /// Wrap raw bits
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw bits
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Build a set by querying each button
    pub fn from_fn(mut held: impl FnMut(Button) -> bool) -> Self {
        Button::ALL
            .iter()
            .filter(|&&b| held(b))
            .fold(Self::EMPTY, |set, &b| set.with(b))
    }

    /// Whether `button` is held
    pub const fn contains(self, button: Button) -> bool {
        self.0 & button.mask() != 0
    }

    /// Copy with `button` held
    pub const fn with(self, button: Button) -> Self {
        Self(self.0 | button.mask())
    }

    /// Set or clear `button`
    pub fn set(&mut self, button: Button, held: bool) {
        if held {
            self.0 |= button.mask();
        } else {
            self.0 &= !button.mask();
        }
    }

    /// Whether no bit is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Bits that went 0→1 since `previous`
    pub const fn rising_edges(self, previous: ButtonSet) -> ButtonSet {
        ButtonSet(self.0 & !previous.0)
    }

    /// Bits that differ from `previous`, in either direction
    pub const fn changed(self, previous: ButtonSet) -> ButtonSet {
        ButtonSet(self.0 ^ previous.0)
    }

    /// Whether `button` was pressed between `previous` and `self`
    pub const fn pressed(self, previous: ButtonSet, button: Button) -> bool {
        self.rising_edges(previous).contains(button)
    }

    /// Held buttons, in bit order
    pub fn iter(self) -> impl Iterator<Item = Button> {
        Button::ALL.into_iter().filter(move |&b| self.contains(b))
    }
}

impl fmt::Debug for ButtonSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_layout() {
        assert_eq!(Button::IntakeForward.mask(), 0b0000_0001);
        assert_eq!(Button::MidScoring.mask(), 0b0001_0000);
        assert_eq!(Button::Unloader.mask(), 0b0100_0000);

        let set = ButtonSet::from_fn(|b| matches!(b, Button::Descore | Button::IntakeReverse));
        assert_eq!(set.bits(), 0b0010_0010);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Button::IntakeReverse, Button::Descore]);
    }

    #[test]
    fn test_edges() {
        let prev = ButtonSet::EMPTY.with(Button::Descore).with(Button::Unloader);
        let cur = ButtonSet::EMPTY.with(Button::Descore).with(Button::MidScoring);

        // Sustained and released bits are not presses
        assert!(!cur.pressed(prev, Button::Descore));
        assert!(!cur.pressed(prev, Button::Unloader));
        assert!(cur.pressed(prev, Button::MidScoring));

        assert_eq!(cur.rising_edges(prev), ButtonSet::EMPTY.with(Button::MidScoring));
        assert_eq!(
            cur.changed(prev),
            ButtonSet::EMPTY.with(Button::MidScoring).with(Button::Unloader)
        );
    }

    #[test]
    fn test_edge_count_over_sequence() {
        // 0,1,1,0,1,0,0,1 → three presses
        let seq = [0u8, 1, 1, 0, 1, 0, 0, 1];
        let mut prev = ButtonSet::EMPTY;
        let mut presses = 0;
        for bit in seq {
            let cur = ButtonSet::from_bits(bit << Button::Unloader.bit());
            if cur.pressed(prev, Button::Unloader) {
                presses += 1;
            }
            prev = cur;
        }
        assert_eq!(presses, 3);
    }

    #[test]
    fn test_set_and_clear() {
        let mut set = ButtonSet::EMPTY;
        set.set(Button::OuttakeForward, true);
        assert!(set.contains(Button::OuttakeForward));
        set.set(Button::OuttakeForward, false);
        assert!(set.is_empty());
        assert_eq!(format!("{:?}", ButtonSet::EMPTY.with(Button::Descore)), "{Descore}");
    }
}
