//! Shift bitmap state and the token → bit-position map.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of addressable positions: 8 in the shift byte, 8 in the subshift byte.
pub const BIT_POSITIONS: u8 = 16;

/// Persistent two-field bitmap. Positions 0..=7 live in `shift`,
/// positions 8..=15 in `subshift`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShiftBitmap {
    pub shift: u8,
    pub subshift: u8,
}

impl ShiftBitmap {
    pub fn new(shift: u8, subshift: u8) -> Self {
        Self { shift, subshift }
    }

    /// Set a position. Returns whether the bitmap changed.
    pub fn set(&mut self, position: u8) -> bool {
        let before = *self;
        if let Some((byte, mask)) = self.slot(position) {
            *byte |= mask;
        }
        *self != before
    }

    /// Clear a position. Returns whether the bitmap changed.
    pub fn clear(&mut self, position: u8) -> bool {
        let before = *self;
        if let Some((byte, mask)) = self.slot(position) {
            *byte &= !mask;
        }
        *self != before
    }

    pub fn is_set(&self, position: u8) -> bool {
        match position {
            0..=7 => self.shift & (1 << position) != 0,
            8..=15 => self.subshift & (1 << (position - 8)) != 0,
            _ => false,
        }
    }

    /// Both fields packed as `subshift << 8 | shift`.
    pub fn bits(&self) -> u16 {
        (u16::from(self.subshift) << 8) | u16::from(self.shift)
    }

    pub fn is_empty(&self) -> bool {
        self.bits() == 0
    }

    fn slot(&mut self, position: u8) -> Option<(&mut u8, u8)> {
        match position {
            0..=7 => Some((&mut self.shift, 1 << position)),
            8..=15 => Some((&mut self.subshift, 1 << (position - 8))),
            _ => None,
        }
    }
}

impl fmt::Display for ShiftBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shift={:08b} subshift={:08b}", self.shift, self.subshift)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TokenMapError {
    #[error("token '{token}' maps to position {position}, maximum is {}", BIT_POSITIONS - 1)]
    PositionOutOfRange { token: String, position: u8 },

    #[error("tokens '{first}' and '{second}' both map to position {position}")]
    DuplicatePosition {
        first: String,
        second: String,
        position: u8,
    },

    #[error("token name must not be empty")]
    EmptyToken,
}

/// Named action tokens and the bitmap position each one drives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMap {
    positions: HashMap<String, u8>,
}

impl Default for TokenMap {
    /// `Shift1..Shift8` → 0..=7, `SubShift1..SubShift8` → 8..=15.
    fn default() -> Self {
        let positions = (1..=8u8)
            .map(|n| (format!("Shift{n}"), n - 1))
            .chain((1..=8u8).map(|n| (format!("SubShift{n}"), n + 7)))
            .collect();
        Self { positions }
    }
}

impl TokenMap {
    /// Build a map from explicit entries only.
    pub fn new<I, S>(entries: I) -> Result<Self, TokenMapError>
    where
        I: IntoIterator<Item = (S, u8)>,
        S: Into<String>,
    {
        let positions = entries.into_iter().map(|(t, p)| (t.into(), p)).collect();
        let map = Self { positions };
        map.check()?;
        Ok(map)
    }

    /// Defaults with `overrides` layered on top. A remapped token keeps its
    /// name; the result must still be collision-free.
    pub fn with_overrides<I, S>(overrides: I) -> Result<Self, TokenMapError>
    where
        I: IntoIterator<Item = (S, u8)>,
        S: Into<String>,
    {
        let mut map = Self::default();
        for (token, position) in overrides {
            map.positions.insert(token.into(), position);
        }
        map.check()?;
        Ok(map)
    }

    pub fn position(&self, token: &str) -> Option<u8> {
        self.positions.get(token).copied()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.positions.contains_key(token)
    }

    /// Tokens ordered by position.
    pub fn tokens(&self) -> Vec<(&str, u8)> {
        let mut tokens: Vec<_> = self.positions.iter().map(|(t, &p)| (t.as_str(), p)).collect();
        tokens.sort_by_key(|&(t, p)| (p, t));
        tokens
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    fn check(&self) -> Result<(), TokenMapError> {
        let mut seen: BTreeMap<u8, &str> = BTreeMap::new();
        // Sorted so the reported pair does not depend on hash order.
        let mut entries: Vec<_> = self.positions.iter().collect();
        entries.sort();
        for (token, &position) in entries {
            if token.is_empty() {
                return Err(TokenMapError::EmptyToken);
            }
            if position >= BIT_POSITIONS {
                return Err(TokenMapError::PositionOutOfRange {
                    token: token.clone(),
                    position,
                });
            }
            if let Some(first) = seen.insert(position, token) {
                return Err(TokenMapError::DuplicatePosition {
                    first: first.to_string(),
                    second: token.clone(),
                    position,
                });
            }
        }
        Ok(())
    }
}
