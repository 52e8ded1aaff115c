//! Wire framing for the shift bitmap.
//!
//! A frame is always eight bytes:
//! `[header][command][shift][subshift][0][0][0][0]`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bitmap::ShiftBitmap;

pub const FRAME_LEN: usize = 8;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("frame is {actual} bytes, expected {}", FRAME_LEN)]
    Length { actual: usize },

    #[error("bad header byte {actual:#04x}, expected {expected:#04x}")]
    Header { expected: u8, actual: u8 },

    #[error("bad command byte {actual:#04x}, expected {expected:#04x}")]
    Command { expected: u8, actual: u8 },

    #[error("reserved byte {index} is {value:#04x}, expected 0")]
    Reserved { index: usize, value: u8 },
}

/// Frame layout in use on a link, fixed at construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketFormat {
    #[default]
    Standard,
}

impl PacketFormat {
    pub fn header(&self) -> u8 {
        match self {
            PacketFormat::Standard => 0xA5,
        }
    }

    pub fn command(&self) -> u8 {
        match self {
            PacketFormat::Standard => 0x0D,
        }
    }

    pub fn encode(&self, bitmap: ShiftBitmap) -> [u8; FRAME_LEN] {
        let mut frame = [0u8; FRAME_LEN];
        frame[0] = self.header();
        frame[1] = self.command();
        frame[2] = bitmap.shift;
        frame[3] = bitmap.subshift;
        frame
    }

    pub fn decode(&self, frame: &[u8]) -> Result<ShiftBitmap, CodecError> {
        if frame.len() != FRAME_LEN {
            return Err(CodecError::Length { actual: frame.len() });
        }
        if frame[0] != self.header() {
            return Err(CodecError::Header {
                expected: self.header(),
                actual: frame[0],
            });
        }
        if frame[1] != self.command() {
            return Err(CodecError::Command {
                expected: self.command(),
                actual: frame[1],
            });
        }
        if let Some((index, &value)) = frame.iter().enumerate().skip(4).find(|&(_, &b)| b != 0) {
            return Err(CodecError::Reserved { index, value });
        }
        Ok(ShiftBitmap::new(frame[2], frame[3]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_frame_layout() {
        let frame = PacketFormat::Standard.encode(ShiftBitmap::new(0b0100_0001, 0x80));
        assert_eq!(frame, [0xA5, 0x0D, 0x41, 0x80, 0, 0, 0, 0]);
    }

    #[test]
    fn decode_then_encode_preserves_packet() {
        let format = PacketFormat::Standard;
        for (shift, subshift) in [(0u8, 0u8), (0xFF, 0x00), (0x12, 0xFE)] {
            let packet = [0xA5, 0x0D, shift, subshift, 0, 0, 0, 0];
            let bitmap = format.decode(&packet).unwrap();
            assert_eq!((bitmap.shift, bitmap.subshift), (shift, subshift));
            assert_eq!(format.encode(bitmap), packet);
        }
    }

    #[test]
    fn decode_rejects_malformed_frames() {
        let format = PacketFormat::Standard;
        assert_eq!(format.decode(&[0xA5, 0x0D]), Err(CodecError::Length { actual: 2 }));
        assert!(matches!(
            format.decode(&[0x00, 0x0D, 0, 0, 0, 0, 0, 0]),
            Err(CodecError::Header { actual: 0x00, .. })
        ));
        assert!(matches!(
            format.decode(&[0xA5, 0x0E, 0, 0, 0, 0, 0, 0]),
            Err(CodecError::Command { actual: 0x0E, .. })
        ));
        assert_eq!(
            format.decode(&[0xA5, 0x0D, 0, 0, 0, 0, 9, 0]),
            Err(CodecError::Reserved { index: 6, value: 9 })
        );
    }

    #[test]
    fn format_deserializes_from_lowercase() {
        let format: PacketFormat = serde_json::from_str("\"standard\"").unwrap();
        assert_eq!(format, PacketFormat::Standard);
    }
}
