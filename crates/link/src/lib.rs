//! Hardware link for the shift bitmap.
//!
//! [`ShiftBitmap`] is the persistent two-byte state the rule actions mutate,
//! [`PacketFormat`] turns it into the 8-byte wire frame, and [`LinkClient`]
//! keeps a TCP connection to the device alive from a background worker.

pub mod bitmap;
pub mod client;
pub mod codec;
pub mod error;
pub mod reconnect;

pub use bitmap::{ShiftBitmap, TokenMap, TokenMapError, BIT_POSITIONS};
pub use client::{BitmapSink, LinkClient, LinkConfig, LinkState, LinkStatus};
pub use codec::{CodecError, PacketFormat, FRAME_LEN};
pub use error::{LinkError, Result};
pub use reconnect::Backoff;
