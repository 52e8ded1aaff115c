pub mod error;
pub mod session;
pub mod snapshot;
pub mod value;

pub use error::*;
pub use session::{deep_merge, Delivery, SessionTracker, STATE_KEY};
pub use snapshot::*;
pub use value::*;
