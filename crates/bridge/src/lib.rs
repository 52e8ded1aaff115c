//! Composition of the shift pipeline: deliveries become snapshots, snapshots
//! become signals, rule edges become bitmap actions, and a changed bitmap goes
//! out through a [`shift_link::BitmapSink`].

pub mod config;
pub mod error;
pub mod executor;
pub mod pipeline;

pub use config::{load_dotenv, BridgeConfig, RulesConfig, SessionConfig};
pub use error::{BridgeError, ConfigError, Result};
pub use executor::{unknown_tokens, ActionError, ActionExecutor, DiagnosticSink, ExecutionReport, TracingDiagnostics};
pub use pipeline::{Bridge, ProcessOutcome};
