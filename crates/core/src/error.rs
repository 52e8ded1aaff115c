use thiserror::Error;

use crate::snapshot::SourceKind;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{source_kind} payload for '{identity}' is not an object")]
    PayloadNotObject {
        identity: String,
        source_kind: SourceKind,
    },

    #[error("journal payload for '{identity}' has no `event` name")]
    MissingEventName { identity: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
