use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("link is not connected")]
    NotConnected,

    #[error("link connect already in progress")]
    ConnectInProgress,

    #[error("link worker already running")]
    AlreadyStarted,

    #[error("cannot resolve link address '{address}'")]
    Resolve {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connect to {address} failed: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LinkError>;
