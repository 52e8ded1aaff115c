use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid [tokens] table: {0}")]
    Tokens(#[from] shift_link::TokenMapError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("catalog: {0}")]
    Catalog(#[from] shift_catalog::CatalogError),

    #[error("rules: {0}")]
    Rules(#[from] shift_rules::RuleError),

    #[error("delivery: {0}")]
    Delivery(#[from] shift_core::CoreError),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
