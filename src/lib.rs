use thiserror::Error;

pub type Result<T> = std::result::Result<T, HubError>;

#[derive(Error, Debug)]
pub enum HubError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed input: {0}")]
    Malformed(String),

    #[error("Consistency failure: {0}")]
    Consistency(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod config;
pub mod drift;
pub mod embedding;
pub mod evaluate;
pub mod feed;
pub mod harvest;
pub mod index;
pub mod indexer;
pub mod normalize;
pub mod service;
pub mod storage;
