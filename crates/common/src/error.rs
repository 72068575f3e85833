use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid value for {key}: {value:?}")]
    InvalidConfig { key: &'static str, value: String },

    #[error("{key} must be greater than zero")]
    ZeroDuration { key: &'static str },
}

pub type Result<T> = std::result::Result<T, Error>;
