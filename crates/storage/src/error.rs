use faststr::FastStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("sqlx error: {0}")]
    SqlxError(#[from] sqlx::Error),
    #[error("database connection timeout")]
    DatabaseTimeOut,

    #[error("unknown community: {0}")]
    UnknownCommunity(FastStr),

    #[error("view count {0} not found")]
    ViewCountNotFound(i64),

    #[error("{0}")]
    MigrateError(FastStr),
}

pub type Result<T> = std::result::Result<T, Error>;
