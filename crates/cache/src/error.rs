use faststr::FastStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("periodic job is already running")]
    AlreadyRunning,

    #[error("periodic job panicked: {0}")]
    Panicked(FastStr),

    #[error("{0}")]
    MsgError(FastStr),
}

pub type Result<T> = std::result::Result<T, JobError>;
