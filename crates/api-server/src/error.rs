use faststr::FastStr;
use http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Must provide object ID")]
    NoObjectId,

    #[error("Must provide chain or community ID")]
    NoChainOrComm,

    #[error("Invalid chain or community")]
    InvalidChainOrComm,

    #[error("Invalid thread")]
    InvalidThread,

    #[error("storage error: {0}")]
    Storage(#[from] storage::error::Error),

    #[error("server error: {0}")]
    Server(FastStr),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Storage(_) | Error::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Text sent to the client. Server-side failures are only described in
    /// the logs.
    pub fn public_message(&self) -> String {
        if self.status_code().is_server_error() {
            "Internal server error".to_owned()
        } else {
            self.to_string()
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
