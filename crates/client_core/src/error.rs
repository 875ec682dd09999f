use shared::{
    error::{ApiError, ErrorCode},
    ordering::OrderingError,
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Another mutation is pending or reconciling on this session.
    #[error("another mutation is still in flight")]
    MutationInFlight,
    /// The server, or the local pre-check, refused the request.
    #[error("request rejected: {0}")]
    Rejected(ApiError),
    #[error("transport failure: {0}")]
    Transport(String),
}

impl ClientError {
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Rejected(err) => Some(err.code),
            _ => None,
        }
    }
}

impl From<ApiError> for ClientError {
    fn from(value: ApiError) -> Self {
        Self::Rejected(value)
    }
}

impl From<OrderingError> for ClientError {
    fn from(value: OrderingError) -> Self {
        Self::Rejected(value.into())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.to_string())
    }
}
