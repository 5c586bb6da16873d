use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NetError {
    /// The receiving side's rate limiter rejected the request outright.
    /// Surfaced immediately so the caller does not wait out its timeout.
    #[error("request rejected by the remote rate limiter")]
    RateLimited,
}
