use std::time::Duration;

#[derive(thiserror::Error, Debug, Eq, PartialEq)]
pub enum BatchError {
    #[error("The batcher is closed and no longer accepts events")]
    Closed,

    #[error("The final flush did not complete within {timeout:?}, {pending} events were not delivered")]
    DrainTimeout { timeout: Duration, pending: usize },

    #[error("The batch driver terminated abnormally: {0}")]
    DriverFailure(String),
}
