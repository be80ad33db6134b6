use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Partial or undecodable record; callers treat it as "no usable data yet".
    #[error("corrupt record: {0}")]
    Corrupt(&'static str),
    #[error("server is busy")]
    Busy,
    #[error("timed out waiting for response")]
    Timeout,
    #[error("no servers available")]
    NoServer,
    #[error("not connected to a server")]
    NotConnected,
    #[error("server has shut down")]
    ServerShutdown,
    #[error("request slot was claimed by another client")]
    ClaimLost,
    #[error("cancelled by shutdown")]
    Cancelled,
    #[error("invalid config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
