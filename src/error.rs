use crate::pool::Residency;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("device error: {0}")]
    Device(String),

    #[error("device does not support {0} allocations")]
    Unsupported(Residency),

    #[error("allocation of {bytes} bytes ({residency}) failed")]
    Allocation { bytes: u64, residency: Residency },

    #[error("work unit error: {0}")]
    Work(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn device<S: Into<String>>(msg: S) -> Self {
        Error::Device(msg.into())
    }

    pub fn work<S: Into<String>>(msg: S) -> Self {
        Error::Work(msg.into())
    }

    /// True for failures that should skip the current topology in a sweep
    /// rather than abort the whole run.
    pub fn is_skippable(&self) -> bool {
        matches!(self, Error::Unsupported(_) | Error::Allocation { .. })
    }
}
