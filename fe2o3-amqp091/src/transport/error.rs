use std::io;

use crate::frames;

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error
    #[error("IO Error {0:?}")]
    Io(#[from] io::Error),

    /// Nothing was received within twice the heartbeat interval
    #[error("Idle timeout")]
    IdleTimeout,

    /// The peer broke the framing rules
    #[error(transparent)]
    Framing(frames::Error),
}

impl From<frames::Error> for Error {
    fn from(err: frames::Error) -> Self {
        match err {
            frames::Error::Io(err) => Self::Io(err),
            err => Self::Framing(err),
        }
    }
}
