//! Errors associated with a channel

use fe2o3_amqp091_types::definitions;

use crate::connection;

/// Errors associated with [`crate::Channel`]
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The channel was closed locally with an error, including protocol
    /// violations detected by the client
    #[error("Local error {0}")]
    Local(definitions::Error),

    /// The server closed the channel with the provided error
    #[error("Remote error {0}")]
    Remote(definitions::Error),

    /// The channel was closed without an error
    #[error("Channel is closed")]
    Closed,

    /// The owning connection is closed
    #[error("Connection closed: {0}")]
    ConnectionClosed(#[source] connection::Error),

    /// Every channel id up to the negotiated channel-max is in use
    #[error("Channel max reached")]
    ChannelMaxReached,

    /// The method cannot be sent this way
    #[error("Method {0} is not allowed here")]
    InvalidMethod(&'static str),

    /// The method or its content header cannot be encoded, nothing was sent
    #[error("Encode error {0}")]
    Encode(#[from] fe2o3_amqp091_types::Error),

    /// The method frame exceeds the negotiated frame-max, nothing was sent
    #[error("Frame of {size} bytes exceeds frame-max {max}")]
    FrameTooLarge {
        /// Size of the encoded frame
        size: usize,
        /// Negotiated frame-max
        max: usize,
    },
}

impl Error {
    /// Returns the reply carried by a Close, if any
    pub fn reply(&self) -> Option<&definitions::Error> {
        match self {
            Error::Local(err) | Error::Remote(err) => Some(err),
            Error::ConnectionClosed(connection::Error::Local(err))
            | Error::ConnectionClosed(connection::Error::Remote(err)) => Some(err),
            _ => None,
        }
    }
}

impl From<connection::Error> for Error {
    fn from(err: connection::Error) -> Self {
        Self::ConnectionClosed(err)
    }
}
