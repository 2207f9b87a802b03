//! Implements errors associated with the connection

use std::{io, sync::Arc};

use fe2o3_amqp091_types::definitions::{self, ReplyCode};

use crate::{frames, transport};

/// Errors associated with [`crate::Connection`]
///
/// The error is recorded once when the connection stops and is handed out to
/// every waiter afterwards, so it is cheaply cloneable.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// IO error
    #[error("IO Error {0:?}")]
    Io(Arc<io::Error>),

    /// Nothing was received from the peer within twice the heartbeat interval
    #[error("Heartbeat timeout")]
    HeartbeatTimeout,

    /// The connection was closed locally with an error
    #[error("Local error {0}")]
    Local(definitions::Error),

    /// The remote peer closed with the provided error
    #[error("Remote error {0}")]
    Remote(definitions::Error),

    /// The connection was closed without an error
    #[error("Connection is closed")]
    Closed,
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl From<transport::Error> for Error {
    fn from(err: transport::Error) -> Self {
        match err {
            transport::Error::Io(err) => Self::from(err),
            transport::Error::IdleTimeout => Self::HeartbeatTimeout,
            transport::Error::Framing(err) => Self::Local(framing_error(&err)),
        }
    }
}

/// Maps a framing error to the reply code sent in Connection.Close
pub(crate) fn framing_error(err: &frames::Error) -> definitions::Error {
    use fe2o3_amqp091_types::Error as CodecError;

    let code = match err {
        frames::Error::Decode {
            source: CodecError::UnknownMethod { .. },
            ..
        } => ReplyCode::NotImplemented,
        frames::Error::Decode { .. } | frames::Error::Encode(_) => ReplyCode::SyntaxError,
        frames::Error::HeartbeatOnChannel(_) => ReplyCode::UnexpectedFrame,
        _ => ReplyCode::FrameError,
    };
    definitions::Error::new(code, err.to_string())
}

/// Errors that occur while opening a connection
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    /// IO error
    #[error("IO Error {0:?}")]
    Io(#[from] io::Error),

    /// Error parsing the url
    #[error(transparent)]
    UrlError(#[from] url::ParseError),

    /// Only the `amqp` scheme is supported
    #[error(r#"Invalid scheme. Only "amqp" is supported."#)]
    InvalidScheme,

    /// The url does not name a host
    #[error("Invalid domain")]
    InvalidDomain,

    /// A url query parameter has a value that cannot be parsed
    #[error("Invalid url query parameter {0}")]
    InvalidUrlQuery(String),

    /// The server answered with a protocol header of a version it does not support
    #[error("Protocol header mismatch, server supports {0:?}")]
    ProtocolHeaderMismatch([u8; 8]),

    /// The SASL mechanism is not offered by the server
    #[error("SASL mechanism {mechanism} is not supported, server offers {offered:?}")]
    MechanismNotSupported {
        /// Requested mechanism
        mechanism: &'static str,

        /// Mechanisms offered by the server
        offered: String,
    },

    /// The remote peer closed the connection during the handshake
    #[error("Remote error {0}")]
    Remote(definitions::Error),

    /// The handshake was aborted locally
    #[error("Local error {0}")]
    Local(definitions::Error),

    /// A frame that does not belong to the current step of the handshake
    #[error("Unexpected frame {0}")]
    UnexpectedFrame(String),
}

impl From<transport::Error> for OpenError {
    fn from(err: transport::Error) -> Self {
        match err {
            transport::Error::Io(err) => Self::Io(err),
            transport::Error::IdleTimeout => Self::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "No frame received from the server",
            )),
            transport::Error::Framing(frames::Error::ProtocolHeader(header)) => {
                Self::ProtocolHeaderMismatch(header)
            }
            transport::Error::Framing(err) => Self::Local(framing_error(&err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use fe2o3_amqp091_types::definitions::ReplyCode;

    use crate::{frames, transport};

    use super::{Error, OpenError};

    #[test]
    fn unknown_method_maps_to_not_implemented() {
        let err = transport::Error::Framing(frames::Error::Decode {
            channel: 1,
            source: fe2o3_amqp091_types::Error::UnknownMethod {
                class_id: 60,
                method_id: 99,
            },
        });
        match Error::from(err) {
            Error::Local(err) => assert_eq!(err.code, ReplyCode::NotImplemented),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn idle_timeout_maps_to_heartbeat_timeout() {
        assert!(matches!(
            Error::from(transport::Error::IdleTimeout),
            Error::HeartbeatTimeout
        ));
    }

    #[test]
    fn protocol_header_reply_during_open() {
        let header = *b"AMQP\x00\x00\x09\x00";
        let err = transport::Error::Framing(frames::Error::ProtocolHeader(header));
        assert!(matches!(
            OpenError::from(err),
            OpenError::ProtocolHeaderMismatch(h) if h == header
        ));
    }
}
