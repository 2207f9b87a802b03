//! Errors of the frame codec

use std::io;

/// Frame encoding and decoding errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error
    #[error("IO Error {0:?}")]
    Io(#[from] io::Error),

    /// The declared frame size exceeds the negotiated frame-max
    #[error("Frame size {size} exceeds frame-max {max}")]
    FrameTooLarge {
        /// Declared size including header and frame-end
        size: usize,
        /// Negotiated frame-max
        max: usize,
    },

    /// The octet after the payload is not the frame-end marker
    #[error("Frame end marker mismatch, found {0:#04x}")]
    FrameEndMismatch(u8),

    /// The frame type is not defined
    #[error("Unknown frame type {0}")]
    UnknownFrameType(u8),

    /// The peer replied with a protocol header, ie. it does not support the
    /// protocol version requested by the client
    #[error("Peer sent protocol header {0:?}")]
    ProtocolHeader([u8; 8]),

    /// Heartbeat frames are only allowed on channel 0
    #[error("Heartbeat frame on channel {0}")]
    HeartbeatOnChannel(u16),

    /// The frame is well delimited but its payload is malformed
    #[error("Malformed payload on channel {channel}: {source}")]
    Decode {
        /// Channel of the frame
        channel: u16,
        /// The codec error
        #[source]
        source: fe2o3_amqp091_types::Error,
    },

    /// The frame payload could not be encoded
    #[error(transparent)]
    Encode(fe2o3_amqp091_types::Error),
}

impl Error {
    /// Whether the byte stream can still be read frame by frame after this
    /// error
    pub fn is_framing_intact(&self) -> bool {
        matches!(
            self,
            Error::Decode { .. } | Error::Encode(_) | Error::HeartbeatOnChannel(_)
        )
    }
}
