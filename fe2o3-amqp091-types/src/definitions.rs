//! Protocol constants, reply codes and the error carried by Close methods

use serde::{Deserialize, Serialize};

/// Protocol major version
pub const MAJOR: u8 = 0;

/// Protocol minor version
pub const MINOR: u8 = 9;

/// Protocol revision
pub const REVISION: u8 = 1;

/// The 8-byte protocol header sent by the client at connection start
pub const PROTOCOL_HEADER: [u8; 8] = [b'A', b'M', b'Q', b'P', 0, MAJOR, MINOR, REVISION];

/// Method frame
pub const FRAME_METHOD: u8 = 1;

/// Content header frame
pub const FRAME_HEADER: u8 = 2;

/// Content body frame
pub const FRAME_BODY: u8 = 3;

/// Heartbeat frame
pub const FRAME_HEARTBEAT: u8 = 8;

/// Every frame is terminated by this octet
pub const FRAME_END: u8 = 0xCE;

/// Size of the frame header (type, channel, size)
pub const FRAME_HEADER_SIZE: usize = 7;

/// Header plus the frame-end octet
pub const FRAME_OVERHEAD: usize = FRAME_HEADER_SIZE + 1;

/// Smallest frame-max a peer may negotiate
pub const FRAME_MIN_SIZE: u32 = 4096;

/// Class ids
pub mod class {
    /// Connection class
    pub const CONNECTION: u16 = 10;
    /// Channel class
    pub const CHANNEL: u16 = 20;
    /// Exchange class
    pub const EXCHANGE: u16 = 40;
    /// Queue class
    pub const QUEUE: u16 = 50;
    /// Basic class
    pub const BASIC: u16 = 60;
    /// Confirm class
    pub const CONFIRM: u16 = 85;
    /// Tx class
    pub const TX: u16 = 90;
}

/// Reply codes carried by Close methods and Basic.Return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u16", into = "u16")]
pub enum ReplyCode {
    /// 200
    ReplySuccess,
    /// 311, soft
    ContentTooLarge,
    /// 312, soft
    NoRoute,
    /// 313, soft
    NoConsumers,
    /// 320, hard
    ConnectionForced,
    /// 402, hard
    InvalidPath,
    /// 403, soft
    AccessRefused,
    /// 404, soft
    NotFound,
    /// 405, soft
    ResourceLocked,
    /// 406, soft
    PreconditionFailed,
    /// 501, hard
    FrameError,
    /// 502, hard
    SyntaxError,
    /// 503, hard
    CommandInvalid,
    /// 504, hard
    ChannelError,
    /// 505, hard
    UnexpectedFrame,
    /// 506, hard
    ResourceError,
    /// 530, hard
    NotAllowed,
    /// 540, hard
    NotImplemented,
    /// 541, hard
    InternalError,
    /// Any code not listed above
    Other(u16),
}

impl ReplyCode {
    /// Returns `true` if the code is a channel level (soft) error
    pub fn is_soft_error(&self) -> bool {
        matches!(
            self,
            ReplyCode::ContentTooLarge
                | ReplyCode::NoRoute
                | ReplyCode::NoConsumers
                | ReplyCode::AccessRefused
                | ReplyCode::NotFound
                | ReplyCode::ResourceLocked
                | ReplyCode::PreconditionFailed
        )
    }
}

impl From<u16> for ReplyCode {
    fn from(code: u16) -> Self {
        match code {
            200 => ReplyCode::ReplySuccess,
            311 => ReplyCode::ContentTooLarge,
            312 => ReplyCode::NoRoute,
            313 => ReplyCode::NoConsumers,
            320 => ReplyCode::ConnectionForced,
            402 => ReplyCode::InvalidPath,
            403 => ReplyCode::AccessRefused,
            404 => ReplyCode::NotFound,
            405 => ReplyCode::ResourceLocked,
            406 => ReplyCode::PreconditionFailed,
            501 => ReplyCode::FrameError,
            502 => ReplyCode::SyntaxError,
            503 => ReplyCode::CommandInvalid,
            504 => ReplyCode::ChannelError,
            505 => ReplyCode::UnexpectedFrame,
            506 => ReplyCode::ResourceError,
            530 => ReplyCode::NotAllowed,
            540 => ReplyCode::NotImplemented,
            541 => ReplyCode::InternalError,
            other => ReplyCode::Other(other),
        }
    }
}

impl From<ReplyCode> for u16 {
    fn from(code: ReplyCode) -> Self {
        match code {
            ReplyCode::ReplySuccess => 200,
            ReplyCode::ContentTooLarge => 311,
            ReplyCode::NoRoute => 312,
            ReplyCode::NoConsumers => 313,
            ReplyCode::ConnectionForced => 320,
            ReplyCode::InvalidPath => 402,
            ReplyCode::AccessRefused => 403,
            ReplyCode::NotFound => 404,
            ReplyCode::ResourceLocked => 405,
            ReplyCode::PreconditionFailed => 406,
            ReplyCode::FrameError => 501,
            ReplyCode::SyntaxError => 502,
            ReplyCode::CommandInvalid => 503,
            ReplyCode::ChannelError => 504,
            ReplyCode::UnexpectedFrame => 505,
            ReplyCode::ResourceError => 506,
            ReplyCode::NotAllowed => 530,
            ReplyCode::NotImplemented => 540,
            ReplyCode::InternalError => 541,
            ReplyCode::Other(other) => other,
        }
    }
}

/// The reason carried by a Connection.Close or Channel.Close
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Error {
    /// Reply code
    pub code: ReplyCode,

    /// Human readable reply text
    pub text: String,

    /// Class of the method that caused the close, 0 if none
    pub class_id: u16,

    /// Method that caused the close, 0 if none
    pub method_id: u16,
}

impl Error {
    /// Creates a new error that is not attributed to a method
    pub fn new(code: impl Into<ReplyCode>, text: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            text: text.into(),
            class_id: 0,
            method_id: 0,
        }
    }

    /// Attributes the error to the method identified by `(class_id, method_id)`
    pub fn caused_by(mut self, (class_id, method_id): (u16, u16)) -> Self {
        self.class_id = class_id;
        self.method_id = method_id;
        self
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", u16::from(self.code), self.text)?;
        if self.class_id != 0 || self.method_id != 0 {
            write!(f, " (caused by {}.{})", self.class_id, self.method_id)?;
        }
        Ok(())
    }
}

impl From<ReplyCode> for Error {
    fn from(code: ReplyCode) -> Self {
        Self::new(code, String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_code_round_trip() {
        for code in [
            200u16, 311, 312, 313, 320, 402, 403, 404, 405, 406, 501, 502, 503, 504, 505, 506, 530,
            540, 541, 999,
        ] {
            assert_eq!(u16::from(ReplyCode::from(code)), code);
        }
        assert_eq!(ReplyCode::from(999), ReplyCode::Other(999));
    }

    #[test]
    fn soft_and_hard_errors() {
        assert!(ReplyCode::NotFound.is_soft_error());
        assert!(!ReplyCode::UnexpectedFrame.is_soft_error());
    }

    #[test]
    fn display_includes_cause() {
        let err = Error::new(ReplyCode::NotFound, "NOT_FOUND - no queue 'q'").caused_by((50, 10));
        assert_eq!(err.to_string(), "404 NOT_FOUND - no queue 'q' (caused by 50.10)");
    }
}
