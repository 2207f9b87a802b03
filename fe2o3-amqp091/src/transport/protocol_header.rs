//! Implements the protocol header

use fe2o3_amqp091_types::definitions::{MAJOR, MINOR, REVISION};

const PROTOCOL_HEADER_PREFIX: &[u8; 4] = b"AMQP";

/// Protocol header
///
/// The client opens a connection by writing the header of the version it
/// wants to speak. A server that does not support that version writes back
/// the header of the version it prefers and closes the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolHeader {
    /// Major number
    pub major: u8,

    /// Minor number
    pub minor: u8,

    /// Revision number
    pub revision: u8,
}

impl Default for ProtocolHeader {
    fn default() -> Self {
        Self {
            major: MAJOR,
            minor: MINOR,
            revision: REVISION,
        }
    }
}

impl ProtocolHeader {
    /// Creates an AMQP 0-9-1 protocol header
    pub fn amqp() -> Self {
        Self::default()
    }
}

impl From<ProtocolHeader> for [u8; 8] {
    fn from(value: ProtocolHeader) -> Self {
        [
            PROTOCOL_HEADER_PREFIX[0], // b'A'
            PROTOCOL_HEADER_PREFIX[1], // b'M'
            PROTOCOL_HEADER_PREFIX[2], // b'Q'
            PROTOCOL_HEADER_PREFIX[3], // b'P'
            0,
            value.major,
            value.minor,
            value.revision,
        ]
    }
}

impl TryFrom<[u8; 8]> for ProtocolHeader {
    type Error = [u8; 8];

    fn try_from(value: [u8; 8]) -> Result<Self, Self::Error> {
        if &value[..4] != PROTOCOL_HEADER_PREFIX || value[4] != 0 {
            return Err(value);
        }
        Ok(Self {
            major: value[5],
            minor: value[6],
            revision: value[7],
        })
    }
}

#[cfg(test)]
mod tests {
    use fe2o3_amqp091_types::definitions::PROTOCOL_HEADER;

    use super::ProtocolHeader;

    #[test]
    fn amqp_header_bytes() {
        let bytes: [u8; 8] = ProtocolHeader::amqp().into();
        assert_eq!(bytes, PROTOCOL_HEADER);
        assert_eq!(&bytes, b"AMQP\x00\x00\x09\x01");
    }

    #[test]
    fn parse_reply_header() {
        let header = ProtocolHeader::try_from(*b"AMQP\x00\x00\x08\x00").unwrap();
        assert_eq!((header.major, header.minor, header.revision), (0, 8, 0));
        assert!(ProtocolHeader::try_from(*b"HTTP/1.1").is_err());
    }
}
