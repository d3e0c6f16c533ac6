// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::convert::TryFrom;

use crate::{
    ByteArray, ByteWriter, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader,
    PacketType, VarIntError,
};

/// If the Server sends a `ConnectAck` packet with non-zero return code, it MUST
/// close the network connection.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectReturnCode {
    /// Connection accepted.
    #[default]
    Accepted = 0,

    /// The server does not support the level of the MQTT protocol requested
    /// by the Client.
    UnacceptedProtocol = 1,

    /// The Client identifier is correct UTF-8 but not allowed by the Server.
    IdentifierRejected = 2,

    /// The Network Connection has been made but the MQTT service is unavailable.
    ServerUnavailable = 3,

    /// The data in the username or password is malformed.
    MalformedUsernamePassword = 4,

    /// The Client is not authorized to connect.
    Unauthorized = 5,
}

impl TryFrom<u8> for ConnectReturnCode {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::Accepted),
            1 => Ok(Self::UnacceptedProtocol),
            2 => Ok(Self::IdentifierRejected),
            3 => Ok(Self::ServerUnavailable),
            4 => Ok(Self::MalformedUsernamePassword),
            5 => Ok(Self::Unauthorized),
            // 6-255 are reserved.
            code => {
                log::error!("connect_ack: Invalid return code: {code}");
                Err(DecodeError::InvalidReturnCode)
            }
        }
    }
}

/// The first packet sent to the Client from the Server must be `ConnectAckPacket`.
///
/// Basic packet structure:
/// ```txt
///  7                       0
/// +-------------------------+
/// | Fixed header            |
/// |                         |
/// +-------------------------+
/// | Ack flags               |
/// +-------------------------+
/// | Return code             |
/// +-------------------------+
/// ```
///
/// This packet does not contain payload.
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectAckPacket {
    /// Session Present flag is bit 0 of the Ack flags byte, bits 7-1 are
    /// reserved.
    ///
    /// Set when the Server already holds session state for this client id
    /// and `clean_session` was false in the connect request.
    session_present: bool,

    /// Byte 2 in the variable header.
    return_code: ConnectReturnCode,
}

impl ConnectAckPacket {
    #[must_use]
    pub fn new(mut session_present: bool, return_code: ConnectReturnCode) -> Self {
        // If a server sends a CONNACK packet containing a non-zero return code
        // it MUST set Session Present to 0 [MQTT-3.2.2-4].
        if return_code != ConnectReturnCode::Accepted {
            session_present = false;
        }
        Self {
            session_present,
            return_code,
        }
    }

    #[must_use]
    pub const fn return_code(&self) -> ConnectReturnCode {
        self.return_code
    }

    #[must_use]
    pub const fn session_present(&self) -> bool {
        self.session_present
    }

    const fn remaining_length() -> usize {
        // ack_flags + return_code
        2
    }

    /// Decode the packet body, everything after the fixed header.
    ///
    /// # Errors
    ///
    /// Returns error if the body is malformed.
    pub fn decode_body(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let ack_flags = ba.read_byte()?;
        let session_present = ack_flags & 0b0000_0001 == 0b0000_0001;
        let return_code = ConnectReturnCode::try_from(ba.read_byte()?)?;

        Ok(Self {
            session_present,
            return_code,
        })
    }

    /// Get byte length in packet.
    ///
    /// # Errors
    ///
    /// Returns error if packet size is invalid.
    pub fn bytes(&self) -> Result<usize, VarIntError> {
        let fixed_header = FixedHeader::new(PacketType::ConnectAck, Self::remaining_length())?;
        Ok(fixed_header.bytes() + fixed_header.remaining_length())
    }
}

impl<'a> DecodePacket<'a> for ConnectAckPacket {
    fn decode(ba: &mut ByteArray<'a>) -> Result<Self, DecodeError> {
        let mut body = super::read_body(ba, PacketType::ConnectAck)?;
        let packet = Self::decode_body(&mut body)?;
        if body.remaining_bytes() != 0 {
            return Err(DecodeError::InvalidRemainingLength);
        }
        Ok(packet)
    }
}

impl EncodePacket for ConnectAckPacket {
    fn encode(&self, writer: &mut ByteWriter) -> Result<usize, EncodeError> {
        let old_len = writer.len();

        let fixed_header = FixedHeader::new(PacketType::ConnectAck, Self::remaining_length())?;
        fixed_header.encode(writer)?;

        let ack_flags = if self.session_present { 0b0000_0001 } else { 0 };
        writer.write_byte(ack_flags)?;
        writer.write_byte(self.return_code as u8)?;

        Ok(writer.len() - old_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode() {
        let buf = [0x20, 0x02, 0x01, 0x00];
        let mut ba = ByteArray::new(&buf);
        let packet = ConnectAckPacket::decode(&mut ba).unwrap();
        assert!(packet.session_present());
        assert_eq!(packet.return_code(), ConnectReturnCode::Accepted);
    }

    #[test]
    fn test_decode_invalid_return_code() {
        let buf = [0x20, 0x02, 0x00, 0x06];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            ConnectAckPacket::decode(&mut ba),
            Err(DecodeError::InvalidReturnCode)
        );
    }

    #[test]
    fn test_round_trip() {
        let packet = ConnectAckPacket::new(false, ConnectReturnCode::ServerUnavailable);
        let mut buf = [0u8; 4];
        let mut writer = ByteWriter::new(&mut buf);
        let written = packet.encode(&mut writer).unwrap();
        assert_eq!(written, packet.bytes().unwrap());
        assert_eq!(&buf, &[0x20, 0x02, 0x00, 0x03]);

        let mut ba = ByteArray::new(&buf);
        assert_eq!(ConnectAckPacket::decode(&mut ba), Ok(packet));
    }
}
