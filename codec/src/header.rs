// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::convert::TryFrom;

use crate::{
    ByteArray, ByteWriter, DecodeError, DecodePacket, EncodeError, EncodePacket, QoS, VarInt,
    VarIntError,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PacketType {
    /// Request to connect to broker
    #[default]
    Connect,

    /// Broker reply to connect request
    ConnectAck,

    /// Publish message
    Publish { dup: bool, qos: QoS, retain: bool },

    /// Publish acknowledgement
    PublishAck,

    /// Publish received
    PublishReceived,

    /// Publish release
    PublishRelease,

    /// Publish complete
    PublishComplete,

    /// Client subscribe request
    Subscribe,

    /// Subscribe acknowledgement
    SubscribeAck,

    /// Unsubscribe request
    Unsubscribe,

    /// Unsubscribe acknowledgement
    UnsubscribeAck,

    /// Client ping request
    PingRequest,

    /// Server ping response
    PingResponse,

    /// Client is disconnecting
    Disconnect,
}

impl PacketType {
    /// Get byte length used in packet.
    #[must_use]
    pub const fn bytes() -> usize {
        1
    }
}

impl From<PacketType> for u8 {
    fn from(packet_type: PacketType) -> Self {
        let type_bits = match packet_type {
            PacketType::Connect => 1,
            PacketType::ConnectAck => 2,
            PacketType::Publish { .. } => 3,
            PacketType::PublishAck => 4,
            PacketType::PublishReceived => 5,
            PacketType::PublishRelease => 6,
            PacketType::PublishComplete => 7,
            PacketType::Subscribe => 8,
            PacketType::SubscribeAck => 9,
            PacketType::Unsubscribe => 10,
            PacketType::UnsubscribeAck => 11,
            PacketType::PingRequest => 12,
            PacketType::PingResponse => 13,
            PacketType::Disconnect => 14,
        };

        let flags_bits = match packet_type {
            PacketType::Publish { dup, qos, retain } => {
                let dup = if dup { 0b0000_1000 } else { 0b0000_0000 };
                let qos = match qos {
                    QoS::AtMostOnce => 0b0000_0000,
                    QoS::AtLeastOnce => 0b0000_0010,
                    QoS::ExactOnce => 0b0000_0100,
                };
                let retain = if retain { 0b0000_0001 } else { 0b0000_0000 };
                dup | qos | retain
            }
            // Bits 3,2,1 and 0 of the fixed header in the PUBREL Control Packet are reserved
            // and MUST be set to 0,0,1 and 0 respectively [MQTT-3.6.1-1]. Same for
            // SUBSCRIBE [MQTT-3.8.1-1] and UNSUBSCRIBE [MQTT-3.10.1-1].
            PacketType::PublishRelease | PacketType::Subscribe | PacketType::Unsubscribe => {
                0b0000_0010
            }
            _ => 0b0000_0000,
        };
        (type_bits << 4) | flags_bits
    }
}

impl TryFrom<u8> for PacketType {
    type Error = DecodeError;

    /// Parse packet type from one byte of data.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPacketType` if the type nibble is out of range,
    /// `InvalidQoS` for QoS value 3 in a Publish header, and
    /// `InvalidPacketFlags` if reserved flag bits are not as expected.
    fn try_from(v: u8) -> Result<Self, Self::Error> {
        let type_bits = (v & 0b1111_0000) >> 4;
        let flag = v & 0b0000_1111;

        let packet_type = match type_bits {
            1 => Self::Connect,
            2 => Self::ConnectAck,
            3 => {
                let dup = (flag & 0b0000_1000) == 0b0000_1000;
                let retain = (flag & 0b0000_0001) == 0b0000_0001;
                let qos = match flag & 0b0000_0110 {
                    0b0000_0000 => QoS::AtMostOnce,
                    0b0000_0010 => QoS::AtLeastOnce,
                    0b0000_0100 => QoS::ExactOnce,
                    _ => return Err(DecodeError::InvalidQoS),
                };
                return Ok(Self::Publish { dup, qos, retain });
            }
            4 => Self::PublishAck,
            5 => Self::PublishReceived,
            6 => Self::PublishRelease,
            7 => Self::PublishComplete,
            8 => Self::Subscribe,
            9 => Self::SubscribeAck,
            10 => Self::Unsubscribe,
            11 => Self::UnsubscribeAck,
            12 => Self::PingRequest,
            13 => Self::PingResponse,
            14 => Self::Disconnect,
            t => {
                log::error!("header: Invalid type bits: {t:#b}");
                return Err(DecodeError::InvalidPacketType);
            }
        };

        // Where a flag bit is marked as "Reserved", it is reserved for future use
        // and MUST be set to the value listed [MQTT-2.2.2-1]. If invalid flags are
        // received, the receiver MUST close the Network Connection [MQTT-2.2.2-2].
        let expected_flag = match packet_type {
            Self::PublishRelease | Self::Subscribe | Self::Unsubscribe => 0b0000_0010,
            _ => 0b0000_0000,
        };
        if flag != expected_flag {
            log::error!("header: Got packet flag {flag:#b} in {packet_type:?}");
            return Err(DecodeError::InvalidPacketFlags);
        }
        Ok(packet_type)
    }
}

/// Fixed header part of a mqtt control packet. It consists of at least two bytes.
///
/// ```txt
///  7 6 5 4 3 2 1 0
/// +-------+-------+
/// | Type  | Flags |
/// +-------+-------+
/// | Remaining Len |
/// +-------+-------+
/// ```
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedHeader {
    packet_type: PacketType,

    /// `Remaining Length` uses variable length encoding method. The 7th bit
    /// in a byte is used to indicate that more bytes follow. At most 4 bytes,
    /// maximum value `0xFF 0xFF 0xFF 0x7F`.
    remaining_length: VarInt,
}

impl FixedHeader {
    /// Create a new fixed header with `packet_type` and `remaining_length`.
    ///
    /// # Errors
    ///
    /// Returns error if `remaining_length` is invalid.
    pub const fn new(packet_type: PacketType, remaining_length: usize) -> Result<Self, VarIntError> {
        let remaining_length = match VarInt::from(remaining_length) {
            Ok(remaining_length) => remaining_length,
            Err(err) => return Err(err),
        };
        Ok(Self {
            packet_type,
            remaining_length,
        })
    }

    #[must_use]
    pub const fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    #[must_use]
    pub const fn remaining_length(&self) -> usize {
        self.remaining_length.value()
    }

    /// Get byte length in packet.
    #[must_use]
    pub const fn bytes(&self) -> usize {
        PacketType::bytes() + self.remaining_length.bytes()
    }
}

impl<'a> DecodePacket<'a> for FixedHeader {
    fn decode(ba: &mut ByteArray<'a>) -> Result<Self, DecodeError> {
        let flag = ba.read_byte()?;

        let packet_type = PacketType::try_from(flag)?;
        let remaining_length = VarInt::decode(ba)?;

        Ok(Self {
            packet_type,
            remaining_length,
        })
    }
}

impl EncodePacket for FixedHeader {
    fn encode(&self, writer: &mut ByteWriter) -> Result<usize, EncodeError> {
        let packet_type: u8 = self.packet_type.into();
        writer.write_byte(packet_type)?;

        let length_bytes = self.remaining_length.encode(writer)?;
        Ok(PacketType::bytes() + length_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode() {
        let mut buf = [0u8; 8];
        let mut writer = ByteWriter::new(&mut buf);
        let fixed_header = FixedHeader::new(PacketType::PingResponse, 0).unwrap();
        assert_eq!(fixed_header.encode(&mut writer), Ok(2));
        assert_eq!(&buf[..2], &[0xd0, 0x00]);
    }

    #[test]
    fn test_decode_publish() {
        let buf = [0x3b, 0x13];
        let mut ba = ByteArray::new(&buf);
        let fixed_header = FixedHeader::decode(&mut ba).unwrap();
        assert_eq!(
            fixed_header.packet_type(),
            PacketType::Publish {
                dup: true,
                qos: QoS::AtLeastOnce,
                retain: true,
            }
        );
        assert_eq!(fixed_header.remaining_length(), 19);
    }

    #[test]
    fn test_decode_invalid_qos() {
        // Publish header with QoS bits set to 0b11.
        assert_eq!(PacketType::try_from(0x36), Err(DecodeError::InvalidQoS));
    }

    #[test]
    fn test_decode_reserved_flags() {
        // PUBREL must carry flag nibble 0b0010.
        assert_eq!(PacketType::try_from(0x62), Ok(PacketType::PublishRelease));
        assert_eq!(
            PacketType::try_from(0x60),
            Err(DecodeError::InvalidPacketFlags)
        );
        // SUBSCRIBE likewise.
        assert_eq!(PacketType::try_from(0x82), Ok(PacketType::Subscribe));
        assert_eq!(
            PacketType::try_from(0x80),
            Err(DecodeError::InvalidPacketFlags)
        );
    }

    #[test]
    fn test_decode_invalid_type() {
        assert_eq!(
            PacketType::try_from(0x00),
            Err(DecodeError::InvalidPacketType)
        );
        assert_eq!(
            PacketType::try_from(0xf0),
            Err(DecodeError::InvalidPacketType)
        );
    }
}
