// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::{
    ByteArray, ByteWriter, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader,
    PacketId, PacketType, QoS, VarIntError,
};

/// `PublishPacket` is used to transport application messages from the Client
/// to the Server, or from the Server to the Client.
///
/// Basic structure of packet:
///
/// ```txt
///  7                     0
/// +-----------------------+
/// | Fixed header          |
/// |                       |
/// +-----------------------+
/// | Topic name length     |
/// |                       |
/// +-----------------------+
/// | Topic name ...        |
/// +-----------------------+
/// | Packet Identifier     |
/// |                       |
/// +-----------------------+
/// | Msg payload ...       |
/// +-----------------------+
/// ```
///
/// Note that `packet_id` only appears in `QoS` 1 and `QoS` 2 packets.
///
/// The topic and payload slices borrow from the buffer the packet was
/// decoded from, or from the caller when building a packet to send.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishPacket<'a> {
    /// If dup is false, this is the first occasion the packet is sent.
    /// If it is true, this might be a re-delivery of an earlier attempt.
    ///
    /// The DUP flag MUST be set to 0 for all QoS 0 messages [MQTT-3.3.1-2].
    dup: bool,

    /// `qos` field indicates the level of assurance for delivery of the packet.
    qos: QoS,

    /// If `retain` is true in a packet sent to the Server, the Server stores
    /// the message so it can be delivered to future subscribers.
    retain: bool,

    /// `topic` name must not contain wildcard characters.
    topic: &'a [u8],

    /// Only present in packets where the `QoS` level is 1 or 2.
    packet_id: Option<PacketId>,

    /// Application message. A zero length payload is valid.
    payload: &'a [u8],
}

impl<'a> PublishPacket<'a> {
    /// Create a new publish packet.
    #[must_use]
    pub const fn new(topic: &'a [u8], qos: QoS, payload: &'a [u8]) -> Self {
        Self {
            dup: false,
            qos,
            retain: false,
            topic,
            packet_id: None,
            payload,
        }
    }

    /// Update `retain` flag.
    pub fn set_retain(&mut self, retain: bool) -> &mut Self {
        self.retain = retain;
        self
    }

    #[must_use]
    pub const fn retain(&self) -> bool {
        self.retain
    }

    /// Update `dup` flag.
    ///
    /// Only meaningful for re-deliveries at `QoS` 1 or 2; MUST stay false
    /// for `QoS` 0 messages [MQTT-3.3.1-2].
    pub fn set_dup(&mut self, dup: bool) -> &mut Self {
        self.dup = dup;
        self
    }

    #[must_use]
    pub const fn dup(&self) -> bool {
        self.dup
    }

    #[must_use]
    pub const fn qos(&self) -> QoS {
        self.qos
    }

    /// The Packet Identifier field is only present in PUBLISH Packets where
    /// the `QoS` level is 1 or 2.
    pub fn set_packet_id(&mut self, packet_id: PacketId) -> &mut Self {
        self.packet_id = Some(packet_id);
        self
    }

    #[must_use]
    pub const fn packet_id(&self) -> Option<PacketId> {
        self.packet_id
    }

    #[must_use]
    pub const fn topic(&self) -> &'a [u8] {
        self.topic
    }

    #[must_use]
    pub const fn payload(&self) -> &'a [u8] {
        self.payload
    }

    fn get_fixed_header(&self) -> Result<FixedHeader, VarIntError> {
        let mut remaining_length = 2 + self.topic.len() + self.payload.len();
        if self.qos != QoS::AtMostOnce {
            remaining_length += PacketId::bytes();
        }

        let packet_type = PacketType::Publish {
            dup: self.dup,
            qos: self.qos,
            retain: self.retain,
        };
        FixedHeader::new(packet_type, remaining_length)
    }

    /// Decode the packet body given the flags from the fixed header.
    ///
    /// `ba` must cover exactly the packet body; the payload is everything
    /// after topic and packet id.
    ///
    /// # Errors
    ///
    /// Returns error if the body is malformed.
    pub fn decode_body(
        dup: bool,
        qos: QoS,
        retain: bool,
        ba: &mut ByteArray<'a>,
    ) -> Result<Self, DecodeError> {
        // The DUP flag MUST be set to 0 for all QoS 0 messages [MQTT-3.3.1-2].
        if dup && qos == QoS::AtMostOnce {
            return Err(DecodeError::InvalidPacketFlags);
        }

        let topic = ba.read_binary()?;

        // The Packet Identifier field is only present in PUBLISH Packets
        // where the QoS level is 1 or 2.
        let packet_id = if qos == QoS::AtMostOnce {
            None
        } else {
            let packet_id = PacketId::decode(ba)?;
            if packet_id.value() == 0 {
                // PUBLISH (in cases where QoS > 0) Control Packets MUST
                // contain a non-zero 16-bit Packet Identifier [MQTT-2.3.1-1].
                return Err(DecodeError::InvalidPacketId);
            }
            Some(packet_id)
        };

        // It is valid for a PUBLISH Packet to contain a zero length payload.
        let payload = ba.read_remaining();

        Ok(Self {
            dup,
            qos,
            retain,
            topic,
            packet_id,
            payload,
        })
    }

    /// Get byte length in packet.
    ///
    /// # Errors
    ///
    /// Returns error if packet size is invalid.
    pub fn bytes(&self) -> Result<usize, VarIntError> {
        let fixed_header = self.get_fixed_header()?;
        Ok(fixed_header.bytes() + fixed_header.remaining_length())
    }
}

impl<'a> DecodePacket<'a> for PublishPacket<'a> {
    fn decode(ba: &mut ByteArray<'a>) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        let PacketType::Publish { dup, qos, retain } = fixed_header.packet_type() else {
            return Err(DecodeError::InvalidPacketType);
        };

        let body = ba.read_bytes(fixed_header.remaining_length())?;
        let mut body = ByteArray::new(body);
        Self::decode_body(dup, qos, retain, &mut body)
    }
}

impl EncodePacket for PublishPacket<'_> {
    fn encode(&self, writer: &mut ByteWriter) -> Result<usize, EncodeError> {
        let old_len = writer.len();

        let fixed_header = self.get_fixed_header()?;
        fixed_header.encode(writer)?;

        // Write variable header
        writer.write_binary(self.topic)?;
        if self.qos != QoS::AtMostOnce {
            let packet_id = self.packet_id.ok_or(EncodeError::InvalidPacketId)?;
            packet_id.encode(writer)?;
        }

        // Write payload
        writer.write_bytes(self.payload)?;

        Ok(writer.len() - old_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_qos1() {
        let buf = [
            0x32, 0x0e, 0x00, 0x07, 0x66, 0x6f, 0x6f, 0x2f, 0x62, 0x61, 0x72, 0x00, 0x2a, 0x62,
            0x61, 0x7a,
        ];
        let mut ba = ByteArray::new(&buf);
        let packet = PublishPacket::decode(&mut ba).unwrap();
        assert!(!packet.dup());
        assert_eq!(packet.qos(), QoS::AtLeastOnce);
        assert!(!packet.retain());
        assert_eq!(packet.topic(), b"foo/bar");
        assert_eq!(packet.packet_id(), Some(PacketId::new(42)));
        assert_eq!(packet.payload(), b"baz");
    }

    #[test]
    fn test_decode_qos0_has_no_packet_id() {
        let buf = [0x30, 0x0c, 0x00, 0x07, 0x66, 0x6f, 0x6f, 0x2f, 0x62, 0x61, 0x72, 0x62, 0x61,
            0x7a];
        let mut ba = ByteArray::new(&buf);
        let packet = PublishPacket::decode(&mut ba).unwrap();
        assert_eq!(packet.packet_id(), None);
        assert_eq!(packet.payload(), b"baz");
    }

    #[test]
    fn test_decode_rejects_dup_at_qos0() {
        let buf = [0x38, 0x05, 0x00, 0x03, 0x66, 0x6f, 0x6f];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            PublishPacket::decode(&mut ba),
            Err(DecodeError::InvalidPacketFlags)
        );
    }

    #[test]
    fn test_decode_rejects_packet_id_zero() {
        let buf = [0x32, 0x07, 0x00, 0x03, 0x66, 0x6f, 0x6f, 0x00, 0x00];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            PublishPacket::decode(&mut ba),
            Err(DecodeError::InvalidPacketId)
        );
    }

    #[test]
    fn test_round_trip_empty_payload() {
        let mut packet = PublishPacket::new(b"a/b", QoS::ExactOnce, b"");
        packet.set_packet_id(PacketId::new(7)).set_retain(true);

        let mut buf = [0u8; 16];
        let mut writer = ByteWriter::new(&mut buf);
        let written = packet.encode(&mut writer).unwrap();
        assert_eq!(written, packet.bytes().unwrap());

        let mut ba = ByteArray::new(&buf[..written]);
        assert_eq!(PublishPacket::decode(&mut ba), Ok(packet));
    }

    #[test]
    fn test_encode_qos1_without_packet_id() {
        let packet = PublishPacket::new(b"a/b", QoS::AtLeastOnce, b"x");
        let mut buf = [0u8; 16];
        let mut writer = ByteWriter::new(&mut buf);
        assert_eq!(
            packet.encode(&mut writer),
            Err(EncodeError::InvalidPacketId)
        );
    }
}
