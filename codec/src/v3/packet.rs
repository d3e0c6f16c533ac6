// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::{
    ByteArray, ByteWriter, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader,
    PacketType, VarIntError,
};

use super::{
    ConnectAckPacket, ConnectPacket, DisconnectPacket, PingRequestPacket, PingResponsePacket,
    PublishAckPacket, PublishCompletePacket, PublishPacket, PublishReceivedPacket,
    PublishReleasePacket, SubscribeAckPacket, SubscribePacket, UnsubscribeAckPacket,
    UnsubscribePacket,
};

/// All fourteen control packets of MQTT 3.1.1, keyed by the 4-bit packet
/// type of the fixed header.
///
/// Variable-length fields inside a decoded packet borrow from the buffer
/// the packet was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packet<'a> {
    Connect(ConnectPacket<'a>),
    ConnectAck(ConnectAckPacket),
    Publish(PublishPacket<'a>),
    PublishAck(PublishAckPacket),
    PublishReceived(PublishReceivedPacket),
    PublishRelease(PublishReleasePacket),
    PublishComplete(PublishCompletePacket),
    Subscribe(SubscribePacket<'a>),
    SubscribeAck(SubscribeAckPacket<'a>),
    Unsubscribe(UnsubscribePacket<'a>),
    UnsubscribeAck(UnsubscribeAckPacket),
    PingRequest(PingRequestPacket),
    PingResponse(PingResponsePacket),
    Disconnect(DisconnectPacket),
}

impl<'a> Packet<'a> {
    /// Get the packet type, including publish flags where applicable.
    #[must_use]
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::Connect(_) => PacketType::Connect,
            Self::ConnectAck(_) => PacketType::ConnectAck,
            Self::Publish(packet) => PacketType::Publish {
                dup: packet.dup(),
                qos: packet.qos(),
                retain: packet.retain(),
            },
            Self::PublishAck(_) => PacketType::PublishAck,
            Self::PublishReceived(_) => PacketType::PublishReceived,
            Self::PublishRelease(_) => PacketType::PublishRelease,
            Self::PublishComplete(_) => PacketType::PublishComplete,
            Self::Subscribe(_) => PacketType::Subscribe,
            Self::SubscribeAck(_) => PacketType::SubscribeAck,
            Self::Unsubscribe(_) => PacketType::Unsubscribe,
            Self::UnsubscribeAck(_) => PacketType::UnsubscribeAck,
            Self::PingRequest(_) => PacketType::PingRequest,
            Self::PingResponse(_) => PacketType::PingResponse,
            Self::Disconnect(_) => PacketType::Disconnect,
        }
    }

    /// Decode a packet body, everything after the fixed header, given the
    /// already-parsed packet type.
    ///
    /// `ba` must cover exactly the packet body, i.e. its length equals the
    /// remaining-length field of the fixed header.
    ///
    /// # Errors
    ///
    /// Returns error if the body is malformed or does not fill the declared
    /// remaining length.
    pub fn decode_body(
        packet_type: PacketType,
        ba: &mut ByteArray<'a>,
    ) -> Result<Self, DecodeError> {
        let packet = match packet_type {
            PacketType::Connect => Self::Connect(ConnectPacket::decode_body(ba)?),
            PacketType::ConnectAck => Self::ConnectAck(ConnectAckPacket::decode_body(ba)?),
            PacketType::Publish { dup, qos, retain } => {
                Self::Publish(PublishPacket::decode_body(dup, qos, retain, ba)?)
            }
            PacketType::PublishAck => Self::PublishAck(PublishAckPacket::decode_body(ba)?),
            PacketType::PublishReceived => {
                Self::PublishReceived(PublishReceivedPacket::decode_body(ba)?)
            }
            PacketType::PublishRelease => {
                Self::PublishRelease(PublishReleasePacket::decode_body(ba)?)
            }
            PacketType::PublishComplete => {
                Self::PublishComplete(PublishCompletePacket::decode_body(ba)?)
            }
            PacketType::Subscribe => Self::Subscribe(SubscribePacket::decode_body(ba)?),
            PacketType::SubscribeAck => Self::SubscribeAck(SubscribeAckPacket::decode_body(ba)?),
            PacketType::Unsubscribe => Self::Unsubscribe(UnsubscribePacket::decode_body(ba)?),
            PacketType::UnsubscribeAck => {
                Self::UnsubscribeAck(UnsubscribeAckPacket::decode_body(ba)?)
            }
            PacketType::PingRequest => Self::PingRequest(PingRequestPacket::new()),
            PacketType::PingResponse => Self::PingResponse(PingResponsePacket::new()),
            PacketType::Disconnect => Self::Disconnect(DisconnectPacket::new()),
        };

        if ba.remaining_bytes() != 0 {
            return Err(DecodeError::InvalidRemainingLength);
        }
        Ok(packet)
    }

    /// Get byte length in packet.
    ///
    /// # Errors
    ///
    /// Returns error if packet size is invalid.
    pub fn bytes(&self) -> Result<usize, VarIntError> {
        match self {
            Self::Connect(packet) => packet.bytes(),
            Self::ConnectAck(packet) => packet.bytes(),
            Self::Publish(packet) => packet.bytes(),
            Self::PublishAck(packet) => packet.bytes(),
            Self::PublishReceived(packet) => packet.bytes(),
            Self::PublishRelease(packet) => packet.bytes(),
            Self::PublishComplete(packet) => packet.bytes(),
            Self::Subscribe(packet) => packet.bytes(),
            Self::SubscribeAck(packet) => packet.bytes(),
            Self::Unsubscribe(packet) => packet.bytes(),
            Self::UnsubscribeAck(packet) => packet.bytes(),
            Self::PingRequest(packet) => packet.bytes(),
            Self::PingResponse(packet) => packet.bytes(),
            Self::Disconnect(packet) => packet.bytes(),
        }
    }
}

impl<'a> DecodePacket<'a> for Packet<'a> {
    fn decode(ba: &mut ByteArray<'a>) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        let body = ba.read_bytes(fixed_header.remaining_length())?;
        let mut body = ByteArray::new(body);
        Self::decode_body(fixed_header.packet_type(), &mut body)
    }
}

impl EncodePacket for Packet<'_> {
    fn encode(&self, writer: &mut ByteWriter) -> Result<usize, EncodeError> {
        match self {
            Self::Connect(packet) => packet.encode(writer),
            Self::ConnectAck(packet) => packet.encode(writer),
            Self::Publish(packet) => packet.encode(writer),
            Self::PublishAck(packet) => packet.encode(writer),
            Self::PublishReceived(packet) => packet.encode(writer),
            Self::PublishRelease(packet) => packet.encode(writer),
            Self::PublishComplete(packet) => packet.encode(writer),
            Self::Subscribe(packet) => packet.encode(writer),
            Self::SubscribeAck(packet) => packet.encode(writer),
            Self::Unsubscribe(packet) => packet.encode(writer),
            Self::UnsubscribeAck(packet) => packet.encode(writer),
            Self::PingRequest(packet) => packet.encode(writer),
            Self::PingResponse(packet) => packet.encode(writer),
            Self::Disconnect(packet) => packet.encode(writer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::v3::{SubscribeAck, SubscribeTopic, Will};
    use crate::{PacketId, QoS};

    fn round_trip(packet: &Packet) {
        let mut buf = [0u8; 256];
        let mut writer = ByteWriter::new(&mut buf);
        let written = packet.encode(&mut writer).unwrap();
        assert_eq!(written, packet.bytes().unwrap());

        let mut ba = ByteArray::new(&buf[..written]);
        let decoded = Packet::decode(&mut ba).unwrap();
        assert_eq!(&decoded, packet);
        assert_eq!(ba.remaining_bytes(), 0);
    }

    #[test]
    fn test_round_trip_all_kinds() {
        let mut connect = ConnectPacket::new(b"client-1");
        connect
            .set_clean_session(true)
            .set_will(Will::new(b"will/t", b"bye", QoS::ExactOnce, false))
            .set_username(b"user")
            .set_password(b"pass");
        round_trip(&Packet::Connect(connect));

        round_trip(&Packet::ConnectAck(ConnectAckPacket::new(
            true,
            crate::v3::ConnectReturnCode::Accepted,
        )));

        let mut publish = PublishPacket::new(b"foo/bar", QoS::AtLeastOnce, b"baz");
        publish.set_packet_id(PacketId::new(42));
        round_trip(&Packet::Publish(publish));

        let packet_id = PacketId::new(42);
        round_trip(&Packet::PublishAck(PublishAckPacket::new(packet_id)));
        round_trip(&Packet::PublishReceived(PublishReceivedPacket::new(
            packet_id,
        )));
        round_trip(&Packet::PublishRelease(PublishReleasePacket::new(
            packet_id,
        )));
        round_trip(&Packet::PublishComplete(PublishCompletePacket::new(
            packet_id,
        )));

        let topics = [SubscribeTopic::new(b"a/b", QoS::AtMostOnce)];
        round_trip(&Packet::Subscribe(
            SubscribePacket::new(packet_id, &topics).unwrap(),
        ));

        let acks = [SubscribeAck::QoS(QoS::AtMostOnce)];
        round_trip(&Packet::SubscribeAck(SubscribeAckPacket::new(
            packet_id, &acks,
        )));

        let filters: [&[u8]; 1] = [b"a/b"];
        round_trip(&Packet::Unsubscribe(
            UnsubscribePacket::new(packet_id, &filters).unwrap(),
        ));
        round_trip(&Packet::UnsubscribeAck(UnsubscribeAckPacket::new(
            packet_id,
        )));

        round_trip(&Packet::PingRequest(PingRequestPacket::new()));
        round_trip(&Packet::PingResponse(PingResponsePacket::new()));
        round_trip(&Packet::Disconnect(DisconnectPacket::new()));
    }

    #[test]
    fn test_reencode_broker_bytes() {
        // Re-serializing a decoded packet reproduces the broker's bytes
        // exactly, including flag nibbles and length fields.
        let streams: [&[u8]; 4] = [
            &[0x20, 0x02, 0x01, 0x00],
            &[
                0x32, 0x0e, 0x00, 0x07, 0x66, 0x6f, 0x6f, 0x2f, 0x62, 0x61, 0x72, 0x00, 0x2a,
                0x62, 0x61, 0x7a,
            ],
            &[0x90, 0x04, 0x00, 0x09, 0x01, 0x80],
            &[0xd0, 0x00],
        ];
        for bytes in streams {
            let mut ba = ByteArray::new(bytes);
            let packet = Packet::decode(&mut ba).unwrap();

            let mut buf = [0u8; 64];
            let mut writer = ByteWriter::new(&mut buf);
            let written = packet.encode(&mut writer).unwrap();
            assert_eq!(&buf[..written], bytes);
        }
    }

    #[test]
    fn test_decode_body_rejects_trailing_bytes() {
        // ConnectAck body with one extra byte.
        let body = [0x00, 0x00, 0xff];
        let mut ba = ByteArray::new(&body);
        assert_eq!(
            Packet::decode_body(PacketType::ConnectAck, &mut ba),
            Err(DecodeError::InvalidRemainingLength)
        );
    }

    #[test]
    fn test_decode_stream_of_packets() {
        let buf = [
            0x20, 0x02, 0x01, 0x00, // CONNACK
            0xd0, 0x00, // PINGRESP
            0x40, 0x02, 0x00, 0x2a, // PUBACK
        ];
        let mut ba = ByteArray::new(&buf);
        assert!(matches!(
            Packet::decode(&mut ba),
            Ok(Packet::ConnectAck(_))
        ));
        assert!(matches!(
            Packet::decode(&mut ba),
            Ok(Packet::PingResponse(_))
        ));
        assert!(matches!(Packet::decode(&mut ba), Ok(Packet::PublishAck(_))));
        assert_eq!(ba.remaining_bytes(), 0);
    }
}
