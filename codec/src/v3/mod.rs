// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Packet types of MQTT 3.1.1.

use crate::{ByteArray, DecodeError, DecodePacket, FixedHeader, PacketType};

mod connect;
mod connect_ack;
mod disconnect;
mod packet;
mod ping_request;
mod ping_response;
mod publish;
mod publish_ack;
mod publish_complete;
mod publish_received;
mod publish_release;
mod subscribe;
mod subscribe_ack;
mod unsubscribe;
mod unsubscribe_ack;

pub use connect::{ConnectPacket, Will};
pub use connect_ack::{ConnectAckPacket, ConnectReturnCode};
pub use disconnect::DisconnectPacket;
pub use packet::Packet;
pub use ping_request::PingRequestPacket;
pub use ping_response::PingResponsePacket;
pub use publish::PublishPacket;
pub use publish_ack::PublishAckPacket;
pub use publish_complete::PublishCompletePacket;
pub use publish_received::PublishReceivedPacket;
pub use publish_release::PublishReleasePacket;
pub use subscribe::{SubscribePacket, SubscribeTopic, SubscribeTopics, SubscribeTopicsIter};
pub use subscribe_ack::{SubscribeAck, SubscribeAckPacket, SubscribeAcks, SubscribeAcksIter};
pub use unsubscribe::{UnsubscribePacket, UnsubscribeTopics, UnsubscribeTopicsIter};
pub use unsubscribe_ack::UnsubscribeAckPacket;

/// Read a fixed header expecting `packet_type`, then return a sub-array
/// covering exactly the packet body.
pub(crate) fn read_body<'a>(
    ba: &mut ByteArray<'a>,
    packet_type: PacketType,
) -> Result<ByteArray<'a>, DecodeError> {
    let fixed_header = FixedHeader::decode(ba)?;
    if fixed_header.packet_type() != packet_type {
        return Err(DecodeError::InvalidPacketType);
    }
    let body = ba.read_bytes(fixed_header.remaining_length())?;
    Ok(ByteArray::new(body))
}
