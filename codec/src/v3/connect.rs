// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::convert::TryFrom;

use crate::{
    ByteArray, ByteWriter, ConnectFlags, DecodeError, DecodePacket, EncodeError, EncodePacket,
    FixedHeader, PacketType, ProtocolLevel, QoS, VarIntError, PROTOCOL_NAME,
};

/// Message the broker publishes on the client's behalf if the connection
/// closes abnormally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Will<'a> {
    topic: &'a [u8],
    message: &'a [u8],
    qos: QoS,
    retain: bool,
}

impl<'a> Will<'a> {
    #[must_use]
    pub const fn new(topic: &'a [u8], message: &'a [u8], qos: QoS, retain: bool) -> Self {
        Self {
            topic,
            message,
            qos,
            retain,
        }
    }

    #[must_use]
    pub const fn topic(&self) -> &'a [u8] {
        self.topic
    }

    #[must_use]
    pub const fn message(&self) -> &'a [u8] {
        self.message
    }

    #[must_use]
    pub const fn qos(&self) -> QoS {
        self.qos
    }

    #[must_use]
    pub const fn retain(&self) -> bool {
        self.retain
    }

    /// Get byte length in packet.
    #[must_use]
    pub const fn bytes(&self) -> usize {
        2 + self.topic.len() + 2 + self.message.len()
    }
}

/// `ConnectPacket` consists of three parts:
/// * `FixedHeader`
/// * `VariableHeader`
/// * `Payload`
///
/// Basic struct of `ConnectPacket` is as below:
/// ```txt
///  7                          0
/// +----------------------------+
/// | Fixed header               |
/// |                            |
/// +----------------------------+
/// | Protocol name length       |
/// |                            |
/// +----------------------------+
/// | Protocol name "MQTT"       |
/// +----------------------------+
/// | Protocol level             |
/// +----------------------------+
/// | Connect flags              |
/// +----------------------------+
/// | Keep alive                 |
/// |                            |
/// +----------------------------+
/// | Client id length           |
/// |                            |
/// +----------------------------+
/// | Client id string ...       |
/// +----------------------------+
/// | Will topic (if will)       |
/// +----------------------------+
/// | Will message (if will)     |
/// +----------------------------+
/// | Username (if flag)         |
/// +----------------------------+
/// | Password (if flag)         |
/// +----------------------------+
/// ```
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConnectPacket<'a> {
    /// To control how to handle Session State.
    /// If `clean_session` is true, the Client and Server must discard any
    /// previous session state and start a new one.
    clean_session: bool,

    /// Time interval between two packets in seconds.
    ///
    /// The Client must send a PingRequest packet before exceeding this
    /// interval. If this value is not zero and the interval passes without
    /// traffic, the Server will disconnect the network.
    ///
    /// If this value is zero, the Server is not required to disconnect.
    keep_alive: u16,

    /// Payload is `client_id`.
    ///
    /// `client_id` is generated on the client side. Normally it is a device
    /// id or just a randomly generated string, and identifies the session
    /// on the server.
    client_id: &'a [u8],

    /// Will message stored server side, published on abnormal disconnect.
    will: Option<Will<'a>>,

    username: Option<&'a [u8]>,

    password: Option<&'a [u8]>,
}

impl<'a> ConnectPacket<'a> {
    /// Create a new connect packet with `client_id`.
    #[must_use]
    pub const fn new(client_id: &'a [u8]) -> Self {
        Self {
            clean_session: false,
            keep_alive: 60,
            client_id,
            will: None,
            username: None,
            password: None,
        }
    }

    /// Update clean-session flag.
    pub fn set_clean_session(&mut self, clean_session: bool) -> &mut Self {
        self.clean_session = clean_session;
        self
    }

    #[must_use]
    #[inline]
    pub const fn clean_session(&self) -> bool {
        self.clean_session
    }

    /// Update keep alive value in seconds.
    pub fn set_keep_alive(&mut self, keep_alive: u16) -> &mut Self {
        self.keep_alive = keep_alive;
        self
    }

    #[must_use]
    #[inline]
    pub const fn keep_alive(&self) -> u16 {
        self.keep_alive
    }

    #[must_use]
    pub const fn client_id(&self) -> &'a [u8] {
        self.client_id
    }

    /// Update will message.
    pub fn set_will(&mut self, will: Will<'a>) -> &mut Self {
        self.will = Some(will);
        self
    }

    #[must_use]
    pub const fn will(&self) -> Option<Will<'a>> {
        self.will
    }

    /// Update username value.
    pub fn set_username(&mut self, username: &'a [u8]) -> &mut Self {
        self.username = Some(username);
        self
    }

    #[must_use]
    pub const fn username(&self) -> Option<&'a [u8]> {
        self.username
    }

    /// Update password value.
    pub fn set_password(&mut self, password: &'a [u8]) -> &mut Self {
        self.password = Some(password);
        self
    }

    #[must_use]
    pub const fn password(&self) -> Option<&'a [u8]> {
        self.password
    }

    fn connect_flags(&self) -> ConnectFlags {
        ConnectFlags {
            has_username: self.username.is_some(),
            has_password: self.password.is_some(),
            will_retain: self.will.map_or(false, |will| will.retain()),
            will_qos: self.will.map_or(QoS::AtMostOnce, |will| will.qos()),
            will: self.will.is_some(),
            clean_session: self.clean_session,
        }
    }

    fn get_fixed_header(&self) -> Result<FixedHeader, VarIntError> {
        let mut remaining_length = 2 + PROTOCOL_NAME.len()
            + ProtocolLevel::bytes()
            + ConnectFlags::bytes()
            + 2
            + 2
            + self.client_id.len();
        if let Some(will) = &self.will {
            remaining_length += will.bytes();
        }
        if let Some(username) = &self.username {
            remaining_length += 2 + username.len();
        }
        if let Some(password) = &self.password {
            remaining_length += 2 + password.len();
        }

        FixedHeader::new(PacketType::Connect, remaining_length)
    }

    /// Decode the packet body, everything after the fixed header.
    ///
    /// # Errors
    ///
    /// Returns error if the body is malformed.
    pub fn decode_body(ba: &mut ByteArray<'a>) -> Result<Self, DecodeError> {
        let protocol_name = ba.read_binary()?;
        if protocol_name != PROTOCOL_NAME {
            log::error!("connect: Invalid protocol name: {protocol_name:?}");
            return Err(DecodeError::InvalidProtocolName);
        }
        let _level = ProtocolLevel::try_from(ba.read_byte()?)?;
        let flags = ConnectFlags::decode(ba)?;
        let keep_alive = ba.read_u16()?;

        let client_id = ba.read_binary()?;
        let will = if flags.will() {
            let topic = ba.read_binary()?;
            let message = ba.read_binary()?;
            Some(Will::new(topic, message, flags.will_qos(), flags.will_retain()))
        } else {
            None
        };
        let username = if flags.has_username() {
            Some(ba.read_binary()?)
        } else {
            None
        };
        let password = if flags.has_password() {
            Some(ba.read_binary()?)
        } else {
            None
        };

        Ok(Self {
            clean_session: flags.clean_session(),
            keep_alive,
            client_id,
            will,
            username,
            password,
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

impl<'a> DecodePacket<'a> for ConnectPacket<'a> {
    fn decode(ba: &mut ByteArray<'a>) -> Result<Self, DecodeError> {
        let mut body = super::read_body(ba, PacketType::Connect)?;
        let packet = Self::decode_body(&mut body)?;
        if body.remaining_bytes() != 0 {
            return Err(DecodeError::InvalidRemainingLength);
        }
        Ok(packet)
    }
}

impl EncodePacket for ConnectPacket<'_> {
    fn encode(&self, writer: &mut ByteWriter) -> Result<usize, EncodeError> {
        let old_len = writer.len();

        let fixed_header = self.get_fixed_header()?;
        fixed_header.encode(writer)?;

        // Write variable header
        writer.write_binary(PROTOCOL_NAME)?;
        ProtocolLevel::V311.encode(writer)?;
        self.connect_flags().encode(writer)?;
        writer.write_u16(self.keep_alive)?;

        // Write payload
        writer.write_binary(self.client_id)?;
        if let Some(will) = &self.will {
            writer.write_binary(will.topic())?;
            writer.write_binary(will.message())?;
        }
        if let Some(username) = &self.username {
            writer.write_binary(username)?;
        }
        if let Some(password) = &self.password {
            writer.write_binary(password)?;
        }

        Ok(writer.len() - old_len)
    }
}
