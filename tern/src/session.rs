// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::time::{Duration, Instant};

use codec::v3::{
    ConnectPacket, DisconnectPacket, Packet, PingRequestPacket, PublishAckPacket,
    PublishCompletePacket, PublishPacket, PublishReceivedPacket, SubscribePacket, SubscribeTopic,
    UnsubscribePacket,
};
use codec::{ByteArray, ByteWriter, EncodeError, EncodePacket, PacketId, PacketType, QoS};

use crate::connect_options::ConnectOptions;
use crate::error::ErrorKind;
use crate::packet_id::PacketIdAllocator;
use crate::pending::PendingPubrec;

/// What a call to [`Session::feed`] produced.
#[derive(Debug, PartialEq, Eq)]
pub enum Event<'a> {
    /// Input fully consumed, nothing to report.
    None,

    /// A complete packet arrived.
    ///
    /// Slices inside the packet borrow the session's read buffer and stay
    /// valid until the next call into the session.
    Incoming(Packet<'a>),

    /// Bytes the host must write to the transport. The buffer is reclaimed
    /// on the next call into the session.
    Outgoing(&'a [u8]),

    /// A recoverable protocol error; parsing resumes at the next packet.
    Error(ErrorKind),
}

/// Result of one [`Session::feed`] round.
#[derive(Debug)]
pub struct Feed<'a> {
    /// Number of input bytes consumed. The host re-feeds the rest.
    pub consumed: usize,

    /// What happened this round.
    pub event: Event<'a>,
}

enum ParseState {
    /// Waiting for the first byte of a fixed header.
    TypeAndFlags,

    /// Collecting the variable-length remaining-length field.
    RemainingLength,

    /// Copying a packet body into the read buffer.
    Accumulate,

    /// Skipping a body that did not fit into the read buffer.
    Discard,
}

/// Sans-I/O MQTT 3.1.1 client session.
///
/// The session owns no sockets and performs no I/O. The host reads bytes
/// from its transport and hands them to [`Session::feed`]; outbound packets
/// queue up in the caller-provided write buffer and come back out of
/// `feed` as [`Event::Outgoing`]. A typical host loop:
///
/// ```ignore
/// let mut input: &[u8] = &net_buf[..n];
/// loop {
///     let feed = session.feed(input, Instant::now());
///     input = &input[feed.consumed..];
///     match feed.event {
///         Event::None => break,
///         Event::Outgoing(buf) => stream.write_all(buf)?,
///         Event::Incoming(packet) => handle(packet),
///         Event::Error(err) => log::error!("session error: {err:?}"),
///     }
/// }
/// ```
///
/// Apart from the two buffers handed to [`Session::new`] the session
/// allocates nothing. It is not thread-safe; external locking is required
/// if enqueue calls race with `feed`.
pub struct Session<'b> {
    /// Inbound scratch; packet bodies accumulate here and decoded packets
    /// borrow from it.
    read_buf: &'b mut [u8],

    /// Outbound scratch; every enqueued packet appends here.
    write_buf: &'b mut [u8],
    write_len: usize,

    /// The write buffer was handed to the host and is reclaimed on the
    /// next call into the session.
    write_handed: bool,

    state: ParseState,

    /// First byte of the fixed header being parsed. Decoded once the body
    /// is complete, so a bad flag nibble cannot desynchronize framing.
    header_byte: u8,

    /// Remaining-length accumulator.
    length_value: usize,
    length_multiplier: usize,

    /// Body size of the packet being collected, and bytes received so far.
    body_len: usize,
    body_filled: usize,

    /// Bytes of an oversize body still to skip.
    discard_left: usize,

    /// Keep alive interval recorded at connect; zero disables the timer.
    keep_alive: Duration,

    /// Time of the most recent append to the write buffer.
    last_write: Instant,

    /// Clock value of the most recent host call.
    now: Instant,

    packet_ids: PacketIdAllocator,

    pending_pubrec: PendingPubrec,
}

impl<'b> Session<'b> {
    /// Create a session over two caller-provided scratch regions.
    ///
    /// `read_buf` bounds the largest inbound packet body the session
    /// accepts; larger bodies are discarded with [`ErrorKind::OutOfMemory`].
    /// `write_buf` bounds the outbound backlog between two `feed` calls.
    #[must_use]
    pub fn new(read_buf: &'b mut [u8], write_buf: &'b mut [u8], now: Instant) -> Self {
        Self {
            read_buf,
            write_buf,
            write_len: 0,
            write_handed: false,
            state: ParseState::TypeAndFlags,
            header_byte: 0,
            length_value: 0,
            length_multiplier: 1,
            body_len: 0,
            body_filled: 0,
            discard_left: 0,
            keep_alive: Duration::ZERO,
            last_write: now,
            now,
            packet_ids: PacketIdAllocator::new(),
            pending_pubrec: PendingPubrec::new(),
        }
    }

    /// Advance the session: drain queued outbound bytes, then parse `input`.
    ///
    /// Pending outbound bytes are always returned first, with `consumed`
    /// set to 0; the host drains them by calling `feed` with an empty
    /// input until it gets [`Event::None`]. Each round parses at most one
    /// packet, so the host keeps calling with the unconsumed rest.
    ///
    /// `now` must come from a monotonic clock; it drives the keep alive
    /// timer.
    pub fn feed(&mut self, input: &[u8], now: Instant) -> Feed<'_> {
        self.now = now;
        self.reclaim_write_buf();
        self.check_keep_alive();

        if self.write_len > 0 {
            self.write_handed = true;
            return Feed {
                consumed: 0,
                event: Event::Outgoing(&self.write_buf[..self.write_len]),
            };
        }

        let mut consumed = 0;
        while consumed < input.len() {
            match self.state {
                ParseState::TypeAndFlags => {
                    self.header_byte = input[consumed];
                    consumed += 1;
                    self.length_value = 0;
                    self.length_multiplier = 1;
                    self.state = ParseState::RemainingLength;
                }
                ParseState::RemainingLength => {
                    let byte = input[consumed];
                    consumed += 1;
                    self.length_value += usize::from(byte & 0x7f) * self.length_multiplier;

                    if byte & 0x80 != 0 {
                        if self.length_multiplier == 128 * 128 * 128 {
                            self.state = ParseState::TypeAndFlags;
                            return Feed {
                                consumed,
                                event: Event::Error(ErrorKind::InvalidLength),
                            };
                        }
                        self.length_multiplier *= 128;
                        continue;
                    }

                    self.body_len = self.length_value;
                    self.body_filled = 0;
                    if self.body_len > self.read_buf.len() {
                        log::warn!(
                            "session: packet body of {} bytes exceeds read buffer, discarding",
                            self.body_len
                        );
                        self.discard_left = self.body_len;
                        self.state = ParseState::Discard;
                        return Feed {
                            consumed,
                            event: Event::Error(ErrorKind::OutOfMemory),
                        };
                    }
                    self.state = ParseState::Accumulate;
                    if self.body_len == 0 {
                        let event = self.complete_packet();
                        return Feed { consumed, event };
                    }
                }
                ParseState::Accumulate => {
                    let want = self.body_len - self.body_filled;
                    let take = want.min(input.len() - consumed);
                    self.read_buf[self.body_filled..self.body_filled + take]
                        .copy_from_slice(&input[consumed..consumed + take]);
                    self.body_filled += take;
                    consumed += take;

                    if self.body_filled == self.body_len {
                        let event = self.complete_packet();
                        return Feed { consumed, event };
                    }
                }
                ParseState::Discard => {
                    let take = self.discard_left.min(input.len() - consumed);
                    consumed += take;
                    self.discard_left -= take;
                    if self.discard_left == 0 {
                        self.state = ParseState::TypeAndFlags;
                    }
                }
            }
        }

        Feed {
            consumed,
            event: Event::None,
        }
    }

    /// Enqueue a connect request and record its keep alive interval.
    ///
    /// # Errors
    ///
    /// Returns error if the packet does not fit into the write buffer.
    pub fn connect(&mut self, options: &ConnectOptions) -> Result<(), EncodeError> {
        let mut packet = ConnectPacket::new(options.client_id());
        packet
            .set_clean_session(options.clean_session())
            .set_keep_alive(options.keep_alive());
        if let Some(will) = options.will() {
            packet.set_will(will);
        }
        if let Some(username) = options.username() {
            packet.set_username(username);
        }
        if let Some(password) = options.password() {
            packet.set_password(password);
        }

        self.enqueue(&packet)?;
        self.keep_alive = Duration::from_secs(u64::from(options.keep_alive()));
        Ok(())
    }

    /// Enqueue a publish message.
    ///
    /// At `QoS` 0 no packet id is used and `None` is returned. At `QoS` 1
    /// and 2 a fresh packet id is allocated and returned, for the host to
    /// correlate with the broker's acknowledgement. Tracking unacknowledged
    /// publishes for retransmission is the host's business.
    ///
    /// # Errors
    ///
    /// Returns error if the packet does not fit into the write buffer.
    pub fn publish(
        &mut self,
        topic: &[u8],
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<Option<PacketId>, EncodeError> {
        let mut packet = PublishPacket::new(topic, qos, payload);
        packet.set_retain(retain);

        let packet_id = if qos == QoS::AtMostOnce {
            None
        } else {
            let packet_id = self.packet_ids.next();
            packet.set_packet_id(packet_id);
            Some(packet_id)
        };

        self.enqueue(&packet)?;
        Ok(packet_id)
    }

    /// Enqueue a subscribe request for one or more topic filters.
    ///
    /// Returns the packet id, for the host to correlate with the
    /// `SubscribeAckPacket`.
    ///
    /// # Errors
    ///
    /// Returns error if `topics` is empty or the packet does not fit into
    /// the write buffer.
    pub fn subscribe(&mut self, topics: &[SubscribeTopic]) -> Result<PacketId, EncodeError> {
        let packet_id = self.packet_ids.next();
        let packet = SubscribePacket::new(packet_id, topics)?;
        self.enqueue(&packet)?;
        Ok(packet_id)
    }

    /// Enqueue an unsubscribe request for one or more topic filters.
    ///
    /// Returns the packet id, for the host to correlate with the
    /// `UnsubscribeAckPacket`.
    ///
    /// # Errors
    ///
    /// Returns error if `topic_filters` is empty or the packet does not
    /// fit into the write buffer.
    pub fn unsubscribe(&mut self, topic_filters: &[&[u8]]) -> Result<PacketId, EncodeError> {
        let packet_id = self.packet_ids.next();
        let packet = UnsubscribePacket::new(packet_id, topic_filters)?;
        self.enqueue(&packet)?;
        Ok(packet_id)
    }

    /// Enqueue a ping request.
    ///
    /// The keep alive timer sends these automatically; an explicit ping is
    /// useful to probe the broker early.
    ///
    /// # Errors
    ///
    /// Returns error if the packet does not fit into the write buffer.
    pub fn ping(&mut self) -> Result<(), EncodeError> {
        self.enqueue(&PingRequestPacket::new())
    }

    /// Enqueue a disconnect request and stop the keep alive timer.
    ///
    /// # Errors
    ///
    /// Returns error if the packet does not fit into the write buffer.
    pub fn disconnect(&mut self) -> Result<(), EncodeError> {
        self.enqueue(&DisconnectPacket::new())?;
        self.keep_alive = Duration::ZERO;
        Ok(())
    }

    /// Get number of `QoS` 2 publishes delivered but not yet released.
    #[must_use]
    pub fn pending_pubrec(&self) -> usize {
        self.pending_pubrec.len()
    }

    /// Serialize `packet` into the write buffer.
    fn enqueue<P: EncodePacket>(&mut self, packet: &P) -> Result<(), EncodeError> {
        self.reclaim_write_buf();
        let Self {
            write_buf,
            write_len,
            last_write,
            now,
            ..
        } = self;
        append_packet(write_buf, write_len, last_write, *now, packet)
    }

    /// Reset the write buffer if its content was handed to the host on the
    /// previous `feed` round.
    fn reclaim_write_buf(&mut self) {
        if self.write_handed {
            self.write_len = 0;
            self.write_handed = false;
        }
    }

    /// Enqueue a ping request when the keep alive interval elapsed without
    /// outbound traffic.
    fn check_keep_alive(&mut self) {
        if self.keep_alive.is_zero() {
            return;
        }
        if self.now.duration_since(self.last_write) <= self.keep_alive {
            return;
        }

        let Self {
            write_buf,
            write_len,
            last_write,
            now,
            ..
        } = self;
        if append_packet(write_buf, write_len, last_write, *now, &PingRequestPacket::new())
            .is_err()
        {
            log::warn!("session: write buffer full, ping request dropped");
        }
    }

    /// A full packet body sits in the read buffer; decode it, run the
    /// receiver-side `QoS` protocol, and decide what the host sees.
    fn complete_packet(&mut self) -> Event<'_> {
        self.state = ParseState::TypeAndFlags;
        let header_byte = self.header_byte;
        let body_len = self.body_len;

        let packet_type = match PacketType::try_from(header_byte) {
            Ok(packet_type) => packet_type,
            Err(err) => return Event::Error(err.into()),
        };

        let Self {
            read_buf,
            write_buf,
            write_len,
            last_write,
            now,
            pending_pubrec,
            ..
        } = self;

        let mut body = ByteArray::new(&read_buf[..body_len]);
        let packet = match Packet::decode_body(packet_type, &mut body) {
            Ok(packet) => packet,
            Err(err) => {
                log::error!("session: dropping malformed {packet_type:?} packet: {err:?}");
                return Event::Error(err.into());
            }
        };

        match &packet {
            // A PUBLISH is acknowledged before the host even sees it; the
            // ack failure cases lean on broker retransmission.
            Packet::Publish(publish) => match (publish.qos(), publish.packet_id()) {
                (QoS::AtLeastOnce, Some(packet_id)) => {
                    let ack = PublishAckPacket::new(packet_id);
                    if append_packet(write_buf, write_len, last_write, *now, &ack).is_err() {
                        log::warn!("session: write buffer full, publish ack dropped");
                    }
                }
                (QoS::ExactOnce, Some(packet_id)) => {
                    if pending_pubrec.contains(packet_id) {
                        // Duplicate delivery; re-acknowledge but keep it
                        // from the application.
                        let received = PublishReceivedPacket::new(packet_id);
                        let _ =
                            append_packet(write_buf, write_len, last_write, *now, &received);
                        return Event::None;
                    }
                    if pending_pubrec.insert(packet_id).is_err() {
                        log::warn!(
                            "session: pending set full, publish {} suppressed",
                            packet_id.value()
                        );
                        return Event::None;
                    }
                    let received = PublishReceivedPacket::new(packet_id);
                    if append_packet(write_buf, write_len, last_write, *now, &received).is_err() {
                        log::warn!("session: write buffer full, publish received dropped");
                    }
                }
                _ => {}
            },
            Packet::PublishRelease(release) => {
                let complete = PublishCompletePacket::new(release.packet_id());
                let _ = append_packet(write_buf, write_len, last_write, *now, &complete);
                pending_pubrec.remove(release.packet_id());
            }
            // Kinds a server never sends; the connection is broken or the
            // peer is not a broker.
            Packet::Connect(_)
            | Packet::Subscribe(_)
            | Packet::Unsubscribe(_)
            | Packet::PingRequest(_)
            | Packet::Disconnect(_) => {
                return Event::Error(ErrorKind::UnhandledPacket);
            }
            _ => {}
        }

        Event::Incoming(packet)
    }
}

/// Serialize `packet` at the end of the write buffer and stamp the write
/// time.
fn append_packet<P: EncodePacket>(
    write_buf: &mut [u8],
    write_len: &mut usize,
    last_write: &mut Instant,
    now: Instant,
    packet: &P,
) -> Result<(), EncodeError> {
    let mut writer = ByteWriter::new(&mut write_buf[*write_len..]);
    packet.encode(&mut writer)?;
    *write_len += writer.len();
    *last_write = now;
    Ok(())
}
