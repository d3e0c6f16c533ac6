// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Sans-I/O MQTT 3.1.1 client engine.
//!
//! The engine parses and produces bytes; sockets, TLS and the event loop
//! belong to the host. See [`Session`] for the feed/event contract.

pub mod connect_options;
mod error;
mod packet_id;
mod pending;
mod session;

pub use connect_options::ConnectOptions;
pub use error::ErrorKind;
pub use packet_id::PacketIdAllocator;
pub use pending::{PendingPubrec, PENDING_PUBREC_CAPACITY};
pub use session::{Event, Feed, Session};
