// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Blocking TCP host loop wiring the session engine to a local broker.

use std::io::{ErrorKind as IoErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use codec::v3::{Packet, SubscribeTopic};
use codec::QoS;
use tern::{ConnectOptions, Event, Session};

fn main() {
    std::env::set_var("RUST_LOG", "info");
    env_logger::init();

    let mut read_buf = [0u8; 4096];
    let mut write_buf = [0u8; 4096];
    let mut session = Session::new(&mut read_buf, &mut write_buf, Instant::now());

    let client_id = codec::utils::random_string(8);
    let mut options = ConnectOptions::new(client_id.as_bytes());
    options.set_clean_session(true).set_keep_alive(30);
    session.connect(&options).unwrap();
    log::info!("Connecting, client id: {client_id}");

    let mut stream = TcpStream::connect("127.0.0.1:1883").unwrap();
    // Wake up regularly so the keep alive timer gets a chance to run.
    stream
        .set_read_timeout(Some(Duration::from_millis(500)))
        .unwrap();

    let mut net_buf = [0u8; 1024];
    loop {
        let n = match stream.read(&mut net_buf) {
            Ok(0) => {
                log::info!("Connection closed by broker");
                return;
            }
            Ok(n) => n,
            Err(err)
                if err.kind() == IoErrorKind::WouldBlock
                    || err.kind() == IoErrorKind::TimedOut =>
            {
                0
            }
            Err(err) => {
                log::error!("Read error: {err}");
                return;
            }
        };

        let mut input = &net_buf[..n];
        loop {
            // Events borrow the session, so enqueue calls have to wait
            // until the event has been handled.
            let mut connected = false;

            let feed = session.feed(input, Instant::now());
            input = &input[feed.consumed..];
            match feed.event {
                Event::None => break,
                Event::Outgoing(buf) => stream.write_all(buf).unwrap(),
                Event::Incoming(Packet::ConnectAck(ack)) => {
                    log::info!("Connected: {ack:?}");
                    connected = true;
                }
                Event::Incoming(Packet::Publish(publish)) => {
                    log::info!(
                        "Message on {}: {}",
                        String::from_utf8_lossy(publish.topic()),
                        String::from_utf8_lossy(publish.payload())
                    );
                }
                Event::Incoming(packet) => log::info!("Incoming: {packet:?}"),
                Event::Error(err) => log::error!("Session error: {err:?}"),
            }

            if connected {
                let topics = [SubscribeTopic::new(b"hello", QoS::AtMostOnce)];
                session.subscribe(&topics).unwrap();
                session
                    .publish(b"hello", b"Hello, world", QoS::AtMostOnce, false)
                    .unwrap();
            }
        }
    }
}
