//! End-to-end link behaviour against a local TCP listener.

use std::io::{ErrorKind, Read};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use shift_link::{LinkClient, LinkConfig, LinkState, PacketFormat, ShiftBitmap, FRAME_LEN};

fn fast_config(port: u16) -> LinkConfig {
    LinkConfig {
        port,
        connect_timeout_ms: 500,
        write_timeout_ms: 500,
        poll_interval_ms: 10,
        initial_retry_ms: 50,
        steady_retry_ms: 200,
        fast_attempts: 3,
        stop_timeout_ms: 2_000,
        ..LinkConfig::default()
    }
}

fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn accept_within(listener: &TcpListener, timeout: Duration) -> TcpStream {
    let deadline = Instant::now() + timeout;
    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false).unwrap();
                return stream;
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock && Instant::now() < deadline => {
                thread::sleep(Duration::from_millis(5));
            }
            Err(e) => panic!("no connection within {timeout:?}: {e}"),
        }
    }
}

fn read_frame(stream: &mut TcpStream) -> [u8; FRAME_LEN] {
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let mut frame = [0u8; FRAME_LEN];
    stream.read_exact(&mut frame).unwrap();
    frame
}

fn assert_silent(stream: &mut TcpStream, window: Duration) {
    stream.set_read_timeout(Some(window)).unwrap();
    let mut buf = [0u8; 1];
    match stream.read(&mut buf) {
        Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
        other => panic!("expected no further bytes, got {other:?}"),
    }
}

fn wait_for(client: &LinkClient, state: LinkState, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while client.status().state != state {
        assert!(Instant::now() < deadline, "link never reached {state}: {:?}", client.status());
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn reconnects_and_resends_last_bitmap_once() {
    let (listener, port) = listener();
    // Wide enough retry gap to observe the disconnected state.
    let mut client = LinkClient::new(LinkConfig {
        initial_retry_ms: 300,
        ..fast_config(port)
    });
    client.start().unwrap();

    let mut first = accept_within(&listener, Duration::from_secs(2));
    wait_for(&client, LinkState::Connected, Duration::from_secs(2));

    let bitmap = ShiftBitmap::new(0b0000_0001, 0b1000_0000);
    client.send(bitmap).unwrap();
    assert_eq!(read_frame(&mut first), PacketFormat::Standard.encode(bitmap));

    // Peer goes away; the probe notices without a send.
    drop(first);
    wait_for(&client, LinkState::Disconnected, Duration::from_secs(2));
    assert_eq!(client.status().consecutive_failures, 1);

    let mut second = accept_within(&listener, Duration::from_secs(2));
    assert_eq!(read_frame(&mut second), [0xA5, 0x0D, 0x01, 0x80, 0, 0, 0, 0]);
    assert_silent(&mut second, Duration::from_millis(300));

    let status = client.status();
    assert_eq!(status.state, LinkState::Connected);
    assert_eq!(status.consecutive_failures, 0);
    assert!(status.connected_since.is_some());

    // Normal sends keep flowing on the new socket.
    let next = ShiftBitmap::new(0b0000_0011, 0b1000_0000);
    client.send(next).unwrap();
    assert_eq!(read_frame(&mut second), PacketFormat::Standard.encode(next));

    client.disconnect();
    assert_eq!(client.status().state, LinkState::Disconnected);
}

#[test]
fn bitmap_set_while_offline_is_delivered_on_connect() {
    let (listener, port) = listener();
    let client = LinkClient::new(fast_config(port));

    let bitmap = ShiftBitmap::new(0, 0b0000_0100);
    assert!(client.send(bitmap).is_err());

    client.connect().unwrap();
    let mut peer = accept_within(&listener, Duration::from_secs(2));
    assert_eq!(read_frame(&mut peer), PacketFormat::Standard.encode(bitmap));
    assert_silent(&mut peer, Duration::from_millis(200));
}

#[test]
fn disconnect_stops_worker_and_closes_socket() {
    let (listener, port) = listener();
    let mut client = LinkClient::new(fast_config(port));
    client.start().unwrap();
    let mut peer = accept_within(&listener, Duration::from_secs(2));
    wait_for(&client, LinkState::Connected, Duration::from_secs(2));

    let started = Instant::now();
    client.disconnect();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!client.is_running());

    peer.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let mut buf = [0u8; 1];
    assert_eq!(peer.read(&mut buf).unwrap(), 0);
    assert!(client.send(ShiftBitmap::default()).is_err());
}

#[test]
fn worker_keeps_retrying_until_peer_appears() {
    // Reserve a port, then free it so the first attempts are refused.
    let port = {
        let probe = TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap().port()
    };
    let mut client = LinkClient::new(fast_config(port));
    client.start().unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    while client.status().consecutive_failures < 2 {
        assert!(Instant::now() < deadline, "no failed attempts recorded");
        thread::sleep(Duration::from_millis(5));
    }

    let listener = TcpListener::bind(("127.0.0.1", port)).unwrap();
    listener.set_nonblocking(true).unwrap();
    let _peer = accept_within(&listener, Duration::from_secs(3));
    wait_for(&client, LinkState::Connected, Duration::from_secs(2));
    assert_eq!(client.status().consecutive_failures, 0);
    client.disconnect();
}
