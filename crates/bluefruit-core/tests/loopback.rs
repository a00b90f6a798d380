//! End-to-end tests driving the full stack, packet engine through stream
//! adapter, against the simulated peripheral

use std::time::Duration;

use pretty_assertions::assert_eq;

use bluefruit_core::demo::DemoPeripheral;
use bluefruit_core::device::Bluefruit;
use bluefruit_core::protocol::{Link, LinkConfig, ProtocolError, Session};
use bluefruit_core::uart::UartStream;

fn session(demo: DemoPeripheral) -> Session<DemoPeripheral> {
    init_tracing();
    Session::new(Link::with_config(demo, LinkConfig::immediate()))
        .with_settle_delay(Duration::ZERO)
}

/// Route protocol traces to the test harness; filter with `RUST_LOG`
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn device(demo: DemoPeripheral) -> Bluefruit<DemoPeripheral> {
    Bluefruit::new(session(demo)).with_reset_settle(Duration::ZERO)
}

#[test]
fn initialize_reaches_peripheral() {
    let mut session = session(DemoPeripheral::with_seed(7));
    session.initialize().unwrap();
    assert!(session.link().bus().is_initialized());
}

#[test]
fn at_exchange_round_trip() {
    let mut session = session(DemoPeripheral::with_seed(7));
    let reply = session.at_command("AT+GAPGETCONN").unwrap();
    assert!(reply.success);
    assert_eq!(reply.payload.trim(), "1");
}

#[test]
fn long_command_and_long_reply_survive_fragmentation() {
    // both directions cross several 16-byte packets
    let mut device = device(DemoPeripheral::with_seed(7));
    let name = "sensor-node-with-a-deliberately-long-name";
    device.set_device_name(name).unwrap();
    assert_eq!(device.device_name().unwrap(), name);
}

#[test]
fn busy_peripheral_is_retried_transparently() {
    let mut demo = DemoPeripheral::with_seed(7);
    demo.set_busy(25);
    let mut session = session(demo);
    let reply = session.at_command("AT+GAPGETCONN").unwrap();
    assert!(reply.success);
}

#[test]
fn busy_jitter_does_not_break_exchanges() {
    let mut demo = DemoPeripheral::with_seed(42);
    demo.set_busy_chance(0.3);
    let mut device = device(demo);
    for _ in 0..10 {
        assert!(device.is_connected().unwrap());
    }
}

#[test]
fn gap_queries() {
    let mut device = device(DemoPeripheral::with_seed(7));
    assert_eq!(device.address().unwrap(), "C3:2A:45:02:9B:A0");
    assert_eq!(device.rssi().unwrap(), -60);
    assert_eq!(device.set_tx_power(-30).unwrap(), -20);
    assert_eq!(device.tx_power().unwrap(), -20);
    device
        .set_advertising_data(&[0x02, 0x01, 0x06, 0x05, 0x02, 0x0d, 0x18, 0x0a, 0x18])
        .unwrap();
}

#[test]
fn uart_write_escapes_and_client_sees_raw_bytes() {
    let mut uart = UartStream::new(session(DemoPeripheral::with_seed(7)))
        .with_poll_delay(Duration::ZERO);
    uart.write(b"line one\nline\ttwo\\end").unwrap();
    assert_eq!(
        uart.session_mut().link_mut().bus_mut().client_received(),
        b"line one\nline\ttwo\\end"
    );
}

#[test]
fn uart_write_spans_multiple_chunks() {
    let mut uart = UartStream::new(session(DemoPeripheral::with_seed(7)))
        .with_poll_delay(Duration::ZERO);
    let payload: Vec<u8> = (0..100).map(|i| b'a' + (i % 26) as u8).collect();
    uart.write(&payload).unwrap();
    assert_eq!(
        uart.session_mut().link_mut().bus_mut().client_received(),
        payload.as_slice()
    );
}

#[test]
fn uart_read_blocks_until_requested_bytes_arrive() {
    let mut demo = DemoPeripheral::with_seed(7);
    demo.push_client_data(b"hello world");
    let mut uart = UartStream::new(session(demo)).with_poll_delay(Duration::ZERO);

    let mut buf = [0u8; 5];
    uart.read(&mut buf).unwrap();
    assert_eq!(&buf, b"hello");

    // remainder stays buffered for the next read
    let mut rest = [0u8; 6];
    uart.read(&mut rest).unwrap();
    assert_eq!(&rest, b" world");
}

#[test]
fn uart_read_drains_large_payload_across_polls() {
    let mut demo = DemoPeripheral::with_seed(7);
    let payload: Vec<u8> = (0..200).map(|i| (i % 251) as u8).collect();
    demo.push_client_data(&payload);
    let mut uart = UartStream::new(session(demo)).with_poll_delay(Duration::ZERO);

    let mut buf = vec![0u8; payload.len()];
    uart.read(&mut buf).unwrap();
    assert_eq!(buf, payload);
}

#[test]
fn uart_read_preserves_non_utf8_bytes() {
    let mut demo = DemoPeripheral::with_seed(7);
    demo.push_client_data(&[0x41, 0xFF, 0x42]);
    let mut uart = UartStream::new(session(demo)).with_poll_delay(Duration::ZERO);

    let mut buf = [0u8; 3];
    uart.read(&mut buf).unwrap();
    assert_eq!(buf, [0x41, 0xFF, 0x42]);
}

#[test]
fn uart_read_buffers_poll_remainder_without_loss() {
    // one poll hands out up to 64 bytes; a short read leaves the surplus
    // buffered, and a fifo sized to a single poll holds all of it
    let mut demo = DemoPeripheral::with_seed(7);
    let payload: Vec<u8> = (0..100u32).map(|i| (i % 256) as u8).collect();
    demo.push_client_data(&payload);
    let mut uart =
        UartStream::with_capacity(session(demo), 64).with_poll_delay(Duration::ZERO);

    let mut first = [0u8; 10];
    uart.read(&mut first).unwrap();
    assert_eq!(first[..], payload[..10]);
    assert_eq!(uart.buffered(), 54);

    let mut rest = [0u8; 90];
    uart.read(&mut rest).unwrap();
    assert_eq!(rest[..], payload[10..]);
}

#[test]
fn disconnected_peripheral_fails_uart_with_not_connected() {
    let mut demo = DemoPeripheral::with_seed(7);
    demo.set_connected(false);
    let mut uart = UartStream::new(session(demo)).with_poll_delay(Duration::ZERO);

    let err = uart.write(b"anything").unwrap_err();
    assert!(matches!(err, ProtocolError::NotConnected));

    let mut buf = [0u8; 1];
    let err = uart.read(&mut buf).unwrap_err();
    assert!(matches!(err, ProtocolError::NotConnected));
}

#[test]
fn out_of_band_traffic_surfaces_as_transport_fault() {
    let mut demo = DemoPeripheral::with_seed(7);
    demo.queue_raw_transfer(0x20, [0xEF, 0xBE, 0x04], &[0, 0, 0, 0]);
    let mut session = session(demo);

    let err = session.read_reply().unwrap_err();
    assert!(matches!(err, ProtocolError::UnexpectedCommand(0xBEEF)));
}

#[test]
fn silent_peripheral_times_out_instead_of_hanging() {
    // nothing queued: the readiness line never asserts
    let mut session = session(DemoPeripheral::with_seed(7));
    let err = session.read_reply().unwrap_err();
    assert!(matches!(err, ProtocolError::Timeout));
}
