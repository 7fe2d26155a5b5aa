//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use std::net::UdpSocket;
use std::time::Duration;

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_secs(2)
}

/// A UDP socket standing in for the analyzer, with its `host:port`
pub fn analyzer_receiver() -> (UdpSocket, String) {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.set_read_timeout(Some(test_timeout())).unwrap();
    let addr = socket.local_addr().unwrap().to_string();
    (socket, addr)
}
