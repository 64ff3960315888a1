// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    v4 = { "1.1.1.1", 10053, "1.1.1.1:10053" },
    v4_zero = { "0.0.0.0", 0, "0.0.0.0:0" },
    v6 = { "::1", 10054, "[::1]:10054" },
)]
fn display(addr: &str, port: u16, expected: &str) {
    let ep = Endpoint::new(addr.parse().unwrap(), port);
    assert_eq!(ep.to_string(), expected);
}

#[test]
fn from_socket_addr_roundtrip() {
    let sa: SocketAddr = "127.0.0.1:4040".parse().unwrap();
    let ep = Endpoint::from(sa);
    assert_eq!(ep.to_socket_addr(), sa);
}

#[test]
fn family_detection() {
    let v4 = Endpoint::new("10.0.0.1".parse().unwrap(), 1);
    let v6 = Endpoint::new("fe80::1".parse().unwrap(), 1);
    assert!(!v4.is_v6());
    assert!(v6.is_v6());
}

#[test]
fn serde_roundtrip() {
    let ep = Endpoint::new("192.168.1.10".parse().unwrap(), 10053);
    let json = serde_json::to_string(&ep).unwrap();
    let back: Endpoint = serde_json::from_str(&json).unwrap();
    assert_eq!(back, ep);
}
