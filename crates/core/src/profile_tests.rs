// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn default_profile_is_valid() {
    assert!(Profile::default().validate().is_ok());
}

#[yare::parameterized(
    heartbeat = { "heartbeat" },
    idle = { "idle" },
    startup = { "startup" },
    termination = { "termination" },
)]
fn zero_timeout_rejected(which: &str) {
    let mut p = Profile::default();
    match which {
        "heartbeat" => p.heartbeat_timeout_ms = 0,
        "idle" => p.idle_timeout_ms = 0,
        "startup" => p.startup_timeout_ms = 0,
        _ => p.termination_timeout_ms = 0,
    }
    assert!(matches!(p.validate(), Err(ProfileError::ZeroTimeout(_))));
}

#[test]
fn zero_pool_limit_rejected() {
    let mut p = Profile::default();
    p.pool_limit = 0;
    assert!(matches!(p.validate(), Err(ProfileError::ZeroPoolLimit)));
}

#[test]
fn zero_concurrency_rejected() {
    let mut p = Profile::default();
    p.concurrency = 0;
    assert!(matches!(p.validate(), Err(ProfileError::ZeroConcurrency)));
}

#[test]
fn timeout_accessors_convert_to_duration() {
    let mut p = Profile::default();
    p.heartbeat_timeout_ms = 1_500;
    assert_eq!(p.heartbeat_timeout(), Duration::from_millis(1_500));
}

#[test]
fn deserializes_with_defaults() {
    let p: Profile = toml::from_str("concurrency = 2\npool_limit = 4").unwrap();
    assert_eq!(p.concurrency, 2);
    assert_eq!(p.pool_limit, 4);
    assert_eq!(p.queue_limit, 100);
    assert_eq!(p.isolate.kind, "process");
}
