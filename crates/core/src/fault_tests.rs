// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn display_includes_code_and_reason() {
    let fault = Fault::new(codes::QUEUE_IS_FULL, "queue is full");
    assert_eq!(fault.to_string(), "[200] queue is full");
}

#[test]
fn slave_gone_is_resource_error() {
    let fault = Fault::slave_gone();
    assert_eq!(fault.code, codes::RESOURCE_ERROR);
    assert_eq!(fault.reason, "slave gone");
}

#[test]
fn service_not_available_names_the_service() {
    let fault = Fault::service_not_available("ping");
    assert_eq!(fault.code, codes::SERVICE_NOT_AVAILABLE);
    assert!(fault.reason.contains("ping"));
}

#[test]
fn codes_are_distinct_across_groups() {
    let all = [
        codes::PARSE_ERROR,
        codes::FRAME_FORMAT_ERROR,
        codes::UNKNOWN_CHANNEL,
        codes::UNKNOWN_MESSAGE_ID,
        codes::FRAME_TOO_LARGE,
        codes::SLOT_NOT_FOUND,
        codes::UNCAUGHT_ERROR,
        codes::INVOCATION_ERROR,
        codes::QUEUE_IS_CLOSED,
        codes::QUEUE_IS_FULL,
        codes::POOL_IS_FULL,
        codes::INVALID_APP_STATE,
        codes::SPAWN_TIMEOUT,
        codes::ACTIVATE_TIMEOUT,
        codes::HEARTBEAT_TIMEOUT,
        codes::TERMINATE_TIMEOUT,
        codes::INVALID_STATE,
        codes::CONTROL_IPC_ERROR,
        codes::OVERSEER_SHUTDOWNING,
        codes::COMMITTED_SUICIDE,
        codes::SLAVE_IDLE,
        codes::SERVICE_NOT_AVAILABLE,
        codes::LOCATOR_NOT_FOUND,
        codes::DEADLINE_ERROR,
        codes::RESOURCE_ERROR,
        codes::TIMEOUT_ERROR,
    ];
    let unique: std::collections::HashSet<_> = all.iter().collect();
    assert_eq!(unique.len(), all.len());
}
