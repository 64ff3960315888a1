// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario: heartbeat loss kills the slave and settles its clients.

use crate::prelude::*;

use rmpv::Value;
use drover_core::{codes, graph::streaming};
use drover_node::app;

#[tokio::test]
async fn heartbeat_loss_surfaces_resource_error_to_the_client() {
    let h = app_harness(scenario_profile());
    let mut client = connect_client(&h);

    client
        .send(Frame::new(1, app::ENQUEUE, vec![Value::from("compute")]))
        .await
        .unwrap();
    wait_until("request queued", || h.overseer.queue_len() == 1).await;
    let uuid = only_spawned_uuid(&h);
    let mut worker_peer = connect_worker(&h, &uuid).await;
    recv(&mut worker_peer).await; // invoke
    assert_eq!(h.overseer.slave_load(&uuid), Some(1));

    // Silence past the heartbeat budget.
    h.clock.advance(Duration::from_millis(1_500));
    h.overseer.step();

    // The slave entry is gone and the balancer-visible pool is empty.
    assert_eq!(h.overseer.pool_size(), 0);

    // The pending client channel learns its slave died.
    let error = recv(&mut client).await;
    assert_eq!(error.message_id, streaming::ERROR);
    assert_eq!(error.args[0], Value::from(codes::RESOURCE_ERROR));
    assert_eq!(error.args[1], Value::from("slave gone"));
    assert_eq!(recv(&mut client).await.message_id, streaming::CHOKE);

    let crashlog = h.overseer.crashlog();
    assert_eq!(crashlog[0].fault.code, codes::HEARTBEAT_TIMEOUT);
}

#[tokio::test]
async fn heartbeats_reset_the_timer() {
    let h = app_harness(scenario_profile());
    let mut client = connect_client(&h);
    client
        .send(Frame::new(1, app::ENQUEUE, vec![Value::from("compute")]))
        .await
        .unwrap();
    wait_until("request queued", || h.overseer.queue_len() == 1).await;
    let uuid = only_spawned_uuid(&h);
    let mut worker_peer = connect_worker(&h, &uuid).await;
    recv(&mut worker_peer).await;

    // Five periods of 0.6s each, under the 1s budget thanks to resets.
    for _ in 0..5 {
        h.clock.advance(Duration::from_millis(600));
        worker_peer
            .send(Frame::new(0, control::HEARTBEAT, vec![]))
            .await
            .unwrap();
        assert_eq!(recv(&mut worker_peer).await.message_id, control::HEARTBEAT);
        h.overseer.step();
        assert_eq!(h.overseer.pool_size(), 1);
    }
}
