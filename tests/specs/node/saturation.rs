// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario: a saturated pool queues requests, grows once, and the
//! purge drains the queue as soon as capacity appears.

use crate::prelude::*;

use rmpv::Value;
use drover_core::codes;
use drover_core::graph::streaming;
use drover_node::{app, worker};

#[tokio::test]
async fn queued_requests_drain_when_the_second_slave_arrives() {
    let h = app_harness(scenario_profile());
    let mut client = connect_client(&h);

    // Saturate the first slave (concurrency = 2).
    client
        .send(Frame::new(1, app::ENQUEUE, vec![Value::from("compute")]))
        .await
        .unwrap();
    wait_until("first spawn", || h.overseer.pool_size() == 1).await;
    let first = only_spawned_uuid(&h);
    let mut worker1 = connect_worker(&h, &first).await;
    recv(&mut worker1).await;
    client
        .send(Frame::new(2, app::ENQUEUE, vec![Value::from("compute")]))
        .await
        .unwrap();
    recv(&mut worker1).await;
    wait_until("first slave saturated", || {
        h.overseer.slave_load(&first) == Some(2)
    })
    .await;

    // Two more requests: both queue; growth spawns exactly one slave.
    client
        .send(Frame::new(3, app::ENQUEUE, vec![Value::from("compute")]))
        .await
        .unwrap();
    wait_until("third queued", || h.overseer.queue_len() == 1).await;
    assert_eq!(h.spawner.spawn_count(), 2);
    client
        .send(Frame::new(4, app::ENQUEUE, vec![Value::from("compute")]))
        .await
        .unwrap();
    wait_until("fourth queued", || h.overseer.queue_len() == 2).await;
    assert_eq!(h.spawner.spawn_count(), 2);

    // The second slave handshakes; the purge assigns both requests
    // before anything else happens.
    let second = h
        .spawner
        .spawned()
        .into_iter()
        .map(|config| config.uuid)
        .find(|uuid| *uuid != first)
        .unwrap();
    let mut worker2 = connect_worker(&h, &second).await;
    assert_eq!(recv(&mut worker2).await.message_id, worker::INVOKE);
    assert_eq!(recv(&mut worker2).await.message_id, worker::INVOKE);

    assert_eq!(h.overseer.pool_size(), 2);
    assert_eq!(h.overseer.queue_len(), 0);
    assert_eq!(h.overseer.slave_load(&second), Some(2));
}

#[tokio::test]
async fn the_queue_bound_is_enforced_without_mutation() {
    let mut profile = scenario_profile();
    profile.queue_limit = 2;
    let h = app_harness(profile);
    let mut client = connect_client(&h);

    client
        .send(Frame::new(1, app::ENQUEUE, vec![Value::from("compute")]))
        .await
        .unwrap();
    wait_until("first queued", || h.overseer.queue_len() == 1).await;
    client
        .send(Frame::new(2, app::ENQUEUE, vec![Value::from("compute")]))
        .await
        .unwrap();
    wait_until("second queued", || h.overseer.queue_len() == 2).await;

    // Over the bound: the enqueue fails and the queue is untouched.
    client
        .send(Frame::new(3, app::ENQUEUE, vec![Value::from("compute")]))
        .await
        .unwrap();
    let reply = recv(&mut client).await;
    assert_eq!(reply.channel, 3);
    assert_eq!(reply.message_id, streaming::ERROR);
    assert_eq!(reply.args[0], Value::from(codes::QUEUE_IS_FULL));
    assert_eq!(h.overseer.queue_len(), 2);
}
