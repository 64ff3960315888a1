// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario: streamed enqueue against an empty pool spawns a slave,
//! bridges both stream directions, and returns the slave to idle.

use crate::prelude::*;

use rmpv::Value;
use drover_core::graph::streaming;
use drover_node::{app, worker, SlaveState};

#[tokio::test]
async fn enqueue_spawns_bridges_and_goes_idle() {
    let mut profile = scenario_profile();
    // The idle expiry is what this scenario watches; keep the heartbeat
    // timer out of its way.
    profile.heartbeat_timeout_ms = 600_000;
    let h = app_harness(profile);
    let mut client = connect_client(&h);

    // Pool is empty: the enqueue spawns one slave and waits.
    client
        .send(Frame::new(1, app::ENQUEUE, vec![Value::from("compute")]))
        .await
        .unwrap();
    wait_until("request queued", || h.overseer.queue_len() == 1).await;
    assert_eq!(h.spawner.spawn_count(), 1);

    // The worker comes up; the pending request rides the fresh channel.
    let uuid = only_spawned_uuid(&h);
    let mut worker_peer = connect_worker(&h, &uuid).await;
    let invoke = recv(&mut worker_peer).await;
    assert_eq!(invoke.message_id, worker::INVOKE);
    assert_eq!(invoke.args, vec![Value::from("compute")]);
    assert_eq!(h.overseer.slave_state(&uuid), Some(SlaveState::Active));
    assert_eq!(h.overseer.slave_load(&uuid), Some(1));

    // Client → worker direction.
    client
        .send(Frame::new(1, streaming::CHUNK, vec![Value::from("x")]))
        .await
        .unwrap();
    client
        .send(Frame::new(1, streaming::CHOKE, vec![]))
        .await
        .unwrap();
    let chunk = recv(&mut worker_peer).await;
    assert_eq!(chunk.message_id, streaming::CHUNK);
    assert_eq!(chunk.args, vec![Value::from("x")]);
    assert_eq!(recv(&mut worker_peer).await.message_id, streaming::CHOKE);

    // Worker → client direction.
    worker_peer
        .send(Frame::new(
            invoke.channel,
            streaming::CHUNK,
            vec![Value::from("X")],
        ))
        .await
        .unwrap();
    worker_peer
        .send(Frame::new(invoke.channel, streaming::CHOKE, vec![]))
        .await
        .unwrap();
    let chunk = recv(&mut client).await;
    assert_eq!(chunk.message_id, streaming::CHUNK);
    assert_eq!(chunk.args, vec![Value::from("X")]);
    assert_eq!(recv(&mut client).await.message_id, streaming::CHOKE);

    // Both directions closed: load is back to zero within a turn.
    wait_until("load accounted down", || {
        h.overseer.slave_load(&uuid) == Some(0)
    })
    .await;

    // The idle timer was armed: idle expiry despawns the slave.
    h.clock.advance(Duration::from_millis(61_000));
    h.overseer.step();
    assert_eq!(
        h.overseer.slave_state(&uuid),
        Some(SlaveState::Terminating)
    );
}

#[tokio::test]
async fn chunks_sent_before_assignment_are_buffered() {
    let h = app_harness(scenario_profile());
    let mut client = connect_client(&h);

    // The client streams before any worker exists.
    client
        .send(Frame::new(1, app::ENQUEUE, vec![Value::from("compute")]))
        .await
        .unwrap();
    client
        .send(Frame::new(1, streaming::CHUNK, vec![Value::from("early")]))
        .await
        .unwrap();
    wait_until("request queued", || h.overseer.queue_len() == 1).await;

    let uuid = only_spawned_uuid(&h);
    let mut worker_peer = connect_worker(&h, &uuid).await;

    // invoke first, then the replayed buffer, in order.
    assert_eq!(recv(&mut worker_peer).await.message_id, worker::INVOKE);
    let replayed = recv(&mut worker_peer).await;
    assert_eq!(replayed.message_id, streaming::CHUNK);
    assert_eq!(replayed.args, vec![Value::from("early")]);
}
