// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness for the behavioral specs.

use std::path::PathBuf;

pub use std::sync::Arc;
pub use std::time::Duration;

pub use futures_util::{SinkExt, StreamExt};
pub use tokio_util::codec::Framed;

pub use drover_core::{AppName, FakeClock, Manifest, Profile, SlaveId};
pub use drover_node::{FakeSpawner, LoadBalancer, Overseer};
pub use drover_rpc::{control, Dispatch, Session};
pub use drover_wire::{Frame, FrameCodec};

pub type Peer = Framed<tokio::io::DuplexStream, FrameCodec>;

/// An app under test: overseer with a fake clock and spawner.
pub struct AppHarness {
    pub overseer: Arc<Overseer<FakeClock>>,
    pub clock: FakeClock,
    pub spawner: FakeSpawner,
}

/// The profile most scenarios run with.
pub fn scenario_profile() -> Profile {
    Profile {
        heartbeat_timeout_ms: 1_000,
        idle_timeout_ms: 60_000,
        startup_timeout_ms: 5_000,
        termination_timeout_ms: 1_000,
        concurrency: 2,
        pool_limit: 4,
        queue_limit: 16,
        grow_threshold: 2,
        ..Profile::default()
    }
}

pub fn app_harness(profile: Profile) -> AppHarness {
    let clock = FakeClock::new();
    let spawner = FakeSpawner::new();
    let manifest = Manifest {
        name: AppName::new("compute"),
        executable: PathBuf::from("/opt/compute/worker"),
        args: vec![],
        env: vec![],
        endpoint: PathBuf::from("/run/drover/apps/compute"),
    };
    let overseer = Overseer::new(
        manifest,
        profile,
        Box::new(spawner.clone()),
        Box::new(LoadBalancer::new()),
        clock.clone(),
    );
    AppHarness {
        overseer,
        clock,
        spawner,
    }
}

/// A client session over an in-process duplex, served by `root`.
pub fn connect(root: Arc<dyn Dispatch>) -> Peer {
    let (a, b) = tokio::io::duplex(64 * 1024);
    Session::bind("client", a, root, None);
    Framed::new(b, FrameCodec::new())
}

/// A client session served by the app dispatch of `h`.
pub fn connect_client(h: &AppHarness) -> Peer {
    connect(drover_node::app_dispatch(&h.overseer))
}

/// Connect a worker socket and run the handshake for `uuid`.
pub async fn connect_worker(h: &AppHarness, uuid: &SlaveId) -> Peer {
    let (a, b) = tokio::io::duplex(64 * 1024);
    let handshaker = h.overseer.handshaker();
    let root: Arc<dyn Dispatch> = handshaker.clone();
    let ctrl: Arc<dyn Dispatch> = handshaker.clone();
    let session = Session::bind("worker", a, root, Some(ctrl));
    handshaker.attach(session);

    let mut peer = Framed::new(b, FrameCodec::new());
    peer.send(Frame::new(
        0,
        control::HANDSHAKE,
        vec![rmpv::Value::from(uuid.as_str())],
    ))
    .await
    .unwrap();
    peer
}

/// The uuid of the one spawned slave.
pub fn only_spawned_uuid(h: &AppHarness) -> SlaveId {
    let spawned = h.spawner.spawned();
    assert_eq!(spawned.len(), 1, "expected exactly one spawn");
    spawned[0].uuid.clone()
}

pub async fn recv(peer: &mut Peer) -> Frame {
    tokio::time::timeout(Duration::from_secs(1), peer.next())
        .await
        .expect("timed out waiting for a frame")
        .expect("peer stream ended")
        .expect("frame decode failed")
}

pub async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("never happened: {}", what);
}
