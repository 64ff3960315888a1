// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

use std::path::PathBuf;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_util::codec::Framed;

use drover_core::{graph::streaming, AppName, FakeClock, Manifest, Profile};
use drover_rpc::Session;
use drover_wire::{Frame, FrameCodec};

use crate::balancer::NullBalancer;
use crate::spawn::FakeSpawner;

type Peer = Framed<tokio::io::DuplexStream, FrameCodec>;

fn overseer() -> Arc<Overseer<FakeClock>> {
    let manifest = Manifest {
        name: AppName::new("echo"),
        executable: PathBuf::from("/opt/echo/worker"),
        args: vec![],
        env: vec![],
        endpoint: PathBuf::from("/run/drover/apps/echo"),
    };
    Overseer::new(
        manifest,
        Profile::default(),
        Box::new(FakeSpawner::new()),
        Box::new(NullBalancer),
        FakeClock::new(),
    )
}

async fn serve() -> (Arc<Overseer<FakeClock>>, Peer) {
    let o = overseer();
    let (a, b) = tokio::io::duplex(64 * 1024);
    Session::bind("client", a, app_dispatch(&o), None);
    (o, Framed::new(b, FrameCodec::new()))
}

async fn recv(peer: &mut Peer) -> Frame {
    tokio::time::timeout(Duration::from_secs(1), peer.next())
        .await
        .expect("timed out waiting for a frame")
        .expect("peer stream ended")
        .expect("frame decode failed")
}

#[tokio::test]
async fn enqueue_without_an_event_name_is_an_invocation_error() {
    let (_o, mut peer) = serve().await;
    peer.send(Frame::new(1, app::ENQUEUE, vec![]))
        .await
        .unwrap();
    let reply = recv(&mut peer).await;
    assert_eq!(reply.message_id, streaming::ERROR);
    assert_eq!(reply.args[0], Value::from(codes::INVOCATION_ERROR));
}

#[tokio::test]
async fn enqueue_with_the_null_balancer_queues() {
    let (o, mut peer) = serve().await;
    peer.send(Frame::new(1, app::ENQUEUE, vec![Value::from("ping")]))
        .await
        .unwrap();
    // No reply yet -- the request is parked.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(o.queue_len(), 1);
    assert_eq!(o.pool_size(), 0);
}

#[tokio::test]
async fn empty_tag_means_no_affinity() {
    let (o, mut peer) = serve().await;
    peer.send(Frame::new(
        1,
        app::ENQUEUE,
        vec![Value::from("ping"), Value::from("")],
    ))
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    // An empty tag would otherwise spawn a slave with an empty uuid.
    assert_eq!(o.pool_size(), 0);
    assert_eq!(o.queue_len(), 1);
}

#[tokio::test]
async fn info_answers_inline() {
    let (_o, mut peer) = serve().await;
    peer.send(Frame::new(1, app::INFO, vec![])).await.unwrap();
    let reply = recv(&mut peer).await;
    assert_eq!(
        reply.message_id,
        drover_core::graph::primitive::VALUE
    );
    let map = reply.args[0].as_map().unwrap();
    assert!(map.iter().any(|(k, _)| k.as_str() == Some("pool")));
}

#[tokio::test]
async fn graph_exposes_both_methods() {
    let o = overseer();
    let dispatch = app_dispatch(&o);
    let graph = drover_rpc::Dispatch::graph(dispatch.as_ref()).unwrap();
    assert_eq!(graph.node(app::ENQUEUE).unwrap().alias, "enqueue");
    assert_eq!(graph.node(app::INFO).unwrap().alias, "info");
}
