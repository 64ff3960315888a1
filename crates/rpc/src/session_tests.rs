// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::slot::DispatchBuilder;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio_util::codec::Framed;

use drover_core::graph::primitive;

type Peer = Framed<tokio::io::DuplexStream, FrameCodec>;

fn echo_dispatch() -> Arc<dyn Dispatch> {
    DispatchBuilder::new("echo", 1)
        .blocking(0, "echo", |args| Ok(args.into_iter().next().unwrap_or(Value::Nil)))
        .build()
}

async fn serve_with_control(control: Option<Arc<dyn Dispatch>>) -> (Arc<Session>, Peer) {
    let (a, b) = tokio::io::duplex(64 * 1024);
    let session = Session::bind("test", a, echo_dispatch(), control);
    (session, Framed::new(b, FrameCodec::new()))
}

async fn recv(peer: &mut Peer) -> Frame {
    tokio::time::timeout(Duration::from_secs(1), peer.next())
        .await
        .expect("timed out waiting for a frame")
        .expect("peer stream ended")
        .expect("frame decode failed")
}

async fn assert_silent(peer: &mut Peer) {
    let outcome = tokio::time::timeout(Duration::from_millis(100), peer.next()).await;
    assert!(outcome.is_err(), "expected silence, got {:?}", outcome);
}

/// Wait out the reader task's stream-removal turn.
async fn assert_no_channels(session: &Session) {
    for _ in 0..100 {
        if session.channel_count() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert_eq!(session.channel_count(), 0);
}

#[tokio::test]
async fn each_new_channel_starts_from_the_root_dispatch() {
    let (_session, mut peer) = serve_with_control(None).await;
    peer.send(Frame::new(1, 0, vec![Value::from("a")])).await.unwrap();
    peer.send(Frame::new(2, 0, vec![Value::from("b")])).await.unwrap();
    assert_eq!(recv(&mut peer).await.args, vec![Value::from("a")]);
    assert_eq!(recv(&mut peer).await.args, vec![Value::from("b")]);
}

#[tokio::test]
async fn reused_channel_id_is_dropped_with_a_warning() {
    let (session, mut peer) = serve_with_control(None).await;
    peer.send(Frame::new(5, 0, vec![Value::from("x")])).await.unwrap();
    assert_eq!(recv(&mut peer).await.channel, 5);
    assert_no_channels(&session).await;

    // Channel 5 lived and died; ids never repeat within a session.
    peer.send(Frame::new(5, 0, vec![Value::from("again")]))
        .await
        .unwrap();
    assert_silent(&mut peer).await;
    assert_no_channels(&session).await;
}

#[tokio::test]
async fn new_channel_with_an_unrecognized_message_id_is_dropped() {
    let (session, mut peer) = serve_with_control(None).await;

    // The echo graph only knows message 0: no error frame, no channel.
    peer.send(Frame::new(4, 99, vec![Value::from("nope")]))
        .await
        .unwrap();
    assert_silent(&mut peer).await;
    assert_eq!(session.channel_count(), 0);

    // The id was never consumed, so a well-formed open still works.
    peer.send(Frame::new(4, 0, vec![Value::from("ok")]))
        .await
        .unwrap();
    let reply = recv(&mut peer).await;
    assert_eq!(reply.channel, 4);
    assert_eq!(reply.args, vec![Value::from("ok")]);
}

#[tokio::test]
async fn lower_unknown_channel_is_dropped() {
    let (session, mut peer) = serve_with_control(None).await;
    peer.send(Frame::new(9, 0, vec![Value::from("hi")])).await.unwrap();
    assert_eq!(recv(&mut peer).await.channel, 9);

    peer.send(Frame::new(3, 0, vec![Value::from("stale")]))
        .await
        .unwrap();
    assert_silent(&mut peer).await;
    assert_no_channels(&session).await;
}

#[tokio::test]
async fn parse_error_sends_goaway_and_closes() {
    let (a, b) = tokio::io::duplex(64 * 1024);
    let session = Session::bind("test", a, echo_dispatch(), None);
    let mut peer = Framed::new(b, FrameCodec::new());

    // 0xc1 is reserved in msgpack: instant parse error.
    peer.get_mut().write_all(&[0xc1, 0x00]).await.unwrap();
    let frame = recv(&mut peer).await;
    assert_eq!(frame.channel, control::CONTROL_CHANNEL);
    assert_eq!(frame.message_id, control::GOAWAY);
    assert_eq!(frame.args[0], Value::from(drover_core::codes::PARSE_ERROR));

    session.closed().await;
    assert!(session.is_closed());
}

#[tokio::test]
async fn peer_disconnect_closes_the_session() {
    let (a, b) = tokio::io::duplex(64 * 1024);
    let session = Session::bind("test", a, echo_dispatch(), None);
    drop(b);
    tokio::time::timeout(Duration::from_secs(1), session.closed())
        .await
        .expect("session did not observe the disconnect");
}

#[tokio::test]
async fn control_frames_go_to_the_control_dispatch() {
    let control_dispatch = DispatchBuilder::new("session-control", 1)
        .blocking(control::HEARTBEAT, "heartbeat", |_| Ok(Value::Nil))
        .build();
    let (_session, mut peer) = serve_with_control(Some(control_dispatch)).await;

    peer.send(Frame::new(0, control::HEARTBEAT, vec![]))
        .await
        .unwrap();
    let reply = recv(&mut peer).await;
    assert_eq!(reply.channel, 0);
    assert_eq!(reply.message_id, primitive::VALUE);
}

#[tokio::test]
async fn session_control_echoes_heartbeats() {
    let control_dispatch: Arc<dyn Dispatch> =
        Arc::new(crate::dispatch::SessionControl::new("test"));
    let (_session, mut peer) = serve_with_control(Some(control_dispatch)).await;

    for _ in 0..3 {
        peer.send(Frame::new(0, control::HEARTBEAT, vec![]))
            .await
            .unwrap();
        let reply = recv(&mut peer).await;
        assert_eq!(reply.channel, 0);
        assert_eq!(reply.message_id, control::HEARTBEAT);
    }
}

#[tokio::test]
async fn control_frames_without_a_dispatch_are_dropped() {
    let (_session, mut peer) = serve_with_control(None).await;
    peer.send(Frame::new(0, control::HEARTBEAT, vec![]))
        .await
        .unwrap();
    assert_silent(&mut peer).await;
}

#[tokio::test]
async fn locally_opened_channels_use_distinct_ids() {
    let (session, mut peer) = serve_with_control(None).await;
    let first = session.open_channel(None);
    let second = session.open_channel(None);
    assert_ne!(first.channel(), second.channel());

    first.send(0, vec![Value::from("one")]).unwrap();
    second.send(0, vec![Value::from("two")]).unwrap();
    assert_eq!(recv(&mut peer).await.channel, first.channel());
    assert_eq!(recv(&mut peer).await.channel, second.channel());
}

#[tokio::test]
async fn upstream_send_after_close_fails() {
    let (session, _peer) = serve_with_control(None).await;
    let upstream = session.open_channel(None);
    upstream.close();
    let err = upstream.send(0, vec![]).unwrap_err();
    assert_eq!(err.code, drover_core::codes::QUEUE_IS_CLOSED);
}

#[tokio::test]
async fn closed_session_rejects_sends() {
    let (session, _peer) = serve_with_control(None).await;
    let upstream = session.open_channel(None);
    session.close();
    let err = upstream.send(0, vec![]).unwrap_err();
    assert_eq!(err.code, drover_core::codes::QUEUE_IS_CLOSED);
}
