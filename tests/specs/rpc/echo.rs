// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario: a blocking echo service answers one call per channel.

use crate::prelude::*;

use rmpv::Value;
use drover_core::graph::primitive;
use drover_rpc::DispatchBuilder;
use drover_wire::Frame;

#[tokio::test]
async fn blocking_echo_round_trip() {
    let echo = DispatchBuilder::new("echo", 1)
        .blocking(0, "echo", |args| {
            Ok(args.into_iter().next().unwrap_or(Value::Nil))
        })
        .build();
    let mut client = connect(echo);

    client
        .send(Frame::new(7, 0, vec![Value::from("hello")]))
        .await
        .unwrap();

    let reply = recv(&mut client).await;
    assert_eq!(reply.channel, 7);
    assert_eq!(reply.message_id, primitive::VALUE);
    assert_eq!(reply.args, vec![Value::from("hello")]);
}

#[tokio::test]
async fn echo_channels_are_independent() {
    let echo = DispatchBuilder::new("echo", 1)
        .blocking(0, "echo", |args| {
            Ok(args.into_iter().next().unwrap_or(Value::Nil))
        })
        .build();
    let mut client = connect(echo);

    for (channel, text) in [(1u64, "a"), (2, "b"), (3, "c")] {
        client
            .send(Frame::new(channel, 0, vec![Value::from(text)]))
            .await
            .unwrap();
        let reply = recv(&mut client).await;
        assert_eq!(reply.channel, channel);
        assert_eq!(reply.args, vec![Value::from(text)]);
    }
}
