// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario: the adhoc gateway spreads `resolve` uniformly across the
//! remote instances of a service.

use std::collections::HashMap;
use std::time::Instant;

use drover_core::{Endpoint, PeerId, ProtocolBuilder};
use drover_locator::{
    AdhocGateway, GatewayPolicy, Locator, ServiceDescriptor, StaticGroups,
};

fn descriptor(name: &str, addr: &str, port: u16) -> ServiceDescriptor {
    ServiceDescriptor {
        name: name.to_string(),
        version: 1,
        endpoints: vec![Endpoint::new(addr.parse().unwrap(), port)],
        graph: ProtocolBuilder::new(name, 1).build(),
    }
}

#[test]
fn resolve_picks_among_peers_roughly_evenly() {
    let locator = Locator::new(
        PeerId::new("local"),
        GatewayPolicy::LocalFirst,
        Box::new(AdhocGateway::new()),
        Box::new(StaticGroups::default()),
    );
    let now = Instant::now();
    locator.consume(
        PeerId::new("A"),
        vec![],
        vec![descriptor("ping", "1.1.1.1", 10053)],
        now,
    );
    locator.consume(
        PeerId::new("B"),
        vec![],
        vec![descriptor("ping", "2.2.2.2", 10053)],
        now,
    );

    const DRAWS: usize = 1_000;
    let mut counts: HashMap<String, usize> = HashMap::new();
    for _ in 0..DRAWS {
        let resolved = locator.resolve("ping").unwrap();
        assert_eq!(resolved.endpoints.len(), 1);
        *counts
            .entry(resolved.endpoints[0].addr.to_string())
            .or_insert(0) += 1;
    }

    // Exactly the two endpoint sets, and a roughly even split: for a
    // fair coin over 1000 draws, sigma is ~15.8; four sigmas keeps the
    // test honest without making it flaky.
    assert_eq!(counts.len(), 2);
    let a = counts["1.1.1.1"] as i64;
    assert!((a - 500).abs() < 64, "distribution skewed: {:?}", counts);
}

#[test]
fn a_lost_peer_stops_being_resolved() {
    let locator = Locator::new(
        PeerId::new("local"),
        GatewayPolicy::LocalFirst,
        Box::new(AdhocGateway::new()),
        Box::new(StaticGroups::default()),
    );
    let now = Instant::now();
    locator.consume(
        PeerId::new("A"),
        vec![],
        vec![descriptor("ping", "1.1.1.1", 10053)],
        now,
    );
    locator.consume(
        PeerId::new("B"),
        vec![],
        vec![descriptor("ping", "2.2.2.2", 10053)],
        now,
    );
    locator.cleanup(&PeerId::new("A"));

    for _ in 0..50 {
        let resolved = locator.resolve("ping").unwrap();
        assert_eq!(resolved.endpoints[0].addr.to_string(), "2.2.2.2");
    }
}
