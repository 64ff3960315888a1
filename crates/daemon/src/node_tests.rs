// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

use drover_core::codes as fault_codes;
use drover_locator::{AdhocGateway, GatewayPolicy, StaticGroups};

fn test_config(runtime: &std::path::Path) -> Config {
    let text = format!(
        r#"
[paths]
runtime = "{}"

[profiles.small]
concurrency = 1
pool_limit = 1

[apps.echo]
executable = "/bin/true"
profile = "small"
"#,
        runtime.display()
    );
    toml::from_str(&text).unwrap()
}

fn service(runtime: &std::path::Path) -> (Arc<NodeService>, Arc<drover_locator::Locator>) {
    let locator = drover_locator::Locator::new(
        drover_core::PeerId::generate(),
        GatewayPolicy::LocalFirst,
        Box::new(AdhocGateway::new()),
        Box::new(StaticGroups::default()),
    );
    let node = NodeService::new(
        test_config(runtime),
        Arc::clone(&locator),
        CancellationToken::new(),
    );
    (node, locator)
}

#[tokio::test]
async fn start_app_exposes_it_on_the_locator() {
    let dir = tempfile::tempdir().unwrap();
    let (node, locator) = service(dir.path());

    node.start_app("echo", None).unwrap();
    assert_eq!(node.list(), vec!["echo".to_string()]);

    let resolved = locator.resolve("echo").unwrap();
    assert_eq!(resolved.name, "echo");
    assert_eq!(resolved.endpoints.len(), 1);
    assert!(resolved.graph.contains(drover_node::app::ENQUEUE));

    // The worker uplink socket exists.
    assert!(dir.path().join("apps").join("echo").exists());
}

#[tokio::test]
async fn starting_twice_is_an_invalid_app_state() {
    let dir = tempfile::tempdir().unwrap();
    let (node, _locator) = service(dir.path());
    node.start_app("echo", None).unwrap();
    let fault = node.start_app("echo", None).unwrap_err();
    assert_eq!(fault.code, fault_codes::INVALID_APP_STATE);
}

#[tokio::test]
async fn unconfigured_app_cannot_start() {
    let dir = tempfile::tempdir().unwrap();
    let (node, _locator) = service(dir.path());
    let fault = node.start_app("ghost", None).unwrap_err();
    assert_eq!(fault.code, fault_codes::INVALID_APP_STATE);
}

#[tokio::test]
async fn unknown_profile_override_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (node, _locator) = service(dir.path());
    let fault = node.start_app("echo", Some("ghost")).unwrap_err();
    assert_eq!(fault.code, fault_codes::INVALID_APP_STATE);
}

#[tokio::test]
async fn pause_withdraws_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let (node, locator) = service(dir.path());
    node.start_app("echo", None).unwrap();

    node.pause_app("echo").unwrap();
    assert!(node.list().is_empty());
    assert!(locator.resolve("echo").is_err());
    assert!(!dir.path().join("apps").join("echo").exists());

    let fault = node.pause_app("echo").unwrap_err();
    assert_eq!(fault.code, fault_codes::INVALID_APP_STATE);
}

#[tokio::test]
async fn info_reports_a_running_app() {
    let dir = tempfile::tempdir().unwrap();
    let (node, _locator) = service(dir.path());
    node.start_app("echo", None).unwrap();

    let info = node.info("echo").unwrap();
    let map = info.as_map().unwrap();
    assert!(map
        .iter()
        .any(|(k, v)| k.as_str() == Some("app") && v.as_str() == Some("echo")));
    assert!(node.info("ghost").is_err());
}
