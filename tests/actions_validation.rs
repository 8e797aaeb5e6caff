mod common;

use common::FakeApi;
use fw_watcher::actions;
use fw_watcher::client::models::ScanMode;
use fw_watcher::notify::{NotificationCenter, Section};
use tokio_test::{assert_err, assert_ok};

/// Integration tests for user actions
/// Invalid input is reported locally and never reaches the service

#[tokio::test]
async fn test_invalid_ports_send_nothing() {
    let api = FakeApi::new();

    for input in ["", "0", "65536", "http", "-1"] {
        let err = assert_err!(actions::open_port(&api, input).await);
        assert!(err.is_validation(), "'{input}' should be a validation error");
    }
    assert_err!(actions::set_panel_port(&api, "99999").await);
    assert_err!(actions::forward_delete(&api, "abc").await);
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn test_invalid_addresses_send_nothing() {
    let api = FakeApi::new();

    assert_err!(actions::whitelist_add(&api, "not-an-ip").await);
    assert_err!(actions::block_ip(&api, "300.1.1.1").await);
    assert_err!(actions::whitelist_delete(&api, "").await);
    assert_err!(actions::forward_add(&api, "8080", "example.com", "80").await);
    assert_err!(actions::set_log_limit(&api, 0).await);
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn test_valid_actions_reach_the_service() {
    let api = FakeApi::new();

    assert_ok!(actions::open_port(&api, " 8080 ").await);
    let message = assert_ok!(actions::whitelist_add(&api, "::ffff:10.0.0.5").await);
    assert_eq!(message, "10.0.0.5 added to the whitelist");
    assert_ok!(actions::forward_add(&api, "2222", "10.0.0.9", "22").await);
    let message = assert_ok!(actions::strictify(&api).await);
    assert!(message.contains("48080"));

    assert_eq!(
        api.calls(),
        vec![
            "open 8080",
            "whitelist_add 10.0.0.5",
            "forward_add 2222 10.0.0.9 22",
            "strictify",
        ]
    );
}

#[tokio::test]
async fn test_transport_failure_becomes_sticky_action_error() {
    let api = FakeApi::new().failing("/api/block_ip");
    let mut notices = NotificationCenter::default();

    let outcome = actions::block_ip(&api, "198.51.100.23").await;
    actions::report(&mut notices, &outcome);
    let sticky = notices.error(Section::Actions).expect("sticky error");
    assert!(sticky.contains("/api/block_ip"));

    // The next successful action clears it
    let outcome = actions::open_port(&api, "443").await;
    actions::report(&mut notices, &outcome);
    assert!(notices.error(Section::Actions).is_none());
}

#[tokio::test]
async fn test_scan_targets_are_checked_before_sending() {
    let api = FakeApi::new();
    let hosts = |list: &[&str]| list.iter().map(|h| h.to_string()).collect::<Vec<_>>();

    assert_err!(actions::scan(&api, &hosts(&[]), ScanMode::Icmp, "", 1.0).await);
    assert_err!(actions::scan(&api, &hosts(&["bad host"]), ScanMode::Icmp, "", 1.0).await);
    assert_err!(actions::scan(&api, &hosts(&["10.0.0.1"]), ScanMode::Tcp, "22,70000", 1.0).await);
    assert_err!(actions::scan(&api, &hosts(&["10.0.0.1"]), ScanMode::Udp, "53", 0.0).await);
    assert!(api.calls().is_empty());

    let reply = assert_ok!(
        actions::scan(
            &api,
            &hosts(&["::ffff:10.0.0.1", "DB.internal"]),
            ScanMode::Tcp,
            "5432, 22,22",
            2.5
        )
        .await
    );
    assert_eq!(reply.results.len(), 2);

    let sent = api.scans();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].hosts, vec!["10.0.0.1", "db.internal"]);
    assert_eq!(sent[0].ports, "22,5432");
    assert_eq!(sent[0].mode, ScanMode::Tcp);
    assert_eq!(sent[0].timeout, 2.5);
}

#[tokio::test]
async fn test_panel_credentials_validation() {
    let api = FakeApi::new();

    assert_err!(actions::set_panel_credentials(&api, "ops", "pw", "0").await);
    assert_err!(actions::set_panel_credentials(&api, "", "pw", "9443").await);
    assert_err!(actions::set_panel_credentials(&api, "ops", "", "9443").await);
    assert!(api.calls().is_empty());

    let message = assert_ok!(actions::set_panel_credentials(&api, " ops ", "pw", "9443").await);
    assert!(message.contains("9443"));
    assert_eq!(api.calls(), vec!["panel_cred ops 9443"]);
}

#[tokio::test]
async fn test_whitelist_import_sends_only_valid_addresses() {
    let api = FakeApi::new();

    assert_err!(actions::import_whitelist(&api, "nothing here\n").await);
    assert!(api.calls().is_empty());

    let file = "198.51.100.1 | flag local:a online:b\nbogus\n::ffff:198.51.100.2\n";
    let message = assert_ok!(actions::import_whitelist(&api, file).await);
    assert_eq!(message, "2 address(es) sent to the whitelist, 1 line(s) skipped");
    assert_eq!(api.imports(), vec!["198.51.100.1\n198.51.100.2\n"]);
}

#[tokio::test]
async fn test_doh_report_lines() {
    let api = FakeApi::new();
    let report = assert_ok!(fw_watcher::client::FirewallApi::doh_info(&api).await);
    assert_eq!(actions::describe_doh(&report), vec!["google       ok 20.00 ms"]);
}
