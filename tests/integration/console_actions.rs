//! Integration tests for the manual triggers of the console

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uptime_guard::alerts::TEST_MESSAGE;
use uptime_guard::console::Console;
use uptime_guard::endpoints::{Endpoint, JsonEndpointStore};
use uptime_guard::monitors::probe::Outcome;

use crate::helpers::{Harness, policy};

fn console(harness: &Harness) -> Console {
    let sites = Arc::new(JsonEndpointStore::new(harness.dir.path().join("sites.json")));
    Console::new(harness.engine.clone(), sites)
}

#[tokio::test]
async fn test_test_alert_reports_delivery() {
    let harness = Harness::new(Vec::new(), policy(10, None));
    let console = console(&harness);

    assert_eq!(console.test_alert_transport().await, "test alert sent via recording");
    assert_eq!(harness.transport.messages(), vec![TEST_MESSAGE.to_string()]);

    harness.transport.set_failing(true);
    let status = console.test_alert_transport().await;
    assert!(status.starts_with("test alert failed"));
    assert!(harness.engine.logs().get_recent(5).contains("[ALERT ERROR] test message failed"));
}

#[tokio::test]
async fn test_status_report_after_cycle() {
    let endpoints = vec![
        Endpoint::new("shop", "https://shop.test"),
        Endpoint::new("blog", "https://blog.test"),
    ];
    let harness = Harness::new(endpoints, policy(10, Some(3)));
    harness.probe.script("https://blog.test", [Outcome::Down]);
    harness.engine.run_cycle(&CancellationToken::new()).await;

    let report = console(&harness).status_report().await;

    assert!(report.contains("endpoints: 2 checked, 1 up, 1 down"));
    assert!(report.contains("blog (https://blog.test) failures=1"));
    assert!(report.contains("alerts: recording enabled, threshold 10 failures, escalation up to 3 alerts"));
}

#[tokio::test]
async fn test_force_cleanup_reports_counts() {
    let harness = Harness::new(Vec::new(), policy(10, None));
    harness.engine.logs().append("one");

    let status = console(&harness).force_log_cleanup();
    assert_eq!(status, "log cleanup removed 0 lines, kept 1 (0 without timestamp)");
}

#[tokio::test]
async fn test_logs_refresh_incrementally() {
    let harness = Harness::new(vec![Endpoint::new("shop", "https://shop.test")], policy(10, None));
    let console = console(&harness);

    harness.engine.run_cycle(&CancellationToken::new()).await;
    let first = console.refresh_logs();
    assert!(first.contains("name=shop"));

    harness.engine.logs().append("manual note");
    assert!(console.refresh_logs().ends_with("manual note"));
    assert!(console.recent_logs(1).contains("manual note"));
}
