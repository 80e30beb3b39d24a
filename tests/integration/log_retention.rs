//! Integration tests for log retention and concurrent appends

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use pretty_assertions::assert_eq;
use uptime_guard::logs::{CleanupReport, LogStore, parse_timestamp};

fn stamp(days_ago: i64) -> String {
    (Local::now() - chrono::Duration::days(days_ago))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

#[test]
fn test_cleanup_drops_only_expired_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("uptime.log");
    let content = format!(
        "[{}] name=old status=down\n\
         [{}] name=older status=up\n\
         [{}] name=recent status=up\n\
         traceback without timestamp\n\
         [{}] name=today status=up\n",
        stamp(10),
        stamp(4),
        stamp(1),
        stamp(0),
    );
    std::fs::write(&path, content).unwrap();

    let store = LogStore::open(&path, 100, 3, Duration::from_secs(3600)).unwrap();
    let report = store.force_cleanup().unwrap();

    assert_eq!(
        report,
        CleanupReport {
            kept: 3,
            removed: 2,
            unparsable: 1,
        }
    );

    let remaining = std::fs::read_to_string(&path).unwrap();
    assert!(!remaining.contains("name=old "));
    assert!(!remaining.contains("name=older"));
    assert!(remaining.contains("name=recent"));
    assert!(remaining.contains("traceback without timestamp"));
    assert!(remaining.contains("name=today"));
}

#[test]
fn test_cleanup_keeps_invalid_utf8_lines_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("uptime.log");
    let mut content = format!("[{}] name=expired status=down\n", stamp(10)).into_bytes();
    content.extend_from_slice(b"garbage \xff\xfe line\n");
    content.extend_from_slice(format!("[{}] name=fresh status=up\n", stamp(0)).as_bytes());
    std::fs::write(&path, &content).unwrap();

    let store = LogStore::open(&path, 100, 3, Duration::from_secs(3600)).unwrap();
    let report = store.force_cleanup().unwrap();

    assert_eq!(
        report,
        CleanupReport {
            kept: 2,
            removed: 1,
            unparsable: 1,
        }
    );

    let remaining = std::fs::read(&path).unwrap();
    let expected_tail = format!("[{}] name=fresh status=up\n", stamp(0));
    assert!(remaining.starts_with(b"garbage \xff\xfe line\n"));
    assert!(!String::from_utf8_lossy(&remaining).contains("name=expired"));
    assert!(String::from_utf8_lossy(&remaining).contains("name=fresh"));
    assert_eq!(remaining.len(), b"garbage \xff\xfe line\n".len() + expected_tail.len());
}

#[test]
fn test_cleanup_leaves_untouched_file_alone() {
    let dir = tempfile::tempdir().unwrap();
    let store = LogStore::with_defaults(dir.path().join("uptime.log")).unwrap();
    store.append("fresh line");

    let report = store.force_cleanup().unwrap();
    assert_eq!(report.removed, 0);
    assert_eq!(report.kept, 1);
    assert!(!dir.path().join("uptime.log.tmp").exists());
}

#[test]
fn test_appends_survive_concurrent_cleanup() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("uptime.log");
    std::fs::write(&path, format!("[{}] expired\n", stamp(30))).unwrap();

    let store = Arc::new(LogStore::open(&path, 10_000, 3, Duration::ZERO).unwrap());

    let writers: Vec<_> = (0..4)
        .map(|writer| {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..100 {
                    store.append(format!("writer={writer} seq={i}"));
                }
            })
        })
        .collect();

    let cleaner = {
        let store = store.clone();
        std::thread::spawn(move || {
            for _ in 0..20 {
                let _ = store.cleanup_if_due();
            }
        })
    };

    for writer in writers {
        writer.join().unwrap();
    }
    cleaner.join().unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 400 + usize::from(content.contains("expired")));
    assert!(lines.iter().all(|line| parse_timestamp(line).is_some()));
    for writer in 0..4 {
        assert!(content.contains(&format!("writer={writer} seq=99")));
    }
}

#[test]
fn test_reopen_keeps_file_but_not_memory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("uptime.log");

    let store = LogStore::with_defaults(&path).unwrap();
    store.append("before restart");
    drop(store);

    let store = LogStore::with_defaults(&path).unwrap();
    assert!(store.is_empty());
    assert_eq!(store.drain_new(), "");
    assert!(std::fs::read_to_string(&path).unwrap().contains("before restart"));
}
