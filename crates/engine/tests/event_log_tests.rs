//! Integration tests for the event log
//!
//! Covers optimistic appends, stream reads, the global position and the
//! watermark guarantee of `read_all` under concurrent writers.

use chronicle_engine::{Database, EventData, EventLog, RetryConfig, StreamFilter, StreamName};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

fn stream(name: &str) -> StreamName {
    StreamName::new(name).unwrap()
}

fn event(n: u64) -> EventData {
    EventData::new("Tick", json!({ "n": n }))
}

#[test]
fn test_created_then_conflicting_append() {
    let log = EventLog::new(Database::ephemeral());
    let s = stream("content-app1-c1");

    let offset = log
        .append(&s, 0, &[EventData::new("Created", json!({"type": "Created"}))])
        .unwrap();
    assert_eq!(offset, 0);
    assert_eq!(log.position().position, 1);

    let err = log
        .append(&s, 0, &[EventData::new("Created", json!({"type": "Created"}))])
        .unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(log.position().position, 1);
    assert_eq!(log.read_stream(&s, 0).unwrap().len(), 1);
}

#[test]
fn test_only_next_offset_accepted() {
    let log = EventLog::new(Database::ephemeral());
    let s = stream("orders-1");

    for expected in 0..5 {
        for wrong in [expected + 1, expected + 7] {
            assert!(log.append(&s, wrong, &[event(wrong)]).unwrap_err().is_conflict());
        }
        assert_eq!(log.append(&s, expected, &[event(expected)]).unwrap(), expected);
    }
    assert_eq!(log.stream_offset(&s), Some(4));
    assert_eq!(log.next_offset(&s), 5);
    assert_eq!(log.position().position, 5);
}

#[test]
fn test_read_stream_returns_every_offset() {
    let log = EventLog::new(Database::ephemeral());
    let s = stream("orders-2");
    for n in 0..10 {
        log.append_any(&s, &[event(n)]).unwrap();
    }

    let offsets: Vec<u64> = log.read_stream(&s, 0).unwrap().iter().map(|e| e.offset).collect();
    assert_eq!(offsets, (0..10).collect::<Vec<_>>());
    assert_eq!(log.read_stream(&s, 7).unwrap().len(), 3);
    assert!(log.read_stream(&s, 10).unwrap().is_empty());
    assert!(log.read_stream(&stream("missing"), 0).unwrap().is_empty());
}

#[test]
fn test_multi_event_commit_shares_position() {
    let log = EventLog::new(Database::ephemeral());
    let s = stream("batch-1");
    let commit = log
        .append_commit(&s, 0, &[event(1), event(2), event(3)])
        .unwrap();
    assert_eq!(commit.events_count, 3);

    let events = log.read_all(0, &StreamFilter::All, 10).unwrap();
    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|e| e.position == 1 && e.offset == 0));
    assert_eq!(events.iter().map(|e| e.index).collect::<Vec<_>>(), vec![0, 1, 2]);
}

#[test]
fn test_empty_batch_rejected() {
    let log = EventLog::new(Database::ephemeral());
    assert!(log.append(&stream("s"), 0, &[]).is_err());
    assert_eq!(log.position().position, 0);
}

#[test]
fn test_read_all_filters_and_pages() {
    let log = EventLog::new(Database::ephemeral());
    for i in 0..6 {
        let name = if i % 2 == 0 { "content-a-1" } else { "schema-a-1" };
        log.append_any(&stream(name), &[event(i)]).unwrap();
    }

    let content = log
        .read_all(0, &StreamFilter::prefix("content-"), 100)
        .unwrap();
    assert_eq!(
        content.iter().map(|e| e.position).collect::<Vec<_>>(),
        vec![1, 3, 5]
    );

    let page = log.read_all_commits(2, &StreamFilter::All, 2);
    assert_eq!(
        page.iter().map(|c| c.position.unwrap()).collect::<Vec<_>>(),
        vec![3, 4]
    );

    let newest = log.read_all_reverse(&StreamFilter::All, 2).unwrap();
    assert_eq!(
        newest.iter().map(|e| e.position).collect::<Vec<_>>(),
        vec![6, 5]
    );
}

#[test]
fn test_concurrent_appends_get_distinct_positions() {
    let db = Database::ephemeral();
    let threads: u64 = 8;
    let per_thread: u64 = 50;

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let log = EventLog::new(Arc::clone(&db));
            thread::spawn(move || {
                let s = stream(&format!("writer-{}", t));
                (0..per_thread)
                    .map(|n| log.append_commit(&s, n, &[event(n)]).unwrap().position.unwrap())
                    .collect::<Vec<u64>>()
            })
        })
        .collect();

    let mut all = HashSet::new();
    for handle in handles {
        let positions = handle.join().unwrap();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        for p in positions {
            assert!(all.insert(p), "position {} assigned twice", p);
        }
    }

    let total = threads * per_thread;
    let log = EventLog::new(db);
    assert_eq!(log.position().position, total);
    assert_eq!(all.len() as u64, total);
    assert_eq!(all.iter().max().copied(), Some(total));
    assert_eq!(
        log.read_all(0, &StreamFilter::All, usize::MAX).unwrap().len() as u64,
        total
    );
}

#[test]
fn test_reader_never_skips_during_writes() {
    let db = Database::ephemeral();
    let writers: Vec<_> = (0..4)
        .map(|t| {
            let log = EventLog::new(Arc::clone(&db));
            thread::spawn(move || {
                let s = stream(&format!("w-{}", t));
                for n in 0..100 {
                    log.append_any(&s, &[event(n)]).unwrap();
                }
            })
        })
        .collect();

    let log = EventLog::new(Arc::clone(&db));
    let mut last = 0;
    let mut seen = Vec::new();
    while seen.len() < 400 {
        for commit in log.read_all_commits(last, &StreamFilter::All, 16) {
            let position = commit.position.unwrap();
            assert_eq!(position, last + 1, "gap after {}", last);
            last = position;
            seen.push(position);
        }
    }
    for w in writers {
        w.join().unwrap();
    }
    assert_eq!(seen, (1..=400).collect::<Vec<_>>());
}

#[test]
fn test_contended_stream_with_retry() {
    let db = Database::ephemeral();
    let s = stream("counter-1");
    let config = RetryConfig::new()
        .with_max_retries(1000)
        .with_base_delay_ms(0)
        .with_max_delay_ms(1);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let db = Arc::clone(&db);
            let s = s.clone();
            let config = config.clone();
            thread::spawn(move || {
                let log = EventLog::new(Arc::clone(&db));
                for n in 0..25 {
                    db.retry_on_conflict(&config, || {
                        let next = log.next_offset(&s);
                        log.append(&s, next, &[event(n)])
                    })
                    .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let log = EventLog::new(db);
    assert_eq!(log.stream_offset(&s), Some(99));
    let offsets: Vec<u64> = log.read_stream(&s, 0).unwrap().iter().map(|e| e.offset).collect();
    assert_eq!(offsets, (0..100).collect::<Vec<_>>());
}

#[test]
fn test_reads_by_position_and_time() {
    let log = EventLog::new(Database::ephemeral());
    let a = stream("a");
    let b = stream("b");
    log.append_any(&a, &[event(0)]).unwrap();
    log.append_any(&b, &[event(1)]).unwrap();
    log.append_any(&a, &[event(2)]).unwrap();

    let after = log.read_stream_after_position(&a, 1).unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].position, 3);

    let commit = log.get_by_position(2).unwrap();
    assert_eq!(commit.stream, b);
    assert!(log.get_by_position(4).is_none());

    let since = log.read_stream_since(&a, commit.timestamp).unwrap();
    assert!(since.iter().all(|e| e.timestamp >= commit.timestamp));
    assert!(since.iter().any(|e| e.position == 3));

    assert_eq!(log.streams(None), vec![a, b]);
}
