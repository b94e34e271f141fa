mod support;

use archivesync_storage::LocalMessageStore;
use archivesync_sync::{event_channel, BackwardOutcome, EventSink, SyncError, SyncEvent};
use pretty_assertions::assert_eq;
use support::*;

#[tokio::test]
async fn without_anchor_no_query_is_issued() {
    let h = Harness::new();
    h.archive.push_messages(&alice(), &alice(), 10);
    let (_, backward) = h.controllers(EventSink::disabled());

    let outcome = backward.run(&conversation()).await.unwrap();

    assert_eq!(outcome, BackwardOutcome::NoAnchor);
    assert_eq!(h.archive.query_count(), 0);
}

#[tokio::test]
async fn pages_strictly_older_until_exhausted() {
    let h = Harness::new();
    h.archive.push_messages(&alice(), &alice(), 120);
    let (forward, backward) = h.controllers(EventSink::disabled());
    let conv = conversation();
    forward.run(&conv).await.unwrap();

    let BackwardOutcome::Fetched(first) = backward.run(&conv).await.unwrap() else {
        panic!("expected a fetched page");
    };
    assert_eq!(first.stored, 50);
    assert_eq!(first.cursor.first_archive_id.as_deref(), Some("a0021"));
    assert_eq!(first.cursor.first_stanza_id.as_deref(), Some("s21"));
    assert!(!first.cursor.remote_history_complete);

    let BackwardOutcome::Fetched(second) = backward.run(&conv).await.unwrap() else {
        panic!("expected a fetched page");
    };
    assert_eq!(second.stored, 20);
    assert_eq!(second.cursor.first_archive_id.as_deref(), Some("a0001"));
    assert!(second.cursor.remote_history_complete);
    // Forward progress is never touched by backward pages.
    assert_eq!(second.cursor.last_archive_id.as_deref(), Some("a0120"));

    assert_eq!(h.stored(&conv), 120);
    assert_eq!(
        h.archive.queries(),
        vec![
            Query::Newest,
            Query::Before("a0071".into()),
            Query::Before("a0021".into()),
        ]
    );
}

#[tokio::test]
async fn completed_history_issues_no_further_queries() {
    let h = Harness::new();
    h.archive.push_messages(&alice(), &alice(), 60);
    let (forward, backward) = h.controllers(EventSink::disabled());
    let conv = conversation();
    forward.run(&conv).await.unwrap();
    backward.run(&conv).await.unwrap();
    let queries = h.archive.query_count();

    for _ in 0..3 {
        assert_eq!(backward.run(&conv).await.unwrap(), BackwardOutcome::HistoryComplete);
    }

    assert_eq!(h.archive.query_count(), queries);
    assert!(h.store.cursor(&conv.key()).unwrap().remote_history_complete);
}

#[tokio::test]
async fn empty_page_keeps_anchor_and_completes() {
    let h = Harness::new();
    h.archive.push_messages(&alice(), &alice(), 100);
    let (forward, backward) = h.controllers(EventSink::disabled());
    let conv = conversation();
    forward.run(&conv).await.unwrap();

    let BackwardOutcome::Fetched(full) = backward.run(&conv).await.unwrap() else {
        panic!("expected a fetched page");
    };
    assert_eq!(full.stored, 50);
    assert!(!full.cursor.remote_history_complete);

    let BackwardOutcome::Fetched(empty) = backward.run(&conv).await.unwrap() else {
        panic!("expected a fetched page");
    };
    assert_eq!(empty.stored, 0);
    assert_eq!(empty.cursor.first_archive_id.as_deref(), Some("a0001"));
    assert!(empty.cursor.remote_history_complete);
}

#[tokio::test]
async fn first_forward_partial_page_leaves_nothing_to_backfill() {
    let h = Harness::new();
    h.archive.push_messages(&alice(), &alice(), 12);
    let (forward, backward) = h.controllers(EventSink::disabled());
    let conv = conversation();
    forward.run(&conv).await.unwrap();

    assert_eq!(backward.run(&conv).await.unwrap(), BackwardOutcome::HistoryComplete);
    assert_eq!(h.archive.queries(), vec![Query::Newest]);
}

#[tokio::test]
async fn failed_query_keeps_anchor() {
    let h = Harness::new();
    h.archive.push_messages(&alice(), &alice(), 80);
    let (forward, backward) = h.controllers(EventSink::disabled());
    let conv = conversation();
    forward.run(&conv).await.unwrap();
    h.archive.fail_query(1, SyncError::NetworkTimeout);

    let err = backward.run(&conv).await.unwrap_err();

    assert!(matches!(err, SyncError::NetworkTimeout));
    let cursor = h.store.cursor(&conv.key()).unwrap();
    assert_eq!(cursor.first_archive_id.as_deref(), Some("a0031"));
    assert_eq!(h.stored(&conv), 50);

    let retry = backward.run(&conv).await.unwrap();
    assert!(matches!(retry, BackwardOutcome::Fetched(ref p) if p.stored == 30));
}

#[tokio::test]
async fn backward_sync_events() {
    let h = Harness::new();
    h.archive.push_messages(&alice(), &alice(), 70);
    let (tx, mut rx) = event_channel(16);
    let (forward, backward) = h.controllers(EventSink::new(tx));
    let conv = conversation();
    let key = conv.key();
    forward.run(&conv).await.unwrap();
    drain(&mut rx);

    backward.run(&conv).await.unwrap();
    backward.run(&conv).await.unwrap();

    assert_eq!(
        drain(&mut rx),
        vec![
            SyncEvent::BackwardSyncStarted { conversation: key.clone() },
            SyncEvent::BackwardSyncFinished { conversation: key.clone(), succeeded: true },
            SyncEvent::PreviousHistoryComplete { conversation: key.clone() },
            SyncEvent::PreviousHistoryComplete { conversation: key },
        ]
    );
}

#[tokio::test]
async fn explicitly_completed_history_stops_backward_sync() {
    let h = Harness::new();
    h.archive.push_messages(&alice(), &alice(), 80);
    let (forward, backward) = h.controllers(EventSink::disabled());
    let conv = conversation();
    forward.run(&conv).await.unwrap();

    h.cursors().mark_remote_history_complete(&conv.key()).await.unwrap();

    assert_eq!(backward.run(&conv).await.unwrap(), BackwardOutcome::HistoryComplete);
    assert_eq!(h.archive.queries(), vec![Query::Newest]);
    let cursor = h.cursors().get(&conv.key()).await.unwrap();
    assert_eq!(cursor.first_archive_id.as_deref(), Some("a0031"));
}
