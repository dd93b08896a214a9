use fieldsync_storage::mock::{FlakyMode, FlakyTier};
use fieldsync_storage::{
    FileTier, SessionTier, SqliteTier, StorageError, StorageTier, TierKind, TierManager,
};
use fieldsync_types::{ContentSnapshot, PendingChange, SnapshotSource};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::sync::Arc;

const ORIGIN: &str = "https://cms.example.com";

struct Harness {
    _dir: tempfile::TempDir,
    file: Arc<FlakyTier>,
    session: Arc<FlakyTier>,
    sqlite: Arc<FlakyTier>,
    manager: TierManager,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let file = Arc::new(FlakyTier::new(Arc::new(FileTier::new(dir.path(), ORIGIN))));
    let session = Arc::new(FlakyTier::new(Arc::new(SessionTier::new())));
    let sqlite = Arc::new(FlakyTier::new(Arc::new(
        SqliteTier::open_in_memory(ORIGIN).unwrap(),
    )));
    let manager = TierManager::new(vec![
        file.clone() as Arc<dyn StorageTier>,
        session.clone() as Arc<dyn StorageTier>,
        sqlite.clone() as Arc<dyn StorageTier>,
    ]);
    Harness {
        _dir: dir,
        file,
        session,
        sqlite,
        manager,
    }
}

fn snapshot(version: u64, timestamp: u64, pairs: &[(&str, &str)]) -> ContentSnapshot {
    let data: BTreeMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    ContentSnapshot {
        data,
        timestamp,
        version,
        source: SnapshotSource::Local,
    }
}

// ── save_all ─────────────────────────────────────────────────────

#[tokio::test]
async fn save_all_writes_every_tier() {
    let h = harness();
    let report = h
        .manager
        .save_all(&[PendingChange::new("hero_title", "Hello")])
        .await
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(report.succeeded.len(), 3);
    assert_eq!(report.snapshot.version, 1);
    assert_eq!(report.changed, vec!["hero_title".to_string()]);

    for tier in [&h.file, &h.session, &h.sqlite] {
        let loaded = tier.load().await.unwrap().unwrap();
        assert_eq!(loaded.get("hero_title"), Some("Hello"));
        assert_eq!(loaded.version, 1);
    }
}

#[tokio::test]
async fn save_all_merges_into_latest() {
    let h = harness();
    h.manager.save_all(&[PendingChange::new("a", "1")]).await.unwrap();
    let report = h.manager.save_all(&[PendingChange::new("b", "2")]).await.unwrap();

    assert_eq!(report.snapshot.version, 2);
    assert_eq!(report.snapshot.get("a"), Some("1"));
    assert_eq!(report.snapshot.get("b"), Some("2"));
}

#[tokio::test]
async fn save_all_identical_batch_keeps_version() {
    let h = harness();
    let changes = [PendingChange::new("a", "1")];
    let first = h.manager.save_all(&changes).await.unwrap();
    let second = h.manager.save_all(&changes).await.unwrap();

    assert_eq!(first.snapshot.version, second.snapshot.version);
    assert!(second.changed.is_empty());
}

#[tokio::test]
async fn save_all_partial_failure_still_succeeds() {
    let h = harness();
    h.file.set_mode(FlakyMode::Unavailable);
    h.sqlite.set_mode(FlakyMode::Unavailable);

    let report = h.manager.save_all(&[PendingChange::new("a", "1")]).await.unwrap();

    assert!(!report.is_complete());
    assert_eq!(report.succeeded, vec![TierKind::Session]);
    let failed: Vec<TierKind> = report.failed.iter().map(|(k, _)| *k).collect();
    assert_eq!(failed, vec![TierKind::FastDurable, TierKind::Transactional]);
}

#[tokio::test]
async fn save_all_total_failure_is_fatal() {
    let h = harness();
    for tier in [&h.file, &h.session, &h.sqlite] {
        tier.set_mode(FlakyMode::Unavailable);
    }

    let err = h
        .manager
        .save_all(&[PendingChange::new("a", "1")])
        .await
        .unwrap_err();

    match err {
        StorageError::AllTiersFailed { failures } => assert_eq!(failures.len(), 3),
        other => panic!("Expected AllTiersFailed, got {other:?}"),
    }
    // latest snapshot did not advance
    assert_eq!(h.manager.latest().version, 0);
}

#[tokio::test]
async fn no_tiers_is_an_error() {
    let manager = TierManager::new(Vec::new());
    let err = manager.save_all(&[PendingChange::new("a", "1")]).await.unwrap_err();
    assert!(matches!(err, StorageError::NoTiers));
    assert_eq!(manager.load_best().await, ContentSnapshot::empty());
}

// ── load_best ────────────────────────────────────────────────────

#[tokio::test]
async fn load_best_empty_returns_default() {
    let h = harness();
    let snap = h.manager.load_best().await;
    assert_eq!(snap.source, SnapshotSource::Default);
    assert_eq!(snap.version, 0);
    assert!(snap.is_empty());
}

#[tokio::test]
async fn load_best_picks_highest_version() {
    let h = harness();
    h.file.save(&snapshot(2, 900, &[("a", "file")])).await.unwrap();
    h.session.save(&snapshot(5, 100, &[("a", "session")])).await.unwrap();
    h.sqlite.save(&snapshot(3, 950, &[("a", "sqlite")])).await.unwrap();

    let best = h.manager.load_best().await;
    assert_eq!(best.version, 5);
    assert_eq!(best.get("a"), Some("session"));
}

#[tokio::test]
async fn load_best_breaks_ties_by_timestamp() {
    let h = harness();
    h.file.save(&snapshot(4, 100, &[("a", "older")])).await.unwrap();
    h.sqlite.save(&snapshot(4, 200, &[("a", "newer")])).await.unwrap();

    let best = h.manager.load_best().await;
    assert_eq!(best.get("a"), Some("newer"));
}

#[tokio::test]
async fn load_best_falls_back_to_transactional_tier() {
    let h = harness();
    h.manager.save_all(&[PendingChange::new("hero_title", "Kept")]).await.unwrap();

    h.file.set_mode(FlakyMode::Unavailable);
    h.session.set_mode(FlakyMode::Unavailable);

    let best = h.manager.load_best().await;
    assert_eq!(best.version, 1);
    assert_eq!(best.get("hero_title"), Some("Kept"));
}

#[tokio::test]
async fn load_best_skips_corrupt_tiers() {
    let h = harness();
    h.manager.save_all(&[PendingChange::new("a", "1")]).await.unwrap();
    h.file.set_mode(FlakyMode::Corrupt);
    h.sqlite.set_mode(FlakyMode::Corrupt);

    let best = h.manager.load_best().await;
    assert_eq!(best.get("a"), Some("1"));
}

#[tokio::test]
async fn load_best_updates_latest() {
    let h = harness();
    h.sqlite.save(&snapshot(8, 10, &[("a", "1")])).await.unwrap();
    h.manager.load_best().await;
    assert_eq!(h.manager.latest().version, 8);

    let report = h.manager.save_all(&[PendingChange::new("b", "2")]).await.unwrap();
    assert_eq!(report.snapshot.version, 9);
    assert_eq!(report.snapshot.get("a"), Some("1"));
}

// ── observe / save_snapshot / clear_all ──────────────────────────

#[tokio::test]
async fn observe_only_moves_forward() {
    let h = harness();
    assert!(h.manager.observe(&snapshot(3, 1, &[])));
    assert!(!h.manager.observe(&snapshot(2, 5, &[])));
    assert_eq!(h.manager.latest().version, 3);
}

#[tokio::test]
async fn save_snapshot_writes_as_is() {
    let h = harness();
    let snap = snapshot(12, 77, &[("a", "remote")]);
    let report = h.manager.save_snapshot(&snap).await.unwrap().unwrap();
    assert_eq!(report.snapshot.version, 12);
    assert!(report.changed.is_empty());
    assert_eq!(h.sqlite.load().await.unwrap().unwrap().get("a"), Some("remote"));
    assert_eq!(h.manager.latest().version, 12);
}

#[tokio::test]
async fn save_snapshot_never_rolls_back() {
    let h = harness();
    h.manager.save_snapshot(&snapshot(5, 50, &[("a", "new")])).await.unwrap();

    let skipped = h.manager.save_snapshot(&snapshot(4, 99, &[("a", "old")])).await.unwrap();

    assert!(skipped.is_none());
    assert_eq!(h.file.load().await.unwrap().unwrap().get("a"), Some("new"));
}

#[tokio::test]
async fn clear_all_empties_every_tier() {
    let h = harness();
    h.manager.save_all(&[PendingChange::new("a", "1")]).await.unwrap();
    h.manager.clear_all().await;

    assert_eq!(h.manager.latest(), ContentSnapshot::empty());
    assert_eq!(h.manager.load_best().await, ContentSnapshot::empty());
}

mod selection {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn load_best_returns_max_precedence(
            stamps in proptest::collection::vec((0u64..6, 0u64..1000), 3)
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let h = harness();
                let tiers = [&h.file, &h.session, &h.sqlite];
                let snaps: Vec<ContentSnapshot> = stamps
                    .iter()
                    .enumerate()
                    .map(|(i, (v, t))| snapshot(*v, *t, &[("tier", i.to_string().as_str())]))
                    .collect();
                for (tier, snap) in tiers.iter().zip(&snaps) {
                    tier.save(snap).await.unwrap();
                }

                let best = h.manager.load_best().await;
                let expected = snaps
                    .iter()
                    .max_by(|a, b| a.precedence_cmp(b))
                    .unwrap();
                assert_eq!(best.version, expected.version);
                assert_eq!(best.timestamp, expected.timestamp);
            });
        }
    }
}
