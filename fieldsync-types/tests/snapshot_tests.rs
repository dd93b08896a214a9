use fieldsync_types::{ContentSnapshot, PendingChange, SnapshotSource};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::BTreeMap;

fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// ── Construction ─────────────────────────────────────────────────

#[test]
fn empty_snapshot_is_default_source() {
    let snap = ContentSnapshot::empty();
    assert_eq!(snap.version, 0);
    assert_eq!(snap.timestamp, 0);
    assert_eq!(snap.source, SnapshotSource::Default);
    assert!(snap.is_empty());
}

#[test]
fn get_returns_value_or_none() {
    let snap = ContentSnapshot::new(map(&[("a", "1")]), 1, SnapshotSource::Local);
    assert_eq!(snap.get("a"), Some("1"));
    assert_eq!(snap.get("b"), None);
}

#[test]
fn serde_shape() {
    let snap = ContentSnapshot {
        data: map(&[("a", "1")]),
        timestamp: 10,
        version: 2,
        source: SnapshotSource::Remote,
    };
    let json = serde_json::to_value(&snap).unwrap();
    assert_eq!(json["version"], 2);
    assert_eq!(json["timestamp"], 10);
    assert_eq!(json["data"]["a"], "1");
    assert_eq!(json["source"], "remote");
}

// ── Precedence ───────────────────────────────────────────────────

#[test]
fn higher_version_supersedes() {
    let mut a = ContentSnapshot::new(map(&[]), 2, SnapshotSource::Local);
    let mut b = ContentSnapshot::new(map(&[]), 3, SnapshotSource::Local);
    a.timestamp = 500;
    b.timestamp = 100;
    assert!(b.supersedes(&a));
    assert!(!a.supersedes(&b));
}

#[test]
fn timestamp_breaks_version_ties() {
    let mut a = ContentSnapshot::new(map(&[]), 4, SnapshotSource::Local);
    let mut b = a.clone();
    a.timestamp = 100;
    b.timestamp = 200;
    assert!(b.supersedes(&a));
    assert!(!a.supersedes(&a.clone()));
}

// ── apply_changes ────────────────────────────────────────────────

#[test]
fn apply_changes_bumps_version_and_reports_fields() {
    let base = ContentSnapshot::new(map(&[("a", "1"), ("b", "2")]), 5, SnapshotSource::Remote);
    let changes = vec![PendingChange::new("a", "10"), PendingChange::new("c", "3")];

    let (next, changed) = base.apply_changes(&changes, SnapshotSource::Local);

    assert_eq!(next.version, 6);
    assert_eq!(next.source, SnapshotSource::Local);
    assert_eq!(next.data, map(&[("a", "10"), ("b", "2"), ("c", "3")]));
    assert_eq!(changed, vec!["a".to_string(), "c".to_string()]);
}

#[test]
fn apply_changes_without_effect_keeps_version() {
    let base = ContentSnapshot::new(map(&[("a", "1")]), 5, SnapshotSource::Remote);
    let (next, changed) = base.apply_changes(&[PendingChange::new("a", "1")], SnapshotSource::Local);

    assert!(changed.is_empty());
    assert_eq!(next, base);
}

#[test]
fn apply_changes_last_write_wins_within_batch() {
    let base = ContentSnapshot::empty();
    let changes = vec![PendingChange::new("a", "first"), PendingChange::new("a", "second")];
    let (next, changed) = base.apply_changes(&changes, SnapshotSource::Local);
    assert_eq!(next.get("a"), Some("second"));
    assert_eq!(changed, vec!["a".to_string()]);
}

// ── diff ─────────────────────────────────────────────────────────

#[test]
fn diff_reports_changed_and_new_fields_only() {
    let local = ContentSnapshot::new(map(&[("a", "1"), ("b", "2"), ("keep", "k")]), 1, SnapshotSource::Local);
    let remote = map(&[("a", "1"), ("b", "20"), ("c", "3")]);

    let diffs = local.diff(&remote);

    assert_eq!(diffs.len(), 2);
    assert_eq!(diffs[0].field, "b");
    assert_eq!(diffs[0].local.as_deref(), Some("2"));
    assert_eq!(diffs[0].remote, "20");
    assert_eq!(diffs[1].field, "c");
    assert_eq!(diffs[1].local, None);
}

proptest! {
    #[test]
    fn reapplying_a_batch_is_idempotent(
        entries in proptest::collection::vec(("[a-e]", "[a-z]{0,4}"), 0..8)
    ) {
        let changes: Vec<PendingChange> = entries
            .iter()
            .map(|(k, v)| PendingChange::new(k.clone(), v.clone()))
            .collect();
        let (once, _) = ContentSnapshot::empty().apply_changes(&changes, SnapshotSource::Local);
        let (twice, changed) = once.apply_changes(&changes, SnapshotSource::Local);
        prop_assert_eq!(twice.data, once.data);
        prop_assert_eq!(twice.version, once.version);
        prop_assert!(changed.is_empty());
    }

    #[test]
    fn version_never_decreases(
        entries in proptest::collection::vec(("[a-c]", "[a-z]{1,3}"), 0..8)
    ) {
        let mut snap = ContentSnapshot::empty();
        for (k, v) in entries {
            let (next, _) = snap.apply_changes(&[PendingChange::new(k, v)], SnapshotSource::Local);
            prop_assert!(next.version >= snap.version);
            snap = next;
        }
    }
}
